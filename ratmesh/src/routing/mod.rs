// Ratmesh: Slot-Synchronized Mesh Scheduling and Routing
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Routing
//!
//! Topology-aware route computation: the pure shortest-path engine, the
//! [`RoutingManager`] that owns the routing table and recomputes it on every observed
//! topology change, and the best-effort kernel route installer.

mod dijkstra;
mod kernel;
mod manager;

pub use dijkstra::{shortest_paths, PathResult, RoutingError};
pub use kernel::KernelRouteInstaller;
pub use manager::{RecomputeStats, RouteEntry, RoutingManager};
