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

//! # Node Supervisor
//!
//! Glue between the topology view, the routing manager, the slot scheduler and the
//! transport: the [`MeshNode`] owns all of them, runs the transmitter and receiver
//! threads, sweeps the liveness table and propagates topology changes into routes and
//! kernel state.

mod liveness;
mod supervisor;

pub use liveness::LivenessTable;
pub use supervisor::{MeshNode, NodeStats, LIVENESS_TIMEOUT_MS};
