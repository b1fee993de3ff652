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

//! Module containing all error types

use crate::routing::RoutingError;
use crate::transport::TransportError;
use crate::types::NodeId;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Error propagated from the routing engine
    #[error("Routing Error: {0}")]
    RoutingError(#[from] RoutingError),
    /// Error propagated from the transport
    #[error("Transport Error: {0}")]
    TransportError(#[from] TransportError),
    /// The local network interface never became reachable during startup.
    #[error("Network not ready after {0} probe attempts")]
    NetworkNotReady(usize),
    /// A node id does not own any slot of the round.
    #[error("Node {0} does not own a slot in the round")]
    UnknownNode(NodeId),
    /// The startup configuration is invalid.
    #[error("Malformed configuration: {0}")]
    MalformedConfig(String),
    /// Writing the timing metrics export failed.
    #[error("Cannot export metrics: {0}")]
    MetricsExport(#[from] csv::Error),
}
