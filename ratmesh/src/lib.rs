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

#![deny(missing_docs)]

//! # Ratmesh: Slot-Synchronized Mesh Scheduling and Routing
//!
//! This is a library for running a cooperative TDMA discipline over a small multi-hop
//! mesh. Every node of a set of `N` peers (`2 <= N <= 20`) owns a fixed-index slot
//! inside a periodic 100 ms round and shifts its own slot boundary each round so that
//! its transmissions arrive at downstream neighbors in the intended temporal position,
//! compensating clock drift and queueing delay. On top of the slot discipline sits a
//! topology-aware routing layer that recomputes next hops on every observed change of
//! the neighbor-liveness graph.
//!
//! ## Structure
//!
//! - **[`Topology`](topology)**: the [`ConnectivityMatrix`](topology::ConnectivityMatrix)
//!   snapshot of the reachability graph, the shared
//!   [`TopologyRegistry`](topology::TopologyRegistry), and the
//!   [`SpanningTree`](topology::SpanningTree) used both for routing fallback and for
//!   selecting which neighbors drive the slot synchronization.
//!
//! - **[`Routing`](routing)**: the pure shortest-path engine, the
//!   [`RoutingManager`](routing::RoutingManager) with its strategy selector
//!   (shortest-path, spanning-tree or hybrid), and the best-effort
//!   [`KernelRouteInstaller`](routing::KernelRouteInstaller).
//!
//! - **[`Sync`](sync)**: the RA-TDMAs+ [`SlotScheduler`](sync::SlotScheduler) with its
//!   dual delay buffers and the [`Clock`](sync::Clock) seam tests use to drive rounds
//!   deterministically.
//!
//! - **[`Transport`](transport)**: the packed wire header and the UDP datagram
//!   transport between nodes.
//!
//! - **[`Stream`](stream)**: chunked transfer of byte blobs over DATA packets, with
//!   loss accounting on the receiver.
//!
//! - **[`Node`](node)**: the [`MeshNode`](node::MeshNode) supervisor composing all of
//!   the above and running the transmitter and receiver threads.

// test modules
mod test;

mod error;
mod types;

pub mod node;
pub mod routing;
pub mod stream;
pub mod sync;
pub mod topology;
pub mod transport;

pub use error::Error;
pub use types::{
    NodeId, PathState, RoutingStrategy, INFINITY_COST, MAX_NODES, NO_NEXT_HOP, NO_NODE,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stopper, to check when to stop, or to send the stop command
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    /// Create a new stop signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the stop command.
    pub fn send_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Checks if the stop flag is set.
    pub fn is_stop(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
