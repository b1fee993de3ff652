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

//! Module containing the shared registry holding the authoritative connectivity snapshot.

use crate::sync::monotonic_ms;
use crate::topology::ConnectivityMatrix;
use log::*;
use std::sync::{Arc, Mutex};

/// Shared handle to the authoritative [`ConnectivityMatrix`] of the process.
///
/// The supervisor creates exactly one registry and hands clones of the handle to whoever
/// needs the topology. Writers replace the full snapshot under the internal lock, readers
/// receive a consistent copy; no reader can observe a half-updated matrix. Operations
/// cannot fail.
#[derive(Debug, Clone)]
pub struct TopologyRegistry {
    inner: Arc<Mutex<ConnectivityMatrix>>,
}

impl TopologyRegistry {
    /// Create the registry with an initial snapshot. The snapshot is stamped with the
    /// current wall-clock time.
    pub fn new(mut initial: ConnectivityMatrix) -> Self {
        initial.stamp(monotonic_ms());
        Self { inner: Arc::new(Mutex::new(initial)) }
    }

    /// Replace the stored snapshot atomically, stamping the update time.
    pub fn set(&self, mut topo: ConnectivityMatrix) {
        topo.stamp(monotonic_ms());
        let num_nodes = topo.num_nodes();
        *self.inner.lock().unwrap() = topo;
        debug!("Topology updated: {} nodes", num_nodes);
    }

    /// Get a consistent copy of the stored snapshot.
    pub fn get(&self) -> ConnectivityMatrix {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn readers_see_the_full_replacement() {
        let registry = TopologyRegistry::new(ConnectivityMatrix::new(&[1, 2, 3]));
        assert!(!registry.get().connected_ids(1, 2));

        registry.set(ConnectivityMatrix::full_mesh(&[1, 2, 3]));
        let snapshot = registry.get();
        assert!(snapshot.connected_ids(1, 2));
        assert!(snapshot.connected_ids(2, 3));
    }

    #[test]
    fn set_stamps_a_nondecreasing_timestamp() {
        let registry = TopologyRegistry::new(ConnectivityMatrix::new(&[1, 2]));
        let t0 = registry.get().timestamp_ms();
        registry.set(ConnectivityMatrix::full_mesh(&[1, 2]));
        assert!(registry.get().timestamp_ms() >= t0);
    }
}
