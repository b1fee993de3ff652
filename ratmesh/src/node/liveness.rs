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

//! Module containing the per-peer liveness table.

use crate::types::NodeId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Last-seen wall-clock values for every peer, initialized to the node's own boot time
/// so that nobody is declared dead before the first timeout window has passed.
///
/// The receiver thread is the only writer; the sweep on the transmitter thread reads.
/// A stale read is harmless, so plain atomics suffice.
#[derive(Debug)]
pub struct LivenessTable {
    last_seen_ms: Vec<AtomicU64>,
}

impl LivenessTable {
    /// Create a table for `num_nodes` peers, all marked seen at `boot_ms`.
    pub fn new(num_nodes: usize, boot_ms: u64) -> Self {
        Self {
            last_seen_ms: (0..num_nodes).map(|_| AtomicU64::new(boot_ms)).collect(),
        }
    }

    /// Record a sign of life from `peer` at `now_ms`. Unknown peers are ignored.
    pub fn mark_alive(&self, peer: NodeId, now_ms: u64) {
        if let Some(slot) = self.slot(peer) {
            slot.store(now_ms, Ordering::Relaxed);
        }
    }

    /// Last time `peer` was seen, in milliseconds.
    pub fn last_seen_ms(&self, peer: NodeId) -> Option<u64> {
        self.slot(peer).map(|s| s.load(Ordering::Relaxed))
    }

    /// Milliseconds since `peer` was last seen.
    pub fn elapsed_ms(&self, peer: NodeId, now_ms: u64) -> Option<u64> {
        self.last_seen_ms(peer).map(|seen| now_ms.saturating_sub(seen))
    }

    fn slot(&self, peer: NodeId) -> Option<&AtomicU64> {
        if peer == 0 {
            return None;
        }
        self.last_seen_ms.get(peer as usize - 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn peers_start_at_boot_time() {
        let table = LivenessTable::new(3, 1000);
        assert_eq!(table.last_seen_ms(1), Some(1000));
        assert_eq!(table.last_seen_ms(3), Some(1000));
        assert_eq!(table.last_seen_ms(4), None);
        assert_eq!(table.last_seen_ms(0), None);
    }

    #[test]
    fn elapsed_tracks_the_latest_mark() {
        let table = LivenessTable::new(2, 1000);
        table.mark_alive(2, 6000);
        assert_eq!(table.elapsed_ms(2, 6500), Some(500));
        assert_eq!(table.elapsed_ms(1, 6500), Some(5500));
    }
}
