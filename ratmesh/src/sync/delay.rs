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

//! Module containing the per-slot arrival-delay aggregates.

use crate::types::MAX_NODES;

/// Aggregated delay observations of one sender slot within a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelaySample {
    /// Most recent normalized delay in microseconds.
    pub last_delay_us: i64,
    /// Number of packets observed this round.
    pub count: u32,
}

/// One round worth of delay observations, indexed by sender slot position.
///
/// The scheduler keeps two of these and swaps them at the round boundary, so the
/// adjustment step reads a stable snapshot while the receiver keeps writing.
#[derive(Debug, Clone, Default)]
pub struct DelayBuffer {
    samples: [DelaySample; MAX_NODES],
}

impl DelayBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation for the given slot position.
    pub fn record(&mut self, slot: usize, delay_us: i64) {
        if let Some(sample) = self.samples.get_mut(slot) {
            sample.last_delay_us = delay_us;
            sample.count += 1;
        }
    }

    /// The aggregate for the given slot position.
    pub fn sample(&self, slot: usize) -> DelaySample {
        self.samples.get(slot).copied().unwrap_or_default()
    }

    /// Total number of observations across all slots.
    pub fn total_count(&self) -> u32 {
        self.samples.iter().map(|s| s.count).sum()
    }

    /// Drop all observations.
    pub fn clear(&mut self) {
        self.samples = [DelaySample::default(); MAX_NODES];
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_keeps_last_delay_and_counts() {
        let mut buffer = DelayBuffer::new();
        buffer.record(3, 1500);
        buffer.record(3, -200);
        assert_eq!(buffer.sample(3), DelaySample { last_delay_us: -200, count: 2 });
        assert_eq!(buffer.total_count(), 2);

        buffer.clear();
        assert_eq!(buffer.total_count(), 0);
        assert_eq!(buffer.sample(3), DelaySample::default());
    }

    #[test]
    fn out_of_range_slots_are_ignored() {
        let mut buffer = DelayBuffer::new();
        buffer.record(MAX_NODES + 1, 42);
        assert_eq!(buffer.total_count(), 0);
    }
}
