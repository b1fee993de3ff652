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

//! # RA-TDMAs+ Slot Scheduler
//!
//! Every node owns a fixed-index slot inside a periodic round. The scheduler answers the
//! two questions the transmitter thread keeps asking ("may I transmit now?" and "how long
//! until my slot?") and, once per round, shifts the node's own slot boundary forward by
//! the median arrival delay observed from its spanning-tree neighbors. Shifts are never
//! negative: a node never moves its slot earlier, since the owner of the preceding slot
//! could not know about the move within the same round. The per-round shift is bounded by
//! [`MAX_SLOT_SHIFT_MS`], so a slot cannot cross its neighbor in a single round.

use crate::error::Error;
use crate::sync::{Clock, DelayBuffer, MonotonicClock};
use crate::topology::SpanningTree;
use crate::types::NodeId;
use itertools::Itertools;
use log::*;
use std::fmt;
use std::mem;
use std::sync::Mutex;

/// Duration of one TDMA round in milliseconds.
pub const ROUND_PERIOD_MS: u64 = 100;

/// Upper bound on the slot correction applied within a single round, in milliseconds.
pub const MAX_SLOT_SHIFT_MS: u64 = 6;

/// Boundaries of one transmission slot within the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBoundary {
    /// Owner of the slot.
    pub node_id: NodeId,
    /// Offset of the slot start from the round start, in microseconds.
    pub start_offset_us: u64,
    /// Length of the slot window in microseconds.
    pub duration_us: u64,
    /// Total forward shift applied to this slot since startup.
    pub accumulated_shift_us: u64,
}

#[derive(Debug)]
struct RoundState {
    slots: Vec<SlotBoundary>,
    round_number: u64,
    round_start_us: u64,
    sync_rounds_count: u32,
    is_synchronized: bool,
    tree: SpanningTree,
    slot_adjustments: u64,
    total_shift_applied_us: u64,
}

/// # Slot Scheduler
///
/// Owner of the round clock, the per-node slot boundaries and the dual delay buffers.
/// All methods take `&self`; the slot state and each delay buffer sit behind their own
/// lock. [`calculate_slot_adjustment`](Self::calculate_slot_adjustment) swaps the two
/// buffers, always acquiring `current` before `previous`.
#[derive(Debug)]
pub struct SlotScheduler<C: Clock = MonotonicClock> {
    my_node_id: NodeId,
    my_slot_index: usize,
    num_slots: usize,
    round_period_us: u64,
    clock: C,
    state: Mutex<RoundState>,
    current_delays: Mutex<DelayBuffer>,
    previous_delays: Mutex<DelayBuffer>,
}

impl SlotScheduler<MonotonicClock> {
    /// Create a scheduler over the given slot owners, driven by the monotonic clock.
    /// The round is divided into equal windows, one per node, in slot order.
    pub fn new(my_id: NodeId, all_nodes: &[NodeId], tree: SpanningTree) -> Result<Self, Error> {
        Self::with_clock(my_id, all_nodes, tree, MonotonicClock)
    }
}

impl<C: Clock> SlotScheduler<C> {
    /// Create a scheduler driven by an explicit clock.
    pub fn with_clock(
        my_id: NodeId,
        all_nodes: &[NodeId],
        tree: SpanningTree,
        clock: C,
    ) -> Result<Self, Error> {
        let num_slots = all_nodes.len();
        let my_slot_index = all_nodes
            .iter()
            .position(|id| *id == my_id)
            .ok_or(Error::UnknownNode(my_id))?;

        let round_period_us = ROUND_PERIOD_MS * 1000;
        let slot_duration = round_period_us / num_slots as u64;
        let slots = all_nodes
            .iter()
            .enumerate()
            .map(|(i, id)| SlotBoundary {
                node_id: *id,
                start_offset_us: i as u64 * slot_duration,
                duration_us: slot_duration,
                accumulated_shift_us: 0,
            })
            .collect();

        let state = RoundState {
            slots,
            round_number: 0,
            round_start_us: clock.now_us(),
            sync_rounds_count: 0,
            is_synchronized: false,
            tree,
            slot_adjustments: 0,
            total_shift_applied_us: 0,
        };

        info!(
            "RA-TDMAs+ init: node {}, slot {}/{}, duration {} us",
            my_id, my_slot_index, num_slots, slot_duration
        );

        Ok(Self {
            my_node_id: my_id,
            my_slot_index,
            num_slots,
            round_period_us,
            clock,
            state: Mutex::new(state),
            current_delays: Mutex::new(DelayBuffer::new()),
            previous_delays: Mutex::new(DelayBuffer::new()),
        })
    }

    /// Replace the spanning tree that selects which senders drive the slot adjustment.
    pub fn set_spanning_tree(&self, tree: SpanningTree) {
        self.state.lock().unwrap().tree = tree;
    }

    /// Record the arrival of a packet from `sender_id`. The delay against the expected
    /// arrival time is normalized into `(-period/2, +period/2]` and stored in the current
    /// round's buffer. Packets from unknown senders are ignored.
    pub fn on_packet_received(&self, sender_id: NodeId, tx_timestamp_us: u64, rx_timestamp_us: u64) {
        let (sender_idx, expected_rx) = {
            let state = self.state.lock().unwrap();
            let sender_idx = match state.slots.iter().position(|s| s.node_id == sender_id) {
                Some(idx) => idx,
                None => return,
            };
            // sender timestamps are taken as offsets relative to its own round start, so
            // the slot-start term cancels and the expectation reduces to our round origin
            // plus the sender's transmit offset
            let sender_slot_start = state.slots[sender_idx].start_offset_us as i64;
            let expected_rx = state.round_start_us as i64
                + sender_slot_start
                + (tx_timestamp_us as i64 - sender_slot_start);
            (sender_idx, expected_rx)
        };

        let raw_delay = rx_timestamp_us as i64 - expected_rx;

        // normalize the circular offset
        let half_period = self.round_period_us as i64 / 2;
        let mut delay = raw_delay;
        if delay > half_period {
            delay -= self.round_period_us as i64;
        } else if delay < -half_period {
            delay += self.round_period_us as i64;
        }

        self.current_delays.lock().unwrap().record(sender_idx, delay);
    }

    /// Whether the node's own slot window is currently open.
    pub fn can_transmit(&self) -> bool {
        let now = self.clock.now_us();
        let state = self.state.lock().unwrap();
        let time_in_round = now.saturating_sub(state.round_start_us) % self.round_period_us;
        let my_slot = &state.slots[self.my_slot_index];
        time_in_round >= my_slot.start_offset_us
            && time_in_round < my_slot.start_offset_us + my_slot.duration_us
    }

    /// Time until the node's own slot opens, in microseconds. If the slot already passed
    /// within this round, the wait extends into the next round.
    pub fn time_until_my_slot_us(&self) -> u32 {
        let now = self.clock.now_us();
        let state = self.state.lock().unwrap();
        let time_in_round = now.saturating_sub(state.round_start_us) % self.round_period_us;
        let slot_start = state.slots[self.my_slot_index].start_offset_us;
        if time_in_round < slot_start {
            (slot_start - time_in_round) as u32
        } else {
            (self.round_period_us - time_in_round + slot_start) as u32
        }
    }

    /// Analyze the previous round's arrival delays and shift the own slot boundary.
    ///
    /// The two delay buffers are swapped (leaving an empty buffer for the round that is
    /// starting) and the filled one is filtered down to senders that share a spanning-tree
    /// edge with this node. The applied shift is the median of those delays, floored at
    /// zero and capped at [`MAX_SLOT_SHIFT_MS`].
    pub fn calculate_slot_adjustment(&self) {
        // swap so writers immediately fill a fresh buffer; lock order: current, previous
        let snapshot = {
            let mut current = self.current_delays.lock().unwrap();
            let mut previous = self.previous_delays.lock().unwrap();
            mem::swap(&mut *current, &mut *previous);
            current.clear();
            previous.clone()
        };

        let mut state = self.state.lock().unwrap();

        // only listen to senders adjacent on the tree, everything else risks sync loops
        let my_idx = self.my_slot_index;
        let filtered: Vec<i64> = (0..self.num_slots)
            .filter(|&i| snapshot.sample(i).count > 0 && state.tree.connected(my_idx, i))
            .map(|i| snapshot.sample(i).last_delay_us)
            .sorted()
            .collect();

        if filtered.is_empty() {
            return;
        }

        let median = filtered[filtered.len() / 2];

        // never move the slot earlier; bound the step size
        let shift = median.max(0).min((MAX_SLOT_SHIFT_MS * 1000) as i64) as u64;
        if shift == 0 {
            return;
        }

        let period = self.round_period_us;
        let my_slot = &mut state.slots[my_idx];
        my_slot.start_offset_us += shift;
        if my_slot.start_offset_us >= period {
            my_slot.start_offset_us -= period;
        }
        my_slot.accumulated_shift_us += shift;
        let accumulated = my_slot.accumulated_shift_us;

        state.slot_adjustments += 1;
        state.total_shift_applied_us += shift;

        debug!(
            "Node {}: slot shifted by {} us (accumulated {} us)",
            self.my_node_id, shift, accumulated
        );
    }

    /// Advance the round origin by one period. After three completed rounds the node
    /// reports itself synchronized; the flag never reverts within a session.
    pub fn on_round_end(&self) {
        let mut state = self.state.lock().unwrap();
        state.round_start_us += self.round_period_us;
        state.round_number += 1;
        state.sync_rounds_count += 1;
        if !state.is_synchronized && state.sync_rounds_count >= 3 {
            state.is_synchronized = true;
            debug!("Node {}: synchronization achieved", self.my_node_id);
        }
    }

    /// This node's id.
    pub fn my_node_id(&self) -> NodeId {
        self.my_node_id
    }

    /// Index of this node's slot within the round.
    pub fn my_slot_index(&self) -> usize {
        self.my_slot_index
    }

    /// Length of a round in microseconds.
    pub fn round_period_us(&self) -> u64 {
        self.round_period_us
    }

    /// Number of completed rounds.
    pub fn round_number(&self) -> u64 {
        self.state.lock().unwrap().round_number
    }

    /// Whether the node has completed its initial synchronization rounds.
    pub fn is_synchronized(&self) -> bool {
        self.state.lock().unwrap().is_synchronized
    }

    /// Copy of this node's own slot boundary.
    pub fn my_slot(&self) -> SlotBoundary {
        self.state.lock().unwrap().slots[self.my_slot_index]
    }

    /// Copy of all slot boundaries, in slot order.
    pub fn slots(&self) -> Vec<SlotBoundary> {
        self.state.lock().unwrap().slots.clone()
    }

    /// Number of shifts applied since startup.
    pub fn slot_adjustments(&self) -> u64 {
        self.state.lock().unwrap().slot_adjustments
    }

    /// Sum of all shifts applied since startup, in microseconds.
    pub fn total_shift_applied_us(&self) -> u64 {
        self.state.lock().unwrap().total_shift_applied_us
    }

    /// Number of delay samples collected in the round currently in progress.
    pub fn pending_delay_samples(&self) -> u32 {
        self.current_delays.lock().unwrap().total_count()
    }

    /// Formatted table of all slot boundaries; the own slot is marked with `*`.
    pub fn fmt_slots(&self) -> String {
        let state = self.state.lock().unwrap();
        let mut out = format!(
            "Round: {} | Synced: {}\nNode | Start (us) | Duration | Shift\n",
            state.round_number,
            if state.is_synchronized { "YES" } else { "NO" }
        );
        for (i, slot) in state.slots.iter().enumerate() {
            let marker = if i == self.my_slot_index { '*' } else { ' ' };
            out.push_str(&format!(
                " {}{:>2} | {:>10} | {:>8} | {:>6}\n",
                marker, slot.node_id, slot.start_offset_us, slot.duration_us,
                slot.accumulated_shift_us
            ));
        }
        out
    }

    /// Formatted list of the delays analyzed last round.
    pub fn fmt_delays(&self) -> String {
        let state = self.state.lock().unwrap();
        let previous = self.previous_delays.lock().unwrap();
        let mut out = String::new();
        for (i, slot) in state.slots.iter().enumerate() {
            let sample = previous.sample(i);
            if sample.count > 0 {
                out.push_str(&format!(
                    "  Node {}: {} us ({} pkts)\n",
                    slot.node_id, sample.last_delay_us, sample.count
                ));
            }
        }
        out
    }
}

impl<C: Clock> fmt::Display for SlotScheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fmt_slots())
    }
}
