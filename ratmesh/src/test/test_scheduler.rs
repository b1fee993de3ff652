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

use crate::sync::{ManualClock, SlotScheduler, MAX_SLOT_SHIFT_MS};
use crate::topology::{ConnectivityMatrix, SpanningTree};
use crate::types::NodeId;

const PERIOD_US: u64 = 100_000;

/// Scheduler for a full mesh of `n` nodes, seen from `my_id`, on a manual clock at zero.
fn scheduler(my_id: NodeId, n: u8) -> (SlotScheduler<ManualClock>, ManualClock) {
    let nodes: Vec<NodeId> = (1..=n).collect();
    let tree = SpanningTree::compute(&ConnectivityMatrix::full_mesh(&nodes));
    let clock = ManualClock::new();
    let scheduler = SlotScheduler::with_clock(my_id, &nodes, tree, clock.clone()).unwrap();
    (scheduler, clock)
}

#[test]
fn bootstrap_divides_the_round_equally() {
    let (scheduler, _) = scheduler(3, 4);
    let slots = scheduler.slots();
    assert_eq!(slots.len(), 4);
    for (i, slot) in slots.iter().enumerate() {
        assert_eq!(slot.start_offset_us, i as u64 * 25_000);
        assert_eq!(slot.duration_us, 25_000);
        assert_eq!(slot.accumulated_shift_us, 0);
    }
    assert_eq!(scheduler.my_slot_index(), 2);
}

#[test]
fn two_nodes_split_the_round_in_half() {
    let (scheduler, clock) = scheduler(2, 2);
    assert_eq!(scheduler.my_slot().duration_us, PERIOD_US / 2);

    // node 2 owns the second half of the round, exactly once per round
    clock.set_us(10_000);
    assert!(!scheduler.can_transmit());
    clock.set_us(50_000);
    assert!(scheduler.can_transmit());
    clock.set_us(99_999);
    assert!(scheduler.can_transmit());
    clock.set_us(PERIOD_US + 10_000);
    assert!(!scheduler.can_transmit());
}

#[test]
fn time_until_my_slot_wraps_into_the_next_round() {
    let (scheduler, clock) = scheduler(3, 4);
    // slot of node 3 opens at 50 ms
    clock.set_us(40_000);
    assert_eq!(scheduler.time_until_my_slot_us(), 10_000);
    clock.set_us(80_000);
    assert_eq!(scheduler.time_until_my_slot_us(), 70_000);
}

#[test]
fn unknown_node_cannot_get_a_slot() {
    let nodes: Vec<NodeId> = vec![1, 2, 3];
    let tree = SpanningTree::compute(&ConnectivityMatrix::full_mesh(&nodes));
    assert!(SlotScheduler::new(9, &nodes, tree).is_err());
}

#[test]
fn constant_positive_delay_shifts_the_slot_by_its_median() {
    // five nodes, node 1 owns slot 0; the full-mesh tree is a star centered there
    let (scheduler, _) = scheduler(1, 5);

    for sender in 2..=5 {
        let tx = 1_000;
        scheduler.on_packet_received(sender, tx, tx + 1_200);
    }
    scheduler.calculate_slot_adjustment();

    let slot = scheduler.my_slot();
    assert_eq!(slot.start_offset_us, 1_200);
    assert_eq!(slot.accumulated_shift_us, 1_200);
    assert_eq!(scheduler.slot_adjustments(), 1);
    assert_eq!(scheduler.total_shift_applied_us(), 1_200);

    // three completed rounds flip the synchronized flag, and it sticks
    assert!(!scheduler.is_synchronized());
    for _ in 0..3 {
        scheduler.on_round_end();
    }
    assert!(scheduler.is_synchronized());
    scheduler.on_round_end();
    assert!(scheduler.is_synchronized());
    assert_eq!(scheduler.round_number(), 4);
}

#[test]
fn negative_median_suppresses_the_shift() {
    let (scheduler, _) = scheduler(1, 4);

    scheduler.on_packet_received(2, 10_000, 9_500); // -500
    scheduler.on_packet_received(3, 10_000, 9_800); // -200
    scheduler.on_packet_received(4, 10_000, 9_900); // -100
    scheduler.calculate_slot_adjustment();

    let slot = scheduler.my_slot();
    assert_eq!(slot.start_offset_us, 0);
    assert_eq!(slot.accumulated_shift_us, 0);
    assert_eq!(scheduler.slot_adjustments(), 0);
    assert_eq!(scheduler.total_shift_applied_us(), 0);
}

#[test]
fn shifts_are_clamped_per_round() {
    let (scheduler, _) = scheduler(1, 3);
    let max_shift = MAX_SLOT_SHIFT_MS * 1000;

    scheduler.on_packet_received(2, 1_000, 21_000); // +20 ms, far above the clamp
    scheduler.on_packet_received(3, 1_000, 21_000);
    scheduler.calculate_slot_adjustment();

    assert_eq!(scheduler.my_slot().start_offset_us, max_shift);
    assert_eq!(scheduler.my_slot().accumulated_shift_us, max_shift);
}

#[test]
fn offsets_wrap_and_accumulated_shift_grows_monotonically() {
    let (scheduler, _) = scheduler(1, 3);
    let max_shift = MAX_SLOT_SHIFT_MS * 1000;
    let mut last_accumulated = 0;

    for round in 0..20 {
        // +10 ms against the current round origin
        let rx = round * PERIOD_US + 11_000;
        scheduler.on_packet_received(2, 1_000, rx);
        scheduler.on_packet_received(3, 1_000, rx);
        scheduler.calculate_slot_adjustment();
        scheduler.on_round_end();

        let slot = scheduler.my_slot();
        assert!(slot.start_offset_us < PERIOD_US);
        assert!(slot.accumulated_shift_us >= last_accumulated);
        assert_eq!(slot.accumulated_shift_us, (round + 1) * max_shift);
        last_accumulated = slot.accumulated_shift_us;
    }
    // 20 rounds of 6 ms wrapped past the round boundary once
    assert_eq!(scheduler.my_slot().start_offset_us, 20 * max_shift - PERIOD_US);
}

#[test]
fn delays_wrap_into_the_circular_window() {
    let (scheduler, _) = scheduler(1, 3);

    // an arrival 99 ms "early" is really 1 ms late in circular terms
    scheduler.on_packet_received(2, 100_000, 1_000);
    scheduler.on_packet_received(3, 100_000, 1_000);
    scheduler.calculate_slot_adjustment();
    assert_eq!(scheduler.my_slot().start_offset_us, 1_000);
}

#[test]
fn adjustment_leaves_an_empty_buffer_for_the_new_round() {
    let (scheduler, _) = scheduler(1, 4);
    scheduler.on_packet_received(2, 1_000, 2_000);
    scheduler.on_packet_received(3, 1_000, 2_000);
    assert_eq!(scheduler.pending_delay_samples(), 2);

    scheduler.calculate_slot_adjustment();
    assert_eq!(scheduler.pending_delay_samples(), 0);
}

#[test]
fn only_tree_neighbors_drive_the_adjustment() {
    // chain 1-2-3-4: node 1 has a single tree neighbor, node 2
    let nodes: Vec<NodeId> = vec![1, 2, 3, 4];
    let tree = SpanningTree::compute(&ConnectivityMatrix::chain(&nodes));
    let clock = ManualClock::new();
    let scheduler = SlotScheduler::with_clock(1, &nodes, tree, clock).unwrap();

    // a huge delay from a non-neighbor must not move the slot
    scheduler.on_packet_received(4, 1_000, 6_000);
    scheduler.calculate_slot_adjustment();
    assert_eq!(scheduler.my_slot().start_offset_us, 0);

    // the same delay from the tree neighbor does
    scheduler.on_packet_received(2, 1_000, 6_000);
    scheduler.calculate_slot_adjustment();
    assert_eq!(scheduler.my_slot().start_offset_us, 5_000);
}

#[test]
fn packets_from_unknown_senders_are_ignored() {
    let (scheduler, _) = scheduler(1, 3);
    scheduler.on_packet_received(9, 1_000, 2_000);
    assert_eq!(scheduler.pending_delay_samples(), 0);
}
