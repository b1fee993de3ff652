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

//! # Routing Manager
//!
//! Owner of the current topology snapshot, the routing table and the recomputation
//! machinery. On every observed change of the connectivity matrix the manager bumps its
//! `topology_version`, recomputes all routes under the configured strategy and records
//! how long each phase took. All state sits behind one internal lock; recomputation runs
//! while holding it, which is fine in the 100 us range the table sizes here produce.

use crate::routing::dijkstra::{shortest_paths, PathResult};
use crate::topology::{ConnectivityMatrix, SpanningTree};
use crate::types::{
    NodeId, PathState, RoutingStrategy, INFINITY_COST, MAX_NODES, NO_NEXT_HOP,
};
use crate::Error;
use log::*;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

/// One entry of the routing table. Entries are allocated once and overwritten in place by
/// every recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// The destination node.
    pub destination: NodeId,
    /// Neighbor to forward through, [`NO_NEXT_HOP`] when invalid.
    pub next_hop: NodeId,
    /// Hop count towards the destination.
    pub distance: u8,
    /// How the entry was derived.
    pub state: PathState,
    /// Whether the entry may be used for forwarding.
    pub valid: bool,
}

impl Default for RouteEntry {
    fn default() -> Self {
        Self {
            destination: 0,
            next_hop: NO_NEXT_HOP,
            distance: INFINITY_COST,
            state: PathState::Unreachable,
            valid: false,
        }
    }
}

/// Min/max/sum/count aggregate of a measured duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingStats {
    /// Number of recorded measurements.
    pub count: u64,
    /// Sum of all measurements in microseconds.
    pub sum_us: u64,
    /// Smallest measurement; `u64::MAX` until the first one lands.
    pub min_us: u64,
    /// Largest measurement.
    pub max_us: u64,
}

impl Default for TimingStats {
    fn default() -> Self {
        Self { count: 0, sum_us: 0, min_us: u64::MAX, max_us: 0 }
    }
}

impl TimingStats {
    fn record(&mut self, us: u64) {
        self.count += 1;
        self.sum_us += us;
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
    }

    /// Mean of all measurements, zero before the first one.
    pub fn avg_us(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.sum_us / self.count
        }
    }
}

/// Snapshot of the recomputation timing statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeStats {
    /// Timing of full recomputations.
    pub overall: TimingStats,
    /// Timing of the shortest-path portion alone.
    pub dijkstra: TimingStats,
    /// Timing of the spanning-tree portion alone.
    pub mst: TimingStats,
    /// Duration of the most recent recomputation in microseconds.
    pub last_us: u64,
}

#[derive(Debug)]
struct ManagerState {
    strategy: RoutingStrategy,
    topology: ConnectivityMatrix,
    mst: SpanningTree,
    table: [RouteEntry; MAX_NODES],
    topology_version: u64,
    link_failures_detected: u64,
    stats: RecomputeStats,
}

/// # Routing Manager
///
/// See the [module documentation](self) for the overall behavior. Lookups through
/// [`get_next_hop`](Self::get_next_hop) briefly acquire the same lock as recomputation,
/// so a recomputation triggered by [`update_topology`](Self::update_topology)
/// happens-before any lookup that follows it.
#[derive(Debug)]
pub struct RoutingManager {
    my_node_id: NodeId,
    inner: Mutex<ManagerState>,
}

impl RoutingManager {
    /// Create a manager for the given node with an empty topology. The first
    /// [`update_topology`](Self::update_topology) populates the table.
    pub fn new(my_node_id: NodeId, strategy: RoutingStrategy) -> Self {
        Self {
            my_node_id,
            inner: Mutex::new(ManagerState {
                strategy,
                topology: ConnectivityMatrix::new(&[]),
                mst: SpanningTree::empty(),
                table: [RouteEntry::default(); MAX_NODES],
                topology_version: 0,
                link_failures_detected: 0,
                stats: RecomputeStats::default(),
            }),
        }
    }

    /// The node this manager computes routes for.
    pub fn my_node_id(&self) -> NodeId {
        self.my_node_id
    }

    /// The configured strategy.
    pub fn strategy(&self) -> RoutingStrategy {
        self.inner.lock().unwrap().strategy
    }

    /// Compare the new snapshot against the stored one. If any link bit differs, store
    /// the snapshot, bump the topology version, count the change and recompute all
    /// routes. Returns whether anything changed; an identical snapshot does no work.
    pub fn update_topology(&self, new_topology: &ConnectivityMatrix) -> bool {
        let mut state = self.inner.lock().unwrap();
        if !state.topology.differs(new_topology) {
            return false;
        }
        state.topology = new_topology.clone();
        state.topology_version += 1;
        state.link_failures_detected += 1;
        info!(
            "Node {}: topology change detected (version {})",
            self.my_node_id, state.topology_version
        );
        self.recompute_locked(&mut state);
        true
    }

    /// Recompute all routes from the stored snapshot, without any change detection.
    pub fn force_recompute(&self) {
        let mut state = self.inner.lock().unwrap();
        self.recompute_locked(&mut state);
    }

    /// Next hop towards `destination`, or [`NO_NEXT_HOP`] if no valid route exists.
    pub fn get_next_hop(&self, destination: NodeId) -> NodeId {
        let state = self.inner.lock().unwrap();
        state
            .table
            .iter()
            .take(state.topology.num_nodes())
            .find(|e| e.destination == destination && e.valid)
            .map(|e| e.next_hop)
            .unwrap_or(NO_NEXT_HOP)
    }

    /// Whether the last recomputation altered the entry for `destination`. Per-entry
    /// history is not tracked, so this always reports `false`; no caller relies on it.
    pub fn route_changed(&self, _destination: NodeId) -> bool {
        false
    }

    /// Copy of the current routing table, one entry per slot position.
    pub fn table(&self) -> Vec<RouteEntry> {
        let state = self.inner.lock().unwrap();
        state.table[..state.topology.num_nodes()].to_vec()
    }

    /// Spanning tree produced by the last recomputation that ran an MST pass.
    pub fn mst(&self) -> SpanningTree {
        self.inner.lock().unwrap().mst.clone()
    }

    /// Number of topology changes observed so far.
    pub fn topology_version(&self) -> u64 {
        self.inner.lock().unwrap().topology_version
    }

    /// Number of link-state changes that triggered a recomputation.
    pub fn link_failures_detected(&self) -> u64 {
        self.inner.lock().unwrap().link_failures_detected
    }

    /// Snapshot of the timing statistics.
    pub fn stats(&self) -> RecomputeStats {
        self.inner.lock().unwrap().stats
    }

    /// Write the timing metrics as a single CSV row to `path`.
    pub fn export_metrics_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let state = self.inner.lock().unwrap();
        let mut writer = csv::Writer::from_path(path).map_err(Error::MetricsExport)?;
        writer.write_record(&[
            "node",
            "strategy",
            "recomputations",
            "total_us",
            "min_us",
            "max_us",
            "avg_us",
            "dijkstra_us",
            "mst_us",
            "topology_version",
            "link_failures",
        ])?;
        writer.write_record(&[
            self.my_node_id.to_string(),
            state.strategy.to_string(),
            state.stats.overall.count.to_string(),
            state.stats.overall.sum_us.to_string(),
            state.stats.overall.min_us.to_string(),
            state.stats.overall.max_us.to_string(),
            state.stats.overall.avg_us().to_string(),
            state.stats.dijkstra.sum_us.to_string(),
            state.stats.mst.sum_us.to_string(),
            state.topology_version.to_string(),
            state.link_failures_detected.to_string(),
        ])?;
        writer.flush().map_err(|e| Error::MetricsExport(csv::Error::from(e)))?;
        Ok(())
    }

    /// Formatted routing table.
    pub fn fmt_table(&self) -> String {
        let state = self.inner.lock().unwrap();
        let mut out = String::from("Destination | Next Hop | Distance | State       | Valid\n");
        for entry in state.table.iter().take(state.topology.num_nodes()) {
            out.push_str(&format!(
                "{:>11} | {:>8} | {:>8} | {:<11} | {}\n",
                entry.destination,
                entry.next_hop,
                entry.distance,
                entry.state.to_string(),
                if entry.valid { "yes" } else { "no" }
            ));
        }
        out
    }

    fn recompute_locked(&self, state: &mut ManagerState) {
        let num_nodes = state.topology.num_nodes();
        let start = Instant::now();

        for entry in state.table.iter_mut().take(num_nodes) {
            entry.state = PathState::Recomputing;
        }

        match state.strategy {
            RoutingStrategy::Dijkstra => {
                if !self.dijkstra_pass(state) {
                    return;
                }
            }
            RoutingStrategy::Mst => {
                self.mst_pass(state, false);
            }
            RoutingStrategy::Hybrid => {
                if !self.dijkstra_pass(state) {
                    return;
                }
                let has_unreachable =
                    state.table.iter().take(num_nodes).any(|e| !e.valid);
                if has_unreachable {
                    self.mst_pass(state, true);
                }
            }
        }

        let elapsed = start.elapsed().as_micros() as u64;
        state.stats.overall.record(elapsed);
        state.stats.last_us = elapsed;
        trace!("Node {}: routes recomputed in {} us", self.my_node_id, elapsed);
    }

    /// Run the shortest-path engine and overwrite the table. Returns `false` when the
    /// engine rejects the snapshot, leaving the table in its previous shape.
    fn dijkstra_pass(&self, state: &mut ManagerState) -> bool {
        let start = Instant::now();
        let results = match shortest_paths(self.my_node_id, &state.topology) {
            Ok(results) => results,
            Err(e) => {
                error!("Node {}: cannot recompute routes: {}", self.my_node_id, e);
                return false;
            }
        };
        write_paths(&mut state.table, &results);
        state.stats.dijkstra.record(start.elapsed().as_micros() as u64);
        true
    }

    /// Derive routes from the spanning tree. With `only_unreachable` set, entries that
    /// already hold a valid route are left untouched.
    fn mst_pass(&self, state: &mut ManagerState, only_unreachable: bool) {
        let start = Instant::now();
        let mst = SpanningTree::compute(&state.topology);

        if let Some(my_idx) = state.topology.index_of(self.my_node_id) {
            let (parent, depth) = mst.bfs_from(my_idx);
            let node_ids = state.topology.node_ids();
            for i in 0..state.topology.num_nodes() {
                if only_unreachable && state.table[i].valid {
                    continue;
                }
                let entry = &mut state.table[i];
                entry.destination = node_ids[i];
                if i == my_idx {
                    entry.next_hop = node_ids[i];
                    entry.distance = 0;
                    entry.state = PathState::Fallback;
                    entry.valid = true;
                    continue;
                }
                match (tree_next_hop(my_idx, i, &parent), depth[i]) {
                    (Some(hop_idx), Some(d)) => {
                        entry.next_hop = node_ids[hop_idx];
                        entry.distance = d;
                        entry.state = PathState::Fallback;
                        entry.valid = true;
                    }
                    _ => {
                        entry.next_hop = NO_NEXT_HOP;
                        entry.distance = INFINITY_COST;
                        entry.state = PathState::Unreachable;
                        entry.valid = false;
                    }
                }
            }
        }

        state.mst = mst;
        state.stats.mst.record(start.elapsed().as_micros() as u64);
    }
}

/// Overwrite the table in place from a full set of shortest-path results.
fn write_paths(table: &mut [RouteEntry; MAX_NODES], results: &[PathResult]) {
    for (entry, result) in table.iter_mut().zip(results.iter()) {
        entry.destination = result.destination;
        entry.next_hop = result.next_hop;
        entry.distance = result.distance;
        if result.reachable {
            entry.state = PathState::Optimal;
            entry.valid = true;
        } else {
            entry.state = PathState::Unreachable;
            entry.valid = false;
        }
    }
}

/// Child of `root` on the tree path towards `dst_idx`: follow the parent chain from the
/// destination until the node whose parent is `root`. Correct also when the destination
/// is a direct tree neighbor.
fn tree_next_hop(
    root: usize,
    dst_idx: usize,
    parent: &[Option<usize>],
) -> Option<usize> {
    let mut current = dst_idx;
    loop {
        match parent.get(current).copied().flatten() {
            Some(p) if p == root => return Some(current),
            Some(p) => current = p,
            None => return None,
        }
    }
}

impl fmt::Display for RoutingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fmt_table())
    }
}
