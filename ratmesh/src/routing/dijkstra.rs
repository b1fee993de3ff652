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

//! Module containing the hop-count shortest-path engine.

use crate::topology::ConnectivityMatrix;
use crate::types::{NodeId, INFINITY_COST, MAX_NODES, NO_NEXT_HOP};
use thiserror::Error;

/// Routing computation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// The requested source node is not part of the topology snapshot
    #[error("Source node {0} not found in topology")]
    InvalidSource(NodeId),
}

/// Shortest-path result for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathResult {
    /// The destination node.
    pub destination: NodeId,
    /// First intermediate node on the path from the source (the source itself for the
    /// source's own entry, [`NO_NEXT_HOP`] when unreachable).
    pub next_hop: NodeId,
    /// Hop count, [`INFINITY_COST`] when unreachable.
    pub distance: u8,
    /// Whether a path exists.
    pub reachable: bool,
}

/// Run Dijkstra with unit edge weights from `src` over the snapshot, producing one
/// [`PathResult`] per slot position. Equal-cost ties resolve to the lowest slot position.
/// Fails with [`RoutingError::InvalidSource`] if `src` is not part of the snapshot.
pub fn shortest_paths(
    src: NodeId,
    topology: &ConnectivityMatrix,
) -> Result<Vec<PathResult>, RoutingError> {
    let num_nodes = topology.num_nodes();
    let src_idx = topology.index_of(src).ok_or(RoutingError::InvalidSource(src))?;

    let mut distance = [INFINITY_COST; MAX_NODES];
    let mut previous: [Option<usize>; MAX_NODES] = [None; MAX_NODES];
    let mut visited = [false; MAX_NODES];
    distance[src_idx] = 0;

    for _ in 0..num_nodes {
        // unvisited node with the smallest distance; the upward scan settles ties on the
        // lowest slot position
        let mut u = None;
        let mut min = INFINITY_COST;
        for i in 0..num_nodes {
            if !visited[i] && distance[i] < min {
                min = distance[i];
                u = Some(i);
            }
        }
        let u = match u {
            Some(u) => u,
            None => break, // everything left is unreachable
        };
        visited[u] = true;

        for v in 0..num_nodes {
            if topology.connected(u, v) && !visited[v] {
                let alt = u16::from(distance[u]) + 1;
                if alt < u16::from(distance[v]) {
                    distance[v] = alt as u8;
                    previous[v] = Some(u);
                }
            }
        }
    }

    let node_ids = topology.node_ids();
    let results = (0..num_nodes)
        .map(|i| {
            let reachable = distance[i] != INFINITY_COST;
            let next_hop = if i == src_idx {
                node_ids[i]
            } else if reachable {
                first_hop(src_idx, i, &previous, node_ids)
            } else {
                NO_NEXT_HOP
            };
            PathResult { destination: node_ids[i], next_hop, distance: distance[i], reachable }
        })
        .collect();

    Ok(results)
}

/// Walk the predecessor chain back from `dst_idx` to the node right after the source.
fn first_hop(
    src_idx: usize,
    dst_idx: usize,
    previous: &[Option<usize>; MAX_NODES],
    node_ids: &[NodeId],
) -> NodeId {
    let mut current = dst_idx;
    loop {
        match previous[current] {
            Some(prev) if prev == src_idx => return node_ids[current],
            Some(prev) => current = prev,
            None => return NO_NEXT_HOP,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn source_must_be_part_of_the_snapshot() {
        let topo = ConnectivityMatrix::full_mesh(&[1, 2, 3]);
        assert_eq!(shortest_paths(9, &topo), Err(RoutingError::InvalidSource(9)));
    }

    #[test]
    fn the_source_routes_to_itself() {
        let topo = ConnectivityMatrix::full_mesh(&[1, 2, 3]);
        let results = shortest_paths(2, &topo).unwrap();
        assert_eq!(
            results[1],
            PathResult { destination: 2, next_hop: 2, distance: 0, reachable: true }
        );
    }

    #[test]
    fn same_snapshot_computes_identical_tables() {
        let mut topo = ConnectivityMatrix::full_mesh(&[1, 2, 3, 4, 5]);
        topo.set_link(0, 3, 0);
        topo.set_link(1, 4, 0);
        let first = shortest_paths(1, &topo).unwrap();
        let second = shortest_paths(1, &topo).unwrap();
        assert_eq!(first, second);
    }
}
