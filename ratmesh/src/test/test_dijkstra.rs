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

use crate::routing::{shortest_paths, PathResult, RoutingError};
use crate::topology::ConnectivityMatrix;
use crate::types::{INFINITY_COST, NO_NEXT_HOP};

fn diamond() -> ConnectivityMatrix {
    // 1 - 2
    // |   |
    // 3 - 4
    let mut topo = ConnectivityMatrix::new(&[1, 2, 3, 4]);
    topo.set_link_ids(1, 2, 1);
    topo.set_link_ids(1, 3, 1);
    topo.set_link_ids(2, 4, 1);
    topo.set_link_ids(3, 4, 1);
    topo
}

#[test]
fn line_topology_from_node_1() {
    let topo = ConnectivityMatrix::chain(&[1, 2, 3, 4]);
    let results = shortest_paths(1, &topo).unwrap();

    assert_eq!(
        results[1],
        PathResult { destination: 2, next_hop: 2, distance: 1, reachable: true }
    );
    assert_eq!(
        results[2],
        PathResult { destination: 3, next_hop: 2, distance: 2, reachable: true }
    );
    assert_eq!(
        results[3],
        PathResult { destination: 4, next_hop: 2, distance: 3, reachable: true }
    );
}

#[test]
fn diamond_prefers_the_lowest_index_on_ties() {
    let results = shortest_paths(1, &diamond()).unwrap();

    // both 2 and 3 reach 4 in two hops; the tie goes to node 2
    assert_eq!(
        results[3],
        PathResult { destination: 4, next_hop: 2, distance: 2, reachable: true }
    );
}

#[test]
fn broken_link_reroutes_through_the_other_branch() {
    let mut topo = diamond();
    topo.set_link_ids(1, 2, 0);
    let results = shortest_paths(1, &topo).unwrap();

    assert_eq!(
        results[3],
        PathResult { destination: 4, next_hop: 3, distance: 2, reachable: true }
    );
    // node 2 is still reachable the long way around
    assert_eq!(
        results[1],
        PathResult { destination: 2, next_hop: 3, distance: 3, reachable: true }
    );
}

#[test]
fn disconnected_islands_are_unreachable() {
    // 1 - 2    3 - 4
    let mut topo = ConnectivityMatrix::new(&[1, 2, 3, 4]);
    topo.set_link_ids(1, 2, 1);
    topo.set_link_ids(3, 4, 1);
    let results = shortest_paths(1, &topo).unwrap();

    assert_eq!(
        results[1],
        PathResult { destination: 2, next_hop: 2, distance: 1, reachable: true }
    );
    for result in &results[2..] {
        assert!(!result.reachable);
        assert_eq!(result.next_hop, NO_NEXT_HOP);
        assert_eq!(result.distance, INFINITY_COST);
    }
}

#[test]
fn source_not_in_snapshot_is_an_error() {
    let topo = diamond();
    assert_eq!(shortest_paths(7, &topo), Err(RoutingError::InvalidSource(7)));
}

#[test]
fn results_are_stable_across_runs() {
    let topo = diamond();
    assert_eq!(shortest_paths(1, &topo).unwrap(), shortest_paths(1, &topo).unwrap());
    assert_eq!(shortest_paths(4, &topo).unwrap(), shortest_paths(4, &topo).unwrap());
}
