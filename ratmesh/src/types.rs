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

//! Module containing all type definitions

use std::convert::TryFrom;
use std::fmt;

/// Node identification. Valid node ids lie in `1..=num_nodes`; `0` means "no node" and
/// [`NO_NEXT_HOP`] marks the absence of a forwarding path.
pub type NodeId = u8;

/// Maximum number of nodes a mesh can contain.
pub const MAX_NODES: usize = 20;

/// Reserved node id meaning "none".
pub const NO_NODE: NodeId = 0;

/// Sentinel next hop returned when no forwarding path exists.
pub const NO_NEXT_HOP: NodeId = 0xFF;

/// Sentinel hop-count marking an unreachable destination. Real distances are capped one
/// below this value.
pub const INFINITY_COST: u8 = 255;

/// Selectable route computation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    /// Shortest path per destination (optimal).
    Dijkstra,
    /// Routes along the spanning tree (fast fallback).
    Mst,
    /// Dijkstra first, spanning tree for destinations Dijkstra cannot reach.
    Hybrid,
}

impl TryFrom<u8> for RoutingStrategy {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Self::Dijkstra),
            1 => Ok(Self::Mst),
            2 => Ok(Self::Hybrid),
            x => Err(x),
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dijkstra => write!(f, "DIJKSTRA"),
            Self::Mst => write!(f, "MST"),
            Self::Hybrid => write!(f, "HYBRID"),
        }
    }
}

/// State of a single routing table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// The entry follows a shortest path.
    Optimal,
    /// The entry follows the spanning tree instead of a shortest path.
    Fallback,
    /// The entry is being recomputed.
    Recomputing,
    /// The destination cannot be reached.
    Unreachable,
}

impl fmt::Display for PathState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimal => write!(f, "OPTIMAL"),
            Self::Fallback => write!(f, "FALLBACK"),
            Self::Recomputing => write!(f, "RECOMPUTING"),
            Self::Unreachable => write!(f, "UNREACHABLE"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strategy_from_cli_code() {
        assert_eq!(RoutingStrategy::try_from(0), Ok(RoutingStrategy::Dijkstra));
        assert_eq!(RoutingStrategy::try_from(1), Ok(RoutingStrategy::Mst));
        assert_eq!(RoutingStrategy::try_from(2), Ok(RoutingStrategy::Hybrid));
        assert_eq!(RoutingStrategy::try_from(3), Err(3));
    }
}
