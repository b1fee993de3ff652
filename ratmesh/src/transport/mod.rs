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

//! # Transport
//!
//! Point-to-point and fan-out datagram transport between mesh nodes, plus the packed
//! wire header all messages share. Node `k` listens on UDP port `5000 + k` and is
//! reachable at the address `192.168.2.(10 + k)`; the rest of the crate only ever deals
//! in node ids.

mod udp;
mod wire;

pub use udp::{TransportStats, UdpTransport};
pub use wire::{
    MessageType, PacketHeader, TransportError, HEADER_LEN, MAX_PACKET_SIZE, MAX_PAYLOAD,
    WIRE_VERSION,
};

use crate::types::NodeId;
use std::net::Ipv4Addr;

/// First UDP port of the mesh; node `k` binds `UDP_PORT_BASE + k`.
pub const UDP_PORT_BASE: u16 = 5000;

/// IPv4 address of the given node.
pub fn node_ip(node: NodeId) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 2, 10 + node)
}

/// UDP port of the given node.
pub fn node_port(node: NodeId) -> u16 {
    UDP_PORT_BASE + u16::from(node)
}
