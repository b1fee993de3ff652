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

//! Module containing the UDP datagram transport between mesh nodes.

use crate::transport::wire::{
    MessageType, PacketHeader, TransportError, HEADER_LEN, MAX_PACKET_SIZE, MAX_PAYLOAD,
    WIRE_VERSION,
};
use crate::transport::{node_ip, node_port};
use crate::types::NodeId;
use log::*;
use std::fmt;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-to-point and fan-out sender/receiver over one UDP socket.
///
/// The socket is non-blocking; [`receive`](Self::receive) returns `Ok(None)` when no
/// datagram is pending and the caller decides how long to back off. All statistics are
/// plain counters updated on the fast path; a stale read is acceptable.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    my_node_id: NodeId,
    port: u16,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    errors: AtomicU64,
}

/// Consistent copy of the transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Number of datagrams sent.
    pub packets_sent: u64,
    /// Number of datagrams received.
    pub packets_received: u64,
    /// Number of bytes sent.
    pub bytes_sent: u64,
    /// Number of bytes received.
    pub bytes_received: u64,
    /// Number of send, receive and parse errors.
    pub errors: u64,
}

impl UdpTransport {
    /// Bind the node's socket on `0.0.0.0:5000+id` and switch it to non-blocking mode.
    pub fn bind(my_node_id: NodeId) -> Result<Self, TransportError> {
        let port = node_port(my_node_id);
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_nonblocking(true)?;
        info!("Node {} listening on 0.0.0.0:{}", my_node_id, port);
        Ok(Self {
            socket,
            my_node_id,
            port,
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    /// The node id this transport sends as.
    pub fn my_node_id(&self) -> NodeId {
        self.my_node_id
    }

    /// The UDP port the socket is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send one datagram to `dst`. The sequence number is derived from the sent-packet
    /// counter and wraps at 2^16. Returns the number of bytes handed to the socket.
    pub fn send(
        &self,
        dst: NodeId,
        msg_type: MessageType,
        payload: &[u8],
        tx_timestamp_us: u64,
    ) -> Result<usize, TransportError> {
        if payload.len() > MAX_PAYLOAD {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::PayloadTooLarge(payload.len(), MAX_PAYLOAD));
        }

        let header = PacketHeader {
            version: WIRE_VERSION,
            msg_type,
            src: self.my_node_id,
            dst,
            sequence: (self.packets_sent.load(Ordering::Relaxed) & 0xFFFF) as u16,
            payload_len: payload.len() as u16,
            tx_timestamp_us,
        };

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let mut head = [0u8; HEADER_LEN];
        header.write_to(&mut head);
        buffer[..HEADER_LEN].copy_from_slice(&head);
        buffer[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
        let total_len = HEADER_LEN + payload.len();

        let dst_addr = SocketAddr::from(SocketAddrV4::new(node_ip(dst), node_port(dst)));
        match self.socket.send_to(&buffer[..total_len], dst_addr) {
            Ok(sent) => {
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
                Ok(sent)
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Io(e))
            }
        }
    }

    /// Send the same message to every peer in `1..=num_nodes` except ourselves. Returns
    /// the number of peers the datagram was handed to; individual failures are counted
    /// and logged, never propagated.
    pub fn broadcast(
        &self,
        msg_type: MessageType,
        payload: &[u8],
        num_nodes: usize,
        tx_timestamp_us: u64,
    ) -> usize {
        let mut sent_count = 0;
        for peer in 1..=num_nodes as u8 {
            if peer == self.my_node_id {
                continue;
            }
            match self.send(peer, msg_type, payload, tx_timestamp_us) {
                Ok(_) => sent_count += 1,
                Err(e) => trace!("broadcast to node {} failed: {}", peer, e),
            }
        }
        sent_count
    }

    /// Try to receive one datagram. Returns `Ok(None)` when nothing is pending. Malformed
    /// datagrams (short, bad version, unknown type, truncated payload) are counted and
    /// reported as errors; the caller drops them and keeps polling.
    pub fn receive(&self) -> Result<Option<(PacketHeader, Vec<u8>)>, TransportError> {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let received = match self.socket.recv_from(&mut buffer) {
            Ok((n, _)) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                return Err(TransportError::Io(e));
            }
        };

        let header = match PacketHeader::read_from(&buffer[..received]) {
            Ok(header) => header,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let payload_len = header.payload_len as usize;
        if received < HEADER_LEN + payload_len {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::Truncated(payload_len, received - HEADER_LEN));
        }

        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(received as u64, Ordering::Relaxed);

        Ok(Some((header, buffer[HEADER_LEN..HEADER_LEN + payload_len].to_vec())))
    }

    /// Current counter values.
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for TransportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent: {} packets / {} bytes, received: {} packets / {} bytes, errors: {}",
            self.packets_sent, self.bytes_sent, self.packets_received, self.bytes_received,
            self.errors
        )
    }
}
