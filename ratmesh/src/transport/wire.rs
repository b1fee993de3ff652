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

//! Module containing the packed wire header and its codec.

use crate::types::NodeId;
use byteorder::{ByteOrder, LittleEndian};
use std::convert::TryFrom;
use thiserror::Error;

/// Protocol version carried in every header.
pub const WIRE_VERSION: u8 = 1;

/// Length of the packed header in bytes.
pub const HEADER_LEN: usize = 16;

/// Maximum datagram size.
pub const MAX_PACKET_SIZE: usize = 1500;

/// Maximum payload a single datagram can carry.
pub const MAX_PAYLOAD: usize = MAX_PACKET_SIZE - HEADER_LEN;

/// Transport errors. Per-packet errors are counted and the packet dropped; they never
/// abort a worker thread.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket operation failed
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
    /// The datagram is shorter than the header
    #[error("Packet too small: {0} bytes")]
    PacketTooSmall(usize),
    /// The header carries an unsupported protocol version
    #[error("Unsupported protocol version: {0}")]
    BadVersion(u8),
    /// The header carries an unknown message type
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),
    /// The payload exceeds what a datagram can carry
    #[error("Payload too large: {0} > {1}")]
    PayloadTooLarge(usize, usize),
    /// The datagram is shorter than the header announces
    #[error("Incomplete packet: header announces {0} payload bytes, got {1}")]
    Truncated(usize, usize),
}

/// Message types on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Keep-alive between nodes, payload-free in all but name.
    Heartbeat = 1,
    /// Connectivity matrix update notification.
    TopologyUpdate = 2,
    /// Application data (streaming sub-frames).
    Data = 3,
    /// Request for a route.
    RoutingRequest = 4,
    /// Response carrying a next hop.
    RoutingResponse = 5,
}

impl TryFrom<u8> for MessageType {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, TransportError> {
        match value {
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::TopologyUpdate),
            3 => Ok(Self::Data),
            4 => Ok(Self::RoutingRequest),
            5 => Ok(Self::RoutingResponse),
            x => Err(TransportError::UnknownMessageType(x)),
        }
    }
}

/// Fixed-layout datagram header. All multi-byte fields are little-endian.
///
/// ```text
/// offset  0        1        2        3        4..6       6..8          8..16
/// field   version  type     src      dst      sequence   payload_len   tx_timestamp_us
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Protocol version, always [`WIRE_VERSION`].
    pub version: u8,
    /// Message type.
    pub msg_type: MessageType,
    /// Sender node id.
    pub src: NodeId,
    /// Receiver node id.
    pub dst: NodeId,
    /// Sender-local sequence number, wrapping at 2^16.
    pub sequence: u16,
    /// Number of payload bytes following the header.
    pub payload_len: u16,
    /// Sender's monotonic clock at send time, microseconds.
    pub tx_timestamp_us: u64,
}

impl PacketHeader {
    /// Serialize the header into the first [`HEADER_LEN`] bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8; HEADER_LEN]) {
        buf[0] = self.version;
        buf[1] = self.msg_type as u8;
        buf[2] = self.src;
        buf[3] = self.dst;
        LittleEndian::write_u16(&mut buf[4..6], self.sequence);
        LittleEndian::write_u16(&mut buf[6..8], self.payload_len);
        LittleEndian::write_u64(&mut buf[8..16], self.tx_timestamp_us);
    }

    /// Parse a header from the start of a received datagram.
    pub fn read_from(buf: &[u8]) -> Result<Self, TransportError> {
        if buf.len() < HEADER_LEN {
            return Err(TransportError::PacketTooSmall(buf.len()));
        }
        if buf[0] != WIRE_VERSION {
            return Err(TransportError::BadVersion(buf[0]));
        }
        Ok(Self {
            version: buf[0],
            msg_type: MessageType::try_from(buf[1])?,
            src: buf[2],
            dst: buf[3],
            sequence: LittleEndian::read_u16(&buf[4..6]),
            payload_len: LittleEndian::read_u16(&buf[6..8]),
            tx_timestamp_us: LittleEndian::read_u64(&buf[8..16]),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn header() -> PacketHeader {
        PacketHeader {
            version: WIRE_VERSION,
            msg_type: MessageType::Heartbeat,
            src: 3,
            dst: 7,
            sequence: 0xBEEF,
            payload_len: 1,
            tx_timestamp_us: 123_456_789_012,
        }
    }

    #[test]
    fn header_layout_is_fixed_and_little_endian() {
        let mut buf = [0u8; HEADER_LEN];
        header().write_to(&mut buf);
        assert_eq!(buf[0], 1);
        assert_eq!(buf[1], 1);
        assert_eq!(buf[2], 3);
        assert_eq!(buf[3], 7);
        assert_eq!(&buf[4..6], &[0xEF, 0xBE]);
        assert_eq!(&buf[6..8], &[0x01, 0x00]);
        assert_eq!(LittleEndian::read_u64(&buf[8..16]), 123_456_789_012);
        let parsed = PacketHeader::read_from(&buf).unwrap();
        assert_eq!(parsed, header());
    }

    #[test]
    fn short_packets_are_rejected() {
        let buf = [1u8; 4];
        match PacketHeader::read_from(&buf) {
            Err(TransportError::PacketTooSmall(4)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut buf = [0u8; HEADER_LEN];
        header().write_to(&mut buf);
        buf[0] = 2;
        match PacketHeader::read_from(&buf) {
            Err(TransportError::BadVersion(2)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unknown_message_types_are_rejected() {
        let mut buf = [0u8; HEADER_LEN];
        header().write_to(&mut buf);
        buf[1] = 99;
        match PacketHeader::read_from(&buf) {
            Err(TransportError::UnknownMessageType(99)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
