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

//! # Data Streaming
//!
//! Chunk-fragmentation of a byte blob over DATA packets. Each chunk carries its own
//! packed sub-header inside the datagram payload; the receiver reassembles chunks by
//! sequence number and tracks losses by the gaps it observes. Delivery is not reliable
//! and no retransmission exists; a lost chunk stays lost.

use crate::sync::monotonic_us;
use crate::transport::{MessageType, TransportError, UdpTransport};
use crate::types::NodeId;
use byteorder::{ByteOrder, LittleEndian};
use log::*;
use std::convert::TryFrom;
use std::sync::{Arc, Mutex};

/// Largest chunk payload; chosen to stay under the MTU together with both headers.
pub const MAX_CHUNK_SIZE: usize = 1400;

/// Largest blob a single stream can carry.
pub const MAX_STREAM_BUFFER: usize = 1024 * 1024;

/// Length of the packed stream sub-header in bytes.
pub const STREAM_HEADER_LEN: usize = 23;

/// Content classes a stream can announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// Video frames.
    Video = 1,
    /// Audio samples.
    Audio = 2,
    /// Opaque data.
    Data = 3,
}

impl TryFrom<u8> for StreamType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(Self::Video),
            2 => Ok(Self::Audio),
            3 => Ok(Self::Data),
            x => Err(x),
        }
    }
}

/// Packed sub-header carried in front of every chunk. All fields little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Sender-local stream identifier.
    pub stream_id: u32,
    /// Chunk index within the stream.
    pub sequence_number: u32,
    /// Total number of chunks of the stream.
    pub total_chunks: u32,
    /// Number of payload bytes in this chunk.
    pub chunk_size: u16,
    /// Announced content class.
    pub stream_type: StreamType,
    /// Sender clock at chunk send time, microseconds.
    pub timestamp_us: u64,
}

impl StreamHeader {
    /// Serialize into the first [`STREAM_HEADER_LEN`] bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8; STREAM_HEADER_LEN]) {
        LittleEndian::write_u32(&mut buf[0..4], self.stream_id);
        LittleEndian::write_u32(&mut buf[4..8], self.sequence_number);
        LittleEndian::write_u32(&mut buf[8..12], self.total_chunks);
        LittleEndian::write_u16(&mut buf[12..14], self.chunk_size);
        buf[14] = self.stream_type as u8;
        LittleEndian::write_u64(&mut buf[15..23], self.timestamp_us);
    }

    /// Parse from the start of a DATA payload. Returns `None` when the payload is too
    /// short or announces an unknown stream type.
    pub fn read_from(buf: &[u8]) -> Option<Self> {
        if buf.len() < STREAM_HEADER_LEN {
            return None;
        }
        Some(Self {
            stream_id: LittleEndian::read_u32(&buf[0..4]),
            sequence_number: LittleEndian::read_u32(&buf[4..8]),
            total_chunks: LittleEndian::read_u32(&buf[8..12]),
            chunk_size: LittleEndian::read_u16(&buf[12..14]),
            stream_type: StreamType::try_from(buf[14]).ok()?,
            timestamp_us: LittleEndian::read_u64(&buf[15..23]),
        })
    }
}

/// Counters of one streaming direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Identifier of the stream the counters belong to.
    pub stream_id: u32,
    /// Total number of payload bytes.
    pub total_bytes: u64,
    /// Chunks handed to the transport.
    pub chunks_sent: u32,
    /// Chunks received and placed into the buffer.
    pub chunks_received: u32,
    /// Chunks presumed lost (sequence gaps).
    pub chunks_lost: u32,
    /// Start of the transfer, milliseconds.
    pub start_time_ms: u64,
    /// End of the transfer, milliseconds.
    pub end_time_ms: u64,
}

#[derive(Debug, Default)]
struct RxState {
    stream_id: u32,
    total_chunks: u32,
    buffer: Vec<u8>,
    highest_sequence: Option<u32>,
    stats: StreamStats,
}

/// Chunked sender and reassembling receiver over one transport.
#[derive(Debug)]
pub struct DataStreaming {
    my_node_id: NodeId,
    transport: Arc<UdpTransport>,
    next_stream_id: Mutex<u32>,
    tx_stats: Mutex<StreamStats>,
    rx: Mutex<RxState>,
}

impl DataStreaming {
    /// Create a streaming endpoint on top of the given transport.
    pub fn new(my_node_id: NodeId, transport: Arc<UdpTransport>) -> Self {
        Self {
            my_node_id,
            transport,
            next_stream_id: Mutex::new(1),
            tx_stats: Mutex::new(StreamStats::default()),
            rx: Mutex::new(RxState::default()),
        }
    }

    /// Fragment `data` into chunks and send them to `destination` as DATA packets.
    /// Returns the per-stream statistics of the transfer. Chunks that fail to send are
    /// counted by the transport and skipped; the stream itself keeps going.
    pub fn send(
        &self,
        destination: NodeId,
        data: &[u8],
        stream_type: StreamType,
    ) -> Result<StreamStats, TransportError> {
        if data.len() > MAX_STREAM_BUFFER {
            return Err(TransportError::PayloadTooLarge(data.len(), MAX_STREAM_BUFFER));
        }

        let stream_id = {
            let mut next = self.next_stream_id.lock().unwrap();
            let id = *next;
            *next = next.wrapping_add(1);
            id
        };
        let total_chunks = (data.len() + MAX_CHUNK_SIZE - 1) / MAX_CHUNK_SIZE;

        let mut stats = StreamStats {
            stream_id,
            total_bytes: data.len() as u64,
            start_time_ms: monotonic_us() / 1000,
            ..StreamStats::default()
        };

        let mut packet = Vec::with_capacity(STREAM_HEADER_LEN + MAX_CHUNK_SIZE);
        for (sequence, chunk) in data.chunks(MAX_CHUNK_SIZE).enumerate() {
            let header = StreamHeader {
                stream_id,
                sequence_number: sequence as u32,
                total_chunks: total_chunks as u32,
                chunk_size: chunk.len() as u16,
                stream_type,
                timestamp_us: monotonic_us(),
            };
            let mut head = [0u8; STREAM_HEADER_LEN];
            header.write_to(&mut head);
            packet.clear();
            packet.extend_from_slice(&head);
            packet.extend_from_slice(chunk);

            match self.transport.send(destination, MessageType::Data, &packet, monotonic_us()) {
                Ok(_) => stats.chunks_sent += 1,
                Err(e) => debug!("chunk {}/{} dropped: {}", sequence, total_chunks, e),
            }
        }

        stats.end_time_ms = monotonic_us() / 1000;
        info!(
            "Node {}: stream {} to node {}: {} bytes in {} chunks",
            self.my_node_id, stream_id, destination, data.len(), stats.chunks_sent
        );
        *self.tx_stats.lock().unwrap() = stats;
        Ok(stats)
    }

    /// Feed the payload of a received DATA packet into the reassembly buffer. Malformed
    /// sub-frames are dropped. A new stream id resets the buffer.
    pub fn on_data_packet(&self, payload: &[u8]) {
        let header = match StreamHeader::read_from(payload) {
            Some(header) => header,
            None => {
                debug!("dropping malformed stream chunk ({} bytes)", payload.len());
                return;
            }
        };
        let chunk = &payload[STREAM_HEADER_LEN..];
        if chunk.len() < header.chunk_size as usize {
            debug!("dropping truncated stream chunk {}", header.sequence_number);
            return;
        }
        let chunk = &chunk[..header.chunk_size as usize];

        let mut rx = self.rx.lock().unwrap();
        if rx.stream_id != header.stream_id {
            *rx = RxState {
                stream_id: header.stream_id,
                total_chunks: header.total_chunks,
                buffer: Vec::new(),
                highest_sequence: None,
                stats: StreamStats {
                    stream_id: header.stream_id,
                    start_time_ms: monotonic_us() / 1000,
                    ..StreamStats::default()
                },
            };
        }

        let offset = header.sequence_number as usize * MAX_CHUNK_SIZE;
        let end = offset + chunk.len();
        if end > MAX_STREAM_BUFFER {
            debug!("dropping out-of-bounds stream chunk {}", header.sequence_number);
            return;
        }
        if rx.buffer.len() < end {
            rx.buffer.resize(end, 0);
        }
        rx.buffer[offset..end].copy_from_slice(chunk);

        // a sequence jump of more than one means the chunks in between are gone
        if let Some(highest) = rx.highest_sequence {
            if header.sequence_number > highest + 1 {
                rx.stats.chunks_lost += header.sequence_number - highest - 1;
            }
        } else if header.sequence_number > 0 {
            rx.stats.chunks_lost += header.sequence_number;
        }
        if rx.highest_sequence.map_or(true, |h| header.sequence_number > h) {
            rx.highest_sequence = Some(header.sequence_number);
        }

        rx.stats.chunks_received += 1;
        rx.stats.total_bytes += chunk.len() as u64;
        rx.stats.end_time_ms = monotonic_us() / 1000;
    }

    /// Whether all chunks of the current incoming stream have arrived.
    pub fn rx_complete(&self) -> bool {
        let rx = self.rx.lock().unwrap();
        rx.total_chunks > 0 && rx.stats.chunks_received >= rx.total_chunks
    }

    /// Take the reassembled blob of the current incoming stream, resetting the receiver.
    pub fn take_received(&self) -> Option<Vec<u8>> {
        let mut rx = self.rx.lock().unwrap();
        if rx.total_chunks == 0 || rx.stats.chunks_received < rx.total_chunks {
            return None;
        }
        let buffer = std::mem::take(&mut rx.buffer);
        *rx = RxState::default();
        Some(buffer)
    }

    /// Statistics of the last outgoing stream.
    pub fn tx_stats(&self) -> StreamStats {
        *self.tx_stats.lock().unwrap()
    }

    /// Statistics of the current incoming stream.
    pub fn rx_stats(&self) -> StreamStats {
        self.rx.lock().unwrap().stats
    }
}

/// Deterministic synthetic payload for streaming tests and demos.
pub fn generate_frame(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stream_header_survives_the_codec() {
        let header = StreamHeader {
            stream_id: 7,
            sequence_number: 42,
            total_chunks: 100,
            chunk_size: 1400,
            stream_type: StreamType::Video,
            timestamp_us: 1_000_000,
        };
        let mut buf = [0u8; STREAM_HEADER_LEN];
        header.write_to(&mut buf);
        assert_eq!(StreamHeader::read_from(&buf), Some(header));
    }

    #[test]
    fn short_sub_frames_are_rejected() {
        assert_eq!(StreamHeader::read_from(&[0u8; 10]), None);
    }

    #[test]
    fn unknown_stream_types_are_rejected() {
        let header = StreamHeader {
            stream_id: 1,
            sequence_number: 0,
            total_chunks: 1,
            chunk_size: 0,
            stream_type: StreamType::Data,
            timestamp_us: 0,
        };
        let mut buf = [0u8; STREAM_HEADER_LEN];
        header.write_to(&mut buf);
        buf[14] = 9;
        assert_eq!(StreamHeader::read_from(&buf), None);
    }

    #[test]
    fn generated_frames_are_deterministic() {
        assert_eq!(generate_frame(4), vec![0, 1, 2, 3]);
        assert_eq!(generate_frame(300)[251], 0);
    }
}
