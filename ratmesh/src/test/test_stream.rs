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

use crate::stream::{
    generate_frame, DataStreaming, StreamHeader, StreamType, MAX_CHUNK_SIZE, STREAM_HEADER_LEN,
};
use crate::transport::UdpTransport;
use crate::types::NodeId;
use std::sync::Arc;

/// Build the on-wire DATA payload of one chunk.
fn chunk_payload(stream_id: u32, sequence: u32, total: u32, chunk: &[u8]) -> Vec<u8> {
    let header = StreamHeader {
        stream_id,
        sequence_number: sequence,
        total_chunks: total,
        chunk_size: chunk.len() as u16,
        stream_type: StreamType::Video,
        timestamp_us: 0,
    };
    let mut head = [0u8; STREAM_HEADER_LEN];
    header.write_to(&mut head);
    let mut payload = head.to_vec();
    payload.extend_from_slice(chunk);
    payload
}

fn endpoint(node: NodeId) -> DataStreaming {
    let transport = Arc::new(UdpTransport::bind(node).unwrap());
    DataStreaming::new(node, transport)
}

#[test]
fn chunks_reassemble_in_order() {
    let streaming = endpoint(17);
    let blob = generate_frame(MAX_CHUNK_SIZE + 100);

    streaming.on_data_packet(&chunk_payload(1, 0, 2, &blob[..MAX_CHUNK_SIZE]));
    assert!(!streaming.rx_complete());
    streaming.on_data_packet(&chunk_payload(1, 1, 2, &blob[MAX_CHUNK_SIZE..]));
    assert!(streaming.rx_complete());

    assert_eq!(streaming.take_received(), Some(blob));
    // taking the blob resets the receiver
    assert!(!streaming.rx_complete());
}

#[test]
fn sequence_gaps_count_as_losses() {
    let streaming = endpoint(18);
    let chunk = generate_frame(MAX_CHUNK_SIZE);

    streaming.on_data_packet(&chunk_payload(5, 0, 3, &chunk));
    streaming.on_data_packet(&chunk_payload(5, 2, 3, &chunk));

    let stats = streaming.rx_stats();
    assert_eq!(stats.chunks_received, 2);
    assert_eq!(stats.chunks_lost, 1);
    assert!(!streaming.rx_complete());
    assert_eq!(streaming.take_received(), None);
}

#[test]
fn malformed_chunks_are_dropped() {
    let streaming = endpoint(19);
    streaming.on_data_packet(&[0u8; 5]);
    assert_eq!(streaming.rx_stats().chunks_received, 0);
}
