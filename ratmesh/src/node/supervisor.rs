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

//! Module containing the mesh node supervisor and its worker threads.

use crate::error::Error;
use crate::routing::{KernelRouteInstaller, RoutingManager};
use crate::stream::DataStreaming;
use crate::sync::{monotonic_ms, monotonic_us, SlotScheduler};
use crate::topology::{ConnectivityMatrix, SpanningTree, TopologyRegistry};
use crate::transport::{MessageType, UdpTransport};
use crate::types::{NodeId, RoutingStrategy, MAX_NODES};
use crate::node::LivenessTable;
use crate::StopSignal;
use log::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A peer is declared dead after this many milliseconds without a packet.
pub const LIVENESS_TIMEOUT_MS: u64 = 5000;

/// How often the startup probe retries before giving up.
const NETWORK_PROBE_ATTEMPTS: usize = 15;

/// The heartbeat body carries no information; the header timestamp does.
const HEARTBEAT_PAYLOAD: u8 = 0xFF;

/// Interface the kernel routes are installed on.
const DEFAULT_INTERFACE: &str = "eth0";

#[derive(Debug, Default)]
struct Counters {
    heartbeats_sent: AtomicU64,
    heartbeats_received: AtomicU64,
    topology_updates: AtomicU64,
    packets_sent_in_slot: AtomicU64,
    malformed_packets: AtomicU64,
}

/// Snapshot of the supervisor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Heartbeat datagrams handed to the transport.
    pub heartbeats_sent: u64,
    /// Heartbeat datagrams received from peers.
    pub heartbeats_received: u64,
    /// Topology update messages received from peers.
    pub topology_updates: u64,
    /// Datagrams sent inside the own slot window.
    pub packets_sent_in_slot: u64,
    /// Datagrams dropped because they failed to parse.
    pub malformed_packets: u64,
}

#[derive(Debug)]
struct Shared {
    my_id: NodeId,
    total_nodes: usize,
    registry: TopologyRegistry,
    local_topology: Mutex<ConnectivityMatrix>,
    routing: RoutingManager,
    scheduler: SlotScheduler,
    transport: Arc<UdpTransport>,
    kernel_routes: KernelRouteInstaller,
    streaming: DataStreaming,
    liveness: LivenessTable,
    counters: Counters,
    last_pushed_version: AtomicU64,
}

/// # Mesh Node
///
/// One daemon instance: owns every component, spawns the transmitter and the receiver
/// thread and joins them again on [`stop`](Self::stop). The main thread keeps the
/// [`StopSignal`] and uses the accessors for periodic status output.
#[derive(Debug)]
pub struct MeshNode {
    shared: Arc<Shared>,
    stop: StopSignal,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MeshNode {
    /// Initialize a node: bind the transport, wait for the local network to come up,
    /// bootstrap the topology to a full mesh and wire up routing and slot scheduling.
    pub fn new(
        my_id: NodeId,
        total_nodes: usize,
        strategy: RoutingStrategy,
    ) -> Result<Self, Error> {
        if !(2..=MAX_NODES).contains(&total_nodes) {
            return Err(Error::MalformedConfig(format!(
                "total_nodes must be in 2..={}, got {}",
                MAX_NODES, total_nodes
            )));
        }
        if my_id == 0 || my_id as usize > total_nodes {
            return Err(Error::MalformedConfig(format!(
                "node_id must be in 1..={}, got {}",
                total_nodes, my_id
            )));
        }

        let node_ids: Vec<NodeId> = (1..=total_nodes as u8).collect();

        let transport = Arc::new(UdpTransport::bind(my_id)?);
        wait_for_network(&transport, my_id, total_nodes)?;

        // every pair starts out connected; the liveness sweep prunes links that never
        // produce heartbeats and restores them when they come back
        let topology = ConnectivityMatrix::full_mesh(&node_ids);
        let registry = TopologyRegistry::new(topology.clone());
        let mst = SpanningTree::compute(&topology);

        let scheduler = SlotScheduler::new(my_id, &node_ids, mst)?;
        let routing = RoutingManager::new(my_id, strategy);
        routing.update_topology(&topology);

        let streaming = DataStreaming::new(my_id, transport.clone());
        let liveness = LivenessTable::new(total_nodes, monotonic_ms());

        info!(
            "Node {} initialized: {} nodes, strategy {}",
            my_id, total_nodes, strategy
        );

        Ok(Self {
            shared: Arc::new(Shared {
                my_id,
                total_nodes,
                registry,
                local_topology: Mutex::new(topology),
                routing,
                scheduler,
                transport,
                kernel_routes: KernelRouteInstaller::new(my_id, DEFAULT_INTERFACE),
                streaming,
                liveness,
                counters: Counters::default(),
                last_pushed_version: AtomicU64::new(0),
            }),
            stop: StopSignal::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the transmitter and receiver threads. Calling this twice is a no-op.
    pub fn start(&self) {
        let mut handles = self.handles.lock().unwrap();
        if !handles.is_empty() {
            return;
        }

        let shared = self.shared.clone();
        let stop = self.stop.clone();
        handles.push(thread::spawn(move || transmitter_loop(shared, stop)));

        let shared = self.shared.clone();
        let stop = self.stop.clone();
        handles.push(thread::spawn(move || receiver_loop(shared, stop)));

        info!("Node {} started", self.shared.my_id);
    }

    /// Request shutdown, join both worker threads and flush the kernel routes.
    pub fn stop(&self) {
        self.stop.send_stop();
        let mut handles = self.handles.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
        self.shared.kernel_routes.flush();
        info!("Node {} stopped", self.shared.my_id);
    }

    /// Clonable handle that requests shutdown; hand this to the signal handler.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// This node's id.
    pub fn my_id(&self) -> NodeId {
        self.shared.my_id
    }

    /// The routing manager of this node.
    pub fn routing(&self) -> &RoutingManager {
        &self.shared.routing
    }

    /// The slot scheduler of this node.
    pub fn scheduler(&self) -> &SlotScheduler {
        &self.shared.scheduler
    }

    /// The streaming endpoint of this node.
    pub fn streaming(&self) -> &DataStreaming {
        &self.shared.streaming
    }

    /// Consistent copy of the current topology view.
    pub fn topology(&self) -> ConnectivityMatrix {
        self.shared.registry.get()
    }

    /// Snapshot of the supervisor counters.
    pub fn stats(&self) -> NodeStats {
        let c = &self.shared.counters;
        NodeStats {
            heartbeats_sent: c.heartbeats_sent.load(Ordering::Relaxed),
            heartbeats_received: c.heartbeats_received.load(Ordering::Relaxed),
            topology_updates: c.topology_updates.load(Ordering::Relaxed),
            packets_sent_in_slot: c.packets_sent_in_slot.load(Ordering::Relaxed),
            malformed_packets: c.malformed_packets.load(Ordering::Relaxed),
        }
    }

    /// Multi-line status report for periodic display.
    pub fn fmt_status(&self) -> String {
        let stats = self.stats();
        format!(
            "=== Node {} ===\n\
             Connectivity:\n{}\n\
             Slots:\n{}\n\
             Routing:\n{}\n\
             Transport: {}\n\
             Heartbeats: {} sent, {} received | topology updates: {} | dropped: {}\n",
            self.shared.my_id,
            self.shared.registry.get(),
            self.shared.scheduler.fmt_slots(),
            self.shared.routing.fmt_table(),
            self.shared.transport.stats(),
            stats.heartbeats_sent,
            stats.heartbeats_received,
            stats.topology_updates,
            stats.malformed_packets,
        )
    }
}

/// Probe the network by handing a heartbeat to the first peer, retrying once per second.
fn wait_for_network(
    transport: &UdpTransport,
    my_id: NodeId,
    total_nodes: usize,
) -> Result<(), Error> {
    // total_nodes >= 2, so a peer always exists
    let target = (1..=total_nodes as u8)
        .find(|p| *p != my_id)
        .ok_or(Error::NetworkNotReady(0))?;

    for attempt in 1..=NETWORK_PROBE_ATTEMPTS {
        match transport.send(target, MessageType::Heartbeat, &[HEARTBEAT_PAYLOAD], monotonic_us())
        {
            Ok(_) => {
                debug!("Network ready after {} probe(s)", attempt);
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "Network probe {}/{} failed: {}",
                    attempt, NETWORK_PROBE_ATTEMPTS, e
                );
                thread::sleep(Duration::from_secs(1));
            }
        }
    }
    Err(Error::NetworkNotReady(NETWORK_PROBE_ATTEMPTS))
}

fn transmitter_loop(shared: Arc<Shared>, stop: StopSignal) {
    let mut last_sweep_ms = monotonic_ms();

    while !stop.is_stop() {
        let now_ms = monotonic_ms();
        if now_ms.saturating_sub(last_sweep_ms) >= 1000 {
            check_timeouts(&shared, now_ms);
            last_sweep_ms = now_ms;
        }

        let version = shared.routing.topology_version();
        if shared.last_pushed_version.load(Ordering::Relaxed) != version {
            shared.kernel_routes.apply(&shared.routing.table());
            shared.last_pushed_version.store(version, Ordering::Relaxed);
        }

        // poll the slot predicate at 100 us granularity
        while !stop.is_stop() && !shared.scheduler.can_transmit() {
            thread::sleep(Duration::from_micros(100));
        }
        if stop.is_stop() {
            break;
        }

        shared.scheduler.calculate_slot_adjustment();

        let sent = shared.transport.broadcast(
            MessageType::Heartbeat,
            &[HEARTBEAT_PAYLOAD],
            shared.total_nodes,
            monotonic_us(),
        );
        shared.counters.heartbeats_sent.fetch_add(sent as u64, Ordering::Relaxed);
        shared.counters.packets_sent_in_slot.fetch_add(sent as u64, Ordering::Relaxed);

        // advance to the own slot of the next round
        sleep_interruptible(u64::from(shared.scheduler.time_until_my_slot_us()), &stop);
        shared.scheduler.on_round_end();
    }
}

fn receiver_loop(shared: Arc<Shared>, stop: StopSignal) {
    while !stop.is_stop() {
        match shared.transport.receive() {
            Ok(Some((header, payload))) => {
                let now_us = monotonic_us();
                match header.msg_type {
                    MessageType::Heartbeat => {
                        shared.counters.heartbeats_received.fetch_add(1, Ordering::Relaxed);
                    }
                    MessageType::TopologyUpdate => {
                        shared.counters.topology_updates.fetch_add(1, Ordering::Relaxed);
                    }
                    MessageType::Data => shared.streaming.on_data_packet(&payload),
                    MessageType::RoutingRequest | MessageType::RoutingResponse => {
                        trace!("ignoring routing control message from {}", header.src);
                    }
                }
                shared.scheduler.on_packet_received(header.src, header.tx_timestamp_us, now_us);
                shared.liveness.mark_alive(header.src, monotonic_ms());
            }
            Ok(None) => thread::sleep(Duration::from_millis(1)),
            Err(e) => {
                shared.counters.malformed_packets.fetch_add(1, Ordering::Relaxed);
                debug!("dropping packet: {}", e);
            }
        }
    }
}

/// Declare peers dead after [`LIVENESS_TIMEOUT_MS`] of silence and revive them as soon
/// as their packets reappear.
fn check_timeouts(shared: &Arc<Shared>, now_ms: u64) {
    for peer in 1..=shared.total_nodes as u8 {
        if peer == shared.my_id {
            continue;
        }
        let elapsed = match shared.liveness.elapsed_ms(peer, now_ms) {
            Some(elapsed) => elapsed,
            None => continue,
        };
        let connected =
            shared.local_topology.lock().unwrap().connected_ids(shared.my_id, peer);

        if elapsed > LIVENESS_TIMEOUT_MS && connected {
            warn!("Node {}: peer {} timed out after {} ms", shared.my_id, peer, elapsed);
            update_connectivity(shared, peer, false);
        } else if elapsed <= LIVENESS_TIMEOUT_MS && !connected {
            info!("Node {}: peer {} is reachable again", shared.my_id, peer);
            update_connectivity(shared, peer, true);
        }
    }
}

/// Flip the symmetric link to `peer`, publish the snapshot, rewire the spanning tree
/// into the scheduler and let the routing manager recompute.
fn update_connectivity(shared: &Arc<Shared>, peer: NodeId, alive: bool) {
    let snapshot = {
        let mut topology = shared.local_topology.lock().unwrap();
        if topology.connected_ids(shared.my_id, peer) == alive {
            return;
        }
        topology.set_link_ids(shared.my_id, peer, if alive { 1 } else { 0 });
        topology.clone()
    };

    shared.registry.set(snapshot.clone());
    shared.scheduler.set_spanning_tree(SpanningTree::compute(&snapshot));

    if shared.routing.update_topology(&snapshot) {
        shared.kernel_routes.apply(&shared.routing.table());
        shared
            .last_pushed_version
            .store(shared.routing.topology_version(), Ordering::Relaxed);
    }
}

/// Sleep in 100 us steps so the stop flag is observed quickly.
fn sleep_interruptible(total_us: u64, stop: &StopSignal) {
    let mut remaining_us = total_us;
    while remaining_us > 0 && !stop.is_stop() {
        let step = remaining_us.min(100);
        thread::sleep(Duration::from_micros(step));
        remaining_us -= step;
    }
}
