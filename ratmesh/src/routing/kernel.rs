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

//! Module containing the best-effort kernel route installer.

use crate::routing::RouteEntry;
use crate::transport::node_ip;
use crate::types::NodeId;
use log::*;
use std::collections::HashMap;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Pushes the in-memory routing table into the kernel via `ip route`.
///
/// Installation is best-effort: a failing command bumps the error counter and the
/// in-memory table stays authoritative; the next recomputation simply retries. A cache
/// of what was last installed keeps unchanged routes from being re-issued.
#[derive(Debug)]
pub struct KernelRouteInstaller {
    my_node_id: NodeId,
    interface: String,
    installed: Mutex<HashMap<NodeId, (NodeId, u8)>>,
    route_adds: AtomicU64,
    route_deletes: AtomicU64,
    route_errors: AtomicU64,
}

impl KernelRouteInstaller {
    /// Create an installer operating on the given interface.
    pub fn new(my_node_id: NodeId, interface: &str) -> Self {
        Self {
            my_node_id,
            interface: interface.to_string(),
            installed: Mutex::new(HashMap::new()),
            route_adds: AtomicU64::new(0),
            route_deletes: AtomicU64::new(0),
            route_errors: AtomicU64::new(0),
        }
    }

    /// Mirror the given routing table into the kernel: install or replace every valid
    /// non-self entry whose next hop or metric changed, delete routes that lost their
    /// entry. Never fails; individual command failures are counted.
    pub fn apply(&self, table: &[RouteEntry]) {
        let mut installed = self.installed.lock().unwrap();

        for entry in table {
            if entry.destination == self.my_node_id {
                continue;
            }
            if entry.valid {
                let wanted = (entry.next_hop, entry.distance);
                if installed.get(&entry.destination) == Some(&wanted) {
                    continue;
                }
                if self.replace_route(entry.destination, entry.next_hop, entry.distance) {
                    installed.insert(entry.destination, wanted);
                }
            } else if installed.remove(&entry.destination).is_some() {
                self.delete_route(entry.destination);
            }
        }
    }

    /// Remove every route this installer put into the kernel.
    pub fn flush(&self) {
        let mut installed = self.installed.lock().unwrap();
        for destination in installed.keys().copied().collect::<Vec<_>>() {
            self.delete_route(destination);
        }
        installed.clear();
    }

    /// Number of successful route installations.
    pub fn route_adds(&self) -> u64 {
        self.route_adds.load(Ordering::Relaxed)
    }

    /// Number of route deletions issued.
    pub fn route_deletes(&self) -> u64 {
        self.route_deletes.load(Ordering::Relaxed)
    }

    /// Number of failed `ip route` invocations.
    pub fn route_errors(&self) -> u64 {
        self.route_errors.load(Ordering::Relaxed)
    }

    fn replace_route(&self, destination: NodeId, gateway: NodeId, metric: u8) -> bool {
        let dst_ip = format!("{}/32", node_ip(destination));
        let gw_ip = node_ip(gateway).to_string();
        let status = Command::new("ip")
            .args(&[
                "route",
                "replace",
                &dst_ip,
                "via",
                &gw_ip,
                "dev",
                &self.interface,
                "metric",
                &metric.to_string(),
            ])
            .output();
        match status {
            Ok(output) if output.status.success() => {
                self.route_adds.fetch_add(1, Ordering::Relaxed);
                debug!("Installed route to {} via {} (metric {})", destination, gateway, metric);
                true
            }
            Ok(output) => {
                self.route_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "ip route replace for node {} failed: {}",
                    destination,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(e) => {
                self.route_errors.fetch_add(1, Ordering::Relaxed);
                warn!("cannot run ip route for node {}: {}", destination, e);
                false
            }
        }
    }

    fn delete_route(&self, destination: NodeId) {
        let dst_ip = format!("{}/32", node_ip(destination));
        let status = Command::new("ip")
            .args(&["route", "del", &dst_ip, "dev", &self.interface])
            .output();
        match status {
            Ok(output) if output.status.success() => {
                self.route_deletes.fetch_add(1, Ordering::Relaxed);
                debug!("Removed route to {}", destination);
            }
            Ok(output) => {
                self.route_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "ip route del for node {} failed: {}",
                    destination,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                self.route_errors.fetch_add(1, Ordering::Relaxed);
                warn!("cannot run ip route for node {}: {}", destination, e);
            }
        }
    }
}
