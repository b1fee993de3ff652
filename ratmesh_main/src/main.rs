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

use clap::Parser;
use log::*;
use ratmesh::node::MeshNode;
use ratmesh::{Error, RoutingStrategy, MAX_NODES};
use std::convert::TryFrom;
use std::thread;
use std::time::Duration;

/// TDMA mesh node daemon
#[derive(Parser, Debug)]
#[command(name = "ratmesh", about = "Slot-synchronized TDMA mesh node daemon")]
struct Args {
    /// Id of this node (1-255)
    node_id: u8,
    /// Number of nodes in the mesh (2-20)
    total_nodes: usize,
    /// Routing strategy: 0 = Dijkstra, 1 = MST, 2 = Hybrid
    strategy: u8,
    /// Export the routing timing metrics to this CSV file on shutdown
    #[arg(long)]
    metrics_csv: Option<String>,
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Error> {
    if args.node_id == 0 {
        return Err(Error::MalformedConfig("node_id must be at least 1".to_string()));
    }
    if !(2..=MAX_NODES).contains(&args.total_nodes) {
        return Err(Error::MalformedConfig(format!(
            "total_nodes must be in 2..={}, got {}",
            MAX_NODES, args.total_nodes
        )));
    }
    let strategy = RoutingStrategy::try_from(args.strategy)
        .map_err(|x| Error::MalformedConfig(format!("unknown strategy {}", x)))?;

    info!(
        "Starting node {} of {} (strategy {})",
        args.node_id, args.total_nodes, strategy
    );

    let node = MeshNode::new(args.node_id, args.total_nodes, strategy)?;

    // SIGINT and SIGTERM both request a clean shutdown
    let stop = node.stop_signal();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Caught termination signal, stopping");
        stop.send_stop();
    }) {
        warn!("Cannot install signal handler: {}", e);
    }

    node.start();

    let stop = node.stop_signal();
    let mut ticks = 0u64;
    while !stop.is_stop() {
        thread::sleep(Duration::from_secs(1));
        ticks += 1;
        if ticks % 10 == 0 {
            info!("\n{}", node.fmt_status());
        }
    }

    node.stop();

    if let Some(path) = args.metrics_csv.as_ref() {
        node.routing().export_metrics_csv(path)?;
        info!("Metrics written to {}", path);
    }

    info!("Node {} exited cleanly", args.node_id);
    Ok(())
}
