use std::path::PathBuf;
use std::sync::Arc;

use anyhow::ensure;
use clap::Parser;
use config::{Environment, File};
use itertools::Itertools;
use tracing::info;

use gossip_membership::address::Address;
use gossip_membership::collaborator::{Clock, RoundClock};
use gossip_membership::config::MembershipConfig;
use gossip_membership::engine::MembershipEngine;
use gossip_membership::ext::init_logger_with_filter;
use gossip_membership::network::ChannelNetwork;
use gossip_membership::runtime::{spawn_node, NodeHandle, NodeView};
use gossip_membership::selector::RandomSelector;

/// Runs a whole group in one process over an in-memory network.
#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long, default_value_t = 10)]
    nodes: u32,
    #[arg(short, long, default_value_t = 100)]
    rounds: u64,
    /// Overrides `tick_interval_ms` from the configuration.
    #[arg(long)]
    tick_ms: Option<u64>,
    /// Overrides `fanout` from the configuration.
    #[arg(long)]
    fanout: Option<usize>,
    /// Index of a node to crash during the run.
    #[arg(long)]
    crash: Option<u32>,
    #[arg(long, default_value_t = 50)]
    crash_at: u64,
    #[arg(long, default_value_t = 0.0)]
    drop_rate: f64,
    #[arg(long, default_value_t = 233)]
    seed: u64,
    /// Log every live node's membership view every N rounds, 0 disables.
    #[arg(long, default_value_t = 10)]
    dump_every: u64,
    /// Extra configuration file layered over the defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "gossip_membership=info,simulate=info")]
    log: String,
}

fn load_config(args: &Args) -> anyhow::Result<MembershipConfig> {
    let mut builder = MembershipConfig::builder();
    if let Some(path) = &args.config {
        builder = builder.add_source(File::from(path.as_path()));
    }
    builder = builder.add_source(Environment::with_prefix("GOSSIP"));
    if let Some(tick_ms) = args.tick_ms {
        builder = builder.set_override("tick_interval_ms", tick_ms)?;
    }
    if let Some(fanout) = args.fanout {
        builder = builder.set_override("fanout", fanout as u64)?;
    }
    builder.build()
}

fn dump_views(round: u64, nodes: &[Option<NodeHandle>]) {
    info!("membership at round {}", round);
    for node in nodes.iter().flatten() {
        let NodeView { state, heartbeat, members } = node.view();
        info!(
            "  {} [{}] heartbeat {} members {{{}}}",
            node.address(),
            state,
            heartbeat,
            members.iter().join(", "),
        );
    }
}

fn node_address(index: u32) -> Address {
    if index == 0 {
        Address::default_introducer()
    } else {
        Address::new(index + 1, 0)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger_with_filter(args.log.as_str())?;
    ensure!(args.nodes >= 1, "at least one node is required");
    if let Some(crash) = args.crash {
        ensure!(crash < args.nodes, "crash index {} out of range", crash);
    }
    let config = load_config(&args)?;
    info!("simulating {} nodes with {:?}", args.nodes, config);

    let network = Arc::new(ChannelNetwork::with_drop_rate(args.drop_rate, args.seed));
    let clock: Arc<dyn Clock> = Arc::new(RoundClock::new(config.tick_interval()));
    let introducer = node_address(0);

    let mut nodes: Vec<Option<NodeHandle>> = Vec::new();
    for index in 0..args.nodes {
        let address = node_address(index);
        let inbox = network.register(address);
        let engine = MembershipEngine::builder()
            .address(address)
            .config(config.clone())
            .transport(network.clone())
            .selector(Box::new(RandomSelector::seeded(args.seed.wrapping_add(index as u64))))
            .build();
        nodes.push(Some(spawn_node(engine, inbox, clock.clone(), introducer)));
    }

    let mut interval = tokio::time::interval(config.tick_interval());
    for round in 0..args.rounds {
        interval.tick().await;
        if args.crash.is_some() && round == args.crash_at {
            if let Some(node) = args.crash.and_then(|index| nodes[index as usize].take()) {
                let address = node.address();
                network.unregister(&address);
                let engine = node.stop().await?;
                info!("crashed {} at round {} with heartbeat {}", address, round, engine.heartbeat());
            }
        }
        if args.dump_every > 0 && (round + 1) % args.dump_every == 0 {
            dump_views(round + 1, &nodes);
        }
    }

    for node in nodes.into_iter().flatten() {
        let address = node.address();
        let engine = node.stop().await?;
        let stats = engine.stats();
        println!(
            "{} [{}] heartbeat {} members {{{}}} sent {} received {} malformed {}",
            address,
            engine.state(),
            engine.heartbeat(),
            engine.members().iter().join(", "),
            stats.sent,
            stats.received,
            stats.malformed,
        );
    }
    println!(
        "network delivered {} dropped {}",
        network.delivered(),
        network.dropped()
    );
    Ok(())
}
