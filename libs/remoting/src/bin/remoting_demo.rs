//! Two-node remoting demo over the in-memory network
//!
//! Node A pings an actor on node B and waits for the pongs, then sends to a
//! path that does not exist on B (remote dead letter) and finally watches B
//! while it crashes (node down).

use addressing::NodeId;
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use node_config::NodeConfig;
use remoting::{ActorContext, Behavior, HubFactory, InMemoryNetwork, Message, Node, Protocol};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file shared by both nodes (node.nid is overridden)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node id of the pinging node
    #[arg(long, default_value = "127.0.0.1:9701")]
    client_nid: String,

    /// Node id of the node hosting the worker
    #[arg(long, default_value = "127.0.0.1:9702")]
    server_nid: String,

    /// Number of pings to send
    #[arg(short, long, default_value_t = 3)]
    pings: usize,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

/// Answers `("ping", reply_to)` with `("pong", myself)`
struct Worker;

#[async_trait]
impl Behavior for Worker {
    async fn receive(&mut self, ctx: &ActorContext, message: Message) -> anyhow::Result<()> {
        if let Message::Tuple(items) = &message {
            if let [Message::Str(tag), Message::Ref(reply_to)] = items.as_slice() {
                if tag == "ping" {
                    reply_to.tell(Message::tuple([
                        Message::from("pong"),
                        Message::from(ctx.myself().clone()),
                    ]));
                    return Ok(());
                }
            }
        }
        anyhow::bail!("unexpected message {:?}", message)
    }
}

/// Forwards everything it receives to the demo driver
struct Client(mpsc::UnboundedSender<Message>);

#[async_trait]
impl Behavior for Client {
    async fn receive(&mut self, _ctx: &ActorContext, message: Message) -> anyhow::Result<()> {
        self.0.send(message).context("demo driver gone")
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn node_config(base: &NodeConfig, nid: &str) -> NodeConfig {
    let mut config = base.clone();
    config.node.nid = Some(nid.to_string());
    config.remoting.enabled = true;
    config
}

/// Drive the network until `rx` yields a message
async fn pump(
    network: &InMemoryNetwork,
    rx: &mut mpsc::UnboundedReceiver<Message>,
) -> Result<Message> {
    for _ in 0..200 {
        network.run_until_idle();
        if let Ok(message) = rx.try_recv() {
            return Ok(message);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("timed out waiting for a reply")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let base = NodeConfig::load(args.config.as_deref())?;
    init_tracing(&base.node.log_level, args.json);

    info!("Starting remoting demo");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let network = InMemoryNetwork::new();
    let factory: Arc<dyn HubFactory> = Arc::new(network.clone());
    let client_node =
        Node::from_config(&node_config(&base, &args.client_nid), Some(factory.clone()))?;
    let server_node = Node::from_config(&node_config(&base, &args.server_nid), Some(factory))?;

    server_node.spawn(Some("worker"), Worker)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = client_node.spawn(Some("client"), Client(tx))?;

    let worker = client_node.lookup_str(&format!("{}/worker", args.server_nid))?;
    for i in 0..args.pings {
        worker.tell(Message::tuple([Message::from("ping"), Message::from(client.clone())]));
        let reply = pump(&network, &mut rx).await?;
        info!(round = i + 1, reply = ?reply, "Received reply");
    }

    // Nobody lives here: node B reports a remote dead letter
    let missing = client_node.lookup_str(&format!("{}/missing", args.server_nid))?;
    missing.tell("hello?");
    network.run_until_idle();

    // Crash B while A watches it
    let server_nid = NodeId::new(args.server_nid.as_str())?;
    client_node.watch(&worker, &client)?;
    network.run_until_idle();
    network.disconnect(&server_nid);
    let notice = pump(&network, &mut rx).await?;
    match notice.protocol() {
        Some(Protocol::NodeDown(nid)) => info!(node = nid, "Observed node down"),
        _ => info!(notice = ?notice, "Unexpected notice"),
    }

    server_node.stop();
    client_node.stop();
    info!("Demo finished");
    Ok(())
}
