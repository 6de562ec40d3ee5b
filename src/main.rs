//! QuorumKV - Quorum-Replicated Key-Value Store
//!
//! One binary, three process types: the cluster coordinator, the key-value
//! node (leader or follower), and the liveness registry. The coordinator
//! spawns node processes by re-invoking this executable with the `node`
//! subcommand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quorumkv::config::{
    CoordinatorConfig, NodeConfig, RegistryConfig, Timeouts, DEFAULT_BASE_PORT,
    DEFAULT_REGISTRY_PORT,
};
use quorumkv::error::{Error, Result};
use quorumkv::protocol::NodeRole;

/// QuorumKV - Quorum-Replicated Key-Value Store
#[derive(Parser)]
#[command(name = "quorumkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional TOML file with a [timeouts] table overriding protocol timeouts
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cluster coordinator: spawns the leader and follower fleet,
    /// exposes the quorum write/read data plane
    Coordinator {
        /// Number of followers to spawn at startup
        #[arg(long, default_value_t = 3)]
        followers: usize,

        /// Write quorum W: sync acks required for a write to succeed
        #[arg(long = "write-quorum", default_value_t = 2)]
        write_quorum: usize,

        /// Read quorum R: follower responses required for a read
        #[arg(long = "read-quorum", default_value_t = 1)]
        read_quorum: usize,

        /// Registry base URL
        #[arg(long, default_value_t = format!("http://127.0.0.1:{DEFAULT_REGISTRY_PORT}"))]
        registry: String,

        /// Coordinator HTTP port; node ports are derived from it
        #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
        port: u16,

        /// Cosmetic replication delay in seconds, forwarded to nodes
        #[arg(long = "replication-delay", default_value_t = 0.0)]
        replication_delay: f64,
    },

    /// Run a single key-value node (spawned by the coordinator)
    Node {
        /// HTTP port to bind
        #[arg(long)]
        port: u16,

        /// Node id; the leader uses the reserved id "leader"
        #[arg(long)]
        id: String,

        /// Role: leader or follower
        #[arg(long)]
        role: String,

        /// Leader base URL (followers only)
        #[arg(long = "leader-url")]
        leader_url: Option<String>,

        /// Registry base URL
        #[arg(long, default_value_t = format!("http://127.0.0.1:{DEFAULT_REGISTRY_PORT}"))]
        registry: String,

        /// Cosmetic replication delay in seconds (sync path; async waits 3x)
        #[arg(long = "replication-delay", default_value_t = 0.0)]
        replication_delay: f64,
    },

    /// Run the liveness registry
    Registry {
        /// HTTP port to bind
        #[arg(long, default_value_t = DEFAULT_REGISTRY_PORT)]
        port: u16,

        /// Automatically request respawn of dead followers
        #[arg(long = "auto-spawn")]
        auto_spawn: bool,

        /// Delay in seconds before an auto-respawn request
        #[arg(long = "spawn-delay", default_value_t = 3)]
        spawn_delay: u64,

        /// Coordinator base URL
        #[arg(long, default_value_t = format!("http://127.0.0.1:{DEFAULT_BASE_PORT}"))]
        coordinator: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let timeouts = match &cli.config {
        Some(path) => Timeouts::from_file(path)?,
        None => Timeouts::default(),
    };

    match cli.command {
        Commands::Coordinator {
            followers,
            write_quorum,
            read_quorum,
            registry,
            port,
            replication_delay,
        } => {
            let config = CoordinatorConfig {
                host: "127.0.0.1".to_string(),
                port,
                followers,
                write_quorum,
                read_quorum,
                registry_url: registry,
                base_port: port,
                replication_delay_secs: replication_delay,
                timeouts,
            };
            quorumkv::coordinator::run(config).await
        }

        Commands::Node {
            port,
            id,
            role,
            leader_url,
            registry,
            replication_delay,
        } => {
            let role: NodeRole = role.parse().map_err(Error::Config)?;
            let config = NodeConfig {
                node_id: id,
                host: "127.0.0.1".to_string(),
                port,
                role,
                leader_url,
                registry_url: registry,
                replication_delay_secs: replication_delay,
                timeouts,
            };
            quorumkv::node::run(config).await
        }

        Commands::Registry {
            port,
            auto_spawn,
            spawn_delay,
            coordinator,
        } => {
            let config = RegistryConfig {
                host: "127.0.0.1".to_string(),
                port,
                coordinator_url: coordinator,
                auto_spawn,
                spawn_delay_secs: spawn_delay,
                timeouts,
            };
            quorumkv::registry::run(config).await
        }
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
