//! QkvCtl - Command line tool for operating QuorumKV clusters
//!
//! Usage:
//!   qkvctl status                 - Show cluster membership and quorum state
//!   qkvctl write <key> <value>    - Quorum write through the coordinator
//!   qkvctl read <key>             - Quorum read through the coordinator
//!   qkvctl spawn                  - Spawn (or revive) a follower
//!   qkvctl kill <node-id>         - Kill a follower
//!   qkvctl nodes                  - List nodes as seen by the registry

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use quorumkv::error::ErrorResponse;
use quorumkv::protocol::{
    KillResponse, ReadResponse, RegistryNodesResponse, SpawnRequest, SpawnResponse,
    StatusResponse, WriteRequest, WriteResponse,
};

/// QuorumKV Cluster Control Tool
#[derive(Parser)]
#[command(name = "qkvctl")]
#[command(about = "Operate and monitor QuorumKV clusters", long_about = None)]
struct Cli {
    /// Coordinator endpoint
    #[arg(short, long, default_value = "http://127.0.0.1:7000")]
    endpoint: String,

    /// Registry endpoint (for the nodes listing)
    #[arg(short, long, default_value = "http://127.0.0.1:9000")]
    registry: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cluster membership and quorum state
    Status,
    /// Write a key through the coordinator
    Write { key: String, value: String },
    /// Read a key through the coordinator
    Read { key: String },
    /// Spawn a follower; omit the flags to let the coordinator pick a slot
    Spawn {
        #[arg(long)]
        node_id: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Kill a follower process
    Kill { node_id: String },
    /// List nodes tracked by the registry
    Nodes {
        /// Only show alive nodes
        #[arg(long)]
        alive: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let status: StatusResponse =
                get_json(&client, &format!("{}/status", cli.endpoint)).await?;
            print_status(&status);
        }

        Commands::Write { key, value } => {
            let resp: WriteResponse = post_json(
                &client,
                &format!("{}/write", cli.endpoint),
                &WriteRequest {
                    key: key.clone(),
                    value,
                },
            )
            .await?;
            println!(
                "OK  {} = {:?}  version={}  acks={}/{}  replicated to {}",
                resp.key,
                resp.value,
                resp.version,
                resp.sync_acks,
                resp.quorum,
                resp.sync_replicated_to.join(", ")
            );
        }

        Commands::Read { key } => {
            let resp: ReadResponse =
                get_json(&client, &format!("{}/read/{key}", cli.endpoint)).await?;
            println!(
                "{} = {:?}  version={}  served by {} ({} responses)",
                resp.key, resp.value, resp.version, resp.served_by, resp.quorum_responses
            );
        }

        Commands::Spawn { node_id, port } => {
            let resp: SpawnResponse = post_json(
                &client,
                &format!("{}/spawn", cli.endpoint),
                &SpawnRequest { node_id, port },
            )
            .await?;
            println!("{}  {} at {}", resp.status, resp.node_id, resp.url);
        }

        Commands::Kill { node_id } => {
            let resp: KillResponse = post_json(
                &client,
                &format!("{}/kill/{node_id}", cli.endpoint),
                &serde_json::json!({}),
            )
            .await?;
            println!(
                "{}  {}  can_write={}",
                resp.status, resp.node_id, resp.can_write
            );
        }

        Commands::Nodes { alive } => {
            let path = if alive { "alive" } else { "nodes" };
            let resp: RegistryNodesResponse =
                get_json(&client, &format!("{}/{path}", cli.registry)).await?;
            println!(
                "{:<14} {:<10} {:<10} {:<24} LAST SEEN",
                "NODE", "ROLE", "STATUS", "URL"
            );
            for node in resp.nodes {
                println!(
                    "{:<14} {:<10} {:<10} {:<24} {}",
                    node.node_id,
                    node.role.to_string(),
                    node.status.to_string(),
                    node.url,
                    node.last_seen.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }

    Ok(())
}

fn print_status(status: &StatusResponse) {
    println!("Cluster Status");
    println!("==============");
    match &status.leader {
        Some(leader) => println!("Leader:    {} ({}) at {}", leader.node_id, leader.status, leader.url),
        None => println!("Leader:    (none)"),
    }
    println!(
        "Quorums:   W={}  R={}  can_write={}  can_read={}",
        status.write_quorum, status.read_quorum, status.can_write, status.can_read
    );
    println!("Followers:");
    for follower in &status.followers {
        println!(
            "  {:<14} {:<10} port {}",
            follower.node_id, follower.status.to_string(), follower.port
        );
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> anyhow::Result<T> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    parse_response(url, response).await
}

async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> anyhow::Result<T> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    parse_response(url, response).await
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> anyhow::Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .with_context(|| format!("invalid response from {url}"));
    }

    // Surface the API's own error body when there is one
    match response.json::<ErrorResponse>().await {
        Ok(err) => bail!("{} ({}): {}", status, err.code, err.error),
        Err(_) => bail!("{url} returned {status}"),
    }
}
