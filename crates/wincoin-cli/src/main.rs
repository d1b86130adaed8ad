mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::NodeClient;
use std::{process::ExitCode, time::Duration};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};
use wincoin_core::{BlockDocument, Chain, ChainDocument, Error};

#[derive(Parser, Debug)]
#[command(name = "wincoin-cli")]
#[command(about = "Operator CLI for a wincoin node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    /// Request timeout in milliseconds
    #[arg(long, global = true, default_value_t = 5_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the node's chain
    Chain {
        /// Print the raw chain document instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Ask the node to mine a block
    Mine {
        /// Transaction payload (repeatable)
        #[arg(long = "tx")]
        transactions: Vec<String>,
    },
    /// List the node's known peers
    Peers,
    /// Fetch the node's chain and validate it locally
    Verify {
        /// Reject blocks below this difficulty
        #[arg(long, default_value_t = 0)]
        min_difficulty: u32,
    },
}

fn short(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

fn render_block(b: &BlockDocument) -> String {
    format!(
        "{:>5}  {:>3}  {:>10}  {:<16}  {:<16}  {:>3}  {}",
        b.index,
        b.difficulty,
        b.nonce,
        short(b.hash.as_str()),
        short(b.previous_hash.as_str()),
        b.transactions.len(),
        b.timestamp
    )
}

fn render_chain(doc: &ChainDocument) -> String {
    let mut out = format!(
        "{:>5}  {:>3}  {:>10}  {:<16}  {:<16}  {:>3}  {}\n",
        "index", "dif", "nonce", "hash", "previous", "txs", "mined"
    );
    for block in &doc.blocks {
        out.push_str(&render_block(block));
        out.push('\n');
    }
    out.push_str(&format!("length {}", doc.length));
    out
}

async fn run(cli: Cli) -> Result<()> {
    let node = NodeClient::new(&cli.node, Duration::from_millis(cli.timeout_ms))?;
    match cli.cmd {
        Command::Chain { json } => {
            let doc = node.chain().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!("{}", render_chain(&doc));
            }
        }
        Command::Mine { transactions } => {
            let reply = node.mine(&transactions).await?;
            if let Some(block) = &reply.block {
                println!("mined block {} with hash {}", block.index, block.hash);
            }
            if let Some(report) = reply.broadcast {
                println!(
                    "broadcast: {} delivered, {} failed",
                    report.delivered, report.failed
                );
            }
        }
        Command::Peers => {
            let peers = node.peers().await?;
            if peers.is_empty() {
                println!("no known peers");
            }
            for peer in peers {
                println!("{peer}");
            }
        }
        Command::Verify { min_difficulty } => {
            let doc = node.chain().await?;
            debug!("replaying {} blocks", doc.length);
            let chain = Chain::with_min_difficulty(min_difficulty);
            chain.replace(doc.into_blocks()).map_err(Error::from)?;
            let (height, tip) = chain.tip();
            println!("valid chain of {height} blocks, tip {tip}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(u8::try_from(client::exit_code(&e)).unwrap_or(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wincoin_core::{Miner, SearchSpace};

    #[test]
    fn chain_table_has_one_row_per_block() {
        let chain = Chain::new();
        let miner = Miner::new(SearchSpace::ascending(0, u64::MAX), None);
        chain.genesis(1, &miner).unwrap();
        miner.mine_next(&chain, vec!["tx".into()]).unwrap();

        let table = render_chain(&chain.serialize());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("previous"));
        assert!(lines[1].trim_start().starts_with('0'));
        assert!(lines[2].contains(short(chain.latest_hash().as_str())));
        assert_eq!(lines[3], "length 2");
    }

    #[test]
    fn short_hash_tolerates_short_input() {
        assert_eq!(short("abc"), "abc");
        assert_eq!(short(&"f".repeat(64)).len(), 16);
    }
}
