use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use plasma::config::Config;
use plasma::crypto::Address;
use plasma::operator::Operator;
use plasma::rootchain::{NullClient, RootChainClient};
use plasma::{Mempool, Store};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Plasma side-chain operator node and ledger query CLI"
)]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the operator: admission, block packaging and settlement polling
    Start,
    /// Print the ledger's current block height
    BlockHeight,
    /// Print the spendable balance of an address
    Balance {
        /// Account address as 0x-prefixed hex
        #[arg(long)]
        address: String,
    },
    /// Print a block, its metadata and its transactions
    GetBlock {
        #[arg(long)]
        number: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    let storage = Arc::new(Store::open(&cfg.storage.path)?);

    match cli.cmd {
        Cmd::Start => {
            let mempool = Mempool::spawn(storage.clone());
            if cfg.rootchain.node_url.is_some() {
                println!("⚠️  Settlement-layer client not wired in; running with the stand-in submitter");
            }
            let client: Arc<dyn RootChainClient> = Arc::new(NullClient);
            let (shutdown_tx, _) = broadcast::channel(4);
            Operator::new(storage.clone(), mempool.clone(), client)
                .spawn_loop(cfg.operator.tick_secs, shutdown_tx.subscribe());
            println!(
                "✅ Operator running: packaging every {}s, storage at {}",
                cfg.operator.tick_secs, cfg.storage.path
            );

            signal::ctrl_c().await?;
            println!("🛑 Shutting down...");
            let _ = shutdown_tx.send(());
            mempool.stop();
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
        Cmd::BlockHeight => {
            let height = storage.latest_block()?.map(|b| b.header.number).unwrap_or(0);
            println!("{height}");
        }
        Cmd::Balance { address } => {
            let addr = parse_address(&address)?;
            println!("{}", storage.balance(&addr)?);
        }
        Cmd::GetBlock { number } => {
            let Some(block) = storage.block_at_height(number)? else {
                bail!("no block found at height {number}");
            };
            println!("block {}: 0x{}", number, hex::encode(block.block_hash));
            println!("  merkle root: 0x{}", hex::encode(block.header.merkle_root));
            println!("  prev hash:   0x{}", hex::encode(block.header.prev_hash));
            if let Some(meta) = storage.block_meta_at_height(number)? {
                println!("  created at {}, {} txs, {} in fees", meta.created_at, meta.transaction_count, meta.fees);
            }
            for tx in storage.find_transactions_by_block_num(number)? {
                println!(
                    "  tx {}: out0 {} -> 0x{}, out1 {} -> 0x{}, fee {}",
                    tx.transaction.tx_idx,
                    tx.transaction.output0.denom,
                    hex::encode(tx.transaction.output0.owner),
                    tx.transaction.output1.denom,
                    hex::encode(tx.transaction.output1.owner),
                    tx.transaction.fee
                );
            }
        }
    }

    Ok(())
}

fn parse_address(text: &str) -> Result<Address> {
    let raw = hex::decode(text.trim_start_matches("0x"))?;
    let addr: Address = match raw.try_into() {
        Ok(addr) => addr,
        Err(_) => bail!("address must be 20 bytes of hex"),
    };
    Ok(addr)
}
