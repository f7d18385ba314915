//! Thin command-line shell over the bitforest library crates: keygen,
//! identity-script assembly, operation build+sign, staging/committing
//! against a forest database, running the server loops against a
//! `MockRpc`, and syncing/reading a log as a client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ed25519_dalek::{Keypair, PublicKey, SecretKey};

use bitforest_core::idscript::IdScript;
use bitforest_core::operation::Operation;
use bitforest_core::OperationLog;

#[derive(Parser)]
#[command(name = "bitforest")]
#[command(about = "Bitforest name-registry CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generates a fresh Ed25519 keypair and prints it as hex.
    Keygen,

    /// Assembles a single-key `.ed25519` identity script.
    IdScript {
        /// Hex-encoded 32-byte Ed25519 public key.
        #[arg(long)]
        pubkey: String,
    },

    /// Assembles an N-of-M quorum identity script over several public keys.
    QuorumScript {
        #[arg(long)]
        need: u16,
        #[arg(long)]
        max: u16,
        /// Hex-encoded 32-byte public keys, in order.
        #[arg(long = "key", num_args = 1..)]
        keys: Vec<String>,
    },

    /// Builds and signs the next operation in a chain, printing it as hex.
    BuildOp {
        /// Hex-encoded 32-byte Ed25519 secret key authorizing this operation.
        /// Omit for an unsigned genesis operation.
        #[arg(long)]
        secret: Option<String>,
        /// Hex-encoded identity script bytes that will authorize the
        /// operation following this one.
        #[arg(long)]
        next_id: String,
        /// Opaque payload, taken as raw UTF-8 bytes.
        #[arg(long)]
        data: String,
    },

    /// Stages an operation's bytes under a name in a forest database.
    Stage {
        #[arg(long)]
        db: String,
        #[arg(long)]
        name: String,
        /// Hex-encoded operation bytes (see `build-op`).
        #[arg(long)]
        op: String,
    },

    /// Commits the staged batch, printing the new tree root as hex.
    Commit {
        #[arg(long)]
        db: String,
    },

    /// Runs the header-sync and anchor loops, and serves the header /
    /// tx-chain / op-log artifacts over HTTP, against an in-process
    /// `MockRpc`, for local development and demos. Runs until Ctrl-C.
    Serve {
        #[arg(long)]
        forest_db: String,
        #[arg(long)]
        anchor_db: String,
        #[arg(long, default_value = "dummy-wif")]
        wif: String,
        #[arg(long, default_value = "__heartbeat__")]
        heartbeat_name: String,
        #[arg(long, default_value_t = 60)]
        anchor_interval_secs: u64,
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen_addr: std::net::SocketAddr,
    },

    /// Downloads and verifies a server's header and anchor-tx chains.
    Sync {
        #[arg(long)]
        server_url: String,
        #[arg(long)]
        cache_dir: PathBuf,
    },

    /// Fetches, verifies, and prints the operation log for a name.
    GetOpLog {
        #[arg(long)]
        server_url: String,
        #[arg(long)]
        cache_dir: PathBuf,
        name: String,
    },
}

fn main() {
    env_logger::init();
    if let Err(e) = run(Cli::parse().command) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Keygen => {
            let kp = bitforest_wallet::generate_keypair();
            println!("secret: {}", hex::encode(kp.secret.as_bytes()));
            println!("public: {}", hex::encode(kp.public.as_bytes()));
        }

        Commands::IdScript { pubkey } => {
            let script = IdScript::assemble(&format!(".ed25519 {pubkey}"))?;
            println!("{}", hex::encode(script.as_bytes()));
        }

        Commands::QuorumScript { need, max, keys } => {
            let mut asm = String::new();
            for k in &keys {
                asm.push_str(".ed25519 ");
                asm.push_str(k);
                asm.push(' ');
            }
            asm.push_str(&format!(".quorum {need}. {max}."));
            let script = IdScript::assemble(&asm)?;
            println!("{}", hex::encode(script.as_bytes()));
        }

        Commands::BuildOp { secret, next_id, data } => {
            let next_id = IdScript::from_bytes(hex::decode(next_id)?);
            let data = data.into_bytes();
            let op = match secret {
                Some(secret_hex) => {
                    let secret_bytes = hex::decode(secret_hex)?;
                    let secret = SecretKey::from_bytes(&secret_bytes)?;
                    let public = PublicKey::from(&secret);
                    let kp = Keypair { secret, public };
                    bitforest_wallet::sign_next_operation(&kp, next_id, data)
                }
                None => bitforest_wallet::genesis_operation(next_id, data),
            };
            println!("{}", hex::encode(op.to_bytes()));
        }

        Commands::Stage { db, name, op } => {
            let op_bytes = hex::decode(op)?;
            // validate shape before staging, so a malformed op fails fast
            Operation::from_bytes(&op_bytes)?;
            let forest = bitforest_forest::Store::open(&db)?;
            forest.stage(&name, &op_bytes)?;
            println!("staged {} bytes under {name}", op_bytes.len());
        }

        Commands::Commit { db } => {
            let forest = bitforest_forest::Store::open(&db)?;
            let root = forest.commit()?;
            println!("{}", hex::encode(root));
        }

        Commands::Serve { forest_db, anchor_db, wif, heartbeat_name, anchor_interval_secs, listen_addr } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(forest_db, anchor_db, wif, heartbeat_name, anchor_interval_secs, listen_addr))?;
        }

        Commands::Sync { server_url, cache_dir } => {
            let client = bitforest_client::Client::new(reqwest::Url::parse(&server_url)?, cache_dir);
            client.sync()?;
            println!("synced and verified");
        }

        Commands::GetOpLog { server_url, cache_dir, name } => {
            let client = bitforest_client::Client::new(reqwest::Url::parse(&server_url)?, cache_dir);
            let (log, confirmed) = client.get_op_log(&name)?;
            print_log(&log, confirmed);
        }
    }
    Ok(())
}

async fn serve(
    forest_db: String,
    anchor_db: String,
    wif: String,
    heartbeat_name: String,
    anchor_interval_secs: u64,
    listen_addr: std::net::SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mock, bogus_funds) = bitforest_rpc::MockRpc::new();
    let rpc = Arc::new(mock.clone());
    let forest = Arc::new(bitforest_forest::Store::open(&forest_db)?);
    let pipeline = Arc::new(bitforest_anchor::Pipeline::open(&anchor_db, mock.clone(), wif)?);
    pipeline.add_funds(&bogus_funds)?;
    let header_cache = Arc::new(bitforest_server::HeaderCache::new());

    let _miner = mock.spawn_background_miner(Duration::from_secs(10));

    let token = tokio_util::sync::CancellationToken::new();

    let anchor_handle = tokio::spawn(bitforest_server::anchor_loop::run(
        token.clone(),
        forest.clone(),
        pipeline.clone(),
        heartbeat_name,
        Duration::from_secs(anchor_interval_secs),
    ));

    let sync_handle = tokio::spawn(bitforest_server::header_sync_loop::run(
        token.clone(),
        header_cache.clone(),
        rpc.clone(),
    ));

    let app_state = Arc::new(bitforest_server::AppState { header_cache, pipeline, rpc, forest });
    let http_handle = tokio::spawn(bitforest_server::serve(listen_addr, app_state, token.clone()));

    tokio::signal::ctrl_c().await?;
    println!("shutting down");
    token.cancel();
    anchor_handle.await?;
    sync_handle.await?;
    http_handle.await??;
    Ok(())
}

fn print_log(log: &OperationLog, confirmed: usize) {
    println!("{} operations, {} confirmed", log.0.len(), confirmed);
    for (i, op) in log.0.iter().enumerate() {
        println!(
            "  [{i}] nonce={} next_id={} data={:?}",
            hex::encode(op.nonce),
            hex::encode(op.next_id.as_bytes()),
            String::from_utf8_lossy(&op.data)
        );
    }
}
