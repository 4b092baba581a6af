use anyhow::Result;
use clap::Parser;
use futures::{StreamExt, stream};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use txparse::{DecodeError, MetadataSource, SwapDecoder, SwapRecord, TransactionSource};

mod config;
mod replay;
mod rpc;

use config::Cli;
use replay::RecordedTransactions;
use rpc::RpcClient;

fn setup_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .try_init();
}

/// One JSON line per signature: the record, or the error and its kind.
fn output_line(signature: &str, result: &Result<SwapRecord, DecodeError>) -> Result<String> {
    let line = match result {
        Ok(record) => serde_json::to_string(record)?,
        Err(e) => serde_json::to_string(&json!({
            "signature": signature,
            "error": e.message,
            "kind": e.kind.as_str(),
        }))?,
    };
    Ok(line)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let cfg = config::load(&cli)?;

    info!("decoder starting:");
    info!("  rpc_url={}", cfg.rpc_url);
    info!("  concurrency={}", cli.concurrency);
    info!("  retry_max_attempts={}", cfg.decoder.retry.max_attempts);
    info!("  token_cache_capacity={}", cfg.decoder.token_cache_capacity);
    info!("  pool_cache_capacity={}", cfg.decoder.pool_cache_capacity);
    info!("  include_raw={}", cfg.decoder.include_raw);

    let rpc = Arc::new(RpcClient::new(
        cfg.rpc_url.clone(),
        cfg.rpc_timeout,
        cli.concurrency,
    )?);
    let metadata: Arc<dyn MetadataSource> = rpc.clone();

    let (transactions, signatures): (Arc<dyn TransactionSource>, Vec<String>) =
        match &cli.from_file {
            Some(path) => {
                let recorded = RecordedTransactions::load(path)?;
                let sigs = recorded.signatures().to_vec();
                let source: Arc<dyn TransactionSource> = Arc::new(recorded);
                (source, sigs)
            }
            None => {
                let source: Arc<dyn TransactionSource> = rpc.clone();
                (source, cli.signatures.clone())
            }
        };

    info!(
        "mode: {} ({} signatures)",
        if cli.from_file.is_some() { "replay" } else { "rpc" },
        signatures.len()
    );

    let decoder = Arc::new(SwapDecoder::new(transactions, Some(metadata), cfg.decoder));

    let mut ok = 0usize;
    let mut failed = 0usize;

    let mut results = stream::iter(signatures)
        .map(|sig| {
            let decoder = decoder.clone();
            async move {
                let res = decoder.decode_transaction(&sig).await;
                (sig, res)
            }
        })
        .buffer_unordered(cli.concurrency);

    while let Some((sig, res)) = results.next().await {
        match &res {
            Ok(_) => ok += 1,
            Err(e) => {
                failed += 1;
                warn!("decode failed sig={} kind={} err={}", sig, e.kind, e.message);
            }
        }
        println!("{}", output_line(&sig, &res)?);
    }

    info!("done: decoded={} failed={}", ok, failed);
    Ok(())
}
