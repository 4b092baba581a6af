use anyhow::{Result, anyhow};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use txparse::{DecoderConfig, RetryPolicy};

#[derive(Parser, Debug, Clone)]
#[command(about = "Decode Solana swap transactions into normalized swap records")]
pub struct Cli {
    /// Transaction signatures to decode
    pub signatures: Vec<String>,

    /// RPC URL (overrides RPC_URL)
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Decode recorded `{"signature", "tx"}` jsonl lines instead of fetching
    #[arg(long)]
    pub from_file: Option<PathBuf>,

    /// Concurrent decodes in flight
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Attach the raw transaction to each record
    #[arg(long)]
    pub include_raw: bool,

    /// Debug logging
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub rpc_timeout: Duration,
    pub decoder: DecoderConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} has an invalid value: {:?}", key, v)),
        Err(_) => Ok(default),
    }
}

pub fn load(cli: &Cli) -> Result<Config> {
    let rpc_url = cli
        .rpc_url
        .clone()
        .or_else(|| env::var("RPC_URL").ok())
        .unwrap_or_else(|| "https://api.mainnet-beta.solana.com".to_string());

    let rpc_timeout = Duration::from_secs(env_or("RPC_TIMEOUT_SECS", 25u64)?);

    let defaults = RetryPolicy::default();
    let retry = RetryPolicy {
        max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
        initial_delay: Duration::from_millis(env_or(
            "RETRY_INITIAL_DELAY_MS",
            defaults.initial_delay.as_millis() as u64,
        )?),
        max_delay: Duration::from_millis(env_or(
            "RETRY_MAX_DELAY_MS",
            defaults.max_delay.as_millis() as u64,
        )?),
        backoff_factor: defaults.backoff_factor,
    };

    let decoder = DecoderConfig {
        retry,
        token_cache_capacity: env_or("TOKEN_CACHE_CAPACITY", 1000usize)?,
        pool_cache_capacity: env_or("POOL_CACHE_CAPACITY", 100usize)?,
        include_raw: cli.include_raw,
    };

    if rpc_url.trim().is_empty() {
        return Err(anyhow!("RPC_URL is empty"));
    }
    if cli.concurrency == 0 {
        return Err(anyhow!("--concurrency must be at least 1"));
    }
    if decoder.retry.max_attempts == 0 {
        return Err(anyhow!("RETRY_MAX_ATTEMPTS must be at least 1"));
    }
    if cli.from_file.is_some() && !cli.signatures.is_empty() {
        return Err(anyhow!(
            "--from-file decodes every recorded transaction; drop the signature arguments"
        ));
    }
    if cli.from_file.is_none() && cli.signatures.is_empty() {
        return Err(anyhow!(
            "Nothing to decode: pass signatures or --from-file <file> (replay)"
        ));
    }

    Ok(Config {
        rpc_url,
        rpc_timeout,
        decoder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_input() {
        let cli = Cli::parse_from(["decoder"]);
        assert!(load(&cli).is_err());

        let cli = Cli::parse_from(["decoder", "--concurrency", "0", "sig"]);
        assert!(load(&cli).is_err());
    }

    #[test]
    fn test_replay_rejects_extra_signatures() {
        let cli = Cli::parse_from(["decoder", "--from-file", "swaps.jsonl", "sig"]);
        let err = load(&cli).unwrap_err();
        assert!(err.to_string().contains("--from-file"));

        let cli = Cli::parse_from(["decoder", "--from-file", "swaps.jsonl"]);
        assert!(load(&cli).is_ok());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "decoder",
            "--rpc-url",
            "http://localhost:8899",
            "--include-raw",
            "a",
            "b",
        ]);
        assert_eq!(cli.signatures, vec!["a", "b"]);

        let cfg = load(&cli).unwrap();
        assert_eq!(cfg.rpc_url, "http://localhost:8899");
        assert!(cfg.decoder.include_raw);
    }
}
