//! End-to-end decode tests
//!
//! Tests for:
//! - Fixture transactions through every strategy family
//! - Error classification (unknown AMM, bad signature, not found, throttling)
//! - Strategy fall-through and most-specific error reporting

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use txparse::{
    Action, DecodeError, DecoderConfig, ErrorKind, MetadataSource, RetryPolicy, SwapDecoder,
    SwapRecord, TransactionSource, TransportError, TxFacts,
};

const FIXTURES_DIR: &str = "tests/fixtures";

const WSOL: &str = "So11111111111111111111111111111111111111112";
const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
const ORCA_WHIRLPOOL: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";
const RAYDIUM_V4_OWNER: &str = "67vHA8qZGCJKw1UNGUJZME4MwEWDRGWzp7MGvsut43A8";

fn load_fixture(name: &str) -> Value {
    let path = format!("{}/{}.json", FIXTURES_DIR, name);
    let content = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path, e));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", path, e))
}

fn fixture_signature(tx: &Value) -> String {
    tx.pointer("/transaction/signatures/0")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string()
}

fn test_signature(seed: u8) -> String {
    bs58::encode([seed; 64]).into_string()
}

/// In-memory chain serving both transactions and account data.
#[derive(Default)]
struct FakeChain {
    txs: HashMap<String, Value>,
    accounts: HashMap<String, Vec<u8>>,
    throttled: bool,
    tx_calls: AtomicU32,
    account_calls: AtomicU32,
}

impl FakeChain {
    fn with_tx(mut self, signature: &str, tx: Value) -> Self {
        self.txs.insert(signature.to_string(), tx);
        self
    }

    fn with_account(mut self, address: &str, data: Vec<u8>) -> Self {
        self.accounts.insert(address.to_string(), data);
        self
    }
}

#[async_trait]
impl TransactionSource for FakeChain {
    async fn fetch_transaction(&self, signature: &str) -> Result<Option<Value>, TransportError> {
        self.tx_calls.fetch_add(1, Ordering::SeqCst);
        if self.throttled {
            return Err(TransportError::RateLimited("HTTP 429".into()));
        }
        Ok(self.txs.get(signature).cloned())
    }
}

#[async_trait]
impl MetadataSource for FakeChain {
    async fn fetch_mint_decimals(&self, mint: &str) -> Result<u8, TransportError> {
        Err(TransportError::Other(format!("unknown mint {}", mint)))
    }

    async fn fetch_account_data(&self, address: &str) -> Result<Option<Vec<u8>>, TransportError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.get(address).cloned())
    }
}

fn quick_config() -> DecoderConfig {
    DecoderConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            backoff_factor: 2.0,
        },
        ..DecoderConfig::default()
    }
}

fn decoder_for(chain: FakeChain, config: DecoderConfig) -> (SwapDecoder, Arc<FakeChain>) {
    let chain = Arc::new(chain);
    let metadata: Arc<dyn MetadataSource> = chain.clone();
    let decoder = SwapDecoder::new(chain.clone(), Some(metadata), config);
    (decoder, chain)
}

async fn decode_fixture(name: &str) -> Result<SwapRecord, DecodeError> {
    let tx = load_fixture(name);
    let sig = fixture_signature(&tx);
    let (decoder, _) = decoder_for(FakeChain::default().with_tx(&sig, tx), quick_config());
    decoder.decode_transaction(&sig).await
}

// =============================================================================
// Fixture decodes
// =============================================================================

mod fixture_tests {
    use super::*;

    #[test]
    fn test_jupiter_fixture_flattens_cpi_after_route() {
        let tx = load_fixture("jupiter_route_swap");
        let facts = TxFacts::from_json(&tx, &fixture_signature(&tx));

        let programs: Vec<&str> = facts
            .instructions
            .iter()
            .map(|ix| ix.program_id.as_str())
            .collect();
        assert_eq!(programs.len(), 5);
        assert_eq!(programs[1], "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");
        assert_eq!(programs[2], RAYDIUM_AMM_V4);
        assert_eq!(facts.instructions[2].outer_ix_index, Some(1));
        assert_eq!(facts.token_balance_deltas.len(), 4);
    }

    #[tokio::test]
    async fn test_jupiter_route_uses_balance_deltas() {
        let record = decode_fixture("jupiter_route_swap").await.unwrap();

        assert_eq!(record.amms, vec!["JUPITER", "RAYDIUM"]);
        assert_eq!(record.signers, vec!["6juRBbDfLH5qNkipDuThJKuDWs53KKAdDVyJAHSJiDuy"]);
        assert_eq!(record.timestamp, "2024-01-01T00:00:00.000Z");
        assert_eq!(record.token_in_mint, WSOL);
        assert_eq!(record.token_in_amount, "2000000000");
        assert_eq!(record.token_in_decimals, 9);
        // The pool's WSOL vault grew by the same amount; the output leg must
        // be the other mint.
        assert_eq!(record.token_out_mint, USDC);
        assert_eq!(record.token_out_amount, "150000000");
        assert_eq!(record.token_out_decimals, 6);
        assert_eq!(record.action, Some(Action::Buy));
        assert_eq!(record.token_out_ui_amount(), "150");
        assert!(record.raw.is_none());
    }

    #[tokio::test]
    async fn test_pumpfun_buy_uses_trade_event() {
        let record = decode_fixture("pumpfun_buy").await.unwrap();

        assert_eq!(record.amms, vec!["PUMPFUN"]);
        assert_eq!(record.signers, vec!["EC8jPzLFv4ryW2MtUji1mLxo17eEYcvim94ETT9aHKC3"]);
        assert_eq!(record.action, Some(Action::Buy));
        assert_eq!(record.token_in_mint, WSOL);
        assert_eq!(record.token_in_amount, "1000000000");
        assert_eq!(record.token_in_decimals, 9);
        assert_eq!(record.token_out_mint, "tdDKPtF1TJTe1JxVwCYgXrX17EhBvXhLrp2HJ5FQJsU");
        assert_eq!(record.token_out_amount, "35000000000");
        // Taken from the transaction's own snapshot.
        assert_eq!(record.token_out_decimals, 6);
    }

    #[tokio::test]
    async fn test_orca_fixed_offset_reports_instruction_amounts() {
        let record = decode_fixture("orca_swap").await.unwrap();

        assert_eq!(record.amms, vec!["ORCA"]);
        assert_eq!(record.signers, vec!["14n8Ed44Z1pVuySbpx3GekMYs16YA6Ts7V8esv8einy2"]);
        assert_eq!(record.token_in_mint, USDC);
        assert_eq!(record.token_in_amount, "5000000");
        assert_eq!(record.token_in_decimals, 6);
        assert_eq!(record.token_out_mint, BONK);
        assert_eq!(record.token_out_amount, "4900000");
        assert_eq!(record.token_out_decimals, 5);
        assert_eq!(record.action, None);
        assert_eq!(record.timestamp, "2024-01-01T01:00:00.000Z");
    }

    #[tokio::test]
    async fn test_raydium_v4_fixed_offset_signer_is_last_account() {
        let tx = load_fixture("raydium_v4_swap");
        let sig = fixture_signature(&tx);
        let (decoder, chain) = decoder_for(FakeChain::default().with_tx(&sig, tx), quick_config());

        let record = decoder.decode_transaction(&sig).await.unwrap();
        assert_eq!(record.amms, vec!["RAYDIUM"]);
        assert_eq!(record.signers, vec![RAYDIUM_V4_OWNER]);
        assert_eq!(record.token_in_mint, USDC);
        assert_eq!(record.token_in_amount, "100000000");
        assert_eq!(record.token_in_decimals, 6);
        assert_eq!(record.token_out_mint, WSOL);
        assert_eq!(record.token_out_amount, "650000000");
        assert_eq!(record.token_out_decimals, 9);
        assert_eq!(record.timestamp, "2024-01-01T02:00:00.000Z");

        // Both mints came from the snapshots; nothing was fetched.
        assert_eq!(chain.account_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_raydium_v4_without_open_orders_shifts_positions() {
        let mut tx = load_fixture("raydium_v4_swap");
        let sig = fixture_signature(&tx);
        let accounts = tx
            .pointer_mut("/transaction/message/instructions/0/accounts")
            .and_then(|v| v.as_array_mut())
            .unwrap();
        accounts.remove(3);
        assert_eq!(accounts.len(), 17);

        let (decoder, _) = decoder_for(FakeChain::default(), quick_config());
        let record = decoder.decode_value(&sig, &tx).await.unwrap();
        assert_eq!(record.signers, vec![RAYDIUM_V4_OWNER]);
        assert_eq!(record.token_in_mint, USDC);
        assert_eq!(record.token_out_mint, WSOL);
        assert_eq!(record.token_out_amount, "650000000");
    }

    #[tokio::test]
    async fn test_include_raw_attaches_transaction() {
        let tx = load_fixture("orca_swap");
        let sig = fixture_signature(&tx);
        let config = DecoderConfig {
            include_raw: true,
            ..quick_config()
        };
        let (decoder, _) = decoder_for(FakeChain::default().with_tx(&sig, tx.clone()), config);

        let record = decoder.decode_transaction(&sig).await.unwrap();
        assert_eq!(record.raw, Some(tx));

        let v = serde_json::to_value(&record).unwrap();
        assert!(v.get("Raw").is_some());
        assert_eq!(v["TokenInMint"], USDC);
    }
}

// =============================================================================
// Error classification
// =============================================================================

mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_unrecognized_program_is_unknown_amm() {
        let sig = test_signature(1);
        let tx = json!({
            "blockTime": 1704067200,
            "meta": {"err": null, "preTokenBalances": [], "postTokenBalances": []},
            "transaction": {
                "signatures": [sig],
                "message": {
                    "accountKeys": [{"pubkey": "Payer", "signer": true}],
                    "instructions": [{
                        "programId": "11111111111111111111111111111111",
                        "parsed": {"type": "transfer"}
                    }]
                }
            }
        });
        let (decoder, _) = decoder_for(FakeChain::default().with_tx(&sig, tx), quick_config());

        let err = decoder.decode_transaction(&sig).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownAmm);
    }

    #[tokio::test]
    async fn test_malformed_signature_never_fetches() {
        let (decoder, chain) = decoder_for(FakeChain::default(), quick_config());

        for bad in ["not-a-signature", "0OIl", "abc"] {
            let err = decoder.decode_transaction(bad).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidSignatureFormat);
        }
        assert_eq!(chain.tx_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_transaction() {
        let (decoder, chain) = decoder_for(FakeChain::default(), quick_config());

        let err = decoder.decode_transaction(&test_signature(2)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransactionNotFound);
        assert_eq!(chain.tx_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_surfaces_after_retries() {
        let chain = FakeChain {
            throttled: true,
            ..FakeChain::default()
        };
        let (decoder, chain) = decoder_for(chain, quick_config());

        let err = decoder.decode_transaction(&test_signature(3)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(chain.tx_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_instructions() {
        let sig = test_signature(4);
        let tx = json!({
            "meta": {"err": null},
            "transaction": {"signatures": [sig], "message": {"accountKeys": ["Payer"], "instructions": []}}
        });
        let (decoder, _) = decoder_for(FakeChain::default(), quick_config());

        let err = decoder.decode_value(&sig, &tx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInstruction);
    }

    #[tokio::test]
    async fn test_exhausted_orca_reports_parse_error() {
        let sig = test_signature(5);
        // Opcode only: the amount fields are missing and there are no deltas.
        let tx = json!({
            "meta": {"err": null, "preTokenBalances": [], "postTokenBalances": []},
            "transaction": {
                "signatures": [sig],
                "message": {
                    "accountKeys": [{"pubkey": "Payer", "signer": true}, {"pubkey": ORCA_WHIRLPOOL, "signer": false}],
                    "instructions": [{
                        "programId": ORCA_WHIRLPOOL,
                        "accounts": ["Payer"],
                        "data": bs58::encode([1u8]).into_string()
                    }]
                }
            }
        });
        let (decoder, _) = decoder_for(FakeChain::default(), quick_config());

        let err = decoder.decode_value(&sig, &tx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError);
    }

    #[tokio::test]
    async fn test_failed_transaction_skips_instruction_amounts() {
        let mut tx = load_fixture("orca_swap");
        let sig = fixture_signature(&tx);

        // A failed swap leaves every balance untouched.
        let mut balances = tx["meta"]["preTokenBalances"].as_array().unwrap().clone();
        balances.push(json!({
            "accountIndex": 2,
            "mint": BONK,
            "uiTokenAmount": {"amount": "0", "decimals": 5}
        }));
        tx["meta"]["preTokenBalances"] = json!(balances);
        tx["meta"]["postTokenBalances"] = json!(balances);

        let (decoder, _) = decoder_for(FakeChain::default(), quick_config());

        let record = decoder.decode_value(&sig, &tx).await.unwrap();
        assert_eq!(record.token_in_amount, "5000000");

        tx["meta"]["err"] = json!({"InstructionError": [0, {"Custom": 6001}]});
        let err = decoder.decode_value(&sig, &tx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidTokenAccount);
    }

    #[tokio::test]
    async fn test_exhausted_without_opcode_match_is_invalid_instruction() {
        let sig = test_signature(6);
        let tx = json!({
            "meta": {"err": null},
            "transaction": {
                "signatures": [sig],
                "message": {
                    "accountKeys": ["Payer", "MoonCVVNZFSYkqNXP6bxHLPL6QQJiMagDL3qcqUQTrG"],
                    "instructions": [{"programIdIndex": 1, "accounts": [0], "data": ""}]
                }
            }
        });
        let (decoder, _) = decoder_for(FakeChain::default(), quick_config());

        let err = decoder.decode_value(&sig, &tx).await.unwrap_err();
        // Fixed-offset finds nothing; balance-delta gets as far as the deltas.
        assert_eq!(err.kind, ErrorKind::InvalidTokenAccount);
    }
}

// =============================================================================
// Raydium ray_log with pool metadata
// =============================================================================

mod ray_log_tests {
    use super::*;

    const POOL: &str = "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2";

    fn pool_account(base: [u8; 32], quote: [u8; 32]) -> Vec<u8> {
        let mut data = vec![0u8; 752];
        data[32..40].copy_from_slice(&9u64.to_le_bytes());
        data[40..48].copy_from_slice(&6u64.to_le_bytes());
        data[400..432].copy_from_slice(&base);
        data[432..464].copy_from_slice(&quote);
        data
    }

    fn ray_log(direction: u64) -> String {
        let mut raw = vec![3u8];
        for v in [1_000_000_000u64, 90_000_000, direction, 1_000_000_000, 5, 6, 95_000_000] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        STANDARD.encode(raw)
    }

    fn v4_swap_tx(sig: &str, direction: u64) -> Value {
        let mut data = vec![9u8];
        data.extend_from_slice(&1_000_000_000u64.to_le_bytes());
        data.extend_from_slice(&90_000_000u64.to_le_bytes());

        // The user's source account lives in a lookup table, so the
        // fixed-offset strategy cannot use it.
        let mut accounts: Vec<Value> = (0..18).map(|i| json!(format!("Acct{}", i))).collect();
        accounts[1] = json!(POOL);
        accounts[15] = json!("LoadedUserSource");
        accounts[17] = json!("Trader");

        let mut keys: Vec<Value> = vec![json!({"pubkey": "Trader", "signer": true})];
        keys.push(json!({"pubkey": POOL, "signer": false}));
        keys.push(json!({"pubkey": RAYDIUM_AMM_V4, "signer": false}));

        json!({
            "blockTime": 1704067200,
            "meta": {
                "err": null,
                "preTokenBalances": [],
                "postTokenBalances": [],
                "loadedAddresses": {"writable": ["LoadedUserSource"], "readonly": []},
                "logMessages": [
                    format!("Program {} invoke [1]", RAYDIUM_AMM_V4),
                    format!("Program log: ray_log: {}", ray_log(direction)),
                    format!("Program {} success", RAYDIUM_AMM_V4)
                ]
            },
            "transaction": {
                "signatures": [sig],
                "message": {
                    "accountKeys": keys,
                    "instructions": [{
                        "programId": RAYDIUM_AMM_V4,
                        "accounts": accounts,
                        "data": bs58::encode(data).into_string()
                    }]
                }
            }
        })
    }

    #[tokio::test]
    async fn test_ray_log_oriented_by_direction() {
        let base = [1u8; 32];
        let quote = [2u8; 32];
        let chain = FakeChain::default().with_account(POOL, pool_account(base, quote));
        let (decoder, chain) = decoder_for(chain, quick_config());

        // Coin2PC: base in, quote out.
        let sig = test_signature(7);
        let record = decoder.decode_value(&sig, &v4_swap_tx(&sig, 2)).await.unwrap();
        assert_eq!(record.amms, vec!["RAYDIUM"]);
        assert_eq!(record.token_in_mint, bs58::encode(base).into_string());
        assert_eq!(record.token_in_amount, "1000000000");
        assert_eq!(record.token_in_decimals, 9);
        assert_eq!(record.token_out_mint, bs58::encode(quote).into_string());
        assert_eq!(record.token_out_amount, "95000000");
        assert_eq!(record.token_out_decimals, 6);
        assert_eq!(record.signers, vec!["Trader"]);

        // PC2Coin: quote in, base out. Pool metadata comes from the cache.
        let sig = test_signature(8);
        let record = decoder.decode_value(&sig, &v4_swap_tx(&sig, 1)).await.unwrap();
        assert_eq!(record.token_in_mint, bs58::encode(quote).into_string());
        assert_eq!(record.token_out_mint, bs58::encode(base).into_string());

        // One pool fetch; the fixed-offset strategy never reached the network
        // because an instruction account was outside the static keys.
        assert_eq!(chain.account_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_pool_is_invalid_token_account() {
        let (decoder, _) = decoder_for(FakeChain::default(), quick_config());

        let sig = test_signature(9);
        let err = decoder.decode_value(&sig, &v4_swap_tx(&sig, 2)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidTokenAccount);
    }
}
