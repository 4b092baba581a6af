//! Decode entry point.

use log::{debug, info};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{DecodeError, ErrorKind};
use crate::protocols::{recognized_amms, select_decoder};
use crate::reconcile;
use crate::resolver::TokenResolver;
use crate::retry::{RetryPolicy, with_retry};
use crate::swap_record::SwapRecord;
use crate::transport::{MetadataSource, TransactionSource};
use crate::tx_facts::TxFacts;

const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub retry: RetryPolicy,
    pub token_cache_capacity: usize,
    pub pool_cache_capacity: usize,

    /// Attach the fetched transaction to each record.
    pub include_raw: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            token_cache_capacity: 1000,
            pool_cache_capacity: 100,
            include_raw: false,
        }
    }
}

/// Base58 that decodes to a 64-byte ed25519 signature.
pub fn validate_signature(signature: &str) -> Result<(), DecodeError> {
    match bs58::decode(signature).into_vec() {
        Ok(bytes) if bytes.len() == SIGNATURE_LEN => Ok(()),
        Ok(bytes) => Err(DecodeError::new(
            ErrorKind::InvalidSignatureFormat,
            format!("signature decodes to {} bytes, expected {}", bytes.len(), SIGNATURE_LEN),
        )),
        Err(e) => Err(DecodeError::new(
            ErrorKind::InvalidSignatureFormat,
            format!("signature is not base58: {}", e),
        )),
    }
}

/// Owns the transport and the metadata caches; share one instance across
/// concurrent decodes.
pub struct SwapDecoder {
    transactions: Arc<dyn TransactionSource>,
    resolver: TokenResolver,
    config: DecoderConfig,
}

impl SwapDecoder {
    pub fn new(
        transactions: Arc<dyn TransactionSource>,
        metadata: Option<Arc<dyn MetadataSource>>,
        config: DecoderConfig,
    ) -> Self {
        let resolver = TokenResolver::new(
            metadata,
            config.retry.clone(),
            config.token_cache_capacity,
            config.pool_cache_capacity,
        );
        Self {
            transactions,
            resolver,
            config,
        }
    }

    pub fn resolver(&self) -> &TokenResolver {
        &self.resolver
    }

    /// Validate, fetch (with retry) and decode one transaction.
    pub async fn decode_transaction(&self, signature: &str) -> Result<SwapRecord, DecodeError> {
        validate_signature(signature)?;

        let fetched = with_retry(&self.config.retry, "fetch_transaction", || {
            self.transactions.fetch_transaction(signature)
        })
        .await?;

        let Some(tx) = fetched else {
            return Err(DecodeError::new(
                ErrorKind::TransactionNotFound,
                format!("transaction {} not found", signature),
            ));
        };

        self.decode_value(signature, &tx).await
    }

    /// Decode an already-fetched `getTransaction` result.
    pub async fn decode_value(&self, signature: &str, tx: &Value) -> Result<SwapRecord, DecodeError> {
        let facts = TxFacts::from_json(tx, signature);

        if facts.instructions.is_empty() {
            return Err(DecodeError::new(
                ErrorKind::InvalidInstruction,
                "transaction has no instructions",
            ));
        }

        let Some(decoder) = select_decoder(&facts.instructions) else {
            return Err(DecodeError::new(
                ErrorKind::UnknownAmm,
                "no supported AMM program in transaction",
            ));
        };
        let amms = recognized_amms(&facts.instructions);
        debug!("{} matched {} (amms {:?})", signature, decoder.tag(), amms);

        let legs = decoder.decode(&facts, &self.resolver).await?;

        let raw = self.config.include_raw.then(|| tx.clone());
        let record = reconcile::assemble(&facts, legs, amms, &self.resolver, raw).await;

        info!(
            "decoded {} via {}: {} {} -> {} {}",
            signature,
            decoder.tag(),
            record.token_in_amount,
            record.token_in_mint,
            record.token_out_amount,
            record.token_out_mint
        );
        Ok(record)
    }
}
