use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use txparse::{MetadataSource, TransactionSource, TransportError};

/// `decimals` byte of an SPL mint account.
const MINT_DECIMALS_OFFSET: usize = 44;

/// Single-attempt JSON-RPC client; retries belong to the decoder's policy.
#[derive(Clone)]
pub struct RpcClient {
    http: Client,
    url: String,
    semaphore: Arc<Semaphore>,
}

impl RpcClient {
    pub fn new(url: String, timeout: Duration, concurrency: usize) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| TransportError::Other(format!("semaphore closed: {e}")))?;

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let r = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Other(format!("rpc request failed: {e}")))?;

        let status = r.status();
        if status.as_u16() == 429 {
            return Err(TransportError::RateLimited(format!("{} returned 429", method)));
        }
        if !status.is_success() {
            return Err(TransportError::Other(format!(
                "{} http status {}",
                method, status
            )));
        }

        let v: Value = r
            .json()
            .await
            .map_err(|e| TransportError::Other(format!("rpc decode error: {e}")))?;

        if let Some(error) = v.get("error") {
            // -32429 is how some providers report throttling in-band
            if error.get("code").and_then(|c| c.as_i64()) == Some(-32429) {
                return Err(TransportError::RateLimited(error.to_string()));
            }
            return Err(TransportError::Other(format!("rpc error: {}", error)));
        }

        v.get("result")
            .cloned()
            .ok_or_else(|| TransportError::Other("missing result field".into()))
    }
}

#[async_trait]
impl TransactionSource for RpcClient {
    async fn fetch_transaction(&self, signature: &str) -> Result<Option<Value>, TransportError> {
        let params = json!([
            signature,
            {"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0, "commitment": "confirmed"}
        ]);
        let result = self.call("getTransaction", params).await?;
        Ok((!result.is_null()).then_some(result))
    }
}

#[async_trait]
impl MetadataSource for RpcClient {
    async fn fetch_mint_decimals(&self, mint: &str) -> Result<u8, TransportError> {
        let data = self
            .fetch_account_data(mint)
            .await?
            .ok_or_else(|| TransportError::Other(format!("mint {} not found", mint)))?;
        data.get(MINT_DECIMALS_OFFSET).copied().ok_or_else(|| {
            TransportError::Other(format!("mint {} account is {} bytes", mint, data.len()))
        })
    }

    async fn fetch_account_data(&self, address: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let params = json!([address, {"encoding": "base64"}]);
        let result = self.call("getAccountInfo", params).await?;

        let Some(encoded) = result
            .pointer("/value/data/0")
            .and_then(|v| v.as_str())
        else {
            debug!("account {} not found", address);
            return Ok(None);
        };

        STANDARD
            .decode(encoded)
            .map(Some)
            .map_err(|e| TransportError::Other(format!("account {} data: {e}", address)))
    }
}
