//! Seams to the network. Implementations make a single attempt per call;
//! retrying is the decoder's job.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// `getTransaction` result in `jsonParsed` shape; `None` when the
    /// transaction is unknown to the node.
    async fn fetch_transaction(&self, signature: &str) -> Result<Option<Value>, TransportError>;
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_mint_decimals(&self, mint: &str) -> Result<u8, TransportError>;

    /// Raw data of an on-chain account; `None` when it does not exist.
    async fn fetch_account_data(&self, address: &str) -> Result<Option<Vec<u8>>, TransportError>;
}
