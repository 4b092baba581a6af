pub mod alt_resolver;
pub mod error;
pub mod layout;
pub mod logs;
pub mod protocols;
pub mod reconcile;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod swap_record;
pub mod transport;
pub mod tx_facts;

// Entry point
pub use service::{DecoderConfig, SwapDecoder, validate_signature};

// Errors
pub use error::{DecodeError, ErrorKind, LayoutError, TransportError};

// Output record
pub use swap_record::{Action, SwapRecord, to_ui_amount};

// Network seams
pub use retry::{RetryPolicy, Retryable, with_retry};
pub use transport::{MetadataSource, TransactionSource};

// Normalizer
pub use alt_resolver::resolve_full_account_keys;
pub use tx_facts::{BalanceDelta, RawInstruction, TokenBalance, TxFacts, flatten_instructions};

pub use protocols::Decoder;
pub use resolver::{PoolMetadata, TokenInfo, TokenResolver};
