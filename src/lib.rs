// Library interface for the plasma side-chain operator.
// This allows tests and external consumers to use the ledger core directly.

pub mod block;
pub mod config;
pub mod confirmer;
pub mod crypto;
pub mod error;
pub mod mempool;
pub mod merkle;
pub mod operator;
pub mod rootchain;
pub mod rpc;
pub mod storage;
pub mod tx;

pub use block::{Block, BlockHeader, BlockMetadata};
pub use crypto::{Address, Hash, Signature, EXIT_ADDRESS};
pub use error::LedgerError;
pub use mempool::{Mempool, TxInclusion, MAX_MEMPOOL_SIZE};
pub use merkle::MerkleTree;
pub use operator::Operator;
pub use storage::{BlockResult, Store};
pub use tx::{ConfirmedTransaction, Input, Output, SpendIdentifier, Transaction, FEE_TX_IDX};
