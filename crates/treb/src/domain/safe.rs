//! `SafeTransaction` — a Safe-batched group of transactions.

use {alloy_primitives::{Address, B256}, crate::domain::transaction::TransactionId};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SafeTransaction {
    pub safe_tx_hash: B256,
    pub safe: Address,
    pub proposer: Address,
    pub transaction_ids: Vec<TransactionId>,
    pub executed: bool,
    pub execution_tx_hash: Option<B256>,
    pub execution_block: Option<u64>,
    #[serde(default)]
    pub confirmations: Vec<Address>,
}
