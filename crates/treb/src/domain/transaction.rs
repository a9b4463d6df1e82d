//! In-memory `Transaction` and its status lattice.

use alloy_primitives::{Address, B256, Bytes};

/// A 32-byte opaque identifier minted by the external script for every
/// simulated transaction; the join key across events, safe-transactions,
/// and deployments.
pub type TransactionId = B256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum TransactionStatus {
    Simulated,
    Queued,
    Executed,
    Failed,
}

impl TransactionStatus {
    /// Monotonic upgrade: returns the stronger of `self` and `other` in the
    /// lattice `Simulated < Queued < Executed`. `Failed` is a terminal,
    /// non-comparable state: once failed, a transaction never "upgrades".
    pub fn stronger(self, other: Self) -> Self {
        use TransactionStatus::*;
        match (self, other) {
            (Failed, _) => Failed,
            (_, Failed) => Failed,
            _ => self.max(other),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender: Address,
    pub to: Address,
    pub value: alloy_primitives::U256,
    pub data: Bytes,
    pub status: TransactionStatus,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub safe_batch_idx: Option<usize>,
    pub safe_ref: Option<B256>,
    #[serde(skip)]
    pub trace_subtree: Option<crate::domain::trace::TraceNode>,
}

impl Transaction {
    pub fn new_simulated(id: TransactionId, sender: Address, to: Address, value: alloy_primitives::U256, data: Bytes) -> Self {
        Self {
            id,
            sender,
            to,
            value,
            data,
            status: TransactionStatus::Simulated,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            safe_batch_idx: None,
            safe_ref: None,
            trace_subtree: None,
        }
    }

    /// Every non-`Simulated` transaction has either a `tx_hash` or a
    /// `safe_ref`.
    pub fn satisfies_execution_invariant(&self) -> bool {
        self.status == TransactionStatus::Simulated
            || self.tx_hash.is_some()
            || self.safe_ref.is_some()
    }
}
