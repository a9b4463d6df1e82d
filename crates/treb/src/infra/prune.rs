//! C10 — registry pruner.
//!
//! Given a blockchain probe, finds chain-local registry entries whose
//! on-chain footprint has disappeared and removes them.

use {
    crate::domain::{
        deployment::Deployment,
        error::ProbeError,
        safe::SafeTransaction,
        transaction::{Transaction, TransactionId, TransactionStatus},
    },
    alloy_primitives::{Address, B256},
    async_trait::async_trait,
};

/// A minimal read-only view of a chain, used only to decide prunability.
#[async_trait]
pub trait ChainProbe: Send + Sync {
    async fn code_at(&self, address: Address) -> Result<Vec<u8>, ProbeError>;
    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptView>, ProbeError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiptView {
    pub block_number: u64,
}

#[derive(Debug, Default)]
pub struct PruneReport {
    pub deployment_ids: Vec<String>,
    pub transaction_ids: Vec<TransactionId>,
    pub safe_tx_hashes: Vec<B256>,
}

async fn has_empty_code(probe: &dyn ChainProbe, address: Address) -> bool {
    match probe.code_at(address).await {
        Ok(code) => code.is_empty(),
        // Probing errors are conservative: never treat a failed probe as
        // evidence of absence.
        Err(_) => false,
    }
}

/// A deployment is prunable when its own code is gone; a proxy additionally
/// prunes when its implementation's code is gone.
pub async fn deployment_is_prunable(probe: &dyn ChainProbe, deployment: &Deployment) -> bool {
    if !has_empty_code(probe, deployment.address).await {
        return false;
    }
    match &deployment.proxy_info {
        Some(info) => has_empty_code(probe, info.implementation).await,
        None => true,
    }
}

/// A `status=Executed` transaction is prunable when it has no `tx_hash`, or
/// its receipt is absent, or the receipt's block disagrees with the
/// recorded one.
pub async fn transaction_is_prunable(probe: &dyn ChainProbe, tx: &Transaction) -> bool {
    if tx.status != TransactionStatus::Executed {
        return false;
    }
    let Some(hash) = tx.tx_hash else {
        return true;
    };
    match probe.receipt(hash).await {
        Ok(Some(receipt)) => tx.block_number.is_some_and(|b| b != receipt.block_number),
        Ok(None) => true,
        Err(_) => false,
    }
}

/// A `SafeTransaction` is prunable when the Safe itself has no code, or it
/// is executed but its execution hash has no receipt.
pub async fn safe_transaction_is_prunable(probe: &dyn ChainProbe, safe_tx: &SafeTransaction) -> bool {
    if has_empty_code(probe, safe_tx.safe).await {
        return true;
    }
    if safe_tx.executed {
        match safe_tx.execution_tx_hash {
            Some(hash) => matches!(probe.receipt(hash).await, Ok(None)),
            None => true,
        }
    } else {
        false
    }
}

/// Scans the three collections and returns the prunable entries. Does not
/// mutate anything; [`crate::infra::registry::Registry`] callers apply the
/// report via `execute_prune`.
pub async fn scan(
    probe: &dyn ChainProbe,
    deployments: &[Deployment],
    transactions: &[Transaction],
    safe_transactions: &[SafeTransaction],
) -> PruneReport {
    let mut report = PruneReport::default();
    for d in deployments {
        if deployment_is_prunable(probe, d).await {
            report.deployment_ids.push(d.id.clone());
        }
    }
    for tx in transactions {
        if transaction_is_prunable(probe, tx).await {
            report.transaction_ids.push(tx.id);
        }
    }
    for safe_tx in safe_transactions {
        if safe_transaction_is_prunable(probe, safe_tx).await {
            report.safe_tx_hashes.push(safe_tx.safe_tx_hash);
        }
    }
    report
}

/// Deletes the flagged entries (and any transaction reference to a pruned
/// deployment) from the supplied collections in place.
pub fn execute_prune(
    report: &PruneReport,
    deployments: &mut Vec<Deployment>,
    transactions: &mut Vec<Transaction>,
    safe_transactions: &mut Vec<SafeTransaction>,
) {
    let pruned_deployment_ids: std::collections::HashSet<_> = report.deployment_ids.iter().collect();
    let pruned_deployment_tx_ids: std::collections::HashSet<TransactionId> = deployments
        .iter()
        .filter(|d| pruned_deployment_ids.contains(&d.id))
        .map(|d| d.transaction_id)
        .collect();
    deployments.retain(|d| !pruned_deployment_ids.contains(&d.id));

    let pruned_tx_ids: std::collections::HashSet<_> = report.transaction_ids.iter().copied().chain(pruned_deployment_tx_ids).collect();
    transactions.retain(|tx| !pruned_tx_ids.contains(&tx.id));

    let pruned_safe: std::collections::HashSet<_> = report.safe_tx_hashes.iter().collect();
    safe_transactions.retain(|s| !pruned_safe.contains(&s.safe_tx_hash));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deployment::{ArtifactRef, CreateMethod, DeploymentStrategy, DeploymentType, ProxyInfo, Verification};
    use alloy_primitives::{Bytes, U256};
    use std::{collections::HashMap, sync::Mutex};

    struct FakeProbe {
        code: HashMap<Address, Vec<u8>>,
        receipts: Mutex<HashMap<B256, ReceiptView>>,
    }

    #[async_trait]
    impl ChainProbe for FakeProbe {
        async fn code_at(&self, address: Address) -> Result<Vec<u8>, ProbeError> {
            Ok(self.code.get(&address).cloned().unwrap_or_default())
        }
        async fn receipt(&self, hash: B256) -> Result<Option<ReceiptView>, ProbeError> {
            Ok(self.receipts.lock().unwrap().get(&hash).copied())
        }
    }

    fn deployment(id: &str, address: Address, proxy_info: Option<ProxyInfo>) -> Deployment {
        let now = chrono::Utc::now();
        Deployment {
            id: id.to_string(),
            namespace: "default".to_string(),
            chain_id: 1,
            contract_name: "Counter".to_string(),
            label: None,
            address,
            r#type: if proxy_info.is_some() { DeploymentType::Proxy } else { DeploymentType::Singleton },
            transaction_id: B256::repeat_byte(1),
            strategy: DeploymentStrategy {
                method: CreateMethod::Create,
                salt: None,
                init_code_hash: B256::ZERO,
                constructor_args: Bytes::new(),
                factory: Address::ZERO,
                entropy: None,
            },
            proxy_info,
            artifact: ArtifactRef {
                path: String::new(),
                bytecode_hash: B256::ZERO,
                script_path: String::new(),
                git_commit: None,
                compiler_version: None,
            },
            verification: Verification::default(),
            tags: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn deployment_with_code_is_not_prunable() {
        let address = Address::repeat_byte(1);
        let probe = FakeProbe {
            code: HashMap::from([(address, vec![0x60])]),
            receipts: Mutex::new(HashMap::new()),
        };
        assert!(!deployment_is_prunable(&probe, &deployment("d", address, None)).await);
    }

    #[tokio::test]
    async fn deployment_with_no_code_is_prunable() {
        let address = Address::repeat_byte(1);
        let probe = FakeProbe { code: HashMap::new(), receipts: Mutex::new(HashMap::new()) };
        assert!(deployment_is_prunable(&probe, &deployment("d", address, None)).await);
    }

    #[tokio::test]
    async fn proxy_requires_both_proxy_and_implementation_empty() {
        let proxy = Address::repeat_byte(1);
        let implementation = Address::repeat_byte(2);
        let probe = FakeProbe {
            code: HashMap::from([(implementation, vec![0x60])]),
            receipts: Mutex::new(HashMap::new()),
        };
        let info = ProxyInfo { implementation, kind: crate::domain::proxy::ProxyKind::Uups };
        assert!(!deployment_is_prunable(&probe, &deployment("d", proxy, Some(info))).await);
    }

    #[tokio::test]
    async fn executed_transaction_without_hash_is_prunable() {
        let probe = FakeProbe { code: HashMap::new(), receipts: Mutex::new(HashMap::new()) };
        let tx = Transaction {
            id: B256::repeat_byte(1),
            sender: Address::ZERO,
            to: Address::ZERO,
            value: U256::ZERO,
            data: Bytes::new(),
            status: TransactionStatus::Executed,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            safe_batch_idx: None,
            safe_ref: None,
            trace_subtree: None,
        };
        assert!(transaction_is_prunable(&probe, &tx).await);
    }

    #[tokio::test]
    async fn block_number_mismatch_is_prunable() {
        let hash = B256::repeat_byte(9);
        let probe = FakeProbe {
            code: HashMap::new(),
            receipts: Mutex::new(HashMap::from([(hash, ReceiptView { block_number: 99 })])),
        };
        let tx = Transaction {
            id: B256::repeat_byte(1),
            sender: Address::ZERO,
            to: Address::ZERO,
            value: U256::ZERO,
            data: Bytes::new(),
            status: TransactionStatus::Executed,
            tx_hash: Some(hash),
            block_number: Some(1),
            gas_used: None,
            safe_batch_idx: None,
            safe_ref: None,
            trace_subtree: None,
        };
        assert!(transaction_is_prunable(&probe, &tx).await);
    }

    #[tokio::test]
    async fn execute_prune_removes_entries_and_their_transaction_references() {
        let mut deployments = vec![deployment("d", Address::repeat_byte(1), None)];
        let mut transactions = vec![Transaction {
            id: B256::repeat_byte(1),
            sender: Address::ZERO,
            to: Address::ZERO,
            value: U256::ZERO,
            data: Bytes::new(),
            status: TransactionStatus::Simulated,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            safe_batch_idx: None,
            safe_ref: None,
            trace_subtree: None,
        }];
        let mut safe_transactions = vec![];
        let report = PruneReport {
            deployment_ids: vec!["d".to_string()],
            transaction_ids: vec![],
            safe_tx_hashes: vec![],
        };
        execute_prune(&report, &mut deployments, &mut transactions, &mut safe_transactions);
        assert!(deployments.is_empty());
        assert!(transactions.is_empty());
    }
}
