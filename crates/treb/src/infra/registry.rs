//! C8 — registry projector.
//!
//! The persisted aggregate of deployments, transactions, and Safe
//! transactions, held behind a single in-process `RwLock` and mirrored to
//! three JSON documents under `<data_dir>/<network>/`.

use {
    crate::domain::{
        deployment::Deployment,
        error::ProjectionError,
        hydrate::HydratedRunResult,
        safe::SafeTransaction,
        transaction::{Transaction, TransactionId},
    },
    alloy_primitives::{Address, B256},
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
    },
    tokio::sync::RwLock,
};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct DeploymentsDoc {
    deployments: Vec<Deployment>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct TransactionsDoc {
    transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct SafeTxsDoc {
    safe_transactions: Vec<SafeTransaction>,
}

#[derive(Debug, Clone, Default)]
struct RegistryState {
    deployments: HashMap<String, Deployment>,
    transactions: HashMap<TransactionId, Transaction>,
    safe_transactions: HashMap<B256, SafeTransaction>,
    by_chain_address: HashMap<(u64, Address), String>,
}

impl RegistryState {
    fn reindex(&mut self) {
        self.by_chain_address.clear();
        for d in self.deployments.values() {
            self.by_chain_address.insert((d.chain_id, d.address), d.id.clone());
        }
    }
}

pub struct Registry {
    state: RwLock<RegistryState>,
    network_dir: PathBuf,
}

fn doc_path(network_dir: &Path, name: &str) -> PathBuf {
    network_dir.join(name)
}

fn load_doc<T: Default + serde::de::DeserializeOwned>(path: &Path) -> Result<T, ProjectionError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ProjectionError> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl Registry {
    /// Loads (or initializes) the registry for one network under
    /// `<data_dir>/<network>`.
    pub fn load(data_dir: &Path, network: &str) -> Result<Self, ProjectionError> {
        let network_dir = data_dir.join(network);
        std::fs::create_dir_all(&network_dir)?;

        let deployments: DeploymentsDoc = load_doc(&doc_path(&network_dir, "deployments.json"))?;
        let transactions: TransactionsDoc = load_doc(&doc_path(&network_dir, "transactions.json"))?;
        let safe_txs: SafeTxsDoc = load_doc(&doc_path(&network_dir, "safe-txs.json"))?;

        let mut state = RegistryState {
            deployments: deployments.deployments.into_iter().map(|d| (d.id.clone(), d)).collect(),
            transactions: transactions.transactions.into_iter().map(|t| (t.id, t)).collect(),
            safe_transactions: safe_txs
                .safe_transactions
                .into_iter()
                .map(|s| (s.safe_tx_hash, s))
                .collect(),
            by_chain_address: HashMap::new(),
        };
        state.reindex();

        Ok(Self {
            state: RwLock::new(state),
            network_dir,
        })
    }

    pub async fn deployment(&self, id: &str) -> Option<Deployment> {
        self.state.read().await.deployments.get(id).cloned()
    }

    pub async fn deployment_by_address(&self, chain_id: u64, address: Address) -> Option<Deployment> {
        let state = self.state.read().await;
        let id = state.by_chain_address.get(&(chain_id, address))?;
        state.deployments.get(id).cloned()
    }

    pub async fn transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.state.read().await.transactions.get(&id).cloned()
    }

    /// Applies `result` to the registry under an exclusive lock. On any
    /// insertion error the in-memory state is rolled back to the
    /// pre-projection snapshot and nothing is persisted.
    pub async fn project(&self, result: HydratedRunResult) -> Result<(), ProjectionError> {
        let mut guard = self.state.write().await;
        let snapshot = guard.clone();

        match Self::apply(&mut guard, result) {
            Ok(()) => {}
            Err(err) => {
                *guard = snapshot;
                return Err(err);
            }
        }

        guard.reindex();
        if let Err(err) = self.persist(&guard) {
            *guard = snapshot;
            return Err(err);
        }
        Ok(())
    }

    fn apply(state: &mut RegistryState, result: HydratedRunResult) -> Result<(), ProjectionError> {
        for deployment in result.deployments {
            if state.deployments.contains_key(&deployment.id) {
                return Err(ProjectionError::DeploymentAlreadyExists { id: deployment.id });
            }
            state.deployments.insert(deployment.id.clone(), deployment);
        }

        for tx in result.transactions {
            match state.transactions.get(&tx.id).cloned() {
                Some(existing) => {
                    let stronger = existing.status.stronger(tx.status);
                    let previous_status = existing.status;
                    let mut merged = existing;
                    if stronger != previous_status {
                        merged.status = stronger;
                        merged.tx_hash = tx.tx_hash.or(merged.tx_hash);
                        merged.block_number = tx.block_number.or(merged.block_number);
                        merged.gas_used = tx.gas_used.or(merged.gas_used);
                        merged.safe_ref = tx.safe_ref.or(merged.safe_ref);
                        merged.safe_batch_idx = tx.safe_batch_idx.or(merged.safe_batch_idx);
                    }
                    state.transactions.insert(tx.id, merged);
                }
                None => {
                    state.transactions.insert(tx.id, tx);
                }
            }
        }

        for safe_tx in result.safe_transactions {
            match state.safe_transactions.get(&safe_tx.safe_tx_hash).cloned() {
                Some(existing) => {
                    let mut merged = existing;
                    merged.transaction_ids = safe_tx.transaction_ids;
                    merged.executed = safe_tx.executed;
                    merged.execution_tx_hash = safe_tx.execution_tx_hash.or(merged.execution_tx_hash);
                    merged.execution_block = safe_tx.execution_block.or(merged.execution_block);
                    state.safe_transactions.insert(safe_tx.safe_tx_hash, merged);
                }
                None => {
                    state.safe_transactions.insert(safe_tx.safe_tx_hash, safe_tx);
                }
            }
        }

        Ok(())
    }

    fn persist(&self, state: &RegistryState) -> Result<(), ProjectionError> {
        let deployments = DeploymentsDoc {
            deployments: state.deployments.values().cloned().collect(),
        };
        let transactions = TransactionsDoc {
            transactions: state.transactions.values().cloned().collect(),
        };
        let safe_txs = SafeTxsDoc {
            safe_transactions: state.safe_transactions.values().cloned().collect(),
        };

        write_atomic(&doc_path(&self.network_dir, "deployments.json"), &serde_json::to_vec_pretty(&deployments)?)?;
        write_atomic(&doc_path(&self.network_dir, "transactions.json"), &serde_json::to_vec_pretty(&transactions)?)?;
        write_atomic(&doc_path(&self.network_dir, "safe-txs.json"), &serde_json::to_vec_pretty(&safe_txs)?)?;
        Ok(())
    }
}
