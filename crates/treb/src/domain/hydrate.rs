//! C5 — run hydrator.
//!
//! Folds events, the trace arena, and (optionally) the broadcast file into
//! a [`HydratedRunResult`]. `hydrate` is a pure function of its inputs; it
//! is never shared across runs.

use {
    crate::{
        boundary::broadcast::{self, BroadcastFile},
        domain::{
            deployment::{ArtifactRef, Deployment, DeploymentStrategy, DeploymentType, Verification},
            error::HydrateError,
            event::{self, Event, RawLog},
            proxy::{ProxyGraph, ProxyRelationship},
            safe::SafeTransaction,
            trace::Arena,
            transaction::{Transaction, TransactionId, TransactionStatus},
        },
    },
    alloy_primitives::{Address, B256},
    std::{collections::HashMap, path::Path},
};

#[derive(Debug, Clone, Default)]
pub struct RawOutputs {
    pub raw_logs: Vec<RawLog>,
    pub arena: Arena,
    pub returns: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CollisionEvent {
    pub existing_contract: Address,
    pub deployer: Address,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone)]
pub struct HydratedRunResult {
    pub run_result: RawOutputs,
    pub transactions: Vec<Transaction>,
    pub safe_transactions: Vec<SafeTransaction>,
    pub deployments: Vec<Deployment>,
    pub proxy_relationships: HashMap<Address, ProxyRelationship>,
    pub collisions: HashMap<Address, CollisionEvent>,
    pub events: Vec<Event>,
}

/// `<artifact_path>:<ContractName>` → `ContractName`, falling back to the
/// whole string if the artifact doesn't carry the `:Name` suffix.
fn contract_name_from_artifact(artifact: &str) -> String {
    artifact
        .rsplit_once(':')
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| artifact.to_string())
}

struct Fold {
    transactions: Vec<Transaction>,
    tx_index: HashMap<TransactionId, usize>,
    safe_transactions: Vec<SafeTransaction>,
    safe_index: HashMap<B256, usize>,
    deployments: Vec<Deployment>,
    proxy_graph: ProxyGraph,
    collisions: HashMap<Address, CollisionEvent>,
}

impl Fold {
    fn new() -> Self {
        Self {
            transactions: vec![],
            tx_index: HashMap::new(),
            safe_transactions: vec![],
            safe_index: HashMap::new(),
            deployments: vec![],
            proxy_graph: ProxyGraph::new(),
            collisions: HashMap::new(),
        }
    }

    fn apply(&mut self, event: &Event, namespace: &str, chain_id: u64, now: chrono::DateTime<chrono::Utc>) {
        match event {
            Event::TransactionSimulated { simulated_tx } => {
                let tx = Transaction::new_simulated(
                    simulated_tx.transaction_id,
                    simulated_tx.sender,
                    simulated_tx.to,
                    simulated_tx.value,
                    simulated_tx.data.clone(),
                );
                self.tx_index.insert(tx.id, self.transactions.len());
                self.transactions.push(tx);
            }
            Event::SafeTransactionQueued {
                safe,
                proposer,
                safe_tx_hash,
                transaction_ids,
            } => {
                for (batch_idx, id) in transaction_ids.iter().enumerate() {
                    if let Some(&i) = self.tx_index.get(id) {
                        self.transactions[i].status = TransactionStatus::Queued;
                        self.transactions[i].safe_ref = Some(*safe_tx_hash);
                        self.transactions[i].safe_batch_idx = Some(batch_idx);
                    }
                }
                self.safe_index.insert(*safe_tx_hash, self.safe_transactions.len());
                self.safe_transactions.push(SafeTransaction {
                    safe_tx_hash: *safe_tx_hash,
                    safe: *safe,
                    proposer: *proposer,
                    transaction_ids: transaction_ids.clone(),
                    executed: false,
                    execution_tx_hash: None,
                    execution_block: None,
                    confirmations: vec![],
                });
            }
            Event::SafeTransactionExecuted {
                safe,
                safe_tx_hash,
                transaction_ids,
                ..
            } => {
                for id in transaction_ids {
                    if let Some(&i) = self.tx_index.get(id) {
                        self.transactions[i].status = TransactionStatus::Executed;
                        self.transactions[i].safe_ref = Some(*safe_tx_hash);
                    }
                }
                match self.safe_index.get(safe_tx_hash) {
                    Some(&i) => self.safe_transactions[i].executed = true,
                    None => {
                        self.safe_index.insert(*safe_tx_hash, self.safe_transactions.len());
                        self.safe_transactions.push(SafeTransaction {
                            safe_tx_hash: *safe_tx_hash,
                            safe: *safe,
                            proposer: Address::ZERO,
                            transaction_ids: transaction_ids.clone(),
                            executed: true,
                            execution_tx_hash: None,
                            execution_block: None,
                            confirmations: vec![],
                        });
                    }
                }
            }
            Event::ContractDeployed {
                location,
                transaction_id,
                deployment,
                ..
            } => {
                let contract_name = contract_name_from_artifact(&deployment.artifact);
                let id = Deployment::make_id(namespace, chain_id, &contract_name, deployment.label.as_deref());
                self.deployments.push(Deployment {
                    id,
                    namespace: namespace.to_string(),
                    chain_id,
                    contract_name,
                    label: deployment.label.clone(),
                    address: *location,
                    r#type: DeploymentType::Singleton,
                    transaction_id: *transaction_id,
                    strategy: DeploymentStrategy {
                        method: deployment.create_strategy,
                        salt: deployment.salt,
                        init_code_hash: deployment.init_code_hash,
                        constructor_args: deployment.constructor_args.clone(),
                        factory: crate::domain::deployment::CREATEX_FACTORY,
                        entropy: deployment.entropy.map(|e| e.to_string()),
                    },
                    proxy_info: None,
                    artifact: ArtifactRef {
                        path: deployment.artifact.clone(),
                        bytecode_hash: deployment.bytecode_hash,
                        script_path: String::new(),
                        git_commit: None,
                        compiler_version: None,
                    },
                    verification: Verification::default(),
                    tags: vec![],
                    created_at: now,
                    updated_at: now,
                });
            }
            Event::DeploymentCollision {
                existing_contract,
                deployer,
                transaction_id,
            } => {
                self.collisions.insert(
                    *existing_contract,
                    CollisionEvent {
                        existing_contract: *existing_contract,
                        deployer: *deployer,
                        transaction_id: *transaction_id,
                    },
                );
            }
            Event::Upgraded { proxy, implementation } => self.proxy_graph.upgraded(*proxy, *implementation),
            Event::AdminChanged { proxy, new, .. } => self.proxy_graph.admin_changed(*proxy, *new),
            Event::BeaconUpgraded { proxy, beacon } => self.proxy_graph.beacon_upgraded(*proxy, *beacon),
        }
    }

    fn finish(mut self) -> (Vec<Transaction>, Vec<SafeTransaction>, Vec<Deployment>, ProxyGraph, HashMap<Address, CollisionEvent>) {
        for deployment in &mut self.deployments {
            if let Some(rel) = self.proxy_graph.get(&deployment.address) {
                deployment.r#type = DeploymentType::Proxy;
                deployment.proxy_info = Some(crate::domain::deployment::ProxyInfo {
                    implementation: rel.implementation,
                    kind: rel.kind,
                });
            }
        }
        (
            self.transactions,
            self.safe_transactions,
            self.deployments,
            self.proxy_graph,
            self.collisions,
        )
    }
}

fn fold_events(events: &[Event], namespace: &str, chain_id: u64) -> Fold {
    let now = chrono::Utc::now();
    let mut fold = Fold::new();
    for event in events {
        fold.apply(event, namespace, chain_id, now);
    }
    fold
}

fn apply_broadcast(
    transactions: &mut [Transaction],
    safe_transactions: &mut [SafeTransaction],
    broadcast_path: Option<&Path>,
) -> Result<(), HydrateError> {
    let Some(path) = broadcast_path else {
        return Ok(());
    };
    let contents = std::fs::read_to_string(path).map_err(|source| HydrateError::BroadcastRead {
        path: path.display().to_string(),
        source,
    })?;
    let file: BroadcastFile = serde_json::from_str(&contents).map_err(|source| HydrateError::BroadcastParse {
        path: path.display().to_string(),
        source,
    })?;
    broadcast::reconcile(transactions, safe_transactions, &file);
    Ok(())
}

pub fn hydrate(
    raw: RawOutputs,
    namespace: &str,
    chain_id: u64,
    broadcast_path: Option<&Path>,
) -> Result<HydratedRunResult, HydrateError> {
    let mut decode_errors = vec![];
    let events = event::parse(&raw.raw_logs, &mut decode_errors);
    for err in &decode_errors {
        tracing::warn!(?err, "skipping log with undecodable known event signature");
    }

    let fold = fold_events(&events, namespace, chain_id);
    let (mut transactions, mut safe_transactions, deployments, proxy_graph, collisions) = fold.finish();

    debug_assert!(proxy_graph.is_acyclic(), "proxy graph must stay acyclic");

    raw.arena.extract_for(&mut transactions);
    apply_broadcast(&mut transactions, &mut safe_transactions, broadcast_path)?;

    for tx in &transactions {
        debug_assert!(
            tx.satisfies_execution_invariant(),
            "execution invariant violated for transaction {:?}",
            tx.id
        );
    }

    Ok(HydratedRunResult {
        run_result: raw,
        transactions,
        safe_transactions,
        deployments,
        proxy_relationships: proxy_graph.into_map(),
        collisions,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        deployment::CreateMethod,
        event::{DeploymentInfo, SimulatedTx},
    };
    use alloy_primitives::{Bytes, U256};

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }
    fn hash(b: u8) -> B256 {
        B256::repeat_byte(b)
    }

    fn simulated(id: u8, sender: Address, to: Address, data: Vec<u8>) -> Event {
        Event::TransactionSimulated {
            simulated_tx: SimulatedTx {
                transaction_id: hash(id),
                sender,
                to,
                value: U256::ZERO,
                data: Bytes::from(data),
            },
        }
    }

    #[test]
    fn pure_simulation_produces_a_transaction_and_deployment() {
        let deployer = addr(1);
        let to = addr(0xaa);
        let events = vec![
            simulated(1, addr(0xf3), to, vec![0xde, 0xad]),
            Event::ContractDeployed {
                deployer,
                location: to,
                transaction_id: hash(1),
                deployment: DeploymentInfo {
                    artifact: "src/Counter.sol:Counter".to_string(),
                    label: None,
                    entropy: None,
                    salt: None,
                    bytecode_hash: hash(9),
                    init_code_hash: hash(10),
                    constructor_args: Bytes::new(),
                    create_strategy: CreateMethod::Create,
                },
            },
        ];
        let fold = fold_events(&events, "default", 1);
        let (transactions, _, deployments, _, _) = fold.finish();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].status, TransactionStatus::Simulated);
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].transaction_id, hash(1));
        assert_eq!(deployments[0].contract_name, "Counter");
    }

    #[test]
    fn safe_batch_queues_both_member_transactions() {
        let safe = addr(0x55);
        let proposer = addr(0x66);
        let events = vec![
            simulated(1, proposer, addr(0xaa), vec![1]),
            simulated(2, proposer, addr(0xbb), vec![2]),
            Event::SafeTransactionQueued {
                safe,
                proposer,
                safe_tx_hash: hash(0xee),
                transaction_ids: vec![hash(1), hash(2)],
            },
        ];
        let fold = fold_events(&events, "default", 1);
        let (transactions, safe_transactions, _, _, _) = fold.finish();
        assert_eq!(transactions[0].status, TransactionStatus::Queued);
        assert_eq!(transactions[0].safe_batch_idx, Some(0));
        assert_eq!(transactions[1].safe_batch_idx, Some(1));
        assert_eq!(safe_transactions.len(), 1);
        assert!(!safe_transactions[0].executed);
    }

    #[test]
    fn executed_without_prior_queued_backfills_a_safe_transaction() {
        let safe = addr(0x55);
        let events = vec![
            simulated(1, addr(0x11), addr(0xaa), vec![1]),
            Event::SafeTransactionExecuted {
                safe,
                executor: addr(0x99),
                safe_tx_hash: hash(0xee),
                transaction_ids: vec![hash(1)],
            },
        ];
        let fold = fold_events(&events, "default", 1);
        let (transactions, safe_transactions, _, _, _) = fold.finish();
        assert_eq!(transactions[0].status, TransactionStatus::Executed);
        assert_eq!(safe_transactions.len(), 1);
        assert!(safe_transactions[0].executed);
    }

    #[test]
    fn proxy_events_promote_deployment_type() {
        let proxy = addr(0xaa);
        let implementation = addr(0xbb);
        let events = vec![
            Event::ContractDeployed {
                deployer: addr(1),
                location: proxy,
                transaction_id: hash(1),
                deployment: DeploymentInfo {
                    artifact: "src/Proxy.sol:ERC1967Proxy".to_string(),
                    label: None,
                    entropy: None,
                    salt: None,
                    bytecode_hash: hash(9),
                    init_code_hash: hash(10),
                    constructor_args: Bytes::new(),
                    create_strategy: CreateMethod::Create2,
                },
            },
            Event::Upgraded { proxy, implementation },
        ];
        let fold = fold_events(&events, "default", 1);
        let (_, _, deployments, proxy_graph, _) = fold.finish();
        assert_eq!(deployments[0].r#type, DeploymentType::Proxy);
        assert_eq!(proxy_graph.get(&proxy).unwrap().implementation, implementation);
    }

    #[test]
    fn collision_is_recorded_without_a_deployment() {
        let existing = addr(0xaa);
        let events = vec![Event::DeploymentCollision {
            existing_contract: existing,
            deployer: addr(1),
            transaction_id: hash(1),
        }];
        let fold = fold_events(&events, "default", 1);
        let (_, _, deployments, _, collisions) = fold.finish();
        assert!(deployments.is_empty());
        assert!(collisions.contains_key(&existing));
    }
}
