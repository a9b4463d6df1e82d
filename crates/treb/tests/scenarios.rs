//! End-to-end scenarios exercising hydrate → (reconcile) → project against
//! tempdir/in-memory fixtures, one per documented run shape.

use {
    alloy_dyn_abi::DynSolValue,
    alloy_primitives::{Address, B256, Bytes, U256, keccak256},
    treb::{
        domain::{
            event::RawLog,
            hydrate::{RawOutputs, hydrate},
            trace::{Arena, CallInfo, CallKind, TraceNode},
            transaction::TransactionStatus,
        },
        infra::{fork, registry::Registry},
    },
};

fn sig(s: &str) -> B256 {
    keccak256(s.as_bytes())
}

fn contract_deployed_log(
    deployer: Address,
    location: Address,
    transaction_id: B256,
    artifact: &str,
) -> RawLog {
    let value = DynSolValue::Tuple(vec![
        DynSolValue::Address(deployer),
        DynSolValue::Address(location),
        DynSolValue::FixedBytes(transaction_id, 32),
        DynSolValue::String(artifact.to_string()),
        DynSolValue::String(String::new()),
        DynSolValue::FixedBytes(B256::ZERO, 32),
        DynSolValue::FixedBytes(B256::ZERO, 32),
        DynSolValue::FixedBytes(B256::repeat_byte(9), 32),
        DynSolValue::FixedBytes(B256::repeat_byte(10), 32),
        DynSolValue::Bytes(vec![]),
        DynSolValue::Uint(U256::ZERO, 8),
    ]);
    RawLog {
        address: location,
        topics: vec![sig("ContractDeployed(address,address,bytes32,string,string,bytes32,bytes32,bytes32,bytes32,bytes,uint8)")],
        data: Bytes::from(value.abi_encode()),
    }
}

fn transaction_simulated_log(id: B256, sender: Address, to: Address, data: Vec<u8>) -> RawLog {
    let value = DynSolValue::Tuple(vec![
        DynSolValue::FixedBytes(id, 32),
        DynSolValue::Address(sender),
        DynSolValue::Address(to),
        DynSolValue::Uint(U256::ZERO, 256),
        DynSolValue::Bytes(data),
    ]);
    RawLog {
        address: Address::ZERO,
        topics: vec![sig("TransactionSimulated(bytes32,address,address,uint256,bytes)")],
        data: Bytes::from(value.abi_encode()),
    }
}

fn safe_queued_log(safe: Address, proposer: Address, safe_tx_hash: B256, ids: &[B256]) -> RawLog {
    let value = DynSolValue::Tuple(vec![
        DynSolValue::Address(safe),
        DynSolValue::Address(proposer),
        DynSolValue::FixedBytes(safe_tx_hash, 32),
        DynSolValue::Array(ids.iter().map(|id| DynSolValue::FixedBytes(*id, 32)).collect()),
    ]);
    RawLog {
        address: Address::ZERO,
        topics: vec![sig("SafeTransactionQueued(address,address,bytes32,bytes32[])")],
        data: Bytes::from(value.abi_encode()),
    }
}

#[test]
fn s1_pure_simulation_produces_one_transaction_and_one_deployment() {
    let sender = Address::repeat_byte(0xf3);
    let to = Address::repeat_byte(0xaa);
    let tx_id = B256::repeat_byte(0x01);

    let raw = RawOutputs {
        raw_logs: vec![
            transaction_simulated_log(tx_id, sender, to, vec![0xde, 0xad]),
            contract_deployed_log(sender, to, tx_id, "src/Counter.sol:Counter"),
        ],
        arena: Arena::default(),
        returns: serde_json::Value::Null,
    };

    let result = hydrate(raw, "default", 31337, None).unwrap();
    assert_eq!(result.transactions.len(), 1);
    assert_eq!(result.transactions[0].status, TransactionStatus::Simulated);
    assert_eq!(result.deployments.len(), 1);
    assert_eq!(result.deployments[0].transaction_id, tx_id);
}

#[test]
fn s2_direct_broadcast_upgrades_transaction_to_executed() {
    let sender = Address::repeat_byte(0xf3);
    let to = Address::repeat_byte(0xaa);
    let tx_id = B256::repeat_byte(0x01);

    let raw = RawOutputs {
        raw_logs: vec![transaction_simulated_log(tx_id, sender, to, vec![0xde, 0xad])],
        arena: Arena::default(),
        returns: serde_json::Value::Null,
    };

    let dir = tempfile::tempdir().unwrap();
    let broadcast_path = dir.path().join("run-latest.json");
    std::fs::write(
        &broadcast_path,
        format!(
            r#"{{"transactions":[{{"hash":"0xbeef","transaction":{{"from":"{sender:#x}","to":"{to:#x}","data":"0xdead"}}}}],
               "receipts":[{{"transactionHash":"0xbeef","blockNumber":"0x10","gasUsed":"0x5208"}}]}}"#
        ),
    )
    .unwrap();

    let result = hydrate(raw, "default", 31337, Some(&broadcast_path)).unwrap();
    assert_eq!(result.transactions[0].status, TransactionStatus::Executed);
    assert_eq!(result.transactions[0].block_number, Some(16));
    assert_eq!(result.transactions[0].gas_used, Some(21000));
}

#[test]
fn s3_safe_batch_queues_both_member_transactions() {
    let proposer = Address::repeat_byte(1);
    let safe = Address::repeat_byte(0x55);
    let id1 = B256::repeat_byte(0x01);
    let id2 = B256::repeat_byte(0x02);
    let safe_tx_hash = B256::repeat_byte(0xee);

    let raw = RawOutputs {
        raw_logs: vec![
            transaction_simulated_log(id1, proposer, Address::repeat_byte(0xaa), vec![1]),
            transaction_simulated_log(id2, proposer, Address::repeat_byte(0xbb), vec![2]),
            safe_queued_log(safe, proposer, safe_tx_hash, &[id1, id2]),
        ],
        arena: Arena::default(),
        returns: serde_json::Value::Null,
    };

    let result = hydrate(raw, "default", 31337, None).unwrap();
    assert_eq!(result.transactions[0].status, TransactionStatus::Queued);
    assert_eq!(result.transactions[0].safe_batch_idx, Some(0));
    assert_eq!(result.transactions[1].safe_batch_idx, Some(1));
    assert_eq!(result.safe_transactions.len(), 1);
    assert!(!result.safe_transactions[0].executed);
}

#[test]
fn s4_safe_execution_cascades_hash_to_member_transactions() {
    let proposer = Address::repeat_byte(1);
    let safe = Address::repeat_byte(0x55);
    let id1 = B256::repeat_byte(0x01);
    let safe_tx_hash = B256::repeat_byte(0xee);

    let raw = RawOutputs {
        raw_logs: vec![
            transaction_simulated_log(id1, proposer, Address::repeat_byte(0xaa), vec![1]),
            safe_queued_log(safe, proposer, safe_tx_hash, &[id1]),
        ],
        arena: Arena::default(),
        returns: serde_json::Value::Null,
    };

    let mut exec_data = vec![0x6a, 0x76, 0x12, 0x02];
    exec_data.extend(std::iter::repeat(0).take(28));

    let dir = tempfile::tempdir().unwrap();
    let broadcast_path = dir.path().join("run-latest.json");
    std::fs::write(
        &broadcast_path,
        format!(
            r#"{{"transactions":[{{"hash":"0xcafe","transaction":{{"from":"{:#x}","to":"{safe:#x}","data":"0x{}"}}}}],
               "receipts":[]}}"#,
            Address::repeat_byte(9),
            const_hex::encode(&exec_data),
        ),
    )
    .unwrap();

    let result = hydrate(raw, "default", 31337, Some(&broadcast_path)).unwrap();
    assert!(result.safe_transactions[0].executed);
    assert!(result.safe_transactions[0].execution_tx_hash.is_some());
    assert!(result.transactions[0].tx_hash.is_some());
}

#[test]
fn s5_prank_trace_matches_the_pranked_sibling_only() {
    let cheatcode = alloy_primitives::address!("7109709ECfa91a80626fF3989D68f67F5b1DD12D");
    let pranked = Address::repeat_byte(0xaa);
    let to = Address::repeat_byte(0xcc);
    let tx_id = B256::repeat_byte(1);

    let mut prank_data = vec![0xca, 0x66, 0x9f, 0xa7];
    prank_data.extend(std::iter::repeat(0).take(12));
    prank_data.extend_from_slice(pranked.as_slice());

    let raw = RawOutputs {
        raw_logs: vec![transaction_simulated_log(tx_id, pranked, to, vec![0xbe, 0xef])],
        arena: Arena {
            nodes: vec![
                TraceNode {
                    idx: 0,
                    parent: None,
                    children: vec![],
                    trace: CallInfo {
                        kind: CallKind::Call,
                        caller: Address::ZERO,
                        address: cheatcode,
                        data: Bytes::from(prank_data),
                        value: U256::ZERO,
                    },
                    logs: vec![],
                },
                TraceNode {
                    idx: 1,
                    parent: None,
                    children: vec![],
                    trace: CallInfo {
                        kind: CallKind::Create2,
                        caller: pranked,
                        address: to,
                        data: Bytes::from(vec![0xbe, 0xef]),
                        value: U256::ZERO,
                    },
                    logs: vec![],
                },
            ],
        },
        returns: serde_json::Value::Null,
    };

    let result = hydrate(raw, "default", 31337, None).unwrap();
    let subtree = result.transactions[0].trace_subtree.as_ref().expect("matched via prank");
    assert_eq!(subtree.trace.address, to);
}

#[test]
fn s6_snapshot_round_trip_restores_registry_files_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path();
    std::fs::create_dir_all(data_dir.join("sepolia")).unwrap();
    std::fs::write(data_dir.join("sepolia").join("deployments.json"), br#"{"a":1}"#).unwrap();

    fork::backup(data_dir, "sepolia", 0).unwrap();
    std::fs::write(data_dir.join("sepolia").join("deployments.json"), br#"{"a":2}"#).unwrap();
    fork::restore(data_dir, "sepolia", 0).unwrap();

    let contents = std::fs::read_to_string(data_dir.join("sepolia").join("deployments.json")).unwrap();
    assert_eq!(contents, r#"{"a":1}"#);
}

#[tokio::test]
async fn full_pipeline_projects_a_simulated_deployment_into_the_registry() {
    let sender = Address::repeat_byte(0xf3);
    let to = Address::repeat_byte(0xaa);
    let tx_id = B256::repeat_byte(0x01);

    let raw = RawOutputs {
        raw_logs: vec![
            transaction_simulated_log(tx_id, sender, to, vec![0xde, 0xad]),
            contract_deployed_log(sender, to, tx_id, "src/Counter.sol:Counter"),
        ],
        arena: Arena::default(),
        returns: serde_json::Value::Null,
    };
    let result = hydrate(raw, "default", 31337, None).unwrap();
    let deployment_id = result.deployments[0].id.clone();

    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::load(dir.path(), "anvil").unwrap();
    registry.project(result).await.unwrap();

    assert!(registry.deployment(&deployment_id).await.is_some());
}
