//! C4 — event parser.
//!
//! Decodes the emitted log vector into the tagged union of domain events
//! described below. Built-in signatures are hashed once into a static
//! lookup table; unknown signatures are suppressed silently.

use {
    crate::domain::{
        deployment::CreateMethod,
        error::EventDecodeError,
        transaction::TransactionId,
    },
    alloy_dyn_abi::{DynSolType, DynSolValue},
    alloy_primitives::{Address, B256, Bytes, keccak256},
    std::sync::LazyLock,
};

/// A single log entry as emitted by the script (`topics[0]` is the event
/// signature when present).
#[derive(Debug, Clone)]
pub struct RawLog {
    /// The contract that emitted the log; used as the proxy address for the
    /// well-known proxy events, which don't otherwise carry it as a
    /// parameter.
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct SimulatedTx {
    pub transaction_id: TransactionId,
    pub sender: Address,
    pub to: Address,
    pub value: alloy_primitives::U256,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct DeploymentInfo {
    pub artifact: String,
    pub label: Option<String>,
    pub entropy: Option<B256>,
    pub salt: Option<B256>,
    pub bytecode_hash: B256,
    pub init_code_hash: B256,
    pub constructor_args: Bytes,
    pub create_strategy: CreateMethod,
}

#[derive(Debug, Clone)]
pub enum Event {
    ContractDeployed {
        deployer: Address,
        location: Address,
        transaction_id: TransactionId,
        deployment: DeploymentInfo,
    },
    DeploymentCollision {
        existing_contract: Address,
        deployer: Address,
        transaction_id: TransactionId,
    },
    TransactionSimulated {
        simulated_tx: SimulatedTx,
    },
    SafeTransactionQueued {
        safe: Address,
        proposer: Address,
        safe_tx_hash: B256,
        transaction_ids: Vec<TransactionId>,
    },
    SafeTransactionExecuted {
        safe: Address,
        executor: Address,
        safe_tx_hash: B256,
        transaction_ids: Vec<TransactionId>,
    },
    Upgraded {
        proxy: Address,
        implementation: Address,
    },
    AdminChanged {
        proxy: Address,
        prev: Address,
        new: Address,
    },
    BeaconUpgraded {
        proxy: Address,
        beacon: Address,
    },
}

struct Signature {
    hash: B256,
    /// Non-indexed tail ABI tuple type, decoded from `data`.
    data_type: &'static str,
    /// How many leading `topics[1..]` entries are indexed address params.
    indexed_addresses: usize,
}

fn sig_hash(sig: &str) -> B256 {
    keccak256(sig.as_bytes())
}

static SIGNATURES: LazyLock<Vec<(&'static str, Signature)>> = LazyLock::new(|| {
    vec![
        (
            "ContractDeployed",
            Signature {
                hash: sig_hash("ContractDeployed(address,address,bytes32,string,string,bytes32,bytes32,bytes32,bytes32,bytes,uint8)"),
                data_type: "(address,address,bytes32,string,string,bytes32,bytes32,bytes32,bytes32,bytes,uint8)",
                indexed_addresses: 0,
            },
        ),
        (
            "DeploymentCollision",
            Signature {
                hash: sig_hash("DeploymentCollision(address,address,bytes32)"),
                data_type: "(address,address,bytes32)",
                indexed_addresses: 0,
            },
        ),
        (
            "TransactionSimulated",
            Signature {
                hash: sig_hash("TransactionSimulated(bytes32,address,address,uint256,bytes)"),
                data_type: "(bytes32,address,address,uint256,bytes)",
                indexed_addresses: 0,
            },
        ),
        (
            "SafeTransactionQueued",
            Signature {
                hash: sig_hash("SafeTransactionQueued(address,address,bytes32,bytes32[])"),
                data_type: "(address,address,bytes32,bytes32[])",
                indexed_addresses: 0,
            },
        ),
        (
            "SafeTransactionExecuted",
            Signature {
                hash: sig_hash("SafeTransactionExecuted(address,address,bytes32,bytes32[])"),
                data_type: "(address,address,bytes32,bytes32[])",
                indexed_addresses: 0,
            },
        ),
        (
            "Upgraded",
            Signature {
                hash: sig_hash("Upgraded(address)"),
                data_type: "()",
                indexed_addresses: 1,
            },
        ),
        (
            "AdminChanged",
            Signature {
                hash: sig_hash("AdminChanged(address,address)"),
                data_type: "(address,address)",
                indexed_addresses: 0,
            },
        ),
        (
            "BeaconUpgraded",
            Signature {
                hash: sig_hash("BeaconUpgraded(address)"),
                data_type: "()",
                indexed_addresses: 1,
            },
        ),
    ]
});

fn as_address(v: &DynSolValue) -> Option<Address> {
    v.as_address()
}
fn as_fixed_bytes32(v: &DynSolValue) -> Option<B256> {
    match v {
        DynSolValue::FixedBytes(word, 32) => Some(*word),
        _ => None,
    }
}
fn as_string(v: &DynSolValue) -> Option<String> {
    match v {
        DynSolValue::String(s) => Some(s.clone()),
        _ => None,
    }
}
fn as_bytes(v: &DynSolValue) -> Option<Bytes> {
    match v {
        DynSolValue::Bytes(b) => Some(Bytes::from(b.clone())),
        _ => None,
    }
}
fn as_uint(v: &DynSolValue) -> Option<u64> {
    match v {
        DynSolValue::Uint(n, _) => Some(n.to::<u64>()),
        _ => None,
    }
}
fn as_b256_array(v: &DynSolValue) -> Option<Vec<B256>> {
    match v {
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            items.iter().map(as_fixed_bytes32).collect()
        }
        _ => None,
    }
}

fn create_method_from_tag(tag: u64) -> CreateMethod {
    match tag {
        1 => CreateMethod::Create2,
        2 => CreateMethod::Create3,
        _ => CreateMethod::Create,
    }
}

fn decode_one(log: &RawLog) -> Result<Option<Event>, EventDecodeError> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    let Some((name, sig)) = SIGNATURES.iter().find(|(_, s)| &s.hash == topic0) else {
        return Ok(None);
    };

    let decode = |ty: &str, data: &[u8]| -> Result<Vec<DynSolValue>, EventDecodeError> {
        let parsed: DynSolType = ty.parse().map_err(|e| EventDecodeError {
            signature: *topic0,
            cause: format!("{e}"),
        })?;
        let value = parsed.abi_decode(data).map_err(|e| EventDecodeError {
            signature: *topic0,
            cause: format!("{e}"),
        })?;
        match value {
            DynSolValue::Tuple(fields) => Ok(fields),
            other => Ok(vec![other]),
        }
    };

    let fail = |cause: &str| EventDecodeError {
        signature: *topic0,
        cause: cause.to_string(),
    };

    let event = match *name {
        "ContractDeployed" => {
            let f = decode(sig.data_type, &log.data)?;
            Event::ContractDeployed {
                deployer: as_address(&f[0]).ok_or_else(|| fail("deployer"))?,
                location: as_address(&f[1]).ok_or_else(|| fail("location"))?,
                transaction_id: as_fixed_bytes32(&f[2]).ok_or_else(|| fail("transaction_id"))?,
                deployment: DeploymentInfo {
                    artifact: as_string(&f[3]).ok_or_else(|| fail("artifact"))?,
                    label: as_string(&f[4]).filter(|s| !s.is_empty()),
                    entropy: as_fixed_bytes32(&f[5]).filter(|b| *b != B256::ZERO),
                    salt: as_fixed_bytes32(&f[6]).filter(|b| *b != B256::ZERO),
                    bytecode_hash: as_fixed_bytes32(&f[7]).ok_or_else(|| fail("bytecode_hash"))?,
                    init_code_hash: as_fixed_bytes32(&f[8]).ok_or_else(|| fail("init_code_hash"))?,
                    constructor_args: as_bytes(&f[9]).ok_or_else(|| fail("constructor_args"))?,
                    create_strategy: create_method_from_tag(as_uint(&f[10]).ok_or_else(|| fail("create_strategy"))?),
                },
            }
        }
        "DeploymentCollision" => {
            let f = decode(sig.data_type, &log.data)?;
            Event::DeploymentCollision {
                existing_contract: as_address(&f[0]).ok_or_else(|| fail("existing_contract"))?,
                deployer: as_address(&f[1]).ok_or_else(|| fail("deployer"))?,
                transaction_id: as_fixed_bytes32(&f[2]).ok_or_else(|| fail("transaction_id"))?,
            }
        }
        "TransactionSimulated" => {
            let f = decode(sig.data_type, &log.data)?;
            Event::TransactionSimulated {
                simulated_tx: SimulatedTx {
                    transaction_id: as_fixed_bytes32(&f[0]).ok_or_else(|| fail("transaction_id"))?,
                    sender: as_address(&f[1]).ok_or_else(|| fail("sender"))?,
                    to: as_address(&f[2]).ok_or_else(|| fail("to"))?,
                    value: match &f[3] {
                        DynSolValue::Uint(n, _) => *n,
                        _ => return Err(fail("value")),
                    },
                    data: as_bytes(&f[4]).ok_or_else(|| fail("data"))?,
                },
            }
        }
        "SafeTransactionQueued" => {
            let f = decode(sig.data_type, &log.data)?;
            Event::SafeTransactionQueued {
                safe: as_address(&f[0]).ok_or_else(|| fail("safe"))?,
                proposer: as_address(&f[1]).ok_or_else(|| fail("proposer"))?,
                safe_tx_hash: as_fixed_bytes32(&f[2]).ok_or_else(|| fail("safe_tx_hash"))?,
                transaction_ids: as_b256_array(&f[3]).ok_or_else(|| fail("transaction_ids"))?,
            }
        }
        "SafeTransactionExecuted" => {
            let f = decode(sig.data_type, &log.data)?;
            Event::SafeTransactionExecuted {
                safe: as_address(&f[0]).ok_or_else(|| fail("safe"))?,
                executor: as_address(&f[1]).ok_or_else(|| fail("executor"))?,
                safe_tx_hash: as_fixed_bytes32(&f[2]).ok_or_else(|| fail("safe_tx_hash"))?,
                transaction_ids: as_b256_array(&f[3]).ok_or_else(|| fail("transaction_ids"))?,
            }
        }
        "Upgraded" => {
            let implementation = log
                .topics
                .get(1)
                .map(|t| Address::from_slice(&t[12..]))
                .ok_or_else(|| fail("missing indexed implementation topic"))?;
            Event::Upgraded {
                proxy: log.address,
                implementation,
            }
        }
        "BeaconUpgraded" => {
            let beacon = log
                .topics
                .get(1)
                .map(|t| Address::from_slice(&t[12..]))
                .ok_or_else(|| fail("missing indexed beacon topic"))?;
            Event::BeaconUpgraded {
                proxy: log.address,
                beacon,
            }
        }
        "AdminChanged" => {
            let f = decode(sig.data_type, &log.data)?;
            Event::AdminChanged {
                proxy: log.address,
                prev: as_address(&f[0]).ok_or_else(|| fail("prev"))?,
                new: as_address(&f[1]).ok_or_else(|| fail("new"))?,
            }
        }
        _ => unreachable!("exhaustive over SIGNATURES"),
    };
    let _ = sig.indexed_addresses;
    Ok(Some(event))
}

/// Parses the emitted log vector into domain events. Unknown signatures are
/// skipped silently; decode failures for a recognized signature are
/// collected into `errors` (logged by the caller) and that log is skipped,
/// matching the non-fatal decode-error policy.
pub fn parse(raw_logs: &[RawLog], errors: &mut Vec<EventDecodeError>) -> Vec<Event> {
    let mut events = Vec::with_capacity(raw_logs.len());
    for log in raw_logs {
        match decode_one(log) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(err) => errors.push(err),
        }
    }
    events
}
