//! C3 — streaming line classifier.
//!
//! Tokenizes the subprocess's stdout into typed [`RawRecord`]s and drives a
//! 3-stage spinner state machine. The pure per-line decision
//! ([`classify_line`]) is kept separate from the async line-reading loop so
//! it can be unit tested without an I/O source.

use {
    crate::domain::{error::ClassifyError, event::RawLog, trace::{Arena, CallInfo, CallKind, TraceNode}},
    alloy_primitives::{Address, B256, Bytes},
    serde::Deserialize,
    std::{
        io::Write,
        path::Path,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    },
    tokio::{io::AsyncBufRead, sync::mpsc},
};

/// Lines longer than this are rejected with `ClassifyError::LineTooLong`
/// rather than buffered indefinitely.
pub const MAX_LINE_BYTES: usize = 200 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum RawRecord {
    ScriptOutput {
        raw_logs: Vec<RawLog>,
        traces: Vec<Arena>,
        returns: serde_json::Value,
    },
    GasEstimate {
        chain: u64,
        total_gas: u64,
    },
    Receipt {
        transaction_hash: B256,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    },
    StatusOutput {
        status: String,
        transactions_path: Option<String>,
    },
    TraceOutput {
        arena: Arena,
    },
    TextOutput(String),
    UnknownJSON(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Simulating,
    Broadcasting,
    BroadcastingSkipped,
    Completed,
}

#[derive(Deserialize)]
struct WireLog {
    address: String,
    topics: Vec<String>,
    data: String,
}

#[derive(Deserialize)]
struct WireCall {
    kind: String,
    caller: String,
    address: String,
    data: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct WireNode {
    idx: usize,
    parent: Option<usize>,
    #[serde(default)]
    children: Vec<usize>,
    trace: WireCall,
    #[serde(default)]
    logs: Vec<WireLog>,
}

#[derive(Deserialize)]
struct WireScriptOutput {
    raw_logs: Vec<WireLog>,
    #[serde(default)]
    traces: Vec<Vec<WireNode>>,
    #[serde(default)]
    returns: serde_json::Value,
}

fn parse_address(s: &str) -> Address {
    Address::from_slice(&const_hex::decode(s.trim_start_matches("0x")).unwrap_or_default())
}

fn parse_hash(s: &str) -> B256 {
    let bytes = const_hex::decode(s.trim_start_matches("0x")).unwrap_or_default();
    let mut word = [0u8; 32];
    let len = bytes.len().min(32);
    word[..len].copy_from_slice(&bytes[..len]);
    B256::from(word)
}

fn parse_bytes(s: &str) -> Bytes {
    Bytes::from(const_hex::decode(s.trim_start_matches("0x")).unwrap_or_default())
}

fn call_kind(s: &str) -> CallKind {
    match s.to_ascii_uppercase().as_str() {
        "CALL" => CallKind::Call,
        "CREATE" => CallKind::Create,
        "CREATE2" => CallKind::Create2,
        _ => CallKind::Other,
    }
}

fn wire_log_to_raw_log(log: WireLog) -> RawLog {
    RawLog {
        address: parse_address(&log.address),
        topics: log.topics.iter().map(|t| parse_hash(t)).collect(),
        data: parse_bytes(&log.data),
    }
}

fn wire_nodes_to_arena(nodes: Vec<WireNode>) -> Arena {
    let parsed = nodes
        .into_iter()
        .map(|n| TraceNode {
            idx: n.idx,
            parent: n.parent,
            children: n.children,
            trace: CallInfo {
                kind: call_kind(&n.trace.kind),
                caller: parse_address(&n.trace.caller),
                address: parse_address(&n.trace.address),
                data: parse_bytes(&n.trace.data),
                value: n.trace.value.parse().unwrap_or_default(),
            },
            logs: n.logs.into_iter().map(wire_log_to_raw_log).collect(),
        })
        .collect();
    Arena { nodes: parsed }
}

fn as_u64(v: &serde_json::Value, key: &str) -> Option<u64> {
    let field = v.get(key)?;
    field.as_u64().or_else(|| field.as_str().and_then(|s| {
        let s = s.trim_start_matches("0x");
        u64::from_str_radix(s, 16).ok().or_else(|| s.parse().ok())
    }))
}

/// Decides what a single non-empty line is, without performing any I/O.
pub fn classify_line(line: &str) -> RawRecord {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return RawRecord::TextOutput(trimmed.to_string());
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return RawRecord::TextOutput(trimmed.to_string());
    };

    if value.get("raw_logs").is_some() {
        if let Ok(parsed) = serde_json::from_value::<WireScriptOutput>(value.clone()) {
            return RawRecord::ScriptOutput {
                raw_logs: parsed.raw_logs.into_iter().map(wire_log_to_raw_log).collect(),
                traces: parsed.traces.into_iter().map(wire_nodes_to_arena).collect(),
                returns: parsed.returns,
            };
        }
    }

    if let Some(chain) = as_u64(&value, "chain").filter(|c| *c != 0) {
        let total_gas = as_u64(&value, "total_gas").or_else(|| as_u64(&value, "totalGas")).unwrap_or(0);
        return RawRecord::GasEstimate { chain, total_gas };
    }

    if let Some(hash) = value
        .get("transaction_hash")
        .or_else(|| value.get("transactionHash"))
        .and_then(|v| v.as_str())
    {
        return RawRecord::Receipt {
            transaction_hash: parse_hash(hash),
            block_number: as_u64(&value, "block_number").or_else(|| as_u64(&value, "blockNumber")),
            gas_used: as_u64(&value, "gas_used").or_else(|| as_u64(&value, "gasUsed")),
        };
    }

    if let Some(status) = value.get("status").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
        return RawRecord::StatusOutput {
            status: status.to_string(),
            transactions_path: value
                .get("transactions")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        };
    }

    if let Some(arena) = value.get("arena").and_then(|v| v.as_array()).filter(|a| !a.is_empty()) {
        if let Ok(nodes) = serde_json::from_value::<Vec<WireNode>>(serde_json::Value::Array(arena.clone())) {
            return RawRecord::TraceOutput {
                arena: wire_nodes_to_arena(nodes),
            };
        }
    }

    RawRecord::UnknownJSON(value)
}

/// Appends `line` to `<ignore_dir>/unmatched.jsonl`, creating the directory
/// if needed. `UnknownJSON` lines are never dropped silently (§4.3); this is
/// the out-of-band sink a human inspects later. Failures to write here are
/// logged, not propagated — the classifier's own progress must never stall
/// on an ignore-directory write.
pub fn archive_unknown(ignore_dir: &Path, line: &str) {
    if let Err(err) = std::fs::create_dir_all(ignore_dir) {
        tracing::warn!(?err, path = ?ignore_dir, "failed to create ignore directory");
        return;
    }
    let path = ignore_dir.join("unmatched.jsonl");
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut f| writeln!(f, "{line}"));
    if let Err(err) = result {
        tracing::warn!(?err, ?path, "failed to archive unmatched JSON line");
    }
}

/// Advances the 3-stage spinner state machine for one classified record.
pub fn advance_stage(stage: Stage, record: &RawRecord) -> Stage {
    match (stage, record) {
        (Stage::Simulating, RawRecord::GasEstimate { .. }) => Stage::Broadcasting,
        (s, RawRecord::StatusOutput { .. }) => {
            let _ = s;
            Stage::Completed
        }
        (s, _) => s,
    }
}

/// Reads `reader` line by line, classifying each non-empty line and pushing
/// `(record, stage)` pairs to `sink`. Cancellation is cooperative: once
/// `cancel` is set, no further lines are read and the sink is dropped,
/// closing the stream for readers. `UnknownJSON` lines are archived to
/// `ignore_dir`, when given, via [`archive_unknown`].
pub async fn classify<R>(
    reader: R,
    sink: mpsc::Sender<(RawRecord, Stage)>,
    cancel: Arc<AtomicBool>,
    ignore_dir: Option<&Path>,
) -> Result<(), ClassifyError>
where
    R: AsyncBufRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;

    let mut lines = tokio::io::BufReader::new(reader).lines();
    let mut stage = Stage::Simulating;
    let mut saw_receipt_since_broadcasting = false;

    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.len() > MAX_LINE_BYTES {
            return Err(ClassifyError::LineTooLong { limit: MAX_LINE_BYTES });
        }
        if line.trim().is_empty() {
            continue;
        }
        let record = classify_line(&line);
        if let (RawRecord::UnknownJSON(_), Some(dir)) = (&record, ignore_dir) {
            archive_unknown(dir, &line);
        }
        if matches!(record, RawRecord::Receipt { .. }) {
            saw_receipt_since_broadcasting = true;
        }
        stage = advance_stage(stage, &record);
        if sink.send((record, stage)).await.is_err() {
            break;
        }
    }

    if stage == Stage::Simulating {
        let _ = sink
            .send((RawRecord::TextOutput(String::new()), Stage::BroadcastingSkipped))
            .await;
    } else if stage == Stage::Broadcasting && !saw_receipt_since_broadcasting {
        let _ = sink
            .send((RawRecord::TextOutput(String::new()), Stage::BroadcastingSkipped))
            .await;
    }

    Ok(())
}
