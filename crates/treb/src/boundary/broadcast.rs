//! C7 — broadcast reconciler.
//!
//! Matches hydrated transactions and Safe transactions against the entries
//! of a parsed `broadcast/<script>/<chain>/run-latest.json`-shaped file.

use {
    crate::domain::{
        safe::SafeTransaction,
        transaction::{Transaction, TransactionStatus},
    },
    alloy_primitives::{Address, B256, keccak256},
    serde::Deserialize,
    std::collections::HashMap,
};

/// The Safe `execTransaction(address,uint256,bytes,uint8,uint256,uint256,uint256,address,address,bytes)`
/// selector.
pub const EXEC_TRANSACTION_SELECTOR: [u8; 4] = [0x6a, 0x76, 0x12, 0x02];

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastTransaction {
    pub hash: Option<String>,
    pub transaction: BroadcastTransactionInner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastTransactionInner {
    pub from: String,
    pub to: Option<String>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub gas_used: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastFile {
    #[serde(default)]
    pub transactions: Vec<BroadcastTransaction>,
    #[serde(default)]
    pub receipts: Vec<BroadcastReceipt>,
    /// Carried verbatim on `RawOutputs`; never interpreted.
    pub timestamp: Option<serde_json::Value>,
}

fn parse_hex_quantity(s: &str) -> Option<u64> {
    let s = s.trim_start_matches("0x");
    u64::from_str_radix(s, 16).ok()
}

fn parse_address(s: &str) -> Option<Address> {
    const_hex::decode(s.trim_start_matches("0x")).ok().map(|b| Address::from_slice(&b))
}

fn parse_data(s: &str) -> Vec<u8> {
    const_hex::decode(s.trim_start_matches("0x")).unwrap_or_default()
}

fn receipts_by_hash(file: &BroadcastFile) -> HashMap<String, &BroadcastReceipt> {
    file.receipts
        .iter()
        .map(|r| (r.transaction_hash.trim_start_matches("0x").to_ascii_lowercase(), r))
        .collect()
}

fn calldata_hash(data: &[u8]) -> B256 {
    keccak256(data)
}

/// Runs both reconciliation passes over `transactions`/`safe_transactions`
/// in place. Never mutates entries already carrying a hash.
pub fn reconcile(transactions: &mut [Transaction], safe_transactions: &mut [SafeTransaction], file: &BroadcastFile) {
    let receipts = receipts_by_hash(file);

    // Pass A — direct matches.
    for entry in &file.transactions {
        let Some(from) = parse_address(&entry.transaction.from) else { continue };
        let to = entry.transaction.to.as_deref().and_then(parse_address);
        let data = entry.transaction.data.as_deref().map(parse_data).unwrap_or_default();
        let data_hash = calldata_hash(&data);

        let matched = transactions.iter_mut().find(|tx| {
            tx.status == TransactionStatus::Simulated
                && tx.sender == from
                && Some(tx.to) == to
                && calldata_hash(&tx.data) == data_hash
        });
        let Some(tx) = matched else { continue };

        let Some(hash) = &entry.hash else { continue };
        tx.status = TransactionStatus::Executed;
        tx.tx_hash = Some(parse_hash_or_zero(hash));
        if let Some(receipt) = receipts.get(&hash.trim_start_matches("0x").to_ascii_lowercase()) {
            tx.block_number = receipt.block_number.as_deref().and_then(parse_hex_quantity);
            tx.gas_used = receipt.gas_used.as_deref().and_then(parse_hex_quantity);
        }
    }

    // Pass B — Safe-executed matches, grouped by safe address.
    let mut by_safe: HashMap<Address, Vec<usize>> = HashMap::new();
    for (i, safe_tx) in safe_transactions.iter().enumerate() {
        if safe_tx.executed {
            by_safe.entry(safe_tx.safe).or_default().push(i);
        }
    }

    for entry in &file.transactions {
        let Some(data) = entry.transaction.data.as_deref().map(parse_data) else { continue };
        if data.len() < 4 || data[..4] != EXEC_TRANSACTION_SELECTOR {
            continue;
        }
        let Some(to) = entry.transaction.to.as_deref().and_then(parse_address) else { continue };
        let Some(candidates) = by_safe.get(&to) else { continue };

        let Some(&i) = candidates.iter().find(|&&i| safe_transactions[i].execution_tx_hash.is_none()) else { continue };
        let Some(hash) = &entry.hash else { continue };
        let tx_hash = parse_hash_or_zero(hash);
        safe_transactions[i].execution_tx_hash = Some(tx_hash);
        let receipt = receipts.get(&hash.trim_start_matches("0x").to_ascii_lowercase());
        safe_transactions[i].execution_block = receipt.and_then(|r| r.block_number.as_deref()).and_then(parse_hex_quantity);

        let ids = safe_transactions[i].transaction_ids.clone();
        let gas_used = receipt.and_then(|r| r.gas_used.as_deref()).and_then(parse_hex_quantity);
        let block_number = safe_transactions[i].execution_block;
        for id in ids {
            if let Some(tx) = transactions.iter_mut().find(|tx| tx.id == id) {
                if tx.tx_hash.is_none() {
                    tx.tx_hash = Some(tx_hash);
                    tx.block_number = block_number;
                    tx.gas_used = gas_used;
                }
            }
        }
    }
}

fn parse_hash_or_zero(s: &str) -> B256 {
    let bytes = const_hex::decode(s.trim_start_matches("0x")).unwrap_or_default();
    let mut word = [0u8; 32];
    let len = bytes.len().min(32);
    word[..len].copy_from_slice(&bytes[..len]);
    B256::from(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, U256};

    fn tx(id: u8, sender: Address, to: Address, data: Vec<u8>) -> Transaction {
        Transaction {
            id: B256::repeat_byte(id),
            sender,
            to,
            value: U256::ZERO,
            data: Bytes::from(data),
            status: TransactionStatus::Simulated,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            safe_batch_idx: None,
            safe_ref: None,
            trace_subtree: None,
        }
    }

    #[test]
    fn direct_match_attaches_hash_and_receipt_fields() {
        let sender = Address::repeat_byte(1);
        let to = Address::repeat_byte(2);
        let mut transactions = vec![tx(1, sender, to, vec![0xbe, 0xef])];
        let file = BroadcastFile {
            transactions: vec![BroadcastTransaction {
                hash: Some("0xaa11".to_string()),
                transaction: BroadcastTransactionInner {
                    from: format!("{sender:#x}"),
                    to: Some(format!("{to:#x}")),
                    data: Some("0xbeef".to_string()),
                },
            }],
            receipts: vec![BroadcastReceipt {
                transaction_hash: "0xaa11".to_string(),
                block_number: Some("0x64".to_string()),
                gas_used: Some("0x5208".to_string()),
            }],
            timestamp: None,
        };
        reconcile(&mut transactions, &mut [], &file);
        assert_eq!(transactions[0].status, TransactionStatus::Executed);
        assert_eq!(transactions[0].block_number, Some(100));
        assert_eq!(transactions[0].gas_used, Some(21000));
    }

    #[test]
    fn unmatched_entries_leave_transactions_untouched() {
        let sender = Address::repeat_byte(1);
        let to = Address::repeat_byte(2);
        let mut transactions = vec![tx(1, sender, to, vec![0xbe, 0xef])];
        let file = BroadcastFile {
            transactions: vec![BroadcastTransaction {
                hash: Some("0xaa11".to_string()),
                transaction: BroadcastTransactionInner {
                    from: format!("{sender:#x}"),
                    to: Some(format!("{to:#x}")),
                    data: Some("0xdead".to_string()),
                },
            }],
            receipts: vec![],
            timestamp: None,
        };
        reconcile(&mut transactions, &mut [], &file);
        assert_eq!(transactions[0].status, TransactionStatus::Simulated);
    }

    #[test]
    fn safe_exec_transaction_cascades_to_member_transactions() {
        let safe = Address::repeat_byte(0x55);
        let mut transactions = vec![tx(1, Address::repeat_byte(1), Address::repeat_byte(2), vec![1])];
        let mut safe_transactions = vec![SafeTransaction {
            safe_tx_hash: B256::repeat_byte(0xee),
            safe,
            proposer: Address::repeat_byte(3),
            transaction_ids: vec![B256::repeat_byte(1)],
            executed: true,
            execution_tx_hash: None,
            execution_block: None,
            confirmations: vec![],
        }];
        let mut data = EXEC_TRANSACTION_SELECTOR.to_vec();
        data.extend(std::iter::repeat(0).take(28));
        let file = BroadcastFile {
            transactions: vec![BroadcastTransaction {
                hash: Some("0xbb22".to_string()),
                transaction: BroadcastTransactionInner {
                    from: format!("{:#x}", Address::repeat_byte(9)),
                    to: Some(format!("{safe:#x}")),
                    data: Some(format!("0x{}", const_hex::encode(&data))),
                },
            }],
            receipts: vec![],
            timestamp: None,
        };
        reconcile(&mut transactions, &mut safe_transactions, &file);
        assert!(safe_transactions[0].execution_tx_hash.is_some());
        assert!(transactions[0].tx_hash.is_some());
    }

    #[test]
    fn never_overwrites_an_already_hashed_entry() {
        let safe = Address::repeat_byte(0x55);
        let original_hash = B256::repeat_byte(0x01);
        let mut transactions = vec![];
        let mut safe_transactions = vec![SafeTransaction {
            safe_tx_hash: B256::repeat_byte(0xee),
            safe,
            proposer: Address::repeat_byte(3),
            transaction_ids: vec![],
            executed: true,
            execution_tx_hash: Some(original_hash),
            execution_block: None,
            confirmations: vec![],
        }];
        let mut data = EXEC_TRANSACTION_SELECTOR.to_vec();
        data.extend(std::iter::repeat(0).take(28));
        let file = BroadcastFile {
            transactions: vec![BroadcastTransaction {
                hash: Some("0xbb22".to_string()),
                transaction: BroadcastTransactionInner {
                    from: format!("{:#x}", Address::repeat_byte(9)),
                    to: Some(format!("{safe:#x}")),
                    data: Some(format!("0x{}", const_hex::encode(&data))),
                },
            }],
            receipts: vec![],
            timestamp: None,
        };
        reconcile(&mut transactions, &mut safe_transactions, &file);
        assert_eq!(safe_transactions[0].execution_tx_hash, Some(original_hash));
    }
}
