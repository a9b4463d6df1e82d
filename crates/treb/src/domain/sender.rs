//! C1 — sender-config encoder.
//!
//! Produces the deterministic ABI-encoded descriptor of every configured
//! sender for one run: `(string,address,bytes8,bool,bytes)[]`.

use {
    crate::domain::error::SenderConfigError,
    alloy_dyn_abi::DynSolValue,
    alloy_primitives::{Address, B256, Bytes, keccak256},
    std::collections::HashMap,
};

/// A single configured sender, keyed by its human name in [`SenderConfig`].
///
/// Hardware-wallet senders carry an optional account: the derivation path
/// alone picks a key on the device, so the account address is only known
/// once the user has confirmed it out of band.
#[derive(Debug, Clone)]
pub enum SenderKind {
    PrivateKey { key: B256, account: Address },
    Safe { account: Address, proposer: String },
    Ledger { account: Option<Address>, derivation_path: Option<String> },
    Trezor { account: Option<Address>, derivation_path: Option<String> },
}

impl SenderKind {
    fn label(&self) -> &'static str {
        match self {
            Self::PrivateKey { .. } => "private-key",
            Self::Safe { .. } => "gnosis-safe",
            Self::Ledger { .. } => "ledger",
            Self::Trezor { .. } => "trezor",
        }
    }

    fn account(&self, name: &str) -> Result<Address, SenderConfigError> {
        match self {
            Self::PrivateKey { account, .. } => Ok(*account),
            Self::Safe { account, .. } => Ok(*account),
            Self::Ledger { account, .. } => account.ok_or_else(|| SenderConfigError::MissingAccount {
                name: name.to_string(),
                kind: self.label(),
            }),
            Self::Trezor { account, .. } => account.ok_or_else(|| SenderConfigError::MissingAccount {
                name: name.to_string(),
                kind: self.label(),
            }),
        }
    }

    /// Whether the variant's private material lives in-process, i.e. this
    /// process can itself produce a signature without an external approval
    /// step.
    fn can_broadcast(&self) -> bool {
        !matches!(self, Self::Safe { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub name: String,
    pub kind: SenderKind,
}

/// `keccak256(kind_label)[..8]`, the 8-byte type tag embedded in the
/// descriptor tuple.
fn type_tag(kind: &SenderKind) -> [u8; 8] {
    let hash = keccak256(kind.label().as_bytes());
    let mut tag = [0u8; 8];
    tag.copy_from_slice(&hash[..8]);
    tag
}

fn fixed_bytes8(tag: [u8; 8]) -> DynSolValue {
    let mut word = [0u8; 32];
    word[..8].copy_from_slice(&tag);
    DynSolValue::FixedBytes(B256::from(word), 8)
}

/// Encodes one sender into its on-wire tuple. `safe` senders recursively
/// encode their proposer and carry the proposer's full encoded tuple in
/// `config`.
fn encode_one(
    sender: &SenderConfig,
    by_name: &HashMap<&str, &SenderConfig>,
    allow_nested_safe: bool,
) -> Result<DynSolValue, SenderConfigError> {
    let account = sender.kind.account(&sender.name)?;
    let type_tag_value = fixed_bytes8(type_tag(&sender.kind));
    let can_broadcast = sender.kind.can_broadcast();

    let config: Bytes = match &sender.kind {
        SenderKind::Safe { proposer, .. } => {
            let proposer_sender = by_name.get(proposer.as_str()).ok_or_else(|| {
                SenderConfigError::UnknownProposer {
                    name: sender.name.clone(),
                    proposer: proposer.clone(),
                }
            })?;
            if matches!(proposer_sender.kind, SenderKind::Safe { .. }) && !allow_nested_safe {
                return Err(SenderConfigError::NestedSafeProposer {
                    name: sender.name.clone(),
                    proposer: proposer.clone(),
                });
            }
            let proposer_tuple = encode_one(proposer_sender, by_name, allow_nested_safe)?;
            Bytes::from(proposer_tuple.abi_encode())
        }
        _ => Bytes::new(),
    };

    Ok(DynSolValue::Tuple(vec![
        DynSolValue::String(sender.name.clone()),
        DynSolValue::Address(account),
        type_tag_value,
        DynSolValue::Bool(can_broadcast),
        DynSolValue::Bytes(config.to_vec()),
    ]))
}

/// Encodes every sender in `senders`, in input order, as the ABI-encoded
/// `(string,address,bytes8,bool,bytes)[]` the external script expects.
///
/// Nested `safe`-of-`safe` proposer chains are rejected.
pub fn encode(senders: &[SenderConfig]) -> Result<Bytes, SenderConfigError> {
    let by_name: HashMap<&str, &SenderConfig> =
        senders.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut tuples = Vec::with_capacity(senders.len());
    for sender in senders {
        tuples.push(encode_one(sender, &by_name, false)?);
    }

    Ok(Bytes::from(DynSolValue::Array(tuples).abi_encode()))
}
