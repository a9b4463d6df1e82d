//! `Deployment` and its creation strategy.

use {
    crate::domain::transaction::TransactionId,
    alloy_primitives::{Address, B256, Bytes},
};

/// Default CreateX factory address, used when a strategy doesn't name one
/// explicitly.
pub const CREATEX_FACTORY: Address = alloy_primitives::address!("ba5Ed099633D3B313e4D5F7bdc1305d3c28ba5Ed");

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CreateMethod {
    Create,
    Create2,
    Create3,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeploymentStrategy {
    pub method: CreateMethod,
    pub salt: Option<B256>,
    pub init_code_hash: B256,
    pub constructor_args: Bytes,
    pub factory: Address,
    pub entropy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeploymentType {
    Singleton,
    Proxy,
    Library,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArtifactRef {
    pub path: String,
    pub bytecode_hash: B256,
    pub script_path: String,
    pub git_commit: Option<String>,
    pub compiler_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VerificationStatus {
    Unverified,
    Pending,
    Verified,
    Failed,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Verification {
    pub status: VerificationStatus,
    pub verifiers: Vec<String>,
}

impl Default for Verification {
    fn default() -> Self {
        Self {
            status: VerificationStatus::Unverified,
            verifiers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProxyInfo {
    pub implementation: Address,
    pub kind: crate::domain::proxy::ProxyKind,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Deployment {
    pub id: String,
    pub namespace: String,
    pub chain_id: u64,
    pub contract_name: String,
    pub label: Option<String>,
    pub address: Address,
    pub r#type: DeploymentType,
    pub transaction_id: TransactionId,
    pub strategy: DeploymentStrategy,
    pub proxy_info: Option<ProxyInfo>,
    pub artifact: ArtifactRef,
    pub verification: Verification,
    pub tags: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Deployment {
    /// `"<namespace>/<chain_id>/<contract_name>[:<label>]"` (GLOSSARY).
    pub fn make_id(namespace: &str, chain_id: u64, contract_name: &str, label: Option<&str>) -> String {
        match label {
            Some(label) => format!("{namespace}/{chain_id}/{contract_name}:{label}"),
            None => format!("{namespace}/{chain_id}/{contract_name}"),
        }
    }
}
