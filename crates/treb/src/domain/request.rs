//! `ScriptRequest` — the inputs to a single run, constructed once by the
//! CLI and consumed by the environment builder and classifier.

use {crate::domain::sender::SenderConfig, std::collections::HashMap};

#[derive(Debug, Clone)]
pub struct LibraryRef {
    pub path: String,
    pub name: String,
    pub address: alloy_primitives::Address,
}

#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub namespace: String,
    pub network: String,
    pub script_path: String,
    pub parameters: HashMap<String, String>,
    pub senders: Vec<SenderConfig>,
    pub libraries: Vec<LibraryRef>,
    pub dry_run: bool,
    pub debug: bool,
    pub slow: bool,
    pub fork_overrides: HashMap<String, String>,
}

impl ScriptRequest {
    /// Namespace, falling back to `"default"` when empty.
    pub fn effective_namespace(&self) -> &str {
        if self.namespace.is_empty() { "default" } else { &self.namespace }
    }
}
