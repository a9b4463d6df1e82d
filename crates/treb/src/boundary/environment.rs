//! C2 — environment builder.
//!
//! Translates a [`ScriptRequest`] plus its already-encoded sender blob into
//! the map of environment variables the subprocess is spawned with.

use {
    crate::domain::request::ScriptRequest,
    alloy_primitives::Bytes,
    std::collections::HashMap,
};

/// The canonical fork-override env-var name for a network, e.g. `"sepolia"`
/// → `"SEPOLIA_RPC_URL"`.
pub fn canonical_fork_override_var(network: &str) -> String {
    format!("{}_RPC_URL", network.to_uppercase())
}

/// Builds the spawn environment for `request`. Variables here are exported
/// ahead of the process's existing environment; on collision, these values
/// win.
pub fn build(request: &ScriptRequest, encoded_senders: &Bytes, lib_deployer: Option<&str>) -> HashMap<String, String> {
    let mut env = HashMap::new();

    env.insert("FOUNDRY_PROFILE".to_string(), request.effective_namespace().to_string());
    env.insert("NAMESPACE".to_string(), request.effective_namespace().to_string());
    env.insert("NETWORK".to_string(), request.network.clone());
    env.insert(
        "DRYRUN".to_string(),
        (request.dry_run || request.debug).to_string(),
    );
    env.insert("SENDER_CONFIGS".to_string(), format!("0x{}", const_hex::encode(encoded_senders)));

    if let Some(deployer) = lib_deployer {
        env.insert("TREB_LIB_DEPLOYER".to_string(), deployer.to_string());
    }

    if !request.libraries.is_empty() {
        let joined = request
            .libraries
            .iter()
            .map(|lib| format!("{}:{}:{}", lib.path, lib.name, lib.address))
            .collect::<Vec<_>>()
            .join(" ");
        env.insert("DEPLOYED_LIBRARIES".to_string(), joined);
    }

    for (key, value) in &request.parameters {
        env.insert(key.clone(), value.clone());
    }

    let canonical_override = canonical_fork_override_var(&request.network);
    for (var, url) in &request.fork_overrides {
        if *var == canonical_override {
            env.insert(var.clone(), url.clone());
        }
    }

    env
}
