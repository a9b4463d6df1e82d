use std::{collections::HashMap, path::PathBuf};

#[derive(Debug, clap::Parser)]
#[clap(author, version, about)]
pub struct Args {
    #[clap(long, env, default_value = ".treb")]
    pub data_dir: PathBuf,

    #[clap(long, env, default_value = "info")]
    pub log_filter: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Run a Foundry script under treb and project its effects into the registry.
    Run(RunArgs),
    /// Prune registry entries whose on-chain footprint is gone.
    Prune(PruneArgs),
    /// Back up the registry so a fork run can be rolled back.
    Snapshot(SnapshotArgs),
    /// Restore the registry from a previously taken snapshot.
    Restore(SnapshotArgs),
}

#[derive(Debug, clap::Parser)]
pub struct RunArgs {
    /// Deployment namespace; falls back to "default" when empty.
    #[clap(long, default_value = "")]
    pub namespace: String,

    /// Network name, e.g. "sepolia". Used both for routing and as the
    /// registry subdirectory.
    #[clap(long)]
    pub network: String,

    /// Path to the Foundry script to run.
    #[clap(long)]
    pub script: PathBuf,

    /// key=value script parameters, may be repeated.
    #[clap(long = "param", value_parser = parse_key_val)]
    pub parameters: Vec<(String, String)>,

    /// path:name:address, may be repeated.
    #[clap(long = "library", value_parser = parse_library)]
    pub libraries: Vec<(String, String, String)>,

    /// network=rpc_url fork overrides, may be repeated.
    #[clap(long = "fork", value_parser = parse_key_val)]
    pub fork_overrides: Vec<(String, String)>,

    #[clap(long)]
    pub dry_run: bool,

    #[clap(long)]
    pub debug: bool,

    #[clap(long)]
    pub slow: bool,

    /// name:account:key private-key senders, may be repeated. Never logged.
    #[clap(long = "private-key", value_parser = parse_sender_triple)]
    pub private_keys: Vec<(String, String, String)>,

    /// name:account:proposer Safe senders, may be repeated.
    #[clap(long = "safe", value_parser = parse_sender_triple)]
    pub safes: Vec<(String, String, String)>,
}

#[derive(Debug, clap::Parser)]
pub struct PruneArgs {
    #[clap(long)]
    pub network: String,

    #[clap(long)]
    pub rpc_url: String,

    /// Report only; do not delete anything.
    #[clap(long)]
    pub dry_run: bool,
}

#[derive(Debug, clap::Parser)]
pub struct SnapshotArgs {
    #[clap(long)]
    pub network: String,

    #[clap(long)]
    pub index: u64,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    Ok((k.to_string(), v.to_string()))
}

fn parse_library(s: &str) -> Result<(String, String, String), String> {
    let mut parts = s.splitn(3, ':');
    let path = parts.next().ok_or("missing library path")?;
    let name = parts.next().ok_or("missing library name")?;
    let address = parts.next().ok_or("missing library address")?;
    Ok((path.to_string(), name.to_string(), address.to_string()))
}

fn parse_sender_triple(s: &str) -> Result<(String, String, String), String> {
    let mut parts = s.splitn(3, ':');
    let name = parts.next().ok_or("missing sender name")?;
    let account_or_proposer = parts.next().ok_or("missing sender account")?;
    let rest = parts.next().ok_or("missing sender key/proposer")?;
    Ok((name.to_string(), account_or_proposer.to_string(), rest.to_string()))
}

impl RunArgs {
    pub fn parameters_map(&self) -> HashMap<String, String> {
        self.parameters.iter().cloned().collect()
    }

    pub fn fork_overrides_map(&self) -> HashMap<String, String> {
        self.fork_overrides.iter().cloned().collect()
    }
}

/// Custom `Display` instead of deriving it so private keys never end up in a
/// log line via `{:?}`-style dumps of the parsed args.
impl std::fmt::Display for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data_dir: {:?}, log_filter: {}, command: ", self.data_dir, self.log_filter)?;
        match &self.command {
            Command::Run(run) => write!(
                f,
                "run {{ namespace: {:?}, network: {}, script: {:?}, dry_run: {}, debug: {}, slow: {}, \
                 private_keys: [{} SECRET] }}",
                run.namespace,
                run.network,
                run.script,
                run.dry_run,
                run.debug,
                run.slow,
                run.private_keys.len()
            ),
            Command::Prune(prune) => write!(
                f,
                "prune {{ network: {}, rpc_url: SECRET, dry_run: {} }}",
                prune.network, prune.dry_run
            ),
            Command::Snapshot(snap) => {
                write!(f, "snapshot {{ network: {}, index: {} }}", snap.network, snap.index)
            }
            Command::Restore(snap) => {
                write!(f, "restore {{ network: {}, index: {} }}", snap.network, snap.index)
            }
        }
    }
}
