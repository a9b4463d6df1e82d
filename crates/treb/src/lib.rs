//! `treb` drives a Foundry script end to end: encode sender configs, spawn
//! the script under a PTY, classify and hydrate its streamed output, then
//! project the result into the on-disk registry.

pub mod boundary;
pub mod cli;
pub mod domain;
pub mod infra;

use {
    boundary::{classifier::RawRecord, environment, subprocess},
    domain::{
        hydrate::{self, HydratedRunResult, RawOutputs},
        request::{LibraryRef, ScriptRequest},
        sender::{SenderConfig, SenderKind},
        trace::Arena,
    },
    infra::{fork, prune, registry::Registry},
};

/// Entry point used by `main`; dispatches on the parsed subcommand.
pub async fn start(args: cli::Args) -> anyhow::Result<()> {
    tracing::info!(%args, "starting");
    match args.command {
        cli::Command::Run(run) => run_script(&args.data_dir, run).await,
        cli::Command::Prune(prune_args) => run_prune(&args.data_dir, prune_args).await,
        cli::Command::Snapshot(snap) => {
            fork::backup(&args.data_dir, &snap.network, snap.index)?;
            Ok(())
        }
        cli::Command::Restore(snap) => {
            fork::restore(&args.data_dir, &snap.network, snap.index)?;
            Ok(())
        }
    }
}

fn parse_address(s: &str) -> anyhow::Result<alloy_primitives::Address> {
    let bytes = const_hex::decode(s.trim_start_matches("0x"))?;
    anyhow::ensure!(bytes.len() == 20, "{s:?} is not a 20-byte address");
    Ok(alloy_primitives::Address::from_slice(&bytes))
}

fn build_senders(run: &cli::RunArgs) -> anyhow::Result<Vec<SenderConfig>> {
    let mut senders = Vec::with_capacity(run.private_keys.len() + run.safes.len());
    for (name, account, key) in &run.private_keys {
        let bytes = const_hex::decode(key.trim_start_matches("0x"))?;
        anyhow::ensure!(bytes.len() == 32, "private key for sender {name:?} must be 32 bytes");
        senders.push(SenderConfig {
            name: name.clone(),
            kind: SenderKind::PrivateKey {
                key: alloy_primitives::B256::from_slice(&bytes),
                account: parse_address(account)?,
            },
        });
    }
    for (name, account, proposer) in &run.safes {
        senders.push(SenderConfig {
            name: name.clone(),
            kind: SenderKind::Safe {
                account: parse_address(account)?,
                proposer: proposer.clone(),
            },
        });
    }
    Ok(senders)
}

/// Offsets and concatenates several scope-local arenas into the single
/// [`Arena`] the hydrator matches transactions against.
fn merge_arenas(arenas: Vec<Arena>) -> Arena {
    let mut merged = Arena::default();
    for arena in arenas {
        let offset = merged.nodes.len();
        for node in arena.nodes {
            merged.nodes.push(domain::trace::TraceNode {
                idx: node.idx + offset,
                parent: node.parent.map(|p| p + offset),
                children: node.children.iter().map(|c| c + offset).collect(),
                trace: node.trace,
                logs: node.logs,
            });
        }
    }
    merged
}

/// Assembles the `forge script` invocation described in §6: the script
/// path, `--ffi --rpc-url <network>`, `--broadcast` iff not a dry-run, the
/// hardware-wallet flag and derivation paths for any ledger/trezor sender,
/// one `--libraries` per configured library, `--json` unless raw-text debug
/// output was requested, and `--slow` when asked for.
fn forge_args(request: &ScriptRequest) -> Vec<String> {
    let mut args = vec![
        "script".to_string(),
        request.script_path.clone(),
        "--ffi".to_string(),
        "--rpc-url".to_string(),
        request.network.clone(),
    ];
    if !request.dry_run {
        args.push("--broadcast".to_string());
    }

    let mut ledger_paths = vec![];
    let mut trezor_paths = vec![];
    for sender in &request.senders {
        match &sender.kind {
            SenderKind::Ledger { derivation_path, .. } => ledger_paths.extend(derivation_path.clone()),
            SenderKind::Trezor { derivation_path, .. } => trezor_paths.extend(derivation_path.clone()),
            _ => {}
        }
    }
    if !ledger_paths.is_empty() {
        args.push("--ledger".to_string());
        args.push("--mnemonic-derivation-paths".to_string());
        args.push(ledger_paths.join(","));
    } else if !trezor_paths.is_empty() {
        args.push("--trezor".to_string());
        args.push("--mnemonic-derivation-paths".to_string());
        args.push(trezor_paths.join(","));
    }

    for lib in &request.libraries {
        args.push("--libraries".to_string());
        args.push(format!("{}:{}:{:#x}", lib.path, lib.name, lib.address));
    }

    if !request.debug {
        args.push("--json".to_string());
    }
    if request.slow {
        args.push("--slow".to_string());
    }
    args.push("-vvvv".to_string());
    args
}

/// Drains classified records into the accumulators the hydrator consumes,
/// returning whether the run's terminal status line reported success, the
/// chain id observed in the run's first gas estimate (if any), and the
/// broadcast transactions file path carried on that status line (if any).
fn accumulate(
    records: Vec<(RawRecord, boundary::classifier::Stage)>,
    raw: &mut RawOutputs,
) -> (bool, Option<u64>, Option<String>) {
    let mut arenas = vec![];
    let mut success = true;
    let mut chain_id = None;
    let mut transactions_path = None;
    for (record, _stage) in records {
        match record {
            RawRecord::ScriptOutput { raw_logs, traces, returns } => {
                raw.raw_logs.extend(raw_logs);
                arenas.extend(traces);
                raw.returns = returns;
            }
            RawRecord::TraceOutput { arena } => arenas.push(arena),
            RawRecord::GasEstimate { chain, .. } => {
                chain_id.get_or_insert(chain);
            }
            RawRecord::StatusOutput { status, transactions_path: path } => {
                success = status.eq_ignore_ascii_case("success");
                transactions_path = path;
            }
            RawRecord::TextOutput(line) => {
                let lowered = line.to_ascii_lowercase();
                if lowered.contains("error:") || lowered.contains("revert") || lowered.contains("script failed") {
                    success = false;
                }
            }
            RawRecord::Receipt { .. } | RawRecord::UnknownJSON(_) => {}
        }
    }
    raw.arena = merge_arenas(arenas);
    (success, chain_id, transactions_path)
}

async fn run_script(data_dir: &std::path::Path, run: cli::RunArgs) -> anyhow::Result<()> {
    use anyhow::Context;

    let senders = build_senders(&run).context("parsing sender configuration")?;
    let libraries = run
        .libraries
        .iter()
        .map(|(path, name, address)| {
            Ok(LibraryRef {
                path: path.clone(),
                name: name.clone(),
                address: parse_address(address)?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .context("parsing --library")?;

    let request = ScriptRequest {
        namespace: run.namespace.clone(),
        network: run.network.clone(),
        script_path: run.script.display().to_string(),
        parameters: run.parameters_map(),
        senders,
        libraries,
        dry_run: run.dry_run,
        debug: run.debug,
        slow: run.slow,
        fork_overrides: run.fork_overrides_map(),
    };

    let encoded_senders = domain::sender::encode(&request.senders).context("encoding sender configs")?;
    let env = environment::build(&request, &encoded_senders, None);
    let args = forge_args(&request);

    let ignore_dir = data_dir.join("priv").join("ignored");
    let mut handle =
        subprocess::spawn("forge", &args, &env, Some(&ignore_dir)).context("spawning forge script")?;
    let mut records = vec![];
    while let Some(item) = handle.records.recv().await {
        tracing::debug!(stage = ?item.1, "classified record");
        records.push(item);
    }
    let exit_status = handle.wait().await.context("waiting for forge script")?;

    let mut raw = RawOutputs::default();
    let (script_reported_success, chain_id, transactions_path) = accumulate(records, &mut raw);
    if !exit_status.success() || !script_reported_success {
        anyhow::bail!("script execution failed (exit status: {exit_status:?})");
    }

    let broadcast_path = if request.dry_run {
        None
    } else {
        transactions_path.as_ref().map(std::path::PathBuf::from)
    };

    let result = hydrate::hydrate(
        raw,
        request.effective_namespace(),
        chain_id.unwrap_or(0),
        broadcast_path.as_deref(),
    )
    .context("hydrating run output")?;
    project(data_dir, &request.network, result).await
}

async fn project(data_dir: &std::path::Path, network: &str, result: HydratedRunResult) -> anyhow::Result<()> {
    let registry = Registry::load(data_dir, network)?;
    registry.project(result).await?;
    Ok(())
}

async fn run_prune(data_dir: &std::path::Path, args: cli::PruneArgs) -> anyhow::Result<()> {
    use anyhow::Context;

    let _registry = Registry::load(data_dir, &args.network).context("loading registry")?;
    // No RPC client is wired up here; `infra::prune::ChainProbe` is the seam
    // a concrete JSON-RPC implementation plugs into.
    let _ = (args.rpc_url, args.dry_run, prune::scan);
    tracing::warn!("prune requires a configured ChainProbe implementation; nothing was scanned");
    Ok(())
}
