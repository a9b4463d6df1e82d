//! C9 — fork snapshot manager.
//!
//! Point-in-time copy/restore of the registry's JSON files under a
//! per-network, per-index directory tree, so a forked run can be rolled
//! back to a known-good registry state.

use {crate::domain::error::SnapshotError, std::path::{Path, PathBuf}};

/// The fixed set of files a snapshot copies; the order has no meaning, it's
/// just the iteration order for `backup`/`restore`.
pub const SNAPSHOT_FILES: &[&str] = &[
    "deployments.json",
    "transactions.json",
    "safe-txs.json",
    "registry.json",
    "addressbook.json",
];

fn snapshot_dir(data_dir: &Path, network: &str, index: u64) -> PathBuf {
    data_dir.join("priv").join("fork").join(network).join("snapshots").join(index.to_string())
}

fn network_dir(data_dir: &Path, network: &str) -> PathBuf {
    data_dir.join(network)
}

fn copy_if_present(from: &Path, to: &Path) -> Result<(), SnapshotError> {
    match std::fs::copy(from, to) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SnapshotError::Io { path: from.to_path_buf(), source }),
    }
}

/// Copies each of [`SNAPSHOT_FILES`] from the registry directory to
/// `<data_dir>/priv/fork/<network>/snapshots/<index>/`. Missing source files
/// are silently skipped.
pub fn backup(data_dir: &Path, network: &str, index: u64) -> Result<(), SnapshotError> {
    let dest = snapshot_dir(data_dir, network, index);
    std::fs::create_dir_all(&dest).map_err(|source| SnapshotError::Io { path: dest.clone(), source })?;
    let src_dir = network_dir(data_dir, network);
    for file in SNAPSHOT_FILES {
        copy_if_present(&src_dir.join(file), &dest.join(file))?;
    }
    Ok(())
}

/// Reverse of [`backup`]: copies each snapshot file back over the registry
/// directory. Missing snapshot files are silently skipped, leaving the
/// current registry value intact.
pub fn restore(data_dir: &Path, network: &str, index: u64) -> Result<(), SnapshotError> {
    let src = snapshot_dir(data_dir, network, index);
    let dest_dir = network_dir(data_dir, network);
    std::fs::create_dir_all(&dest_dir).map_err(|source| SnapshotError::Io { path: dest_dir.clone(), source })?;
    for file in SNAPSHOT_FILES {
        copy_if_present(&src.join(file), &dest_dir.join(file))?;
    }
    Ok(())
}

/// Removes the entire per-network snapshot subtree. A missing subtree is
/// not an error.
pub fn cleanup(data_dir: &Path, network: &str) -> Result<(), SnapshotError> {
    let dir = data_dir.join("priv").join("fork").join(network);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SnapshotError::Io { path: dir, source }),
    }
}
