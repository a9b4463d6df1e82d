//! Subprocess spawning and the classifier→hydrator pipeline wiring.
//!
//! The script runs under a pseudo-terminal (`portable-pty`) rather than a
//! plain pipe, matching forge's own TTY-detection for colored/progress
//! output; PTY reads are blocking, so the reader loop runs on its own
//! thread and forwards classified records to the async side over a bounded
//! channel.

use {
    crate::{
        boundary::classifier::{RawRecord, Stage, advance_stage, archive_unknown, classify_line},
        domain::error::ClassifyError,
    },
    portable_pty::{CommandBuilder, PtySize, native_pty_system},
    std::{
        collections::HashMap,
        io::{BufRead, BufReader},
        path::{Path, PathBuf},
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    },
    tokio::sync::mpsc,
};

/// Bounded so a slow hydrator/projector applies backpressure to the reader
/// thread instead of buffering an unbounded run's output in memory.
pub const CHANNEL_CAPACITY: usize = 100;

pub struct SubprocessHandle {
    pub records: mpsc::Receiver<(RawRecord, Stage)>,
    pub cancel: Arc<AtomicBool>,
    reader_thread: std::thread::JoinHandle<Result<(), ClassifyError>>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
}

impl SubprocessHandle {
    /// Signals cancellation, waits for the reader thread, and kills the
    /// child if it hasn't exited.
    pub fn cancel_and_wait(mut self) -> std::io::Result<portable_pty::ExitStatus> {
        self.cancel.store(true, Ordering::Relaxed);
        let _ = self.reader_thread.join();
        let _ = self.child.kill();
        self.child.wait()
    }

    pub async fn wait(self) -> std::io::Result<portable_pty::ExitStatus> {
        let mut child = self.child;
        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .expect("reader thread panicked")?;
        let _ = self.reader_thread.join();
        Ok(status)
    }
}

/// Spawns `program` with `args` under a PTY, with `env` merged on top of the
/// inherited parent environment, and returns a handle streaming classified
/// records. Lines that classify as [`RawRecord::UnknownJSON`] are appended to
/// `ignore_dir`, when given, rather than dropped (§4.3).
pub fn spawn(
    program: &str,
    args: &[String],
    env: &HashMap<String, String>,
    ignore_dir: Option<&Path>,
) -> std::io::Result<SubprocessHandle> {
    let pty_system = native_pty_system();
    let pair = pty_system.openpty(PtySize {
        rows: 24,
        cols: 200,
        pixel_width: 0,
        pixel_height: 0,
    })?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let child = pair.slave.spawn_command(cmd)?;
    drop(pair.slave);
    let reader = pair.master.try_clone_reader()?;

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_for_thread = cancel.clone();
    let ignore_dir = ignore_dir.map(PathBuf::from);

    let reader_thread = std::thread::spawn(move || -> Result<(), ClassifyError> {
        let mut lines = BufReader::new(reader).lines();
        let mut stage = Stage::Simulating;
        loop {
            if cancel_for_thread.load(Ordering::Relaxed) {
                break;
            }
            let Some(line) = lines.next().transpose()? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            let record = classify_line(&line);
            if let (RawRecord::UnknownJSON(_), Some(dir)) = (&record, ignore_dir.as_deref()) {
                archive_unknown(dir, &line);
            }
            stage = advance_stage(stage, &record);
            if tx.blocking_send((record, stage)).is_err() {
                break;
            }
        }
        Ok(())
    });

    Ok(SubprocessHandle {
        records: rx,
        cancel,
        reader_thread,
        child,
    })
}
