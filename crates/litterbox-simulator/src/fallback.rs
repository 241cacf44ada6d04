//! Local fallback files.
//!
//! A fallback file is a pretty-printed JSON array of usage events, named
//! after the second it was written. A second file in the same second gets
//! a numeric suffix; existing files are never overwritten. Nothing reads
//! these automatically; `REPLAY_FILE` republishes one by hand.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use litterbox_types::UsageEvent;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::SimulatorError;

/// Why a file is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    /// The broker could not be reached, so the file is the only copy.
    Unreachable,
    /// The batch was published; the file is a safety copy.
    Backup,
}

impl FallbackKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Unreachable => "litterbox_data",
            Self::Backup => "backup_litterbox_data",
        }
    }
}

/// Most files written for one kind within the same second.
const MAX_SAME_SECOND: u32 = 1000;

/// Path of the file written for `kind` at `now`.
///
/// `attempt` 0 is the plain timestamped name; later attempts append
/// `_<attempt>` before the extension.
pub fn fallback_path(
    dir: &Path,
    kind: FallbackKind,
    now: DateTime<Utc>,
    attempt: u32,
) -> PathBuf {
    let stamp = now.format("%Y%m%d_%H%M%S");
    if attempt == 0 {
        dir.join(format!("{}_{stamp}.json", kind.prefix()))
    } else {
        dir.join(format!("{}_{stamp}_{attempt}.json", kind.prefix()))
    }
}

/// Create the first free timestamped file for `kind` in `dir`.
async fn create_unique(
    dir: &Path,
    kind: FallbackKind,
    now: DateTime<Utc>,
) -> Result<(PathBuf, tokio::fs::File), SimulatorError> {
    let mut attempt = 0;
    loop {
        let path = fallback_path(dir, kind, now, attempt);
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        match opened {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_SAME_SECOND => {
                debug!(path = %path.display(), "fallback file exists, trying next name");
                attempt = attempt.saturating_add(1);
            }
            Err(source) => return Err(SimulatorError::Fallback { path, source }),
        }
    }
}

/// Write `events` to a new timestamped file in `dir`.
pub async fn write_fallback(
    dir: &Path,
    kind: FallbackKind,
    events: &[UsageEvent],
) -> Result<PathBuf, SimulatorError> {
    let body = serde_json::to_vec_pretty(events).map_err(|source| {
        SimulatorError::FallbackFormat {
            path: dir.to_path_buf(),
            source,
        }
    })?;
    let (path, mut file) = create_unique(dir, kind, Utc::now()).await?;
    let written = async {
        file.write_all(&body).await?;
        file.flush().await
    }
    .await;
    written.map_err(|source| SimulatorError::Fallback {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), records = events.len(), ?kind, "data saved to file");
    Ok(path)
}

/// Read back a file written by [`write_fallback`].
pub async fn read_fallback(path: &Path) -> Result<Vec<UsageEvent>, SimulatorError> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|source| SimulatorError::Fallback {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&body).map_err(|source| SimulatorError::FallbackFormat {
        path: path.to_path_buf(),
        source,
    })
}
