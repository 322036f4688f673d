//! Record/replay fixture archives for deterministic API test runs.
//!
//! An archive maps a unit-test label to the ordered calls recorded under it.
//! Recording appends outcomes as they happen; replay hands them back one at a
//! time, matched by label and ordinal position only. A [`FixtureSession`] owns
//! the archive plus a per-label cursor and is meant for a single sequential
//! test runner: share it across concurrent runners only behind external
//! synchronization.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive: {0}")]
    Archive(#[from] serde_json::Error),
    #[error("no active unit test label")]
    NoActiveUnit,
    #[error("fixture exhausted for unit test '{label}': {recorded} calls recorded")]
    Exhausted { label: String, recorded: usize },
}

/// Whether a session feeds calls from the archive or fills it from live calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureMode {
    Record,
    Replay,
}

/// The recorded outcome of one call: the successful payload, or the fault the
/// remote side reported. Transport-level failures are never recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success { value: serde_json::Value },
    Fault { code: i64, message: String },
}

/// One recorded call: the request signature and its outcome. The signature is
/// kept for the archive's documentation value; replay never compares it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCall {
    pub method: String,
    pub params: serde_json::Value,
    pub outcome: Outcome,
}

/// Ordered recordings grouped by unit-test label. A `BTreeMap` keeps the
/// serialized form stable across save/load cycles.
pub type Archive = BTreeMap<String, Vec<RecordedCall>>;

/// Write any serializable value to a gzip-compressed JSON file.
pub fn write_fixture_file<T: Serialize>(path: &Path, data: &T) -> Result<(), FixtureError> {
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, data)?;
    let mut inner = encoder.finish()?;
    inner.flush()?;
    Ok(())
}

/// Read a value previously written with [`write_fixture_file`].
pub fn read_fixture_file<T: DeserializeOwned>(path: &Path) -> Result<T, FixtureError> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    Ok(serde_json::from_reader(decoder)?)
}

/// A record or replay session over one fixture archive.
#[derive(Debug)]
pub struct FixtureSession {
    mode: FixtureMode,
    path: PathBuf,
    archive: Archive,
    active: Option<String>,
    cursors: HashMap<String, usize>,
}

impl FixtureSession {
    /// Start an empty recording session that will save to `path`.
    pub fn record(path: impl Into<PathBuf>) -> Self {
        FixtureSession {
            mode: FixtureMode::Record,
            path: path.into(),
            archive: Archive::new(),
            active: None,
            cursors: HashMap::new(),
        }
    }

    /// Open a replay session over the archive stored at `path`.
    pub fn replay(path: impl Into<PathBuf>) -> Result<Self, FixtureError> {
        let path = path.into();
        let archive: Archive = read_fixture_file(&path)?;
        debug!(path = %path.display(), labels = archive.len(), "loaded fixture archive");
        Ok(FixtureSession {
            mode: FixtureMode::Replay,
            path,
            archive,
            active: None,
            cursors: HashMap::new(),
        })
    }

    pub fn mode(&self) -> FixtureMode {
        self.mode
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Activate a unit-test label and rewind its cursor to the start.
    pub fn set_unit_test(&mut self, label: &str) {
        debug!(label, mode = ?self.mode, "activating fixture unit test");
        self.cursors.insert(label.to_string(), 0);
        self.active = Some(label.to_string());
    }

    /// Append a recorded call under the active label.
    pub fn append(&mut self, call: RecordedCall) -> Result<(), FixtureError> {
        let label = self.active.clone().ok_or(FixtureError::NoActiveUnit)?;
        trace!(label = %label, method = %call.method, "recording call");
        self.archive.entry(label).or_default().push(call);
        Ok(())
    }

    /// Hand back the next unconsumed recording for the active label.
    ///
    /// Running past the recorded calls is a hard failure; the cursor never
    /// wraps and exhaustion is never retried.
    pub fn next(&mut self) -> Result<RecordedCall, FixtureError> {
        let label = self.active.clone().ok_or(FixtureError::NoActiveUnit)?;
        let cursor = self.cursors.entry(label.clone()).or_insert(0);
        let Some(calls) = self.archive.get(&label) else {
            return Err(FixtureError::Exhausted { label, recorded: 0 });
        };
        if *cursor >= calls.len() {
            return Err(FixtureError::Exhausted {
                label,
                recorded: calls.len(),
            });
        }
        let call = calls[*cursor].clone();
        *cursor += 1;
        trace!(label = %label, cursor = *cursor, method = %call.method, "replaying recorded call");
        Ok(call)
    }

    /// Persist the archive to the session's path.
    pub fn save(&self) -> Result<(), FixtureError> {
        debug!(path = %self.path.display(), labels = self.archive.len(), "saving fixture archive");
        write_fixture_file(&self.path, &self.archive)
    }
}
