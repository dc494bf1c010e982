//! Persistence orchestrator.
//!
//! Sequences the codec across a run boundary: decode-then-merge at run start,
//! encode-then-write at run end. Load never fails the host: an absent,
//! unreadable, corrupt, or unknown-class blob degrades to a cold start. Save
//! is the only gated step: if any encoding failure survives the ignore
//! filters, the stale blob is deleted instead of being overwritten with a
//! known-incomplete snapshot.
//!
//! ```text
//! Idle -> Loading -> Ready          (on_run_start)
//! Ready -> Saving -> Idle           (on_run_end)
//! Saving -> Aborted                 (unfiltered failures at save time)
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex_lite::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use xxhash_rust::xxh64::xxh64;

use crate::cycle::{compact, expand};
use crate::decode::decode;
use crate::encode::encode;
use crate::ignore::builtin_ignore_patterns;
use crate::persist::{PersistError, PersistedNode};
use crate::registry::ClassRegistry;
use crate::storage::{CacheStorage, FsStorage};
use crate::types::failure::FailureRecord;
use crate::types::value::{LiveNode, LiveValue};

/// How save-blocking failures are surfaced on the warning channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarnMode {
    /// No warning strings; the save abort itself still happens.
    Off,
    /// One line per distinct failure head.
    #[default]
    On,
    /// One line per distinct failure, with the full qualified path chain.
    Verbose,
}

/// Matcher applied to a failure record's rendered head.
#[derive(Debug, Clone)]
pub enum IgnorePattern {
    /// Substring match.
    Literal(String),
    /// Regular expression match.
    Pattern(Regex),
}

impl IgnorePattern {
    /// Substring matcher.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Regex matcher from pattern text.
    pub fn regex(pattern: &str) -> Result<Self, regex_lite::Error> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    /// Whether this matcher accepts the given failure head.
    pub fn matches(&self, head: &str) -> bool {
        match self {
            Self::Literal(text) => head.contains(text.as_str()),
            Self::Pattern(regex) => regex.is_match(head),
        }
    }
}

impl From<Regex> for IgnorePattern {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

impl From<&str> for IgnorePattern {
    fn from(text: &str) -> Self {
        Self::literal(text)
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// Cache file location, used by the filesystem-backed constructor.
    pub file: PathBuf,
    /// Warning verbosity.
    pub warn: WarnMode,
    /// Whether to log run statistics after a save.
    pub stats: bool,
    /// When false, save is a no-op; load still runs.
    pub persist: bool,
    /// Host-supplied failure matchers, applied on top of the built-in list.
    pub ignore: Vec<IgnorePattern>,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("./cache.json"),
            warn: WarnMode::default(),
            stats: false,
            persist: true,
            ignore: Vec::new(),
        }
    }
}

/// Orchestrator state across one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No transition in flight.
    Idle,
    /// Reading and decoding the persisted blob.
    Loading,
    /// Loaded; awaiting merge and the end of the run.
    Ready,
    /// Encoding and writing the blob.
    Saving,
    /// Save aborted on unfiltered failures. Terminal.
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Ready => write!(f, "ready"),
            Self::Saving => write!(f, "saving"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Wall-clock timings and outcomes for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// When the load transition began.
    pub load_started: Option<DateTime<Utc>>,
    /// When the load transition finished.
    pub load_finished: Option<DateTime<Utc>>,
    /// Whether a usable cache was restored.
    pub load_success: Option<bool>,
    /// When the save transition began.
    pub save_started: Option<DateTime<Utc>>,
    /// When the save transition finished.
    pub save_finished: Option<DateTime<Utc>>,
    /// Whether the blob was written.
    pub save_success: Option<bool>,
    /// xxh64 of the written blob, hex.
    pub blob_fingerprint: Option<String>,
}

impl RunStats {
    /// Load wall-clock time, when both instants were recorded.
    pub fn load_duration(&self) -> Option<chrono::Duration> {
        Some(self.load_finished? - self.load_started?)
    }

    /// Save wall-clock time, when both instants were recorded.
    pub fn save_duration(&self) -> Option<chrono::Duration> {
        Some(self.save_finished? - self.save_started?)
    }
}

/// Outcome of the save transition.
#[derive(Debug)]
pub enum SaveOutcome {
    /// Blob written.
    Written {
        /// Serialized blob size.
        bytes: usize,
        /// xxh64 of the blob, hex.
        fingerprint: String,
    },
    /// Unfiltered failures present; any stale blob was removed instead.
    Aborted {
        /// The failures that blocked the save, after ignore filtering.
        failures: Vec<FailureRecord>,
    },
    /// Persistence disabled by configuration.
    Disabled,
}

/// Error from an orchestrator hook.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A hook was called out of order.
    #[error("hook called in state {actual}, expected {expected}")]
    InvalidState {
        /// State the hook requires.
        expected: RunState,
        /// State the orchestrator was in.
        actual: RunState,
    },
    /// Save-side storage failure. Load-side storage failures never surface;
    /// they degrade to a cold start.
    #[error("storage error: {0}")]
    Storage(String),
    /// The compacted tree could not be serialized.
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] PersistError),
}

/// Sequences load, merge, and save for one cache blob across a run boundary.
///
/// # Example
///
/// ```rust,ignore
/// let mut persistence = CachePersistence::from_config(PersistConfig::default(), registry);
///
/// persistence.on_run_start().await?;            // load + decode, or cold start
/// persistence.on_compilation_ready(&cache)?;    // restored entries as defaults
/// // ... compilation populates `cache` ...
/// match persistence.on_run_end(&cache).await? {
///     SaveOutcome::Written { bytes, .. } => println!("cache saved ({} bytes)", bytes),
///     SaveOutcome::Aborted { failures } => eprintln!("not saved: {} failures", failures.len()),
///     SaveOutcome::Disabled => {}
/// }
/// ```
pub struct CachePersistence<S, R> {
    config: PersistConfig,
    storage: S,
    registry: R,
    state: RunState,
    /// Decoded cache awaiting merge.
    restored: Option<LiveValue>,
    matchers: Vec<IgnorePattern>,
    warnings: Arc<Mutex<Vec<String>>>,
    stats: RunStats,
}

impl<R: ClassRegistry> CachePersistence<FsStorage, R> {
    /// Filesystem-backed persistence over `config.file`.
    pub fn from_config(config: PersistConfig, registry: R) -> Self {
        let storage = FsStorage::new(&config.file);
        Self::new(config, storage, registry)
    }
}

impl<S: CacheStorage, R: ClassRegistry> CachePersistence<S, R> {
    /// Persistence over an explicit storage backend.
    pub fn new(config: PersistConfig, storage: S, registry: R) -> Self {
        let mut matchers: Vec<IgnorePattern> = builtin_ignore_patterns()
            .into_iter()
            .map(IgnorePattern::Pattern)
            .collect();
        matchers.extend(config.ignore.iter().cloned());

        Self {
            config,
            storage,
            registry,
            state: RunState::Idle,
            restored: None,
            matchers,
            warnings: Arc::new(Mutex::new(Vec::new())),
            stats: RunStats::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Timings and outcomes recorded so far.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Snapshot of the warning channel, in emission order.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    /// The registry in use.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Host hook: run start. Loads and decodes any persisted cache; every
    /// load-side failure degrades to a cold start.
    pub async fn on_run_start(&mut self) -> Result<(), OrchestratorError> {
        self.expect_state(RunState::Idle)?;
        self.state = RunState::Loading;
        self.stats.load_started = Some(Utc::now());

        let blob = match self.storage.read().await {
            Ok(blob) => blob,
            Err(err) => {
                debug!(error = %err, "cache unreadable, starting cold");
                None
            }
        };
        self.restored = blob.as_deref().and_then(|text| self.decode_blob(text));

        self.stats.load_finished = Some(Utc::now());
        self.stats.load_success = Some(self.restored.is_some());
        if self.config.stats {
            info!(
                restored = self.restored.is_some(),
                duration_ms = self
                    .stats
                    .load_duration()
                    .map(|d| d.num_milliseconds())
                    .unwrap_or(0),
                "cache load finished"
            );
        }

        self.state = RunState::Ready;
        Ok(())
    }

    /// Host hook: the live cache object exists. Restored entries are applied
    /// as defaults underneath it; existing live entries win.
    pub fn on_compilation_ready(&mut self, live: &LiveValue) -> Result<(), OrchestratorError> {
        self.expect_state(RunState::Ready)?;
        if let Some(restored) = self.restored.take() {
            merge_defaults(live, &restored);
        }
        Ok(())
    }

    /// Host hook: run end. Encodes the live cache and either writes the blob
    /// or aborts, deleting any stale blob, when unfiltered failures remain.
    pub async fn on_run_end(&mut self, live: &LiveValue) -> Result<SaveOutcome, OrchestratorError> {
        self.expect_state(RunState::Ready)?;
        self.state = RunState::Saving;

        if !self.config.persist {
            self.state = RunState::Idle;
            return Ok(SaveOutcome::Disabled);
        }
        self.stats.save_started = Some(Utc::now());

        let encoded = encode(live, &self.registry);
        let surfaced: Vec<FailureRecord> = encoded
            .failures
            .into_iter()
            .filter(|record| !self.is_ignored(&record.head()))
            .collect();

        if !surfaced.is_empty() {
            self.report_failures(&surfaced);
            if let Err(err) = self.storage.remove().await {
                warn!(error = %err, "failed to remove stale cache blob");
            }
            self.stats.save_finished = Some(Utc::now());
            self.stats.save_success = Some(false);
            self.state = RunState::Aborted;
            return Ok(SaveOutcome::Aborted { failures: surfaced });
        }

        let tree = compact(&encoded.root);
        let text = match tree.to_text() {
            Ok(text) => text,
            Err(err) => {
                self.stats.save_finished = Some(Utc::now());
                self.stats.save_success = Some(false);
                self.state = RunState::Idle;
                return Err(OrchestratorError::Serialize(err));
            }
        };
        let fingerprint = format!("{:016x}", xxh64(text.as_bytes(), 0));

        if let Err(err) = self.storage.write(&text).await {
            self.stats.save_finished = Some(Utc::now());
            self.stats.save_success = Some(false);
            self.state = RunState::Idle;
            return Err(OrchestratorError::Storage(err.to_string()));
        }

        self.stats.save_finished = Some(Utc::now());
        self.stats.save_success = Some(true);
        self.stats.blob_fingerprint = Some(fingerprint.clone());
        if self.config.stats {
            info!(
                bytes = text.len(),
                fingerprint = %fingerprint,
                duration_ms = self
                    .stats
                    .save_duration()
                    .map(|d| d.num_milliseconds())
                    .unwrap_or(0),
                "cache saved"
            );
        }

        self.state = RunState::Idle;
        Ok(SaveOutcome::Written {
            bytes: text.len(),
            fingerprint,
        })
    }

    fn expect_state(&self, expected: RunState) -> Result<(), OrchestratorError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn decode_blob(&self, text: &str) -> Option<LiveValue> {
        let tree = match PersistedNode::from_text(text) {
            Ok(tree) => tree,
            Err(err) => {
                debug!(error = %err, "persisted cache is corrupt, starting cold");
                return None;
            }
        };
        let tagged = match expand(&tree) {
            Ok(tagged) => tagged,
            Err(err) => {
                debug!(error = %err, "persisted cache is corrupt, starting cold");
                return None;
            }
        };
        match decode(&tagged, &self.registry) {
            Ok(live) => Some(live),
            Err(err) => {
                debug!(error = %err, "persisted cache is undecodable, starting cold");
                None
            }
        }
    }

    fn is_ignored(&self, head: &str) -> bool {
        self.matchers.iter().any(|matcher| matcher.matches(head))
    }

    /// Surface save-blocking failures, deduplicated by first occurrence of
    /// their rendered head.
    fn report_failures(&self, surfaced: &[FailureRecord]) {
        let mut seen = HashSet::new();
        let mut channel = self.warnings.lock();
        for record in surfaced {
            let head = record.head();
            if !seen.insert(head.clone()) {
                continue;
            }
            warn!(failure = %head, "cache save blocked by encoding failure");
            match self.config.warn {
                WarnMode::Off => {}
                WarnMode::On => channel.push(head),
                WarnMode::Verbose => channel.push(record.chain()),
            }
        }
    }
}

/// Install restored top-level entries under the live root where the live
/// root lacks the key. Restored subtrees keep their decoded identity.
fn merge_defaults(live: &LiveValue, restored: &LiveValue) {
    let restored_entries: Vec<(String, LiveValue)> = match &*restored.borrow() {
        LiveNode::Map(entries) => entries
            .iter()
            .map(|(key, member)| (key.clone(), member.clone()))
            .collect(),
        _ => {
            debug!("restored cache root is not a mapping, skipping merge");
            return;
        }
    };

    let mut applied = 0usize;
    for (key, member) in restored_entries {
        if !live.contains_key(&key) {
            live.insert(key, member);
            applied += 1;
        }
    }
    debug!(applied, "merged restored cache entries");
}
