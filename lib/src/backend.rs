// Copyright 2024 The vcs-lib Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The narrow contract concrete backends implement, plus the value types
//! exchanged across it. The core never imports backend-specific error types;
//! adapters rewrap them into [`BackendError`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::path::Path;

use chrono::TimeZone as _;
use indexmap::IndexMap;
use thiserror::Error;

use crate::repo_path::RepoPathBuf;

/// Number of characters of a `raw_id` that form the short id.
pub const SHORT_ID_LENGTH: usize = 12;

/// Backend-native changeset identifier (e.g. 40 hex digits for git).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RevId(String);

impl RevId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first [`SHORT_ID_LENGTH`] characters, or the whole id if shorter.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(SHORT_ID_LENGTH)]
    }
}

impl Debug for RevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RevId").field(&self.0).finish()
    }
}

impl fmt::Display for RevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

#[derive(Debug, Error)]
#[error("Out-of-range date")]
pub struct TimestampOutOfRange;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct MillisSinceEpoch(pub i64);

/// Commit timestamp with its original UTC offset.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Timestamp {
    pub timestamp: MillisSinceEpoch,
    // time zone offset in minutes
    pub tz_offset: i32,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(chrono::offset::Local::now())
    }

    pub fn from_datetime<Tz: chrono::TimeZone<Offset = chrono::offset::FixedOffset>>(
        datetime: chrono::DateTime<Tz>,
    ) -> Self {
        Self {
            timestamp: MillisSinceEpoch(datetime.timestamp_millis()),
            tz_offset: datetime.offset().local_minus_utc() / 60,
        }
    }

    pub fn to_datetime(
        &self,
    ) -> Result<chrono::DateTime<chrono::FixedOffset>, TimestampOutOfRange> {
        let utc = match chrono::Utc.timestamp_opt(
            self.timestamp.0.div_euclid(1000),
            (self.timestamp.0.rem_euclid(1000)) as u32 * 1000000,
        ) {
            chrono::LocalResult::None => {
                return Err(TimestampOutOfRange);
            }
            chrono::LocalResult::Single(x) => x,
            chrono::LocalResult::Ambiguous(y, _z) => y,
        };
        Ok(utc.with_timezone(
            &chrono::FixedOffset::east_opt(self.tz_offset * 60)
                .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).unwrap()),
        ))
    }
}

/// Everything the core needs to know about one changeset, produced in a
/// single backend round-trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    pub parents: Vec<RevId>,
    pub author: String,
    pub message: String,
    pub date: Timestamp,
    pub branch: String,
    pub tags: Vec<String>,
    /// Paths the backend reports as modified versus the first parent.
    pub touched_paths: Vec<RepoPathBuf>,
    /// All file paths present in the snapshot.
    pub file_paths: Vec<RepoPathBuf>,
}

/// Per-file status of a changeset against a parent, or of the working tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub added: Vec<RepoPathBuf>,
    pub changed: Vec<RepoPathBuf>,
    pub removed: Vec<RepoPathBuf>,
    pub deleted: Vec<RepoPathBuf>,
}

/// One staged operation handed to [`Backend::commit_in_memory`].
#[derive(Clone, Debug)]
pub enum CommitOp {
    Add {
        path: RepoPathBuf,
        content: Vec<u8>,
        executable: bool,
    },
    Change {
        path: RepoPathBuf,
        content: Vec<u8>,
        executable: bool,
    },
    Remove {
        path: RepoPathBuf,
    },
}

impl CommitOp {
    pub fn path(&self) -> &RepoPathBuf {
        match self {
            Self::Add { path, .. } | Self::Change { path, .. } | Self::Remove { path } => path,
        }
    }
}

/// Commit metadata handed to [`Backend::commit_in_memory`].
#[derive(Clone, Debug)]
pub struct CommitParams<'a> {
    pub parents: &'a [RevId],
    pub author: &'a str,
    pub message: &'a str,
    pub date: Timestamp,
    pub branch: &'a str,
}

/// Tagging metadata, accepted for interface parity across backends. The
/// included backends record lightweight tag references and do not persist
/// `user`, `message` or `date`.
#[derive(Clone, Debug)]
pub struct TagParams<'a> {
    pub user: &'a str,
    pub message: Option<&'a str>,
    pub date: Option<Timestamp>,
    pub local: bool,
}

/// Named references of a repository, in backend order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Refs {
    pub branches: IndexMap<String, RevId>,
    pub tags: IndexMap<String, RevId>,
}

/// Error that may occur during backend initialization.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct BackendInitError(pub Box<dyn std::error::Error + Send + Sync>);

/// Error that may occur during backend loading.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct BackendLoadError(pub Box<dyn std::error::Error + Send + Sync>);

/// Backend error that may occur after the backend is loaded.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Object {hash} of type {object_type} not found")]
    ObjectNotFound {
        object_type: String,
        hash: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Error when reading object {hash} of type {object_type}")]
    ReadObject {
        object_type: String,
        hash: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Could not write object of type {object_type}")]
    WriteObject {
        object_type: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("No file at \"{path}\" in {hash}")]
    PathNotFound { path: RepoPathBuf, hash: String },
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
    /// A valid operation attempted, but failed because it isn't supported by
    /// the particular backend.
    #[error("{0}")]
    Unsupported(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Defines the interface one concrete VCS binding implements.
pub trait Backend: Any + Send + Sync + Debug {
    /// The alias this backend is registered under (`"git"`, `"local"`, ...).
    fn name(&self) -> &str;

    /// Branch name used when a commit doesn't specify one.
    fn default_branch(&self) -> &str;

    /// Name of the backend's own metadata directory under the repository
    /// root (e.g. `".git"`). Excluded from working-tree enumeration.
    fn metadata_dir(&self) -> &str;

    /// All changeset ids in oldest-first history order.
    fn revisions(&self) -> BackendResult<Vec<RevId>>;

    fn refs(&self) -> BackendResult<Refs>;

    fn commit_info(&self, id: &RevId) -> BackendResult<CommitInfo>;

    /// Per-file status of `id` against `parent` (the empty tree if `None`).
    /// Used for merge changesets and as the large-diff fallback.
    fn status(&self, id: &RevId, parent: Option<&RevId>) -> BackendResult<StatusSummary>;

    fn file_content(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<Vec<u8>>;

    fn file_size(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<u64>;

    fn file_is_executable(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<bool>;

    /// Changesets that modified `path`, newest first.
    fn file_history(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<Vec<RevId>>;

    /// Per-line originating changeset and line content, in file order.
    fn file_annotate(
        &self,
        id: &RevId,
        path: &RepoPathBuf,
    ) -> BackendResult<Vec<(RevId, Vec<u8>)>>;

    /// Persists a snapshot assembled in memory and returns its new id. The
    /// caller has already validated `ops` against the declared parents.
    fn commit_in_memory(&self, params: &CommitParams<'_>, ops: &[CommitOp])
        -> BackendResult<RevId>;

    fn tag(&self, name: &str, rev: &RevId, params: &TagParams<'_>) -> BackendResult<()>;

    fn untag(&self, name: &str, params: &TagParams<'_>) -> BackendResult<()>;

    /// Populates the working tree with the content of the given revision.
    fn checkout(&self, id: &RevId) -> BackendResult<()>;

    /// Reopens backend state after an external mutation (used post-commit).
    fn refresh(&self) -> BackendResult<()>;

    fn description(&self) -> String {
        "unknown".to_owned()
    }

    fn contact(&self) -> String {
        "Unknown".to_owned()
    }
}

impl dyn Backend {
    /// Returns reference of the implementation type.
    pub fn downcast_ref<T: Backend>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref()
    }
}

/// Opens, creates or clones repositories of one backend kind.
pub trait BackendFactory: Send + Sync {
    fn alias(&self) -> &str;

    fn open(&self, path: &Path) -> Result<Box<dyn Backend>, BackendLoadError>;

    fn create(&self, path: &Path) -> Result<Box<dyn Backend>, BackendInitError>;

    fn clone_from(&self, src_url: &str, path: &Path) -> Result<Box<dyn Backend>, BackendInitError>;
}

/// Registry dispatching backend factories by alias.
pub struct BackendFactories {
    factories: HashMap<String, Box<dyn BackendFactory>>,
}

impl Debug for BackendFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendFactories")
            .field("aliases", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendFactories {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn add(&mut self, factory: Box<dyn BackendFactory>) {
        self.factories.insert(factory.alias().to_owned(), factory);
    }

    pub fn get(&self, alias: &str) -> Option<&dyn BackendFactory> {
        self.factories.get(alias).map(AsRef::as_ref)
    }
}

impl Default for BackendFactories {
    fn default() -> Self {
        let mut factories = Self::empty();
        factories.add(Box::new(crate::local_backend::LocalBackendFactory));
        #[cfg(feature = "git")]
        factories.add(Box::new(crate::git_backend::GitBackendFactory::default()));
        factories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        let id = RevId::new("8dc0c4541dcf1bb90f7b2b6b48b0397b58e9b48e");
        assert_eq!(id.short(), "8dc0c4541dcf");
        assert_eq!(RevId::new("abc").short(), "abc");
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let timestamp = Timestamp {
            timestamp: MillisSinceEpoch(1_700_000_000_000),
            tz_offset: 120,
        };
        let datetime = timestamp.to_datetime().unwrap();
        assert_eq!(Timestamp::from_datetime(datetime), timestamp);
    }
}
