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

//! Error taxonomy of the core. The enums nest the same way the conceptual
//! hierarchy does, so a handler matching on an outer variant catches all of
//! its inner kinds.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;
use crate::backend::BackendInitError;
use crate::backend::BackendLoadError;
use crate::repo_path::InvalidRepoPathError;
use crate::repo_path::RepoPathBuf;

pub type VcsResult<T> = Result<T, VcsError>;

/// Top-level error type of the crate.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Changeset(#[from] ChangesetError),
    #[error(transparent)]
    Node(#[from] NodeError),
    /// `next()`/`prev()` was called with a branch filter on a changeset
    /// outside that branch.
    #[error("Changeset {id} is not on branch \"{branch}\"")]
    NotOnBranch { id: String, branch: String },
    #[error("Archive type \"{kind}\" is not supported")]
    ImproperArchiveType { kind: String },
}

/// Repository-level failures: open/create/clone, revision resolution,
/// commits and tags.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("No valid repository found at \"{path}\"")]
    NotFound {
        path: PathBuf,
        #[source]
        source: BackendLoadError,
    },
    #[error("Cannot create repository at \"{path}\": path already exists")]
    AlreadyExists { path: PathBuf },
    #[error("Cannot create repository at \"{path}\"")]
    Init {
        path: PathBuf,
        #[source]
        source: BackendInitError,
    },
    #[error("Cloning from \"{url}\" requires `create`")]
    CloneWithoutCreate { url: String },
    #[error("Failed to clone repository from \"{url}\"")]
    Clone {
        url: String,
        #[source]
        source: BackendInitError,
    },
    #[error("Unknown backend alias \"{alias}\"")]
    UnknownAlias { alias: String },
    /// The operation needs at least one changeset.
    #[error("There are no changesets yet")]
    Empty,
    #[error("Revision {rev} does not exist for this repository")]
    ChangesetDoesNotExist { rev: String },
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error("Tag \"{name}\" already exists")]
    TagAlreadyExist { name: String },
    #[error("Tag \"{name}\" does not exist")]
    TagDoesNotExist { name: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Failures of the in-memory changeset validator and of the commit path.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Nothing changed")]
    NothingChanged,
    #[error("Node at \"{path}\" already exists at {id}")]
    NodeAlreadyExists { path: RepoPathBuf, id: String },
    #[error("Node at \"{path}\" is missing from the parent changesets")]
    NodeDoesNotExist { path: RepoPathBuf },
    #[error("Node at \"{path}\" wasn't actually changed since the parents' changesets")]
    NodeNotChanged { path: RepoPathBuf },
    #[error("Node at \"{path}\" is already marked for addition")]
    NodeAlreadyAdded { path: RepoPathBuf },
    #[error("Node at \"{path}\" is already marked as changed")]
    NodeAlreadyChanged { path: RepoPathBuf },
    #[error("Node at \"{path}\" is already marked for removal")]
    NodeAlreadyRemoved { path: RepoPathBuf },
    #[error("Commit failed in the backend")]
    Backend(#[from] BackendError),
}

/// Node lookup failure or wrong-kind access on an existing changeset.
#[derive(Debug, Error)]
pub enum ChangesetError {
    #[error("There is no file nor directory at \"{path}\" at revision {rev}")]
    NodeDoesNotExist { path: RepoPathBuf, rev: String },
    #[error("\"{path}\" at revision {rev} is not a file")]
    NotAFile { path: RepoPathBuf, rev: String },
    #[error("\"{path}\" at revision {rev} is not a directory")]
    NotADirectory { path: RepoPathBuf, rev: String },
    #[error(transparent)]
    InvalidPath(#[from] InvalidRepoPathError),
}

/// Node-level misuse, e.g. reading through a removed-file marker.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Nothing to read: node at \"{path}\" is marked as removed")]
    RemovedFileAccess { path: RepoPathBuf },
}

impl From<BackendError> for VcsError {
    fn from(err: BackendError) -> Self {
        Self::Repository(RepositoryError::Backend(err))
    }
}

impl From<CommitError> for VcsError {
    fn from(err: CommitError) -> Self {
        Self::Repository(RepositoryError::Commit(err))
    }
}

impl From<InvalidRepoPathError> for VcsError {
    fn from(err: InvalidRepoPathError) -> Self {
        Self::Changeset(ChangesetError::InvalidPath(err))
    }
}
