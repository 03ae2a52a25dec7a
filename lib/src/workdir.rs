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

//! Read-only view over the working tree, classifying entries relative to
//! the tip snapshot.

use std::fs;

use crate::backend::BackendError;
use crate::changeset::Changeset;
use crate::error::RepositoryError;
use crate::error::VcsError;
use crate::error::VcsResult;
use crate::file_util::walk_repo_files;
use crate::memory::CommitOptions;
use crate::memory::StagedFile;
use crate::node::NodeKind;
use crate::repo_path::RepoPathBuf;
use crate::repository::Repository;
use crate::repository::Revspec;

/// All four working-tree classification lists.
#[derive(Debug, Default)]
pub struct WorkdirStatus {
    pub added: Vec<StagedFile>,
    pub changed: Vec<StagedFile>,
    pub removed: Vec<StagedFile>,
    pub untracked: Vec<StagedFile>,
}

/// Working directory representation of a single repository.
#[derive(Clone, Debug)]
pub struct Workdir {
    repository: Repository,
}

fn io_error(err: std::io::Error) -> VcsError {
    RepositoryError::Backend(BackendError::Other(Box::new(err))).into()
}

impl Workdir {
    pub(crate) fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    fn tip(&self) -> VcsResult<Option<Changeset>> {
        match self.repository.tip() {
            Ok(tip) => Ok(Some(tip)),
            Err(VcsError::Repository(RepositoryError::Empty)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn staged_from_disk(&self, path: &RepoPathBuf) -> VcsResult<StagedFile> {
        let content = fs::read(path.to_fs_path(self.repository.path())).map_err(io_error)?;
        StagedFile::new(path.as_internal_str(), content)
    }

    /// Files present under the repository root that the backend does not
    /// track. The backend's metadata directory is excluded.
    pub fn get_untracked(&self) -> VcsResult<Vec<StagedFile>> {
        let tip = self.tip()?;
        let disk_files = walk_repo_files(
            self.repository.path(),
            self.repository.backend().metadata_dir(),
        )
        .map_err(io_error)?;
        disk_files
            .iter()
            .filter(|path| {
                tip.as_ref()
                    .map_or(true, |tip| tip.kind_of(path) != Some(NodeKind::File))
            })
            .map(|path| self.staged_from_disk(path))
            .collect()
    }

    /// Files scheduled for addition. The included backends have no staging
    /// area, so this list is empty; new files appear as untracked instead.
    pub fn get_added(&self) -> VcsResult<Vec<StagedFile>> {
        Ok(vec![])
    }

    /// Tracked files whose on-disk content differs from the tip snapshot.
    pub fn get_changed(&self) -> VcsResult<Vec<StagedFile>> {
        let Some(tip) = self.tip()? else {
            return Ok(vec![]);
        };
        let mut result = vec![];
        for path in tip.file_paths() {
            let fs_path = path.to_fs_path(self.repository.path());
            if !fs_path.is_file() {
                continue;
            }
            let on_disk = fs::read(&fs_path).map_err(io_error)?;
            if on_disk != tip.file_content_canonical(path)? {
                result.push(StagedFile::new(path.as_internal_str(), on_disk)?);
            }
        }
        Ok(result)
    }

    /// Tracked files missing from the working tree.
    pub fn get_removed(&self) -> VcsResult<Vec<StagedFile>> {
        let Some(tip) = self.tip()? else {
            return Ok(vec![]);
        };
        tip.file_paths()
            .iter()
            .filter(|path| !path.to_fs_path(self.repository.path()).is_file())
            .map(|path| StagedFile::removed(path.as_internal_str()))
            .collect()
    }

    /// All four classification lists in one pass.
    pub fn get_status(&self) -> VcsResult<WorkdirStatus> {
        Ok(WorkdirStatus {
            added: self.get_added()?,
            changed: self.get_changed()?,
            removed: self.get_removed()?,
            untracked: self.get_untracked()?,
        })
    }

    /// Populates the working tree with the content of the given revision
    /// (the tip if unset).
    pub fn update(&self, rev: Option<Revspec>) -> VcsResult<()> {
        let changeset = self.repository.get_changeset(rev.unwrap_or_default())?;
        self.repository
            .backend()
            .checkout(changeset.raw_id())
            .map_err(RepositoryError::Backend)?;
        Ok(())
    }

    /// Commits the current working-tree state: untracked files are staged as
    /// additions, changed and removed files as such.
    pub fn commit(&self, message: &str, author: &str) -> VcsResult<Changeset> {
        let status = self.get_status()?;
        let mut in_memory = self.repository.in_memory_changeset();
        in_memory.add(status.untracked)?;
        if !status.changed.is_empty() {
            in_memory.change(status.changed)?;
        }
        if !status.removed.is_empty() {
            in_memory.remove(status.removed)?;
        }
        in_memory.commit(message, author, CommitOptions::default())
    }
}
