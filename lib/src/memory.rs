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

//! Pending changes assembled in memory, validated against the declared
//! parents before any backend mutation.

use std::fmt;
use std::fmt::Debug;

use crate::backend::CommitOp;
use crate::backend::CommitParams;
use crate::backend::RevId;
use crate::backend::Timestamp;
use crate::changeset::Changeset;
use crate::error::CommitError;
use crate::error::NodeError;
use crate::error::RepositoryError;
use crate::error::VcsError;
use crate::error::VcsResult;
use crate::repo_path::RepoPathBuf;
use crate::repository::Repository;

/// A file staged for addition, change or removal. A removal marker carries
/// no content; reading it is a node-level error.
#[derive(Clone, PartialEq, Eq)]
pub struct StagedFile {
    path: RepoPathBuf,
    content: Option<Vec<u8>>,
    executable: bool,
}

impl Debug for StagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedFile")
            .field("path", &self.path)
            .field("removed", &self.content.is_none())
            .finish()
    }
}

impl StagedFile {
    pub fn new(path: impl AsRef<str>, content: impl Into<Vec<u8>>) -> VcsResult<Self> {
        Ok(Self {
            path: RepoPathBuf::parse(path)?,
            content: Some(content.into()),
            executable: false,
        })
    }

    /// A marker for a file to be removed by the next commit.
    pub fn removed(path: impl AsRef<str>) -> VcsResult<Self> {
        Ok(Self {
            path: RepoPathBuf::parse(path)?,
            content: None,
            executable: false,
        })
    }

    pub fn with_executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    pub fn path(&self) -> &RepoPathBuf {
        &self.path
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }

    /// Staged content. Fails on a removal marker.
    pub fn content(&self) -> VcsResult<&[u8]> {
        self.content
            .as_deref()
            .ok_or_else(|| {
                VcsError::Node(NodeError::RemovedFileAccess {
                    path: self.path.clone(),
                })
            })
    }
}

/// Optional parameters of [`InMemoryChangeset::commit`].
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    /// Parent changesets the commit derives from; defaults to the tip.
    pub parents: Option<Vec<Changeset>>,
    /// Branch name; defaults to the backend's default branch.
    pub branch: Option<String>,
    /// Commit date; defaults to now.
    pub date: Option<Timestamp>,
}

/// Records pending add/change/remove operations against a repository and
/// turns them into a new changeset on commit.
///
/// The scratchpad is either empty, staged, or reset back to empty by a
/// successful commit; validation failures leave it untouched.
pub struct InMemoryChangeset {
    repository: Repository,
    added: Vec<StagedFile>,
    changed: Vec<StagedFile>,
    removed: Vec<StagedFile>,
    // Always two slots once populated; the second one is reserved for merge
    // commits.
    parents: Option<[Option<Changeset>; 2]>,
}

impl Debug for InMemoryChangeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryChangeset")
            .field("added", &self.added.len())
            .field("changed", &self.changed.len())
            .field("removed", &self.removed.len())
            .finish()
    }
}

fn contains_path(files: &[StagedFile], path: &RepoPathBuf) -> bool {
    files.iter().any(|file| file.path() == path)
}

impl InMemoryChangeset {
    pub(crate) fn new(repository: Repository) -> Self {
        Self {
            repository,
            added: vec![],
            changed: vec![],
            removed: vec![],
            parents: None,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn added(&self) -> &[StagedFile] {
        &self.added
    }

    pub fn changed(&self) -> &[StagedFile] {
        &self.changed
    }

    pub fn removed(&self) -> &[StagedFile] {
        &self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Paths of all staged files, in added, changed, removed order.
    pub fn paths(&self) -> Vec<RepoPathBuf> {
        self.added
            .iter()
            .chain(&self.changed)
            .chain(&self.removed)
            .map(|file| file.path().clone())
            .collect()
    }

    /// Marks the given files to be committed as new.
    pub fn add(&mut self, files: impl IntoIterator<Item = StagedFile>) -> VcsResult<()> {
        let files: Vec<_> = files.into_iter().collect();
        for file in &files {
            if contains_path(&self.added, file.path()) {
                return Err(CommitError::NodeAlreadyAdded {
                    path: file.path().clone(),
                }
                .into());
            }
        }
        self.added.extend(files);
        Ok(())
    }

    /// Marks the given files to be committed as changed.
    pub fn change(&mut self, files: impl IntoIterator<Item = StagedFile>) -> VcsResult<()> {
        let files: Vec<_> = files.into_iter().collect();
        for file in &files {
            if contains_path(&self.removed, file.path()) {
                return Err(CommitError::NodeAlreadyRemoved {
                    path: file.path().clone(),
                }
                .into());
            }
        }
        if self.repository.is_empty() {
            // Nothing to change yet; new files must be *added* instead.
            return Err(RepositoryError::Empty.into());
        }
        for file in files {
            if contains_path(&self.changed, file.path()) {
                return Err(CommitError::NodeAlreadyChanged {
                    path: file.path().clone(),
                }
                .into());
            }
            self.changed.push(file);
        }
        Ok(())
    }

    /// Marks the given files to be removed by the next commit. The real
    /// removal happens at commit time.
    pub fn remove(&mut self, files: impl IntoIterator<Item = StagedFile>) -> VcsResult<()> {
        for file in files {
            if contains_path(&self.removed, file.path()) {
                return Err(CommitError::NodeAlreadyRemoved {
                    path: file.path().clone(),
                }
                .into());
            }
            if contains_path(&self.changed, file.path()) {
                return Err(CommitError::NodeAlreadyChanged {
                    path: file.path().clone(),
                }
                .into());
            }
            self.removed.push(file);
        }
        Ok(())
    }

    /// Resets this instance to its initial state.
    pub fn reset(&mut self) {
        self.added.clear();
        self.changed.clear();
        self.removed.clear();
        self.parents = None;
    }

    /// The declared parents, once populated by [`check_integrity`] or a
    /// commit. Always a two-element sequence.
    ///
    /// [`check_integrity`]: Self::check_integrity
    pub fn parents(&self) -> Option<&[Option<Changeset>; 2]> {
        self.parents.as_ref()
    }

    /// Validates the staged set against the declared parents and populates
    /// the parents from the tip if not already set.
    ///
    /// Validation order is deterministic: added first, then changed, then
    /// removed.
    pub fn check_integrity(&mut self, parents: Option<Vec<Changeset>>) -> VcsResult<()> {
        if self.parents.is_none() {
            let slots = match parents {
                Some(given) if !given.is_empty() => {
                    let mut iter = given.into_iter();
                    [iter.next(), iter.next()]
                }
                _ => match self.repository.tip() {
                    Ok(tip) => [Some(tip), None],
                    Err(VcsError::Repository(RepositoryError::Empty)) => [None, None],
                    Err(err) => return Err(err),
                },
            };
            self.parents = Some(slots);
        }
        let parents: Vec<&Changeset> = self
            .parents
            .as_ref()
            .unwrap()
            .iter()
            .flatten()
            .collect();

        // Nodes marked as added must not exist in any parent.
        for file in &self.added {
            for parent in &parents {
                if parent.get_node_canonical(file.path()).is_ok() {
                    return Err(CommitError::NodeAlreadyExists {
                        path: file.path().clone(),
                        id: parent.id(),
                    }
                    .into());
                }
            }
        }

        // Nodes marked as changed must exist in some parent...
        if let Some(file) = self.changed.first() {
            if parents.is_empty() {
                return Err(CommitError::NodeDoesNotExist {
                    path: file.path().clone(),
                }
                .into());
            }
        }
        for file in &self.changed {
            let found = parents
                .iter()
                .any(|parent| parent.get_node_canonical(file.path()).is_ok());
            if !found {
                return Err(CommitError::NodeDoesNotExist {
                    path: file.path().clone(),
                }
                .into());
            }
        }
        // ...and differ from at least one parent that contains them.
        for file in &self.changed {
            let mut changed_somewhere = false;
            for parent in &parents {
                match parent.file_content_canonical(file.path()) {
                    Ok(old) => {
                        if old != file.content()? {
                            changed_somewhere = true;
                        }
                    }
                    Err(_) => continue,
                }
            }
            if !changed_somewhere {
                return Err(CommitError::NodeNotChanged {
                    path: file.path().clone(),
                }
                .into());
            }
        }

        // Nodes marked as removed must exist in some parent.
        if let Some(file) = self.removed.first() {
            if parents.is_empty() {
                return Err(CommitError::NodeDoesNotExist {
                    path: file.path().clone(),
                }
                .into());
            }
        }
        for file in &self.removed {
            let found = parents
                .iter()
                .any(|parent| parent.get_node_canonical(file.path()).is_ok());
            if !found {
                return Err(CommitError::NodeDoesNotExist {
                    path: file.path().clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Validates the staged set, persists it through the backend and returns
    /// the newly created changeset. On success the repository's revision
    /// list grows by one and this scratchpad is reset; on failure it is
    /// preserved.
    #[tracing::instrument(skip(self, options))]
    pub fn commit(
        &mut self,
        message: &str,
        author: &str,
        options: CommitOptions,
    ) -> VcsResult<Changeset> {
        if self.is_empty() {
            return Err(CommitError::NothingChanged.into());
        }
        self.check_integrity(options.parents)?;

        let parent_ids: Vec<RevId> = self
            .parents
            .as_ref()
            .unwrap()
            .iter()
            .flatten()
            .map(|parent| parent.raw_id().clone())
            .collect();
        let branch = options
            .branch
            .unwrap_or_else(|| self.repository.backend().default_branch().to_owned());
        let date = options.date.unwrap_or_else(Timestamp::now);

        let mut ops: Vec<CommitOp> = vec![];
        for file in &self.added {
            ops.push(CommitOp::Add {
                path: file.path().clone(),
                content: file.content()?.to_vec(),
                executable: file.is_executable(),
            });
        }
        for file in &self.changed {
            ops.push(CommitOp::Change {
                path: file.path().clone(),
                content: file.content()?.to_vec(),
                executable: file.is_executable(),
            });
        }
        for file in &self.removed {
            ops.push(CommitOp::Remove {
                path: file.path().clone(),
            });
        }

        let params = CommitParams {
            parents: &parent_ids,
            author,
            message,
            date,
            branch: &branch,
        };
        let new_id = self
            .repository
            .backend()
            .commit_in_memory(&params, &ops)
            .map_err(CommitError::Backend)?;
        tracing::debug!(id = %new_id, "committed in-memory changeset");

        self.repository.sync_after_mutation()?;
        let changeset = self.repository.get_changeset_by_raw_id(&new_id)?;
        self.reset();
        Ok(changeset)
    }
}
