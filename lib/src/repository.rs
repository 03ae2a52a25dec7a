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

//! Repository handles: opening, revision resolution and the changeset cache.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use indexmap::IndexMap;

use crate::backend::Backend;
use crate::backend::BackendFactories;
use crate::backend::Refs;
use crate::backend::RevId;
use crate::backend::TagParams;
use crate::backend::Timestamp;
use crate::changeset::Changeset;
use crate::changeset::ChangesetData;
use crate::error::RepositoryError;
use crate::error::VcsError;
use crate::error::VcsResult;
use crate::memory::InMemoryChangeset;
use crate::workdir::Workdir;

/// A revision specifier accepted by [`Repository::get_changeset`].
///
/// Integers index the revision list (`-1` is the tip); strings are tried as
/// decimal indexes, short or full hex ids, branch names and tag names, in
/// that order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Revspec {
    Tip,
    Revision(i64),
    Symbol(String),
}

impl Default for Revspec {
    fn default() -> Self {
        Self::Tip
    }
}

impl From<i64> for Revspec {
    fn from(value: i64) -> Self {
        Self::Revision(value)
    }
}

impl From<i32> for Revspec {
    fn from(value: i32) -> Self {
        Self::Revision(value.into())
    }
}

impl From<usize> for Revspec {
    fn from(value: usize) -> Self {
        Self::Revision(value.try_into().unwrap_or(i64::MAX))
    }
}

impl From<&str> for Revspec {
    fn from(value: &str) -> Self {
        Self::Symbol(value.to_owned())
    }
}

impl From<String> for Revspec {
    fn from(value: String) -> Self {
        Self::Symbol(value)
    }
}

impl From<&RevId> for Revspec {
    fn from(value: &RevId) -> Self {
        Self::Symbol(value.as_str().to_owned())
    }
}

fn is_tip_symbol(symbol: &str) -> bool {
    symbol == "tip" || symbol == "HEAD"
}

fn is_hex_id(symbol: &str) -> bool {
    (symbol.len() == 12 || symbol.len() == 40)
        && symbol.chars().all(|c| c.is_ascii_hexdigit())
}

/// Ways the same changeset is addressable in the cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum CacheKey {
    Revision(usize),
    RawId(RevId),
    ShortId(String),
    /// Sentinel for the most recent changeset; dropped whenever a commit
    /// moves the tip.
    Tip,
}

struct RevisionList {
    ids: Vec<RevId>,
    index: HashMap<RevId, usize>,
}

impl RevisionList {
    fn new(ids: Vec<RevId>) -> Self {
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self { ids, index }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn position(&self, id: &RevId) -> Option<usize> {
        self.index.get(id).copied()
    }
}

pub(crate) struct RepoState {
    path: PathBuf,
    backend: Box<dyn Backend>,
    revisions: Mutex<RevisionList>,
    changesets: Mutex<HashMap<CacheKey, Arc<ChangesetData>>>,
    refs: Mutex<Refs>,
}

/// Handle to a local repository. Cloning shares the underlying state; two
/// handles compare equal iff their filesystem paths are equal.
#[derive(Clone)]
pub struct Repository {
    state: Arc<RepoState>,
}

impl Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.state.path)
            .field("alias", &self.state.backend.name())
            .finish()
    }
}

impl PartialEq for Repository {
    fn eq(&self, other: &Self) -> bool {
        self.state.path == other.state.path
    }
}

impl Eq for Repository {}

impl Repository {
    /// General constructor mirroring the open/create/clone matrix: `create`
    /// opens a new repository (the path must not exist yet), `src_url`
    /// additionally clones from the given location and requires `create`.
    pub fn load(
        factories: &BackendFactories,
        alias: &str,
        path: impl AsRef<Path> + Debug,
        create: bool,
        src_url: Option<&str>,
    ) -> VcsResult<Repository> {
        match (create, src_url) {
            (false, Some(url)) => Err(RepositoryError::CloneWithoutCreate {
                url: url.to_owned(),
            }
            .into()),
            (false, None) => Self::open(factories, alias, path),
            (true, Some(url)) => Self::clone_from(factories, alias, url, path),
            (true, None) => Self::create(factories, alias, path),
        }
    }

    /// Opens an existing repository at `path`.
    #[tracing::instrument(skip(factories))]
    pub fn open(
        factories: &BackendFactories,
        alias: &str,
        path: impl AsRef<Path> + Debug,
    ) -> VcsResult<Repository> {
        let path = path.as_ref();
        let factory = factories
            .get(alias)
            .ok_or_else(|| RepositoryError::UnknownAlias {
                alias: alias.to_owned(),
            })?;
        let backend = factory
            .open(path)
            .map_err(|err| RepositoryError::NotFound {
                path: path.to_owned(),
                source: err,
            })?;
        Self::from_backend(path, backend)
    }

    /// Creates a new repository at `path`, which must not exist yet.
    #[tracing::instrument(skip(factories))]
    pub fn create(
        factories: &BackendFactories,
        alias: &str,
        path: impl AsRef<Path> + Debug,
    ) -> VcsResult<Repository> {
        let path = path.as_ref();
        let factory = factories
            .get(alias)
            .ok_or_else(|| RepositoryError::UnknownAlias {
                alias: alias.to_owned(),
            })?;
        if path.exists() {
            return Err(RepositoryError::AlreadyExists {
                path: path.to_owned(),
            }
            .into());
        }
        let backend = factory.create(path).map_err(|err| RepositoryError::Init {
            path: path.to_owned(),
            source: err,
        })?;
        Self::from_backend(path, backend)
    }

    /// Clones the repository at `src_url` into `path`.
    #[tracing::instrument(skip(factories))]
    pub fn clone_from(
        factories: &BackendFactories,
        alias: &str,
        src_url: &str,
        path: impl AsRef<Path> + Debug,
    ) -> VcsResult<Repository> {
        let path = path.as_ref();
        let factory = factories
            .get(alias)
            .ok_or_else(|| RepositoryError::UnknownAlias {
                alias: alias.to_owned(),
            })?;
        if path.exists() {
            return Err(RepositoryError::AlreadyExists {
                path: path.to_owned(),
            }
            .into());
        }
        let backend = factory
            .clone_from(src_url, path)
            .map_err(|err| RepositoryError::Clone {
                url: src_url.to_owned(),
                source: err,
            })?;
        Self::from_backend(path, backend)
    }

    fn from_backend(path: &Path, backend: Box<dyn Backend>) -> VcsResult<Repository> {
        let path = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let revisions = RevisionList::new(backend.revisions().map_err(RepositoryError::Backend)?);
        let refs = backend.refs().map_err(RepositoryError::Backend)?;
        tracing::debug!(?path, revisions = revisions.len(), "opened repository");
        Ok(Repository {
            state: Arc::new(RepoState {
                path,
                backend,
                revisions: Mutex::new(revisions),
                changesets: Mutex::new(HashMap::new()),
                refs: Mutex::new(refs),
            }),
        })
    }

    /// Absolute filesystem path of the repository.
    pub fn path(&self) -> &Path {
        &self.state.path
    }

    /// Basename of the repository path.
    pub fn name(&self) -> String {
        self.state
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The backend tag this repository was opened with (`"git"`, ...).
    pub fn alias(&self) -> &str {
        self.state.backend.name()
    }

    pub fn description(&self) -> String {
        self.state.backend.description()
    }

    pub fn contact(&self) -> String {
        self.state.backend.contact()
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.state.backend.as_ref()
    }

    /// Snapshot of the revision list, oldest first.
    pub fn revisions(&self) -> Vec<RevId> {
        self.state.revisions.lock().unwrap().ids.clone()
    }

    /// Number of changesets.
    pub fn count(&self) -> usize {
        self.revision_count()
    }

    pub fn is_empty(&self) -> bool {
        self.revision_count() == 0
    }

    pub(crate) fn revision_count(&self) -> usize {
        self.state.revisions.lock().unwrap().len()
    }

    /// Branch heads, in backend order.
    pub fn branches(&self) -> IndexMap<String, RevId> {
        self.state.refs.lock().unwrap().branches.clone()
    }

    /// Tags, in backend order.
    pub fn tags(&self) -> IndexMap<String, RevId> {
        self.state.refs.lock().unwrap().tags.clone()
    }

    /// The most recent changeset.
    pub fn tip(&self) -> VcsResult<Changeset> {
        self.get_changeset(Revspec::Tip)
    }

    fn resolve(&self, spec: &Revspec) -> VcsResult<usize> {
        let revisions = self.state.revisions.lock().unwrap();
        let tip = |revisions: &RevisionList| {
            revisions
                .len()
                .checked_sub(1)
                .ok_or(VcsError::Repository(RepositoryError::Empty))
        };
        let does_not_exist = |rev: String| {
            VcsError::Repository(RepositoryError::ChangesetDoesNotExist { rev })
        };
        match spec {
            Revspec::Tip => tip(&revisions),
            Revspec::Revision(-1) => tip(&revisions),
            Revspec::Revision(n) => usize::try_from(*n)
                .ok()
                .filter(|i| *i < revisions.len())
                .ok_or_else(|| does_not_exist(n.to_string())),
            Revspec::Symbol(symbol) if is_tip_symbol(symbol) => tip(&revisions),
            Revspec::Symbol(symbol) => {
                // Short decimal strings are revision numbers.
                if symbol.len() < 12 && !symbol.is_empty() && symbol.bytes().all(|b| b.is_ascii_digit())
                {
                    let n: i64 = symbol
                        .parse()
                        .map_err(|_| does_not_exist(symbol.clone()))?;
                    return usize::try_from(n)
                        .ok()
                        .filter(|i| *i < revisions.len())
                        .ok_or_else(|| does_not_exist(symbol.clone()));
                }
                if is_hex_id(symbol) {
                    let needle = symbol.to_ascii_lowercase();
                    let mut matches = revisions.ids.iter().filter(|id| {
                        if needle.len() == 40 {
                            id.as_str() == needle
                        } else {
                            id.as_str().starts_with(&needle)
                        }
                    });
                    return match (matches.next(), matches.next()) {
                        (Some(id), None) => Ok(revisions.position(id).unwrap()),
                        // Both no match and an ambiguous prefix are
                        // unresolvable.
                        _ => Err(does_not_exist(symbol.clone())),
                    };
                }
                let refs = self.state.refs.lock().unwrap();
                let target = refs
                    .branches
                    .get(symbol)
                    .or_else(|| refs.tags.get(symbol))
                    .ok_or_else(|| does_not_exist(symbol.clone()))?;
                revisions
                    .position(target)
                    .ok_or_else(|| does_not_exist(symbol.clone()))
            }
        }
    }

    /// Resolves `spec` and returns the (cached) changeset for it.
    pub fn get_changeset(&self, spec: impl Into<Revspec>) -> VcsResult<Changeset> {
        let spec = spec.into();
        let tip_like = matches!(
            &spec,
            Revspec::Tip | Revspec::Revision(-1)
        ) || matches!(&spec, Revspec::Symbol(s) if is_tip_symbol(s));
        if tip_like {
            let cache = self.state.changesets.lock().unwrap();
            if let Some(data) = cache.get(&CacheKey::Tip) {
                return Ok(Changeset::new(self.clone(), data.clone()));
            }
        }
        let index = self.resolve(&spec)?;
        self.changeset_at(index)
    }

    /// Returns the changeset at the given revision index, materializing and
    /// caching it under every alias on first access.
    pub(crate) fn changeset_at(&self, index: usize) -> VcsResult<Changeset> {
        {
            let cache = self.state.changesets.lock().unwrap();
            if let Some(data) = cache.get(&CacheKey::Revision(index)) {
                return Ok(Changeset::new(self.clone(), data.clone()));
            }
        }
        let (raw_id, is_last) = {
            let revisions = self.state.revisions.lock().unwrap();
            let raw_id = revisions
                .ids
                .get(index)
                .cloned()
                .ok_or(RepositoryError::ChangesetDoesNotExist {
                    rev: index.to_string(),
                })?;
            (raw_id, index + 1 == revisions.len())
        };
        tracing::debug!(index, id = %raw_id, "materializing changeset");
        let info = self
            .state
            .backend
            .commit_info(&raw_id)
            .map_err(RepositoryError::Backend)?;
        let data = Arc::new(ChangesetData::new(index, raw_id.clone(), info));
        let mut cache = self.state.changesets.lock().unwrap();
        let data = cache
            .entry(CacheKey::Revision(index))
            .or_insert(data)
            .clone();
        cache.insert(CacheKey::RawId(raw_id.clone()), data.clone());
        cache.insert(CacheKey::ShortId(raw_id.short().to_owned()), data.clone());
        if is_last {
            cache.insert(CacheKey::Tip, data.clone());
        }
        Ok(Changeset::new(self.clone(), data))
    }

    pub(crate) fn get_changeset_by_raw_id(&self, id: &RevId) -> VcsResult<Changeset> {
        {
            let cache = self.state.changesets.lock().unwrap();
            if let Some(data) = cache.get(&CacheKey::RawId(id.clone())) {
                return Ok(Changeset::new(self.clone(), data.clone()));
            }
        }
        let index = self
            .state
            .revisions
            .lock()
            .unwrap()
            .position(id)
            .ok_or(RepositoryError::ChangesetDoesNotExist {
                rev: id.to_string(),
            })?;
        self.changeset_at(index)
    }

    /// Iterates changesets newest-first. `offset` skips that many from the
    /// tip; a `limit` of `None` yields the whole remaining history.
    pub fn get_changesets(&self, limit: Option<usize>, offset: Option<usize>) -> Changesets {
        let count = self.revision_count();
        let offset = offset.unwrap_or(0);
        let (next, remaining) = if offset >= count {
            (None, 0)
        } else {
            let start = count - offset - 1;
            (Some(start), limit.unwrap_or(count).min(start + 1))
        };
        Changesets {
            repo: self.clone(),
            next,
            remaining,
        }
    }

    /// Re-reads backend state after a mutation (commit, tag) and drops the
    /// tip sentinel so the next lookup re-resolves.
    pub(crate) fn sync_after_mutation(&self) -> VcsResult<()> {
        self.state
            .backend
            .refresh()
            .map_err(RepositoryError::Backend)?;
        let new_revisions = self
            .state
            .backend
            .revisions()
            .map_err(RepositoryError::Backend)?;
        *self.state.revisions.lock().unwrap() = RevisionList::new(new_revisions);
        self.state
            .changesets
            .lock()
            .unwrap()
            .remove(&CacheKey::Tip);
        *self.state.refs.lock().unwrap() =
            self.state.backend.refs().map_err(RepositoryError::Backend)?;
        Ok(())
    }

    /// Creates a tag for the given revision (tip if unset) and refreshes the
    /// tags map.
    pub fn tag(
        &self,
        name: &str,
        user: &str,
        rev: Option<Revspec>,
        message: Option<&str>,
        date: Option<Timestamp>,
        local: bool,
    ) -> VcsResult<Changeset> {
        if self.state.refs.lock().unwrap().tags.contains_key(name) {
            return Err(RepositoryError::TagAlreadyExist {
                name: name.to_owned(),
            }
            .into());
        }
        let index = self.resolve(&rev.unwrap_or_default())?;
        let raw_id = self.state.revisions.lock().unwrap().ids[index].clone();
        let params = TagParams {
            user,
            message,
            date,
            local,
        };
        self.state
            .backend
            .tag(name, &raw_id, &params)
            .map_err(RepositoryError::Backend)?;
        self.sync_after_mutation()?;
        self.get_changeset_by_raw_id(&raw_id)
    }

    /// Removes the tag with the given name.
    pub fn remove_tag(
        &self,
        name: &str,
        user: &str,
        message: Option<&str>,
        date: Option<Timestamp>,
    ) -> VcsResult<()> {
        if !self.state.refs.lock().unwrap().tags.contains_key(name) {
            return Err(RepositoryError::TagDoesNotExist {
                name: name.to_owned(),
            }
            .into());
        }
        let params = TagParams {
            user,
            message,
            date,
            local: false,
        };
        self.state
            .backend
            .untag(name, &params)
            .map_err(RepositoryError::Backend)?;
        self.sync_after_mutation()
    }

    /// Returns a fresh scratchpad for assembling a commit in memory.
    pub fn in_memory_changeset(&self) -> InMemoryChangeset {
        InMemoryChangeset::new(self.clone())
    }

    /// Returns the read-only working-tree view.
    pub fn workdir(&self) -> Workdir {
        Workdir::new(self.clone())
    }
}

/// Lazy newest-first changeset iterator, see [`Repository::get_changesets`].
pub struct Changesets {
    repo: Repository,
    next: Option<usize>,
    remaining: usize,
}

impl Iterator for Changesets {
    type Item = VcsResult<Changeset>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.next?;
        self.remaining -= 1;
        self.next = index.checked_sub(1);
        Some(self.repo.changeset_at(index))
    }
}
