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

//! Immutable snapshots of a repository at one revision.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;

use once_cell::sync::OnceCell;

use crate::backend::CommitInfo;
use crate::backend::RevId;
use crate::backend::Timestamp;
use crate::error::ChangesetError;
use crate::error::RepositoryError;
use crate::error::VcsError;
use crate::error::VcsResult;
use crate::node::Node;
use crate::node::NodeKind;
use crate::repo_path::RepoPathBuf;
use crate::repository::Repository;

/// Touched-path count above which the first-parent diff is computed through
/// the backend's status API instead of manifest comparison.
const MANIFEST_DIFF_THRESHOLD: usize = 100;

/// Snapshot data shared by every handle of the same changeset; owned by the
/// repository's cache under all alias keys.
pub(crate) struct ChangesetData {
    revision: usize,
    raw_id: RevId,
    author: String,
    message: String,
    date: Timestamp,
    branch: String,
    tags: Vec<String>,
    parent_ids: Vec<RevId>,
    touched_paths: Vec<RepoPathBuf>,
    file_paths: Vec<RepoPathBuf>,
    file_set: HashSet<RepoPathBuf>,
    // Derived fields below are computed on first access and never again.
    dir_paths: OnceCell<BTreeSet<RepoPathBuf>>,
    diff: OnceCell<DiffSets>,
    contents: Mutex<HashMap<RepoPathBuf, Arc<Vec<u8>>>>,
    sizes: Mutex<HashMap<RepoPathBuf, u64>>,
    modes: Mutex<HashMap<RepoPathBuf, bool>>,
}

#[derive(Clone, Debug, Default)]
struct DiffSets {
    added: Vec<RepoPathBuf>,
    changed: Vec<RepoPathBuf>,
    removed: Vec<RepoPathBuf>,
}

impl ChangesetData {
    pub(crate) fn new(revision: usize, raw_id: RevId, info: CommitInfo) -> Self {
        let mut file_paths = info.file_paths;
        file_paths.sort();
        let file_set = file_paths.iter().cloned().collect();
        Self {
            revision,
            raw_id,
            author: info.author,
            message: info.message,
            date: info.date,
            branch: info.branch,
            tags: info.tags,
            parent_ids: info.parents,
            touched_paths: info.touched_paths,
            file_paths,
            file_set,
            dir_paths: OnceCell::new(),
            diff: OnceCell::new(),
            contents: Mutex::new(HashMap::new()),
            sizes: Mutex::new(HashMap::new()),
            modes: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn raw_id(&self) -> &RevId {
        &self.raw_id
    }

    fn contains_file(&self, path: &RepoPathBuf) -> bool {
        self.file_set.contains(path)
    }

    fn dir_paths(&self) -> &BTreeSet<RepoPathBuf> {
        self.dir_paths.get_or_init(|| {
            let mut dirs: BTreeSet<RepoPathBuf> = self
                .file_paths
                .iter()
                .flat_map(|path| path.parent_dirs())
                .collect();
            dirs.insert(RepoPathBuf::root());
            dirs
        })
    }
}

/// An immutable snapshot: metadata, parent links, lazily materialized node
/// tree and first-parent diffs.
#[derive(Clone)]
pub struct Changeset {
    repo: Repository,
    data: Arc<ChangesetData>,
}

impl Debug for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Changeset")
            .field("revision", &self.data.revision)
            .field("raw_id", &self.data.raw_id)
            .finish()
    }
}

impl PartialEq for Changeset {
    fn eq(&self, other: &Self) -> bool {
        self.data.raw_id == other.data.raw_id && self.repo == other.repo
    }
}

impl Eq for Changeset {}

impl Hash for Changeset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.raw_id.hash(state);
    }
}

impl Changeset {
    pub(crate) fn new(repo: Repository, data: Arc<ChangesetData>) -> Self {
        Self { repo, data }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Index into the repository's revision list.
    pub fn revision(&self) -> usize {
        self.data.revision
    }

    pub fn raw_id(&self) -> &RevId {
        &self.data.raw_id
    }

    pub fn short_id(&self) -> &str {
        self.data.raw_id.short()
    }

    /// `"tip"` for the most recent changeset, the short id otherwise.
    pub fn id(&self) -> String {
        if self.is_last() {
            "tip".to_owned()
        } else {
            self.short_id().to_owned()
        }
    }

    /// Whether this is the most recent revision.
    pub fn is_last(&self) -> bool {
        self.data.revision + 1 == self.repo.revision_count()
    }

    pub fn author(&self) -> &str {
        &self.data.author
    }

    pub fn message(&self) -> &str {
        &self.data.message
    }

    pub fn date(&self) -> Timestamp {
        self.data.date
    }

    pub fn branch(&self) -> &str {
        &self.data.branch
    }

    pub fn tags(&self) -> &[String] {
        &self.data.tags
    }

    /// Parent changesets, first parent first. Empty for a root changeset.
    pub fn parents(&self) -> VcsResult<Vec<Changeset>> {
        self.data
            .parent_ids
            .iter()
            .map(|id| self.repo.get_changeset_by_raw_id(id))
            .collect()
    }

    /// Whether both handles point at the same cached snapshot object.
    pub fn same_instance(&self, other: &Changeset) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// All file paths in this snapshot, sorted.
    pub fn file_paths(&self) -> &[RepoPathBuf] {
        &self.data.file_paths
    }

    /// All directories of this snapshot, sorted, including the root.
    pub fn dir_paths(&self) -> Vec<RepoPathBuf> {
        self.data.dir_paths().iter().cloned().collect()
    }

    pub(crate) fn kind_of(&self, path: &RepoPathBuf) -> Option<NodeKind> {
        if self.data.contains_file(path) {
            Some(NodeKind::File)
        } else if path.is_root() {
            Some(NodeKind::Root)
        } else if self.data.dir_paths().contains(path) {
            Some(NodeKind::Dir)
        } else {
            None
        }
    }

    fn node_does_not_exist(&self, path: &RepoPathBuf) -> VcsError {
        VcsError::Changeset(ChangesetError::NodeDoesNotExist {
            path: path.clone(),
            rev: format!("{}:{}", self.data.revision, self.short_id()),
        })
    }

    /// Returns the node at `path`, classifying it as file or directory.
    pub fn get_node(&self, path: &str) -> VcsResult<Node> {
        let path = RepoPathBuf::parse(path)?;
        self.get_node_canonical(&path)
    }

    pub(crate) fn get_node_canonical(&self, path: &RepoPathBuf) -> VcsResult<Node> {
        match self.kind_of(path) {
            Some(NodeKind::File) => Ok(Node::file(self.clone(), path.clone())),
            Some(_) => Ok(Node::dir(self.clone(), path.clone())),
            None => Err(self.node_does_not_exist(path)),
        }
    }

    /// The root node of this snapshot.
    pub fn root(&self) -> Node {
        Node::dir(self.clone(), RepoPathBuf::root())
    }

    /// Returns the combined directory and file nodes directly under `path`.
    /// Fails if `path` exists but is not a directory.
    pub fn get_nodes(&self, path: &str) -> VcsResult<Vec<Node>> {
        let path = RepoPathBuf::parse(path)?;
        match self.kind_of(&path) {
            Some(NodeKind::Dir | NodeKind::Root) => self.child_nodes(&path),
            Some(NodeKind::File) => Err(VcsError::Changeset(ChangesetError::NotADirectory {
                path,
                rev: self.data.revision.to_string(),
            })),
            None => Err(self.node_does_not_exist(&path)),
        }
    }

    /// Immediate children of the directory `dir`, directories first, then
    /// files, each group sorted by name.
    pub(crate) fn child_nodes(&self, dir: &RepoPathBuf) -> VcsResult<Vec<Node>> {
        let dirs = self
            .data
            .dir_paths()
            .iter()
            .filter(|p| !p.is_root() && p.parent().as_ref() == Some(dir))
            .map(|p| Node::dir(self.clone(), p.clone()));
        let files = self
            .data
            .file_paths
            .iter()
            .filter(|p| p.parent().as_ref() == Some(dir))
            .map(|p| Node::file(self.clone(), p.clone()));
        Ok(dirs.chain(files).collect())
    }

    fn expect_file(&self, path: &RepoPathBuf) -> VcsResult<()> {
        match self.kind_of(path) {
            Some(NodeKind::File) => Ok(()),
            Some(_) => Err(VcsError::Changeset(ChangesetError::NotAFile {
                path: path.clone(),
                rev: self.data.revision.to_string(),
            })),
            None => Err(self.node_does_not_exist(path)),
        }
    }

    /// Content of the file at `path`.
    pub fn get_file_content(&self, path: &str) -> VcsResult<Vec<u8>> {
        let path = RepoPathBuf::parse(path)?;
        self.file_content_canonical(&path)
    }

    pub(crate) fn file_content_canonical(&self, path: &RepoPathBuf) -> VcsResult<Vec<u8>> {
        self.expect_file(path)?;
        let mut contents = self.data.contents.lock().unwrap();
        if let Some(cached) = contents.get(path) {
            return Ok(cached.as_ref().clone());
        }
        let content = Arc::new(
            self.repo
                .backend()
                .file_content(&self.data.raw_id, path)
                .map_err(RepositoryError::Backend)?,
        );
        contents.insert(path.clone(), content.clone());
        Ok(content.as_ref().clone())
    }

    /// Size of the file at `path` in bytes.
    pub fn get_file_size(&self, path: &str) -> VcsResult<u64> {
        let path = RepoPathBuf::parse(path)?;
        self.file_size_canonical(&path)
    }

    pub(crate) fn file_size_canonical(&self, path: &RepoPathBuf) -> VcsResult<u64> {
        self.expect_file(path)?;
        let mut sizes = self.data.sizes.lock().unwrap();
        if let Some(cached) = sizes.get(path) {
            return Ok(*cached);
        }
        let size = self
            .repo
            .backend()
            .file_size(&self.data.raw_id, path)
            .map_err(RepositoryError::Backend)?;
        sizes.insert(path.clone(), size);
        Ok(size)
    }

    pub(crate) fn file_is_executable_canonical(&self, path: &RepoPathBuf) -> VcsResult<bool> {
        self.expect_file(path)?;
        let mut modes = self.data.modes.lock().unwrap();
        if let Some(cached) = modes.get(path) {
            return Ok(*cached);
        }
        let executable = self
            .repo
            .backend()
            .file_is_executable(&self.data.raw_id, path)
            .map_err(RepositoryError::Backend)?;
        modes.insert(path.clone(), executable);
        Ok(executable)
    }

    /// The most recent changeset that modified the file at `path`.
    pub fn get_file_changeset(&self, path: &str) -> VcsResult<Changeset> {
        let history = self.get_file_history(path)?;
        // History of an existing file is never empty; it contains at least
        // the changeset that added the file.
        Ok(history.into_iter().next().unwrap())
    }

    /// Changesets that modified the file at `path`, newest first.
    pub fn get_file_history(&self, path: &str) -> VcsResult<Vec<Changeset>> {
        let path = RepoPathBuf::parse(path)?;
        self.file_history_canonical(&path)
    }

    pub(crate) fn file_history_canonical(&self, path: &RepoPathBuf) -> VcsResult<Vec<Changeset>> {
        self.expect_file(path)?;
        let ids = self
            .repo
            .backend()
            .file_history(&self.data.raw_id, path)
            .map_err(RepositoryError::Backend)?;
        ids.iter()
            .map(|id| self.repo.get_changeset_by_raw_id(id))
            .collect()
    }

    /// Per-line `(line_no, changeset, line)` attribution for the file at
    /// `path`. Line numbers start at 1.
    pub fn get_file_annotate(&self, path: &str) -> VcsResult<Vec<(u32, Changeset, Vec<u8>)>> {
        let path = RepoPathBuf::parse(path)?;
        self.file_annotate_canonical(&path)
    }

    pub(crate) fn file_annotate_canonical(
        &self,
        path: &RepoPathBuf,
    ) -> VcsResult<Vec<(u32, Changeset, Vec<u8>)>> {
        self.expect_file(path)?;
        let lines = self
            .repo
            .backend()
            .file_annotate(&self.data.raw_id, path)
            .map_err(RepositoryError::Backend)?;
        lines
            .into_iter()
            .zip(1u32..)
            .map(|((id, line), line_no)| {
                let changeset = self.repo.get_changeset_by_raw_id(&id)?;
                Ok((line_no, changeset, line))
            })
            .collect()
    }

    fn diff(&self) -> VcsResult<&DiffSets> {
        self.data.diff.get_or_try_init(|| {
            let parents = self.parents()?;
            // The touched-paths set loses fidelity for merges, and manifest
            // comparison gets expensive for very large changes; both cases
            // go through the backend's status API instead.
            if parents.len() >= 2 || self.data.touched_paths.len() > MANIFEST_DIFF_THRESHOLD {
                let parent_id = parents.first().map(|p| p.data.raw_id.clone());
                let status = self
                    .repo
                    .backend()
                    .status(&self.data.raw_id, parent_id.as_ref())
                    .map_err(RepositoryError::Backend)?;
                let mut removed = status.removed;
                removed.extend(status.deleted);
                return Ok(DiffSets {
                    added: status.added,
                    changed: status.changed,
                    removed,
                });
            }
            let empty = HashSet::new();
            let parent_files = match parents.first() {
                Some(parent) => &parent.data.file_set,
                None => &empty,
            };
            let mut sets = DiffSets::default();
            for path in &self.data.touched_paths {
                let in_self = self.data.contains_file(path);
                let in_parent = parent_files.contains(path);
                if !in_parent {
                    sets.added.push(path.clone());
                } else if in_self {
                    sets.changed.push(path.clone());
                }
                if !in_self {
                    sets.removed.push(path.clone());
                }
            }
            Ok(sets)
        })
    }

    /// File nodes added by this changeset versus its first parent.
    pub fn added(&self) -> VcsResult<Vec<Node>> {
        let diff = self.diff()?;
        Ok(diff
            .added
            .iter()
            .map(|path| Node::file(self.clone(), path.clone()))
            .collect())
    }

    /// File nodes modified by this changeset versus its first parent.
    pub fn changed(&self) -> VcsResult<Vec<Node>> {
        let diff = self.diff()?;
        Ok(diff
            .changed
            .iter()
            .map(|path| Node::file(self.clone(), path.clone()))
            .collect())
    }

    /// Markers for files removed by this changeset versus its first parent.
    /// Reading content through them is a node-level error.
    pub fn removed(&self) -> VcsResult<Vec<Node>> {
        let diff = self.diff()?;
        Ok(diff
            .removed
            .iter()
            .map(|path| Node::removed_file(self.clone(), path.clone()))
            .collect())
    }

    /// Walks the tree rooted at `topurl` in depth-first pre-order, yielding
    /// `(dir, subdirs, files)` for every directory.
    pub fn walk(&self, topurl: &str) -> VcsResult<Walk> {
        let top = self.get_node(topurl)?;
        if !top.is_dir() {
            return Err(VcsError::Changeset(ChangesetError::NotADirectory {
                path: top.path().clone(),
                rev: self.data.revision.to_string(),
            }));
        }
        Ok(Walk { stack: vec![top] })
    }

    fn neighbour(&self, branch: Option<&str>, forward: bool) -> VcsResult<Changeset> {
        if let Some(branch) = branch {
            if self.branch() != branch {
                return Err(VcsError::NotOnBranch {
                    id: self.id(),
                    branch: branch.to_owned(),
                });
            }
        }
        let mut revision = self.data.revision;
        loop {
            revision = if forward {
                revision + 1
            } else {
                revision.checked_sub(1).ok_or_else(|| {
                    RepositoryError::ChangesetDoesNotExist {
                        rev: format!("{}", self.data.revision as i64 - 1),
                    }
                })?
            };
            if revision >= self.repo.revision_count() {
                return Err(RepositoryError::ChangesetDoesNotExist {
                    rev: revision.to_string(),
                }
                .into());
            }
            let changeset = self.repo.changeset_at(revision)?;
            match branch {
                Some(branch) if changeset.branch() != branch => continue,
                _ => return Ok(changeset),
            }
        }
    }

    /// The next changeset in revision order, optionally restricted to the
    /// given branch.
    pub fn next(&self, branch: Option<&str>) -> VcsResult<Changeset> {
        self.neighbour(branch, true)
    }

    /// The previous changeset in revision order, optionally restricted to
    /// the given branch.
    pub fn prev(&self, branch: Option<&str>) -> VcsResult<Changeset> {
        self.neighbour(branch, false)
    }
}

/// Depth-first pre-order directory iterator, see [`Changeset::walk`].
pub struct Walk {
    stack: Vec<Node>,
}

impl Iterator for Walk {
    type Item = VcsResult<(Node, Vec<Node>, Vec<Node>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let dir = self.stack.pop()?;
        let children = match dir.children() {
            Ok(children) => children,
            Err(err) => return Some(Err(err)),
        };
        let (subdirs, files): (Vec<_>, Vec<_>) =
            children.into_iter().partition(|node| node.is_dir());
        self.stack.extend(subdirs.iter().rev().cloned());
        Some(Ok((dir, subdirs, files)))
    }
}

/// Archive flavors a changeset may be exported as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    TarBz2,
}

impl ArchiveKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::TarGz => ".tar.gz",
            Self::TarBz2 => ".tar.bz2",
        }
    }
}

impl FromStr for ArchiveKind {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zip" => Ok(Self::Zip),
            "gz" | "tgz" => Ok(Self::TarGz),
            "bz2" | "tbz2" => Ok(Self::TarBz2),
            _ => Err(VcsError::ImproperArchiveType { kind: s.to_owned() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_archive_kind_parsing() {
        assert_eq!("zip".parse::<ArchiveKind>().unwrap(), ArchiveKind::Zip);
        assert_eq!("tgz".parse::<ArchiveKind>().unwrap(), ArchiveKind::TarGz);
        assert_eq!("bz2".parse::<ArchiveKind>().unwrap(), ArchiveKind::TarBz2);
        assert_matches!(
            "rar".parse::<ArchiveKind>(),
            Err(VcsError::ImproperArchiveType { kind }) if kind == "rar"
        );
    }
}
