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

//! Typed tree entries of one changeset.

use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::hash::Hasher;

use crate::changeset::Changeset;
use crate::changeset::Walk;
use crate::error::ChangesetError;
use crate::error::NodeError;
use crate::error::VcsError;
use crate::error::VcsResult;
use crate::repo_path::RepoPathBuf;

/// Kind of a tree entry. `Root` is the directory with the empty path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    Root,
    Dir,
    File,
}

/// A tree entry at a path within one specific changeset. Handles are cheap
/// to clone; file data is memoized by the owning changeset.
#[derive(Clone)]
pub struct Node {
    changeset: Changeset,
    path: RepoPathBuf,
    kind: NodeKind,
    removed: bool,
}

impl Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.kind == other.kind
            && self.removed == other.removed
            && self.changeset == other.changeset
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.kind.hash(state);
        self.changeset.raw_id().hash(state);
    }
}

impl Node {
    pub(crate) fn file(changeset: Changeset, path: RepoPathBuf) -> Self {
        Self {
            changeset,
            path,
            kind: NodeKind::File,
            removed: false,
        }
    }

    pub(crate) fn dir(changeset: Changeset, path: RepoPathBuf) -> Self {
        let kind = if path.is_root() {
            NodeKind::Root
        } else {
            NodeKind::Dir
        };
        Self {
            changeset,
            path,
            kind,
            removed: false,
        }
    }

    /// A marker for a file this changeset removed. Data accessors fail with
    /// a [`NodeError`].
    pub(crate) fn removed_file(changeset: Changeset, path: RepoPathBuf) -> Self {
        Self {
            changeset,
            path,
            kind: NodeKind::File,
            removed: true,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn path(&self) -> &RepoPathBuf {
        &self.path
    }

    /// The last path component.
    pub fn name(&self) -> &str {
        self.path.basename()
    }

    /// The changeset this node belongs to.
    pub fn changeset(&self) -> &Changeset {
        &self.changeset
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir | NodeKind::Root)
    }

    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::Root
    }

    /// Whether this is a removed-file marker from [`Changeset::removed`].
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    fn expect_readable_file(&self) -> VcsResult<()> {
        if self.removed {
            return Err(VcsError::Node(NodeError::RemovedFileAccess {
                path: self.path.clone(),
            }));
        }
        if !self.is_file() {
            return Err(VcsError::Changeset(ChangesetError::NotAFile {
                path: self.path.clone(),
                rev: self.changeset.revision().to_string(),
            }));
        }
        Ok(())
    }

    /// File content as bytes.
    pub fn content(&self) -> VcsResult<Vec<u8>> {
        self.expect_readable_file()?;
        self.changeset.file_content_canonical(&self.path)
    }

    /// File size in bytes.
    pub fn size(&self) -> VcsResult<u64> {
        self.expect_readable_file()?;
        self.changeset.file_size_canonical(&self.path)
    }

    /// Whether the executable bit is set.
    pub fn is_executable(&self) -> VcsResult<bool> {
        self.expect_readable_file()?;
        self.changeset.file_is_executable_canonical(&self.path)
    }

    /// Changesets that modified this file, newest first.
    pub fn history(&self) -> VcsResult<Vec<Changeset>> {
        self.expect_readable_file()?;
        self.changeset.file_history_canonical(&self.path)
    }

    /// Per-line `(line_no, changeset, line)` attribution.
    pub fn annotate(&self) -> VcsResult<Vec<(u32, Changeset, Vec<u8>)>> {
        self.expect_readable_file()?;
        self.changeset.file_annotate_canonical(&self.path)
    }

    /// The most recent changeset that modified this file.
    pub fn last_changeset(&self) -> VcsResult<Changeset> {
        let history = self.history()?;
        Ok(history.into_iter().next().unwrap())
    }

    /// Message of the most recent changeset that modified this file.
    pub fn message(&self) -> VcsResult<String> {
        Ok(self.last_changeset()?.message().to_owned())
    }

    fn expect_dir(&self) -> VcsResult<()> {
        if !self.is_dir() {
            return Err(VcsError::Changeset(ChangesetError::NotADirectory {
                path: self.path.clone(),
                rev: self.changeset.revision().to_string(),
            }));
        }
        Ok(())
    }

    /// Immediate children, directories before files, each group sorted by
    /// name.
    pub fn children(&self) -> VcsResult<Vec<Node>> {
        self.expect_dir()?;
        self.changeset.child_nodes(&self.path)
    }

    /// Immediate child directories.
    pub fn dirs(&self) -> VcsResult<Vec<Node>> {
        Ok(self
            .children()?
            .into_iter()
            .filter(Node::is_dir)
            .collect())
    }

    /// Immediate child files.
    pub fn files(&self) -> VcsResult<Vec<Node>> {
        Ok(self
            .children()?
            .into_iter()
            .filter(Node::is_file)
            .collect())
    }

    /// The immediate child named `name`.
    pub fn child(&self, name: &str) -> VcsResult<Node> {
        self.expect_dir()?;
        self.children()?
            .into_iter()
            .find(|node| node.name() == name)
            .ok_or_else(|| {
                VcsError::Changeset(ChangesetError::NodeDoesNotExist {
                    path: self.path.join(
                        &RepoPathBuf::parse(name).unwrap_or_else(|_| RepoPathBuf::root()),
                    ),
                    rev: self.changeset.revision().to_string(),
                })
            })
    }

    /// Resolves `subpath` relative to this node.
    pub fn get_node(&self, subpath: &str) -> VcsResult<Node> {
        let tail = RepoPathBuf::parse(subpath)?;
        let path = self.path.join(&tail);
        self.changeset.get_node_canonical(&path)
    }

    /// Walks the subtree rooted at this directory, depth-first pre-order.
    pub fn walk(&self) -> VcsResult<Walk> {
        self.changeset.walk(self.path.as_internal_str())
    }
}
