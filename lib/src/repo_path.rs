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

//! Canonical repository-relative paths.
//!
//! A canonical path has no leading or trailing slash, uses `/` as the
//! component separator, and never contains `.` or `..` components. The empty
//! string denotes the repository root.

use std::fmt;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

/// The input cannot be canonicalized into a repository path.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("Invalid repository path \"{input}\"")]
pub struct InvalidRepoPathError {
    pub input: String,
}

/// Owned canonical repository path.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPathBuf {
    value: String,
}

impl Debug for RepoPathBuf {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &self.value)
    }
}

impl fmt::Display for RepoPathBuf {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(&self.value)
    }
}

fn is_valid_component(component: &str) -> bool {
    !component.is_empty() && component != "." && component != ".."
}

impl RepoPathBuf {
    /// Creates a path pointing to the repository root.
    pub const fn root() -> Self {
        Self {
            value: String::new(),
        }
    }

    /// Canonicalizes caller-provided input: any trailing slashes are
    /// stripped, then the result must consist of non-empty components
    /// other than `.` and `..`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, InvalidRepoPathError> {
        let trimmed = input.as_ref().trim_end_matches('/');
        Self::from_internal_string(trimmed).map_err(|_| InvalidRepoPathError {
            input: input.as_ref().to_owned(),
        })
    }

    /// Wraps an already-canonical string representation. Unlike [`parse`],
    /// nothing is stripped; a trailing slash is an error.
    ///
    /// [`parse`]: Self::parse
    pub fn from_internal_string(value: impl Into<String>) -> Result<Self, InvalidRepoPathError> {
        let value: String = value.into();
        if value.is_empty() || value.split('/').all(is_valid_component) {
            Ok(Self { value })
        } else {
            Err(InvalidRepoPathError { input: value })
        }
    }

    /// The canonical string representation. Empty for the root.
    pub fn as_internal_str(&self) -> &str {
        &self.value
    }

    pub fn is_root(&self) -> bool {
        self.value.is_empty()
    }

    /// Path components, in order. Empty for the root.
    pub fn components(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.value.split('/').filter(|c| !c.is_empty())
    }

    /// The last path component. Empty for the root.
    pub fn basename(&self) -> &str {
        self.value.rsplit('/').next().unwrap_or("")
    }

    /// The containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let value = match self.value.rsplit_once('/') {
            Some((parent, _)) => parent.to_owned(),
            None => String::new(),
        };
        Some(Self { value })
    }

    /// Every proper directory prefix of this path, nearest first, excluding
    /// the root. `"a/b/c"` yields `"a/b"` then `"a"`.
    pub fn parent_dirs(&self) -> impl Iterator<Item = RepoPathBuf> + '_ {
        std::iter::successors(self.parent(), |dir| dir.parent()).filter(|dir| !dir.is_root())
    }

    /// Appends `tail` below this path.
    pub fn join(&self, tail: &RepoPathBuf) -> Self {
        if self.is_root() {
            tail.clone()
        } else if tail.is_root() {
            self.clone()
        } else {
            Self {
                value: format!("{}/{}", self.value, tail.value),
            }
        }
    }

    /// Whether this path equals `base` or lies below it.
    pub fn starts_with(&self, base: &RepoPathBuf) -> bool {
        base.is_root()
            || (self.value.starts_with(&base.value)
                && matches!(self.value.as_bytes().get(base.value.len()), None | Some(b'/')))
    }

    /// Converts to a filesystem path under `base`.
    pub fn to_fs_path(&self, base: &Path) -> PathBuf {
        let mut result = base.to_path_buf();
        for component in self.components() {
            result.push(component);
        }
        result
    }
}

impl TryFrom<String> for RepoPathBuf {
    type Error = InvalidRepoPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_internal_string(value)
    }
}

impl From<RepoPathBuf> for String {
    fn from(path: RepoPathBuf) -> Self {
        path.value
    }
}
