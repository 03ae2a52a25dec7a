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

//! Shared fixtures for integration tests.

use std::path::Path;

use tempfile::TempDir;
use vcs_lib::backend::BackendFactories;
use vcs_lib::changeset::Changeset;
use vcs_lib::memory::CommitOptions;
use vcs_lib::memory::StagedFile;
use vcs_lib::repository::Repository;

pub const TEST_USER: &str = "Test User <test.user@example.com>";

pub fn new_temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("vcs-test-")
        .tempdir()
        .unwrap()
}

/// A repository created in a fresh temp dir, removed on drop.
pub struct TestRepo {
    _temp_dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Creates an empty repository for the given backend alias.
    pub fn init(alias: &str) -> Self {
        let temp_dir = new_temp_dir();
        let path = temp_dir.path().join("repo");
        let repo = Repository::create(&BackendFactories::default(), alias, &path).unwrap();
        Self {
            _temp_dir: temp_dir,
            repo,
        }
    }

    pub fn init_local() -> Self {
        Self::init("local")
    }

    pub fn init_git() -> Self {
        Self::init("git")
    }

    pub fn path(&self) -> &Path {
        self.repo.path()
    }
}

pub fn file(path: &str, content: impl Into<Vec<u8>>) -> StagedFile {
    StagedFile::new(path, content).unwrap()
}

pub fn removed_file(path: &str) -> StagedFile {
    StagedFile::removed(path).unwrap()
}

/// Commits the given files as additions and returns the new changeset.
pub fn commit_added(
    repo: &Repository,
    message: &str,
    files: impl IntoIterator<Item = StagedFile>,
) -> Changeset {
    let mut in_memory = repo.in_memory_changeset();
    in_memory.add(files).unwrap();
    in_memory
        .commit(message, TEST_USER, CommitOptions::default())
        .unwrap()
}

/// Commits the given files as changes and returns the new changeset.
pub fn commit_changed(
    repo: &Repository,
    message: &str,
    files: impl IntoIterator<Item = StagedFile>,
) -> Changeset {
    let mut in_memory = repo.in_memory_changeset();
    in_memory.change(files).unwrap();
    in_memory
        .commit(message, TEST_USER, CommitOptions::default())
        .unwrap()
}

/// Commits removal of the given paths and returns the new changeset.
pub fn commit_removed(
    repo: &Repository,
    message: &str,
    files: impl IntoIterator<Item = StagedFile>,
) -> Changeset {
    let mut in_memory = repo.in_memory_changeset();
    in_memory.remove(files).unwrap();
    in_memory
        .commit(message, TEST_USER, CommitOptions::default())
        .unwrap()
}
