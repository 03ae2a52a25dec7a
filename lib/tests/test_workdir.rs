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

use std::fs;
use std::path::Path;

use test_case::test_case;
use testutils::TestRepo;
use testutils::TEST_USER;
use vcs_lib::repository::Revspec;

fn write_file(root: &Path, path: &str, content: &str) {
    let fs_path = root.join(path);
    fs::create_dir_all(fs_path.parent().unwrap()).unwrap();
    fs::write(fs_path, content).unwrap();
}

#[test_case("local")]
#[test_case("git")]
fn test_get_untracked_empty_repo(alias: &str) {
    let test_repo = TestRepo::init(alias);
    let workdir = test_repo.repo.workdir();
    assert!(workdir.get_untracked().unwrap().is_empty());
}

#[test_case("local")]
#[test_case("git")]
fn test_get_untracked(alias: &str) {
    let test_repo = TestRepo::init(alias);
    let root = test_repo.path().to_path_buf();
    write_file(&root, "foobar", "Foo & bar");
    write_file(&root, "foobar2", "Foo & bar, doubled!");
    write_file(&root, "foo bar with spaces", "");
    write_file(&root, "foo/bar/baz", "Inside");

    let workdir = test_repo.repo.workdir();
    let mut untracked: Vec<_> = workdir
        .get_untracked()
        .unwrap()
        .iter()
        .map(|staged| staged.path().as_internal_str().to_owned())
        .collect();
    untracked.sort();
    assert_eq!(
        untracked,
        vec!["foo bar with spaces", "foo/bar/baz", "foobar", "foobar2"]
    );
}

#[test_case("local")]
#[test_case("git")]
fn test_commit_snapshots_working_tree(alias: &str) {
    let test_repo = TestRepo::init(alias);
    let root = test_repo.path().to_path_buf();
    write_file(&root, "a", "first");
    write_file(&root, "dir/b", "second");

    let workdir = test_repo.repo.workdir();
    let tip = workdir.commit("snapshot", TEST_USER).unwrap();
    assert_eq!(tip.get_file_content("a").unwrap(), b"first");
    assert_eq!(tip.get_file_content("dir/b").unwrap(), b"second");

    // Everything is tracked and unchanged now
    let status = workdir.get_status().unwrap();
    assert!(status.untracked.is_empty());
    assert!(status.changed.is_empty());
    assert!(status.removed.is_empty());
    assert!(status.added.is_empty());
}

#[test]
fn test_changed_and_removed_classification() {
    let test_repo = TestRepo::init_local();
    let root = test_repo.path().to_path_buf();
    write_file(&root, "keep", "same");
    write_file(&root, "edit", "before");
    write_file(&root, "drop", "bye");
    let workdir = test_repo.repo.workdir();
    workdir.commit("base", TEST_USER).unwrap();

    write_file(&root, "edit", "after");
    fs::remove_file(root.join("drop")).unwrap();

    let status = workdir.get_status().unwrap();
    let changed: Vec<_> = status
        .changed
        .iter()
        .map(|staged| staged.path().as_internal_str().to_owned())
        .collect();
    assert_eq!(changed, vec!["edit"]);
    assert_eq!(status.changed[0].content().unwrap(), b"after");
    let removed: Vec<_> = status
        .removed
        .iter()
        .map(|staged| staged.path().as_internal_str().to_owned())
        .collect();
    assert_eq!(removed, vec!["drop"]);
    assert!(status.untracked.is_empty());

    // Committing the classified state catches up with the disk
    let tip = workdir.commit("catch up", TEST_USER).unwrap();
    assert_eq!(tip.get_file_content("edit").unwrap(), b"after");
    assert!(tip.get_node("drop").is_err());
}

#[test]
fn test_update_populates_working_tree() {
    let test_repo = TestRepo::init_local();
    let root = test_repo.path().to_path_buf();
    let workdir = test_repo.repo.workdir();

    write_file(&root, "a", "one");
    workdir.commit("first", TEST_USER).unwrap();
    write_file(&root, "a", "two");
    write_file(&root, "b", "new");
    workdir.commit("second", TEST_USER).unwrap();

    workdir.update(Some(Revspec::Revision(0))).unwrap();
    assert_eq!(fs::read(root.join("a")).unwrap(), b"one");
    assert!(!root.join("b").exists());

    workdir.update(None).unwrap();
    assert_eq!(fs::read(root.join("a")).unwrap(), b"two");
    assert_eq!(fs::read(root.join("b")).unwrap(), b"new");
}
