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

use assert_matches::assert_matches;
use test_case::test_case;
use testutils::commit_added;
use testutils::file;
use testutils::removed_file;
use testutils::TestRepo;
use testutils::TEST_USER;
use vcs_lib::backend::MillisSinceEpoch;
use vcs_lib::backend::Timestamp;
use vcs_lib::error::CommitError;
use vcs_lib::error::RepositoryError;
use vcs_lib::error::VcsError;
use vcs_lib::memory::CommitOptions;

#[test_case("local")]
#[test_case("git")]
fn test_initial_commit(alias: &str) {
    let test_repo = TestRepo::init(alias);
    let repo = &test_repo.repo;
    let mut in_memory = repo.in_memory_changeset();
    in_memory.add(vec![file("a", "hi")]).unwrap();
    let tip = in_memory
        .commit("init", "A <a@x>", CommitOptions::default())
        .unwrap();

    assert_eq!(repo.count(), 1);
    assert_eq!(tip.revision(), 0);
    assert_eq!(tip.author(), "A <a@x>");
    assert_eq!(tip.message(), "init");
    assert_eq!(
        tip.file_paths()
            .iter()
            .map(|p| p.as_internal_str())
            .collect::<Vec<_>>(),
        vec!["a"]
    );
    let added = tip.added().unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].path().as_internal_str(), "a");
    assert_eq!(added[0].content().unwrap(), b"hi");
    assert_eq!(tip.get_node("a").unwrap().content().unwrap(), b"hi");
    // The scratchpad was reset
    assert!(in_memory.is_empty());
}

#[test_case("local")]
#[test_case("git")]
fn test_change_commit(alias: &str) {
    let test_repo = TestRepo::init(alias);
    let repo = &test_repo.repo;
    commit_added(repo, "init", vec![file("a", "hi")]);

    // Unchanged content is rejected by the integrity check
    let mut in_memory = repo.in_memory_changeset();
    in_memory.change(vec![file("a", "hi")]).unwrap();
    assert_matches!(
        in_memory.commit("change", TEST_USER, CommitOptions::default()),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NodeNotChanged { .. }
        )))
    );

    let mut in_memory = repo.in_memory_changeset();
    in_memory.change(vec![file("a", "hello")]).unwrap();
    let tip = in_memory
        .commit("change", TEST_USER, CommitOptions::default())
        .unwrap();
    assert_eq!(repo.count(), 2);
    let changed = tip.changed().unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].path().as_internal_str(), "a");
    assert_eq!(tip.parents().unwrap()[0].revision(), 0);
    assert_eq!(tip.get_file_content("a").unwrap(), b"hello");
}

#[test_case("local")]
#[test_case("git")]
fn test_remove_commit(alias: &str) {
    let test_repo = TestRepo::init(alias);
    let repo = &test_repo.repo;
    commit_added(repo, "init", vec![file("a", "hi")]);

    let mut in_memory = repo.in_memory_changeset();
    in_memory.remove(vec![removed_file("a")]).unwrap();
    let tip = in_memory
        .commit("remove", TEST_USER, CommitOptions::default())
        .unwrap();
    assert!(tip.file_paths().is_empty());
    let removed = tip.removed().unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].path().as_internal_str(), "a");
}

#[test]
fn test_nothing_changed() {
    let test_repo = TestRepo::init_local();
    let mut in_memory = test_repo.repo.in_memory_changeset();
    assert_matches!(
        in_memory.commit("empty", TEST_USER, CommitOptions::default()),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NothingChanged
        )))
    );
}

#[test]
fn test_staging_conflicts() {
    let test_repo = TestRepo::init_local();
    let repo = &test_repo.repo;
    commit_added(repo, "init", vec![file("a", "1"), file("b", "2")]);

    let mut in_memory = repo.in_memory_changeset();
    in_memory.add(vec![file("c", "3")]).unwrap();
    assert_matches!(
        in_memory.add(vec![file("c", "3")]),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NodeAlreadyAdded { .. }
        )))
    );

    in_memory.remove(vec![removed_file("a")]).unwrap();
    assert_matches!(
        in_memory.remove(vec![removed_file("a")]),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NodeAlreadyRemoved { .. }
        )))
    );
    // A removed path cannot be changed
    assert_matches!(
        in_memory.change(vec![file("a", "x")]),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NodeAlreadyRemoved { .. }
        )))
    );

    in_memory.change(vec![file("b", "changed")]).unwrap();
    assert_matches!(
        in_memory.change(vec![file("b", "again")]),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NodeAlreadyChanged { .. }
        )))
    );
    // A changed path cannot be removed
    assert_matches!(
        in_memory.remove(vec![removed_file("b")]),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NodeAlreadyChanged { .. }
        )))
    );
}

#[test]
fn test_change_on_empty_repository() {
    let test_repo = TestRepo::init_local();
    let mut in_memory = test_repo.repo.in_memory_changeset();
    assert_matches!(
        in_memory.change(vec![file("a", "x")]),
        Err(VcsError::Repository(RepositoryError::Empty))
    );
}

#[test]
fn test_integrity_add_existing_path() {
    let test_repo = TestRepo::init_local();
    let repo = &test_repo.repo;
    commit_added(repo, "init", vec![file("a", "1")]);

    let mut in_memory = repo.in_memory_changeset();
    in_memory.add(vec![file("a", "other")]).unwrap();
    assert_matches!(
        in_memory.commit("dup", TEST_USER, CommitOptions::default()),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NodeAlreadyExists { .. }
        )))
    );
    // The scratchpad survives the failed validation
    assert_eq!(in_memory.added().len(), 1);
}

#[test]
fn test_integrity_change_missing_path() {
    let test_repo = TestRepo::init_local();
    let repo = &test_repo.repo;
    commit_added(repo, "init", vec![file("a", "1")]);

    let mut in_memory = repo.in_memory_changeset();
    in_memory.change(vec![file("nope", "x")]).unwrap();
    assert_matches!(
        in_memory.commit("bad", TEST_USER, CommitOptions::default()),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NodeDoesNotExist { .. }
        )))
    );
}

#[test]
fn test_integrity_remove_missing_path() {
    let test_repo = TestRepo::init_local();
    let repo = &test_repo.repo;
    commit_added(repo, "init", vec![file("a", "1")]);

    let mut in_memory = repo.in_memory_changeset();
    in_memory.remove(vec![removed_file("nope")]).unwrap();
    assert_matches!(
        in_memory.commit("bad", TEST_USER, CommitOptions::default()),
        Err(VcsError::Repository(RepositoryError::Commit(
            CommitError::NodeDoesNotExist { .. }
        )))
    );
}

#[test]
fn test_check_integrity_populates_parents() {
    let test_repo = TestRepo::init_local();
    let repo = &test_repo.repo;

    // On an empty repository both slots stay empty
    let mut in_memory = repo.in_memory_changeset();
    in_memory.add(vec![file("a", "1")]).unwrap();
    in_memory.check_integrity(None).unwrap();
    assert_matches!(in_memory.parents(), Some([None, None]));

    commit_added(repo, "init", vec![file("b", "1")]);
    let mut in_memory = repo.in_memory_changeset();
    in_memory.add(vec![file("c", "1")]).unwrap();
    in_memory.check_integrity(None).unwrap();
    let parents = in_memory.parents().unwrap();
    assert_eq!(parents[0].as_ref().unwrap().revision(), 0);
    assert!(parents[1].is_none());
}

#[test]
fn test_reset() {
    let test_repo = TestRepo::init_local();
    let mut in_memory = test_repo.repo.in_memory_changeset();
    in_memory.add(vec![file("a", "1")]).unwrap();
    assert!(!in_memory.is_empty());
    in_memory.reset();
    assert!(in_memory.is_empty());
    assert!(in_memory.parents().is_none());
}

#[test]
fn test_commit_with_options() {
    let test_repo = TestRepo::init_local();
    let repo = &test_repo.repo;
    let base = commit_added(repo, "init", vec![file("a", "1")]);

    let date = Timestamp {
        timestamp: MillisSinceEpoch(1_500_000_000_000),
        tz_offset: -60,
    };
    let mut in_memory = repo.in_memory_changeset();
    in_memory.add(vec![file("b", "2")]).unwrap();
    let tip = in_memory
        .commit(
            "with options",
            TEST_USER,
            CommitOptions {
                parents: Some(vec![base.clone()]),
                branch: Some("stable".to_owned()),
                date: Some(date),
            },
        )
        .unwrap();
    assert_eq!(tip.branch(), "stable");
    assert_eq!(tip.date(), date);
    assert_eq!(tip.parents().unwrap(), vec![base]);
    assert_eq!(repo.branches()["stable"], *tip.raw_id());
}

#[test]
fn test_revision_list_grows_by_exactly_one() {
    let test_repo = TestRepo::init_local();
    let repo = &test_repo.repo;
    for round in 0..3 {
        let before = repo.revisions();
        let mut in_memory = repo.in_memory_changeset();
        in_memory
            .add(vec![file(&format!("file{round}"), "content")])
            .unwrap();
        in_memory
            .commit("grow", TEST_USER, CommitOptions::default())
            .unwrap();
        let after = repo.revisions();
        assert_eq!(after.len(), before.len() + 1);
        // Historic entries are never reordered or removed
        assert_eq!(&after[..before.len()], &before[..]);
    }
}
