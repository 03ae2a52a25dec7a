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

use assert_matches::assert_matches;
use test_case::test_case;
use testutils::commit_added;
use testutils::commit_changed;
use testutils::file;
use testutils::new_temp_dir;
use testutils::TestRepo;
use testutils::TEST_USER;
use vcs_lib::backend::BackendFactories;
use vcs_lib::error::RepositoryError;
use vcs_lib::error::VcsError;
use vcs_lib::repository::Repository;
use vcs_lib::repository::Revspec;

#[test_case("local")]
#[test_case("git")]
fn test_empty_repository(alias: &str) {
    let test_repo = TestRepo::init(alias);
    let repo = &test_repo.repo;
    assert!(repo.revisions().is_empty());
    assert!(repo.is_empty());
    assert_eq!(repo.count(), 0);
    assert_matches!(
        repo.get_changeset(Revspec::Tip),
        Err(VcsError::Repository(RepositoryError::Empty))
    );
    assert!(repo.branches().is_empty());
    assert!(repo.tags().is_empty());
}

#[test_case("local")]
#[test_case("git")]
fn test_open_missing_repository(alias: &str) {
    let temp_dir = new_temp_dir();
    let path = temp_dir.path().join("errorrepo");
    let result = Repository::open(&BackendFactories::default(), alias, &path);
    assert_matches!(
        result,
        Err(VcsError::Repository(RepositoryError::NotFound { .. }))
    );
}

#[test_case("local")]
#[test_case("git")]
fn test_create_over_existing_path(alias: &str) {
    let temp_dir = new_temp_dir();
    let path = temp_dir.path().join("taken");
    fs::create_dir(&path).unwrap();
    let result = Repository::create(&BackendFactories::default(), alias, &path);
    assert_matches!(
        result,
        Err(VcsError::Repository(RepositoryError::AlreadyExists { .. }))
    );
}

#[test]
fn test_src_url_requires_create() {
    let temp_dir = new_temp_dir();
    let result = Repository::load(
        &BackendFactories::default(),
        "local",
        temp_dir.path().join("repo"),
        false,
        Some("/somewhere/else"),
    );
    assert_matches!(
        result,
        Err(VcsError::Repository(
            RepositoryError::CloneWithoutCreate { .. }
        ))
    );
}

#[test]
fn test_unknown_alias() {
    let temp_dir = new_temp_dir();
    let result = Repository::open(
        &BackendFactories::default(),
        "svn",
        temp_dir.path().join("repo"),
    );
    assert_matches!(
        result,
        Err(VcsError::Repository(RepositoryError::UnknownAlias { alias })) if alias == "svn"
    );
}

#[test]
fn test_clone_local_repository() {
    let source = TestRepo::init_local();
    commit_added(&source.repo, "init", vec![file("a", "content")]);

    let temp_dir = new_temp_dir();
    let clone_path = temp_dir.path().join("clone");
    let clone = Repository::load(
        &BackendFactories::default(),
        "local",
        &clone_path,
        true,
        Some(source.path().to_str().unwrap()),
    )
    .unwrap();
    assert_eq!(clone.revisions(), source.repo.revisions());
    assert_eq!(
        clone.tip().unwrap().get_file_content("a").unwrap(),
        b"content"
    );
    // Independent handles over different paths are not equal
    assert_ne!(clone, source.repo);
}

#[test]
fn test_repository_identity() {
    let test_repo = TestRepo::init_local();
    let reopened = Repository::open(
        &BackendFactories::default(),
        "local",
        test_repo.path(),
    )
    .unwrap();
    assert_eq!(test_repo.repo, reopened);
    assert_eq!(test_repo.repo.name(), "repo");
    assert_eq!(test_repo.repo.alias(), "local");
}

fn repo_with_history() -> TestRepo {
    let test_repo = TestRepo::init_local();
    commit_added(&test_repo.repo, "init", vec![file("a", "one\n")]);
    commit_changed(&test_repo.repo, "update", vec![file("a", "two\n")]);
    commit_added(&test_repo.repo, "more", vec![file("b", "three\n")]);
    test_repo
}

#[test]
fn test_revision_resolution() {
    let test_repo = repo_with_history();
    let repo = &test_repo.repo;
    let revisions = repo.revisions();
    assert_eq!(revisions.len(), 3);

    for (index, raw_id) in revisions.iter().enumerate() {
        assert_eq!(repo.get_changeset(index).unwrap().revision(), index);
        // Round-trips through raw and short ids
        let by_raw = repo.get_changeset(raw_id.as_str()).unwrap();
        assert_eq!(by_raw.raw_id(), raw_id);
        let by_short = repo.get_changeset(raw_id.short()).unwrap();
        assert_eq!(by_short.short_id(), raw_id.short());
    }

    // Decimal strings resolve like integers
    assert_eq!(repo.get_changeset("1").unwrap().revision(), 1);

    // Everything tip-shaped points at the same changeset
    let tip = repo.tip().unwrap();
    for spec in [Revspec::Tip, Revspec::Revision(-1)] {
        assert!(repo.get_changeset(spec).unwrap().same_instance(&tip));
    }
    assert!(repo.get_changeset("tip").unwrap().same_instance(&tip));
    assert!(repo.get_changeset("HEAD").unwrap().same_instance(&tip));
    assert!(repo
        .get_changeset(repo.count() - 1)
        .unwrap()
        .same_instance(&tip));

    // Branch names resolve through the branches map
    assert_eq!(
        repo.get_changeset("default").unwrap().revision(),
        tip.revision()
    );
}

#[test]
fn test_unresolvable_revisions() {
    let test_repo = repo_with_history();
    let repo = &test_repo.repo;
    let past_the_end = repo.count();
    assert_matches!(
        repo.get_changeset(past_the_end),
        Err(VcsError::Repository(
            RepositoryError::ChangesetDoesNotExist { .. }
        ))
    );
    // 2**100 doesn't even fit an index type
    assert_matches!(
        repo.get_changeset("1267650600228229401496703205376"),
        Err(VcsError::Repository(
            RepositoryError::ChangesetDoesNotExist { .. }
        ))
    );
    assert_matches!(
        repo.get_changeset("no-such-branch"),
        Err(VcsError::Repository(
            RepositoryError::ChangesetDoesNotExist { .. }
        ))
    );
    // Right length, but not a known id
    assert_matches!(
        repo.get_changeset("ffffffffffff"),
        Err(VcsError::Repository(
            RepositoryError::ChangesetDoesNotExist { .. }
        ))
    );
}

#[test]
fn test_changeset_cache_aliasing() {
    let test_repo = repo_with_history();
    let repo = &test_repo.repo;
    for index in 0..repo.count() {
        let changeset = repo.get_changeset(index).unwrap();
        // Identity is preserved across every alias and repeated lookups
        assert!(repo.get_changeset(index).unwrap().same_instance(&changeset));
        assert!(repo
            .get_changeset(changeset.raw_id())
            .unwrap()
            .same_instance(&changeset));
        assert!(repo
            .get_changeset(changeset.short_id())
            .unwrap()
            .same_instance(&changeset));
    }
}

#[test]
fn test_tip_moves_after_commit() {
    let test_repo = repo_with_history();
    let repo = &test_repo.repo;
    let old_tip = repo.tip().unwrap();
    let new_tip = commit_added(repo, "new", vec![file("c", "x")]);
    assert_eq!(new_tip.revision(), old_tip.revision() + 1);
    assert!(repo.tip().unwrap().same_instance(&new_tip));
    // Previously captured indexes still observe the same changesets
    assert!(repo
        .get_changeset(old_tip.revision())
        .unwrap()
        .same_instance(&old_tip));
    assert!(!old_tip.is_last());
    assert!(new_tip.is_last());
}

#[test]
fn test_get_changesets_iteration() {
    let test_repo = repo_with_history();
    let repo = &test_repo.repo;

    let all: Vec<_> = repo
        .get_changesets(None, None)
        .map(|changeset| changeset.unwrap().revision())
        .collect();
    assert_eq!(all, vec![2, 1, 0]);

    let limited: Vec<_> = repo
        .get_changesets(Some(2), None)
        .map(|changeset| changeset.unwrap().revision())
        .collect();
    assert_eq!(limited, vec![2, 1]);

    let offset: Vec<_> = repo
        .get_changesets(None, Some(1))
        .map(|changeset| changeset.unwrap().revision())
        .collect();
    assert_eq!(offset, vec![1, 0]);

    // Offset past the history is empty, not an error
    assert_eq!(repo.get_changesets(None, Some(10)).count(), 0);
}

#[test]
fn test_tags() {
    let test_repo = repo_with_history();
    let repo = &test_repo.repo;
    let tagged = repo
        .tag("v0.1", TEST_USER, Some(Revspec::Revision(0)), None, None, false)
        .unwrap();
    assert_eq!(tagged.revision(), 0);
    assert_eq!(repo.tags()["v0.1"], *tagged.raw_id());
    // Tag names resolve as revision specifiers
    assert_eq!(repo.get_changeset("v0.1").unwrap().revision(), 0);
    assert!(repo
        .get_changeset(0)
        .unwrap()
        .tags()
        .contains(&"v0.1".to_owned()));

    assert_matches!(
        repo.tag("v0.1", TEST_USER, None, None, None, false),
        Err(VcsError::Repository(RepositoryError::TagAlreadyExist { name })) if name == "v0.1"
    );

    repo.remove_tag("v0.1", TEST_USER, None, None).unwrap();
    assert!(repo.tags().is_empty());
    assert_matches!(
        repo.remove_tag("v0.1", TEST_USER, None, None),
        Err(VcsError::Repository(RepositoryError::TagDoesNotExist { name })) if name == "v0.1"
    );
}

#[test]
fn test_branches_track_commits() {
    let test_repo = TestRepo::init_local();
    let repo = &test_repo.repo;
    let first = commit_added(repo, "init", vec![file("a", "1")]);
    assert_eq!(repo.branches()["default"], *first.raw_id());
    let second = commit_changed(repo, "update", vec![file("a", "2")]);
    assert_eq!(repo.branches()["default"], *second.raw_id());
}

#[test]
fn test_description_and_contact() {
    let test_repo = TestRepo::init_local();
    let repo = &test_repo.repo;
    assert_eq!(repo.description(), "unknown");
    assert_eq!(repo.contact(), "Unknown");
    fs::write(repo.path().join(".vcs/description"), "test project\n").unwrap();
    assert_eq!(repo.description(), "test project");
}
