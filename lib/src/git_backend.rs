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

//! Git backend over gitoxide. Network transport (clone) is delegated to the
//! `git` CLI; everything else goes through the object database directly.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;
use std::sync::MutexGuard;

use gix::bstr::BString;
use gix::bstr::ByteSlice as _;
use itertools::Itertools as _;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::backend::BackendFactory;
use crate::backend::BackendInitError;
use crate::backend::BackendLoadError;
use crate::backend::BackendResult;
use crate::backend::CommitInfo;
use crate::backend::CommitOp;
use crate::backend::CommitParams;
use crate::backend::MillisSinceEpoch;
use crate::backend::Refs;
use crate::backend::RevId;
use crate::backend::StatusSummary;
use crate::backend::TagParams;
use crate::backend::Timestamp;
use crate::files;
use crate::repo_path::RepoPathBuf;

const HEADS_NAMESPACE: &str = "refs/heads/";
const TAGS_NAMESPACE: &str = "refs/tags/";

#[derive(Debug, thiserror::Error)]
pub enum GitBackendInitError {
    #[error("Failed to initialize git repository")]
    InitRepository(#[source] Box<gix::init::Error>),
    #[error("Failed to open git repository")]
    OpenRepository(#[source] Box<gix::open::Error>),
}

fn to_other_err(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> BackendError {
    BackendError::Other(err.into())
}

fn map_not_found_err(err: gix::object::find::existing::Error, hash: &str) -> BackendError {
    if matches!(err, gix::object::find::existing::Error::NotFound { .. }) {
        BackendError::ObjectNotFound {
            object_type: "commit".to_owned(),
            hash: hash.to_owned(),
            source: Box::new(err),
        }
    } else {
        BackendError::ReadObject {
            object_type: "commit".to_owned(),
            hash: hash.to_owned(),
            source: Box::new(err),
        }
    }
}

fn git_oid(id: &RevId) -> BackendResult<gix::ObjectId> {
    gix::ObjectId::from_hex(id.as_str().as_bytes()).map_err(|err| BackendError::ObjectNotFound {
        object_type: "commit".to_owned(),
        hash: id.as_str().to_owned(),
        source: Box::new(err),
    })
}

fn rev_id(oid: impl std::fmt::Display) -> RevId {
    RevId::new(oid.to_string())
}

/// Owned extract of one git commit object.
struct GitCommitData {
    parents: Vec<gix::ObjectId>,
    tree: gix::ObjectId,
    author: String,
    message: String,
    time: gix::date::Time,
}

fn signature_text(signature: gix::actor::SignatureRef<'_>) -> String {
    format!(
        "{} <{}>",
        String::from_utf8_lossy(signature.name),
        String::from_utf8_lossy(signature.email)
    )
}

fn signature_to_git(author: &str, date: &Timestamp) -> gix::actor::Signature {
    // "Jane Doe <jane@example.com>" is split back into name and email; an
    // input without brackets becomes a name with an empty email.
    let (name, email) = match author.split_once('<') {
        Some((name, rest)) => (
            name.trim().to_owned(),
            rest.trim().trim_end_matches('>').to_owned(),
        ),
        None => (author.trim().to_owned(), String::new()),
    };
    gix::actor::Signature {
        name: BString::from(name),
        email: BString::from(email),
        time: gix::date::Time::new(
            date.timestamp.0.div_euclid(1000),
            date.tz_offset * 60, // in seconds
        ),
    }
}

fn timestamp_from_git(time: gix::date::Time) -> Timestamp {
    Timestamp {
        timestamp: MillisSinceEpoch(time.seconds * 1000),
        tz_offset: time.offset.div_euclid(60), // in minutes
    }
}

fn commit_data(repo: &gix::Repository, oid: gix::ObjectId) -> BackendResult<GitCommitData> {
    let object = repo
        .find_object(oid)
        .map_err(|err| map_not_found_err(err, &oid.to_string()))?;
    let commit = object
        .try_to_commit_ref()
        .map_err(|err| BackendError::ReadObject {
            object_type: "commit".to_owned(),
            hash: oid.to_string(),
            source: Box::new(err),
        })?;
    Ok(GitCommitData {
        parents: commit.parents().collect(),
        tree: commit.tree(),
        author: signature_text(commit.author()),
        // Git messages conventionally carry a trailing newline
        message: String::from_utf8_lossy(commit.message)
            .strip_suffix('\n')
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| String::from_utf8_lossy(commit.message).into_owned()),
        time: commit.committer().time,
    })
}

type Manifest = BTreeMap<RepoPathBuf, (gix::ObjectId, bool)>;

fn collect_tree(
    repo: &gix::Repository,
    tree_id: gix::ObjectId,
    prefix: &RepoPathBuf,
    manifest: &mut Manifest,
) -> BackendResult<()> {
    let tree = repo
        .find_object(tree_id)
        .map_err(|err| map_not_found_err(err, &tree_id.to_string()))?
        .try_into_tree()
        .map_err(|err| BackendError::ReadObject {
            object_type: "tree".to_owned(),
            hash: tree_id.to_string(),
            source: Box::new(err),
        })?;
    for entry in tree.iter() {
        let entry = entry.map_err(to_other_err)?;
        let name = match entry.filename().to_str() {
            Ok(name) => name,
            Err(_) => continue, // names that aren't valid UTF-8 aren't addressable here
        };
        let Ok(component) = RepoPathBuf::from_internal_string(name) else {
            continue;
        };
        let path = prefix.join(&component);
        use gix::object::tree::EntryKind;
        match entry.mode().kind() {
            EntryKind::Tree => collect_tree(repo, entry.oid().to_owned(), &path, manifest)?,
            EntryKind::Blob => {
                manifest.insert(path, (entry.oid().to_owned(), false));
            }
            EntryKind::BlobExecutable => {
                manifest.insert(path, (entry.oid().to_owned(), true));
            }
            // Symlink targets read as blobs; submodules aren't materialized
            EntryKind::Link => {
                manifest.insert(path, (entry.oid().to_owned(), false));
            }
            EntryKind::Commit => {}
        }
    }
    Ok(())
}

#[derive(Debug)]
pub struct GitBackend {
    root: PathBuf,
    repo: Mutex<gix::Repository>,
    default_branch: String,
}

impl GitBackend {
    pub fn name() -> &'static str {
        "git"
    }

    fn open_git_repo(path: &Path) -> Result<gix::Repository, gix::open::Error> {
        let repo = gix::ThreadSafeRepository::open_opts(path, gix::open::Options::isolated())?;
        Ok(repo.to_thread_local())
    }

    pub fn open(root: &Path, fallback_branch: &str) -> Result<Self, gix::open::Error> {
        let repo = Self::open_git_repo(root)?;
        let default_branch = repo
            .head_name()
            .ok()
            .flatten()
            .and_then(|name| {
                name.as_bstr()
                    .strip_prefix(HEADS_NAMESPACE.as_bytes())
                    .map(|short| String::from_utf8_lossy(short).into_owned())
            })
            .unwrap_or_else(|| fallback_branch.to_owned());
        Ok(Self {
            root: root.to_path_buf(),
            repo: Mutex::new(repo),
            default_branch,
        })
    }

    pub fn init(root: &Path, fallback_branch: &str) -> Result<Self, GitBackendInitError> {
        gix::ThreadSafeRepository::init_opts(
            root,
            gix::create::Kind::WithWorktree,
            gix::create::Options::default(),
            gix::open::Options::isolated(),
        )
        .map_err(|err| GitBackendInitError::InitRepository(Box::new(err)))?;
        Self::open(root, fallback_branch)
            .map_err(|err| GitBackendInitError::OpenRepository(Box::new(err)))
    }

    fn lock_repo(&self) -> MutexGuard<'_, gix::Repository> {
        self.repo.lock().unwrap()
    }

    fn manifest_for_commit(&self, repo: &gix::Repository, id: &RevId) -> BackendResult<Manifest> {
        let data = commit_data(repo, git_oid(id)?)?;
        let mut manifest = Manifest::new();
        collect_tree(repo, data.tree, &RepoPathBuf::root(), &mut manifest)?;
        Ok(manifest)
    }

    fn manifest_for_oid(
        &self,
        repo: &gix::Repository,
        oid: Option<gix::ObjectId>,
    ) -> BackendResult<Manifest> {
        let mut manifest = Manifest::new();
        if let Some(oid) = oid {
            let data = commit_data(repo, oid)?;
            collect_tree(repo, data.tree, &RepoPathBuf::root(), &mut manifest)?;
        }
        Ok(manifest)
    }

    fn branch_heads(&self, repo: &gix::Repository) -> BackendResult<Vec<(String, gix::ObjectId)>> {
        self.peeled_refs(repo, HEADS_NAMESPACE)
    }

    fn peeled_refs(
        &self,
        repo: &gix::Repository,
        namespace: &str,
    ) -> BackendResult<Vec<(String, gix::ObjectId)>> {
        let mut result = vec![];
        let references = repo.references().map_err(to_other_err)?;
        let iter = references.prefixed(namespace).map_err(to_other_err)?;
        for reference in iter {
            let mut reference = reference.map_err(to_other_err)?;
            let oid = reference.peel_to_id_in_place().map_err(to_other_err)?;
            let name = reference.name().as_bstr();
            let short = name
                .strip_prefix(namespace.as_bytes())
                .map(|short| String::from_utf8_lossy(short).into_owned())
                .unwrap_or_else(|| String::from_utf8_lossy(name).into_owned());
            result.push((short, oid.detach()));
        }
        Ok(result)
    }

    /// All commits reachable from branch heads, keyed by id.
    fn commit_graph(
        &self,
        repo: &gix::Repository,
    ) -> BackendResult<HashMap<gix::ObjectId, GitCommitData>> {
        let mut stack: Vec<gix::ObjectId> = self
            .branch_heads(repo)?
            .into_iter()
            .map(|(_, oid)| oid)
            .collect();
        let mut commits = HashMap::new();
        while let Some(oid) = stack.pop() {
            if commits.contains_key(&oid) {
                continue;
            }
            let data = commit_data(repo, oid)?;
            stack.extend(data.parents.iter().copied());
            commits.insert(oid, data);
        }
        Ok(commits)
    }

    /// Reachable commits in oldest-first order: topological (parents always
    /// precede children), committer time and id as tie-breaks.
    fn sorted_commits(&self, repo: &gix::Repository) -> BackendResult<Vec<gix::ObjectId>> {
        let graph = self.commit_graph(repo)?;
        let mut pending_parents: HashMap<gix::ObjectId, usize> = graph
            .iter()
            .map(|(oid, data)| (*oid, data.parents.len()))
            .collect();
        let mut children: HashMap<gix::ObjectId, Vec<gix::ObjectId>> = HashMap::new();
        for (oid, data) in &graph {
            for parent in &data.parents {
                children.entry(*parent).or_default().push(*oid);
            }
        }
        let mut available: std::collections::BTreeSet<(i64, gix::ObjectId)> = pending_parents
            .iter()
            .filter(|(_, pending)| **pending == 0)
            .map(|(oid, _)| (graph[oid].time.seconds, *oid))
            .collect();
        let mut result = vec![];
        while let Some(entry) = available.iter().next().copied() {
            available.remove(&entry);
            let (_, oid) = entry;
            result.push(oid);
            for child in children.get(&oid).into_iter().flatten() {
                let pending = pending_parents.get_mut(child).unwrap();
                *pending -= 1;
                if *pending == 0 {
                    available.insert((graph[child].time.seconds, *child));
                }
            }
        }
        Ok(result)
    }

    /// The first branch whose history contains `oid`, in ref order.
    fn branch_of(&self, repo: &gix::Repository, oid: gix::ObjectId) -> BackendResult<String> {
        for (name, head) in self.branch_heads(repo)? {
            let mut seen = HashSet::new();
            let mut stack = vec![head];
            while let Some(current) = stack.pop() {
                if current == oid {
                    return Ok(name);
                }
                if seen.insert(current) {
                    stack.extend(commit_data(repo, current)?.parents);
                }
            }
        }
        Ok(self.default_branch.clone())
    }

    fn write_tree(
        &self,
        repo: &gix::Repository,
        manifest: &Manifest,
        dir: &RepoPathBuf,
    ) -> BackendResult<gix::ObjectId> {
        use gix::object::tree::EntryKind;
        let dir_depth = dir.components().count();
        let mut subdir_names: std::collections::BTreeSet<&str> = Default::default();
        let mut entries: Vec<gix::objs::tree::Entry> = vec![];
        for (path, (oid, executable)) in manifest {
            if !path.starts_with(dir) {
                continue;
            }
            if path.parent().as_ref() == Some(dir) {
                let kind = if *executable {
                    EntryKind::BlobExecutable
                } else {
                    EntryKind::Blob
                };
                entries.push(gix::objs::tree::Entry {
                    mode: kind.into(),
                    filename: path.basename().into(),
                    oid: *oid,
                });
            } else if let Some(name) = path.components().nth(dir_depth) {
                subdir_names.insert(name);
            }
        }
        for name in subdir_names {
            let sub_path = dir.join(&RepoPathBuf::from_internal_string(name).unwrap());
            let oid = self.write_tree(repo, manifest, &sub_path)?;
            entries.push(gix::objs::tree::Entry {
                mode: EntryKind::Tree.into(),
                filename: name.into(),
                oid,
            });
        }
        let entries = entries.into_iter().sorted_unstable().collect();
        let oid = repo
            .write_object(gix::objs::Tree { entries })
            .map_err(|err| BackendError::WriteObject {
                object_type: "tree",
                source: Box::new(err),
            })?;
        Ok(oid.detach())
    }
}

impl Backend for GitBackend {
    fn name(&self) -> &str {
        Self::name()
    }

    fn default_branch(&self) -> &str {
        &self.default_branch
    }

    fn metadata_dir(&self) -> &str {
        ".git"
    }

    fn revisions(&self) -> BackendResult<Vec<RevId>> {
        let repo = self.lock_repo();
        let commits = self.sorted_commits(&repo)?;
        Ok(commits.iter().map(|oid| rev_id(oid)).collect())
    }

    fn refs(&self) -> BackendResult<Refs> {
        let repo = self.lock_repo();
        Ok(Refs {
            branches: self
                .branch_heads(&repo)?
                .into_iter()
                .map(|(name, oid)| (name, rev_id(&oid)))
                .collect(),
            tags: self
                .peeled_refs(&repo, TAGS_NAMESPACE)?
                .into_iter()
                .map(|(name, oid)| (name, rev_id(&oid)))
                .collect(),
        })
    }

    fn commit_info(&self, id: &RevId) -> BackendResult<CommitInfo> {
        let repo = self.lock_repo();
        let oid = git_oid(id)?;
        let data = commit_data(&repo, oid)?;
        let manifest = self.manifest_for_oid(&repo, Some(oid))?;
        let parent_manifest = self.manifest_for_oid(&repo, data.parents.first().copied())?;

        let mut touched_paths: Vec<RepoPathBuf> = vec![];
        for (path, entry) in &manifest {
            if parent_manifest.get(path) != Some(entry) {
                touched_paths.push(path.clone());
            }
        }
        for path in parent_manifest.keys() {
            if !manifest.contains_key(path) {
                touched_paths.push(path.clone());
            }
        }
        touched_paths.sort();

        let tags = self
            .peeled_refs(&repo, TAGS_NAMESPACE)?
            .into_iter()
            .filter(|(_, target)| *target == oid)
            .map(|(name, _)| name)
            .collect();
        Ok(CommitInfo {
            parents: data.parents.iter().map(|oid| rev_id(oid)).collect(),
            author: data.author,
            message: data.message,
            date: timestamp_from_git(data.time),
            branch: self.branch_of(&repo, oid)?,
            tags,
            touched_paths,
            file_paths: manifest.into_keys().collect(),
        })
    }

    fn status(&self, id: &RevId, parent: Option<&RevId>) -> BackendResult<StatusSummary> {
        let repo = self.lock_repo();
        let manifest = self.manifest_for_commit(&repo, id)?;
        let parent_manifest = match parent {
            Some(parent) => self.manifest_for_commit(&repo, parent)?,
            None => Manifest::new(),
        };
        let mut summary = StatusSummary::default();
        for (path, entry) in &manifest {
            match parent_manifest.get(path) {
                None => summary.added.push(path.clone()),
                Some(old) if old != entry => summary.changed.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in parent_manifest.keys() {
            if !manifest.contains_key(path) {
                summary.removed.push(path.clone());
            }
        }
        Ok(summary)
    }

    fn file_content(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<Vec<u8>> {
        let repo = self.lock_repo();
        let manifest = self.manifest_for_commit(&repo, id)?;
        let (oid, _) = manifest
            .get(path)
            .ok_or_else(|| BackendError::PathNotFound {
                path: path.clone(),
                hash: id.as_str().to_owned(),
            })?;
        let mut blob = repo
            .find_object(*oid)
            .map_err(|err| map_not_found_err(err, &oid.to_string()))?
            .try_into_blob()
            .map_err(|err| BackendError::ReadObject {
                object_type: "blob".to_owned(),
                hash: oid.to_string(),
                source: Box::new(err),
            })?;
        Ok(blob.take_data())
    }

    fn file_size(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<u64> {
        Ok(self.file_content(id, path)?.len() as u64)
    }

    fn file_is_executable(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<bool> {
        let repo = self.lock_repo();
        let manifest = self.manifest_for_commit(&repo, id)?;
        manifest
            .get(path)
            .map(|(_, executable)| *executable)
            .ok_or_else(|| BackendError::PathNotFound {
                path: path.clone(),
                hash: id.as_str().to_owned(),
            })
    }

    fn file_history(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<Vec<RevId>> {
        let repo = self.lock_repo();
        let all = self.sorted_commits(&repo)?;
        let target = git_oid(id)?;
        let position = all
            .iter()
            .position(|oid| *oid == target)
            .ok_or_else(|| BackendError::ObjectNotFound {
                object_type: "commit".to_owned(),
                hash: id.as_str().to_owned(),
                source: "not in the revision list".into(),
            })?;
        // Memoize manifests; consecutive revisions mostly share parents.
        let mut manifests: HashMap<gix::ObjectId, Manifest> = HashMap::new();
        let mut manifest_of = |repo: &gix::Repository,
                               oid: Option<gix::ObjectId>|
         -> BackendResult<Manifest> {
            let Some(oid) = oid else {
                return Ok(Manifest::new());
            };
            if let Some(found) = manifests.get(&oid) {
                return Ok(found.clone());
            }
            let data = commit_data(repo, oid)?;
            let mut manifest = Manifest::new();
            collect_tree(repo, data.tree, &RepoPathBuf::root(), &mut manifest)?;
            manifests.insert(oid, manifest.clone());
            Ok(manifest)
        };
        let mut history = vec![];
        for oid in all[..=position].iter().rev() {
            let data = commit_data(&repo, *oid)?;
            let entry = manifest_of(&repo, Some(*oid))?.get(path).copied();
            let parent_entry = manifest_of(&repo, data.parents.first().copied())?
                .get(path)
                .copied();
            if entry != parent_entry {
                history.push(rev_id(oid));
            }
        }
        Ok(history)
    }

    fn file_annotate(
        &self,
        id: &RevId,
        path: &RepoPathBuf,
    ) -> BackendResult<Vec<(RevId, Vec<u8>)>> {
        let history = self.file_history(id, path)?;
        let mut versions = vec![];
        for rev in history.iter().rev() {
            match self.file_content(rev, path) {
                Ok(content) => versions.push((rev.clone(), content)),
                // The file does not exist in revisions that removed it
                Err(BackendError::PathNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        if versions.is_empty() {
            return Err(BackendError::PathNotFound {
                path: path.clone(),
                hash: id.as_str().to_owned(),
            });
        }
        Ok(files::annotate(&versions))
    }

    fn commit_in_memory(
        &self,
        params: &CommitParams<'_>,
        ops: &[CommitOp],
    ) -> BackendResult<RevId> {
        let repo = self.lock_repo();
        let mut manifest = match params.parents.first() {
            Some(parent) => self.manifest_for_commit(&repo, parent)?,
            None => Manifest::new(),
        };
        for op in ops {
            match op {
                CommitOp::Add {
                    path,
                    content,
                    executable,
                }
                | CommitOp::Change {
                    path,
                    content,
                    executable,
                } => {
                    let oid =
                        repo.write_blob(content.as_slice())
                            .map_err(|err| BackendError::WriteObject {
                                object_type: "blob",
                                source: Box::new(err),
                            })?;
                    manifest.insert(path.clone(), (oid.detach(), *executable));
                }
                CommitOp::Remove { path } => {
                    manifest.remove(path);
                }
            }
        }
        let tree = self.write_tree(&repo, &manifest, &RepoPathBuf::root())?;

        let signature = signature_to_git(params.author, &params.date);
        let mut message = params.message.to_owned();
        if !message.ends_with('\n') {
            message.push('\n');
        }
        let parents: Vec<gix::ObjectId> = params
            .parents
            .iter()
            .map(git_oid)
            .collect::<BackendResult<_>>()?;
        let commit = gix::objs::Commit {
            message: BString::from(message),
            tree,
            author: signature.clone(),
            committer: signature,
            encoding: None,
            parents: parents.into(),
            extra_headers: vec![],
        };
        let oid = repo
            .write_object(&commit)
            .map_err(|err| BackendError::WriteObject {
                object_type: "commit",
                source: Box::new(err),
            })?;

        let ref_name = format!("{HEADS_NAMESPACE}{}", params.branch);
        repo.reference(
            ref_name.as_str(),
            oid.detach(),
            gix::refs::transaction::PreviousValue::Any,
            format!("commit: {}", params.message),
        )
        .map_err(to_other_err)?;
        Ok(rev_id(&oid))
    }

    fn tag(&self, name: &str, rev: &RevId, _params: &TagParams<'_>) -> BackendResult<()> {
        let repo = self.lock_repo();
        repo.reference(
            format!("{TAGS_NAMESPACE}{name}").as_str(),
            git_oid(rev)?,
            gix::refs::transaction::PreviousValue::Any,
            format!("tag: {name}"),
        )
        .map_err(to_other_err)?;
        Ok(())
    }

    fn untag(&self, name: &str, _params: &TagParams<'_>) -> BackendResult<()> {
        let repo = self.lock_repo();
        let reference = repo
            .find_reference(format!("{TAGS_NAMESPACE}{name}").as_str())
            .map_err(to_other_err)?;
        reference.delete().map_err(to_other_err)?;
        Ok(())
    }

    fn checkout(&self, id: &RevId) -> BackendResult<()> {
        let repo = self.lock_repo();
        let target = self.manifest_for_commit(&repo, id)?;
        if let Ok(head) = repo.head_id() {
            let current = self.manifest_for_oid(&repo, Some(head.detach()))?;
            for path in current.keys() {
                if !target.contains_key(path) {
                    let _ = fs::remove_file(path.to_fs_path(&self.root));
                }
            }
        }
        for (path, (oid, _)) in &target {
            let mut blob = repo
                .find_object(*oid)
                .map_err(|err| map_not_found_err(err, &oid.to_string()))?
                .try_into_blob()
                .map_err(to_other_err)?;
            let fs_path = path.to_fs_path(&self.root);
            if let Some(dir) = fs_path.parent() {
                fs::create_dir_all(dir).map_err(to_other_err)?;
            }
            fs::write(&fs_path, blob.take_data()).map_err(to_other_err)?;
        }
        Ok(())
    }

    fn refresh(&self) -> BackendResult<()> {
        let reopened = Self::open_git_repo(&self.root).map_err(to_other_err)?;
        *self.repo.lock().unwrap() = reopened;
        Ok(())
    }

    fn description(&self) -> String {
        fs::read_to_string(self.root.join(".git").join("description"))
            .map(|text| text.trim().to_owned())
            .unwrap_or_else(|_| "unknown".to_owned())
    }
}

/// Registers the `"git"` backend. `default_branch` is used when a repository
/// has no usable HEAD.
#[derive(Debug)]
pub struct GitBackendFactory {
    pub default_branch: String,
}

impl Default for GitBackendFactory {
    fn default() -> Self {
        Self {
            default_branch: "master".to_owned(),
        }
    }
}

impl BackendFactory for GitBackendFactory {
    fn alias(&self) -> &str {
        GitBackend::name()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Backend>, BackendLoadError> {
        let backend = GitBackend::open(path, &self.default_branch)
            .map_err(|err| BackendLoadError(Box::new(err)))?;
        Ok(Box::new(backend))
    }

    fn create(&self, path: &Path) -> Result<Box<dyn Backend>, BackendInitError> {
        fs::create_dir_all(path).map_err(|err| BackendInitError(Box::new(err)))?;
        let backend = GitBackend::init(path, &self.default_branch)
            .map_err(|err| BackendInitError(Box::new(err)))?;
        Ok(Box::new(backend))
    }

    fn clone_from(&self, src_url: &str, path: &Path) -> Result<Box<dyn Backend>, BackendInitError> {
        // Network transport is the git CLI's business.
        let status = Command::new("git")
            .arg("clone")
            .arg(src_url)
            .arg(path)
            .output()
            .map_err(|err| BackendInitError(Box::new(err)))?;
        if !status.status.success() {
            return Err(BackendInitError(
                format!(
                    "git clone failed: {}",
                    String::from_utf8_lossy(&status.stderr).trim()
                )
                .into(),
            ));
        }
        self.open(path)
            .map_err(|BackendLoadError(err)| BackendInitError(err))
    }
}
