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

//! Self-contained backend storing history as plain files under `.vcs/`.
//! Blobs and commit records are content-addressed by a truncated blake2
//! hash; records are serialized as JSON.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use blake2::Blake2b512;
use blake2::Digest as _;
use tempfile::NamedTempFile;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::backend::BackendFactory;
use crate::backend::BackendInitError;
use crate::backend::BackendLoadError;
use crate::backend::BackendResult;
use crate::backend::CommitInfo;
use crate::backend::CommitOp;
use crate::backend::CommitParams;
use crate::backend::Refs;
use crate::backend::RevId;
use crate::backend::StatusSummary;
use crate::backend::TagParams;
use crate::backend::Timestamp;
use crate::file_util::persist_content_addressed_temp_file;
use crate::files;
use crate::repo_path::RepoPathBuf;

const METADATA_DIR: &str = ".vcs";
const DEFAULT_BRANCH: &str = "default";
// 20 bytes of blake2 output, so ids render as 40 hex digits like the other
// backends'.
const ID_LENGTH: usize = 20;

fn hash_id(data: &[u8]) -> RevId {
    let digest = Blake2b512::digest(data);
    RevId::new(hex::encode(&digest[..ID_LENGTH]))
}

fn to_other_err(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> BackendError {
    BackendError::Other(err.into())
}

fn map_not_found_err(err: std::io::Error, object_type: &str, hash: &str) -> BackendError {
    if err.kind() == std::io::ErrorKind::NotFound {
        BackendError::ObjectNotFound {
            object_type: object_type.to_owned(),
            hash: hash.to_owned(),
            source: Box::new(err),
        }
    } else {
        BackendError::ReadObject {
            object_type: object_type.to_owned(),
            hash: hash.to_owned(),
            source: Box::new(err),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct FileEntry {
    blob: String,
    executable: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CommitRecord {
    parents: Vec<RevId>,
    author: String,
    message: String,
    date: Timestamp,
    branch: String,
    files: BTreeMap<RepoPathBuf, FileEntry>,
    touched: Vec<RepoPathBuf>,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct RefsRecord {
    branches: Vec<(String, RevId)>,
    tags: Vec<(String, RevId)>,
}

#[derive(Debug)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn name() -> &'static str {
        "local"
    }

    pub fn init(root: &Path) -> Result<Self, std::io::Error> {
        let store = root.join(METADATA_DIR);
        fs::create_dir_all(store.join("store").join("blobs"))?;
        fs::create_dir_all(store.join("store").join("commits"))?;
        let backend = Self::load(root)?;
        backend.write_json(&backend.revisions_path(), &Vec::<RevId>::new())?;
        backend.write_json(&backend.refs_path(), &RefsRecord::default())?;
        Ok(backend)
    }

    pub fn load(root: &Path) -> Result<Self, std::io::Error> {
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    fn revisions_path(&self) -> PathBuf {
        self.meta_path().join("revisions")
    }

    fn refs_path(&self) -> PathBuf {
        self.meta_path().join("refs.json")
    }

    fn checkout_path(&self) -> PathBuf {
        self.meta_path().join("checkout")
    }

    fn blob_path(&self, blob: &str) -> PathBuf {
        self.meta_path().join("store").join("blobs").join(blob)
    }

    fn commit_path(&self, id: &RevId) -> PathBuf {
        self.meta_path()
            .join("store")
            .join("commits")
            .join(id.as_str())
    }

    fn write_json<T: serde::Serialize>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), std::io::Error> {
        let mut temp_file = NamedTempFile::new_in(self.meta_path())?;
        temp_file.write_all(&serde_json::to_vec_pretty(value)?)?;
        temp_file.persist(path).map_err(|err| err.error)?;
        Ok(())
    }

    fn read_record(&self, id: &RevId) -> BackendResult<CommitRecord> {
        let buf = fs::read(self.commit_path(id))
            .map_err(|err| map_not_found_err(err, "commit", id.as_str()))?;
        serde_json::from_slice(&buf).map_err(|err| BackendError::ReadObject {
            object_type: "commit".to_owned(),
            hash: id.as_str().to_owned(),
            source: Box::new(err),
        })
    }

    fn read_blob(&self, blob: &str) -> BackendResult<Vec<u8>> {
        fs::read(self.blob_path(blob)).map_err(|err| map_not_found_err(err, "blob", blob))
    }

    fn write_blob(&self, content: &[u8]) -> BackendResult<String> {
        let id = hash_id(content);
        let temp_file = NamedTempFile::new_in(self.meta_path()).map_err(to_other_err)?;
        temp_file.as_file().write_all(content).map_err(to_other_err)?;
        persist_content_addressed_temp_file(temp_file, self.blob_path(id.as_str()))
            .map_err(to_other_err)?;
        Ok(id.as_str().to_owned())
    }

    fn read_revisions(&self) -> BackendResult<Vec<RevId>> {
        let buf = fs::read(self.revisions_path()).map_err(to_other_err)?;
        serde_json::from_slice(&buf).map_err(to_other_err)
    }

    fn read_refs(&self) -> BackendResult<RefsRecord> {
        let buf = fs::read(self.refs_path()).map_err(to_other_err)?;
        serde_json::from_slice(&buf).map_err(to_other_err)
    }

    fn file_entry(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<FileEntry> {
        let record = self.read_record(id)?;
        record
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::PathNotFound {
                path: path.clone(),
                hash: id.as_str().to_owned(),
            })
    }

    /// Revision ids up to and including `id`, oldest first.
    fn revisions_up_to(&self, id: &RevId) -> BackendResult<Vec<RevId>> {
        let revisions = self.read_revisions()?;
        let position = revisions.iter().position(|rev| rev == id).ok_or_else(|| {
            BackendError::ObjectNotFound {
                object_type: "commit".to_owned(),
                hash: id.as_str().to_owned(),
                source: "not in the revision list".into(),
            }
        })?;
        Ok(revisions[..=position].to_vec())
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &str {
        Self::name()
    }

    fn default_branch(&self) -> &str {
        DEFAULT_BRANCH
    }

    fn metadata_dir(&self) -> &str {
        METADATA_DIR
    }

    fn revisions(&self) -> BackendResult<Vec<RevId>> {
        self.read_revisions()
    }

    fn refs(&self) -> BackendResult<Refs> {
        let record = self.read_refs()?;
        Ok(Refs {
            branches: record.branches.into_iter().collect(),
            tags: record.tags.into_iter().collect(),
        })
    }

    fn commit_info(&self, id: &RevId) -> BackendResult<CommitInfo> {
        let record = self.read_record(id)?;
        let refs = self.read_refs()?;
        let tags = refs
            .tags
            .iter()
            .filter(|(_, target)| target == id)
            .map(|(name, _)| name.clone())
            .collect();
        Ok(CommitInfo {
            parents: record.parents,
            author: record.author,
            message: record.message,
            date: record.date,
            branch: record.branch,
            tags,
            touched_paths: record.touched,
            file_paths: record.files.into_keys().collect(),
        })
    }

    fn status(&self, id: &RevId, parent: Option<&RevId>) -> BackendResult<StatusSummary> {
        let files = self.read_record(id)?.files;
        let parent_files = match parent {
            Some(parent) => self.read_record(parent)?.files,
            None => BTreeMap::new(),
        };
        let mut summary = StatusSummary::default();
        for (path, entry) in &files {
            match parent_files.get(path) {
                None => summary.added.push(path.clone()),
                Some(old) if old != entry => summary.changed.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in parent_files.keys() {
            if !files.contains_key(path) {
                summary.removed.push(path.clone());
            }
        }
        Ok(summary)
    }

    fn file_content(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<Vec<u8>> {
        let entry = self.file_entry(id, path)?;
        self.read_blob(&entry.blob)
    }

    fn file_size(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<u64> {
        let entry = self.file_entry(id, path)?;
        let metadata = fs::metadata(self.blob_path(&entry.blob))
            .map_err(|err| map_not_found_err(err, "blob", &entry.blob))?;
        Ok(metadata.len())
    }

    fn file_is_executable(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<bool> {
        Ok(self.file_entry(id, path)?.executable)
    }

    fn file_history(&self, id: &RevId, path: &RepoPathBuf) -> BackendResult<Vec<RevId>> {
        let mut history = vec![];
        for rev in self.revisions_up_to(id)?.iter().rev() {
            if self.read_record(rev)?.touched.contains(path) {
                history.push(rev.clone());
            }
        }
        Ok(history)
    }

    fn file_annotate(
        &self,
        id: &RevId,
        path: &RepoPathBuf,
    ) -> BackendResult<Vec<(RevId, Vec<u8>)>> {
        let mut versions = vec![];
        for rev in self.revisions_up_to(id)? {
            let record = self.read_record(&rev)?;
            if !record.touched.contains(path) {
                continue;
            }
            // Skip revisions where the file was removed.
            if let Some(entry) = record.files.get(path) {
                versions.push((rev, self.read_blob(&entry.blob)?));
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
        let mut files = match params.parents.first() {
            Some(parent) => self.read_record(parent)?.files,
            None => BTreeMap::new(),
        };
        let mut touched: Vec<RepoPathBuf> = ops.iter().map(|op| op.path().clone()).collect();
        touched.sort();
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
                    let blob = self.write_blob(content)?;
                    files.insert(
                        path.clone(),
                        FileEntry {
                            blob,
                            executable: *executable,
                        },
                    );
                }
                CommitOp::Remove { path } => {
                    files.remove(path);
                }
            }
        }
        let record = CommitRecord {
            parents: params.parents.to_vec(),
            author: params.author.to_owned(),
            message: params.message.to_owned(),
            date: params.date,
            branch: params.branch.to_owned(),
            files,
            touched,
        };
        let payload = serde_json::to_vec_pretty(&record).map_err(to_other_err)?;
        let id = hash_id(&payload);
        let temp_file = NamedTempFile::new_in(self.meta_path()).map_err(to_other_err)?;
        temp_file
            .as_file()
            .write_all(&payload)
            .map_err(|err| BackendError::WriteObject {
                object_type: "commit",
                source: Box::new(err),
            })?;
        persist_content_addressed_temp_file(temp_file, self.commit_path(&id)).map_err(|err| {
            BackendError::WriteObject {
                object_type: "commit",
                source: Box::new(err),
            }
        })?;

        let mut revisions = self.read_revisions()?;
        if !revisions.contains(&id) {
            revisions.push(id.clone());
            self.write_json(&self.revisions_path(), &revisions)
                .map_err(to_other_err)?;
        }

        let mut refs = self.read_refs()?;
        match refs
            .branches
            .iter_mut()
            .find(|(name, _)| name.as_str() == params.branch)
        {
            Some((_, head)) => *head = id.clone(),
            None => refs.branches.push((params.branch.to_owned(), id.clone())),
        }
        self.write_json(&self.refs_path(), &refs)
            .map_err(to_other_err)?;
        Ok(id)
    }

    fn tag(&self, name: &str, rev: &RevId, _params: &TagParams<'_>) -> BackendResult<()> {
        let mut refs = self.read_refs()?;
        match refs.tags.iter_mut().find(|(tag, _)| tag.as_str() == name) {
            Some((_, target)) => *target = rev.clone(),
            None => refs.tags.push((name.to_owned(), rev.clone())),
        }
        self.write_json(&self.refs_path(), &refs).map_err(to_other_err)
    }

    fn untag(&self, name: &str, _params: &TagParams<'_>) -> BackendResult<()> {
        let mut refs = self.read_refs()?;
        refs.tags.retain(|(tag, _)| tag.as_str() != name);
        self.write_json(&self.refs_path(), &refs).map_err(to_other_err)
    }

    fn checkout(&self, id: &RevId) -> BackendResult<()> {
        let target = self.read_record(id)?.files;
        // Drop files tracked by the previous checkout (the tip if no
        // checkout was recorded) that are absent from the target revision.
        let previous = match fs::read(self.checkout_path()) {
            Ok(buf) => Some(serde_json::from_slice(&buf).map_err(to_other_err)?),
            Err(_) => self.read_revisions()?.last().cloned(),
        };
        if let Some(previous) = previous {
            for path in self.read_record(&previous)?.files.keys() {
                if !target.contains_key(path) {
                    let _ = fs::remove_file(path.to_fs_path(&self.root));
                }
            }
        }
        for (path, entry) in &target {
            let fs_path = path.to_fs_path(&self.root);
            if let Some(dir) = fs_path.parent() {
                fs::create_dir_all(dir).map_err(to_other_err)?;
            }
            fs::write(&fs_path, self.read_blob(&entry.blob)?).map_err(to_other_err)?;
        }
        self.write_json(&self.checkout_path(), id)
            .map_err(to_other_err)
    }

    fn refresh(&self) -> BackendResult<()> {
        // State is re-read from disk on every call; nothing is cached here.
        Ok(())
    }

    fn description(&self) -> String {
        fs::read_to_string(self.meta_path().join("description"))
            .map(|text| text.trim().to_owned())
            .unwrap_or_else(|_| "unknown".to_owned())
    }

    fn contact(&self) -> String {
        fs::read_to_string(self.meta_path().join("contact"))
            .map(|text| text.trim().to_owned())
            .unwrap_or_else(|_| "Unknown".to_owned())
    }
}

/// Registers the `"local"` backend.
#[derive(Debug, Default)]
pub struct LocalBackendFactory;

fn copy_dir_recursively(src: &Path, dst: &Path) -> Result<(), std::io::Error> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursively(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

impl BackendFactory for LocalBackendFactory {
    fn alias(&self) -> &str {
        LocalBackend::name()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Backend>, BackendLoadError> {
        if !path.join(METADATA_DIR).is_dir() {
            return Err(BackendLoadError(
                format!("no {METADATA_DIR} directory in {}", path.display()).into(),
            ));
        }
        let backend = LocalBackend::load(path).map_err(|err| BackendLoadError(Box::new(err)))?;
        Ok(Box::new(backend))
    }

    fn create(&self, path: &Path) -> Result<Box<dyn Backend>, BackendInitError> {
        fs::create_dir_all(path).map_err(|err| BackendInitError(Box::new(err)))?;
        let backend = LocalBackend::init(path).map_err(|err| BackendInitError(Box::new(err)))?;
        Ok(Box::new(backend))
    }

    fn clone_from(&self, src_url: &str, path: &Path) -> Result<Box<dyn Backend>, BackendInitError> {
        // The local backend only supports filesystem sources.
        let src = Path::new(src_url);
        if !src.join(METADATA_DIR).is_dir() {
            return Err(BackendInitError(
                format!("no repository to clone at {src_url}").into(),
            ));
        }
        copy_dir_recursively(src, path).map_err(|err| BackendInitError(Box::new(err)))?;
        let backend = LocalBackend::load(path).map_err(|err| BackendInitError(Box::new(err)))?;
        Ok(Box::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn commit_params<'a>(parents: &'a [RevId], branch: &'a str) -> CommitParams<'a> {
        CommitParams {
            parents,
            author: "Someone <someone@example.com>",
            message: "message",
            date: Timestamp {
                timestamp: crate::backend::MillisSinceEpoch(0),
                tz_offset: 0,
            },
            branch,
        }
    }

    fn repo_path(value: &str) -> RepoPathBuf {
        RepoPathBuf::from_internal_string(value).unwrap()
    }

    #[test]
    fn test_init_creates_empty_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::init(temp_dir.path()).unwrap();
        assert_eq!(backend.revisions().unwrap(), vec![]);
        assert_eq!(backend.refs().unwrap(), Refs::default());
    }

    #[test]
    fn test_commit_and_read_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::init(temp_dir.path()).unwrap();
        let ops = vec![CommitOp::Add {
            path: repo_path("dir/file"),
            content: b"content".to_vec(),
            executable: false,
        }];
        let id = backend
            .commit_in_memory(&commit_params(&[], "default"), &ops)
            .unwrap();

        assert_eq!(backend.revisions().unwrap(), vec![id.clone()]);
        let info = backend.commit_info(&id).unwrap();
        assert_eq!(info.file_paths, vec![repo_path("dir/file")]);
        assert_eq!(info.branch, "default");
        assert_eq!(
            backend.file_content(&id, &repo_path("dir/file")).unwrap(),
            b"content"
        );
        assert_eq!(backend.file_size(&id, &repo_path("dir/file")).unwrap(), 7);
        // The branch head moved to the new commit
        assert_eq!(backend.refs().unwrap().branches["default"], id);
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::init(temp_dir.path()).unwrap();
        assert_matches!(
            backend.commit_info(&RevId::new("0".repeat(40))),
            Err(BackendError::ObjectNotFound { .. })
        );
    }

    #[test]
    fn test_status_between_commits() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::init(temp_dir.path()).unwrap();
        let first = backend
            .commit_in_memory(&commit_params(&[], "default"), &[
                CommitOp::Add {
                    path: repo_path("a"),
                    content: b"1".to_vec(),
                    executable: false,
                },
                CommitOp::Add {
                    path: repo_path("b"),
                    content: b"1".to_vec(),
                    executable: false,
                },
            ])
            .unwrap();
        let parents = vec![first.clone()];
        let second = backend
            .commit_in_memory(&commit_params(&parents, "default"), &[
                CommitOp::Change {
                    path: repo_path("a"),
                    content: b"2".to_vec(),
                    executable: false,
                },
                CommitOp::Remove {
                    path: repo_path("b"),
                },
                CommitOp::Add {
                    path: repo_path("c"),
                    content: b"1".to_vec(),
                    executable: false,
                },
            ])
            .unwrap();
        let status = backend.status(&second, Some(&first)).unwrap();
        assert_eq!(status.added, vec![repo_path("c")]);
        assert_eq!(status.changed, vec![repo_path("a")]);
        assert_eq!(status.removed, vec![repo_path("b")]);
    }
}
