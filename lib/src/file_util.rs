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
use std::fs::File;
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::repo_path::RepoPathBuf;

/// Moves `temp_file` into place at `target`, whose name is derived from the
/// content. Losing a rename race therefore leaves an interchangeable file at
/// `target`; the temp file is simply dropped in that case.
pub fn persist_content_addressed_temp_file<P: AsRef<Path>>(
    temp_file: NamedTempFile,
    target: P,
) -> io::Result<File> {
    temp_file.persist(&target).or_else(|persist_err| {
        // Either a concurrent writer already produced the target, or the
        // rename itself failed. Only the former is recoverable.
        File::open(&target).map_err(|_| persist_err.error)
    })
}

/// Enumerates regular files under `root`, as canonical repository paths,
/// skipping the top-level directory named `exclude_dir`.
pub fn walk_repo_files(root: &Path, exclude_dir: &str) -> io::Result<Vec<RepoPathBuf>> {
    let mut result = vec![];
    let mut pending = vec![(root.to_path_buf(), RepoPathBuf::root())];
    while let Some((fs_dir, repo_dir)) = pending.pop() {
        for entry in fs::read_dir(&fs_dir)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue, // not representable as a repo path
            };
            if repo_dir.is_root() && name == exclude_dir {
                continue;
            }
            let sub_path = repo_dir.join(&RepoPathBuf::from_internal_string(name).unwrap());
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push((entry.path(), sub_path));
            } else if file_type.is_file() {
                result.push(sub_path);
            }
        }
    }
    result.sort();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn test_persist_no_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("file");
        let mut temp_file = NamedTempFile::new_in(&temp_dir).unwrap();
        temp_file.write_all(b"contents").unwrap();
        persist_content_addressed_temp_file(temp_file, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"contents");
    }

    #[test]
    fn test_persist_target_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("file");
        fs::write(&target, b"contents").unwrap();
        let mut temp_file = NamedTempFile::new_in(&temp_dir).unwrap();
        temp_file.write_all(b"contents").unwrap();
        persist_content_addressed_temp_file(temp_file, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"contents");
    }

    #[test]
    fn test_walk_repo_files_skips_metadata_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".store")).unwrap();
        fs::write(root.join(".store/state"), b"x").unwrap();
        fs::create_dir_all(root.join("dir/sub")).unwrap();
        fs::write(root.join("top"), b"1").unwrap();
        fs::write(root.join("dir/sub/inner"), b"2").unwrap();

        let files = walk_repo_files(root, ".store").unwrap();
        assert_eq!(files, vec![
            RepoPathBuf::from_internal_string("dir/sub/inner").unwrap(),
            RepoPathBuf::from_internal_string("top").unwrap(),
        ]);
    }
}
