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

//! Line-level content helpers: splitting, longest-common-subsequence
//! matching between two file versions, and per-line origin attribution used
//! by the backends' annotate implementations.

use bstr::BStr;

use crate::backend::RevId;

/// Splits `content` into lines, each keeping its trailing newline.
pub fn split_lines(content: &[u8]) -> Vec<&BStr> {
    content
        .split_inclusive(|b| *b == b'\n')
        .map(BStr::new)
        .collect()
}

/// For each line of `new`, the index of the `old` line it is matched with in
/// a longest common subsequence, or `None` for lines not present in `old`.
pub fn line_matches(old: &[&BStr], new: &[&BStr]) -> Vec<Option<usize>> {
    // Classic LCS table. File versions handled here are small; quadratic
    // cost is acceptable.
    let mut lengths = vec![vec![0u32; new.len() + 1]; old.len() + 1];
    for (i, old_line) in old.iter().enumerate().rev() {
        for (j, new_line) in new.iter().enumerate().rev() {
            lengths[i][j] = if old_line == new_line {
                lengths[i + 1][j + 1] + 1
            } else {
                lengths[i + 1][j].max(lengths[i][j + 1])
            };
        }
    }
    let mut result = vec![None; new.len()];
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            result[j] = Some(i);
            i += 1;
            j += 1;
        } else if lengths[i + 1][j] >= lengths[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    result
}

/// Attributes every line of the newest version to the oldest version that
/// introduced it. `versions` are (id, content) pairs in oldest-first order
/// and must be non-empty.
pub fn annotate(versions: &[(RevId, Vec<u8>)]) -> Vec<(RevId, Vec<u8>)> {
    let (first_id, first_content) = &versions[0];
    let mut lines = split_lines(first_content);
    let mut origins: Vec<RevId> = vec![first_id.clone(); lines.len()];
    for (id, content) in &versions[1..] {
        let new_lines = split_lines(content);
        let matches = line_matches(&lines, &new_lines);
        origins = matches
            .iter()
            .map(|matched| match matched {
                Some(old_index) => origins[*old_index].clone(),
                None => id.clone(),
            })
            .collect();
        lines = new_lines;
    }
    std::iter::zip(origins, lines)
        .map(|(origin, line)| (origin, line.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(content: &[u8]) -> Vec<&BStr> {
        split_lines(content)
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines(b""), Vec::<&BStr>::new());
        assert_eq!(split_lines(b"a\nb\n"), vec![
            BStr::new(b"a\n"),
            BStr::new(b"b\n")
        ]);
        // Last line without trailing newline is still a line
        assert_eq!(split_lines(b"a\nb"), vec![
            BStr::new(b"a\n"),
            BStr::new(b"b")
        ]);
    }

    #[test]
    fn test_line_matches_common_subsequence() {
        let old = lines(b"a\nb\nc\n");
        let new = lines(b"a\nx\nc\n");
        assert_eq!(line_matches(&old, &new), vec![Some(0), None, Some(2)]);
    }

    #[test]
    fn test_line_matches_insertion_and_deletion() {
        let old = lines(b"a\nb\n");
        let new = lines(b"new\na\nb\n");
        assert_eq!(line_matches(&old, &new), vec![None, Some(0), Some(1)]);

        let old = lines(b"a\nb\nc\n");
        let new = lines(b"a\nc\n");
        assert_eq!(line_matches(&old, &new), vec![Some(0), Some(2)]);
    }

    #[test]
    fn test_annotate_attributes_oldest_origin() {
        let rev0 = RevId::new("rev0");
        let rev1 = RevId::new("rev1");
        let rev2 = RevId::new("rev2");
        let versions = vec![
            (rev0.clone(), b"a\nb\n".to_vec()),
            (rev1.clone(), b"a\nb\nc\n".to_vec()),
            (rev2.clone(), b"a\nx\nc\n".to_vec()),
        ];
        assert_eq!(annotate(&versions), vec![
            (rev0.clone(), b"a\n".to_vec()),
            (rev2.clone(), b"x\n".to_vec()),
            (rev1.clone(), b"c\n".to_vec()),
        ]);
    }
}
