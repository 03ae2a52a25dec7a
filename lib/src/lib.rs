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

//! Uniform, read-mostly abstraction over version-control repositories.
//!
//! A [`repository::Repository`] is opened by path and exposes its history as
//! an indexable sequence of immutable [`changeset::Changeset`] snapshots.
//! Each snapshot lazily materializes its [`node::Node`] tree. Writes go
//! through a [`memory::InMemoryChangeset`], which validates the staged set
//! against its parents before the backend persists anything.

#![deny(unused_must_use)]

pub mod backend;
pub mod changeset;
pub mod error;
pub mod file_util;
pub mod files;
#[cfg(feature = "git")]
pub mod git_backend;
pub mod local_backend;
pub mod memory;
pub mod node;
pub mod repo_path;
pub mod repository;
pub mod workdir;
