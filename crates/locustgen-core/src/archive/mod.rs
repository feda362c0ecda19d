//! Persistence of generated tests.
//!
//! A [`TestArchive`] owns the mapping from test identifier to the rendered
//! script and its specification, plus an ordered history of everything it
//! has saved. [`fs::FileArchive`] is the on-disk implementation.

pub mod fs;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LocustgenError;
use crate::spec::model::LoadTestSpecification;

pub use fs::FileArchive;

/// One generated test as stored. Never mutated after [`TestArchive::save`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedTest {
    pub id: String,
    /// RFC 3339 timestamp; empty when the archive holds no record of it.
    pub created_at: String,
    pub description: String,
    pub script: String,
    pub specification: LoadTestSpecification,
}

/// A [`GeneratedTest`] together with where it lives.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedTest {
    pub test: GeneratedTest,
    pub script_path: PathBuf,
    pub config_path: PathBuf,
}

/// A single entry in the archive history, in the order tests were saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    /// RFC 3339 timestamp of when the test was saved.
    pub timestamp: String,
    pub description: String,
    pub script_path: String,
    pub config_path: String,
    /// The specification as it was written to the config file.
    pub config: Value,
}

#[async_trait]
pub trait TestArchive: Send + Sync {
    /// Persist a rendered script and its specification under a fresh id.
    async fn save(
        &self,
        script: &str,
        specification: &LoadTestSpecification,
        description: &str,
    ) -> Result<ArchivedTest, LocustgenError>;

    /// Fails with [`LocustgenError::TestNotFound`] for unknown ids.
    async fn get(&self, id: &str) -> Result<ArchivedTest, LocustgenError>;

    /// Every saved test, oldest first.
    async fn list(&self) -> Result<Vec<HistoryEntry>, LocustgenError>;

    /// Flush and refuse further writes. Calling it twice is harmless.
    async fn close(&self) -> Result<(), LocustgenError>;
}
