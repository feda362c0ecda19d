use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone};
use tokio::sync::Mutex;

use crate::archive::{ArchivedTest, GeneratedTest, HistoryEntry, TestArchive};
use crate::error::LocustgenError;
use crate::spec::builder::SpecificationBuilder;
use crate::spec::model::LoadTestSpecification;

const HISTORY_FILE: &str = "history.json";
const CONFIG_FILE: &str = "config.json";
const ID_FORMAT: &str = "%Y%m%d_%H%M%S";

struct ArchiveState {
    history: Vec<HistoryEntry>,
    closed: bool,
}

/// Stores each test as `<root>/<id>/locust_test_<id>.py` plus
/// `<root>/<id>/config.json`, indexed by `<root>/history.json`.
///
/// Id allocation and history writes happen under one lock, so concurrent
/// saves never hand out the same id.
pub struct FileArchive {
    root: PathBuf,
    state: Mutex<ArchiveState>,
}

impl FileArchive {
    /// Open (creating if needed) the archive rooted at `root` and load its
    /// history.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, LocustgenError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;

        let history_path = root.join(HISTORY_FILE);
        let history = match tokio::fs::read_to_string(&history_path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            root = %root.display(),
            entries = history.len(),
            "test archive opened"
        );

        Ok(Self {
            root,
            state: Mutex::new(ArchiveState {
                history,
                closed: false,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn script_path(&self, id: &str) -> PathBuf {
        self.root.join(id).join(format!("locust_test_{id}.py"))
    }

    fn config_path(&self, id: &str) -> PathBuf {
        self.root.join(id).join(CONFIG_FILE)
    }

    /// Write the history next to its final location, then rename over it.
    async fn write_history(&self, history: &[HistoryEntry]) -> Result<(), LocustgenError> {
        let content = serde_json::to_string_pretty(history)?;
        let tmp = self.root.join(format!("{HISTORY_FILE}.tmp"));
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, self.root.join(HISTORY_FILE)).await?;
        Ok(())
    }
}

#[async_trait]
impl TestArchive for FileArchive {
    async fn save(
        &self,
        script: &str,
        specification: &LoadTestSpecification,
        description: &str,
    ) -> Result<ArchivedTest, LocustgenError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(LocustgenError::Validation("test archive is closed".to_string()));
        }

        let now = Local::now();
        let base = now.format(ID_FORMAT).to_string();
        let id = allocate_id(&base, |candidate| {
            state.history.iter().any(|e| e.id == candidate)
                || self.root.join(candidate).exists()
        });

        let script_path = self.script_path(&id);
        let config_path = self.config_path(&id);
        let config = serde_json::to_value(specification)?;

        tokio::fs::create_dir_all(self.root.join(&id)).await?;
        tokio::fs::write(&script_path, script).await?;
        tokio::fs::write(&config_path, serde_json::to_string_pretty(&config)?).await?;

        let timestamp = now.to_rfc3339();
        state.history.push(HistoryEntry {
            id: id.clone(),
            timestamp: timestamp.clone(),
            description: description.to_string(),
            script_path: script_path.display().to_string(),
            config_path: config_path.display().to_string(),
            config,
        });
        self.write_history(&state.history).await?;

        tracing::info!(
            test_id = %id,
            script = %script_path.display(),
            "generated test saved"
        );

        Ok(ArchivedTest {
            test: GeneratedTest {
                id,
                created_at: timestamp,
                description: description.to_string(),
                script: script.to_string(),
                specification: specification.clone(),
            },
            script_path,
            config_path,
        })
    }

    async fn get(&self, id: &str) -> Result<ArchivedTest, LocustgenError> {
        if !is_valid_id(id) {
            return Err(LocustgenError::TestNotFound(id.to_string()));
        }
        let not_found = || LocustgenError::TestNotFound(id.to_string());

        let script_path = self.script_path(id);
        let config_path = self.config_path(id);
        let script = read_if_exists(&script_path).await?.ok_or_else(not_found)?;
        let config = read_if_exists(&config_path).await?.ok_or_else(not_found)?;
        let config: serde_json::Value = serde_json::from_str(&config)?;
        let specification = SpecificationBuilder::from_params(&config)?;

        let (created_at, description) = {
            let state = self.state.lock().await;
            match state.history.iter().find(|e| e.id == id) {
                Some(entry) => (entry.timestamp.clone(), entry.description.clone()),
                None => (timestamp_from_id(id).unwrap_or_default(), String::new()),
            }
        };

        Ok(ArchivedTest {
            test: GeneratedTest {
                id: id.to_string(),
                created_at,
                description,
                script,
                specification,
            },
            script_path,
            config_path,
        })
    }

    async fn list(&self) -> Result<Vec<HistoryEntry>, LocustgenError> {
        Ok(self.state.lock().await.history.clone())
    }

    async fn close(&self) -> Result<(), LocustgenError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        self.write_history(&state.history).await?;
        state.closed = true;
        tracing::info!(root = %self.root.display(), "test archive closed");
        Ok(())
    }
}

/// `base`, or `base_2`, `base_3`, ... whichever is the first not `taken`.
fn allocate_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Ids are used as directory names; anything that could escape the root is
/// rejected up front.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Recover the creation time encoded in an id such as `20250428_224001_2`.
fn timestamp_from_id(id: &str) -> Option<String> {
    let stamp = id.get(..15)?;
    let naive = NaiveDateTime::parse_from_str(stamp, ID_FORMAT).ok()?;
    let local = Local.from_local_datetime(&naive).single()?;
    Some(local.to_rfc3339())
}

async fn read_if_exists(path: &Path) -> Result<Option<String>, LocustgenError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
