//! Template persistence
//!
//! The engine hands validated payloads to a [`TemplateStore`] and never
//! mutates the registry as a result. Two stores ship with the crate: an
//! in-memory one for sessions and tests, and a directory of JSON files.

use crate::record::TemplateRecord;
use crate::registry::ColumnRegistry;
use crate::serializer::{serialize, validate, TemplatePayload, ValidationError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("template {0} not found")]
    NotFound(i64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
            source: err,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to save template: {0}")]
    Store(#[from] StoreError),
}

/// Create/update/read contract of the template backend.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn create(&self, payload: &TemplatePayload) -> Result<TemplateRecord, StoreError>;

    async fn update(
        &self,
        id: i64,
        payload: &TemplatePayload,
    ) -> Result<TemplateRecord, StoreError>;

    async fn get(&self, id: i64) -> Result<TemplateRecord, StoreError>;

    /// All templates ordered by id.
    async fn list(&self) -> Result<Vec<TemplateRecord>, StoreError>;
}

/// Validate, serialize and hand the template to the store.
///
/// With an `editing_id` the stored template is updated, otherwise a new one
/// is created. The registry is left as submitted either way.
pub async fn submit_template<S>(
    store: &S,
    registry: &ColumnRegistry,
    editing_id: Option<i64>,
) -> Result<TemplateRecord, SubmitError>
where
    S: TemplateStore + ?Sized,
{
    if let Err(err) = validate(registry) {
        info!(error = %err, "template submission blocked");
        return Err(err.into());
    }
    let payload = serialize(registry);

    let result = match editing_id {
        Some(id) => store.update(id, &payload).await,
        None => store.create(&payload).await,
    };
    match &result {
        Ok(record) => info!(template = record.id, title = %record.title, "template saved"),
        Err(err) => warn!(error = %err, "template save failed"),
    }
    Ok(result?)
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<i64, TemplateRecord>,
    last_id: i64,
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryTemplateStore {
    state: RwLock<MemoryState>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = TemplateRecord>) -> Self {
        let records: BTreeMap<i64, TemplateRecord> =
            records.into_iter().map(|record| (record.id, record)).collect();
        let last_id = records.keys().next_back().copied().unwrap_or(0);
        Self {
            state: RwLock::new(MemoryState { records, last_id }),
        }
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn create(&self, payload: &TemplatePayload) -> Result<TemplateRecord, StoreError> {
        let mut state = self.state.write().await;
        state.last_id += 1;
        let record = TemplateRecord::from_payload(state.last_id, payload);
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: i64,
        payload: &TemplatePayload,
    ) -> Result<TemplateRecord, StoreError> {
        let mut state = self.state.write().await;
        let slot = state.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        *slot = TemplateRecord::from_payload(id, payload);
        Ok(slot.clone())
    }

    async fn get(&self, id: i64) -> Result<TemplateRecord, StoreError> {
        let state = self.state.read().await;
        state.records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<TemplateRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.records.values().cloned().collect())
    }
}

/// One `<id>.json` file per template under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileTemplateStore {
    dir: PathBuf,
}

impl JsonFileTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn stored_ids(&self) -> Result<Vec<i64>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()).map(str::parse::<i64>) {
                Some(Ok(id)) => ids.push(id),
                _ => debug!(path = %path.display(), "skipping non-template file"),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn write(&self, record: &TemplateRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(self.record_path(record.id), json).await?;
        debug!(template = record.id, dir = %self.dir.display(), "template written");
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for JsonFileTemplateStore {
    async fn create(&self, payload: &TemplatePayload) -> Result<TemplateRecord, StoreError> {
        let next_id = self.stored_ids().await?.last().copied().unwrap_or(0) + 1;
        let record = TemplateRecord::from_payload(next_id, payload);
        self.write(&record).await?;
        Ok(record)
    }

    async fn update(
        &self,
        id: i64,
        payload: &TemplatePayload,
    ) -> Result<TemplateRecord, StoreError> {
        if !tokio::fs::try_exists(self.record_path(id)).await? {
            return Err(StoreError::NotFound(id));
        }
        let record = TemplateRecord::from_payload(id, payload);
        self.write(&record).await?;
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<TemplateRecord, StoreError> {
        let bytes = match tokio::fs::read(self.record_path(id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id))
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn list(&self) -> Result<Vec<TemplateRecord>, StoreError> {
        let mut records = Vec::new();
        for id in self.stored_ids().await? {
            records.push(self.get(id).await?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{BaseKind, Operator};
    use crate::selection::OperandSelector;

    fn titled(title: &str) -> ColumnRegistry {
        let mut registry = ColumnRegistry::with_default_columns();
        registry.set_title(title);
        registry
    }

    #[tokio::test]
    async fn test_submit_creates_then_updates() {
        let store = InMemoryTemplateStore::new();
        let registry = titled("Cement");

        let created = submit_template(&store, &registry, None).await.unwrap();
        assert_eq!(created.id, 1);

        let renamed = titled("Portland cement");
        let updated = submit_template(&store, &renamed, Some(1)).await.unwrap();
        assert_eq!(updated.id, 1);
        assert_eq!(store.get(1).await.unwrap().title, "Portland cement");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_blocked_by_validation() {
        let store = InMemoryTemplateStore::new();
        let mut registry = titled("Cement");
        let mut selector = OperandSelector::new();
        selector
            .attach_operation(&mut registry, &BaseKind::UnitCost.column_id(), Operator::Divide)
            .unwrap();
        let before = registry.clone();

        let err = submit_template(&store, &registry, None).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Validation(ValidationError::IncompleteCalculation { .. })
        ));
        assert_eq!(registry, before);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_template() {
        let store = InMemoryTemplateStore::new();
        let err = submit_template(&store, &titled("Sand"), Some(42))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Store(StoreError::NotFound(42))));
    }

    #[tokio::test]
    async fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTemplateStore::new(dir.path().join("templates"));
        assert!(store.list().await.unwrap().is_empty());

        let first = store.create(&serialize(&titled("Cement"))).await.unwrap();
        let second = store.create(&serialize(&titled("Sand"))).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        std::fs::write(dir.path().join("templates").join("notes.txt"), "x").unwrap();
        let titles: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.title)
            .collect();
        assert_eq!(titles, vec!["Cement", "Sand"]);

        store.update(2, &serialize(&titled("Gravel"))).await.unwrap();
        assert_eq!(store.get(2).await.unwrap().title, "Gravel");
        assert!(matches!(store.get(3).await, Err(StoreError::NotFound(3))));
        assert!(matches!(
            store.update(9, &serialize(&titled("X"))).await,
            Err(StoreError::NotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.json"), "{ not json").unwrap();
        let store = JsonFileTemplateStore::new(dir.path());
        let err = store.get(1).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }
}
