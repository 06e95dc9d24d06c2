use std::fs;
use std::path::PathBuf;

use crate::state::ExecutionRecord;

/// Execution-record store collaborator. External storage is expected to
/// provide per-record atomicity; the core never coordinates across sessions.
pub trait RecordStore: Send + Sync {
    /// Persist one record and return its assigned execution id.
    fn insert(&self, record: &ExecutionRecord) -> Result<String, String>;
}

/// File-backed store: one JSON document per record under the data dir.
/// Ids are random rather than sequential so concurrent sessions never race.
pub struct JsonRecordStore {
    dir: PathBuf,
}

impl JsonRecordStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl RecordStore for JsonRecordStore {
    fn insert(&self, record: &ExecutionRecord) -> Result<String, String> {
        fs::create_dir_all(&self.dir).map_err(|e| e.to_string())?;

        let exeid = format!(
            "EX{}",
            &uuid::Uuid::new_v4().simple().to_string()[..12]
        );

        let mut stored = record.clone();
        stored.exeid = exeid.clone();

        let text = serde_json::to_string_pretty(&stored).map_err(|e| e.to_string())?;
        fs::write(self.dir.join(format!("{}.json", exeid)), text).map_err(|e| e.to_string())?;

        Ok(exeid)
    }
}
