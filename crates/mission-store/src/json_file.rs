use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use mission_core::write_json_atomic;

use crate::{
    lock_unpoisoned, MissionInfo, MissionInfoStore, MissionStoreError, StoreInner, StoreResult,
};

const MISSION_STORE_SCHEMA_VERSION: u32 = 1;

fn mission_store_schema_version() -> u32 {
    MISSION_STORE_SCHEMA_VERSION
}

#[derive(Debug, Serialize, Deserialize)]
struct MissionStoreDocument {
    #[serde(default = "mission_store_schema_version")]
    schema_version: u32,
    #[serde(default)]
    missions: Vec<MissionInfo>,
}

/// Mission store persisted as one JSON document, rewritten atomically on
/// every mutation.
#[derive(Debug)]
pub struct JsonFileMissionInfoStore {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl JsonFileMissionInfoStore {
    /// Opens `path`, loading any previously persisted missions.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let infos = load_mission_store_document(&path)?;
        tracing::debug!(
            path = %path.display(),
            missions = infos.len(),
            "opened mission store"
        );
        Ok(Self {
            path,
            inner: Mutex::new(StoreInner::from_infos(infos)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, inner: &StoreInner) -> StoreResult<()> {
        let document = MissionStoreDocument {
            schema_version: MISSION_STORE_SCHEMA_VERSION,
            missions: inner.infos.values().cloned().collect(),
        };
        write_json_atomic(&self.path, &document)
            .map_err(|error| MissionStoreError::Persist(format!("{error:#}")))
    }

    fn mutate<T>(&self, apply: impl FnOnce(&mut StoreInner) -> StoreResult<T>) -> StoreResult<T> {
        let mut inner = lock_unpoisoned(&self.inner);
        let value = apply(&mut inner)?;
        self.persist(&inner)?;
        Ok(value)
    }
}

fn load_mission_store_document(path: &Path) -> StoreResult<Vec<MissionInfo>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: MissionStoreDocument = serde_json::from_str(&raw)?;
    if document.schema_version != MISSION_STORE_SCHEMA_VERSION {
        return Err(MissionStoreError::UnsupportedSchema(document.schema_version));
    }
    Ok(document.missions)
}

impl MissionInfoStore for JsonFileMissionInfoStore {
    fn generate_mission_id(&self) -> StoreResult<i32> {
        lock_unpoisoned(&self.inner).generate_mission_id()
    }

    fn find_reused_singleton(&self, mission_name: &str) -> StoreResult<Option<MissionInfo>> {
        Ok(lock_unpoisoned(&self.inner).find_reused_singleton(mission_name))
    }

    fn add_mission_info(&self, info: MissionInfo) -> StoreResult<()> {
        self.mutate(|inner| inner.add(info))
    }

    fn update_mission_info(&self, info: MissionInfo) -> StoreResult<()> {
        self.mutate(|inner| inner.update(info))
    }

    fn delete_mission_info(&self, mission_id: i32) -> StoreResult<bool> {
        self.mutate(|inner| Ok(inner.delete(mission_id)))
    }

    fn get_mission_info(&self, mission_id: i32) -> StoreResult<Option<MissionInfo>> {
        Ok(lock_unpoisoned(&self.inner).infos.get(&mission_id).cloned())
    }

    fn all_mission_infos(&self) -> StoreResult<Vec<MissionInfo>> {
        Ok(lock_unpoisoned(&self.inner).sorted())
    }
}
