//! Mission metadata persistence for the mission list manager.
//!
//! Defines the `MissionInfoStore` contract plus an in-memory backend for tests
//! and a JSON document backend that survives restarts.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mission_core::{current_unix_timestamp_ms, AbilityInfo, ApplicationInfo, Want};

mod json_file;

pub use json_file::JsonFileMissionInfoStore;

/// First mission id handed out by [`MissionInfoStore::generate_mission_id`].
pub const MIN_MISSION_ID: i32 = 1;
/// Last mission id handed out by [`MissionInfoStore::generate_mission_id`].
pub const MAX_MISSION_ID: i32 = 65_535;

/// `running_state` value for a mission whose ability is alive.
pub const MISSION_RUNNING: i32 = 0;
/// `running_state` value for a mission kept only as a recents entry.
pub const MISSION_NOT_RUNNING: i32 = -1;

/// Result type for mission store operations.
pub type StoreResult<T> = Result<T, MissionStoreError>;

/// Errors returned by mission store implementations.
#[derive(Debug, Error)]
pub enum MissionStoreError {
    #[error("mission ids exhausted in range {min}..={max}")]
    IdsExhausted { min: i32, max: i32 },
    #[error("mission info {0} already exists")]
    AlreadyExists(i32),
    #[error("mission info {0} not found")]
    NotFound(i32),
    #[error("unsupported mission store schema version {0}")]
    UnsupportedSchema(u32),
    #[error("failed to persist mission store: {0}")]
    Persist(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Persisted metadata of one mission; enough to rebuild its start request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissionInfo {
    pub id: i32,
    pub mission_name: String,
    #[serde(default)]
    pub is_singleton: bool,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon_path: String,
    #[serde(default)]
    pub running_state: i32,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub continuable: bool,
    #[serde(default)]
    pub updated_unix_ms: u64,
    pub want: Want,
    pub ability_info: AbilityInfo,
    pub app_info: ApplicationInfo,
    #[serde(default)]
    pub specified_flag: Option<String>,
}

impl MissionInfo {
    pub fn touch(&mut self) {
        self.updated_unix_ms = current_unix_timestamp_ms();
    }
}

/// Store contract consumed by the mission list manager.
///
/// Calls never block on remote work; implementations may persist synchronously.
pub trait MissionInfoStore: Send + Sync {
    /// Reserves the lowest free mission id.
    fn generate_mission_id(&self) -> StoreResult<i32>;
    /// Returns the persisted info of a singleton mission with `mission_name`.
    fn find_reused_singleton(&self, mission_name: &str) -> StoreResult<Option<MissionInfo>>;
    fn add_mission_info(&self, info: MissionInfo) -> StoreResult<()>;
    fn update_mission_info(&self, info: MissionInfo) -> StoreResult<()>;
    /// Removes one info; returns whether it existed.
    fn delete_mission_info(&self, mission_id: i32) -> StoreResult<bool>;
    fn get_mission_info(&self, mission_id: i32) -> StoreResult<Option<MissionInfo>>;
    /// Returns every info, most recently updated first.
    fn all_mission_infos(&self) -> StoreResult<Vec<MissionInfo>>;

    /// Returns at most `limit` infos, most recently updated first.
    fn list_mission_infos(&self, limit: usize) -> StoreResult<Vec<MissionInfo>> {
        let mut infos = self.all_mission_infos()?;
        infos.truncate(limit);
        Ok(infos)
    }

    fn update_mission_time(&self, mission_id: i32, updated_unix_ms: u64) -> StoreResult<()> {
        let mut info = self
            .get_mission_info(mission_id)?
            .ok_or(MissionStoreError::NotFound(mission_id))?;
        info.updated_unix_ms = updated_unix_ms;
        self.update_mission_info(info)
    }

    fn update_mission_label(&self, mission_id: i32, label: &str) -> StoreResult<()> {
        let mut info = self
            .get_mission_info(mission_id)?
            .ok_or(MissionStoreError::NotFound(mission_id))?;
        info.label = label.to_string();
        self.update_mission_info(info)
    }

    /// Deletes every unlocked info; returns the removed ids.
    fn delete_unlocked_mission_infos(&self) -> StoreResult<Vec<i32>> {
        let mut removed = Vec::new();
        for info in self.all_mission_infos()? {
            if info.locked {
                continue;
            }
            if self.delete_mission_info(info.id)? {
                removed.push(info.id);
            }
        }
        Ok(removed)
    }

    /// Deletes every info owned by `bundle_name` under `uid`; returns the removed ids.
    fn delete_bundle_mission_infos(&self, bundle_name: &str, uid: i32) -> StoreResult<Vec<i32>> {
        let mut removed = Vec::new();
        for info in self.all_mission_infos()? {
            if info.ability_info.bundle_name != bundle_name || info.app_info.uid != uid {
                continue;
            }
            if self.delete_mission_info(info.id)? {
                removed.push(info.id);
            }
        }
        Ok(removed)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StoreInner {
    pub(crate) infos: BTreeMap<i32, MissionInfo>,
    reserved: BTreeSet<i32>,
}

impl StoreInner {
    pub(crate) fn from_infos(infos: Vec<MissionInfo>) -> Self {
        Self {
            infos: infos.into_iter().map(|info| (info.id, info)).collect(),
            reserved: BTreeSet::new(),
        }
    }

    pub(crate) fn generate_mission_id(&mut self) -> StoreResult<i32> {
        for candidate in MIN_MISSION_ID..=MAX_MISSION_ID {
            if self.infos.contains_key(&candidate) || self.reserved.contains(&candidate) {
                continue;
            }
            self.reserved.insert(candidate);
            return Ok(candidate);
        }
        tracing::error!("cannot generate mission id");
        Err(MissionStoreError::IdsExhausted {
            min: MIN_MISSION_ID,
            max: MAX_MISSION_ID,
        })
    }

    pub(crate) fn find_reused_singleton(&self, mission_name: &str) -> Option<MissionInfo> {
        if mission_name.is_empty() {
            return None;
        }
        self.infos
            .values()
            .find(|info| info.is_singleton && info.mission_name == mission_name)
            .cloned()
    }

    pub(crate) fn add(&mut self, info: MissionInfo) -> StoreResult<()> {
        if self.infos.contains_key(&info.id) {
            return Err(MissionStoreError::AlreadyExists(info.id));
        }
        self.reserved.remove(&info.id);
        self.infos.insert(info.id, info);
        Ok(())
    }

    pub(crate) fn update(&mut self, info: MissionInfo) -> StoreResult<()> {
        match self.infos.get_mut(&info.id) {
            Some(slot) => {
                *slot = info;
                Ok(())
            }
            None => Err(MissionStoreError::NotFound(info.id)),
        }
    }

    pub(crate) fn delete(&mut self, mission_id: i32) -> bool {
        self.reserved.remove(&mission_id);
        self.infos.remove(&mission_id).is_some()
    }

    pub(crate) fn sorted(&self) -> Vec<MissionInfo> {
        let mut infos = self.infos.values().cloned().collect::<Vec<_>>();
        infos.sort_by(|left, right| {
            right
                .updated_unix_ms
                .cmp(&left.updated_unix_ms)
                .then_with(|| left.id.cmp(&right.id))
        });
        infos
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory implementation for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryMissionInfoStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryMissionInfoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MissionInfoStore for InMemoryMissionInfoStore {
    fn generate_mission_id(&self) -> StoreResult<i32> {
        lock_unpoisoned(&self.inner).generate_mission_id()
    }

    fn find_reused_singleton(&self, mission_name: &str) -> StoreResult<Option<MissionInfo>> {
        Ok(lock_unpoisoned(&self.inner).find_reused_singleton(mission_name))
    }

    fn add_mission_info(&self, info: MissionInfo) -> StoreResult<()> {
        lock_unpoisoned(&self.inner).add(info)
    }

    fn update_mission_info(&self, info: MissionInfo) -> StoreResult<()> {
        lock_unpoisoned(&self.inner).update(info)
    }

    fn delete_mission_info(&self, mission_id: i32) -> StoreResult<bool> {
        Ok(lock_unpoisoned(&self.inner).delete(mission_id))
    }

    fn get_mission_info(&self, mission_id: i32) -> StoreResult<Option<MissionInfo>> {
        Ok(lock_unpoisoned(&self.inner).infos.get(&mission_id).cloned())
    }

    fn all_mission_infos(&self) -> StoreResult<Vec<MissionInfo>> {
        Ok(lock_unpoisoned(&self.inner).sorted())
    }
}

#[cfg(test)]
pub(crate) fn sample_info(id: i32, mission_name: &str, updated_unix_ms: u64) -> MissionInfo {
    use mission_core::ElementName;

    MissionInfo {
        id,
        mission_name: mission_name.to_string(),
        is_singleton: mission_name.contains(':'),
        label: String::new(),
        icon_path: String::new(),
        running_state: MISSION_RUNNING,
        locked: false,
        continuable: false,
        updated_unix_ms,
        want: Want::new(ElementName::new("com.example.notes", "MainAbility")),
        ability_info: AbilityInfo {
            bundle_name: "com.example.notes".to_string(),
            name: "MainAbility".to_string(),
            ..AbilityInfo::default()
        },
        app_info: ApplicationInfo {
            name: "notes".to_string(),
            bundle_name: "com.example.notes".to_string(),
            uid: 20_010,
            ..ApplicationInfo::default()
        },
        specified_flag: None,
    }
}
