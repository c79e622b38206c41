//! Single-writer mission list manager.
//!
//! All records, missions and lists live in arenas owned by
//! [`MissionListManager`]; cross references are generational keys. Every
//! entry point takes `&mut self`, so deferred work re-enters through
//! [`MissionListManager::handle_task`] instead of a re-entrant lock.

mod call;
mod dump;
mod lifecycle;
mod mission_ops;
mod recovery;
mod start;
mod terminate;

use std::collections::VecDeque;
use std::sync::Arc;

use mission_core::{current_unix_timestamp_ms, AbilityRequest, AbilityToken, ElementName};
use mission_store::{MissionInfoStore, MissionStoreError, MISSION_NOT_RUNNING};

use crate::ability_record::{AbilityRecord, AbilityState};
use crate::arena::Arena;
use crate::collaborators::{
    ManagerTask, ProcessDriver, TaskScheduler, START_WAITING_TASK,
};
use crate::config::MissionManagerConfig;
use crate::error::{MissionError, MissionResult};
use crate::listener::ListenerRegistry;
use crate::mission::{Mission, MissionKey};
use crate::mission_list::{ListKey, MissionList, MissionListType};

pub use call::CallResolution;
pub use dump::AbilityRunningInfo;

/// Outcome of an accepted start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The target was scheduled (or already foreground).
    Started,
    /// Another foreground transition is in flight; the request waits its turn.
    Queued,
    /// The owning application is choosing the specified instance.
    PendingSpecified,
}

pub struct MissionListManager {
    config: MissionManagerConfig,
    driver: Arc<dyn ProcessDriver>,
    store: Arc<dyn MissionInfoStore>,
    scheduler: Arc<dyn TaskScheduler>,
    listeners: ListenerRegistry,
    records: Arena<AbilityToken, AbilityRecord>,
    missions: Arena<MissionKey, Mission>,
    lists: Arena<ListKey, MissionList>,
    launcher_list: ListKey,
    default_standard_list: ListKey,
    default_single_list: ListKey,
    current_lists: VecDeque<ListKey>,
    waiting_queue: VecDeque<AbilityRequest>,
    terminate_list: Vec<AbilityToken>,
    specified_pending: bool,
    next_record_id: u64,
    next_event_id: u64,
    last_stamp_ms: u64,
}

impl MissionListManager {
    pub fn new(
        config: MissionManagerConfig,
        driver: Arc<dyn ProcessDriver>,
        store: Arc<dyn MissionInfoStore>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        let mut lists = Arena::new();
        let launcher_list = lists.insert(MissionList::new(MissionListType::Launcher));
        let default_standard_list = lists.insert(MissionList::new(MissionListType::DefaultStandard));
        let default_single_list = lists.insert(MissionList::new(MissionListType::DefaultSingleton));
        let mut current_lists = VecDeque::new();
        current_lists.push_front(launcher_list);
        tracing::debug!(user_id = config.user_id, "mission list manager initialized");
        Self {
            config,
            driver,
            store,
            scheduler,
            listeners: ListenerRegistry::new(),
            records: Arena::new(),
            missions: Arena::new(),
            lists,
            launcher_list,
            default_standard_list,
            default_single_list,
            current_lists,
            waiting_queue: VecDeque::new(),
            terminate_list: Vec::new(),
            specified_pending: false,
            next_record_id: 1,
            next_event_id: 1,
            last_stamp_ms: 0,
        }
    }

    pub fn config(&self) -> &MissionManagerConfig {
        &self.config
    }

    pub fn user_id(&self) -> i32 {
        self.config.user_id
    }

    pub fn record(&self, token: AbilityToken) -> Option<&AbilityRecord> {
        self.records.get(token)
    }

    pub fn mission(&self, key: MissionKey) -> Option<&Mission> {
        self.missions.get(key)
    }

    pub fn mission_list(&self, key: ListKey) -> Option<&MissionList> {
        self.lists.get(key)
    }

    pub fn launcher_list(&self) -> ListKey {
        self.launcher_list
    }

    pub fn default_standard_list(&self) -> ListKey {
        self.default_standard_list
    }

    pub fn default_single_list(&self) -> ListKey {
        self.default_single_list
    }

    /// Current lists in most-recently-used order, the launcher list included.
    pub fn current_mission_lists(&self) -> Vec<ListKey> {
        self.current_lists.iter().copied().collect()
    }

    pub fn waiting_requests(&self) -> impl Iterator<Item = &AbilityRequest> + '_ {
        self.waiting_queue.iter()
    }

    pub fn terminate_list(&self) -> &[AbilityToken] {
        &self.terminate_list
    }

    pub fn is_specified_pending(&self) -> bool {
        self.specified_pending
    }

    /// Ability on top of the most recently used list.
    pub fn current_top_ability(&self) -> Option<AbilityToken> {
        let list = self.lists.get(*self.current_lists.front()?)?;
        let mission = self.missions.get(list.top()?)?;
        Some(mission.ability)
    }

    /// Mission with `mission_id` that currently sits in a list.
    pub fn find_mission_by_id(&self, mission_id: i32) -> Option<MissionKey> {
        self.missions
            .iter()
            .find(|(_, mission)| mission.mission_id == mission_id && mission.list.is_some())
            .map(|(key, _)| key)
    }

    /// Listed ability with `element`, searched in MRU order and then the default lists.
    pub fn find_ability_by_element(&self, element: &ElementName) -> Option<AbilityToken> {
        self.search_order()
            .into_iter()
            .filter_map(|list| self.lists.get(list))
            .flat_map(|list| list.missions())
            .filter_map(|mission| self.missions.get(mission))
            .map(|mission| mission.ability)
            .find(|token| {
                self.records.get(*token).is_some_and(|record| {
                    record.bundle_name() == element.bundle_name
                        && record.ability_name() == element.ability_name
                })
            })
    }

    /// Record of the launcher root ability, if one exists.
    pub fn launcher_root(&self) -> Option<AbilityToken> {
        self.lists
            .get(self.launcher_list)?
            .missions()
            .filter_map(|mission| self.missions.get(mission))
            .map(|mission| mission.ability)
            .find(|token| {
                self.records
                    .get(*token)
                    .is_some_and(|record| record.launcher_root)
            })
    }

    /// Dispatches one deferred task posted through the scheduler.
    pub fn handle_task(&mut self, task: ManagerTask) {
        tracing::debug!(task = task.name(), "handling manager task");
        match task {
            ManagerTask::StartWaitingAbility => self.start_waiting_ability(),
            ManagerTask::CompleteForeground(token) => self.complete_foreground(token),
            ManagerTask::CompleteBackground(token) => self.complete_background(token),
            ManagerTask::CompleteTerminate(token) => self.complete_terminate(token),
            ManagerTask::BackToLauncher => self.back_to_launcher(),
            ManagerTask::BackToCaller(caller) => self.back_to_caller(caller),
            ManagerTask::SpecifiedTimeout => self.on_specified_timeout(),
            ManagerTask::Timeout { kind, event_id } => self.on_time_out(kind, event_id),
        }
    }

    fn search_order(&self) -> Vec<ListKey> {
        let mut order = self.current_lists.iter().copied().collect::<Vec<_>>();
        order.push(self.default_single_list);
        order.push(self.default_standard_list);
        order
    }

    fn require_record(&self, token: AbilityToken) -> MissionResult<&AbilityRecord> {
        self.records
            .get(token)
            .ok_or(MissionError::InvalidToken(token))
    }

    fn require_record_mut(&mut self, token: AbilityToken) -> MissionResult<&mut AbilityRecord> {
        self.records
            .get_mut(token)
            .ok_or(MissionError::InvalidToken(token))
    }

    fn state_of(&self, token: AbilityToken) -> Option<AbilityState> {
        self.records.get(token).map(|record| record.state)
    }

    /// Mission hosting `token`, if the record still has one.
    fn mission_of(&self, token: AbilityToken) -> Option<MissionKey> {
        self.records
            .get(token)
            .and_then(|record| record.mission)
            .filter(|key| self.missions.contains(*key))
    }

    fn mission_id_of(&self, token: AbilityToken) -> Option<i32> {
        self.mission_of(token)
            .and_then(|key| self.missions.get(key))
            .map(|mission| mission.mission_id)
    }

    fn list_of(&self, mission: MissionKey) -> Option<ListKey> {
        self.missions
            .get(mission)
            .and_then(|mission| mission.list)
            .filter(|list| self.lists.contains(*list))
    }

    fn list_type(&self, list: ListKey) -> Option<MissionListType> {
        self.lists.get(list).map(MissionList::list_type)
    }

    fn is_in_mission_lists(&self, token: AbilityToken) -> bool {
        self.mission_of(token)
            .and_then(|mission| self.list_of(mission))
            .is_some()
    }

    fn is_transitioning_to_foreground(&self, token: AbilityToken) -> bool {
        self.records.get(token).is_some_and(|record| {
            record.state == AbilityState::Foregrounding
                || (record.state == AbilityState::Initial && record.loading)
        })
    }

    fn next_event_id(&mut self) -> u64 {
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        event_id
    }

    /// Wall-clock milliseconds, strictly increasing across calls.
    fn stamp_ms(&mut self) -> u64 {
        let now = current_unix_timestamp_ms().max(self.last_stamp_ms + 1);
        self.last_stamp_ms = now;
        now
    }

    fn create_record(&mut self, request: &AbilityRequest) -> AbilityToken {
        let record_id = self.next_record_id;
        self.next_record_id += 1;
        self.records
            .insert_with(|token| AbilityRecord::from_request(token, record_id, request))
    }

    fn create_mission(
        &mut self,
        mission_id: i32,
        mission_name: String,
        is_singleton: bool,
        ability: AbilityToken,
    ) -> MissionKey {
        let key = self
            .missions
            .insert(Mission::new(mission_id, mission_name, is_singleton, ability));
        if let Some(record) = self.records.get_mut(ability) {
            record.mission = Some(key);
        }
        key
    }

    fn create_current_list(&mut self) -> ListKey {
        self.lists.insert(MissionList::new(MissionListType::Current))
    }

    /// Puts `mission` on top of `list`, detaching it from any other list first.
    fn add_mission_to_top(&mut self, list: ListKey, mission: MissionKey) {
        if let Some(previous) = self.list_of(mission) {
            if previous != list {
                if let Some(previous_list) = self.lists.get_mut(previous) {
                    previous_list.remove(mission);
                }
            }
        }
        let Some(target) = self.lists.get_mut(list) else {
            tracing::error!(%list, "target mission list vanished");
            return;
        };
        target.add_to_top(mission);
        if let Some(entry) = self.missions.get_mut(mission) {
            entry.list = Some(list);
        }
    }

    /// Removes `mission` from its list and returns that list.
    fn detach_mission(&mut self, mission: MissionKey) -> Option<ListKey> {
        let list = self.list_of(mission)?;
        if let Some(entry) = self.lists.get_mut(list) {
            entry.remove(mission);
        }
        if let Some(entry) = self.missions.get_mut(mission) {
            entry.list = None;
        }
        Some(list)
    }

    /// Drops an empty Current list from the MRU order. Other list types are never removed.
    fn drop_list_if_empty(&mut self, list: ListKey) {
        let removable = self.lists.get(list).is_some_and(|entry| {
            entry.list_type() == MissionListType::Current && entry.is_empty()
        });
        if !removable {
            return;
        }
        self.current_lists.retain(|candidate| *candidate != list);
        self.lists.remove(list);
    }

    fn move_list_to_top(&mut self, list: ListKey) {
        if self.current_lists.front() == Some(&list) {
            return;
        }
        self.current_lists.retain(|candidate| *candidate != list);
        self.current_lists.push_front(list);
    }

    /// Frees a freshly created Current list that never received a mission.
    fn discard_orphan_list(&mut self, list: ListKey) {
        let orphan = self.lists.get(list).is_some_and(|entry| {
            entry.list_type() == MissionListType::Current && entry.is_empty()
        }) && !self.current_lists.contains(&list);
        if orphan {
            self.lists.remove(list);
        }
    }

    /// Releases the record and the mission it hosts.
    fn destroy_record(&mut self, token: AbilityToken) {
        self.terminate_list.retain(|entry| *entry != token);
        if let Some(mission) = self.mission_of(token) {
            let owned = self
                .missions
                .get(mission)
                .is_some_and(|entry| entry.ability == token);
            if owned {
                if let Some(list) = self.detach_mission(mission) {
                    self.drop_list_if_empty(list);
                }
                self.missions.remove(mission);
            }
        }
        self.records.remove(token);
    }

    fn post_start_waiting(&self) {
        self.scheduler.post_named_task(
            START_WAITING_TASK,
            ManagerTask::StartWaitingAbility,
            self.config.next_ability_delay(),
        );
    }

    fn update_mission_time(&mut self, mission_id: i32) {
        if mission_id <= 0 {
            return;
        }
        let stamp = self.stamp_ms();
        match self.store.update_mission_time(mission_id, stamp) {
            Ok(()) | Err(MissionStoreError::NotFound(_)) => {}
            Err(error) => tracing::warn!(mission_id, %error, "failed to update mission time"),
        }
    }

    fn mark_mission_not_running(&mut self, mission_id: i32) {
        if mission_id <= 0 {
            return;
        }
        let stamp = self.stamp_ms();
        let result = self.store.get_mission_info(mission_id).and_then(|info| match info {
            Some(mut info) => {
                info.running_state = MISSION_NOT_RUNNING;
                info.updated_unix_ms = stamp;
                self.store.update_mission_info(info)
            }
            None => Ok(()),
        });
        if let Err(error) = result {
            tracing::warn!(mission_id, %error, "failed to mark mission not running");
        }
    }

    fn delete_mission_info_and_notify(&mut self, mission_id: i32) {
        if mission_id <= 0 {
            return;
        }
        match self.store.delete_mission_info(mission_id) {
            Ok(_) => self.listeners.notify_destroyed(mission_id),
            Err(error) => tracing::warn!(mission_id, %error, "failed to delete mission info"),
        }
    }
}
