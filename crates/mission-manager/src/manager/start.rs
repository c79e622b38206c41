use mission_core::{AbilityRequest, AbilityToken, LaunchMode};
use mission_store::{MissionInfo, MISSION_RUNNING};

use super::{MissionListManager, StartOutcome};
use crate::ability_record::{AbilityState, LaunchReason};
use crate::collaborators::{ManagerTask, TimeoutKind, SPECIFIED_TIMEOUT_TASK};
use crate::error::{MissionError, MissionResult};
use crate::mission::MissionKey;
use crate::mission_list::{ListKey, MissionListType};

impl MissionListManager {
    /// Starts (or reuses) the ability described by `request`.
    #[tracing::instrument(level = "debug", skip(self, request), fields(element = %request.want.element))]
    pub fn start_ability(&mut self, request: AbilityRequest) -> MissionResult<StartOutcome> {
        let top = self.current_top_ability();
        let caller = self.resolve_caller(request.caller);
        let top_busy = top.is_some_and(|token| self.is_transitioning_to_foreground(token));
        let caller_busy = caller
            .is_some_and(|token| self.state_of(token) == Some(AbilityState::Foregrounding));
        if top_busy || caller_busy {
            tracing::info!("foreground transition in flight, queueing start request");
            self.waiting_queue.push_back(request);
            return Ok(StartOutcome::Queued);
        }
        self.start_ability_with(top, caller, request)
    }

    fn resolve_caller(&self, caller: Option<AbilityToken>) -> Option<AbilityToken> {
        let caller = caller?;
        if self.records.contains(caller) {
            Some(caller)
        } else {
            tracing::warn!(%caller, "caller token no longer resolves, starting without caller");
            None
        }
    }

    pub(super) fn start_ability_with(
        &mut self,
        top: Option<AbilityToken>,
        caller: Option<AbilityToken>,
        request: AbilityRequest,
    ) -> MissionResult<StartOutcome> {
        if request.launch_mode() != LaunchMode::Specified || request.specified_flag.is_some() {
            return self.start_ability_locked(top, caller, request);
        }
        if self.specified_pending {
            tracing::info!("specified resolution in flight, queueing start request");
            self.waiting_queue.push_back(request);
            return Ok(StartOutcome::Queued);
        }
        self.driver
            .start_specified_ability(&request.want, &request.ability_info);
        self.waiting_queue.push_front(request);
        self.specified_pending = true;
        self.scheduler.post_named_task(
            SPECIFIED_TIMEOUT_TASK,
            ManagerTask::SpecifiedTimeout,
            self.config.specified_timeout(),
        );
        Ok(StartOutcome::PendingSpecified)
    }

    pub(super) fn start_ability_locked(
        &mut self,
        top: Option<AbilityToken>,
        caller: Option<AbilityToken>,
        request: AbilityRequest,
    ) -> MissionResult<StartOutcome> {
        let target_list = self.target_mission_list(caller, &request)?;
        let (mission, token) = match self.target_mission_and_ability(&request) {
            Ok(found) => found,
            Err(error) => {
                self.discard_orphan_list(target_list);
                return Err(error);
            }
        };

        let from_launcher = caller
            .and_then(|caller| self.records.get(caller))
            .is_some_and(|record| record.is_launcher_ability());
        let launcher_main = self
            .config
            .is_launcher_main(&request.ability_info.bundle_name, &request.ability_info.name);
        let mark_root = launcher_main && self.launcher_root().is_none();
        {
            let record = self.require_record_mut(token)?;
            record.launch_reason = if request.continuation {
                LaunchReason::Continuation
            } else {
                LaunchReason::StartAbility
            };
            if let Some(caller) = caller {
                record.add_caller(caller, request.request_code);
            }
        }

        self.move_mission_to_target_list(from_launcher, target_list, mission);
        self.move_list_to_top(target_list);

        let state = self.require_record(token)?.state;
        if !launcher_main && state.is_foreground_like() {
            tracing::debug!(%token, "target ability already foreground");
            self.post_start_waiting();
            return Ok(StartOutcome::Started);
        }

        if mark_root || (top.is_none() && request.is_launcher_app()) {
            self.require_record_mut(token)?.launcher_root = true;
        }
        if top.is_none() {
            self.load_ability(token)?;
        } else {
            self.process_foreground_ability(token)?;
        }
        Ok(StartOutcome::Started)
    }

    /// Chooses the list the target mission should live in.
    fn target_mission_list(
        &mut self,
        caller: Option<AbilityToken>,
        request: &AbilityRequest,
    ) -> MissionResult<ListKey> {
        if request.is_launcher_app() {
            return Ok(self.launcher_list);
        }
        let Some(caller) = caller else {
            return Ok(self.create_current_list());
        };
        let caller_is_launcher = self
            .records
            .get(caller)
            .is_some_and(|record| record.is_launcher_ability());
        if caller_is_launcher {
            return Ok(self.target_list_by_launcher(request));
        }
        self.target_list_by_default(caller)
    }

    fn target_list_by_launcher(&mut self, request: &AbilityRequest) -> ListKey {
        let reused_list = self
            .reused_mission(request)
            .and_then(|mission| self.list_of(mission))
            .filter(|list| self.list_type(*list) == Some(MissionListType::Current));
        match reused_list {
            Some(list) => list,
            None => self.create_current_list(),
        }
    }

    fn target_list_by_default(&mut self, caller: AbilityToken) -> MissionResult<ListKey> {
        let caller_mission = self
            .mission_of(caller)
            .ok_or(MissionError::TargetListUnavailable("caller has no mission"))?;
        let caller_list = self
            .list_of(caller_mission)
            .ok_or(MissionError::TargetListUnavailable("caller has no mission list"))?;
        let caller_list_type = self
            .list_type(caller_list)
            .ok_or(MissionError::TargetListUnavailable("caller mission list vanished"))?;
        if !caller_list_type.is_default() {
            return Ok(caller_list);
        }
        // Caller sits in a default list: promote it into a fresh Current list.
        let fresh = self.create_current_list();
        self.add_mission_to_top(fresh, caller_mission);
        Ok(fresh)
    }

    /// Singleton mission already running for `request`, if any.
    pub(super) fn reused_mission(&self, request: &AbilityRequest) -> Option<MissionKey> {
        if request.launch_mode() != LaunchMode::Singleton {
            return None;
        }
        let mission_name = request.mission_name();
        let mut lists = Vec::with_capacity(self.current_lists.len() + 2);
        if request.is_launcher_app() {
            lists.push(self.launcher_list);
        }
        lists.extend(self.current_lists.iter().copied());
        lists.push(self.default_single_list);
        lists
            .into_iter()
            .filter_map(|list| self.lists.get(list))
            .flat_map(|list| list.missions())
            .find(|key| {
                self.missions.get(*key).is_some_and(|mission| {
                    mission.is_singleton && mission.mission_name == mission_name
                })
            })
    }

    /// Resolves the mission and record for `request`, creating both when nothing is reusable.
    pub(super) fn target_mission_and_ability(
        &mut self,
        request: &AbilityRequest,
    ) -> MissionResult<(MissionKey, AbilityToken)> {
        if let Some(mission) = self.reused_mission(request) {
            tracing::debug!("reusing running singleton mission");
            let token = self
                .missions
                .get(mission)
                .map(|entry| entry.ability)
                .ok_or_else(|| MissionError::Inconsistent("reused mission vanished".to_string()))?;
            let record = self.require_record_mut(token)?;
            record.want = request.want.clone();
            record.new_want = true;
            return Ok((mission, token));
        }

        let is_singleton = request.launch_mode() == LaunchMode::Singleton;
        let mission_name = request.mission_name();
        let reused_info = if is_singleton && !request.is_launcher_app() {
            match self.store.find_reused_singleton(&mission_name) {
                Ok(info) => info.filter(|info| info.id > 0),
                Err(error) => {
                    tracing::warn!(%error, "failed to look up reusable singleton info");
                    None
                }
            }
        } else {
            None
        };
        let mission_id = match &reused_info {
            Some(info) => info.id,
            None => self
                .store
                .generate_mission_id()
                .map_err(MissionError::MissionIdUnavailable)?,
        };

        let token = self.create_record(request);
        let mission = self.create_mission(mission_id, mission_name.clone(), is_singleton, token);
        if request.launch_mode() == LaunchMode::Specified {
            self.require_record_mut(token)?.specified_flag = request.specified_flag.clone();
        }
        if request.is_launcher_app() {
            return Ok((mission, token));
        }

        let stamp = self.stamp_ms();
        let label = reused_info
            .as_ref()
            .map(|info| info.label.clone())
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| request.app_info.label.clone());
        let info = MissionInfo {
            id: mission_id,
            mission_name,
            is_singleton,
            label,
            icon_path: request.app_info.icon_path.clone(),
            running_state: MISSION_RUNNING,
            locked: reused_info.as_ref().is_some_and(|info| info.locked),
            continuable: request.ability_info.continuable,
            updated_unix_ms: stamp,
            want: request.want.clone(),
            ability_info: request.ability_info.clone(),
            app_info: request.app_info.clone(),
            specified_flag: request.specified_flag.clone(),
        };
        if let Some(entry) = self.missions.get_mut(mission) {
            entry.locked = info.locked;
        }
        if reused_info.is_some() {
            if let Err(error) = self.store.update_mission_info(info) {
                tracing::warn!(mission_id, %error, "failed to update reused mission info");
            }
        } else {
            match self.store.add_mission_info(info) {
                Ok(()) => self.listeners.notify_created(mission_id),
                Err(error) => tracing::warn!(mission_id, %error, "failed to add mission info"),
            }
        }
        Ok((mission, token))
    }

    /// Places `mission` into `target`, demoting displaced missions where required.
    pub(super) fn move_mission_to_target_list(
        &mut self,
        from_launcher: bool,
        target: ListKey,
        mission: MissionKey,
    ) {
        let Some(source) = self.list_of(mission) else {
            self.add_mission_to_top(target, mission);
            return;
        };

        if from_launcher && target == self.launcher_list {
            self.add_mission_to_top(target, mission);
            self.note_launcher_stack_growth();
            return;
        }

        if self
            .list_type(source)
            .is_some_and(MissionListType::is_default)
        {
            self.add_mission_to_top(target, mission);
            return;
        }

        if source != target || from_launcher {
            self.demote_missions_above(source, mission);
        }
        self.add_mission_to_top(target, mission);
        if source != target {
            self.drop_list_if_empty(source);
        }
    }

    /// Parks every mission above `mission` in `list` into the default list matching
    /// its own launch mode.
    fn demote_missions_above(&mut self, list: ListKey, mission: MissionKey) {
        let displaced = match self.lists.get_mut(list) {
            Some(entry) => entry.split_off_above(mission),
            None => return,
        };
        for displaced_mission in displaced {
            let singleton = match self.missions.get_mut(displaced_mission) {
                Some(entry) => {
                    entry.list = None;
                    entry.is_singleton
                }
                None => continue,
            };
            let default_list = if singleton {
                self.default_single_list
            } else {
                self.default_standard_list
            };
            self.add_mission_to_top(default_list, displaced_mission);
        }
    }

    /// The launcher list is expected to hold the root and at most one further mission.
    fn note_launcher_stack_growth(&self) {
        let len = self.lists.get(self.launcher_list).map_or(0, |list| list.len());
        if len > 2 {
            tracing::debug!(len, "launcher mission list holds more than two missions");
        }
    }

    /// Drains one waiting request once the current top is foreground.
    pub(super) fn start_waiting_ability(&mut self) {
        if self.specified_pending {
            tracing::debug!("specified resolution in flight, waiting queue stays");
            return;
        }
        let Some(top) = self.current_top_ability() else {
            return;
        };
        if self.state_of(top) != Some(AbilityState::Foreground) {
            return;
        }
        let Some(request) = self.waiting_queue.pop_front() else {
            return;
        };
        let caller = self.resolve_caller(request.caller);
        if let Err(error) = self.start_ability_with(Some(top), caller, request) {
            tracing::warn!(%error, code = error.code(), "failed to start waiting ability");
        }
    }

    /// The owning application chose a specified instance for the pending request.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn on_accept_want_response(&mut self, flag: &str) -> MissionResult<()> {
        self.scheduler.remove_task(SPECIFIED_TIMEOUT_TASK);
        self.specified_pending = false;
        let Some(mut request) = self.waiting_queue.pop_front() else {
            tracing::warn!("specified response without a pending request");
            return Ok(());
        };
        let top = self.current_top_ability();
        let caller = self.resolve_caller(request.caller);

        if !flag.is_empty() {
            if let Some(mission) = self.find_mission_by_specified_flag(&request, flag) {
                let (mission_id, token) = match self.missions.get(mission) {
                    Some(entry) => (entry.mission_id, entry.ability),
                    None => return Err(MissionError::Inconsistent("specified mission vanished".to_string())),
                };
                {
                    let record = self.require_record_mut(token)?;
                    record.want = request.want.clone();
                    record.new_want = true;
                }
                let from_launcher = caller
                    .and_then(|caller| self.records.get(caller))
                    .is_some_and(|record| record.is_launcher_ability());
                return self.move_mission_to_front_with(mission_id, from_launcher, None);
            }
        }

        request.specified_flag = Some(flag.to_string());
        self.start_ability_locked(top, caller, request).map(|_| ())
    }

    fn find_mission_by_specified_flag(
        &self,
        request: &AbilityRequest,
        flag: &str,
    ) -> Option<MissionKey> {
        self.search_order()
            .into_iter()
            .filter_map(|list| self.lists.get(list))
            .flat_map(|list| list.missions())
            .find(|key| {
                self.missions
                    .get(*key)
                    .and_then(|mission| self.records.get(mission.ability))
                    .is_some_and(|record| {
                        record.specified_flag.as_deref() == Some(flag)
                            && record.bundle_name() == request.ability_info.bundle_name
                            && record.ability_name() == request.ability_info.name
                    })
            })
    }

    pub(super) fn on_specified_timeout(&mut self) {
        self.specified_pending = false;
        match self.waiting_queue.pop_front() {
            Some(request) => tracing::warn!(
                element = %request.want.element,
                "specified resolution timed out, dropping request"
            ),
            None => tracing::debug!("specified timeout without pending request"),
        }
        self.post_start_waiting();
    }

    pub(super) fn process_foreground_ability(&mut self, token: AbilityToken) -> MissionResult<()> {
        let record = self.require_record_mut(token)?;
        if record.terminating {
            tracing::warn!(%token, "ability is terminating, not bringing it to foreground");
            return Ok(());
        }
        if !record.ready {
            if record.loading {
                return Ok(());
            }
            return self.load_ability(token);
        }
        match record.state {
            AbilityState::Backgrounding => {
                record.pending_foreground = true;
                Ok(())
            }
            AbilityState::Foregrounding | AbilityState::Terminating => Ok(()),
            AbilityState::Initial
            | AbilityState::Foreground
            | AbilityState::Background => {
                self.foreground_ability(token);
                Ok(())
            }
        }
    }

    /// Requests foreground and arms the foreground timeout.
    pub(super) fn foreground_ability(&mut self, token: AbilityToken) {
        let event_id = self.next_event_id();
        let Some(record) = self.records.get_mut(token) else {
            return;
        };
        if !record.transition_to(AbilityState::Foregrounding) {
            return;
        }
        record.event_id = event_id;
        self.scheduler.send_event(
            TimeoutKind::Foreground,
            event_id,
            self.config.foreground_timeout(),
        );
        if let Some(record) = self.records.get(token) {
            self.driver.request_foreground(record);
        }
    }

    /// Asks the driver to load the record's process and arms the load timeout.
    pub(super) fn load_ability(&mut self, token: AbilityToken) -> MissionResult<()> {
        let event_id = self.next_event_id();
        let stamp = self.stamp_ms();
        let record = self.require_record_mut(token)?;
        record.start_time_ms = stamp;
        record.loading = true;
        record.event_id = event_id;
        let launcher_app = record.is_launcher_ability();
        let timeout = self.config.load_timeout(launcher_app);
        self.scheduler.send_event(TimeoutKind::Load, event_id, timeout);

        let record = self.require_record(token)?;
        if self.driver.request_load(record, record.caller()) {
            return Ok(());
        }
        tracing::warn!(%token, "process driver refused to load ability");
        self.scheduler.remove_event(TimeoutKind::Load, event_id);
        if let Some(record) = self.records.get_mut(token) {
            record.loading = false;
        }
        Err(MissionError::Remote("load"))
    }
}
