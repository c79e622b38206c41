use std::sync::Arc;

use mission_core::{AbilityRequest, AbilityToken};
use mission_store::{MissionInfo, MISSION_RUNNING};

use super::MissionListManager;
use crate::ability_record::{AbilityState, StartOptions};
use crate::collaborators::MissionListener;
use crate::error::{MissionError, MissionResult, PolicyDenial};
use crate::mission::MissionKey;
use crate::mission_list::{ListKey, MissionListType};

impl MissionListManager {
    /// Brings mission `mission_id` to the front, restoring it from persistence if needed.
    #[tracing::instrument(level = "debug", skip(self, options))]
    pub fn move_mission_to_front(
        &mut self,
        mission_id: i32,
        options: Option<StartOptions>,
    ) -> MissionResult<()> {
        self.move_mission_to_front_with(mission_id, true, options)
    }

    pub(super) fn move_mission_to_front_with(
        &mut self,
        mission_id: i32,
        from_launcher: bool,
        options: Option<StartOptions>,
    ) -> MissionResult<()> {
        let (target, mission) = self.target_list_by_mission_id(mission_id)?;
        self.move_mission_to_target_list(from_launcher, target, mission);
        self.move_list_to_top(target);
        self.update_mission_time(mission_id);

        let token = self
            .missions
            .get(mission)
            .map(|entry| entry.ability)
            .ok_or_else(|| MissionError::Inconsistent("promoted mission vanished".to_string()))?;
        self.require_record_mut(token)?.start_options = options;
        self.process_foreground_ability(token)?;
        if let Some(entry) = self.missions.get_mut(mission) {
            entry.moving = true;
        }
        Ok(())
    }

    fn target_list_by_mission_id(&mut self, mission_id: i32) -> MissionResult<(ListKey, MissionKey)> {
        if mission_id <= 0 {
            return Err(MissionError::InvalidMissionId(mission_id));
        }
        if let Some(mission) = self.find_mission_by_id(mission_id) {
            let list = self.list_of(mission).ok_or_else(|| {
                MissionError::Inconsistent(format!("mission {mission_id} has no list"))
            })?;
            let list_type = self
                .list_type(list)
                .ok_or_else(|| MissionError::Inconsistent("mission list vanished".to_string()))?;
            return match list_type {
                MissionListType::Launcher => {
                    Err(MissionError::Denied(PolicyDenial::LauncherMission))
                }
                MissionListType::Current => Ok((list, mission)),
                MissionListType::DefaultStandard | MissionListType::DefaultSingleton => {
                    Ok((self.create_current_list(), mission))
                }
            };
        }

        let mut info = self
            .store
            .get_mission_info(mission_id)?
            .ok_or(MissionError::MissionNotFound(mission_id))?;
        tracing::info!(mission_id, "restoring mission from persisted info");
        let mut request = AbilityRequest::new(info.ability_info.clone(), info.app_info.clone());
        request.want = info.want.clone();
        request.specified_flag = info.specified_flag.clone();
        let token = self.create_record(&request);
        let mission = self.create_mission(
            info.id,
            info.mission_name.clone(),
            info.is_singleton,
            token,
        );
        if let Some(entry) = self.missions.get_mut(mission) {
            entry.locked = info.locked;
        }
        if let Some(record) = self.records.get_mut(token) {
            record.specified_flag = info.specified_flag.clone();
        }
        info.running_state = MISSION_RUNNING;
        if let Err(error) = self.store.update_mission_info(info) {
            tracing::warn!(mission_id, %error, "failed to mark restored mission running");
        }
        self.listeners.notify_created(mission_id);
        Ok((self.create_current_list(), mission))
    }

    /// Removes mission `mission_id` and its persisted info.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn clear_mission(&mut self, mission_id: i32) -> MissionResult<()> {
        if mission_id < 0 {
            return Err(MissionError::InvalidMissionId(mission_id));
        }
        let Some(mission) = self.find_mission_by_id(mission_id) else {
            let persisted = self.store.get_mission_info(mission_id)?;
            return match persisted {
                Some(info) if info.locked => Err(MissionError::Denied(PolicyDenial::MissionLocked)),
                Some(_) => {
                    self.delete_mission_info_and_notify(mission_id);
                    Ok(())
                }
                None => Err(MissionError::MissionNotFound(mission_id)),
            };
        };
        if self.list_of(mission) == Some(self.launcher_list) {
            return Err(MissionError::Denied(PolicyDenial::LauncherMission));
        }
        if self.missions.get(mission).is_some_and(|entry| entry.locked) {
            return Err(MissionError::Denied(PolicyDenial::MissionLocked));
        }
        self.clear_mission_locked(mission, true)
    }

    /// Clears every unlocked mission outside the launcher list; foreground ones go last.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn clear_all_missions(&mut self) -> MissionResult<()> {
        let removed = self.store.delete_unlocked_mission_infos()?;
        for mission_id in removed {
            self.listeners.notify_destroyed(mission_id);
        }

        let mut lists = vec![self.default_standard_list, self.default_single_list];
        lists.extend(
            self.current_lists
                .iter()
                .copied()
                .filter(|list| *list != self.launcher_list),
        );
        let candidates = lists
            .into_iter()
            .filter_map(|list| self.lists.get(list))
            .flat_map(|list| list.missions().collect::<Vec<_>>())
            .collect::<Vec<_>>();

        let mut foreground = Vec::new();
        for mission in candidates {
            let Some(entry) = self.missions.get(mission) else {
                continue;
            };
            if entry.locked {
                continue;
            }
            let active = self
                .state_of(entry.ability)
                .is_some_and(AbilityState::is_foreground_like);
            if active {
                foreground.push(mission);
                continue;
            }
            if let Err(error) = self.clear_mission_locked(mission, false) {
                tracing::warn!(%error, "failed to clear mission");
            }
        }
        for mission in foreground {
            if let Err(error) = self.clear_mission_locked(mission, false) {
                tracing::warn!(%error, "failed to clear foreground mission");
            }
        }
        Ok(())
    }

    fn clear_mission_locked(&mut self, mission: MissionKey, delete_info: bool) -> MissionResult<()> {
        let (mission_id, token) = self
            .missions
            .get(mission)
            .map(|entry| (entry.mission_id, entry.ability))
            .ok_or_else(|| MissionError::Inconsistent("cleared mission vanished".to_string()))?;
        let terminating = self
            .records
            .get(token)
            .map_or(true, |record| record.terminating);
        if terminating {
            if delete_info {
                self.delete_mission_info_and_notify(mission_id);
            }
            return Ok(());
        }
        if let Some(entry) = self.missions.get_mut(mission) {
            entry.clear_requested = delete_info;
        }
        self.require_record_mut(token)?.terminating = true;
        self.terminate_ability_locked(token)
    }

    /// Updates the lock flag in memory and in the persisted info.
    pub fn set_mission_locked_state(&mut self, mission_id: i32, locked: bool) -> MissionResult<()> {
        if mission_id < 0 {
            return Err(MissionError::InvalidMissionId(mission_id));
        }
        if let Some(mission) = self.find_mission_by_id(mission_id) {
            if let Some(entry) = self.missions.get_mut(mission) {
                entry.locked = locked;
            }
        }
        let mut info = self
            .store
            .get_mission_info(mission_id)?
            .ok_or(MissionError::MissionNotFound(mission_id))?;
        info.locked = locked;
        self.store.update_mission_info(info)?;
        Ok(())
    }

    /// Returns at most `num_max` persisted missions, most recently used first.
    pub fn get_mission_infos(&self, num_max: i32) -> MissionResult<Vec<MissionInfo>> {
        let limit = usize::try_from(num_max)
            .map_err(|_| MissionError::InvalidArgument(format!("num_max {num_max}")))?;
        Ok(self.store.list_mission_infos(limit)?)
    }

    pub fn get_mission_info(&self, mission_id: i32) -> MissionResult<MissionInfo> {
        if mission_id <= 0 {
            return Err(MissionError::InvalidMissionId(mission_id));
        }
        self.store
            .get_mission_info(mission_id)?
            .ok_or(MissionError::MissionNotFound(mission_id))
    }

    /// Returns false when `listener` was already registered.
    pub fn register_mission_listener(&mut self, listener: Arc<dyn MissionListener>) -> bool {
        self.listeners.register(listener)
    }

    pub fn unregister_mission_listener(&mut self, listener: &Arc<dyn MissionListener>) -> bool {
        self.listeners.unregister(listener)
    }

    pub fn set_mission_label(&mut self, token: AbilityToken, label: &str) -> MissionResult<()> {
        let mission_id = self
            .mission_id_of(token)
            .filter(|mission_id| *mission_id > 0)
            .ok_or(MissionError::InvalidToken(token))?;
        self.store.update_mission_label(mission_id, label)?;
        Ok(())
    }

    pub fn get_mission_id_by_ability_token(&self, token: AbilityToken) -> Option<i32> {
        self.mission_id_of(token)
    }

    pub fn get_ability_token_by_mission_id(&self, mission_id: i32) -> Option<AbilityToken> {
        self.find_mission_by_id(mission_id)
            .and_then(|mission| self.missions.get(mission))
            .map(|mission| mission.ability)
    }

    /// Forgets everything owned by `bundle_name` under `uid`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn uninstall_app(&mut self, bundle_name: &str, uid: i32) {
        let tokens = self
            .records
            .iter()
            .filter(|(_, record)| record.bundle_name() == bundle_name && record.uid() == uid)
            .map(|(token, _)| token)
            .collect::<Vec<_>>();
        for token in tokens {
            if let Some(record) = self.records.get_mut(token) {
                record.uninstalled = true;
            }
        }

        match self.store.delete_bundle_mission_infos(bundle_name, uid) {
            Ok(removed) => {
                for mission_id in removed {
                    self.listeners.notify_destroyed(mission_id);
                }
            }
            Err(error) => tracing::warn!(%error, "failed to delete uninstalled bundle infos"),
        }

        let before = self.waiting_queue.len();
        self.waiting_queue.retain(|request| {
            !(request.ability_info.bundle_name == bundle_name && request.app_info.uid == uid)
        });
        let dropped = before - self.waiting_queue.len();
        if dropped > 0 {
            tracing::info!(dropped, "dropped waiting requests of uninstalled bundle");
        }
    }
}
