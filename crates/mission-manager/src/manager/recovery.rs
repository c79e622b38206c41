use std::time::Duration;

use mission_core::{AbilityKind, AbilityToken};

use super::MissionListManager;
use crate::ability_record::AbilityState;
use crate::collaborators::{
    event_task_name, ManagerTask, TimeoutKind, CALLER_RESTART_TASK, LAUNCHER_RESTART_TASK,
    SPECIFIED_TIMEOUT_TASK,
};

impl MissionListManager {
    /// A load or foreground timeout armed for `event_id` fired.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn on_time_out(&mut self, kind: TimeoutKind, event_id: u64) {
        let Some(token) = self.listed_ability_by_event_id(event_id) else {
            tracing::debug!("timeout for an ability that already moved on");
            return;
        };
        let Some(record) = self.records.get(token) else {
            return;
        };
        match kind {
            TimeoutKind::Load => {
                if record.ready || !record.loading {
                    tracing::debug!(%token, "stale load timeout");
                    return;
                }
                tracing::warn!(%token, element = %record.want.element, "ability load timed out");
                self.handle_load_timeout(token);
            }
            TimeoutKind::Foreground => {
                if record.state != AbilityState::Foregrounding {
                    tracing::debug!(%token, "stale foreground timeout");
                    return;
                }
                tracing::warn!(%token, element = %record.want.element, "ability foreground timed out");
                self.handle_foreground_timeout(token);
            }
        }
    }

    fn listed_ability_by_event_id(&self, event_id: u64) -> Option<AbilityToken> {
        self.search_order()
            .into_iter()
            .filter_map(|list| self.lists.get(list))
            .flat_map(|list| list.missions())
            .filter_map(|mission| self.missions.get(mission))
            .map(|mission| mission.ability)
            .find(|token| {
                self.records
                    .get(*token)
                    .is_some_and(|record| record.event_id == event_id)
            })
    }

    fn handle_load_timeout(&mut self, token: AbilityToken) {
        let is_root = self
            .records
            .get(token)
            .is_some_and(|record| record.launcher_root);
        if is_root {
            if let Some(record) = self.records.get_mut(token) {
                record.restarting = true;
                record.loading = false;
            }
            if let Some(record) = self.records.get(token) {
                self.driver.force_kill(record);
            }
            self.delayed_start_launcher();
            return;
        }
        self.handle_timeout_and_resume(token);
    }

    fn handle_foreground_timeout(&mut self, token: AbilityToken) {
        if let Some(mission) = self
            .mission_of(token)
            .and_then(|key| self.missions.get_mut(key))
        {
            mission.moving = false;
        }
        let is_root = self
            .records
            .get(token)
            .is_some_and(|record| record.launcher_root);
        if is_root {
            if let Some(record) = self.records.get(token) {
                self.driver.force_kill(record);
            }
            self.delayed_start_launcher();
            return;
        }
        self.handle_timeout_and_resume(token);
    }

    /// Evicts an ability the driver never confirmed, then falls back to its caller or the launcher.
    fn handle_timeout_and_resume(&mut self, token: AbilityToken) {
        self.move_to_terminate_list(token);
        let Some(record) = self.records.get(token) else {
            return;
        };
        self.driver.force_kill(record);

        let is_launcher = record.is_launcher_ability();
        let resumable_caller = record
            .caller()
            .and_then(|caller| self.records.get(caller))
            .filter(|caller| {
                caller.kind() == AbilityKind::Page
                    && !caller.is_launcher_ability()
                    && !is_launcher
                    && !caller.terminating
            })
            .map(|caller| caller.token());
        match resumable_caller {
            Some(caller) => self.delayed_resume_caller(caller),
            None => self.delayed_start_launcher(),
        }
    }

    /// Moves an ability straight into the terminate list and arms the terminate guard.
    fn move_to_terminate_list(&mut self, token: AbilityToken) {
        if let Some(mission) = self.mission_of(token) {
            if let Some(list) = self.detach_mission(mission) {
                self.drop_list_if_empty(list);
            }
        }
        let event_id = self.next_event_id();
        let Some(record) = self.records.get_mut(token) else {
            return;
        };
        record.terminating = true;
        record.loading = false;
        record.pending_foreground = false;
        record.state = AbilityState::Terminating;
        record.event_id = event_id;
        if !self.terminate_list.contains(&token) {
            self.terminate_list.push(token);
        }
        self.scheduler.post_named_task(
            &event_task_name(event_id),
            ManagerTask::CompleteTerminate(token),
            self.config.terminate_timeout(),
        );
        if let Some(mission_id) = self.mission_id_of(token) {
            self.mark_mission_not_running(mission_id);
        }
    }

    fn delayed_start_launcher(&self) {
        self.scheduler.post_named_task(
            LAUNCHER_RESTART_TASK,
            ManagerTask::BackToLauncher,
            Duration::ZERO,
        );
    }

    fn delayed_resume_caller(&self, caller: AbilityToken) {
        self.scheduler.post_named_task(
            CALLER_RESTART_TASK,
            ManagerTask::BackToCaller(caller),
            Duration::ZERO,
        );
    }

    /// Brings the launcher root back to front unless something is already foreground.
    pub(super) fn back_to_launcher(&mut self) {
        if let Some(top) = self.current_top_ability() {
            if self.state_of(top).is_some_and(AbilityState::is_foreground_like) {
                tracing::debug!(%top, "top ability is in front, launcher stays behind");
                return;
            }
        }
        let Some(root) = self.launcher_root() else {
            tracing::error!("no launcher root to fall back to");
            return;
        };
        let max_restarts = self.config.max_launcher_restarts;
        let Some(record) = self.records.get_mut(root) else {
            return;
        };
        if record.state.is_foreground_like() {
            return;
        }
        if record.restarting {
            if record.restart_count >= max_restarts {
                tracing::error!(
                    restarts = record.restart_count,
                    "launcher restart budget exhausted"
                );
                return;
            }
            record.restart_count += 1;
        }

        self.waiting_queue.clear();
        if self.specified_pending {
            self.specified_pending = false;
            self.scheduler.remove_task(SPECIFIED_TIMEOUT_TASK);
        }
        if let Some(mission) = self.mission_of(root) {
            self.add_mission_to_top(self.launcher_list, mission);
        }
        self.move_list_to_top(self.launcher_list);
        if let Err(error) = self.process_foreground_ability(root) {
            tracing::error!(%error, "failed to bring launcher back");
        }
    }

    pub(super) fn back_to_caller(&mut self, caller: AbilityToken) {
        if let Some(top) = self.current_top_ability() {
            if self.state_of(top).is_some_and(AbilityState::is_foreground_like) {
                return;
            }
        }
        let Some(mission) = self.mission_of(caller) else {
            tracing::debug!(%caller, "caller went away, falling back to launcher");
            self.back_to_launcher();
            return;
        };
        let Some(list) = self.list_of(mission) else {
            self.back_to_launcher();
            return;
        };
        self.add_mission_to_top(list, mission);
        self.move_list_to_top(list);
        if let Err(error) = self.process_foreground_ability(caller) {
            tracing::warn!(%caller, %error, "failed to resume caller");
            self.back_to_launcher();
        }
    }

    /// The process hosting `token` died.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn on_ability_died(&mut self, token: AbilityToken, current_user_id: i32) {
        let Some(record) = self.records.get(token) else {
            tracing::warn!(%token, "death of an unknown ability");
            return;
        };
        match record.kind() {
            AbilityKind::Page => {}
            // Only page abilities are tracked in mission lists.
            AbilityKind::Service | AbilityKind::Data | AbilityKind::Extension => {
                tracing::warn!(%token, kind = record.kind().as_str(), "ignoring death of non-page ability");
                return;
            }
        }
        if record.launcher_root && current_user_id != self.config.user_id {
            if let Some(record) = self.records.get_mut(token) {
                record.reset_after_death();
                record.restarting = true;
            }
            return;
        }

        if self.terminate_list.contains(&token) {
            let event_id = record.event_id;
            self.scheduler.remove_task(&event_task_name(event_id));
            self.finish_terminated_record(token);
            return;
        }

        let event_id = record.event_id;
        let is_launcher = record.is_launcher_ability();
        self.scheduler.remove_event(TimeoutKind::Load, event_id);
        self.scheduler.remove_event(TimeoutKind::Foreground, event_id);
        self.scheduler.remove_task(&event_task_name(event_id));
        if is_launcher {
            self.handle_launcher_died(token);
        } else {
            self.handle_ability_died(token);
        }
    }

    fn handle_launcher_died(&mut self, token: AbilityToken) {
        let Some(mission) = self.mission_of(token) else {
            tracing::error!(%token, "dead launcher ability has no mission");
            return;
        };
        if self.list_of(mission) != Some(self.launcher_list) {
            tracing::error!(%token, "dead launcher ability is not in the launcher list");
            return;
        }
        let Some(record) = self.records.get_mut(token) else {
            return;
        };
        let was_foreground = record.state.is_foreground_like();
        if record.launcher_root {
            record.reset_after_death();
            record.restarting = true;
        } else {
            self.destroy_record(token);
        }
        if was_foreground {
            self.delayed_start_launcher();
        }
    }

    fn handle_ability_died(&mut self, token: AbilityToken) {
        let Some(mission) = self.mission_of(token) else {
            tracing::error!(%token, "dead ability has no mission");
            return;
        };
        if self.list_of(mission).is_none() {
            tracing::error!(%token, "dead ability's mission has no list");
            return;
        }
        let launcher_active = self
            .launcher_root()
            .and_then(|root| self.state_of(root))
            .is_some_and(|state| state == AbilityState::Foreground);
        let Some(record) = self.records.get_mut(token) else {
            return;
        };
        let was_foreground = record.state.is_foreground_like();
        let uninstalled = record.uninstalled;
        let (locked, mission_id) = self
            .missions
            .get(mission)
            .map_or((false, 0), |entry| (entry.locked, entry.mission_id));

        if locked && !uninstalled {
            tracing::info!(mission_id, "locked mission survives ability death");
            record.reset_after_death();
            self.mark_mission_not_running(mission_id);
        } else {
            if !uninstalled {
                self.mark_mission_not_running(mission_id);
            }
            self.destroy_record(token);
        }

        if was_foreground && !launcher_active {
            self.delayed_start_launcher();
        }
    }
}
