use mission_core::{AbilityToken, Want};

use super::MissionListManager;
use crate::ability_record::{AbilityResult, AbilityState};
use crate::collaborators::{ManagerTask, TimeoutKind};
use crate::error::{MissionError, MissionResult, PolicyDenial};

impl MissionListManager {
    /// Terminates the ability behind `token`, optionally saving a result for its callers.
    #[tracing::instrument(level = "debug", skip(self, result_want))]
    pub fn terminate_ability(
        &mut self,
        token: AbilityToken,
        result_code: i32,
        result_want: Option<Want>,
    ) -> MissionResult<()> {
        let record = self.require_record(token)?;
        if record.launcher_root {
            tracing::warn!(%token, "refusing to terminate the launcher root");
            return Err(MissionError::Denied(PolicyDenial::LauncherRoot));
        }
        let locked = self
            .mission_of(token)
            .and_then(|key| self.missions.get(key))
            .is_some_and(|mission| mission.locked);
        if locked {
            return Err(MissionError::Denied(PolicyDenial::MissionLocked));
        }

        if record.terminating {
            if record.state.is_foreground_like() {
                tracing::warn!(%token, "ability already terminating while foreground, forcing close");
                self.driver.force_kill(record);
                if let Some(record) = self.records.get_mut(token) {
                    record.state = AbilityState::Terminating;
                }
                if !self.terminate_list.contains(&token) {
                    self.terminate_list.push(token);
                }
                self.scheduler.post_task(ManagerTask::CompleteTerminate(token));
            }
            return Ok(());
        }
        if !self.is_in_mission_lists(token) {
            tracing::debug!(%token, "ability already left its mission list");
            return Ok(());
        }

        self.require_record_mut(token)?.terminating = true;
        if let Some(want) = result_want {
            self.save_result_to_callers(token, result_code, want);
        }
        self.terminate_ability_locked(token)
    }

    /// Terminates the ability `caller` started with `request_code`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn terminate_ability_by_caller(
        &mut self,
        caller: AbilityToken,
        request_code: i32,
    ) -> MissionResult<()> {
        let target = self
            .search_order()
            .into_iter()
            .filter_map(|list| self.lists.get(list))
            .flat_map(|list| list.missions())
            .filter_map(|mission| self.missions.get(mission))
            .map(|mission| mission.ability)
            .find(|token| {
                self.records
                    .get(*token)
                    .is_some_and(|record| record.is_started_by(caller, request_code))
            })
            .ok_or(MissionError::NotFoundByCaller {
                caller,
                request_code,
            })?;
        let visible = self
            .records
            .get(target)
            .is_some_and(|record| record.ability_info.visible);
        if !visible {
            return Err(MissionError::Denied(PolicyDenial::InvisibleAbility));
        }
        self.terminate_ability(target, -1, None)
    }

    pub(super) fn terminate_ability_locked(&mut self, token: AbilityToken) -> MissionResult<()> {
        self.remove_terminating_ability(token);
        self.send_result_to_callers(token);

        let record = self.require_record(token)?;
        match record.state {
            AbilityState::Foreground | AbilityState::Foregrounding => {
                let next = record
                    .next_ability
                    .filter(|next| self.records.contains(*next));
                match next {
                    Some(next) if self.state_of(next) != Some(AbilityState::Foreground) => {
                        if let Some(next_record) = self.records.get_mut(next) {
                            next_record.pre_ability = Some(token);
                        }
                        if let Err(error) = self.process_foreground_ability(next) {
                            tracing::warn!(
                                %token,
                                %next,
                                %error,
                                "successor failed to come forward, backgrounding departing ability"
                            );
                            self.move_to_background(token);
                        }
                    }
                    _ => self.move_to_background(token),
                }
            }
            AbilityState::Background => self.schedule_terminate(token),
            AbilityState::Backgrounding | AbilityState::Terminating => {}
            AbilityState::Initial => {
                // The process never finished loading.
                let event_id = record.event_id;
                self.scheduler.remove_event(TimeoutKind::Load, event_id);
                if let Some(record) = self.records.get(token) {
                    self.driver.request_terminate(record);
                }
                if let Some(record) = self.records.get_mut(token) {
                    record.state = AbilityState::Terminating;
                }
                self.finish_terminated_record(token);
            }
        }
        Ok(())
    }

    /// Detaches the record's mission and picks the ability that takes over foreground.
    fn remove_terminating_ability(&mut self, token: AbilityToken) {
        let Some(mission) = self.mission_of(token) else {
            tracing::error!(%token, "terminating ability has no mission");
            return;
        };
        let Some(list) = self.detach_mission(mission) else {
            tracing::error!(%token, "terminating ability's mission has no list");
            return;
        };
        if !self.terminate_list.contains(&token) {
            self.terminate_list.push(token);
        }
        let was_foreground = self
            .state_of(token)
            .is_some_and(AbilityState::is_foreground_like);
        let list_top = self
            .lists
            .get(list)
            .and_then(|entry| entry.top())
            .and_then(|key| self.missions.get(key))
            .map(|mission| mission.ability);
        self.drop_list_if_empty(list);

        if let Some(record) = self.records.get_mut(token) {
            record.next_ability = None;
        }
        if !was_foreground {
            return;
        }

        let mut next = list_top.or_else(|| self.current_top_ability());
        let is_recents = next
            .and_then(|candidate| self.records.get(candidate))
            .is_some_and(|record| {
                self.config
                    .is_launcher_recents(record.bundle_name(), record.ability_name())
            });
        if is_recents {
            tracing::debug!("next ability is recents, redirecting to launcher root");
            next = self.launcher_root();
            if let Some(root) = next {
                if let Some(root_mission) = self.mission_of(root) {
                    self.add_mission_to_top(self.launcher_list, root_mission);
                }
                self.move_list_to_top(self.launcher_list);
            }
        }
        if let Some(record) = self.records.get_mut(token) {
            record.next_ability = next.filter(|candidate| *candidate != token);
        }
    }

    fn save_result_to_callers(&mut self, token: AbilityToken, result_code: i32, want: Want) {
        let callers = self
            .records
            .get(token)
            .map(|record| record.callers.clone())
            .unwrap_or_default();
        for caller in callers {
            if let Some(caller_record) = self.records.get_mut(caller.caller) {
                caller_record.result = Some(AbilityResult {
                    request_code: caller.request_code,
                    result_code,
                    want: want.clone(),
                });
            }
        }
    }

    fn send_result_to_callers(&mut self, token: AbilityToken) {
        let callers = self
            .records
            .get(token)
            .map(|record| record.callers.clone())
            .unwrap_or_default();
        for caller in callers {
            let Some(caller_record) = self.records.get_mut(caller.caller) else {
                continue;
            };
            let Some(result) = caller_record.result.take() else {
                continue;
            };
            if let Some(caller_record) = self.records.get(caller.caller) {
                self.driver.send_result(caller_record, &result);
            }
        }
    }
}
