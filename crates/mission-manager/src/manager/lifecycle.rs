use std::collections::BTreeMap;

use mission_core::{current_unix_timestamp, AbilityToken};

use super::MissionListManager;
use crate::ability_record::{AbilityState, TransactionState};
use crate::collaborators::{event_task_name, ManagerTask, TimeoutKind};
use crate::error::{MissionError, MissionResult};

impl MissionListManager {
    /// The ability's process finished loading and is ready for lifecycle requests.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn attach_ability_thread(&mut self, token: AbilityToken) -> MissionResult<()> {
        let record = self.require_record_mut(token)?;
        let event_id = record.event_id;
        record.loading = false;
        record.ready = true;
        let to_background = record.start_to_background;
        self.scheduler.remove_event(TimeoutKind::Load, event_id);

        if to_background {
            self.move_to_background(token);
        } else {
            self.foreground_ability(token);
        }
        Ok(())
    }

    /// The process driver confirmed a lifecycle transaction.
    ///
    /// Confirmations that do not match the in-flight transition are rejected
    /// without touching state.
    #[tracing::instrument(level = "debug", skip(self, save_data))]
    pub fn ability_transaction_done(
        &mut self,
        token: AbilityToken,
        state: TransactionState,
        save_data: BTreeMap<String, String>,
    ) -> MissionResult<()> {
        let record = self.require_record_mut(token)?;
        let expected = match state {
            TransactionState::Initial => AbilityState::Terminating,
            TransactionState::Foreground => AbilityState::Foregrounding,
            TransactionState::Background => AbilityState::Backgrounding,
        };
        if record.state != expected {
            tracing::warn!(%token, expected = %expected, actual = %record.state, "stale transaction confirmation");
            return Err(MissionError::TransitionRejected {
                token,
                expected,
                actual: record.state,
            });
        }
        let event_id = record.event_id;
        match state {
            TransactionState::Initial => {
                self.scheduler.remove_task(&event_task_name(event_id));
                self.scheduler.post_task(ManagerTask::CompleteTerminate(token));
            }
            TransactionState::Foreground => {
                self.scheduler.remove_event(TimeoutKind::Foreground, event_id);
                self.scheduler.post_task(ManagerTask::CompleteForeground(token));
            }
            TransactionState::Background => {
                record.save_data = save_data;
                self.scheduler.remove_task(&event_task_name(event_id));
                self.scheduler.post_task(ManagerTask::CompleteBackground(token));
            }
        }
        Ok(())
    }

    pub(super) fn complete_foreground(&mut self, token: AbilityToken) {
        let Some(record) = self.records.get_mut(token) else {
            tracing::debug!(%token, "foreground completion for released ability");
            return;
        };
        if record.state != AbilityState::Foregrounding {
            tracing::warn!(%token, state = %record.state, "foreground completion in unexpected state");
            return;
        }
        record.state = AbilityState::Foreground;
        record.restarting = false;
        record.restart_count = 0;
        record.minimized_by_user = false;
        let pre_ability = record.pre_ability.take();
        let (bundle, ability, uid) = (
            record.ability_info.bundle_name.clone(),
            record.ability_info.name.clone(),
            record.app_info.uid,
        );
        self.driver
            .notify_lifecycle_reached(&bundle, &ability, current_unix_timestamp(), uid);

        let mission = self
            .mission_of(token)
            .and_then(|key| self.missions.get_mut(key))
            .map(|entry| (entry.mission_id, std::mem::take(&mut entry.moving)));
        if let Some((mission_id, was_moving)) = mission {
            self.update_mission_time(mission_id);
            if was_moving {
                self.listeners.notify_moved_to_front(mission_id);
            }
        }

        if let Some(previous) = pre_ability {
            self.terminate_previous_ability(previous);
        }
        self.flush_pending_calls(token);
        self.post_start_waiting();
    }

    /// Hands off from a terminating ability once its successor reached foreground.
    fn terminate_previous_ability(&mut self, previous: AbilityToken) {
        let Some(record) = self.records.get(previous) else {
            return;
        };
        if !record.terminating {
            return;
        }
        match record.state {
            AbilityState::Foreground | AbilityState::Foregrounding => {
                self.move_to_background(previous)
            }
            AbilityState::Background => self.schedule_terminate(previous),
            AbilityState::Initial | AbilityState::Backgrounding | AbilityState::Terminating => {}
        }
    }

    /// Moves the ability behind the rest of the session, e.g. after the user minimized it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn minimize_ability(&mut self, token: AbilityToken, from_user: bool) -> MissionResult<()> {
        if !self.is_in_mission_lists(token) {
            return Err(MissionError::InvalidToken(token));
        }
        let record = self.require_record_mut(token)?;
        let state = record.state;
        record.minimized_by_user = from_user;
        if !state.is_foreground_like() {
            tracing::warn!(%token, state = %state, "minimize on ability that is not foreground");
            return Ok(());
        }
        if let Some(mission_id) = self.mission_id_of(token) {
            self.update_mission_time(mission_id);
        }
        self.move_to_background(token);
        Ok(())
    }

    pub(super) fn move_to_background(&mut self, token: AbilityToken) {
        let event_id = self.next_event_id();
        let Some(record) = self.records.get_mut(token) else {
            return;
        };
        if !record.transition_to(AbilityState::Backgrounding) {
            return;
        }
        record.new_want = false;
        record.event_id = event_id;
        self.scheduler.post_named_task(
            &event_task_name(event_id),
            ManagerTask::CompleteBackground(token),
            self.config.background_timeout(),
        );
        if let Some(record) = self.records.get(token) {
            self.driver.request_background(record);
        }
    }

    pub(super) fn complete_background(&mut self, token: AbilityToken) {
        let Some(record) = self.records.get_mut(token) else {
            tracing::debug!(%token, "background completion for released ability");
            return;
        };
        if record.state != AbilityState::Backgrounding {
            tracing::warn!(%token, state = %record.state, "background completion in unexpected state");
            return;
        }
        record.state = AbilityState::Background;
        let resume = std::mem::take(&mut record.pending_foreground) && !record.terminating;

        let waiting = self
            .terminate_list
            .iter()
            .copied()
            .filter(|entry| self.state_of(*entry) == Some(AbilityState::Background))
            .collect::<Vec<_>>();
        for entry in waiting {
            self.schedule_terminate(entry);
        }

        if self.is_in_mission_lists(token) {
            if let Some(mission_id) = self.mission_id_of(token) {
                self.listeners.notify_snapshot_changed(mission_id);
            }
        }
        if resume {
            if let Err(error) = self.process_foreground_ability(token) {
                tracing::warn!(%token, %error, "failed to resume ability after background");
            }
        }
        self.flush_pending_calls(token);
    }

    /// Requests the terminate lifecycle and arms the terminate timeout.
    pub(super) fn schedule_terminate(&mut self, token: AbilityToken) {
        let event_id = self.next_event_id();
        let Some(record) = self.records.get_mut(token) else {
            return;
        };
        if !record.transition_to(AbilityState::Terminating) {
            return;
        }
        record.event_id = event_id;
        self.scheduler.post_named_task(
            &event_task_name(event_id),
            ManagerTask::CompleteTerminate(token),
            self.config.terminate_timeout(),
        );
        if let Some(record) = self.records.get(token) {
            self.driver.schedule_terminate(record);
        }
    }

    pub(super) fn complete_terminate(&mut self, token: AbilityToken) {
        let Some(record) = self.records.get(token) else {
            tracing::debug!(%token, "terminate completion for released ability");
            return;
        };
        if record.state != AbilityState::Terminating {
            tracing::warn!(%token, state = %record.state, "terminate completion in unexpected state");
            return;
        }
        if !self.driver.request_terminate(record) {
            tracing::error!(%token, "process driver failed to release ability");
        }
        self.finish_terminated_record(token);
    }

    /// Final cleanup once an ability left the session for good.
    pub(super) fn finish_terminated_record(&mut self, token: AbilityToken) {
        if !self.terminate_list.contains(&token) {
            tracing::warn!(%token, "finishing ability that is not in the terminate list");
        }
        let mission = self.mission_of(token).and_then(|key| {
            self.missions
                .get(key)
                .filter(|mission| mission.ability == token)
                .map(|mission| (key, mission.mission_id, mission.clear_requested))
        });
        let uninstalled = self
            .records
            .get(token)
            .is_some_and(|record| record.uninstalled);

        if let Some((key, mission_id, clear_requested)) = mission {
            let replaced = self
                .find_mission_by_id(mission_id)
                .is_some_and(|live| live != key);
            if clear_requested {
                self.delete_mission_info_and_notify(mission_id);
            } else if !replaced && !uninstalled {
                self.mark_mission_not_running(mission_id);
            }
        }
        self.destroy_record(token);
    }
}
