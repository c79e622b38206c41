use mission_core::{AbilityRequest, AbilityToken, CallType, ElementName};

use super::MissionListManager;
use crate::ability_record::{AbilityState, CallState, ConnectionId, LaunchReason};
use crate::error::{MissionError, MissionResult};

/// Outcome of a call resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallResolution {
    /// The call request reached the ready ability.
    Connected,
    /// The ability is still loading; the call is retried once it is ready.
    Waiting,
}

impl MissionListManager {
    /// Resolves a call request against an existing or new ability instance.
    #[tracing::instrument(level = "debug", skip(self, request), fields(element = %request.want.element))]
    pub fn resolve_locked(
        &mut self,
        request: AbilityRequest,
        connection: ConnectionId,
    ) -> MissionResult<CallResolution> {
        if request.call_type != CallType::Call {
            return Err(MissionError::NotCallRequest);
        }
        let caller = request.caller.filter(|caller| self.records.contains(*caller));
        let (mission, token) = self.target_mission_and_ability(&request)?;
        if self.list_of(mission).is_none() {
            self.add_mission_to_top(self.default_single_list, mission);
        }

        let record = self.require_record_mut(token)?;
        if let Some(caller) = caller {
            record.add_caller(caller, request.request_code);
        }
        record.add_call(connection, caller);
        let (ready, loading, state) = (record.ready, record.loading, record.state);
        if ready {
            return match state {
                AbilityState::Foreground | AbilityState::Background => {
                    if self.perform_call(token, connection) {
                        Ok(CallResolution::Connected)
                    } else {
                        Err(MissionError::Remote("call request"))
                    }
                }
                _ => Ok(CallResolution::Waiting),
            };
        }
        if loading {
            return Ok(CallResolution::Waiting);
        }
        let record = self.require_record_mut(token)?;
        record.start_to_background = true;
        record.launch_reason = LaunchReason::Call;
        self.load_ability(token)?;
        Ok(CallResolution::Waiting)
    }

    /// Drops `connection` from the ability named by `element`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn release_locked(
        &mut self,
        connection: ConnectionId,
        element: &ElementName,
    ) -> MissionResult<()> {
        let token = self
            .find_ability_by_element(element)
            .ok_or_else(|| MissionError::AbilityNotFound(element.uri()))?;
        let record = self.require_record_mut(token)?;
        if !record.remove_call(connection) {
            return Err(MissionError::CallNotFound(connection.0));
        }
        let idle_background = record.calls.is_empty()
            && record.start_to_background
            && record.state == AbilityState::Background
            && !record.terminating;
        if idle_background {
            tracing::debug!(%token, "last call released, terminating background ability");
            record.terminating = true;
            self.terminate_ability_locked(token)?;
        }
        Ok(())
    }

    fn perform_call(&mut self, token: AbilityToken, connection: ConnectionId) -> bool {
        let Some(record) = self.records.get(token) else {
            return false;
        };
        if !self.driver.call_request(record, connection) {
            tracing::warn!(%token, %connection, "call request failed");
            return false;
        }
        if let Some(call) = self
            .records
            .get_mut(token)
            .and_then(|record| record.calls.iter_mut().find(|call| call.connection == connection))
        {
            call.state = CallState::Connected;
        }
        true
    }

    /// Retries call requests that arrived while the ability was loading.
    pub(super) fn flush_pending_calls(&mut self, token: AbilityToken) {
        let pending = self
            .records
            .get(token)
            .filter(|record| record.ready && !record.terminating)
            .map(|record| {
                record
                    .calls
                    .iter()
                    .filter(|call| call.state == CallState::Requesting)
                    .map(|call| call.connection)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        for connection in pending {
            self.perform_call(token, connection);
        }
    }
}
