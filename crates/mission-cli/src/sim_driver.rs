//! In-process stand-in for the ability host.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use mission_core::{AbilityInfo, AbilityToken, Want};
use mission_manager::{AbilityRecord, AbilityResult, ConnectionId, ProcessDriver, TransactionState};

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Completion the simulated host would report back to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostReply {
    Attach(AbilityToken),
    Done(AbilityToken, TransactionState),
}

#[derive(Debug, Default)]
struct SimulatedState {
    replies: VecDeque<HostReply>,
    log: Vec<String>,
    refuse_loads: bool,
}

/// Queues the replies a well-behaved host would send. Scenarios either pump
/// them automatically or confirm each transition by hand.
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    state: Mutex<SimulatedState>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refuse_loads(&self, refuse: bool) {
        lock_unpoisoned(&self.state).refuse_loads = refuse;
    }

    pub fn pop_reply(&self) -> Option<HostReply> {
        lock_unpoisoned(&self.state).replies.pop_front()
    }

    /// Drops queued replies for `token`, as a host would after the process died.
    pub fn forget(&self, token: AbilityToken) {
        lock_unpoisoned(&self.state).replies.retain(|reply| match reply {
            HostReply::Attach(pending) | HostReply::Done(pending, _) => *pending != token,
        });
    }

    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut lock_unpoisoned(&self.state).log)
    }

    fn record(&self, line: String, reply: Option<HostReply>) {
        tracing::debug!(line = %line, "simulated host request");
        let mut state = lock_unpoisoned(&self.state);
        state.log.push(line);
        if let Some(reply) = reply {
            state.replies.push_back(reply);
        }
    }
}

impl ProcessDriver for SimulatedDriver {
    fn request_load(&self, ability: &AbilityRecord, _caller: Option<AbilityToken>) -> bool {
        if lock_unpoisoned(&self.state).refuse_loads {
            self.record(format!("load refused {}", ability.ability_name()), None);
            return false;
        }
        self.record(
            format!("load {}", ability.ability_name()),
            Some(HostReply::Attach(ability.token())),
        );
        true
    }

    fn request_foreground(&self, ability: &AbilityRecord) {
        self.record(
            format!("foreground {}", ability.ability_name()),
            Some(HostReply::Done(ability.token(), TransactionState::Foreground)),
        );
    }

    fn request_background(&self, ability: &AbilityRecord) {
        self.record(
            format!("background {}", ability.ability_name()),
            Some(HostReply::Done(ability.token(), TransactionState::Background)),
        );
    }

    fn schedule_terminate(&self, ability: &AbilityRecord) {
        self.record(
            format!("terminate {}", ability.ability_name()),
            Some(HostReply::Done(ability.token(), TransactionState::Initial)),
        );
    }

    fn request_terminate(&self, ability: &AbilityRecord) -> bool {
        self.record(format!("release {}", ability.ability_name()), None);
        true
    }

    fn force_kill(&self, ability: &AbilityRecord) {
        self.forget(ability.token());
        self.record(format!("kill {}", ability.ability_name()), None);
    }

    fn notify_lifecycle_reached(
        &self,
        _bundle_name: &str,
        ability_name: &str,
        _timestamp_unix_s: u64,
        uid: i32,
    ) {
        self.record(format!("lifecycle reached {ability_name} uid {uid}"), None);
    }

    fn start_specified_ability(&self, want: &Want, _ability_info: &AbilityInfo) {
        self.record(format!("resolve specified {}", want.element.uri()), None);
    }

    fn call_request(&self, ability: &AbilityRecord, connection: ConnectionId) -> bool {
        self.record(format!("call {} {connection}", ability.ability_name()), None);
        true
    }

    fn send_result(&self, caller: &AbilityRecord, result: &AbilityResult) {
        self.record(
            format!(
                "result to {} code {} request {}",
                caller.ability_name(),
                result.result_code,
                result.request_code
            ),
            None,
        );
    }
}
