use std::collections::BTreeMap;
use std::fmt;

use mission_core::{AbilityInfo, AbilityKind, AbilityRequest, AbilityToken, ApplicationInfo, Want};

use crate::mission::MissionKey;

/// Lifecycle state of one ability record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AbilityState {
    #[default]
    Initial,
    Foregrounding,
    Foreground,
    Backgrounding,
    Background,
    Terminating,
}

impl AbilityState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::Foregrounding => "FOREGROUNDING",
            Self::Foreground => "FOREGROUND",
            Self::Backgrounding => "BACKGROUNDING",
            Self::Background => "BACKGROUND",
            Self::Terminating => "TERMINATING",
        }
    }

    /// True for `Foreground` and `Foregrounding`.
    pub fn is_foreground_like(self) -> bool {
        matches!(self, Self::Foreground | Self::Foregrounding)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Initial => matches!(
                next,
                Self::Foregrounding | Self::Backgrounding | Self::Terminating
            ),
            Self::Foregrounding => matches!(
                next,
                Self::Foreground | Self::Backgrounding | Self::Terminating | Self::Initial
            ),
            Self::Foreground => matches!(
                next,
                Self::Foregrounding | Self::Backgrounding | Self::Terminating | Self::Initial
            ),
            Self::Backgrounding => matches!(
                next,
                Self::Background | Self::Terminating | Self::Initial
            ),
            Self::Background => matches!(
                next,
                Self::Foregrounding | Self::Backgrounding | Self::Terminating | Self::Initial
            ),
            Self::Terminating => matches!(next, Self::Initial),
        }
    }
}

impl fmt::Display for AbilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State reported by the process driver when a lifecycle transaction finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Terminate finished.
    Initial,
    Foreground,
    Background,
}

/// Why a record was last started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchReason {
    #[default]
    StartAbility,
    Continuation,
    Call,
}

/// Caller relation: who started this record and with which request code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerRecord {
    pub caller: AbilityToken,
    pub request_code: i32,
}

/// Result delivered back to a caller when its callee terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityResult {
    pub request_code: i32,
    pub result_code: i32,
    pub want: Want,
}

/// Identifier of one call connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Requesting,
    Connected,
}

/// One call connection held against a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub connection: ConnectionId,
    pub caller: Option<AbilityToken>,
    pub state: CallState,
}

/// Options forwarded with a move-to-front request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub display_id: i32,
    pub window_mode: i32,
}

/// Runtime representation of one ability instance.
#[derive(Debug, Clone)]
pub struct AbilityRecord {
    token: AbilityToken,
    record_id: u64,
    pub(crate) want: Want,
    pub(crate) ability_info: AbilityInfo,
    pub(crate) app_info: ApplicationInfo,
    pub(crate) state: AbilityState,
    pub(crate) ready: bool,
    pub(crate) loading: bool,
    pub(crate) restarting: bool,
    pub(crate) restart_count: u32,
    pub(crate) minimized_by_user: bool,
    pub(crate) terminating: bool,
    pub(crate) launcher_root: bool,
    pub(crate) new_want: bool,
    pub(crate) uninstalled: bool,
    pub(crate) start_to_background: bool,
    pub(crate) pending_foreground: bool,
    pub(crate) event_id: u64,
    pub(crate) mission: Option<MissionKey>,
    pub(crate) callers: Vec<CallerRecord>,
    pub(crate) result: Option<AbilityResult>,
    pub(crate) pre_ability: Option<AbilityToken>,
    pub(crate) next_ability: Option<AbilityToken>,
    pub(crate) calls: Vec<CallRecord>,
    pub(crate) start_time_ms: u64,
    pub(crate) save_data: BTreeMap<String, String>,
    pub(crate) specified_flag: Option<String>,
    pub(crate) launch_reason: LaunchReason,
    pub(crate) start_options: Option<StartOptions>,
}

impl AbilityRecord {
    pub(crate) fn from_request(token: AbilityToken, record_id: u64, request: &AbilityRequest) -> Self {
        Self {
            token,
            record_id,
            want: request.want.clone(),
            ability_info: request.ability_info.clone(),
            app_info: request.app_info.clone(),
            state: AbilityState::Initial,
            ready: false,
            loading: false,
            restarting: false,
            restart_count: 0,
            minimized_by_user: false,
            terminating: false,
            launcher_root: false,
            new_want: false,
            uninstalled: false,
            start_to_background: false,
            pending_foreground: false,
            event_id: 0,
            mission: None,
            callers: Vec::new(),
            result: None,
            pre_ability: None,
            next_ability: None,
            calls: Vec::new(),
            start_time_ms: 0,
            save_data: BTreeMap::new(),
            specified_flag: None,
            launch_reason: LaunchReason::StartAbility,
            start_options: None,
        }
    }

    pub fn token(&self) -> AbilityToken {
        self.token
    }

    pub fn record_id(&self) -> u64 {
        self.record_id
    }

    pub fn want(&self) -> &Want {
        &self.want
    }

    pub fn ability_info(&self) -> &AbilityInfo {
        &self.ability_info
    }

    pub fn app_info(&self) -> &ApplicationInfo {
        &self.app_info
    }

    pub fn bundle_name(&self) -> &str {
        &self.ability_info.bundle_name
    }

    pub fn ability_name(&self) -> &str {
        &self.ability_info.name
    }

    pub fn uid(&self) -> i32 {
        self.app_info.uid
    }

    pub fn kind(&self) -> AbilityKind {
        self.ability_info.kind
    }

    pub fn state(&self) -> AbilityState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_restarting(&self) -> bool {
        self.restarting
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn is_minimized_by_user(&self) -> bool {
        self.minimized_by_user
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    pub fn is_launcher_root(&self) -> bool {
        self.launcher_root
    }

    pub fn is_new_want(&self) -> bool {
        self.new_want
    }

    pub fn is_uninstalled(&self) -> bool {
        self.uninstalled
    }

    pub fn is_start_to_background(&self) -> bool {
        self.start_to_background
    }

    pub fn is_launcher_ability(&self) -> bool {
        self.app_info.is_launcher_app
    }

    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    pub fn mission(&self) -> Option<MissionKey> {
        self.mission
    }

    pub fn callers(&self) -> &[CallerRecord] {
        &self.callers
    }

    /// Most recent caller, if any.
    pub fn caller(&self) -> Option<AbilityToken> {
        self.callers.last().map(|record| record.caller)
    }

    pub fn pending_result(&self) -> Option<&AbilityResult> {
        self.result.as_ref()
    }

    pub fn pre_ability(&self) -> Option<AbilityToken> {
        self.pre_ability
    }

    pub fn next_ability(&self) -> Option<AbilityToken> {
        self.next_ability
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn start_time_ms(&self) -> u64 {
        self.start_time_ms
    }

    pub fn save_data(&self) -> &BTreeMap<String, String> {
        &self.save_data
    }

    pub fn specified_flag(&self) -> Option<&str> {
        self.specified_flag.as_deref()
    }

    pub fn launch_reason(&self) -> LaunchReason {
        self.launch_reason
    }

    pub fn start_options(&self) -> Option<&StartOptions> {
        self.start_options.as_ref()
    }

    /// Moves to `next` when the lifecycle graph allows it.
    pub(crate) fn transition_to(&mut self, next: AbilityState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                token = %self.token,
                from = %self.state,
                to = %next,
                "rejected ability state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Forces the record back to `Initial` after its process went away.
    pub(crate) fn reset_after_death(&mut self) {
        self.state = AbilityState::Initial;
        self.ready = false;
        self.loading = false;
        self.pending_foreground = false;
    }

    /// Record `caller` as having started this ability; the latest caller ends up last.
    pub(crate) fn add_caller(&mut self, caller: AbilityToken, request_code: i32) {
        self.callers
            .retain(|record| !(record.caller == caller && record.request_code == request_code));
        self.callers.push(CallerRecord {
            caller,
            request_code,
        });
    }

    pub(crate) fn is_started_by(&self, caller: AbilityToken, request_code: i32) -> bool {
        self.callers
            .iter()
            .any(|record| record.caller == caller && record.request_code == request_code)
    }

    pub(crate) fn add_call(&mut self, connection: ConnectionId, caller: Option<AbilityToken>) {
        if let Some(existing) = self
            .calls
            .iter_mut()
            .find(|call| call.connection == connection)
        {
            existing.caller = caller;
            return;
        }
        self.calls.push(CallRecord {
            connection,
            caller,
            state: CallState::Requesting,
        });
    }

    pub(crate) fn remove_call(&mut self, connection: ConnectionId) -> bool {
        let before = self.calls.len();
        self.calls.retain(|call| call.connection != connection);
        self.calls.len() != before
    }

    /// One-line summary used by dumps.
    pub fn dump_line(&self) -> String {
        format!(
            "AbilityRecord id #{} app name [{}] main name [{}] state #{} ready #{}",
            self.record_id,
            self.app_info.name,
            self.ability_info.name,
            self.state,
            self.ready
        )
    }
}
