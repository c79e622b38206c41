//! Seams the manager drives: process lifecycle, deferred tasks, listeners.

use std::fmt;
use std::time::Duration;

use mission_core::{AbilityInfo, AbilityToken, Want};

use crate::ability_record::{AbilityRecord, AbilityResult, ConnectionId};

/// Boundary to the process that hosts abilities.
///
/// Every request is fire-and-forget; completions come back through
/// `attach_ability_thread`, `ability_transaction_done` and `on_ability_died`.
pub trait ProcessDriver: Send + Sync {
    /// Starts loading the ability's process. Returns false if the request was refused.
    fn request_load(&self, ability: &AbilityRecord, caller: Option<AbilityToken>) -> bool;
    fn request_foreground(&self, ability: &AbilityRecord);
    fn request_background(&self, ability: &AbilityRecord);
    /// Asks the ability to run its terminate lifecycle.
    fn schedule_terminate(&self, ability: &AbilityRecord);
    /// Releases the ability after its terminate lifecycle completed.
    fn request_terminate(&self, ability: &AbilityRecord) -> bool;
    fn force_kill(&self, ability: &AbilityRecord);
    fn notify_lifecycle_reached(
        &self,
        bundle_name: &str,
        ability_name: &str,
        timestamp_unix_s: u64,
        uid: i32,
    );
    /// Asks the owning application which instance a specified-mode want maps to.
    fn start_specified_ability(&self, want: &Want, ability_info: &AbilityInfo);
    fn call_request(&self, ability: &AbilityRecord, connection: ConnectionId) -> bool;
    /// Delivers the result saved for `caller` by a terminating callee.
    fn send_result(&self, caller: &AbilityRecord, result: &AbilityResult);
}

/// Observer of mission changes. Duplicated registrations are ignored.
pub trait MissionListener: Send + Sync {
    fn on_mission_created(&self, mission_id: i32);
    fn on_mission_destroyed(&self, mission_id: i32);
    fn on_mission_snapshot_changed(&self, mission_id: i32);
    fn on_mission_moved_to_front(&self, mission_id: i32);
}

/// Kind of guarded transition an event timeout belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeoutKind {
    Load,
    Foreground,
}

impl TimeoutKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Foreground => "foreground",
        }
    }
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deferred work the manager posts to itself and later receives through
/// [`crate::MissionListManager::handle_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerTask {
    StartWaitingAbility,
    CompleteForeground(AbilityToken),
    CompleteBackground(AbilityToken),
    CompleteTerminate(AbilityToken),
    BackToLauncher,
    BackToCaller(AbilityToken),
    SpecifiedTimeout,
    Timeout { kind: TimeoutKind, event_id: u64 },
}

impl ManagerTask {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartWaitingAbility => "start_waiting_ability",
            Self::CompleteForeground(_) => "complete_foreground",
            Self::CompleteBackground(_) => "complete_background",
            Self::CompleteTerminate(_) => "complete_terminate",
            Self::BackToLauncher => "back_to_launcher",
            Self::BackToCaller(_) => "back_to_caller",
            Self::SpecifiedTimeout => "specified_timeout",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Named task used to drain the waiting queue.
pub const START_WAITING_TASK: &str = "startWaitingAbility";
/// Named task restarting the launcher after a failure.
pub const LAUNCHER_RESTART_TASK: &str = "Launcher_Restart";
/// Named task resuming the caller of a failed ability.
pub const CALLER_RESTART_TASK: &str = "Caller_Restart";
/// Named task guarding a pending specified-mode resolution.
pub const SPECIFIED_TIMEOUT_TASK: &str = "specifiedAbilityTimeout";

/// Name of the timeout task guarding background/terminate transitions for one event.
pub fn event_task_name(event_id: u64) -> String {
    event_id.to_string()
}

/// Deferred execution on the manager's own executor.
///
/// A named task replaces any pending task with the same name. Events are
/// keyed by kind and event id and come back as [`ManagerTask::Timeout`].
pub trait TaskScheduler: Send + Sync {
    fn post_task(&self, task: ManagerTask);
    fn post_named_task(&self, name: &str, task: ManagerTask, delay: Duration);
    fn remove_task(&self, name: &str);
    fn send_event(&self, kind: TimeoutKind, event_id: u64, delay: Duration);
    fn remove_event(&self, kind: TimeoutKind, event_id: u64);
}
