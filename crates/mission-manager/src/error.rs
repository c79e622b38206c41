use thiserror::Error;

use mission_core::AbilityToken;
use mission_store::MissionStoreError;

use crate::ability_record::AbilityState;

/// Result type for mission list manager operations.
pub type MissionResult<T> = Result<T, MissionError>;

/// Coarse classification of [`MissionError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    PolicyDenied,
    ResourceUnavailable,
    Inner,
    RemoteFailure,
}

/// Reason a request was refused by policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDenial {
    LauncherRoot,
    LauncherMission,
    MissionLocked,
    InvisibleAbility,
}

impl PolicyDenial {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LauncherRoot => "launcher_root",
            Self::LauncherMission => "launcher_mission",
            Self::MissionLocked => "mission_locked",
            Self::InvisibleAbility => "invisible_ability",
        }
    }
}

/// Errors returned synchronously by the mission list manager.
#[derive(Debug, Error)]
pub enum MissionError {
    #[error("invalid mission id {0}")]
    InvalidMissionId(i32),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("mission {0} not found")]
    MissionNotFound(i32),
    #[error("ability token {0} does not resolve to a tracked ability")]
    InvalidToken(AbilityToken),
    #[error("no ability was started by caller {caller} with request code {request_code}")]
    NotFoundByCaller {
        caller: AbilityToken,
        request_code: i32,
    },
    #[error("request is not a call request")]
    NotCallRequest,
    #[error("no call connection {0} on the target ability")]
    CallNotFound(u64),
    #[error("no ability matches element {0}")]
    AbilityNotFound(String),
    #[error("request denied: {}", .0.as_str())]
    Denied(PolicyDenial),
    #[error("could not allocate a mission id: {0}")]
    MissionIdUnavailable(#[source] MissionStoreError),
    #[error("could not resolve a target mission list: {0}")]
    TargetListUnavailable(&'static str),
    #[error("stale transition for {token}: expected {expected:?}, actual {actual:?}")]
    TransitionRejected {
        token: AbilityToken,
        expected: AbilityState,
        actual: AbilityState,
    },
    #[error("no tokio runtime available to host the mission service")]
    RuntimeUnavailable,
    #[error("mission service has stopped")]
    ServiceStopped,
    #[error("inconsistent mission state: {0}")]
    Inconsistent(String),
    #[error("process driver rejected {0}")]
    Remote(&'static str),
    #[error(transparent)]
    Store(#[from] MissionStoreError),
}

impl MissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMissionId(_)
            | Self::InvalidArgument(_)
            | Self::MissionNotFound(_)
            | Self::InvalidToken(_)
            | Self::NotFoundByCaller { .. }
            | Self::NotCallRequest
            | Self::CallNotFound(_)
            | Self::AbilityNotFound(_) => ErrorKind::Validation,
            Self::Denied(_) => ErrorKind::PolicyDenied,
            Self::MissionIdUnavailable(_)
            | Self::TargetListUnavailable(_)
            | Self::RuntimeUnavailable
            | Self::ServiceStopped => ErrorKind::ResourceUnavailable,
            Self::TransitionRejected { .. } | Self::Inconsistent(_) | Self::Store(_) => {
                ErrorKind::Inner
            }
            Self::Remote(_) => ErrorKind::RemoteFailure,
        }
    }

    /// Stable snake_case reason code for dumps and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMissionId(_) => "invalid_mission_id",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::MissionNotFound(_) => "mission_not_found",
            Self::InvalidToken(_) => "invalid_token",
            Self::NotFoundByCaller { .. } => "not_found_by_caller",
            Self::NotCallRequest => "not_call_request",
            Self::CallNotFound(_) => "call_not_found",
            Self::AbilityNotFound(_) => "ability_not_found",
            Self::Denied(denial) => denial.as_str(),
            Self::MissionIdUnavailable(_) => "mission_id_unavailable",
            Self::TargetListUnavailable(_) => "target_list_unavailable",
            Self::RuntimeUnavailable => "runtime_unavailable",
            Self::ServiceStopped => "service_stopped",
            Self::TransitionRejected { .. } => "transition_rejected",
            Self::Inconsistent(_) => "inner_error",
            Self::Remote(_) => "remote_failure",
            Self::Store(_) => "store_error",
        }
    }

    pub fn is_denied(&self) -> bool {
        self.kind() == ErrorKind::PolicyDenied
    }
}
