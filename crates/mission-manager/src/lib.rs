//! Mission and ability lifecycle orchestration for one user session.
//!
//! Tracks every running ability, decides which mission is frontmost,
//! serializes conflicting starts through a waiting queue, and recovers from
//! load/foreground timeouts and process death. Collaborators (process driver,
//! persistence, listeners, task scheduling) are injected as trait objects.

pub mod ability_record;
pub mod arena;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod listener;
pub mod manager;
pub mod mission;
pub mod mission_list;
pub mod scheduler;
pub mod service;

pub use ability_record::*;
pub use arena::{Arena, ArenaKey};
pub use collaborators::*;
pub use config::MissionManagerConfig;
pub use error::{ErrorKind, MissionError, MissionResult, PolicyDenial};
pub use listener::ListenerRegistry;
pub use manager::{AbilityRunningInfo, CallResolution, MissionListManager, StartOutcome};
pub use mission::{Mission, MissionKey};
pub use mission_list::{ListKey, MissionList, MissionListType};
pub use scheduler::ManualScheduler;
pub use service::{spawn_mission_service, MissionServiceHandle};

pub use mission_core::{
    AbilityInfo, AbilityKind, AbilityRequest, AbilityToken, ApplicationInfo, CallType,
    ElementName, LaunchMode, Want,
};
pub use mission_store::{MissionInfo, MissionInfoStore};

#[cfg(test)]
mod tests;
