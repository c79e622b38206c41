use std::time::Duration;

use serde::Deserialize;

const DEFAULT_LAUNCHER_BUNDLE: &str = "com.ohos.launcher";
const DEFAULT_LAUNCHER_ABILITY: &str = "com.ohos.launcher.MainAbility";
const DEFAULT_RECENTS_ABILITY: &str = "com.ohos.launcher.recents.MainAbility";
const DEFAULT_USER_ID: i32 = 100;
const DEFAULT_LOAD_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_SYSTEM_UI_LOAD_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_FOREGROUND_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_BACKGROUND_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_TERMINATE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_NEXT_ABILITY_DELAY_MS: u64 = 1_000;
const DEFAULT_SPECIFIED_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_LAUNCHER_RESTARTS: u32 = 3;

/// Identity, timeout and restart settings for one mission list manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MissionManagerConfig {
    pub user_id: i32,
    pub launcher_bundle_name: String,
    pub launcher_ability_name: String,
    pub launcher_recents_ability_name: String,
    pub load_timeout_ms: u64,
    pub system_ui_load_timeout_ms: u64,
    pub foreground_timeout_ms: u64,
    pub background_timeout_ms: u64,
    pub terminate_timeout_ms: u64,
    pub next_ability_delay_ms: u64,
    pub specified_timeout_ms: u64,
    pub max_launcher_restarts: u32,
}

impl Default for MissionManagerConfig {
    fn default() -> Self {
        Self {
            user_id: DEFAULT_USER_ID,
            launcher_bundle_name: DEFAULT_LAUNCHER_BUNDLE.to_string(),
            launcher_ability_name: DEFAULT_LAUNCHER_ABILITY.to_string(),
            launcher_recents_ability_name: DEFAULT_RECENTS_ABILITY.to_string(),
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
            system_ui_load_timeout_ms: DEFAULT_SYSTEM_UI_LOAD_TIMEOUT_MS,
            foreground_timeout_ms: DEFAULT_FOREGROUND_TIMEOUT_MS,
            background_timeout_ms: DEFAULT_BACKGROUND_TIMEOUT_MS,
            terminate_timeout_ms: DEFAULT_TERMINATE_TIMEOUT_MS,
            next_ability_delay_ms: DEFAULT_NEXT_ABILITY_DELAY_MS,
            specified_timeout_ms: DEFAULT_SPECIFIED_TIMEOUT_MS,
            max_launcher_restarts: DEFAULT_MAX_LAUNCHER_RESTARTS,
        }
    }
}

fn env_u64(name: &str, fallback: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(fallback)
}

fn env_string(name: &str, fallback: String) -> String {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
}

impl MissionManagerConfig {
    /// Build config from `MISSION_*` env vars, falling back to defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `MISSION_*` env overrides on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        let user_id = std::env::var("MISSION_USER_ID")
            .ok()
            .and_then(|raw| raw.trim().parse::<i32>().ok())
            .unwrap_or(self.user_id);
        let max_launcher_restarts = std::env::var("MISSION_MAX_LAUNCHER_RESTARTS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(self.max_launcher_restarts);
        Self {
            user_id,
            launcher_bundle_name: env_string("MISSION_LAUNCHER_BUNDLE_NAME", self.launcher_bundle_name),
            launcher_ability_name: env_string("MISSION_LAUNCHER_ABILITY_NAME", self.launcher_ability_name),
            launcher_recents_ability_name: env_string(
                "MISSION_LAUNCHER_RECENTS_ABILITY_NAME",
                self.launcher_recents_ability_name,
            ),
            load_timeout_ms: env_u64("MISSION_LOAD_TIMEOUT_MS", self.load_timeout_ms),
            system_ui_load_timeout_ms: env_u64(
                "MISSION_SYSTEM_UI_LOAD_TIMEOUT_MS",
                self.system_ui_load_timeout_ms,
            ),
            foreground_timeout_ms: env_u64(
                "MISSION_FOREGROUND_TIMEOUT_MS",
                self.foreground_timeout_ms,
            ),
            background_timeout_ms: env_u64(
                "MISSION_BACKGROUND_TIMEOUT_MS",
                self.background_timeout_ms,
            ),
            terminate_timeout_ms: env_u64(
                "MISSION_TERMINATE_TIMEOUT_MS",
                self.terminate_timeout_ms,
            ),
            next_ability_delay_ms: env_u64(
                "MISSION_NEXT_ABILITY_DELAY_MS",
                self.next_ability_delay_ms,
            ),
            specified_timeout_ms: env_u64(
                "MISSION_SPECIFIED_TIMEOUT_MS",
                self.specified_timeout_ms,
            ),
            max_launcher_restarts,
        }
    }

    pub fn load_timeout(&self, launcher_app: bool) -> Duration {
        if launcher_app {
            Duration::from_millis(self.system_ui_load_timeout_ms)
        } else {
            Duration::from_millis(self.load_timeout_ms)
        }
    }

    pub fn foreground_timeout(&self) -> Duration {
        Duration::from_millis(self.foreground_timeout_ms)
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::from_millis(self.background_timeout_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    pub fn next_ability_delay(&self) -> Duration {
        Duration::from_millis(self.next_ability_delay_ms)
    }

    pub fn specified_timeout(&self) -> Duration {
        Duration::from_millis(self.specified_timeout_ms)
    }

    pub fn is_launcher_main(&self, bundle_name: &str, ability_name: &str) -> bool {
        bundle_name == self.launcher_bundle_name && ability_name == self.launcher_ability_name
    }

    pub fn is_launcher_recents(&self, bundle_name: &str, ability_name: &str) -> bool {
        bundle_name == self.launcher_bundle_name && ability_name == self.launcher_recents_ability_name
    }
}
