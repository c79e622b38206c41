//! Descriptors carried by a start request and persisted with mission info.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::AbilityToken;

/// Fully qualified component name of an ability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementName {
    #[serde(default)]
    pub device_id: String,
    pub bundle_name: String,
    pub ability_name: String,
}

impl ElementName {
    pub fn new(bundle_name: impl Into<String>, ability_name: impl Into<String>) -> Self {
        Self {
            device_id: String::new(),
            bundle_name: bundle_name.into(),
            ability_name: ability_name.into(),
        }
    }

    /// Returns the `device/bundle/ability` URI form used in logs and dumps.
    pub fn uri(&self) -> String {
        format!(
            "{}/{}/{}",
            self.device_id, self.bundle_name, self.ability_name
        )
    }
}

impl fmt::Display for ElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Launch intent: target element plus string parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Want {
    pub element: ElementName,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Want {
    pub fn new(element: ElementName) -> Self {
        Self {
            element,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Reuse policy of an ability instance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    #[default]
    Standard,
    SingleTop,
    Singleton,
    Specified,
}

impl LaunchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::SingleTop => "single_top",
            Self::Singleton => "singleton",
            Self::Specified => "specified",
        }
    }
}

/// Closed set of ability kinds. Only `Page` abilities live in mission lists.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    #[default]
    Page,
    Service,
    Data,
    Extension,
}

impl AbilityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Service => "service",
            Self::Data => "data",
            Self::Extension => "extension",
        }
    }
}

/// Static metadata of one ability, as resolved from its bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbilityInfo {
    pub bundle_name: String,
    pub name: String,
    #[serde(default)]
    pub kind: AbilityKind,
    #[serde(default)]
    pub launch_mode: LaunchMode,
    #[serde(default)]
    pub continuable: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

/// Owning application identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationInfo {
    pub name: String,
    pub bundle_name: String,
    #[serde(default)]
    pub uid: i32,
    #[serde(default)]
    pub is_launcher_app: bool,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon_path: String,
}

/// How a request reaches the manager: a visible start or a call connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallType {
    #[default]
    Start,
    Call,
}

/// One start (or call) request handed to the mission list manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbilityRequest {
    pub want: Want,
    pub ability_info: AbilityInfo,
    pub app_info: ApplicationInfo,
    pub caller: Option<AbilityToken>,
    pub request_code: i32,
    pub specified_flag: Option<String>,
    pub call_type: CallType,
    pub continuation: bool,
}

impl AbilityRequest {
    /// Builds a request whose want targets the ability described by `ability_info`.
    pub fn new(ability_info: AbilityInfo, app_info: ApplicationInfo) -> Self {
        let want = Want::new(ElementName::new(
            ability_info.bundle_name.clone(),
            ability_info.name.clone(),
        ));
        Self {
            want,
            ability_info,
            app_info,
            caller: None,
            request_code: -1,
            specified_flag: None,
            call_type: CallType::Start,
            continuation: false,
        }
    }

    pub fn with_caller(mut self, caller: AbilityToken, request_code: i32) -> Self {
        self.caller = Some(caller);
        self.request_code = request_code;
        self
    }

    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = call_type;
        self
    }

    pub fn launch_mode(&self) -> LaunchMode {
        self.ability_info.launch_mode
    }

    pub fn is_launcher_app(&self) -> bool {
        self.app_info.is_launcher_app
    }

    pub fn element(&self) -> ElementName {
        ElementName::new(
            self.ability_info.bundle_name.clone(),
            self.ability_info.name.clone(),
        )
    }

    /// Reuse key of the mission hosting this request.
    ///
    /// Singleton abilities key on bundle and ability name; every other mode
    /// shares the bundle name, which is never searched for reuse.
    pub fn mission_name(&self) -> String {
        if self.launch_mode() == LaunchMode::Singleton {
            singleton_mission_name(&self.ability_info.bundle_name, &self.ability_info.name)
        } else {
            self.ability_info.bundle_name.clone()
        }
    }
}

/// Reuse key of a singleton mission.
pub fn singleton_mission_name(bundle_name: &str, ability_name: &str) -> String {
    format!("{bundle_name}:{ability_name}")
}
