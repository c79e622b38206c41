use std::fmt;

use mission_core::AbilityToken;

use crate::arena::ArenaKey;
use crate::mission_list::ListKey;

/// Arena key of a [`Mission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MissionKey {
    index: u32,
    generation: u32,
}

impl ArenaKey for MissionKey {
    fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    fn slot_index(self) -> u32 {
        self.index
    }

    fn slot_generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for MissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mission-key#{}.{}", self.index, self.generation)
    }
}

/// User-visible task entry that hosts exactly one ability record.
#[derive(Debug, Clone)]
pub struct Mission {
    pub(crate) mission_id: i32,
    pub(crate) mission_name: String,
    pub(crate) is_singleton: bool,
    pub(crate) ability: AbilityToken,
    pub(crate) list: Option<ListKey>,
    pub(crate) locked: bool,
    pub(crate) moving: bool,
    pub(crate) clear_requested: bool,
}

impl Mission {
    pub(crate) fn new(
        mission_id: i32,
        mission_name: impl Into<String>,
        is_singleton: bool,
        ability: AbilityToken,
    ) -> Self {
        Self {
            mission_id,
            mission_name: mission_name.into(),
            is_singleton,
            ability,
            list: None,
            locked: false,
            moving: false,
            clear_requested: false,
        }
    }

    pub fn mission_id(&self) -> i32 {
        self.mission_id
    }

    pub fn mission_name(&self) -> &str {
        &self.mission_name
    }

    pub fn is_singleton(&self) -> bool {
        self.is_singleton
    }

    pub fn ability(&self) -> AbilityToken {
        self.ability
    }

    pub fn list(&self) -> Option<ListKey> {
        self.list
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }
}
