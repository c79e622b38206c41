use std::collections::VecDeque;
use std::fmt;

use crate::arena::ArenaKey;
use crate::mission::MissionKey;

/// Arena key of a [`MissionList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListKey {
    index: u32,
    generation: u32,
}

impl ArenaKey for ListKey {
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

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list-key#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissionListType {
    Launcher,
    DefaultStandard,
    DefaultSingleton,
    Current,
}

impl MissionListType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Launcher => "LAUNCHER",
            Self::DefaultStandard => "DEFAULT_STANDARD",
            Self::DefaultSingleton => "DEFAULT_SINGLE",
            Self::Current => "CURRENT",
        }
    }

    pub fn is_default(self) -> bool {
        matches!(self, Self::DefaultStandard | Self::DefaultSingleton)
    }
}

/// Ordered stack of missions; the front is the top.
#[derive(Debug, Clone)]
pub struct MissionList {
    list_type: MissionListType,
    missions: VecDeque<MissionKey>,
}

impl MissionList {
    pub fn new(list_type: MissionListType) -> Self {
        Self {
            list_type,
            missions: VecDeque::new(),
        }
    }

    pub fn list_type(&self) -> MissionListType {
        self.list_type
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn top(&self) -> Option<MissionKey> {
        self.missions.front().copied()
    }

    pub fn contains(&self, mission: MissionKey) -> bool {
        self.missions.contains(&mission)
    }

    pub fn missions(&self) -> impl Iterator<Item = MissionKey> + '_ {
        self.missions.iter().copied()
    }

    /// Puts `mission` on top, removing any earlier position first.
    pub(crate) fn add_to_top(&mut self, mission: MissionKey) {
        self.remove(mission);
        self.missions.push_front(mission);
    }

    pub(crate) fn remove(&mut self, mission: MissionKey) -> bool {
        match self.missions.iter().position(|entry| *entry == mission) {
            Some(position) => {
                self.missions.remove(position);
                true
            }
            None => false,
        }
    }

    /// Removes and returns every mission above `mission`, top first.
    pub(crate) fn split_off_above(&mut self, mission: MissionKey) -> Vec<MissionKey> {
        let Some(position) = self.missions.iter().position(|entry| *entry == mission) else {
            return Vec::new();
        };
        self.missions.drain(..position).collect()
    }
}
