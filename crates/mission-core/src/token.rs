use std::fmt;

/// Opaque handle the process driver uses to address one ability record.
///
/// The generation is bumped whenever an arena slot is reused, so a token
/// held past the record's destruction no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbilityToken {
    index: u32,
    generation: u32,
}

impl AbilityToken {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for AbilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}.{}", self.index, self.generation)
    }
}
