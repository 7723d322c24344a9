//! Level/set metadata lookup used for badge grants.
//!
//! Badge names are an open vocabulary tied externally to level and set
//! completion; the engine only enforces that a name is held at most once.
//! Absence of metadata for a level simply means no badge is attempted.

use std::collections::HashMap;

/// Badge metadata attached to a completed level or set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelBadge {
    pub badge_name: String,
    pub message: String,
}

impl LevelBadge {
    #[must_use]
    pub fn new(badge_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            badge_name: badge_name.into(),
            message: message.into(),
        }
    }
}

/// Collaborator interface supplying badge metadata by level or set number.
pub trait BadgeMetadataSource: Send + Sync {
    fn badge_for_level(&self, level_number: u32) -> Option<LevelBadge>;

    fn badge_for_set(&self, set_number: u32) -> Option<LevelBadge>;
}

/// Map-backed catalog, suitable for static configuration and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticBadgeCatalog {
    by_level: HashMap<u32, LevelBadge>,
    by_set: HashMap<u32, LevelBadge>,
}

impl StaticBadgeCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_level_badge(mut self, level_number: u32, badge: LevelBadge) -> Self {
        self.by_level.insert(level_number, badge);
        self
    }

    #[must_use]
    pub fn with_set_badge(mut self, set_number: u32, badge: LevelBadge) -> Self {
        self.by_set.insert(set_number, badge);
        self
    }
}

impl BadgeMetadataSource for StaticBadgeCatalog {
    fn badge_for_level(&self, level_number: u32) -> Option<LevelBadge> {
        self.by_level.get(&level_number).cloned()
    }

    fn badge_for_set(&self, set_number: u32) -> Option<LevelBadge> {
        self.by_set.get(&set_number).cloned()
    }
}

/// A source with no badges at all; no grant is ever attempted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBadges;

impl BadgeMetadataSource for NoBadges {
    fn badge_for_level(&self, _level_number: u32) -> Option<LevelBadge> {
        None
    }

    fn badge_for_set(&self, _set_number: u32) -> Option<LevelBadge> {
        None
    }
}
