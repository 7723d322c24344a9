#![forbid(unsafe_code)]

pub mod badge_catalog;
pub mod error;
pub mod progress_service;
pub mod views;

pub use breath_core::Clock;
pub use storage::repository::{LeaderboardRanking, LeaderboardRow};

pub use badge_catalog::{BadgeMetadataSource, LevelBadge, NoBadges, StaticBadgeCatalog};
pub use error::ProgressError;
pub use progress_service::ProgressService;
pub use views::{BadgeGrant, StatisticsView};
