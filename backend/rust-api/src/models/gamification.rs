use serde::{Deserialize, Serialize};
use validator::Validate;

/// Badge tiers in ascending order. Each tier is unlocked once the user's total
/// points reach its threshold (inclusive).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    #[default]
    Newbie,
    Explorer,
    Achiever,
    Specialist,
    Expert,
    Master,
}

impl Badge {
    pub const ALL: [Badge; 6] = [
        Badge::Newbie,
        Badge::Explorer,
        Badge::Achiever,
        Badge::Specialist,
        Badge::Expert,
        Badge::Master,
    ];

    pub fn threshold(self) -> u64 {
        match self {
            Badge::Newbie => 0,
            Badge::Explorer => 40,
            Badge::Achiever => 60,
            Badge::Specialist => 80,
            Badge::Expert => 100,
            Badge::Master => 120,
        }
    }

    /// Highest tier whose threshold is <= `total_points`
    pub fn for_points(total_points: u64) -> Badge {
        Badge::ALL
            .iter()
            .rev()
            .copied()
            .find(|badge| total_points >= badge.threshold())
            .unwrap_or(Badge::Newbie)
    }

    pub fn next(self) -> Option<Badge> {
        Badge::ALL.iter().copied().find(|badge| *badge > self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::Newbie => "newbie",
            Badge::Explorer => "explorer",
            Badge::Achiever => "achiever",
            Badge::Specialist => "specialist",
            Badge::Expert => "expert",
            Badge::Master => "master",
        }
    }
}

/// Gamification fields of a user document ("users" collection)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoints {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(default)]
    pub total_points: u64,
    #[serde(default)]
    pub current_badge: Badge,
}

impl UserPoints {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_points: 0,
            current_badge: Badge::Newbie,
        }
    }
}

/// Outcome of a points award
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsAward {
    pub user_id: String,
    pub new_total: u64,
    pub new_badge: Badge,
    pub previous_badge: Badge,
    pub badge_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationProfile {
    pub user_id: String,
    pub total_points: u64,
    pub current_badge: Badge,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_badge: Option<Badge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_to_next_badge: Option<u64>,
}

impl GamificationProfile {
    pub fn from_points(points: UserPoints) -> Self {
        // Derive from the total so a stale stored badge never leaks out
        let current_badge = Badge::for_points(points.total_points);
        let next_badge = current_badge.next();
        Self {
            points_to_next_badge: next_badge
                .map(|badge| badge.threshold().saturating_sub(points.total_points)),
            user_id: points.user_id,
            total_points: points.total_points,
            current_badge,
            next_badge,
        }
    }
}

/// Request body for POST /admin/users/{id}/points
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AwardPointsRequest {
    #[validate(range(min = 0, message = "Amount must be non-negative"))]
    pub amount: i64,
}
