//! Coach service seam: daily plans and biographies

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use turtle_store::{Inspiration, Profile, ProgressEntry};

/// Pace of the day's step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Slow but steady, 5–10 minutes
    Turtle,
    /// Energy to spare, push without overload
    Sprint,
    /// Everything fell apart, smallest possible action
    Chaos,
}

impl Mode {
    /// Chaos wins over sprint
    pub fn from_flags(is_sprint: bool, is_chaos: bool) -> Self {
        if is_chaos {
            Self::Chaos
        } else if is_sprint {
            Self::Sprint
        } else {
            Self::Turtle
        }
    }

    pub fn of(profile: &Profile) -> Self {
        Self::from_flags(profile.is_sprint, profile.is_chaos)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Turtle => write!(f, "turtle"),
            Self::Sprint => write!(f, "sprint"),
            Self::Chaos => write!(f, "chaos"),
        }
    }
}

/// Everything the coach needs to plan a day
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub user_name: String,
    pub goal: String,
    /// Most recent check-ins, oldest first
    pub history: Vec<ProgressEntry>,
    pub mode: Mode,
}

impl PlanRequest {
    /// Number of past check-ins sent along with a request
    pub const HISTORY_WINDOW: usize = 3;

    pub fn for_profile(profile: &Profile, mode: Mode) -> Self {
        Self {
            user_name: profile.user_name.clone(),
            goal: profile.main_goal.clone(),
            history: profile.recent_history(Self::HISTORY_WINDOW).to_vec(),
            mode,
        }
    }
}

/// The coach's answer for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPlan {
    pub message: String,
    pub step: String,
    pub inspiration: Inspiration,
}

/// Trait that coach backends implement
#[async_trait]
pub trait CoachProvider: Send + Sync {
    /// Human-readable provider name (e.g. "gemini")
    fn provider_name(&self) -> &str;

    /// Supportive message, one micro-step and an inspiration for today
    async fn daily_plan(&self, request: &PlanRequest) -> Result<DailyPlan>;

    /// Short biographies of self-made people
    async fn biographies(&self) -> Result<Vec<Inspiration>>;
}
