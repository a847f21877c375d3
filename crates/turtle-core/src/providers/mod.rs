//! Coach service abstraction
//!
//! Backends implement [`CoachProvider`] for daily plans and biographies.
//! [`GeminiClient`] also implements the speech seam used by narration.

pub mod google;
pub mod types;

pub use google::GeminiClient;
pub use types::{CoachProvider, DailyPlan, Mode, PlanRequest};
