//! Profiles, progress history and the persisted application state

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Gender category; only selects tone and narration voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Male => write!(f, "male"),
            Self::Female => write!(f, "female"),
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            other => Err(anyhow!("unknown gender '{}', expected male or female", other)),
        }
    }
}

/// Outcome of a daily check-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayStatus {
    /// The minimum step was done
    Minimum,
    /// Part of the step was done
    Partial,
    /// Failed, but came back to check in
    FailedReturned,
    None,
}

impl std::fmt::Display for DayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minimum => write!(f, "minimum"),
            Self::Partial => write!(f, "partial"),
            Self::FailedReturned => write!(f, "failed-returned"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for DayStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "minimum" => Ok(Self::Minimum),
            "partial" => Ok(Self::Partial),
            "failed-returned" | "failed" => Ok(Self::FailedReturned),
            "none" => Ok(Self::None),
            other => Err(anyhow!("unknown day status '{}'", other)),
        }
    }
}

/// Inspirational biography returned by the coach service, shown verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspiration {
    pub person: String,
    pub quote: String,
    pub bio: String,
    pub tools: String,
}

/// One check-in. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub date: DateTime<Utc>,
    pub status: DayStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub step: String,
}

impl ProgressEntry {
    pub fn new(status: DayStatus, step: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            status,
            comment: None,
            step: step.into(),
        }
    }

    /// Calendar day of the check-in in local time
    pub fn local_day(&self) -> NaiveDate {
        self.date.with_timezone(&Local).date_naive()
    }
}

/// A user's goal-tracking identity and history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub user_name: String,
    pub gender: Gender,
    pub main_goal: String,
    #[serde(default)]
    pub history: Vec<ProgressEntry>,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub current_message: String,
    #[serde(default)]
    pub is_sprint: bool,
    #[serde(default)]
    pub is_chaos: bool,
    #[serde(default)]
    pub is_initialized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_inspiration: Option<Inspiration>,
}

impl Profile {
    pub fn new(
        user_name: impl Into<String>,
        gender: Gender,
        main_goal: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_name: user_name.into(),
            gender,
            main_goal: main_goal.into(),
            history: Vec::new(),
            current_step: String::new(),
            current_message: String::new(),
            is_sprint: false,
            is_chaos: false,
            is_initialized: false,
            daily_inspiration: None,
        }
    }

    /// Whether any check-in falls on the given local calendar day
    pub fn completed_on(&self, day: NaiveDate) -> bool {
        self.history.iter().any(|h| h.local_day() == day)
    }

    pub fn completed_today(&self) -> bool {
        self.completed_on(Local::now().date_naive())
    }

    /// The last `n` entries, oldest first
    pub fn recent_history(&self, n: usize) -> &[ProgressEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }
}

/// Everything that gets persisted: profiles in insertion order plus the
/// active selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub active_profile_id: Option<String>,
}

impl AppState {
    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn active(&self) -> Option<&Profile> {
        self.active_profile_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Profile> {
        let id = self.active_profile_id.as_deref()?;
        self.profiles.iter_mut().find(|p| p.id == id)
    }

    /// Append a profile and make it the active one
    pub fn add_profile(&mut self, profile: Profile) -> Result<()> {
        if self.get(&profile.id).is_some() {
            return Err(anyhow!("profile {} already exists", profile.id));
        }
        self.active_profile_id = Some(profile.id.clone());
        self.profiles.push(profile);
        Ok(())
    }

    pub fn select(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(anyhow!("no profile with id {}", id));
        }
        self.active_profile_id = Some(id.to_string());
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.active_profile_id = None;
    }

    /// Remove a profile; clears the active selection if it pointed at it
    pub fn delete(&mut self, id: &str) -> Result<Profile> {
        let idx = self
            .profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| anyhow!("no profile with id {}", id))?;
        let removed = self.profiles.remove(idx);
        if self.active_profile_id.as_deref() == Some(id) {
            self.active_profile_id = None;
        }
        Ok(removed)
    }

    /// Apply `f` to the active profile
    pub fn update_active<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Profile),
    {
        let profile = self
            .active_mut()
            .ok_or_else(|| anyhow!("no active profile"))?;
        f(profile);
        Ok(())
    }

    pub fn append_progress(&mut self, entry: ProgressEntry) -> Result<()> {
        self.update_active(|p| p.history.push(entry))
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.update_active(|p| p.history.clear())
    }

    /// Drop an active pointer that names no profile (hand-edited or stale state)
    pub fn normalize(&mut self) {
        if let Some(id) = self.active_profile_id.clone() {
            if self.get(&id).is_none() {
                warn!("Active profile {} does not exist, clearing selection", id);
                self.active_profile_id = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> Profile {
        Profile::new(name, Gender::Female, "run 5k")
    }

    #[test]
    fn test_add_profile_activates_it() {
        let mut state = AppState::default();
        let p = profile("Anna");
        let id = p.id.clone();
        state.add_profile(p).unwrap();
        assert_eq!(state.active().map(|p| p.id.as_str()), Some(id.as_str()));
    }

    #[test]
    fn test_add_profile_keeps_insertion_order() {
        let mut state = AppState::default();
        state.add_profile(profile("a")).unwrap();
        state.add_profile(profile("b")).unwrap();
        state.add_profile(profile("c")).unwrap();
        let names: Vec<_> = state.profiles.iter().map(|p| p.user_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_add_duplicate_id_rejected() {
        let mut state = AppState::default();
        let p = profile("a");
        state.add_profile(p.clone()).unwrap();
        assert!(state.add_profile(p).is_err());
        assert_eq!(state.profiles.len(), 1);
    }

    #[test]
    fn test_select_unknown_id() {
        let mut state = AppState::default();
        assert!(state.select("missing").is_err());
        assert!(state.active_profile_id.is_none());
    }

    #[test]
    fn test_delete_active_clears_selection() {
        let mut state = AppState::default();
        let p = profile("a");
        let id = p.id.clone();
        state.add_profile(p).unwrap();
        let removed = state.delete(&id).unwrap();
        assert_eq!(removed.user_name, "a");
        assert!(state.active_profile_id.is_none());
        assert!(state.profiles.is_empty());
    }

    #[test]
    fn test_delete_other_keeps_selection() {
        let mut state = AppState::default();
        let first = profile("a");
        let first_id = first.id.clone();
        state.add_profile(first).unwrap();
        let second = profile("b");
        let second_id = second.id.clone();
        state.add_profile(second).unwrap();

        state.delete(&first_id).unwrap();
        assert_eq!(state.active_profile_id.as_deref(), Some(second_id.as_str()));
    }

    #[test]
    fn test_update_without_active_profile() {
        let mut state = AppState::default();
        state.add_profile(profile("a")).unwrap();
        state.deactivate();
        assert!(state.append_progress(ProgressEntry::new(DayStatus::Minimum, "x")).is_err());
    }

    #[test]
    fn test_history_append_and_clear() {
        let mut state = AppState::default();
        state.add_profile(profile("a")).unwrap();
        state.append_progress(ProgressEntry::new(DayStatus::Minimum, "one")).unwrap();
        state.append_progress(ProgressEntry::new(DayStatus::Partial, "two")).unwrap();

        let steps: Vec<_> = state.active().unwrap().history.iter().map(|h| h.step.as_str()).collect();
        assert_eq!(steps, vec!["one", "two"]);

        state.clear_history().unwrap();
        assert!(state.active().unwrap().history.is_empty());
    }

    #[test]
    fn test_recent_history() {
        let mut p = profile("a");
        for i in 0..5 {
            p.history.push(ProgressEntry::new(DayStatus::Minimum, format!("step {}", i)));
        }
        let recent = p.recent_history(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].step, "step 2");
        assert_eq!(p.recent_history(10).len(), 5);
    }

    #[test]
    fn test_completed_today() {
        let mut p = profile("a");
        assert!(!p.completed_today());
        p.history.push(ProgressEntry::new(DayStatus::Partial, "x"));
        assert!(p.completed_today());
        let yesterday = Local::now().date_naive().pred_opt().unwrap();
        assert!(!p.completed_on(yesterday));
    }

    #[test]
    fn test_normalize_dangling_active() {
        let mut state = AppState {
            profiles: vec![],
            active_profile_id: Some("gone".to_string()),
        };
        state.normalize();
        assert!(state.active_profile_id.is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut state = AppState::default();
        let mut p = profile("Anna");
        p.history.push(ProgressEntry::new(DayStatus::FailedReturned, "walk"));
        state.add_profile(p).unwrap();

        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("activeProfileId").is_some());
        let first = &json["profiles"][0];
        assert_eq!(first["userName"], "Anna");
        assert_eq!(first["gender"], "female");
        assert_eq!(first["history"][0]["status"], "FAILED_RETURNED");
        assert!(first.get("dailyInspiration").is_none());
    }

    #[test]
    fn test_parse_status_and_gender() {
        assert_eq!("failed_returned".parse::<DayStatus>().unwrap(), DayStatus::FailedReturned);
        assert_eq!("Minimum".parse::<DayStatus>().unwrap(), DayStatus::Minimum);
        assert!("great".parse::<DayStatus>().is_err());
        assert_eq!("F".parse::<Gender>().unwrap(), Gender::Female);
        assert!("x".parse::<Gender>().is_err());
    }
}
