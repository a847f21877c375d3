//! Profile store: in-memory state that is persisted after every mutation

use anyhow::{Result, anyhow};
use tracing::info;

use crate::model::{AppState, DayStatus, Profile, ProgressEntry};
use crate::sqlite::StateDb;

pub struct ProfileStore {
    db: StateDb,
    state: AppState,
}

impl ProfileStore {
    /// Load the persisted state once
    pub async fn load(db: StateDb) -> Result<Self> {
        let state = db.load_state().await?;
        info!(
            "Profile store loaded: {} profiles, active={:?}",
            state.profiles.len(),
            state.active_profile_id
        );
        Ok(Self { db, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.state.profiles
    }

    pub fn active(&self) -> Option<&Profile> {
        self.state.active()
    }

    /// Apply a mutation and persist the result. The in-memory state is only
    /// replaced once the mutation succeeded.
    async fn commit<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut AppState) -> Result<T>,
    {
        let mut next = self.state.clone();
        let out = f(&mut next)?;
        self.db.save_state(&next).await?;
        self.state = next;
        Ok(out)
    }

    /// Append a profile and make it active
    pub async fn add_profile(&mut self, profile: Profile) -> Result<()> {
        info!("Adding profile '{}' ({})", profile.user_name, profile.id);
        self.commit(|s| s.add_profile(profile)).await
    }

    pub async fn select(&mut self, id: &str) -> Result<()> {
        self.commit(|s| s.select(id)).await
    }

    pub async fn deactivate(&mut self) -> Result<()> {
        self.commit(|s| {
            s.deactivate();
            Ok(())
        })
        .await
    }

    pub async fn delete(&mut self, id: &str) -> Result<Profile> {
        let removed = self.commit(|s| s.delete(id)).await?;
        info!("Deleted profile '{}' ({})", removed.user_name, removed.id);
        Ok(removed)
    }

    pub async fn update_active<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Profile),
    {
        self.commit(|s| s.update_active(f)).await
    }

    /// Close the day for the active profile: append a check-in for the
    /// current step, clear the step and both mode flags, and replace the
    /// message. Rejected when there is no step or the day is already closed.
    pub async fn complete_day(
        &mut self,
        status: DayStatus,
        message: String,
    ) -> Result<ProgressEntry> {
        self.commit(|s| {
            let profile = s.active_mut().ok_or_else(|| anyhow!("no active profile"))?;
            if profile.completed_today() {
                return Err(anyhow!("{} already checked in today", profile.user_name));
            }
            if profile.current_step.is_empty() {
                return Err(anyhow!("{} has no step to check in", profile.user_name));
            }
            let entry = ProgressEntry::new(status, std::mem::take(&mut profile.current_step));
            profile.history.push(entry.clone());
            profile.is_sprint = false;
            profile.is_chaos = false;
            profile.current_message = message;
            Ok(entry)
        })
        .await
    }

    pub async fn clear_history(&mut self) -> Result<()> {
        self.commit(|s| s.clear_history()).await
    }
}
