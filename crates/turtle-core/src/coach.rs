//! Coach: profile lifecycle, daily plans and check-ins on top of the
//! profile store and a coach provider

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};
use turtle_store::{DayStatus, Gender, Inspiration, Profile, ProfileStore, ProgressEntry};

use crate::audio::tts::Voice;
use crate::prompts;
use crate::providers::{CoachProvider, DailyPlan, Mode, PlanRequest};
use crate::view::{Screen, ViewController};

/// Mode switch requested together with a plan refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    /// Keep the current flags
    Keep,
    /// Both flags off
    Turtle,
    /// Toggle sprint, chaos off
    Sprint,
    /// Chaos on, sprint off
    Chaos,
}

impl ModeChange {
    /// New `(is_sprint, is_chaos)` flags
    pub fn apply(self, is_sprint: bool, is_chaos: bool) -> (bool, bool) {
        match self {
            Self::Keep => (is_sprint, is_chaos),
            Self::Turtle => (false, false),
            Self::Sprint => (!is_sprint, false),
            Self::Chaos => (false, true),
        }
    }
}

pub struct Coach {
    store: ProfileStore,
    provider: Arc<dyn CoachProvider>,
    view: ViewController,
    bios: Option<Vec<Inspiration>>,
}

impl Coach {
    pub fn new(store: ProfileStore, provider: Arc<dyn CoachProvider>) -> Self {
        let mut view = ViewController::new();
        view.on_active_changed(store.active());
        info!("Coach ready (provider: {}, screen: {})", provider.provider_name(), view.screen());
        Self {
            store,
            provider,
            view,
            bios: None,
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn active(&self) -> Option<&Profile> {
        self.store.active()
    }

    pub fn view(&self) -> &ViewController {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewController {
        &mut self.view
    }

    fn sync_view(&mut self) {
        self.view.on_active_changed(self.store.active());
    }

    fn require_active(&self) -> Result<&Profile> {
        self.store.active().ok_or_else(|| anyhow!("no active profile"))
    }

    /// Create an initialized profile with its first plan and make it active
    pub async fn create_profile(
        &mut self,
        name: &str,
        goal: &str,
        gender: Gender,
    ) -> Result<Profile> {
        let name = name.trim();
        let goal = goal.trim();
        if name.is_empty() || goal.is_empty() {
            return Err(anyhow!("name and goal must not be empty"));
        }

        let request = PlanRequest {
            user_name: name.to_string(),
            goal: goal.to_string(),
            history: Vec::new(),
            mode: Mode::Turtle,
        };
        let plan = self
            .provider
            .daily_plan(&request)
            .await
            .context("Could not get the first plan")?;

        let mut profile = Profile::new(name, gender, goal);
        profile.current_message = plan.message;
        profile.current_step = plan.step;
        profile.daily_inspiration = Some(plan.inspiration);
        profile.is_initialized = true;

        self.store.add_profile(profile.clone()).await?;
        self.sync_view();
        Ok(profile)
    }

    pub async fn select_profile(&mut self, id: &str) -> Result<()> {
        self.store.select(id).await?;
        self.sync_view();
        Ok(())
    }

    /// Leave the active profile and return to the profile list
    pub async fn go_home(&mut self) -> Result<()> {
        self.store.deactivate().await?;
        self.sync_view();
        Ok(())
    }

    pub async fn delete_profile(&mut self, id: &str) -> Result<Profile> {
        let removed = self.store.delete(id).await?;
        self.sync_view();
        Ok(removed)
    }

    /// Record today's result for the current step
    pub async fn check_in(&mut self, status: DayStatus) -> Result<ProgressEntry> {
        let name = self.require_active()?.user_name.clone();
        let entry = self
            .store
            .complete_day(status, prompts::day_complete_message(&name))
            .await?;
        info!("{} checked in: {}", name, status);
        Ok(entry)
    }

    /// Ask for a new plan, optionally switching mode. Nothing changes when
    /// the request fails.
    pub async fn refresh_plan(&mut self, change: ModeChange) -> Result<DailyPlan> {
        let profile = self.require_active()?;
        let (is_sprint, is_chaos) = change.apply(profile.is_sprint, profile.is_chaos);
        let request = PlanRequest::for_profile(profile, Mode::from_flags(is_sprint, is_chaos));

        let plan = match self.provider.daily_plan(&request).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Plan refresh failed: {:#}", e);
                return Err(e.context("Could not refresh the plan"));
            }
        };

        let stored = plan.clone();
        self.store
            .update_active(move |p| {
                p.is_sprint = is_sprint;
                p.is_chaos = is_chaos;
                p.current_message = stored.message;
                p.current_step = stored.step;
                p.daily_inspiration = Some(stored.inspiration);
            })
            .await?;
        info!("Plan refreshed in {} mode", request.mode);
        Ok(plan)
    }

    pub async fn clear_history(&mut self) -> Result<()> {
        self.store.clear_history().await
    }

    /// Open the biographies screen, fetching them on first use
    pub async fn load_biographies(&mut self) -> Result<&[Inspiration]> {
        if self.bios.is_none() {
            let bios = self
                .provider
                .biographies()
                .await
                .context("Could not load biographies")?;
            self.bios = Some(bios);
        }
        self.view.navigate(Screen::Biographies);
        Ok(self.bios.as_deref().unwrap_or_default())
    }

    /// Text to read aloud for the active profile, and the voice to use
    pub fn narration(&self) -> Option<(String, Voice)> {
        let profile = self.store.active()?;
        if profile.current_message.is_empty() && profile.current_step.is_empty() {
            return None;
        }
        Some((
            prompts::narration_text(&profile.current_message, &profile.current_step),
            Voice::for_gender(profile.gender),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use turtle_store::StateDb;

    #[derive(Default)]
    struct MockCoach {
        fail: AtomicBool,
        plan_calls: AtomicUsize,
        bio_calls: AtomicUsize,
        last_request: Mutex<Option<PlanRequest>>,
    }

    fn inspiration(person: &str) -> Inspiration {
        Inspiration {
            person: person.to_string(),
            quote: "q".to_string(),
            bio: "b".to_string(),
            tools: "t".to_string(),
        }
    }

    #[async_trait]
    impl CoachProvider for MockCoach {
        fn provider_name(&self) -> &str {
            "mock"
        }

        async fn daily_plan(&self, request: &PlanRequest) -> Result<DailyPlan> {
            let n = self.plan_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow!("service unavailable"));
            }
            Ok(DailyPlan {
                message: format!("message {}", n),
                step: format!("step {}", n),
                inspiration: inspiration("Гагарин"),
            })
        }

        async fn biographies(&self) -> Result<Vec<Inspiration>> {
            self.bio_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow!("service unavailable"));
            }
            Ok(vec![inspiration("a"), inspiration("b")])
        }
    }

    async fn coach() -> (Coach, Arc<MockCoach>) {
        let mock = Arc::new(MockCoach::default());
        let store = ProfileStore::load(StateDb::in_memory().unwrap()).await.unwrap();
        (Coach::new(store, mock.clone()), mock)
    }

    fn last_mode(mock: &MockCoach) -> Mode {
        mock.last_request.lock().unwrap().as_ref().unwrap().mode
    }

    #[test]
    fn test_mode_change_apply() {
        assert_eq!(ModeChange::Keep.apply(true, false), (true, false));
        assert_eq!(ModeChange::Turtle.apply(true, true), (false, false));
        assert_eq!(ModeChange::Sprint.apply(false, true), (true, false));
        assert_eq!(ModeChange::Sprint.apply(true, false), (false, false));
        assert_eq!(ModeChange::Chaos.apply(true, false), (false, true));
    }

    #[tokio::test]
    async fn test_create_profile() -> Result<()> {
        let (mut coach, mock) = coach().await;
        assert_eq!(coach.view().screen(), Screen::ProfileManager);

        let profile = coach.create_profile(" Оля ", "бегать", Gender::Female).await?;
        assert_eq!(profile.user_name, "Оля");
        assert!(profile.is_initialized);
        assert_eq!(profile.current_step, "step 0");
        assert_eq!(coach.active().map(|p| p.id.clone()), Some(profile.id));
        assert_eq!(coach.view().screen(), Screen::ActivePath);

        let request = mock.last_request.lock().unwrap().clone().unwrap();
        assert!(request.history.is_empty());
        assert_eq!(request.mode, Mode::Turtle);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_profile_rejects_blank_and_failures() {
        let (mut coach, mock) = coach().await;
        assert!(coach.create_profile("  ", "goal", Gender::Male).await.is_err());
        assert!(coach.create_profile("name", "", Gender::Male).await.is_err());
        assert_eq!(mock.plan_calls.load(Ordering::SeqCst), 0);

        mock.fail.store(true, Ordering::SeqCst);
        assert!(coach.create_profile("name", "goal", Gender::Male).await.is_err());
        assert!(coach.store().profiles().is_empty());
    }

    #[tokio::test]
    async fn test_check_in_closes_the_day() -> Result<()> {
        let (mut coach, _mock) = coach().await;
        coach.create_profile("Петя", "читать", Gender::Male).await?;
        coach.refresh_plan(ModeChange::Chaos).await?;

        let entry = coach.check_in(DayStatus::Minimum).await?;
        assert_eq!(entry.step, "step 1");
        let active = coach.active().unwrap();
        assert!(active.current_step.is_empty());
        assert!(!active.is_chaos && !active.is_sprint);
        assert_eq!(active.current_message, "Отлично, Петя. На сегодня путь завершен. Отдыхай.");
        assert!(active.completed_today());

        assert!(coach.check_in(DayStatus::Partial).await.is_err());
        assert_eq!(coach.active().unwrap().history.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_check_in_without_active_profile() {
        let (mut coach, _mock) = coach().await;
        assert!(coach.check_in(DayStatus::Minimum).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_plan_modes() -> Result<()> {
        let (mut coach, mock) = coach().await;
        coach.create_profile("a", "g", Gender::Female).await?;

        coach.refresh_plan(ModeChange::Sprint).await?;
        assert_eq!(last_mode(&mock), Mode::Sprint);
        assert!(coach.active().unwrap().is_sprint);

        coach.refresh_plan(ModeChange::Keep).await?;
        assert_eq!(last_mode(&mock), Mode::Sprint);

        coach.refresh_plan(ModeChange::Chaos).await?;
        let active = coach.active().unwrap();
        assert!(active.is_chaos && !active.is_sprint);
        assert_eq!(active.current_step, "step 3");

        coach.refresh_plan(ModeChange::Turtle).await?;
        assert_eq!(last_mode(&mock), Mode::Turtle);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_failure_changes_nothing() -> Result<()> {
        let (mut coach, mock) = coach().await;
        coach.create_profile("a", "g", Gender::Female).await?;
        let before = coach.active().unwrap().clone();

        mock.fail.store(true, Ordering::SeqCst);
        assert!(coach.refresh_plan(ModeChange::Sprint).await.is_err());
        assert_eq!(coach.active().unwrap(), &before);
        Ok(())
    }

    #[tokio::test]
    async fn test_profile_navigation() -> Result<()> {
        let (mut coach, _mock) = coach().await;
        let first = coach.create_profile("a", "g", Gender::Female).await?;
        let second = coach.create_profile("b", "g", Gender::Male).await?;
        assert_eq!(coach.active().unwrap().id, second.id);

        coach.go_home().await?;
        assert_eq!(coach.view().screen(), Screen::ProfileManager);
        assert!(coach.active().is_none());

        coach.select_profile(&first.id).await?;
        assert_eq!(coach.view().screen(), Screen::ActivePath);

        coach.delete_profile(&first.id).await?;
        assert!(coach.active().is_none());
        assert_eq!(coach.view().screen(), Screen::ProfileManager);
        assert_eq!(coach.store().profiles().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_biographies_are_cached() -> Result<()> {
        let (mut coach, mock) = coach().await;
        mock.fail.store(true, Ordering::SeqCst);
        assert!(coach.load_biographies().await.is_err());
        assert_eq!(coach.view().screen(), Screen::ProfileManager);

        mock.fail.store(false, Ordering::SeqCst);
        assert_eq!(coach.load_biographies().await?.len(), 2);
        assert_eq!(coach.load_biographies().await?.len(), 2);
        assert_eq!(mock.bio_calls.load(Ordering::SeqCst), 2);
        assert_eq!(coach.view().screen(), Screen::Biographies);
        Ok(())
    }

    #[tokio::test]
    async fn test_narration() -> Result<()> {
        let (mut coach, _mock) = coach().await;
        assert!(coach.narration().is_none());

        coach.create_profile("a", "g", Gender::Male).await?;
        let (text, voice) = coach.narration().unwrap();
        assert_eq!(text, "message 0. Твой шаг на сегодня: step 0");
        assert_eq!(voice, Voice::Zephyr);
        Ok(())
    }
}
