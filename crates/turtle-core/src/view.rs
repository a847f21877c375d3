//! Screen routing

use serde::{Deserialize, Serialize};
use tracing::debug;
use turtle_store::Profile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    #[default]
    ProfileManager,
    CreateProfile,
    ActivePath,
    Biographies,
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProfileManager => write!(f, "profile-manager"),
            Self::CreateProfile => write!(f, "create-profile"),
            Self::ActivePath => write!(f, "active-path"),
            Self::Biographies => write!(f, "biographies"),
        }
    }
}

/// Which screen is showing, and whether the active path has its history
/// panel open
#[derive(Debug, Clone, Default)]
pub struct ViewController {
    screen: Screen,
    show_history: bool,
}

impl ViewController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn history_visible(&self) -> bool {
        self.show_history
    }

    /// Route after the active profile changed
    pub fn on_active_changed(&mut self, active: Option<&Profile>) {
        let next = match active {
            Some(p) if !p.is_initialized => Screen::CreateProfile,
            Some(_) => Screen::ActivePath,
            None => Screen::ProfileManager,
        };
        self.navigate(next);
    }

    pub fn navigate(&mut self, screen: Screen) {
        if screen != self.screen {
            debug!("View: {} -> {}", self.screen, screen);
            self.show_history = false;
        }
        self.screen = screen;
    }

    /// Returns the new visibility. Only the active path has a history panel.
    pub fn toggle_history(&mut self) -> bool {
        if self.screen == Screen::ActivePath {
            self.show_history = !self.show_history;
        }
        self.show_history
    }
}
