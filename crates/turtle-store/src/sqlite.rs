//! SQLite persistence for the application state
//!
//! The whole [`AppState`] is stored as one JSON document under a fixed key,
//! replaced on every save.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::model::AppState;

/// Key the state document is stored under
pub const STATE_KEY: &str = "sprint_turtle_global_v1";

/// SQLite database wrapper (thread-safe via Arc<Mutex>)
#[derive(Clone)]
pub struct StateDb {
    conn: Arc<Mutex<Connection>>,
}

impl StateDb {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open SQLite database at {:?}", path.as_ref()))?;
        info!("Opened state database at {:?}", path.as_ref());
        Self::init(conn)
    }

    /// Database that lives only as long as this handle
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create app_state table")?;

        debug!("State schema initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Load the stored state; an empty database yields the default state
    pub async fn load_state(&self) -> Result<AppState> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|poisoned| {
                warn!("Database mutex was poisoned, recovering");
                poisoned.into_inner()
            });
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM app_state WHERE key = ?1",
                    params![STATE_KEY],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(raw) = raw else {
                debug!("No stored state, starting empty");
                return Ok(AppState::default());
            };

            let mut state: AppState = serde_json::from_str(&raw)
                .context("Stored application state is not valid JSON")?;
            state.normalize();
            debug!("Loaded state with {} profiles", state.profiles.len());
            Ok(state)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Replace the stored state
    pub async fn save_state(&self, state: &AppState) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let json = serde_json::to_string(state).context("Failed to serialize application state")?;

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|poisoned| {
                warn!("Database mutex was poisoned, recovering");
                poisoned.into_inner()
            });
            conn.execute(
                "INSERT INTO app_state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![STATE_KEY, json, Utc::now().to_rfc3339()],
            )
            .context("Failed to write application state")?;
            debug!("Saved state ({} bytes)", json.len());
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Overwrite the stored document with raw text
    #[cfg(test)]
    pub(crate) async fn write_raw(&self, value: &str) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let value = value.to_owned();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            conn.execute(
                "INSERT OR REPLACE INTO app_state (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![STATE_KEY, value, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DayStatus, Gender, Profile, ProgressEntry};

    #[tokio::test]
    async fn test_empty_database_loads_default() -> Result<()> {
        let db = StateDb::in_memory()?;
        let state = db.load_state().await?;
        assert!(state.profiles.is_empty());
        assert!(state.active_profile_id.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_and_reload_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state.db");

        let mut state = AppState::default();
        let mut profile = Profile::new("Ivan", Gender::Male, "read every day");
        profile.history.push(ProgressEntry::new(DayStatus::Minimum, "read one page"));
        state.add_profile(profile)?;

        {
            let db = StateDb::open(&path)?;
            db.save_state(&state).await?;
        }

        let db = StateDb::open(&path)?;
        let loaded = db.load_state().await?;
        assert_eq!(loaded, state);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_overwrites() -> Result<()> {
        let db = StateDb::in_memory()?;
        let mut state = AppState::default();
        state.add_profile(Profile::new("a", Gender::Male, "g"))?;
        db.save_state(&state).await?;

        state.deactivate();
        db.save_state(&state).await?;

        let loaded = db.load_state().await?;
        assert!(loaded.active_profile_id.is_none());
        assert_eq!(loaded.profiles.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() -> Result<()> {
        let db = StateDb::in_memory()?;
        db.write_raw("{not json").await?;
        assert!(db.load_state().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_loads_document_written_by_web_client() -> Result<()> {
        let db = StateDb::in_memory()?;
        db.write_raw(
            r#"{"profiles":[{"id":"p1","userName":"Оля","gender":"female","mainGoal":"йога",
                "history":[{"date":"2024-05-01T08:00:00.000Z","status":"PARTIAL","step":"растяжка"}],
                "currentStep":"","currentMessage":"Отдыхай","isSprint":false,"isChaos":false,
                "isInitialized":true}],"activeProfileId":"p1"}"#,
        )
        .await?;

        let state = db.load_state().await?;
        let active = state.active().expect("active profile");
        assert_eq!(active.user_name, "Оля");
        assert_eq!(active.history[0].status, DayStatus::Partial);
        assert!(active.daily_inspiration.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_dangling_active_id_cleared_on_load() -> Result<()> {
        let db = StateDb::in_memory()?;
        db.write_raw(r#"{"profiles":[],"activeProfileId":"ghost"}"#).await?;
        let state = db.load_state().await?;
        assert!(state.active_profile_id.is_none());
        Ok(())
    }
}
