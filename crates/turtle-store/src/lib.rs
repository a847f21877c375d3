//! Profile storage for Sprint & Turtle
//!
//! This crate provides:
//! - The data model: profiles, progress entries, inspirations, app state
//! - SQLite persistence of the whole application state
//! - A profile store that persists after every mutation

pub mod model;
pub mod sqlite;
pub mod store;

pub use model::{AppState, DayStatus, Gender, Inspiration, Profile, ProgressEntry};
pub use sqlite::{STATE_KEY, StateDb};
pub use store::ProfileStore;
