use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;
use turtle_core::audio::output::OutputKind;
use turtle_core::providers::google::{
    DEFAULT_BASE_URL, DEFAULT_SPEECH_MODEL, DEFAULT_TEXT_MODEL,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurtleConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_speech_model")]
    pub speech_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("text_model", &self.text_model)
            .field("speech_model", &self.speech_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            text_model: default_text_model(),
            speech_model: default_speech_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_text_model() -> String {
    DEFAULT_TEXT_MODEL.to_string()
}
fn default_speech_model() -> String {
    DEFAULT_SPEECH_MODEL.to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.sprint-turtle/turtle.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub output: OutputKind,
    #[serde(default = "default_wav_dir")]
    pub wav_dir: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            output: OutputKind::default(),
            wav_dir: default_wav_dir(),
        }
    }
}

fn default_wav_dir() -> String {
    "~/.sprint-turtle/narration".to_string()
}

/// Mask a secret for display: first 3 and last 4 chars of longer keys,
/// otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sprint-turtle")
}

impl TurtleConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // The file may hold an API key
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `turtle init` first.",
                path.display()
            )
        })?;

        Self::parse(&content).with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Expand allowed env vars and parse
    pub fn parse(content: &str) -> Result<Self> {
        if let Some(key) = raw_api_key(content) {
            if !key.is_empty() && !key.contains("${") {
                warn!(
                    "Gemini API key is hardcoded in config file. For security, use environment variables: api_key = \"${{GEMINI_API_KEY}}\""
                );
            }
        }

        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Copy with secrets masked, for printing
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.gemini.api_key = mask_secret(&self.gemini.api_key);
        copy
    }
}

/// `gemini.api_key` as written, before expansion
fn raw_api_key(content: &str) -> Option<String> {
    let table: toml::Table = toml::from_str(content).ok()?;
    table
        .get("gemini")?
        .get("api_key")?
        .as_str()
        .map(str::to_string)
}

/// Environment variables that may be expanded in the config file
const ALLOWED_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_AI_API_KEY", "HOME", "USER"];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = TurtleConfig::parse(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.gemini.text_model, "gemini-3-flash-preview");
        assert_eq!(config.gemini.speech_model, "gemini-2.5-flash-preview-tts");
        assert_eq!(config.gemini.timeout_secs, 60);
        assert_eq!(config.voice.output, OutputKind::Wav);
        assert_eq!(config.storage.db_path, "~/.sprint-turtle/turtle.db");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = TurtleConfig::parse("[gemini]\napi_key = \"abc\"\n").unwrap();
        assert_eq!(config.gemini.api_key, "abc");
        assert_eq!(config.gemini.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.voice.wav_dir, "~/.sprint-turtle/narration");

        let empty = TurtleConfig::parse("").unwrap();
        assert!(empty.gemini.api_key.is_empty());
    }

    #[test]
    fn test_speaker_output_parses() {
        let config = TurtleConfig::parse("[voice]\noutput = \"speaker\"\n").unwrap();
        assert_eq!(config.voice.output, OutputKind::Speaker);
        assert!(TurtleConfig::parse("[voice]\noutput = \"radio\"\n").is_err());
    }

    #[test]
    fn test_expand_env_vars_allowlist() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(expand_env_vars("dir = \"${HOME}/x\""), format!("dir = \"{}/x\"", home));
        assert_eq!(
            expand_env_vars("secret = \"${AWS_SECRET_ACCESS_KEY}\""),
            "secret = \"${AWS_SECRET_ACCESS_KEY}\""
        );
        assert_eq!(expand_env_vars("open = \"${HOME\""), "open = \"${HOME\"");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("AIzaSyABCDEFG1234"), "AIz...1234");
        assert_eq!(mask_secret("ключключключ"), "клю...ключ");
    }

    #[test]
    fn test_debug_and_redacted_hide_key() {
        let config = TurtleConfig::parse("[gemini]\napi_key = \"AIzaSyVerySecret99\"\n").unwrap();
        assert!(!format!("{:?}", config).contains("VerySecret"));
        let redacted = config.redacted();
        assert_eq!(redacted.gemini.api_key, "AIz...et99");
        assert!(!toml::to_string_pretty(&redacted).unwrap().contains("VerySecret"));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_rejects_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(TurtleConfig::load(&Some(path.clone())).is_err());

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        assert!(TurtleConfig::load(&Some(path)).is_ok());
    }
}
