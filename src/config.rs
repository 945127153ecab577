use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::settings::SettingsSource;

/// Application-level constants
pub const APP_NAME: &str = "DocSage";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable checked before the persisted setting.
pub const CREDENTIAL_ENV: &str = "OPENAI_API_KEY";
/// Overrides the chat-completion endpoint (proxies, local test servers).
pub const COMPLETIONS_URL_ENV: &str = "DOCSAGE_COMPLETIONS_URL";
/// Set by an activated Python virtualenv; selects the bridge interpreter.
pub const VIRTUAL_ENV: &str = "VIRTUAL_ENV";

pub const DEFAULT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Upper bound for one completion request, connect included.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
/// Upper bound for one retrieval subprocess.
pub const DEFAULT_BRIDGE_TIMEOUT_SECS: u64 = 60;
/// Passages requested per retrieval query.
pub const DEFAULT_RESULT_LIMIT: usize = 5;

const MAX_TEMPERATURE: f32 = 2.0;

/// Get the application data directory
/// ~/DocSage/ when a home directory is known, ./DocSage otherwise.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the persisted settings file.
pub fn settings_path() -> PathBuf {
    app_data_dir().join("settings.json")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "docsage=debug,info"
    } else {
        "docsage=info,warn"
    }
}

/// Chat-completion endpoint, honouring `DOCSAGE_COMPLETIONS_URL`.
pub fn completions_url() -> String {
    std::env::var(COMPLETIONS_URL_ENV)
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_COMPLETIONS_URL.to_string())
}

// ═══════════════════════════════════════════════════════════
// Session configuration
// ═══════════════════════════════════════════════════════════

/// Opaque API secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<redacted, {} chars>)", self.0.len())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("OpenAI API key not found. Set OPENAI_API_KEY or add it in the assistant settings.")]
    MissingCredential,

    #[error("Temperature {0} is outside the supported range 0.0-2.0")]
    InvalidTemperature(f32),

    #[error("Response token cap must be a positive integer")]
    InvalidMaxTokens,

    #[error("Settings error: {0}")]
    Settings(#[from] crate::settings::SettingsError),
}

/// Immutable per-session configuration, resolved once at initialisation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub credential: Credential,
}

impl SessionConfig {
    /// Resolve from the process environment, then the host settings.
    pub fn load(settings: &dyn SettingsSource) -> Result<Self, ConfigError> {
        Self::resolve(std::env::var(CREDENTIAL_ENV).ok(), settings)
    }

    /// Resolve with an explicit environment credential.
    ///
    /// The environment value wins when non-blank; the settings source is the
    /// fallback. Model preferences always come from the settings source.
    pub fn resolve(
        env_credential: Option<String>,
        settings: &dyn SettingsSource,
    ) -> Result<Self, ConfigError> {
        let from_env = env_credential.filter(|k| !k.trim().is_empty());
        tracing::debug!(
            source = if from_env.is_some() { "environment" } else { "settings" },
            "Resolving API credential"
        );
        let credential = from_env
            .or_else(|| settings.credential().filter(|k| !k.trim().is_empty()))
            .map(Credential::new)
            .ok_or(ConfigError::MissingCredential)?;

        let prefs = settings.model_config();
        let model = prefs
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let temperature = prefs.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(ConfigError::InvalidTemperature(temperature));
        }
        let max_tokens = prefs.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens);
        }

        tracing::info!(model = %model, temperature, max_tokens, "Session configuration loaded");
        Ok(Self {
            model,
            temperature,
            max_tokens,
            credential,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Bridge configuration
// ═══════════════════════════════════════════════════════════

/// Program argument that selects the retrieval driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeDriver {
    /// The bundled Python driver, passed inline with `-c`.
    Builtin,
    /// A script file passed as the first argument.
    Script(PathBuf),
}

/// How to launch the retrieval driver.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Interpreter or executable to run.
    pub program: PathBuf,
    /// `None` runs `program` with only the call arguments.
    pub driver: Option<BridgeDriver>,
    /// Working directory for the subprocess (the index is usually relative).
    pub working_dir: Option<PathBuf>,
    /// Exported as `PYTHONPATH` when set.
    pub python_path: Option<PathBuf>,
    pub timeout: Duration,
    pub result_limit: usize,
}

impl BridgeConfig {
    /// Bundled Python driver on the environment's interpreter.
    pub fn from_env() -> Self {
        Self {
            driver: Some(BridgeDriver::Builtin),
            ..Self::command(python_interpreter(), None)
        }
    }

    /// Project driver script on the environment's interpreter.
    pub fn python_script(script: impl Into<PathBuf>) -> Self {
        Self::command(python_interpreter(), Some(script.into()))
    }

    /// Arbitrary executable speaking the bridge protocol.
    pub fn command(program: impl Into<PathBuf>, script: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            driver: script.map(BridgeDriver::Script),
            working_dir: None,
            python_path: None,
            timeout: Duration::from_secs(DEFAULT_BRIDGE_TIMEOUT_SECS),
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_python_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.python_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `$VIRTUAL_ENV/bin/python3` if a virtualenv is active, `python3` from
/// `PATH` otherwise.
pub fn python_interpreter() -> PathBuf {
    std::env::var(VIRTUAL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|venv| PathBuf::from(venv).join("bin").join("python3"))
        .unwrap_or_else(|| PathBuf::from("python3"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemorySettings, ModelSettings};

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("DocSage"));
    }

    #[test]
    fn settings_path_under_app_data() {
        let path = settings_path();
        assert!(path.starts_with(app_data_dir()));
        assert!(path.ends_with("settings.json"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn environment_credential_wins() {
        let settings = MemorySettings::with_credential("sk-settings");
        let config = SessionConfig::resolve(Some("sk-env".into()), &settings).unwrap();
        assert_eq!(config.credential.expose(), "sk-env");
    }

    #[test]
    fn settings_credential_is_fallback() {
        let settings = MemorySettings::with_credential("sk-settings");
        let config = SessionConfig::resolve(Some("  ".into()), &settings).unwrap();
        assert_eq!(config.credential.expose(), "sk-settings");
    }

    #[test]
    fn missing_credential_is_an_error() {
        let settings = MemorySettings::default();
        let result = SessionConfig::resolve(None, &settings);
        assert!(matches!(result, Err(ConfigError::MissingCredential)));
    }

    #[test]
    fn defaults_apply_when_settings_empty() {
        let settings = MemorySettings::with_credential("sk");
        let config = SessionConfig::resolve(None, &settings).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!((config.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let settings = MemorySettings {
            credential: Some("sk".into()),
            model: ModelSettings {
                temperature: Some(2.5),
                ..Default::default()
            },
        };
        let result = SessionConfig::resolve(None, &settings);
        assert!(matches!(result, Err(ConfigError::InvalidTemperature(_))));
    }

    #[test]
    fn zero_max_tokens_rejected() {
        let settings = MemorySettings {
            credential: Some("sk".into()),
            model: ModelSettings {
                max_tokens: Some(0),
                ..Default::default()
            },
        };
        let result = SessionConfig::resolve(None, &settings);
        assert!(matches!(result, Err(ConfigError::InvalidMaxTokens)));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("sk-very-secret");
        let printed = format!("{credential:?}");
        assert!(!printed.contains("sk-very-secret"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn from_env_uses_bundled_driver() {
        let config = BridgeConfig::from_env();
        assert_eq!(config.driver, Some(BridgeDriver::Builtin));
        assert!(config.program.ends_with("python3"));
        assert_eq!(config.result_limit, DEFAULT_RESULT_LIMIT);
    }

    #[test]
    fn bridge_command_defaults() {
        let config = BridgeConfig::command("sh", Some(PathBuf::from("driver.sh")));
        assert_eq!(config.program, PathBuf::from("sh"));
        assert_eq!(
            config.driver,
            Some(BridgeDriver::Script(PathBuf::from("driver.sh")))
        );
        assert_eq!(config.result_limit, DEFAULT_RESULT_LIMIT);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_BRIDGE_TIMEOUT_SECS));
        assert!(config.working_dir.is_none());
    }
}
