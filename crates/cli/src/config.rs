use config::{Config, ConfigError, Environment, File, FileFormat};
use desk_engine::platform::DirectorySettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Defaults compiled into the binary; every other source overrides them.
const DEFAULT_CONFIG: &str = include_str!("../global_config.yaml");

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_dev_env")]
    pub dev_env: String,
    pub contact_book: ContactBookConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub calculator: CalculatorConfig,
    pub logging: LoggingConfig,
}

fn default_dev_env() -> String {
    "dev".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContactBookConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    default_api_key: Option<String>,
    pub timeout_ms: u64,
    #[serde(default)]
    pub backend: Backend,
}

impl ContactBookConfig {
    pub fn default_api_key(&self) -> Option<&str> {
        self.default_api_key.as_deref()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Http,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl CredentialsConfig {
    /// Configured path, else `<config dir>/deskctl/api_key`.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        match dirs::config_dir() {
            Some(dir) => dir.join("deskctl").join("api_key"),
            None => PathBuf::from(".deskctl").join("api_key"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CalculatorConfig {
    pub max_display_length: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub format: LoggingFormatConfig,
    pub levels: LoggingLevelsConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingFormatConfig {
    pub show_time: bool,
    pub location: LoggingLocationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLocationConfig {
    pub show_file: bool,
    pub show_line: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLevelsConfig {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
    pub critical: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedactionConfig {
    #[serde(default = "true_default")]
    pub enabled: bool,
    #[serde(default = "true_default")]
    pub use_default_pii: bool,
    #[serde(default)]
    pub patterns: Vec<RedactionPattern>,
}

fn true_default() -> bool {
    true
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_default_pii: true,
            patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedactionPattern {
    pub name: String,
    pub regex: String,
    pub placeholder: String,
}

impl AppConfig {
    pub fn directory_settings(&self) -> DirectorySettings {
        DirectorySettings {
            api_url: self.contact_book.api_url.clone(),
            default_api_key: self.contact_book.default_api_key.clone(),
            timeout_ms: self.contact_book.timeout_ms,
        }
    }
}

/// A sanitized view of the configuration, safe to print.
/// Excludes the default API key and the redaction rules.
#[derive(Debug, Serialize, Deserialize)]
pub struct FrontendConfig {
    pub dev_env: String,
    pub api_url: String,
    pub backend: Backend,
    pub timeout_ms: u64,
    pub credential_path: PathBuf,
    pub max_display_length: usize,
}

impl From<&AppConfig> for FrontendConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            dev_env: config.dev_env.clone(),
            api_url: config.contact_book.api_url.clone(),
            backend: config.contact_book.backend,
            timeout_ms: config.contact_book.timeout_ms,
            credential_path: config.credentials.resolved_path(),
            max_display_length: config.calculator.max_display_length,
        }
    }
}

/// Load configuration, lowest precedence first: built-in defaults, the
/// `explicit` file (required when given), `deskctl.yaml` and
/// `.deskctl.yaml` in the working directory, then `DESK__*` variables.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder =
        Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Yaml));

    if let Some(path) = explicit {
        builder = builder.add_source(File::from(path).required(true));
    }

    let builder = builder
        .add_source(File::from(Path::new("deskctl.yaml")).required(false))
        .add_source(File::from(Path::new(".deskctl.yaml")).required(false))
        // Map nested env vars like DESK__CONTACT_BOOK__BACKEND=memory
        .add_source(Environment::with_prefix("DESK").separator("__"));

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    struct EnvGuard(&'static str);
    impl EnvGuard {
        fn new(key: &'static str, val: &str) -> Self {
            env::set_var(key, val);
            Self(key)
        }
    }
    impl Drop for EnvGuard {
        fn drop(&mut self) {
            env::remove_var(self.0);
        }
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        let config = load_config(None);
        assert!(config.is_ok(), "Failed to load config: {:?}", config.err());

        let config = config.unwrap();
        assert_eq!(config.dev_env, "dev");
        assert_eq!(config.calculator.max_display_length, 9);
        assert_eq!(config.contact_book.backend, Backend::Http);
        assert_eq!(
            config.contact_book.default_api_key(),
            Some("appacademy@itvarsity.org")
        );
        assert!(config.credentials.path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_var_override_precedence() {
        let _guard = EnvGuard::new("DESK__CONTACT_BOOK__API_URL", "http://localhost:8080/");

        let config = load_config(None).expect("Should load config");
        assert_eq!(config.contact_book.api_url, "http://localhost:8080/");
    }

    #[test]
    #[serial]
    fn test_type_coercion() {
        let _guard1 = EnvGuard::new("DESK__CALCULATOR__MAX_DISPLAY_LENGTH", "12");
        let _guard2 = EnvGuard::new("DESK__LOGGING__VERBOSE", "true");
        let _guard3 = EnvGuard::new("DESK__CONTACT_BOOK__BACKEND", "memory");

        let config = load_config(None).expect("Should load config");
        assert_eq!(config.calculator.max_display_length, 12);
        assert!(config.logging.verbose);
        assert_eq!(config.contact_book.backend, Backend::Memory);
    }

    #[test]
    #[serial]
    fn test_explicit_file_overrides_defaults() {
        let path = env::temp_dir().join(format!("deskctl_test_{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "contact_book:\n  timeout_ms: 2500\ncredentials:\n  path: /tmp/deskctl-key\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).expect("Should load config");
        assert_eq!(config.contact_book.timeout_ms, 2500);
        // untouched keys keep their defaults
        assert_eq!(config.calculator.max_display_length, 9);
        assert_eq!(
            config.credentials.resolved_path(),
            PathBuf::from("/tmp/deskctl-key")
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        let path = env::temp_dir().join("deskctl_definitely_missing.yaml");
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_redaction_section_keeps_redaction_on() {
        let logging: LoggingConfig = serde_json::from_value(serde_json::json!({
            "verbose": false,
            "format": { "show_time": true, "location": { "show_file": false, "show_line": false } },
            "levels": { "debug": false, "info": false, "warning": true, "error": true, "critical": true }
        }))
        .unwrap();
        assert!(logging.redaction.enabled);
        assert!(logging.redaction.use_default_pii);
        assert!(logging.redaction.patterns.is_empty());
    }

    #[test]
    #[serial]
    fn test_directory_settings() {
        let config = load_config(None).unwrap();
        let settings = config.directory_settings();
        assert_eq!(settings.timeout_ms, 10_000);
        assert_eq!(settings.default_api_key.as_deref(), Some("appacademy@itvarsity.org"));
    }

    #[test]
    #[serial]
    fn test_frontend_config_sanitization() {
        let config = load_config(None).unwrap();
        let frontend_config = FrontendConfig::from(&config);
        let json = serde_json::to_string(&frontend_config).unwrap();

        assert!(!json.contains("appacademy@itvarsity.org"));
        assert!(!json.contains("default_api_key"));
        assert!(json.contains("max_display_length"));
    }

    #[test]
    #[serial]
    fn test_app_config_serialization_skips_default_key() {
        let config = load_config(None).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("appacademy@itvarsity.org"));
    }
}
