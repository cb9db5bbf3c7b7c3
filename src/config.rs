use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::context::Device;
use crate::precision::{CalculateMode, DEFAULT_MAX_ENUMERATION_REALIZATIONS};
use crate::rank::TieBreaking;
use crate::topk::DEFAULT_RELEVANCE_THRESHOLD;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "RANKDIST_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub precision: PrecisionConfig,
    #[serde(default)]
    pub topk: TopKConfig,
}

/// Rank-distribution engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "pairwise" or "exact"
    #[serde(default = "default_tie_breaking")]
    pub tie_breaking: String,
    /// Batch size of the exact tie-breaking engine; 0 picks floor(sqrt(N)).
    #[serde(default)]
    pub batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            log_level: default_log_level(),
            tie_breaking: default_tie_breaking(),
            batch_size: 0,
        }
    }
}

/// Expected-precision configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PrecisionConfig {
    /// "dp" or "enumeration"
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_max_enumeration_realizations")]
    pub max_enumeration_realizations: u64,
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            max_enumeration_realizations: default_max_enumeration_realizations(),
        }
    }
}

/// Top-k answer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TopKConfig {
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
}

impl Default for TopKConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tie_breaking() -> String {
    "pairwise".to_string()
}

fn default_mode() -> String {
    "dp".to_string()
}

fn default_max_enumeration_realizations() -> u64 {
    DEFAULT_MAX_ENUMERATION_REALIZATIONS
}

fn default_relevance_threshold() -> f64 {
    DEFAULT_RELEVANCE_THRESHOLD
}

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RANKDIST_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory (defaults when absent)
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load_from(Path::new(&path)),
            Err(_) => {
                let default_path = PathBuf::from("config.toml");
                if default_path.exists() {
                    Self::load_from(&default_path)
                } else {
                    log::debug!("No config.toml found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load and validate a specific config file.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        self.device()?;
        self.tie_breaking()?;
        self.calculate_mode()?;

        if !LOG_LEVELS.contains(&self.engine.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "engine.log_level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.engine.log_level
            );
        }

        if self.precision.max_enumeration_realizations == 0 {
            anyhow::bail!("precision.max_enumeration_realizations must be greater than 0");
        }

        if !self.topk.relevance_threshold.is_finite() {
            anyhow::bail!("topk.relevance_threshold must be a finite number");
        }

        Ok(())
    }

    pub fn device(&self) -> crate::Result<Device> {
        self.engine.device.parse()
    }

    pub fn tie_breaking(&self) -> crate::Result<TieBreaking> {
        self.engine.tie_breaking.parse()
    }

    pub fn calculate_mode(&self) -> crate::Result<CalculateMode> {
        self.precision.mode.parse()
    }

    /// `engine.log_level` as a filter; validated configs always parse.
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.engine
            .log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide cwd and env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const TEST_CONFIG: &str = r#"
[engine]
device = "cpu"
log_level = "debug"
tie_breaking = "exact"
batch_size = 4

[precision]
mode = "enumeration"
max_enumeration_realizations = 5000

[topk]
relevance_threshold = 3.5
"#;

    /// Restores cwd when dropped (e.g. on panic).
    struct CwdGuard(std::path::PathBuf);
    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    fn with_config_env(config_path: Option<&Path>, f: impl FnOnce()) {
        let original_config = std::env::var(CONFIG_ENV).ok();
        match config_path {
            Some(path) => std::env::set_var(CONFIG_ENV, path),
            None => std::env::remove_var(CONFIG_ENV),
        }
        f();
        std::env::remove_var(CONFIG_ENV);
        if let Some(val) = original_config {
            std::env::set_var(CONFIG_ENV, val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, TEST_CONFIG).unwrap();
        with_config_env(Some(&config_path), || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.engine.log_level, "debug");
            assert_eq!(config.engine.batch_size, 4);
            assert_eq!(config.tie_breaking().unwrap(), TieBreaking::Exact);
            assert_eq!(config.calculate_mode().unwrap(), CalculateMode::Enumeration);
            assert_eq!(config.precision.max_enumeration_realizations, 5000);
            assert!((config.topk.relevance_threshold - 3.5).abs() < 1e-12);
            assert_eq!(config.log_level_filter(), log::LevelFilter::Debug);
        });
    }

    #[test]
    fn test_config_defaults_without_file() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let _cwd = CwdGuard(original_dir);
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(None, || {
            let config = Config::load().unwrap();
            assert_eq!(config.device().unwrap(), Device::Cpu);
            assert_eq!(config.tie_breaking().unwrap(), TieBreaking::Pairwise);
            assert_eq!(config.calculate_mode().unwrap(), CalculateMode::Dp);
            assert_eq!(config.engine.batch_size, 0);
            assert!((config.topk.relevance_threshold - 4.0).abs() < 1e-12);
            assert_eq!(config.log_level_filter(), log::LevelFilter::Info);
        });
    }

    #[test]
    fn test_config_partial_sections() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        fs::write(&config_path, "[precision]\nmode = \"dp\"\n").unwrap();
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.engine.log_level, "info");
        assert_eq!(
            config.precision.max_enumeration_realizations,
            DEFAULT_MAX_ENUMERATION_REALIZATIONS
        );
    }

    #[test]
    fn test_config_rejects_unknown_values() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let cases = [
            ("[engine]\ndevice = \"cuda\"\n", "cuda"),
            ("[engine]\ntie_breaking = \"coin\"\n", "coin"),
            ("[precision]\nmode = \"gpu\"\n", "gpu"),
            ("[engine]\nlog_level = \"loud\"\n", "loud"),
            ("[precision]\nmax_enumeration_realizations = 0\n", "max_enumeration_realizations"),
        ];
        for (i, (content, needle)) in cases.iter().enumerate() {
            let config_path = temp_dir.path().join(format!("bad{}.toml", i));
            fs::write(&config_path, content).unwrap();
            let err = Config::load_from(&config_path).unwrap_err();
            assert!(
                format!("{:#}", err).contains(needle),
                "error for {:?} should mention {}: {:#}",
                content,
                needle,
                err
            );
        }
    }

    #[test]
    fn test_config_loads_from_env_file() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("from-dotenv.toml");
        fs::write(&config_path, TEST_CONFIG).unwrap();

        // .env in the working directory names the config file
        let env_file = temp_dir.path().join(".env");
        fs::write(
            &env_file,
            format!("{}={}\n", CONFIG_ENV, config_path.canonicalize().unwrap().display()),
        )
        .unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let _cwd = CwdGuard(original_dir);
        std::env::set_current_dir(temp_dir.path()).unwrap();
        with_config_env(None, || {
            let config = Config::load();
            assert!(config.is_ok(), "Config should load via path from .env file");
            assert_eq!(config.unwrap().engine.batch_size, 4);
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        with_config_env(Some(Path::new("nonexistent.toml")), || {
            let config = Config::load();
            assert!(config.is_err());
        });
    }
}
