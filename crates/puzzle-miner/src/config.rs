//! Configuration file loading for the puzzle miner.
//!
//! Settings come from `puzzle-miner.toml` when present; every field has a
//! default so a missing file or a partial file is fine. Command-line flags
//! are applied on top in `main`.

use blunder_analysis::{
    AnalysisConfig, BlunderPolicy, EngineOptions, PolicyError, SearchBudget, Strictness,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading or resolving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
    /// The resulting classification policy is inconsistent.
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Engine process and search limits.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Path to the Stockfish executable. Defaults to "stockfish" (in PATH).
    #[serde(default = "default_engine_path")]
    pub path: String,
    /// Thinking time per query, in seconds.
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: f64,
    /// Depth limit per query.
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default)]
    pub hash_mb: Option<u32>,
}

fn default_engine_path() -> String {
    "stockfish".to_string()
}

fn default_time_limit() -> f64 {
    20.0
}

fn default_depth() -> u32 {
    22
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_engine_path(),
            time_limit_secs: default_time_limit(),
            depth: default_depth(),
            threads: None,
            hash_mb: None,
        }
    }
}

/// Classification settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AnalysisSettings {
    #[serde(default)]
    pub strictness: Strictness,
    /// Base threshold `T`, in centipawns, for the secondary pass. The primary
    /// blunder rule keeps the preset's threshold.
    #[serde(default = "default_rescan_threshold")]
    pub rescan_threshold: i32,
}

fn default_rescan_threshold() -> i32 {
    500
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            strictness: Strictness::default(),
            rescan_threshold: default_rescan_threshold(),
        }
    }
}

/// Top-level miner configuration.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MinerConfig {
    /// Player whose games are analyzed. Required, from here or `--username`.
    #[serde(default)]
    pub username: Option<String>,
    /// Platform name recorded in the puzzles file.
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    /// Evaluation log appended to across runs.
    #[serde(default = "default_eval_log_file")]
    pub eval_log_file: PathBuf,
    /// Root for per-game evaluations and themed puzzle files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Most games analyzed per run.
    #[serde(default = "default_max_games")]
    pub max_games: usize,
    /// Games shorter than this many full moves are skipped.
    #[serde(default = "default_min_moves")]
    pub min_moves: usize,
    /// Persist every position evaluation, not only puzzles.
    #[serde(default = "default_log_all_evaluations")]
    pub log_all_evaluations: bool,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

fn default_platform() -> String {
    "lichess".to_string()
}

fn default_output_file() -> PathBuf {
    PathBuf::from("puzzles.json")
}

fn default_eval_log_file() -> PathBuf {
    PathBuf::from("position_evaluations.json")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_games() -> usize {
    15
}

fn default_min_moves() -> usize {
    10
}

fn default_log_all_evaluations() -> bool {
    true
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            username: None,
            platform: default_platform(),
            output_file: default_output_file(),
            eval_log_file: default_eval_log_file(),
            data_dir: default_data_dir(),
            max_games: default_max_games(),
            min_moves: default_min_moves(),
            log_all_evaluations: default_log_all_evaluations(),
            engine: EngineConfig::default(),
            analysis: AnalysisSettings::default(),
        }
    }
}

impl MinerConfig {
    /// Loads the configuration from `path`.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// or [`ConfigError::ParseError`] if the file contains invalid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default configuration file path.
    pub fn config_path() -> PathBuf {
        PathBuf::from("puzzle-miner.toml")
    }

    pub fn evaluations_dir(&self) -> PathBuf {
        self.data_dir.join("evaluations")
    }

    pub fn puzzles_dir(&self) -> PathBuf {
        self.data_dir.join("puzzles")
    }

    /// Search limits for every oracle query.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] for a time limit that is not a
    /// positive finite number of seconds, or a zero depth.
    pub fn search_budget(&self) -> Result<SearchBudget, ConfigError> {
        let secs = self.engine.time_limit_secs;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                field: "engine.time_limit_secs",
                reason: format!("expected a positive number of seconds, got {}", secs),
            });
        }
        if self.engine.depth == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "engine.depth",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(SearchBudget::new(
            Some(Duration::from_secs_f64(secs)),
            Some(self.engine.depth),
        ))
    }

    /// Classification policy for the configured strictness.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Policy`] if the preset is inconsistent.
    pub fn policy(&self) -> Result<BlunderPolicy, ConfigError> {
        let policy = self.analysis.strictness.policy();
        policy.validate()?;
        Ok(policy)
    }

    /// Base threshold for the secondary pass.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] if it is not positive.
    pub fn rescan_threshold(&self) -> Result<i32, ConfigError> {
        let threshold = self.analysis.rescan_threshold;
        if threshold <= 0 {
            return Err(ConfigError::InvalidSetting {
                field: "analysis.rescan_threshold",
                reason: format!("must be positive, got {}", threshold),
            });
        }
        Ok(threshold)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            threads: self.engine.threads,
            hash_mb: self.engine.hash_mb,
        }
    }

    /// Everything the analyzer needs, validated.
    pub fn analysis_config(&self) -> Result<AnalysisConfig, ConfigError> {
        Ok(AnalysisConfig {
            budget: self.search_budget()?,
            policy: self.policy()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
username = "alice"
platform = "chess.com"
output_file = "out/puzzles.json"
eval_log_file = "out/evals.json"
data_dir = "out/data"
max_games = 3
min_moves = 20
log_all_evaluations = false

[engine]
path = "/usr/local/bin/stockfish"
time_limit_secs = 0.5
depth = 12
threads = 4
hash_mb = 256

[analysis]
strictness = "relaxed"
rescan_threshold = 400
"#;

        let config: MinerConfig = toml::from_str(toml_content).unwrap();

        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.platform, "chess.com");
        assert_eq!(config.output_file, PathBuf::from("out/puzzles.json"));
        assert_eq!(config.eval_log_file, PathBuf::from("out/evals.json"));
        assert_eq!(config.evaluations_dir(), PathBuf::from("out/data/evaluations"));
        assert_eq!(config.puzzles_dir(), PathBuf::from("out/data/puzzles"));
        assert_eq!(config.max_games, 3);
        assert_eq!(config.min_moves, 20);
        assert!(!config.log_all_evaluations);

        assert_eq!(config.engine.path, "/usr/local/bin/stockfish");
        assert_eq!(config.engine.depth, 12);
        assert_eq!(
            config.engine_options(),
            EngineOptions {
                threads: Some(4),
                hash_mb: Some(256),
            }
        );

        assert_eq!(config.analysis.strictness, Strictness::Relaxed);
        assert_eq!(config.rescan_threshold().unwrap(), 400);
        assert_eq!(config.policy().unwrap().threshold, 500);
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config: MinerConfig = toml::from_str("").unwrap();
        assert_eq!(config, MinerConfig::default());

        assert_eq!(config.username, None);
        assert_eq!(config.platform, "lichess");
        assert_eq!(config.output_file, PathBuf::from("puzzles.json"));
        assert_eq!(config.eval_log_file, PathBuf::from("position_evaluations.json"));
        assert_eq!(config.max_games, 15);
        assert_eq!(config.min_moves, 10);
        assert!(config.log_all_evaluations);
        assert_eq!(config.engine.path, "stockfish");
        assert_eq!(config.engine.time_limit_secs, 20.0);
        assert_eq!(config.engine.depth, 22);
        assert_eq!(config.analysis.strictness, Strictness::Standard);
        assert_eq!(config.analysis.rescan_threshold, 500);
    }

    #[test]
    fn test_partial_engine_section() {
        let config: MinerConfig = toml::from_str("[engine]\ndepth = 8\n").unwrap();
        assert_eq!(config.engine.depth, 8);
        assert_eq!(config.engine.path, "stockfish");
        assert_eq!(config.engine.time_limit_secs, 20.0);
    }

    #[test]
    fn test_unknown_strictness_is_rejected() {
        let result: Result<MinerConfig, _> = toml::from_str("[analysis]\nstrictness = \"brutal\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = MinerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, MinerConfig::default());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("puzzle-miner.toml");
        std::fs::write(&path, "username = \"bob\"\nmax_games = 2\n").unwrap();

        let config = MinerConfig::load(&path).unwrap();
        assert_eq!(config.username.as_deref(), Some("bob"));
        assert_eq!(config.max_games, 2);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "max_games = [").unwrap();

        assert!(matches!(
            MinerConfig::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_search_budget() {
        let config = MinerConfig::default();
        assert_eq!(
            config.search_budget().unwrap(),
            SearchBudget::new(Some(Duration::from_secs(20)), Some(22))
        );
    }

    #[test]
    fn test_invalid_time_limit() {
        let mut config = MinerConfig::default();
        config.engine.time_limit_secs = 0.0;
        assert!(matches!(
            config.search_budget(),
            Err(ConfigError::InvalidSetting { field: "engine.time_limit_secs", .. })
        ));

        config.engine.time_limit_secs = f64::NAN;
        assert!(config.search_budget().is_err());
    }

    #[test]
    fn test_zero_depth_rejected() {
        let mut config = MinerConfig::default();
        config.engine.depth = 0;
        assert!(config.analysis_config().is_err());
    }

    #[test]
    fn test_non_positive_rescan_threshold_rejected() {
        let mut config = MinerConfig::default();
        config.analysis.rescan_threshold = 0;
        assert!(matches!(
            config.rescan_threshold(),
            Err(ConfigError::InvalidSetting { field: "analysis.rescan_threshold", .. })
        ));
        assert!(config.policy().is_ok());
    }

    #[test]
    fn test_rescan_threshold_leaves_primary_rule() {
        let mut config = MinerConfig::default();
        config.analysis.rescan_threshold = 200;
        let policy = config.policy().unwrap();
        assert_eq!(policy, BlunderPolicy::default());
        assert_eq!(policy.threshold, 500);
        assert_eq!(config.rescan_threshold().unwrap(), 200);
    }

    #[test]
    fn test_analysis_config() {
        let config = MinerConfig::default();
        let analysis = config.analysis_config().unwrap();
        assert_eq!(analysis.policy, BlunderPolicy::default());
        assert_eq!(analysis.budget.depth, Some(22));
    }
}
