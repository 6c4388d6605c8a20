use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::services::llm::LlmProvider;
use crate::utils::error::{DossierError, DossierResult};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    /// Optional model-tag registry; `--model TAG` resolves against it
    pub models: BTreeMap<String, LlmConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model_name: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            api_key: None,
            max_tokens: 4096,
            temperature: 0.3,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub db_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Concurrency across databases (default: 2)
    pub database_workers: usize,
    /// Concurrency across tables within a database (default: 3)
    pub table_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { db_dir: None, output_dir: None, database_workers: 2, table_workers: 3 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,dossier=debug".to_string(), file: None }
    }
}

/// Benchmark presets selecting default input/output paths
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Benchmark {
    Spider,
    Bird,
}

impl Benchmark {
    pub fn default_db_dir(&self) -> PathBuf {
        match self {
            Self::Spider => PathBuf::from("data/spider/database"),
            Self::Bird => PathBuf::from("data/bird/dev_databases"),
        }
    }

    pub fn default_output_dir(&self) -> PathBuf {
        match self {
            Self::Spider => PathBuf::from("output/spider"),
            Self::Bird => PathBuf::from("output/bird"),
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Compact,
    Verbose,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "dossier")]
#[command(version, about = "Rich-context dossier builder for NL-to-SQL pipelines")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Benchmark preset selecting dataset source and default paths
    #[arg(long, value_enum, value_name = "NAME")]
    pub benchmark: Option<Benchmark>,

    /// Input directory of per-database subfolders (overrides the preset)
    #[arg(long, value_name = "PATH")]
    pub db_dir: Option<PathBuf>,

    /// Output directory for dossier files (overrides the preset)
    #[arg(long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Process a single database
    #[arg(long, value_name = "NAME")]
    pub db: Option<String>,

    /// (spider only) JSON dev file whose db_id records select the databases
    #[arg(long, value_name = "PATH")]
    pub dev_file: Option<PathBuf>,

    /// Concurrency across databases
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Skip databases whose dossier file already exists
    #[arg(long)]
    pub skip_existing: bool,

    /// LLM model tag (resolved against [models] when configured)
    #[arg(long, value_name = "TAG")]
    pub model: Option<String>,

    /// Render a prompt from an existing dossier instead of running the pipeline
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub export: Option<ExportFormat>,

    /// Logging level (overrides config file, e.g. "info,dossier=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load(args: &CommandLineArgs) -> DossierResult<Self> {
        let config_path = args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::debug!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(args)?;
        config.validate()?;

        Ok(config)
    }

    /// Supported environment variables:
    /// - APP_LLM_API_BASE, APP_LLM_MODEL, APP_LLM_API_KEY (fallback: OPENAI_API_KEY)
    /// - APP_DB_DIR, APP_OUTPUT_DIR
    /// - APP_DATABASE_WORKERS, APP_TABLE_WORKERS
    /// - APP_LOG_LEVEL
    fn apply_env_overrides(&mut self) {
        if let Ok(base) = std::env::var("APP_LLM_API_BASE") {
            self.llm.api_base = base;
            tracing::info!("Override llm.api_base from env");
        }
        if let Ok(model) = std::env::var("APP_LLM_MODEL") {
            self.llm.model_name = model;
            tracing::info!("Override llm.model_name from env: {}", self.llm.model_name);
        }
        if let Ok(key) = std::env::var("APP_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        } else if self.llm.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(dir) = std::env::var("APP_DB_DIR") {
            self.pipeline.db_dir = Some(PathBuf::from(dir));
            tracing::info!("Override pipeline.db_dir from env");
        }
        if let Ok(dir) = std::env::var("APP_OUTPUT_DIR") {
            self.pipeline.output_dir = Some(PathBuf::from(dir));
            tracing::info!("Override pipeline.output_dir from env");
        }
        if let Ok(n) = std::env::var("APP_DATABASE_WORKERS")
            && let Ok(n) = n.parse()
        {
            self.pipeline.database_workers = n;
            tracing::info!("Override pipeline.database_workers from env: {}", n);
        }
        if let Ok(n) = std::env::var("APP_TABLE_WORKERS")
            && let Ok(n) = n.parse()
        {
            self.pipeline.table_workers = n;
            tracing::info!("Override pipeline.table_workers from env: {}", n);
        }
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) -> DossierResult<()> {
        if let Some(benchmark) = args.benchmark {
            if self.pipeline.db_dir.is_none() {
                self.pipeline.db_dir = Some(benchmark.default_db_dir());
            }
            if self.pipeline.output_dir.is_none() {
                self.pipeline.output_dir = Some(benchmark.default_output_dir());
            }
        }
        if let Some(dir) = &args.db_dir {
            self.pipeline.db_dir = Some(dir.clone());
        }
        if let Some(dir) = &args.output_dir {
            self.pipeline.output_dir = Some(dir.clone());
        }
        if let Some(workers) = args.workers {
            self.pipeline.database_workers = workers;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(tag) = &args.model {
            self.select_model(tag)?;
        }
        Ok(())
    }

    /// Resolve a model tag: against the `[models]` registry when one is
    /// configured, otherwise the tag is used as the literal model name.
    fn select_model(&mut self, tag: &str) -> DossierResult<()> {
        if self.models.is_empty() {
            self.llm.model_name = tag.to_string();
            return Ok(());
        }
        match self.models.get(tag) {
            Some(entry) => {
                let mut selected = entry.clone();
                if selected.api_key.is_none() {
                    selected.api_key = self.llm.api_key.clone();
                }
                self.llm = selected;
                Ok(())
            }
            None => Err(DossierError::config(format!(
                "unknown model tag '{}'; configured tags: {}",
                tag,
                self.models.keys().cloned().collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Validate configuration
    fn validate(&self) -> DossierResult<()> {
        if self.pipeline.database_workers == 0 {
            return Err(DossierError::config("pipeline.database_workers must be > 0"));
        }
        if self.pipeline.table_workers == 0 {
            return Err(DossierError::config("pipeline.table_workers must be > 0"));
        }
        if self.llm.api_base.is_empty() {
            return Err(DossierError::config("llm.api_base cannot be empty"));
        }
        Ok(())
    }

    /// Provider handed to the LLM client
    pub fn provider(&self) -> LlmProvider {
        LlmProvider {
            api_base: self.llm.api_base.clone(),
            model_name: self.llm.model_name.clone(),
            api_key: self.llm.api_key.clone(),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            timeout_seconds: self.llm.timeout_seconds,
        }
    }

    /// Input directory; running the pipeline requires one
    pub fn db_dir(&self) -> DossierResult<&Path> {
        self.pipeline
            .db_dir
            .as_deref()
            .ok_or_else(|| DossierError::config("no database directory: pass --benchmark or --db-dir"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.pipeline.output_dir.clone().unwrap_or_else(|| PathBuf::from("output"))
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> DossierResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| DossierError::config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CommandLineArgs {
        let mut argv = vec!["dossier"];
        argv.extend_from_slice(extra);
        CommandLineArgs::parse_from(argv)
    }

    #[test]
    fn benchmark_presets_fill_paths() {
        let mut config = Config::default();
        config.apply_cli_overrides(&args(&["--benchmark", "spider"])).unwrap();
        assert_eq!(config.pipeline.db_dir.as_deref(), Some(Path::new("data/spider/database")));
        assert_eq!(config.pipeline.output_dir.as_deref(), Some(Path::new("output/spider")));
    }

    #[test]
    fn explicit_dirs_beat_presets() {
        let mut config = Config::default();
        config
            .apply_cli_overrides(&args(&["--benchmark", "bird", "--db-dir", "/tmp/dbs"]))
            .unwrap();
        assert_eq!(config.pipeline.db_dir.as_deref(), Some(Path::new("/tmp/dbs")));
        assert_eq!(
            config.pipeline.output_dir.as_deref(),
            Some(Path::new("output/bird"))
        );
    }

    #[test]
    fn model_tag_without_registry_is_a_model_name() {
        let mut config = Config::default();
        config.apply_cli_overrides(&args(&["--model", "deepseek-chat"])).unwrap();
        assert_eq!(config.llm.model_name, "deepseek-chat");
    }

    #[test]
    fn unknown_model_tag_with_registry_is_a_config_error() {
        let mut config = Config::default();
        config.models.insert("fast".into(), LlmConfig::default());
        let err = config.apply_cli_overrides(&args(&["--model", "huge"])).unwrap_err();
        assert!(matches!(err, DossierError::Config(_)));

        let mut config2 = Config::default();
        config2.models.insert("fast".into(), LlmConfig {
            model_name: "gpt-4o".into(),
            ..LlmConfig::default()
        });
        config2.apply_cli_overrides(&args(&["--model", "fast"])).unwrap();
        assert_eq!(config2.llm.model_name, "gpt-4o");
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = Config::default();
        config.pipeline.database_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_sections_parse() {
        let config: Config = toml::from_str(
            r#"
            [llm]
            api_base = "https://api.deepseek.com/v1"
            model_name = "deepseek-chat"

            [pipeline]
            database_workers = 4
            table_workers = 6

            [models.fast]
            model_name = "deepseek-chat"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.api_base, "https://api.deepseek.com/v1");
        assert_eq!(config.pipeline.database_workers, 4);
        assert!(config.models.contains_key("fast"));
        assert_eq!(config.logging.level, "debug");
    }
}
