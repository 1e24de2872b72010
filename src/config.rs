use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: usize,
    pub query_timeout_secs: u64,
    pub introspection_concurrency: usize,
    /// Schema whose tables are exposed to the model
    pub schema: String,
    /// Only allow single read statements through the executor
    pub read_only_guard: bool,
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "gemini", "remote", or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub summary_row_limit: usize,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub table: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub history: HistoryConfig,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// DuckDB database file to query
    #[arg(long, value_name = "FILE")]
    pub database: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();

        let mut config_builder = Config::builder()
            .set_default("database.path", defaults.database.path)?
            .set_default("database.pool_size", defaults.database.pool_size as u64)?
            .set_default("database.query_timeout_secs", defaults.database.query_timeout_secs)?
            .set_default(
                "database.introspection_concurrency",
                defaults.database.introspection_concurrency as u64,
            )?
            .set_default("database.schema", defaults.database.schema)?
            .set_default("database.read_only_guard", defaults.database.read_only_guard)?
            .set_default("web.host", defaults.web.host)?
            .set_default("web.port", defaults.web.port as u64)?
            .set_default("llm.backend", defaults.llm.backend)?
            .set_default("llm.model", defaults.llm.model)?
            .set_default("llm.timeout_secs", defaults.llm.timeout_secs)?
            .set_default("llm.temperature", defaults.llm.temperature as f64)?
            .set_default("llm.summary_row_limit", defaults.llm.summary_row_limit as u64)?
            .set_default("history.enabled", defaults.history.enabled)?
            .set_default("history.table", defaults.history.table)?;

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = [
                "config.toml",
                "config/config.toml",
                "/etc/nl-insight/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NL_INSIGHT__LLM__API_KEY and friends
        config_builder = config_builder.add_source(
            Environment::with_prefix("NL_INSIGHT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.path = database.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.pool_size == 0 {
            return Err(ConfigError::Message("database.pool_size must be at least 1".into()));
        }
        if self.database.introspection_concurrency == 0 {
            return Err(ConfigError::Message(
                "database.introspection_concurrency must be at least 1".into(),
            ));
        }
        if self.llm.timeout_secs == 0 || self.database.query_timeout_secs == 0 {
            return Err(ConfigError::Message("timeouts must be at least one second".into()));
        }
        if !self
            .history
            .table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Message(
                "history.table must be alphanumeric with underscores".into(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "nl-insight.duckdb".to_string(),
                pool_size: 5,
                query_timeout_secs: 30,
                introspection_concurrency: 4,
                schema: "main".to_string(),
                read_only_guard: false,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            llm: LlmConfig {
                backend: "gemini".to_string(),
                model: "gemini-2.0-flash".to_string(),
                api_key: None,
                api_url: None,
                timeout_secs: 60,
                temperature: 0.1,
                summary_row_limit: 200,
            },
            history: HistoryConfig {
                enabled: true,
                table: "chat_history".to_string(),
            },
        }
    }
}
