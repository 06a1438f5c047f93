/// TOML configuration (`reviewrag.toml`) with environment overrides.
pub mod toml_config;

pub use toml_config::{AppConfig, ConfigError, ModelSettings, ProviderKind, ScoreConvention};
