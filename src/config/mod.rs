// Configuration management module
// TOML settings for the store, models and retrieval, plus interactive setup

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, GeneratorConfig, HOME_ENV, OllamaConfig, RerankerConfig,
    RetrievalConfig, STORE_URI_ENV, StoreConfig,
};

/// Get the application directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::app_dir()
}
