
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, GeneratorConfig, OllamaConfig, RerankerConfig, StoreConfig};
use crate::database::lancedb::Similarity;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 RAG Pipeline Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for embedding generation.");
    eprintln!();
    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Vector Store").bold().yellow());
    configure_store(&mut config.store)?;

    eprintln!();
    eprintln!("{}", style("Answer Generation").bold().yellow());
    configure_generator(&mut config.generator)?;

    eprintln!();
    eprintln!("{}", style("Re-ranking").bold().yellow());
    configure_reranker(&mut config.reranker)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama)? {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before ingesting.");
    }

    if std::env::var(&config.generator.api_key_env).is_err() {
        eprintln!(
            "{}",
            style(format!(
                "⚠ Warning: {} is not set; answer generation needs it",
                config.generator.api_key_env
            ))
            .yellow()
        );
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!(
        "  Dimensions: {}",
        style(config.ollama.embedding_dimension).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  URI: {}", style(config.store_uri()).cyan());
    eprintln!("  Collection: {}", style(&config.store.collection).cyan());
    eprintln!(
        "  Index: {} ({})",
        style(&config.store.index_name).cyan(),
        config.store.similarity
    );

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  k: {}, candidates: {}, text field: {}",
        style(config.retrieval.k).cyan(),
        style(config.retrieval.num_candidates).cyan(),
        style(&config.retrieval.text_field).cyan()
    );
    eprintln!(
        "  Chunking: {} tokens, {} overlap",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );
    if config.chunking.tokenizer.trim().is_empty() {
        eprintln!("  Tokenizer: {}", style("estimated").dim());
    } else {
        eprintln!("  Tokenizer: {}", style(&config.chunking.tokenizer).cyan());
    }

    eprintln!();
    eprintln!("{}", style("Re-ranker:").bold().yellow());
    if config.reranker.enabled {
        eprintln!(
            "  {} at {} (top {})",
            style(&config.reranker.model).cyan(),
            style(&config.reranker.url).cyan(),
            config.reranker.top_k
        );
    } else {
        eprintln!("  {}", style("disabled").dim());
    }

    eprintln!();
    eprintln!("{}", style("Generator:").bold().yellow());
    eprintln!("  URL: {}", style(&config.generator.base_url).cyan());
    eprintln!("  Model: {}", style(&config.generator.model).cyan());
    eprintln!(
        "  API key variable: {}",
        style(&config.generator.api_key_env).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    let config = Config::load(config_dir).unwrap_or_else(|_| {
        eprintln!(
            "{}",
            style("Existing configuration is invalid. Starting from defaults.").yellow()
        );
        Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        }
    });

    if config.config_file_path().exists() {
        eprintln!("{}", style("Found existing configuration.").green());
    }
    Ok(config)
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimensions")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (2..=8192).contains(input) {
                Ok(())
            } else {
                Err("Dimensions must be between 2 and 8192")
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_embedding_dimension(dimension)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_store(store: &mut StoreConfig) -> Result<()> {
    store.collection = Input::new()
        .with_prompt("Collection")
        .default(store.collection.clone())
        .interact_text()?;

    store.index_name = Input::new()
        .with_prompt("Vector index name")
        .default(store.index_name.clone())
        .interact_text()?;

    let similarities = [
        Similarity::Cosine,
        Similarity::Euclidean,
        Similarity::DotProduct,
    ];
    let default_index = similarities
        .iter()
        .position(|&s| s == store.similarity)
        .unwrap_or(0);
    let index = Select::new()
        .with_prompt("Similarity")
        .default(default_index)
        .items(&similarities)
        .interact()?;
    store.similarity = similarities[index];

    store.validate()?;
    Ok(())
}

fn configure_generator(generator: &mut GeneratorConfig) -> Result<()> {
    generator.base_url = Input::new()
        .with_prompt("Chat completions base URL")
        .default(generator.base_url.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            url::Url::parse(input)
                .map(|_| ())
                .map_err(|_| "Not a valid URL")
        })
        .interact_text()?;

    generator.model = Input::new()
        .with_prompt("Chat model")
        .default(generator.model.clone())
        .interact_text()?;

    generator.api_key_env = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(generator.api_key_env.clone())
        .interact_text()?;

    generator.validate()?;
    Ok(())
}

fn configure_reranker(reranker: &mut RerankerConfig) -> Result<()> {
    reranker.enabled = Confirm::new()
        .with_prompt("Re-rank retrieved passages with a cross-encoder?")
        .default(reranker.enabled)
        .interact()?;

    if reranker.enabled {
        reranker.url = Input::new()
            .with_prompt("Re-ranker URL")
            .default(reranker.url.clone())
            .interact_text()?;

        reranker.top_k = Input::new()
            .with_prompt("Passages kept after re-ranking")
            .default(reranker.top_k)
            .interact_text()?;
    }

    reranker.validate()?;
    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> Result<bool> {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => Ok(true),
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => Ok(true),
        Err(_) => Ok(false),
    }
}
