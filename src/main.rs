use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rag_pipeline::Result;
use rag_pipeline::commands::{
    CorpusSource, ask, chat, create_index, drop_index, ingest_corpus, list_indexes, search,
    show_history, update_index, wait_for_index,
};
use rag_pipeline::config::{Config, get_config_dir, run_interactive_config, show_config};
use rag_pipeline::corpus::{DEFAULT_DATASET, DEFAULT_ROW_LIMIT, DEFAULT_SPLIT};

#[derive(Parser)]
#[command(name = "rag-pipeline")]
#[command(about = "Retrieval-augmented question answering over a local vector store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedder, vector store, re-ranker and generator
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk, embed and store a corpus, replacing the collection
    Ingest {
        /// JSON Lines file with one document per line
        #[arg(long, conflicts_with = "dataset")]
        file: Option<PathBuf>,
        /// Hugging Face dataset to ingest instead of a file
        #[arg(long)]
        dataset: Option<String>,
        /// Dataset split
        #[arg(long, default_value = DEFAULT_SPLIT)]
        split: String,
        /// Number of dataset rows to ingest
        #[arg(long, default_value_t = DEFAULT_ROW_LIMIT)]
        limit: usize,
    },
    /// Manage the collection's vector index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Show the chunks nearest to a query
    Search {
        query: String,
        /// JSON prefilter, e.g. '{"metadata.contentType": "Video"}'
        #[arg(long)]
        filter: Option<String>,
        /// Document paths to show; all fields when omitted
        #[arg(long = "field")]
        fields: Vec<String>,
    },
    /// Answer a question from retrieved context
    Ask {
        question: String,
        /// JSON prefilter applied to retrieval
        #[arg(long)]
        filter: Option<String>,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
        /// Skip re-ranking even when a re-ranker is configured
        #[arg(long)]
        no_rerank: bool,
    },
    /// Start an interactive conversation that remembers earlier turns
    Chat {
        /// Session to resume; a new one is started when omitted
        #[arg(long)]
        session: Option<String>,
    },
    /// Show stored conversations
    History {
        /// Session to print; lists all sessions when omitted
        session: Option<String>,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Register the configured index and build it in the background
    Create {
        /// Document path that may be used in search filters (repeatable)
        #[arg(long = "filter-field")]
        filter_fields: Vec<String>,
        /// Block until the index is ready
        #[arg(long)]
        wait: bool,
    },
    /// Replace the index definition and rebuild it
    Update {
        #[arg(long = "filter-field")]
        filter_fields: Vec<String>,
        #[arg(long)]
        wait: bool,
    },
    /// Block until the index is ready or the configured timeout elapses
    Wait,
    /// List the collection's indexes
    List,
    /// Remove an index
    Drop {
        /// Index name; the configured index when omitted
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&Config::load_default()?)?;
        } else {
            run_interactive_config(&get_config_dir().map_err(anyhow::Error::from)?)?;
        }
        return Ok(());
    }

    let config = Config::load_default()?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Ingest {
            file,
            dataset,
            split,
            limit,
        } => {
            let source = match file {
                Some(path) => CorpusSource::File(path),
                None => CorpusSource::Dataset {
                    name: dataset.unwrap_or_else(|| DEFAULT_DATASET.to_string()),
                    split,
                    limit,
                },
            };
            ingest_corpus(&config, &source).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Create {
                filter_fields,
                wait,
            } => create_index(&config, filter_fields, wait).await?,
            IndexAction::Update {
                filter_fields,
                wait,
            } => update_index(&config, filter_fields, wait).await?,
            IndexAction::Wait => wait_for_index(&config).await?,
            IndexAction::List => list_indexes(&config).await?,
            IndexAction::Drop { name } => drop_index(&config, name).await?,
        },
        Commands::Search {
            query,
            filter,
            fields,
        } => {
            search(&config, &query, filter.as_deref(), fields).await?;
        }
        Commands::Ask {
            question,
            filter,
            stream,
            no_rerank,
        } => {
            ask(&config, &question, filter.as_deref(), !no_rerank, stream).await?;
        }
        Commands::Chat { session } => {
            chat(&config, session).await?;
        }
        Commands::History { session } => {
            show_history(&config, session).await?;
        }
    }

    Ok(())
}
