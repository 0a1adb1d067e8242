
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use tracing::{info, warn};

use crate::config::Config;
use crate::corpus::{self, Document};
use crate::database::lancedb::{Filter, VectorIndex};
use crate::pipeline::{QueryOptions, RagContext, render_fields};

/// Where `ingest` reads its documents from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusSource {
    /// JSON Lines file, one document per line
    File(PathBuf),
    /// Rows of a Hugging Face dataset
    Dataset {
        name: String,
        split: String,
        limit: usize,
    },
}

impl CorpusSource {
    fn load(&self) -> Result<Vec<Document>> {
        match self {
            CorpusSource::File(path) => corpus::load_jsonl(path),
            CorpusSource::Dataset { name, split, limit } => corpus::fetch_dataset_rows(
                corpus::DEFAULT_DATASETS_SERVER,
                name,
                split,
                *limit,
            ),
        }
    }
}

/// Replace the configured collection with the documents of `source`
#[inline]
pub async fn ingest_corpus(config: &Config, source: &CorpusSource) -> Result<()> {
    let documents = source.load().context("Failed to load corpus")?;
    let context = RagContext::from_config(config).await?;
    ingest_documents(&context, &documents).await
}

async fn ingest_documents(context: &RagContext, documents: &[Document]) -> Result<()> {
    if documents.is_empty() {
        println!("No documents found, emptying '{}'.", context.settings().collection);
    }

    let report = context.ingest(documents).await?;
    // Index rebuilds run on this process's runtime
    context.store().finish_pending_builds().await;

    println!(
        "{} Ingested {} documents as {} chunks into '{}'",
        style("✓").green(),
        report.documents,
        report.chunks,
        context.settings().collection
    );
    if report.empty_documents > 0 {
        println!(
            "  {} documents had no text in '{}'",
            report.empty_documents,
            context.settings().text_field
        );
    }
    Ok(())
}

/// Register the configured vector index, optionally waiting until it is queryable
#[inline]
pub async fn create_index(config: &Config, filter_fields: Vec<String>, wait: bool) -> Result<()> {
    let context = RagContext::from_config(config).await?;
    let definition = config.index_definition(filter_fields);

    let index = context
        .store()
        .create_index(&config.store.collection, &definition)
        .await?;
    println!(
        "Created index '{}' on '{}' ({})",
        index.name, index.collection, index.status
    );

    if wait {
        wait_until_ready(config, &context).await?;
    } else {
        context.store().finish_pending_builds().await;
    }
    Ok(())
}

/// Replace the configured index's definition and rebuild it
#[inline]
pub async fn update_index(config: &Config, filter_fields: Vec<String>, wait: bool) -> Result<()> {
    let context = RagContext::from_config(config).await?;
    let definition = config.index_definition(filter_fields);

    let index = context
        .store()
        .update_index(&config.store.collection, &definition.name, &definition)
        .await?;
    println!(
        "Updated index '{}' (generation {}, {})",
        index.name, index.generation, index.status
    );

    if wait {
        wait_until_ready(config, &context).await?;
    } else {
        context.store().finish_pending_builds().await;
    }
    Ok(())
}

#[inline]
pub async fn wait_for_index(config: &Config) -> Result<()> {
    let context = RagContext::from_config(config).await?;
    wait_until_ready(config, &context).await
}

async fn wait_until_ready(config: &Config, context: &RagContext) -> Result<()> {
    let timeout = Duration::from_secs(config.store.index_ready_timeout_secs);
    info!(
        "Waiting up to {:?} for index '{}'",
        timeout, config.store.index_name
    );

    context
        .store()
        .wait_for_index_ready(&config.store.collection, &config.store.index_name, timeout)
        .await?;
    println!(
        "{} Index '{}' is ready",
        style("✓").green(),
        config.store.index_name
    );
    Ok(())
}

#[inline]
pub async fn list_indexes(config: &Config) -> Result<()> {
    let context = RagContext::from_config(config).await?;
    let collection = &config.store.collection;
    let indexes = context.store().list_indexes(collection).await?;
    let rows = context.store().count(collection).await?;

    println!("Collection '{}' ({} chunks)", collection, rows);
    if indexes.is_empty() {
        println!("No indexes yet. Use 'rag-pipeline index create' to add one.");
        return Ok(());
    }

    println!();
    for index in &indexes {
        print_index(index);
    }
    Ok(())
}

fn print_index(index: &VectorIndex) {
    println!("🔎 {} ({})", index.name, index.status);
    println!(
        "   Vectors: {} x {} ({})",
        index.vector_field, index.dimensions, index.similarity
    );
    if !index.filter_fields.is_empty() {
        println!("   Filter fields: {}", index.filter_fields.join(", "));
    }
    println!("   Generation: {}", index.generation);
    if let Some(error) = &index.error_message {
        println!("   ⚠️  Error: {}", error);
    }
    println!(
        "   Updated: {}",
        index.updated_date.format("%Y-%m-%d %H:%M:%S")
    );
    println!();
}

#[inline]
pub async fn drop_index(config: &Config, name: Option<String>) -> Result<()> {
    let context = RagContext::from_config(config).await?;
    let name = name.unwrap_or_else(|| config.store.index_name.clone());

    context
        .store()
        .drop_index(&config.store.collection, &name)
        .await?;
    println!("Dropped index '{}'", name);
    Ok(())
}

/// Parse a `--filter` argument into a search prefilter
#[inline]
pub fn parse_filter(raw: Option<&str>) -> Result<Option<Filter>> {
    raw.map(|raw| -> Result<Filter> {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("Filter must be valid JSON")?;
        Ok(Filter::from_json(&value)?)
    })
    .transpose()
}

/// Print the nearest chunks to `query`
#[inline]
pub async fn search(
    config: &Config,
    query: &str,
    filter: Option<&str>,
    fields: Vec<String>,
) -> Result<()> {
    let filter = parse_filter(filter)?;
    let context = RagContext::from_config(config).await?;
    let results = context.search(query, filter, fields).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} (score {:.3})",
            rank + 1,
            style(&result.document_id).bold(),
            result.score
        );
        println!("{}", render_fields(&result.fields));
        println!();
    }
    Ok(())
}

/// Answer a single question
#[inline]
pub async fn ask(
    config: &Config,
    question: &str,
    filter: Option<&str>,
    rerank: bool,
    stream: bool,
) -> Result<()> {
    let options = QueryOptions {
        filter: parse_filter(filter)?,
        rerank,
    };
    let context = RagContext::from_config(config).await?;

    if stream {
        let mut stdout = std::io::stdout();
        for fragment in context.answer_stream(question, &options).await? {
            write!(stdout, "{}", fragment?)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
    } else {
        println!("{}", context.answer(question, &options).await?);
    }
    Ok(())
}

/// Interactive conversation backed by session history
///
/// An empty line or `exit` ends the session.
#[inline]
pub async fn chat(config: &Config, session: Option<String>) -> Result<()> {
    let context = RagContext::from_config(config).await?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let previous = context.history().get_session(&session_id).await?;
    eprintln!(
        "{} {} ({} earlier turns)",
        style("Session").bold().cyan(),
        style(&session_id).cyan(),
        previous.len()
    );
    eprintln!("Type an empty line or 'exit' to quit.");

    loop {
        let question: String = Input::new()
            .with_prompt("you")
            .allow_empty(true)
            .interact_text()?;
        let question = question.trim();
        if question.is_empty() || question == "exit" {
            break;
        }

        match context.chat(&session_id, question).await {
            Ok(answer) => println!("{} {}", style("assistant:").bold().green(), answer),
            Err(e) => {
                warn!("Chat turn failed: {}", e);
                eprintln!("{} {}", style("error:").bold().red(), e);
            }
        }
    }

    eprintln!("Resume with: rag-pipeline chat --session {}", session_id);
    Ok(())
}

/// Print one session's turns, or a summary of every session
#[inline]
pub async fn show_history(config: &Config, session: Option<String>) -> Result<()> {
    let context = RagContext::from_config(config).await?;

    let Some(session_id) = session else {
        let sessions = context.history().list_sessions().await?;
        if sessions.is_empty() {
            println!("No chat sessions yet.");
            return Ok(());
        }
        println!("Chat sessions ({} total):", sessions.len());
        for summary in &sessions {
            println!(
                "  {} - {} turns, last active {}",
                summary.session_id,
                summary.turn_count,
                summary.last_activity.format("%Y-%m-%d %H:%M:%S")
            );
        }
        return Ok(());
    };

    let turns = context.history().get_session(&session_id).await?;
    if turns.is_empty() {
        println!("Session '{}' has no turns.", session_id);
        return Ok(());
    }
    for turn in &turns {
        println!(
            "[{}] {}: {}",
            turn.created_date.format("%H:%M:%S"),
            style(turn.role).bold(),
            turn.content
        );
    }
    Ok(())
}
