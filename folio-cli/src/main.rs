//! `ask-portfolio`: ask questions about a resume or portfolio from the terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use folio_rag::{
    AppConfig, GeminiClient, GeminiEmbeddingProvider, GeminiGenerator, IndexStatus, Orchestrator,
    RagError, VectorIndex,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ask-portfolio", about = "Ask questions about a resume or portfolio", version)]
struct Cli {
    /// Directory with the portfolio documents (overrides FOLIO_CORPUS_DIR)
    #[arg(long)]
    corpus_dir: Option<PathBuf>,

    /// Directory holding the saved vector index (overrides FOLIO_INDEX_DIR)
    #[arg(long)]
    index_dir: Option<PathBuf>,

    /// Number of passages retrieved per question (overrides FOLIO_TOP_K)
    #[arg(long)]
    top_k: Option<usize>,

    /// Rebuild the vector index even if one is saved
    #[arg(long)]
    rebuild: bool,

    /// Answer a single question and exit
    #[arg(short, long)]
    question: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(dir) = &self.corpus_dir {
            config.corpus_dir = dir.clone();
        }
        if let Some(dir) = &self.index_dir {
            config.index_dir = dir.clone();
        }
        if let Some(k) = self.top_k {
            ensure!(k > 0, "--top-k must be at least 1");
            config.top_k = k;
        }
        Ok(())
    }
}

/// Report an index that could not be prepared.
///
/// The interactive prompt keeps running and answers every question with the
/// setup message. A one-shot question fails the process instead.
fn index_unavailable(cli: &Cli, e: RagError) -> Result<()> {
    error!(error = %e, "vector index is not available");
    if cli.question.is_some() {
        return Err(anyhow::Error::new(e).context("portfolio index is not available"));
    }
    eprintln!("{}", e.user_message());
    Ok(())
}

fn welcome(subject: &str) -> String {
    format!(
        "💼 Ask My Resume/Portfolio\n\
         \n\
         👋 Welcome! This assistant knows {subject}'s portfolio inside out.\n\
         💡 Ask anything about experience, tech stack, or whether they are a great fit for your team.\n\
         \n\
         ✨ Try questions like:\n\
         \x20 - Is {subject} a good fit for .NET or Azure Cloud?\n\
         \x20 - What are their skills in AI or Cloud Computing?\n\
         \x20 - Which projects have they worked on?\n\
         \n\
         Type 'exit' or press Ctrl-D to quit.\n"
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let filter = if cli.verbose { "warn,folio_rag=debug,ask_portfolio=debug" } else { "warn,folio_rag=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut config = AppConfig::from_env().context("failed to load configuration")?;
    cli.apply(&mut config)?;
    info!(?config, "configuration loaded");

    let client = GeminiClient::from_config(&config)?;
    let embedder = GeminiEmbeddingProvider::from_config(client.clone(), &config);
    let generator = GeminiGenerator::new(client, &config.generation_model);

    let orchestrator = Orchestrator::builder()
        .config(config)
        .embedding_provider(Arc::new(embedder))
        .generator(Arc::new(generator))
        .build()?;

    let interactive = cli.question.is_none();
    if interactive {
        println!("{}", welcome(&orchestrator.config().subject_name));
    }

    if cli.rebuild || !VectorIndex::exists(&orchestrator.config().index_dir) {
        eprintln!("🔍 First-time setup: Processing portfolio documents...");
    }
    let status = if cli.rebuild { orchestrator.rebuild().await } else { orchestrator.prepare().await };
    match status {
        Ok(IndexStatus::Built { entries }) => {
            eprintln!("✅ Portfolio processed and vector store saved ({entries} passages).");
        }
        Ok(IndexStatus::Loaded { .. }) => {}
        Err(e) => index_unavailable(&cli, e)?,
    }

    if let Some(question) = &cli.question {
        println!("{}", orchestrator.respond(question).await);
        return Ok(());
    }

    let mut editor = DefaultEditor::new().context("failed to start line editor")?;
    loop {
        match editor.readline("🧠 Ask me anything: ") {
            Ok(line) => {
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                if matches!(question, "exit" | "quit") {
                    break;
                }
                let _ = editor.add_history_entry(question);
                println!("\n> {}\n", orchestrator.respond(question).await);
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("failed to read input"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig::builder().api_key("key").build().unwrap()
    }

    #[test]
    fn flags_override_the_environment() {
        let cli = Cli::try_parse_from(["ask-portfolio", "--corpus-dir", "docs", "--top-k", "3"]).unwrap();
        let mut config = config();
        cli.apply(&mut config).unwrap();
        assert_eq!(config.corpus_dir, PathBuf::from("docs"));
        assert_eq!(config.top_k, 3);
        assert_eq!(config.index_dir, PathBuf::from("vector_index"));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let cli = Cli::try_parse_from(["ask-portfolio", "--top-k", "0"]).unwrap();
        assert!(cli.apply(&mut config()).is_err());
    }

    #[test]
    fn one_shot_question_is_parsed() {
        let cli = Cli::try_parse_from(["ask-portfolio", "-q", "What are her skills?", "--rebuild"]).unwrap();
        assert_eq!(cli.question.as_deref(), Some("What are her skills?"));
        assert!(cli.rebuild);
    }

    fn empty_corpus() -> RagError {
        RagError::EmptyCorpus { path: PathBuf::from("assets") }
    }

    #[test]
    fn one_shot_fails_when_the_index_is_unavailable() {
        let cli = Cli::try_parse_from(["ask-portfolio", "-q", "What are her skills?"]).unwrap();
        let err = index_unavailable(&cli, empty_corpus()).unwrap_err();
        assert!(err.to_string().contains("index is not available"));
        assert!(matches!(err.downcast_ref::<RagError>(), Some(RagError::EmptyCorpus { .. })));
    }

    #[test]
    fn interactive_mode_survives_an_unavailable_index() {
        let cli = Cli::try_parse_from(["ask-portfolio"]).unwrap();
        assert!(index_unavailable(&cli, empty_corpus()).is_ok());
    }
}
