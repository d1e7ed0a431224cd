//! Ask command - answers one question

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use futures::StreamExt;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::agent::{DEFAULT_TOP_K, Query};
use crate::domain::ScoringEngine;
use crate::infrastructure::corpus::{self, Corpus, DEFAULT_CHUNK_SIZE};
use crate::infrastructure::logging;

/// Arguments for the ask command
#[derive(Args, Clone, Debug)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    /// Fused candidates kept per sub-question
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Scoring engine: judge or heuristic
    #[arg(long)]
    pub engine: Option<ScoringEngine>,

    /// JSON corpus loaded into the configured stores before answering
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Print answer tokens as they arrive instead of the JSON response
    #[arg(long)]
    pub stream: bool,
}

impl AskArgs {
    pub fn query(&self) -> Query {
        let query = Query::new(self.question.clone()).with_top_k(self.top_k);
        match self.engine {
            Some(engine) => query.with_engine(engine),
            None => query,
        }
    }
}

/// Run the ask command
pub async fn run(args: AskArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);

    let state = crate::create_app_state_with_config(&config)?;

    if let Some(ref path) = args.corpus {
        let corpus = Corpus::load(path)?;
        let report = corpus::seed(
            &corpus,
            state.embedder.as_ref(),
            state.vector_index.as_ref(),
            state.graph_index.as_ref(),
            DEFAULT_CHUNK_SIZE,
        )
        .await?;
        info!(path = %path.display(), chunks = report.chunks, "Corpus loaded");
    }

    let query = args.query();

    if !args.stream {
        let response = state.query_service.ask(&query).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let mut answer = state.query_service.ask_stream(&query).await?;
    let mut stdout = std::io::stdout();

    while let Some(chunk) = answer.stream.next().await {
        if let Some(delta) = chunk?.delta {
            write!(stdout, "{}", delta)?;
            stdout.flush()?;
        }
    }
    writeln!(stdout)?;

    if !answer.citations.is_empty() {
        writeln!(stdout, "\nSources:")?;
        for citation in &answer.citations {
            writeln!(
                stdout,
                "  [{}] {} ({})",
                citation.document_id,
                citation.chunk_id,
                citation.source.as_str()
            )?;
        }
    }

    Ok(())
}
