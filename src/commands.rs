use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::{self, ArtifactManifest};
use crate::builder::IndexBuilder;
use crate::chat::{ChatReply, ConversationLog, GenerativeChat, RetrievalChat};
use crate::config::Config;
use crate::corpus::{
    PairingPolicy, PreparationStats, QaRecord, TranscriptFormat, load_conversations, load_qa_csv,
    prepare_records_with_stats, save_qa_csv,
};
use crate::embeddings::{EmbeddingProvider, OllamaClient, create_embedder};
use crate::engine::QueryEngine;
use crate::server::QaServer;

/// Default name of the intermediate QA table in the base directory
pub const QA_TABLE_CSV: &str = "qa_pairs.csv";

/// Where the QA records for a build come from
#[derive(Debug, Clone, Default)]
pub struct CorpusSource {
    pub input: Option<PathBuf>,
    pub format: Option<TranscriptFormat>,
    pub pairing: Option<PairingPolicy>,
}

fn load_config(base_dir: &Path) -> Result<Config> {
    Config::load(base_dir).context("Failed to load configuration")
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn read_transcripts(
    input: &Path,
    format: Option<TranscriptFormat>,
    pairing: PairingPolicy,
) -> Result<(Vec<QaRecord>, PreparationStats)> {
    let format = format
        .or_else(|| TranscriptFormat::from_path(input))
        .with_context(|| {
            format!(
                "Cannot tell the transcript format of {}; pass --format",
                input.display()
            )
        })?;

    let conversations = load_conversations(input, format)?;
    Ok(prepare_records_with_stats(&conversations, pairing))
}

/// Resolve the QA records a build should index
#[inline]
pub fn load_records(config: &Config, source: &CorpusSource) -> Result<Vec<QaRecord>> {
    let input = source
        .input
        .clone()
        .unwrap_or_else(|| config.get_base_dir().join(QA_TABLE_CSV));

    if source.format.is_none() && is_csv(&input) {
        info!("Reading QA table from {}", input.display());
        return load_qa_csv(&input);
    }

    let pairing = source.pairing.unwrap_or(config.corpus.pairing);
    let (records, stats) = read_transcripts(&input, source.format, pairing)?;
    info!(
        "Prepared {} records from {} conversations ({} skipped)",
        stats.records_emitted, stats.conversations_seen, stats.conversations_skipped
    );
    Ok(records)
}

/// Pair transcripts into a QA table and write it as CSV
#[inline]
pub fn prepare_corpus(
    base_dir: &Path,
    input: &Path,
    format: Option<TranscriptFormat>,
    pairing: Option<PairingPolicy>,
    output: Option<PathBuf>,
) -> Result<PreparationStats> {
    let config = load_config(base_dir)?;
    let pairing = pairing.unwrap_or(config.corpus.pairing);
    let output = output.unwrap_or_else(|| base_dir.join(QA_TABLE_CSV));

    let (records, stats) = read_transcripts(input, format, pairing)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    save_qa_csv(&output, &records)?;

    println!(
        "Prepared {} QA records from {} conversations ({} skipped, {} pairing)",
        stats.records_emitted, stats.conversations_seen, stats.conversations_skipped, pairing
    );
    println!("Wrote {}", output.display());
    Ok(stats)
}

/// Embed the QA table and replace the deployed artifacts
#[inline]
pub fn build_index(base_dir: &Path, source: &CorpusSource) -> Result<ArtifactManifest> {
    let config = load_config(base_dir)?;
    let records = load_records(&config, source)?;
    let embedder = create_embedder(&config)?;

    let artifacts_dir = config.artifacts_dir();
    let (_, manifest) = IndexBuilder::new(embedder.as_ref())
        .with_batch_size(config.embedding.batch_size as usize)
        .with_progress(true)
        .build_and_persist(records, &artifacts_dir)
        .context("Index build failed; previous artifacts left in place")?;

    println!(
        "{} Built {} records ({} dimensions) as build {}",
        style("✓").green(),
        manifest.records,
        manifest.dimension,
        manifest.build.build_id
    );
    println!("Artifacts: {}", artifacts_dir.display());
    Ok(manifest)
}

fn ready_engine(config: &Config) -> Result<Arc<QueryEngine>> {
    let engine = Arc::new(QueryEngine::new(create_embedder(config)?));
    engine
        .load(&config.artifacts_dir())
        .context("No usable index; run `glucomate-qa build` first")?;
    Ok(engine)
}

/// Answer a single question from the deployed index
#[inline]
pub fn ask(base_dir: &Path, query: &str, k: Option<usize>) -> Result<()> {
    let config = load_config(base_dir)?;
    let engine = ready_engine(&config)?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let results = engine.answer(query, k)?;
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} {}",
            rank + 1,
            result.answer,
            style(format!("(row {}, distance {:.4})", result.row, result.distance)).dim()
        );
        println!("   {}", style(format!("matched: {}", result.question)).dim());
    }
    Ok(())
}

/// Interactive chat on the terminal until `exit` or end of input
#[inline]
pub fn chat(base_dir: &Path, generative: bool) -> Result<()> {
    let config = load_config(base_dir)?;

    if generative {
        let client = OllamaClient::for_generation(&config)?;
        let responder = GenerativeChat::from_config(client, &config.generative);
        eprintln!(
            "{}",
            style(format!("Chatting with {} (type 'exit' to quit)", config.generative.model)).cyan()
        );
        run_chat_loop(|log, input| responder.respond(log, input))
    } else {
        // An unloaded engine still chats; every reply is the unavailable notice
        let engine = Arc::new(QueryEngine::new(create_embedder(&config)?));
        if let Err(e) = engine.load(&config.artifacts_dir()) {
            warn!("Index not loaded: {}", e);
        }
        let responder = RetrievalChat::new(engine);
        eprintln!(
            "{}",
            style("Ask something about diabetes (type 'exit' to quit)").cyan()
        );
        run_chat_loop(|log, input| responder.respond(log, input))
    }
}

fn run_chat_loop<F>(respond: F) -> Result<()>
where
    F: Fn(ConversationLog, &str) -> (ConversationLog, ChatReply),
{
    let mut log = ConversationLog::new();
    loop {
        let input: String = match Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(input) => input,
            // End of input or a closed terminal
            Err(_) => break,
        };
        if matches!(input.trim(), "exit" | "quit") {
            break;
        }

        let (next, reply) = respond(log, &input);
        log = next;
        match &reply {
            ChatReply::Answer { .. } => {
                println!("{} {}", style("Bot:").bold().green(), reply.display_text());
            }
            ChatReply::BadInput => {
                println!("{}", style(reply.display_text()).yellow());
            }
            ChatReply::Unavailable { .. } | ChatReply::NoAnswer => {
                println!("{} {}", style("Bot:").bold().red(), reply.display_text());
            }
        }
    }
    info!("Chat ended after {} turns", log.len());
    Ok(())
}

/// Serve the JSON-RPC query protocol on stdio
#[inline]
pub async fn serve(base_dir: &Path) -> Result<()> {
    let config = load_config(base_dir)?;
    let artifacts_dir = config.artifacts_dir();

    let engine = Arc::new(QueryEngine::new(create_embedder(&config)?));
    let load_engine = Arc::clone(&engine);
    let load_dir = artifacts_dir.clone();
    let loaded = tokio::task::spawn_blocking(move || load_engine.load(&load_dir))
        .await
        .context("Index load task panicked")?;
    if let Err(e) = loaded {
        // Keep serving: `answer` reports IndexNotLoaded until a successful `reload`
        warn!("Starting without an index: {}", e);
    }

    let server = Arc::new(QaServer::new(
        engine,
        artifacts_dir,
        config.retrieval.top_k,
    ));

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt signal, shutting down");
            Ok(())
        }
    }
}

/// Print configuration, backend health and artifact consistency
#[inline]
pub fn show_status(base_dir: &Path) -> Result<()> {
    let config = load_config(base_dir).unwrap_or_else(|e| {
        warn!("Using default configuration: {:#}", e);
        Config {
            base_dir: base_dir.to_path_buf(),
            ..Config::default()
        }
    });

    println!("📊 GlucoMate QA Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🧮 Embedding:");
    println!(
        "   Provider: {}  Model: {}  Dimension: {}",
        config.embedding.provider, config.embedding.model, config.embedding.dimension
    );
    if config.embedding.provider == EmbeddingProvider::Ollama {
        match OllamaClient::for_embeddings(&config) {
            Ok(client) => match client.health_check() {
                Ok(()) => println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                ),
                Err(e) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
            },
            Err(e) => println!("   ❌ Ollama: Failed to connect - {:#}", e),
        }
    }
    println!();

    let artifacts_dir = config.artifacts_dir();
    println!("🗂️  Artifacts ({}):", artifacts_dir.display());
    let report = artifacts::verify(&artifacts_dir);
    if let Some(manifest) = &report.manifest {
        println!(
            "   Build: {} at {}",
            manifest.build.build_id,
            manifest.build.built_at.to_rfc3339()
        );
    }
    if let Some(model) = &report.model {
        println!("   Model: {}", model);
        if model.dimension != config.embedding.dimension as usize
            || !model.same_model(&create_embedder(&config)?.model_ref())
        {
            println!(
                "   ⚠️  Built with a different embedding model than configured; rebuild before serving"
            );
        }
    }
    if report.is_consistent {
        println!("   ✅ {}", report.summary());
    } else {
        println!("   ❌ {}", report.summary());
        for file in &report.missing_files {
            println!("      missing: {}", file);
        }
        for file in &report.checksum_mismatches {
            println!("      checksum mismatch: {}", file);
        }
        for problem in &report.problems {
            println!("      {}", problem);
        }
    }

    Ok(())
}
