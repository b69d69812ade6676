//! Interactive diary assistant backed by associative memory.
//!
//! Reads one message per line from stdin and prints the assistant's reply.
//! `/stats` shows the memory size, `/recall <text>` lists the closest stored
//! topics, `/quit` (or end of input) exits.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use gng_memory::config::{AppConfig, EmbedderKind, load_llm_settings};
use gng_memory::embedding::{Embedder, FastEmbedder, HashedEmbedder};
use gng_memory::llm::ChatCompletionsDriver;
use gng_memory::memory::Snapshot;
use gng_memory::mood::KeywordMood;
use gng_memory::session::{Session, SessionServices, SessionStore};
use gng_memory::telemetry;

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before config so it can feed GNG_* variables
    let _ = dotenv();

    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init(&config.telemetry)?;

    let settings = load_llm_settings().map_err(anyhow::Error::msg)?;
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    let embedder: Arc<dyn Embedder> = match config.embedding.provider {
        EmbedderKind::Hashed => Arc::new(HashedEmbedder::new(config.embedding.dimension)),
        EmbedderKind::Fastembed => {
            let embedder =
                FastEmbedder::from_config(&config.embedding.model, config.embedding.dimension)?;
            embedder.initialize().await?;
            Arc::new(embedder)
        }
    };
    info!(
        name: "embedding.ready",
        provider = ?config.embedding.provider,
        dimension = embedder.dimension(),
        "Embedder ready"
    );

    let services = SessionServices {
        embedder,
        generator: Arc::new(ChatCompletionsDriver::new(settings)),
        mood: Arc::new(KeywordMood),
    };
    let sessions = SessionStore::new(config.memory.clone(), services, config.session_settings())?;

    let user = if config.session.user.trim().is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        config.session.user.clone()
    };

    let snapshot_path = config.session.snapshot_path.clone();
    let session = match &snapshot_path {
        Some(path) if path.exists() => {
            let snapshot = Snapshot::load(path)
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
            sessions.restore(&user, snapshot)?
        }
        _ => sessions.get_or_create(&user),
    };

    let decay_task = config
        .decay_interval()
        .map(|interval| sessions.spawn_decay_task(interval));

    info!(
        name: "session.started",
        user = %session.user(),
        nodes = session.node_count(),
        feedback = config.session.feedback,
        "Session started"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    converse(&session, &mut lines, config.session.feedback).await?;

    if let Some(handle) = decay_task {
        handle.abort();
    }
    if let Some(path) = snapshot_path {
        session
            .snapshot()
            .save(&path)
            .with_context(|| format!("Failed to save snapshot {}", path.display()))?;
    }
    Ok(())
}

async fn converse(session: &Session, lines: &mut InputLines, feedback: bool) -> anyhow::Result<()> {
    println!("Type a message (/stats, /recall <text>, /quit).");
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        match text {
            "" => continue,
            "/quit" | "/exit" => break,
            "/stats" => {
                println!("{} memory nodes", session.node_count());
                continue;
            }
            _ => {}
        }
        if let Some(query) = text.strip_prefix("/recall") {
            recall(session, query).await;
            continue;
        }

        let turn = match session.respond(text).await {
            Ok(turn) => turn,
            Err(e) => {
                warn!(error = %e, "Turn failed");
                println!("(no reply: {e})");
                continue;
            }
        };
        println!("{}", turn.reply);

        if !feedback {
            continue;
        }
        let Some(rating) = ask_rating(session, lines, "Rate the response").await? else {
            break;
        };
        if rating.is_unhelpful() {
            match session.regenerate(text).await {
                Ok(retry) => {
                    println!("{}", retry.reply);
                    if ask_rating(session, lines, "Rate the new response").await?.is_none() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Regeneration failed");
                    println!("(no reply: {e})");
                }
            }
        }
    }
    Ok(())
}

const RECALL_TOP_K: usize = 3;

async fn recall(session: &Session, query: &str) {
    match session.recall(query, RECALL_TOP_K).await {
        Ok(found) if found.is_empty() => println!("(memory is empty)"),
        Ok(found) => {
            for r in found {
                println!(
                    "{} sim={:.3} messages={} latest={:?}",
                    r.node,
                    r.similarity,
                    r.message_count,
                    r.latest.unwrap_or_default()
                );
            }
        }
        Err(e) => println!("(recall failed: {e})"),
    }
}

/// Prompt until a valid 1-5 rating arrives. `None` at end of input.
async fn ask_rating(
    session: &Session,
    lines: &mut InputLines,
    label: &str,
) -> anyhow::Result<Option<gng_memory::session::Feedback>> {
    loop {
        println!("{label} from 1 (not helpful) to 5 (very helpful):");
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        let parsed = line.trim().parse::<u8>();
        match parsed.map(|score| session.record_feedback(score)) {
            Ok(Ok(feedback)) => return Ok(Some(feedback)),
            Ok(Err(e)) => println!("{e}"),
            Err(_) => println!("Please enter a number between 1 and 5."),
        }
    }
}
