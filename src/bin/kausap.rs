//! Text-mode REPL driver for the kausap session controller.
//!
//! Runs the full conversation loop against the real provider with a
//! print-only synthesis engine: replies that would be spoken are shown on
//! a `[voice]` line instead. Voice capture has no console equivalent, so
//! input is typed; everything else (persona, fallbacks, history,
//! preferences) behaves exactly as a voice host would see it.

use anyhow::Context;
use kausap::session::{SessionController, SessionEvent, TurnOutcome};
use kausap::store::FileKvStore;
use kausap::synthesis::{SpeechParams, SynthesisEngine};
use kausap::transcript::Role;
use kausap::{AssistantConfig, GeminiGenerator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prints utterances instead of playing audio.
struct ConsoleEngine;

impl SynthesisEngine for ConsoleEngine {
    fn speak(&mut self, text: &str, voice: &str, params: SpeechParams) -> kausap::Result<()> {
        println!("[{voice} @ {:.1}x] {text}", params.rate);
        Ok(())
    }

    fn cancel(&mut self) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Suppress noisy dependency logs by default; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kausap=info,reqwest=warn,hyper=warn")),
        )
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            let path = PathBuf::from(path);
            AssistantConfig::from_file(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => AssistantConfig::default(),
    };

    // The API key never belongs in a config file that might get shared.
    if config.generator.api_key.is_empty() {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.generator.api_key = key;
        }
    }
    if config.generator.api_key.is_empty() {
        eprintln!("warning: no API key configured (GEMINI_API_KEY); replies will be fallbacks");
    }

    let root = config.store.effective_root();
    let kv = FileKvStore::new(&root)
        .with_context(|| format!("failed to open store under {}", root.display()))?;
    let generator = GeminiGenerator::new(&config.generator).context("failed to build generator")?;

    let mut session = SessionController::new(
        &config,
        Arc::new(generator),
        Box::new(ConsoleEngine),
        Arc::new(kv),
    );

    // Print transcript activity from the event stream; the loop below only
    // sends input.
    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Committed(message) => match message.role {
                    Role::User => println!("you: {}", message.content),
                    Role::Assistant => println!("jasmine: {}", message.content),
                    Role::System => println!("-- {}", message.content),
                },
                SessionEvent::Notice { text, .. } => println!("-- {text}"),
                _ => {}
            }
        }
    });

    session.start();
    println!("kausap v{}", env!("CARGO_PKG_VERSION"));
    println!("type to chat; :lang :clear :export <path> :import <path> :quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                break;
            }
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            (":quit" | ":q", _) => break,
            (":lang", _) => session.toggle_language(),
            (":clear", _) => session.clear_history(),
            (":voice", name) if !name.is_empty() => session.set_voice(name),
            (":tts", "on") => session.set_tts_enabled(true),
            (":tts", "off") => session.set_tts_enabled(false),
            (":export", path) if !path.is_empty() => {
                let json = session.export_history()?;
                tokio::fs::write(path, json)
                    .await
                    .with_context(|| format!("failed to write {path}"))?;
                println!("-- exported to {path}");
            }
            (":import", path) if !path.is_empty() => {
                let payload = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read {path}"))?;
                match session.import_history(&payload) {
                    Ok(envelope) => {
                        println!("-- imported {} messages", envelope.messages.len());
                    }
                    Err(e) => println!("-- import rejected: {e}"),
                }
            }
            _ if line.starts_with(':') => {
                println!("-- commands: :lang :clear :voice <name> :tts on|off :export <path> :import <path> :quit");
            }
            _ => {
                if session.submit_text(line).await == TurnOutcome::Busy {
                    println!("-- still thinking, hold on");
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
