#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use args::Args;
use clap::Parser;
use colloquy_config::Config;
use colloquy_core::{Conversation, ToolDefinition};
use colloquy_llm::{AdapterRegistry, Delta, GenerateOptions, Generator, HttpTransport};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize telemetry
    colloquy_telemetry::init(&config.telemetry)?;

    let (name, provider) = match &args.provider {
        Some(name) => config
            .providers
            .get_key_value(name)
            .with_context(|| format!("provider `{name}` is not configured"))?,
        None => config
            .providers
            .first()
            .context("no providers configured")?,
    };

    let model = args
        .model
        .clone()
        .or_else(|| provider.default_model.clone())
        .with_context(|| format!("no model given and provider `{name}` has no default_model"))?;

    let registry = AdapterRegistry::from_config(&config)?;
    let transport = HttpTransport::from_config(name.as_str(), provider)?;
    let generator = Generator::new(registry.get(name)?, Arc::new(transport));

    let mut conversation: Conversation = read_json(&args.input)?;
    let mut options = GenerateOptions::new(model);
    if let Some(path) = &args.tools {
        options = options.with_tools(read_json::<Vec<ToolDefinition>>(path)?);
    }
    if let Some(max_tokens) = args.max_tokens {
        options = options.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = args.temperature {
        options = options.with_temperature(temperature);
    }

    tracing::info!(
        provider = %name,
        model = %options.model,
        messages = conversation.len(),
        "starting colloquy"
    );

    // Set up cancellation on shutdown signals
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_clone.cancel();
    });

    let mut print_delta = |delta: Delta<'_>| {
        if let Delta::Text(text) = delta {
            let mut stderr = std::io::stderr().lock();
            let _ = stderr.write_all(text.as_bytes());
            let _ = stderr.flush();
        }
    };
    let on_delta = args.stream.then_some(&mut print_delta as &mut colloquy_llm::DeltaCallback<'_>);

    let outcome = generator
        .generate_with_cancel(&mut conversation, &options, on_delta, cancel)
        .await;
    if args.stream {
        eprintln!();
    }

    write_conversation(args.output.as_deref(), &conversation)?;

    match outcome {
        Ok(message) => {
            tracing::info!(result = ?message.result, tokens = message.tokens, "colloquy finished");
            Ok(())
        }
        Err(err) => {
            if let Some(partial) = &err.partial {
                tracing::warn!(
                    result = ?partial.result,
                    partial_text = %partial.text(),
                    "generation ended early"
                );
            }
            Err(err.into())
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_conversation(output: Option<&Path>, conversation: &Conversation) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(conversation)?;
    match output {
        Some(path) => std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received, cancelling generation");
}
