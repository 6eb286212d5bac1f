use std::path::PathBuf;

use clap::Parser;

/// Colloquy conversation runner
#[derive(Debug, Parser)]
#[command(
    name = "colloquy",
    about = "Send a conversation to an LLM provider and append the reply"
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "colloquy.toml", env = "COLLOQUY_CONFIG")]
    pub config: PathBuf,

    /// Conversation file (JSON array of messages)
    pub input: PathBuf,

    /// Provider name from the configuration; defaults to the first one
    #[arg(short, long, env = "COLLOQUY_PROVIDER")]
    pub provider: Option<String>,

    /// Model identifier; defaults to the provider's `default_model`
    #[arg(short, long, env = "COLLOQUY_MODEL")]
    pub model: Option<String>,

    /// Tool declarations file (JSON array of tool definitions)
    #[arg(long)]
    pub tools: Option<PathBuf>,

    /// Stream the reply and print text as it arrives
    #[arg(short, long)]
    pub stream: bool,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Write the updated conversation here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
