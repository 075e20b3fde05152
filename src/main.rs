//! coldwire CLI
//!
//! Entry point for the `coldwire` command-line tool: wire-format helpers
//! and configuration inspection.

use clap::{Parser, Subcommand};
use coldwire::{encode, try_decode, EffectiveConfig, MessageId, QrFrameSet, RpcMessage, WireForm};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "COLDWIRE_LOG";

#[derive(Parser)]
#[command(name = "coldwire")]
#[command(about = "JSON-RPC over signaling, peer and QR channels", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode one message to wire text
    Encode {
        /// Method name (call or notification)
        #[arg(long, short = 'm')]
        method: Option<String>,

        /// Message id; digits are encoded as a number
        #[arg(long)]
        id: Option<String>,

        /// Call parameters as JSON
        #[arg(long)]
        params: Option<String>,

        /// Result payload as JSON (makes this a response)
        #[arg(long, conflicts_with_all = ["method", "error"])]
        result: Option<String>,

        /// Error payload as JSON (makes this an error response)
        #[arg(long, conflicts_with = "method")]
        error: Option<String>,

        /// Always use the Full form
        #[arg(long)]
        full: bool,
    },

    /// Decode wire text and print the classified message as JSON
    Decode {
        /// Wire text, Full or Reduced
        text: String,
    },

    /// Print the display schedule for a set of frames
    Frames {
        /// Path to config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Wire messages, one frame each
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Print the effective configuration
    Config {
        /// Path to config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Override handshake.fallback_grace_ms
        #[arg(long)]
        fallback_grace_ms: Option<u64>,

        /// Override signaling.url
        #[arg(long)]
        signaling_url: Option<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Encode {
            method,
            id,
            params,
            result,
            error,
            full,
        } => run_encode(method, id, params, result, error, full),
        Commands::Decode { text } => run_decode(&text),
        Commands::Frames { config, messages } => run_frames(config, messages),
        Commands::Config {
            config,
            fallback_grace_ms,
            signaling_url,
        } => run_config(config, fallback_grace_ms, signaling_url),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn parse_json(flag: &str, text: Option<String>) -> Result<Option<Value>, String> {
    text.map(|t| serde_json::from_str(&t).map_err(|e| format!("--{} is not valid JSON: {}", flag, e)))
        .transpose()
}

fn run_encode(
    method: Option<String>,
    id: Option<String>,
    params: Option<String>,
    result: Option<String>,
    error: Option<String>,
    full: bool,
) -> Result<(), String> {
    let id = match id {
        Some(segment) => Some(MessageId::from_segment(&segment).ok_or("--id must not be empty")?),
        None => None,
    };
    let params = parse_json("params", params)?.unwrap_or(Value::Null);
    let result = parse_json("result", result)?;
    let error = parse_json("error", error)?;

    let message = match (method, result, error, id) {
        (Some(method), None, None, Some(id)) => RpcMessage::call(method, id, params),
        (Some(method), None, None, None) => RpcMessage::notification(method, params),
        (None, Some(result), None, Some(id)) => RpcMessage::result(id, result),
        (None, None, Some(error), Some(id)) => RpcMessage::error(id, error),
        (None, _, _, None) => return Err("responses need --id".to_string()),
        _ => return Err("give --method, --result or --error".to_string()),
    };

    let form = if full { WireForm::Full } else { WireForm::Reduced };
    println!("{}", encode(&message, form));
    Ok(())
}

fn run_decode(text: &str) -> Result<(), String> {
    let message = try_decode(text).map_err(|e| format!("cannot decode: {}", e))?;
    let mut out = json!({ "kind": message.kind() });
    if let Some(id) = message.id() {
        out["id"] = json!(id);
    }
    match message {
        RpcMessage::Call { method, params, .. } | RpcMessage::Notification { method, params } => {
            out["method"] = json!(method);
            out["params"] = params;
        }
        RpcMessage::Result { result, .. } => out["result"] = result,
        RpcMessage::Error { error, .. } => out["error"] = error,
    }
    let rendered = serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}

fn run_frames(config_path: Option<PathBuf>, messages: Vec<String>) -> Result<(), String> {
    let config = EffectiveConfig::build(config_path.as_deref(), None).map_err(|e| e.to_string())?;
    let qr = config.qr();
    let set = QrFrameSet::new(messages).ok_or("no frames given")?;

    for (index, frame) in set.frames().iter().enumerate() {
        let offset = qr.cycle_interval * index as u32;
        println!("+{}ms\t{}", offset.as_millis(), frame);
    }
    let period = qr.cycle_interval * set.len() as u32;
    println!("# cycle repeats every {}ms", period.as_millis());
    Ok(())
}

fn run_config(
    config_path: Option<PathBuf>,
    fallback_grace_ms: Option<u64>,
    signaling_url: Option<String>,
) -> Result<(), String> {
    let mut overrides = serde_json::Map::new();
    if let Some(grace) = fallback_grace_ms {
        overrides.insert("handshake".to_string(), json!({ "fallback_grace_ms": grace }));
    }
    if let Some(url) = signaling_url {
        overrides.insert("signaling".to_string(), json!({ "url": url }));
    }
    let cli = (!overrides.is_empty()).then_some(Value::Object(overrides));

    let config = EffectiveConfig::build(config_path.as_deref(), cli).map_err(|e| e.to_string())?;
    let rendered = config.to_json().map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}
