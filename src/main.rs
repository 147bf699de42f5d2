//! StoreBot - Entry Point
//!
//! Modes:
//! - Default: HTTP server
//! - --request / -r <text>: Run one command and print the answer
//! - --list / -l: Print the registered capabilities

use std::sync::Arc;

use anyhow::{bail, Context};
use storebot::{Assistant, CapabilityRegistry, Config, ExecutionContext, OpenAiClient, SharedRegistry};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let list_mode = args.iter().any(|a| a == "--list" || a == "-l");
    let request = args
        .iter()
        .position(|a| a == "--request" || a == "-r")
        .map(|i| args.get(i + 1).cloned());

    if help_mode {
        println!("StoreBot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: storebot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --request, -r <TEXT>  Run one command and print the answer");
        println!("  --list, -l            List registered capabilities");
        println!("  --help, -h            Show this help");
        println!();
        println!("Default: Run the HTTP server");
        println!();
        println!("Environment variables:");
        println!("  ASSISTANT_OPENAI_API_KEY        Model API key");
        println!("  ASSISTANT_OPENAI_BASE_URL       Model API base URL");
        println!("  ASSISTANT_GPT_MODEL             Model name (default: gpt-4o)");
        println!("  TOOLS_BASE_URL                  Backend used by capabilities");
        println!("  ASSISTANT_CAPABILITIES_DIR      Capability directory (default: capabilities)");
        println!("  ASSISTANT_CAPABILITY_ALLOW      Comma list of capabilities to load");
        println!("  ASSISTANT_CAPABILITY_DENY       Comma list of capabilities to skip");
        println!("  ASSISTANT_SUPPORTED_CATEGORIES  Comma list of categories to act on");
        println!("  ASSISTANT_BIND_ADDR             Bind address (default: 127.0.0.1)");
        println!("  ASSISTANT_PORT                  Port (default: 8000)");
        println!("  ASSISTANT_JWT_SECRET            HS256 secret for bearer tokens");
        return Ok(());
    }

    let one_shot = request.is_some() || list_mode;

    // Setup logging based on mode
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(if one_shot { Level::WARN } else { Level::INFO });

    if one_shot {
        // One-shot modes - log to stderr as JSON, stdout carries the answer
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // Server mode - log to stdout with colors
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;

    let registry = CapabilityRegistry::bootstrap(&config.capabilities_dir, &config.filter)
        .with_context(|| "Failed to load capabilities")?;

    if list_mode {
        for declaration in registry.declarations() {
            println!("{:<28} {}", declaration.name, declaration.description);
        }
        return Ok(());
    }

    if registry.is_empty() {
        warn!(
            "No capabilities registered from {}",
            config.capabilities_dir.display()
        );
    }

    let client = OpenAiClient::from_config(&config);
    if !client.is_available() {
        bail!("ASSISTANT_OPENAI_API_KEY is not set");
    }

    let assistant = Assistant::new(
        Arc::new(client),
        &config.model,
        SharedRegistry::new(registry),
        config.supported_categories.clone(),
    );

    if let Some(request) = request {
        let Some(command) = request else {
            bail!("--request needs a command");
        };

        let context = ExecutionContext::new("", "", &config.tools_base_url);
        let outcome = assistant.handle(&command, &context).await?;
        println!("{}", outcome.response);
        return Ok(());
    }

    info!("StoreBot v{}", env!("CARGO_PKG_VERSION"));

    let Some(secret) = config.jwt_secret.as_deref() else {
        bail!("ASSISTANT_JWT_SECRET is required in server mode");
    };

    let state = Arc::new(storebot::AppState::new(assistant, secret, &config));
    storebot::server::run(config.socket_addr(), state).await
}
