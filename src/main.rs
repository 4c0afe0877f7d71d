//! chatrelay HTTP server
//!
//! Starts an Axum web server that relays chat messages to the configured LLM
//! provider, or handles a single serverless event with `chatrelay invoke`.

use chatrelay::{
    cli::{Cli, Command, generate_config_template, invoke},
    config::Config,
    handlers::{self, AppState},
    telemetry,
};
use clap::Parser;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Config { output }) => {
            let template = generate_config_template();
            match output {
                Some(path) => {
                    std::fs::write(&path, template)?;
                    eprintln!("Configuration template written to {}", path);
                }
                None => print!("{}", template),
            }
            Ok(())
        }
        Some(Command::Invoke { event }) => {
            let config = Config::load(&cli.config)?;
            telemetry::init(&config.observability.log_level);

            let event_json = match event {
                Some(path) => std::fs::read_to_string(path)?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };

            let state = AppState::new(Arc::new(config))?;
            println!("{}", invoke(&state, &event_json).await?);
            Ok(())
        }
        None => serve(&cli.config).await,
    }
}

async fn serve(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;

    telemetry::init(&config.observability.log_level);

    if !std::path::Path::new(config_path).exists() {
        tracing::info!(
            config_path,
            "Configuration file not found, using built-in defaults"
        );
    }

    tracing::info!(
        "Starting chatrelay on {}:{} (provider: {})",
        config.server.host,
        config.server.port,
        config.provider.kind().as_str()
    );

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    let state = AppState::new(Arc::new(config))?;
    let app = handlers::app(state);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Chat endpoint available at http://{}/", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
