use clap::{Parser, ValueEnum};
use log::{error, info};
use server::network::{Server, ServerEvent, WebSocketTransport};
use server::registry::SessionRegistry;
use server::wordbank::WordBank;
use shared::DEFAULT_PORT;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Listen on localhost for local development
    Dev,
    /// Listen on the loopback address behind a reverse proxy
    Prod,
}

impl Mode {
    fn host(self) -> &'static str {
        match self {
            Mode::Dev => "localhost",
            Mode::Prod => "127.0.0.1",
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Deployment mode, selects the bind address
    #[arg(value_enum, default_value = "dev")]
    mode: Mode,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory holding one wordlist per file
    #[arg(short, long, default_value = "wordlists")]
    wordlists: PathBuf,
}

/// Loads the wordlists, then runs the WebSocket server until it stops or
/// Ctrl+C is pressed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("{:?} server", args.mode);

    let word_bank = Arc::new(WordBank::load(&args.wordlists)?);
    let registry = SessionRegistry::new(word_bank, WebSocketTransport::new());

    let address = format!("{}:{}", args.mode.host(), args.port);
    let server = Server::bind(&address, registry).await?;
    let events = server.event_sender();

    let server_handle = tokio::spawn(server.run());

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Err(e)) => error!("Server failed: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = events.send(ServerEvent::Shutdown);
        }
    }

    Ok(())
}
