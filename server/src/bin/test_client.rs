use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use shared::{
    decode_server_message, encode_client_message, ClientMessage, ServerMessage, StartRequest,
    DEFAULT_PORT,
};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Joins a room, optionally starts a round, and prints what the server sends
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server URL to connect to
    #[arg(short, long, default_value_t = format!("ws://127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Room to join
    #[arg(short, long, default_value = "lobby")]
    room: String,

    /// Display name
    #[arg(short, long, default_value = "tester")]
    name: String,

    /// Request a round with this wordlist once joined
    #[arg(long)]
    start_wordlist: Option<String>,

    /// Number of words for the requested round
    #[arg(long)]
    wordcount: Option<usize>,

    /// Seconds to keep listening after the last message
    #[arg(long, default_value = "5")]
    idle_secs: u64,
}

fn describe(message: &ServerMessage) -> String {
    match message {
        ServerMessage::Welcome {
            room,
            round,
            wordlists,
            version,
            ..
        } => format!(
            "joined {} at round {} (server {}, {} wordlists)",
            room,
            round,
            version,
            wordlists.len()
        ),
        ServerMessage::RoundStarted {
            round, words, word, ..
        } => format!(
            "round {}: your word is {} (board: {})",
            round,
            word.as_deref().unwrap_or("<none>"),
            words.join(", ")
        ),
        ServerMessage::Players { players } => format!("players: {}", players.join(", ")),
        ServerMessage::Notice { msg } => format!("notice: {}", msg),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let (ws_stream, _) = connect_async(args.server.as_str()).await?;
    info!("Connected to {}", args.server);
    let (mut write, mut read) = ws_stream.split();

    let join = encode_client_message(&[ClientMessage::Join {
        room: args.room.clone(),
        name: args.name.clone(),
    }])?;
    write.send(Message::Text(join.into())).await?;

    let mut start_sent = false;

    while let Ok(Some(frame)) = timeout(Duration::from_secs(args.idle_secs), read.next()).await {
        let text = match frame? {
            Message::Text(text) => text.as_str().to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        let message = match decode_server_message(text.as_bytes()) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unreadable message {}: {}", text, e);
                continue;
            }
        };
        println!("{}", describe(&message));

        if let (ServerMessage::Welcome { round, .. }, Some(wordlist), false) =
            (&message, &args.start_wordlist, start_sent)
        {
            let start = encode_client_message(&[ClientMessage::StartRound(StartRequest::new(
                *round,
                wordlist.as_str(),
                args.wordcount,
            ))])?;
            write.send(Message::Text(start.into())).await?;
            start_sent = true;
        }
    }

    info!("Done");
    Ok(())
}
