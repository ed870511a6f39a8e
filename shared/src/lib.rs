use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "v0.2";
pub const DEFAULT_PORT: u16 = 8372;
pub const DEFAULT_WORDCOUNT: usize = 18;

pub const NAME_TAKEN_NOTICE: &str = "Disconnected: your name was taken.";
pub const KICKED_NOTICE: &str = "Disconnected: you were kicked.";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("join request is missing \"{0}\"")]
    MissingField(&'static str),
    #[error("message carries no action")]
    Empty,
}

/// Parameters of a round start request
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StartRequest {
    pub round: u64,
    pub wordlist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wordcount: Option<Value>,
}

impl StartRequest {
    pub fn new(round: u64, wordlist: impl Into<String>, wordcount: Option<usize>) -> Self {
        Self {
            round,
            wordlist: wordlist.into(),
            wordcount: wordcount.map(Value::from),
        }
    }

    /// Requested number of words, falling back to [`DEFAULT_WORDCOUNT`] when
    /// the field is absent, unparseable, or not positive. Fractional numbers
    /// are truncated.
    pub fn wordcount(&self) -> usize {
        let parsed = match &self.wordcount {
            Some(Value::Number(n)) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f.trunc() as u64)
            }),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };

        match parsed {
            Some(n) if n > 0 => usize::try_from(n).unwrap_or(DEFAULT_WORDCOUNT),
            _ => DEFAULT_WORDCOUNT,
        }
    }
}

/// A single action requested by a client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Join { room: String, name: String },
    StartRound(StartRequest),
    Kick { name: String },
}

// Raw wire shape. Every key is optional and a frame may carry several.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClientEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<StartRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kick: Option<String>,
}

/// Decodes one inbound frame into the actions it carries, in the order
/// join, start, kick.
pub fn decode_client_message(payload: &[u8]) -> Result<Vec<ClientMessage>, ProtocolError> {
    let envelope: ClientEnvelope = serde_json::from_slice(payload)?;
    let mut actions = Vec::new();

    match (envelope.room, envelope.name) {
        (Some(room), Some(name)) => actions.push(ClientMessage::Join { room, name }),
        (Some(_), None) => return Err(ProtocolError::MissingField("name")),
        (None, Some(_)) => return Err(ProtocolError::MissingField("room")),
        (None, None) => {}
    }
    if let Some(start) = envelope.start {
        actions.push(ClientMessage::StartRound(start));
    }
    if let Some(name) = envelope.kick {
        actions.push(ClientMessage::Kick { name });
    }

    if actions.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(actions)
}

/// Encodes client actions into a single frame. Used by the test client.
pub fn encode_client_message(actions: &[ClientMessage]) -> Result<String, ProtocolError> {
    let mut envelope = ClientEnvelope::default();
    for action in actions {
        match action {
            ClientMessage::Join { room, name } => {
                envelope.room = Some(room.clone());
                envelope.name = Some(name.clone());
            }
            ClientMessage::StartRound(start) => envelope.start = Some(start.clone()),
            ClientMessage::Kick { name } => envelope.kick = Some(name.clone()),
        }
    }
    Ok(serde_json::to_string(&envelope)?)
}

/// Messages sent from the server. Variants are distinguished on the wire by
/// the keys they carry, not by a tag.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ServerMessage {
    Welcome {
        room: String,
        round: u64,
        #[serde(rename = "playersinround")]
        players_in_round: Vec<String>,
        words: Vec<String>,
        word: Option<String>,
        wordlists: Vec<(String, usize)>,
        version: String,
    },
    RoundStarted {
        round: u64,
        #[serde(rename = "playersinround")]
        players_in_round: Vec<String>,
        words: Vec<String>,
        word: Option<String>,
    },
    Players {
        players: Vec<String>,
    },
    Notice {
        msg: String,
    },
}

pub fn encode_server_message(message: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_server_message(payload: &[u8]) -> Result<ServerMessage, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}
