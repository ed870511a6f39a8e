//! # Word Game Server Library
//!
//! This library provides the coordination server for a party word game.
//! Clients join named rooms; on request the server splits the players of a
//! room into two teams, hands each team a secret word drawn from a chosen
//! wordlist, and tells every player what they need to know.
//!
//! ## Core Responsibilities
//!
//! ### Round Arbitration
//! Only one round start can win per round number. A request must name the
//! room's current round, and successful starts in one room are at least two
//! seconds apart. Losing requests are dropped without a reply; clients notice
//! that the round did not advance and retry with fresh state.
//!
//! ### Word Assignment
//! Each room draws words without replacement from a per-wordlist pool and
//! only reshuffles once the pool cannot cover a draw, so words do not repeat
//! until a list is exhausted.
//!
//! ### Membership
//! Names are unique within a room. Joining under a taken name evicts the
//! previous holder; stale disconnects never evict a newer holder.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! All room and session state is owned by one [`registry::SessionRegistry`]
//! running on one task. Connection tasks only forward events to it over a
//! channel, so no locks are needed and broadcasts can never be reordered
//! relative to the mutations that caused them.
//!
//! ### Pluggable Transport
//! The registry emits frames through the [`transport::Transport`] trait.
//! The [`network`] module implements it over WebSockets; tests implement it
//! in memory.
//!
//! ## Module Organization
//!
//! - `wordbank`: loads and serves the named word lists
//! - `room`: per-room round state machine and word pools
//! - `registry`: sessions, dispatch of client messages, broadcasts
//! - `transport`: connection identifiers and the outbound seam
//! - `network`: WebSocket accept loop and per-connection tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, WebSocketTransport};
//! use server::registry::SessionRegistry;
//! use server::wordbank::WordBank;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bank = Arc::new(WordBank::load("wordlists")?);
//!     let registry = SessionRegistry::new(bank, WebSocketTransport::new());
//!
//!     let server = Server::bind("127.0.0.1:8372", registry).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod registry;
pub mod room;
pub mod transport;
pub mod wordbank;
