//! # Battleship Server Library
//!
//! Authoritative server for two-player battleship over WebSockets. Clients
//! register, meet in lobbies, place their fleets and take turns firing; the
//! server owns every board and decides every outcome.
//!
//! ## Architecture
//!
//! ### Single main loop
//! All game state lives in one task. Connection tasks forward text frames to
//! it over an mpsc channel, and it handles one frame to completion before the
//! next, so two attacks can never race.
//!
//! ### Ordered delivery
//! The router returns outbound messages in the order they happened. Each
//! connection has one FIFO queue and one writer task, so a client always sees
//! an attack result before the turn change it caused.
//!
//! ## Module Organization
//!
//! - `battle`: per-player board, ship hit points, attack resolution
//! - `game`: one match, from fleet placement to a winner
//! - `lobby`: waiting rooms and how they become matches
//! - `registry`: users, lobbies, matches and the leaderboard
//! - `router`: JSON frames in, ordered notifications out
//! - `client_manager`: open sockets and their outbound queues
//! - `network`: TCP/WebSocket plumbing and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 64 concurrent sockets, random attacks seeded from entropy
//!     let mut server = Server::new("127.0.0.1:3000", 64, None).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod battle;
pub mod client_manager;
pub mod error;
pub mod game;
pub mod lobby;
pub mod network;
pub mod registry;
pub mod router;

pub use error::GameError;
