//! Ordered broadcast chat server
//!
//! This crate provides a TCP server that accepts many line-based clients and
//! relays every valid line to all connected clients, the sender included.
//! Every message passes through one queue drained by a single worker, so all
//! clients observe the same global delivery order.
//!
//! # Features
//!
//! - Plain TCP, newline-delimited UTF-8 protocol
//! - One receive task per client, one broadcast worker, one accept task
//! - Thread-safe session registry with snapshot-based fan-out
//! - Dead sessions are dropped by whichever task notices first
//! - Invalid messages answered with `ERR Invalid message` to the sender only
//!
//! # Example Usage
//!
//! ```no_run
//! use linechat_broadcaster::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Port 0 picks any free port
//!     let server = ChatServer::new(ServerConfig::new("127.0.0.1", 0));
//!     let addr = server.start().await?;
//!     println!("listening on {}", addr);
//!
//!     // Server-side announcement, ordered like any client message
//!     server.broadcast("welcome").await?;
//!
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;

mod acceptor;
mod engine;
mod receiver;

// Re-exports
pub use config::ServerConfig;
pub use error::{BroadcasterError, Result};
pub use registry::SessionRegistry;
pub use server::{ChatServer, ServerState};
pub use session::{Session, SessionId};
