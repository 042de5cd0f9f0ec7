//! Line framing and message validation for linechat
//!
//! The chat server speaks a deliberately tiny protocol: every message is one
//! UTF-8 line terminated by a single `\n`. This crate owns the two pieces
//! the server treats as external collaborators:
//!
//! - [`transport`] - wraps a stream into line-read / line-write halves
//! - [`validation`] - the predicate deciding whether a line is accepted
//!
//! # Example
//!
//! ```no_run
//! use linechat_protocol::{split, MessageValidator, ReadOutcome};
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> linechat_protocol::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:7000").await?;
//! let (mut reader, mut writer) = split(stream);
//!
//! writer.write_line("hola").await?;
//! if let ReadOutcome::Line(line) = reader.read_line().await? {
//!     assert!(MessageValidator::default().is_valid(&line));
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod transport;
pub mod validation;

// Re-exports
pub use error::{ProtocolError, Result};
pub use transport::{
    split, split_with_limit, strip_line_ending, LineReader, LineWriter, ReadOutcome,
};
pub use validation::{MessageValidator, INVALID_MESSAGE_REPLY, MAX_MESSAGE_LEN};
