//! Live log streaming for remote observers
//!
//! This crate provides an in-process logging facility whose core is a small
//! TCP server: every log line that passes the severity threshold is rendered
//! once and fanned out, in real time, to any number of connected observers.
//! It is a best-effort live tail — a slow or dead observer is silently
//! dropped and can never stall or fail the application doing the logging.
//!
//! # Features
//!
//! - TCP server on an ephemeral local port, exposed via [`LogServer::port`]
//! - One-line handshake, then a strict one-way stream of log lines
//! - Multiple concurrent observers, each with its own bounded queue
//! - Atomic severity threshold shared by local and streamed emission
//! - Logging works from any thread, with or without a running server
//!
//! # Protocol
//!
//! When an observer connects the server sends a single status line:
//!
//! ```text
//! <code> <message>\n
//! ```
//!
//! eg `0 OK\n`. Code `0` means the connection is accepted and log lines are
//! streamed over the socket from then on. A non-zero code explains a refusal
//! and the connection is closed. No other message with semantic meaning is
//! ever sent.
//!
//! # Example Usage
//!
//! ```no_run
//! use tailcast::{LogServer, Severity};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = LogServer::new();
//!
//!     // Start the streaming server; observers can now attach.
//!     server.start().await;
//!     println!("log stream available on port {}", server.port());
//!
//!     server.set_level(Severity::Debug);
//!     server.info("ENGINE", "engine initialized");
//!     server.debug("RENDER", "first frame rendered");
//!
//!     // Disconnects every observer and joins the accept loop.
//!     server.stop().await;
//! }
//! ```

pub mod error;
pub mod format;
pub mod server;
pub mod severity;

mod client;

// Re-exports
pub use error::{LogServerError, Result};
pub use server::{LogServer, MAX_CLIENTS};
pub use severity::Severity;
