//! Structural errors of the ingestion layer.
//!
//! Only bad bytes on the wire and an unavailable bind address are errors.
//! Missing or oddly typed fields inside a decoded packet are normal data and
//! are handled by defaults in [`crate::pose::UpperBodyPacket`].

use thiserror::Error;

/// Errors surfaced by [`crate::listener::PacketListener`].
#[derive(Error, Debug)]
pub enum ListenerError {
    /// The UDP endpoint could not be bound (port in use, bad host, ...).
    #[error("failed to bind udp://{addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a datagram was dropped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
