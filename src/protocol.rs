//! Shared protocol constants and control messages for the shuttle transport

use serde::{Deserialize, Serialize};

/// Length of the big-endian frame length prefix
pub const LEN_PREFIX: usize = 4;

// Maximum frame payload size (64KB) - control messages only, file bytes are never framed.
// Anything larger is a corrupt or hostile peer.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// MD5 digest length
pub const CHECKSUM_LEN: usize = 16;

/// Default daemon port
pub const DEFAULT_PORT: u16 = 9032;

/// Chunk size for raw file body streaming
pub const STREAM_CHUNK: usize = 1024 * 1024;

pub type Checksum = [u8; CHECKSUM_LEN];

// Status strings the daemon sends back in `Response.message`
pub mod status {
    pub const READY_FOR_DATA: &str = "ready for data";
    pub const READY_TO_SEND: &str = "ready to send";
    pub const STORAGE_COMPLETE: &str = "storage complete";
    pub const INVALID_CHECKSUM: &str = "invalid checksum";
    pub const NOT_ENOUGH_SPACE: &str = "not enough disk space";
}

// Best-effort notification bounds; the protocol itself has no timeouts
pub mod timeouts {
    // Upper bound for a failure Response sent to a peer that may already be gone (ms)
    pub const NOTIFY_MS: u64 = 2_000;
}

/// Client -> server: begin a PUT
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StorageRequest {
    pub file_name: String,
    pub size: u64,
}

/// Client -> server: begin a GET
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub file_name: String,
}

/// Generic ack/nack
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub success: bool,
    pub message: String,
}

/// Server -> client before the file body of a GET
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RetrievalResponse {
    pub success: bool,
    pub message: String,
    pub size: u64,
}

/// Digest over exactly the bytes streamed in the current transfer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMessage {
    pub checksum: Checksum,
}

/// The only unit ever placed on the wire as a framed message.
///
/// Raw file bytes are never wrapped in an envelope; both peers know from their
/// position in the exchange when a raw run of `size` bytes follows.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    StorageRequest(StorageRequest),
    RetrievalRequest(RetrievalRequest),
    Response(Response),
    RetrievalResponse(RetrievalResponse),
    Checksum(ChecksumMessage),
}

impl Envelope {
    /// Short variant name for logs and protocol errors
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::StorageRequest(_) => "StorageRequest",
            Envelope::RetrievalRequest(_) => "RetrievalRequest",
            Envelope::Response(_) => "Response",
            Envelope::RetrievalResponse(_) => "RetrievalResponse",
            Envelope::Checksum(_) => "ChecksumMessage",
        }
    }

    pub fn response(success: bool, message: impl Into<String>) -> Self {
        Envelope::Response(Response {
            success,
            message: message.into(),
        })
    }

    pub fn retrieval_response(success: bool, message: impl Into<String>, size: u64) -> Self {
        Envelope::RetrievalResponse(RetrievalResponse {
            success,
            message: message.into(),
            size,
        })
    }
}
