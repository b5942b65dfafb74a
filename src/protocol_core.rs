//! Frame codec and file-name rules shared by the client driver and the daemon
//!
//! A frame is a 4-byte big-endian payload length followed by a bincode-encoded
//! [`Envelope`]. Raw file bodies never go through this module.

use crate::error::{Result, TransferError};
use crate::protocol::{Envelope, LEN_PREFIX, MAX_FRAME_SIZE};
use bincode::Options;
use std::path::{Component, Path, PathBuf};

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
        .with_limit(MAX_FRAME_SIZE as u64)
        .reject_trailing_bytes()
}

/// Validate frame payload size against protocol::MAX_FRAME_SIZE
pub fn validate_frame_size(size: usize) -> Result<()> {
    if size > MAX_FRAME_SIZE {
        return Err(TransferError::MalformedFrame(format!(
            "frame payload too large: {} bytes (max: {})",
            size, MAX_FRAME_SIZE
        )));
    }
    Ok(())
}

/// Build frame header (4 bytes, big-endian payload length)
pub fn build_frame_header(payload_len: u32) -> [u8; LEN_PREFIX] {
    payload_len.to_be_bytes()
}

/// Parse frame header, returning the validated payload length
pub fn parse_frame_header(header: &[u8; LEN_PREFIX]) -> Result<usize> {
    let len = u32::from_be_bytes(*header) as usize;
    validate_frame_size(len)?;
    Ok(len)
}

/// Encode one envelope as a complete frame (prefix + payload)
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
    let payload = wire_options()
        .serialize(envelope)
        .map_err(|e| TransferError::MalformedFrame(format!("encode {}: {}", envelope.kind(), e)))?;
    validate_frame_size(payload.len())?;
    let mut buf = Vec::with_capacity(LEN_PREFIX + payload.len());
    buf.extend_from_slice(&build_frame_header(payload.len() as u32));
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a frame payload (without its length prefix)
pub fn decode_envelope(payload: &[u8]) -> Result<Envelope> {
    validate_frame_size(payload.len())?;
    wire_options()
        .deserialize(payload)
        .map_err(|e| TransferError::MalformedFrame(e.to_string()))
}

/// Accept only a bare file name: one normal path component, no separators,
/// no `.`/`..`, no NUL.
pub fn validate_file_name(name: &str) -> Result<&str> {
    let invalid = || TransferError::InvalidFileName(name.to_string());
    if name.is_empty() || name.contains('\0') || name.contains('/') || name.contains('\\') {
        return Err(invalid());
    }
    // Windows: drive prefixes and alternate data streams
    #[cfg(windows)]
    if name.contains(':') {
        return Err(invalid());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == name => Ok(name),
        _ => Err(invalid()),
    }
}

/// Base name of a local path, as sent in a StorageRequest
pub fn base_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))?;
    validate_file_name(&name)?;
    Ok(name)
}

/// Resolve a client-supplied name to a path directly under `root`.
///
/// `root` must already be canonical. Existing entries are canonicalized so a
/// symlink cannot lead outside the root.
pub fn resolve_under_root(root: &Path, name: &str) -> Result<PathBuf> {
    let name = validate_file_name(name)?;
    let joined = root.join(name);
    if joined.symlink_metadata().is_ok() {
        let canonical = joined
            .canonicalize()
            .map_err(|e| TransferError::local(Path::new(name), e))?;
        if !canonical.starts_with(root) {
            return Err(TransferError::InvalidFileName(name.to_string()));
        }
        return Ok(canonical);
    }
    Ok(joined)
}
