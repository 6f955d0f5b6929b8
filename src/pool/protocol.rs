//! Framed wire protocol between the parent and its workers.
//!
//! Every message is `{length: u32 little-endian, payload}`. Payloads may
//! contain arbitrary byte strings, so the length prefix is what delimits
//! frames; the payload itself is JSON, matching the serialisation stack
//! used everywhere else in the crate. Requests are a bare job value;
//! replies are one of the [`Reply`] envelopes.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A reply envelope from a worker.
///
/// Warnings stream ahead of the final `Result`; an `Error` is the worker's
/// last word before it exits non-zero.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply<R> {
    Result(R),
    Warning(String),
    Error(String),
}

/// Write one framed message.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one framed message. `Ok(None)` means the peer closed the channel
/// cleanly at a frame boundary; EOF inside a frame is an error.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(serde_json::from_slice(&payload)?))
}
