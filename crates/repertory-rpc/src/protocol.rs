//! Envelope encode/decode and nonce/version handshake fields (spec §4.9).
//!
//! Every request envelope is, front to back: `nonce`, `version`,
//! `service_flags`, `client_id`, `thread_id`, `method`, then method-specific
//! `args` (opaque, left to the handler to decode further). Every response
//! envelope is `nonce`, `service_flags`, `result`, then `body`. Both are
//! encrypted as a whole (see [`crate::crypto`]) before going out over the
//! framed socket (see [`crate::frame`]).

use repertory_common::codec::{Buffer, Codec};
use repertory_common::{ApiError, Result};
use uuid::Uuid;

/// Bumped whenever the envelope shape changes incompatibly.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Oldest client/server version this build still interoperates with.
pub const MIN_REMOTE_VERSION: &str = "1.0.0";

/// Capability bits exchanged with every message; no optional capabilities
/// are defined yet, so this is always zero.
pub const SERVICE_FLAGS: u32 = 0;

/// A fresh per-connection anti-replay token.
#[must_use]
pub fn generate_nonce() -> String {
    Uuid::new_v4().to_string()
}

/// Lexicographic version compare good enough for `MAJOR.MINOR.PATCH` strings.
#[must_use]
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    fn parts(v: &str) -> Vec<u32> {
        v.split('.').map(|p| p.parse().unwrap_or(0)).collect()
    }
    parts(version) >= parts(minimum)
}

#[derive(Clone, Debug)]
pub struct RequestEnvelope {
    pub nonce: String,
    pub version: String,
    pub service_flags: u32,
    pub client_id: String,
    pub thread_id: u64,
    pub method: String,
    pub args: Vec<u8>,
}

impl RequestEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Buffer::new();
        buf.encode(&self.nonce);
        buf.encode(&self.version);
        buf.encode(&self.service_flags);
        buf.encode(&self.client_id);
        buf.encode(&self.thread_id);
        buf.encode(&self.method);
        let mut out = buf.into_vec();
        out.extend_from_slice(&self.args);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = Buffer::from_vec(bytes.to_vec());
        let nonce = buf.decode::<String>()?;
        let version = buf.decode::<String>()?;
        let service_flags = buf.decode::<u32>()?;
        let client_id = buf.decode::<String>()?;
        let thread_id = buf.decode::<u64>()?;
        let method = buf.decode::<String>()?;
        let args = bytes[bytes.len() - buf.remaining()..].to_vec();
        Ok(Self {
            nonce,
            version,
            service_flags,
            client_id,
            thread_id,
            method,
            args,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ResponseEnvelope {
    pub nonce: String,
    pub service_flags: u32,
    pub result: i32,
    pub body: Vec<u8>,
}

impl ResponseEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Buffer::new();
        buf.encode(&self.nonce);
        buf.encode(&self.service_flags);
        buf.encode(&self.result);
        let mut out = buf.into_vec();
        out.extend_from_slice(&self.body);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = Buffer::from_vec(bytes.to_vec());
        let nonce = buf.decode::<String>()?;
        let service_flags = buf.decode::<u32>()?;
        let result = buf.decode::<i32>()?;
        let body = bytes[bytes.len() - buf.remaining()..].to_vec();
        Ok(Self {
            nonce,
            service_flags,
            result,
            body,
        })
    }
}

/// The handshake response the server sends right after accept: a nonce with
/// no method/args, result `0`. Decoded the same way as any other response.
#[must_use]
pub fn encode_handshake(nonce: &str) -> Vec<u8> {
    ResponseEnvelope {
        nonce: nonce.to_string(),
        service_flags: SERVICE_FLAGS,
        result: 0,
        body: Vec::new(),
    }
    .encode()
}

pub fn check_version(version: &str) -> Result<()> {
    if version_at_least(version, MIN_REMOTE_VERSION) {
        Ok(())
    } else {
        Err(ApiError::IncompatibleVersion(version.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_round_trips() {
        let req = RequestEnvelope {
            nonce: "n1".to_string(),
            version: PROTOCOL_VERSION.to_string(),
            service_flags: 0,
            client_id: "client-a".to_string(),
            thread_id: 42,
            method: "getattr".to_string(),
            args: vec![1, 2, 3, 4],
        };
        let encoded = req.encode();
        let decoded = RequestEnvelope::decode(&encoded).unwrap();
        assert_eq!(decoded.nonce, "n1");
        assert_eq!(decoded.thread_id, 42);
        assert_eq!(decoded.method, "getattr");
        assert_eq!(decoded.args, vec![1, 2, 3, 4]);
    }

    #[test]
    fn response_envelope_round_trips_with_empty_body() {
        let resp = ResponseEnvelope {
            nonce: "n2".to_string(),
            service_flags: 0,
            result: 0,
            body: Vec::new(),
        };
        let decoded = ResponseEnvelope::decode(&resp.encode()).unwrap();
        assert_eq!(decoded.nonce, "n2");
        assert_eq!(decoded.result, 0);
        assert!(decoded.body.is_empty());
    }

    #[test]
    fn version_check_rejects_older() {
        assert!(check_version("1.0.0").is_ok());
        assert!(check_version("0.9.0").is_err());
    }
}
