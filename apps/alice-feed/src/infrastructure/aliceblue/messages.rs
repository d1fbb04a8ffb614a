//! Feed Request Types
//!
//! Wire format of the requests the client sends. Field order matches the
//! venue's examples so encoded requests are byte-for-byte predictable.
//!
//! # JSON feed
//!
//! - Connect: `{"susertoken":"...","t":"c","actid":"AB123_API","uid":"AB123_API","source":"API"}`
//! - Subscribe: `{"k":"NSE|1594#NSE|22","t":"t"}`
//! - Heartbeat: `{"t":"h"}`
//!
//! # Binary feed
//!
//! - Subscribe: `{"a":"subscribe","v":[[1,1594]],"m":"marketdata"}`
//! - Segment topics: `{"a":"subscribe","v":[1,2,3,4,6,7],"m":"market_status"}`
//! - Heartbeat: `{"a":"h","v":[],"m":""}`

use serde::Serialize;
use sha2::{Digest, Sha256};

// =============================================================================
// JSON Feed
// =============================================================================

/// Suffix the venue expects on account ids for API sessions.
pub const API_ACCOUNT_SUFFIX: &str = "_API";

/// Connection handshake for the JSON feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectRequest {
    /// Double SHA-256 of the session id, hex encoded.
    pub susertoken: String,
    /// Message type (always `c`).
    #[serde(rename = "t")]
    pub msg_type: &'static str,
    /// Account id.
    pub actid: String,
    /// User id.
    pub uid: String,
    /// Request source (always `API`).
    pub source: &'static str,
}

impl ConnectRequest {
    /// Build the handshake for a user session.
    #[must_use]
    pub fn new(user_id: &str, session_id: &str) -> Self {
        let account = format!("{user_id}{API_ACCOUNT_SUFFIX}");
        Self {
            susertoken: session_token(session_id),
            msg_type: "c",
            actid: account.clone(),
            uid: account,
            source: "API",
        }
    }
}

/// Hash a session id the way the feed handshake expects:
/// `hex(sha256(hex(sha256(session))))`.
#[must_use]
pub fn session_token(session_id: &str) -> String {
    let first = hex::encode(Sha256::digest(session_id.as_bytes()));
    hex::encode(Sha256::digest(first.as_bytes()))
}

/// Subscribe or unsubscribe request keyed by `EXCHANGE|TOKEN` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyedRequest {
    /// `#`-joined instrument keys.
    #[serde(rename = "k")]
    pub keys: String,
    /// Request type (`t`, `d`, `u` or `ud`).
    #[serde(rename = "t")]
    pub msg_type: &'static str,
}

/// Heartbeat for the JSON feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypedHeartbeat {
    /// Message type (always `h`).
    #[serde(rename = "t")]
    pub msg_type: &'static str,
}

impl Default for TypedHeartbeat {
    fn default() -> Self {
        Self { msg_type: "h" }
    }
}

// =============================================================================
// Binary Feed
// =============================================================================

/// Exchange codes sent with segment topic subscriptions.
pub const SEGMENT_EXCHANGE_CODES: [u8; 6] = [1, 2, 3, 4, 6, 7];

/// Instrument request for the binary feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRequest {
    /// Action (`subscribe` or `unsubscribe`).
    #[serde(rename = "a")]
    pub action: &'static str,
    /// `[exchange code, token]` pairs.
    #[serde(rename = "v")]
    pub values: Vec<(u8, u32)>,
    /// Feed mode name.
    #[serde(rename = "m")]
    pub mode: &'static str,
}

/// Segment-wide request (and heartbeat) for the binary feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRequest {
    /// Action (`subscribe`, `unsubscribe` or `h`).
    #[serde(rename = "a")]
    pub action: &'static str,
    /// Exchange codes.
    #[serde(rename = "v")]
    pub values: Vec<u8>,
    /// Topic name.
    #[serde(rename = "m")]
    pub mode: &'static str,
}

impl SegmentRequest {
    /// Heartbeat for the binary feed.
    #[must_use]
    pub const fn heartbeat() -> Self {
        Self {
            action: "h",
            values: Vec::new(),
            mode: "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_is_double_sha256_hex() {
        let first = hex::encode(Sha256::digest(b"abc"));
        assert_eq!(
            first,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let token = session_token("abc");
        assert_eq!(token, hex::encode(Sha256::digest(first.as_bytes())));
        assert_eq!(token.len(), 64);
        assert_ne!(token, first);
    }

    #[test]
    fn connect_request_encoding() {
        let request = ConnectRequest::new("AB123", "abc");
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            format!(
                r#"{{"susertoken":"{}","t":"c","actid":"AB123_API","uid":"AB123_API","source":"API"}}"#,
                session_token("abc")
            )
        );
    }

    #[test]
    fn keyed_request_encoding() {
        let request = KeyedRequest {
            keys: "NSE|1594#NSE|22".to_string(),
            msg_type: "t",
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"k":"NSE|1594#NSE|22","t":"t"}"#
        );
        assert_eq!(
            serde_json::to_string(&TypedHeartbeat::default()).unwrap(),
            r#"{"t":"h"}"#
        );
    }

    #[test]
    fn binary_request_encoding() {
        let request = ActionRequest {
            action: "subscribe",
            values: vec![(1, 1594), (2, 35001)],
            mode: "marketdata",
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"a":"subscribe","v":[[1,1594],[2,35001]],"m":"marketdata"}"#
        );
        assert_eq!(
            serde_json::to_string(&SegmentRequest::heartbeat()).unwrap(),
            r#"{"a":"h","v":[],"m":""}"#
        );
    }
}
