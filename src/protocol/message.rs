//! Cross-boundary message types.
//!
//! Each direction has its own closed vocabulary, discriminated by the
//! `what` field with the payload under `data`.
//!
//! # Format
//!
//! ```json
//! { "what": "onRequestRawStats", "data": [ ... ] }
//! { "what": "requestRawStats" }
//! ```
//!
//! | Direction | `what` | `data` |
//! |-----------|--------|--------|
//! | main → worker | `onRequestRawStats` | `RawStats[]` |
//! | main → worker | `onRequestInitialConfig` | `InitialConfig` |
//! | main → worker | `onUserMediaError` | `UserMediaErrorPayload` |
//! | main → worker | `onRequestAccessToken` | `string` |
//! | main → worker | `onExtensionStats` | `ExtensionStatsPayload` |
//! | worker → main | `requestInitialConfig` | none |
//! | worker → main | `requestAccessToken` | none |
//! | worker → main | `requestRawStats` | none |
//! | worker → main | `onLocalTransport` | `PeerConnectionSample[]` |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collector::stats::{RawStats, UserMediaErrorPayload};
use crate::error::{Error, Result};

use super::sample::PeerConnectionSample;

// ============================================================================
// TransportType
// ============================================================================

/// Where the worker delivers finished samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Posted back to the main context for a local callback.
    Local,
    /// Sent to the remote aggregator over a websocket.
    #[default]
    Remote,
}

// ============================================================================
// InitialConfig
// ============================================================================

/// Session configuration handed to the worker once.
///
/// Field names on the wire match the existing worker counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialConfig {
    /// Aggregator websocket address.
    #[serde(rename = "wsAddress")]
    pub remote_address: String,

    /// Collection period in milliseconds.
    #[serde(rename = "poolingIntervalInMs")]
    pub poll_interval_ms: u64,

    /// Delivery target.
    #[serde(rename = "transportType", default)]
    pub transport_type: TransportType,

    /// Token resolved at delivery time.
    #[serde(
        rename = "accessToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<String>,
}

impl InitialConfig {
    /// Creates a remote-transport config without a token.
    #[must_use]
    pub fn new(remote_address: impl Into<String>, poll_interval_ms: u64) -> Self {
        Self {
            remote_address: remote_address.into(),
            poll_interval_ms,
            transport_type: TransportType::Remote,
            access_token: None,
        }
    }

    /// Returns the collection period.
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ============================================================================
// Extension stats
// ============================================================================

/// Caller-supplied auxiliary measurement, as posted across the boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionStatsPayload {
    /// Caller-defined category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_type: Option<String>,
    /// Arbitrary measurement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ExtensionStatsPayload {
    /// Creates a payload.
    #[must_use]
    pub fn new(extension_type: Option<&str>, payload: Option<Value>) -> Self {
        Self {
            extension_type: extension_type.map(str::to_string),
            payload,
        }
    }

    /// Returns `true` if neither field carries anything.
    ///
    /// `null` and empty strings count as absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let no_type = self.extension_type.as_deref().is_none_or(str::is_empty);
        let no_payload = match &self.payload {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        no_type && no_payload
    }
}

/// A normalized extension record, ready to ride on a sample.
///
/// `serialized` is the payload itself when it was a string, its JSON text
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    /// Caller-defined category.
    #[serde(
        rename = "extensionType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub extension_type: Option<String>,

    /// Original payload.
    #[serde(skip)]
    pub payload: Value,

    /// Serialized payload.
    #[serde(rename = "payload")]
    pub serialized: String,
}

impl ExtensionRecord {
    /// Normalizes `stats`, returning `None` for empty payloads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload cannot be serialized.
    pub fn normalize(stats: ExtensionStatsPayload) -> Result<Option<Self>> {
        if stats.is_empty() {
            return Ok(None);
        }
        let payload = stats.payload.unwrap_or(Value::Null);
        let serialized = match &payload {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other)?,
        };
        Ok(Some(Self {
            extension_type: stats.extension_type,
            payload,
            serialized,
        }))
    }
}

// ============================================================================
// ClientPayload
// ============================================================================

/// Message posted by the main context to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "what", content = "data", rename_all = "camelCase")]
pub enum ClientPayload {
    /// Snapshots for every live connection.
    OnRequestRawStats(Vec<RawStats>),
    /// Session configuration.
    OnRequestInitialConfig(InitialConfig),
    /// A `getUserMedia` failure.
    OnUserMediaError(UserMediaErrorPayload),
    /// A freshly resolved access token.
    OnRequestAccessToken(String),
    /// An auxiliary measurement.
    OnExtensionStats(ExtensionStatsPayload),
}

impl ClientPayload {
    /// Every `what` tag in this direction.
    pub const TAGS: [&'static str; 5] = [
        "onRequestRawStats",
        "onRequestInitialConfig",
        "onUserMediaError",
        "onRequestAccessToken",
        "onExtensionStats",
    ];

    /// Returns the `what` tag.
    #[must_use]
    pub fn what(&self) -> &'static str {
        match self {
            Self::OnRequestRawStats(_) => Self::TAGS[0],
            Self::OnRequestInitialConfig(_) => Self::TAGS[1],
            Self::OnUserMediaError(_) => Self::TAGS[2],
            Self::OnRequestAccessToken(_) => Self::TAGS[3],
            Self::OnExtensionStats(_) => Self::TAGS[4],
        }
    }

    /// Encodes to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from JSON text.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownMessage`] if `what` is outside the vocabulary
    /// - [`Error::Protocol`] if `what` is missing
    /// - [`Error::Json`] if `data` does not match `what`
    pub fn decode(text: &str) -> Result<Self> {
        decode_tagged(text, &Self::TAGS)
    }
}

// ============================================================================
// WorkerPayload
// ============================================================================

/// Message posted by the worker to the main context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "what", content = "data", rename_all = "camelCase")]
pub enum WorkerPayload {
    /// Ask for the session configuration.
    RequestInitialConfig,
    /// Ask for a fresh access token.
    RequestAccessToken,
    /// Ask for a collection cycle.
    RequestRawStats,
    /// Finished samples for the local transport.
    OnLocalTransport(Vec<PeerConnectionSample>),
}

impl WorkerPayload {
    /// Every `what` tag in this direction.
    pub const TAGS: [&'static str; 4] = [
        "requestInitialConfig",
        "requestAccessToken",
        "requestRawStats",
        "onLocalTransport",
    ];

    /// Returns the `what` tag.
    #[must_use]
    pub fn what(&self) -> &'static str {
        match self {
            Self::RequestInitialConfig => Self::TAGS[0],
            Self::RequestAccessToken => Self::TAGS[1],
            Self::RequestRawStats => Self::TAGS[2],
            Self::OnLocalTransport(_) => Self::TAGS[3],
        }
    }

    /// Encodes to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from JSON text.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownMessage`] if `what` is outside the vocabulary
    /// - [`Error::Protocol`] if `what` is missing
    /// - [`Error::Json`] if `data` does not match `what`
    pub fn decode(text: &str) -> Result<Self> {
        decode_tagged(text, &Self::TAGS)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Checks the discriminator before handing the value to serde, so an
/// unknown tag is reported as such rather than as a shape mismatch.
fn decode_tagged<T: DeserializeOwned>(text: &str, tags: &[&str]) -> Result<T> {
    let value: Value = serde_json::from_str(text)?;
    let what = value
        .get("what")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::protocol("message has no `what` discriminator"))?;

    if !tags.contains(&what) {
        return Err(Error::unknown_message(what));
    }

    Ok(serde_json::from_value(value)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_messages_have_no_data() {
        let json = WorkerPayload::RequestRawStats.encode().unwrap();
        assert_eq!(json, r#"{"what":"requestRawStats"}"#);

        let json = WorkerPayload::RequestInitialConfig.encode().unwrap();
        assert_eq!(json, r#"{"what":"requestInitialConfig"}"#);
    }

    #[test]
    fn test_access_token_message_shape() {
        let msg = ClientPayload::OnRequestAccessToken("tok".into());
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value, json!({ "what": "onRequestAccessToken", "data": "tok" }));
    }

    #[test]
    fn test_initial_config_wire_names() {
        let config = InitialConfig {
            access_token: Some("t".into()),
            ..InitialConfig::new("ws://aggregator", 1000)
        };
        let value = serde_json::to_value(ClientPayload::OnRequestInitialConfig(config)).unwrap();
        assert_eq!(
            value,
            json!({
                "what": "onRequestInitialConfig",
                "data": {
                    "wsAddress": "ws://aggregator",
                    "poolingIntervalInMs": 1000,
                    "transportType": "remote",
                    "accessToken": "t"
                }
            })
        );
    }

    #[test]
    fn test_initial_config_without_token_omits_field() {
        let value = serde_json::to_value(InitialConfig::new("ws://a", 5)).unwrap();
        assert!(value.get("accessToken").is_none());
    }

    #[test]
    fn test_decode_known_client_payload() {
        let text = r#"{"what":"onExtensionStats","data":{"extensionType":"cpu","payload":{"load":3}}}"#;
        let msg = ClientPayload::decode(text).unwrap();
        assert_eq!(
            msg,
            ClientPayload::OnExtensionStats(ExtensionStatsPayload::new(
                Some("cpu"),
                Some(json!({ "load": 3 }))
            ))
        );
        assert_eq!(msg.what(), "onExtensionStats");
    }

    #[test]
    fn test_decode_unknown_tag() {
        let err = WorkerPayload::decode(r#"{"what":"reboot"}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownMessage { what } if what == "reboot"));
    }

    #[test]
    fn test_decode_missing_tag() {
        let err = ClientPayload::decode(r#"{"data":1}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_decode_mismatched_data() {
        let err = ClientPayload::decode(r#"{"what":"onRequestAccessToken","data":42}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_decode_other_direction_tag_is_unknown() {
        let err = ClientPayload::decode(r#"{"what":"requestRawStats"}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownMessage { .. }));
    }

    #[test]
    fn test_extension_payload_emptiness() {
        assert!(ExtensionStatsPayload::new(None, None).is_empty());
        assert!(ExtensionStatsPayload::new(Some(""), Some(Value::Null)).is_empty());
        assert!(!ExtensionStatsPayload::new(Some("cpu"), None).is_empty());
        assert!(!ExtensionStatsPayload::new(None, Some(json!(0))).is_empty());
    }

    #[test]
    fn test_extension_record_serialization() {
        let record = ExtensionRecord::normalize(ExtensionStatsPayload::new(
            Some("net"),
            Some(json!({ "rtt": 12 })),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(record.serialized, r#"{"rtt":12}"#);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({ "extensionType": "net", "payload": "{\"rtt\":12}" }));
    }

    #[test]
    fn test_extension_record_keeps_string_payload() {
        let record = ExtensionRecord::normalize(ExtensionStatsPayload::new(
            None,
            Some(json!("raw text")),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(record.serialized, "raw text");
    }
}
