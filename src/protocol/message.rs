//! Typed requests and responses carried in frame payloads.
//!
//! Inbound payloads are decoded leniently: absent or mistyped fields become
//! empty values and never fail the decode. Only a missing `msgId` makes a
//! payload meaningless, in which case it is ignored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ProtocolResult;
use crate::watcher::RuleConfig;

pub const MSG_VERSION: &str = "version";
pub const MSG_START: &str = "start";
pub const MSG_STOP: &str = "stop";
pub const MSG_STOP_ALL: &str = "stopAll";
pub const MSG_DIRECTORY_SELECT: &str = "directorySelect";
pub const MSG_RELOAD: &str = "reload";

/// Parameters of a `start` request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartRequest {
    pub rule_id: String,
    pub directory: String,
    pub include_pattern: Option<String>,
    pub exclude_pattern: Option<String>,
}

impl From<StartRequest> for RuleConfig {
    fn from(request: StartRequest) -> Self {
        RuleConfig {
            rule_id: request.rule_id,
            directory: PathBuf::from(request.directory),
            include_pattern: request.include_pattern,
            exclude_pattern: request.exclude_pattern,
        }
    }
}

/// Inbound message from the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Version,
    Start(StartRequest),
    Stop { rule_id: String },
    StopAll,
    DirectorySelect {
        rule_id: String,
        directory: Option<String>,
    },
    /// A `msgId` this host does not understand.
    Unknown(String),
}

impl Request {
    /// Decode a frame payload.
    ///
    /// Returns `None` for payloads without a `msgId`, including payloads that
    /// are not valid JSON at all.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let value = serde_json::from_slice::<Value>(payload).unwrap_or(Value::Null);
        Self::from_value(&value)
    }

    /// Build a request from an already parsed JSON value.
    pub fn from_value(value: &Value) -> Option<Self> {
        let msg_id = match value.get("msgId") {
            None | Some(Value::Null) => return None,
            Some(id) => id.as_str().unwrap_or_default(),
        };

        let request = match msg_id {
            MSG_VERSION => Request::Version,
            MSG_START => Request::Start(StartRequest {
                rule_id: string_field(value, "ruleId"),
                directory: string_field(value, "directory"),
                include_pattern: optional_field(value, "includePattern"),
                exclude_pattern: optional_field(value, "excludePattern"),
            }),
            MSG_STOP => Request::Stop {
                rule_id: string_field(value, "ruleId"),
            },
            MSG_STOP_ALL => Request::StopAll,
            MSG_DIRECTORY_SELECT => Request::DirectorySelect {
                rule_id: string_field(value, "ruleId"),
                directory: optional_field(value, "directory"),
            },
            other => Request::Unknown(other.to_string()),
        };

        Some(request)
    }

    /// The `msgId` this request was decoded from.
    pub fn msg_id(&self) -> &str {
        match self {
            Request::Version => MSG_VERSION,
            Request::Start(_) => MSG_START,
            Request::Stop { .. } => MSG_STOP,
            Request::StopAll => MSG_STOP_ALL,
            Request::DirectorySelect { .. } => MSG_DIRECTORY_SELECT,
            Request::Unknown(id) => id,
        }
    }
}

/// String field, empty when absent or not a string.
fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// String field, `None` when absent, not a string or empty.
fn optional_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Outbound message to the extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msgId", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Response {
    Version {
        version: String,
        executable: String,
        protocol_version: String,
    },
    Reload {
        rule_id: String,
    },
    DirectorySelect {
        rule_id: String,
        directory: String,
    },
}

impl Response {
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn msg_id(&self) -> &'static str {
        match self {
            Response::Version { .. } => MSG_VERSION,
            Response::Reload { .. } => MSG_RELOAD,
            Response::DirectorySelect { .. } => MSG_DIRECTORY_SELECT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn test_decode_start() {
        let payload = br#"{"msgId":"start","ruleId":"r1","directory":"/srv/site","includePattern":"\\.html$","excludePattern":"\\.tmp$"}"#;

        assert_eq!(
            Request::decode(payload),
            Some(Request::Start(StartRequest {
                rule_id: "r1".to_string(),
                directory: "/srv/site".to_string(),
                include_pattern: Some(r"\.html$".to_string()),
                exclude_pattern: Some(r"\.tmp$".to_string()),
            }))
        );
    }

    #[test]
    fn test_absent_fields_are_empty() {
        let request = Request::decode(br#"{"msgId":"start","ruleId":"r1"}"#).unwrap();
        assert_eq!(
            request,
            Request::Start(StartRequest {
                rule_id: "r1".to_string(),
                ..StartRequest::default()
            })
        );

        // Mistyped and null fields behave like absent ones
        let request =
            Request::decode(br#"{"msgId":"directorySelect","ruleId":7,"directory":null}"#).unwrap();
        assert_eq!(
            request,
            Request::DirectorySelect {
                rule_id: String::new(),
                directory: None,
            }
        );
    }

    #[test]
    fn test_missing_msg_id_is_ignored() {
        assert_eq!(Request::decode(br#"{"ruleId":"r1"}"#), None);
        assert_eq!(Request::decode(br#"{"msgId":null}"#), None);
        assert_eq!(Request::decode(b"not json"), None);
        assert_eq!(Request::decode(b"[1,2,3]"), None);
    }

    #[test]
    fn test_unknown_msg_id() {
        assert_eq!(
            Request::decode(br#"{"msgId":"ping"}"#),
            Some(Request::Unknown("ping".to_string()))
        );
        // A non-string msgId matches nothing
        assert_eq!(
            Request::decode(br#"{"msgId":42}"#),
            Some(Request::Unknown(String::new()))
        );
    }

    #[test]
    fn test_simple_requests() {
        assert_eq!(Request::decode(br#"{"msgId":"version"}"#), Some(Request::Version));
        assert_eq!(Request::decode(br#"{"msgId":"stopAll"}"#), Some(Request::StopAll));
        assert_eq!(
            Request::decode(br#"{"msgId":"stop","ruleId":"r9"}"#),
            Some(Request::Stop {
                rule_id: "r9".to_string()
            })
        );
        assert_eq!(Request::StopAll.msg_id(), "stopAll");
    }

    #[test]
    fn test_response_wire_shape() {
        let version = Response::Version {
            version: "1.0.1".to_string(),
            executable: "/usr/bin/filewatcher".to_string(),
            protocol_version: "1.0".to_string(),
        };
        let value: Value = serde_json::from_slice(&version.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "msgId": "version",
                "version": "1.0.1",
                "executable": "/usr/bin/filewatcher",
                "protocolVersion": "1.0",
            })
        );

        let select = Response::DirectorySelect {
            rule_id: "r1".to_string(),
            directory: "/home/me/site".to_string(),
        };
        let value: Value = serde_json::from_slice(&select.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "msgId": "directorySelect", "ruleId": "r1", "directory": "/home/me/site" })
        );
    }

    #[test]
    fn test_reload_round_trip_keeps_field_set() {
        let reload = Response::Reload {
            rule_id: "rule-1".to_string(),
        };
        let bytes = reload.encode().unwrap();

        let value: Value = serde_json::from_slice(&bytes).unwrap();
        let keys: BTreeSet<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, BTreeSet::from(["msgId", "ruleId"]));

        assert_eq!(Response::decode(&bytes).unwrap(), reload);
        assert_eq!(reload.msg_id(), "reload");
    }

    #[test]
    fn test_start_request_into_rule_config() {
        let config: RuleConfig = StartRequest {
            rule_id: "r".to_string(),
            directory: "/site".to_string(),
            include_pattern: None,
            exclude_pattern: Some("x".to_string()),
        }
        .into();

        assert_eq!(config.directory, PathBuf::from("/site"));
        assert_eq!(config.exclude_pattern.as_deref(), Some("x"));
    }
}
