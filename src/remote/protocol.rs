//! Playground session wire protocol.
//!
//! JSON objects over WebSocket text frames, in both directions. Fields are
//! all optional and only the relevant ones are present; a frame can carry
//! several at once and each is applied independently.
//!
//! There is no request/response correlation on the wire. Responses are
//! applied to the latest session state as they arrive (last write wins),
//! which is a known ordering weakness of the protocol: a slow compile
//! overtaken by a newer one can still land late.

use serde::{Deserialize, Serialize};

use crate::compile::{BackendEvent, CompileRequest};
use crate::error::CompileError;

fn is_false(b: &bool) -> bool {
    !*b
}

// =============================================================================
// Client -> service
// =============================================================================

/// Request frame. `jsonnet` asks for compilation; `clickhouse` additionally
/// asks for execution of the result; `share` asks for persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonnet: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub clickhouse: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub share: bool,
}

impl ClientFrame {
    /// Compile only
    pub fn compile(source: impl Into<String>) -> Self {
        Self {
            jsonnet: Some(source.into()),
            ..Self::default()
        }
    }

    /// Compile and execute the result
    pub fn execute(source: impl Into<String>) -> Self {
        Self {
            jsonnet: Some(source.into()),
            clickhouse: true,
            ..Self::default()
        }
    }

    /// Persist the source for sharing
    pub fn share(source: impl Into<String>) -> Self {
        Self {
            jsonnet: Some(source.into()),
            share: true,
            ..Self::default()
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

impl From<&CompileRequest> for ClientFrame {
    fn from(request: &CompileRequest) -> Self {
        if request.wants_share() {
            Self::share(request.source.clone())
        } else if request.wants_execution() {
            Self::execute(request.source.clone())
        } else {
            Self::compile(request.source.clone())
        }
    }
}

// =============================================================================
// Service -> client
// =============================================================================

/// Response frame.
///
/// `error` is an open payload (string or structured object) and is decoded
/// defensively. `initial` arrives once, as the first message of a session
/// restored from a share token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl ServerFrame {
    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }

    /// Map a frame onto backend events, in application order.
    ///
    /// An error frame yields only the error: the service does not combine
    /// `error` with result fields, and the reconciler branches on the error
    /// alone. Otherwise each present field becomes one event, with `initial`
    /// first so a replay lands before its follow-up results.
    pub fn into_events(self) -> Vec<BackendEvent> {
        if let Some(error) = self.error {
            return vec![BackendEvent::Failed {
                seq: None,
                error: CompileError::from_value(&error),
            }];
        }
        let mut events = Vec::new();
        if let Some(initial) = self.initial {
            events.push(BackendEvent::Replay(initial));
        }
        if let Some(sql) = self.sql {
            events.push(BackendEvent::Compiled { seq: None, sql });
        }
        if let Some(data) = self.data {
            events.push(BackendEvent::SideData(data));
        }
        if let Some(share) = self.share {
            events.push(BackendEvent::ShareToken(share));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::RequestKind;
    use crate::error::Location;

    #[test]
    fn test_compile_frame_carries_only_source() {
        let json = ClientFrame::compile("{}").to_json();
        assert_eq!(json, r#"{"jsonnet":"{}"}"#);
    }

    #[test]
    fn test_execute_frame() {
        let json = ClientFrame::execute("{}").to_json();
        assert!(json.contains(r#""clickhouse":true"#));
        assert!(!json.contains("share"));
    }

    #[test]
    fn test_share_frame() {
        let json = ClientFrame::share("{ a: 1 }").to_json();
        assert!(json.contains(r#""share":true"#));
        assert!(!json.contains("clickhouse"));
    }

    #[test]
    fn test_request_mapping() {
        let edit = CompileRequest::new(0, RequestKind::Edit, "{}");
        assert_eq!(ClientFrame::from(&edit), ClientFrame::compile("{}"));

        let submit = CompileRequest::new(1, RequestKind::Submit, "{}");
        assert_eq!(ClientFrame::from(&submit), ClientFrame::execute("{}"));

        let share = CompileRequest::new(2, RequestKind::Share, "{}");
        assert_eq!(ClientFrame::from(&share), ClientFrame::share("{}"));
    }

    #[test]
    fn test_result_frame_to_events() {
        let frame = ServerFrame::from_json(r#"{"sql":"SELECT 1","data":"1\n"}"#).unwrap();
        let events = frame.into_events();
        assert_eq!(
            events,
            vec![
                BackendEvent::Compiled {
                    seq: None,
                    sql: "SELECT 1".to_string()
                },
                BackendEvent::SideData("1\n".to_string()),
            ]
        );
    }

    #[test]
    fn test_replay_frame_orders_initial_first() {
        let frame = ServerFrame {
            initial: Some("{ a: 1 }".to_string()),
            sql: Some("SELECT 1".to_string()),
            ..ServerFrame::default()
        };
        let events = frame.into_events();
        assert!(matches!(events[0], BackendEvent::Replay(_)));
    }

    #[test]
    fn test_error_frame_wins_over_results() {
        let frame = ServerFrame::from_json(
            r#"{"sql":"stale","error":{"message":"syntax error","location":[2,5]}}"#,
        )
        .unwrap();
        let events = frame.into_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            BackendEvent::Failed { seq: None, error } => {
                assert_eq!(error.message, "syntax error");
                assert_eq!(error.location, Some(Location::new(2, 5)));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_string_error() {
        let frame = ServerFrame::from_json(r#"{"error":"boom"}"#).unwrap();
        match &frame.into_events()[0] {
            BackendEvent::Failed { error, .. } => assert_eq!(error.message, "boom"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn test_share_token_frame() {
        let frame = ServerFrame::from_json(r#"{"share":"tok123"}"#).unwrap();
        assert_eq!(
            frame.into_events(),
            vec![BackendEvent::ShareToken("tok123".to_string())]
        );
    }

    #[test]
    fn test_malformed_frame_is_none() {
        assert!(ServerFrame::from_json("not json").is_none());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let frame = ServerFrame::from_json(r#"{"sql":"SELECT 1","version":"2"}"#).unwrap();
        assert_eq!(frame.sql.as_deref(), Some("SELECT 1"));
    }
}
