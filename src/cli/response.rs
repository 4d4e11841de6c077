//! The JSON envelope every command prints.

use crate::domain::error::CoordinatorError;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ok { ok: bool, data: Value },
    Err { ok: bool, error: ErrorBody },
}

impl Response {
    pub fn ok<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Response::Ok { ok: true, data },
            Err(e) => Response::Err {
                ok: false,
                error: ErrorBody {
                    kind: "internal".into(),
                    message: format!("could not encode response: {e}"),
                    details: None,
                },
            },
        }
    }

    pub fn error(e: &CoordinatorError) -> Self {
        Response::Err {
            ok: false,
            error: ErrorBody {
                kind: e.kind().to_string(),
                message: e.to_string(),
                details: e.batch_report().and_then(|r| serde_json::to_value(r).ok()),
            },
        }
    }

    /// Bad command-line payload, before any coordinator call.
    pub fn invalid(message: impl Into<String>) -> Self {
        Response::Err {
            ok: false,
            error: ErrorBody {
                kind: "invalid_input".into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| format!(r#"{{"ok":false,"error":{{"kind":"internal","message":"{e}"}}}}"#))
    }
}

impl<T: Serialize> From<Result<T, CoordinatorError>> for Response {
    fn from(result: Result<T, CoordinatorError>) -> Self {
        match result {
            Ok(data) => Response::ok(&data),
            Err(e) => Response::error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::values::batch::{BatchReport, ConnectionOutcome};

    #[test]
    fn test_ok_envelope() {
        let json: Value = serde_json::from_str(&Response::ok(&vec![1, 2]).to_json()).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"][1], 2);
    }

    #[test]
    fn test_error_envelope_carries_kind() {
        let e = CoordinatorError::NotFound("Connection not found: x".into());
        let json: Value = serde_json::from_str(&Response::error(&e).to_json()).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["kind"], "not_found");
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn test_batch_error_includes_report() {
        let mut report = BatchReport::new("start-all");
        report.push("a", ConnectionOutcome::Applied);
        report.push(
            "b",
            ConnectionOutcome::Failed {
                kind: "persistence_failure".into(),
                message: "disk full".into(),
            },
        );
        let e = CoordinatorError::PartialBatchFailure(report);
        let json: Value = serde_json::from_str(&Response::error(&e).to_json()).unwrap();
        assert_eq!(json["error"]["kind"], "partial_batch_failure");
        assert_eq!(json["error"]["details"]["failed"], 1);
    }
}
