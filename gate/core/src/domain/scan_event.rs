// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde_json::Value;

use crate::domain::error::GateError;
use crate::domain::image::RepositoryName;

/// Image scan notification that triggers one gate invocation.
///
/// Only `detail.repository-name` is interpreted; the whole payload is kept
/// verbatim so reports can echo it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEvent {
    repository: RepositoryName,
    repository_id: String,
    raw: Value,
}

impl ScanEvent {
    pub fn parse(raw: Value) -> Result<Self, GateError> {
        let repository_id = raw
            .get("detail")
            .and_then(|d| d.get("repository-name"))
            .and_then(Value::as_str)
            .ok_or_else(|| GateError::InvalidEvent("missing detail.repository-name".to_string()))?
            .to_string();

        let repository = RepositoryName::from_identifier(&repository_id).ok_or_else(|| {
            GateError::InvalidEvent(format!("empty repository name in '{repository_id}'"))
        })?;

        Ok(Self {
            repository,
            repository_id,
            raw,
        })
    }

    pub fn from_json(body: &str) -> Result<Self, GateError> {
        let raw: Value = serde_json::from_str(body)
            .map_err(|e| GateError::InvalidEvent(format!("not valid JSON: {e}")))?;
        Self::parse(raw)
    }

    /// Bare repository name (final path segment)
    pub fn repository(&self) -> &RepositoryName {
        &self.repository
    }

    /// Identifier exactly as it appeared in the event
    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_takes_last_segment() {
        let event = ScanEvent::parse(json!({
            "detail": {"repository-name": "org/team/web", "scan-status": "COMPLETE"}
        }))
        .unwrap();
        assert_eq!(event.repository().as_str(), "web");
        assert_eq!(event.repository_id(), "org/team/web");
        assert_eq!(event.raw()["detail"]["scan-status"], "COMPLETE");
    }

    #[test]
    fn test_missing_or_empty_repository_is_invalid() {
        assert!(matches!(
            ScanEvent::parse(json!({"detail": {}})),
            Err(GateError::InvalidEvent(_))
        ));
        assert!(matches!(
            ScanEvent::parse(json!({"detail": {"repository-name": "team/"}})),
            Err(GateError::InvalidEvent(_))
        ));
        assert!(matches!(ScanEvent::from_json("{not json"), Err(GateError::InvalidEvent(_))));
    }
}
