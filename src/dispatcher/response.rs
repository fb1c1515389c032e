use crate::core::TtmError;
use http::StatusCode;
use serde_json::{Value as JsonValue, json};

const REDACTED: &str = "Internal server error";

/// Response envelope: status plus optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub body: Option<JsonValue>,
}

impl Response {
    pub fn new(status: StatusCode, body: Option<JsonValue>) -> Self {
        Self { status, body }
    }

    pub fn ok(body: JsonValue) -> Self {
        Self::new(StatusCode::OK, Some(body))
    }

    pub fn created(body: Option<JsonValue>) -> Self {
        Self::new(StatusCode::CREATED, body)
    }

    pub fn accepted() -> Self {
        Self::new(StatusCode::ACCEPTED, None)
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, None)
    }

    /// 200 with the rendered body, or 204 when there is nothing to render.
    pub fn found(body: Option<JsonValue>) -> Self {
        match body {
            Some(body) => Self::ok(body),
            None => Self::no_content(),
        }
    }

    /// `{"error": ..., "code": ...}` with the fault's status.
    ///
    /// Configuration and unclassified messages are replaced unless `expose`
    /// is set.
    pub fn fault(err: &TtmError, expose: bool) -> Self {
        let message = if err.is_internal() && !expose {
            REDACTED.to_string()
        } else {
            err.to_string()
        };
        Self::new(
            err.status(),
            Some(json!({ "error": message, "code": err.code() })),
        )
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Serialised body; empty when there is none.
    pub fn body_bytes(&self) -> Vec<u8> {
        match &self.body {
            Some(body) => body.to_string().into_bytes(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_faults_are_redacted_unless_exposed() {
        let err = TtmError::configuration("datastore 'main' points at 10.0.0.7");
        let hidden = Response::fault(&err, false);
        assert_eq!(hidden.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            hidden.body,
            Some(json!({"error": "Internal server error", "code": "configuration"}))
        );

        let shown = Response::fault(&err, true);
        assert!(shown.body.unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("10.0.0.7"));
    }

    #[test]
    fn client_faults_keep_their_message() {
        let err = TtmError::not_found("demo.widget", 9, "deleting");
        let response = Response::fault(&err, false);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            response.body.unwrap()["error"],
            json!("Object demo.widget:(9) not found for deleting")
        );
    }

    #[test]
    fn empty_lookups_are_no_content() {
        let response = Response::found(None);
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body_bytes().is_empty());
    }
}
