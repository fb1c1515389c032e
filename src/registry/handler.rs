use crate::core::{Result, TtmError, WireRecord};
use crate::mapper::Payload;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Inputs handed to a command or service method.
///
/// Positional arguments come from the path remainder; the body is the parsed
/// POST payload, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    positional: Vec<String>,
    body: Option<JsonValue>,
}

impl Arguments {
    pub fn new(positional: Vec<String>, body: Option<JsonValue>) -> Self {
        Self { positional, body }
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    /// Positional argument `index`, or an argument fault naming it.
    pub fn require(&self, index: usize, name: &str) -> Result<&str> {
        self.get(index)
            .ok_or_else(|| TtmError::argument(format!("The argument '{name}' is required")))
    }

    pub fn body(&self) -> Option<&JsonValue> {
        self.body.as_ref()
    }

    /// Body as a wire record.
    pub fn record(&self) -> Result<&WireRecord> {
        match &self.body {
            Some(JsonValue::Object(record)) => Ok(record),
            Some(_) => Err(TtmError::argument("The body must be a JSON object")),
            None => Err(TtmError::argument("The body can't be null")),
        }
    }

    /// Deserialises the body into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self
            .body
            .clone()
            .ok_or_else(|| TtmError::argument("The body can't be null"))?;
        Ok(serde_json::from_value(body)?)
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.body.is_none()
    }
}

/// Single-operation handler addressed by alias (`/command/<alias>/...`).
#[async_trait]
pub trait Command: Send + Sync {
    async fn execute(&self, args: Arguments) -> Result<Payload>;
}

/// Multi-method handler addressed by interface alias
/// (`/service/<alias>/<method>/...`).
#[async_trait]
pub trait Service: Send + Sync {
    /// Interface names this service implements.
    fn interfaces(&self) -> &[&'static str];

    /// Method names reachable through [`Service::invoke`].
    fn methods(&self) -> &[&'static str];

    fn implements(&self, interface: &str) -> bool {
        self.interfaces().contains(&interface)
    }

    fn has_method(&self, method: &str) -> bool {
        self.methods().contains(&method)
    }

    async fn invoke(&self, method: &str, args: Arguments) -> Result<Payload>;
}

/// Fault for a method name a service does not expose.
pub fn unknown_method() -> TtmError {
    TtmError::handler_not_found("Method of service/command not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Transfer {
        from: i64,
        to: i64,
    }

    #[test]
    fn body_parses_into_typed_input() {
        let args = Arguments::new(vec!["x".into()], Some(json!({"from": 1, "to": 2})));
        assert_eq!(args.parse::<Transfer>().unwrap(), Transfer { from: 1, to: 2 });
        assert_eq!(args.require(0, "account").unwrap(), "x");
        assert!(args.require(1, "amount").is_err());
    }

    #[test]
    fn record_requires_an_object_body() {
        assert!(Arguments::default().record().is_err());
        let args = Arguments::new(Vec::new(), Some(json!([1, 2])));
        assert!(matches!(args.record(), Err(TtmError::Argument(_))));
    }
}
