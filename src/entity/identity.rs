use crate::core::{Result, TtmError, Value};
use serde_json::Value as JsonValue;
use std::fmt;

/// Identity of a persisted entity.
///
/// Scalar identities are assigned by the store; composite identities come
/// from an entity's natural key. `Scalar(0)` is the sentinel carried by an
/// entity that has not been created yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Scalar(i64),
    Composite(Vec<Value>),
}

impl EntityId {
    pub const SENTINEL: EntityId = EntityId::Scalar(0);

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Scalar(0))
    }

    /// Parses a path parameter: `42` or `3,7`.
    ///
    /// Returns `None` when the parameter is not numeric, which is how the
    /// dispatcher tells an id apart from a filter expression.
    pub fn parse(param: &str) -> Option<Self> {
        let param = param.trim();
        if param.is_empty() {
            return None;
        }
        if let Ok(id) = param.parse::<i64>() {
            return Some(Self::Scalar(id));
        }
        if !param.contains(',') {
            return None;
        }
        param
            .split(',')
            .map(|part| part.trim().parse::<i64>().ok().map(Value::Integer))
            .collect::<Option<Vec<_>>>()
            .map(Self::Composite)
    }

    /// Reads the `id` member of an inbound record.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Number(n) => n
                .as_i64()
                .map(Self::Scalar)
                .ok_or_else(|| TtmError::argument(format!("The id '{n}' is not an integer"))),
            JsonValue::String(s) => Self::parse(s)
                .ok_or_else(|| TtmError::argument(format!("The id '{s}' is not numeric"))),
            JsonValue::Array(parts) => parts
                .iter()
                .map(|part| match part {
                    JsonValue::Number(n) => n
                        .as_i64()
                        .map(Value::Integer)
                        .or_else(|| n.as_f64().map(Value::Float)),
                    JsonValue::String(s) => Some(Value::Text(s.clone())),
                    JsonValue::Bool(b) => Some(Value::Boolean(*b)),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Self::Composite)
                .ok_or_else(|| TtmError::argument("The composite id holds unsupported parts")),
            JsonValue::Null => Err(TtmError::argument("The object id should be set")),
            other => Err(TtmError::argument(format!("The id '{other}' is not supported"))),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Scalar(id) => JsonValue::from(*id),
            Self::Composite(parts) => JsonValue::Array(parts.iter().map(Value::to_json).collect()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(id) => write!(f, "{id}"),
            Self::Composite(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{part}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self::Scalar(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_scalar_and_composite_params() {
        assert_eq!(EntityId::parse("42"), Some(EntityId::Scalar(42)));
        assert_eq!(
            EntityId::parse("3,7"),
            Some(EntityId::Composite(vec![Value::Integer(3), Value::Integer(7)]))
        );
        assert_eq!(EntityId::parse("w:w.active=true"), None);
        assert_eq!(EntityId::parse("abc"), None);
        assert_eq!(EntityId::parse("1,x"), None);
    }

    #[test]
    fn reads_ids_from_records() {
        assert_eq!(EntityId::from_json(&json!(5)).unwrap(), EntityId::Scalar(5));
        assert_eq!(EntityId::from_json(&json!("6")).unwrap(), EntityId::Scalar(6));
        assert!(EntityId::from_json(&json!(null)).is_err());
        assert!(EntityId::from_json(&json!(1.5)).is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let id = EntityId::Composite(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(id.to_string(), "1,2");
        assert_eq!(EntityId::parse(&id.to_string()), Some(id));
        assert!(EntityId::SENTINEL.is_sentinel());
    }
}
