//! Wire record ↔ entity conversion.
//!
//! Inbound: every record member with a writable descriptor of the same name
//! is coerced to the descriptor's type and written. Outbound: every
//! descriptor carrying the inclusion marker is read and rendered.

pub mod temporal;

use crate::core::{DataType, Result, TtmError, Value, WireRecord};
use crate::entity::{AnyEntity, EntityType, FieldInfo};
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Mapping strategy selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapperKind {
    /// Record members without a writable field are skipped.
    #[default]
    Lenient,
    /// Record members without a writable field are rejected.
    Strict,
}

/// Result of a handler or gateway call, before rendering.
#[derive(Debug, Clone)]
pub enum Payload {
    Empty,
    Json(JsonValue),
    Entity(AnyEntity),
    Entities(Vec<AnyEntity>),
    Rows(Vec<Vec<Value>>),
}

impl From<JsonValue> for Payload {
    fn from(value: JsonValue) -> Self {
        if value.is_null() {
            Self::Empty
        } else {
            Self::Json(value)
        }
    }
}

impl From<AnyEntity> for Payload {
    fn from(entity: AnyEntity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Vec<AnyEntity>> for Payload {
    fn from(entities: Vec<AnyEntity>) -> Self {
        Self::Entities(entities)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordMapper {
    kind: MapperKind,
}

impl RecordMapper {
    pub fn new(kind: MapperKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> MapperKind {
        self.kind
    }

    /// Applies an inbound record onto an existing entity.
    pub fn to_entity(&self, record: &WireRecord, target: &mut AnyEntity) -> Result<()> {
        let entity_type = target.entity_type().clone();
        for (name, json) in record {
            let Some(field) = entity_type.field(name).filter(|field| field.writable) else {
                if self.kind == MapperKind::Strict {
                    return Err(TtmError::argument(format!(
                        "Field '{name}' cannot be written on '{}'",
                        entity_type.name()
                    )));
                }
                tracing::trace!(field = %name, entity = entity_type.name(), "skipping unmapped field");
                continue;
            };
            let value = json_to_value(json, field)?;
            target
                .set(name, value)
                .map_err(|err| TtmError::argument(format!("Field '{name}': {err}")))?;
        }
        Ok(())
    }

    /// Builds a fresh entity of `entity_type` from an inbound record.
    pub fn new_entity(&self, record: &WireRecord, entity_type: &EntityType) -> Result<AnyEntity> {
        let mut entity = entity_type.instantiate();
        self.to_entity(record, &mut entity)?;
        Ok(entity)
    }

    /// Projects the included fields of an entity into a record.
    pub fn to_record(&self, entity: &AnyEntity) -> WireRecord {
        let mut record = WireRecord::new();
        for field in entity.entity_type().fields().filter(|field| field.included) {
            if let Some(value) = entity.get(field.name) {
                record.insert(field.name.to_string(), value.to_json());
            }
        }
        record
    }

    pub fn to_records(&self, entities: &[AnyEntity]) -> Vec<WireRecord> {
        entities.iter().map(|entity| self.to_record(entity)).collect()
    }

    /// Renders a payload for the response body; `None` means no content.
    pub fn render(&self, payload: &Payload) -> Option<JsonValue> {
        match payload {
            Payload::Empty => None,
            Payload::Json(value) => Some(value.clone()),
            Payload::Entity(entity) => Some(JsonValue::Object(self.to_record(entity))),
            Payload::Entities(entities) => Some(JsonValue::Array(
                self.to_records(entities)
                    .into_iter()
                    .map(JsonValue::Object)
                    .collect(),
            )),
            Payload::Rows(rows) => Some(JsonValue::Array(
                rows.iter()
                    .map(|row| JsonValue::Array(row.iter().map(Value::to_json).collect()))
                    .collect(),
            )),
        }
    }
}

/// Coerces a wire value into the declared type of `field`.
pub fn json_to_value(json: &JsonValue, field: &FieldInfo) -> Result<Value> {
    let mismatch = || {
        TtmError::argument(format!(
            "Field '{}' expects {}, got {json}",
            field.name, field.data_type
        ))
    };

    if json.is_null() {
        return Ok(Value::Null);
    }

    match field.data_type {
        DataType::Integer => match json {
            JsonValue::Number(n) => n.as_i64().map(Value::Integer).ok_or_else(mismatch),
            JsonValue::String(s) => s.trim().parse().map(Value::Integer).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        DataType::Float => match json {
            JsonValue::Number(n) => n.as_f64().map(Value::Float).ok_or_else(mismatch),
            JsonValue::String(s) => s.trim().parse().map(Value::Float).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        DataType::Text => match json {
            JsonValue::String(s) => Ok(Value::Text(s.clone())),
            JsonValue::Number(n) => Ok(Value::Text(n.to_string())),
            JsonValue::Bool(b) => Ok(Value::Text(b.to_string())),
            _ => Err(mismatch()),
        },
        DataType::Boolean => match json {
            JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Boolean(false)),
                Some(1) => Ok(Value::Boolean(true)),
                _ => Err(mismatch()),
            },
            JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        DataType::Timestamp | DataType::Date => match json {
            JsonValue::String(s) => temporal::parse_temporal(s, &field.data_type)
                .map_err(|err| TtmError::argument(format!("Field '{}': {err}", field.name))),
            _ => Err(mismatch()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityId, FieldDescriptor, FieldValue, assign_scalar_identity};
    use chrono::NaiveDate;
    use serde_json::json;

    #[derive(Debug, Clone, Default)]
    struct Account {
        id: i64,
        name: String,
        secret: String,
        active: bool,
        opened: Option<NaiveDate>,
    }

    impl Entity for Account {
        fn type_name() -> &'static str {
            "bank.Account"
        }

        fn descriptors() -> Vec<FieldDescriptor<Self>> {
            vec![
                FieldDescriptor::of::<i64>(
                    "id",
                    |e: &Self| e.id.to_value(),
                    |e, v| {
                        e.id = i64::from_value(v)?;
                        Ok(())
                    },
                )
                .identity(),
                FieldDescriptor::of::<String>(
                    "name",
                    |e: &Self| e.name.to_value(),
                    |e, v| {
                        e.name = String::from_value(v)?;
                        Ok(())
                    },
                )
                .include(),
                FieldDescriptor::of::<String>(
                    "secret",
                    |e: &Self| e.secret.to_value(),
                    |e, v| {
                        e.secret = String::from_value(v)?;
                        Ok(())
                    },
                ),
                FieldDescriptor::of::<bool>(
                    "active",
                    |e: &Self| e.active.to_value(),
                    |e, v| {
                        e.active = bool::from_value(v)?;
                        Ok(())
                    },
                )
                .include(),
                FieldDescriptor::of::<Option<NaiveDate>>(
                    "opened",
                    |e: &Self| e.opened.to_value(),
                    |e, v| {
                        e.opened = Option::<NaiveDate>::from_value(v)?;
                        Ok(())
                    },
                )
                .include(),
            ]
        }

        fn identity(&self) -> EntityId {
            EntityId::Scalar(self.id)
        }

        fn assign_identity(&mut self, id: EntityId) -> Result<()> {
            assign_scalar_identity(&mut self.id, id)
        }
    }

    fn record(value: JsonValue) -> WireRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn inbound_coerces_dates_and_skips_unknown_fields() {
        let mapper = RecordMapper::default();
        let ty = EntityType::of::<Account>();
        let entity = mapper
            .new_entity(
                &record(json!({"name": "ana", "opened": "2024-02-29", "colour": "red"})),
                &ty,
            )
            .unwrap();

        let typed: Account = entity.into_inner().unwrap();
        assert_eq!(typed.name, "ana");
        assert_eq!(typed.opened, NaiveDate::from_ymd_opt(2024, 2, 29));
    }

    #[test]
    fn strict_mapper_rejects_unknown_fields() {
        let mapper = RecordMapper::new(MapperKind::Strict);
        let ty = EntityType::of::<Account>();
        let err = mapper
            .new_entity(&record(json!({"colour": "red"})), &ty)
            .unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn outbound_projects_only_included_fields() {
        let mapper = RecordMapper::default();
        let entity = AnyEntity::new(Account {
            id: 7,
            name: "bob".into(),
            secret: "hunter2".into(),
            active: true,
            opened: NaiveDate::from_ymd_opt(2020, 1, 31),
        });

        let out = mapper.to_record(&entity);
        assert_eq!(
            JsonValue::Object(out),
            json!({"name": "bob", "active": true, "opened": "2020-01-31"})
        );
    }

    #[test]
    fn record_entity_record_round_trip_never_leaks_secret() {
        let mapper = RecordMapper::default();
        let ty = EntityType::of::<Account>();
        let original = ty
            .wrap(Account {
                id: 3,
                name: "x".into(),
                secret: "s3cr3t".into(),
                ..Account::default()
            })
            .unwrap();

        let first = mapper.to_record(&original);
        let rebuilt = mapper.new_entity(&first, &ty).unwrap();
        let second = mapper.to_record(&rebuilt);

        assert_eq!(first, second);
        assert!(!first.contains_key("secret"));
        assert!(!first.contains_key("id"));
    }

    #[test]
    fn type_mismatch_names_the_field() {
        let mapper = RecordMapper::default();
        let ty = EntityType::of::<Account>();
        let err = mapper
            .new_entity(&record(json!({"active": "maybe"})), &ty)
            .unwrap_err();
        assert!(matches!(err, TtmError::Argument(_)));
        assert!(err.to_string().contains("active"));
    }

    #[test]
    fn render_maps_collections_element_wise() {
        let mapper = RecordMapper::default();
        let payload = Payload::Entities(vec![
            AnyEntity::new(Account {
                name: "a".into(),
                ..Account::default()
            }),
            AnyEntity::new(Account {
                name: "b".into(),
                ..Account::default()
            }),
        ]);
        let rendered = mapper.render(&payload).unwrap();
        assert_eq!(rendered[0]["name"], json!("a"));
        assert_eq!(rendered[1]["name"], json!("b"));
        assert_eq!(mapper.render(&Payload::Empty), None);
    }
}
