//! Persistent entity contracts.
//!
//! An entity describes its fields once, as a table of [`FieldDescriptor`]s
//! (usually generated by `#[derive(Entity)]`). The table replaces any
//! name-driven lookup of accessors: the mapper and the stores only ever walk
//! descriptors.

pub mod handle;
pub mod identity;

pub use handle::{AnyEntity, EntityType, FieldInfo};
pub use identity::EntityId;

use crate::core::{DataType, Result, TtmError, Value};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// Core trait for entities that can be persisted.
pub trait Entity: Default + Clone + fmt::Debug + Send + Sync + 'static {
    /// Qualified type name, `.`-separated (`inventory.model.Widget`).
    ///
    /// Everything before the last separator is the namespace used to route
    /// the type to a datastore.
    fn type_name() -> &'static str;

    /// Field descriptor table, called once per registration.
    fn descriptors() -> Vec<FieldDescriptor<Self>>;

    /// Current identity; [`EntityId::SENTINEL`] before creation.
    fn identity(&self) -> EntityId;

    /// Overwrites the identity. Only the persistence layer calls this.
    fn assign_identity(&mut self, id: EntityId) -> Result<()>;

    /// Identity derived from the entity's own fields, if it has one.
    ///
    /// Stores use it instead of allocating a scalar id on create.
    fn natural_key(&self) -> Option<EntityId> {
        None
    }
}

/// Reads a field as a store [`Value`].
pub type FieldGetter<E> = fn(&E) -> Value;
/// Writes a store [`Value`] into a field.
pub type FieldSetter<E> = fn(&mut E, Value) -> Result<()>;

/// One row of an entity's field table.
pub struct FieldDescriptor<E> {
    pub name: &'static str,
    pub data_type: DataType,
    pub nullable: bool,
    /// Projected into outbound records.
    pub included: bool,
    /// Holds the entity's scalar identity.
    pub identity: bool,
    pub get: FieldGetter<E>,
    pub set: Option<FieldSetter<E>>,
}

impl<E> FieldDescriptor<E> {
    /// Describes a field holding a `T`; type and nullability come from `T`.
    pub fn of<T: FieldValue>(name: &'static str, get: FieldGetter<E>, set: FieldSetter<E>) -> Self {
        Self {
            name,
            data_type: T::DATA_TYPE,
            nullable: T::NULLABLE,
            included: false,
            identity: false,
            get,
            set: Some(set),
        }
    }

    /// Marks the field for outbound projection.
    pub fn include(mut self) -> Self {
        self.included = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Drops the setter; inbound records can no longer write the field.
    pub fn read_only(mut self) -> Self {
        self.set = None;
        self
    }
}

impl<E> fmt::Debug for FieldDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("nullable", &self.nullable)
            .field("included", &self.included)
            .field("identity", &self.identity)
            .field("writable", &self.set.is_some())
            .finish()
    }
}

/// Rust types that can back an entity field.
pub trait FieldValue: Sized + Send + Sync + 'static {
    const DATA_TYPE: DataType;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T: FieldValue>(value: &Value) -> TtmError {
    TtmError::argument(format!(
        "Expected {} value, got {}",
        T::DATA_TYPE,
        value.type_name()
    ))
}

impl FieldValue for i64 {
    const DATA_TYPE: DataType = DataType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl FieldValue for i32 {
    const DATA_TYPE: DataType = DataType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl FieldValue for u32 {
    const DATA_TYPE: DataType = DataType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        value
            .as_i64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl FieldValue for f64 {
    const DATA_TYPE: DataType = DataType::Float;

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl FieldValue for String {
    const DATA_TYPE: DataType = DataType::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FieldValue for bool {
    const DATA_TYPE: DataType = DataType::Boolean;

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl FieldValue for NaiveDateTime {
    const DATA_TYPE: DataType = DataType::Timestamp;

    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Date(d) => Ok(d.and_time(chrono::NaiveTime::MIN)),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FieldValue for NaiveDate {
    const DATA_TYPE: DataType = DataType::Date;

    fn to_value(&self) -> Value {
        Value::Date(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(d),
            Value::Timestamp(ts) => Ok(ts.date()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::to_value)
    }

    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

/// Identity handling for entities whose identity is a single `i64` field.
///
/// Used by `#[derive(Entity)]`; composite identities are rejected.
pub fn assign_scalar_identity(target: &mut i64, id: EntityId) -> Result<()> {
    match id {
        EntityId::Scalar(value) => {
            *target = value;
            Ok(())
        }
        EntityId::Composite(_) => Err(TtmError::argument(format!(
            "Composite id '{id}' cannot be assigned to a scalar identity"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_fields_accept_null() {
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_value(Value::Integer(3)).unwrap(),
            Some(3)
        );
        assert!(<Option<String> as FieldValue>::NULLABLE);
        assert_eq!(<Option<String> as FieldValue>::DATA_TYPE, DataType::Text);
    }

    #[test]
    fn mismatched_values_are_argument_faults() {
        let err = String::from_value(Value::Integer(1)).unwrap_err();
        assert!(matches!(err, TtmError::Argument(_)));
        assert!(i32::from_value(Value::Integer(i64::MAX)).is_err());
    }

    #[test]
    fn scalar_identity_rejects_composites() {
        let mut id = 0;
        assign_scalar_identity(&mut id, EntityId::Scalar(9)).unwrap();
        assert_eq!(id, 9);
        assert!(assign_scalar_identity(&mut id, EntityId::Composite(vec![])).is_err());
    }
}
