use super::{Entity, EntityId, FieldDescriptor};
use crate::core::{DataType, Result, TtmError, Value};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

type BoxedValue = Box<dyn Any + Send + Sync>;
type ErasedGetter = Arc<dyn Fn(&dyn Any) -> Option<Value> + Send + Sync>;
type ErasedSetter = Arc<dyn Fn(&mut dyn Any, Value) -> Result<()> + Send + Sync>;

/// Public, type-independent view of one field descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: &'static str,
    pub data_type: DataType,
    pub nullable: bool,
    pub included: bool,
    pub identity: bool,
    pub writable: bool,
}

struct ErasedField {
    info: FieldInfo,
    get: ErasedGetter,
    set: Option<ErasedSetter>,
}

impl ErasedField {
    fn new<E: Entity>(descriptor: FieldDescriptor<E>) -> Self {
        let getter = descriptor.get;
        let get: ErasedGetter = Arc::new(move |value: &dyn Any| value.downcast_ref::<E>().map(getter));
        let set = descriptor.set.map(|setter| {
            let set: ErasedSetter = Arc::new(move |value: &mut dyn Any, field: Value| {
                let entity = value
                    .downcast_mut::<E>()
                    .ok_or_else(|| foreign_value(E::type_name()))?;
                setter(entity, field)
            });
            set
        });

        Self {
            info: FieldInfo {
                name: descriptor.name,
                data_type: descriptor.data_type,
                nullable: descriptor.nullable,
                included: descriptor.included,
                identity: descriptor.identity,
                writable: set.is_some(),
            },
            get,
            set,
        }
    }
}

struct EntityVtable {
    type_id: TypeId,
    construct: fn() -> BoxedValue,
    clone: fn(&dyn Any) -> BoxedValue,
    identity: fn(&dyn Any) -> Option<EntityId>,
    assign_identity: fn(&mut dyn Any, EntityId) -> Result<()>,
    natural_key: fn(&dyn Any) -> Option<EntityId>,
    debug: fn(&dyn Any, &mut fmt::Formatter<'_>) -> fmt::Result,
}

fn construct_of<E: Entity>() -> BoxedValue {
    Box::new(E::default())
}

fn clone_of<E: Entity>(value: &dyn Any) -> BoxedValue {
    // value and type are paired when the handle is built, so the fallback never runs
    match value.downcast_ref::<E>() {
        Some(entity) => Box::new(entity.clone()),
        None => Box::new(E::default()),
    }
}

fn identity_of<E: Entity>(value: &dyn Any) -> Option<EntityId> {
    value.downcast_ref::<E>().map(|entity| entity.identity())
}

fn assign_identity_of<E: Entity>(value: &mut dyn Any, id: EntityId) -> Result<()> {
    value
        .downcast_mut::<E>()
        .ok_or_else(|| foreign_value(E::type_name()))?
        .assign_identity(id)
}

fn natural_key_of<E: Entity>(value: &dyn Any) -> Option<EntityId> {
    value
        .downcast_ref::<E>()
        .and_then(|entity| entity.natural_key())
}

fn debug_of<E: Entity>(value: &dyn Any, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.downcast_ref::<E>() {
        Some(entity) => fmt::Debug::fmt(entity, f),
        None => f.write_str("<foreign entity>"),
    }
}

fn foreign_value(type_name: &str) -> TtmError {
    TtmError::unclassified(format!("Entity value does not belong to '{type_name}'"))
}

struct EntityTypeInner {
    name: &'static str,
    fields: Vec<ErasedField>,
    vtable: EntityVtable,
}

/// Runtime handle on a registered entity type.
///
/// Built once per type with [`EntityType::of`]; cloning is cheap.
#[derive(Clone)]
pub struct EntityType {
    inner: Arc<EntityTypeInner>,
}

impl EntityType {
    pub fn of<E: Entity>() -> Self {
        let fields = E::descriptors().into_iter().map(ErasedField::new).collect();
        Self {
            inner: Arc::new(EntityTypeInner {
                name: E::type_name(),
                fields,
                vtable: EntityVtable {
                    type_id: TypeId::of::<E>(),
                    construct: construct_of::<E>,
                    clone: clone_of::<E>,
                    identity: identity_of::<E>,
                    assign_identity: assign_identity_of::<E>,
                    natural_key: natural_key_of::<E>,
                    debug: debug_of::<E>,
                },
            }),
        }
    }

    /// Qualified type name.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Everything before the last `.` of the qualified name.
    pub fn namespace(&self) -> &'static str {
        namespace_of(self.inner.name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.inner.fields.iter().map(|field| &field.info)
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.erased(name).map(|field| &field.info)
    }

    /// Whether the type exposes an identity, which every persistent type must.
    pub fn has_identity(&self) -> bool {
        self.inner.fields.iter().any(|field| field.info.identity)
    }

    pub fn is<E: Entity>(&self) -> bool {
        self.inner.vtable.type_id == TypeId::of::<E>()
    }

    /// New blank entity carrying the sentinel identity.
    pub fn instantiate(&self) -> AnyEntity {
        AnyEntity {
            entity_type: self.clone(),
            value: (self.inner.vtable.construct)(),
        }
    }

    /// Wraps a typed entity, checking it belongs to this type.
    pub fn wrap<E: Entity>(&self, entity: E) -> Result<AnyEntity> {
        if !self.is::<E>() {
            return Err(foreign_value(self.name()));
        }
        Ok(AnyEntity {
            entity_type: self.clone(),
            value: Box::new(entity),
        })
    }

    fn erased(&self, name: &str) -> Option<&ErasedField> {
        self.inner.fields.iter().find(|field| field.info.name == name)
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.inner.vtable.type_id == other.inner.vtable.type_id
    }
}

impl Eq for EntityType {}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.inner.name)
            .field(
                "fields",
                &self.fields().map(|field| field.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

pub(crate) fn namespace_of(qualified: &str) -> &str {
    qualified
        .rfind('.')
        .map_or("", |separator| &qualified[..separator])
}

/// Type-erased entity instance paired with its [`EntityType`].
pub struct AnyEntity {
    entity_type: EntityType,
    value: BoxedValue,
}

impl AnyEntity {
    pub fn new<E: Entity>(entity: E) -> Self {
        Self {
            entity_type: EntityType::of::<E>(),
            value: Box::new(entity),
        }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn type_name(&self) -> &'static str {
        self.entity_type.name()
    }

    pub fn identity(&self) -> EntityId {
        (self.entity_type.inner.vtable.identity)(&*self.value).unwrap_or(EntityId::SENTINEL)
    }

    pub fn assign_identity(&mut self, id: EntityId) -> Result<()> {
        (self.entity_type.inner.vtable.assign_identity)(&mut *self.value, id)
    }

    pub fn natural_key(&self) -> Option<EntityId> {
        (self.entity_type.inner.vtable.natural_key)(&*self.value)
    }

    /// Reads a field; `None` when the type has no such field.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.entity_type
            .erased(field)
            .and_then(|erased| (erased.get)(&*self.value))
    }

    /// Writes a field through its descriptor.
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        let erased = self.entity_type.erased(field).ok_or_else(|| {
            TtmError::argument(format!(
                "Field '{field}' does not exist on '{}'",
                self.entity_type.name()
            ))
        })?;
        let setter = erased.set.as_ref().ok_or_else(|| {
            TtmError::argument(format!(
                "Field '{field}' of '{}' is read-only",
                self.entity_type.name()
            ))
        })?;
        setter(&mut *self.value, value)
    }

    /// Every field value, in descriptor order.
    pub fn values(&self) -> Vec<(&'static str, Value)> {
        self.entity_type
            .inner
            .fields
            .iter()
            .filter_map(|field| (field.get)(&*self.value).map(|value| (field.info.name, value)))
            .collect()
    }

    pub fn downcast_ref<E: Entity>(&self) -> Option<&E> {
        self.value.downcast_ref::<E>()
    }

    pub fn into_inner<E: Entity>(self) -> Result<E> {
        let type_name = self.entity_type.name();
        self.value
            .downcast::<E>()
            .map(|boxed| *boxed)
            .map_err(|_| foreign_value(type_name))
    }
}

impl Clone for AnyEntity {
    fn clone(&self) -> Self {
        Self {
            entity_type: self.entity_type.clone(),
            value: (self.entity_type.inner.vtable.clone)(&*self.value),
        }
    }
}

impl fmt::Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.entity_type.inner.vtable.debug)(&*self.value, f)
    }
}
