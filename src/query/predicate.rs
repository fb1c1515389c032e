use super::pattern::matches_like;
use crate::core::{Result, TtmError, Value};
use crate::entity::{AnyEntity, EntityType};
use std::cmp::Ordering;
use std::fmt;

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    /// Positional parameter, 1-based (`$1`).
    Param(usize),
}

impl Operand {
    fn resolve<'a>(&'a self, params: &'a [Value]) -> Result<&'a Value> {
        match self {
            Self::Literal(value) => Ok(value),
            Self::Param(index) => index
                .checked_sub(1)
                .and_then(|slot| params.get(slot))
                .ok_or_else(|| {
                    TtmError::argument(format!(
                        "Parameter ${index} is not bound ({} given)",
                        params.len()
                    ))
                }),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Value::Text(text)) => write!(f, "'{}'", text.replace('\'', "''")),
            Self::Literal(value) => write!(f, "{value}"),
            Self::Param(index) => write!(f, "${index}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Operator seen from the other side: `1 < f` is `f > 1`.
    pub fn flipped(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
            other => other,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::NotEq => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::LtEq => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::GtEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        })
    }
}

/// Filter over the fields of one entity type.
///
/// Field names are bare (the alias is stripped while parsing). A comparison
/// involving NULL never holds; use [`Predicate::IsNull`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        op: CompareOp,
        operand: Operand,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    Like {
        field: String,
        pattern: Operand,
        negated: bool,
        case_insensitive: bool,
    },
    InList {
        field: String,
        list: Vec<Operand>,
        negated: bool,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn evaluate(&self, entity: &AnyEntity, params: &[Value]) -> Result<bool> {
        match self {
            Self::Compare { field, op, operand } => {
                let left = read(entity, field)?;
                let right = operand.resolve(params)?;
                if left.is_null() || right.is_null() {
                    return Ok(false);
                }
                Ok(op.holds(left.compare(right)?))
            }
            Self::IsNull { field, negated } => Ok(read(entity, field)?.is_null() != *negated),
            Self::Like {
                field,
                pattern,
                negated,
                case_insensitive,
            } => {
                let value = read(entity, field)?;
                let pattern = pattern.resolve(params)?;
                let (Value::Text(text), Value::Text(pattern)) = (&value, pattern) else {
                    return Ok(false);
                };
                Ok(matches_like(text, pattern, !case_insensitive)? != *negated)
            }
            Self::InList {
                field,
                list,
                negated,
            } => {
                let value = read(entity, field)?;
                if value.is_null() {
                    return Ok(false);
                }
                let mut found = false;
                for operand in list {
                    let candidate = operand.resolve(params)?;
                    if !candidate.is_null() && value.compare(candidate)? == Ordering::Equal {
                        found = true;
                        break;
                    }
                }
                Ok(found != *negated)
            }
            Self::And(left, right) => {
                Ok(left.evaluate(entity, params)? && right.evaluate(entity, params)?)
            }
            Self::Or(left, right) => {
                Ok(left.evaluate(entity, params)? || right.evaluate(entity, params)?)
            }
            Self::Not(inner) => Ok(!inner.evaluate(entity, params)?),
        }
    }

    /// Every field the predicate reads.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { field, .. }
            | Self::IsNull { field, .. }
            | Self::Like { field, .. }
            | Self::InList { field, .. } => out.push(field),
            Self::And(left, right) | Self::Or(left, right) => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Self::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Rejects references to fields the type does not declare.
    pub fn check_fields(&self, entity_type: &EntityType) -> Result<()> {
        match self
            .fields()
            .into_iter()
            .find(|field| entity_type.field(field).is_none())
        {
            Some(unknown) => Err(TtmError::argument(format!(
                "Field '{unknown}' does not exist on '{}'",
                entity_type.name()
            ))),
            None => Ok(()),
        }
    }
}

fn read(entity: &AnyEntity, field: &str) -> Result<Value> {
    entity.get(field).ok_or_else(|| {
        TtmError::argument(format!(
            "Field '{field}' does not exist on '{}'",
            entity.type_name()
        ))
    })
}

impl Predicate {
    /// Renders the predicate with every field prefixed by `alias.`.
    pub fn qualified<'a>(&'a self, alias: &'a str) -> impl fmt::Display + 'a {
        Qualified {
            predicate: self,
            alias,
        }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, alias: Option<&str>) -> fmt::Result {
        let field = |name: &str| match alias {
            Some(alias) => format!("{alias}.{name}"),
            None => name.to_string(),
        };
        let not = |negated: bool| if negated { "NOT " } else { "" };

        match self {
            Self::Compare { field: name, op, operand } => {
                write!(f, "{} {op} {operand}", field(name))
            }
            Self::IsNull { field: name, negated } => {
                write!(f, "{} IS {}NULL", field(name), not(*negated))
            }
            Self::Like {
                field: name,
                pattern,
                negated,
                case_insensitive,
            } => write!(
                f,
                "{} {}{} {pattern}",
                field(name),
                not(*negated),
                if *case_insensitive { "ILIKE" } else { "LIKE" }
            ),
            Self::InList {
                field: name,
                list,
                negated,
            } => {
                write!(f, "{} {}IN (", field(name), not(*negated))?;
                for (i, operand) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{operand}")?;
                }
                f.write_str(")")
            }
            Self::And(left, right) | Self::Or(left, right) => {
                f.write_str("(")?;
                left.write(f, alias)?;
                f.write_str(if matches!(self, Self::And(..)) { " AND " } else { " OR " })?;
                right.write(f, alias)?;
                f.write_str(")")
            }
            Self::Not(inner) => {
                f.write_str("NOT (")?;
                inner.write(f, alias)?;
                f.write_str(")")
            }
        }
    }
}

struct Qualified<'a> {
    predicate: &'a Predicate,
    alias: &'a str,
}

impl fmt::Display for Qualified<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.predicate.write(f, Some(self.alias))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityId, FieldDescriptor, FieldValue, assign_scalar_identity};

    #[derive(Debug, Clone, Default)]
    struct Crate {
        id: i64,
        label: Option<String>,
        weight: f64,
    }

    impl Entity for Crate {
        fn type_name() -> &'static str {
            "depot.Crate"
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
                FieldDescriptor::of::<Option<String>>(
                    "label",
                    |e| e.label.to_value(),
                    |e, v| {
                        e.label = Option::<String>::from_value(v)?;
                        Ok(())
                    },
                ),
                FieldDescriptor::of::<f64>(
                    "weight",
                    |e| e.weight.to_value(),
                    |e, v| {
                        e.weight = f64::from_value(v)?;
                        Ok(())
                    },
                ),
            ]
        }

        fn identity(&self) -> EntityId {
            EntityId::Scalar(self.id)
        }

        fn assign_identity(&mut self, id: EntityId) -> Result<()> {
            assign_scalar_identity(&mut self.id, id)
        }
    }

    fn boxed(label: Option<&str>, weight: f64) -> AnyEntity {
        AnyEntity::new(Crate {
            id: 1,
            label: label.map(str::to_string),
            weight,
        })
    }

    #[test]
    fn null_never_compares_equal() {
        let entity = boxed(None, 1.0);
        let eq_null = Predicate::Compare {
            field: "label".into(),
            op: CompareOp::Eq,
            operand: Operand::Literal(Value::Null),
        };
        assert!(!eq_null.evaluate(&entity, &[]).unwrap());

        let is_null = Predicate::IsNull {
            field: "label".into(),
            negated: false,
        };
        assert!(is_null.evaluate(&entity, &[]).unwrap());
    }

    #[test]
    fn params_bind_positionally() {
        let entity = boxed(Some("fragile"), 12.5);
        let heavy = Predicate::Compare {
            field: "weight".into(),
            op: CompareOp::GtEq,
            operand: Operand::Param(1),
        };
        assert!(heavy.evaluate(&entity, &[Value::Integer(10)]).unwrap());
        assert!(!heavy.evaluate(&entity, &[Value::Float(20.0)]).unwrap());
        assert!(heavy.evaluate(&entity, &[]).is_err());
    }

    #[test]
    fn like_and_in_list() {
        let entity = boxed(Some("Fragile"), 3.0);
        let like = Predicate::Like {
            field: "label".into(),
            pattern: Operand::Literal(Value::from("frag%")),
            negated: false,
            case_insensitive: true,
        };
        assert!(like.evaluate(&entity, &[]).unwrap());

        let within = Predicate::InList {
            field: "weight".into(),
            list: vec![Operand::Literal(Value::Integer(3)), Operand::Param(1)],
            negated: true,
        };
        assert!(!within.evaluate(&entity, &[Value::Integer(4)]).unwrap());
    }

    #[test]
    fn unknown_fields_fail_the_type_check() {
        let ty = EntityType::of::<Crate>();
        let predicate = Predicate::And(
            Box::new(Predicate::IsNull {
                field: "label".into(),
                negated: true,
            }),
            Box::new(Predicate::IsNull {
                field: "colour".into(),
                negated: false,
            }),
        );
        let err = predicate.check_fields(&ty).unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn qualified_rendering_prefixes_fields() {
        let predicate = Predicate::Not(Box::new(Predicate::Compare {
            field: "weight".into(),
            op: CompareOp::Lt,
            operand: Operand::Param(2),
        }));
        assert_eq!(predicate.qualified("c").to_string(), "NOT (c.weight < $2)");
        assert_eq!(predicate.to_string(), "NOT (weight < $2)");
    }
}
