//! sqlparser adapter for the restricted query grammar.
//!
//! Only the pieces below are accepted; everything else is an argument fault.
//!
//! ```text
//! entity query  := SELECT <alias> FROM <qualified.Type> <alias> [WHERE <predicate>]
//! raw select    := SELECT * | <field>, ... FROM <qualified.Type> [<alias>] [WHERE <predicate>]
//! predicate     := <field> <cmp> <operand> | <operand> <cmp> <field>
//!                | <field> IS [NOT] NULL | <field> IS [NOT] TRUE|FALSE
//!                | <field> [NOT] LIKE|ILIKE <operand> | <field> [NOT] IN (<operand>, ...)
//!                | <predicate> AND|OR <predicate> | NOT <predicate> | (<predicate>) | <field>
//! operand       := <literal> | -<number> | $<n>
//! ```

use super::predicate::{CompareOp, Operand, Predicate};
use crate::core::{Result, TtmError, Value};
use crate::entity::{AnyEntity, EntityType};
use regex::Regex;
use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;
use std::fmt;

lazy_static::lazy_static! {
    static ref ALIAS: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref QUALIFIED_TYPE: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap();
}

/// Checks a query alias: a plain identifier.
pub fn validate_alias(alias: &str) -> Result<()> {
    if ALIAS.is_match(alias) {
        Ok(())
    } else {
        Err(TtmError::argument(format!("'{alias}' is not a valid query alias")))
    }
}

fn validate_type_name(name: &str) -> Result<()> {
    if QUALIFIED_TYPE.is_match(name) {
        Ok(())
    } else {
        Err(TtmError::argument(format!("'{name}' is not a valid entity type name")))
    }
}

fn parse_error(context: &str, err: ParserError) -> TtmError {
    TtmError::argument(format!("Invalid {context}: {err}"))
}

/// "Select the aliased entity set where the predicate holds."
#[derive(Debug, Clone, PartialEq)]
pub struct EntityQuery {
    pub entity: String,
    pub alias: String,
    pub predicate: Option<Predicate>,
}

impl EntityQuery {
    pub fn new(entity: impl Into<String>, alias: impl Into<String>, predicate: Option<Predicate>) -> Self {
        Self {
            entity: entity.into(),
            alias: alias.into(),
            predicate,
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let select = parse_single_select(text)?;
        let (entity, alias) = single_source(&select.from)?;
        let alias = alias.ok_or_else(|| {
            TtmError::argument(format!("Entity query on '{entity}' must declare an alias"))
        })?;

        match select.projection.as_slice() {
            [sql_ast::SelectItem::UnnamedExpr(sql_ast::Expr::Identifier(ident))]
                if ident.value == alias => {}
            _ => {
                return Err(TtmError::argument(format!(
                    "Entity query must select its alias '{alias}'"
                )));
            }
        }

        let refs = FieldRefs::Qualified(&alias);
        let predicate = select
            .selection
            .map(|expr| convert(expr, &refs))
            .transpose()?;

        Ok(Self {
            entity,
            alias,
            predicate,
        })
    }

    /// Rejects predicates naming fields the type does not declare.
    pub fn check(&self, entity_type: &EntityType) -> Result<()> {
        match &self.predicate {
            Some(predicate) => predicate.check_fields(entity_type),
            None => Ok(()),
        }
    }

    pub fn matches(&self, entity: &AnyEntity, params: &[Value]) -> Result<bool> {
        match &self.predicate {
            Some(predicate) => predicate.evaluate(entity, params),
            None => Ok(true),
        }
    }
}

impl fmt::Display for EntityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {0} FROM {1} {0}", self.alias, self.entity)?;
        if let Some(predicate) = &self.predicate {
            write!(f, " WHERE {}", predicate.qualified(&self.alias))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Fields(Vec<String>),
}

/// Raw select returning rows of values instead of entities.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub entity: String,
    pub projection: Projection,
    pub predicate: Option<Predicate>,
}

impl SelectStatement {
    pub fn parse(text: &str) -> Result<Self> {
        let select = parse_single_select(text)?;
        let (entity, alias) = single_source(&select.from)?;
        let refs = FieldRefs::Bare(alias.as_deref());

        let projection = match select.projection.as_slice() {
            [sql_ast::SelectItem::Wildcard(_)] => Projection::All,
            items => Projection::Fields(
                items
                    .iter()
                    .map(|item| match item {
                        sql_ast::SelectItem::UnnamedExpr(expr) => refs.field(expr).ok_or_else(|| {
                            TtmError::argument(format!("Unsupported select item: {expr}"))
                        }),
                        other => Err(TtmError::argument(format!("Unsupported select item: {other}"))),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        let predicate = select
            .selection
            .map(|expr| convert(expr, &refs))
            .transpose()?;

        Ok(Self {
            entity,
            projection,
            predicate,
        })
    }

    /// Rejects projections and predicates naming unknown fields.
    pub fn check(&self, entity_type: &EntityType) -> Result<()> {
        if let Projection::Fields(fields) = &self.projection {
            if let Some(unknown) = fields.iter().find(|field| entity_type.field(field).is_none()) {
                return Err(TtmError::argument(format!(
                    "Field '{unknown}' does not exist on '{}'",
                    entity_type.name()
                )));
            }
        }
        match &self.predicate {
            Some(predicate) => predicate.check_fields(entity_type),
            None => Ok(()),
        }
    }

    /// Projects one row out of an entity.
    pub fn project(&self, entity: &AnyEntity) -> Vec<Value> {
        match &self.projection {
            Projection::All => entity.values().into_iter().map(|(_, value)| value).collect(),
            Projection::Fields(fields) => fields
                .iter()
                .map(|field| entity.get(field).unwrap_or(Value::Null))
                .collect(),
        }
    }

    pub fn matches(&self, entity: &AnyEntity, params: &[Value]) -> Result<bool> {
        match &self.predicate {
            Some(predicate) => predicate.evaluate(entity, params),
            None => Ok(true),
        }
    }
}

/// Parses a filter expression whose field references use `alias.field`.
///
/// With an entity type at hand, unknown fields are rejected as well.
pub fn parse_predicate(alias: &str, text: &str, entity_type: Option<&EntityType>) -> Result<Predicate> {
    validate_alias(alias)?;
    if text.trim().is_empty() {
        return Err(TtmError::argument("The filter expression can't be empty"));
    }

    let dialect = PostgreSqlDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(text)
        .map_err(|e| parse_error("filter expression", e))?;
    let expr = parser
        .parse_expr()
        .map_err(|e| parse_error("filter expression", e))?;
    parser
        .expect_token(&Token::EOF)
        .map_err(|e| parse_error("filter expression", e))?;

    let predicate = convert(expr, &FieldRefs::Qualified(alias))?;
    if let Some(entity_type) = entity_type {
        predicate.check_fields(entity_type)?;
    }
    Ok(predicate)
}

fn parse_single_select(text: &str) -> Result<Box<sql_ast::Select>> {
    let dialect = PostgreSqlDialect {};
    let mut statements =
        Parser::parse_sql(&dialect, text).map_err(|e| parse_error("query", e))?;
    if statements.len() != 1 {
        return Err(TtmError::argument("Exactly one query statement is expected"));
    }
    let Some(sql_ast::Statement::Query(query)) = statements.pop() else {
        return Err(TtmError::argument("Only SELECT queries are supported"));
    };
    if query.with.is_some() || query.order_by.is_some() || query.limit_clause.is_some() {
        return Err(TtmError::argument(
            "WITH, ORDER BY and LIMIT are not supported in entity queries",
        ));
    }
    let sql_ast::SetExpr::Select(select) = *query.body else {
        return Err(TtmError::argument("Only SELECT queries are supported"));
    };
    if select.having.is_some() || select.distinct.is_some() {
        return Err(TtmError::argument("DISTINCT and HAVING are not supported"));
    }
    Ok(select)
}

fn single_source(from: &[sql_ast::TableWithJoins]) -> Result<(String, Option<String>)> {
    let [source] = from else {
        return Err(TtmError::argument("Exactly one entity type is expected in FROM"));
    };
    if !source.joins.is_empty() {
        return Err(TtmError::argument("Joins are not supported"));
    }
    let sql_ast::TableFactor::Table { name, alias, .. } = &source.relation else {
        return Err(TtmError::argument("FROM must name an entity type"));
    };

    let entity = name.to_string();
    validate_type_name(&entity)?;
    let alias = alias.as_ref().map(|a| a.name.value.clone());
    if let Some(alias) = &alias {
        validate_alias(alias)?;
    }
    Ok((entity, alias))
}

/// How field references are spelled in a predicate.
enum FieldRefs<'a> {
    /// Only `alias.field`.
    Qualified(&'a str),
    /// `field`, or `alias.field` when an alias is declared.
    Bare(Option<&'a str>),
}

impl FieldRefs<'_> {
    fn field(&self, expr: &sql_ast::Expr) -> Option<String> {
        match (self, expr) {
            (Self::Bare(_), sql_ast::Expr::Identifier(ident)) => Some(ident.value.clone()),
            (Self::Qualified(alias) | Self::Bare(Some(alias)), sql_ast::Expr::CompoundIdentifier(parts)) => {
                match parts.as_slice() {
                    [qualifier, field] if qualifier.value == *alias => Some(field.value.clone()),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn expect_field(&self, expr: &sql_ast::Expr) -> Result<String> {
        self.field(expr).ok_or_else(|| match self {
            Self::Qualified(alias) => TtmError::argument(format!(
                "Expected a field reference '{alias}.<field>', got '{expr}'"
            )),
            Self::Bare(_) => TtmError::argument(format!("Expected a field reference, got '{expr}'")),
        })
    }
}

fn convert(expr: sql_ast::Expr, refs: &FieldRefs<'_>) -> Result<Predicate> {
    use sql_ast::BinaryOperator as Op;

    if let Some(field) = refs.field(&expr) {
        return Ok(Predicate::Compare {
            field,
            op: CompareOp::Eq,
            operand: Operand::Literal(Value::Boolean(true)),
        });
    }

    match expr {
        sql_ast::Expr::Nested(inner) => convert(*inner, refs),
        sql_ast::Expr::BinaryOp { left, op, right } => match op {
            Op::And => Ok(Predicate::And(
                Box::new(convert(*left, refs)?),
                Box::new(convert(*right, refs)?),
            )),
            Op::Or => Ok(Predicate::Or(
                Box::new(convert(*left, refs)?),
                Box::new(convert(*right, refs)?),
            )),
            Op::Eq => comparison(*left, CompareOp::Eq, *right, refs),
            Op::NotEq => comparison(*left, CompareOp::NotEq, *right, refs),
            Op::Lt => comparison(*left, CompareOp::Lt, *right, refs),
            Op::LtEq => comparison(*left, CompareOp::LtEq, *right, refs),
            Op::Gt => comparison(*left, CompareOp::Gt, *right, refs),
            Op::GtEq => comparison(*left, CompareOp::GtEq, *right, refs),
            other => Err(TtmError::argument(format!("Unsupported operator: {other}"))),
        },
        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Not,
            expr,
        } => Ok(Predicate::Not(Box::new(convert(*expr, refs)?))),
        sql_ast::Expr::IsNull(inner) => Ok(Predicate::IsNull {
            field: refs.expect_field(&inner)?,
            negated: false,
        }),
        sql_ast::Expr::IsNotNull(inner) => Ok(Predicate::IsNull {
            field: refs.expect_field(&inner)?,
            negated: true,
        }),
        sql_ast::Expr::IsTrue(inner) => boolean_test(&inner, true, false, refs),
        sql_ast::Expr::IsFalse(inner) => boolean_test(&inner, false, false, refs),
        sql_ast::Expr::IsNotTrue(inner) => boolean_test(&inner, true, true, refs),
        sql_ast::Expr::IsNotFalse(inner) => boolean_test(&inner, false, true, refs),
        sql_ast::Expr::Like {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => like(&expr, *pattern, negated, false, escape_char.is_some(), refs),
        sql_ast::Expr::ILike {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => like(&expr, *pattern, negated, true, escape_char.is_some(), refs),
        sql_ast::Expr::InList {
            expr,
            list,
            negated,
        } => Ok(Predicate::InList {
            field: refs.expect_field(&expr)?,
            list: list.into_iter().map(operand).collect::<Result<Vec<_>>>()?,
            negated,
        }),
        other => Err(TtmError::argument(format!("Unsupported filter expression: {other}"))),
    }
}

fn comparison(
    left: sql_ast::Expr,
    op: CompareOp,
    right: sql_ast::Expr,
    refs: &FieldRefs<'_>,
) -> Result<Predicate> {
    if let Some(field) = refs.field(&left) {
        return Ok(Predicate::Compare {
            field,
            op,
            operand: operand(right)?,
        });
    }
    if let Some(field) = refs.field(&right) {
        return Ok(Predicate::Compare {
            field,
            op: op.flipped(),
            operand: operand(left)?,
        });
    }
    Err(TtmError::argument(format!(
        "Comparison '{left} {op} {right}' must involve exactly one field"
    )))
}

fn boolean_test(
    inner: &sql_ast::Expr,
    expected: bool,
    negated: bool,
    refs: &FieldRefs<'_>,
) -> Result<Predicate> {
    let test = Predicate::Compare {
        field: refs.expect_field(inner)?,
        op: CompareOp::Eq,
        operand: Operand::Literal(Value::Boolean(expected)),
    };
    Ok(if negated {
        Predicate::Not(Box::new(test))
    } else {
        test
    })
}

fn like(
    expr: &sql_ast::Expr,
    pattern: sql_ast::Expr,
    negated: bool,
    case_insensitive: bool,
    has_escape: bool,
    refs: &FieldRefs<'_>,
) -> Result<Predicate> {
    if has_escape {
        return Err(TtmError::argument("LIKE ... ESCAPE is not supported"));
    }
    Ok(Predicate::Like {
        field: refs.expect_field(expr)?,
        pattern: operand(pattern)?,
        negated,
        case_insensitive,
    })
}

fn operand(expr: sql_ast::Expr) -> Result<Operand> {
    match expr {
        sql_ast::Expr::Value(value) => literal(value.value),
        sql_ast::Expr::Nested(inner) => operand(*inner),
        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Minus,
            expr,
        } => match operand(*expr)? {
            Operand::Literal(Value::Integer(i)) => Ok(Operand::Literal(Value::Integer(-i))),
            Operand::Literal(Value::Float(f)) => Ok(Operand::Literal(Value::Float(-f))),
            _ => Err(TtmError::argument("Unary minus applies to numbers only")),
        },
        other => Err(TtmError::argument(format!(
            "Expected a literal or parameter, got '{other}'"
        ))),
    }
}

fn literal(value: sql_ast::Value) -> Result<Operand> {
    match value {
        sql_ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Operand::Literal(Value::Integer(i)))
            } else {
                n.parse::<f64>()
                    .map(|f| Operand::Literal(Value::Float(f)))
                    .map_err(|_| TtmError::argument(format!("Invalid number: {n}")))
            }
        }
        sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
            Ok(Operand::Literal(Value::Text(s)))
        }
        sql_ast::Value::Boolean(b) => Ok(Operand::Literal(Value::Boolean(b))),
        sql_ast::Value::Null => Ok(Operand::Literal(Value::Null)),
        sql_ast::Value::Placeholder(name) => name
            .strip_prefix('$')
            .and_then(|index| index.parse::<usize>().ok())
            .filter(|index| *index > 0)
            .map(Operand::Param)
            .ok_or_else(|| TtmError::argument(format!("Unsupported parameter '{name}', use $1, $2, ..."))),
        other => Err(TtmError::argument(format!("Unsupported literal: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(field: &str, op: CompareOp, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            field: field.into(),
            op,
            operand: Operand::Literal(value.into()),
        }
    }

    #[test]
    fn alias_qualified_comparison() {
        let predicate = parse_predicate("w", "w.active=true", None).unwrap();
        assert_eq!(predicate, cmp("active", CompareOp::Eq, true));
    }

    #[test]
    fn literal_on_the_left_is_flipped() {
        let predicate = parse_predicate("w", "10 < w.qty", None).unwrap();
        assert_eq!(predicate, cmp("qty", CompareOp::Gt, 10));
    }

    #[test]
    fn boolean_composition_and_params() {
        let predicate =
            parse_predicate("w", "(w.qty >= $1 OR w.name LIKE 'a%') AND NOT w.gone IS NULL", None)
                .unwrap();
        let Predicate::And(left, right) = predicate else {
            panic!("expected AND, got {predicate:?}");
        };
        assert!(matches!(*left, Predicate::Or(_, _)));
        assert!(matches!(*right, Predicate::Not(_)));
    }

    #[test]
    fn foreign_alias_and_injection_are_rejected() {
        assert!(parse_predicate("w", "x.active = true", None).is_err());
        assert!(parse_predicate("w", "active = true", None).is_err());
        assert!(parse_predicate("w", "w.id = 1; DROP TABLE widget", None).is_err());
        assert!(parse_predicate("w", "w.id = (SELECT 1)", None).is_err());
        assert!(parse_predicate("w w", "w.id = 1", None).is_err());
        assert!(parse_predicate("w", "   ", None).is_err());
    }

    #[test]
    fn entity_query_round_trips_through_display() {
        let query = EntityQuery::parse("SELECT w FROM demo.widget w WHERE w.qty > -2").unwrap();
        assert_eq!(query.entity, "demo.widget");
        assert_eq!(query.alias, "w");
        assert_eq!(query.predicate, Some(cmp("qty", CompareOp::Gt, -2)));

        let again = EntityQuery::parse(&query.to_string()).unwrap();
        assert_eq!(again, query);
    }

    #[test]
    fn entity_query_must_select_its_alias() {
        assert!(EntityQuery::parse("SELECT * FROM demo.widget w").is_err());
        assert!(EntityQuery::parse("SELECT w FROM demo.widget").is_err());
        assert!(EntityQuery::parse("SELECT w FROM demo.widget w ORDER BY w.id").is_err());
        assert!(EntityQuery::parse("DELETE FROM demo.widget").is_err());
    }

    #[test]
    fn raw_select_accepts_bare_fields() {
        let select = SelectStatement::parse("SELECT name, qty FROM demo.widget WHERE qty IN (1, 2)")
            .unwrap();
        assert_eq!(
            select.projection,
            Projection::Fields(vec!["name".into(), "qty".into()])
        );
        assert!(matches!(select.predicate, Some(Predicate::InList { .. })));

        let all = SelectStatement::parse("SELECT * FROM demo.widget w WHERE w.active").unwrap();
        assert_eq!(all.projection, Projection::All);
        assert_eq!(all.predicate, Some(cmp("active", CompareOp::Eq, true)));
    }
}
