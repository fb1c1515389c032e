//! Restricted query grammar shared by the gateway and the stores.

pub mod parser;
pub mod pattern;
pub mod predicate;

pub use parser::{EntityQuery, Projection, SelectStatement, parse_predicate, validate_alias};
pub use predicate::{CompareOp, Operand, Predicate};
