//! Parameter and row type mapping between Rust and SQL Server.
//! This crate provides the value types and statement building shared across the queryhaus workspace

pub mod errors;
pub mod serialize;
pub mod sql;
pub mod types;
pub mod validate;

pub use errors::TypeMappingError;
pub use serialize::{json_to_sql_value, serialize_to_params};
pub use sql::{build_procedure_call, build_query, declaration_list, PreparedStatement};
pub use types::{Params, Row, RowSet, SqlType, SqlValue};
pub use validate::{is_valid_identifier, parameter_name, quote_object_name, validate_params};
