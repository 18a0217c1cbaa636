//! Statement building
//!
//! SQL Server drivers bind positional parameters (`@P1`, `@P2`, ...). Callers
//! write named parameters (`@userId`), so named queries are routed through
//! `sp_executesql` with the statement text and declaration list bound as
//! parameters too. Caller values never become part of the statement text.

use crate::errors::TypeMappingError;
use crate::types::{Params, SqlValue};
use crate::validate::{parameter_name, quote_object_name};

/// Statement text plus the values for its positional placeholders, in order
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    pub sql: String,
    pub binds: Vec<SqlValue>,
}

/// Parameter declaration list for `sp_executesql`, e.g. `@id int, @name nvarchar(max)`
pub fn declaration_list(params: &Params) -> Result<String, TypeMappingError> {
    let mut declarations = Vec::with_capacity(params.len());
    for (name, value) in params.iter() {
        let name = parameter_name(name)?;
        declarations.push(format!("@{} {}", name, value.sql_type().declaration()));
    }
    Ok(declarations.join(", "))
}

/// Prepare parameterized query text
pub fn build_query(text: &str, params: &Params) -> Result<PreparedStatement, TypeMappingError> {
    if params.is_empty() {
        return Ok(PreparedStatement {
            sql: text.to_string(),
            binds: Vec::new(),
        });
    }

    let declarations = declaration_list(params)?;
    let mut sql = String::from("EXEC sp_executesql @P1, @P2");
    let mut binds = Vec::with_capacity(params.len() + 2);
    binds.push(SqlValue::Text(text.to_string()));
    binds.push(SqlValue::Text(declarations));

    for (name, value) in params.iter() {
        let name = parameter_name(name)?;
        binds.push(value.clone());
        sql.push_str(&format!(", @{} = @P{}", name, binds.len()));
    }

    Ok(PreparedStatement { sql, binds })
}

/// Prepare a stored procedure call
pub fn build_procedure_call(
    name: &str,
    params: &Params,
) -> Result<PreparedStatement, TypeMappingError> {
    let mut sql = format!("EXEC {}", quote_object_name(name)?);
    let mut binds = Vec::with_capacity(params.len());

    for (i, (param, value)) in params.iter().enumerate() {
        let param = parameter_name(param)?;
        binds.push(value.clone());
        sql.push_str(if i == 0 { " " } else { ", " });
        sql.push_str(&format!("@{} = @P{}", param, binds.len()));
    }

    Ok(PreparedStatement { sql, binds })
}
