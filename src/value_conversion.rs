//! Value conversion from SeaQuery to may_postgres.
//!
//! SeaQuery builds parameterised SQL with a `Values` list; may_postgres wants `&[&dyn ToSql]`.
//! The conversion follows a two-pass pattern:
//! 1. First pass: collect all values into typed vectors
//! 2. Second pass: create references to the stored values
//!
//! References stay valid for the duration of the closure.

use crate::error::StoreError;
use may_postgres::types::ToSql;
use sea_query::Value;

/// Convert SeaQuery values to may_postgres parameters and run `f` with them.
///
/// Only the value kinds the yard store binds through SeaQuery are supported: booleans,
/// integers, strings, and their NULLs. Unsigned values are bound as `BIGINT`.
///
/// # Errors
///
/// Returns `StoreError::Other` if an unsupported value type is encountered.
pub fn with_converted_params<F, R>(values: &sea_query::Values, f: F) -> Result<R, StoreError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, StoreError>,
{
    let mut bools: Vec<bool> = Vec::new();
    let mut ints: Vec<i32> = Vec::new();
    let mut big_ints: Vec<i64> = Vec::new();
    let mut strings: Vec<String> = Vec::new();
    let mut nulls: Vec<Option<i32>> = Vec::new();

    for value in values.iter() {
        match value {
            Value::Bool(Some(b)) => bools.push(*b),
            Value::Int(Some(i)) => ints.push(*i),
            Value::BigInt(Some(i)) => big_ints.push(*i),
            Value::String(Some(s)) => strings.push(s.clone()),
            // LIMIT/OFFSET arrive as unsigned values
            Value::Unsigned(Some(u)) => big_ints.push(i64::from(*u)),
            Value::BigUnsigned(Some(u)) => {
                let v = i64::try_from(*u).map_err(|_| {
                    StoreError::Other(format!(
                        "BigUnsigned value {u} exceeds i64::MAX, cannot be safely cast to i64"
                    ))
                })?;
                big_ints.push(v);
            }
            Value::Bool(None) | Value::Int(None) | Value::BigInt(None) | Value::String(None) => {
                nulls.push(None)
            }
            _ => return Err(unsupported(value)),
        }
    }

    let mut bool_idx = 0;
    let mut int_idx = 0;
    let mut big_int_idx = 0;
    let mut string_idx = 0;
    let mut null_idx = 0;

    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.0.len());

    for value in values.iter() {
        match value {
            Value::Bool(Some(_)) => {
                params.push(&bools[bool_idx] as &dyn ToSql);
                bool_idx += 1;
            }
            Value::Int(Some(_)) => {
                params.push(&ints[int_idx] as &dyn ToSql);
                int_idx += 1;
            }
            Value::BigInt(Some(_)) | Value::Unsigned(Some(_)) | Value::BigUnsigned(Some(_)) => {
                params.push(&big_ints[big_int_idx] as &dyn ToSql);
                big_int_idx += 1;
            }
            Value::String(Some(_)) => {
                params.push(&strings[string_idx] as &dyn ToSql);
                string_idx += 1;
            }
            Value::Bool(None) | Value::Int(None) | Value::BigInt(None) | Value::String(None) => {
                params.push(&nulls[null_idx] as &dyn ToSql);
                null_idx += 1;
            }
            _ => return Err(unsupported(value)),
        }
    }

    f(&params)
}

fn unsupported(value: &Value) -> StoreError {
    StoreError::Other(format!("Unsupported value type in query: {value:?}"))
}
