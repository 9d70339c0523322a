//! Borrowed result rows and typed extraction.
//!
//! A [`Row`] borrows its [`QueryResult`](crate::QueryResult) mutably, so
//! the borrow checker enforces that at most one row per result is live;
//! advancing the cursor invalidates the previous row at compile time
//! instead of at run time.

use std::marker::PhantomData;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::decode;
use crate::engine::status;
use crate::engine::HandleSlot;
use crate::error::{LadybugError, Result};
use crate::handle::OwnedHandle;
use crate::value::{Node, Rel, Value};

/// One result row. Values decode on demand by column index.
#[derive(Debug)]
pub struct Row<'r> {
    tuple: OwnedHandle,
    columns: u64,
    _result: PhantomData<&'r ()>,
}

impl Row<'_> {
    pub(crate) fn new(tuple: OwnedHandle, columns: u64) -> Self {
        Row {
            tuple,
            columns,
            _result: PhantomData,
        }
    }

    /// Number of columns in the row.
    pub fn column_count(&self) -> u64 {
        self.columns
    }

    /// Decode the value in column `index`.
    pub fn value(&self, index: u64) -> Result<Value> {
        if index >= self.columns {
            return Err(LadybugError::InvalidArgument(format!(
                "column index {index} out of range ({} columns)",
                self.columns
            )));
        }
        let tuple = self.tuple.raw()?;
        let engine = self.tuple.engine();

        let mut slot = HandleSlot::empty();
        status::check("tuple_value", engine.tuple_value(tuple, index, &mut slot))?;
        let value = slot
            .take()
            .ok_or_else(|| status::missing_handle("tuple_value"))?;
        // The decoder releases handles it obtains itself; this one is ours.
        let decoded = decode::decode(engine.as_ref(), value);
        engine.value_destroy(value);
        decoded
    }

    /// Decode column `index` and narrow it to `T`, failing with a
    /// type-mismatch error that names both sides.
    pub fn get<T: FromValue>(&self, index: u64) -> Result<T> {
        let value = self.value(index)?;
        T::from_value(value).map_err(|value| LadybugError::TypeMismatch {
            index: index as usize,
            expected: T::EXPECTED,
            actual: value.type_name(),
        })
    }

    /// Decode the whole row into a tuple of typed columns.
    ///
    /// The tuple arity must not exceed the column count; nothing is
    /// decoded when it does.
    pub fn scan<T: FromRow>(&self) -> Result<T> {
        if (T::WIDTH as u64) > self.columns {
            return Err(LadybugError::InvalidArgument(format!(
                "cannot scan {} values from a {}-column row",
                T::WIDTH,
                self.columns
            )));
        }
        T::from_row(self)
    }
}

/// Conversion from a decoded [`Value`] into a concrete Rust type.
///
/// A failed conversion hands the value back so the caller can report its
/// actual type.
pub trait FromValue: Sized {
    /// Type name reported in mismatch errors.
    const EXPECTED: &'static str;

    fn from_value(value: Value) -> std::result::Result<Self, Value>;
}

macro_rules! from_value {
    ($ty:ty, $expected:literal, $($pattern:pat => $extract:expr),+ $(,)?) => {
        impl FromValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_value(value: Value) -> std::result::Result<Self, Value> {
                match value {
                    $($pattern => Ok($extract),)+
                    other => Err(other),
                }
            }
        }
    };
}

from_value!(bool, "bool", Value::Bool(b) => b);
from_value!(i64, "int64", Value::Int64(i) => i);
from_value!(u64, "uint64", Value::UInt64(u) => u);
from_value!(f64, "float64", Value::Float64(f) => f);
from_value!(String, "string", Value::String(s) => s);
from_value!(Vec<u8>, "blob", Value::Blob(b) => b);
from_value!(Uuid, "uuid", Value::Uuid(u) => u);
from_value!(TimeDelta, "interval", Value::Interval(d) => d);
// Dates are instants too; both variants narrow to a DateTime.
from_value!(DateTime<Utc>, "timestamp",
    Value::Timestamp(t) => t,
    Value::Date(t) => t,
);
from_value!(Node, "node", Value::Node(n) => *n);
from_value!(Rel, "rel", Value::Rel(r) => *r);

impl FromValue for Value {
    const EXPECTED: &'static str = "value";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Conversion of a whole row into a tuple of typed columns.
pub trait FromRow: Sized {
    /// Number of leading columns consumed.
    const WIDTH: usize;

    fn from_row(row: &Row<'_>) -> Result<Self>;
}

macro_rules! from_row_tuple {
    ($width:literal; $($name:ident : $index:tt),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            const WIDTH: usize = $width;

            fn from_row(row: &Row<'_>) -> Result<Self> {
                Ok(($(row.get::<$name>($index)?,)+))
            }
        }
    };
}

from_row_tuple!(1; A: 0);
from_row_tuple!(2; A: 0, B: 1);
from_row_tuple!(3; A: 0, B: 1, C: 2);
from_row_tuple!(4; A: 0, B: 1, C: 2, D: 3);
from_row_tuple!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
from_row_tuple!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
from_row_tuple!(7; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
from_row_tuple!(8; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value_narrowing() {
        assert_eq!(i64::from_value(Value::Int64(7)), Ok(7));
        assert_eq!(
            String::from_value(Value::String("x".to_string())),
            Ok("x".to_string())
        );
        // Mismatches hand the value back untouched.
        assert_eq!(i64::from_value(Value::Bool(true)), Err(Value::Bool(true)));
    }

    #[test]
    fn test_option_absorbs_null() {
        assert_eq!(Option::<i64>::from_value(Value::Null), Ok(None));
        assert_eq!(Option::<i64>::from_value(Value::Int64(3)), Ok(Some(3)));
        assert!(Option::<i64>::from_value(Value::Bool(false)).is_err());
    }

    #[test]
    fn test_datetime_accepts_date_and_timestamp() {
        let instant = DateTime::from_timestamp(86_400, 0).unwrap();
        assert_eq!(
            DateTime::<Utc>::from_value(Value::Date(instant)),
            Ok(instant)
        );
        assert_eq!(
            DateTime::<Utc>::from_value(Value::Timestamp(instant)),
            Ok(instant)
        );
    }
}
