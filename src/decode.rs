//! Recursive decoding of engine values into [`Value`].
//!
//! The decoder dispatches on the value's logical type tag. Scalar arms that
//! fail their typed extractor fall back to the engine's string rendering,
//! as do tags the decoder does not know; a malformed *element* inside a
//! container, on the other hand, aborts the whole container decode. Every
//! nested value handle the engine hands out is released on every path,
//! success or error, via a drop guard.

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::engine::{Engine, HandleSlot, LogicalTypeId, RawHandle, State};
use crate::engine::status;
use crate::error::Result;
use crate::value::{Node, Rel, Value};

/// Releases a nested value handle when the guard leaves scope.
struct ValueGuard<'e> {
    engine: &'e dyn Engine,
    value: RawHandle,
}

impl<'e> ValueGuard<'e> {
    fn new(engine: &'e dyn Engine, value: RawHandle) -> Self {
        ValueGuard { engine, value }
    }
}

impl Drop for ValueGuard<'_> {
    fn drop(&mut self) {
        self.engine.value_destroy(self.value);
    }
}

/// Decode the value behind `value`. The caller keeps ownership of `value`
/// itself; only handles the decoder obtains along the way are released
/// here.
pub(crate) fn decode(engine: &dyn Engine, value: RawHandle) -> Result<Value> {
    if engine.value_is_null(value) {
        return Ok(Value::Null);
    }

    let type_id = engine.value_type_id(value);
    match type_id {
        LogicalTypeId::Bool => {
            let mut out = false;
            scalar(engine, value, engine.value_bool(value, &mut out), Value::Bool(out))
        }
        LogicalTypeId::Int8
        | LogicalTypeId::Int16
        | LogicalTypeId::Int32
        | LogicalTypeId::Int64
        | LogicalTypeId::Serial => {
            let mut out = 0i64;
            scalar(engine, value, engine.value_int64(value, &mut out), Value::Int64(out))
        }
        LogicalTypeId::UInt8
        | LogicalTypeId::UInt16
        | LogicalTypeId::UInt32
        | LogicalTypeId::UInt64 => {
            let mut out = 0u64;
            scalar(engine, value, engine.value_uint64(value, &mut out), Value::UInt64(out))
        }
        LogicalTypeId::Float => {
            let mut out = 0f32;
            scalar(
                engine,
                value,
                engine.value_float(value, &mut out),
                Value::Float64(f64::from(out)),
            )
        }
        LogicalTypeId::Double => {
            let mut out = 0f64;
            scalar(engine, value, engine.value_double(value, &mut out), Value::Float64(out))
        }
        LogicalTypeId::Date => {
            let mut days = 0i32;
            match engine.value_date_days(value, &mut days) {
                State::Success => match midnight_utc(days) {
                    Some(date) => Ok(Value::Date(date)),
                    None => Ok(fallback(engine, value)),
                },
                _ => Ok(fallback(engine, value)),
            }
        }
        LogicalTypeId::Timestamp => timestamp(engine, value, |e, v, out| {
            e.value_timestamp_micros(v, out)
        }, from_micros),
        LogicalTypeId::TimestampTz => timestamp(engine, value, |e, v, out| {
            e.value_timestamp_tz_micros(v, out)
        }, from_micros),
        LogicalTypeId::TimestampNs => timestamp(engine, value, |e, v, out| {
            e.value_timestamp_ns(v, out)
        }, from_nanos),
        LogicalTypeId::TimestampMs => timestamp(engine, value, |e, v, out| {
            e.value_timestamp_ms(v, out)
        }, from_millis),
        LogicalTypeId::TimestampSec => timestamp(engine, value, |e, v, out| {
            e.value_timestamp_secs(v, out)
        }, from_secs),
        LogicalTypeId::Interval => {
            let mut seconds = 0f64;
            match engine.value_interval_seconds(value, &mut seconds) {
                State::Success => Ok(Value::Interval(TimeDelta::nanoseconds(
                    (seconds * 1e9) as i64,
                ))),
                _ => Ok(fallback(engine, value)),
            }
        }
        LogicalTypeId::String => {
            let mut out = String::new();
            scalar(engine, value, engine.value_string(value, &mut out), Value::String(out))
        }
        LogicalTypeId::Blob => {
            let mut out = Vec::new();
            scalar(engine, value, engine.value_blob(value, &mut out), Value::Blob(out))
        }
        LogicalTypeId::Uuid => {
            let mut text = String::new();
            match engine.value_uuid(value, &mut text) {
                State::Success => match Uuid::parse_str(&text) {
                    Ok(uuid) => Ok(Value::Uuid(uuid)),
                    Err(_) => Ok(Value::String(text)),
                },
                _ => Ok(fallback(engine, value)),
            }
        }
        LogicalTypeId::List | LogicalTypeId::Array => decode_list(engine, value),
        LogicalTypeId::Map => decode_map(engine, value),
        LogicalTypeId::Struct | LogicalTypeId::Union | LogicalTypeId::RecursiveRel => {
            decode_struct(engine, value)
        }
        LogicalTypeId::Node => decode_node(engine, value),
        LogicalTypeId::Rel => decode_rel(engine, value),
        // InternalId surfaces only nested inside Node/Rel ids; Decimal has
        // no native representation. Both take the string rendering, as
        // would any tag added to the engine after this driver was built.
        LogicalTypeId::InternalId | LogicalTypeId::Decimal => Ok(fallback(engine, value)),
    }
}

/// Decode a handle the decoder itself obtained, releasing it afterwards.
fn decode_nested(engine: &dyn Engine, value: RawHandle) -> Result<Value> {
    let guard = ValueGuard::new(engine, value);
    decode(engine, guard.value)
}

fn scalar(engine: &dyn Engine, value: RawHandle, state: State, decoded: Value) -> Result<Value> {
    match state {
        State::Success => Ok(decoded),
        _ => Ok(fallback(engine, value)),
    }
}

/// The string rendering the engine produces for any value.
fn fallback(engine: &dyn Engine, value: RawHandle) -> Value {
    Value::String(engine.value_to_string(value))
}

fn timestamp(
    engine: &dyn Engine,
    value: RawHandle,
    extract: impl Fn(&dyn Engine, RawHandle, &mut i64) -> State,
    convert: impl Fn(i64) -> Option<DateTime<Utc>>,
) -> Result<Value> {
    let mut raw = 0i64;
    match extract(engine, value, &mut raw) {
        State::Success => match convert(raw) {
            Some(instant) => Ok(Value::Timestamp(instant)),
            None => Ok(fallback(engine, value)),
        },
        _ => Ok(fallback(engine, value)),
    }
}

fn midnight_utc(epoch_days: i32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::from(epoch_days) * 86_400, 0)
}

fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

fn from_nanos(ns: i64) -> Option<DateTime<Utc>> {
    let secs = ns.div_euclid(1_000_000_000);
    let nanos = ns.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    let secs = ms.div_euclid(1_000);
    let nanos = (ms.rem_euclid(1_000) * 1_000_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

fn from_secs(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn decode_list(engine: &dyn Engine, value: RawHandle) -> Result<Value> {
    let mut size = 0u64;
    if !engine.value_list_size(value, &mut size).is_success() {
        return Ok(fallback(engine, value));
    }
    let mut items = Vec::with_capacity(size as usize);
    for index in 0..size {
        let mut slot = HandleSlot::empty();
        status::check("value_list_element", engine.value_list_element(value, index, &mut slot))?;
        let element = slot
            .take()
            .ok_or_else(|| status::missing_handle("value_list_element"))?;
        items.push(decode_nested(engine, element)?);
    }
    Ok(Value::List(items))
}

fn decode_map(engine: &dyn Engine, value: RawHandle) -> Result<Value> {
    let mut size = 0u64;
    if !engine.value_map_size(value, &mut size).is_success() {
        return Ok(fallback(engine, value));
    }
    let mut entries = Vec::with_capacity(size as usize);
    for index in 0..size {
        let mut slot = HandleSlot::empty();
        status::check("value_map_key", engine.value_map_key(value, index, &mut slot))?;
        let key = slot
            .take()
            .ok_or_else(|| status::missing_handle("value_map_key"))?;
        // Map keys keep only their printed form; the handle still needs
        // releasing.
        let key_text = {
            let guard = ValueGuard::new(engine, key);
            engine.value_to_string(guard.value)
        };

        let mut slot = HandleSlot::empty();
        status::check("value_map_value", engine.value_map_value(value, index, &mut slot))?;
        let entry = slot
            .take()
            .ok_or_else(|| status::missing_handle("value_map_value"))?;
        entries.push((key_text, decode_nested(engine, entry)?));
    }
    Ok(Value::Map(entries))
}

fn decode_struct(engine: &dyn Engine, value: RawHandle) -> Result<Value> {
    let mut count = 0u64;
    if !engine.value_struct_field_count(value, &mut count).is_success() {
        return Ok(fallback(engine, value));
    }
    let mut fields = Vec::with_capacity(count as usize);
    for index in 0..count {
        let mut name = String::new();
        status::check(
            "value_struct_field_name",
            engine.value_struct_field_name(value, index, &mut name),
        )?;

        let mut slot = HandleSlot::empty();
        status::check(
            "value_struct_field_value",
            engine.value_struct_field_value(value, index, &mut slot),
        )?;
        let field = slot
            .take()
            .ok_or_else(|| status::missing_handle("value_struct_field_value"))?;
        fields.push((name, decode_nested(engine, field)?));
    }
    Ok(Value::Struct(fields))
}

fn decode_node(engine: &dyn Engine, value: RawHandle) -> Result<Value> {
    let mut slot = HandleSlot::empty();
    status::check("node_id_value", engine.node_id_value(value, &mut slot))?;
    let id_handle = slot
        .take()
        .ok_or_else(|| status::missing_handle("node_id_value"))?;
    let id = decode_nested(engine, id_handle)?;

    let mut slot = HandleSlot::empty();
    status::check("node_label_value", engine.node_label_value(value, &mut slot))?;
    let label_handle = slot
        .take()
        .ok_or_else(|| status::missing_handle("node_label_value"))?;
    let labels = coerce_labels(decode_nested(engine, label_handle)?);

    let mut count = 0u64;
    status::check("node_property_count", engine.node_property_count(value, &mut count))?;
    let mut properties = Vec::with_capacity(count as usize);
    for index in 0..count {
        let mut name = String::new();
        status::check(
            "node_property_name",
            engine.node_property_name(value, index, &mut name),
        )?;
        let mut slot = HandleSlot::empty();
        status::check(
            "node_property_value",
            engine.node_property_value(value, index, &mut slot),
        )?;
        let prop = slot
            .take()
            .ok_or_else(|| status::missing_handle("node_property_value"))?;
        properties.push((name, decode_nested(engine, prop)?));
    }

    Ok(Value::Node(Box::new(Node {
        id,
        labels,
        properties,
    })))
}

fn decode_rel(engine: &dyn Engine, value: RawHandle) -> Result<Value> {
    let mut slot = HandleSlot::empty();
    status::check("rel_id_value", engine.rel_id_value(value, &mut slot))?;
    let id_handle = slot
        .take()
        .ok_or_else(|| status::missing_handle("rel_id_value"))?;
    let id = decode_nested(engine, id_handle)?;

    let mut slot = HandleSlot::empty();
    status::check("rel_src_id_value", engine.rel_src_id_value(value, &mut slot))?;
    let src_handle = slot
        .take()
        .ok_or_else(|| status::missing_handle("rel_src_id_value"))?;
    let src_id = decode_nested(engine, src_handle)?;

    let mut slot = HandleSlot::empty();
    status::check("rel_dst_id_value", engine.rel_dst_id_value(value, &mut slot))?;
    let dst_handle = slot
        .take()
        .ok_or_else(|| status::missing_handle("rel_dst_id_value"))?;
    let dst_id = decode_nested(engine, dst_handle)?;

    let mut slot = HandleSlot::empty();
    status::check("rel_label_value", engine.rel_label_value(value, &mut slot))?;
    let label_handle = slot
        .take()
        .ok_or_else(|| status::missing_handle("rel_label_value"))?;
    let label = match decode_nested(engine, label_handle)? {
        Value::String(label) => label,
        _ => String::new(),
    };

    let mut count = 0u64;
    status::check("rel_property_count", engine.rel_property_count(value, &mut count))?;
    let mut properties = Vec::with_capacity(count as usize);
    for index in 0..count {
        let mut name = String::new();
        status::check(
            "rel_property_name",
            engine.rel_property_name(value, index, &mut name),
        )?;
        let mut slot = HandleSlot::empty();
        status::check(
            "rel_property_value",
            engine.rel_property_value(value, index, &mut slot),
        )?;
        let prop = slot
            .take()
            .ok_or_else(|| status::missing_handle("rel_property_value"))?;
        properties.push((name, decode_nested(engine, prop)?));
    }

    Ok(Value::Rel(Box::new(Rel {
        id,
        src_id,
        dst_id,
        label,
        properties,
    })))
}

/// A node's label value is a single string for single-label nodes and a
/// list of strings otherwise; accept both shapes.
fn coerce_labels(value: Value) -> Vec<String> {
    match value {
        Value::String(label) => vec![label],
        Value::List(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(label) => Some(label),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midnight_utc_from_epoch_days() {
        let date = midnight_utc(19_723).unwrap(); // 2024-01-01
        assert_eq!(date.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        let date = midnight_utc(-1).unwrap();
        assert_eq!(date.to_rfc3339(), "1969-12-31T00:00:00+00:00");
        // Beyond the representable range falls back rather than panics.
        assert!(midnight_utc(i32::MAX).is_none());
    }

    #[test]
    fn test_timestamp_conversions_agree() {
        let micros = 1_700_000_000_123_456i64;
        let from_us = from_micros(micros).unwrap();
        let from_ns = from_nanos(micros * 1_000).unwrap();
        assert_eq!(from_us, from_ns);

        let from_ms = from_millis(1_700_000_000_123).unwrap();
        assert_eq!(from_ms.timestamp_subsec_millis(), 123);

        let from_s = from_secs(1_700_000_000).unwrap();
        assert_eq!(from_s.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_negative_timestamps_round_toward_epoch_start() {
        // -1 microsecond is 999_999us into the second before the epoch.
        let instant = from_micros(-1).unwrap();
        assert_eq!(instant.timestamp(), -1);
        assert_eq!(instant.timestamp_subsec_micros(), 999_999);
    }

    #[test]
    fn test_label_coercion() {
        assert_eq!(
            coerce_labels(Value::String("Person".to_string())),
            vec!["Person".to_string()]
        );
        assert_eq!(
            coerce_labels(Value::List(vec![
                Value::String("A".to_string()),
                Value::String("B".to_string()),
            ])),
            vec!["A".to_string(), "B".to_string()]
        );
        assert!(coerce_labels(Value::Int64(1)).is_empty());
    }
}
