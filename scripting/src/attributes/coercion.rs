//! Conversion of raw attribute input into typed values
//!
//! `None` is the failure marker: malformed input never raises, the attribute
//! simply becomes null. Composite values (colors, vectors) reuse a compatible
//! previous value instead of building a new one.

use crate::attributes::schema::AttributeDeclaration;
use crate::attributes::value::{AttributeType, AttributeValue, RawValue, ReferenceResolver};
use glam::{Vec2, Vec3, Vec4};
use serde_json::Value;
use tracing::trace;

/// Coerce `raw` according to a full declaration, honouring `array`
pub fn coerce_declared(
    declaration: &AttributeDeclaration,
    raw: RawValue,
    previous: Option<AttributeValue>,
    resolver: &dyn ReferenceResolver,
) -> Option<AttributeValue> {
    if !declaration.array {
        return coerce(declaration.attribute_type, raw, previous, resolver);
    }

    let items: Vec<RawValue> = match raw {
        RawValue::Typed(AttributeValue::List(items)) => {
            items.into_iter().map(RawValue::from).collect()
        }
        raw => raw.as_array()?.iter().cloned().map(RawValue::Json).collect(),
    };
    let mut previous_items = match previous {
        Some(AttributeValue::List(items)) => items,
        _ => Vec::new(),
    };
    previous_items.resize(items.len(), None);

    let coerced = items
        .into_iter()
        .zip(previous_items)
        .map(|(item, previous)| coerce(declaration.attribute_type, item, previous, resolver))
        .collect();
    Some(AttributeValue::List(coerced))
}

/// Coerce a single raw value into the declared type
pub fn coerce(
    attribute_type: AttributeType,
    raw: RawValue,
    previous: Option<AttributeValue>,
    resolver: &dyn ReferenceResolver,
) -> Option<AttributeValue> {
    let result = match attribute_type {
        AttributeType::Boolean => Some(AttributeValue::Boolean(raw.is_truthy())),
        AttributeType::Number => coerce_number(&raw),
        AttributeType::Json => coerce_json(raw),
        AttributeType::Asset => coerce_asset(raw, resolver),
        AttributeType::Entity => coerce_entity(raw, resolver),
        AttributeType::Rgb | AttributeType::Rgba => coerce_color(raw, previous),
        AttributeType::Vec2 => coerce_vector::<2>(raw, previous),
        AttributeType::Vec3 => coerce_vector::<3>(raw, previous),
        AttributeType::Vec4 => coerce_vector::<4>(raw, previous),
        AttributeType::Curve => Some(AttributeValue::Unsupported {
            attribute_type,
            raw: raw.to_json(),
        }),
        AttributeType::String | AttributeType::Untyped => raw.into_passthrough(),
    };
    trace!(attribute_type = %attribute_type, value = ?result, "Coerced attribute value");
    result
}

fn coerce_number(raw: &RawValue) -> Option<AttributeValue> {
    if let Some(n) = raw.as_number() {
        return Some(AttributeValue::Number(n));
    }
    if let Some(s) = raw.as_str() {
        return parse_int(s).map(AttributeValue::Number);
    }
    raw.as_bool()
        .map(|b| AttributeValue::Number(if b { 1.0 } else { 0.0 }))
}

fn coerce_json(raw: RawValue) -> Option<AttributeValue> {
    match raw {
        RawValue::Json(Value::Null) | RawValue::Typed(AttributeValue::Json(Value::Null)) => None,
        RawValue::Json(Value::String(text)) | RawValue::Typed(AttributeValue::String(text)) => {
            serde_json::from_str::<Value>(&text)
                .ok()
                .filter(|value| !value.is_null())
                .map(AttributeValue::Json)
        }
        RawValue::Json(value) => Some(AttributeValue::Json(value)),
        RawValue::Typed(AttributeValue::Number(n)) => {
            Some(AttributeValue::Json(RawValue::from(n).to_json()))
        }
        RawValue::Typed(AttributeValue::Boolean(b)) => Some(AttributeValue::Json(Value::Bool(b))),
        RawValue::Typed(value) => Some(value),
    }
}

fn coerce_asset(raw: RawValue, resolver: &dyn ReferenceResolver) -> Option<AttributeValue> {
    if let RawValue::Typed(AttributeValue::Asset(asset)) = raw {
        return Some(AttributeValue::Asset(asset));
    }
    let id = match raw.as_number() {
        Some(n) => n,
        None => parse_int(raw.as_str()?)?,
    };
    if id < 0.0 || id.fract() != 0.0 || id > u64::MAX as f64 {
        return None;
    }
    resolver.resolve_asset(id as u64).map(AttributeValue::Asset)
}

fn coerce_entity(raw: RawValue, resolver: &dyn ReferenceResolver) -> Option<AttributeValue> {
    if let RawValue::Typed(AttributeValue::Entity(entity)) = raw {
        return Some(AttributeValue::Entity(entity));
    }
    resolver
        .resolve_entity(raw.as_str()?)
        .map(AttributeValue::Entity)
}

fn coerce_color(raw: RawValue, previous: Option<AttributeValue>) -> Option<AttributeValue> {
    let previous = match previous {
        Some(AttributeValue::Color(color)) => Some(color),
        _ => None,
    };

    if let RawValue::Typed(AttributeValue::Color(color)) = raw {
        return Some(AttributeValue::Color(match previous {
            Some(mut old) => {
                old.copy_from(&color);
                old
            }
            None => color,
        }));
    }

    if let Some(items) = raw.as_array() {
        if !(3..=4).contains(&items.len()) {
            return None;
        }
        let components = numeric_components(items)?;
        let mut color = previous.unwrap_or_default();
        for (i, slot) in color.data.iter_mut().enumerate() {
            // A three-element array leaves alpha at fully opaque
            *slot = components.get(i).copied().unwrap_or(1.0);
        }
        return Some(AttributeValue::Color(color));
    }

    if let Some(text) = raw.as_str() {
        let mut color = previous.unwrap_or_default();
        return color.set_from_hex(text).then_some(AttributeValue::Color(color));
    }

    None
}

fn coerce_vector<const N: usize>(
    raw: RawValue,
    previous: Option<AttributeValue>,
) -> Option<AttributeValue> {
    let previous = previous.and_then(|value| vector_components::<N>(&value));

    // Copying into the previous buffer and passing through are
    // indistinguishable for plain vectors
    if let Some(components) = raw.typed().and_then(vector_components::<N>) {
        return vector_value(components);
    }

    let items = raw.as_array()?;
    if items.len() != N {
        return None;
    }
    let components = numeric_components(items)?;
    let mut data = previous.unwrap_or([0.0; N]);
    for (slot, value) in data.iter_mut().zip(components) {
        *slot = value;
    }
    vector_value(data)
}

fn vector_components<const N: usize>(value: &AttributeValue) -> Option<[f32; N]> {
    let components: Vec<f32> = match value {
        AttributeValue::Vec2(v) => v.to_array().to_vec(),
        AttributeValue::Vec3(v) => v.to_array().to_vec(),
        AttributeValue::Vec4(v) => v.to_array().to_vec(),
        _ => return None,
    };
    components.try_into().ok()
}

fn vector_value<const N: usize>(data: [f32; N]) -> Option<AttributeValue> {
    match data.as_slice() {
        [x, y] => Some(AttributeValue::Vec2(Vec2::new(*x, *y))),
        [x, y, z] => Some(AttributeValue::Vec3(Vec3::new(*x, *y, *z))),
        [x, y, z, w] => Some(AttributeValue::Vec4(Vec4::new(*x, *y, *z, *w))),
        _ => None,
    }
}

/// Every element must be a number, otherwise the whole value is rejected
fn numeric_components(items: &[Value]) -> Option<Vec<f32>> {
    items
        .iter()
        .map(|item| item.as_f64().map(|v| v as f32))
        .collect()
}

/// Parse the leading base-10 integer of a string
///
/// Leading whitespace and a sign are accepted and trailing garbage is
/// ignored, so `"42px"` is 42 and `"3.9"` is 3. Returns `None` when no digit
/// follows the optional sign.
pub fn parse_int(s: &str) -> Option<f64> {
    let trimmed = s.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut value: f64 = 0.0;
    let mut seen_digit = false;
    for c in digits.chars() {
        let Some(digit) = c.to_digit(10) else {
            break;
        };
        seen_digit = true;
        value = value * 10.0 + f64::from(digit);
    }

    if !seen_digit {
        return None;
    }
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::value::NullResolver;
    use serde_json::json;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42"), Some(42.0));
        assert_eq!(parse_int("  -17"), Some(-17.0));
        assert_eq!(parse_int("+5"), Some(5.0));
        assert_eq!(parse_int("42px"), Some(42.0));
        assert_eq!(parse_int("3.9"), Some(3.0));
        assert_eq!(parse_int("abc"), None);
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("-"), None);
    }

    #[test]
    fn test_vector_passthrough_rejects_wrong_arity() {
        let value = coerce(
            AttributeType::Vec3,
            RawValue::from(Vec2::new(1.0, 2.0)),
            None,
            &NullResolver,
        );
        assert_eq!(value, None);
    }

    #[test]
    fn test_vector_reuses_previous_buffer() {
        let value = coerce(
            AttributeType::Vec2,
            json!([3, 4]).into(),
            Some(AttributeValue::Vec2(Vec2::new(1.0, 2.0))),
            &NullResolver,
        );
        assert_eq!(value, Some(AttributeValue::Vec2(Vec2::new(3.0, 4.0))));
    }
}
