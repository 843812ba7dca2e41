//! Parser for attribute declarations embedded in script sources
//!
//! Declarations live in header comments:
//! `//! @attribute name: type = <json default> @array @range(0, 10) @title("Speed")`
//!
//! The default is optional and written as JSON. Unquoted text is accepted as
//! the default of a `string` attribute.

use crate::attributes::schema::{is_reserved_attribute, AttributeDeclaration, AttributeMetadata};
use crate::attributes::value::{AttributeType, RawValue};
use crate::error::ScriptError;
use serde_json::Value;
use tracing::debug;

const DECLARATION_PREFIX: &str = "//! @attribute ";

/// Parse every attribute declaration in a script source, in source order
pub fn parse_attribute_declarations(
    source: &str,
) -> Result<Vec<(String, AttributeDeclaration)>, ScriptError> {
    let mut declarations = Vec::new();

    for (line_num, line) in source.lines().enumerate() {
        if let Some(body) = line.trim_start().strip_prefix(DECLARATION_PREFIX) {
            let (name, declaration) = parse_declaration_line(body, line_num + 1)?;
            debug!(
                name = name,
                attribute_type = %declaration.attribute_type,
                array = declaration.array,
                "Parsed attribute declaration"
            );
            declarations.push((name, declaration));
        }
    }

    Ok(declarations)
}

fn error(line: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Declaration {
        line,
        message: message.into(),
    }
}

/// Parse `name: type [= default] [@annotations...]`
fn parse_declaration_line(
    line: &str,
    line_number: usize,
) -> Result<(String, AttributeDeclaration), ScriptError> {
    let (body, metadata_str) = split_annotations(line.trim());

    let (declaration, default_str) = match body.split_once('=') {
        Some((declaration, default)) => (declaration.trim(), Some(default.trim())),
        None => (body.trim(), None),
    };

    let Some((name, type_str)) = declaration.split_once(':') else {
        return Err(error(
            line_number,
            "Attribute declaration must be in format 'name: type'",
        ));
    };
    let name = name.trim();
    validate_name(name, line_number)?;

    let attribute_type = AttributeType::parse(type_str)
        .ok_or_else(|| error(line_number, format!("Unknown attribute type: '{}'", type_str.trim())))?;

    let mut declaration = AttributeDeclaration::new(attribute_type);
    let (metadata, array) = parse_annotations(metadata_str);
    declaration.metadata = metadata;
    declaration.array = array;

    if let Some(default_str) = default_str.filter(|s| !s.is_empty()) {
        declaration.default = Some(parse_default(default_str, attribute_type, line_number)?);
    }

    Ok((name.to_string(), declaration))
}

fn validate_name(name: &str, line_number: usize) -> Result<(), ScriptError> {
    let Some(first_char) = name.chars().next() else {
        return Err(error(line_number, "Attribute name cannot be empty"));
    };

    if !first_char.is_alphabetic() && first_char != '_' {
        return Err(error(
            line_number,
            format!("Invalid attribute name: '{name}' (must start with letter or underscore)"),
        ));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(error(
            line_number,
            format!("Invalid attribute name: '{name}' (must contain only letters, numbers, and underscores)"),
        ));
    }

    if is_reserved_attribute(name) {
        return Err(error(
            line_number,
            format!("Attribute name '{name}' is reserved"),
        ));
    }

    Ok(())
}

fn parse_default(
    default_str: &str,
    attribute_type: AttributeType,
    line_number: usize,
) -> Result<RawValue, ScriptError> {
    match serde_json::from_str::<Value>(default_str) {
        Ok(value) => Ok(RawValue::Json(value)),
        Err(_) if attribute_type == AttributeType::String => {
            Ok(RawValue::Json(Value::String(default_str.to_string())))
        }
        Err(e) => Err(error(
            line_number,
            format!("Invalid default value '{default_str}': {e}"),
        )),
    }
}

/// Split at the first `@` outside a string literal
fn split_annotations(input: &str) -> (&str, &str) {
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in input.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '@' if !in_string => return (&input[..i], &input[i..]),
            _ => {}
        }
    }

    (input, "")
}

/// Parse `@name` and `@name(content)` annotations
fn parse_annotations(input: &str) -> (AttributeMetadata, bool) {
    let mut metadata = AttributeMetadata::default();
    let mut array = false;
    let mut rest = input;

    while let Some(at_pos) = rest.find('@') {
        let after = &rest[at_pos + 1..];
        let name_len = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let annotation = &after[..name_len];
        let tail = &after[name_len..];

        let (content, remaining) = match tail.strip_prefix('(') {
            Some(inner) => match find_matching_paren(inner) {
                Some(close) => (Some(&inner[..close]), &inner[close + 1..]),
                None => break,
            },
            None => (None, tail),
        };

        match (annotation, content) {
            ("array", _) => array = true,
            ("range", Some(content)) => {
                if let Some((min, max)) = content.split_once(',') {
                    if let (Ok(min), Ok(max)) = (min.trim().parse(), max.trim().parse()) {
                        metadata.min = Some(min);
                        metadata.max = Some(max);
                    }
                }
            }
            ("step", Some(content)) => metadata.step = content.trim().parse().ok(),
            ("precision", Some(content)) => metadata.precision = content.trim().parse().ok(),
            ("size", Some(content)) => metadata.size = content.trim().parse().ok(),
            ("title", Some(content)) => metadata.title = unquote(content),
            ("description", Some(content)) => metadata.description = unquote(content),
            ("tooltip", Some(content)) => metadata.tooltip = unquote(content),
            ("asset_type", Some(content)) => metadata.asset_type = unquote(content),
            _ => {} // Ignore unknown annotations
        }

        rest = remaining;
    }

    (metadata, array)
}

fn unquote(content: &str) -> Option<String> {
    let trimmed = content.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Byte position of the parenthesis closing an already-opened group
fn find_matching_paren(s: &str) -> Option<usize> {
    let mut depth = 1;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}
