//! hcl documents to [Value] trees and back
//!
//! In hcl terms a file is a `body`, which is a list of `attributes` (`key = expression`) and `blocks`
//! (`identifier "label" ... { body }`). A parsed document is always an object:
//! - an attribute becomes an entry, its expression is evaluated without any variables
//! - a block becomes a nested object keyed by its identifier and then by each label
//! - blocks with the same path are combined
//! - arrays become objects keyed `"0"`, `"1"`, ...
//!
//! ```hcl
//! Base = "unit-base"
//! hp = 80
//!
//! weapon laser {
//!   damage = 3 * 4
//! }
//! ```
//!
//! [to_text] writes a tree back as hcl. `parse(to_text(d))` is structurally equal to `d`.
use crate::value::{Literal, Location, Object, Value};
use hcl::eval::Evaluate;
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use hcl_edit::Span;
use std::sync::Arc;

/// File extension of documents, without the dot
pub const EXTENSION: &str = "hcl";

/// Reserved key naming the document to inherit from
pub const BASE_KEY: &str = "Base";

#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error("Unable to parse hcl document {source_name}")]
    Syntax {
        source_name: String,
        #[source]
        error: hcl_edit::parser::Error,
    },
    #[error("Unable to evaluate expression at {location}")]
    Evaluate {
        location: Location,
        #[source]
        error: hcl::eval::Error,
    },
    #[error("Only objects can be written as documents")]
    NotAnObject,
    #[error("Root key `{0}` is not a valid identifier")]
    InvalidRootKey(String),
    #[error("Unable to format document")]
    Format(#[from] hcl::Error),
    #[error("Document {0} could not be read")]
    Unavailable(String),
}

/// Parses a document without a known source
pub fn parse(text: &str) -> Result<Value, DocumentError> {
    parse_with_source(text, None)
}

/// Parses a document and records `source` in every [Location]
pub fn parse_with_source(text: &str, source: Option<&str>) -> Result<Value, DocumentError> {
    tracing::trace!(source = source.unwrap_or("<inline>"), "parsing document");
    let body = hcl_edit::parser::parse_body(text).map_err(|error| DocumentError::Syntax {
        source_name: source.unwrap_or("<inline>").to_string(),
        error,
    })?;

    let positions = Positions::new(text, source);
    let mut root = Object::new();
    read_body(&body, &positions, &mut root)?;
    Ok(Value::Object(root, positions.at(Some(0..0))))
}

fn read_body(body: &Body, positions: &Positions, target: &mut Object) -> Result<(), DocumentError> {
    for structure in body.iter() {
        match structure {
            Structure::Attribute(attribute) => read_attribute(attribute, positions, target)?,
            Structure::Block(block) => read_block(block, positions, target)?,
        }
    }
    Ok(())
}

fn read_attribute(
    attribute: &Attribute,
    positions: &Positions,
    target: &mut Object,
) -> Result<(), DocumentError> {
    let key = attribute.key.value().as_str().to_string();
    let location = positions.at(attribute.span());

    if let Some(decimal) = decimal_literal(&attribute.value) {
        insert(target, key, Value::Literal(Literal::Decimal(decimal), location));
        return Ok(());
    }

    let expression: hcl::Expression = attribute.value.clone().into();
    let evaluated = expression
        .evaluate(&hcl::eval::Context::new())
        .map_err(|error| DocumentError::Evaluate {
            location: location.clone(),
            error,
        })?;

    match from_hcl(evaluated, &location) {
        Some(value) => insert(target, key, value),
        None => tracing::warn!(%location, key = %key, "null value skipped"),
    }
    Ok(())
}

/// A number literal written with a fraction or an exponent
///
/// hcl stores integral floats such as `1e20` as (saturated) integers, the source text keeps them
/// decimal.
fn decimal_literal(expression: &hcl_edit::expr::Expression) -> Option<f64> {
    let hcl_edit::expr::Expression::Number(number) = expression else {
        return None;
    };
    let repr: String = number.as_repr()?.split_whitespace().collect();
    if !repr.contains(|c| matches!(c, '.' | 'e' | 'E')) {
        return None;
    }
    repr.parse().ok()
}

fn read_block(
    block: &Block,
    positions: &Positions,
    target: &mut Object,
) -> Result<(), DocumentError> {
    let location = positions.at(block.span());

    let mut body = Object::new();
    read_body(&block.body, positions, &mut body)?;

    // innermost label holds the body, wrap outwards up to the identifier
    let mut value = Value::Object(body, location.clone());
    for label in block.labels.iter().rev() {
        let mut wrapper = Object::new();
        wrapper.insert(label.as_str().to_string(), value);
        value = Value::Object(wrapper, location.clone());
    }

    insert(target, block.ident.value().as_str().to_string(), value);
    Ok(())
}

fn insert(target: &mut Object, key: String, value: Value) {
    match target.get_mut(&key) {
        Some(existing) if existing.is_object() && value.is_object() => existing.combine(value),
        Some(existing) => {
            tracing::debug!(key = %key, location = %value.location(), "duplicate key replaced");
            *existing = value;
        }
        None => {
            target.insert(key, value);
        }
    }
}

fn from_hcl(value: hcl::Value, location: &Location) -> Option<Value> {
    let literal = match value {
        hcl::Value::Null => return None,
        hcl::Value::Bool(b) => Literal::Boolean(b),
        hcl::Value::Number(n) => match n.as_i64() {
            Some(int) if !n.is_f64() => Literal::Integer(int),
            _ => Literal::Decimal(n.as_f64()?),
        },
        hcl::Value::String(s) => Literal::String(s),
        hcl::Value::Array(array) => {
            let object = array
                .into_iter()
                .filter_map(|element| from_hcl(element, location))
                .enumerate()
                .map(|(index, element)| (index.to_string(), element))
                .collect();
            return Some(Value::Object(object, location.clone()));
        }
        hcl::Value::Object(map) => {
            let object = map
                .into_iter()
                .filter_map(|(key, element)| from_hcl(element, location).map(|v| (key, v)))
                .collect();
            return Some(Value::Object(object, location.clone()));
        }
    };
    Some(Value::Literal(literal, location.clone()))
}

/// Byte offset to line/column translation
struct Positions<'t> {
    text: &'t str,
    source: Option<Arc<str>>,
}

impl<'t> Positions<'t> {
    fn new(text: &'t str, source: Option<&str>) -> Self {
        Self {
            text,
            source: source.map(Arc::from),
        }
    }

    fn at(&self, span: Option<std::ops::Range<usize>>) -> Location {
        let offset = span.map(|range| range.start).unwrap_or(0);
        let before = self.text.get(..offset).unwrap_or(self.text);
        let line = before.matches('\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map(|tail| tail.chars().count() + 1)
            .unwrap_or(1);
        Location::new(self.source.clone(), line, column)
    }
}

/// Writes an object tree as hcl text
///
/// Objects whose keys are all valid identifiers are written as blocks, other objects as object
/// expressions with quoted keys. The root must be an object whose keys are identifiers.
pub fn to_text(value: &Value) -> Result<String, DocumentError> {
    let object = value.as_object().ok_or(DocumentError::NotAnObject)?;
    let mut body = hcl::Body::builder();
    for (key, child) in object {
        if !is_identifier(key) {
            return Err(DocumentError::InvalidRootKey(key.clone()));
        }
        body = match child {
            Value::Object(children, _) if children.keys().all(|k| is_identifier(k)) => {
                body.add_block(to_block(key, children))
            }
            _ => body.add_attribute(hcl::Attribute::new(
                hcl::Identifier::unchecked(key),
                to_expression(child),
            )),
        };
    }
    Ok(hcl::format::to_string(&body.build())?)
}

fn to_block(key: &str, children: &Object) -> hcl::Block {
    let mut block = hcl::Block::builder(hcl::Identifier::unchecked(key));
    for (child_key, child) in children {
        block = match child {
            Value::Object(grandchildren, _) if grandchildren.keys().all(|k| is_identifier(k)) => {
                block.add_block(to_block(child_key, grandchildren))
            }
            _ => block.add_attribute(hcl::Attribute::new(
                hcl::Identifier::unchecked(child_key),
                to_expression(child),
            )),
        };
    }
    block.build()
}

fn to_expression(value: &Value) -> hcl::Expression {
    match value {
        Value::Literal(Literal::Boolean(b), _) => hcl::Expression::Bool(*b),
        Value::Literal(Literal::Integer(i), _) => hcl::Expression::Number((*i).into()),
        // integral decimals would come back as integers
        Value::Literal(Literal::Decimal(d), _) if d.is_finite() && d.fract() == 0.0 => {
            hcl::Expression::Raw(hcl::expr::RawExpression::new(format!("{d:e}")))
        }
        Value::Literal(Literal::Decimal(d), _) => match hcl::Number::from_f64(*d) {
            Some(number) => hcl::Expression::Number(number),
            None => {
                tracing::warn!(value = d, "non-finite decimal written as string");
                hcl::Expression::String(d.to_string())
            }
        },
        Value::Literal(Literal::String(s), _) => hcl::Expression::String(s.clone()),
        Value::Object(object, _) => hcl::Expression::Object(
            object
                .iter()
                .map(|(key, child)| {
                    (
                        hcl::ObjectKey::Expression(hcl::Expression::String(key.clone())),
                        to_expression(child),
                    )
                })
                .collect(),
        ),
    }
}

fn is_identifier(key: &str) -> bool {
    hcl::Identifier::new(key).is_ok()
}

/// Utility macro to parse a [Value] from hcl text
///
/// ```
/// # use assetry::document;
/// let unit = document!("hp = 80");
/// assert!(unit.contains_key("hp"));
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use assetry::document;
/// document!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! document {
    { $source:expr => $expr:expr } => {
        $crate::document::parse_with_source($expr, Some($source)).expect("document must parse")
    };
    { $expr:expr } => {
        $crate::document::parse($expr).expect("document must parse")
    };
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn attributes_and_blocks() {
        let doc = document! {r#"
        hp = 80
        name = "tank"
        armor = 2.5
        tracked = true

        weapon laser {
          damage = 12
          designation = "${"heavy"} laser"
        }
        "#};

        assert_eq!(doc.get("hp"), Some(&Value::from(80i64)));
        assert_eq!(doc.get("name"), Some(&Value::from("tank")));
        assert_eq!(doc.get("armor"), Some(&Value::from(2.5)));
        assert_eq!(doc.get("tracked"), Some(&Value::from(true)));
        assert_eq!(
            doc.get_path(&["weapon", "laser", "damage"]),
            Some(&Value::from(12i64))
        );
        assert_eq!(
            doc.get_path(&["weapon", "laser", "designation"]),
            Some(&Value::from("heavy laser"))
        );
    }

    #[test]
    fn arrays_become_indexed_objects() {
        let doc = document!(r#"wheels = ["front", "rear"]"#);
        let wheels = doc.get("wheels").unwrap();

        assert_eq!(wheels.get("0"), Some(&Value::from("front")));
        assert_eq!(wheels.get("1"), Some(&Value::from("rear")));
    }

    #[test]
    fn repeated_blocks_combine() {
        let doc = document! {r#"
        turret { speed = 1 }
        turret { range = 20 }
        "#};

        let turret = doc.get("turret").unwrap().as_object().unwrap();
        assert_eq!(turret.len(), 2);
    }

    #[test]
    fn locations_point_at_structures() {
        let doc = document!("unit.hcl" => "hp = 80\nspeed = 5\n");

        let hp = doc.get("hp").unwrap().location();
        let speed = doc.get("speed").unwrap().location();
        assert_eq!(speed.source.as_deref(), Some("unit.hcl"));
        assert_eq!(hp.line, 1);
        assert_eq!(speed.line, 2);
    }

    #[test]
    fn syntax_error_names_source() {
        let err = parse_with_source("not = valid = hcl", Some("broken.hcl")).unwrap_err();
        assert!(err.to_string().contains("broken.hcl"));
    }

    #[test]
    fn round_trip() {
        let doc = document! {r#"
        Base = "unit-base"
        hp = 80
        ratio = 0.25
        enabled = false
        tags = ["a", "b"]

        weapon "heavy laser" {
          damage = 12
          mounts = { front = 1, rear = 2 }
        }
        "#};

        let text = to_text(&doc).unwrap();
        assert_eq!(parse(&text).unwrap(), doc);
    }

    #[test]
    fn decimals_are_not_truncated() {
        let doc = document!("huge = 1e20\nvast = 1.5e300\nhalf = -0.5\nwhole = 2.0\ncount = 7");

        assert_eq!(doc.get("huge"), Some(&Value::from(1e20)));
        assert_eq!(doc.get("vast"), Some(&Value::from(1.5e300)));
        assert_eq!(doc.get("half"), Some(&Value::from(-0.5)));
        assert_eq!(doc.get("whole"), Some(&Value::from(2.0)));
        assert_eq!(doc.get("count"), Some(&Value::from(7i64)));

        let text = to_text(&doc).unwrap();
        assert!(!text.contains("9223372036854775807"), "{text}");
        assert_eq!(parse(&text).unwrap(), doc);
    }

    #[test]
    fn evaluation_errors_keep_their_location() {
        let err = parse("a = 1\nb = missing_variable").unwrap_err();
        assert!(matches!(
            err,
            DocumentError::Evaluate { ref location, .. } if location.line == 2
        ));
    }

    #[test]
    fn literal_root_cannot_be_written() {
        assert!(matches!(
            to_text(&Value::from(1i64)),
            Err(DocumentError::NotAnObject)
        ));
    }
}
