//! Read/write normalization between stored attributes and command values.

use std::fmt;

use serde_json::{Number, Value};

pub trait AttributeCodec: Send + Sync {
    fn read(&self, raw: Option<&Value>) -> Option<Value> {
        raw.cloned()
    }

    fn to_set(&self, input: Option<Value>) -> Option<Value> {
        input
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl AttributeCodec for IdentityCodec {}

#[derive(Debug, Clone)]
pub struct DefaultUnitCodec {
    unit: String,
}

impl DefaultUnitCodec {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }
}

impl AttributeCodec for DefaultUnitCodec {
    fn to_set(&self, input: Option<Value>) -> Option<Value> {
        input.map(|value| add_default_unit(value, &self.unit))
    }
}

// Mixed sides read as `None`.
#[derive(Debug, Clone, Default)]
pub struct BoxSidesCodec {
    unit: Option<String>,
}

impl BoxSidesCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(unit: impl Into<String>) -> Self {
        Self {
            unit: Some(unit.into()),
        }
    }
}

impl AttributeCodec for BoxSidesCodec {
    fn read(&self, raw: Option<&Value>) -> Option<Value> {
        single_value(raw?)
    }

    fn to_set(&self, input: Option<Value>) -> Option<Value> {
        match &self.unit {
            Some(unit) => input.map(|value| add_default_unit(value, unit)),
            None => input,
        }
    }
}

impl fmt::Debug for dyn AttributeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AttributeCodec")
    }
}

const SIDES: [&str; 4] = ["top", "right", "bottom", "left"];

fn single_value(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Object(map) => {
            let top = map.get(SIDES[0])?;
            SIDES[1..]
                .iter()
                .all(|side| map.get(*side) == Some(top))
                .then(|| top.clone())
        }
        _ => None,
    }
}

fn add_default_unit(value: Value, unit: &str) -> Value {
    let bare = match &value {
        Value::Number(n) => number_text(n),
        Value::String(s) if is_bare_number(s) => Some(s.clone()),
        _ => None,
    };
    match bare {
        Some(number) => Value::String(format!("{number}{unit}")),
        None => value,
    }
}

// Float numbers print in plain decimal form: `100.0` is "100" and `1e21` has no exponent.
fn number_text(n: &Number) -> Option<String> {
    if n.is_f64() {
        n.as_f64().filter(|f| f.is_finite()).map(|f| f.to_string())
    } else {
        Some(n.to_string())
    }
}

// "100.0" and "1e2" keep their spelling.
fn is_bare_number(s: &str) -> bool {
    s.parse::<f64>()
        .is_ok_and(|n| n.is_finite() && n.to_string() == s)
}

// `null`, `false`, `0` and `""` clear the attribute.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_unit_only_touches_bare_numbers() {
        let codec = DefaultUnitCodec::new("px");
        assert_eq!(codec.to_set(Some(json!(100))), Some(json!("100px")));
        assert_eq!(codec.to_set(Some(json!("42"))), Some(json!("42px")));
        assert_eq!(codec.to_set(Some(json!(1.5))), Some(json!("1.5px")));
        assert_eq!(codec.to_set(Some(json!("100px"))), Some(json!("100px")));
        assert_eq!(codec.to_set(Some(json!("50%"))), Some(json!("50%")));
        assert_eq!(codec.to_set(Some(json!("100.0"))), Some(json!("100.0")));
        assert_eq!(codec.to_set(Some(json!("auto"))), Some(json!("auto")));
        assert_eq!(codec.to_set(None), None);
    }

    #[test]
    fn default_unit_writes_whole_floats_without_a_fraction() {
        let codec = DefaultUnitCodec::new("px");
        assert_eq!(codec.to_set(Some(json!(100.0))), Some(json!("100px")));
        assert_eq!(codec.to_set(Some(json!(-2.0))), Some(json!("-2px")));
        assert_eq!(codec.to_set(Some(json!(0.25))), Some(json!("0.25px")));
        assert_eq!(
            codec.to_set(Some(json!(1e21))),
            Some(json!("1000000000000000000000px"))
        );
    }

    #[test]
    fn default_unit_leaves_reads_alone() {
        let codec = DefaultUnitCodec::new("em");
        assert_eq!(codec.read(Some(&json!("3em"))), Some(json!("3em")));
        assert_eq!(codec.read(None), None);
    }

    #[test]
    fn box_sides_collapses_uniform_objects() {
        let codec = BoxSidesCodec::new();
        let uniform = json!({ "top": "solid", "right": "solid", "bottom": "solid", "left": "solid" });
        let mixed = json!({ "top": "solid", "right": "dashed", "bottom": "solid", "left": "solid" });
        let partial = json!({ "top": "solid", "right": "solid" });

        assert_eq!(codec.read(Some(&uniform)), Some(json!("solid")));
        assert_eq!(codec.read(Some(&mixed)), None);
        assert_eq!(codec.read(Some(&partial)), None);
        assert_eq!(codec.read(Some(&json!("dotted"))), Some(json!("dotted")));
        assert_eq!(codec.read(Some(&json!(3))), None);
        assert_eq!(codec.read(None), None);
    }

    #[test]
    fn box_sides_with_unit_normalizes_writes() {
        let codec = BoxSidesCodec::with_unit("px");
        assert_eq!(codec.to_set(Some(json!(2))), Some(json!("2px")));
        assert_eq!(codec.to_set(Some(json!("thin"))), Some(json!("thin")));
        assert_eq!(BoxSidesCodec::new().to_set(Some(json!(2))), Some(json!(2)));
    }

    #[test]
    fn truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("0"), json!([]), json!({})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }
}
