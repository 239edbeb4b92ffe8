//! Canonical text encoding of claim and qualifier values.
//!
//! The `text` of an [`EncodedValue`] depends only on the datatype and the
//! raw value, so the same input always hashes to the same identifier.

use crate::models::{Snak, SnakKind};
use serde_json::Value;

/// Canonical text plus the decomposed sub-fields of one value.
/// Sub-fields that do not apply to the value's datatype stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedValue {
    pub text: String,
    pub value_type: String,
    pub magnitude: Option<String>,
    pub unit: Option<String>,
    pub date: Option<String>,
    pub item: Option<String>,
    pub lower_bound: Option<String>,
    pub upper_bound: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub precision: Option<String>,
    pub calendar: Option<String>,
    pub entity_type: Option<String>,
}

impl EncodedValue {
    fn sentinel(kind: SnakKind) -> Self {
        Self {
            text: kind.as_str().to_string(),
            value_type: kind.as_str().to_string(),
            ..Self::default()
        }
    }
}

/// Encodes a snak whose kind has already been resolved.
///
/// A `value` snak without a datavalue encodes like an empty value of its datatype.
pub fn encode_snak(kind: SnakKind, snak: &Snak) -> EncodedValue {
    match kind {
        SnakKind::SomeValue | SnakKind::NoValue => EncodedValue::sentinel(kind),
        SnakKind::Value => match &snak.datavalue {
            Some(datavalue) => {
                let mut encoded = encode_value(&snak.datatype, &datavalue.value);
                encoded.value_type = datavalue.value_type.clone();
                encoded
            }
            None => encode_value(&snak.datatype, &Value::Null),
        },
    }
}

/// Encodes a raw datavalue according to its Wikibase datatype tag.
pub fn encode_value(datatype: &str, value: &Value) -> EncodedValue {
    if datatype.starts_with("wikibase") {
        return encode_entity(value);
    }
    match datatype {
        "quantity" => encode_quantity(value),
        "globe-coordinate" => encode_coordinate(value),
        "time" => encode_time(value),
        "monolingualtext" => encode_monolingual(value),
        _ => encode_other(value),
    }
}

fn encode_entity(value: &Value) -> EncodedValue {
    let id = str_field(value, "id").unwrap_or_default().to_string();
    EncodedValue {
        text: id.clone(),
        item: Some(id),
        entity_type: str_field(value, "entity-type").map(str::to_string),
        ..EncodedValue::default()
    }
}

fn encode_quantity(value: &Value) -> EncodedValue {
    let amount = str_field(value, "amount").unwrap_or_default();
    let lower = non_empty(str_field(value, "lowerBound"));
    let upper = non_empty(str_field(value, "upperBound"));

    let mut text = amount.to_string();
    if lower.is_some() || upper.is_some() {
        text.push('[');
        text.push_str(lower.unwrap_or_default());
        text.push(',');
        text.push_str(upper.unwrap_or_default());
        text.push(']');
    }

    // Single-character unit codes ("1" = dimensionless) are dropped, and the
    // "undefined" unit is recorded but never appended.
    let unit = str_field(value, "unit")
        .filter(|unit| unit.len() > 1)
        .map(|unit| last_segment(unit).to_string());
    if let Some(unit) = unit.as_deref() {
        if unit != "undefined" {
            text.push_str(unit);
        }
    }

    EncodedValue {
        text,
        magnitude: Some(amount.to_string()),
        unit,
        lower_bound: lower.map(str::to_string),
        upper_bound: upper.map(str::to_string),
        ..EncodedValue::default()
    }
}

fn encode_coordinate(value: &Value) -> EncodedValue {
    let latitude = scalar_field(value, "latitude").unwrap_or_default();
    let longitude = scalar_field(value, "longitude").unwrap_or_default();
    // The globe is not retained.
    EncodedValue {
        text: format!("@{}/{}", latitude, longitude),
        latitude: Some(latitude),
        longitude: Some(longitude),
        precision: scalar_field(value, "precision"),
        ..EncodedValue::default()
    }
}

fn encode_time(value: &Value) -> EncodedValue {
    let raw = str_field(value, "time").unwrap_or_default();
    // The leading character is always the sign slot, even when it holds a digit.
    let mut chars = raw.chars();
    let marker = if chars.next() == Some('-') { "^-" } else { "^" };
    let rest = chars.as_str();
    let precision = scalar_field(value, "precision").unwrap_or_default();

    let mut date = String::with_capacity(marker.len() + rest.len());
    date.push_str(marker);
    date.push_str(rest);

    EncodedValue {
        text: format!("{}/{}", date, precision),
        date: Some(date),
        precision: Some(precision),
        calendar: str_field(value, "calendarmodel").map(|url| last_segment(url).to_string()),
        ..EncodedValue::default()
    }
}

fn encode_monolingual(value: &Value) -> EncodedValue {
    let text = str_field(value, "text").unwrap_or_default();
    let language = str_field(value, "language").unwrap_or_default();
    EncodedValue {
        text: stringify_lang(text, language),
        ..EncodedValue::default()
    }
}

fn encode_other(value: &Value) -> EncodedValue {
    let text = match value {
        Value::String(s) => stringify(s),
        Value::Null => stringify(""),
        other => stringify(&other.to_string()),
    };
    EncodedValue {
        text,
        ..EncodedValue::default()
    }
}

/// Double-quoted KGTK string literal
pub fn stringify(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    escape_into(&mut out, s, '"');
    out.push('"');
    out
}

/// Single-quoted KGTK language-qualified string, `'text'@lang`.
/// Falls back to a plain string when the language is empty.
pub fn stringify_lang(s: &str, language: &str) -> String {
    if language.is_empty() {
        return stringify(s);
    }
    let mut out = String::with_capacity(s.len() + language.len() + 3);
    out.push('\'');
    escape_into(&mut out, s, '\'');
    out.push('\'');
    out.push('@');
    out.push_str(language);
    out
}

fn escape_into(out: &mut String, s: &str, quote: char) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '|' => out.push_str("\\|"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

/// Trailing path segment of a URL such as a unit or calendar model
pub fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Integers keep their JSON spelling and strings pass through. Floats go
/// through [`float_text`].
fn scalar_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Number(n) if n.is_f64() => n.as_f64().map(float_text),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Shortest round-trip spelling of a float. Magnitudes below 1e-4 or from
/// 1e16 up use exponent form with a signed exponent of at least two digits
/// (`1e-05`, `1e+21`). Everything else is positional with at least one
/// fractional digit (`40.7`, `-74.0`).
pub fn float_text(f: f64) -> String {
    if !f.is_finite() {
        return f.to_string();
    }
    let sci = format!("{:e}", f);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if f != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }
    let mut text = f.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataValue;
    use serde_json::json;

    fn value_snak(datatype: &str, value: Value) -> Snak {
        Snak {
            snaktype: "value".into(),
            property: "P1".into(),
            hash: "abc".into(),
            datatype: datatype.into(),
            datavalue: Some(DataValue {
                value,
                value_type: "test".into(),
            }),
        }
    }

    #[test]
    fn quantity_with_bounds_and_unit() {
        let encoded = encode_value(
            "quantity",
            &json!({"amount": "12", "lowerBound": "10", "upperBound": "15",
                    "unit": "http://www.wikidata.org/entity/kilogram"}),
        );
        assert_eq!(encoded.text, "12[10,15]kilogram");
        assert_eq!(encoded.magnitude.as_deref(), Some("12"));
        assert_eq!(encoded.lower_bound.as_deref(), Some("10"));
        assert_eq!(encoded.upper_bound.as_deref(), Some("15"));
        assert_eq!(encoded.unit.as_deref(), Some("kilogram"));
    }

    #[test]
    fn quantity_without_bounds() {
        let encoded = encode_value(
            "quantity",
            &json!({"amount": "+3", "unit": "http://www.wikidata.org/entity/Q11573"}),
        );
        assert_eq!(encoded.text, "+3Q11573");
        assert_eq!(encoded.lower_bound, None);
    }

    // Known limitation: dimensionless ("1") and "undefined" units leave no
    // trace in the text, so they cannot be told apart from each other.
    #[test]
    fn quantity_unit_known_limitation() {
        let dimensionless = encode_value("quantity", &json!({"amount": "5", "unit": "1"}));
        assert_eq!(dimensionless.text, "5");
        assert_eq!(dimensionless.unit, None);

        let undefined = encode_value(
            "quantity",
            &json!({"amount": "5", "unit": "http://example.org/undefined"}),
        );
        assert_eq!(undefined.text, "5");
        assert_eq!(undefined.unit.as_deref(), Some("undefined"));
    }

    #[test]
    fn positive_time() {
        let encoded = encode_value(
            "time",
            &json!({"time": "+1950-01-01T00:00:00Z", "precision": 9,
                    "calendarmodel": "http://www.wikidata.org/entity/Q1985727"}),
        );
        assert_eq!(encoded.text, "^1950-01-01T00:00:00Z/9");
        assert_eq!(encoded.date.as_deref(), Some("^1950-01-01T00:00:00Z"));
        assert_eq!(encoded.precision.as_deref(), Some("9"));
        assert_eq!(encoded.calendar.as_deref(), Some("Q1985727"));
    }

    #[test]
    fn negative_time() {
        let encoded = encode_value(
            "time",
            &json!({"time": "-0100-01-01T00:00:00Z", "precision": 9}),
        );
        assert!(encoded.text.starts_with("^-"));
        assert_eq!(encoded.text, "^-0100-01-01T00:00:00Z/9");
        assert_eq!(encoded.calendar, None);
    }

    #[test]
    fn unsigned_time_loses_its_first_character() {
        let encoded = encode_value(
            "time",
            &json!({"time": "1950-01-01T00:00:00Z", "precision": 9}),
        );
        assert_eq!(encoded.text, "^950-01-01T00:00:00Z/9");
        assert_eq!(encode_value("time", &json!({})).text, "^/");
    }

    #[test]
    fn globe_coordinate() {
        let encoded = encode_value(
            "globe-coordinate",
            &json!({"latitude": 40.7, "longitude": -74.0, "precision": 0.1,
                    "globe": "http://www.wikidata.org/entity/Q2"}),
        );
        assert_eq!(encoded.text, "@40.7/-74.0");
        assert_eq!(encoded.latitude.as_deref(), Some("40.7"));
        assert_eq!(encoded.longitude.as_deref(), Some("-74.0"));
        assert_eq!(encoded.precision.as_deref(), Some("0.1"));
    }

    #[test]
    fn tiny_and_huge_coordinates_use_exponent_form() {
        let encoded = encode_value(
            "globe-coordinate",
            &json!({"latitude": 0.00001, "longitude": 1e21, "precision": 2.7777777777778e-5}),
        );
        assert_eq!(encoded.text, "@1e-05/1e+21");
        assert_eq!(encoded.precision.as_deref(), Some("2.7777777777778e-05"));

        let whole = encode_value("globe-coordinate", &json!({"latitude": 52, "longitude": 0.0001}));
        assert_eq!(whole.text, "@52/0.0001");
    }

    #[test]
    fn float_spelling() {
        assert_eq!(float_text(40.7), "40.7");
        assert_eq!(float_text(-74.0), "-74.0");
        assert_eq!(float_text(0.0), "0.0");
        assert_eq!(float_text(1.5e-7), "1.5e-07");
        assert_eq!(float_text(1e16), "1e+16");
        assert_eq!(float_text(1e15), "1000000000000000.0");
        assert_eq!(float_text(1e100), "1e+100");
    }

    #[test]
    fn entity_reference() {
        let encoded = encode_value(
            "wikibase-item",
            &json!({"entity-type": "item", "numeric-id": 5, "id": "Q5"}),
        );
        assert_eq!(encoded.text, "Q5");
        assert_eq!(encoded.item.as_deref(), Some("Q5"));
        assert_eq!(encoded.entity_type.as_deref(), Some("item"));

        let property = encode_value("wikibase-property", &json!({"entity-type": "property", "id": "P17"}));
        assert_eq!(property.text, "P17");
        assert_eq!(property.entity_type.as_deref(), Some("property"));
    }

    #[test]
    fn monolingual_text() {
        let encoded = encode_value(
            "monolingualtext",
            &json!({"text": "l'homme", "language": "fr"}),
        );
        assert_eq!(encoded.text, r"'l\'homme'@fr");
    }

    #[test]
    fn other_values_are_quoted_and_escaped() {
        let encoded = encode_value("external-id", &json!("a|b\t\"c\""));
        assert_eq!(encoded.text, r#""a\|b\t\"c\"""#);
    }

    #[test]
    fn missing_fields_yield_empty_subfields() {
        let encoded = encode_value("quantity", &json!({}));
        assert_eq!(encoded.text, "");
        assert_eq!(encoded.magnitude.as_deref(), Some(""));

        let coord = encode_value("globe-coordinate", &json!({}));
        assert_eq!(coord.text, "@/");
    }

    #[test]
    fn sentinel_snaks() {
        let mut snak = value_snak("wikibase-item", Value::Null);
        snak.snaktype = "novalue".into();
        snak.datavalue = None;
        let encoded = encode_snak(SnakKind::NoValue, &snak);
        assert_eq!(encoded.text, "novalue");
        assert_eq!(encoded.item, None);

        let some = encode_snak(SnakKind::SomeValue, &snak);
        assert_eq!(some.text, "somevalue");
        assert_eq!(some.value_type, "somevalue");
    }

    #[test]
    fn value_snak_carries_value_type() {
        let snak = value_snak("string", json!("hello"));
        let encoded = encode_snak(SnakKind::Value, &snak);
        assert_eq!(encoded.text, "\"hello\"");
        assert_eq!(encoded.value_type, "test");
    }

    #[test]
    fn text_is_deterministic() {
        let value = json!({"amount": "7", "unit": "http://x/metre"});
        assert_eq!(
            encode_value("quantity", &value).text,
            encode_value("quantity", &value).text
        );
    }
}
