//! Map an untrusted parsed object onto the canonical [`WaterAnalysisRecord`].
//!
//! The model is asked for camelCase keys but regularly answers in snake_case,
//! uses the field names of older prompt versions (`params`, `paramCode`,
//! `pdk`, `modelAnalysis`), or emits numbers as strings. Each canonical field
//! has an explicit ordered alias list below; the first alias carrying a usable
//! value wins. No reflection, no failure path: anything missing or malformed
//! becomes the field's default.

use crate::record::{WaterAnalysisRecord, WaterParameter};
use serde_json::{Map, Value};

// ── Alias tables ─────────────────────────────────────────────────────────────

const BLANK_NUMBER: &[&str] = &["blankNumber", "blank_number"];
const ANALYSIS_DATE: &[&str] = &["analysisDate", "analysis_date"];
const CUSTOMER_NAME: &[&str] = &["customerName", "customer_name"];
const CUSTOMER_PHONE: &[&str] = &["customerPhone", "customer_phone"];
const OBJECT_ADDRESS: &[&str] = &["objectAddress", "object_address"];
const INTAKE_TYPE: &[&str] = &["intakeType", "intake_type"];
const APPEARANCE: &[&str] = &["appearance"];
const SAMPLE_DATE: &[&str] = &["sampleDate", "sample_date"];
const TEST_DATE: &[&str] = &["testDate", "test_date"];
const PARAMETERS: &[&str] = &["parameters", "params"];
const NOTES: &[&str] = &["notes", "modelAnalysis", "model_analysis"];

const PARAM_NAME: &[&str] = &["name"];
const PARAM_VALUE: &[&str] = &["value"];
const PARAM_UNIT: &[&str] = &["unit"];
const PARAM_LIMIT: &[&str] = &["thresholdLimit", "threshold_limit", "pdk"];
const PARAM_CODE: &[&str] = &["code", "paramCode", "param_code"];

/// Build a canonical record from any JSON value.
///
/// Non-object input (null, arrays, primitives) yields the empty record.
pub fn normalize(parsed: &Value) -> WaterAnalysisRecord {
    let Some(obj) = parsed.as_object() else {
        return WaterAnalysisRecord::default();
    };

    let parameters = match first_present(obj, PARAMETERS) {
        Some(Value::Array(items)) => items.iter().map(normalize_parameter).collect(),
        _ => Vec::new(),
    };

    WaterAnalysisRecord {
        blank_number: text_field(obj, BLANK_NUMBER),
        analysis_date: text_field(obj, ANALYSIS_DATE),
        customer_name: text_field(obj, CUSTOMER_NAME),
        customer_phone: text_field(obj, CUSTOMER_PHONE),
        object_address: text_field(obj, OBJECT_ADDRESS),
        intake_type: text_field(obj, INTAKE_TYPE),
        appearance: text_field(obj, APPEARANCE),
        sample_date: text_field(obj, SAMPLE_DATE),
        test_date: text_field(obj, TEST_DATE),
        parameters,
        notes: text_field(obj, NOTES),
    }
}

fn normalize_parameter(item: &Value) -> WaterParameter {
    let Some(obj) = item.as_object() else {
        return WaterParameter::default();
    };

    WaterParameter {
        name: text_field(obj, PARAM_NAME),
        value: aliases(obj, PARAM_VALUE).find_map(coerce_f64).unwrap_or(0.0),
        unit: text_field(obj, PARAM_UNIT),
        threshold_limit: aliases(obj, PARAM_LIMIT).find_map(coerce_f64),
        code: text_field(obj, PARAM_CODE),
    }
}

// ── Coercion ─────────────────────────────────────────────────────────────────

fn aliases<'a>(
    obj: &'a Map<String, Value>,
    keys: &'static [&'static str],
) -> impl Iterator<Item = &'a Value> + 'a {
    keys.iter().filter_map(move |k| obj.get(*k))
}

/// First alias that is present and not `null`.
fn first_present<'a>(obj: &'a Map<String, Value>, keys: &'static [&'static str]) -> Option<&'a Value> {
    aliases(obj, keys).find(|v| !v.is_null())
}

/// First alias whose value coerces to a non-empty string, else `""`.
fn text_field(obj: &Map<String, Value>, keys: &'static [&'static str]) -> String {
    aliases(obj, keys)
        .filter_map(coerce_string)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Strings as-is, numbers in their JSON spelling, booleans as words.
/// Null, arrays and objects have no string form.
fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Finite numbers and numeric strings. Qualitative text such as `"<0.1"` is
/// not interpreted.
fn coerce_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
