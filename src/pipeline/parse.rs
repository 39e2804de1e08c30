//! Response parsing: raw model text → [`ExtractedData`].
//!
//! The prompt asks for a bare JSON object, but models still wrap it in code
//! fences, prepend a BOM or answer `null` for fields they could not read. A
//! few deterministic cleanup rules run before `serde_json` sees the text:
//!
//! 1. Strip invisible Unicode (BOM, zero-width spaces)
//! 2. Strip an outer ```` ```json ```` fence
//! 3. Drop `null` members so field defaults apply
//! 4. Coerce scalars to the field type: numbers become strings in text
//!    fields, numeric strings become numbers and blanks are dropped in
//!    numeric fields
//!
//! An empty answer is [`Pdf2PoError::EmptyResponse`]; anything that is not
//! the ExtractedData shape is [`Pdf2PoError::InvalidResponse`].

use crate::error::Pdf2PoError;
use crate::model::ExtractedData;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::warn;

/// Parse the model's answer into extraction data.
pub fn parse_extraction(raw: &str) -> Result<ExtractedData, Pdf2PoError> {
    let cleaned = remove_invisible_chars(raw);
    let cleaned = strip_json_fences(cleaned.trim());
    if cleaned.trim().is_empty() {
        return Err(Pdf2PoError::EmptyResponse);
    }

    let mut value: Value =
        serde_json::from_str(cleaned.trim()).map_err(|e| Pdf2PoError::InvalidResponse {
            detail: e.to_string(),
        })?;
    drop_nulls(&mut value);
    coerce_scalars(&mut value);

    let mut data: ExtractedData =
        serde_json::from_value(value).map_err(|e| Pdf2PoError::InvalidResponse {
            detail: e.to_string(),
        })?;

    if !(0.0..=1.0).contains(&data.confidence) {
        warn!(
            "Model reported confidence {} outside [0, 1]; clamping",
            data.confidence
        );
        data.confidence = if data.confidence.is_nan() {
            0.0
        } else {
            data.confidence.clamp(0.0, 1.0)
        };
    }

    Ok(data)
}

// ── Rule 1: Strip invisible Unicode ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}

// ── Rule 2: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```\s*$").unwrap());

fn strip_json_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Drop null members ───────────────────────────────────────────────

fn drop_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(drop_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(drop_nulls),
        _ => {}
    }
}

// ── Rule 4: Coerce scalars ──────────────────────────────────────────────────

const NUMERIC_ORDER_FIELDS: &[&str] = &["currencyRate", "currencyUnit"];
const NUMERIC_ROW_FIELDS: &[&str] = &["orderedQuantity", "remainingOrderedQuantity", "price"];

fn coerce_scalars(value: &mut Value) {
    let Value::Object(root) = value else {
        return;
    };
    coerce_number(root, "confidence");
    let Some(Value::Object(order)) = root.get_mut("purchaseOrder") else {
        return;
    };
    coerce_fields(order, NUMERIC_ORDER_FIELDS);
    if let Some(Value::Array(rows)) = order.get_mut("rows") {
        for row in rows.iter_mut() {
            if let Value::Object(row) = row {
                coerce_fields(row, NUMERIC_ROW_FIELDS);
            }
        }
    }
}

fn coerce_fields(object: &mut Map<String, Value>, numeric: &[&str]) {
    let keys: Vec<String> = object.keys().cloned().collect();
    for key in keys {
        if numeric.contains(&key.as_str()) {
            coerce_number(object, &key);
        } else if key != "rows" {
            let text = match object.get(&key) {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => continue,
            };
            object.insert(key, Value::String(text));
        }
    }
}

/// Turn a string member into a number, or drop it when it is blank or not
/// numeric so the field default applies.
fn coerce_number(object: &mut Map<String, Value>, key: &str) {
    let Some(Value::String(text)) = object.get(key).cloned() else {
        return;
    };
    let normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    match normalized.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => {
            object.insert(key.to_string(), Value::Number(n));
        }
        None => {
            if !normalized.is_empty() {
                warn!("Dropping non-numeric {key} value {text:?}");
            }
            object.remove(key);
        }
    }
}
