use serde_json::{Map, Value};

/// Placeholder strings HubSpot portals commonly hold instead of a real value.
/// Compared case-insensitively.
pub const DISALLOWED_VALUES: &[&str] = &[
    "[not provided]",
    "placeholder",
    "[[unknown]]",
    "not set",
    "not provided",
    "unknown",
    "undefined",
    "n/a",
];

/// Marker HubSpot leaves in values that point at deleted records.
const DELETED_RECORD_MARKER: &str = "!$record";

/// Drops properties that carry no information: nulls, empty strings, and
/// placeholder or deleted-record strings.
pub fn filter_null_values(properties: Map<String, Value>) -> Map<String, Value> {
    properties
        .into_iter()
        .filter(|(_, value)| !is_blank(value))
        .collect()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) if s.is_empty() => true,
        Value::String(s) => {
            let lowered = s.to_lowercase();
            DISALLOWED_VALUES.contains(&lowered.as_str()) || lowered.contains(DELETED_RECORD_MARKER)
        }
        _ => false,
    }
}

/// Normalizes a provider property name into a payload key.
///
/// Lower-cases, strips a trailing `__c` (custom-field suffix), trims leading and
/// trailing underscores and collapses runs of underscores.
pub fn normalize_property_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = lowered.strip_suffix("__c").unwrap_or(&lowered);

    let mut normalized = String::with_capacity(stripped.len());
    for ch in stripped.trim_matches('_').chars() {
        if ch == '_' && normalized.ends_with('_') {
            continue;
        }
        normalized.push(ch);
    }
    normalized
}
