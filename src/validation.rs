use serde_json::Value;

/// Fields every crossing payload must carry, in the order they are reported.
pub const CROSSING_FIELDS: [&str; 16] = [
    "crossingIndexCode",
    "datetime",
    "plate",
    "plate_province",
    "total_axles",
    "total_length",
    "total_width",
    "outcome",
    "total_weight",
    "weight_limit",
    "speed",
    "vehicle_type",
    "vehicle_class",
    "lane",
    "overview_image",
    "plate_image",
];

/// Checks field presence only. `null` counts as present; a non-object
/// payload is missing everything.
pub fn validate(payload: &Value) -> Result<(), Vec<&'static str>> {
    let missing: Vec<&'static str> = match payload.as_object() {
        Some(map) => CROSSING_FIELDS
            .iter()
            .copied()
            .filter(|field| !map.contains_key(*field))
            .collect(),
        None => CROSSING_FIELDS.to_vec(),
    };
    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing)
    }
}

#[cfg(test)]
pub(crate) fn sample_payload() -> Value {
    serde_json::json!({
        "crossingIndexCode": "A1",
        "datetime": "2024-01-01T00:00:00Z",
        "plate": "AB-123",
        "plate_province": "BKK",
        "total_axles": 2,
        "total_length": 5,
        "total_width": 2,
        "outcome": "pass",
        "total_weight": 3000,
        "weight_limit": 5000,
        "speed": 60,
        "vehicle_type": "truck",
        "vehicle_class": "2",
        "lane": "1",
        "overview_image": "",
        "plate_image": ""
    })
}
