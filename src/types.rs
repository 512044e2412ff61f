use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// A stored crossing event: the client's payload plus server-assigned metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub id: String,
    #[serde(serialize_with = "iso8601_millis")]
    pub received_at: DateTime<Utc>,
    pub data: Value,
}

impl VehicleRecord {
    /// Wraps `data` under a freshly generated id, stamped with the current time.
    pub fn new(data: Value) -> Self {
        VehicleRecord {
            id: next_id(),
            received_at: Utc::now(),
            data,
        }
    }
}

/// Returns a random v4 UUID in hyphenated form.
pub fn next_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

fn iso8601_millis<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub message: &'static str,
    pub id: String,
}

/// Client-visible error envelope. Exactly one of `message` or `details` is set.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn message(error: &'static str, message: impl Into<String>) -> Self {
        ErrorBody {
            error,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn details(error: &'static str, details: impl Into<String>) -> Self {
        ErrorBody {
            error,
            message: None,
            details: Some(details.into()),
        }
    }
}
