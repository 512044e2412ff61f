use chrono::{SecondsFormat, Utc};
use env_logger::{Builder, Env};
use log::kv::{self, Key, Source, VisitSource};
use log::Record;
use serde_json::{Map, Value};
use std::io::Write;

use crate::config::LogFormat;

/// Installs the global logger. `RUST_LOG` overrides the default `info` filter.
pub fn init(format: LogFormat) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if format == LogFormat::Json {
        builder.format(|buf, record| writeln!(buf, "{}", json_line(record)));
    }
    builder.init();
}

/// Renders a record as one JSON object, with its key-values as top-level fields.
fn json_line(record: &Record) -> Value {
    let mut fields = Map::new();
    fields.insert(
        "timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    fields.insert(
        "level".to_string(),
        Value::String(record.level().to_string()),
    );
    fields.insert(
        "target".to_string(),
        Value::String(record.target().to_string()),
    );
    fields.insert(
        "message".to_string(),
        Value::String(record.args().to_string()),
    );
    let _ = record.key_values().visit(&mut Fields(&mut fields));
    Value::Object(fields)
}

struct Fields<'a>(&'a mut Map<String, Value>);

impl<'kvs> VisitSource<'kvs> for Fields<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        let value = match value.to_u64() {
            Some(n) => Value::from(n),
            None => Value::String(value.to_string()),
        };
        self.0.insert(key.as_str().to_string(), value);
        Ok(())
    }
}
