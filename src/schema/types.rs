//! Schema document types and the closed enumerations they compile into.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// Instrument kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MetricKind {
    #[strum(to_string = "counter", serialize = "countervec")]
    Counter,
    #[strum(to_string = "gauge", serialize = "gaugevec")]
    Gauge,
}

/// How the raw device value is coerced into a sample value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FieldType {
    /// Decimal number.
    #[default]
    Int,
    /// RouterOS duration, exported in seconds.
    Time,
    /// `true`/`yes` → 1, anything else → 0.
    Bool,
    /// Always 1; the device payload is ignored.
    Const,
}

/// Update applied to the instrument on every record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Operation {
    #[default]
    Set,
    Add,
    Sub,
    Inc,
    Dec,
    SetToCurrentTime,
}

impl Operation {
    /// Whether a counter can express this operation.
    pub fn counter_compatible(self) -> bool {
        matches!(self, Self::Set | Self::Add | Self::Inc)
    }
}

/// Filter clauses as written in a document: either a map or `name=value`
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FilterDocument {
    Map(#[serde(deserialize_with = "scalar_map")] BTreeMap<String, String>),
    List(Vec<String>),
}

/// One resource schema document as read from YAML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub subsystem: String,
    #[serde(default)]
    pub resource_path: String,
    #[serde(default)]
    pub resource_filter: Option<FilterDocument>,
    /// Label templates applied to every metric.
    #[serde(default, deserialize_with = "scalar_map")]
    pub global_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: Vec<MetricDocument>,
}

/// One metric definition as read from YAML.
///
/// Kind, field type and operation stay strings here so that unknown values
/// are reported as schema diagnostics rather than YAML errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub field_type: Option<String>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub reset: bool,
}

/// Deserialize a map whose values may be any YAML scalar (`true`, `1`,
/// `"text"`), keeping them as strings.
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Null => String::new(),
                other => {
                    return Err(D::Error::custom(format!(
                        "value of '{key}' must be a scalar, got {other:?}"
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}
