//! Schema compilation and validation.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use super::error::SchemaError;
use super::types::{FieldType, FilterDocument, MetricDocument, MetricKind, Operation, SchemaDocument};
use crate::device::FilterClause;

/// One label template: a literal value or a `$field` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelTemplate {
    Literal(String),
    Field(String),
}

impl LabelTemplate {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('$') {
            Some(field) => Self::Field(field.to_string()),
            None => Self::Literal(raw.to_string()),
        }
    }
}

/// A validated metric definition with resolved labels.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMetric {
    /// Metric name without namespace/subsystem.
    pub name: String,
    pub kind: MetricKind,
    /// Source field; empty for `Const` metrics without a field.
    pub field: String,
    pub field_type: FieldType,
    pub operation: Operation,
    pub help: String,
    /// Clear the gauge before every poll.
    pub reset: bool,
    /// Label name → fixed value, baked into the instrument.
    pub const_labels: BTreeMap<String, String>,
    /// Label name → record field (or global variable) name.
    pub dynamic_labels: BTreeMap<String, String>,
}

impl CompiledMetric {
    /// Variable label names, in stable order.
    pub fn label_names(&self) -> Vec<&str> {
        self.dynamic_labels.keys().map(String::as_str).collect()
    }
}

/// A validated, immutable resource schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSchema {
    /// Schema name (file stem when loaded from disk).
    pub name: String,
    pub namespace: String,
    pub subsystem: String,
    pub resource_path: String,
    /// AND-combined equality filter.
    pub filter: Vec<FilterClause>,
    pub metrics: Vec<CompiledMetric>,
}

impl CompiledSchema {
    /// Fully qualified metric name: `namespace_subsystem_name`, skipping
    /// empty parts.
    pub fn fq_name(&self, metric: &CompiledMetric) -> String {
        fq_name(&self.namespace, &self.subsystem, &metric.name)
    }
}

fn fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

fn metric_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("failed to compile metric name regex")
    })
}

fn label_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("failed to compile label name regex")
    })
}

fn valid_label_name(name: &str) -> bool {
    label_name_regex().is_match(name) && !name.starts_with("__")
}

/// Compile a schema document.
///
/// Every problem in the document is collected; if there is at least one, the
/// whole schema is rejected with [`SchemaError::Invalid`].
pub fn compile(name: impl Into<String>, doc: SchemaDocument) -> Result<CompiledSchema, SchemaError> {
    let name = name.into();
    let mut diags = Vec::new();

    let resource_path = doc.resource_path.trim().to_string();
    if resource_path.is_empty() {
        diags.push("'resource_path' must be filled in".to_string());
    }
    if doc.metrics.is_empty() {
        diags.push("at least one metric must be defined".to_string());
    }

    let filter = match doc.resource_filter {
        None => Vec::new(),
        Some(FilterDocument::Map(map)) => map
            .into_iter()
            .map(|(field, value)| FilterClause::new(field, value))
            .collect(),
        Some(FilterDocument::List(items)) => items
            .iter()
            .filter_map(|item| match item.parse::<FilterClause>() {
                Ok(clause) => Some(clause),
                Err(e) => {
                    diags.push(format!("'resource_filter': {e}"));
                    None
                }
            })
            .collect(),
    };

    let mut seen = HashSet::new();
    let mut metrics = Vec::with_capacity(doc.metrics.len());
    for (index, metric) in doc.metrics.into_iter().enumerate() {
        let label = if metric.name.is_empty() {
            format!("metrics[{index}]")
        } else {
            format!("metric '{}'", metric.name)
        };
        if !metric.name.is_empty() && !seen.insert(metric.name.clone()) {
            diags.push(format!("{label}: duplicate metric name"));
        }
        if let Some(compiled) = compile_metric(
            &label,
            metric,
            &doc.namespace,
            &doc.subsystem,
            &resource_path,
            &doc.global_labels,
            &mut diags,
        ) {
            metrics.push(compiled);
        }
    }

    if !diags.is_empty() {
        return Err(SchemaError::Invalid {
            source_name: name,
            diagnostics: diags,
        });
    }

    Ok(CompiledSchema {
        name,
        namespace: doc.namespace,
        subsystem: doc.subsystem,
        resource_path,
        filter,
        metrics,
    })
}

fn compile_metric(
    label: &str,
    metric: MetricDocument,
    namespace: &str,
    subsystem: &str,
    resource_path: &str,
    global_labels: &BTreeMap<String, String>,
    diags: &mut Vec<String>,
) -> Option<CompiledMetric> {
    let before = diags.len();

    if metric.name.is_empty() {
        diags.push(format!("{label}: 'name' must be filled in"));
    } else {
        let full = fq_name(namespace, subsystem, &metric.name);
        if !metric_name_regex().is_match(&full) {
            diags.push(format!("{label}: invalid metric name '{full}'"));
        }
    }

    let kind = if metric.kind.is_empty() {
        diags.push(format!("{label}: 'type' must be filled in"));
        None
    } else {
        metric
            .kind
            .parse::<MetricKind>()
            .inspect_err(|_| diags.push(format!("{label}: unknown type '{}'", metric.kind)))
            .ok()
    };

    let field_type = match metric.field_type.as_deref() {
        None | Some("") => Some(FieldType::default()),
        Some(raw) => raw
            .parse::<FieldType>()
            .inspect_err(|_| diags.push(format!("{label}: unknown field_type '{raw}'")))
            .ok(),
    };

    let operation = match metric.operation.as_deref() {
        None | Some("") => Some(Operation::default()),
        Some(raw) => raw
            .parse::<Operation>()
            .inspect_err(|_| diags.push(format!("{label}: unknown operation '{raw}'")))
            .ok(),
    };

    let field = metric.field.trim().to_string();
    if field.is_empty() && field_type != Some(FieldType::Const) {
        diags.push(format!("{label}: 'field' must be filled in"));
    }

    // Const values are always exported as-is.
    let operation = match field_type {
        Some(FieldType::Const) => Some(Operation::Set),
        _ => operation,
    };

    if let (Some(MetricKind::Counter), Some(op)) = (kind, operation) {
        if !op.counter_compatible() {
            diags.push(format!("{label}: operation '{op}' is not supported by counters"));
        }
        if metric.reset {
            diags.push(format!("{label}: counters cannot be reset"));
        }
    }

    // Metric-level templates override schema-level ones with the same label name.
    let mut merged = global_labels.clone();
    merged.extend(metric.labels);

    let mut const_labels = BTreeMap::new();
    let mut dynamic_labels = BTreeMap::new();
    for (name, raw) in merged {
        if !valid_label_name(&name) {
            diags.push(format!("{label}: invalid label name '{name}'"));
            continue;
        }
        match LabelTemplate::parse(&raw) {
            LabelTemplate::Field(source) if source.is_empty() => {
                diags.push(format!("{label}: label '{name}' references an empty field"));
            }
            LabelTemplate::Field(source) => {
                dynamic_labels.insert(name, source);
            }
            LabelTemplate::Literal(value) => {
                const_labels.insert(name, value);
            }
        }
    }

    if diags.len() > before {
        return None;
    }

    let help = match metric.help {
        Some(help) if !help.trim().is_empty() => help,
        _ if field.is_empty() => format!("{} of {resource_path}", metric.name),
        _ => format!("{field} of {resource_path}"),
    };

    Some(CompiledMetric {
        name: metric.name,
        kind: kind?,
        field,
        field_type: field_type?,
        operation: operation?,
        help,
        reset: metric.reset,
        const_labels,
        dynamic_labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<CompiledSchema, SchemaError> {
        let doc: SchemaDocument = serde_yaml::from_str(yaml).unwrap();
        compile("test", doc)
    }

    #[test]
    fn test_compile_basic() {
        let schema = parse(
            r#"
namespace: mikrotik
subsystem: interface
resource_path: /interface/ethernet
metrics:
  - name: rx_bytes
    type: counter
    field: rx-byte
    labels:
      name: $name
      kind: ethernet
"#,
        )
        .unwrap();

        assert_eq!(schema.name, "test");
        assert_eq!(schema.metrics.len(), 1);
        let metric = &schema.metrics[0];
        assert_eq!(metric.kind, MetricKind::Counter);
        assert_eq!(metric.field_type, FieldType::Int);
        assert_eq!(metric.operation, Operation::Set);
        assert_eq!(metric.help, "rx-byte of /interface/ethernet");
        assert_eq!(metric.dynamic_labels.get("name").map(String::as_str), Some("name"));
        assert_eq!(metric.const_labels.get("kind").map(String::as_str), Some("ethernet"));
        assert_eq!(metric.label_names(), vec!["name"]);
        assert_eq!(schema.fq_name(metric), "mikrotik_interface_rx_bytes");
    }

    #[test]
    fn test_metric_labels_override_global_labels() {
        let schema = parse(
            r#"
resource_path: /interface
global_labels:
  router: $ALIAS
  name: $name
  site: hq
metrics:
  - name: up
    type: gauge
    field: running
    field_type: bool
    labels:
      name: $default-name
      site: $site-field
"#,
        )
        .unwrap();

        let metric = &schema.metrics[0];
        assert_eq!(metric.dynamic_labels.get("router").map(String::as_str), Some("ALIAS"));
        assert_eq!(
            metric.dynamic_labels.get("name").map(String::as_str),
            Some("default-name")
        );
        // A literal schema-level label overridden by a metric-level reference
        // moves from the const set to the dynamic set.
        assert_eq!(
            metric.dynamic_labels.get("site").map(String::as_str),
            Some("site-field")
        );
        assert!(metric.const_labels.is_empty());
    }

    #[test]
    fn test_const_forces_set() {
        let schema = parse(
            r#"
resource_path: /system/resource
metrics:
  - name: info
    type: gauge
    field_type: const
    operation: inc
    labels:
      version: $version
"#,
        )
        .unwrap();
        let metric = &schema.metrics[0];
        assert_eq!(metric.operation, Operation::Set);
        assert_eq!(metric.field, "");
        assert_eq!(metric.help, "info of /system/resource");
    }

    #[test]
    fn test_filter_forms() {
        let schema = parse(
            r#"
resource_path: /interface
resource_filter:
  running: "true"
  type: ether
metrics:
  - { name: up, type: gauge, field: running, field_type: bool }
"#,
        )
        .unwrap();
        assert_eq!(
            schema.filter,
            vec![
                FilterClause::new("running", "true"),
                FilterClause::new("type", "ether")
            ]
        );

        let err = parse(
            r#"
resource_path: /interface
resource_filter: ["running"]
metrics:
  - { name: up, type: gauge, field: running }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("resource_filter"));
    }

    #[test]
    fn test_rejects_missing_required() {
        let err = parse("namespace: x\nmetrics: []\n").unwrap_err();
        let diags = err.diagnostics();
        assert!(diags.iter().any(|d| d.contains("resource_path")));
        assert!(diags.iter().any(|d| d.contains("at least one metric")));

        let err = parse(
            r#"
resource_path: /interface
metrics:
  - { type: gauge, field: mtu }
  - { name: mtu, type: gauge }
"#,
        )
        .unwrap_err();
        let diags = err.diagnostics();
        assert!(diags.iter().any(|d| d.contains("metrics[0]: 'name'")));
        assert!(diags.iter().any(|d| d.contains("metric 'mtu': 'field'")));
    }

    #[test]
    fn test_rejects_unknown_enumerations() {
        let err = parse(
            r#"
resource_path: /interface
metrics:
  - { name: a, type: histogram, field: x }
  - { name: b, type: gauge, field: x, field_type: float }
  - { name: c, type: gauge, field: x, operation: multiply }
"#,
        )
        .unwrap_err();
        let diags = err.diagnostics();
        assert_eq!(diags.len(), 3);
        assert!(diags[0].contains("unknown type"));
        assert!(diags[1].contains("unknown field_type"));
        assert!(diags[2].contains("unknown operation"));
    }

    #[test]
    fn test_rejects_counter_misuse() {
        let err = parse(
            r#"
resource_path: /interface
metrics:
  - { name: a, type: counter, field: x, operation: sub }
  - { name: b, type: counter, field: x, reset: true }
"#,
        )
        .unwrap_err();
        let diags = err.diagnostics();
        assert!(diags.iter().any(|d| d.contains("not supported by counters")));
        assert!(diags.iter().any(|d| d.contains("cannot be reset")));
    }

    #[test]
    fn test_rejects_bad_names() {
        let err = parse(
            r#"
resource_path: /interface
metrics:
  - { name: "rx-bytes", type: gauge, field: x }
  - { name: ok, type: gauge, field: x, labels: { "bad-label": $name } }
  - { name: ok2, type: gauge, field: x, labels: { __reserved: v } }
  - { name: ok, type: gauge, field: y }
"#,
        )
        .unwrap_err();
        let diags = err.diagnostics();
        assert!(diags.iter().any(|d| d.contains("invalid metric name")));
        assert!(diags.iter().any(|d| d.contains("'bad-label'")));
        assert!(diags.iter().any(|d| d.contains("'__reserved'")));
        assert!(diags.iter().any(|d| d.contains("duplicate metric name")));
    }

    #[test]
    fn test_label_template_parse() {
        assert_eq!(
            LabelTemplate::parse("$name"),
            LabelTemplate::Field("name".to_string())
        );
        assert_eq!(
            LabelTemplate::parse("ethernet"),
            LabelTemplate::Literal("ethernet".to_string())
        );
    }
}
