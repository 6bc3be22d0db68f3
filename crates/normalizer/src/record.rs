//! Field mapping for one detection record (nuclei JSON schema).

use harrow_common::{Finding, Severity};
use serde_json::Value;

/// Map one JSON record to a `Finding`; non-object records yield `None`.
///
/// | finding field    | source                                   | default   |
/// |------------------|------------------------------------------|-----------|
/// | `template_name`  | `template-id`                            | `""`      |
/// | `severity`       | `info.severity`                          | `Unknown` |
/// | `protocol`       | `type`, then `protocol`                  | `http`    |
/// | `target`         | `matched-at`, then `host`                | `""`      |
/// | `details`        | `info.description`, then `info.name`     | `""`      |
/// | `cvss_score`     | `info.classification.cvss-score`         | `0.0`     |
/// | `recommendation` | `info.remediation`                       | `""`      |
pub fn normalize_record(record: &Value) -> Option<Finding> {
    let obj = record.as_object()?;
    let info = obj.get("info");

    let severity = info
        .and_then(|i| text(i.get("severity")))
        .map(|s| Severity::parse(&s))
        .unwrap_or_else(Severity::unknown);

    Some(Finding {
        template_name: text(obj.get("template-id")).unwrap_or_default(),
        severity,
        protocol: text(obj.get("type"))
            .or_else(|| text(obj.get("protocol")))
            .unwrap_or_else(|| "http".to_string()),
        target: text(obj.get("matched-at"))
            .or_else(|| text(obj.get("host")))
            .unwrap_or_default(),
        details: info
            .and_then(|i| text(i.get("description")).or_else(|| text(i.get("name"))))
            .unwrap_or_default(),
        cvss_score: info
            .and_then(|i| i.get("classification"))
            .and_then(|c| score(c.get("cvss-score")))
            .unwrap_or(0.0),
        recommendation: info
            .and_then(|i| text(i.get("remediation")))
            .unwrap_or_default(),
    })
}

/// Non-empty string, or a scalar rendered as one.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn score(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        // some templates list several scores
        Value::Array(items) => items.first().and_then(|v| score(Some(v))),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}
