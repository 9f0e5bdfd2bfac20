//! Schema validation of untrusted analysis responses.
//!
//! The remote service answers with an envelope
//! `{"success": bool, "data": {...}, "error"?: string}` whose `data` shape
//! depends on the requested [`AnalysisKind`]. Validation walks the whole
//! document and reports every mismatch at once rather than stopping at the
//! first one, so the log line for a bad response is actionable.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use rentwise_core::{AnalysisKind, json_type_name};

/// One field of the response that did not match its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    /// Dotted path to the offending field, e.g. `data.analysis.insights[0].title`.
    pub path: String,
    pub expected: String,
    pub found: String,
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, found {}", self.path, self.expected, self.found)
    }
}

/// A response failed validation. Terminal: never retried.
///
/// Carries the raw payload and every mismatch for diagnostics; only
/// `reason` is meant for display.
#[derive(Debug, Clone, Error)]
#[error("response validation failed: {reason}")]
pub struct ValidationError {
    pub reason: String,
    pub raw: Value,
    pub mismatches: Vec<SchemaMismatch>,
}

/// Importance of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// A single machine-readable finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insight {
    title: String,
    description: String,
    priority: Option<Priority>,
}

impl Insight {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }
}

/// Narrative plus insights for one analysis section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionAnalysis {
    kind: AnalysisKind,
    summary: String,
    insights: Vec<Insight>,
}

impl SectionAnalysis {
    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn insights(&self) -> &[Insight] {
        &self.insights
    }
}

/// A combined analysis: an executive summary over a tagged section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedAnalysis {
    executive_summary: String,
    analysis: SectionAnalysis,
}

impl CombinedAnalysis {
    pub fn executive_summary(&self) -> &str {
        &self.executive_summary
    }

    pub fn analysis(&self) -> &SectionAnalysis {
        &self.analysis
    }
}

/// A response that passed validation for its kind.
///
/// Only produced by [`validate`]; there is no other way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedAnalysis {
    Financial(SectionAnalysis),
    Reservation(SectionAnalysis),
    Combined(CombinedAnalysis),
}

impl ValidatedAnalysis {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            Self::Financial(_) => AnalysisKind::Financial,
            Self::Reservation(_) => AnalysisKind::Reservation,
            Self::Combined(_) => AnalysisKind::Combined,
        }
    }

    /// The kind-specific narrative: the executive summary for combined
    /// analyses, the section summary otherwise.
    pub fn narrative(&self) -> &str {
        match self {
            Self::Financial(section) | Self::Reservation(section) => section.summary(),
            Self::Combined(combined) => combined.executive_summary(),
        }
    }

    pub fn insights(&self) -> &[Insight] {
        match self {
            Self::Financial(section) | Self::Reservation(section) => section.insights(),
            Self::Combined(combined) => combined.analysis().insights(),
        }
    }
}

/// Validate a decoded response against the schema for `expected`.
///
/// A JSON string is decoded first (markdown code fences are stripped), so a
/// service that double-encodes its body is still accepted.
pub fn validate(raw: &Value, expected: AnalysisKind) -> Result<ValidatedAnalysis, ValidationError> {
    let decoded;
    let doc = match raw {
        Value::String(text) => {
            decoded = decode_json(text).map_err(|e| ValidationError {
                reason: "not valid JSON".into(),
                raw: raw.clone(),
                mismatches: vec![SchemaMismatch {
                    path: "$".into(),
                    expected: "JSON document".into(),
                    found: format!("unparseable text ({e})"),
                }],
            })?;
            &decoded
        }
        other => other,
    };

    let mut checker = Checker::default();
    let result = checker.envelope(doc, expected);
    match result {
        Some(analysis) if checker.mismatches.is_empty() => Ok(analysis),
        _ => Err(ValidationError {
            reason: format!("response does not match the {expected} analysis schema"),
            raw: raw.clone(),
            mismatches: checker.mismatches,
        }),
    }
}

/// Decode `text` as JSON and validate it.
pub fn validate_str(text: &str, expected: AnalysisKind) -> Result<ValidatedAnalysis, ValidationError> {
    validate(&Value::String(text.to_owned()), expected)
}

/// Validate, logging and discarding any [`ValidationError`].
pub fn safe_validate(raw: &Value, expected: AnalysisKind) -> Option<ValidatedAnalysis> {
    match validate(raw, expected) {
        Ok(analysis) => Some(analysis),
        Err(err) => {
            debug!(
                kind = %expected,
                reason = %err.reason,
                mismatches = ?err.mismatches,
                "discarding invalid analysis response"
            );
            None
        }
    }
}

/// Parse JSON text, stripping markdown code fences if present.
pub(crate) fn decode_json(content: &str) -> Result<Value, serde_json::Error> {
    let trimmed = content.trim();

    // Strip markdown code fences (```json ... ``` or ``` ... ```)
    let json_str = if trimmed.starts_with("```") {
        let without_opening = if let Some(rest) = trimmed.strip_prefix("```json") {
            rest
        } else {
            trimmed.strip_prefix("```").unwrap_or(trimmed)
        };
        without_opening
            .strip_suffix("```")
            .unwrap_or(without_opening)
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str(json_str)
}

#[derive(Default)]
struct Checker {
    mismatches: Vec<SchemaMismatch>,
}

impl Checker {
    fn mismatch(&mut self, path: &str, expected: &str, found: impl Into<String>) {
        self.mismatches.push(SchemaMismatch {
            path: path.to_owned(),
            expected: expected.to_owned(),
            found: found.into(),
        });
    }

    fn envelope(&mut self, doc: &Value, expected: AnalysisKind) -> Option<ValidatedAnalysis> {
        let Some(root) = doc.as_object() else {
            self.mismatch("$", "object", json_type_name(doc));
            return None;
        };

        match root.get("success") {
            Some(Value::Bool(true)) => {}
            Some(Value::Bool(false)) => {
                let remote = root
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("no error message");
                self.mismatch("success", "true", format!("false (remote error: {remote})"));
                return None;
            }
            Some(other) => self.mismatch("success", "boolean", json_type_name(other)),
            None => self.mismatch("success", "boolean", "missing"),
        }

        let data = self.object(root, "", "data")?;
        match expected {
            AnalysisKind::Combined => self.combined(data).map(ValidatedAnalysis::Combined),
            AnalysisKind::Financial => self
                .section(data, "data", AnalysisKind::Financial, false)
                .map(ValidatedAnalysis::Financial),
            AnalysisKind::Reservation => self
                .section(data, "data", AnalysisKind::Reservation, false)
                .map(ValidatedAnalysis::Reservation),
        }
    }

    fn combined(&mut self, data: &Map<String, Value>) -> Option<CombinedAnalysis> {
        let executive_summary = self.non_empty_string(data, "data", "executiveSummary");
        let analysis = self.object(data, "data", "analysis").and_then(|analysis| {
            let kind = self.kind_tag(analysis, "data.analysis");
            let section = self.section(
                analysis,
                "data.analysis",
                kind.unwrap_or(AnalysisKind::Combined),
                true,
            );
            kind.and(section)
        });
        Some(CombinedAnalysis {
            executive_summary: executive_summary?,
            analysis: analysis?,
        })
    }

    fn section(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
        kind: AnalysisKind,
        require_insights: bool,
    ) -> Option<SectionAnalysis> {
        let summary = self.non_empty_string(obj, path, "summary");
        let insights = self.insights(obj, path, require_insights);
        Some(SectionAnalysis {
            kind,
            summary: summary?,
            insights: insights?,
        })
    }

    fn kind_tag(&mut self, obj: &Map<String, Value>, path: &str) -> Option<AnalysisKind> {
        let field = format!("{path}.type");
        match obj.get("type") {
            Some(Value::String(tag)) => {
                let kind = match tag.as_str() {
                    "financial" => Some(AnalysisKind::Financial),
                    "reservation" => Some(AnalysisKind::Reservation),
                    "combined" => Some(AnalysisKind::Combined),
                    _ => None,
                };
                if kind.is_none() {
                    self.mismatch(&field, "financial|reservation|combined", format!("\"{tag}\""));
                }
                kind
            }
            Some(other) => {
                self.mismatch(&field, "string", json_type_name(other));
                None
            }
            None => {
                self.mismatch(&field, "string", "missing");
                None
            }
        }
    }

    fn insights(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
        require_non_empty: bool,
    ) -> Option<Vec<Insight>> {
        let field = format!("{path}.insights");
        let items = match obj.get("insights") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.mismatch(&field, "array", json_type_name(other));
                return None;
            }
            None => {
                self.mismatch(&field, "array", "missing");
                return None;
            }
        };
        if require_non_empty && items.is_empty() {
            self.mismatch(&field, "non-empty array", "empty array");
            return None;
        }

        let mut insights = Vec::with_capacity(items.len());
        let mut all_valid = true;
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{field}[{i}]");
            match self.insight(item, &item_path) {
                Some(insight) => insights.push(insight),
                None => all_valid = false,
            }
        }
        all_valid.then_some(insights)
    }

    fn insight(&mut self, item: &Value, path: &str) -> Option<Insight> {
        let Some(obj) = item.as_object() else {
            self.mismatch(path, "object", json_type_name(item));
            return None;
        };
        let title = self.string(obj, path, "title");
        let description = self.string(obj, path, "description");
        let priority = match obj.get("priority") {
            None | Some(Value::Null) => Some(None),
            Some(Value::String(p)) => match Priority::parse(p) {
                Some(priority) => Some(Some(priority)),
                None => {
                    self.mismatch(&format!("{path}.priority"), "low|medium|high", format!("\"{p}\""));
                    None
                }
            },
            Some(other) => {
                self.mismatch(&format!("{path}.priority"), "string", json_type_name(other));
                None
            }
        };
        Some(Insight {
            title: title?,
            description: description?,
            priority: priority?,
        })
    }

    fn object<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Option<&'a Map<String, Value>> {
        let field = join(path, key);
        match obj.get(key) {
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                self.mismatch(&field, "object", json_type_name(other));
                None
            }
            None => {
                self.mismatch(&field, "object", "missing");
                None
            }
        }
    }

    fn string(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<String> {
        match obj.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.mismatch(&join(path, key), "string", json_type_name(other));
                None
            }
            None => {
                self.mismatch(&join(path, key), "string", "missing");
                None
            }
        }
    }

    fn non_empty_string(&mut self, obj: &Map<String, Value>, path: &str, key: &str) -> Option<String> {
        let value = self.string(obj, path, key)?;
        if value.trim().is_empty() {
            self.mismatch(&join(path, key), "non-empty string", "empty string");
            return None;
        }
        Some(value)
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}.{key}")
    }
}
