//! Rule Engine (C10): evaluates user-declared predicates against
//! per-item fields to produce a keep/delete [`Verdict`].
//!
//! Grounded structurally on the teacher's `health::quality` scored-struct/
//! pure-function split, but the domain here is policy evaluation, not
//! metadata-completeness scoring. Rule documents are `serde`-derived and
//! parse either YAML (`serde_yaml`) or JSON (`serde_json`), per §6 and
//! the distilled spec's "YAML or JSON" wording.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The engine's output for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Keep,
    Delete,
}

/// A field value extracted from an item, dynamically typed so the same
/// condition evaluation logic handles numbers, strings, and booleans
/// uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.parse().ok(),
        }
    }

    fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// One item's decorated field set, keyed by field name (`format`,
/// `bitrate`, `is_best`, `is_lossless`, `quality_score`, `path`, …).
pub type ItemFields = HashMap<String, FieldValue>;

/// The nine comparison operators a [`Condition`] may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
    Contains,
    Matches,
}

/// An atomic condition: a field name, an operator, and a comparison value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

/// The right-hand side of a condition: a scalar for most operators, a
/// sequence for `in`/`not in`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Scalar(FieldValue),
    Sequence(Vec<FieldValue>),
}

impl Condition {
    /// Evaluate against `fields`. A condition whose named field is absent
    /// from the item evaluates to `false`.
    pub fn evaluate(&self, fields: &ItemFields) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match self.operator {
            Operator::Eq => scalar(&self.value).is_some_and(|v| fields_equal(actual, v)),
            Operator::Ne => scalar(&self.value).is_some_and(|v| !fields_equal(actual, v)),
            Operator::Lt => numeric_cmp(actual, &self.value, |a, b| a < b),
            Operator::Gt => numeric_cmp(actual, &self.value, |a, b| a > b),
            Operator::Le => numeric_cmp(actual, &self.value, |a, b| a <= b),
            Operator::Ge => numeric_cmp(actual, &self.value, |a, b| a >= b),
            Operator::In => match &self.value {
                ConditionValue::Sequence(seq) => seq.iter().any(|v| fields_equal(actual, v)),
                ConditionValue::Scalar(v) => fields_equal(actual, v),
            },
            Operator::NotIn => match &self.value {
                ConditionValue::Sequence(seq) => !seq.iter().any(|v| fields_equal(actual, v)),
                ConditionValue::Scalar(v) => !fields_equal(actual, v),
            },
            Operator::Contains => scalar(&self.value)
                .map(|v| actual.as_text().contains(&v.as_text()))
                .unwrap_or(false),
            Operator::Matches => scalar(&self.value)
                .and_then(|v| Regex::new(&v.as_text()).ok())
                .map(|re| re.is_match(&actual.as_text()))
                .unwrap_or(false),
        }
    }
}

fn scalar(value: &ConditionValue) -> Option<&FieldValue> {
    match value {
        ConditionValue::Scalar(v) => Some(v),
        ConditionValue::Sequence(_) => None,
    }
}

fn fields_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => x.eq_ignore_ascii_case(y),
        _ => a.as_f64().zip(b.as_f64()).map(|(x, y)| x == y).unwrap_or_else(|| a.as_text() == b.as_text()),
    }
}

fn numeric_cmp(actual: &FieldValue, value: &ConditionValue, cmp: impl Fn(f64, f64) -> bool) -> bool {
    let Some(rhs) = scalar(value).and_then(FieldValue::as_f64) else {
        return false;
    };
    actual.as_f64().is_some_and(|lhs| cmp(lhs, rhs))
}

/// How a rule's conditions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    And,
    Or,
}

/// A predicate plus a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub action: Verdict,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_logic")]
    pub logic: Logic,
    pub conditions: Vec<Condition>,
}

fn default_priority() -> i32 {
    50
}

fn default_logic() -> Logic {
    Logic::And
}

impl Rule {
    fn matches(&self, fields: &ItemFields) -> bool {
        match self.logic {
            Logic::And => self.conditions.iter().all(|c| c.evaluate(fields)),
            Logic::Or => self.conditions.iter().any(|c| c.evaluate(fields)),
        }
    }
}

/// A full rule document: an ordered list of rules plus a default verdict
/// applied when none match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEngine {
    #[serde(default = "default_verdict")]
    pub default_action: Verdict,
    pub rules: Vec<Rule>,
}

fn default_verdict() -> Verdict {
    Verdict::Keep
}

impl RuleEngine {
    /// Evaluate rules in descending-priority order; the first matching
    /// rule's verdict wins. If none match, `default_action` applies.
    pub fn evaluate(&self, fields: &ItemFields) -> Verdict {
        let mut ordered: Vec<&Rule> = self.rules.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        for rule in ordered {
            if rule.matches(fields) {
                return rule.action;
            }
        }
        self.default_action
    }

    /// Parse a rule document. Tries JSON first (cheap to disambiguate via
    /// a syntax check), then YAML — both formats name the same shape
    /// (`{"default_action", "rules": [...]}`, per §6).
    pub fn load_from_document(text: &str) -> Result<Self> {
        if let Ok(engine) = serde_json::from_str::<RuleEngine>(text) {
            return Ok(engine);
        }
        serde_yaml::from_str::<RuleEngine>(text)
            .map_err(|e| Error::RuleFileInvalid(e.to_string()))
    }

    /// `eliminate-duplicates`: keep the designated best, delete the rest.
    pub fn eliminate_duplicates() -> Self {
        Self {
            default_action: Verdict::Delete,
            rules: vec![Rule {
                name: "keep-best".to_string(),
                action: Verdict::Keep,
                priority: 100,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: "is_best".to_string(),
                    operator: Operator::Eq,
                    value: ConditionValue::Scalar(FieldValue::Bool(true)),
                }],
            }],
        }
    }

    /// `keep-lossless`: keep lossless, delete otherwise.
    pub fn keep_lossless() -> Self {
        Self {
            default_action: Verdict::Delete,
            rules: vec![Rule {
                name: "keep-lossless".to_string(),
                action: Verdict::Keep,
                priority: 100,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: "is_lossless".to_string(),
                    operator: Operator::Eq,
                    value: ConditionValue::Scalar(FieldValue::Bool(true)),
                }],
            }],
        }
    }

    /// `keep-format F`: keep where `format == F` (case-insensitively
    /// normalised), delete otherwise.
    pub fn keep_format(format: &str) -> Self {
        Self {
            default_action: Verdict::Delete,
            rules: vec![Rule {
                name: format!("keep-format-{}", format.to_uppercase()),
                action: Verdict::Keep,
                priority: 100,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: "format".to_string(),
                    operator: Operator::Eq,
                    value: ConditionValue::Scalar(FieldValue::Text(format.to_uppercase())),
                }],
            }],
        }
    }
}

/// Field extraction (§4.10/§3): decorate an item with fields parsed from
/// its free-form "quality_info" display string, for re-ingesting
/// externally supplied scan-result documents that only carry that
/// string (the structured `CodecInfo` path in [`crate::quality`] is used
/// for the internal pipeline instead; this is the "recover struct from
/// string" direction).
pub fn extract_fields_from_quality_string(quality_info: &str, file_size: u64, path: &str) -> ItemFields {
    let mut fields = ItemFields::new();

    let format = Regex::new(r"^[A-Z0-9]+")
        .unwrap()
        .find(quality_info)
        .map(|m| m.as_str().to_string());
    if let Some(format) = &format {
        fields.insert("format".to_string(), FieldValue::Text(format.clone()));
        fields.insert("codec".to_string(), FieldValue::Text(format.clone()));
    }

    let bitrate = Regex::new(r"(\d+)\s*kbps")
        .unwrap()
        .captures(quality_info)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);
    fields.insert("bitrate".to_string(), FieldValue::Number(bitrate));

    let sample_rate = Regex::new(r"([\d.]+)\s*kHz")
        .unwrap()
        .captures(quality_info)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|khz| khz * 1000.0)
        .unwrap_or(0.0);
    fields.insert("sample_rate".to_string(), FieldValue::Number(sample_rate));

    let bit_depth = Regex::new(r"(\d+)\s*bit")
        .unwrap()
        .captures(quality_info)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);
    fields.insert("bit_depth".to_string(), FieldValue::Number(bit_depth));

    let is_lossless = format
        .as_deref()
        .map(|f| matches!(f, "FLAC" | "WAV"))
        .unwrap_or(false);
    fields.insert("is_lossless".to_string(), FieldValue::Bool(is_lossless));
    fields.insert("file_size".to_string(), FieldValue::Number(file_size as f64));
    fields.insert("path".to_string(), FieldValue::Text(path.to_string()));

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(entries: &[(&str, FieldValue)]) -> ItemFields {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn eliminate_duplicates_keeps_best_deletes_rest() {
        let engine = RuleEngine::eliminate_duplicates();
        let best = fields(&[("is_best", FieldValue::Bool(true))]);
        let other = fields(&[("is_best", FieldValue::Bool(false))]);
        assert_eq!(engine.evaluate(&best), Verdict::Keep);
        assert_eq!(engine.evaluate(&other), Verdict::Delete);
    }

    #[test]
    fn keep_lossless_strategy() {
        let engine = RuleEngine::keep_lossless();
        let lossless = fields(&[("is_lossless", FieldValue::Bool(true))]);
        let lossy = fields(&[("is_lossless", FieldValue::Bool(false))]);
        assert_eq!(engine.evaluate(&lossless), Verdict::Keep);
        assert_eq!(engine.evaluate(&lossy), Verdict::Delete);
    }

    #[test]
    fn keep_format_is_case_insensitive() {
        let engine = RuleEngine::keep_format("flac");
        let flac = fields(&[("format", FieldValue::Text("FLAC".to_string()))]);
        let mp3 = fields(&[("format", FieldValue::Text("MP3".to_string()))]);
        assert_eq!(engine.evaluate(&flac), Verdict::Keep);
        assert_eq!(engine.evaluate(&mp3), Verdict::Delete);
    }

    #[test]
    fn missing_field_evaluates_condition_to_false() {
        let cond = Condition {
            field: "nonexistent".to_string(),
            operator: Operator::Eq,
            value: ConditionValue::Scalar(FieldValue::Bool(true)),
        };
        assert!(!cond.evaluate(&ItemFields::new()));
    }

    #[test]
    fn priority_ordering_first_match_wins() {
        let engine = RuleEngine {
            default_action: Verdict::Keep,
            rules: vec![
                Rule {
                    name: "low".to_string(),
                    action: Verdict::Delete,
                    priority: 10,
                    logic: Logic::And,
                    conditions: vec![],
                },
                Rule {
                    name: "high".to_string(),
                    action: Verdict::Keep,
                    priority: 90,
                    logic: Logic::And,
                    conditions: vec![],
                },
            ],
        };
        // both match (empty AND conditions vacuously true); higher
        // priority rule's verdict wins
        assert_eq!(engine.evaluate(&ItemFields::new()), Verdict::Keep);
    }

    #[test]
    fn no_match_falls_back_to_default_action() {
        let engine = RuleEngine {
            default_action: Verdict::Delete,
            rules: vec![Rule {
                name: "never".to_string(),
                action: Verdict::Keep,
                priority: 50,
                logic: Logic::And,
                conditions: vec![Condition {
                    field: "format".to_string(),
                    operator: Operator::Eq,
                    value: ConditionValue::Scalar(FieldValue::Text("NOPE".to_string())),
                }],
            }],
        };
        let item = fields(&[("format", FieldValue::Text("MP3".to_string()))]);
        assert_eq!(engine.evaluate(&item), Verdict::Delete);
    }

    #[test]
    fn operator_in_and_not_in() {
        let in_cond = Condition {
            field: "format".to_string(),
            operator: Operator::In,
            value: ConditionValue::Sequence(vec![
                FieldValue::Text("MP3".to_string()),
                FieldValue::Text("AAC".to_string()),
            ]),
        };
        let item = fields(&[("format", FieldValue::Text("MP3".to_string()))]);
        assert!(in_cond.evaluate(&item));

        let not_in_cond = Condition {
            field: "format".to_string(),
            operator: Operator::NotIn,
            value: ConditionValue::Sequence(vec![FieldValue::Text("FLAC".to_string())]),
        };
        assert!(not_in_cond.evaluate(&item));
    }

    #[test]
    fn operator_contains_and_matches() {
        let item = fields(&[("path", FieldValue::Text("/music/Nirvana/track.mp3".to_string()))]);
        let contains = Condition {
            field: "path".to_string(),
            operator: Operator::Contains,
            value: ConditionValue::Scalar(FieldValue::Text("Nirvana".to_string())),
        };
        assert!(contains.evaluate(&item));

        let matches = Condition {
            field: "path".to_string(),
            operator: Operator::Matches,
            value: ConditionValue::Scalar(FieldValue::Text(r"\.mp3$".to_string())),
        };
        assert!(matches.evaluate(&item));
    }

    #[test]
    fn numeric_operators() {
        let item = fields(&[("bitrate", FieldValue::Number(320.0))]);
        let gt = Condition {
            field: "bitrate".to_string(),
            operator: Operator::Gt,
            value: ConditionValue::Scalar(FieldValue::Number(256.0)),
        };
        assert!(gt.evaluate(&item));
        let lt = Condition {
            field: "bitrate".to_string(),
            operator: Operator::Lt,
            value: ConditionValue::Scalar(FieldValue::Number(256.0)),
        };
        assert!(!lt.evaluate(&item));
    }

    #[test]
    fn load_from_document_parses_json() {
        let json = r#"{
            "default_action": "keep",
            "rules": [
                {"name": "r1", "action": "delete", "priority": 80, "logic": "OR",
                 "conditions": [{"field": "is_best", "operator": "==", "value": false}]}
            ]
        }"#;
        let engine = RuleEngine::load_from_document(json).unwrap();
        assert_eq!(engine.rules.len(), 1);
        assert_eq!(engine.rules[0].priority, 80);
    }

    #[test]
    fn load_from_document_parses_yaml() {
        let yaml = "default_action: delete\nrules:\n  - name: r1\n    action: keep\n    priority: 60\n    conditions:\n      - field: is_lossless\n        operator: \"==\"\n        value: true\n";
        let engine = RuleEngine::load_from_document(yaml).unwrap();
        assert_eq!(engine.default_action, Verdict::Delete);
        assert_eq!(engine.rules[0].priority, 60);
    }

    #[test]
    fn load_from_document_rejects_garbage() {
        let err = RuleEngine::load_from_document("not: [valid yaml json: :::").unwrap_err();
        assert!(matches!(err, Error::RuleFileInvalid(_)));
    }

    #[test]
    fn evaluating_same_item_twice_yields_same_verdict() {
        let engine = RuleEngine::keep_lossless();
        let item = fields(&[("is_lossless", FieldValue::Bool(true))]);
        assert_eq!(engine.evaluate(&item), engine.evaluate(&item));
    }

    #[test]
    fn extract_fields_from_quality_string_parses_lossless() {
        let fields = extract_fields_from_quality_string("FLAC 44.1kHz 16bit", 5_000_000, "/a/b.flac");
        assert_eq!(fields.get("format"), Some(&FieldValue::Text("FLAC".to_string())));
        assert_eq!(fields.get("is_lossless"), Some(&FieldValue::Bool(true)));
        assert_eq!(fields.get("sample_rate"), Some(&FieldValue::Number(44_100.0)));
        assert_eq!(fields.get("bit_depth"), Some(&FieldValue::Number(16.0)));
    }

    #[test]
    fn extract_fields_from_quality_string_parses_lossy_bitrate() {
        let fields = extract_fields_from_quality_string("MP3 320kbps", 8_000_000, "/a/b.mp3");
        assert_eq!(fields.get("format"), Some(&FieldValue::Text("MP3".to_string())));
        assert_eq!(fields.get("bitrate"), Some(&FieldValue::Number(320.0)));
        assert_eq!(fields.get("is_lossless"), Some(&FieldValue::Bool(false)));
    }

    #[test]
    fn extract_fields_from_quality_string_parses_alphanumeric_format() {
        let fields = extract_fields_from_quality_string("M4A 256kbps", 6_000_000, "/a/b.m4a");
        assert_eq!(fields.get("format"), Some(&FieldValue::Text("M4A".to_string())));
    }
}
