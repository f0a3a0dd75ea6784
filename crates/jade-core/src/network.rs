//! Network whitelist enforcement and exfiltration heuristics.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use jade_rules::RuleTables;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::config::NetworkConfig;
use crate::descriptor::{ExecutionDag, Node, SecurityPolicy};
use crate::issue::{IssueKind, Layer, ValidationIssue, code};

/// Param keys whose value names the remote endpoint.
const TARGET_KEYS: &[&str] = &["url", "endpoint", "host", "hostname", "smtp_host"];

static URL_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[a-z][a-z0-9+.-]*://[^\s\x22'<>]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostRef {
    Static(String),
    Dynamic,
    Invalid(String),
}

fn is_templated(text: &str) -> bool {
    text.contains("{{") || text.contains("}}") || text.contains("${")
}

fn resolve_host(raw: &str) -> HostRef {
    let raw = raw.trim();
    let after_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let authority_end = after_scheme
        .find(['/', '?', '#'])
        .unwrap_or(after_scheme.len());
    let authority = &after_scheme[..authority_end];
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if is_templated(authority) || (authority.is_empty() && is_templated(raw)) {
        return HostRef::Dynamic;
    }

    let candidate = if raw.contains("://") {
        raw.to_owned()
    } else {
        format!("tcp://{raw}")
    };
    match Url::parse(&candidate) {
        Ok(url) => match url.host_str() {
            Some(host) if !host.is_empty() => HostRef::Static(
                host.trim_start_matches('[')
                    .trim_end_matches(']')
                    .trim_end_matches('.')
                    .to_ascii_lowercase(),
            ),
            _ => HostRef::Invalid("no host".into()),
        },
        Err(e) => HostRef::Invalid(e.to_string()),
    }
}

/// Exact match, `*.apex` for strict subdomains of apex, or `*` for anything.
#[must_use]
pub fn host_allowed(host: &str, whitelist: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    whitelist.iter().any(|entry| {
        let entry = entry.trim().trim_end_matches('.').to_ascii_lowercase();
        if entry == "*" || entry == host {
            return true;
        }
        entry
            .strip_prefix("*.")
            .is_some_and(|apex| host.len() > apex.len() + 1 && host.ends_with(&format!(".{apex}")))
    })
}

/// Shannon entropy in bits per byte.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn shannon_entropy(value: &str) -> f64 {
    if value.is_empty() {
        return 0.0;
    }

    let len = value.len() as f64;
    let mut freq = [0_u32; 256];
    for &byte in value.as_bytes() {
        freq[byte as usize] += 1;
    }

    let mut entropy = 0.0_f64;
    for &count in &freq {
        if count > 0 {
            let probability = f64::from(count) / len;
            entropy -= probability * probability.log2();
        }
    }

    entropy
}

fn redact(text: &str) -> String {
    let head: String = text.chars().take(4).collect();
    format!("{head}...")
}

/// String leaves of a params tree with their dotted paths.
fn string_leaves<'v>(params: &'v Value, base: &str) -> Vec<(String, Option<&'v str>, &'v str)> {
    let mut out = Vec::new();
    let mut stack: Vec<(&Value, String, Option<&str>)> = vec![(params, base.to_owned(), None)];
    while let Some((value, path, key)) = stack.pop() {
        match value {
            Value::String(text) => out.push((path, key, text.as_str())),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate().rev() {
                    stack.push((item, format!("{path}[{i}]"), key));
                }
            }
            Value::Object(map) => {
                for (k, item) in map.iter().rev() {
                    stack.push((item, format!("{path}.{k}"), Some(k.as_str())));
                }
            }
            _ => {}
        }
    }
    out
}

struct Guard<'a> {
    policy: &'a SecurityPolicy,
    tables: &'a RuleTables,
    config: &'a NetworkConfig,
    issues: Vec<ValidationIssue>,
    seen: BTreeSet<(String, String)>,
}

impl Guard<'_> {
    fn critical(&mut self, code: &str, message: String, location: &str) {
        self.issues.push(
            ValidationIssue::critical(Layer::Network, IssueKind::PolicyWarning, code, message)
                .at(location),
        );
    }

    fn warning(&mut self, code: &str, message: String, location: &str) {
        self.issues.push(
            ValidationIssue::warning(Layer::Network, IssueKind::PolicyWarning, code, message)
                .at(location),
        );
    }

    fn possible_secret(&mut self, location: &str, rule: &str, message: String) {
        if self.seen.insert((location.to_owned(), rule.to_owned())) {
            self.warning(code::POSSIBLE_SECRET, message, location);
        }
    }

    fn check_whitelist(&mut self) {
        let policy = self.policy;
        let strict = policy.is_strict();
        for (i, entry) in policy.network_whitelist.iter().enumerate() {
            let location = format!("security.network_whitelist[{i}]");
            let trimmed = entry.trim();
            if trimmed == "*" {
                self.warning(
                    code::WILDCARD_WHITELIST,
                    "bare wildcard allows every host".into(),
                    &location,
                );
                continue;
            }
            if self.tables.is_suspicious_host(&trimmed.to_ascii_lowercase()) {
                let message = format!(
                    "whitelist entry '{trimmed}' is a local, private or anonymizing host"
                );
                if strict {
                    self.critical(code::SUSPICIOUS_WHITELIST_ENTRY, message, &location);
                } else {
                    self.warning(code::SUSPICIOUS_WHITELIST_ENTRY, message, &location);
                }
            }
        }
    }

    fn check_node(&mut self, index: usize, node: &Node) {
        let location = format!("execution_dag.nodes[{index}].params");
        let leaves = string_leaves(&node.params, &location);

        let mut targets: Vec<String> = Vec::new();
        for (_, key, text) in &leaves {
            if key.is_some_and(|k| TARGET_KEYS.contains(&k)) {
                targets.push(text.trim().to_owned());
            } else {
                targets.extend(URL_IN_TEXT.find_iter(text).map(|m| m.as_str().to_owned()));
            }
        }
        let mut unique = BTreeSet::new();
        targets.retain(|t| !t.is_empty() && unique.insert(t.clone()));

        if targets.is_empty() {
            self.critical(
                code::NO_NETWORK_TARGET,
                format!(
                    "network action '{}' on node '{}' has no discoverable target host",
                    node.action, node.id
                ),
                &location,
            );
        }
        for target in &targets {
            self.check_target(node, target, &location);
        }

        for (path, _, text) in &leaves {
            self.scan_secrets(path, text);
        }
        for target in targets.iter().filter(|t| t.contains("://")) {
            self.scan_url_tokens(target, &location);
        }
    }

    fn check_target(&mut self, node: &Node, target: &str, location: &str) {
        let policy = self.policy;
        let whitelist = &policy.network_whitelist;
        match resolve_host(target) {
            HostRef::Dynamic if policy.allows_any_host() => {}
            HostRef::Dynamic => self.critical(
                code::DYNAMIC_HOST,
                format!(
                    "node '{}' builds its target host at run time ('{target}'), \
                     which cannot be whitelisted",
                    node.id
                ),
                location,
            ),
            HostRef::Invalid(reason) => self.critical(
                code::INVALID_TARGET,
                format!("node '{}' target '{target}' is not a valid address: {reason}", node.id),
                location,
            ),
            HostRef::Static(host) if host_allowed(&host, whitelist) => {}
            HostRef::Static(host) => {
                let message = if whitelist.is_empty() {
                    format!(
                        "node '{}' contacts '{host}' but network_whitelist is empty",
                        node.id
                    )
                } else {
                    format!("node '{}' contacts '{host}', which is not whitelisted", node.id)
                };
                self.critical(code::HOST_NOT_WHITELISTED, message, location);
            }
        }
    }

    fn scan_secrets(&mut self, location: &str, text: &str) {
        let tables = self.tables;
        for m in tables.secrets().scan(text) {
            self.possible_secret(
                location,
                m.rule,
                format!("value looks like a secret ({}): '{}'", m.rule, redact(&m.matched)),
            );
        }
    }

    fn scan_url_tokens(&mut self, target: &str, location: &str) {
        let Ok(url) = Url::parse(target) else {
            return;
        };
        let mut tokens: Vec<String> = url
            .path_segments()
            .map(|segments| segments.map(str::to_owned).collect())
            .unwrap_or_default();
        tokens.extend(url.query_pairs().map(|(_, v)| v.into_owned()));
        if let Some(fragment) = url.fragment() {
            tokens.push(fragment.to_owned());
        }
        for token in tokens {
            if token.len() < self.config.min_token_len || is_templated(&token) {
                continue;
            }
            let entropy = shannon_entropy(&token);
            if entropy >= self.config.entropy_threshold {
                self.possible_secret(
                    location,
                    "high-entropy-url-token",
                    format!(
                        "URL carries a high-entropy token '{}' ({entropy:.2} bits/char)",
                        redact(&token)
                    ),
                );
            }
        }
    }
}

/// Check whitelist hygiene and every network-capable node.
///
/// Without a usable graph the layer cannot run and reports itself skipped.
#[must_use]
pub fn check_network(
    dag: Option<&ExecutionDag>,
    policy: &SecurityPolicy,
    tables: &RuleTables,
    config: &NetworkConfig,
) -> Vec<ValidationIssue> {
    let mut guard = Guard {
        policy,
        tables,
        config,
        issues: Vec::new(),
        seen: BTreeSet::new(),
    };
    guard.check_whitelist();

    let Some(dag) = dag else {
        guard.issues.push(ValidationIssue::critical(
            Layer::Network,
            IssueKind::StructuralError,
            code::LAYER_SKIPPED,
            "network checks skipped: execution graph is unusable",
        ));
        return guard.issues;
    };
    for (index, node) in dag.nodes.iter().enumerate() {
        if tables.actions().is_network(&node.action) {
            guard.check_node(index, node);
        }
    }
    guard.issues
}
