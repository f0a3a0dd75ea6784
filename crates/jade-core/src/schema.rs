//! Structural conformance gate.
//!
//! Collects every structural problem instead of stopping at the first. The
//! only thing it withholds from later layers is a graph whose node/edge shape
//! is unusable; everything else is handed on as best-effort typed data.

use std::collections::HashSet;

use jade_rules::{ActionCategory, RuleTables, SchemaShape};
use serde_json::{Map, Value};

use crate::descriptor::{ExecutionDag, SecurityPolicy, Signature, SkillDescriptor};
use crate::issue::{IssueKind, Layer, ValidationIssue, code};

const STRICT_MAX_EXECUTION_MS: u64 = 120_000;
const STRICT_MAX_RETRIES: u64 = 10;
const BROAD_FILE_SCOPES: &[&str] = &["/", "/*", "/**", "c:\\", "c:\\*", "c:/", "c:/*"];

/// Schema layer outcome plus the typed pieces later layers consume.
#[derive(Debug, Clone, Default)]
pub struct SchemaReport {
    pub issues: Vec<ValidationIssue>,
    /// Malformed signature entries; reported under the trust layer.
    pub signature_issues: Vec<ValidationIssue>,
    pub skill_id: Option<String>,
    pub dag: Option<ExecutionDag>,
    pub security: SecurityPolicy,
    pub signatures: Vec<Signature>,
}

impl SchemaReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.issues.iter().any(ValidationIssue::is_critical)
    }

    /// Fully typed descriptor; only available when the schema passed.
    #[must_use]
    pub fn descriptor(&self, value: &Value) -> Option<SkillDescriptor> {
        if !self.passed() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

struct Checker<'t> {
    shape: &'t SchemaShape,
    issues: Vec<ValidationIssue>,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(loc: &str, key: &str) -> String {
    if loc.is_empty() {
        key.to_owned()
    } else {
        format!("{loc}.{key}")
    }
}

impl<'t> Checker<'t> {
    fn critical(&mut self, code: &str, message: impl Into<String>, location: impl Into<String>) {
        self.issues.push(
            ValidationIssue::critical(Layer::Schema, IssueKind::StructuralError, code, message)
                .at(location),
        );
    }

    fn warning(&mut self, code: &str, message: impl Into<String>, location: impl Into<String>) {
        self.issues.push(
            ValidationIssue::warning(Layer::Schema, IssueKind::PolicyWarning, code, message)
                .at(location),
        );
    }

    fn wrong_type(&mut self, location: &str, expected: &str, found: &Value) {
        self.critical(
            code::INVALID_TYPE,
            format!("'{location}' must be {expected}, found {}", type_name(found)),
            location,
        );
    }

    fn missing(&mut self, location: &str) {
        self.critical(
            code::MISSING_FIELD,
            format!("missing required field '{location}'"),
            location,
        );
    }

    fn required<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        loc: &str,
        key: &str,
    ) -> Option<&'v Value> {
        let value = obj.get(key);
        if value.is_none() {
            self.missing(&join(loc, key));
        }
        value
    }

    fn required_str<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        loc: &str,
        key: &str,
    ) -> Option<&'v str> {
        let value = self.required(obj, loc, key)?;
        let text = value.as_str();
        if text.is_none() {
            self.wrong_type(&join(loc, key), "a string", value);
        }
        text
    }

    fn optional_str(&mut self, obj: &Map<String, Value>, loc: &str, key: &str) {
        if let Some(value) = obj.get(key)
            && !value.is_string()
            && !value.is_null()
        {
            self.wrong_type(&join(loc, key), "a string", value);
        }
    }

    /// Array of strings; reports the container and each bad element.
    fn string_array<'v>(&mut self, value: &'v Value, location: &str) -> Vec<&'v str> {
        let Some(items) = value.as_array() else {
            self.wrong_type(location, "an array of strings", value);
            return Vec::new();
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(s) => out.push(s),
                None => self.wrong_type(&format!("{location}[{i}]"), "a string", item),
            }
        }
        out
    }

    fn length_between(&mut self, text: &str, location: &str, min: usize, max: usize) {
        let len = text.chars().count();
        if len < min || len > max {
            self.critical(
                code::INVALID_VALUE,
                format!("'{location}' must be {min}-{max} characters, got {len}"),
                location,
            );
        }
    }

    fn check_top_level(&mut self, root: &Map<String, Value>) {
        let shape = self.shape;
        for field in &shape.required_fields {
            if !root.contains_key(field) {
                self.missing(field);
            }
        }
        for key in root.keys().filter(|k| !shape.is_known_field(k)) {
            self.warning(
                code::UNKNOWN_FIELD,
                format!("unknown top-level field '{key}'"),
                key.as_str(),
            );
        }
    }

    fn check_version(&mut self, root: &Map<String, Value>) {
        let Some(value) = root.get("jade_version") else {
            return;
        };
        let Some(text) = value.as_str() else {
            self.wrong_type("jade_version", "a string", value);
            return;
        };
        match semver::Version::parse(text.trim()) {
            Ok(version) if self.shape.supports_version(&version) => {}
            Ok(_) => self.critical(
                code::UNSUPPORTED_VERSION,
                format!(
                    "jade_version {text} is outside the supported range {}",
                    self.shape.supported_versions()
                ),
                "jade_version",
            ),
            Err(e) => self.critical(
                code::UNSUPPORTED_VERSION,
                format!("jade_version '{text}' is not a semantic version: {e}"),
                "jade_version",
            ),
        }
    }

    fn check_skill_id(&mut self, root: &Map<String, Value>) -> Option<String> {
        let value = root.get("skill_id")?;
        let Some(id) = value.as_str() else {
            self.wrong_type("skill_id", "a string", value);
            return None;
        };
        if !self.shape.is_valid_skill_id(id) {
            self.critical(
                code::INVALID_SKILL_ID,
                format!(
                    "skill_id '{id}' must be lowercase letters, digits and underscores \
                     (3-64, leading letter)"
                ),
                "skill_id",
            );
        }
        Some(id.to_owned())
    }

    fn check_metadata(&mut self, root: &Map<String, Value>) {
        let Some(value) = root.get("metadata") else {
            return;
        };
        let Some(meta) = value.as_object() else {
            self.wrong_type("metadata", "an object", value);
            return;
        };
        if let Some(name) = self.required_str(meta, "metadata", "name") {
            self.length_between(name, "metadata.name", 1, 128);
        }
        if let Some(version) = self.required_str(meta, "metadata", "version") {
            let plain = semver::Version::parse(version)
                .is_ok_and(|v| v.pre.is_empty() && v.build.is_empty());
            if !plain {
                self.critical(
                    code::INVALID_VALUE,
                    format!("metadata.version '{version}' must match 'x.y.z'"),
                    "metadata.version",
                );
            }
        }
        if let Some(description) = self.required_str(meta, "metadata", "description") {
            self.length_between(description, "metadata.description", 1, 1024);
        }
        if let Some(value) = self.required(meta, "metadata", "tags") {
            let tags = self.string_array(value, "metadata.tags");
            let count = value.as_array().map_or(0, Vec::len);
            if value.is_array() && !(1..=10).contains(&count) {
                self.critical(
                    code::INVALID_VALUE,
                    format!("metadata.tags must have 1-10 items, got {count}"),
                    "metadata.tags",
                );
            }
            let mut seen = HashSet::new();
            for tag in tags {
                if !seen.insert(tag) {
                    self.warning(
                        code::DUPLICATE_TAG,
                        format!("metadata.tags repeats '{tag}'"),
                        "metadata.tags",
                    );
                }
            }
        }
        self.optional_str(meta, "metadata", "author");
        self.optional_str(meta, "metadata", "license");
    }

    fn check_trigger(&mut self, root: &Map<String, Value>) {
        let Some(value) = root.get("trigger") else {
            return;
        };
        let Some(trigger) = value.as_object() else {
            self.wrong_type("trigger", "an object", value);
            return;
        };
        if let Some(kind) = self.required_str(trigger, "trigger", "type")
            && !self.shape.trigger_types.contains(kind)
        {
            self.critical(
                code::INVALID_VALUE,
                format!("unknown trigger type '{kind}'"),
                "trigger.type",
            );
        }
        self.optional_str(trigger, "trigger", "description");

        let Some(value) = self.required(trigger, "trigger", "conditions") else {
            return;
        };
        let Some(conditions) = value.as_array() else {
            self.wrong_type("trigger.conditions", "an array", value);
            return;
        };
        if conditions.is_empty() {
            self.critical(
                code::INVALID_VALUE,
                "trigger must have at least one condition",
                "trigger.conditions",
            );
        }
        for (i, cond) in conditions.iter().enumerate() {
            let loc = format!("trigger.conditions[{i}]");
            let Some(cond) = cond.as_object() else {
                self.wrong_type(&loc, "an object", cond);
                continue;
            };
            self.required_str(cond, &loc, "field");
            if let Some(op) = self.required_str(cond, &loc, "operator")
                && !self.shape.condition_operators.contains(op)
            {
                self.critical(
                    code::INVALID_VALUE,
                    format!("unknown condition operator '{op}'"),
                    join(&loc, "operator"),
                );
            }
        }
    }

    fn check_params(&mut self, value: &Value, location: &str) {
        let Some(params) = value.as_array() else {
            self.wrong_type(location, "an array", value);
            return;
        };
        for (i, param) in params.iter().enumerate() {
            let loc = format!("{location}[{i}]");
            let Some(param) = param.as_object() else {
                self.wrong_type(&loc, "an object", param);
                continue;
            };
            self.required_str(param, &loc, "name");
            if let Some(kind) = self.required_str(param, &loc, "type")
                && !self.shape.param_types.contains(kind)
            {
                self.critical(
                    code::UNKNOWN_PARAM_TYPE,
                    format!("unknown parameter type '{kind}'"),
                    join(&loc, "type"),
                );
            }
            self.optional_str(param, &loc, "description");
        }
    }

    fn check_io_schemas(&mut self, root: &Map<String, Value>) {
        if let Some(value) = root.get("input_schema") {
            match value.as_object() {
                Some(input) => {
                    for key in ["required_params", "optional_params"] {
                        if let Some(params) = input.get(key) {
                            self.check_params(params, &join("input_schema", key));
                        }
                    }
                }
                None => self.wrong_type("input_schema", "an object", value),
            }
        }
        if let Some(value) = root.get("output_schema") {
            match value.as_object() {
                Some(output) => {
                    if let Some(fields) = output.get("fields") {
                        self.check_params(fields, "output_schema.fields");
                    }
                }
                None => self.wrong_type("output_schema", "an object", value),
            }
        }
    }

    fn check_graph(&mut self, root: &Map<String, Value>) -> Option<ExecutionDag> {
        let value = root.get("execution_dag")?;
        if let Err(reason) = graph_shape(value) {
            self.critical(code::MALFORMED_GRAPH, reason, "execution_dag");
            return None;
        }
        match serde_json::from_value::<ExecutionDag>(value.clone()) {
            Ok(dag) => Some(dag),
            Err(e) => {
                self.critical(code::MALFORMED_GRAPH, e.to_string(), "execution_dag");
                None
            }
        }
    }

    fn check_security(&mut self, tables: &RuleTables, root: &Map<String, Value>) -> SecurityPolicy {
        let Some(value) = root.get("security") else {
            return SecurityPolicy::default();
        };
        let Some(security) = value.as_object() else {
            self.wrong_type("security", "an object", value);
            return SecurityPolicy::default();
        };

        for key in ["network_whitelist", "dangerous_patterns", "env_whitelist"] {
            if let Some(list) = security.get(key) {
                self.string_array(list, &join("security", key));
            }
        }
        if let Some(perms) = security.get("file_permissions") {
            match perms.as_object() {
                Some(perms) => {
                    for key in ["read", "write"] {
                        let loc = join("security.file_permissions", key);
                        let Some(list) = perms.get(key) else {
                            continue;
                        };
                        for path in self.string_array(list, &loc) {
                            let folded = path.trim().to_ascii_lowercase();
                            if BROAD_FILE_SCOPES.contains(&folded.as_str()) {
                                self.critical(
                                    code::FILE_SCOPE_TOO_BROAD,
                                    format!("file permission '{path}' covers the whole filesystem"),
                                    loc.clone(),
                                );
                            } else if let Some(entry) = tables.sensitive_path(path) {
                                self.critical(
                                    code::SENSITIVE_FILE_SCOPE,
                                    format!(
                                        "file permission '{path}' reaches \
                                         sensitive location '{entry}'"
                                    ),
                                    loc.clone(),
                                );
                            }
                        }
                    }
                }
                None => self.wrong_type("security.file_permissions", "an object", perms),
            }
        }
        if let Some(ms) = self.required(security, "security", "max_execution_time_ms")
            && !ms.as_u64().is_some_and(|ms| ms > 0)
        {
            self.critical(
                code::INVALID_VALUE,
                "security.max_execution_time_ms must be a positive integer",
                "security.max_execution_time_ms",
            );
        }
        if let Some(retries) = security.get("max_retries")
            && retries.as_u64().is_none()
        {
            self.critical(
                code::INVALID_VALUE,
                "security.max_retries must be a non-negative integer",
                "security.max_retries",
            );
        }
        if let Some(level) = security.get("sandbox_level") {
            match level.as_str() {
                Some(level) if self.shape.sandbox_levels.contains(level) => {}
                Some(level) => self.critical(
                    code::INVALID_VALUE,
                    format!("unknown sandbox_level '{level}'"),
                    "security.sandbox_level",
                ),
                None => self.wrong_type("security.sandbox_level", "a string", level),
            }
        }

        let policy = SecurityPolicy::lenient(value);
        if policy.is_strict() {
            if policy.max_execution_time_ms > STRICT_MAX_EXECUTION_MS {
                self.critical(
                    code::POLICY_LIMIT_EXCEEDED,
                    format!(
                        "strict sandbox allows at most {STRICT_MAX_EXECUTION_MS} ms, got {}",
                        policy.max_execution_time_ms
                    ),
                    "security.max_execution_time_ms",
                );
            }
            if policy.max_retries > STRICT_MAX_RETRIES {
                self.critical(
                    code::POLICY_LIMIT_EXCEEDED,
                    format!(
                        "strict sandbox allows at most {STRICT_MAX_RETRIES} retries, got {}",
                        policy.max_retries
                    ),
                    "security.max_retries",
                );
            }
        }
        policy
    }

    fn check_mcp(&mut self, root: &Map<String, Value>) {
        if let Some(value) = root.get("mcp_compatible")
            && !value.is_boolean()
        {
            self.wrong_type("mcp_compatible", "a boolean", value);
        }
        if let Some(value) = root.get("required_mcp_capabilities") {
            self.string_array(value, "required_mcp_capabilities");
        }
    }

    fn check_file_actions(
        &mut self,
        tables: &RuleTables,
        dag: &ExecutionDag,
        policy: &SecurityPolicy,
    ) {
        let perms = &policy.file_permissions;
        if !perms.read.is_empty() || !perms.write.is_empty() {
            return;
        }
        for node in &dag.nodes {
            let is_file = tables
                .actions()
                .get(&node.action)
                .is_some_and(|spec| spec.category == ActionCategory::File);
            if is_file {
                self.warning(
                    code::FILE_ACTION_NO_PERMISSIONS,
                    format!(
                        "node '{}' uses file action '{}' but no file permissions are declared",
                        node.id, node.action
                    ),
                    format!("execution_dag.nodes.{}", node.id),
                );
            }
        }
    }
}

fn is_string_or_strings(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Array(items) => items.iter().all(Value::is_string),
        _ => false,
    }
}

/// Minimum shape the graph analyzer needs; semantic problems are left to it.
fn graph_shape(value: &Value) -> Result<(), String> {
    let dag = value
        .as_object()
        .ok_or_else(|| format!("execution_dag must be an object, found {}", type_name(value)))?;
    let nodes = dag
        .get("nodes")
        .ok_or("execution_dag.nodes is missing")?
        .as_array()
        .ok_or("execution_dag.nodes must be an array")?;
    for (i, node) in nodes.iter().enumerate() {
        let node = node
            .as_object()
            .ok_or_else(|| format!("execution_dag.nodes[{i}] must be an object"))?;
        for key in ["id", "action"] {
            if !node.get(key).is_some_and(Value::is_string) {
                return Err(format!("execution_dag.nodes[{i}].{key} must be a string"));
            }
        }
    }
    if let Some(edges) = dag.get("edges") {
        let edges = edges.as_array().ok_or("execution_dag.edges must be an array")?;
        for (i, edge) in edges.iter().enumerate() {
            let edge = edge
                .as_object()
                .ok_or_else(|| format!("execution_dag.edges[{i}] must be an object"))?;
            for key in ["from", "to"] {
                if !edge.get(key).is_some_and(Value::is_string) {
                    return Err(format!("execution_dag.edges[{i}].{key} must be a string"));
                }
            }
            for key in ["label", "condition"] {
                if let Some(v) = edge.get(key)
                    && !v.is_string()
                    && !v.is_null()
                {
                    return Err(format!("execution_dag.edges[{i}].{key} must be a string"));
                }
            }
        }
    }
    for key in ["entry_node", "exit_node", "exit_nodes"] {
        if let Some(v) = dag.get(key)
            && !is_string_or_strings(v)
        {
            return Err(format!("execution_dag.{key} must be a string or an array of strings"));
        }
    }
    Ok(())
}

fn parse_signatures(root: &Map<String, Value>) -> (Vec<Signature>, Vec<ValidationIssue>) {
    let mut signatures = Vec::new();
    let mut issues = Vec::new();
    let Some(value) = root.get("signatures") else {
        return (signatures, issues);
    };
    let malformed = |message: String, location: String| {
        ValidationIssue::warning(
            Layer::Trust,
            IssueKind::SignatureError,
            code::MALFORMED_SIGNATURE,
            message,
        )
        .at(location)
    };
    let Some(entries) = value.as_array() else {
        issues.push(malformed(
            format!("signatures must be an array, found {}", type_name(value)),
            "signatures".into(),
        ));
        return (signatures, issues);
    };
    for (i, entry) in entries.iter().enumerate() {
        match serde_json::from_value::<Signature>(entry.clone()) {
            Ok(sig) => signatures.push(sig),
            Err(e) => issues.push(malformed(
                format!("signature dropped: {e}"),
                format!("signatures[{i}]"),
            )),
        }
    }
    (signatures, issues)
}

/// Run every structural check over a raw descriptor.
#[must_use]
pub fn validate_schema(value: &Value, tables: &RuleTables) -> SchemaReport {
    let mut checker = Checker {
        shape: tables.schema(),
        issues: Vec::new(),
    };
    let Some(root) = value.as_object() else {
        checker.issues.push(ValidationIssue::critical(
            Layer::Schema,
            IssueKind::StructuralError,
            code::NOT_AN_OBJECT,
            format!("descriptor must be a JSON object, found {}", type_name(value)),
        ));
        return SchemaReport {
            issues: checker.issues,
            ..SchemaReport::default()
        };
    };

    checker.check_top_level(root);
    checker.check_version(root);
    let skill_id = checker.check_skill_id(root);
    checker.optional_str(root, "", "version");
    checker.check_metadata(root);
    checker.check_trigger(root);
    checker.check_io_schemas(root);
    let dag = checker.check_graph(root);
    let security = checker.check_security(tables, root);
    checker.check_mcp(root);
    if let Some(dag) = &dag {
        checker.check_file_actions(tables, dag, &security);
    }
    let (signatures, signature_issues) = parse_signatures(root);

    SchemaReport {
        issues: checker.issues,
        signature_issues,
        skill_id,
        dag,
        security,
        signatures,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn descriptor() -> Value {
        json!({
            "jade_version": "1.0.0",
            "skill_id": "fetch_weather",
            "metadata": {
                "name": "Fetch weather",
                "version": "1.0.0",
                "description": "Reads the forecast for a city",
                "tags": ["weather", "http"]
            },
            "trigger": {
                "type": "task_intent",
                "conditions": [{"field": "intent", "operator": "equals", "value": "weather"}]
            },
            "input_schema": {
                "required_params": [{"name": "city", "type": "string"}]
            },
            "execution_dag": {
                "nodes": [
                    {"id": "fetch", "action": "http_get", "params": {
                        "url": "https://api.weather.example/v1?q={{input.city}}"
                    }},
                    {"id": "done", "action": "return_result", "params": {}}
                ],
                "edges": [{"from": "fetch", "to": "done"}],
                "entry_node": "fetch",
                "exit_node": "done"
            },
            "security": {
                "network_whitelist": ["api.weather.example"],
                "file_permissions": {"read": [], "write": []},
                "max_execution_time_ms": 5000,
                "max_retries": 1,
                "sandbox_level": "strict"
            }
        })
    }

    fn validate(value: &Value) -> SchemaReport {
        validate_schema(value, &RuleTables::builtin())
    }

    fn codes(report: &SchemaReport) -> Vec<&str> {
        report.issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn well_formed_descriptor_passes() {
        let value = descriptor();
        let report = validate(&value);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.skill_id.as_deref(), Some("fetch_weather"));
        assert_eq!(report.dag.as_ref().map(|d| d.nodes.len()), Some(2));
        assert_eq!(report.security.network_whitelist, ["api.weather.example"]);
        let typed = report.descriptor(&value).unwrap();
        assert_eq!(typed.metadata.tags, ["weather", "http"]);
    }

    #[test]
    fn every_missing_field_is_named() {
        let mut value = descriptor();
        let root = value.as_object_mut().unwrap();
        root.remove("trigger");
        root.remove("security");
        let report = validate(&value);
        let missing: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.code == code::MISSING_FIELD)
            .filter_map(|i| i.location.as_deref())
            .collect();
        assert_eq!(missing, ["trigger", "security"]);
        assert!(!report.passed());
    }

    #[test]
    fn not_an_object() {
        let report = validate(&json!([1, 2]));
        assert_eq!(codes(&report), [code::NOT_AN_OBJECT]);
        assert!(report.dag.is_none());
    }

    #[test]
    fn unknown_field_warns() {
        let mut value = descriptor();
        value["payload"] = json!("x");
        let report = validate(&value);
        assert_eq!(codes(&report), [code::UNKNOWN_FIELD]);
        assert!(report.passed());
    }

    #[test]
    fn unsupported_version() {
        let mut value = descriptor();
        value["jade_version"] = json!("2.1.0");
        assert_eq!(codes(&validate(&value)), [code::UNSUPPORTED_VERSION]);
        value["jade_version"] = json!("one");
        assert_eq!(codes(&validate(&value)), [code::UNSUPPORTED_VERSION]);
    }

    #[test]
    fn bad_skill_id() {
        let mut value = descriptor();
        value["skill_id"] = json!("Fetch-Weather");
        assert_eq!(codes(&validate(&value)), [code::INVALID_SKILL_ID]);
    }

    #[test]
    fn metadata_limits() {
        let mut value = descriptor();
        value["metadata"]["name"] = json!("");
        value["metadata"]["version"] = json!("1.0");
        value["metadata"]["tags"] = json!(["a", "a"]);
        let report = validate(&value);
        assert_eq!(
            codes(&report),
            [code::INVALID_VALUE, code::INVALID_VALUE, code::DUPLICATE_TAG]
        );
    }

    #[test]
    fn unknown_param_type_is_critical() {
        let mut value = descriptor();
        value["input_schema"]["required_params"][0]["type"] = json!("blob");
        let report = validate(&value);
        assert_eq!(codes(&report), [code::UNKNOWN_PARAM_TYPE]);
        assert!(!report.passed());
    }

    #[test]
    fn trigger_needs_conditions() {
        let mut value = descriptor();
        value["trigger"]["conditions"] = json!([]);
        value["trigger"]["type"] = json!("telepathy");
        assert_eq!(
            codes(&validate(&value)),
            [code::INVALID_VALUE, code::INVALID_VALUE]
        );
    }

    #[test]
    fn malformed_graph_withholds_dag() {
        let mut value = descriptor();
        value["execution_dag"]["nodes"][0] = json!({"id": 7, "action": "log"});
        let report = validate(&value);
        assert_eq!(codes(&report), [code::MALFORMED_GRAPH]);
        assert!(report.dag.is_none());

        value["execution_dag"] = json!("a -> b");
        assert!(validate(&value).dag.is_none());
    }

    #[test]
    fn semantically_wrong_graph_still_parses() {
        let mut value = descriptor();
        value["execution_dag"]["edges"] = json!([{"from": "fetch", "to": "ghost"}]);
        value["execution_dag"]["entry_node"] = json!(["fetch", "done"]);
        let report = validate(&value);
        assert!(report.issues.is_empty());
        assert_eq!(report.dag.unwrap().entry_nodes.len(), 2);
    }

    #[test]
    fn strict_sandbox_limits() {
        let mut value = descriptor();
        value["security"]["max_execution_time_ms"] = json!(600_000);
        value["security"]["max_retries"] = json!(50);
        assert_eq!(
            codes(&validate(&value)),
            [code::POLICY_LIMIT_EXCEEDED, code::POLICY_LIMIT_EXCEEDED]
        );
        value["security"]["sandbox_level"] = json!("standard");
        assert!(validate(&value).issues.is_empty());
    }

    #[test]
    fn whole_filesystem_permission() {
        let mut value = descriptor();
        value["security"]["file_permissions"]["write"] = json!(["/tmp/out", "/"]);
        assert_eq!(codes(&validate(&value)), [code::FILE_SCOPE_TOO_BROAD]);
    }

    #[test]
    fn sensitive_permission_paths() {
        for path in ["/dev/", "/sys", "/proc/1/mem", "~/.aws/", "~/.kube/config"] {
            let mut value = descriptor();
            value["security"]["file_permissions"]["write"] = json!(["/tmp/out", path]);
            let report = validate(&value);
            assert_eq!(codes(&report), [code::SENSITIVE_FILE_SCOPE], "{path}");
            assert_eq!(
                report.issues[0].location.as_deref(),
                Some("security.file_permissions.write")
            );
        }
    }

    #[test]
    fn file_action_without_permissions_warns() {
        let mut value = descriptor();
        value["execution_dag"]["nodes"][1]["action"] = json!("file_write");
        let report = validate(&value);
        assert_eq!(codes(&report), [code::FILE_ACTION_NO_PERMISSIONS]);
        assert!(report.passed());
    }

    #[test]
    fn malformed_signature_dropped_with_warning() {
        let mut value = descriptor();
        value["signatures"] = json!([
            {
                "signer_id": "a",
                "public_key_ref": "root",
                "bytes": "x",
                "issued_at": "2026-01-01T00:00:00Z"
            },
            {"signer_id": "b"}
        ]);
        let report = validate(&value);
        assert!(report.issues.is_empty());
        assert_eq!(report.signatures.len(), 1);
        assert_eq!(report.signature_issues.len(), 1);
        assert_eq!(report.signature_issues[0].layer, Layer::Trust);
        assert_eq!(report.signature_issues[0].location.as_deref(), Some("signatures[1]"));
    }
}
