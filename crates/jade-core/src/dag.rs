//! Execution graph safety proofs: acyclicity, reachability, termination and
//! action membership, all in O(V + E) over an index-addressed graph.

use std::collections::{HashMap, HashSet, VecDeque};

use jade_rules::RuleTables;
use serde::Serialize;

use crate::config::GraphConfig;
use crate::descriptor::ExecutionDag;
use crate::issue::{IssueKind, Layer, ValidationIssue, code};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEdge {
    pub from: usize,
    pub to: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Graph that passed every check, for presentation collaborators.
///
/// Indices refer to `nodes`; nothing here needs re-validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedDag {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<IndexEdge>,
    pub entry: usize,
    pub exits: Vec<usize>,
    pub topo_order: Vec<usize>,
    /// Edges on the longest path from the entry node.
    pub depth: usize,
}

impl ValidatedDag {
    #[must_use]
    pub fn node_id(&self, index: usize) -> Option<&str> {
        self.nodes.get(index).map(|n| n.id.as_str())
    }

    pub fn successors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.from == index)
            .map(|e| e.to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DagAnalysis {
    pub issues: Vec<ValidationIssue>,
    pub validated: Option<ValidatedDag>,
}

/// Cycles reported with their full path; further back edges are only counted.
const MAX_REPORTED_CYCLES: usize = 8;
/// Path ids spelled out in a cycle message.
const MESSAGE_PATH_NODES: usize = 6;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

struct Graph<'d> {
    ids: Vec<&'d str>,
    /// Position of each unique node in the declared node list.
    declared: Vec<usize>,
    adjacency: Vec<Vec<usize>>,
    edges: Vec<IndexEdge>,
}

struct Analyzer<'d> {
    dag: &'d ExecutionDag,
    issues: Vec<ValidationIssue>,
}

impl<'d> Analyzer<'d> {
    fn critical(&mut self, code: &str, message: String, location: String) -> &mut ValidationIssue {
        let issue = ValidationIssue::critical(Layer::Dag, IssueKind::GraphError, code, message);
        self.issues.push(issue.at(location));
        let last = self.issues.len() - 1;
        &mut self.issues[last]
    }

    fn warning(&mut self, code: &str, message: String, location: String) {
        self.issues.push(
            ValidationIssue::warning(Layer::Dag, IssueKind::PolicyWarning, code, message)
                .at(location),
        );
    }

    fn build(&mut self, tables: &RuleTables) -> (Graph<'d>, HashMap<&'d str, usize>) {
        let dag = self.dag;
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(dag.nodes.len());
        let mut ids = Vec::with_capacity(dag.nodes.len());
        let mut declared = Vec::with_capacity(dag.nodes.len());

        for (pos, node) in dag.nodes.iter().enumerate() {
            if index.contains_key(node.id.as_str()) {
                self.critical(
                    code::DUPLICATE_NODE,
                    format!("node id '{}' is declared more than once", node.id),
                    format!("execution_dag.nodes[{pos}]"),
                );
                continue;
            }
            index.insert(node.id.as_str(), ids.len());
            ids.push(node.id.as_str());
            declared.push(pos);
            if !tables.actions().contains(&node.action) {
                self.critical(
                    code::UNKNOWN_ACTION,
                    format!("node '{}' uses unknown action '{}'", node.id, node.action),
                    format!("execution_dag.nodes[{pos}].action"),
                );
            }
        }

        let labels = &tables.schema().edge_labels;
        let mut adjacency = vec![Vec::new(); ids.len()];
        let mut linked = HashSet::with_capacity(dag.edges.len());
        let mut edges = Vec::with_capacity(dag.edges.len());
        for (pos, edge) in dag.edges.iter().enumerate() {
            let location = format!("execution_dag.edges[{pos}]");
            let (Some(&from), Some(&to)) =
                (index.get(edge.from.as_str()), index.get(edge.to.as_str()))
            else {
                let missing = if index.contains_key(edge.from.as_str()) {
                    &edge.to
                } else {
                    &edge.from
                };
                self.critical(
                    code::DANGLING_EDGE,
                    format!(
                        "edge {} -> {} references unknown node '{missing}'",
                        edge.from, edge.to
                    ),
                    location,
                );
                continue;
            };
            let label = edge.branch().map(str::to_owned);
            if let Some(l) = &label
                && !labels.contains(l)
            {
                self.warning(
                    code::UNKNOWN_EDGE_LABEL,
                    format!("edge {} -> {} has unknown label '{l}'", edge.from, edge.to),
                    location,
                );
            }
            if linked.insert((from, to)) {
                adjacency[from].push(to);
            }
            edges.push(IndexEdge { from, to, label });
        }

        (
            Graph {
                ids,
                declared,
                adjacency,
                edges,
            },
            index,
        )
    }

    fn entry(&mut self, index: &HashMap<&str, usize>) -> Option<usize> {
        let dag = self.dag;
        let entries = &dag.entry_nodes;
        if entries.len() != 1 {
            self.critical(
                code::ENTRY_NODE_COUNT,
                format!("exactly one entry node is required, found {}", entries.len()),
                "execution_dag.entry_node".into(),
            );
            return None;
        }
        let id = &entries[0];
        let found = index.get(id.as_str()).copied();
        if found.is_none() {
            self.critical(
                code::UNKNOWN_ENTRY_NODE,
                format!("entry node '{id}' is not declared"),
                "execution_dag.entry_node".into(),
            );
        }
        found
    }

    fn exits(&mut self, index: &HashMap<&str, usize>, count: usize) -> Vec<bool> {
        let dag = self.dag;
        let mut is_exit = vec![false; count];
        if dag.exit_nodes.is_empty() {
            self.critical(
                code::NO_EXIT_NODES,
                "at least one exit node must be declared".into(),
                "execution_dag.exit_nodes".into(),
            );
        }
        for id in &dag.exit_nodes {
            match index.get(id.as_str()) {
                Some(&i) => is_exit[i] = true,
                None => {
                    self.critical(
                        code::UNKNOWN_EXIT_NODE,
                        format!("exit node '{id}' is not declared"),
                        "execution_dag.exit_nodes".into(),
                    );
                }
            }
        }
        is_exit
    }

    /// Three-color DFS with an explicit stack. Each node closes at most one
    /// reported cycle and only the first few cycles carry a path, so the
    /// report stays linear in the input.
    fn cycles(&mut self, graph: &Graph<'_>) {
        let n = graph.ids.len();
        let mut color = vec![Color::White; n];
        let mut position = vec![usize::MAX; n];
        let mut closed = vec![false; n];
        let mut reported = 0;
        let mut unreported = 0usize;
        // (node, next successor slot)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for start in 0..n {
            if color[start] != Color::White {
                continue;
            }
            color[start] = Color::Gray;
            position[start] = 0;
            stack.push((start, 0));

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                if let Some(&next) = graph.adjacency[node].get(top.1) {
                    top.1 += 1;
                    match color[next] {
                        Color::White => {
                            color[next] = Color::Gray;
                            position[next] = stack.len();
                            stack.push((next, 0));
                        }
                        Color::Gray if closed[next] || reported >= MAX_REPORTED_CYCLES => {
                            unreported += 1;
                        }
                        Color::Gray => {
                            closed[next] = true;
                            reported += 1;
                            let mut path: Vec<String> = stack[position[next]..]
                                .iter()
                                .map(|&(i, _)| graph.ids[i].to_owned())
                                .collect();
                            path.push(graph.ids[next].to_owned());
                            let location =
                                format!("execution_dag.nodes[{}]", graph.declared[next]);
                            let message = cycle_message(&path);
                            self.critical(code::CYCLE_DETECTED, message, location).path = path;
                        }
                        Color::Black => {}
                    }
                } else {
                    color[node] = Color::Black;
                    stack.pop();
                }
            }
        }

        if unreported > 0 {
            self.critical(
                code::CYCLE_DETECTED,
                format!("{unreported} further back edges close cycles already reported"),
                "execution_dag.edges".into(),
            );
        }
    }

    fn reachability(&mut self, graph: &Graph<'_>, entry: usize) {
        let mut reached = vec![false; graph.ids.len()];
        let mut queue = VecDeque::from([entry]);
        reached[entry] = true;
        while let Some(node) = queue.pop_front() {
            for &next in &graph.adjacency[node] {
                if !reached[next] {
                    reached[next] = true;
                    queue.push_back(next);
                }
            }
        }
        for (i, ok) in reached.iter().enumerate() {
            if !ok {
                self.critical(
                    code::ORPHAN_NODE,
                    format!("node '{}' is unreachable from the entry node", graph.ids[i]),
                    format!("execution_dag.nodes[{}]", graph.declared[i]),
                );
            }
        }
    }

    fn termination(&mut self, graph: &Graph<'_>, is_exit: &[bool]) {
        for (i, successors) in graph.adjacency.iter().enumerate() {
            let location = format!("execution_dag.nodes[{}]", graph.declared[i]);
            match (successors.is_empty(), is_exit[i]) {
                (true, false) => {
                    self.critical(
                        code::DEAD_END,
                        format!(
                            "node '{}' has no outgoing edges but is not an exit node",
                            graph.ids[i]
                        ),
                        location,
                    );
                }
                (false, true) => {
                    self.critical(
                        code::EXIT_HAS_OUTGOING,
                        format!("exit node '{}' has outgoing edges", graph.ids[i]),
                        location,
                    );
                }
                _ => {}
            }
        }
    }

    fn branches(&mut self, graph: &Graph<'_>) {
        let mut success = vec![false; graph.ids.len()];
        let mut failure = vec![false; graph.ids.len()];
        for edge in &graph.edges {
            match edge.label.as_deref() {
                Some("success") => success[edge.from] = true,
                Some("failure") => failure[edge.from] = true,
                _ => {}
            }
        }
        for i in 0..graph.ids.len() {
            if success[i] != failure[i] {
                let (has, lacks) = if success[i] {
                    ("success", "failure")
                } else {
                    ("failure", "success")
                };
                self.warning(
                    code::INCOMPLETE_BRANCH,
                    format!("node '{}' has a {has} branch but no {lacks} branch", graph.ids[i]),
                    format!("execution_dag.nodes[{}]", graph.declared[i]),
                );
            }
        }
    }
}

fn cycle_message(path: &[String]) -> String {
    if path.len() <= MESSAGE_PATH_NODES {
        return format!("cycle detected: {}", path.join(" -> "));
    }
    format!(
        "cycle detected: {} -> {} -> ... -> {} ({} nodes)",
        path[0],
        path[1],
        path[path.len() - 1],
        path.len() - 1
    )
}

/// Kahn's algorithm with ties broken by declaration order, plus longest path.
fn order(graph: &Graph<'_>, entry: usize) -> (Vec<usize>, usize) {
    let n = graph.ids.len();
    let mut indegree = vec![0usize; n];
    for targets in &graph.adjacency {
        for &next in targets {
            indegree[next] += 1;
        }
    }
    let mut ready: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut topo = Vec::with_capacity(n);
    while let Some(node) = ready.pop_front() {
        topo.push(node);
        for &next in &graph.adjacency[node] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    let mut level: Vec<Option<usize>> = vec![None; n];
    level[entry] = Some(0);
    let mut depth = 0;
    for &node in &topo {
        let Some(here) = level[node] else {
            continue;
        };
        depth = depth.max(here);
        for &next in &graph.adjacency[node] {
            level[next] = Some(level[next].map_or(here + 1, |l| l.max(here + 1)));
        }
    }
    (topo, depth)
}

/// Analyze the declared graph. `None` means the schema layer could not parse it.
#[must_use]
pub fn analyze(
    dag: Option<&ExecutionDag>,
    tables: &RuleTables,
    config: &GraphConfig,
) -> DagAnalysis {
    let Some(dag) = dag else {
        return DagAnalysis {
            issues: vec![ValidationIssue::critical(
                Layer::Dag,
                IssueKind::GraphError,
                code::UNPARSEABLE_GRAPH,
                "execution graph could not be parsed; graph analysis skipped",
            )
            .at("execution_dag")],
            validated: None,
        };
    };
    if dag.nodes.len() > config.max_nodes || dag.edges.len() > config.max_edges {
        return DagAnalysis {
            issues: vec![ValidationIssue::critical(
                Layer::Dag,
                IssueKind::GraphError,
                code::GRAPH_TOO_LARGE,
                format!(
                    "graph has {} nodes and {} edges, limits are {} and {}",
                    dag.nodes.len(),
                    dag.edges.len(),
                    config.max_nodes,
                    config.max_edges
                ),
            )
            .at("execution_dag")],
            validated: None,
        };
    }

    let mut analyzer = Analyzer {
        dag,
        issues: Vec::new(),
    };
    let (graph, index) = analyzer.build(tables);
    let entry = analyzer.entry(&index);
    let is_exit = analyzer.exits(&index, graph.ids.len());
    analyzer.cycles(&graph);
    if let Some(entry) = entry {
        analyzer.reachability(&graph, entry);
    }
    analyzer.termination(&graph, &is_exit);
    analyzer.branches(&graph);

    let issues = analyzer.issues;
    let validated = match entry {
        Some(entry) if !issues.iter().any(ValidationIssue::is_critical) => {
            let (topo_order, depth) = order(&graph, entry);
            Some(ValidatedDag {
                nodes: graph
                    .declared
                    .iter()
                    .map(|&pos| GraphNode {
                        id: dag.nodes[pos].id.clone(),
                        action: dag.nodes[pos].action.clone(),
                    })
                    .collect(),
                exits: (0..graph.ids.len()).filter(|&i| is_exit[i]).collect(),
                edges: graph.edges,
                entry,
                topo_order,
                depth,
            })
        }
        _ => None,
    };
    DagAnalysis { issues, validated }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn graph(
        nodes: &[(&str, &str)],
        edges: &[(&str, &str)],
        entry: Value,
        exits: Value,
    ) -> ExecutionDag {
        let nodes: Vec<Value> = nodes
            .iter()
            .map(|(id, action)| json!({"id": id, "action": action}))
            .collect();
        let edges: Vec<Value> = edges
            .iter()
            .map(|(from, to)| json!({"from": from, "to": to}))
            .collect();
        serde_json::from_value(json!({
            "nodes": nodes,
            "edges": edges,
            "entry_node": entry,
            "exit_nodes": exits
        }))
        .unwrap()
    }

    fn run(dag: &ExecutionDag) -> DagAnalysis {
        analyze(Some(dag), &RuleTables::builtin(), &GraphConfig::default())
    }

    fn codes(analysis: &DagAnalysis) -> Vec<&str> {
        analysis.issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn two_node_chain_is_clean() {
        let dag = graph(
            &[("a", "http_get"), ("b", "return_result")],
            &[("a", "b")],
            json!("a"),
            json!(["b"]),
        );
        let analysis = run(&dag);
        assert!(analysis.issues.is_empty());
        let validated = analysis.validated.unwrap();
        assert_eq!(validated.topo_order, [0, 1]);
        assert_eq!(validated.depth, 1);
        assert_eq!(validated.exits, [1]);
        assert_eq!(validated.successors(0).collect::<Vec<_>>(), [1]);
        assert_eq!(validated.node_id(1), Some("b"));
    }

    #[test]
    fn two_cycle_reports_full_path() {
        let dag = graph(
            &[("A", "log"), ("B", "log"), ("C", "return_result")],
            &[("A", "B"), ("B", "A"), ("B", "C")],
            json!("A"),
            json!(["C"]),
        );
        let analysis = run(&dag);
        assert_eq!(codes(&analysis), [code::CYCLE_DETECTED]);
        assert_eq!(analysis.issues[0].path, ["A", "B", "A"]);
        assert!(analysis.validated.is_none());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let dag = graph(
            &[("a", "log"), ("b", "log")],
            &[("a", "a"), ("a", "b")],
            json!("a"),
            json!(["b"]),
        );
        let analysis = run(&dag);
        assert_eq!(codes(&analysis), [code::CYCLE_DETECTED]);
        assert_eq!(analysis.issues[0].path, ["a", "a"]);
    }

    #[test]
    fn many_back_edges_keep_report_small() {
        let ids: Vec<String> = (0..1000).map(|i| format!("{i:0>100}")).collect();
        let mut nodes: Vec<(&str, &str)> = ids.iter().map(|id| (id.as_str(), "log")).collect();
        nodes.push(("end", "return_result"));
        let mut edges: Vec<(&str, &str)> = ids
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
            .collect();
        let last = ids[999].as_str();
        for _ in 0..3 {
            edges.extend(ids.iter().map(|id| (last, id.as_str())));
        }
        edges.push((last, "end"));
        let dag = graph(&nodes, &edges, json!(ids[0]), json!(["end"]));

        let analysis = run(&dag);
        assert_eq!(codes(&analysis), [code::CYCLE_DETECTED; MAX_REPORTED_CYCLES + 1]);
        let text: usize = analysis
            .issues
            .iter()
            .map(|i| i.message.len() + i.path.iter().map(String::len).sum::<usize>())
            .sum();
        assert!(text < 2_000_000, "{text} bytes of cycle report");
        assert!(analysis.issues[MAX_REPORTED_CYCLES].path.is_empty());
        assert!(analysis.issues[MAX_REPORTED_CYCLES].message.starts_with("992 further"));
    }

    #[test]
    fn parallel_edges_do_not_repeat_cycles() {
        let dag = graph(
            &[("a", "log"), ("b", "log"), ("c", "return_result")],
            &[("a", "b"), ("b", "a"), ("b", "a"), ("b", "c"), ("b", "c")],
            json!("a"),
            json!(["c"]),
        );
        let analysis = run(&dag);
        assert_eq!(codes(&analysis), [code::CYCLE_DETECTED]);
        assert_eq!(analysis.issues[0].path, ["a", "b", "a"]);
    }

    #[test]
    fn long_cycle_message_is_abbreviated() {
        let path: Vec<String> = ["a", "b", "c", "d", "e", "f", "g", "a"].map(String::from).to_vec();
        assert_eq!(cycle_message(&path), "cycle detected: a -> b -> ... -> a (7 nodes)");
        assert_eq!(cycle_message(&path[..3]), "cycle detected: a -> b -> c");
    }

    #[test]
    fn orphan_and_dead_end() {
        let dag = graph(
            &[("a", "log"), ("b", "return_result"), ("c", "log")],
            &[("a", "b")],
            json!("a"),
            json!(["b"]),
        );
        assert_eq!(codes(&run(&dag)), [code::ORPHAN_NODE, code::DEAD_END]);
    }

    #[test]
    fn exit_with_outgoing_edge() {
        let dag = graph(
            &[("a", "log"), ("b", "log")],
            &[("a", "b")],
            json!("a"),
            json!(["a", "b"]),
        );
        assert_eq!(codes(&run(&dag)), [code::EXIT_HAS_OUTGOING]);
    }

    #[test]
    fn unknown_action() {
        let dag = graph(&[("a", "shell_exec")], &[], json!("a"), json!(["a"]));
        assert_eq!(codes(&run(&dag)), [code::UNKNOWN_ACTION]);
    }

    #[test]
    fn entry_multiplicity() {
        let dag = graph(&[("a", "log"), ("b", "log")], &[], json!(["a", "b"]), json!(["a", "b"]));
        assert_eq!(codes(&run(&dag)), [code::ENTRY_NODE_COUNT]);
        let dag = graph(&[("a", "log")], &[], json!([]), json!(["a"]));
        assert_eq!(codes(&run(&dag)), [code::ENTRY_NODE_COUNT]);
        let dag = graph(&[("a", "log")], &[], json!("ghost"), json!(["a"]));
        assert_eq!(codes(&run(&dag)), [code::UNKNOWN_ENTRY_NODE]);
    }

    #[test]
    fn exit_declarations() {
        let dag = graph(&[("a", "log")], &[], json!("a"), json!([]));
        assert_eq!(codes(&run(&dag)), [code::NO_EXIT_NODES, code::DEAD_END]);
        let dag = graph(&[("a", "log")], &[], json!("a"), json!(["a", "z"]));
        assert_eq!(codes(&run(&dag)), [code::UNKNOWN_EXIT_NODE]);
    }

    #[test]
    fn duplicate_node_and_dangling_edge() {
        let dag = graph(
            &[("a", "log"), ("a", "log"), ("b", "return_result")],
            &[("a", "b"), ("b", "ghost")],
            json!("a"),
            json!(["b"]),
        );
        let analysis = run(&dag);
        assert_eq!(codes(&analysis), [code::DUPLICATE_NODE, code::DANGLING_EDGE]);
        assert!(analysis.issues[1].message.contains("ghost"));
    }

    #[test]
    fn branch_labels() {
        let dag: ExecutionDag = serde_json::from_value(json!({
            "nodes": [
                {"id": "check", "action": "condition_check"},
                {"id": "ok", "action": "return_result"},
                {"id": "bad", "action": "return_error"},
                {"id": "other", "action": "return_result"}
            ],
            "edges": [
                {"from": "check", "to": "ok", "condition": "success"},
                {"from": "check", "to": "bad", "label": "failure"},
                {"from": "check", "to": "other", "label": "maybe"}
            ],
            "entry_node": "check",
            "exit_nodes": ["ok", "bad", "other"]
        }))
        .unwrap();
        let analysis = run(&dag);
        assert_eq!(codes(&analysis), [code::UNKNOWN_EDGE_LABEL]);
        assert!(analysis.validated.is_some());
    }

    #[test]
    fn one_sided_branch_warns() {
        let dag: ExecutionDag = serde_json::from_value(json!({
            "nodes": [
                {"id": "a", "action": "condition_check"},
                {"id": "b", "action": "return_result"}
            ],
            "edges": [{"from": "a", "to": "b", "condition": "success"}],
            "entry_node": "a",
            "exit_node": "b"
        }))
        .unwrap();
        let analysis = run(&dag);
        assert_eq!(codes(&analysis), [code::INCOMPLETE_BRANCH]);
        assert!(!analysis.issues[0].is_critical());
    }

    #[test]
    fn size_caps() {
        let dag = graph(&[("a", "log"), ("b", "log")], &[("a", "b")], json!("a"), json!(["b"]));
        let config = GraphConfig {
            max_nodes: 1,
            max_edges: 10,
        };
        let analysis = analyze(Some(&dag), &RuleTables::builtin(), &config);
        assert_eq!(codes(&analysis), [code::GRAPH_TOO_LARGE]);
    }

    #[test]
    fn unparseable_graph() {
        let analysis = analyze(None, &RuleTables::builtin(), &GraphConfig::default());
        assert_eq!(codes(&analysis), [code::UNPARSEABLE_GRAPH]);
    }

    #[test]
    fn diamond_depth_and_order() {
        let dag = graph(
            &[("s", "log"), ("l", "log"), ("r", "log"), ("x", "log"), ("e", "return_result")],
            &[("s", "l"), ("s", "r"), ("l", "x"), ("x", "e"), ("r", "e")],
            json!("s"),
            json!(["e"]),
        );
        let validated = run(&dag).validated.unwrap();
        assert_eq!(validated.depth, 3);
        assert_eq!(validated.topo_order, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn long_chain_does_not_overflow() {
        let ids: Vec<String> = (0..1000).map(|i| format!("n{i}")).collect();
        let nodes: Vec<(&str, &str)> = ids.iter().map(|id| (id.as_str(), "log")).collect();
        let edges: Vec<(&str, &str)> = ids
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
            .collect();
        let dag = graph(&nodes, &edges, json!("n0"), json!(["n999"]));
        let analysis = run(&dag);
        assert!(analysis.issues.is_empty());
        assert_eq!(analysis.validated.unwrap().depth, 999);
    }

    mod proptest_shapes {
        use proptest::prelude::*;

        use super::*;

        type Shape = (usize, Vec<usize>, Vec<(usize, usize)>);

        fn tree_with_extra_edges() -> impl Strategy<Value = Shape> {
            (2usize..40).prop_flat_map(|n| {
                let parents: Vec<_> = (1..n).map(|j| 0..j).collect();
                let extra = proptest::collection::vec((0..n, 0..n), 0..n);
                (Just(n), parents, extra)
            })
        }

        proptest! {
            #[test]
            fn reachable_terminating_dag_has_no_issues(
                (n, parents, extra) in tree_with_extra_edges()
            ) {
                let ids: Vec<String> = (0..n).map(|i| format!("n{i}")).collect();
                let mut edges: Vec<(usize, usize)> =
                    parents.iter().enumerate().map(|(j, &p)| (p, j + 1)).collect();
                edges.extend(extra.into_iter().filter(|(a, b)| a < b));
                let mut outdegree = vec![0; n];
                for &(from, _) in &edges {
                    outdegree[from] += 1;
                }
                let exits: Vec<&str> = (0..n)
                    .filter(|&i| outdegree[i] == 0)
                    .map(|i| ids[i].as_str())
                    .collect();
                let nodes: Vec<(&str, &str)> = ids.iter().map(|id| (id.as_str(), "log")).collect();
                let named: Vec<(&str, &str)> = edges
                    .iter()
                    .map(|&(a, b)| (ids[a].as_str(), ids[b].as_str()))
                    .collect();

                let dag = graph(&nodes, &named, json!("n0"), json!(exits));
                let analysis = run(&dag);
                prop_assert!(analysis.issues.is_empty(), "{:?}", analysis.issues);
                let validated = analysis.validated.unwrap();
                prop_assert_eq!(validated.topo_order.len(), n);
            }
        }
    }
}
