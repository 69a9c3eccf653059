//! Pipeline dependency DAG construction and cycle detection.
//!
//! A node is a fully-qualified pipeline identifier; edges point from a
//! pipeline to each upstream table its SQL references via `ref()`. Built
//! eagerly from already-loaded sources — nothing here talks to the object
//! store or catalog.

use std::collections::{HashMap, HashSet};

use rat_templating::extract_dependencies;

/// Fully-qualified pipeline identifier: the DAG's node type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineRef {
    pub namespace: String,
    pub layer: String,
    pub name: String,
}

impl PipelineRef {
    pub fn new(namespace: impl Into<String>, layer: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), layer: layer.into(), name: name.into() }
    }
}

impl std::fmt::Display for PipelineRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.namespace, self.layer, self.name)
    }
}

/// A pipeline with its SQL source, as input to `build_dag`.
#[derive(Debug, Clone)]
pub struct PipelineSource {
    pub namespace: String,
    pub layer: String,
    pub name: String,
    pub sql: String,
}

pub type Dag = HashMap<PipelineRef, HashSet<PipelineRef>>;

/// Build a dependency adjacency map from each pipeline's `ref()` calls.
/// A bare `"layer.name"` ref resolves against `default_namespace`; a
/// `"ns.layer.name"` ref is fully explicit. Malformed refs are logged and
/// skipped rather than rejected outright — one bad reference shouldn't
/// block DAG construction for every other pipeline.
pub fn build_dag(pipelines: &[PipelineSource], default_namespace: &str) -> Dag {
    let mut dag = Dag::new();

    for p in pipelines {
        let key = PipelineRef::new(p.namespace.clone(), p.layer.clone(), p.name.clone());
        let mut deps = HashSet::new();

        for r in extract_dependencies(&p.sql) {
            let parts: Vec<&str> = r.splitn(3, '.').collect();
            let dep = match parts.as_slice() {
                [layer, name] => PipelineRef::new(default_namespace, *layer, *name),
                [ns, layer, name] => PipelineRef::new(*ns, *layer, *name),
                _ => {
                    tracing::warn!(reference = %r, pipeline = %key, "invalid ref, skipping");
                    continue;
                }
            };
            deps.insert(dep);
        }

        dag.insert(key, deps);
    }

    dag
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Detect every cycle in `dag` via iterative three-color DFS, returning
/// each as the ordered node path `[target, ..., current, target]`.
pub fn detect_cycles(dag: &Dag) -> Vec<Vec<PipelineRef>> {
    let mut color: HashMap<PipelineRef, Color> = dag.keys().map(|n| (n.clone(), Color::White)).collect();
    let mut parent: HashMap<PipelineRef, Option<PipelineRef>> = HashMap::new();
    let mut cycles = Vec::new();

    let starts: Vec<PipelineRef> = dag.keys().cloned().collect();
    for start in starts {
        if color[&start] != Color::White {
            continue;
        }
        parent.insert(start.clone(), None);

        let mut stack: Vec<(PipelineRef, bool)> = vec![(start, false)];
        while let Some((node, backtrack)) = stack.pop() {
            if backtrack {
                color.insert(node, Color::Black);
                continue;
            }

            let node_color = color.get(&node).copied().unwrap_or(Color::White);
            if node_color == Color::Black || node_color == Color::Gray {
                continue;
            }

            color.insert(node.clone(), Color::Gray);
            stack.push((node.clone(), true));

            let Some(deps) = dag.get(&node) else { continue };
            for dep in deps {
                let Some(&dep_color) = color.get(dep) else {
                    // Reference to a pipeline outside the DAG — external, skip.
                    continue;
                };
                match dep_color {
                    Color::Gray => {
                        if let Some(cycle) = reconstruct_cycle(&node, dep, &parent) {
                            cycles.push(cycle);
                        }
                    }
                    Color::White => {
                        parent.insert(dep.clone(), Some(node.clone()));
                        stack.push((dep.clone(), false));
                    }
                    Color::Black => {}
                }
            }
        }
    }

    cycles
}

fn reconstruct_cycle(
    current: &PipelineRef,
    target: &PipelineRef,
    parent: &HashMap<PipelineRef, Option<PipelineRef>>,
) -> Option<Vec<PipelineRef>> {
    let mut path = vec![current.clone()];
    let mut seen = HashSet::new();
    seen.insert(current.clone());
    let mut node = current.clone();

    while &node != target {
        let Some(Some(p)) = parent.get(&node) else { break };
        if seen.contains(p) {
            break;
        }
        path.push(p.clone());
        seen.insert(p.clone());
        node = p.clone();
    }
    path.push(target.clone());
    path.reverse();
    Some(path)
}

/// Build the DAG and format every detected cycle as a human-readable
/// error message. Empty return means the pipeline set is acyclic.
pub fn validate_dag(pipelines: &[PipelineSource], default_namespace: &str) -> Vec<String> {
    let dag = build_dag(pipelines, default_namespace);
    detect_cycles(&dag)
        .into_iter()
        .map(|cycle| {
            let path = cycle.iter().map(PipelineRef::to_string).collect::<Vec<_>>().join(" -> ");
            format!("Circular dependency detected: {path}")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(ns: &str, layer: &str, name: &str, sql: &str) -> PipelineSource {
        PipelineSource { namespace: ns.to_string(), layer: layer.to_string(), name: name.to_string(), sql: sql.to_string() }
    }

    #[test]
    fn builds_dag_with_implicit_and_explicit_namespaces() {
        let pipelines = vec![
            src("default", "silver", "orders", "select * from {{ ref('bronze.raw_orders') }}"),
            src("default", "gold", "summary", "select * from {{ ref('tenant.silver.orders') }}"),
        ];
        let dag = build_dag(&pipelines, "default");
        let orders_key = PipelineRef::new("default", "silver", "orders");
        let summary_key = PipelineRef::new("default", "gold", "summary");
        assert!(dag[&orders_key].contains(&PipelineRef::new("default", "bronze", "raw_orders")));
        assert!(dag[&summary_key].contains(&PipelineRef::new("tenant", "silver", "orders")));
    }

    #[test]
    fn acyclic_dag_has_no_cycles() {
        let pipelines = vec![
            src("default", "silver", "orders", "select * from {{ ref('bronze.raw_orders') }}"),
            src("default", "bronze", "raw_orders", "select 1"),
        ];
        assert!(validate_dag(&pipelines, "default").is_empty());
    }

    #[test]
    fn detects_direct_cycle() {
        let pipelines = vec![
            src("default", "silver", "a", "select * from {{ ref('silver.b') }}"),
            src("default", "silver", "b", "select * from {{ ref('silver.a') }}"),
        ];
        let errors = validate_dag(&pipelines, "default");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Circular dependency detected"));
        assert!(errors[0].contains("default.silver.a"));
        assert!(errors[0].contains("default.silver.b"));
    }

    #[test]
    fn detects_self_cycle() {
        let pipelines = vec![src("default", "silver", "a", "select * from {{ ref('silver.a') }}")];
        let errors = validate_dag(&pipelines, "default");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn external_ref_outside_pipeline_set_is_not_a_cycle() {
        let pipelines = vec![src("default", "silver", "a", "select * from {{ ref('silver.external') }}")];
        assert!(validate_dag(&pipelines, "default").is_empty());
    }
}
