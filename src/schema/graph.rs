//! View dependency graph + Kahn's algorithm (spec §4.B).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::GenError;

/// Given `name -> {names this view's FROM/JOIN references that are
/// themselves views}`, return a deterministic topological order (views
/// with no remaining dependencies first, ties broken by name).
pub fn topological_order(deps: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, GenError> {
    // in_degree[v] = number of (in-graph) views v depends on.
    let mut remaining: BTreeMap<String, usize> = deps
        .iter()
        .map(|(view, edges)| (view.clone(), edges.iter().filter(|d| deps.contains_key(*d)).count()))
        .collect();

    let mut ready_sorted: Vec<String> = remaining
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(k, _)| k.clone())
        .collect();
    ready_sorted.sort();
    let mut ready: VecDeque<String> = ready_sorted.into();

    let mut order = Vec::new();

    while let Some(view) = pop_smallest(&mut ready) {
        order.push(view.clone());
        // Any view that depended on `view` gets its in-degree decremented.
        let mut newly_ready = Vec::new();
        for (candidate, edges) in deps {
            if edges.contains(&view) {
                if let Some(count) = remaining.get_mut(candidate) {
                    *count -= 1;
                    if *count == 0 && !order.contains(candidate) {
                        newly_ready.push(candidate.clone());
                    }
                }
            }
        }
        newly_ready.sort();
        for n in newly_ready {
            ready.push_back(n);
        }
    }

    if order.len() != deps.len() {
        let cyclic: Vec<String> = deps.keys().filter(|k| !order.contains(*k)).cloned().collect();
        return Err(GenError::ViewCycle {
            cycle: cyclic.join(", "),
        });
    }
    Ok(order)
}

fn pop_smallest(queue: &mut VecDeque<String>) -> Option<String> {
    if queue.is_empty() {
        return None;
    }
    // queue is kept roughly sorted by insertion (sorted batches); pop front.
    queue.pop_front()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps_of(pairs: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn orders_simple_chain() {
        let deps = deps_of(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let order = topological_order(&deps).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_cycle() {
        let deps = deps_of(&[("a", &["b"]), ("b", &["a"])]);
        let err = topological_order(&deps).unwrap_err();
        assert!(matches!(err, GenError::ViewCycle { .. }));
    }

    #[test]
    fn deterministic_tie_break() {
        let deps = deps_of(&[("z", &[]), ("a", &[]), ("m", &[])]);
        let order = topological_order(&deps).unwrap();
        assert_eq!(order, vec!["a", "m", "z"]);
    }
}
