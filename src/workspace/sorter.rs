//! Publish ordering
//!
//! Depth-first post-order over the registry: a package is emitted only after
//! every package it depends on. The walk keeps an explicit stack of
//! `(package index, remaining deps)` frames instead of recursing, so deep
//! graphs cannot overflow the call stack.

use std::collections::btree_set;

use crate::core::error::{PublishError, Result};

use super::graph::{PackageDetails, PackageRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    /// On the current DFS path
    Active,
    Done,
}

/// Order packages so that each one comes after all of its local deps.
///
/// Roots are taken in registry order, dependencies in name order.
///
/// # Errors
///
/// - `PublishError::MissingDependency` when a local dep is not in the
///   registry; `chain` runs from the root package to the missing name.
/// - `PublishError::DependencyCycle` when the graph is not acyclic.
pub fn topological_order(registry: &PackageRegistry) -> Result<Vec<&PackageDetails>> {
    let mut marks = vec![Mark::Unvisited; registry.len()];
    let mut order = Vec::with_capacity(registry.len());

    for root in 0..registry.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        let mut stack: Vec<(usize, btree_set::Iter<'_, String>)> =
            vec![(root, registry.by_index(root).local_deps.iter())];
        marks[root] = Mark::Active;

        loop {
            let Some((idx, deps)) = stack.last_mut() else {
                break;
            };
            let idx = *idx;

            let Some(dep) = deps.next() else {
                stack.pop();
                marks[idx] = Mark::Done;
                order.push(registry.by_index(idx));
                continue;
            };

            let Some(dep_idx) = registry.index_of(dep) else {
                let mut chain = path_names(registry, &stack);
                chain.push(dep.clone());
                return Err(PublishError::MissingDependency {
                    name: dep.clone(),
                    chain,
                });
            };

            match marks[dep_idx] {
                Mark::Done => {}
                Mark::Active => {
                    let start = stack
                        .iter()
                        .position(|(i, _)| *i == dep_idx)
                        .unwrap_or(0);
                    let mut chain = path_names(registry, &stack[start..]);
                    chain.push(dep.clone());
                    return Err(PublishError::DependencyCycle { chain });
                }
                Mark::Unvisited => {
                    marks[dep_idx] = Mark::Active;
                    stack.push((dep_idx, registry.by_index(dep_idx).local_deps.iter()));
                }
            }
        }
    }

    Ok(order)
}

fn path_names(
    registry: &PackageRegistry,
    frames: &[(usize, btree_set::Iter<'_, String>)],
) -> Vec<String> {
    frames
        .iter()
        .map(|(idx, _)| registry.by_index(*idx).name.clone())
        .collect()
}
