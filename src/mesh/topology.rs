//! Node adjacency and depth-first global numbering

use std::collections::{BTreeMap, BTreeSet};

/// Undirected node adjacency with neighbours sorted by external index
pub(crate) fn build_adjacency<N, E>(nodes: N, edges: E) -> BTreeMap<usize, Vec<usize>>
where
    N: IntoIterator<Item = usize>,
    E: IntoIterator<Item = (usize, usize)>,
{
    let mut sets: BTreeMap<usize, BTreeSet<usize>> =
        nodes.into_iter().map(|n| (n, BTreeSet::new())).collect();
    for (a, b) in edges {
        if a == b {
            continue;
        }
        sets.entry(a).or_default().insert(b);
        sets.entry(b).or_default().insert(a);
    }
    sets.into_iter()
        .map(|(n, neighbours)| (n, neighbours.into_iter().collect()))
        .collect()
}

/// Depth-first visiting order of all nodes
///
/// Roots are taken in ascending external index, neighbours are visited
/// smallest first. Disconnected parts restart from the smallest unvisited
/// node. The result lists external indices by global index.
pub(crate) fn depth_first_order(adjacency: &BTreeMap<usize, Vec<usize>>) -> Vec<usize> {
    let mut order = Vec::with_capacity(adjacency.len());
    let mut visited = BTreeSet::new();
    let mut stack = Vec::new();

    for &root in adjacency.keys() {
        if visited.contains(&root) {
            continue;
        }
        stack.push(root);
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            order.push(node);
            if let Some(neighbours) = adjacency.get(&node) {
                // Reverse so the smallest neighbour is popped first
                stack.extend(neighbours.iter().rev().filter(|n| !visited.contains(*n)));
            }
        }
    }
    order
}
