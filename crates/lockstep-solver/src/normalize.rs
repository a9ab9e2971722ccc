//! Normalization of raw solver output.
//!
//! Solvers enumerate packages in whatever order their search produced; the
//! functions here make the output independent of that order and attach
//! categories using the dependency edges the solver reported.

use std::collections::{BTreeSet, HashMap};

use lockstep_core::{Category, LockSpec, ResolvedPackage};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

/// Package name of a dependency string such as `libgcc-ng >=7.3.0`
pub fn dependency_name(dependency: &str) -> &str {
    let trimmed = dependency.trim();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ';'))
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

/// Assign each package the category of the first root group that reaches it.
///
/// `main` roots are walked first, so anything a `main` constraint needs is
/// `main` even when a `dev` constraint also pulls it in. The other
/// categories follow in name order. Packages no root reaches (solver
/// injected virtual or mutex packages) stay `main`, since they are
/// installed regardless.
pub fn assign_categories(packages: &mut [ResolvedPackage], spec: &LockSpec) {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut by_name: HashMap<String, NodeIndex> = HashMap::new();
    for (i, package) in packages.iter().enumerate() {
        let node = graph.add_node(i);
        by_name.entry(package.name.clone()).or_insert(node);
    }
    for package in packages.iter() {
        let from = by_name[&package.name];
        for dependency in &package.depends {
            if let Some(&to) = by_name.get(dependency_name(dependency)) {
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut order: Vec<Category> = vec![Category::main()];
    order.extend(spec.categories().into_iter().filter(|c| !c.is_main()));

    let mut assigned: Vec<Option<Category>> = vec![None; packages.len()];
    for category in &order {
        for entry in spec.constraints_in(category) {
            let Some(&root) = by_name.get(&entry.name) else {
                continue;
            };
            let mut bfs = Bfs::new(&graph, root);
            while let Some(node) = bfs.next(&graph) {
                let slot = &mut assigned[graph[node]];
                if slot.is_none() {
                    *slot = Some(category.clone());
                }
            }
        }
    }

    for (package, category) in packages.iter_mut().zip(assigned) {
        package.category = category.unwrap_or_else(Category::main);
    }
}

/// Sort dependency lists and the package set into their canonical order
pub fn canonicalize(packages: &mut Vec<ResolvedPackage>) {
    for package in packages.iter_mut() {
        let names: BTreeSet<String> = package
            .depends
            .iter()
            .map(|d| dependency_name(d).to_string())
            .filter(|d| !d.is_empty())
            .collect();
        package.depends = names.into_iter().collect();
    }
    packages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    packages.dedup();
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use lockstep_core::{ArtifactHash, Platform};
    use proptest::prelude::*;

    fn package(name: String, version: String) -> ResolvedPackage {
        ResolvedPackage {
            name,
            version,
            build: "0".to_string(),
            channel: "conda-forge".to_string(),
            platform: Platform::new("linux-64").unwrap(),
            category: Category::main(),
            hash: ArtifactHash::sha256(&"cd".repeat(32)).unwrap(),
            url: None,
            depends: Vec::new(),
        }
    }

    proptest! {
        #[test]
        fn canonical_order_ignores_input_order(
            entries in prop::collection::vec(("[a-z]{1,6}", "[0-9]\\.[0-9]"), 0..20),
            seed in any::<u64>(),
        ) {
            let packages: Vec<ResolvedPackage> =
                entries.into_iter().map(|(n, v)| package(n, v)).collect();

            let mut shuffled = packages.clone();
            // Deterministic permutation driven by the seed
            let len = shuffled.len();
            if len > 1 {
                for i in 0..len {
                    let j = (seed.wrapping_mul(i as u64 + 1) % len as u64) as usize;
                    shuffled.swap(i, j);
                }
            }

            let mut a = packages;
            canonicalize(&mut a);
            canonicalize(&mut shuffled);
            prop_assert_eq!(a, shuffled);
        }
    }
}
