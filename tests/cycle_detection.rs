// tests/cycle_detection.rs

mod common;
use crate::common::{ConfigDocBuilder, Harness, ROOT, TestResult, file_transform};

use std::collections::HashSet;
use std::path::PathBuf;

use petgraph::algo::{has_path_connecting, is_cyclic_directed, tarjan_scc};
use petgraph::graphmap::DiGraphMap;
use proptest::prelude::*;
use retemplate::transform::cycle::cycle_involved_nodes;
use retemplate::transform::remove_cycles;

#[tokio::test]
async fn two_cycle_is_removed_and_the_rest_survives() -> TestResult {
    let h = Harness::new(ROOT);
    h.template("a.njk", "a");
    h.template("b.njk", "b");
    h.template("c.njk", "c");
    h.config(
        "site.json",
        &ConfigDocBuilder::new()
            .file("a.njk", "b.njk")
            .file("b.njk", "a.njk")
            .file("c.njk", "d.txt"),
    );

    let summary = h.engine.reload().await;
    assert_eq!(summary.active, 1);
    assert_eq!(summary.cycles_removed, 2);
    assert_eq!(h.engine.snapshot().transforms[0].source, h.path("c.njk"));
    assert!(h.sink.has_line("[cycle]"));
    Ok(())
}

#[tokio::test]
async fn cycle_through_a_derived_transform_is_removed() -> TestResult {
    let h = Harness::new(ROOT);
    h.template("templates/page.njk", "page");
    h.template("page", "rendered page doubling as a template");
    // templates/page.njk -> page (derived), page -> templates/page.njk (explicit)
    h.config(
        "site.json",
        &ConfigDocBuilder::new()
            .directory("templates", ".", false)
            .file("page", "templates/page.njk"),
    );

    let summary = h.engine.reload().await;
    assert_eq!(summary.active, 0);
    assert_eq!(summary.cycles_removed, 2);
    Ok(())
}

#[test]
fn removal_keeps_list_order_of_survivors() {
    let transforms = vec![
        file_transform("/n/x", "/n/y"),
        file_transform("/n/a", "/n/b"),
        file_transform("/n/p", "/n/q"),
        file_transform("/n/b", "/n/a"),
    ];
    let report = remove_cycles(transforms);
    let kept: Vec<PathBuf> = report.kept.iter().map(|t| t.source.clone()).collect();
    assert_eq!(kept, vec![PathBuf::from("/n/x"), PathBuf::from("/n/p")]);
    assert_eq!(report.removed.len(), 2);
    assert_eq!(report.errors().len(), 2);
}

fn edges_strategy() -> impl Strategy<Value = Vec<(u8, u8)>> {
    proptest::collection::vec((0u8..6, 0u8..6), 0..14)
}

fn names(edges: &[(u8, u8)]) -> Vec<(String, String)> {
    edges
        .iter()
        .map(|(a, b)| (format!("/n/{a}"), format!("/n/{b}")))
        .collect()
}

proptest! {
    #[test]
    fn marked_nodes_agree_with_strongly_connected_components(edges in edges_strategy()) {
        let named = names(&edges);
        let involved = cycle_involved_nodes(named.iter().map(|(a, b)| (a.as_str(), b.as_str())));

        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (a, b) in &named {
            graph.add_edge(a.as_str(), b.as_str(), ());
        }
        let cyclic: HashSet<&str> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .collect();

        // Acyclic input: nothing marked.
        if cyclic.is_empty() {
            prop_assert!(involved.is_empty());
        }
        // Every marked node is on a cycle or leads into one.
        for node in &involved {
            prop_assert!(
                cyclic.iter().any(|c| has_path_connecting(&graph, *node, *c, None)),
                "{node} marked but reaches no cycle"
            );
        }
        // Every cycle has a marked member.
        for scc in tarjan_scc(&graph) {
            if scc.iter().any(|n| cyclic.contains(n)) {
                prop_assert!(scc.iter().any(|n| involved.contains(n)));
            }
        }
    }

    #[test]
    fn surviving_transforms_never_form_a_cycle(edges in edges_strategy()) {
        let transforms: Vec<_> = names(&edges)
            .into_iter()
            .map(|(a, b)| file_transform(a, b))
            .collect();
        let total = transforms.len();
        let report = remove_cycles(transforms);
        prop_assert_eq!(report.kept.len() + report.removed.len(), total);

        let mut kept: DiGraphMap<&str, ()> = DiGraphMap::new();
        let keys: Vec<_> = report
            .kept
            .iter()
            .map(|t| (t.source_key(), t.target_key()))
            .collect();
        for (s, t) in &keys {
            kept.add_edge(s.as_str(), t.as_str(), ());
        }
        prop_assert!(!is_cyclic_directed(&kept));
    }
}
