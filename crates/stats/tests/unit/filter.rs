//! Filter language tests.

use perfstat_core::SimTree;
use perfstat_core::StatsError;
use perfstat_core::common::Visibility;
use perfstat_core::counter::CounterBehavior;
use perfstat_core::filter::Filter;
use perfstat_core::sim::NodeId;
use perfstat_core::statistic::StatisticDef;
use rstest::{fixture, rstest};

struct Nodes {
    tree: SimTree,
    named: Vec<(&'static str, NodeId)>,
}

#[fixture]
fn nodes() -> Nodes {
    let mut tree = SimTree::new();
    let stats = tree.statistic_set(tree.root()).unwrap();
    let retired = tree
        .add_counter(stats, "retired", "Instructions retired", CounterBehavior::Normal)
        .unwrap();
    tree.set_visibility(retired, Visibility::SUMMARY).unwrap();
    let _ = tree.attrs_mut(retired).unwrap().tags.insert("core".to_string());
    let l1_miss = tree
        .add_counter(stats, "l1_miss", "L1 misses", CounterBehavior::Normal)
        .unwrap();
    tree.set_visibility(l1_miss, Visibility::DETAIL).unwrap();
    {
        let attrs = tree.attrs_mut(l1_miss).unwrap();
        let _ = attrs.tags.insert("mem_l1".to_string());
        let _ = attrs.tags.insert("cache".to_string());
    }
    let ipc = tree
        .add_statistic_def(stats, "ipc", "Instructions per cycle", StatisticDef::new("retired"))
        .unwrap();
    Nodes {
        tree,
        named: vec![("retired", retired), ("l1_miss", l1_miss), ("ipc", ipc), ("stats", stats)],
    }
}

fn matching(nodes: &Nodes, source: &str) -> Vec<&'static str> {
    let filter = Filter::parse(source).unwrap();
    nodes
        .named
        .iter()
        .filter(|(_, id)| filter.matches(&nodes.tree, *id))
        .map(|(name, _)| *name)
        .collect()
}

#[rstest]
#[case("true", &["retired", "l1_miss", "ipc", "stats"])]
#[case("false", &[])]
#[case("vis >= normal", &["retired", "ipc"])]
#[case(">=vis:normal", &["retired", "ipc"])]
#[case("vis < normal", &["l1_miss"])]
#[case("vis == 100000000", &["ipc"])]
#[case("visibility > summary", &[])]
#[case("type:counter", &["retired", "l1_miss"])]
#[case("type != counter", &["ipc"])]
#[case("type:stat", &["ipc"])]
#[case("vis >= normal && type:counter", &["retired"])]
#[case("tag:core || tag:cache", &["retired", "l1_miss"])]
#[case("regex tag:\"mem_.*\"", &["l1_miss"])]
#[case("tag regex mem_l[0-9]", &["l1_miss"])]
#[case("name:ipc", &["ipc"])]
#[case("name != ipc && type:counter", &["retired", "l1_miss"])]
#[case("name regex \"r.*\"", &["retired"])]
#[case("!type:counter", &["ipc", "stats"])]
#[case("not name:stats", &["retired", "l1_miss", "ipc"])]
#[case("type:counter ^^ vis >= normal", &["l1_miss", "ipc"])]
#[case("!(tag:core || tag:cache) && true", &["ipc", "stats"])]
fn filters_select_expected_nodes(nodes: Nodes, #[case] source: &str, #[case] expected: &[&str]) {
    assert_eq!(matching(&nodes, source), expected, "filter `{source}`");
}

#[rstest]
#[case("")]
#[case("vis >=")]
#[case("vis regex normal")]
#[case("type < counter")]
#[case("type:gadget")]
#[case("colour:red")]
#[case("vis >= loud")]
#[case("tag regex \"(\"")]
#[case("(type:counter")]
#[case("type:counter type:stat")]
#[case("tag > x")]
fn malformed_filters_are_parse_errors(#[case] source: &str) {
    assert!(matches!(Filter::parse(source), Err(StatsError::Parse { .. })), "filter `{source}`");
}

#[rstest]
fn removed_nodes_never_match(mut nodes: Nodes) {
    let (_, retired) = nodes.named[0];
    nodes.tree.finalize().unwrap();
    nodes.tree.enter_teardown().unwrap();
    nodes.tree.remove_subtree(retired).unwrap();
    assert!(!Filter::parse("vis >= hidden").unwrap().matches(&nodes.tree, retired));
    assert!(!Filter::parse("name:retired").unwrap().matches(&nodes.tree, retired));
}

#[test]
fn accept_all_displays_as_true() {
    let filter = Filter::accept_all();
    assert_eq!(filter.to_string(), "true");
    assert_eq!(Filter::parse("tag:x").unwrap().source(), "tag:x");
}
