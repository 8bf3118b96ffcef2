//! Statistic definition and instance unit tests.
//!
//! Delta semantics per snapshot mode, accumulation, and detachment.

use perfstat_core::SimTree;
use perfstat_core::counter::CounterBehavior;
use perfstat_core::expr::Expression;
use perfstat_core::statistic::{SnapshotMode, StatisticDef, StatisticInstance};

use crate::common::harness::{CoreTree, init_tracing};

#[test]
fn delta_read_of_a_derived_statistic() {
    init_tracing();
    let mut tree = SimTree::new();
    let root = tree.root();
    let stats = tree.statistic_set(root).unwrap();
    let a = tree.add_counter(stats, "a", "", CounterBehavior::Normal).unwrap();
    let sd = tree.add_statistic_def(stats, "sd", "", StatisticDef::new("a + 2")).unwrap();
    tree.finalize().unwrap();

    let mut instance = StatisticInstance::for_node(&tree, sd, "sd").unwrap();
    instance.start(&tree);
    let _ = tree.increment(a, 3).unwrap();

    assert_eq!(instance.value(&tree), 3.0);
    assert_eq!(instance.absolute_value(&tree), 5.0);
}

#[test]
fn difference_and_leafwise_ratios_differ() {
    let mut fixture = CoreTree::new();
    fixture.run(0, 100, 100);
    let core = fixture.cores[0];
    let tree = &fixture.tree;
    let ratio = Expression::parse("stats.retired / stats.cycles")
        .unwrap()
        .resolve(tree, core.core)
        .unwrap();
    let difference =
        StatisticInstance::for_expression(tree, ratio.clone(), "diff", SnapshotMode::Difference);
    let leafwise = StatisticInstance::for_expression(tree, ratio, "leaf", SnapshotMode::Leafwise);

    fixture.run(0, 300, 100);
    let tree = &fixture.tree;
    assert_eq!(difference.value(tree), 2.0 - 1.0);
    assert_eq!(leafwise.value(tree), 3.0);
}

#[test]
fn leafwise_definition_reports_ratio_of_deltas() {
    let mut fixture = CoreTree::new();
    fixture.run(1, 10, 40);
    let ipc = fixture.cores[1].ipc;
    let instance = StatisticInstance::for_node(&fixture.tree, ipc, "ipc").unwrap();
    fixture.run(1, 60, 30);
    assert_eq!(instance.value(&fixture.tree), 2.0);
    assert_eq!(instance.absolute_value(&fixture.tree), 1.0);
}

#[test]
fn absolute_mode_never_subtracts() {
    let mut fixture = CoreTree::new();
    fixture.run(0, 8, 1);
    let retired = Expression::node(fixture.cores[0].retired, "retired");
    let instance = StatisticInstance::for_expression(
        &fixture.tree,
        retired,
        "abs",
        SnapshotMode::Absolute,
    );
    fixture.run(0, 2, 1);
    assert_eq!(instance.value(&fixture.tree), 10.0);
}

#[test]
fn constant_expressions_report_absolute() {
    let tree = SimTree::new();
    let mut instance = StatisticInstance::for_expression(
        &tree,
        Expression::constant(4.0),
        "four",
        SnapshotMode::Difference,
    );
    instance.start(&tree);
    assert_eq!(instance.value(&tree), 4.0);
}

#[test]
fn restart_moves_the_baseline() {
    let mut fixture = CoreTree::new();
    let retired = fixture.cores[0].retired;
    let mut instance = StatisticInstance::for_node(&fixture.tree, retired, "r").unwrap();
    fixture.run(0, 5, 0);
    assert_eq!(instance.value(&fixture.tree), 5.0);
    instance.start(&fixture.tree);
    fixture.run(0, 2, 0);
    assert_eq!(instance.value(&fixture.tree), 2.0);
}

#[test]
fn accumulate_detaches_and_freezes() {
    let mut fixture = CoreTree::new();
    let retired = fixture.cores[0].retired;
    let mut instance = StatisticInstance::for_node(&fixture.tree, retired, "r").unwrap();
    fixture.run(0, 7, 0);
    instance.accumulate(&fixture.tree);
    assert!(instance.is_detached());
    assert!(instance.node().is_none());
    fixture.run(0, 100, 0);
    assert_eq!(instance.value(&fixture.tree), 7.0);
}

#[test]
fn accumulate_and_continue_keeps_the_running_total() {
    let mut fixture = CoreTree::new();
    let retired = fixture.cores[0].retired;
    let mut instance = StatisticInstance::for_node(&fixture.tree, retired, "r").unwrap();
    fixture.run(0, 4, 0);
    instance.accumulate_and_continue(&fixture.tree);
    assert!(!instance.is_detached());
    fixture.run(0, 6, 0);
    assert_eq!(instance.value(&fixture.tree), 10.0);
}

#[test]
fn instance_metadata_comes_from_the_node() {
    let fixture = CoreTree::new();
    let ipc = fixture.cores[0].ipc;
    let instance = StatisticInstance::for_node(&fixture.tree, ipc, "").unwrap();
    assert_eq!(instance.location(), "top.core0.stats.ipc");
    assert_eq!(instance.description(), "Instructions per cycle");
    assert_eq!(instance.snapshot_mode(), SnapshotMode::Leafwise);
    assert_eq!(instance.node(), Some(ipc));
}

#[test]
fn instances_require_valued_nodes() {
    let fixture = CoreTree::new();
    assert!(StatisticInstance::for_node(&fixture.tree, fixture.cores[0].core, "x").is_err());
}
