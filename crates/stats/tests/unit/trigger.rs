//! Report trigger tests.
//!
//! Counter-watch lowering, polled conditions, tag events, and stop triggers as seen
//! through report activity, including where the start and stop baselines land when a
//! watch fires between updates.

use perfstat_core::StatsError;
use perfstat_core::SimTree;
use perfstat_core::config::TriggerConfig;
use perfstat_core::counter::CounterBehavior;
use perfstat_core::report::{Report, Trigger, TriggerRole};
use perfstat_core::sim::NodeId;

use crate::common::harness::init_tracing;
use crate::common::mocks::formatter::CollectingFormatter;

struct Counters {
    tree: SimTree,
    ctr: NodeId,
    other: NodeId,
}

fn counters() -> Counters {
    init_tracing();
    let mut tree = SimTree::new();
    let stats = tree.statistic_set(tree.root()).unwrap();
    let ctr = tree
        .add_counter(stats, "ctr", "Watched events", CounterBehavior::Normal)
        .unwrap();
    let other = tree
        .add_counter(stats, "other", "Other events", CounterBehavior::Normal)
        .unwrap();
    tree.finalize().unwrap();
    Counters { tree, ctr, other }
}

fn trigger(tree: &SimTree, source: &str, role: TriggerRole) -> Trigger {
    Trigger::new(tree, tree.root(), source, role, &TriggerConfig::default()).unwrap()
}

#[test]
fn start_trigger_suppresses_emission_until_threshold() {
    let Counters { mut tree, ctr, .. } = counters();
    let mut report = Report::new("gated", tree.root());
    report.add(&tree, "stats.ctr", "ctr").unwrap();
    let start = trigger(&tree, "top.stats.ctr >= 10", TriggerRole::Start);
    assert!(start.is_lowered());
    report.set_start_trigger(start);

    let mut out = CollectingFormatter::default();
    let _ = tree.increment(ctr, 9).unwrap();
    tree.advance(99);
    assert!(!report.emit(&tree, &mut out).unwrap());
    assert!(!report.is_active());
    assert!(out.snapshots.is_empty());

    tree.advance(1);
    let _ = tree.increment(ctr, 1).unwrap();
    assert!(report.emit(&tree, &mut out).unwrap());
    assert!(report.is_active());
    assert_eq!(report.start_trigger().unwrap().fired_at(), Some(100));
    assert_eq!(out.snapshots.len(), 1);
    assert_eq!(out.snapshots[0].stat("ctr"), Some(0.0));

    let _ = tree.increment(ctr, 5).unwrap();
    let _ = report.emit(&tree, &mut out).unwrap();
    assert_eq!(out.snapshots[1].stat("ctr"), Some(5.0));
}

#[test]
fn start_baseline_is_taken_at_the_firing_write() {
    let Counters { mut tree, ctr, other } = counters();
    let mut report = Report::new("gated", tree.root());
    report.add(&tree, "stats.ctr", "ctr").unwrap();
    report.add(&tree, "stats.other", "other").unwrap();
    report.set_start_trigger(trigger(&tree, "top.stats.ctr >= 10", TriggerRole::Start));

    tree.advance(100);
    let _ = tree.increment(ctr, 10).unwrap();
    let _ = tree.increment(other, 3).unwrap();
    tree.advance(20);
    let _ = tree.increment(ctr, 5).unwrap();
    tree.advance(30);

    let mut out = CollectingFormatter::default();
    assert!(report.emit(&tree, &mut out).unwrap());
    assert_eq!(report.start_trigger().unwrap().fired_at(), Some(100));
    assert_eq!(out.snapshots[0].stat("ctr"), Some(5.0));
    assert_eq!(out.snapshots[0].stat("other"), Some(3.0));
}

#[test]
fn constant_on_the_left_is_flipped() {
    let Counters { mut tree, ctr, .. } = counters();
    let mut report = Report::new("gated", tree.root());
    let start = trigger(&tree, "3 < stats.ctr", TriggerRole::Start);
    assert!(start.is_lowered());
    report.set_start_trigger(start);

    let _ = tree.increment(ctr, 3).unwrap();
    report.update(&tree);
    assert!(!report.is_active());
    tree.advance(2);
    let _ = tree.increment(ctr, 1).unwrap();
    report.update(&tree);
    assert!(report.is_active());
    assert_eq!(report.start_trigger().unwrap().fired_at(), Some(2));
}

#[test]
fn compound_conditions_are_polled() {
    let Counters { mut tree, ctr, other } = counters();
    let config = TriggerConfig { poll_cycles: 10 };
    let start = Trigger::new(
        &tree,
        tree.root(),
        "stats.ctr >= 2 && stats.other >= 1",
        TriggerRole::Start,
        &config,
    )
    .unwrap();
    assert!(!start.is_lowered());
    let mut report = Report::new("polled", tree.root());
    report.set_start_trigger(start);

    report.update(&tree);
    tree.advance(5);
    let _ = tree.increment(ctr, 2).unwrap();
    let _ = tree.increment(other, 1).unwrap();
    report.update(&tree);
    assert!(!report.is_active(), "checked again only after the polling period");

    tree.advance(5);
    report.update(&tree);
    assert!(report.is_active());
    assert_eq!(report.start_trigger().unwrap().fired_at(), Some(10));
}

#[test]
fn tags_chain_sub_report_starts() {
    let Counters { mut tree, ctr, .. } = counters();
    let mut report = Report::new("main", tree.root());
    let warm = trigger(&tree, "stats.ctr >= 2", TriggerRole::Start).with_tag("warm");
    assert_eq!(warm.tag(), Some("warm"));
    report.set_start_trigger(warm);
    let late = trigger(&tree, "warm.start", TriggerRole::Start);
    assert!(!late.is_lowered());
    report.add_subreport("late").set_start_trigger(late);

    report.update(&tree);
    assert!(!report.subreports()[0].is_active());

    tree.advance(7);
    let _ = tree.increment(ctr, 2).unwrap();
    report.update(&tree);
    assert!(report.is_active());
    assert!(report.subreports()[0].is_active());
    assert_eq!(report.container().borrow().event("warm.start"), Some(7));
}

#[test]
fn sub_reports_wait_for_their_parent() {
    let Counters { mut tree, ctr, other } = counters();
    let mut report = Report::new("main", tree.root());
    report.set_start_trigger(trigger(&tree, "stats.ctr >= 1", TriggerRole::Start));
    report
        .add_subreport("inner")
        .set_start_trigger(trigger(&tree, "stats.other >= 1", TriggerRole::Start));

    let _ = tree.increment(other, 1).unwrap();
    report.update(&tree);
    assert!(!report.subreports()[0].is_active());

    let _ = tree.increment(ctr, 1).unwrap();
    report.update(&tree);
    assert!(report.subreports()[0].is_active());
}

#[test]
fn stop_trigger_freezes_values() {
    let Counters { mut tree, ctr, .. } = counters();
    let mut report = Report::new("bounded", tree.root());
    report.add(&tree, "stats.ctr", "ctr").unwrap();
    report.set_stop_trigger(trigger(&tree, "stats.ctr >= 5", TriggerRole::Stop));

    let mut out = CollectingFormatter::default();
    let _ = tree.increment(ctr, 3).unwrap();
    assert!(report.emit(&tree, &mut out).unwrap());
    let _ = tree.increment(ctr, 2).unwrap();
    assert!(report.emit(&tree, &mut out).unwrap());
    assert!(report.is_ended());
    assert!(!report.is_active());

    let _ = tree.increment(ctr, 100).unwrap();
    assert!(report.emit(&tree, &mut out).unwrap());
    let values: Vec<Option<f64>> = out.snapshots.iter().map(|s| s.stat("ctr")).collect();
    assert_eq!(values, vec![Some(3.0), Some(5.0), Some(5.0)]);
}

#[test]
fn stop_values_are_frozen_at_the_firing_write() {
    let Counters { mut tree, ctr, other } = counters();
    let mut report = Report::new("bounded", tree.root());
    report.add(&tree, "stats.ctr", "ctr").unwrap();
    report.add(&tree, "stats.other", "other").unwrap();
    report.add(&tree, "cycles", "cycles").unwrap();
    report.set_stop_trigger(trigger(&tree, "top.stats.ctr >= 20", TriggerRole::Stop));

    tree.advance(40);
    let _ = tree.increment(ctr, 20).unwrap();
    let _ = tree.increment(ctr, 100).unwrap();
    let _ = tree.increment(other, 4).unwrap();
    tree.advance(60);

    let mut out = CollectingFormatter::default();
    assert!(report.emit(&tree, &mut out).unwrap());
    assert!(report.is_ended());
    assert_eq!(report.stop_trigger().unwrap().fired_at(), Some(40));
    assert_eq!(out.snapshots[0].stat("ctr"), Some(20.0));
    assert_eq!(out.snapshots[0].stat("other"), Some(0.0));
    assert_eq!(out.snapshots[0].stat("cycles"), Some(40.0));
}

#[test]
fn start_and_stop_between_updates_bound_the_window() {
    let Counters { mut tree, ctr, other } = counters();
    let mut report = Report::new("window", tree.root());
    report.add(&tree, "stats.other", "other").unwrap();
    report.set_start_trigger(trigger(&tree, "stats.ctr >= 1", TriggerRole::Start));
    report.set_stop_trigger(trigger(&tree, "stats.ctr >= 2", TriggerRole::Stop));

    let _ = tree.increment(other, 7).unwrap();
    let _ = tree.increment(ctr, 1).unwrap();
    let _ = tree.increment(other, 2).unwrap();
    let _ = tree.increment(ctr, 1).unwrap();
    let _ = tree.increment(other, 50).unwrap();

    report.update(&tree);
    assert!(report.is_ended());
    assert_eq!(report.snapshot(&tree).stat("other"), Some(2.0));
}

#[test]
fn sub_report_starts_no_earlier_than_its_parent() {
    let Counters { mut tree, ctr, other } = counters();
    let mut report = Report::new("main", tree.root());
    report.set_start_trigger(trigger(&tree, "stats.ctr >= 1", TriggerRole::Start));
    let inner_start = trigger(&tree, "stats.other >= 1", TriggerRole::Start);
    let inner = report.add_subreport("inner");
    inner.add(&tree, "stats.other", "other").unwrap();
    inner.set_start_trigger(inner_start);

    let _ = tree.increment(other, 1).unwrap();
    tree.advance(5);
    let _ = tree.increment(other, 2).unwrap();
    let _ = tree.increment(ctr, 1).unwrap();
    let _ = tree.increment(other, 4).unwrap();

    report.update(&tree);
    assert!(report.subreports()[0].is_active());
    let snapshot = report.snapshot(&tree);
    assert_eq!(snapshot.subreport("inner").unwrap().stat("other"), Some(4.0));
}

#[test]
fn watch_armed_after_threshold_fires_immediately() {
    let Counters { mut tree, ctr, .. } = counters();
    tree.advance(4);
    let _ = tree.increment(ctr, 1).unwrap();
    let mut report = Report::new("probe", tree.root());
    report.set_start_trigger(trigger(&tree, "stats.ctr >= 1", TriggerRole::Start));
    assert!(!report.start_trigger().unwrap().is_fired());

    tree.advance(6);
    report.update(&tree);
    assert!(report.is_active());
    assert_eq!(report.start_trigger().unwrap().fired_at(), Some(4));
}

#[test]
fn reset_rearms_a_trigger() {
    let Counters { tree, .. } = counters();
    let mut start = trigger(&tree, "stats.ctr >= 1", TriggerRole::Start);
    start.reset();
    assert!(!start.is_fired());
    assert_eq!(start.role(), TriggerRole::Start);
    assert_eq!(start.source(), "stats.ctr >= 1");
}

#[test]
fn malformed_conditions_are_rejected() {
    let Counters { tree, .. } = counters();
    let config = TriggerConfig::default();
    let root = tree.root();
    assert!(matches!(
        Trigger::new(&tree, root, "  ", TriggerRole::Start, &config),
        Err(StatsError::Trigger(_))
    ));
    assert!(matches!(
        Trigger::new(&tree, root, "stats.ctr + 1", TriggerRole::Stop, &config),
        Err(StatsError::Trigger(_))
    ));
    assert!(matches!(
        Trigger::new(&tree, root, "stats.missing >= 1", TriggerRole::Start, &config),
        Err(StatsError::UnresolvedPath { .. })
    ));
}
