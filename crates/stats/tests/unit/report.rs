//! Report model tests.
//!
//! Statistic selection, sub-reports, autopopulation, and the output formats.

use mockall::predicate::always;
use perfstat_core::SimTree;
use perfstat_core::StatsError;
use perfstat_core::common::Visibility;
use perfstat_core::counter::CounterBehavior;
use perfstat_core::histogram::HistogramSpec;
use perfstat_core::report::{
    CsvFormatter, JsonFormatter, Report, ReportFormatter, TextFormatter, format_value,
    formatter_for_path,
};
use perfstat_core::sim::NodeId;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

use crate::common::harness::{CoreTree, init_tracing};
use crate::common::mocks::formatter::{CollectingFormatter, MockFormatter};

fn two_counters() -> (SimTree, NodeId, NodeId) {
    init_tracing();
    let mut tree = SimTree::new();
    let stats = tree.statistic_set(tree.root()).unwrap();
    let a = tree.add_counter(stats, "a", "First", CounterBehavior::Normal).unwrap();
    let b = tree.add_counter(stats, "b", "Second", CounterBehavior::Normal).unwrap();
    tree.finalize().unwrap();
    (tree, a, b)
}

#[test]
fn values_are_deltas_since_creation() {
    let (mut tree, a, b) = two_counters();
    let _ = tree.increment(a, 10).unwrap();
    let mut report = Report::new("r", tree.root());
    report.add(&tree, a, "a").unwrap();
    report.add(&tree, "stats.a + stats.b", "sum").unwrap();
    let _ = tree.increment(a, 3).unwrap();
    let _ = tree.increment(b, 2).unwrap();

    let snapshot = report.snapshot(&tree);
    assert_eq!(snapshot.stat("a"), Some(3.0));
    assert_eq!(snapshot.stat("sum"), Some(5.0));
    assert_eq!(report.stat_names(), vec!["a".to_string(), "sum".to_string()]);
}

#[test]
fn duplicate_names_are_rejected_but_anonymous_stats_are_not() {
    let (tree, a, b) = two_counters();
    let mut report = Report::new("r", tree.root());
    report.add(&tree, a, "x").unwrap();
    assert!(matches!(
        report.add(&tree, b, "x"),
        Err(StatsError::DuplicateStatName { ref name, .. }) if name == "x"
    ));
    report.add(&tree, a, "").unwrap();
    report.add(&tree, b, "").unwrap();
    assert_eq!(report.num_stats(), 3);
    assert_eq!(report.stat_names()[2], tree.location(b));
}

#[test]
fn unknown_paths_fall_back_to_expressions_and_then_fail() {
    let (tree, _, _) = two_counters();
    let mut report = Report::new("r", tree.root());
    report.add(&tree, "2 * stats.b", "double").unwrap();
    assert!(report.add(&tree, "stats.nope", "nope").is_err());
    assert!(report.contains_stat("double"));
    assert!(!report.contains_stat("nope"));
}

#[test]
fn histograms_expand_to_their_statistics() {
    init_tracing();
    let mut tree = SimTree::new();
    let root = tree.root();
    let h = tree
        .add_histogram(root, "lat", "Latency", &HistogramSpec::new(0, 4, 2))
        .unwrap();
    tree.finalize().unwrap();
    let mut report = Report::new("r", root);
    report.add(&tree, h, "lat").unwrap();
    for name in ["lat.total", "lat.sum", "lat.UF", "lat.bin_0", "lat.bin_2", "lat.OF", "lat.average"] {
        assert!(report.contains_stat(name), "missing {name}");
    }
    tree.histogram_add_value(h, 3).unwrap();
    assert_eq!(report.snapshot(&tree).stat("lat.bin_2"), Some(1.0));
}

#[test]
fn sub_reports_nest_and_flatten() {
    let mut cores = CoreTree::new();
    let mut report = Report::new("cpu", cores.tree.root());
    for (i, core) in cores.cores.clone().iter().enumerate() {
        let sub = report.add_subreport(format!("core{i}"));
        sub.add(&cores.tree, core.retired, "retired").unwrap();
        sub.add(&cores.tree, core.ipc, "ipc").unwrap();
    }
    cores.run(0, 10, 20);
    cores.run(1, 30, 20);

    assert_eq!(report.total_stats(), 4);
    assert_eq!(
        report.all_stat_names(),
        vec!["core0.retired", "core0.ipc", "core1.retired", "core1.ipc"]
    );
    let snapshot = report.snapshot(&cores.tree);
    assert_eq!(snapshot.subreport("core1").unwrap().stat("ipc"), Some(1.5));
    assert_eq!(
        snapshot.flatten(),
        vec![
            ("core0.retired".to_string(), 10.0),
            ("core0.ipc".to_string(), 0.5),
            ("core1.retired".to_string(), 30.0),
            ("core1.ipc".to_string(), 1.5),
        ]
    );
    assert!(report.subreport("core0").is_some());
    assert!(report.subreport("core2").is_none());
}

#[test]
fn ended_reports_keep_their_final_values() {
    let (mut tree, a, _) = two_counters();
    let mut report = Report::new("r", tree.root());
    report.add(&tree, a, "a").unwrap();
    let _ = tree.increment(a, 4).unwrap();
    report.end(&tree);
    let _ = tree.increment(a, 4).unwrap();
    assert!(report.is_ended());
    assert_eq!(report.snapshot(&tree).stat("a"), Some(4.0));

    report.start(&tree);
    let _ = tree.increment(a, 1).unwrap();
    assert_eq!(report.snapshot(&tree).stat("a"), Some(4.0));
}

#[test]
fn autopopulate_applies_the_filter() {
    init_tracing();
    let mut tree = SimTree::new();
    let root = tree.root();
    let unit = tree.add_resource(root, "unit").unwrap();
    let stats = tree.statistic_set(unit).unwrap();
    let levels = [
        ("hidden", Visibility::HIDDEN),
        ("support", Visibility::SUPPORT),
        ("normal", Visibility::NORMAL),
        ("summary", Visibility::SUMMARY),
    ];
    for (name, visibility) in levels {
        let id = tree.add_counter(stats, name, name, CounterBehavior::Normal).unwrap();
        tree.set_visibility(id, visibility).unwrap();
    }
    tree.finalize().unwrap();

    let filter = "vis >= normal && type:counter";
    let mut report = Report::new("auto", root);
    let added = report.autopopulate(&tree, unit, filter, &[], None, None).unwrap();
    assert_eq!(added, 2);
    assert_eq!(report.all_stat_names(), vec!["stats.normal", "stats.summary"]);
    assert_eq!(
        report.subreport("stats").unwrap().stat_names(),
        vec!["normal", "summary"]
    );
    assert_eq!(report.autopopulate(&tree, unit, filter, &[], None, None).unwrap(), 0);
    assert_eq!(report.total_stats(), 2);
}

#[test]
fn autopopulate_opens_sub_reports_per_resource_and_statistic_set() {
    let cores = CoreTree::new();
    let mut report = Report::new("all", cores.tree.root());
    let root = cores.tree.root();
    let added = report
        .autopopulate(&cores.tree, root, "type:counter", &[], None, None)
        .unwrap();
    assert_eq!(added, 4);
    let core0 = report.subreport("core0").unwrap();
    assert!(core0.stat_names().is_empty());
    assert_eq!(
        report.subreport("core0.stats").unwrap().stat_names(),
        vec!["retired", "cycles"]
    );
    assert!(report.subreport("stats").is_none(), "empty generated sub-reports are pruned");

    let mut shallow = Report::new("shallow", root);
    let _ = shallow
        .autopopulate(&cores.tree, root, "type:counter", &[], None, Some(1))
        .unwrap();
    assert_eq!(
        shallow.subreport("core1").unwrap().stat_names(),
        vec!["stats.retired", "stats.cycles"]
    );

    let mut flat = Report::new("flat", root);
    let added = flat
        .autopopulate(&cores.tree, root, "", &[], None, Some(0))
        .unwrap();
    assert_eq!(added, 6);
    assert!(flat.subreports().is_empty());
    assert!(flat.contains_stat("core1.stats.ipc"));
}

#[test]
fn autopopulate_selects_whole_histograms() {
    init_tracing();
    let mut tree = SimTree::new();
    let root = tree.root();
    let lsu = tree.add_resource(root, "lsu").unwrap();
    let stats = tree.statistic_set(lsu).unwrap();
    let _ = tree.add_counter(stats, "loads", "Loads", CounterBehavior::Normal).unwrap();
    let lat = tree
        .add_histogram(stats, "lat", "Load latency", &HistogramSpec::new(0, 4, 2))
        .unwrap();
    tree.finalize().unwrap();

    let mut report = Report::new("hist", root);
    let added = report
        .autopopulate(&tree, root, "type:histogram", &[], None, None)
        .unwrap();
    assert!(added > 0);
    assert_eq!(report.total_stats(), added);
    let names = report.all_stat_names();
    assert!(names.contains(&"lsu.stats.lat.total".to_string()));
    assert!(names.contains(&"lsu.stats.lat.bin_2".to_string()));
    assert!(!names.iter().any(|n| n.ends_with("loads")));
    assert!(report.subreport("lsu.stats").unwrap().contains_node(lat));

    tree.histogram_add_value(lat, 2).unwrap();
    let snapshot = report.snapshot(&tree);
    assert_eq!(
        snapshot.subreport("lsu.stats").unwrap().stat("lat.bin_2"),
        Some(1.0)
    );
    assert_eq!(
        report
            .autopopulate(&tree, lsu, "type:histogram || name:lat", &[], None, None)
            .unwrap(),
        0
    );
}

#[test]
fn emit_hands_one_snapshot_to_the_formatter() {
    let (mut tree, a, _) = two_counters();
    let mut report = Report::new("r", tree.root()).with_author("perf");
    report.add(&tree, a, "a").unwrap();
    let _ = tree.increment(a, 2).unwrap();

    let mut formatter = MockFormatter::new();
    formatter
        .expect_write_snapshot()
        .withf(|s| s.name == "r" && s.author == "perf" && s.stat("a") == Some(2.0))
        .times(1)
        .returning(|_| Ok(()));
    formatter.expect_finish().never();
    assert!(report.emit(&tree, &mut formatter).unwrap());
}

#[test]
fn formatter_errors_propagate() {
    let (tree, _, _) = two_counters();
    let mut report = Report::new("r", tree.root());
    let mut formatter = MockFormatter::new();
    formatter
        .expect_write_snapshot()
        .with(always())
        .returning(|_| Err(StatsError::Io(std::io::Error::other("disk full"))));
    assert!(matches!(report.emit(&tree, &mut formatter), Err(StatsError::Io(_))));
}

#[test]
fn text_output_is_indented_per_sub_report() {
    let (mut tree, a, b) = two_counters();
    let mut report = Report::new("top_report", tree.root());
    report.set_header("run", "smoke");
    report.add(&tree, a, "a").unwrap();
    report.add_subreport("inner").add(&tree, b, "b").unwrap();
    let _ = tree.increment(a, 3).unwrap();
    let _ = tree.increment(b, 1).unwrap();

    let mut text = TextFormatter::new(Vec::new());
    assert!(report.emit(&tree, &mut text).unwrap());
    text.finish().unwrap();
    let out = String::from_utf8(text.into_inner()).unwrap();
    let expected = format!(
        "# tick 0\nreport \"top_report\"\n  # run: smoke\n  {:<32} = 3\n  report \"inner\"\n    {:<32} = 1\n",
        "a", "b"
    );
    assert_eq!(out, expected);
}

#[test]
fn csv_output_keeps_the_first_header() {
    let (mut tree, a, b) = two_counters();
    let mut report = Report::new("r", tree.root());
    report.add(&tree, a, "a").unwrap();
    report.add(&tree, b, "b").unwrap();

    let mut csv = CsvFormatter::new(Vec::new());
    let _ = tree.increment(a, 1).unwrap();
    let _ = report.emit(&tree, &mut csv).unwrap();
    tree.advance(5);
    let _ = tree.increment(b, 2).unwrap();
    let _ = report.emit(&tree, &mut csv).unwrap();
    csv.finish().unwrap();
    let out = String::from_utf8(csv.into_inner().unwrap()).unwrap();
    assert_eq!(out, "tick,a,b\n0,1,0\n5,1,2\n");
}

#[test]
fn json_output_collects_documents() {
    let (mut tree, a, _) = two_counters();
    let mut report = Report::new("r", tree.root());
    report.set_style("decimals", "2");
    report.add(&tree, a, "a").unwrap();
    let _ = tree.increment(a, 7).unwrap();

    let mut formatter = JsonFormatter::new(Vec::new());
    let _ = report.emit(&tree, &mut formatter).unwrap();
    assert_eq!(formatter.documents().len(), 1);
    assert_eq!(formatter.documents()[0]["stats"]["a"], json!(7.0));
    assert_eq!(formatter.documents()[0]["metadata"]["decimals"], json!("2"));
    formatter.finish().unwrap();

    let parsed: serde_json::Value = serde_json::from_slice(&formatter.into_inner()).unwrap();
    assert_eq!(parsed["name"], json!("r"));
    assert_eq!(parsed["subreports"], json!([]));
}

#[test]
fn collecting_formatter_sees_inactive_sub_reports_omitted() {
    let (tree, a, _) = two_counters();
    let mut report = Report::new("r", tree.root());
    let trigger = perfstat_core::report::Trigger::new(
        &tree,
        tree.root(),
        "stats.a >= 100",
        perfstat_core::report::TriggerRole::Start,
        &perfstat_core::config::TriggerConfig::default(),
    )
    .unwrap();
    let sub = report.add_subreport("late");
    sub.add(&tree, a, "a").unwrap();
    sub.set_start_trigger(trigger);

    let mut out = CollectingFormatter::default();
    let _ = report.emit(&tree, &mut out).unwrap();
    assert!(out.snapshots[0].subreports.is_empty());
    assert_eq!(out.snapshots[0].total_stats(), 0);
}

#[test]
fn formatter_is_chosen_by_extension() {
    let (mut tree, a, _) = two_counters();
    let mut report = Report::new("r", tree.root());
    report.add(&tree, a, "a").unwrap();
    let _ = tree.increment(a, 9).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let mut formatter = formatter_for_path(&path).unwrap();
    let _ = report.emit(&tree, formatter.as_mut()).unwrap();
    formatter.finish().unwrap();
    drop(formatter);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "tick,a\n0,9\n");

    assert!(formatter_for_path(&dir.path().join("out.xml")).is_err());
}

#[rstest]
#[case(3.0, "3")]
#[case(-12.0, "-12")]
#[case(0.5, "0.500000")]
#[case(1.0 / 3.0, "0.333333")]
#[case(f64::NAN, "nan")]
#[case(f64::INFINITY, "inf")]
#[case(f64::NEG_INFINITY, "-inf")]
fn values_render_consistently(#[case] value: f64, #[case] expected: &str) {
    assert_eq!(format_value(value), expected);
}
