//! Report definition tests.
//!
//! YAML documents walked against a two-core tree: sub-report fan-out, name
//! substitution, triggers, includes, and error aggregation.

use std::fs;

use perfstat_core::StatsError;
use perfstat_core::config::StatsConfig;
use perfstat_core::histogram::{HistogramFunctionRegistry, HistogramSpec};
use perfstat_core::report::Report;
use perfstat_core::report_def::{ReportDefParser, build_report};
use perfstat_core::sim::NodeId;
use pretty_assertions::assert_eq;

use crate::common::harness::CoreTree;
use crate::common::mocks::formatter::CollectingFormatter;

struct Fixture {
    cores: CoreTree,
    lat: NodeId,
    registry: HistogramFunctionRegistry,
    config: StatsConfig,
}

impl Fixture {
    fn new() -> Self {
        let mut cores = CoreTree::build(2, false);
        let core0 = cores.cores[0].core;
        let lat = cores
            .tree
            .add_histogram(core0, "lat", "Load latency", &HistogramSpec::new(0, 8, 1))
            .unwrap();
        cores.tree.finalize().unwrap();
        Self {
            cores,
            lat,
            registry: HistogramFunctionRegistry::with_builtins(),
            config: StatsConfig::default(),
        }
    }

    fn parse(&self, yaml: &str) -> (Report, Vec<String>, perfstat_core::Result<()>) {
        let mut report = Report::new("def", self.cores.tree.root());
        let mut parser = ReportDefParser::new(&self.cores.tree, &self.registry, &self.config);
        let result = parser.parse_str(yaml, &mut report);
        let warnings = parser.warnings().to_vec();
        (report, warnings, result)
    }

    fn errors(&self, yaml: &str) -> Vec<String> {
        match self.parse(yaml).2 {
            Err(StatsError::ReportDefinition { errors, .. }) => errors,
            other => panic!("expected collected errors, got {other:?}"),
        }
    }
}

const CORE_SUMMARY: &str = r#"
report:
  name: "core summary"
  author: perf
  style:
    decimals: 3
  trigger:
    start: top.core0.stats.retired >= 10
  content:
    top.core*:
      subreport:
        name: "core %1"
        content:
          stats.retired: retired
          stats.ipc: ""
          autopopulate:
            attributes: "vis >= summary"
"#;

#[test]
fn wildcards_fan_out_into_named_sub_reports() {
    let mut fx = Fixture::new();
    let (mut report, warnings, result) = fx.parse(CORE_SUMMARY);
    result.unwrap();
    assert!(warnings.is_empty());
    assert_eq!(report.name(), "core summary");
    assert_eq!(report.author(), "perf");
    assert_eq!(report.style("decimals"), Some("3"));
    let names: Vec<&str> = report.subreports().iter().map(Report::name).collect();
    assert_eq!(names, vec!["core 0", "core 1"]);
    assert_eq!(
        report.subreport("core 1").unwrap().stat_names(),
        vec!["retired", "top.core1.stats.ipc"]
    );
    assert_eq!(report.total_stats(), 4);

    let mut out = CollectingFormatter::default();
    assert!(!report.emit(&fx.cores.tree, &mut out).unwrap());
    fx.cores.run(0, 10, 40);
    report.update(&fx.cores.tree);
    assert!(report.is_active());
    fx.cores.run(0, 10, 40);
    let snapshot = report.snapshot(&fx.cores.tree);
    assert_eq!(snapshot.subreport("core 0").unwrap().stat("retired"), Some(10.0));
}

#[test]
fn sub_reports_consume_one_uid_each() {
    let fx = Fixture::new();
    let mut report = Report::new("def", fx.cores.tree.root());
    let mut parser = ReportDefParser::new(&fx.cores.tree, &fx.registry, &fx.config);
    parser.parse_str(CORE_SUMMARY, &mut report).unwrap();
    assert_eq!(parser.uids_used(), 2);
}

#[test]
fn running_out_of_uids_stops_the_walk() {
    let mut fx = Fixture::new();
    fx.config.report_def.max_subreport_uids = 1;
    assert!(matches!(fx.parse(CORE_SUMMARY).2, Err(StatsError::OutOfUid { limit: 1 })));
}

#[test]
fn unmatched_leaves_fall_back_to_expressions() {
    let mut fx = Fixture::new();
    let (report, _, result) = fx.parse(
        r"
report:
  content:
    core0.stats.retired + core1.stats.retired: total_retired
    core0:
      stats.cycles: cycles0
",
    );
    result.unwrap();
    fx.cores.run(0, 10, 20);
    fx.cores.run(1, 5, 20);
    let snapshot = report.snapshot(&fx.cores.tree);
    assert_eq!(snapshot.stat("total_retired"), Some(15.0));
    assert_eq!(snapshot.stat("cycles0"), Some(20.0));
}

#[test]
fn errors_are_collected_into_one_failure() {
    let fx = Fixture::new();
    let errors = fx.errors(
        r"
report:
  autopopulate: true
  content:
    core0.stats.nope: a
    core9.stats.retired: b
    core0.stats.retired: ok
",
    );
    assert_eq!(errors.len(), 3, "{errors:#?}");
    assert!(errors[0].contains("autopopulate"));
    assert!(errors[1].contains("core0.stats.nope"));
    assert!(errors[2].contains("core9.stats.retired"));
}

#[test]
fn optional_misses_are_warnings() {
    let fx = Fixture::new();
    let (report, warnings, result) = fx.parse(
        r"
report:
  content:
    optional:
      core0.stats.nope: a
      core0.stats.cycles: c
    core0.stats.retired: r
",
    );
    result.unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("core0.stats.nope"));
    assert_eq!(report.stat_names(), vec!["c", "r"]);
}

#[test]
fn report_placement_is_checked() {
    let fx = Fixture::new();
    let nested = fx.errors(
        r"
report:
  report:
    name: inner
",
    );
    assert!(nested[0].contains("nested `report`"));

    let in_content = fx.errors(
        r"
report:
  content:
    report:
      name: inner
",
    );
    assert!(in_content[0].contains("use `subreport`"));

    let orphan = fx.errors(
        r"
subreport:
  name: lost
",
    );
    assert!(orphan[0].contains("`subreport` outside a report"));

    let stray_leaf = fx.errors(
        r"
report:
  core0.stats.retired: r
",
    );
    assert!(stray_leaf[0].contains("outside content"));
}

#[test]
fn duplicate_sibling_names_are_rejected() {
    let fx = Fixture::new();
    let errors = fx.errors(
        r"
report:
  content:
    core*:
      subreport:
        name: same
",
    );
    assert_eq!(errors, vec!["duplicate report name `same`".to_string()]);
}

#[test]
fn ignored_blocks_are_not_walked() {
    let fx = Fixture::new();
    let (report, _, result) = fx.parse(
        r"
report_ignore:
  anything: [goes, here]
report:
  content:
    report_ignore:
      core9.nothing: x
    core1.stats.retired: r
",
    );
    result.unwrap();
    assert_eq!(report.total_stats(), 1);
}

#[test]
fn arch_content_follows_the_configured_arch() {
    let mut fx = Fixture::new();
    fx.config.report_def.arch = Some("rv64".to_string());
    let (report, _, result) = fx.parse(
        r"
report:
  content:
    rv64-arch-content:
      core0.stats.retired: r64
    arm-arch-content:
      core0.stats.cycles: arm_cycles
",
    );
    result.unwrap();
    assert!(report.contains_stat("r64"));
    assert!(!report.contains_stat("arm_cycles"));
}

#[test]
fn hist_def_binds_registered_functions() {
    let mut fx = Fixture::new();
    let (report, _, result) = fx.parse(
        r"
report:
  content:
    hist_def.core0.lat.mean: lat_mean
    hist_def.core0.lat.nonzero_bins:
",
    );
    result.unwrap();
    fx.cores.tree.histogram_add_value(fx.lat, 2).unwrap();
    fx.cores.tree.histogram_add_value(fx.lat, 4).unwrap();
    let snapshot = report.snapshot(&fx.cores.tree);
    assert_eq!(snapshot.stat("lat_mean"), Some(3.0));
    assert_eq!(snapshot.stat("lat_nonzero_bins"), Some(2.0));

    let errors = fx.errors(
        r"
report:
  content:
    hist_def.core0.lat.median: m
    hist_def.core0.stats.retired.mean: r
",
    );
    assert_eq!(errors.len(), 2, "{errors:#?}");
}

#[test]
fn triggers_and_tags_attach_per_report() {
    let mut fx = Fixture::new();
    let (mut report, _, result) = fx.parse(
        r"
report:
  trigger:
    start: core0.stats.retired >= 5
    tag: warm
  content:
    core1:
      subreport:
        trigger:
          start: warm.start
        content:
          stats.retired: r
",
    );
    result.unwrap();
    assert_eq!(report.start_trigger().unwrap().tag(), Some("warm"));
    report.update(&fx.cores.tree);
    assert!(!report.subreports()[0].is_active());

    fx.cores.run(0, 5, 5);
    report.update(&fx.cores.tree);
    assert!(report.subreports()[0].is_active());

    let errors = fx.errors(
        r"
report:
  trigger:
    begin: core0.stats.retired >= 5
    trigger:
      start: core0.stats.retired >= 5
",
    );
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("unknown trigger key `begin`"));
    assert!(errors[1].contains("nested `trigger`"));
}

#[test]
fn autopopulate_accepts_a_map() {
    let fx = Fixture::new();
    let (report, _, result) = fx.parse(
        r#"
report:
  content:
    core1:
      autopopulate:
        attributes: "type:counter"
        max_report_depth: 0
"#,
    );
    result.unwrap();
    assert_eq!(report.stat_names(), vec!["stats.retired", "stats.cycles"]);
}

#[test]
fn includes_resolve_next_to_the_including_file() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("main.yaml"),
        "report:\n  content:\n    include: parts/cores.yaml\n",
    )
    .unwrap();
    fs::create_dir(dir.path().join("parts")).unwrap();
    fs::write(
        dir.path().join("parts/cores.yaml"),
        "core0.stats.retired: r0\ninclude: more.yaml\n",
    )
    .unwrap();
    fs::write(dir.path().join("parts/more.yaml"), "core1.stats.retired: r1\n").unwrap();

    let report = build_report(&fx.cores.tree, &fx.registry, &fx.config, &dir.path().join("main.yaml")).unwrap();
    assert_eq!(report.name(), "main");
    assert_eq!(report.stat_names(), vec!["r0", "r1"]);
}

#[test]
fn included_files_cannot_open_reports_from_content() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.yaml");
    fs::write(&main, "report:\n  content:\n    include: [inner.yaml, missing.yaml]\n").unwrap();
    fs::write(dir.path().join("inner.yaml"), "report:\n  name: sneaky\n").unwrap();

    match build_report(&fx.cores.tree, &fx.registry, &fx.config, &main) {
        Err(StatsError::ReportDefinition { file, errors }) => {
            assert_eq!(file, main);
            assert_eq!(errors.len(), 2);
            assert!(errors[0].contains("included from content"));
            assert!(errors[1].contains("missing.yaml"));
        }
        other => panic!("expected collected errors, got {other:?}"),
    }
}

#[test]
fn malformed_yaml_is_a_decode_error() {
    let fx = Fixture::new();
    assert!(matches!(fx.parse("report: [unclosed").2, Err(StatsError::Yaml(_))));
}
