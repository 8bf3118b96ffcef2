//! Expression unit tests.
//!
//! Parsing, path resolution, built-in functions, free variables, and statistic
//! dependency ordering.

use perfstat_core::expr::Expression;
use perfstat_core::sim::Phase;
use perfstat_core::statistic::StatisticDef;
use perfstat_core::{SimTree, StatsError};
use rstest::rstest;

use crate::common::harness::CoreTree;

fn eval(text: &str) -> f64 {
    let tree = SimTree::new();
    Expression::parse(text)
        .unwrap()
        .resolve(&tree, tree.root())
        .unwrap()
        .evaluate(&tree)
}

#[rstest]
#[case("1 + 2 * 3", 7.0)]
#[case("(1 + 2) * 3", 9.0)]
#[case("2 ** 3 ** 2", 512.0)]
#[case("-4 + 1", -3.0)]
#[case("10 / 4", 2.5)]
#[case("3 >= 3", 1.0)]
#[case("3 < 2", 0.0)]
#[case("1 && 0", 0.0)]
#[case("0 || 2", 1.0)]
#[case("!0", 1.0)]
#[case("min(4, 9) + max(4, 9)", 13.0)]
#[case("abs(-2.5)", 2.5)]
#[case("floor(2.7) + ceil(2.2) + round(2.5)", 8.0)]
#[case("pow(2, 10)", 1024.0)]
#[case("log2(8) + log10(100)", 5.0)]
#[case("cond(1, 5, 6)", 5.0)]
#[case("cond(0, 5, 6)", 6.0)]
#[case("ifnan(0 / 0, 42)", 42.0)]
#[case("ifnan(1, 42)", 1.0)]
#[case("is_greater(3, 2)", 1.0)]
#[case("logical_and(1, 1)", 1.0)]
fn constant_expressions(#[case] text: &str, #[case] expected: f64) {
    assert_eq!(eval(text), expected, "{text}");
}

#[test]
fn division_by_zero_is_not_an_error() {
    assert!(eval("1 / 0").is_infinite());
    assert!(eval("0 / 0").is_nan());
    assert!(eval("nan").is_nan());
    assert!(eval("inf") > 1e300);
}

#[rstest]
#[case("1 +")]
#[case("(1 + 2")]
#[case("frobnicate(1)")]
#[case("min(1)")]
#[case("1 2")]
fn malformed_expressions_fail_to_parse(#[case] text: &str) {
    let err = Expression::parse(text).unwrap_err();
    assert!(matches!(err, StatsError::Parse { .. }), "{text}: {err}");
}

#[test]
fn paths_resolve_relative_to_context() {
    let mut fixture = CoreTree::new();
    fixture.run(0, 30, 10);
    let core = fixture.cores[0];
    let tree = &fixture.tree;

    let relative = Expression::parse("stats.retired + 1")
        .unwrap()
        .resolve(tree, core.core)
        .unwrap();
    assert_eq!(relative.evaluate(tree), 31.0);

    let absolute = Expression::parse("top.core0.stats.retired / top.core0.stats.cycles")
        .unwrap()
        .resolve(tree, core.stats)
        .unwrap();
    assert_eq!(absolute.evaluate(tree), 3.0);

    let parent = Expression::parse("..core1.stats.retired")
        .unwrap()
        .resolve(tree, core.core)
        .unwrap();
    assert_eq!(parent.evaluate(tree), 0.0);
}

#[test]
fn unknown_and_structural_paths_do_not_resolve() {
    let fixture = CoreTree::new();
    let tree = &fixture.tree;
    let core = fixture.cores[0].core;
    assert!(matches!(
        Expression::parse("stats.missing").unwrap().resolve(tree, core),
        Err(StatsError::UnresolvedPath { .. })
    ));
    assert!(matches!(
        Expression::parse("stats").unwrap().resolve(tree, core),
        Err(StatsError::WrongNodeKind { .. })
    ));
}

#[test]
fn statistic_references_evaluate_through_definitions() {
    let mut fixture = CoreTree::new();
    fixture.run(1, 50, 25);
    let tree = &fixture.tree;
    let ipc = Expression::parse("core1.stats.ipc * 10")
        .unwrap()
        .resolve(tree, tree.root())
        .unwrap();
    assert_eq!(ipc.evaluate(tree), 20.0);
}

#[test]
fn free_variables_track_time() {
    let mut tree = SimTree::new();
    let root = tree.root();
    let expr = Expression::parse("g_ticks + cycles").unwrap().resolve(&tree, root).unwrap();
    tree.advance(6);
    assert_eq!(expr.evaluate(&tree), 12.0);
    assert!(expr.is_time_varying());

    let freq = Expression::parse("freq_mhz").unwrap().resolve(&tree, root).unwrap();
    assert_eq!(freq.evaluate(&tree), 1000.0);
    assert!(!freq.is_time_varying());
    assert!(!Expression::parse("1 + 2").unwrap().is_time_varying());
}

#[test]
fn cyclic_statistics_fail_finalization() {
    let mut tree = SimTree::new();
    let root = tree.root();
    let stats = tree.statistic_set(root).unwrap();
    let _ = tree.add_statistic_def(stats, "a", "", StatisticDef::new("b + 1")).unwrap();
    let _ = tree.add_statistic_def(stats, "b", "", StatisticDef::new("a * 2")).unwrap();
    let err = tree.finalize().unwrap_err();
    assert!(matches!(err, StatsError::CyclicExpression { .. }), "{err}");
    assert_eq!(tree.phase(), Phase::Configuring);
}

#[test]
fn statistic_order_puts_dependencies_first() {
    let mut tree = SimTree::new();
    let root = tree.root();
    let stats = tree.statistic_set(root).unwrap();
    let outer = tree.add_statistic_def(stats, "outer", "", StatisticDef::new("inner * 2")).unwrap();
    let inner = tree.add_statistic_def(stats, "inner", "", StatisticDef::new("3")).unwrap();
    tree.finalize().unwrap();
    let order = tree.statistic_order();
    let pos = |id| order.iter().position(|x| *x == id).unwrap();
    assert!(pos(inner) < pos(outer));
    assert_eq!(tree.value(outer).unwrap(), 6.0);
}

#[test]
fn construction_is_frozen_after_finalize() {
    let mut fixture = CoreTree::new();
    let root = fixture.tree.root();
    let err = fixture.tree.add_resource(root, "late").unwrap_err();
    assert!(matches!(err, StatsError::Phase { .. }), "{err}");
}
