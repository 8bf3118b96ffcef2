//! Property-based tests over counters, histograms, filters, and autopopulation.

use perfstat_core::SimTree;
use perfstat_core::common::Visibility;
use perfstat_core::counter::CounterBehavior;
use perfstat_core::filter::Filter;
use perfstat_core::histogram::HistogramSpec;
use perfstat_core::report::Report;
use proptest::prelude::*;

use crate::common::harness::CoreTree;

fn filter_atom() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("true".to_string()),
        Just("false".to_string()),
        Just("vis >= normal".to_string()),
        Just("vis < detail".to_string()),
        Just("type:counter".to_string()),
        Just("type != stat".to_string()),
        Just("tag:core".to_string()),
        Just("name regex \"r.*\"".to_string()),
    ]
}

fn filter_source() -> impl Strategy<Value = String> {
    filter_atom().prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a}) && ({b})")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a}) || ({b})")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a}) ^^ ({b})")),
            inner.prop_map(|a| format!("!({a})")),
        ]
    })
}

proptest! {
    /// A normal counter only ever grows, and ends at the sum of its increments.
    #[test]
    fn counters_are_monotonic(steps in prop::collection::vec(0u64..1_000, 0..64)) {
        let mut tree = SimTree::new();
        let stats = tree.statistic_set(tree.root()).unwrap();
        let c = tree.add_counter(stats, "c", "Events", CounterBehavior::Normal).unwrap();
        let mut previous = 0;
        for k in &steps {
            let now = tree.increment(c, *k).unwrap();
            prop_assert!(now >= previous);
            previous = now;
        }
        prop_assert_eq!(tree.counter_value(c).unwrap(), steps.iter().sum::<u64>());
    }

    /// Exactly one cycle-histogram bin counts at any time, so the bins sum to the
    /// elapsed cycles.
    #[test]
    fn cycle_histogram_conserves_cycles(
        moves in prop::collection::vec((0u64..20, 0u64..10), 0..32)
    ) {
        let mut tree = SimTree::new();
        let root = tree.root();
        let h = tree
            .add_cycle_histogram(root, "occ", "Occupancy", &HistogramSpec::new(4, 12, 2))
            .unwrap();
        tree.finalize().unwrap();
        let mut elapsed = 0;
        for (value, cycles) in &moves {
            tree.histogram_set_value(h, *value).unwrap();
            tree.advance(*cycles);
            elapsed += cycles;
        }
        let bins = tree.histogram(h).unwrap().nodes().all_bins();
        let counted: u64 = bins.iter().map(|b| tree.counter_value(*b).unwrap()).sum();
        prop_assert_eq!(counted, elapsed);
        let total = tree.histogram(h).unwrap().nodes().total;
        prop_assert_eq!(tree.value(total).unwrap(), elapsed as f64);
    }

    /// Bin probabilities of a non-empty value histogram sum to one.
    #[test]
    fn value_histogram_probabilities_close(values in prop::collection::vec(0u64..40, 1..64)) {
        let mut tree = SimTree::new();
        let root = tree.root();
        let h = tree
            .add_histogram(root, "v", "Values", &HistogramSpec::new(0, 16, 4))
            .unwrap();
        tree.finalize().unwrap();
        for v in &values {
            tree.histogram_add_value(h, *v).unwrap();
        }
        let stats = tree.histogram(h).unwrap().nodes().stats;
        let sum: f64 = tree
            .node(stats)
            .unwrap()
            .children()
            .iter()
            .filter(|c| tree.node(**c).unwrap().name().ends_with("_probability"))
            .map(|c| tree.value(*c).unwrap())
            .sum();
        prop_assert!((sum - 1.0).abs() < 1e-9, "probabilities sum to {}", sum);
    }

    /// Filters are total, and negation is the complement on every node.
    #[test]
    fn filters_are_total(source in filter_source()) {
        let mut tree = SimTree::new();
        let stats = tree.statistic_set(tree.root()).unwrap();
        let retired = tree.add_counter(stats, "retired", "Retired", CounterBehavior::Normal).unwrap();
        tree.set_visibility(retired, Visibility::SUMMARY).unwrap();
        let _ = tree.attrs_mut(retired).unwrap().tags.insert("core".to_string());
        let stall = tree.add_counter(stats, "stall", "Stalls", CounterBehavior::Normal).unwrap();
        tree.set_visibility(stall, Visibility::SUPPORT).unwrap();

        let filter = Filter::parse(&source).unwrap();
        let negated = Filter::parse(&format!("!({source})")).unwrap();
        for node in [tree.root(), stats, retired, stall] {
            prop_assert_eq!(negated.matches(&tree, node), !filter.matches(&tree, node));
        }
    }

    /// Autopopulation names statistics deterministically and ignores repeats.
    #[test]
    fn autopopulate_is_deterministic_and_idempotent(
        n in 1usize..5,
        source in filter_source(),
    ) {
        let first = CoreTree::build(n, true);
        let second = CoreTree::build(n, true);
        let root = first.tree.root();

        let mut a = Report::new("a", root);
        let added = a.autopopulate(&first.tree, root, &source, &[], None, None).unwrap();
        prop_assert_eq!(a.autopopulate(&first.tree, root, &source, &[], None, None).unwrap(), 0);
        prop_assert_eq!(a.total_stats(), added);

        let mut b = Report::new("a", second.tree.root());
        let _ = b.autopopulate(&second.tree, second.tree.root(), &source, &[], None, None).unwrap();
        prop_assert_eq!(a.all_stat_names(), b.all_stat_names());
    }
}
