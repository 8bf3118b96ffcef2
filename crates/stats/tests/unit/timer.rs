//! State-timer unit tests.
//!
//! Covers state transitions, release-time flushing, dynamic queries, pool growth, and
//! handles outliving their unit.

use perfstat_core::SimTree;
use perfstat_core::StatsError;
use perfstat_core::common::Visibility;
use perfstat_core::config::StateTimerConfig;
use perfstat_core::sim::NodeId;
use perfstat_core::timer::StateTimerUnit;

use crate::common::harness::init_tracing;

perfstat_core::state_enum! {
    enum Abc { A, B, C }
}

perfstat_core::state_enum! {
    enum Bus { Idle, Busy }
}

fn unit_with(config: &StateTimerConfig) -> (SimTree, StateTimerUnit) {
    init_tracing();
    let mut tree = SimTree::new();
    let root = tree.root();
    let unit = StateTimerUnit::new(&mut tree, root, "lsu", config).unwrap();
    (tree, unit)
}

fn bin(tree: &SimTree, histogram: NodeId, name: &str) -> f64 {
    let stats = tree.histogram(histogram).unwrap().nodes().stats;
    tree.value(tree.child(stats, name).unwrap()).unwrap()
}

#[test]
fn release_flushes_cycles_per_state() {
    let (mut tree, unit) = unit_with(&StateTimerConfig::default());
    let h = unit.register_state_set::<Abc>(&mut tree, "abc", Visibility::NORMAL).unwrap();
    tree.finalize().unwrap();

    let timer = unit.allocate().unwrap();
    timer.start_state(Abc::A).unwrap();
    tree.advance(10);
    timer.start_state(Abc::B).unwrap();
    tree.advance(5);
    timer.start_state(Abc::C).unwrap();
    tree.advance(10);
    drop(timer);

    assert_eq!(bin(&tree, h, "A"), 10.0);
    assert_eq!(bin(&tree, h, "B"), 5.0);
    assert_eq!(bin(&tree, h, "C"), 10.0);
    assert_eq!(bin(&tree, h, "total"), 25.0);
    assert_eq!(bin(&tree, h, "B_probability"), 0.2);
    assert_eq!(unit.num_active(), 0);
}

#[test]
fn histograms_see_nothing_until_flushed() {
    let (mut tree, unit) = unit_with(&StateTimerConfig::default());
    let h = unit.register_state_set::<Abc>(&mut tree, "abc", Visibility::NORMAL).unwrap();
    tree.finalize().unwrap();

    let timer = unit.allocate().unwrap();
    timer.start_state(Abc::B).unwrap();
    tree.advance(4);
    assert_eq!(bin(&tree, h, "B"), 0.0);

    unit.dynamic_query();
    assert_eq!(bin(&tree, h, "B"), 4.0);
    tree.advance(3);
    assert_eq!(unit.dynamic_query_set::<Abc>().unwrap(), "A:0 B:7 C:0");
    assert_eq!(timer.active_state::<Abc>().unwrap(), Some(1));
}

#[test]
fn end_state_stops_accumulating() {
    let (mut tree, unit) = unit_with(&StateTimerConfig::default());
    let _ = unit.register_state_set::<Abc>(&mut tree, "abc", Visibility::NORMAL).unwrap();
    let timer = unit.allocate().unwrap();
    timer.start_state(Abc::A).unwrap();
    tree.advance(2);
    timer.end_state(Abc::A).unwrap();
    tree.advance(8);
    assert_eq!(timer.active_state::<Abc>().unwrap(), None);
    assert!(matches!(
        timer.end_state(Abc::A),
        Err(StatsError::NoActiveState { .. })
    ));
    drop(timer);
    assert_eq!(unit.dynamic_query_set::<Abc>().unwrap(), "A:2 B:0 C:0");
}

#[test]
fn state_sets_are_tracked_independently() {
    let (mut tree, unit) = unit_with(&StateTimerConfig::default());
    let _ = unit.register_state_set::<Abc>(&mut tree, "abc", Visibility::NORMAL).unwrap();
    let bus = unit.register_state_set::<Bus>(&mut tree, "bus", Visibility::SUMMARY).unwrap();
    assert_eq!(unit.histogram_of::<Bus>().unwrap(), bus);

    let timer = unit.allocate().unwrap();
    timer.start_state(Abc::C).unwrap();
    timer.start_state(Bus::Busy).unwrap();
    tree.advance(6);
    timer.start_state(Bus::Idle).unwrap();
    tree.advance(1);
    drop(timer);
    assert_eq!(unit.dynamic_query_set::<Abc>().unwrap(), "A:0 B:0 C:7");
    assert_eq!(unit.dynamic_query_set::<Bus>().unwrap(), "Idle:1 Busy:6");
}

#[test]
fn unregistered_state_sets_are_errors() {
    let (mut tree, unit) = unit_with(&StateTimerConfig::default());
    let _ = unit.register_state_set::<Abc>(&mut tree, "abc", Visibility::NORMAL).unwrap();
    let timer = unit.allocate().unwrap();
    assert!(matches!(
        timer.start_state(Bus::Busy),
        Err(StatsError::UnresolvedPath { .. })
    ));
    assert!(unit.histogram_of::<Bus>().is_err());
}

#[test]
fn pool_grows_then_exhausts_at_cap() {
    let config = StateTimerConfig {
        initial: 1,
        growth: 1,
        cap: 2,
    };
    let (_tree, unit) = unit_with(&config);
    assert_eq!(unit.capacity(), 1);
    let first = unit.allocate().unwrap();
    let second = unit.allocate().unwrap();
    assert_eq!(unit.capacity(), 2);
    assert!(matches!(
        unit.allocate(),
        Err(StatsError::PoolExhausted { cap: 2 })
    ));

    let reused = first.index();
    drop(first);
    let third = unit.allocate().unwrap();
    assert_eq!(third.index(), reused);
    assert_eq!(unit.capacity(), 2);
    assert_eq!(unit.num_active(), 2);
    drop(second);
    drop(third);
}

#[test]
fn reallocated_timers_start_clean() {
    let (mut tree, unit) = unit_with(&StateTimerConfig::default());
    let _ = unit.register_state_set::<Abc>(&mut tree, "abc", Visibility::NORMAL).unwrap();
    let timer = unit.allocate().unwrap();
    timer.start_state(Abc::A).unwrap();
    tree.advance(3);
    drop(timer);
    let timer = unit.allocate().unwrap();
    assert_eq!(timer.active_state::<Abc>().unwrap(), None);
    tree.advance(3);
    drop(timer);
    assert_eq!(unit.dynamic_query_set::<Abc>().unwrap(), "A:3 B:0 C:0");
}

#[test]
fn teardown_flushes_active_timers() {
    let (mut tree, unit) = unit_with(&StateTimerConfig::default());
    let _ = unit.register_state_set::<Abc>(&mut tree, "abc", Visibility::NORMAL).unwrap();
    let timer = unit.allocate().unwrap();
    timer.start_state(Abc::C).unwrap();
    tree.advance(5);
    unit.teardown();
    assert_eq!(unit.num_active(), 0);
    assert_eq!(unit.dynamic_query_set::<Abc>().unwrap(), "A:0 B:0 C:5");
    drop(timer);
    assert_eq!(unit.dynamic_query_set::<Abc>().unwrap(), "A:0 B:0 C:5");
}

#[test]
fn handles_released_by_teardown_cannot_touch_the_next_owner() {
    let (mut tree, unit) = unit_with(&StateTimerConfig::default());
    let _ = unit.register_state_set::<Abc>(&mut tree, "abc", Visibility::NORMAL).unwrap();
    let stale = unit.allocate().unwrap();
    stale.start_state(Abc::A).unwrap();
    unit.teardown();

    let owner = unit.allocate().unwrap();
    assert_eq!(owner.index(), stale.index());
    assert!(owner.is_attached());
    assert!(!stale.is_attached());
    assert!(matches!(
        stale.start_state(Abc::C),
        Err(StatsError::DetachedTimer)
    ));
    assert!(matches!(
        stale.active_state::<Abc>(),
        Err(StatsError::DetachedTimer)
    ));

    owner.start_state(Abc::B).unwrap();
    tree.advance(4);
    drop(stale);
    assert_eq!(unit.num_active(), 1);
    assert_eq!(owner.active_state::<Abc>().unwrap(), Some(1));

    let next = unit.allocate().unwrap();
    assert_ne!(next.index(), owner.index());
    assert_eq!(unit.num_active(), 2);
    drop(owner);
    drop(next);
    assert_eq!(unit.dynamic_query_set::<Abc>().unwrap(), "A:0 B:4 C:0");
}

#[test]
fn handles_outliving_the_unit_are_inert() {
    let (mut tree, unit) = unit_with(&StateTimerConfig::default());
    let _ = unit.register_state_set::<Abc>(&mut tree, "abc", Visibility::NORMAL).unwrap();
    let timer = unit.allocate().unwrap();
    timer.start_state(Abc::A).unwrap();
    drop(unit);
    assert!(!timer.is_attached());
    assert!(matches!(
        timer.start_state(Abc::B),
        Err(StatsError::DetachedTimer)
    ));
}
