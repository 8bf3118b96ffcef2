use perfstat_core::SimTree;
use perfstat_core::common::Visibility;
use perfstat_core::counter::CounterBehavior;
use perfstat_core::sim::NodeId;
use perfstat_core::statistic::{SnapshotMode, StatisticDef};

/// Installs a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Handles into one core of [`CoreTree`].
#[derive(Clone, Copy, Debug)]
pub struct CoreNodes {
    pub core: NodeId,
    pub stats: NodeId,
    pub retired: NodeId,
    pub cycles: NodeId,
    pub ipc: NodeId,
}

/// `top.core0` and `top.core1`, each with `retired`, `cycles` and `ipc`.
#[derive(Debug)]
pub struct CoreTree {
    pub tree: SimTree,
    pub cores: Vec<CoreNodes>,
}

impl Default for CoreTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreTree {
    pub fn new() -> Self {
        Self::build(2, true)
    }

    /// Builds `n` cores, finalizing the tree when `finalize` is set.
    pub fn build(n: usize, finalize: bool) -> Self {
        init_tracing();
        let mut tree = SimTree::new();
        let root = tree.root();
        let mut cores = Vec::with_capacity(n);
        for i in 0..n {
            let core = tree.add_resource(root, &format!("core{i}")).unwrap();
            let stats = tree.statistic_set(core).unwrap();
            let retired = tree
                .add_counter(stats, "retired", "Instructions retired", CounterBehavior::Normal)
                .unwrap();
            tree.set_visibility(retired, Visibility::SUMMARY).unwrap();
            let cycles = tree
                .add_counter(stats, "cycles", "Core cycles", CounterBehavior::Normal)
                .unwrap();
            tree.set_visibility(cycles, Visibility::NORMAL).unwrap();
            let ipc = tree
                .add_statistic_def(
                    stats,
                    "ipc",
                    "Instructions per cycle",
                    StatisticDef::new("retired / cycles").with_snapshot_mode(SnapshotMode::Leafwise),
                )
                .unwrap();
            cores.push(CoreNodes {
                core,
                stats,
                retired,
                cycles,
                ipc,
            });
        }
        if finalize {
            tree.finalize().unwrap();
        }
        Self { tree, cores }
    }

    /// Retires `retired` instructions over `cycles` cycles on core `i`.
    pub fn run(&mut self, i: usize, retired: u64, cycles: u64) {
        let core = self.cores[i];
        let _ = self.tree.increment(core.retired, retired).unwrap();
        let _ = self.tree.increment(core.cycles, cycles).unwrap();
    }
}
