use mockall::mock;
use perfstat_core::Result;
use perfstat_core::report::{ReportFormatter, ReportSnapshot};

mock! {
    pub Formatter {}
    impl ReportFormatter for Formatter {
        fn write_snapshot(&mut self, snapshot: &ReportSnapshot) -> Result<()>;
        fn finish(&mut self) -> Result<()>;
    }
}

/// Formatter that keeps every snapshot it receives.
#[derive(Debug, Default)]
pub struct CollectingFormatter {
    pub snapshots: Vec<ReportSnapshot>,
    pub finished: bool,
}

impl ReportFormatter for CollectingFormatter {
    fn write_snapshot(&mut self, snapshot: &ReportSnapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
