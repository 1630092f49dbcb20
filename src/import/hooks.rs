//! Callbacks around an import run

use super::descriptor::BundleDescriptor;
use super::report::ImportReport;

/// Observer invoked once before and once after every run
pub trait ImportHook: Send + Sync {
    fn before_import(&self, _descriptor: &BundleDescriptor) {}

    fn after_import(&self, descriptor: &BundleDescriptor, report: &ImportReport);
}

impl<F> ImportHook for F
where
    F: Fn(&BundleDescriptor, &ImportReport) + Send + Sync,
{
    fn after_import(&self, descriptor: &BundleDescriptor, report: &ImportReport) {
        self(descriptor, report)
    }
}
