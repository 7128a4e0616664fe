//! Target discovery boundary
//!
//! The session does not decide which processes are interesting; a
//! [`TargetFinder`] maps a sampled process id to the label set its profile
//! should carry. A `None` answer drops every sample of that process for the
//! round. Real agents back this with service discovery; the demo binary uses
//! [`StaticTargetFinder`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::Pid;

/// Well-known label carrying the service name of a target.
pub const LABEL_SERVICE_NAME: &str = "service_name";

/// Label set attached to every sample of one discovered process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    labels: BTreeMap<String, String>,
}

impl Target {
    #[must_use]
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    #[must_use]
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// The `service_name` label, or "unspecified" when the target carries none.
    #[must_use]
    pub fn service_name(&self) -> &str {
        self.labels
            .get(LABEL_SERVICE_NAME)
            .map_or("unspecified", String::as_str)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.labels {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Maps a process id to the labels its samples should carry.
///
/// Returning `None` means "unknown process, drop the sample".
pub trait TargetFinder {
    fn find_target(&self, pid: Pid) -> Option<Arc<Target>>;
}

/// Finder that labels every sampled process with one fixed target.
pub struct StaticTargetFinder {
    target: Arc<Target>,
}

impl StaticTargetFinder {
    #[must_use]
    pub fn new(service_name: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_SERVICE_NAME.to_string(), service_name.to_string());
        Self {
            target: Arc::new(Target::new(labels)),
        }
    }
}

impl TargetFinder for StaticTargetFinder {
    fn find_target(&self, _pid: Pid) -> Option<Arc<Target>> {
        Some(Arc::clone(&self.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_label() {
        let finder = StaticTargetFinder::new("checkout");
        let target = finder.find_target(Pid(1)).unwrap();
        assert_eq!(target.service_name(), "checkout");
        assert_eq!(target.to_string(), "service_name=checkout");
    }

    #[test]
    fn test_service_name_fallback() {
        let target = Target::new(BTreeMap::new());
        assert_eq!(target.service_name(), "unspecified");
    }
}
