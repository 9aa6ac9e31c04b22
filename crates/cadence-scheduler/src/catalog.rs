//! Named executables available to configured jobs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, SchedulerError};
use crate::job::Job;

/// Maps executable identifiers from configuration to job implementations.
#[derive(Default, Clone)]
pub struct JobCatalog {
    entries: HashMap<String, Arc<dyn Job>>,
}

impl JobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executable, replacing any previous one with the same id.
    pub fn register(&mut self, id: impl Into<String>, job: Arc<dyn Job>) -> &mut Self {
        self.entries.insert(id.into(), job);
        self
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Job>> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownExecutable(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::job_fn;

    #[test]
    fn test_register_and_resolve() {
        let mut catalog = JobCatalog::new();
        catalog
            .register("log", job_fn(|_| Ok(())))
            .register("report", job_fn(|_| Ok(())));

        assert!(catalog.contains("log"));
        assert!(catalog.resolve("report").is_ok());
        assert_eq!(catalog.ids(), vec!["log", "report"]);
    }

    #[test]
    fn test_resolve_unknown() {
        let catalog = JobCatalog::new();
        let err = catalog.resolve("missing").err().unwrap();
        assert!(matches!(err, SchedulerError::UnknownExecutable(id) if id == "missing"));
    }
}
