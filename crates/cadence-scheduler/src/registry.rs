//! In-memory job registry.
//!
//! Holds every job definition together with its single trigger, keyed by
//! [`JobKey`]. The registry itself holds no scheduling logic; mutations of
//! one entry are serialized by the map's per-shard locking.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{Result, SchedulerError};
use crate::job::JobDefinition;
use crate::key::JobKey;
use crate::schedule::{MisfirePolicy, Schedule};
use crate::trigger::Trigger;

/// A job together with the trigger that drives it.
#[derive(Debug, Clone)]
pub struct RegisteredJob {
    pub definition: JobDefinition,
    pub trigger: Trigger,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: DashMap<JobKey, RegisteredJob>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job with its trigger. Returns `false`, leaving the registry
    /// untouched, if the key is already present.
    pub fn put(&self, definition: JobDefinition, trigger: Trigger) -> bool {
        match self.entries.entry(definition.key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(RegisteredJob {
                    definition,
                    trigger,
                });
                true
            }
        }
    }

    pub fn get(&self, key: &JobKey) -> Option<RegisteredJob> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &JobKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Snapshot of every job, ordered by group then name.
    pub fn list_all(&self) -> Vec<RegisteredJob> {
        let mut jobs: Vec<RegisteredJob> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| a.definition.key.cmp(&b.definition.key));
        jobs
    }

    pub fn keys(&self) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the schedule of an existing job.
    ///
    /// A given misfire policy overrides the one carried by a cron schedule.
    pub fn update_trigger(
        &self,
        key: &JobKey,
        schedule: Schedule,
        misfire: Option<MisfirePolicy>,
        now: DateTime<Utc>,
    ) -> Result<Trigger> {
        let schedule = schedule.with_misfire(misfire);
        self.modify(key, |entry| {
            entry.trigger.reschedule(schedule, now);
            entry.trigger.clone()
        })
    }

    /// Run `f` with exclusive access to one entry.
    pub fn modify<R>(&self, key: &JobKey, f: impl FnOnce(&mut RegisteredJob) -> R) -> Result<R> {
        self.with_entry_mut(key, f)
            .ok_or_else(|| SchedulerError::not_found(key))
    }

    pub(crate) fn with_entry_mut<R>(
        &self,
        key: &JobKey,
        f: impl FnOnce(&mut RegisteredJob) -> R,
    ) -> Option<R> {
        self.entries
            .get_mut(key)
            .map(|mut entry| f(entry.value_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::job_fn;
    use crate::schedule::RepeatCount;
    use crate::trigger::TriggerState;
    use chrono::TimeDelta;

    fn job(name: &str, group: &str) -> (JobDefinition, Trigger) {
        let key = JobKey::new(name, group).unwrap();
        let def = JobDefinition::new(key.clone(), job_fn(|_| Ok(())));
        let schedule = Schedule::interval(10, RepeatCount::Infinite).unwrap();
        let trigger = Trigger::new(key, schedule, TimeDelta::seconds(60), Utc::now());
        (def, trigger)
    }

    #[test]
    fn test_put_is_idempotent() {
        let registry = JobRegistry::new();
        let (def, trigger) = job("j1", "g");
        assert!(registry.put(def, trigger));

        let (mut other, other_trigger) = job("j1", "g");
        other.description = Some("second".to_string());
        assert!(!registry.put(other, other_trigger));

        assert_eq!(registry.len(), 1);
        let key = JobKey::new("j1", "g").unwrap();
        assert!(registry.get(&key).unwrap().definition.description.is_none());
    }

    #[test]
    fn test_remove() {
        let registry = JobRegistry::new();
        let (def, trigger) = job("j1", "g");
        let key = def.key.clone();
        registry.put(def, trigger);

        assert!(registry.contains(&key));
        assert!(registry.remove(&key));
        assert!(!registry.remove(&key));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_all_sorted() {
        let registry = JobRegistry::new();
        for (name, group) in [("b", "x"), ("a", "y"), ("a", "x")] {
            let (def, trigger) = job(name, group);
            registry.put(def, trigger);
        }

        let listed: Vec<String> = registry
            .list_all()
            .iter()
            .map(|job| job.definition.key.to_string())
            .collect();
        assert_eq!(listed, vec!["x.a", "x.b", "y.a"]);
        assert_eq!(registry.keys().len(), 3);
    }

    #[test]
    fn test_update_trigger() {
        let registry = JobRegistry::new();
        let (def, trigger) = job("j1", "g");
        let key = def.key.clone();
        registry.put(def, trigger);

        let schedule = Schedule::cron("0/10 * * * * ?", None).unwrap();
        let updated = registry
            .update_trigger(&key, schedule, Some(MisfirePolicy::DoNothing), Utc::now())
            .unwrap();
        assert_eq!(updated.schedule.misfire_policy(), Some(MisfirePolicy::DoNothing));
        assert_eq!(updated.state, TriggerState::Waiting);

        let stored = registry.get(&key).unwrap();
        assert_eq!(stored.trigger.schedule.describe(), "0/10 * * * * ?");
    }

    #[test]
    fn test_update_missing_job() {
        let registry = JobRegistry::new();
        let key = JobKey::new("missing", "g").unwrap();
        let schedule = Schedule::interval(1, RepeatCount::Infinite).unwrap();
        let result = registry.update_trigger(&key, schedule, None, Utc::now());
        assert!(matches!(result, Err(SchedulerError::NotFound { .. })));
    }

    #[test]
    fn test_modify() {
        let registry = JobRegistry::new();
        let (def, trigger) = job("j1", "g");
        let key = def.key.clone();
        registry.put(def, trigger);

        let paused = registry.modify(&key, |entry| entry.trigger.pause()).unwrap();
        assert!(paused);
        assert_eq!(
            registry.get(&key).unwrap().trigger.state,
            TriggerState::Paused
        );
    }
}
