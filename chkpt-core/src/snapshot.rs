//! In-memory checkpoint state of a whole job.
//!
//! Every transform returns a new `Snapshot`. Task snapshots are owned maps,
//! so a clone or a merge never shares inner entries with its inputs.
//!
//! The whole state is held in memory. Checkpoint topics carry one live entry
//! per task, so this stays small for any realistic job.

use std::collections::{btree_map, BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::record::{TaskKey, TaskSnapshot};

/// Include/exclude sets of stream names. An empty set places no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFilter {
    #[serde(default)]
    pub include: BTreeSet<String>,
    #[serde(default)]
    pub exclude: BTreeSet<String>,
}

impl StreamFilter {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn allows(&self, stream: &str) -> bool {
        (self.include.is_empty() || self.include.contains(stream))
            && (self.exclude.is_empty() || !self.exclude.contains(stream))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    tasks: BTreeMap<TaskKey, TaskSnapshot>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a task, replacing whatever was stored for the key.
    pub fn insert(&mut self, key: TaskKey, streams: TaskSnapshot) -> Option<TaskSnapshot> {
        self.tasks.insert(key, streams)
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TaskSnapshot> {
        self.tasks.get(key)
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.tasks.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, TaskKey, TaskSnapshot> {
        self.tasks.iter()
    }

    /// Total number of stream-partition checkpoints across all tasks.
    pub fn checkpoint_count(&self) -> usize {
        self.tasks.values().map(BTreeMap::len).sum()
    }

    /// Narrows every task to the checkpoints whose stream passes `filter`.
    /// Tasks left without checkpoints are kept.
    pub fn filter(&self, filter: &StreamFilter) -> Snapshot {
        let tasks = self
            .tasks
            .iter()
            .map(|(key, streams)| {
                let kept: TaskSnapshot = streams
                    .iter()
                    .filter(|(_, cp)| filter.allows(&cp.stream))
                    .map(|(id, cp)| (id.clone(), cp.clone()))
                    .collect();
                (key.clone(), kept)
            })
            .collect();
        Snapshot { tasks }
    }

    /// Overlays `patch` onto a copy of `self`.
    ///
    /// Known tasks get a per-entry upsert (patch wins, untouched entries
    /// survive), unknown tasks are inserted whole, and patch tasks without
    /// checkpoints are ignored so they can never erase existing state.
    pub fn merge(&self, patch: &Snapshot) -> Snapshot {
        let mut merged = self.clone();
        for (key, streams) in patch.iter() {
            if streams.is_empty() {
                continue;
            }
            match merged.tasks.get_mut(key) {
                Some(existing) => {
                    for (id, cp) in streams {
                        existing.insert(id.clone(), cp.clone());
                    }
                }
                None => {
                    merged.tasks.insert(key.clone(), streams.clone());
                }
            }
        }
        merged
    }
}

impl FromIterator<(TaskKey, TaskSnapshot)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (TaskKey, TaskSnapshot)>>(iter: T) -> Self {
        Snapshot { tasks: iter.into_iter().collect() }
    }
}

impl IntoIterator for Snapshot {
    type Item = (TaskKey, TaskSnapshot);
    type IntoIter = btree_map::IntoIter<TaskKey, TaskSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a TaskKey, &'a TaskSnapshot);
    type IntoIter = btree_map::Iter<'a, TaskKey, TaskSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::record::CheckpointValue;

    pub fn key(partition: &str) -> TaskKey {
        TaskKey::new(
            "org.apache.samza.container.grouper.stream.GroupByPartitionFactory",
            format!("Partition-{partition}"),
        )
    }

    pub fn checkpoint(stream: &str, partition: &str, offset: &str) -> CheckpointValue {
        CheckpointValue {
            system: "kafka".into(),
            partition: partition.into(),
            offset: offset.into(),
            stream: stream.into(),
        }
    }

    pub fn streams(partition: &str, entries: &[(&str, &str)]) -> TaskSnapshot {
        entries
            .iter()
            .map(|(stream, offset)| {
                (format!("topic {stream} {partition}"), checkpoint(stream, partition, offset))
            })
            .collect()
    }

    /// Two tasks, three streams each.
    pub fn sample() -> Snapshot {
        let mut s = Snapshot::new();
        s.insert(key("121"), streams("121", &[("abc", "11111"), ("def", "66666"), ("xyz", "77777")]));
        s.insert(key("13"), streams("13", &[("abc", "22222"), ("def", "55555"), ("xyz", "33333")]));
        s
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn streams_of(snapshot: &Snapshot) -> BTreeSet<&str> {
        snapshot
            .iter()
            .flat_map(|(_, streams)| streams.values().map(|cp| cp.stream.as_str()))
            .collect()
    }

    #[test]
    fn empty_filter_is_identity() {
        let initial = sample();
        assert_eq!(initial.filter(&StreamFilter::default()), initial);
    }

    #[test]
    fn include_and_exclude_combine() {
        let filtered = sample().filter(&StreamFilter::new(["abc", "def"], ["abc"]));
        assert_eq!(filtered.len(), 2, "must keep all tasks");

        for p in ["121", "13"] {
            let streams = filtered.get(&key(p)).unwrap();
            assert!(!streams.contains_key(&format!("topic abc {p}")));
            assert!(streams.contains_key(&format!("topic def {p}")));
            assert!(!streams.contains_key(&format!("topic xyz {p}")));
        }
    }

    #[test]
    fn include_only_keeps_one_stream() {
        let initial = sample();
        let filtered = initial.filter(&StreamFilter::new(["xyz"], Vec::<String>::new()));
        assert_eq!(filtered.keys().collect::<Vec<_>>(), initial.keys().collect::<Vec<_>>());
        assert_eq!(streams_of(&filtered).into_iter().collect::<Vec<_>>(), vec!["xyz"]);
        assert_eq!(filtered.checkpoint_count(), 2);
    }

    #[test]
    fn exclude_only_drops_one_stream() {
        let filtered = sample().filter(&StreamFilter::new(Vec::<String>::new(), ["def"]));
        assert!(!streams_of(&filtered).contains("def"));
        assert_eq!(filtered.checkpoint_count(), 4);
    }

    #[test]
    fn filtering_everything_keeps_empty_tasks() {
        let filtered = sample().filter(&StreamFilter::new(["nope"], Vec::<String>::new()));
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|(_, streams)| streams.is_empty()));
    }

    #[test]
    fn filter_is_case_sensitive() {
        let filter = StreamFilter::new(["ABC"], Vec::<String>::new());
        assert!(!filter.allows("abc"));
        assert!(filter.allows("ABC"));
    }

    #[test]
    fn merge_with_itself_is_identity() {
        let s = sample();
        assert_eq!(s.merge(&s), s);
    }

    #[test]
    fn merge_overlays_entries_and_adds_tasks() {
        let base = sample();
        let mut patch = Snapshot::new();
        patch.insert(key("121"), streams("121", &[("def", "99000"), ("qrs", "99999")]));
        patch.insert(key("67"), streams("67", &[("abc", "54321"), ("def", "65432")]));

        let merged = base.merge(&patch);
        assert_eq!(merged.len(), 3);

        let t121 = merged.get(&key("121")).unwrap();
        assert_eq!(t121.len(), 4);
        assert_eq!(t121["topic abc 121"].offset, "11111");
        assert_eq!(t121["topic def 121"].offset, "99000");
        assert_eq!(t121["topic xyz 121"].offset, "77777");
        assert_eq!(t121["topic qrs 121"].offset, "99999");

        assert_eq!(merged.get(&key("13")), base.get(&key("13")));
        assert_eq!(merged.get(&key("67")), patch.get(&key("67")));
    }

    #[test]
    fn merge_ignores_empty_patch_tasks() {
        let base = sample();
        let mut patch = Snapshot::new();
        patch.insert(key("121"), TaskSnapshot::new());
        patch.insert(key("500"), TaskSnapshot::new());

        let merged = base.merge(&patch);
        assert_eq!(merged, base);
        assert!(!merged.contains(&key("500")));
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let base = sample();
        let base_before = base.clone();
        let mut patch = Snapshot::new();
        patch.insert(key("13"), streams("13", &[("abc", "1")]));
        let patch_before = patch.clone();

        let mut merged = base.merge(&patch);
        merged.insert(key("13"), TaskSnapshot::new());

        assert_eq!(base, base_before);
        assert_eq!(patch, patch_before);
    }
}
