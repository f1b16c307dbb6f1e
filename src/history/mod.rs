pub mod persist;
pub mod record;

use crate::config::HistoryConfig;
use std::sync::{Mutex, MutexGuard};

pub use persist::{JsonFileStore, MemoryStore, RecordStore};
pub use record::ScanRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFilter {
    #[default]
    All,
    Bookmarked,
}

impl HistoryFilter {
    fn accepts(&self, record: &ScanRecord) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Bookmarked => record.bookmarked,
        }
    }
}

/// Map a position in the most-recent-first view onto the storage slot.
pub fn display_to_storage(display_index: usize, len: usize) -> Option<usize> {
    if display_index < len {
        Some(len - 1 - display_index)
    } else {
        None
    }
}

/// Same as [`display_to_storage`] for a filtered view: the `display_index`th
/// record, newest first, among those the filter accepts.
pub fn resolve_display_index(
    records: &[ScanRecord],
    filter: HistoryFilter,
    display_index: usize,
) -> Option<usize> {
    if filter == HistoryFilter::All {
        return display_to_storage(display_index, records.len());
    }
    records
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, r)| filter.accepts(r))
        .nth(display_index)
        .map(|(slot, _)| slot)
}

/// Ordered, chronological scan history. Single owner of every record.
///
/// Every mutation runs under one lock and is written through to the
/// persistent store before the lock is released, so an index resolved inside
/// a mutation is always applied to the sequence it was resolved against.
pub struct HistoryStore {
    records: Mutex<Vec<ScanRecord>>,
    persist: Box<dyn RecordStore>,
    max_records: usize,
    dedupe_window: chrono::Duration,
}

impl HistoryStore {
    /// Load persisted records and take ownership of the store.
    pub fn open(persist: Box<dyn RecordStore>, config: &HistoryConfig) -> Self {
        let records = match persist.list() {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Failed to load scan history, starting empty: {e:#}");
                Vec::new()
            }
        };
        log::debug!("Loaded {} history records", records.len());

        let store = Self {
            records: Mutex::new(records),
            persist,
            max_records: config.max_records.max(1),
            dedupe_window: chrono::Duration::seconds(
                config.dedupe_window_secs.min(u64::from(u32::MAX)) as i64,
            ),
        };
        // The file may predate a lower max_records
        store.evict_overflow(&mut store.lock());
        store
    }

    pub fn in_memory(config: &HistoryConfig) -> Self {
        Self::open(Box::new(MemoryStore::new()), config)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ScanRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a finalized record at the tail.
    ///
    /// A re-scan of the newest record's payload inside the dedupe window
    /// replaces that record, keeping its id and bookmark. Past
    /// `max_records`, the oldest non-bookmarked records are evicted.
    pub fn append(&self, mut record: ScanRecord) {
        let mut records = self.lock();

        if let Some(newest) = records.last_mut() {
            let age = record.created_at - newest.created_at;
            if newest.raw_payload == record.raw_payload
                && age >= chrono::Duration::zero()
                && age <= self.dedupe_window
                && self.dedupe_window > chrono::Duration::zero()
            {
                log::debug!("Replacing duplicate scan {} in history", newest.id);
                record.id = newest.id;
                record.bookmarked = newest.bookmarked;
                *newest = record;
                if let Err(e) = self.persist.update(newest) {
                    log::warn!("Failed to persist replaced scan record: {e:#}");
                }
                return;
            }
        }

        if let Err(e) = self.persist.append(&record) {
            log::warn!("Failed to persist scan record: {e:#}");
        }
        records.push(record);
        self.evict_overflow(&mut records);
    }

    /// Drop the oldest non-bookmarked records until the bound holds.
    fn evict_overflow(&self, records: &mut Vec<ScanRecord>) {
        while records.len() > self.max_records {
            let Some(slot) = records.iter().position(|r| !r.bookmarked) else {
                log::warn!(
                    "History holds {} bookmarked records, above the limit of {}",
                    records.len(),
                    self.max_records
                );
                break;
            };
            let evicted = records.remove(slot);
            log::debug!("Evicted oldest scan {} from history", evicted.id);
            if let Err(e) = self.persist.remove(evicted.id) {
                log::warn!("Failed to remove evicted scan record: {e:#}");
            }
        }
    }

    /// Snapshot of the history, most recent first.
    pub fn list(&self, filter: HistoryFilter) -> Vec<ScanRecord> {
        self.lock()
            .iter()
            .rev()
            .filter(|r| filter.accepts(r))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Flip the bookmark of the record at `display_index` in the full view.
    /// Returns the new flag, or `None` if the index was out of range.
    pub fn toggle_bookmark(&self, display_index: usize) -> Option<bool> {
        self.toggle_bookmark_in(HistoryFilter::All, display_index)
    }

    pub fn toggle_bookmark_in(&self, filter: HistoryFilter, display_index: usize) -> Option<bool> {
        let mut records = self.lock();
        let Some(slot) = resolve_display_index(&records, filter, display_index) else {
            log::debug!("Ignoring bookmark toggle for out-of-range index {display_index}");
            return None;
        };

        let record = &mut records[slot];
        record.bookmarked = !record.bookmarked;
        if let Err(e) = self.persist.update(record) {
            log::warn!("Failed to persist bookmark change: {e:#}");
        }
        Some(record.bookmarked)
    }

    /// Remove the record at `display_index` in the full view. `None` and
    /// out-of-range indices are no-ops.
    pub fn delete(&self, display_index: Option<usize>) -> Option<ScanRecord> {
        self.delete_in(HistoryFilter::All, display_index)
    }

    pub fn delete_in(
        &self,
        filter: HistoryFilter,
        display_index: Option<usize>,
    ) -> Option<ScanRecord> {
        let display_index = display_index?;
        let mut records = self.lock();
        let Some(slot) = resolve_display_index(&records, filter, display_index) else {
            log::debug!("Ignoring delete for out-of-range index {display_index}");
            return None;
        };

        let removed = records.remove(slot);
        if let Err(e) = self.persist.remove(removed.id) {
            log::warn!("Failed to persist deletion of {}: {e:#}", removed.id);
        }
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::record::sample;
    use std::sync::Arc;

    fn config() -> HistoryConfig {
        HistoryConfig {
            path: String::new(),
            max_records: 100,
            dedupe_window_secs: 0,
        }
    }

    fn store_with(payloads: &[&str]) -> HistoryStore {
        let store = HistoryStore::in_memory(&config());
        for payload in payloads {
            store.append(sample(payload));
        }
        store
    }

    fn payloads(records: &[ScanRecord]) -> Vec<&str> {
        records.iter().map(|r| r.raw_payload.as_str()).collect()
    }

    #[test]
    fn test_display_to_storage() {
        assert_eq!(display_to_storage(0, 3), Some(2));
        assert_eq!(display_to_storage(2, 3), Some(0));
        assert_eq!(display_to_storage(3, 3), None);
        assert_eq!(display_to_storage(0, 0), None);
    }

    #[test]
    fn test_append_then_list_round_trip() {
        let store = HistoryStore::in_memory(&config());
        let record = sample("https://safe-site.example");
        store.append(record.clone());
        store.append(sample("second"));

        let listed = store.list(HistoryFilter::All);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1], record);
    }

    #[test]
    fn test_list_is_reverse_chronological() {
        let store = store_with(&["r0", "r1", "r2"]);
        assert_eq!(payloads(&store.list(HistoryFilter::All)), ["r2", "r1", "r0"]);
    }

    #[test]
    fn test_toggle_addresses_display_order() {
        let store = store_with(&["r0", "r1", "r2"]);
        assert_eq!(store.toggle_bookmark(0), Some(true));

        let listed = store.list(HistoryFilter::All);
        assert!(listed[0].bookmarked, "newest record should be bookmarked");
        assert!(!listed[2].bookmarked, "oldest record must be untouched");
    }

    #[test]
    fn test_toggle_twice_restores_flag() {
        let store = store_with(&["r0", "r1"]);
        store.toggle_bookmark(1);
        store.toggle_bookmark(1);
        assert!(store.list(HistoryFilter::All).iter().all(|r| !r.bookmarked));
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let store = store_with(&["r0", "r1"]);
        let before = store.list(HistoryFilter::All);

        assert_eq!(store.toggle_bookmark(2), None);
        assert!(store.delete(None).is_none());
        assert!(store.delete(Some(2)).is_none());
        assert!(store.delete(Some(usize::MAX)).is_none());

        assert_eq!(store.list(HistoryFilter::All), before);
    }

    #[test]
    fn test_delete_by_display_index() {
        let store = store_with(&["r0", "r1", "r2"]);
        let removed = store.delete(Some(2)).unwrap();
        assert_eq!(removed.raw_payload, "r0");
        assert_eq!(payloads(&store.list(HistoryFilter::All)), ["r2", "r1"]);
    }

    #[test]
    fn test_deleting_bookmarked_record_leaves_both_views() {
        let store = store_with(&["r0", "r1", "r2"]);
        store.toggle_bookmark(1);
        assert_eq!(payloads(&store.list(HistoryFilter::Bookmarked)), ["r1"]);

        store.delete(Some(1));
        assert!(store.list(HistoryFilter::Bookmarked).is_empty());
        assert_eq!(payloads(&store.list(HistoryFilter::All)), ["r2", "r0"]);
    }

    #[test]
    fn test_filtered_view_addressing() {
        let store = store_with(&["r0", "r1", "r2", "r3"]);
        store.toggle_bookmark(3); // r0
        store.toggle_bookmark(1); // r2

        // Bookmarked view is [r2, r0]; index 1 is r0
        let removed = store.delete_in(HistoryFilter::Bookmarked, Some(1)).unwrap();
        assert_eq!(removed.raw_payload, "r0");
        assert_eq!(store.toggle_bookmark_in(HistoryFilter::Bookmarked, 0), Some(false));
        assert!(store.list(HistoryFilter::Bookmarked).is_empty());
        assert_eq!(store.toggle_bookmark_in(HistoryFilter::Bookmarked, 0), None);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let store = store_with(&["r0"]);
        let mut snapshot = store.list(HistoryFilter::All);
        snapshot[0].bookmarked = true;
        snapshot.clear();
        assert_eq!(store.len(), 1);
        assert!(!store.list(HistoryFilter::All)[0].bookmarked);
    }

    #[test]
    fn test_eviction_spares_bookmarks() {
        let store = HistoryStore::in_memory(&HistoryConfig {
            max_records: 2,
            ..config()
        });
        store.append(sample("r0"));
        store.toggle_bookmark(0);
        store.append(sample("r1"));
        store.append(sample("r2"));

        // r1 is the oldest non-bookmarked record
        assert_eq!(payloads(&store.list(HistoryFilter::All)), ["r2", "r0"]);
    }

    #[test]
    fn test_open_trims_oversized_history() {
        let persist = Arc::new(MemoryStore::new());
        for payload in ["r0", "r1", "r2", "r3", "r4"] {
            persist.append(&sample(payload)).unwrap();
        }
        let mut bookmarked = sample("r5");
        bookmarked.bookmarked = true;
        persist.append(&bookmarked).unwrap();

        let store = HistoryStore::open(
            Box::new(persist.clone()),
            &HistoryConfig {
                max_records: 3,
                ..config()
            },
        );

        assert_eq!(payloads(&store.list(HistoryFilter::All)), ["r5", "r4", "r3"]);
        assert_eq!(persist.list().unwrap().len(), 3);
    }

    #[test]
    fn test_dedupe_replaces_newest() {
        let store = HistoryStore::in_memory(&HistoryConfig {
            dedupe_window_secs: 60,
            ..config()
        });
        store.append(sample("https://a.example"));
        store.toggle_bookmark(0);
        let original_id = store.list(HistoryFilter::All)[0].id;

        store.append(sample("https://a.example"));
        let listed = store.list(HistoryFilter::All);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, original_id);
        assert!(listed[0].bookmarked);

        // A different payload in between breaks the run
        store.append(sample("other"));
        store.append(sample("https://a.example"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_mutations_are_persisted() {
        let persist = Arc::new(MemoryStore::new());
        let store = HistoryStore::open(Box::new(persist.clone()), &config());
        store.append(sample("r0"));
        store.append(sample("r1"));
        store.toggle_bookmark(1);
        store.delete(Some(0));

        let stored = persist.list().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].raw_payload, "r0");
        assert!(stored[0].bookmarked);

        // Reopening from the same backing store restores the history
        let reopened = HistoryStore::open(Box::new(persist), &config());
        assert_eq!(reopened.list(HistoryFilter::All), store.list(HistoryFilter::All));
    }

    #[test]
    fn test_concurrent_mutations_stay_consistent() {
        let store = Arc::new(store_with(&[]));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.append(sample(&format!("t{t}-{i}")));
                        store.toggle_bookmark(0);
                        if i % 3 == 0 {
                            store.delete(Some(1));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let listed = store.list(HistoryFilter::All);
        assert_eq!(listed.len(), store.len());
        let ids: std::collections::HashSet<_> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), listed.len());
    }
}
