use crate::error::StoreError;
use crate::key_value::{KeyDescriptor, KeyScanRequest};
use crate::traits::KeyValueStore;
use log::debug;

/// Result of the latest key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySnapshot {
    /// Bumped on every refresh, starting at 1 for the first scan.
    pub version: u64,
    pub pattern: String,
    pub database: Option<u32>,
    pub entries: Vec<KeyDescriptor>,
}

impl KeySnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&KeyDescriptor> {
        self.entries.iter().find(|entry| entry.key == key)
    }
}

/// Key list shown to the operator.
///
/// `refresh` is the only operation that talks to the store; everything else
/// works on the current snapshot.
#[derive(Debug, Default)]
pub struct KeyListing {
    snapshot: KeySnapshot,
}

impl KeyListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &KeySnapshot {
        &self.snapshot
    }

    /// Replaces the snapshot with a fresh scan. On error the previous snapshot is kept.
    pub fn refresh(
        &mut self,
        store: &dyn KeyValueStore,
        request: &KeyScanRequest,
    ) -> Result<&KeySnapshot, StoreError> {
        let mut entries = store.list_keys(request)?;
        entries.truncate(request.max_keys);

        debug!(
            "Scanned {} keys matching '{}'",
            entries.len(),
            request.effective_pattern()
        );

        self.snapshot = KeySnapshot {
            version: self.snapshot.version + 1,
            pattern: request.effective_pattern().to_string(),
            database: request.database,
            entries,
        };

        Ok(&self.snapshot)
    }

    pub fn filter(&self, substring: &str) -> Vec<KeyDescriptor> {
        filter_keys(&self.snapshot.entries, substring)
    }

    /// Drops a key from the snapshot. Returns whether it was listed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.snapshot.entries.len();
        self.snapshot.entries.retain(|entry| entry.key != key);
        before != self.snapshot.entries.len()
    }

    /// Adds a key at the end of the snapshot, or updates it in place if already listed.
    pub fn append(&mut self, descriptor: KeyDescriptor) {
        match self
            .snapshot
            .entries
            .iter_mut()
            .find(|entry| entry.key == descriptor.key)
        {
            Some(existing) => *existing = descriptor,
            None => self.snapshot.entries.push(descriptor),
        }
    }

    pub fn clear(&mut self) {
        self.snapshot = KeySnapshot {
            version: self.snapshot.version + 1,
            ..KeySnapshot::default()
        };
    }
}

/// Keeps descriptors whose display text contains `substring`, ignoring case.
///
/// Order is preserved and an empty substring keeps everything.
pub fn filter_keys(keys: &[KeyDescriptor], substring: &str) -> Vec<KeyDescriptor> {
    if substring.is_empty() {
        return keys.to_vec();
    }

    let needle = substring.to_lowercase();
    keys.iter()
        .filter(|entry| entry.display_text().to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_value::KeyType;

    fn descriptors(keys: &[&str]) -> Vec<KeyDescriptor> {
        keys.iter()
            .map(|key| KeyDescriptor::new(*key, KeyType::String))
            .collect()
    }

    fn keys_of(entries: &[KeyDescriptor]) -> Vec<&str> {
        entries.iter().map(|entry| entry.key.as_str()).collect()
    }

    #[test]
    fn filter_is_case_insensitive_and_order_preserving() {
        let keys = descriptors(&["user:1", "session:9", "USER:2", "order:user"]);
        let filtered = filter_keys(&keys, "User");
        assert_eq!(keys_of(&filtered), ["user:1", "USER:2", "order:user"]);
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let keys = descriptors(&["b", "a"]);
        assert_eq!(filter_keys(&keys, ""), keys);
    }

    #[test]
    fn filter_without_match_is_empty() {
        assert!(filter_keys(&descriptors(&["a", "b"]), "zzz").is_empty());
    }

    #[test]
    fn append_replaces_listed_key_in_place() {
        let mut listing = KeyListing::new();
        listing.append(KeyDescriptor::new("a", KeyType::List).with_len(1));
        listing.append(KeyDescriptor::new("b", KeyType::String));
        listing.append(KeyDescriptor::new("a", KeyType::List).with_len(3));

        let entries = &listing.snapshot().entries;
        assert_eq!(keys_of(entries), ["a", "b"]);
        assert_eq!(entries[0].len, 3);
    }

    #[test]
    fn remove_reports_whether_key_was_listed() {
        let mut listing = KeyListing::new();
        listing.append(KeyDescriptor::new("a", KeyType::String));

        assert!(listing.remove("a"));
        assert!(!listing.remove("a"));
        assert!(listing.snapshot().is_empty());
    }
}
