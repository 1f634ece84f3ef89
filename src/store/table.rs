//! Generic in-memory table with snapshot support.
//!
//! [`Table`] wraps a `RwLock<HashMap>` and is the single building block of
//! the repository layer: one table per entity. Concurrent reads are
//! allowed; writes to the same table are serialized. `snapshot`/`restore`
//! give the update-request orchestrator its all-or-nothing apply scope.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::RwLock;

/// In-memory keyed table.
#[derive(Debug)]
pub struct Table<K, V> {
    rows: RwLock<HashMap<K, V>>,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a row, returning `false` if the key was already present
    /// (the existing row is kept).
    pub async fn insert(&self, key: K, value: V) -> bool {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return false;
        }
        rows.insert(key, value);
        true
    }

    /// Inserts a row only if no existing row matches `conflict`. The check
    /// and the insert happen under one write lock, so two racing inserts
    /// cannot both pass.
    ///
    /// # Errors
    ///
    /// Returns the conflicting row when one matches.
    pub async fn insert_unique<F>(&self, key: K, value: V, conflict: F) -> Result<(), V>
    where
        F: Fn(&V) -> bool,
    {
        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.values().find(|v| conflict(v)) {
            return Err(existing.clone());
        }
        rows.insert(key, value);
        Ok(())
    }

    /// Inserts or replaces a row.
    pub async fn upsert(&self, key: K, value: V) {
        self.rows.write().await.insert(key, value);
    }

    /// Returns a clone of the row for `key`.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.rows.read().await.get(key).cloned()
    }

    /// Applies `f` to the row for `key` under the write lock, returning
    /// its result. Returns `None` when the key is absent.
    pub async fn update<F, R>(&self, key: &K, f: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        self.rows.write().await.get_mut(key).map(f)
    }

    /// Removes and returns the row for `key`.
    pub async fn remove(&self, key: &K) -> Option<V> {
        self.rows.write().await.remove(key)
    }

    /// Returns clones of all rows matching `predicate`.
    pub async fn find<P>(&self, predicate: P) -> Vec<V>
    where
        P: Fn(&V) -> bool,
    {
        self.rows
            .read()
            .await
            .values()
            .filter(|v| predicate(v))
            .cloned()
            .collect()
    }

    /// Returns clones of all rows.
    pub async fn all(&self) -> Vec<V> {
        self.rows.read().await.values().cloned().collect()
    }

    /// Returns the number of rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns `true` if the table contains no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Clones the full table contents for a later [`Table::restore`].
    pub async fn snapshot(&self) -> HashMap<K, V> {
        self.rows.read().await.clone()
    }

    /// Replaces the full table contents with a previous snapshot.
    pub async fn restore(&self, snapshot: HashMap<K, V>) {
        *self.rows.write().await = snapshot;
    }
}

impl<K, V> Default for Table<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get() {
        let table: Table<u32, String> = Table::new();
        assert!(table.insert(1, "one".to_string()).await);
        assert_eq!(table.get(&1).await.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn insert_keeps_existing_row() {
        let table: Table<u32, String> = Table::new();
        let _ = table.insert(1, "one".to_string()).await;
        assert!(!table.insert(1, "uno".to_string()).await);
        assert_eq!(table.get(&1).await.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn insert_unique_rejects_on_conflict() {
        let table: Table<u32, String> = Table::new();
        let _ = table.insert(1, "pending".to_string()).await;

        let result = table
            .insert_unique(2, "pending".to_string(), |v| v == "pending")
            .await;
        assert!(result.is_err());
        assert_eq!(table.len().await, 1);

        let result = table
            .insert_unique(3, "done".to_string(), |v| v == "done")
            .await;
        assert!(result.is_ok());
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn update_mutates_in_place() {
        let table: Table<u32, i64> = Table::new();
        let _ = table.insert(7, 10).await;

        let doubled = table
            .update(&7, |v| {
                *v *= 2;
                *v
            })
            .await;
        assert_eq!(doubled, Some(20));
        assert_eq!(table.get(&7).await, Some(20));

        let missing = table.update(&8, |v| *v).await;
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn snapshot_restore_round_trip() {
        let table: Table<u32, i64> = Table::new();
        let _ = table.insert(1, 100).await;
        let snapshot = table.snapshot().await;

        table.upsert(1, 999).await;
        let _ = table.insert(2, 200).await;
        assert_eq!(table.len().await, 2);

        table.restore(snapshot).await;
        assert_eq!(table.len().await, 1);
        assert_eq!(table.get(&1).await, Some(100));
    }

    #[tokio::test]
    async fn find_filters_rows() {
        let table: Table<u32, i64> = Table::new();
        let _ = table.insert(1, 5).await;
        let _ = table.insert(2, 50).await;
        let _ = table.insert(3, 500).await;

        let big = table.find(|v| *v >= 50).await;
        assert_eq!(big.len(), 2);
    }
}
