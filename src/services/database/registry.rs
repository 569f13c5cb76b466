use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::api::middleware::AppError;
use crate::models::SqlValue;
use crate::services::database::driver::{CursorId, RowStatus};

/// Rows of a result set fetched eagerly at query time
pub type MaterializedRows = VecDeque<Vec<SqlValue>>;

/// Maps opaque numeric handles to driver-owned resources.
///
/// The lock is only held for map operations, never across an await.
pub struct HandleRegistry<T> {
    entries: Mutex<HashMap<u64, T>>,
    next_id: AtomicU64,
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, value: T) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, value);
        id
    }

    pub fn remove(&self, id: u64) -> Option<T> {
        self.lock().remove(&id)
    }

    /// Check a resource out for use across an await point.
    /// Must be paired with [`HandleRegistry::restore`].
    pub fn take(&self, id: u64) -> Option<T> {
        self.remove(id)
    }

    pub fn restore(&self, id: u64, value: T) {
        self.lock().insert(id, value);
    }

    pub fn with<R>(&self, id: u64, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.lock().get_mut(&id).map(f)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry<MaterializedRows> {
    /// Pop the next materialized row of `cursor` into `dest`
    pub fn next_row(&self, cursor: CursorId, dest: &mut Vec<SqlValue>) -> Result<RowStatus, AppError> {
        match self.with(cursor.0, |rows| rows.pop_front()) {
            Some(Some(row)) => {
                *dest = row;
                Ok(RowStatus::Row)
            }
            Some(None) => {
                dest.clear();
                Ok(RowStatus::End)
            }
            None => Err(AppError::Query(format!("Unknown {}", cursor))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let registry = HandleRegistry::new();
        let a = registry.insert("a");
        let b = registry.insert("b");
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_is_single_shot() {
        let registry = HandleRegistry::new();
        let id = registry.insert(7);
        assert_eq!(registry.remove(id), Some(7));
        assert_eq!(registry.remove(id), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_take_and_restore_keep_the_handle() {
        let registry = HandleRegistry::new();
        let id = registry.insert(String::from("conn"));
        let value = registry.take(id).unwrap();
        assert!(registry.is_empty());
        registry.restore(id, value);
        assert_eq!(registry.with(id, |v| v.clone()), Some("conn".to_string()));
    }

    #[test]
    fn test_materialized_cursor() {
        let registry: HandleRegistry<MaterializedRows> = HandleRegistry::new();
        let rows: MaterializedRows = vec![vec![SqlValue::from("a")]].into();
        let cursor = CursorId(registry.insert(rows));
        let mut dest = Vec::new();

        assert_eq!(registry.next_row(cursor, &mut dest).unwrap(), RowStatus::Row);
        assert_eq!(dest, vec![SqlValue::from("a")]);
        assert_eq!(registry.next_row(cursor, &mut dest).unwrap(), RowStatus::End);
        assert!(dest.is_empty());

        registry.remove(cursor.0);
        assert!(registry.next_row(cursor, &mut dest).is_err());
    }
}
