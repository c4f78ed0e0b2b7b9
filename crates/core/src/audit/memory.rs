use std::collections::VecDeque;
use std::sync::Mutex;

use super::{AuditError, AuditFilter, AuditRecord, AuditStore};

/// In-memory audit store holding the most recent `capacity` records.
///
/// Queries return newest first.
pub struct MemoryAuditStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    records: VecDeque<AuditRecord>,
    next_id: i64,
}

impl MemoryAuditStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: VecDeque::new(),
                next_id: 1,
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, AuditError> {
        self.inner
            .lock()
            .map_err(|e| AuditError::Storage(e.to_string()))
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl AuditStore for MemoryAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let mut inner = self.lock()?;
        let id = inner.next_id;
        inner.next_id += 1;

        let mut stored = record.clone();
        stored.id = id;
        inner.records.push_back(stored);
        while inner.records.len() > self.capacity {
            inner.records.pop_front();
        }
        Ok(id)
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let inner = self.lock()?;
        let limit = if filter.limit > 0 {
            filter.limit as usize
        } else {
            usize::MAX
        };
        Ok(inner
            .records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .skip(filter.offset.max(0) as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let inner = self.lock()?;
        Ok(inner.records.iter().filter(|r| filter.matches(r)).count() as i64)
    }
}
