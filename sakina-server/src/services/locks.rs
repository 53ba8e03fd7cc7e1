use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

/// Serializes check-ins and chat sends per employee. A second request for
/// the same employee waits for the first; other employees are unaffected.
#[derive(Clone, Default)]
pub struct EmployeeLocks {
    inner: Arc<LockMap>,
}

impl EmployeeLocks {
    pub async fn acquire(&self, employee_id: Uuid) -> EmployeeGuard {
        let lock = self.inner.entry(employee_id).or_default().clone();
        let guard = lock.lock_owned().await;
        EmployeeGuard {
            guard: Some(guard),
            employee_id,
            map: self.inner.clone(),
        }
    }

    /// Number of employees with a held or awaited lock.
    pub fn tracked(&self) -> usize {
        self.inner.len()
    }
}

/// Held for the duration of one employee's critical section. Dropping the
/// last holder removes the employee's entry from the map.
pub struct EmployeeGuard {
    guard: Option<OwnedMutexGuard<()>>,
    employee_id: Uuid,
    map: Arc<LockMap>,
}

impl Drop for EmployeeGuard {
    fn drop(&mut self) {
        // Release first so the guard's own Arc is not counted.
        drop(self.guard.take());
        // The map holds one reference; any other is a queued waiter.
        self.map
            .remove_if(&self.employee_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
