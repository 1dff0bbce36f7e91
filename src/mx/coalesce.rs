use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

struct Call<T> {
    result: OnceCell<T>,
}

/// Deduplicates concurrent work per key: every caller that arrives while a
/// call for the key is in flight waits for it and gets a clone of its result.
///
/// If the caller running the work is dropped, one of the waiters runs it
/// instead. A call with nobody left attached is removed right away.
pub(crate) struct Group<T> {
    calls: Mutex<HashMap<String, Arc<Call<T>>>>,
}

/// One caller's hold on a call; detaches on completion or drop.
struct Attached<'a, T> {
    group: &'a Group<T>,
    key: &'a str,
    call: Arc<Call<T>>,
}

impl<T> Drop for Attached<'_, T> {
    fn drop(&mut self) {
        let mut calls = self.group.calls.lock();
        let current = calls
            .get(self.key)
            .is_some_and(|call| Arc::ptr_eq(call, &self.call));
        // the map and this guard are the only holders when nobody else waits
        let idle = self.call.result.initialized() || Arc::strong_count(&self.call) == 2;
        if current && idle {
            calls.remove(self.key);
        }
    }
}

impl<T: Clone> Group<T> {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let attached = Attached {
            group: self,
            key,
            call: self.join(key),
        };
        let result = attached.call.result.get_or_init(work).await.clone();
        drop(attached);
        result
    }

    fn join(&self, key: &str) -> Arc<Call<T>> {
        let mut calls = self.calls.lock();
        if let Some(call) = calls.get(key) {
            return Arc::clone(call);
        }
        let call = Arc::new(Call {
            result: OnceCell::new(),
        });
        calls.insert(key.to_owned(), Arc::clone(&call));
        call
    }

    /// Drops the record of a call for `key` so the next caller starts afresh.
    /// A call somebody is still running or awaiting is kept, so a key never
    /// has two executions at once.
    pub(crate) fn forget(&self, key: &str) {
        let mut calls = self.calls.lock();
        let idle = calls
            .get(key)
            .is_some_and(|call| Arc::strong_count(call) == 1 || call.result.initialized());
        if idle {
            calls.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}
