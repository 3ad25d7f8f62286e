//! All-or-nothing unit of work over shared state.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// Shared handle to the state every unit of work runs against.
///
/// [`atomically`](Self::atomically) holds the write lock for the whole unit,
/// so units are totally ordered the way transactions in a block are. The
/// closure works on a staged copy that only replaces the shared state when it
/// returns `Ok`; on `Err` the copy is dropped and nothing it did is visible.
#[derive(Debug)]
pub struct StateHandle<W> {
    inner: Arc<RwLock<W>>,
}

impl<W> Clone for StateHandle<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Clone> StateHandle<W> {
    pub fn new(state: W) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Run `f` as one unit. Effects commit only if it returns `Ok`.
    pub fn atomically<T, E>(&self, f: impl FnOnce(&mut W) -> Result<T, E>) -> Result<T, E> {
        let mut guard = self.inner.write();
        let mut staged = guard.clone();
        match f(&mut staged) {
            Ok(value) => {
                *guard = staged;
                trace!("Unit committed");
                Ok(value)
            }
            Err(e) => {
                trace!("Unit rolled back");
                Err(e)
            }
        }
    }

    /// Read-only access for pre-execution steps.
    pub fn read<R>(&self, f: impl FnOnce(&W) -> R) -> R {
        f(&self.inner.read())
    }

    /// Mutate outside a unit (test setup, external actors).
    pub fn update<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Copy of the current committed state.
    pub fn snapshot(&self) -> W {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    type Ledger = BTreeMap<&'static str, u64>;

    fn handle() -> StateHandle<Ledger> {
        StateHandle::new(BTreeMap::from([("alice", 100), ("bob", 0)]))
    }

    fn transfer(ledger: &mut Ledger, from: &'static str, to: &'static str, amount: u64) -> Result<(), String> {
        let balance = ledger.get(from).copied().unwrap_or(0);
        if balance < amount {
            return Err(format!("{from} has {balance}, needs {amount}"));
        }
        ledger.insert(from, balance - amount);
        *ledger.entry(to).or_insert(0) += amount;
        Ok(())
    }

    #[test]
    fn test_commit_on_ok() {
        let state = handle();
        state
            .atomically(|l| transfer(l, "alice", "bob", 40))
            .unwrap();
        assert_eq!(state.read(|l| l["bob"]), 40);
    }

    #[test]
    fn test_partial_effects_roll_back() {
        let state = handle();
        let before = state.snapshot();
        let result = state.atomically(|l| {
            transfer(l, "alice", "bob", 60)?;
            // second leg fails after the first already moved funds
            transfer(l, "alice", "bob", 60)
        });
        assert!(result.is_err());
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn test_units_serialize_across_threads() {
        let state = handle();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.atomically(|l| transfer(l, "alice", "bob", 30)))
            })
            .collect();
        let ok = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        // only three transfers of 30 fit in 100
        assert_eq!(ok, 3);
        assert_eq!(state.read(|l| (l["alice"], l["bob"])), (10, 90));
    }
}
