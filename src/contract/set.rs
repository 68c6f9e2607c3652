//! Registry of contracts with exclusive per-contract access.

use super::types::{Contract, ContractId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Thread-safe set of contracts.
///
/// [`acquire`](Self::acquire) hands out at most one [`ContractHandle`] per
/// contract at a time, so revision negotiation on a contract is serialised
/// even across concurrent downloaders. Dropping the handle returns the
/// contract to the set.
///
/// [`view`](Self::view) never waits: it reads the state published by the
/// last handle that modified the contract.
#[derive(Default)]
pub struct ContractSet {
    contracts: RwLock<HashMap<ContractId, Arc<Entry>>>,
}

struct Entry {
    contract: Arc<Mutex<Contract>>,
    /// Copy of the contract as of the last returned handle.
    published: RwLock<Contract>,
}

/// Exclusive access to one contract; returned to the set on drop.
pub struct ContractHandle {
    guard: OwnedMutexGuard<Contract>,
    entry: Arc<Entry>,
    modified: bool,
}

impl ContractSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contract, returning `false` if one with the same id was
    /// already present (the existing entry is kept).
    pub fn insert(&self, contract: Contract) -> bool {
        let mut contracts = self.contracts.write();
        if contracts.contains_key(&contract.id) {
            return false;
        }
        let id = contract.id;
        let entry = Entry {
            published: RwLock::new(contract.clone()),
            contract: Arc::new(Mutex::new(contract)),
        };
        contracts.insert(id, Arc::new(entry));
        true
    }

    /// Wait for exclusive access to a contract.
    ///
    /// Returns `None` if the contract is not in the set.
    pub async fn acquire(&self, id: &ContractId) -> Option<ContractHandle> {
        let entry = self.contracts.read().get(id).cloned()?;
        trace!("Acquiring contract {id}");
        let guard = Arc::clone(&entry.contract).lock_owned().await;
        Some(ContractHandle {
            guard,
            entry,
            modified: false,
        })
    }

    /// Return a contract acquired with [`acquire`](Self::acquire).
    ///
    /// Equivalent to dropping the handle.
    pub fn return_contract(&self, handle: ContractHandle) {
        trace!("Returning contract {}", handle.id);
        drop(handle);
    }

    /// Snapshot of a contract as last returned to the set.
    ///
    /// Does not wait for a current holder; changes made through an
    /// outstanding handle become visible once it is returned.
    #[must_use]
    pub fn view(&self, id: &ContractId) -> Option<Contract> {
        let entry = self.contracts.read().get(id).cloned()?;
        let contract = entry.published.read().clone();
        Some(contract)
    }

    /// Ids of all contracts in the set.
    #[must_use]
    pub fn ids(&self) -> Vec<ContractId> {
        self.contracts.read().keys().copied().collect()
    }

    /// Number of contracts in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.read().len()
    }

    /// Whether the set holds no contracts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.read().is_empty()
    }
}

impl Deref for ContractHandle {
    type Target = Contract;

    fn deref(&self) -> &Contract {
        &self.guard
    }
}

impl DerefMut for ContractHandle {
    fn deref_mut(&mut self) -> &mut Contract {
        self.modified = true;
        &mut self.guard
    }
}

impl Drop for ContractHandle {
    fn drop(&mut self) {
        // Publish before the guard is released so the next holder and any
        // viewer agree.
        if self.modified {
            *self.entry.published.write() = self.guard.clone();
        }
    }
}
