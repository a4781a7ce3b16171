//! Beneficiary Locks
//!
//! A loop or unwind moves the beneficiary's balances across several market
//! calls. While one is in flight, any second entry for the same beneficiary
//! is refused. The registry is a shared handle so several engines driving
//! the same market can serialize against each other.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use leverloop_common::{
    errors::{LoopError, LoopResult},
    types::Address,
};

/// Shared set of beneficiaries with an operation in flight
#[derive(Debug, Clone, Default)]
pub struct BeneficiaryLocks {
    held: Arc<Mutex<BTreeSet<Address>>>,
}

impl BeneficiaryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `beneficiary` until the returned guard is dropped
    pub fn acquire(&self, beneficiary: Address) -> LoopResult<BeneficiaryGuard> {
        let mut held = self.held();
        if !held.insert(beneficiary) {
            return Err(LoopError::BeneficiaryBusy { beneficiary });
        }
        Ok(BeneficiaryGuard {
            held: Arc::clone(&self.held),
            beneficiary,
        })
    }

    /// Fail if `beneficiary` is locked, without taking the lock
    pub fn ensure_free(&self, beneficiary: Address) -> LoopResult<()> {
        if self.is_locked(&beneficiary) {
            return Err(LoopError::BeneficiaryBusy { beneficiary });
        }
        Ok(())
    }

    pub fn is_locked(&self, beneficiary: &Address) -> bool {
        self.held().contains(beneficiary)
    }

    /// Number of beneficiaries currently locked
    pub fn in_flight(&self) -> usize {
        self.held().len()
    }

    fn held(&self) -> MutexGuard<'_, BTreeSet<Address>> {
        self.held.lock()
    }
}

/// Releases its beneficiary when dropped
#[derive(Debug)]
pub struct BeneficiaryGuard {
    held: Arc<Mutex<BTreeSet<Address>>>,
    beneficiary: Address,
}

impl BeneficiaryGuard {
    pub fn beneficiary(&self) -> &Address {
        &self.beneficiary
    }
}

impl Drop for BeneficiaryGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.beneficiary);
    }
}
