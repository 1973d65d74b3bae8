// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine-wide append-only payment log.
//!
//! The aggregates perform the authoritative idempotency check inside their
//! own lock; this log is the storage-layer backstop (the equivalent of a
//! unique index on `(ledger, idempotency_key)`) plus an ordered audit trail
//! of every applied payment.

use crate::base::{InvoiceId, JobId, PaymentId};
use crate::error::BillingError;
use crate::payment::IdempotencyKey;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Which ledger a payment was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerRef {
    Invoice(InvoiceId),
    JobDeposit(JobId),
}

/// Lock-free dedup map plus an insertion-ordered queue.
///
/// Mirrors the persistence constraint: an embedded append-only payments
/// array per document, with key uniqueness enforced per ledger scope.
#[derive(Debug, Default)]
pub struct PaymentLog {
    /// Applied keys per ledger for O(1) duplicate detection.
    applied: DashMap<(LedgerRef, IdempotencyKey), PaymentId>,

    /// Application order across the whole engine.
    order: SegQueue<(LedgerRef, PaymentId)>,
}

impl PaymentLog {
    pub fn new() -> Self {
        Self {
            applied: DashMap::new(),
            order: SegQueue::new(),
        }
    }

    /// Records an applied payment.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::DuplicatePayment`] if the key was already
    /// recorded for this ledger. Callers on the reconciliation path absorb
    /// that into a no-op.
    pub fn record(
        &self,
        ledger: LedgerRef,
        key: IdempotencyKey,
        payment_id: PaymentId,
    ) -> Result<(), BillingError> {
        // Entry API for atomic check-and-insert.
        match self.applied.entry((ledger, key)) {
            Entry::Occupied(_) => Err(BillingError::DuplicatePayment),
            Entry::Vacant(entry) => {
                entry.insert(payment_id);
                self.order.push((ledger, payment_id));
                Ok(())
            }
        }
    }

    pub fn contains(&self, ledger: LedgerRef, key: &IdempotencyKey) -> bool {
        self.applied.contains_key(&(ledger, key.clone()))
    }

    /// Number of distinct applied payments across all ledgers.
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_duplicate() {
        let log = PaymentLog::new();
        let ledger = LedgerRef::Invoice(InvoiceId(1));

        log.record(ledger, "pi_1".into(), PaymentId(1)).unwrap();
        assert_eq!(
            log.record(ledger, "pi_1".into(), PaymentId(2)),
            Err(BillingError::DuplicatePayment)
        );
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn same_key_on_different_ledgers_is_fine() {
        let log = PaymentLog::new();
        log.record(LedgerRef::Invoice(InvoiceId(1)), "pi_1".into(), PaymentId(1))
            .unwrap();
        log.record(LedgerRef::JobDeposit(JobId(1)), "pi_1".into(), PaymentId(1))
            .unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.contains(LedgerRef::Invoice(InvoiceId(1)), &"pi_1".into()));
        assert!(log.contains(LedgerRef::JobDeposit(JobId(1)), &"pi_1".into()));
    }
}
