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

//! Jobs and their deposit sub-ledger.
//!
//! A job carries the same payment-application rules as an invoice,
//! collapsed to two scalars: `required` (set by staff when scheduling) and
//! `paid` (accumulated from idempotently applied deposit payments). The
//! deposit ledger and the job's eventual final invoice are independent;
//! nothing here credits one against the other.

use crate::base::{JobId, PartyId, PaymentId};
use crate::error::BillingError;
use crate::invoice::{LineItem, PaymentApplication};
use crate::money::{CurrencyCode, Money};
use crate::payment::{IdempotencyKey, PaymentInput, PaymentRecord};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a job is in its working life. Only `Completed` jobs can be invoiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    InProgress,
    Completed,
}

/// Derived deposit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    NotRequired,
    Pending,
    PartiallyPaid,
    Paid,
}

/// Pure deposit status derivation; same shape as invoice status but with
/// two scalars and no dates.
pub fn derive_deposit_status(required: Decimal, paid: Decimal) -> DepositStatus {
    if required <= Decimal::ZERO {
        DepositStatus::NotRequired
    } else if paid <= Decimal::ZERO {
        DepositStatus::Pending
    } else if paid < required {
        DepositStatus::PartiallyPaid
    } else {
        DepositStatus::Paid
    }
}

#[derive(Debug)]
struct JobData {
    id: JobId,
    customer: PartyId,
    currency: CurrencyCode,
    state: JobState,
    /// Billable components accumulated while the job runs (service charge,
    /// consumed stock); copied onto the final invoice at creation.
    billables: Vec<LineItem>,
    deposit_required: Decimal,
    deposit_payments: Vec<PaymentRecord>,
    next_payment_id: u32,
}

impl JobData {
    fn deposit_paid(&self) -> Decimal {
        self.deposit_payments
            .iter()
            .map(|p| p.amount().amount())
            .sum()
    }

    fn has_payment(&self, key: &IdempotencyKey) -> bool {
        self.deposit_payments
            .iter()
            .any(|p| p.idempotency_key() == key)
    }

    fn next_id(&mut self) -> PaymentId {
        self.next_payment_id += 1;
        PaymentId(self.next_payment_id)
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.deposit_required >= Decimal::ZERO,
            "Invariant violated: deposit requirement went negative: {}",
            self.deposit_required
        );
        debug_assert!(
            self.deposit_payments
                .iter()
                .all(|p| p.amount().currency() == self.currency),
            "Invariant violated: deposit payment currency differs from job currency"
        );
    }
}

/// A field-service job with its deposit sub-ledger.
///
/// Same locking discipline as [`crate::Invoice`]: every mutation serializes
/// on the inner mutex.
#[derive(Debug)]
pub struct Job {
    inner: Mutex<JobData>,
}

impl Job {
    pub fn new(id: JobId, customer: PartyId, currency: CurrencyCode) -> Self {
        Self {
            inner: Mutex::new(JobData {
                id,
                customer,
                currency,
                state: JobState::Scheduled,
                billables: Vec::new(),
                deposit_required: Decimal::ZERO,
                deposit_payments: Vec::new(),
                next_payment_id: 0,
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.lock().id
    }

    pub fn customer(&self) -> PartyId {
        self.inner.lock().customer
    }

    pub fn currency(&self) -> CurrencyCode {
        self.inner.lock().currency
    }

    pub fn state(&self) -> JobState {
        self.inner.lock().state
    }

    pub fn is_invoiceable(&self) -> bool {
        self.inner.lock().state == JobState::Completed
    }

    pub fn start(&self) -> Result<(), BillingError> {
        let mut data = self.inner.lock();
        if data.state != JobState::Scheduled {
            return Err(BillingError::InvalidTransition);
        }
        data.state = JobState::InProgress;
        Ok(())
    }

    pub fn complete(&self) -> Result<(), BillingError> {
        let mut data = self.inner.lock();
        if data.state != JobState::InProgress {
            return Err(BillingError::InvalidTransition);
        }
        data.state = JobState::Completed;
        Ok(())
    }

    /// Records a billable component (service charge, consumed stock).
    pub fn add_billable(&self, item: LineItem) -> Result<(), BillingError> {
        let mut data = self.inner.lock();
        if item.unit_price().currency() != data.currency {
            return Err(BillingError::CurrencyMismatch {
                expected: data.currency,
                found: item.unit_price().currency(),
            });
        }
        data.billables.push(item);
        Ok(())
    }

    /// Billable components as invoice-ready line items.
    pub fn billables(&self) -> Vec<LineItem> {
        self.inner.lock().billables.clone()
    }

    /// Sets the deposit staff expect before work proceeds.
    pub fn set_deposit_required(&self, required: Money) -> Result<(), BillingError> {
        let mut data = self.inner.lock();
        if required.currency() != data.currency {
            return Err(BillingError::CurrencyMismatch {
                expected: data.currency,
                found: required.currency(),
            });
        }
        if required.is_negative() {
            return Err(BillingError::InvalidAmount);
        }
        data.deposit_required = required.amount();
        data.assert_invariants();
        Ok(())
    }

    pub fn deposit_required(&self) -> Money {
        let data = self.inner.lock();
        Money::new(data.deposit_required, data.currency)
    }

    pub fn deposit_paid(&self) -> Money {
        let data = self.inner.lock();
        Money::new(data.deposit_paid(), data.currency)
    }

    pub fn deposit_status(&self) -> DepositStatus {
        let data = self.inner.lock();
        derive_deposit_status(data.deposit_required, data.deposit_paid())
    }

    /// Applies a deposit payment, idempotently.
    ///
    /// Same contract as invoice payment application: the key check and the
    /// append share one critical section, a repeated key is a no-op, and a
    /// mismatched currency or non-positive amount is rejected outright.
    pub fn apply_deposit_payment(
        &self,
        input: PaymentInput,
        now: DateTime<Utc>,
    ) -> Result<PaymentApplication, BillingError> {
        let mut data = self.inner.lock();
        if data.has_payment(&input.idempotency_key) {
            return Ok(PaymentApplication::Duplicate);
        }
        if input.amount.currency() != data.currency {
            return Err(BillingError::CurrencyMismatch {
                expected: data.currency,
                found: input.amount.currency(),
            });
        }
        if !input.amount.is_positive() {
            return Err(BillingError::InvalidAmount);
        }

        let id = data.next_id();
        data.deposit_payments
            .push(PaymentRecord::applied(id, input, now));
        data.assert_invariants();
        Ok(PaymentApplication::Applied(id))
    }

    /// Point-in-time view of the deposit sub-ledger.
    pub fn deposit_snapshot(&self) -> DepositSnapshot {
        let data = self.inner.lock();
        let precision = data.currency.minor_unit_exponent();
        let paid = data.deposit_paid();
        DepositSnapshot {
            job_id: data.id,
            currency: data.currency,
            required: data.deposit_required.round_dp(precision),
            paid: paid.round_dp(precision),
            outstanding: (data.deposit_required - paid)
                .max(Decimal::ZERO)
                .round_dp(precision),
            status: derive_deposit_status(data.deposit_required, paid),
        }
    }
}

/// Serializable view of a job's deposit sub-ledger.
#[derive(Debug, Clone, Serialize)]
pub struct DepositSnapshot {
    pub job_id: JobId,
    pub currency: CurrencyCode,
    pub required: Decimal,
    pub paid: Decimal,
    pub outstanding: Decimal,
    pub status: DepositStatus,
}
