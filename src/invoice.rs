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

//! Invoice aggregate.
//!
//! An invoice owns its line items and its append-only payment list.
//! Subtotal, total, amount paid, balance due, and status are all derived
//! from those lists on every read; nothing money-driven is stored.
//!
//! Status state machine:
//!
//!  Draft ──send──► Sent ◄──────(view)──────► Overdue / PartiallyPaid / Paid
//!                   │                                          │
//!                   └──void──► Void                Paid ──refund──► Refunded
//!
//! Only `Draft`, `Sent`, `Void`, and `Refunded` are stored (the explicit
//! lifecycle); `Overdue`, `PartiallyPaid`, and `Paid` are computed by
//! [`derive_status`] from the totals and the due date, so a late payment
//! self-corrects an overdue view without any stored transition.

use crate::base::{InvoiceId, PartyId, PaymentId};
use crate::error::BillingError;
use crate::money::{CurrencyCode, Money};
use crate::payment::{IdempotencyKey, PaymentInput, PaymentRecord};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Invoice status as seen by callers.
///
/// `Draft`, `Sent`, `Void`, `Refunded` reflect the stored lifecycle; the
/// rest are money-derived views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    PartiallyPaid,
    Paid,
    Overdue,
    Void,
    Refunded,
}

/// Explicitly stored lifecycle flag. Everything else is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Draft,
    Sent,
    Void,
    Refunded,
}

/// One billable line on an invoice (or on a job awaiting invoicing).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LineItem {
    description: String,
    quantity: u32,
    unit_price: Money,
}

impl LineItem {
    /// Quantity must be positive.
    pub fn new(
        description: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Self, BillingError> {
        if quantity == 0 {
            return Err(BillingError::InvalidAmount);
        }
        Ok(Self {
            description: description.into(),
            quantity,
            unit_price,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn total_price(&self) -> Money {
        self.unit_price.mul_quantity(self.quantity)
    }
}

/// Pure status derivation.
///
/// Given the same `(lifecycle, total, amount_paid, due_date, today)` the
/// result is always identical, regardless of the path taken to reach those
/// values. A negative balance (overpayment) still resolves to `Paid`.
/// `Overdue` wins over `PartiallyPaid` whenever the balance is positive and
/// the due date has passed.
pub fn derive_status(
    lifecycle: Lifecycle,
    total: Decimal,
    amount_paid: Decimal,
    due_date: NaiveDate,
    today: NaiveDate,
) -> InvoiceStatus {
    match lifecycle {
        Lifecycle::Void => InvoiceStatus::Void,
        Lifecycle::Refunded => InvoiceStatus::Refunded,
        Lifecycle::Draft => InvoiceStatus::Draft,
        Lifecycle::Sent => {
            let balance = total - amount_paid;
            if balance <= Decimal::ZERO {
                InvoiceStatus::Paid
            } else if today > due_date {
                InvoiceStatus::Overdue
            } else if amount_paid > Decimal::ZERO {
                InvoiceStatus::PartiallyPaid
            } else {
                InvoiceStatus::Sent
            }
        }
    }
}

/// Result of asking an aggregate to apply a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentApplication {
    /// The record was appended under this id.
    Applied(PaymentId),
    /// The idempotency key was already present; nothing changed.
    Duplicate,
}

#[derive(Debug)]
struct InvoiceData {
    id: InvoiceId,
    customer: PartyId,
    currency: CurrencyCode,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    tax_amount: Decimal,
    line_items: Vec<LineItem>,
    payments: Vec<PaymentRecord>,
    lifecycle: Lifecycle,
    notes: Option<String>,
    next_payment_id: u32,
}

impl InvoiceData {
    fn subtotal(&self) -> Decimal {
        self.line_items
            .iter()
            .map(|item| item.total_price().amount())
            .sum()
    }

    fn total(&self) -> Decimal {
        self.subtotal() + self.tax_amount
    }

    fn amount_paid(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount().amount()).sum()
    }

    /// Raw balance; negative when overpaid.
    fn balance_due(&self) -> Decimal {
        self.total() - self.amount_paid()
    }

    fn status(&self, today: NaiveDate) -> InvoiceStatus {
        derive_status(
            self.lifecycle,
            self.total(),
            self.amount_paid(),
            self.due_date,
            today,
        )
    }

    fn has_payment(&self, key: &IdempotencyKey) -> bool {
        self.payments.iter().any(|p| p.idempotency_key() == key)
    }

    fn next_id(&mut self) -> PaymentId {
        self.next_payment_id += 1;
        PaymentId(self.next_payment_id)
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.line_items
                .iter()
                .all(|item| item.unit_price().currency() == self.currency),
            "Invariant violated: line item currency differs from invoice currency"
        );
        debug_assert!(
            self.payments
                .iter()
                .all(|p| p.amount().currency() == self.currency),
            "Invariant violated: payment currency differs from invoice currency"
        );
        debug_assert_eq!(
            self.balance_due(),
            self.total() - self.amount_paid(),
            "Invariant violated: balance due diverged from the payment ledger"
        );
    }

    fn check_input(&self, input: &PaymentInput) -> Result<(), BillingError> {
        if input.amount.currency() != self.currency {
            return Err(BillingError::CurrencyMismatch {
                expected: self.currency,
                found: input.amount.currency(),
            });
        }
        if !input.amount.is_positive() {
            return Err(BillingError::InvalidAmount);
        }
        Ok(())
    }
}

/// Invoice aggregate.
///
/// All mutations lock the inner data, so concurrent calls against the same
/// invoice serialize; distinct invoices proceed in parallel.
#[derive(Debug)]
pub struct Invoice {
    inner: Mutex<InvoiceData>,
}

impl Invoice {
    pub fn new(
        id: InvoiceId,
        customer: PartyId,
        currency: CurrencyCode,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        tax_amount: Money,
    ) -> Result<Self, BillingError> {
        if tax_amount.currency() != currency {
            return Err(BillingError::CurrencyMismatch {
                expected: currency,
                found: tax_amount.currency(),
            });
        }
        Ok(Self {
            inner: Mutex::new(InvoiceData {
                id,
                customer,
                currency,
                issue_date,
                due_date,
                tax_amount: tax_amount.amount(),
                line_items: Vec::new(),
                payments: Vec::new(),
                lifecycle: Lifecycle::Draft,
                notes: None,
                next_payment_id: 0,
            }),
        })
    }

    pub fn id(&self) -> InvoiceId {
        self.inner.lock().id
    }

    pub fn customer(&self) -> PartyId {
        self.inner.lock().customer
    }

    pub fn currency(&self) -> CurrencyCode {
        self.inner.lock().currency
    }

    pub fn due_date(&self) -> NaiveDate {
        self.inner.lock().due_date
    }

    pub fn subtotal(&self) -> Money {
        let data = self.inner.lock();
        Money::new(data.subtotal(), data.currency)
    }

    pub fn total(&self) -> Money {
        let data = self.inner.lock();
        Money::new(data.total(), data.currency)
    }

    pub fn amount_paid(&self) -> Money {
        let data = self.inner.lock();
        Money::new(data.amount_paid(), data.currency)
    }

    /// Raw balance; negative when overpaid. Display flooring is the
    /// snapshot's concern.
    pub fn balance_due(&self) -> Money {
        let data = self.inner.lock();
        Money::new(data.balance_due(), data.currency)
    }

    pub fn status(&self, today: NaiveDate) -> InvoiceStatus {
        self.inner.lock().status(today)
    }

    pub fn set_notes(&self, notes: Option<String>) {
        self.inner.lock().notes = notes;
    }

    /// Appends a line item. Only allowed while the invoice is in `Draft`;
    /// line items are immutable once the invoice has been sent.
    pub fn add_line_item(&self, item: LineItem) -> Result<(), BillingError> {
        let mut data = self.inner.lock();
        if data.lifecycle != Lifecycle::Draft {
            return Err(BillingError::InvalidState);
        }
        if item.unit_price().currency() != data.currency {
            return Err(BillingError::CurrencyMismatch {
                expected: data.currency,
                found: item.unit_price().currency(),
            });
        }
        data.line_items.push(item);
        data.assert_invariants();
        Ok(())
    }

    /// Explicit `draft -> sent` transition; requires at least one line item.
    pub fn mark_sent(&self) -> Result<(), BillingError> {
        let mut data = self.inner.lock();
        if data.lifecycle != Lifecycle::Draft || data.line_items.is_empty() {
            return Err(BillingError::InvalidTransition);
        }
        data.lifecycle = Lifecycle::Sent;
        Ok(())
    }

    /// Explicit void. Allowed from any state except a settled (`Paid`) or
    /// `Refunded` invoice. A void invoice accepts no further payments.
    pub fn void(&self, today: NaiveDate) -> Result<(), BillingError> {
        let mut data = self.inner.lock();
        match data.status(today) {
            InvoiceStatus::Paid | InvoiceStatus::Refunded => {
                Err(BillingError::InvalidTransition)
            }
            InvoiceStatus::Void => Ok(()), // voiding twice is harmless
            _ => {
                data.lifecycle = Lifecycle::Void;
                Ok(())
            }
        }
    }

    /// Applies a payment confirmation.
    ///
    /// The idempotency check runs first, inside the same critical section as
    /// the append, so a retried confirmation can never race past it: the
    /// second application of the same key is a no-op.
    ///
    /// # Errors
    ///
    /// - [`BillingError::InvalidState`] - invoice is `Draft`, `Void`, or `Refunded`.
    /// - [`BillingError::CurrencyMismatch`] - payment currency differs.
    /// - [`BillingError::InvalidAmount`] - amount is zero or negative.
    pub fn apply_payment(
        &self,
        input: PaymentInput,
        now: DateTime<Utc>,
    ) -> Result<PaymentApplication, BillingError> {
        let mut data = self.inner.lock();
        if data.has_payment(&input.idempotency_key) {
            return Ok(PaymentApplication::Duplicate);
        }
        if data.lifecycle != Lifecycle::Sent {
            return Err(BillingError::InvalidState);
        }
        data.check_input(&input)?;

        let id = data.next_id();
        data.payments.push(PaymentRecord::applied(id, input, now));
        data.assert_invariants();
        Ok(PaymentApplication::Applied(id))
    }

    /// Refunds a settled invoice.
    ///
    /// Only reachable from derived `Paid`. Appends a negative payment record
    /// whose magnitude is reflected in the balance, then moves the lifecycle
    /// to the terminal `Refunded`.
    pub fn refund(
        &self,
        input: PaymentInput,
        now: DateTime<Utc>,
    ) -> Result<PaymentApplication, BillingError> {
        let mut data = self.inner.lock();
        if data.has_payment(&input.idempotency_key) {
            return Ok(PaymentApplication::Duplicate);
        }
        if data.status(now.date_naive()) != InvoiceStatus::Paid {
            return Err(BillingError::InvalidTransition);
        }
        data.check_input(&input)?;

        let id = data.next_id();
        data.payments.push(PaymentRecord::refunded(id, input, now));
        data.lifecycle = Lifecycle::Refunded;
        data.assert_invariants();
        Ok(PaymentApplication::Applied(id))
    }

    /// Point-in-time view with every derived field recomputed fresh.
    pub fn snapshot(&self, today: NaiveDate) -> InvoiceSnapshot {
        let data = self.inner.lock();
        let precision = data.currency.minor_unit_exponent();
        let balance = data.balance_due();
        InvoiceSnapshot {
            id: data.id,
            customer: data.customer,
            status: data.status(today),
            currency: data.currency,
            issue_date: data.issue_date,
            due_date: data.due_date,
            subtotal: data.subtotal().round_dp(precision),
            tax_amount: data.tax_amount.round_dp(precision),
            total: data.total().round_dp(precision),
            amount_paid: data.amount_paid().round_dp(precision),
            balance_due: balance.max(Decimal::ZERO).round_dp(precision),
            overpaid: balance < Decimal::ZERO,
            line_items: data.line_items.clone(),
            payments: data.payments.clone(),
            notes: data.notes.clone(),
        }
    }
}

/// Serializable point-in-time view of an invoice.
///
/// `balance_due` is floored at zero for display; `overpaid` flags a
/// negative internal balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceSnapshot {
    pub id: InvoiceId,
    pub customer: PartyId,
    pub status: InvoiceStatus,
    pub currency: CurrencyCode,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub overpaid: bool,
    pub line_items: Vec<LineItem>,
    pub payments: Vec<PaymentRecord>,
    pub notes: Option<String>,
}
