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

//! Invoice and job aggregate tests through the public API.

use billing_engine_rs::{
    BillingError, CurrencyCode, DepositStatus, Invoice, InvoiceId, InvoiceStatus, Job, JobId,
    JobState, LineItem, Money, PartyId, PaymentApplication, PaymentInput, PaymentMethod,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn gbp(amount: Decimal) -> Money {
    Money::new(amount, CurrencyCode::GBP)
}

fn payment(amount: Decimal, key: &str) -> PaymentInput {
    PaymentInput::new(gbp(amount), PaymentMethod::Card, key)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Sent invoice for `total`, issued 2026-03-01, due 2026-03-31.
fn sent_invoice(total: Decimal) -> Invoice {
    let invoice = Invoice::new(
        InvoiceId(1),
        PartyId(1),
        CurrencyCode::GBP,
        date(2026, 3, 1),
        date(2026, 3, 31),
        gbp(Decimal::ZERO),
    )
    .unwrap();
    invoice
        .add_line_item(LineItem::new("Labour", 1, gbp(total)).unwrap())
        .unwrap();
    invoice.mark_sent().unwrap();
    invoice
}

// === Lifecycle ===

#[test]
fn new_invoice_starts_as_draft() {
    let invoice = Invoice::new(
        InvoiceId(1),
        PartyId(1),
        CurrencyCode::GBP,
        date(2026, 3, 1),
        date(2026, 3, 31),
        gbp(Decimal::ZERO),
    )
    .unwrap();
    assert_eq!(invoice.status(date(2026, 3, 1)), InvoiceStatus::Draft);
    assert_eq!(invoice.total().amount(), dec!(0));
}

#[test]
fn empty_invoice_cannot_be_sent() {
    let invoice = Invoice::new(
        InvoiceId(1),
        PartyId(1),
        CurrencyCode::GBP,
        date(2026, 3, 1),
        date(2026, 3, 31),
        gbp(Decimal::ZERO),
    )
    .unwrap();
    assert_eq!(invoice.mark_sent(), Err(BillingError::InvalidTransition));
}

#[test]
fn line_items_freeze_once_sent() {
    let invoice = sent_invoice(dec!(100.00));
    let result = invoice.add_line_item(LineItem::new("Extra", 1, gbp(dec!(5.00))).unwrap());
    assert_eq!(result, Err(BillingError::InvalidState));
    assert_eq!(invoice.total().amount(), dec!(100.00));
}

#[test]
fn sending_twice_fails() {
    let invoice = sent_invoice(dec!(100.00));
    assert_eq!(invoice.mark_sent(), Err(BillingError::InvalidTransition));
}

#[test]
fn mismatched_line_item_currency_rejected() {
    let invoice = Invoice::new(
        InvoiceId(1),
        PartyId(1),
        CurrencyCode::GBP,
        date(2026, 3, 1),
        date(2026, 3, 31),
        gbp(Decimal::ZERO),
    )
    .unwrap();
    let item = LineItem::new("Imported", 1, Money::new(dec!(5.00), CurrencyCode::USD)).unwrap();
    assert!(matches!(
        invoice.add_line_item(item),
        Err(BillingError::CurrencyMismatch { .. })
    ));
}

// === Derived status and the clock ===

/// Status is derived from the ledger and the calendar, never stored.
///
/// The same invoice reads differently on different days:
/// - on the due date it is partially paid
/// - the day after, with a balance still open, it is overdue
/// - once the balance closes it is paid regardless of the date
#[test]
fn status_follows_the_calendar() {
    let invoice = sent_invoice(dec!(100.00));
    invoice
        .apply_payment(payment(dec!(40.00), "pi_1"), Utc::now())
        .unwrap();

    assert_eq!(
        invoice.status(date(2026, 3, 31)),
        InvoiceStatus::PartiallyPaid
    );
    assert_eq!(invoice.status(date(2026, 4, 1)), InvoiceStatus::Overdue);

    invoice
        .apply_payment(payment(dec!(60.00), "pi_2"), Utc::now())
        .unwrap();
    assert_eq!(invoice.status(date(2026, 4, 1)), InvoiceStatus::Paid);
}

#[test]
fn unpaid_sent_invoice_goes_overdue() {
    let invoice = sent_invoice(dec!(100.00));
    assert_eq!(invoice.status(date(2026, 3, 31)), InvoiceStatus::Sent);
    assert_eq!(invoice.status(date(2026, 4, 1)), InvoiceStatus::Overdue);
}

#[test]
fn snapshot_floors_negative_balance() {
    let invoice = sent_invoice(dec!(100.00));
    invoice
        .apply_payment(payment(dec!(130.00), "pi_1"), Utc::now())
        .unwrap();

    // The raw balance stays negative; only the display view floors it
    assert_eq!(invoice.balance_due().amount(), dec!(-30.00));

    let snap = invoice.snapshot(date(2026, 3, 15));
    assert_eq!(snap.balance_due, dec!(0.00));
    assert!(snap.overpaid);
    assert_eq!(snap.status, InvoiceStatus::Paid);
}

// === Idempotency at the aggregate ===

#[test]
fn duplicate_key_returns_duplicate_without_append() {
    let invoice = sent_invoice(dec!(100.00));
    let first = invoice
        .apply_payment(payment(dec!(40.00), "pi_1"), Utc::now())
        .unwrap();
    assert!(matches!(first, PaymentApplication::Applied(_)));

    // Even with a different amount, the key decides
    let second = invoice
        .apply_payment(payment(dec!(99.00), "pi_1"), Utc::now())
        .unwrap();
    assert_eq!(second, PaymentApplication::Duplicate);
    assert_eq!(invoice.amount_paid().amount(), dec!(40.00));
}

/// The duplicate check runs before the state check, so a confirmation
/// retried after the invoice was voided stays a quiet no-op instead of
/// surfacing an error to the retrying gateway.
#[test]
fn retried_key_after_void_is_still_a_noop() {
    let invoice = sent_invoice(dec!(100.00));
    invoice
        .apply_payment(payment(dec!(40.00), "pi_1"), Utc::now())
        .unwrap();
    invoice.void(date(2026, 3, 15)).unwrap();

    let result = invoice
        .apply_payment(payment(dec!(40.00), "pi_1"), Utc::now())
        .unwrap();
    assert_eq!(result, PaymentApplication::Duplicate);

    // A fresh key on a void invoice is a real rejection
    let fresh = invoice.apply_payment(payment(dec!(40.00), "pi_2"), Utc::now());
    assert_eq!(fresh, Err(BillingError::InvalidState));
}

#[test]
fn zero_and_negative_amounts_rejected() {
    let invoice = sent_invoice(dec!(100.00));
    assert_eq!(
        invoice.apply_payment(payment(dec!(0.00), "pi_1"), Utc::now()),
        Err(BillingError::InvalidAmount)
    );
    assert_eq!(
        invoice.apply_payment(payment(dec!(-10.00), "pi_2"), Utc::now()),
        Err(BillingError::InvalidAmount)
    );
}

// === Job aggregate ===

#[test]
fn job_state_transitions_are_strict() {
    let job = Job::new(JobId(1), PartyId(1), CurrencyCode::GBP);
    assert_eq!(job.state(), JobState::Scheduled);

    // Cannot complete before starting
    assert_eq!(job.complete(), Err(BillingError::InvalidTransition));

    job.start().unwrap();
    assert_eq!(job.start(), Err(BillingError::InvalidTransition));

    job.complete().unwrap();
    assert_eq!(job.state(), JobState::Completed);
    assert!(job.is_invoiceable());
}

#[test]
fn deposit_status_tracks_requirement() {
    let job = Job::new(JobId(1), PartyId(1), CurrencyCode::GBP);
    assert_eq!(job.deposit_status(), DepositStatus::NotRequired);

    job.set_deposit_required(gbp(dec!(100.00))).unwrap();
    assert_eq!(job.deposit_status(), DepositStatus::Pending);

    job.apply_deposit_payment(payment(dec!(100.00), "pi_d1"), Utc::now())
        .unwrap();
    assert_eq!(job.deposit_status(), DepositStatus::Paid);
}

/// Raising the requirement after it was met reopens the deposit; the
/// ledger is untouched, only the derived view changes.
#[test]
fn raising_the_requirement_reopens_the_deposit() {
    let job = Job::new(JobId(1), PartyId(1), CurrencyCode::GBP);
    job.set_deposit_required(gbp(dec!(50.00))).unwrap();
    job.apply_deposit_payment(payment(dec!(50.00), "pi_d1"), Utc::now())
        .unwrap();
    assert_eq!(job.deposit_status(), DepositStatus::Paid);

    job.set_deposit_required(gbp(dec!(120.00))).unwrap();
    let snap = job.deposit_snapshot();
    assert_eq!(snap.status, DepositStatus::PartiallyPaid);
    assert_eq!(snap.paid, dec!(50.00));
    assert_eq!(snap.outstanding, dec!(70.00));
}

#[test]
fn deposit_payments_accepted_in_any_job_state() {
    // Deposits commonly land while the job is still scheduled, but a late
    // confirmation after completion must not bounce.
    let job = Job::new(JobId(1), PartyId(1), CurrencyCode::GBP);
    job.set_deposit_required(gbp(dec!(100.00))).unwrap();
    job.start().unwrap();
    job.complete().unwrap();

    let result = job
        .apply_deposit_payment(payment(dec!(100.00), "pi_d1"), Utc::now())
        .unwrap();
    assert!(matches!(result, PaymentApplication::Applied(_)));
}

#[test]
fn negative_deposit_requirement_rejected() {
    let job = Job::new(JobId(1), PartyId(1), CurrencyCode::GBP);
    assert_eq!(
        job.set_deposit_required(gbp(dec!(-10.00))),
        Err(BillingError::InvalidAmount)
    );
}
