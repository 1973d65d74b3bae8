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

//! Property-based tests for the billing engine.
//!
//! These tests verify invariants that should hold for any sequence of
//! valid payment applications.

use billing_engine_rs::{
    CurrencyCode, DepositStatus, Invoice, InvoiceId, InvoiceStatus, Job, JobId, Lifecycle,
    LineItem, Money, PartyId, PaymentInput, PaymentMethod, derive_deposit_status, derive_status,
};
use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.01 to 100000.00 with 2 decimal places).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000i64).prop_map(|pence| Decimal::new(pence, 2))
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0u32..=3650).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Days::new(offset as u64)
    })
}

fn gbp(amount: Decimal) -> Money {
    Money::new(amount, CurrencyCode::GBP)
}

fn payment(amount: Decimal, key: String) -> PaymentInput {
    PaymentInput::new(gbp(amount), PaymentMethod::Card, key)
}

/// Sent invoice for `total`, due far in the future.
fn sent_invoice(total: Decimal) -> Invoice {
    let issue = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let due = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
    let invoice = Invoice::new(
        InvoiceId(1),
        PartyId(1),
        CurrencyCode::GBP,
        issue,
        due,
        gbp(Decimal::ZERO),
    )
    .unwrap();
    invoice
        .add_line_item(LineItem::new("Labour", 1, gbp(total)).unwrap())
        .unwrap();
    invoice.mark_sent().unwrap();
    invoice
}

// =============================================================================
// Ledger Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Amount paid always equals the sum of the payment records.
    #[test]
    fn paid_equals_sum_of_records(
        total in arb_amount(),
        amounts in prop::collection::vec(arb_amount(), 1..10),
    ) {
        let invoice = sent_invoice(total);
        let expected: Decimal = amounts.iter().copied().sum();

        for (i, amount) in amounts.iter().enumerate() {
            invoice
                .apply_payment(payment(*amount, format!("pi_{i}")), Utc::now())
                .unwrap();
        }

        prop_assert_eq!(invoice.amount_paid().amount(), expected);
        prop_assert_eq!(
            invoice.balance_due().amount(),
            invoice.total().amount() - expected
        );
    }

    /// Replaying any prefix of the confirmations never changes the balance.
    #[test]
    fn replayed_keys_never_change_the_balance(
        total in arb_amount(),
        amounts in prop::collection::vec(arb_amount(), 1..8),
        replays in prop::collection::vec(0usize..8, 1..20),
    ) {
        let invoice = sent_invoice(total);

        for (i, amount) in amounts.iter().enumerate() {
            invoice
                .apply_payment(payment(*amount, format!("pi_{i}")), Utc::now())
                .unwrap();
        }
        let paid_before = invoice.amount_paid().amount();

        // Replay arbitrary keys, some repeatedly
        for r in &replays {
            let i = r % amounts.len();
            let _ = invoice.apply_payment(payment(amounts[i], format!("pi_{i}")), Utc::now());
        }

        prop_assert_eq!(invoice.amount_paid().amount(), paid_before);
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        prop_assert_eq!(invoice.snapshot(today).payments.len(), amounts.len());
    }

    /// The displayed balance is never negative; overpayment raises the flag
    /// instead.
    #[test]
    fn displayed_balance_never_negative(
        total in arb_amount(),
        amounts in prop::collection::vec(arb_amount(), 1..10),
    ) {
        let invoice = sent_invoice(total);
        for (i, amount) in amounts.iter().enumerate() {
            invoice
                .apply_payment(payment(*amount, format!("pi_{i}")), Utc::now())
                .unwrap();
        }

        let snap = invoice.snapshot(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        prop_assert!(snap.balance_due >= Decimal::ZERO);
        let paid: Decimal = amounts.iter().copied().sum();
        prop_assert_eq!(snap.overpaid, paid > total);
    }
}

// =============================================================================
// Status Derivation Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Status derivation is a pure function of its inputs: same inputs,
    /// same status, and the result obeys the derivation rules.
    #[test]
    fn derived_status_obeys_the_rules(
        total in arb_amount(),
        paid in prop_oneof![Just(Decimal::ZERO), arb_amount()],
        due in arb_date(),
        today in arb_date(),
    ) {
        let status = derive_status(Lifecycle::Sent, total, paid, due, today);
        prop_assert_eq!(status, derive_status(Lifecycle::Sent, total, paid, due, today));

        let balance = total - paid;
        if balance <= Decimal::ZERO {
            prop_assert_eq!(status, InvoiceStatus::Paid);
        } else if today > due {
            prop_assert_eq!(status, InvoiceStatus::Overdue);
        } else if paid > Decimal::ZERO {
            prop_assert_eq!(status, InvoiceStatus::PartiallyPaid);
        } else {
            prop_assert_eq!(status, InvoiceStatus::Sent);
        }
    }

    /// Explicit lifecycle flags always win over money states.
    #[test]
    fn lifecycle_flags_override_money_states(
        total in arb_amount(),
        paid in arb_amount(),
        due in arb_date(),
        today in arb_date(),
    ) {
        prop_assert_eq!(
            derive_status(Lifecycle::Void, total, paid, due, today),
            InvoiceStatus::Void
        );
        prop_assert_eq!(
            derive_status(Lifecycle::Refunded, total, paid, due, today),
            InvoiceStatus::Refunded
        );
        prop_assert_eq!(
            derive_status(Lifecycle::Draft, total, paid, due, today),
            InvoiceStatus::Draft
        );
    }

    /// Deposit status follows the required/paid comparison exactly.
    #[test]
    fn deposit_status_matches_comparison(
        required in prop_oneof![Just(Decimal::ZERO), arb_amount()],
        paid in prop_oneof![Just(Decimal::ZERO), arb_amount()],
    ) {
        let status = derive_deposit_status(required, paid);
        if required <= Decimal::ZERO {
            prop_assert_eq!(status, DepositStatus::NotRequired);
        } else if paid <= Decimal::ZERO {
            prop_assert_eq!(status, DepositStatus::Pending);
        } else if paid < required {
            prop_assert_eq!(status, DepositStatus::PartiallyPaid);
        } else {
            prop_assert_eq!(status, DepositStatus::Paid);
        }
    }
}

// =============================================================================
// Deposit Sub-ledger Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Deposit paid equals the record sum and outstanding floors at zero.
    #[test]
    fn deposit_ledger_balances(
        required in arb_amount(),
        amounts in prop::collection::vec(arb_amount(), 0..10),
    ) {
        let job = Job::new(JobId(1), PartyId(1), CurrencyCode::GBP);
        job.set_deposit_required(gbp(required)).unwrap();

        for (i, amount) in amounts.iter().enumerate() {
            job.apply_deposit_payment(payment(*amount, format!("pi_d{i}")), Utc::now())
                .unwrap();
        }

        let paid: Decimal = amounts.iter().copied().sum();
        let snap = job.deposit_snapshot();
        prop_assert_eq!(snap.paid, paid);
        prop_assert_eq!(snap.outstanding, (required - paid).max(Decimal::ZERO));
        prop_assert!(snap.outstanding >= Decimal::ZERO);
    }
}

// =============================================================================
// Money Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Cross-currency arithmetic always errors, never coerces.
    #[test]
    fn mixed_currency_arithmetic_always_errors(
        a in arb_amount(),
        b in arb_amount(),
    ) {
        let pounds = Money::new(a, CurrencyCode::GBP);
        let dollars = Money::new(b, CurrencyCode::USD);
        prop_assert!(pounds.checked_add(dollars).is_err());
        prop_assert!(pounds.checked_sub(dollars).is_err());
    }

    /// Same-currency addition matches decimal arithmetic exactly.
    #[test]
    fn money_addition_is_exact(
        a in arb_amount(),
        b in arb_amount(),
    ) {
        let sum = Money::new(a, CurrencyCode::GBP)
            .checked_add(Money::new(b, CurrencyCode::GBP))
            .unwrap();
        prop_assert_eq!(sum.amount(), a + b);
        prop_assert_eq!(sum.currency(), CurrencyCode::GBP);
    }
}
