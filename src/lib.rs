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

//! # Billing Engine
//!
//! This library provides the invoice and payment reconciliation engine for a
//! field-service business: it tracks what a customer owes, records partial
//! payments (including deposits collected against in-progress jobs), derives
//! invoice status from the accumulated payment ledger, and keeps the
//! displayed balance consistent with the individual payment records.
//!
//! ## Core Components
//!
//! - [`Engine`]: creation and reconciliation services over the registries
//! - [`Invoice`]: invoice aggregate owning line items and payment records
//! - [`Job`]: field-service job carrying the deposit sub-ledger
//! - [`Money`]: currency-tagged exact decimal arithmetic
//! - [`BillingError`]: recoverable failure kinds for every operation
//!
//! ## Example
//!
//! ```
//! use billing_engine_rs::{
//!     CurrencyCode, Engine, JobId, LineItem, Money, PartyId, PaymentInput, PaymentMethod,
//! };
//! use chrono::{Days, Utc};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//!
//! // A completed job becomes a draft invoice.
//! let job_id = JobId(1);
//! engine.create_job(job_id, PartyId(7), CurrencyCode::GBP).unwrap();
//! let callout = LineItem::new("Callout", 1, Money::new(dec!(120.00), CurrencyCode::GBP)).unwrap();
//! engine.add_job_billable(&job_id, callout).unwrap();
//! engine.start_job(&job_id).unwrap();
//! engine.complete_job(&job_id).unwrap();
//!
//! let today = Utc::now().date_naive();
//! let invoice_id = engine
//!     .create_invoice_from_job(
//!         &job_id,
//!         today,
//!         today + Days::new(30),
//!         Money::zero(CurrencyCode::GBP),
//!     )
//!     .unwrap();
//! engine.mark_sent(&invoice_id).unwrap();
//!
//! // A gateway confirmation lands exactly once per idempotency key.
//! let payment = PaymentInput::new(
//!     Money::new(dec!(50.00), CurrencyCode::GBP),
//!     PaymentMethod::Card,
//!     "pi_123",
//! );
//! let snapshot = engine.apply_invoice_payment(&invoice_id, payment).unwrap();
//! assert_eq!(snapshot.balance_due, dec!(70.00));
//! ```
//!
//! ## Thread Safety
//!
//! Mutations against one invoice or one job serialize on that aggregate's
//! internal lock; operations on distinct aggregates run fully in parallel.
//! Concurrent retries of the same payment confirmation cannot double-apply.

mod base;
pub mod deposit;
mod engine;
pub mod error;
pub mod gateway;
pub mod invoice;
pub mod money;
pub mod party;
mod payment;
mod payment_log;
pub mod stock;

pub use base::{InvoiceId, JobId, PartyId, PaymentId, StockItemId};
pub use deposit::{DepositSnapshot, DepositStatus, Job, JobState, derive_deposit_status};
pub use engine::Engine;
pub use error::BillingError;
pub use gateway::{GatewayError, IntentStatus, PaymentGateway, PaymentIntent, PaymentOutcome};
pub use invoice::{
    Invoice, InvoiceSnapshot, InvoiceStatus, Lifecycle, LineItem, PaymentApplication,
    derive_status,
};
pub use money::{CurrencyCode, CurrencyStyle, Money};
pub use party::{Party, StaffRole};
pub use payment::{IdempotencyKey, PaymentInput, PaymentMethod, PaymentRecord};
pub use payment_log::{LedgerRef, PaymentLog};
pub use stock::{StockItem, StockStore};
