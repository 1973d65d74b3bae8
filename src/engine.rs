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

//! Billing engine: invoice/deposit creation and payment reconciliation.
//!
//! The [`Engine`] owns the registries and routes every mutation to the
//! right aggregate. Mutations against one invoice or one job serialize on
//! that aggregate's internal lock; distinct aggregates proceed fully in
//! parallel.
//!
//! # Reconciliation
//!
//! `apply_invoice_payment` / `apply_deposit_payment` implement the
//! exactly-once contract for external payment confirmations: look up the
//! target, let the aggregate perform the idempotency check and the append
//! inside one critical section, record the applied key in the engine-wide
//! [`PaymentLog`] backstop, and return the freshly recomputed snapshot.
//! Re-applying the same `(target, idempotency_key)` returns the unchanged
//! aggregate rather than double-counting the money.

use crate::base::{InvoiceId, JobId, PartyId, StockItemId};
use crate::deposit::{DepositSnapshot, Job};
use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceSnapshot, LineItem, PaymentApplication};
use crate::money::{CurrencyCode, Money};
use crate::party::Party;
use crate::payment::PaymentInput;
use crate::payment_log::{LedgerRef, PaymentLog};
use crate::stock::{StockItem, StockStore};
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Central billing engine.
///
/// # Invariants
///
/// - An invoice's payment list is mutated only through the engine's
///   reconciliation methods; same for a job's deposit ledger.
/// - Idempotency keys are scoped per ledger; re-application is a no-op.
/// - Stock quantities only move through the atomic reserve/restock pair.
pub struct Engine {
    parties: DashMap<PartyId, Party>,
    invoices: DashMap<InvoiceId, Invoice>,
    jobs: DashMap<JobId, Job>,
    stock: StockStore,
    /// Storage-layer backstop for idempotency-key uniqueness.
    log: PaymentLog,
    next_invoice_id: AtomicU32,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            parties: DashMap::new(),
            invoices: DashMap::new(),
            jobs: DashMap::new(),
            stock: StockStore::new(),
            log: PaymentLog::new(),
            next_invoice_id: AtomicU32::new(1),
        }
    }

    // === Registries ===

    /// Adds or replaces a party record.
    pub fn register_party(&self, party: Party) {
        self.parties.insert(party.id(), party);
    }

    pub fn party(
        &self,
        id: &PartyId,
    ) -> Option<dashmap::mapref::one::Ref<'_, PartyId, Party>> {
        self.parties.get(id)
    }

    /// Converts a registered lead into a billable customer in place.
    pub fn convert_lead(&self, id: PartyId) -> Result<(), BillingError> {
        let mut entry = self.parties.get_mut(&id).ok_or(BillingError::NotFound)?;
        let converted = entry.value().clone().into_customer();
        *entry.value_mut() = converted;
        Ok(())
    }

    /// Registers a new job in `Scheduled` state.
    ///
    /// Fails with [`BillingError::InvalidState`] if the id is taken.
    pub fn create_job(
        &self,
        id: JobId,
        customer: PartyId,
        currency: CurrencyCode,
    ) -> Result<(), BillingError> {
        match self.jobs.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BillingError::InvalidState),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Job::new(id, customer, currency));
                Ok(())
            }
        }
    }

    pub fn add_stock_item(&self, item: StockItem) {
        self.stock.insert(item);
    }

    pub fn stock(&self) -> &StockStore {
        &self.stock
    }

    pub fn payment_log(&self) -> &PaymentLog {
        &self.log
    }

    // === Job operations ===

    pub fn job(&self, id: &JobId) -> Option<dashmap::mapref::one::Ref<'_, JobId, Job>> {
        self.jobs.get(id)
    }

    pub fn start_job(&self, id: &JobId) -> Result<(), BillingError> {
        self.jobs.get(id).ok_or(BillingError::NotFound)?.start()
    }

    pub fn complete_job(&self, id: &JobId) -> Result<(), BillingError> {
        self.jobs.get(id).ok_or(BillingError::NotFound)?.complete()
    }

    pub fn add_job_billable(&self, id: &JobId, item: LineItem) -> Result<(), BillingError> {
        self.jobs
            .get(id)
            .ok_or(BillingError::NotFound)?
            .add_billable(item)
    }

    pub fn set_deposit_required(&self, id: &JobId, required: Money) -> Result<(), BillingError> {
        self.jobs
            .get(id)
            .ok_or(BillingError::NotFound)?
            .set_deposit_required(required)
    }

    /// Deposit sub-ledger view with derived fields recomputed fresh.
    pub fn deposit_snapshot(&self, id: &JobId) -> Result<DepositSnapshot, BillingError> {
        Ok(self
            .jobs
            .get(id)
            .ok_or(BillingError::NotFound)?
            .deposit_snapshot())
    }

    // === Creation service ===

    fn next_invoice_id(&self) -> InvoiceId {
        InvoiceId(self.next_invoice_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Builds a draft invoice from a completed job: one line item per
    /// billable component the job accumulated.
    ///
    /// # Errors
    ///
    /// - [`BillingError::NotFound`] - unknown job.
    /// - [`BillingError::JobNotInvoiceable`] - job is not `Completed`.
    /// - [`BillingError::CurrencyMismatch`] - tax amount in a different currency.
    pub fn create_invoice_from_job(
        &self,
        job_id: &JobId,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        tax_amount: Money,
    ) -> Result<InvoiceId, BillingError> {
        let job = self.jobs.get(job_id).ok_or(BillingError::NotFound)?;
        if !job.is_invoiceable() {
            return Err(BillingError::JobNotInvoiceable);
        }

        let id = self.next_invoice_id();
        let invoice = Invoice::new(
            id,
            job.customer(),
            job.currency(),
            issue_date,
            due_date,
            tax_amount,
        )?;
        for item in job.billables() {
            invoice.add_line_item(item)?;
        }
        self.invoices.insert(id, invoice);
        Ok(id)
    }

    /// Builds a draft invoice from a stock basket.
    ///
    /// The stock check-and-decrement is one atomic step; if invoice
    /// assembly fails afterwards the reserved quantities are returned, so a
    /// failed call never leaves stock decremented without an invoice.
    ///
    /// # Errors
    ///
    /// - [`BillingError::NotFound`] - unknown customer or stock item.
    /// - [`BillingError::InvalidState`] - the party is not a billable customer.
    /// - [`BillingError::InsufficientStock`] - a requested quantity exceeds availability.
    /// - [`BillingError::CurrencyMismatch`] - mixed basket currencies, or tax
    ///   in a different currency than the basket.
    pub fn create_invoice_from_basket(
        &self,
        customer: PartyId,
        basket: &[(StockItemId, u32)],
        issue_date: NaiveDate,
        due_date: NaiveDate,
        tax_amount: Money,
    ) -> Result<InvoiceId, BillingError> {
        {
            let party = self.parties.get(&customer).ok_or(BillingError::NotFound)?;
            if !party.is_billable() {
                return Err(BillingError::InvalidState);
            }
        }

        let lines = self.stock.reserve(basket)?;
        // reserve() rejects empty baskets, so the currency is well-defined.
        let currency = lines[0].unit_price().currency();

        let id = self.next_invoice_id();
        let invoice = match Invoice::new(id, customer, currency, issue_date, due_date, tax_amount)
        {
            Ok(invoice) => invoice,
            Err(err) => {
                self.unreserve(basket);
                return Err(err);
            }
        };
        for item in lines {
            if let Err(err) = invoice.add_line_item(item) {
                self.unreserve(basket);
                return Err(err);
            }
        }
        self.invoices.insert(id, invoice);
        Ok(id)
    }

    fn unreserve(&self, basket: &[(StockItemId, u32)]) {
        for &(item_id, quantity) in basket {
            // The item existed moments ago; a miss means it was removed
            // concurrently and there is nothing left to return to.
            let _ = self.stock.restock(item_id, quantity);
        }
    }

    /// Appends a line item to a draft invoice.
    pub fn add_line_item(&self, id: &InvoiceId, item: LineItem) -> Result<(), BillingError> {
        self.invoices
            .get(id)
            .ok_or(BillingError::NotFound)?
            .add_line_item(item)
    }

    // === Explicit transitions ===

    pub fn mark_sent(&self, id: &InvoiceId) -> Result<InvoiceSnapshot, BillingError> {
        let invoice = self.invoices.get(id).ok_or(BillingError::NotFound)?;
        invoice.mark_sent()?;
        Ok(invoice.snapshot(Utc::now().date_naive()))
    }

    pub fn void_invoice(&self, id: &InvoiceId) -> Result<InvoiceSnapshot, BillingError> {
        let invoice = self.invoices.get(id).ok_or(BillingError::NotFound)?;
        let today = Utc::now().date_naive();
        invoice.void(today)?;
        Ok(invoice.snapshot(today))
    }

    /// Refunds a settled invoice; the refund is itself an idempotent
    /// payment record.
    pub fn refund_invoice(
        &self,
        id: &InvoiceId,
        input: PaymentInput,
    ) -> Result<InvoiceSnapshot, BillingError> {
        let invoice = self.invoices.get(id).ok_or(BillingError::NotFound)?;
        let key = input.idempotency_key.clone();
        let now = Utc::now();
        if let PaymentApplication::Applied(payment_id) = invoice.refund(input, now)? {
            let _ = self.log.record(LedgerRef::Invoice(*id), key, payment_id);
        }
        Ok(invoice.snapshot(now.date_naive()))
    }

    // === Reconciliation service ===

    /// Applies a payment confirmation to an invoice, exactly once per
    /// idempotency key, and returns the updated aggregate.
    ///
    /// # Errors
    ///
    /// - [`BillingError::NotFound`] - unknown invoice.
    /// - [`BillingError::CurrencyMismatch`] - payment currency differs; never coerced.
    /// - [`BillingError::InvalidState`] - invoice is draft, void, or refunded.
    /// - [`BillingError::InvalidAmount`] - zero or negative amount.
    pub fn apply_invoice_payment(
        &self,
        id: &InvoiceId,
        input: PaymentInput,
    ) -> Result<InvoiceSnapshot, BillingError> {
        let invoice = self.invoices.get(id).ok_or(BillingError::NotFound)?;
        let key = input.idempotency_key.clone();
        let now = Utc::now();
        if let PaymentApplication::Applied(payment_id) = invoice.apply_payment(input, now)? {
            // The aggregate check is authoritative; a duplicate here would
            // mean the backstop saw a key the aggregate somehow did not,
            // and absorbing it keeps retries safe either way.
            let _ = self.log.record(LedgerRef::Invoice(*id), key, payment_id);
        }
        Ok(invoice.snapshot(now.date_naive()))
    }

    /// Deposit counterpart of [`Engine::apply_invoice_payment`], same
    /// contract scoped to a job's deposit sub-ledger.
    pub fn apply_deposit_payment(
        &self,
        id: &JobId,
        input: PaymentInput,
    ) -> Result<DepositSnapshot, BillingError> {
        let job = self.jobs.get(id).ok_or(BillingError::NotFound)?;
        let key = input.idempotency_key.clone();
        let now = Utc::now();
        if let PaymentApplication::Applied(payment_id) = job.apply_deposit_payment(input, now)? {
            let _ = self.log.record(LedgerRef::JobDeposit(*id), key, payment_id);
        }
        Ok(job.deposit_snapshot())
    }

    // === Reads ===

    pub fn invoice(
        &self,
        id: &InvoiceId,
    ) -> Option<dashmap::mapref::one::Ref<'_, InvoiceId, Invoice>> {
        self.invoices.get(id)
    }

    /// Invoice view with every derived field recomputed fresh; never served
    /// from a stale cache.
    pub fn invoice_snapshot(&self, id: &InvoiceId) -> Result<InvoiceSnapshot, BillingError> {
        Ok(self
            .invoices
            .get(id)
            .ok_or(BillingError::NotFound)?
            .snapshot(Utc::now().date_naive()))
    }

    /// Iterator over all invoices, for report output.
    pub fn invoices(
        &self,
    ) -> impl Iterator<Item = dashmap::mapref::multiple::RefMulti<'_, InvoiceId, Invoice>> {
        self.invoices.iter()
    }

    /// Iterator over all jobs, for report output.
    pub fn jobs(
        &self,
    ) -> impl Iterator<Item = dashmap::mapref::multiple::RefMulti<'_, JobId, Job>> {
        self.jobs.iter()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
