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

//! Payment records and the input shape callers submit.
//!
//! A [`PaymentRecord`] is one immutable money movement against one ledger
//! (an invoice's payment list or a job's deposit sub-ledger). Records are
//! only ever appended, never edited or removed; the ledger's balance is
//! always recomputed from the full list.

use crate::base::PaymentId;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a payment was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Cash,
    BankTransfer,
    Other,
}

/// Caller-supplied token that makes re-application of the same payment
/// event a safe no-op.
///
/// For card payments this is the gateway's intent id; for manual entries it
/// is generated client-side. Uniqueness is scoped to one ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// What a caller submits to apply a payment.
///
/// The amount is the positive magnitude even for refunds; the aggregate
/// decides the sign of the stored record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaymentInput {
    pub amount: Money,
    pub method: PaymentMethod,
    pub idempotency_key: IdempotencyKey,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PaymentInput {
    pub fn new(amount: Money, method: PaymentMethod, key: impl Into<IdempotencyKey>) -> Self {
        Self {
            amount,
            method,
            idempotency_key: key.into(),
            external_reference: None,
            notes: None,
        }
    }
}

impl From<String> for IdempotencyKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// One immutable money movement against one ledger.
///
/// Refunds are stored with a negative amount; everything else is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRecord {
    id: PaymentId,
    amount: Money,
    method: PaymentMethod,
    external_reference: Option<String>,
    idempotency_key: IdempotencyKey,
    applied_at: DateTime<Utc>,
    notes: Option<String>,
}

impl PaymentRecord {
    /// Builds the record the aggregate appends for a regular payment.
    pub(crate) fn applied(id: PaymentId, input: PaymentInput, applied_at: DateTime<Utc>) -> Self {
        Self {
            id,
            amount: input.amount,
            method: input.method,
            external_reference: input.external_reference,
            idempotency_key: input.idempotency_key,
            applied_at,
            notes: input.notes,
        }
    }

    /// Builds a refund record: same shape, negated amount.
    pub(crate) fn refunded(id: PaymentId, input: PaymentInput, applied_at: DateTime<Utc>) -> Self {
        let mut record = Self::applied(id, input, applied_at);
        record.amount = record.amount.negated();
        record
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn external_reference(&self) -> Option<&str> {
        self.external_reference.as_deref()
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    pub fn applied_at(&self) -> DateTime<Utc> {
        self.applied_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}
