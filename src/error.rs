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

//! Error types for billing operations.

use crate::money::CurrencyCode;
use thiserror::Error;

/// Billing and reconciliation errors.
///
/// All variants are recoverable at the API boundary and map to 4xx responses;
/// none of them should ever crash the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Referenced invoice or job does not exist
    #[error("invoice or job not found")]
    NotFound,

    /// Payment or line-item currency differs from the ledger currency
    #[error("currency mismatch: ledger is {expected}, got {found}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        found: CurrencyCode,
    },

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Operation not allowed in the aggregate's current state
    /// (e.g. payment against a void invoice, line-item edit after sending)
    #[error("operation not allowed in current state")]
    InvalidState,

    /// Illegal explicit status change (e.g. sending a non-draft invoice,
    /// or requesting a money-derived target status directly)
    #[error("illegal status transition")]
    InvalidTransition,

    /// Requested basket quantity exceeds available stock
    #[error("insufficient stock for requested quantity")]
    InsufficientStock,

    /// Job is not in a completed state and cannot be invoiced
    #[error("job is not invoiceable")]
    JobNotInvoiceable,

    /// Idempotency key already applied to this ledger.
    ///
    /// Raised only by the storage-layer backstop; the reconciliation path
    /// absorbs it into a no-op so that confirmation retries stay safe.
    #[error("duplicate payment for idempotency key")]
    DuplicatePayment,
}

#[cfg(test)]
mod tests {
    use super::BillingError;
    use crate::money::CurrencyCode;

    #[test]
    fn error_display_messages() {
        assert_eq!(BillingError::NotFound.to_string(), "invoice or job not found");
        assert_eq!(
            BillingError::InvalidAmount.to_string(),
            "invalid amount (must be positive)"
        );
        assert_eq!(
            BillingError::InvalidState.to_string(),
            "operation not allowed in current state"
        );
        assert_eq!(
            BillingError::InvalidTransition.to_string(),
            "illegal status transition"
        );
        assert_eq!(
            BillingError::InsufficientStock.to_string(),
            "insufficient stock for requested quantity"
        );
        assert_eq!(BillingError::JobNotInvoiceable.to_string(), "job is not invoiceable");
        assert_eq!(
            BillingError::DuplicatePayment.to_string(),
            "duplicate payment for idempotency key"
        );
    }

    #[test]
    fn currency_mismatch_names_both_codes() {
        let err = BillingError::CurrencyMismatch {
            expected: CurrencyCode::GBP,
            found: CurrencyCode::USD,
        };
        assert_eq!(err.to_string(), "currency mismatch: ledger is GBP, got USD");
    }

    #[test]
    fn errors_are_cloneable() {
        let error = BillingError::InsufficientStock;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
