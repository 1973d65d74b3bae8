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

//! External payment-authorization processor, specified at its seam.
//!
//! The gateway issues an intent for an amount and later reports a terminal
//! outcome keyed by that intent's id. There is no server-side blocking
//! wait: the outcome arrives as an independent inbound call, and the caller
//! maps it to a payment application using the intent id as the idempotency
//! key. An abandoned client flow simply never produces an outcome, which
//! needs no compensating action.

use crate::money::Money;
use crate::payment::{PaymentInput, PaymentMethod};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Failure talking to the processor; transient from the engine's point of
/// view and retried by the caller, never a business error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("payment gateway error: {0}")]
pub struct GatewayError(pub String);

/// An authorization handle issued by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    /// Opaque handle the client app hands to the embedded payment widget.
    pub client_handle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Succeeded,
    Failed,
}

/// Terminal outcome the processor reports for an intent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaymentOutcome {
    pub intent_id: String,
    pub status: IntentStatus,
    pub amount: Money,
}

impl PaymentOutcome {
    /// Maps a successful outcome to the payment input the reconciliation
    /// service applies; the intent id becomes the idempotency key, so a
    /// replayed outcome lands as a no-op. Failed outcomes map to nothing.
    pub fn into_payment_input(self) -> Option<PaymentInput> {
        match self.status {
            IntentStatus::Succeeded => Some(PaymentInput {
                amount: self.amount,
                method: PaymentMethod::Card,
                idempotency_key: self.intent_id.clone().into(),
                external_reference: Some(self.intent_id),
                notes: None,
            }),
            IntentStatus::Failed => None,
        }
    }
}

/// The processor's request surface.
pub trait PaymentGateway {
    fn create_intent(
        &self,
        amount: Money,
        description: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<PaymentIntent, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::CurrencyCode;
    use rust_decimal_macros::dec;

    #[test]
    fn succeeded_outcome_maps_to_keyed_input() {
        let outcome = PaymentOutcome {
            intent_id: "pi_123".to_string(),
            status: IntentStatus::Succeeded,
            amount: Money::new(dec!(50.00), CurrencyCode::GBP),
        };
        let input = outcome.into_payment_input().unwrap();
        assert_eq!(input.idempotency_key.as_str(), "pi_123");
        assert_eq!(input.external_reference.as_deref(), Some("pi_123"));
        assert_eq!(input.method, PaymentMethod::Card);
    }

    #[test]
    fn failed_outcome_maps_to_nothing() {
        let outcome = PaymentOutcome {
            intent_id: "pi_124".to_string(),
            status: IntentStatus::Failed,
            amount: Money::new(dec!(50.00), CurrencyCode::GBP),
        };
        assert!(outcome.into_payment_input().is_none());
    }
}
