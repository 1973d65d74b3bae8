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

//! Stock items and the atomic check-and-decrement store.
//!
//! Basket reservation is all-or-nothing: every requested line is validated
//! against availability inside one critical section, then every decrement
//! happens in the same section. Two concurrent baskets racing for the same
//! depleting item can never both succeed past availability.

use crate::base::StockItemId;
use crate::error::BillingError;
use crate::invoice::LineItem;
use crate::money::Money;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A sellable stock item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StockItem {
    pub id: StockItemId,
    pub name: String,
    pub unit_price: Money,
    pub quantity_on_hand: u32,
}

/// Stock registry guarded by a single mutex.
///
/// One lock for the whole map keeps multi-item baskets atomic without lock
/// ordering concerns; stock movements are rare next to payment traffic.
#[derive(Debug, Default)]
pub struct StockStore {
    items: Mutex<HashMap<StockItemId, StockItem>>,
}

impl StockStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Adds or replaces a stock item.
    pub fn insert(&self, item: StockItem) {
        self.items.lock().insert(item.id, item);
    }

    pub fn quantity_on_hand(&self, id: StockItemId) -> Option<u32> {
        self.items.lock().get(&id).map(|item| item.quantity_on_hand)
    }

    pub fn unit_price(&self, id: StockItemId) -> Option<Money> {
        self.items.lock().get(&id).map(|item| item.unit_price)
    }

    /// Returns quantity to stock (the complementary flow to reservation).
    pub fn restock(&self, id: StockItemId, quantity: u32) -> Result<(), BillingError> {
        let mut items = self.items.lock();
        let item = items.get_mut(&id).ok_or(BillingError::NotFound)?;
        item.quantity_on_hand = item.quantity_on_hand.saturating_add(quantity);
        Ok(())
    }

    /// Atomically checks and decrements every basket line.
    ///
    /// On success returns invoice-ready line items priced at reservation
    /// time. On any failure nothing is decremented.
    ///
    /// # Errors
    ///
    /// - [`BillingError::InvalidAmount`] - empty basket or a zero quantity.
    /// - [`BillingError::NotFound`] - unknown stock item.
    /// - [`BillingError::InsufficientStock`] - requested quantity exceeds availability.
    /// - [`BillingError::CurrencyMismatch`] - basket items priced in mixed currencies.
    pub fn reserve(&self, basket: &[(StockItemId, u32)]) -> Result<Vec<LineItem>, BillingError> {
        if basket.is_empty() {
            return Err(BillingError::InvalidAmount);
        }

        let mut items = self.items.lock();

        // Validate the whole basket before touching any quantity. Repeated
        // lines for the same item count against availability together.
        let mut requested: HashMap<StockItemId, u32> = HashMap::new();
        let mut currency = None;
        for &(id, quantity) in basket {
            if quantity == 0 {
                return Err(BillingError::InvalidAmount);
            }
            let item = items.get(&id).ok_or(BillingError::NotFound)?;
            let combined = requested.entry(id).or_insert(0);
            *combined = combined
                .checked_add(quantity)
                .ok_or(BillingError::InvalidAmount)?;
            if item.quantity_on_hand < *combined {
                return Err(BillingError::InsufficientStock);
            }
            let item_currency = item.unit_price.currency();
            match currency {
                None => currency = Some(item_currency),
                Some(expected) if expected != item_currency => {
                    return Err(BillingError::CurrencyMismatch {
                        expected,
                        found: item_currency,
                    });
                }
                Some(_) => {}
            }
        }

        let mut lines = Vec::with_capacity(basket.len());
        for &(id, quantity) in basket {
            // Checked above; a miss here would mean the map changed under the lock.
            let item = items.get_mut(&id).ok_or(BillingError::NotFound)?;
            item.quantity_on_hand -= quantity;
            lines.push(LineItem::new(item.name.clone(), quantity, item.unit_price)?);
        }
        Ok(lines)
    }
}
