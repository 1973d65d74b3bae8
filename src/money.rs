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

//! Currency-tagged money arithmetic.
//!
//! Every monetary value in the engine flows through [`Money`]: an exact
//! [`Decimal`] amount tagged with an ISO-4217 [`CurrencyCode`]. Amounts are
//! never represented as binary floats, and arithmetic between mismatched
//! currencies fails with [`BillingError::CurrencyMismatch`] rather than
//! converting implicitly.
//!
//! Display formatting is a separate, pure concern: [`CurrencyStyle::format`]
//! takes the style (symbol, decimal places, thousands separator) as data at
//! the call site. There is no process-wide formatting context.
//!
//! # Example
//!
//! ```
//! use billing_engine_rs::{CurrencyCode, Money};
//! use rust_decimal_macros::dec;
//!
//! let a = Money::new(dec!(100.00), CurrencyCode::GBP);
//! let b = Money::new(dec!(20.50), CurrencyCode::GBP);
//! let sum = a.checked_add(b).unwrap();
//! assert_eq!(sum.amount(), dec!(120.50));
//! ```

use crate::error::BillingError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Three-letter ISO-4217 currency tag.
///
/// Stored as raw ASCII so the type stays `Copy` and comparison is trivial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

/// Error returned when parsing a currency code fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid currency code (expected 3 ASCII letters)")]
pub struct ParseCurrencyError;

impl CurrencyCode {
    pub const GBP: CurrencyCode = CurrencyCode(*b"GBP");
    pub const USD: CurrencyCode = CurrencyCode(*b"USD");
    pub const EUR: CurrencyCode = CurrencyCode(*b"EUR");

    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII uppercase letters.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Number of decimal digits in the currency's minor unit.
    ///
    /// Two for almost everything; zero for the common zero-decimal
    /// currencies. Multi-currency conversion stays out of scope, this only
    /// affects the integer minor-unit view and default display precision.
    pub fn minor_unit_exponent(&self) -> u32 {
        match &self.0 {
            b"JPY" | b"KRW" | b"VND" => 0,
            _ => 2,
        }
    }
}

impl FromStr for CurrencyCode {
    type Err = ParseCurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(ParseCurrencyError);
        }
        Ok(CurrencyCode([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ParseCurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An exact monetary amount in a single currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Money {
    amount: Decimal,
    currency: CurrencyCode,
}

impl Money {
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Integer minor-unit view (pence for GBP, cents for USD).
    ///
    /// This is the representation the storage layer persists. Returns `None`
    /// only if the scaled amount overflows `i64`.
    pub fn minor_units(&self) -> Option<i64> {
        let scale = Decimal::from(10_i64.pow(self.currency.minor_unit_exponent()));
        self.amount.checked_mul(scale)?.round_dp(0).to_i64()
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), BillingError> {
        if self.currency != other.currency {
            return Err(BillingError::CurrencyMismatch {
                expected: self.currency,
                found: other.currency,
            });
        }
        Ok(())
    }

    /// Adds two amounts of the same currency.
    pub fn checked_add(self, other: Money) -> Result<Money, BillingError> {
        self.ensure_same_currency(&other)?;
        Ok(Money::new(self.amount + other.amount, self.currency))
    }

    /// Subtracts an amount of the same currency.
    ///
    /// The result may be negative; callers that display a balance floor it
    /// at zero themselves.
    pub fn checked_sub(self, other: Money) -> Result<Money, BillingError> {
        self.ensure_same_currency(&other)?;
        Ok(Money::new(self.amount - other.amount, self.currency))
    }

    /// Compares two amounts of the same currency.
    pub fn checked_cmp(&self, other: &Money) -> Result<Ordering, BillingError> {
        self.ensure_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// Scales a unit price by a line-item quantity.
    pub fn mul_quantity(self, quantity: u32) -> Money {
        Money::new(self.amount * Decimal::from(quantity), self.currency)
    }

    /// Flips the sign; used for refund records.
    pub fn negated(self) -> Money {
        Money::new(-self.amount, self.currency)
    }
}

/// Display configuration for one currency.
///
/// Formatting is a pure function of `(amount, style)` so different call
/// sites (and different tenants) can render the same amount differently.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CurrencyStyle {
    pub symbol: String,
    pub decimal_places: u32,
    pub thousands_separator: Option<char>,
    /// Place the symbol after the amount ("1.00 €") instead of before.
    pub symbol_after: bool,
}

impl CurrencyStyle {
    pub fn gbp() -> Self {
        Self {
            symbol: "£".to_string(),
            decimal_places: 2,
            thousands_separator: Some(','),
            symbol_after: false,
        }
    }

    pub fn usd() -> Self {
        Self {
            symbol: "$".to_string(),
            decimal_places: 2,
            thousands_separator: Some(','),
            symbol_after: false,
        }
    }

    /// Renders an amount with this style.
    ///
    /// Negative amounts keep a leading minus ahead of the symbol: `-£70.00`.
    pub fn format(&self, money: &Money) -> String {
        let rounded = money.amount().round_dp(self.decimal_places).abs();
        let text = rounded.to_string();
        let (int_part, frac_part) = match text.split_once('.') {
            Some((i, f)) => (i.to_string(), f.to_string()),
            None => (text, String::new()),
        };

        let int_grouped = match self.thousands_separator {
            Some(sep) => group_thousands(&int_part, sep),
            None => int_part,
        };

        let mut frac = frac_part;
        while (frac.len() as u32) < self.decimal_places {
            frac.push('0');
        }

        let digits = if self.decimal_places > 0 {
            format!("{int_grouped}.{frac}")
        } else {
            int_grouped
        };

        let sign = if money.is_negative() { "-" } else { "" };
        if self.symbol_after {
            format!("{sign}{digits} {}", self.symbol)
        } else {
            format!("{sign}{}{digits}", self.symbol)
        }
    }
}

fn group_thousands(digits: &str, sep: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let chars: Vec<char> = digits.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(*c);
    }
    out
}
