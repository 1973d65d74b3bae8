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

//! Parties the business deals with: leads, customers, staff.
//!
//! One tagged sum type with a distinct field set per variant. Only a
//! [`Party::Customer`] can be invoiced; leads convert to customers by being
//! re-registered under the same id.

use crate::base::PartyId;
use serde::{Deserialize, Serialize};

/// Role of a staff member, used when attributing work to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Technician,
    Scheduler,
    Manager,
}

/// A contact record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Party {
    /// A prospect that has not bought anything yet.
    Lead {
        id: PartyId,
        name: String,
        contact_email: Option<String>,
        /// Where the lead came from (referral, web form, ...).
        source: Option<String>,
    },
    /// A billable customer.
    Customer {
        id: PartyId,
        name: String,
        contact_email: Option<String>,
        billing_address: Option<String>,
    },
    /// An employee; never invoiced.
    Staff {
        id: PartyId,
        name: String,
        role: StaffRole,
    },
}

impl Party {
    pub fn id(&self) -> PartyId {
        match self {
            Party::Lead { id, .. } | Party::Customer { id, .. } | Party::Staff { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Party::Lead { name, .. } | Party::Customer { name, .. } | Party::Staff { name, .. } => {
                name
            }
        }
    }

    pub fn is_billable(&self) -> bool {
        matches!(self, Party::Customer { .. })
    }

    /// Converts a lead into a customer, keeping id and contact details.
    ///
    /// Customers and staff are returned unchanged.
    pub fn into_customer(self) -> Party {
        match self {
            Party::Lead {
                id,
                name,
                contact_email,
                ..
            } => Party::Customer {
                id,
                name,
                contact_email,
                billing_address: None,
            },
            other => other,
        }
    }
}
