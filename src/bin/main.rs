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

use billing_engine_rs::{
    BillingError, CurrencyCode, DepositStatus, Engine, InvoiceId, InvoiceStatus, JobId, LineItem,
    Money, PartyId, PaymentInput, PaymentMethod,
};
use chrono::{Days, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;

/// Billing Engine - Process billing event CSV files
///
/// Reads billing events from a CSV file and outputs invoice and deposit
/// states to stdout. Supports invoice creation, payments, voids, refunds,
/// job deposits, and deposit payments.
#[derive(Parser, Debug)]
#[command(name = "billing-engine-rs")]
#[command(about = "A billing engine that processes event CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with billing events
    ///
    /// Expected format: type,target,amount,currency,key,method
    /// Example: cargo run -- events.csv > statements.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Open input file
    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    // Process events from CSV
    let (engine, invoices) = match process_events(BufReader::new(file)) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error processing events: {}", e);
            process::exit(1);
        }
    };

    // Write results to stdout
    if let Err(e) = write_report(&engine, &invoices, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, target, amount, currency, key, method` — rows always carry
/// all six columns, with trailing ones left empty where not applicable.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    event_type: String,
    target: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    currency: Option<String>,
    key: Option<String>,
    method: Option<String>,
}

/// One billing event in engine terms.
#[derive(Debug)]
enum Event {
    /// Creates and sends an invoice with a single service line.
    CreateInvoice { target: u32, amount: Money },
    Payment { target: u32, input: PaymentInput },
    Void { target: u32 },
    Refund { target: u32, input: PaymentInput },
    /// Creates a job with a deposit requirement.
    CreateJob { target: u32, required: Money },
    DepositPayment { target: u32, input: PaymentInput },
}

impl CsvRecord {
    /// Converts the CSV record to an event.
    ///
    /// Returns `None` for unknown event types or missing required fields.
    fn into_event(self) -> Option<Event> {
        let money = || -> Option<Money> {
            let amount = self.amount?;
            let currency: CurrencyCode = self.currency.as_deref()?.parse().ok()?;
            Some(Money::new(amount, currency))
        };
        let method = match self.method.as_deref() {
            Some("cash") => PaymentMethod::Cash,
            Some("bank_transfer") => PaymentMethod::BankTransfer,
            Some("other") => PaymentMethod::Other,
            _ => PaymentMethod::Card,
        };

        match self.event_type.to_lowercase().as_str() {
            "invoice" => Some(Event::CreateInvoice {
                target: self.target,
                amount: money()?,
            }),
            "payment" => Some(Event::Payment {
                target: self.target,
                input: PaymentInput::new(money()?, method, self.key?),
            }),
            "void" => Some(Event::Void {
                target: self.target,
            }),
            "refund" => Some(Event::Refund {
                target: self.target,
                input: PaymentInput::new(money()?, method, self.key?),
            }),
            "job" => Some(Event::CreateJob {
                target: self.target,
                required: money()?,
            }),
            "deposit" => Some(Event::DepositPayment {
                target: self.target,
                input: PaymentInput::new(money()?, method, self.key?),
            }),
            _ => None,
        }
    }
}

/// Map from CSV invoice targets to engine-assigned invoice ids.
type InvoiceAliases = HashMap<u32, InvoiceId>;

fn apply_event(engine: &Engine, invoices: &mut InvoiceAliases, event: Event) {
    let today = Utc::now().date_naive();
    let result = match event {
        Event::CreateInvoice { target, amount } => (|| {
            let currency = amount.currency();
            // Batch invoices bill one party per target; the target doubles
            // as the customer reference.
            let job_id = JobId(target);
            engine.create_job(job_id, PartyId(target), currency)?;
            engine.add_job_billable(&job_id, LineItem::new("Service", 1, amount)?)?;
            engine.start_job(&job_id)?;
            engine.complete_job(&job_id)?;
            let id = engine.create_invoice_from_job(
                &job_id,
                today,
                today + Days::new(30),
                Money::zero(currency),
            )?;
            engine.mark_sent(&id)?;
            invoices.insert(target, id);
            Ok(())
        })(),
        Event::Payment { target, input } => invoices
            .get(&target)
            .ok_or(BillingError::NotFound)
            .and_then(|id| engine.apply_invoice_payment(id, input).map(|_| ())),
        Event::Void { target } => invoices
            .get(&target)
            .ok_or(BillingError::NotFound)
            .and_then(|id| engine.void_invoice(id).map(|_| ())),
        Event::Refund { target, input } => invoices
            .get(&target)
            .ok_or(BillingError::NotFound)
            .and_then(|id| engine.refund_invoice(id, input).map(|_| ())),
        Event::CreateJob { target, required } => {
            let job_id = JobId(target + JOB_TARGET_OFFSET);
            engine
                .create_job(job_id, PartyId(target), required.currency())
                .and_then(|_| engine.set_deposit_required(&job_id, required))
        }
        Event::DepositPayment { target, input } => engine
            .apply_deposit_payment(&JobId(target + JOB_TARGET_OFFSET), input)
            .map(|_| ()),
    };

    if let Err(_e) = result {
        #[cfg(debug_assertions)]
        eprintln!("Skipping event: {}", _e);
    }
}

/// Invoice rows synthesize a backing job per target; standalone job targets
/// live in a disjoint id range so the two event kinds never collide.
const JOB_TARGET_OFFSET: u32 = 1_000_000;

/// Process billing events from a CSV reader.
///
/// Streams rows so arbitrarily large files never load into memory.
/// Malformed rows and rejected events are skipped; rejections are logged in
/// debug builds only.
///
/// # CSV Format
///
/// Expected columns: `type, target, amount, currency, key, method`
/// - `type`: Event type (invoice, payment, void, refund, job, deposit)
/// - `target`: Invoice or job reference chosen by the CSV author (u32)
/// - `amount`: Decimal amount (empty for void)
/// - `currency`: ISO-4217 code (empty for void)
/// - `key`: Idempotency key (payments, refunds, deposits)
/// - `method`: card, cash, bank_transfer, other (defaults to card)
///
/// # Example
///
/// ```csv
/// type,target,amount,currency,key,method
/// invoice,1,120.00,GBP,,
/// payment,1,50.00,GBP,pi_1,card
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn process_events<R: Read>(reader: R) -> Result<(Engine, InvoiceAliases), csv::Error> {
    let engine = Engine::new();
    let mut invoices = InvoiceAliases::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " payment "
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(event) = record.into_event() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid event record");
                    continue;
                };
                apply_event(&engine, &mut invoices, event);
            }
            Err(e) => {
                // Skip malformed rows
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok((engine, invoices))
}

/// One output row; invoices and job deposits share the shape.
#[derive(Debug, Serialize)]
struct ReportRow {
    kind: &'static str,
    target: u32,
    total: Decimal,
    paid: Decimal,
    balance: Decimal,
    status: &'static str,
}

fn invoice_status_label(status: InvoiceStatus) -> &'static str {
    match status {
        InvoiceStatus::Draft => "draft",
        InvoiceStatus::Sent => "sent",
        InvoiceStatus::PartiallyPaid => "partially_paid",
        InvoiceStatus::Paid => "paid",
        InvoiceStatus::Overdue => "overdue",
        InvoiceStatus::Void => "void",
        InvoiceStatus::Refunded => "refunded",
    }
}

fn deposit_status_label(status: DepositStatus) -> &'static str {
    match status {
        DepositStatus::NotRequired => "not_required",
        DepositStatus::Pending => "pending",
        DepositStatus::PartiallyPaid => "partially_paid",
        DepositStatus::Paid => "paid",
    }
}

/// Write invoice and deposit states to a CSV writer.
///
/// # CSV Format
///
/// Columns: `kind, target, total, paid, balance, status`
///
/// # Example
///
/// ```csv
/// kind,target,total,paid,balance,status
/// invoice,1,120.00,50.00,70.00,partially_paid
/// deposit,1,100.00,100.00,0.00,paid
/// ```
pub fn write_report<W: Write>(
    engine: &Engine,
    invoices: &InvoiceAliases,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let mut targets: Vec<_> = invoices.iter().collect();
    targets.sort_by_key(|(target, _)| **target);
    for (target, id) in targets {
        if let Ok(snap) = engine.invoice_snapshot(id) {
            wtr.serialize(ReportRow {
                kind: "invoice",
                target: *target,
                total: snap.total,
                paid: snap.amount_paid,
                balance: snap.balance_due,
                status: invoice_status_label(snap.status),
            })?;
        }
    }

    let mut deposits: Vec<_> = engine
        .jobs()
        .filter(|entry| entry.key().0 >= JOB_TARGET_OFFSET)
        .map(|entry| entry.value().deposit_snapshot())
        .collect();
    deposits.sort_by_key(|snap| snap.job_id.0);
    for snap in deposits {
        wtr.serialize(ReportRow {
            kind: "deposit",
            target: snap.job_id.0 - JOB_TARGET_OFFSET,
            total: snap.required,
            paid: snap.paid,
            balance: snap.outstanding,
            status: deposit_status_label(snap.status),
        })?;
    }

    // Flush to ensure all data is written
    wtr.flush()?;
    Ok(())
}
