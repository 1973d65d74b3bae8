//! Simple REST API server example for the billing engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /parties` - Register a party (lead, customer, staff)
//! - `POST /invoices` - Create a draft invoice from a stock basket
//! - `GET /invoices/:id` - Get an invoice statement
//! - `PUT /invoices/:id/status` - Transition an invoice (sent, void)
//! - `POST /invoices/:id/payments` - Apply a payment confirmation
//! - `POST /invoices/:id/refunds` - Refund a settled invoice
//! - `POST /jobs/:id/deposit-payments` - Apply a deposit payment to a job
//! - `GET /jobs/:id/deposit` - Get a job's deposit sub-ledger
//!
//! ## Example Usage
//!
//! ```bash
//! # Create an invoice from the seeded stock (customer 1 is pre-registered)
//! curl -X POST http://localhost:3000/invoices \
//!   -H "Content-Type: application/json" \
//!   -d '{"customer_id": 1, "basket": [{"item_id": 1, "quantity": 2}], "due_in_days": 30}'
//!
//! # Send it
//! curl -X PUT http://localhost:3000/invoices/1/status \
//!   -H "Content-Type: application/json" \
//!   -d '{"status": "sent"}'
//!
//! # Apply a payment confirmation (retrying with the same key is a no-op)
//! curl -X POST http://localhost:3000/invoices/1/payments \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": "50.00", "currency": "GBP", "key": "pi_123", "method": "card"}'
//!
//! # Get the statement
//! curl http://localhost:3000/invoices/1
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use billing_engine_rs::{
    BillingError, CurrencyCode, DepositSnapshot, Engine, InvoiceId, InvoiceSnapshot, JobId,
    Money, Party, PartyId, PaymentInput, PaymentMethod, StockItem, StockItemId,
};
use chrono::{Days, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

/// Request body for creating an invoice from a stock basket.
///
/// ```json
/// {"customer_id": 1, "basket": [{"item_id": 1, "quantity": 2}], "due_in_days": 30}
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: u32,
    pub basket: Vec<BasketLine>,
    pub due_in_days: u64,
    /// Tax amount in the basket currency; defaults to zero.
    pub tax_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct BasketLine {
    pub item_id: u32,
    pub quantity: u32,
}

/// Request body for invoice status transitions. Only the explicit
/// lifecycle moves are accepted; money states are derived, never set.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusRequest {
    Sent,
    Void,
}

/// Request body for payments, refunds, and deposit payments.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub currency: CurrencyCode,
    /// Idempotency key; retries with the same key apply at most once.
    pub key: String,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
}

impl PaymentRequest {
    fn into_payment_input(self) -> PaymentInput {
        let mut input = PaymentInput::new(
            Money::new(self.amount, self.currency),
            self.method.unwrap_or(PaymentMethod::Card),
            self.key,
        );
        input.external_reference = self.reference;
        input
    }
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the billing engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `BillingError` into HTTP responses.
pub struct AppError(BillingError);

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            BillingError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            BillingError::InvalidState => (StatusCode::CONFLICT, "INVALID_STATE"),
            BillingError::InvalidTransition => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            BillingError::DuplicatePayment => (StatusCode::CONFLICT, "DUPLICATE_PAYMENT"),
            BillingError::CurrencyMismatch { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CURRENCY_MISMATCH")
            }
            BillingError::InvalidAmount => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_AMOUNT"),
            BillingError::InsufficientStock => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_STOCK")
            }
            BillingError::JobNotInvoiceable => {
                (StatusCode::UNPROCESSABLE_ENTITY, "JOB_NOT_INVOICEABLE")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /parties - Register a party.
async fn register_party(
    State(state): State<AppState>,
    Json(party): Json<Party>,
) -> StatusCode {
    state.engine.register_party(party);
    StatusCode::CREATED
}

/// POST /invoices - Create a draft invoice from a stock basket.
async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceSnapshot>), AppError> {
    let basket: Vec<(StockItemId, u32)> = request
        .basket
        .iter()
        .map(|line| (StockItemId(line.item_id), line.quantity))
        .collect();

    // Tax is stated in the basket currency; a mismatch inside the engine
    // surfaces as CURRENCY_MISMATCH. The basket currency is only known
    // after reservation, so zero tax uses the first item's currency here.
    let currency = basket
        .first()
        .and_then(|&(id, _)| state.engine.stock().unit_price(id))
        .map(|price| price.currency())
        .unwrap_or(CurrencyCode::GBP);
    let tax = Money::new(request.tax_amount.unwrap_or(Decimal::ZERO), currency);

    let today = Utc::now().date_naive();
    let id = state.engine.create_invoice_from_basket(
        PartyId(request.customer_id),
        &basket,
        today,
        today + Days::new(request.due_in_days),
        tax,
    )?;
    let snapshot = state.engine.invoice_snapshot(&id)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /invoices/:id - Get an invoice statement.
async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<InvoiceSnapshot>, AppError> {
    let snapshot = state.engine.invoice_snapshot(&InvoiceId(id))?;
    Ok(Json(snapshot))
}

/// PUT /invoices/:id/status - Explicit lifecycle transition.
async fn set_invoice_status(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<InvoiceSnapshot>, AppError> {
    let id = InvoiceId(id);
    let snapshot = match request {
        StatusRequest::Sent => state.engine.mark_sent(&id)?,
        StatusRequest::Void => state.engine.void_invoice(&id)?,
    };
    Ok(Json(snapshot))
}

/// POST /invoices/:id/payments - Apply a payment confirmation.
async fn apply_payment(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<InvoiceSnapshot>, AppError> {
    let snapshot = state
        .engine
        .apply_invoice_payment(&InvoiceId(id), request.into_payment_input())?;
    Ok(Json(snapshot))
}

/// POST /invoices/:id/refunds - Refund a settled invoice.
async fn refund_invoice(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<InvoiceSnapshot>, AppError> {
    let snapshot = state
        .engine
        .refund_invoice(&InvoiceId(id), request.into_payment_input())?;
    Ok(Json(snapshot))
}

/// POST /jobs/:id/deposit-payments - Apply a deposit payment.
async fn apply_deposit_payment(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<DepositSnapshot>, AppError> {
    let snapshot = state
        .engine
        .apply_deposit_payment(&JobId(id), request.into_payment_input())?;
    Ok(Json(snapshot))
}

/// GET /jobs/:id/deposit - Get a job's deposit sub-ledger.
async fn get_deposit(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<DepositSnapshot>, AppError> {
    let snapshot = state.engine.deposit_snapshot(&JobId(id))?;
    Ok(Json(snapshot))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/parties", post(register_party))
        .route("/invoices", post(create_invoice))
        .route("/invoices/{id}", get(get_invoice))
        .route("/invoices/{id}/status", put(set_invoice_status))
        .route("/invoices/{id}/payments", post(apply_payment))
        .route("/invoices/{id}/refunds", post(refund_invoice))
        .route("/jobs/{id}/deposit-payments", post(apply_deposit_payment))
        .route("/jobs/{id}/deposit", get(get_deposit))
        .with_state(state)
}

// === Main ===

/// Seeds a customer, a job with a deposit requirement, and some stock so the
/// demo is usable straight away.
fn seed(engine: &Engine) {
    engine.register_party(Party::Customer {
        id: PartyId(1),
        name: "Avery Plumbing Ltd".to_string(),
        contact_email: Some("accounts@averyplumbing.example".to_string()),
        billing_address: Some("12 Canal Street, Manchester".to_string()),
    });
    engine.add_stock_item(StockItem {
        id: StockItemId(1),
        name: "15mm copper pipe (3m)".to_string(),
        unit_price: Money::new(dec!(8.40), CurrencyCode::GBP),
        quantity_on_hand: 100,
    });
    engine.add_stock_item(StockItem {
        id: StockItemId(2),
        name: "Combi boiler service kit".to_string(),
        unit_price: Money::new(dec!(42.00), CurrencyCode::GBP),
        quantity_on_hand: 10,
    });
    // A scheduled job awaiting its deposit.
    if engine
        .create_job(JobId(1), PartyId(1), CurrencyCode::GBP)
        .is_ok()
    {
        let _ = engine.set_deposit_required(&JobId(1), Money::new(dec!(100.00), CurrencyCode::GBP));
    }
}

#[tokio::main]
async fn main() {
    let state = AppState {
        engine: Arc::new(Engine::new()),
    };
    seed(&state.engine);

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Billing API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /parties                    - Register a party");
    println!("  POST /invoices                   - Create an invoice from stock");
    println!("  GET  /invoices/:id               - Get an invoice statement");
    println!("  PUT  /invoices/:id/status        - Transition an invoice");
    println!("  POST /invoices/:id/payments      - Apply a payment");
    println!("  POST /invoices/:id/refunds       - Refund a settled invoice");
    println!("  POST /jobs/:id/deposit-payments  - Apply a deposit payment");
    println!("  GET  /jobs/:id/deposit           - Get a deposit sub-ledger");

    axum::serve(listener, app).await.unwrap();
}
