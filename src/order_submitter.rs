use chrono::{DateTime, Utc};

use crate::errors::PipelineError;
use crate::laas_models::{Contact, OrderPayload, PackageDetails};
use crate::logistics_client::LaasClient;
use crate::models::{CorrelatedQuote, OrderOutcome};
use crate::token_cache::Credential;

const CLIENT_SEGMENT_MAX_CHARS: usize = 16;
const FALLBACK_DESCRIPTION: &str = "Food delivery order";

/// Generates pickup order codes that are unique within a run.
///
/// Codes look like `ORD-CLIENT001-1767254400-003`: the sanitized client id, the
/// run start as a unix timestamp, and a sequence number that increases with
/// every code handed out. Re-running the same day yields different codes.
#[derive(Debug)]
pub struct OrderCodeGenerator {
    run_stamp: i64,
    seq: u32,
}

impl OrderCodeGenerator {
    pub fn new(run_started_at: DateTime<Utc>) -> Self {
        Self {
            run_stamp: run_started_at.timestamp(),
            seq: 0,
        }
    }

    pub fn next_code(&mut self, client_id: &str) -> String {
        self.seq += 1;
        format!(
            "ORD-{}-{}-{:03}",
            sanitize_client_id(client_id),
            self.run_stamp,
            self.seq
        )
    }
}

fn sanitize_client_id(client_id: &str) -> String {
    let segment: String = client_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(CLIENT_SEGMENT_MAX_CHARS)
        .collect();
    if segment.is_empty() {
        "X".to_string()
    } else {
        segment
    }
}

/// Builds the order body for a correlated quote.
///
/// The contact block is copied verbatim from the client details; nothing here
/// can substitute a default contact.
pub fn build_order_payload(quote: &CorrelatedQuote, pickup_order_code: String) -> OrderPayload {
    let description = quote
        .order
        .description
        .clone()
        .or_else(|| quote.restaurant.name.clone())
        .unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string());

    OrderPayload {
        contact: Contact {
            name: quote.client.name.clone(),
            phone: quote.client.phone.clone(),
            email: quote.client.email.clone(),
        },
        pickup_order_code,
        package_details: PackageDetails::food(description),
    }
}

/// Submits one order and converts the result into an outcome. Never fails:
/// rejections and transport errors become [`OrderOutcome::Failure`].
pub async fn submit_order(
    client: &LaasClient,
    credential: &Credential,
    quote: &CorrelatedQuote,
    pickup_order_code: String,
) -> OrderOutcome {
    let payload = build_order_payload(quote, pickup_order_code);

    let result = client
        .create_order(credential, &quote.quote_id, &payload)
        .await;
    match result {
        Ok(response) => {
            let outcome =
                OrderOutcome::placed(quote, payload.pickup_order_code, &response, Utc::now());
            if let OrderOutcome::Success(placed) = &outcome {
                tracing::info!(
                    client_id = %placed.client_id,
                    quote_id = %placed.quote_id,
                    order_id = ?placed.order_id,
                    "✓ Order placed for {}",
                    placed.client_name
                );
            }
            outcome
        }
        Err(err) => {
            tracing::warn!(
                client_id = %quote.client.client_id,
                quote_id = %quote.quote_id,
                "Order failed: {}",
                err
            );
            OrderOutcome::failed(quote, payload.pickup_order_code, &err, Utc::now())
        }
    }
}

/// Outcome recorded for a quote whose order could not be attempted at all.
pub fn not_submitted(
    quote: &CorrelatedQuote,
    pickup_order_code: String,
    err: &PipelineError,
) -> OrderOutcome {
    OrderOutcome::failed(quote, pickup_order_code, err, Utc::now())
}
