use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::errors::{CorrelationError, PipelineError, ValidationError};
use crate::laas_models::{OrderResponse, QuoteResponse};

/// Column names of the order sheet export.
pub mod columns {
    pub const CLIENT_ID: &str = "client_id";
    pub const CLIENT_NAME: &str = "client_name";
    pub const CLIENT_PHONE: &str = "client_phone";
    pub const CLIENT_EMAIL: &str = "client_email";
    pub const DELIVERY_FREQUENCY: &str = "deliveryFrequency";
    pub const PICKUP_TIME: &str = "pickup_time_utc";
    pub const PICKUP_ADDRESS_BOOK_ID: &str = "pickupAddressBookId";
    pub const DELIVERY_RAW_ADDRESS: &str = "deliveryRawAddress";
    pub const DELIVERY_LATITUDE: &str = "deliveryLatitude";
    /// Misspelled header found in older sheet exports.
    pub const DELIVERY_LATITUDE_LEGACY: &str = "deliveryLattitude";
    pub const DELIVERY_LONGITUDE: &str = "deliveryLongitude";
    pub const DELIVERY_DETAILS: &str = "deliveryDetails";
    pub const RESTAURANT_NAME: &str = "restaurant_name";
    pub const ORDER_DESCRIPTION: &str = "order_id";
    pub const PICKUP_CODE: &str = "pickup_code";
    pub const CITY: &str = "ADDRESS_CITY_NAME";
    pub const COUNTRY: &str = "ADDRESS_COUNTRY";
    pub const POSTAL_CODE: &str = "Address_postal_code";
}

// ============ Source records ============

/// How many weekdays a client receives deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryFrequency {
    /// Monday, Wednesday, Friday.
    ThreeDays,
    /// Monday to Friday.
    FiveDays,
}

impl DeliveryFrequency {
    /// Parses a sheet cell. Integer-valued floats (`"3.0"`) are accepted since
    /// spreadsheet exports often render whole numbers that way.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidFrequency {
            value: raw.to_string(),
        };
        let number: f64 = raw.trim().parse().map_err(|_| invalid())?;
        if number == 3.0 {
            Ok(Self::ThreeDays)
        } else if number == 5.0 {
            Ok(Self::FiveDays)
        } else {
            Err(invalid())
        }
    }

    pub fn days_per_week(self) -> u8 {
        match self {
            Self::ThreeDays => 3,
            Self::FiveDays => 5,
        }
    }
}

impl fmt::Display for DeliveryFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.days_per_week())
    }
}

/// A typed row of the order sheet.
///
/// Identity and schedule are checked by [`ClientOrderRecord::from_raw`]. The
/// quoting fields stay as raw text here and are validated by the quote builder,
/// so a row with a bad coordinate is still attributable to its client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientOrderRecord {
    /// Zero-based position in the source.
    pub row: usize,
    pub client_id: String,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub delivery_frequency: DeliveryFrequency,
    pub pickup_time_utc: Option<String>,
    pub pickup_address_book_id: Option<String>,
    pub delivery_raw_address: Option<String>,
    pub delivery_latitude: Option<String>,
    pub delivery_longitude: Option<String>,
    pub delivery_details: Option<String>,
    pub restaurant_name: Option<String>,
    pub order_description: Option<String>,
    pub pickup_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl ClientOrderRecord {
    /// The only path from a raw source row to a typed record.
    pub fn from_raw(row: usize, raw: &Value) -> Result<Self, ValidationError> {
        let map = raw
            .as_object()
            .ok_or(ValidationError::MalformedRow { row })?;
        let text = |key: &str| map.get(key).and_then(cell_to_string);

        let client_id = text(columns::CLIENT_ID).ok_or(ValidationError::MissingField {
            field: columns::CLIENT_ID,
        })?;
        let frequency_raw =
            text(columns::DELIVERY_FREQUENCY).ok_or(ValidationError::MissingField {
                field: columns::DELIVERY_FREQUENCY,
            })?;
        let delivery_frequency = DeliveryFrequency::parse(&frequency_raw)?;

        Ok(Self {
            row,
            client_id,
            client_name: text(columns::CLIENT_NAME),
            client_phone: text(columns::CLIENT_PHONE),
            client_email: text(columns::CLIENT_EMAIL),
            delivery_frequency,
            pickup_time_utc: text(columns::PICKUP_TIME),
            pickup_address_book_id: text(columns::PICKUP_ADDRESS_BOOK_ID),
            delivery_raw_address: text(columns::DELIVERY_RAW_ADDRESS),
            delivery_latitude: text(columns::DELIVERY_LATITUDE)
                .or_else(|| text(columns::DELIVERY_LATITUDE_LEGACY)),
            delivery_longitude: text(columns::DELIVERY_LONGITUDE),
            delivery_details: text(columns::DELIVERY_DETAILS),
            restaurant_name: text(columns::RESTAURANT_NAME),
            order_description: text(columns::ORDER_DESCRIPTION),
            pickup_code: text(columns::PICKUP_CODE),
            city: text(columns::CITY),
            country: text(columns::COUNTRY),
            postal_code: text(columns::POSTAL_CODE),
        })
    }

    /// Name for log lines. Not for payloads.
    pub fn display_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or(&self.client_id)
    }
}

/// Normalizes a spreadsheet cell: strings are trimmed, numbers and booleans are
/// stringified, null and blank cells are absent.
pub fn cell_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ============ Correlated details ============

/// Contact block for an order. Every field is required and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientDetails {
    pub client_id: String,
    pub name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestaurantDetails {
    pub name: Option<String>,
    pub pickup_address_book_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub description: Option<String>,
    pub delivery_frequency: DeliveryFrequency,
    pub pickup_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

/// A successful quote paired with the metadata of the row that produced it.
#[derive(Debug, Clone)]
pub struct CorrelatedQuote {
    pub quote_id: String,
    pub quote_price: Option<f64>,
    pub currency: Option<String>,
    pub client: ClientDetails,
    pub restaurant: RestaurantDetails,
    pub order: OrderDetails,
}

// ============ Outcomes ============

/// Why a submission did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    ApiRejection,
    Auth,
    Other,
}

impl From<&PipelineError> for FailureKind {
    fn from(err: &PipelineError) -> Self {
        match err.root() {
            PipelineError::Transport(_) => FailureKind::Transport,
            PipelineError::ApiRejection { .. } => FailureKind::ApiRejection,
            PipelineError::Auth { .. } => FailureKind::Auth,
            _ => FailureKind::Other,
        }
    }
}

/// Result of one quote submission. Consumed by the correlator.
#[derive(Debug, Clone)]
pub enum QuoteOutcome {
    Success {
        quote: QuoteResponse,
        origin: Arc<ClientOrderRecord>,
    },
    Failure {
        reason: String,
        kind: FailureKind,
        origin: Arc<ClientOrderRecord>,
    },
}

impl QuoteOutcome {
    pub fn failed(err: &PipelineError, origin: Arc<ClientOrderRecord>) -> Self {
        QuoteOutcome::Failure {
            reason: err.to_string(),
            kind: FailureKind::from(err),
            origin,
        }
    }
}

/// An order the API accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedOrder {
    pub client_id: String,
    pub client_name: String,
    pub quote_id: String,
    /// Tracking id from the response; `None` when the API returned none.
    pub order_id: Option<String>,
    pub pickup_code: String,
    pub state: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub cancellable: bool,
    pub completed_at: DateTime<Utc>,
}

/// An order submission that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedOrder {
    pub client_id: String,
    pub client_name: String,
    pub quote_id: String,
    pub pickup_code: String,
    pub kind: FailureKind,
    pub reason: String,
    pub completed_at: DateTime<Utc>,
}

/// Result of one order submission, attributed to its originating client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrderOutcome {
    Success(PlacedOrder),
    Failure(FailedOrder),
}

impl OrderOutcome {
    /// Builds a success outcome, reading price from the order response and
    /// falling back to the quote.
    pub fn placed(
        quote: &CorrelatedQuote,
        pickup_code: String,
        response: &OrderResponse,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let order_quote = response.quote.as_ref();
        OrderOutcome::Success(PlacedOrder {
            client_id: quote.client.client_id.clone(),
            client_name: quote.client.name.clone(),
            quote_id: quote.quote_id.clone(),
            order_id: response.order_id(),
            pickup_code,
            state: response.state().map(str::to_string),
            price: order_quote
                .and_then(|q| q.quote_price)
                .or(quote.quote_price),
            currency: order_quote
                .and_then(|q| q.currency_code.clone())
                .or_else(|| quote.currency.clone()),
            cancellable: response.cancellable.unwrap_or(false),
            completed_at,
        })
    }

    pub fn failed(
        quote: &CorrelatedQuote,
        pickup_code: String,
        err: &PipelineError,
        completed_at: DateTime<Utc>,
    ) -> Self {
        OrderOutcome::Failure(FailedOrder {
            client_id: quote.client.client_id.clone(),
            client_name: quote.client.name.clone(),
            quote_id: quote.quote_id.clone(),
            pickup_code,
            kind: FailureKind::from(err),
            reason: err.to_string(),
            completed_at,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OrderOutcome::Success(_))
    }

    pub fn client_id(&self) -> &str {
        match self {
            OrderOutcome::Success(o) => &o.client_id,
            OrderOutcome::Failure(o) => &o.client_id,
        }
    }
}

/// Flat record handed to the result sink. Field names are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLogEntry {
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    pub client_name: String,
    pub quote_id: String,
    pub order_id: Option<String>,
    pub status: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub pickup_order_code: String,
    pub reason: Option<String>,
}

impl From<&OrderOutcome> for OrderLogEntry {
    fn from(outcome: &OrderOutcome) -> Self {
        match outcome {
            OrderOutcome::Success(o) => OrderLogEntry {
                timestamp: o.completed_at,
                client_id: o.client_id.clone(),
                client_name: o.client_name.clone(),
                quote_id: o.quote_id.clone(),
                order_id: o.order_id.clone(),
                status: o.state.clone().unwrap_or_else(|| "CREATED".to_string()),
                price: o.price,
                currency: o.currency.clone(),
                pickup_order_code: o.pickup_code.clone(),
                reason: None,
            },
            OrderOutcome::Failure(o) => OrderLogEntry {
                timestamp: o.completed_at,
                client_id: o.client_id.clone(),
                client_name: o.client_name.clone(),
                quote_id: o.quote_id.clone(),
                order_id: None,
                status: "FAILED".to_string(),
                price: None,
                currency: None,
                pickup_order_code: o.pickup_code.clone(),
                reason: Some(o.reason.clone()),
            },
        }
    }
}

// ============ Run summary ============

/// A record excluded before submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRejection {
    pub row: usize,
    pub client_id: Option<String>,
    pub field: Option<&'static str>,
    pub reason: String,
}

impl RecordRejection {
    pub fn new(row: usize, client_id: Option<String>, err: &ValidationError) -> Self {
        Self {
            row,
            client_id,
            field: err.field(),
            reason: err.to_string(),
        }
    }
}

/// A quote failure, kept for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteFailure {
    pub client_id: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// A successful quote that could not be paired with a complete client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationFailure {
    pub client_id: String,
    pub quote_id: String,
    pub field: &'static str,
    pub reason: String,
}

impl From<&CorrelationError> for CorrelationFailure {
    fn from(err: &CorrelationError) -> Self {
        match err {
            CorrelationError::MissingClientField {
                quote_id,
                client_id,
                field,
            } => Self {
                client_id: client_id.clone(),
                quote_id: quote_id.clone(),
                field,
                reason: err.to_string(),
            },
        }
    }
}

/// Aggregate result of one pipeline invocation. Built once at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_weekday")]
    pub weekday: Weekday,
    pub dry_run: bool,
    /// Set when a fatal precondition stopped the run before submission.
    pub aborted: Option<String>,
    pub total_considered: usize,
    pub eligible: usize,
    pub rejected: Vec<RecordRejection>,
    pub quotes_succeeded: usize,
    pub quotes_failed: usize,
    pub quote_failures: Vec<QuoteFailure>,
    pub correlation_failures: usize,
    pub correlation_errors: Vec<CorrelationFailure>,
    pub orders_succeeded: usize,
    pub orders_failed: usize,
    pub outcomes: Vec<OrderOutcome>,
}

fn serialize_weekday<S: serde::Serializer>(day: &Weekday, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&day.to_string())
}

impl RunSummary {
    /// Empty summary for a run starting at `started_at`.
    pub fn start(started_at: DateTime<Utc>, weekday: Weekday, dry_run: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            started_at,
            finished_at: started_at,
            weekday,
            dry_run,
            aborted: None,
            total_considered: 0,
            eligible: 0,
            rejected: Vec::new(),
            quotes_succeeded: 0,
            quotes_failed: 0,
            quote_failures: Vec::new(),
            correlation_failures: 0,
            correlation_errors: Vec::new(),
            orders_succeeded: 0,
            orders_failed: 0,
            outcomes: Vec::new(),
        }
    }

    /// Stamps the finish time. The summary is not modified afterwards.
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn order_submissions(&self) -> usize {
        self.orders_succeeded + self.orders_failed
    }

    pub fn quote_submissions(&self) -> usize {
        self.quotes_succeeded + self.quotes_failed
    }

    /// Percentage of order submissions that succeeded.
    pub fn order_success_rate(&self) -> f64 {
        percentage(self.orders_succeeded, self.order_submissions())
    }

    pub fn quote_success_rate(&self) -> f64 {
        percentage(self.quotes_succeeded, self.quote_submissions())
    }

    /// Rows handed to the result sink.
    pub fn log_entries(&self) -> Vec<OrderLogEntry> {
        self.outcomes.iter().map(OrderLogEntry::from).collect()
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
