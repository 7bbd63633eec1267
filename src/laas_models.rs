//! Request and response bodies of the logistics (LaaS) API.
//!
//! Responses keep unknown fields in `extra` so nothing the API sends is lost
//! when outcomes are persisted.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::models::ClientOrderRecord;

// ============ Authentication ============

/// Client-credentials exchange body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

impl<'a> TokenRequest<'a> {
    pub fn client_credentials(client_id: &'a str, client_secret: &'a str) -> Self {
        Self {
            grant_type: "client_credentials",
            client_id,
            client_secret,
        }
    }
}

/// Token endpoint response. Both camelCase and snake_case spellings are seen in the wild.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    pub access_token: String,
    #[serde(rename = "expiresIn", alias = "expires_in", default)]
    pub expires_in: Option<i64>,
}

// ============ Quotes ============

/// Body for `POST /v2/laas/quotes`.
///
/// `origin` is not part of the wire format. It carries the record the payload
/// was built from so the quote can be correlated without re-reading the source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotePayload {
    pub pickup_details: PickupDetails,
    pub delivery_address: DeliveryAddress,
    #[serde(skip)]
    pub origin: Arc<ClientOrderRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupDetails {
    pub address_book: AddressBookRef,
    /// ISO-8601 UTC, `Z`-suffixed.
    pub pickup_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressBookRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub raw_address: String,
    pub coordinates: Coordinates,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Successful quote response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub quote_id: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quote_price: Option<f64>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============ Orders ============

/// Body for `POST /v2/laas/quotes/{quoteId}/parcels`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub contact: Contact,
    pub pickup_order_code: String,
    pub package_details: PackageDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDetails {
    pub content_type: &'static str,
    pub description: String,
    pub parcel_value: Option<f64>,
    pub weight: Option<f64>,
    pub products: Vec<Value>,
}

impl PackageDetails {
    /// Restaurant deliveries are always food parcels.
    pub fn food(description: impl Into<String>) -> Self {
        Self {
            content_type: "FOOD",
            description: description.into(),
            parcel_value: None,
            weight: None,
            products: Vec::new(),
        }
    }
}

/// Successful order response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub order_code: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub quote: Option<OrderQuote>,
    #[serde(default)]
    pub cancellable: Option<bool>,
    #[serde(default)]
    pub estimated_time_of_arrival: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderResponse {
    /// Order/tracking identifier: `trackingNumber`, then `orderCode`, then `id`.
    pub fn order_id(&self) -> Option<String> {
        self.tracking_number
            .clone()
            .or_else(|| self.order_code.clone())
            .or_else(|| match &self.id {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .filter(|id| !id.trim().is_empty())
    }

    pub fn state(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.state.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuote {
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quote_price: Option<f64>,
    #[serde(default)]
    pub currency_code: Option<String>,
}

/// Accepts a JSON number, a numeric string, or null.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
