//! Pairs successful quotes with the client that requested them.
//!
//! The quoting API does not echo contact fields back, so client details are
//! read from the record carried on the outcome. A record that cannot supply a
//! complete contact block produces a [`CorrelationError`]; there is no
//! fallback contact.

use regex::Regex;
use std::sync::LazyLock;

use crate::errors::CorrelationError;
use crate::models::{
    columns, ClientDetails, ClientOrderRecord, CorrelatedQuote, OrderDetails, QuoteOutcome,
    RestaurantDetails,
};

/// Output of the correlation stage.
#[derive(Debug, Default)]
pub struct Correlation {
    /// One entry per successful quote that could be attributed, in quote order.
    pub items: Vec<CorrelatedQuote>,
    /// Successful quotes that could not be attributed.
    pub errors: Vec<CorrelationError>,
}

/// Correlates every successful quote outcome. Failures are skipped; the
/// pipeline counts them separately.
pub fn correlate(outcomes: &[QuoteOutcome]) -> Correlation {
    let mut correlation = Correlation::default();

    for outcome in outcomes {
        let QuoteOutcome::Success { quote, origin } = outcome else {
            continue;
        };

        match correlate_one(&quote.quote_id, quote.quote_price, quote.currency_code.clone(), origin) {
            Ok(item) => {
                tracing::info!(
                    quote_id = %item.quote_id,
                    client_id = %item.client.client_id,
                    "Correlated quote with client {}",
                    item.client.name
                );
                correlation.items.push(item);
            }
            Err(err) => {
                tracing::error!("Correlation failed: {}", err);
                correlation.errors.push(err);
            }
        }
    }

    correlation
}

fn correlate_one(
    quote_id: &str,
    quote_price: Option<f64>,
    currency: Option<String>,
    origin: &ClientOrderRecord,
) -> Result<CorrelatedQuote, CorrelationError> {
    let client = client_details(quote_id, origin)?;

    let pickup_address_book_id = origin
        .pickup_address_book_id
        .clone()
        .ok_or_else(|| CorrelationError::MissingClientField {
            quote_id: quote_id.to_string(),
            client_id: origin.client_id.clone(),
            field: columns::PICKUP_ADDRESS_BOOK_ID,
        })?;

    Ok(CorrelatedQuote {
        quote_id: quote_id.to_string(),
        quote_price,
        currency,
        client,
        restaurant: RestaurantDetails {
            name: origin.restaurant_name.clone(),
            pickup_address_book_id,
        },
        order: OrderDetails {
            description: origin.order_description.clone(),
            delivery_frequency: origin.delivery_frequency,
            pickup_code: origin.pickup_code.clone(),
            city: origin.city.clone(),
            country: origin.country.clone(),
            postal_code: origin.postal_code.clone(),
        },
    })
}

/// Builds the contact block from the originating record.
pub fn client_details(
    quote_id: &str,
    origin: &ClientOrderRecord,
) -> Result<ClientDetails, CorrelationError> {
    let require = |value: &Option<String>, field: &'static str| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CorrelationError::MissingClientField {
                quote_id: quote_id.to_string(),
                client_id: origin.client_id.clone(),
                field,
            })
    };

    let details = ClientDetails {
        client_id: origin.client_id.clone(),
        name: require(&origin.client_name, columns::CLIENT_NAME)?,
        phone: require(&origin.client_phone, columns::CLIENT_PHONE)?,
        email: require(&origin.client_email, columns::CLIENT_EMAIL)?,
    };

    if !looks_like_email(&details.email) {
        // The API has the final say on contact validity
        tracing::warn!(
            client_id = %details.client_id,
            "Client email {} looks malformed",
            details.email
        );
    }

    Ok(details)
}

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("email pattern is a valid regex")
});

/// Simplified RFC 5322 shape check: `local@domain.tld`.
pub fn looks_like_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}
