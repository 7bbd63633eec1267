use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

use crate::errors::ValidationError;
use crate::laas_models::{AddressBookRef, Coordinates, DeliveryAddress, PickupDetails, QuotePayload};
use crate::models::{columns, ClientOrderRecord};

/// Validates a record and shapes it for the quoting endpoint.
///
/// Checks run in order: required fields present, coordinates numeric, pickup
/// time a UTC instant, pickup time strictly after `now`. `now` is the run start,
/// so every record in a run is judged against the same instant.
pub fn build(
    record: &Arc<ClientOrderRecord>,
    now: DateTime<Utc>,
) -> Result<QuotePayload, ValidationError> {
    let address_book_id = required(&record.pickup_address_book_id, columns::PICKUP_ADDRESS_BOOK_ID)?;
    let pickup_raw = required(&record.pickup_time_utc, columns::PICKUP_TIME)?;
    let raw_address = required(&record.delivery_raw_address, columns::DELIVERY_RAW_ADDRESS)?;
    let latitude_raw = required(&record.delivery_latitude, columns::DELIVERY_LATITUDE)?;
    let longitude_raw = required(&record.delivery_longitude, columns::DELIVERY_LONGITUDE)?;

    let latitude = coordinate(latitude_raw, columns::DELIVERY_LATITUDE)?;
    let longitude = coordinate(longitude_raw, columns::DELIVERY_LONGITUDE)?;

    let pickup = parse_pickup_time(pickup_raw)?;
    if pickup <= now {
        return Err(ValidationError::StalePickupTime { pickup, now });
    }

    Ok(QuotePayload {
        pickup_details: PickupDetails {
            address_book: AddressBookRef {
                id: address_book_id.to_string(),
            },
            pickup_time: pickup.to_rfc3339_opts(SecondsFormat::Secs, true),
        },
        delivery_address: DeliveryAddress {
            raw_address: raw_address.to_string(),
            coordinates: Coordinates {
                latitude,
                longitude,
            },
            details: record.delivery_details.clone().unwrap_or_default(),
        },
        origin: Arc::clone(record),
    })
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField { field })
}

fn coordinate(raw: &str, field: &'static str) -> Result<f64, ValidationError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::NonNumericCoordinate {
            field,
            value: raw.to_string(),
        })
}

/// Parses an RFC 3339 timestamp and insists on a zero UTC offset.
pub fn parse_pickup_time(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let malformed = |reason: String| ValidationError::MalformedPickupTime {
        value: raw.to_string(),
        reason,
    };
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| malformed(e.to_string()))?;
    if parsed.offset().local_minus_utc() != 0 {
        return Err(malformed(format!("offset {} is not UTC", parsed.offset())));
    }
    Ok(parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryFrequency;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap()
    }

    fn record() -> ClientOrderRecord {
        ClientOrderRecord {
            row: 0,
            client_id: "CLIENT_001".to_string(),
            client_name: Some("Ana Petrova".to_string()),
            client_phone: Some("+359886612261".to_string()),
            client_email: Some("ana@example.com".to_string()),
            delivery_frequency: DeliveryFrequency::FiveDays,
            pickup_time_utc: Some("2030-01-01T16:00:00Z".to_string()),
            pickup_address_book_id: Some("cc97d6fb-bbf3-45b1-af21-29dfd29b68fc".to_string()),
            delivery_raw_address: Some("Nishava St 1, Sofia".to_string()),
            delivery_latitude: Some("42.673758".to_string()),
            delivery_longitude: Some("23.298064".to_string()),
            delivery_details: Some("Floor 1".to_string()),
            restaurant_name: None,
            order_description: Some("1 soup and 1 main".to_string()),
            pickup_code: None,
            city: None,
            country: None,
            postal_code: None,
        }
    }

    #[test]
    fn test_builds_wire_payload_with_back_reference() {
        let origin = Arc::new(record());
        let payload = build(&origin, now()).unwrap();

        assert!(Arc::ptr_eq(&payload.origin, &origin));
        assert_eq!(payload.pickup_details.pickup_time, "2030-01-01T16:00:00Z");
        assert_eq!(payload.delivery_address.coordinates.latitude, 42.673758);

        let wire = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            wire["pickupDetails"]["addressBook"]["id"],
            "cc97d6fb-bbf3-45b1-af21-29dfd29b68fc"
        );
        assert_eq!(wire["deliveryAddress"]["rawAddress"], "Nishava St 1, Sofia");
        assert_eq!(wire["deliveryAddress"]["details"], "Floor 1");
        assert!(wire.get("origin").is_none());
    }

    #[test]
    fn test_missing_latitude_is_field_specific() {
        let mut r = record();
        r.delivery_latitude = None;
        let err = build(&Arc::new(r), now()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                field: "deliveryLatitude"
            }
        );
    }

    #[test]
    fn test_non_numeric_longitude() {
        let mut r = record();
        r.delivery_longitude = Some("east-ish".to_string());
        let err = build(&Arc::new(r), now()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonNumericCoordinate {
                field: "deliveryLongitude",
                value: "east-ish".to_string()
            }
        );
    }

    #[test]
    fn test_stale_pickup_is_distinct_from_malformed() {
        let mut stale = record();
        stale.pickup_time_utc = Some("2029-12-31T16:00:00Z".to_string());
        assert!(matches!(
            build(&Arc::new(stale), now()).unwrap_err(),
            ValidationError::StalePickupTime { .. }
        ));

        let mut malformed = record();
        malformed.pickup_time_utc = Some("tomorrow at four".to_string());
        assert!(matches!(
            build(&Arc::new(malformed), now()).unwrap_err(),
            ValidationError::MalformedPickupTime { .. }
        ));
    }

    #[test]
    fn test_pickup_exactly_now_is_stale() {
        let mut r = record();
        r.pickup_time_utc = Some(now().to_rfc3339_opts(SecondsFormat::Secs, true));
        assert!(matches!(
            build(&Arc::new(r), now()).unwrap_err(),
            ValidationError::StalePickupTime { .. }
        ));

        let mut later = record();
        later.pickup_time_utc =
            Some((now() + Duration::seconds(1)).to_rfc3339_opts(SecondsFormat::Secs, true));
        assert!(build(&Arc::new(later), now()).is_ok());
    }

    #[test]
    fn test_non_utc_offset_is_malformed() {
        let mut r = record();
        r.pickup_time_utc = Some("2030-01-01T18:00:00+02:00".to_string());
        assert!(matches!(
            build(&Arc::new(r), now()).unwrap_err(),
            ValidationError::MalformedPickupTime { .. }
        ));
    }
}
