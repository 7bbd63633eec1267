/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use chrono::{TimeZone, Utc, Weekday};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use laas_dispatch::batch::BatchExecutor;
use laas_dispatch::eligibility::is_eligible;
use laas_dispatch::models::{ClientOrderRecord, DeliveryFrequency};
use laas_dispatch::order_submitter::OrderCodeGenerator;
use laas_dispatch::quote_builder;
use laas_dispatch::token_cache::redact_secrets;

fn any_frequency() -> impl Strategy<Value = DeliveryFrequency> {
    prop_oneof![
        Just(DeliveryFrequency::ThreeDays),
        Just(DeliveryFrequency::FiveDays)
    ]
}

fn any_weekday() -> impl Strategy<Value = Weekday> {
    (0u8..7).prop_map(|n| match n {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    })
}

// Property: schedule invariants
proptest! {
    #[test]
    fn weekends_are_never_eligible(frequency in any_frequency()) {
        prop_assert!(!is_eligible(frequency, Weekday::Sat));
        prop_assert!(!is_eligible(frequency, Weekday::Sun));
    }

    #[test]
    fn three_day_schedule_is_subset_of_five_day(weekday in any_weekday()) {
        if is_eligible(DeliveryFrequency::ThreeDays, weekday) {
            prop_assert!(is_eligible(DeliveryFrequency::FiveDays, weekday));
        }
    }
}

// Property: record typing and quote validation never panic
proptest! {
    #[test]
    fn validation_never_panics(
        client_id in "\\PC*",
        frequency in "\\PC*",
        pickup in "\\PC*",
        latitude in "\\PC*",
        longitude in "\\PC*",
        address in "\\PC*",
    ) {
        let raw = json!({
            "client_id": client_id,
            "deliveryFrequency": frequency,
            "pickup_time_utc": pickup,
            "pickupAddressBookId": "ab-1",
            "deliveryRawAddress": address,
            "deliveryLatitude": latitude,
            "deliveryLongitude": longitude,
        });
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        if let Ok(record) = ClientOrderRecord::from_raw(0, &raw) {
            let _ = quote_builder::build(&Arc::new(record), now);
        }
    }

    #[test]
    fn valid_coordinates_always_build(
        latitude in -90.0f64..90.0,
        longitude in -180.0f64..180.0,
        minutes_ahead in 1i64..100_000,
    ) {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let pickup = now + chrono::Duration::minutes(minutes_ahead);
        let raw = json!({
            "client_id": "C1",
            "deliveryFrequency": 5,
            "pickup_time_utc": pickup.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "pickupAddressBookId": "ab-1",
            "deliveryRawAddress": "Nishava St 1",
            "deliveryLatitude": latitude,
            "deliveryLongitude": longitude,
        });
        let record = Arc::new(ClientOrderRecord::from_raw(0, &raw).unwrap());
        let payload = quote_builder::build(&record, now).unwrap();
        prop_assert_eq!(payload.delivery_address.coordinates.latitude, latitude);
        prop_assert_eq!(payload.delivery_address.coordinates.longitude, longitude);
    }
}

// Property: batch preserves length and order
proptest! {
    #[test]
    fn batch_yields_one_outcome_per_item_in_order(
        items in prop::collection::vec(any::<u32>(), 0..50),
        fail_every in 1u32..5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let outcomes = runtime.block_on(BatchExecutor::unthrottled("test").run(
            items.clone(),
            |n| async move {
                if n % fail_every == 0 { Err(n) } else { Ok(n) }
            },
        ));

        prop_assert_eq!(outcomes.len(), items.len());
        for (item, outcome) in items.iter().zip(&outcomes) {
            match outcome {
                Ok(n) => prop_assert!(*n == *item && *item % fail_every != 0),
                Err(n) => prop_assert!(*n == *item && *item % fail_every == 0),
            }
        }
    }
}

// Property: pickup order codes and redaction
proptest! {
    #[test]
    fn order_codes_are_unique(client_ids in prop::collection::vec("[A-Za-z0-9_-]{0,24}", 1..40)) {
        let mut codes = OrderCodeGenerator::new(Utc::now());
        let generated: HashSet<String> = client_ids.iter().map(|id| codes.next_code(id)).collect();
        prop_assert_eq!(generated.len(), client_ids.len());
    }

    #[test]
    fn redaction_removes_every_occurrence(
        secret in "[a-z0-9]{4,12}",
        prefix in "[a-z ]{0,20}",
        suffix in "[a-z ]{0,20}",
    ) {
        let text = format!("{}{}{}{}", prefix, secret, suffix, secret);
        let redacted = redact_secrets(&text, &[&secret]);
        prop_assert!(!redacted.contains(&secret));
    }
}
