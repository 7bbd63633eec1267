//! Weekday/frequency eligibility.
//!
//! The current weekday is always an argument so every day of the week can be
//! exercised without touching the system clock.

use chrono::Weekday;

use crate::models::{ClientOrderRecord, DeliveryFrequency};

/// Whether a client on `frequency` gets a delivery on `weekday`.
///
/// | frequency | Mon | Tue | Wed | Thu | Fri | Sat | Sun |
/// |-----------|-----|-----|-----|-----|-----|-----|-----|
/// | 3         | yes |     | yes |     | yes |     |     |
/// | 5         | yes | yes | yes | yes | yes |     |     |
pub fn is_eligible(frequency: DeliveryFrequency, weekday: Weekday) -> bool {
    match frequency {
        DeliveryFrequency::ThreeDays => {
            matches!(weekday, Weekday::Mon | Weekday::Wed | Weekday::Fri)
        }
        DeliveryFrequency::FiveDays => !matches!(weekday, Weekday::Sat | Weekday::Sun),
    }
}

/// Keeps the records scheduled for `weekday`, preserving source order.
pub fn filter_for_day(records: Vec<ClientOrderRecord>, weekday: Weekday) -> Vec<ClientOrderRecord> {
    records
        .into_iter()
        .filter(|record| {
            let eligible = is_eligible(record.delivery_frequency, weekday);
            if eligible {
                tracing::info!(
                    client_id = %record.client_id,
                    frequency = %record.delivery_frequency,
                    "Client scheduled for {}",
                    weekday
                );
            } else {
                tracing::debug!(
                    client_id = %record.client_id,
                    frequency = %record.delivery_frequency,
                    "Client not scheduled for {}",
                    weekday
                );
            }
            eligible
        })
        .collect()
}
