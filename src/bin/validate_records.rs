//! Checks an order export offline: typing, schedule and quote validation.
//!
//! Usage: `validate_records [ORDERS_FILE] [WEEKDAY]`. Falls back to the
//! `ORDERS_FILE`, `ORDERS_SHEET` and `RUN_WEEKDAY` environment variables.

use anyhow::Context;
use chrono::{Datelike, Local, Utc, Weekday};
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;

use laas_dispatch::eligibility::is_eligible;
use laas_dispatch::models::{cell_to_string, columns, ClientOrderRecord};
use laas_dispatch::quote_builder;
use laas_dispatch::record_source::{JsonFileSource, RecordSource};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .or_else(|| env::var("ORDERS_FILE").ok())
        .context("pass an orders file or set ORDERS_FILE")?;
    let weekday: Weekday = match args.next().or_else(|| env::var("RUN_WEEKDAY").ok()) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("`{}` is not a weekday", raw))?,
        None => Local::now().weekday(),
    };
    let sheet = env::var("ORDERS_SHEET").unwrap_or_else(|_| "FINAL_ORDERS".to_string());

    let source = JsonFileSource::new(&path, sheet);
    let rows = source.load()?;
    let now = Utc::now();

    println!("=== Validating {} ===", source.describe());
    println!("Weekday: {}  Now: {}\n", weekday, now);

    let (mut ready, mut unscheduled, mut invalid) = (0usize, 0usize, 0usize);
    for (row, raw) in rows.iter().enumerate() {
        let label = raw
            .get(columns::CLIENT_ID)
            .and_then(cell_to_string)
            .unwrap_or_else(|| "<no client_id>".to_string());

        let record = match ClientOrderRecord::from_raw(row, raw) {
            Ok(record) => Arc::new(record),
            Err(e) => {
                println!("[{}] {}  ✗ {}", row, label, e);
                invalid += 1;
                continue;
            }
        };

        let scheduled = is_eligible(record.delivery_frequency, weekday);
        match quote_builder::build(&record, now) {
            Ok(_) if scheduled => {
                println!("[{}] {}  ✓ ready (frequency {})", row, label, record.delivery_frequency);
                ready += 1;
            }
            Ok(_) => {
                println!(
                    "[{}] {}  - valid, not scheduled on {} (frequency {})",
                    row, label, weekday, record.delivery_frequency
                );
                unscheduled += 1;
            }
            Err(e) => {
                println!("[{}] {}  ✗ {}", row, label, e);
                invalid += 1;
            }
        }
    }

    println!("\n=== Validation Complete ===");
    println!("Total rows: {}", rows.len());
    println!("✓ Ready: {}", ready);
    println!("- Not scheduled: {}", unscheduled);
    println!("✗ Invalid: {}", invalid);
    Ok(())
}
