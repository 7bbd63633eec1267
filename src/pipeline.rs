//! Run orchestration.
//!
//! One run walks the stages in order, never revisiting one:
//! load records, filter by weekday, build quotes, submit quotes, correlate,
//! build and submit orders, summarize. Failing to load records or to acquire
//! a credential aborts the run before anything is submitted; every other
//! failure is recorded against its record and the run continues.

use chrono::{DateTime, Datelike, Local, Utc, Weekday};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::batch::BatchExecutor;
use crate::correlator::correlate;
use crate::eligibility::filter_for_day;
use crate::errors::{PipelineError, ResultExt};
use crate::laas_models::{OrderResponse, OrderStatus, QuotePayload, QuoteResponse};
use crate::logistics_client::LaasClient;
use crate::models::{
    cell_to_string, columns, ClientOrderRecord, CorrelatedQuote, CorrelationFailure, OrderOutcome,
    QuoteFailure, QuoteOutcome, RecordRejection, RunSummary,
};
use crate::order_submitter::{not_submitted, submit_order, OrderCodeGenerator};
use crate::quote_builder;
use crate::record_source::RecordSource;
use crate::result_sink::ResultSink;
use crate::token_cache::CredentialCache;

pub const DEFAULT_QUOTE_RATE_PER_SEC: f64 = 2.0;
pub const DEFAULT_ORDER_RATE_PER_SEC: f64 = 1.5;

/// Wires the collaborators of a run together.
pub struct Pipeline {
    source: Arc<dyn RecordSource>,
    credentials: CredentialCache,
    client: LaasClient,
    sink: Arc<dyn ResultSink>,
    quote_rate: f64,
    order_rate: f64,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn RecordSource>,
        credentials: CredentialCache,
        client: LaasClient,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            source,
            credentials,
            client,
            sink,
            quote_rate: DEFAULT_QUOTE_RATE_PER_SEC,
            order_rate: DEFAULT_ORDER_RATE_PER_SEC,
        }
    }

    pub fn with_rates(mut self, quote_rate: f64, order_rate: f64) -> Self {
        self.quote_rate = quote_rate;
        self.order_rate = order_rate;
        self
    }

    /// Runs the pipeline once.
    ///
    /// `weekday` defaults to the local weekday at run start. With `dry_run`
    /// set, records are filtered and validated but nothing is sent: no
    /// credential is fetched, submissions succeed with simulated ids and the
    /// result sink is left untouched.
    pub async fn run_once(&self, weekday: Option<Weekday>, dry_run: bool) -> RunSummary {
        let started_at = Utc::now();
        let weekday = weekday.unwrap_or_else(|| started_at.with_timezone(&Local).weekday());
        let mut summary = RunSummary::start(started_at, weekday, dry_run);

        tracing::info!(
            run_id = %summary.run_id,
            dry_run,
            "Starting delivery run for {}",
            weekday
        );

        // LoadRecords
        let rows = match self
            .source
            .load()
            .with_context(|| format!("loading records from {}", self.source.describe()))
        {
            Ok(rows) => rows,
            Err(err) => return abort(summary, err),
        };
        summary.total_considered = rows.len();
        tracing::info!("Loaded {} records from {}", rows.len(), self.source.describe());

        let records = parse_records(&rows, &mut summary.rejected);

        // Filter
        let eligible = filter_for_day(records, weekday);
        summary.eligible = eligible.len();
        tracing::info!(
            "{} of {} records scheduled for {}",
            eligible.len(),
            summary.total_considered,
            weekday
        );

        // BuildQuotes
        let payloads = build_payloads(eligible, started_at, &mut summary.rejected);
        if payloads.is_empty() {
            tracing::info!("No valid quote requests, nothing to submit");
            let summary = summary.finish();
            log_summary(&summary);
            return summary;
        }

        // SubmitQuotes → Correlate → SubmitOrders
        let outcomes = if dry_run {
            self.simulate(payloads, &mut summary).await
        } else {
            match self.submit(payloads, &mut summary).await {
                Ok(outcomes) => outcomes,
                Err(err) => return abort(summary, err),
            }
        };

        summary.orders_succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        summary.orders_failed = outcomes.len() - summary.orders_succeeded;
        summary.outcomes = outcomes;

        // Summarize
        let summary = summary.finish();
        if !dry_run {
            let entries = summary.log_entries();
            match self.sink.write(&entries) {
                Ok(()) => tracing::info!(
                    "Wrote {} order log entries to {}",
                    entries.len(),
                    self.sink.describe()
                ),
                Err(e) => tracing::error!("Failed to write order log to {}: {}", self.sink.describe(), e),
            }
        }
        log_summary(&summary);
        summary
    }

    async fn submit(
        &self,
        payloads: Vec<QuotePayload>,
        summary: &mut RunSummary,
    ) -> Result<Vec<OrderOutcome>, PipelineError> {
        let credential = self
            .credentials
            .get_token(false)
            .await
            .context("acquiring credential for quotes")?;

        let client = &self.client;
        let quote_credential = &credential;
        let quotes = BatchExecutor::new("quotes", self.quote_rate)
            .run(payloads, move |payload| async move {
                let result = client.create_quote(quote_credential, &payload).await;
                match result {
                    Ok(quote) => {
                        tracing::info!(
                            client_id = %payload.origin.client_id,
                            quote_id = %quote.quote_id,
                            "✓ Quote created for {}",
                            payload.origin.display_name()
                        );
                        QuoteOutcome::Success {
                            quote,
                            origin: payload.origin,
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            client_id = %payload.origin.client_id,
                            "✗ Quote failed: {}",
                            err
                        );
                        QuoteOutcome::failed(&err, payload.origin)
                    }
                }
            })
            .await;

        let correlated = tally_and_correlate(&quotes, summary);
        if correlated.is_empty() {
            return Ok(Vec::new());
        }

        let mut codes = OrderCodeGenerator::new(summary.started_at);
        let items: Vec<(CorrelatedQuote, String)> = correlated
            .into_iter()
            .map(|quote| {
                let code = codes.next_code(&quote.client.client_id);
                (quote, code)
            })
            .collect();

        // The quote stage may have outlived a short-lived token
        let credential = match self
            .credentials
            .get_token(false)
            .await
            .context("acquiring credential for orders")
        {
            Ok(credential) => credential,
            Err(err) => {
                tracing::error!("Cannot place orders: {}", err);
                return Ok(items
                    .into_iter()
                    .map(|(quote, code)| not_submitted(&quote, code, &err))
                    .collect());
            }
        };

        let order_credential = &credential;
        let outcomes = BatchExecutor::new("orders", self.order_rate)
            .run(items, move |(quote, code)| async move {
                submit_order(client, order_credential, &quote, code).await
            })
            .await;
        Ok(outcomes)
    }

    async fn simulate(
        &self,
        payloads: Vec<QuotePayload>,
        summary: &mut RunSummary,
    ) -> Vec<OrderOutcome> {
        tracing::info!("Dry run: simulating {} quote requests", payloads.len());

        let numbered: Vec<(usize, QuotePayload)> = payloads.into_iter().enumerate().collect();
        let quotes = BatchExecutor::unthrottled("quotes")
            .run(numbered, |(idx, payload)| async move {
                tracing::info!(
                    client_id = %payload.origin.client_id,
                    "[dry run] would request quote: {}",
                    serde_json::to_string(&payload).unwrap_or_default()
                );
                QuoteOutcome::Success {
                    quote: simulated_quote(idx + 1),
                    origin: payload.origin,
                }
            })
            .await;

        let correlated = tally_and_correlate(&quotes, summary);

        let mut codes = OrderCodeGenerator::new(summary.started_at);
        let items: Vec<(usize, CorrelatedQuote, String)> = correlated
            .into_iter()
            .enumerate()
            .map(|(idx, quote)| {
                let code = codes.next_code(&quote.client.client_id);
                (idx, quote, code)
            })
            .collect();

        BatchExecutor::unthrottled("orders")
            .run(items, |(idx, quote, code)| async move {
                tracing::info!(
                    client_id = %quote.client.client_id,
                    quote_id = %quote.quote_id,
                    "[dry run] would place order {} for {}",
                    code,
                    quote.client.name
                );
                OrderOutcome::placed(&quote, code, &simulated_order(idx + 1), Utc::now())
            })
            .await
    }
}

/// Turns raw rows into typed records, recording rows that cannot be typed.
fn parse_records(rows: &[Value], rejected: &mut Vec<RecordRejection>) -> Vec<ClientOrderRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for (row, raw) in rows.iter().enumerate() {
        match ClientOrderRecord::from_raw(row, raw) {
            Ok(record) => records.push(record),
            Err(err) => {
                let client_id = raw.get(columns::CLIENT_ID).and_then(cell_to_string);
                tracing::warn!(row, client_id = ?client_id, "Skipping record: {}", err);
                rejected.push(RecordRejection::new(row, client_id, &err));
            }
        }
    }
    records
}

fn build_payloads(
    eligible: Vec<ClientOrderRecord>,
    now: DateTime<Utc>,
    rejected: &mut Vec<RecordRejection>,
) -> Vec<QuotePayload> {
    let mut payloads = Vec::with_capacity(eligible.len());
    for record in eligible {
        let record = Arc::new(record);
        match quote_builder::build(&record, now) {
            Ok(payload) => payloads.push(payload),
            Err(err) => {
                tracing::warn!(
                    row = record.row,
                    client_id = %record.client_id,
                    "Excluding record from quoting: {}",
                    err
                );
                rejected.push(RecordRejection::new(
                    record.row,
                    Some(record.client_id.clone()),
                    &err,
                ));
            }
        }
    }
    payloads
}

fn tally_and_correlate(quotes: &[QuoteOutcome], summary: &mut RunSummary) -> Vec<CorrelatedQuote> {
    for quote in quotes {
        match quote {
            QuoteOutcome::Success { .. } => summary.quotes_succeeded += 1,
            QuoteOutcome::Failure { reason, kind, origin } => {
                summary.quotes_failed += 1;
                summary.quote_failures.push(QuoteFailure {
                    client_id: origin.client_id.clone(),
                    kind: *kind,
                    reason: reason.clone(),
                });
            }
        }
    }
    tracing::info!(
        "Quotes: {} succeeded, {} failed",
        summary.quotes_succeeded,
        summary.quotes_failed
    );

    let correlation = correlate(quotes);
    summary.correlation_failures = correlation.errors.len();
    summary
        .correlation_errors
        .extend(correlation.errors.iter().map(CorrelationFailure::from));
    correlation.items
}

fn abort(mut summary: RunSummary, err: PipelineError) -> RunSummary {
    tracing::error!("Run aborted: {}", err);
    summary.aborted = Some(err.to_string());
    let summary = summary.finish();
    log_summary(&summary);
    summary
}

fn simulated_quote(n: usize) -> QuoteResponse {
    QuoteResponse {
        quote_id: format!("dry-run-quote-{}", n),
        quote_price: None,
        currency_code: None,
        created_at: None,
        expires_at: None,
        extra: Map::new(),
    }
}

fn simulated_order(n: usize) -> OrderResponse {
    OrderResponse {
        tracking_number: Some(format!("dry-run-order-{}", n)),
        status: Some(OrderStatus {
            state: Some("SIMULATED".to_string()),
            created_at: None,
        }),
        ..OrderResponse::default()
    }
}

/// Logs the end-of-run report.
pub fn log_summary(summary: &RunSummary) {
    tracing::info!("=== Delivery run {} complete ===", summary.run_id);
    tracing::info!(
        "Weekday: {}{}",
        summary.weekday,
        if summary.dry_run { " (dry run)" } else { "" }
    );
    if let Some(reason) = &summary.aborted {
        tracing::error!("Aborted before submission: {}", reason);
    }
    tracing::info!(
        "Records: {} considered, {} eligible, {} rejected",
        summary.total_considered,
        summary.eligible,
        summary.rejected.len()
    );
    tracing::info!(
        "Quotes: {} succeeded, {} failed ({:.1}% success)",
        summary.quotes_succeeded,
        summary.quotes_failed,
        summary.quote_success_rate()
    );
    if summary.correlation_failures > 0 {
        tracing::warn!("Correlation failures: {}", summary.correlation_failures);
        for failure in &summary.correlation_errors {
            tracing::warn!(client_id = %failure.client_id, "  {}", failure.reason);
        }
    }
    tracing::info!(
        "Orders: {} succeeded, {} failed ({:.1}% success)",
        summary.orders_succeeded,
        summary.orders_failed,
        summary.order_success_rate()
    );
    let elapsed = summary.finished_at - summary.started_at;
    tracing::info!("Duration: {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
}
