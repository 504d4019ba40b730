use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use crate::accrual::errors::AccrualError;
use crate::accrual::types::{AccrualResponse, AccrualStatus, Verdict};
use crate::model::{OrderNumber, OrderStatus, Points};

/// Source of verdicts for pending orders.
///
/// Implementations never retry and never return an error: every failure mode
/// is folded into `Verdict::Deferred` or `Verdict::Failed`, and the order is
/// simply polled again on the next cycle.
#[async_trait]
pub trait Scorer: Send + Sync + 'static {
    async fn score(&self, order: &OrderNumber) -> Verdict;
}

#[derive(Clone)]
pub struct AccrualClient {
    http: Client,
    base_url: String,
}

impl AccrualClient {
    /// `timeout` bounds the whole request, body included. A request that
    /// exceeds it becomes `Verdict::Failed`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AccrualError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AccrualError::InvalidBaseUrl(base_url));
        }

        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip_all, fields(order = %order), level = "debug")]
    pub async fn fetch_verdict(&self, order: &OrderNumber) -> Verdict {
        let url = format!("{}/api/orders/{}", self.base_url, order);

        let resp = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return Verdict::Failed(describe_transport_error(&e)),
        };

        let status = resp.status();
        let body = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => return Verdict::Failed(describe_transport_error(&e)),
        };

        debug!(
            http_status = status.as_u16(),
            body_len = body.len(),
            "accrual response received"
        );

        classify_response(order, status, &body)
    }
}

#[async_trait]
impl Scorer for AccrualClient {
    async fn score(&self, order: &OrderNumber) -> Verdict {
        self.fetch_verdict(order).await
    }
}

/// Maps one HTTP exchange onto a verdict.
///
/// - 204: the service has never heard of the order, so it is INVALID.
/// - 429 / 5xx: transient, `Deferred`.
/// - 200: parsed; anything unusable is `Failed` so the order stays pending.
/// - anything else: `Failed`.
pub fn classify_response(order: &OrderNumber, status: StatusCode, body: &[u8]) -> Verdict {
    if status == StatusCode::NO_CONTENT {
        return Verdict::invalid();
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Verdict::Deferred;
    }
    if status != StatusCode::OK {
        return Verdict::Failed(format!("unexpected status {}", status.as_u16()));
    }

    let parsed: AccrualResponse = match serde_json::from_slice(body) {
        Ok(p) => p,
        Err(e) => return Verdict::Failed(format!("malformed body: {e}")),
    };

    if !parsed.refers_to(order) {
        return Verdict::Failed(format!(
            "response names order {} instead of {order}",
            parsed.order
        ));
    }

    let accrual = match (parsed.status, parsed.accrual) {
        (AccrualStatus::Processed, Some(a)) => match Points::from_f64(a) {
            Ok(p) => p,
            Err(e) => return Verdict::Failed(format!("bad accrual: {e}")),
        },
        // A final verdict without an amount would close the order at zero
        // for good, so hold it back instead.
        (AccrualStatus::Processed, None) => {
            return Verdict::Failed("PROCESSED without accrual".to_string());
        }
        _ => Points::ZERO,
    };

    Verdict::Resolved {
        status: OrderStatus::from(parsed.status),
        accrual,
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("transport error: {e}")
    }
}
