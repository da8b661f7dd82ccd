use crate::models::market::{OrderBook, Side};
use crate::models::order::{OrderIntent, OrderResult, OrderSide, OrderStatus, TimeInForce};
use crate::venue::auth::ClobAuth;
use crate::venue::order_builder::{canonicalize, OrderBuilder};
use crate::venue::{VenueAdapter, VenueConfig};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// REST client for the venue's CLOB API: order submission, cancellation,
/// book and balance queries. Pools connections; prefers L2 (API-key/HMAC)
/// auth once derived, falling back to L1 (EIP-712) per request otherwise.
pub struct PolymarketClient {
    config: VenueConfig,
    http: reqwest::Client,
    auth: Arc<RwLock<ClobAuth>>,
    builder: OrderBuilder,
}

#[derive(Debug, Serialize)]
struct PostOrderRequest {
    order: crate::venue::order_builder::SignedOrder,
    #[serde(rename = "orderType")]
    order_type: String,
    owner: String,
}

#[derive(Debug, Deserialize, Default)]
struct PostOrderResponse {
    success: Option<bool>,
    #[serde(rename = "orderID")]
    order_id: Option<String>,
    status: Option<String>,
    #[serde(rename = "errorMsg")]
    error_msg: Option<String>,
    error: Option<String>,
}

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_SECS: u64 = 1;
const RETRY_CAP_SECS: u64 = 10;

impl PolymarketClient {
    pub fn new(config: VenueConfig) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");

        let auth = ClobAuth::new(&config.private_key, config.chain_id);
        let builder = OrderBuilder::new(
            config.chain_id,
            config.private_key.clone(),
            config.funder_address.clone(),
            config.signature_type,
        );

        Self { config, http, auth: Arc::new(RwLock::new(auth)), builder }
    }

    pub async fn init_auth(&self) -> Result<()> {
        let mut auth = self.auth.write().await;
        match auth.derive_api_key(&self.config.clob_host).await {
            Ok(_) => {
                info!("L2 API key auth initialized");
                Ok(())
            }
            Err(e) => {
                info!("L2 key derivation failed ({e}), falling back to L1 auth");
                Ok(())
            }
        }
    }

    async fn auth_request(&self, method: &str, path: &str, body: &str) -> Result<reqwest::RequestBuilder> {
        let url = format!("{}{}", self.config.clob_host, path);
        let auth = self.auth.read().await;

        let builder = match method.to_uppercase().as_str() {
            "POST" => self.http.post(&url),
            "DELETE" => self.http.delete(&url),
            _ => self.http.get(&url),
        };

        if auth.has_api_key() {
            let headers = auth.l2_headers(method, path, body)?;
            Ok(headers.apply(builder))
        } else {
            drop(auth);
            let auth = self.auth.read().await;
            let headers = auth.l1_headers().await?;
            Ok(headers.apply(builder))
        }
    }

    /// Retries transient submit failures with exponential backoff, 1s→10s
    /// capped, three attempts (spec.md §4.1). Never retries a result the
    /// venue already accepted — only connection/5xx failures before a
    /// response is parsed.
    async fn with_retry<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(RETRY_BASE_SECS);
        let mut last_err = None;
        for attempt in 1..=RETRY_ATTEMPTS {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!("venue call attempt {attempt}/{RETRY_ATTEMPTS} failed: {e}");
                    last_err = Some(e);
                    if attempt < RETRY_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(Duration::from_secs(RETRY_CAP_SECS));
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("venue call failed with no error captured")))
    }

    pub async fn fetch_neg_risk(&self, token_id: &str) -> Result<bool> {
        let url = format!("{}/neg-risk?token_id={}", self.config.clob_host, token_id);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let val: serde_json::Value = resp.json().await.unwrap_or_default();
        Ok(val.get("neg_risk").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub async fn fetch_fee_rate(&self, token_id: &str) -> Result<u32> {
        let url = format!("{}/fee-rate?token_id={}", self.config.clob_host, token_id);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Ok(1000);
        }
        let val: serde_json::Value = resp.json().await.unwrap_or_default();
        Ok(val
            .get("fee_rate_bps")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(1000) as u32)
    }
}

#[async_trait]
impl VenueAdapter for PolymarketClient {
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = format!("{}/book?token_id={}", self.config.clob_host, token_id);
        let val: serde_json::Value = self.http.get(&url).send().await?.json().await?;

        let mut book = OrderBook::new(token_id.to_string());
        if let Some(bids) = val.get("bids").and_then(|v| v.as_array()) {
            for level in bids {
                if let (Some(p), Some(s)) = (level.get("price"), level.get("size")) {
                    if let (Some(price), Some(size)) = (parse_decimal(p), parse_decimal(s)) {
                        book.bids.insert(price, size);
                    }
                }
            }
        }
        if let Some(asks) = val.get("asks").and_then(|v| v.as_array()) {
            for level in asks {
                if let (Some(p), Some(s)) = (level.get("price"), level.get("size")) {
                    if let (Some(price), Some(size)) = (parse_decimal(p), parse_decimal(s)) {
                        book.asks.insert(price, size);
                    }
                }
            }
        }
        book.timestamp = Utc::now();
        Ok(book)
    }

    async fn get_price(&self, token_id: &str, side: &str) -> Result<Decimal> {
        let url = format!("{}/price?token_id={}&side={}", self.config.clob_host, token_id, side);
        let val: serde_json::Value = self.http.get(&url).send().await?.json().await?;
        parse_decimal(val.get("price").unwrap_or(&serde_json::Value::Null))
            .ok_or_else(|| anyhow::anyhow!("no price in response"))
    }

    async fn get_balance(&self) -> Result<Decimal> {
        let sig_type = self.config.signature_type;
        let path = format!("/balance-allowance?asset_type=COLLATERAL&signature_type={sig_type}");
        let request = self.auth_request("GET", &path, "").await?;
        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("balance fetch failed: HTTP {status} — {body}");
        }
        let val: serde_json::Value = resp.json().await?;
        let raw = parse_decimal(val.get("balance").unwrap_or(&serde_json::Value::Null))
            .unwrap_or(Decimal::ZERO);
        Ok(raw / Decimal::from(1_000_000))
    }

    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderResult> {
        let (price, size) = canonicalize(intent.price, intent.size);
        let canon_intent = OrderIntent { price, size, ..intent.clone() };

        self.with_retry(|| async {
            let signed = self.builder.build(&canon_intent).await?;

            let owner = {
                let auth = self.auth.read().await;
                auth.api_key().unwrap_or_default()
            };

            let tif_str = match canon_intent.time_in_force {
                TimeInForce::GTC => "GTC",
                TimeInForce::FOK => "FOK",
            };

            let req_body = PostOrderRequest { order: signed.clone(), order_type: tif_str.to_string(), owner };
            let body_json = serde_json::to_string(&req_body)?;
            let request = self.auth_request("POST", "/order", &body_json).await?;

            let resp = request.header("Content-Type", "application/json").body(body_json).send().await?;
            let status_code = resp.status();
            let resp_text = resp.text().await?;

            if !status_code.is_success() {
                anyhow::bail!("order HTTP {status_code}: {resp_text}");
            }

            let body: PostOrderResponse = serde_json::from_str(&resp_text).unwrap_or_default();

            if body.success.unwrap_or(false) {
                let status = venue_status_to_order_status(body.status.as_deref().unwrap_or("LIVE"));
                info!("order submitted: id={} status={:?}", body.order_id.as_deref().unwrap_or("?"), status);
                Ok(OrderResult {
                    order_id: body.order_id.unwrap_or_default(),
                    token_id: signed.token_id.clone(),
                    status,
                    filled_size: Decimal::ZERO,
                    avg_fill_price: Decimal::ZERO,
                    intended_size: canon_intent.size,
                    intended_price: canon_intent.price,
                    submitted_at: Utc::now(),
                    error_msg: None,
                })
            } else {
                let err = body.error.or(body.error_msg).unwrap_or_else(|| "order rejected".to_string());
                error!("order rejected: {err}");
                Ok(OrderResult {
                    order_id: String::new(),
                    token_id: signed.token_id.clone(),
                    status: OrderStatus::Failed,
                    filled_size: Decimal::ZERO,
                    avg_fill_price: Decimal::ZERO,
                    intended_size: canon_intent.size,
                    intended_price: canon_intent.price,
                    submitted_at: Utc::now(),
                    error_msg: Some(err),
                })
            }
        })
        .await
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResult> {
        let path = format!("/order/{}", order_id);
        let request = self.auth_request("GET", &path, "").await?;
        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status_code = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("get order failed: HTTP {status_code} — {body}");
        }

        let val: serde_json::Value = resp.json().await?;
        let status_str = val.get("status").and_then(|v| v.as_str()).unwrap_or("LIVE");
        let status = venue_status_to_order_status(status_str);
        let filled_size = parse_decimal(val.get("size_matched").unwrap_or(&serde_json::Value::Null))
            .unwrap_or(Decimal::ZERO);
        let avg_fill_price = parse_decimal(val.get("price").unwrap_or(&serde_json::Value::Null))
            .unwrap_or(Decimal::ZERO);

        Ok(OrderResult {
            order_id: order_id.to_string(),
            token_id: val.get("asset_id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            status,
            filled_size,
            avg_fill_price,
            intended_size: filled_size,
            intended_price: avg_fill_price,
            submitted_at: Utc::now(),
            error_msg: None,
        })
    }

    async fn get_open_orders(&self) -> Result<Vec<OrderResult>> {
        let request = self.auth_request("GET", "/orders", "").await?;
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Ok(Vec::new());
        }
        let vals: Vec<serde_json::Value> = resp.json().await.unwrap_or_default();
        let mut out = Vec::with_capacity(vals.len());
        for val in vals {
            let order_id = val.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let status = venue_status_to_order_status(val.get("status").and_then(|v| v.as_str()).unwrap_or("LIVE"));
            let filled_size = parse_decimal(val.get("size_matched").unwrap_or(&serde_json::Value::Null))
                .unwrap_or(Decimal::ZERO);
            out.push(OrderResult {
                order_id,
                token_id: val.get("asset_id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                status,
                filled_size,
                avg_fill_price: Decimal::ZERO,
                intended_size: filled_size,
                intended_price: Decimal::ZERO,
                submitted_at: Utc::now(),
                error_msg: None,
            });
        }
        Ok(out)
    }

    async fn cancel(&self, order_id: &str) -> Result<()> {
        let path = format!("/order/{}", order_id);
        let request = self.auth_request("DELETE", &path, "").await?;
        let resp = request.send().await?;
        if resp.status().is_success() {
            debug!("cancelled order {order_id}");
        } else {
            warn!("failed to cancel {order_id}: HTTP {}", resp.status());
        }
        Ok(())
    }

    async fn cancel_all(&self) -> Result<()> {
        let request = self.auth_request("DELETE", "/cancel-all", "").await?;
        let resp = request.send().await?;
        if resp.status().is_success() {
            info!("all orders cancelled");
        } else {
            warn!("failed to cancel all: HTTP {}", resp.status());
        }
        Ok(())
    }
}

fn venue_status_to_order_status(s: &str) -> OrderStatus {
    match s.to_uppercase().as_str() {
        "MATCHED" => OrderStatus::Matched,
        "FILLED" => OrderStatus::Filled,
        "LIVE" => OrderStatus::Live,
        "CANCELLED" | "DELAYED" => OrderStatus::Failed,
        _ => OrderStatus::Exception,
    }
}

fn parse_decimal(v: &serde_json::Value) -> Option<Decimal> {
    if let Some(s) = v.as_str() {
        return s.parse().ok();
    }
    if let Some(f) = v.as_f64() {
        return Decimal::try_from(f).ok();
    }
    None
}

#[allow(dead_code)]
fn order_side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

#[allow(dead_code)]
fn market_side_str(side: Side) -> &'static str {
    match side {
        Side::Yes => "YES",
        Side::No => "NO",
    }
}
