pub mod auth;
pub mod client;
pub mod dual_leg;
pub mod order_builder;
pub mod settlement;

pub use client::PolymarketClient;
pub use dual_leg::{DualLegOutcome, DualLegRequest};

use crate::models::market::OrderBook;
use crate::models::order::{OrderIntent, OrderResult};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Venue connection parameters (spec.md §6.1, §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub clob_host: String,
    pub ws_host: String,
    pub gamma_api_host: String,
    pub chain_id: u64,
    pub private_key: String,
    pub funder_address: Option<String>,
    pub signature_type: u8,
    pub collateral_token: String,
    pub conditional_tokens_address: String,
    pub rpc_url: String,
}

/// Everything the engine needs from the trading venue (spec.md §4.1's
/// adapter contract). `PolymarketClient` is the one production
/// implementation; tests exercise the pure logic that sits above this trait
/// without an implementor, since it is I/O only.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook>;
    async fn get_price(&self, token_id: &str, side: &str) -> Result<Decimal>;
    async fn get_balance(&self) -> Result<Decimal>;
    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderResult>;
    async fn get_order(&self, order_id: &str) -> Result<OrderResult>;
    async fn get_open_orders(&self) -> Result<Vec<OrderResult>>;
    async fn cancel(&self, order_id: &str) -> Result<()>;
    async fn cancel_all(&self) -> Result<()>;
}
