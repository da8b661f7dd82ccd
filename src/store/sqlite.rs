use super::{PnlHistoryEntry, PnlType, StatsSummary, Store};
use crate::models::circuit_breaker::CircuitBreakerState;
use crate::models::daily::DailyCounters;
use crate::models::market::{Asset, Side};
use crate::models::order::OrderStatus;
use crate::models::position::Position;
use crate::models::trade::{ExecutionStatus, TradeRecord, TradeStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use tracing::info;

/// SQLite-backed `Store`. Schema lives in `migrations/`, applied on
/// connect via `sqlx::migrate!`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .with_context(|| format!("connecting to {database_url}"))?;

        sqlx::migrate!("./migrations").run(&pool).await.context("running migrations")?;
        info!("store connected: {database_url}");
        Ok(Self { pool })
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap_or(Decimal::ZERO)
}

fn opt_dec(s: Option<String>) -> Option<Decimal> {
    s.and_then(|v| v.parse().ok())
}

fn status_str(s: OrderStatus) -> &'static str {
    match s {
        OrderStatus::Matched => "MATCHED",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Live => "LIVE",
        OrderStatus::Failed => "FAILED",
        OrderStatus::Exception => "EXCEPTION",
        OrderStatus::Simulated => "SIMULATED",
    }
}

fn parse_order_status(s: &str) -> OrderStatus {
    match s {
        "MATCHED" => OrderStatus::Matched,
        "FILLED" => OrderStatus::Filled,
        "LIVE" => OrderStatus::Live,
        "FAILED" => OrderStatus::Failed,
        "SIMULATED" => OrderStatus::Simulated,
        _ => OrderStatus::Exception,
    }
}

fn execution_status_str(s: ExecutionStatus) -> &'static str {
    match s {
        ExecutionStatus::FullFill => "full_fill",
        ExecutionStatus::PartialFill => "partial_fill",
        ExecutionStatus::OneLegOnly => "one_leg_only",
        ExecutionStatus::Failed => "failed",
    }
}

fn parse_execution_status(s: &str) -> ExecutionStatus {
    match s {
        "full_fill" => ExecutionStatus::FullFill,
        "partial_fill" => ExecutionStatus::PartialFill,
        "one_leg_only" => ExecutionStatus::OneLegOnly,
        _ => ExecutionStatus::Failed,
    }
}

fn trade_status_str(s: TradeStatus) -> &'static str {
    match s {
        TradeStatus::Pending => "pending",
        TradeStatus::Win => "win",
        TradeStatus::Loss => "loss",
    }
}

fn parse_trade_status(s: &str) -> TradeStatus {
    match s {
        "win" => TradeStatus::Win,
        "loss" => TradeStatus::Loss,
        _ => TradeStatus::Pending,
    }
}

fn side_str(s: Side) -> &'static str {
    match s {
        Side::Yes => "YES",
        Side::No => "NO",
    }
}

fn parse_side(s: &str) -> Side {
    if s == "YES" {
        Side::Yes
    } else {
        Side::No
    }
}

fn asset_str(a: Asset) -> &'static str {
    a.slug_prefix()
}

fn parse_asset(s: &str) -> Asset {
    Asset::from_slug_prefix(s).unwrap_or(Asset::BTC)
}

fn row_to_position(row: &sqlx::sqlite::SqliteRow) -> Position {
    Position {
        trade_id: row.get("trade_id"),
        condition_id: row.get("condition_id"),
        token_id: row.get("token_id"),
        side: parse_side(&row.get::<String, _>("side")),
        shares: dec(&row.get::<String, _>("shares")),
        entry_price: dec(&row.get::<String, _>("entry_price")),
        entry_cost: dec(&row.get::<String, _>("entry_cost")),
        market_end_time: row.get::<DateTime<Utc>, _>("market_end_time"),
        asset: parse_asset(&row.get::<String, _>("asset")),
        claimed: row.get::<i64, _>("claimed") != 0,
        proceeds: opt_dec(row.get("proceeds")),
        profit: opt_dec(row.get("profit")),
        failed_attempts: row.get::<i64, _>("failed_attempts") as u32,
    }
}

fn row_to_trade(row: &sqlx::sqlite::SqliteRow) -> TradeRecord {
    TradeRecord {
        trade_id: row.get("trade_id"),
        condition_id: row.get("condition_id"),
        asset: parse_asset(&row.get::<String, _>("asset")),
        market_slug: row.get("market_slug"),
        market_end_time: row.get::<DateTime<Utc>, _>("market_end_time"),
        intended_yes_price: dec(&row.get::<String, _>("intended_yes_price")),
        intended_no_price: dec(&row.get::<String, _>("intended_no_price")),
        intended_yes_cost: dec(&row.get::<String, _>("intended_yes_cost")),
        intended_no_cost: dec(&row.get::<String, _>("intended_no_cost")),
        yes_shares: dec(&row.get::<String, _>("yes_shares")),
        no_shares: dec(&row.get::<String, _>("no_shares")),
        yes_order_status: parse_order_status(&row.get::<String, _>("yes_order_status")),
        no_order_status: parse_order_status(&row.get::<String, _>("no_order_status")),
        execution_status: parse_execution_status(&row.get::<String, _>("execution_status")),
        expected_profit: dec(&row.get::<String, _>("expected_profit")),
        actual_profit: opt_dec(row.get("actual_profit")),
        status: parse_trade_status(&row.get::<String, _>("status")),
        dry_run: row.get::<i64, _>("dry_run") != 0,
        pre_fill_yes_depth: opt_dec(row.get("pre_fill_yes_depth")),
        pre_fill_no_depth: opt_dec(row.get("pre_fill_no_depth")),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_trade(&self, trade: &TradeRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO trades (
                trade_id, created_at, condition_id, asset, market_slug, market_end_time,
                intended_yes_price, intended_no_price, intended_yes_cost, intended_no_cost,
                yes_shares, no_shares, yes_order_status, no_order_status,
                execution_status, expected_profit, actual_profit, status, dry_run,
                pre_fill_yes_depth, pre_fill_no_depth
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(&trade.trade_id)
        .bind(trade.created_at)
        .bind(&trade.condition_id)
        .bind(asset_str(trade.asset))
        .bind(&trade.market_slug)
        .bind(trade.market_end_time)
        .bind(trade.intended_yes_price.to_string())
        .bind(trade.intended_no_price.to_string())
        .bind(trade.intended_yes_cost.to_string())
        .bind(trade.intended_no_cost.to_string())
        .bind(trade.yes_shares.to_string())
        .bind(trade.no_shares.to_string())
        .bind(status_str(trade.yes_order_status))
        .bind(status_str(trade.no_order_status))
        .bind(execution_status_str(trade.execution_status))
        .bind(trade.expected_profit.to_string())
        .bind(trade.actual_profit.map(|d| d.to_string()))
        .bind(trade_status_str(trade.status))
        .bind(trade.dry_run as i64)
        .bind(trade.pre_fill_yes_depth.map(|d| d.to_string()))
        .bind(trade.pre_fill_no_depth.map(|d| d.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resolve_trade(&self, trade_id: &str, won: bool, actual_profit: Decimal) -> Result<()> {
        let status = trade_status_str(if won { TradeStatus::Win } else { TradeStatus::Loss });
        sqlx::query(
            "UPDATE trades SET status = ?, actual_profit = ?, resolved_at = ? WHERE trade_id = ?",
        )
        .bind(status)
        .bind(actual_profit.to_string())
        .bind(Utc::now())
        .bind(trade_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_to_settlement_queue(&self, position: &Position) -> Result<()> {
        sqlx::query(
            "INSERT INTO positions (
                trade_id, token_id, condition_id, side, shares, entry_price, entry_cost,
                market_end_time, asset, claimed, proceeds, profit, failed_attempts
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(trade_id, token_id) DO NOTHING",
        )
        .bind(&position.trade_id)
        .bind(&position.token_id)
        .bind(&position.condition_id)
        .bind(side_str(position.side))
        .bind(position.shares.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.entry_cost.to_string())
        .bind(position.market_end_time)
        .bind(asset_str(position.asset))
        .bind(position.claimed as i64)
        .bind(position.proceeds.map(|d| d.to_string()))
        .bind(position.profit.map(|d| d.to_string()))
        .bind(position.failed_attempts as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_position_claimed(
        &self,
        trade_id: &str,
        token_id: &str,
        proceeds: Decimal,
        profit: Decimal,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE positions SET claimed = 1, proceeds = ?, profit = ? WHERE trade_id = ? AND token_id = ?",
        )
        .bind(proceeds.to_string())
        .bind(profit.to_string())
        .bind(trade_id)
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_claim_attempt(&self, trade_id: &str, token_id: &str, _error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE positions SET failed_attempts = failed_attempts + 1 WHERE trade_id = ? AND token_id = ?",
        )
        .bind(trade_id)
        .bind(token_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_claimable_positions(&self, wait_minutes: i64) -> Result<Vec<Position>> {
        let cutoff = Utc::now() - chrono::Duration::minutes(wait_minutes);
        let rows = sqlx::query("SELECT * FROM positions WHERE claimed = 0 AND market_end_time <= ?")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_position).collect())
    }

    async fn get_unclaimed_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE claimed = 0").fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_position).collect())
    }

    async fn update_daily_stats(&self, date: Option<NaiveDate>, delta: &DailyCounters) -> Result<()> {
        let date = date.unwrap_or(delta.date).to_string();
        sqlx::query(
            "INSERT INTO daily_stats (date, pnl, trades, wins, losses, exposure,
                opportunities_detected, opportunities_executed, opportunities_skipped)
             VALUES (?,?,?,?,?,?,?,?,?)
             ON CONFLICT(date) DO UPDATE SET
                pnl = CAST(pnl AS REAL) + CAST(excluded.pnl AS REAL),
                trades = trades + excluded.trades,
                wins = wins + excluded.wins,
                losses = losses + excluded.losses,
                exposure = CAST(exposure AS REAL) + CAST(excluded.exposure AS REAL),
                opportunities_detected = opportunities_detected + excluded.opportunities_detected,
                opportunities_executed = opportunities_executed + excluded.opportunities_executed,
                opportunities_skipped = opportunities_skipped + excluded.opportunities_skipped",
        )
        .bind(date)
        .bind(delta.pnl.to_string())
        .bind(delta.trades as i64)
        .bind(delta.wins as i64)
        .bind(delta.losses as i64)
        .bind(delta.exposure.to_string())
        .bind(delta.opportunities_detected as i64)
        .bind(delta.opportunities_executed as i64)
        .bind(delta.opportunities_skipped as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_realized_pnl(
        &self,
        trade_id: &str,
        amount: Decimal,
        pnl_type: PnlType,
        max_daily_loss: Decimal,
    ) -> Result<CircuitBreakerState> {
        let pnl_type_str = match pnl_type {
            PnlType::TradeSettlement => "trade_settlement",
            PnlType::RebalancerExit => "rebalancer_exit",
            PnlType::Manual => "manual",
        };
        sqlx::query("INSERT INTO realized_pnl (trade_id, amount, pnl_type, created_at) VALUES (?,?,?,?)")
            .bind(trade_id)
            .bind(amount.to_string())
            .bind(pnl_type_str)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        let mut state = self.get_circuit_breaker_state().await?;
        state.record_realized_pnl(amount, max_daily_loss);

        sqlx::query(
            "UPDATE circuit_breaker SET realized_pnl = ?, hit = ?, hit_at = ?, hit_reason = ? WHERE id = 1",
        )
        .bind(state.realized_pnl.to_string())
        .bind(state.hit as i64)
        .bind(state.hit_at)
        .bind(&state.hit_reason)
        .execute(&self.pool)
        .await?;

        Ok(state)
    }

    async fn get_circuit_breaker_state(&self) -> Result<CircuitBreakerState> {
        let row = sqlx::query("SELECT realized_pnl, hit, hit_at, hit_reason FROM circuit_breaker WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(CircuitBreakerState {
            realized_pnl: dec(&row.get::<String, _>("realized_pnl")),
            hit: row.get::<i64, _>("hit") != 0,
            hit_at: row.get::<Option<DateTime<Utc>>, _>("hit_at"),
            hit_reason: row.get("hit_reason"),
        })
    }

    async fn reset_circuit_breaker(&self) -> Result<()> {
        sqlx::query("UPDATE circuit_breaker SET hit = 0, hit_at = NULL, hit_reason = NULL WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_today_stats(&self) -> Result<StatsSummary> {
        let today = Utc::now().date_naive().to_string();
        self.stats_query("WHERE date(created_at) = ?", &today).await
    }

    async fn get_all_time_stats(&self) -> Result<StatsSummary> {
        self.stats_query("", "").await
    }

    async fn get_recent_trades(&self, limit: i64) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query("SELECT * FROM trades ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_trade).collect())
    }

    async fn get_pnl_history(&self, days: i64) -> Result<Vec<PnlHistoryEntry>> {
        let cutoff = (Utc::now().date_naive() - chrono::Duration::days(days)).to_string();
        let rows = sqlx::query("SELECT date, pnl FROM daily_stats WHERE date >= ? ORDER BY date DESC")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| PnlHistoryEntry {
                date: r.get::<String, _>("date").parse().unwrap_or_else(|_| Utc::now().date_naive()),
                pnl: dec(&r.get::<String, _>("pnl")),
            })
            .collect())
    }

    async fn save_fill_record(&self, trade_id: &str, token_id: &str, slippage_bps: Decimal) -> Result<()> {
        sqlx::query("INSERT INTO fills (trade_id, token_id, slippage_bps, created_at) VALUES (?,?,?,?)")
            .bind(trade_id)
            .bind(token_id)
            .bind(slippage_bps.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_liquidity_snapshot(&self, condition_id: &str, yes_depth: Decimal, no_depth: Decimal) -> Result<()> {
        sqlx::query("INSERT INTO depth_snapshots (condition_id, yes_depth, no_depth, created_at) VALUES (?,?,?,?)")
            .bind(condition_id)
            .bind(yes_depth.to_string())
            .bind(no_depth.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cleanup_old_liquidity_data(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let result = sqlx::query("DELETE FROM depth_snapshots WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl SqliteStore {
    async fn stats_query(&self, where_clause: &str, date_param: &str) -> Result<StatsSummary> {
        let sql = format!(
            "SELECT
                COUNT(*) as total,
                SUM(CASE WHEN status = 'win' THEN 1 ELSE 0 END) as wins,
                SUM(CASE WHEN status = 'loss' THEN 1 ELSE 0 END) as losses,
                SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END) as pending,
                SUM(CASE WHEN actual_profit IS NOT NULL THEN CAST(actual_profit AS REAL) ELSE 0 END) as total_pnl,
                SUM(CAST(intended_yes_cost AS REAL) + CAST(intended_no_cost AS REAL)) as total_volume,
                MAX(CAST(actual_profit AS REAL)) as best_trade,
                MIN(CAST(actual_profit AS REAL)) as worst_trade
             FROM trades {where_clause}"
        );
        let mut query = sqlx::query(&sql);
        if !date_param.is_empty() {
            query = query.bind(date_param);
        }
        let row = query.fetch_one(&self.pool).await?;

        Ok(StatsSummary {
            total_trades: row.get::<i64, _>("total") as u64,
            wins: row.get::<Option<i64>, _>("wins").unwrap_or(0) as u64,
            losses: row.get::<Option<i64>, _>("losses").unwrap_or(0) as u64,
            pending: row.get::<Option<i64>, _>("pending").unwrap_or(0) as u64,
            total_pnl: Decimal::try_from(row.get::<Option<f64>, _>("total_pnl").unwrap_or(0.0)).unwrap_or(Decimal::ZERO),
            total_volume: Decimal::try_from(row.get::<Option<f64>, _>("total_volume").unwrap_or(0.0)).unwrap_or(Decimal::ZERO),
            best_trade: row.get::<Option<f64>, _>("best_trade").and_then(|f| Decimal::try_from(f).ok()),
            worst_trade: row.get::<Option<f64>, _>("worst_trade").and_then(|f| Decimal::try_from(f).ok()),
        })
    }
}
