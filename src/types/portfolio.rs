//! Portfolio Types
//!
//! Portfolios, holdings, the team reference price, and the read-model
//! projection served by `GET /portfolio`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether a team's shares may currently be traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingStatus {
    Active,
    Suspended,
    Halted,
}

impl TradingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingStatus::Active => "active",
            TradingStatus::Suspended => "suspended",
            TradingStatus::Halted => "halted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TradingStatus::Active),
            "suspended" => Some(TradingStatus::Suspended),
            "halted" => Some(TradingStatus::Halted),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TradingStatus::Active)
    }
}

impl std::fmt::Display for TradingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A team and its mutable reference price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub team_id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_share_price: Decimal,
    pub trading_status: TradingStatus,
    pub updated_at: i64,
}

/// A user's cash account. One per user, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub portfolio_id: String,
    pub user_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub cash_balance: Decimal,
    /// Last computed value (cash + holdings at reference prices)
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Portfolio {
    /// Create a portfolio funded with `starting_cash`.
    pub fn new(user_id: String, starting_cash: Decimal) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            portfolio_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            cash_balance: starting_cash,
            total_value: starting_cash,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A position in one team's shares. Unique per (portfolio, team).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub holding_id: String,
    pub portfolio_id: String,
    pub team_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub shares: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_purchase_price: Decimal,
    /// Shares valued at the price of the last trade that touched the holding
    #[serde(with = "rust_decimal::serde::float")]
    pub current_value: Decimal,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One day's recorded portfolio value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyValue {
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
}

// =============================================================================
// Read model
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRef {
    pub team_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingView {
    pub holding_id: String,
    pub team: TeamRef,
    #[serde(with = "rust_decimal::serde::float")]
    pub shares: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub average_purchase_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub unrealized_gain_loss: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub unrealized_gain_loss_percentage: Decimal,
}

/// Value changes against earlier daily snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    #[serde(with = "rust_decimal::serde::float")]
    pub daily_change: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub daily_change_percentage: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub weekly_change: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub weekly_change_percentage: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_change: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_change_percentage: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub yearly_change: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub yearly_change_percentage: Decimal,
}

/// Full portfolio projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioView {
    pub portfolio_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cash_balance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_invested: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_gain_loss: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_gain_loss_percentage: Decimal,
    pub holdings: Vec<HoldingView>,
    pub performance: Performance,
    pub chart_data: Vec<DailyValue>,
}

/// Body of `PUT /teams/:team_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTeamRequest {
    pub name: String,
    pub current_share_price: Decimal,
    pub trading_status: TradingStatus,
}
