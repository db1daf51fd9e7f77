//! Portfolio read model and daily value snapshots.

use crate::services::sqlite_store;
use crate::services::{TradingError, TradingService};
use crate::types::{
    DailyValue, Holding, HoldingView, Performance, Portfolio, PortfolioView, Team, TeamRef,
};
use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Decimal places kept for percentages in the read model.
const PERCENT_SCALE: u32 = 4;

/// A holding joined with its team's reference price.
struct ValuedHolding {
    holding: Holding,
    team: Option<Team>,
}

impl ValuedHolding {
    fn current_price(&self) -> Decimal {
        self.team
            .as_ref()
            .map(|t| t.current_share_price)
            .unwrap_or(self.holding.average_purchase_price)
    }

    fn market_value(&self) -> Option<Decimal> {
        self.holding.shares.checked_mul(self.current_price())
    }

    fn cost_basis(&self) -> Option<Decimal> {
        self.holding.shares.checked_mul(self.holding.average_purchase_price)
    }
}

fn valued_holdings(conn: &Connection, portfolio_id: &str) -> Result<Vec<ValuedHolding>, rusqlite::Error> {
    sqlite_store::list_holdings(conn, portfolio_id)?
        .into_iter()
        .map(|holding| {
            let team = sqlite_store::find_team(conn, &holding.team_id)?;
            Ok(ValuedHolding { holding, team })
        })
        .collect()
}

fn checked_sum<I>(amounts: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Option<Decimal>>,
{
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |total, amount| total.checked_add(amount?))
}

fn market_total(portfolio: &Portfolio, holdings: &[ValuedHolding]) -> Option<Decimal> {
    checked_sum(holdings.iter().map(ValuedHolding::market_value))?.checked_add(portfolio.cash_balance)
}

/// `part / whole` as a percentage; zero when `whole` is not positive.
fn percentage(part: Decimal, whole: Decimal) -> Option<Decimal> {
    if whole <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    Some(part.checked_div(whole)?.checked_mul(dec!(100))?.round_dp(PERCENT_SCALE))
}

/// Change from `baseline` to `current`; zero when no usable baseline exists.
fn change_since(current: Decimal, baseline: Option<Decimal>) -> Option<(Decimal, Decimal)> {
    match baseline {
        Some(base) if base > Decimal::ZERO => {
            let change = current.checked_sub(base)?;
            Some((change, percentage(change, base)?))
        }
        _ => Some((Decimal::ZERO, Decimal::ZERO)),
    }
}

fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

/// Rows behind one portfolio view, read under a single lock.
struct PortfolioRows {
    portfolio: Portfolio,
    holdings: Vec<ValuedHolding>,
    /// Values 1, 7, 30 and 365 days back
    baselines: [Option<Decimal>; 4],
    chart_data: Vec<DailyValue>,
}

impl PortfolioRows {
    fn read(
        conn: &Connection,
        user_id: &str,
        today: NaiveDate,
        chart_days: usize,
    ) -> Result<Option<Self>, rusqlite::Error> {
        let Some(portfolio) = sqlite_store::find_portfolio_by_user(conn, user_id)? else {
            return Ok(None);
        };
        let pid = &portfolio.portfolio_id;
        let holdings = valued_holdings(conn, pid)?;
        let baselines = [
            sqlite_store::daily_value_on(conn, pid, days_before(today, 1))?,
            sqlite_store::daily_value_on_or_before(conn, pid, days_before(today, 7))?,
            sqlite_store::daily_value_on_or_before(conn, pid, days_before(today, 30))?,
            sqlite_store::daily_value_on_or_before(conn, pid, days_before(today, 365))?,
        ];
        let chart_data = sqlite_store::recent_daily_values(conn, pid, chart_days)?;
        Ok(Some(Self {
            portfolio,
            holdings,
            baselines,
            chart_data,
        }))
    }

    /// `None` when any amount overflows.
    fn into_view(self) -> Option<PortfolioView> {
        let Self {
            portfolio,
            holdings,
            baselines: [day, week, month, year],
            chart_data,
        } = self;
        let total_value = market_total(&portfolio, &holdings)?;

        let (daily_change, daily_change_percentage) = change_since(total_value, day)?;
        let (weekly_change, weekly_change_percentage) = change_since(total_value, week)?;
        let (monthly_change, monthly_change_percentage) = change_since(total_value, month)?;
        let (yearly_change, yearly_change_percentage) = change_since(total_value, year)?;
        let performance = Performance {
            daily_change,
            daily_change_percentage,
            weekly_change,
            weekly_change_percentage,
            monthly_change,
            monthly_change_percentage,
            yearly_change,
            yearly_change_percentage,
        };

        let cost_basis = checked_sum(holdings.iter().map(ValuedHolding::cost_basis))?;
        let total_invested = total_value.checked_sub(portfolio.cash_balance)?;
        let total_gain_loss = total_invested.checked_sub(cost_basis)?;
        let total_gain_loss_percentage = percentage(total_gain_loss, cost_basis)?;

        let holdings = holdings
            .into_iter()
            .map(holding_view)
            .collect::<Option<Vec<_>>>()?;

        Some(PortfolioView {
            portfolio_id: portfolio.portfolio_id,
            total_value,
            cash_balance: portfolio.cash_balance,
            total_invested,
            total_gain_loss,
            total_gain_loss_percentage,
            holdings,
            performance,
            chart_data,
        })
    }
}

impl TradingService {
    /// Full projection of the user's portfolio as of today (UTC).
    pub fn get_portfolio(&self, user_id: &str) -> Result<PortfolioView, TradingError> {
        self.get_portfolio_on(user_id, chrono::Utc::now().date_naive())
    }

    /// Full projection of the user's portfolio, with `today` anchoring performance.
    pub fn get_portfolio_on(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<PortfolioView, TradingError> {
        let chart_days = self.config.chart_history_days;

        self.sqlite
            .with_connection(|conn| PortfolioRows::read(conn, user_id, today, chart_days))?
            .ok_or_else(|| TradingError::PortfolioNotFound(user_id.to_string()))?
            .into_view()
            .ok_or_else(|| TradingError::overflow("Portfolio value"))
    }

    /// Record today's value for the user's portfolio.
    pub fn snapshot_daily_value(&self, user_id: &str) -> Result<Decimal, TradingError> {
        self.snapshot_daily_value_on(user_id, chrono::Utc::now().date_naive())
    }

    /// Revalue the portfolio at current reference prices, store it as its
    /// `total_value` and as the daily value for `date`.
    pub fn snapshot_daily_value_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Decimal, TradingError> {
        self.sqlite.transaction(|tx| {
            let portfolio = sqlite_store::find_portfolio_by_user(tx, user_id)?
                .ok_or_else(|| TradingError::PortfolioNotFound(user_id.to_string()))?;
            let holdings = valued_holdings(tx, &portfolio.portfolio_id)?;
            let value = market_total(&portfolio, &holdings)
                .ok_or_else(|| TradingError::overflow("Portfolio value"))?;

            let now = chrono::Utc::now().timestamp_millis();
            sqlite_store::update_total_value(tx, &portfolio.portfolio_id, value, now)?;
            sqlite_store::upsert_daily_value(tx, &portfolio.portfolio_id, date, value)?;
            Ok(value)
        })
    }
}

fn holding_view(valued: ValuedHolding) -> Option<HoldingView> {
    let current_price = valued.current_price();
    let current_value = valued.market_value()?;
    let cost_basis = valued.cost_basis()?;
    let unrealized = current_value.checked_sub(cost_basis)?;
    let unrealized_gain_loss_percentage = percentage(unrealized, cost_basis)?;
    let ValuedHolding { holding, team } = valued;

    Some(HoldingView {
        holding_id: holding.holding_id,
        team: TeamRef {
            name: team.map(|t| t.name).unwrap_or_else(|| holding.team_id.clone()),
            team_id: holding.team_id,
        },
        shares: holding.shares,
        average_purchase_price: holding.average_purchase_price,
        current_price,
        current_value,
        unrealized_gain_loss: unrealized,
        unrealized_gain_loss_percentage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(dec!(25), dec!(200)), Some(dec!(12.5)));
        assert_eq!(percentage(dec!(1), dec!(3)), Some(dec!(33.3333)));
        assert_eq!(percentage(dec!(5), Decimal::ZERO), Some(Decimal::ZERO));
        assert_eq!(percentage(Decimal::MAX, dec!(0.5)), None);
    }

    #[test]
    fn test_checked_sum_stops_on_overflow() {
        assert_eq!(checked_sum([Some(dec!(1.5)), Some(dec!(2))]), Some(dec!(3.5)));
        assert_eq!(checked_sum([Some(Decimal::MAX), Some(dec!(1))]), None);
        assert_eq!(checked_sum([Some(dec!(1)), None]), None);
    }

    #[test]
    fn test_change_since_requires_positive_baseline() {
        assert_eq!(change_since(dec!(1100), Some(dec!(1000))), Some((dec!(100), dec!(10))));
        assert_eq!(change_since(dec!(900), Some(dec!(1000))), Some((dec!(-100), dec!(-10))));
        assert_eq!(change_since(dec!(900), None), Some((Decimal::ZERO, Decimal::ZERO)));
        assert_eq!(
            change_since(dec!(900), Some(Decimal::ZERO)),
            Some((Decimal::ZERO, Decimal::ZERO))
        );
    }

    #[test]
    fn test_days_before() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(days_before(date, 1), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(days_before(date, 7), NaiveDate::from_ymd_opt(2024, 2, 23).unwrap());
    }
}
