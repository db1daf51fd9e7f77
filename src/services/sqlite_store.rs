//! SQLite persistence layer for the trading ledger.
//!
//! Holds teams (mirrored reference prices), portfolios, holdings, orders,
//! the append-only transaction ledger and daily portfolio values.
//!
//! Decimals are stored as TEXT in their canonical `Decimal::to_string` form.
//! Mutations of shared balances use compare-and-set updates: the `WHERE`
//! clause repeats the previously read value and callers check the returned
//! row count.

use crate::types::{
    DailyValue, Holding, Order, OrderAction, OrderStatus, OrderType, Portfolio, Team,
    TradingStatus, Transaction,
};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// A stored column held a value this build does not understand.
#[derive(Debug, thiserror::Error)]
#[error("unrecognised column value {0:?}")]
struct UnknownValue(String);

/// SQLite store for the ledger.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// Open by configured path; `:memory:` selects an in-memory database.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        if path == ":memory:" {
            Self::new_in_memory()
        } else {
            Self::new(path)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic inside a closure drops its uncommitted transaction, so the
        // connection is still consistent after poisoning.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.lock();

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS teams (
                team_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                current_share_price TEXT NOT NULL,
                trading_status TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS portfolios (
                portfolio_id TEXT PRIMARY KEY,
                user_id TEXT UNIQUE NOT NULL,
                cash_balance TEXT NOT NULL,
                total_value TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS portfolio_holdings (
                holding_id TEXT PRIMARY KEY,
                portfolio_id TEXT NOT NULL REFERENCES portfolios(portfolio_id),
                team_id TEXT NOT NULL REFERENCES teams(team_id),
                shares TEXT NOT NULL,
                average_purchase_price TEXT NOT NULL,
                current_value TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (portfolio_id, team_id)
            );

            CREATE TABLE IF NOT EXISTS orders (
                order_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                team_id TEXT NOT NULL REFERENCES teams(team_id),
                order_type TEXT NOT NULL,
                action TEXT NOT NULL,
                shares TEXT NOT NULL,
                price TEXT NOT NULL,
                status TEXT NOT NULL,
                client_order_id TEXT,
                placed_at INTEGER NOT NULL,
                executed_at INTEGER,
                expires_at INTEGER,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id, placed_at DESC);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_client_id
                ON orders(user_id, client_order_id) WHERE client_order_id IS NOT NULL;

            CREATE TABLE IF NOT EXISTS transactions (
                transaction_id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL REFERENCES orders(order_id),
                user_id TEXT NOT NULL,
                team_id TEXT NOT NULL,
                action TEXT NOT NULL,
                shares TEXT NOT NULL,
                price_per_share TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                fee_amount TEXT NOT NULL,
                executed_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user
                ON transactions(user_id, executed_at DESC);

            CREATE TABLE IF NOT EXISTS portfolio_daily_values (
                portfolio_id TEXT NOT NULL REFERENCES portfolios(portfolio_id),
                trans_date TEXT NOT NULL,
                portfolio_value TEXT NOT NULL,
                PRIMARY KEY (portfolio_id, trans_date)
            );",
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits when `f` returns `Ok`; any error drops the transaction, which
    /// rolls back every statement `f` executed.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run a read (or single-statement write) against the connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, rusqlite::Error>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self.lock();
        f(&conn)
    }

    // ========== Convenience wrappers ==========

    pub fn get_team(&self, team_id: &str) -> Result<Option<Team>, rusqlite::Error> {
        self.with_connection(|conn| find_team(conn, team_id))
    }

    pub fn upsert_team(&self, team: &Team) -> Result<(), rusqlite::Error> {
        self.with_connection(|conn| upsert_team(conn, team))
    }

    pub fn get_portfolio_by_user(&self, user_id: &str) -> Result<Option<Portfolio>, rusqlite::Error> {
        self.with_connection(|conn| find_portfolio_by_user(conn, user_id))
    }

    pub fn get_holding(
        &self,
        portfolio_id: &str,
        team_id: &str,
    ) -> Result<Option<Holding>, rusqlite::Error> {
        self.with_connection(|conn| find_holding(conn, portfolio_id, team_id))
    }

    pub fn get_order(&self, order_id: &str) -> Result<Option<Order>, rusqlite::Error> {
        self.with_connection(|conn| find_order(conn, order_id))
    }

    pub fn get_user_orders(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
        limit: usize,
    ) -> Result<Vec<Order>, rusqlite::Error> {
        self.with_connection(|conn| list_orders(conn, user_id, status, limit))
    }

    pub fn get_user_transactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, rusqlite::Error> {
        self.with_connection(|conn| list_transactions(conn, user_id, limit))
    }
}

// =============================================================================
// Column helpers
// =============================================================================

fn decimal_at(row: &Row<'_>, idx: usize) -> Result<Decimal, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    raw.parse::<Decimal>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed_at<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(UnknownValue(raw)))
    })
}

fn date_at(row: &Row<'_>, idx: usize) -> Result<NaiveDate, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// =============================================================================
// Teams
// =============================================================================

fn team_from_row(row: &Row<'_>) -> Result<Team, rusqlite::Error> {
    Ok(Team {
        team_id: row.get(0)?,
        name: row.get(1)?,
        current_share_price: decimal_at(row, 2)?,
        trading_status: parsed_at(row, 3, TradingStatus::parse)?,
        updated_at: row.get(4)?,
    })
}

pub fn find_team(conn: &Connection, team_id: &str) -> Result<Option<Team>, rusqlite::Error> {
    conn.query_row(
        "SELECT team_id, name, current_share_price, trading_status, updated_at
         FROM teams WHERE team_id = ?1",
        params![team_id],
        team_from_row,
    )
    .optional()
}

pub fn upsert_team(conn: &Connection, team: &Team) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO teams (team_id, name, current_share_price, trading_status, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(team_id) DO UPDATE SET
            name = excluded.name,
            current_share_price = excluded.current_share_price,
            trading_status = excluded.trading_status,
            updated_at = excluded.updated_at",
        params![
            team.team_id,
            team.name,
            team.current_share_price.to_string(),
            team.trading_status.as_str(),
            team.updated_at,
        ],
    )?;
    Ok(())
}

/// Set the reference price if it still equals `expected`.
pub fn update_team_price(
    conn: &Connection,
    team_id: &str,
    expected: Decimal,
    new_price: Decimal,
    now: i64,
) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE teams SET current_share_price = ?1, updated_at = ?2
         WHERE team_id = ?3 AND current_share_price = ?4",
        params![new_price.to_string(), now, team_id, expected.to_string()],
    )?;
    Ok(changed == 1)
}

// =============================================================================
// Portfolios
// =============================================================================

fn portfolio_from_row(row: &Row<'_>) -> Result<Portfolio, rusqlite::Error> {
    Ok(Portfolio {
        portfolio_id: row.get(0)?,
        user_id: row.get(1)?,
        cash_balance: decimal_at(row, 2)?,
        total_value: decimal_at(row, 3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn find_portfolio_by_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<Portfolio>, rusqlite::Error> {
    conn.query_row(
        "SELECT portfolio_id, user_id, cash_balance, total_value, created_at, updated_at
         FROM portfolios WHERE user_id = ?1",
        params![user_id],
        portfolio_from_row,
    )
    .optional()
}

/// Insert unless the user already has a portfolio. Returns whether a row was written.
pub fn insert_portfolio_if_absent(
    conn: &Connection,
    portfolio: &Portfolio,
) -> Result<bool, rusqlite::Error> {
    let inserted = conn.execute(
        "INSERT INTO portfolios
            (portfolio_id, user_id, cash_balance, total_value, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id) DO NOTHING",
        params![
            portfolio.portfolio_id,
            portfolio.user_id,
            portfolio.cash_balance.to_string(),
            portfolio.total_value.to_string(),
            portfolio.created_at,
            portfolio.updated_at,
        ],
    )?;
    Ok(inserted == 1)
}

/// Set the cash balance if it still equals `expected`.
pub fn update_cash_balance(
    conn: &Connection,
    portfolio_id: &str,
    expected: Decimal,
    new_balance: Decimal,
    now: i64,
) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE portfolios SET cash_balance = ?1, updated_at = ?2
         WHERE portfolio_id = ?3 AND cash_balance = ?4",
        params![new_balance.to_string(), now, portfolio_id, expected.to_string()],
    )?;
    Ok(changed == 1)
}

pub fn update_total_value(
    conn: &Connection,
    portfolio_id: &str,
    total_value: Decimal,
    now: i64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE portfolios SET total_value = ?1, updated_at = ?2 WHERE portfolio_id = ?3",
        params![total_value.to_string(), now, portfolio_id],
    )?;
    Ok(())
}

// =============================================================================
// Holdings
// =============================================================================

const HOLDING_COLUMNS: &str = "holding_id, portfolio_id, team_id, shares, average_purchase_price,
     current_value, created_at, updated_at";

fn holding_from_row(row: &Row<'_>) -> Result<Holding, rusqlite::Error> {
    Ok(Holding {
        holding_id: row.get(0)?,
        portfolio_id: row.get(1)?,
        team_id: row.get(2)?,
        shares: decimal_at(row, 3)?,
        average_purchase_price: decimal_at(row, 4)?,
        current_value: decimal_at(row, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn find_holding(
    conn: &Connection,
    portfolio_id: &str,
    team_id: &str,
) -> Result<Option<Holding>, rusqlite::Error> {
    conn.query_row(
        &format!(
            "SELECT {HOLDING_COLUMNS} FROM portfolio_holdings
             WHERE portfolio_id = ?1 AND team_id = ?2"
        ),
        params![portfolio_id, team_id],
        holding_from_row,
    )
    .optional()
}

pub fn list_holdings(conn: &Connection, portfolio_id: &str) -> Result<Vec<Holding>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HOLDING_COLUMNS} FROM portfolio_holdings
         WHERE portfolio_id = ?1 ORDER BY created_at, holding_id"
    ))?;
    let rows = stmt.query_map(params![portfolio_id], holding_from_row)?;
    rows.collect()
}

pub fn insert_holding(conn: &Connection, holding: &Holding) -> Result<(), rusqlite::Error> {
    conn.execute(
        &format!(
            "INSERT INTO portfolio_holdings ({HOLDING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            holding.holding_id,
            holding.portfolio_id,
            holding.team_id,
            holding.shares.to_string(),
            holding.average_purchase_price.to_string(),
            holding.current_value.to_string(),
            holding.created_at,
            holding.updated_at,
        ],
    )?;
    Ok(())
}

/// Rewrite a holding if its share count still equals `expected_shares`.
pub fn update_holding(
    conn: &Connection,
    holding: &Holding,
    expected_shares: Decimal,
) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE portfolio_holdings
         SET shares = ?1, average_purchase_price = ?2, current_value = ?3, updated_at = ?4
         WHERE holding_id = ?5 AND shares = ?6",
        params![
            holding.shares.to_string(),
            holding.average_purchase_price.to_string(),
            holding.current_value.to_string(),
            holding.updated_at,
            holding.holding_id,
            expected_shares.to_string(),
        ],
    )?;
    Ok(changed == 1)
}

/// Delete a holding if its share count still equals `expected_shares`.
pub fn delete_holding(
    conn: &Connection,
    holding_id: &str,
    expected_shares: Decimal,
) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "DELETE FROM portfolio_holdings WHERE holding_id = ?1 AND shares = ?2",
        params![holding_id, expected_shares.to_string()],
    )?;
    Ok(changed == 1)
}

// =============================================================================
// Orders
// =============================================================================

const ORDER_COLUMNS: &str = "order_id, user_id, team_id, order_type, action, shares, price,
     status, client_order_id, placed_at, executed_at, expires_at";

fn order_from_row(row: &Row<'_>) -> Result<Order, rusqlite::Error> {
    Ok(Order {
        order_id: row.get(0)?,
        user_id: row.get(1)?,
        team_id: row.get(2)?,
        order_type: parsed_at(row, 3, OrderType::parse)?,
        action: parsed_at(row, 4, OrderAction::parse)?,
        shares: decimal_at(row, 5)?,
        price: decimal_at(row, 6)?,
        status: parsed_at(row, 7, OrderStatus::parse)?,
        client_order_id: row.get(8)?,
        placed_at: row.get(9)?,
        executed_at: row.get(10)?,
        expires_at: row.get(11)?,
    })
}

pub fn insert_order(conn: &Connection, order: &Order) -> Result<(), rusqlite::Error> {
    conn.execute(
        &format!(
            "INSERT INTO orders ({ORDER_COLUMNS}, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?10)"
        ),
        params![
            order.order_id,
            order.user_id,
            order.team_id,
            order.order_type.as_str(),
            order.action.as_str(),
            order.shares.to_string(),
            order.price.to_string(),
            order.status.as_str(),
            order.client_order_id,
            order.placed_at,
            order.executed_at,
            order.expires_at,
        ],
    )?;
    Ok(())
}

/// Persist a status change made with `Order::transition`, guarded on the prior status.
pub fn update_order_status(
    conn: &Connection,
    order: &Order,
    from: OrderStatus,
    now: i64,
) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE orders SET status = ?1, executed_at = ?2, updated_at = ?3
         WHERE order_id = ?4 AND status = ?5",
        params![
            order.status.as_str(),
            order.executed_at,
            now,
            order.order_id,
            from.as_str(),
        ],
    )?;
    Ok(changed == 1)
}

pub fn find_order(conn: &Connection, order_id: &str) -> Result<Option<Order>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?1"),
        params![order_id],
        order_from_row,
    )
    .optional()
}

pub fn find_order_by_client_id(
    conn: &Connection,
    user_id: &str,
    client_order_id: &str,
) -> Result<Option<Order>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 AND client_order_id = ?2"),
        params![user_id, client_order_id],
        order_from_row,
    )
    .optional()
}

/// A user's orders, newest first, optionally filtered by status.
pub fn list_orders(
    conn: &Connection,
    user_id: &str,
    status: Option<OrderStatus>,
    limit: usize,
) -> Result<Vec<Order>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY placed_at DESC, rowid DESC
         LIMIT ?3"
    ))?;
    let rows = stmt.query_map(
        params![user_id, status.map(|s| s.as_str()), limit as i64],
        order_from_row,
    )?;
    rows.collect()
}

// =============================================================================
// Transactions
// =============================================================================

fn transaction_from_row(row: &Row<'_>) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        transaction_id: row.get(0)?,
        order_id: row.get(1)?,
        user_id: row.get(2)?,
        team_id: row.get(3)?,
        action: parsed_at(row, 4, OrderAction::parse)?,
        shares: decimal_at(row, 5)?,
        price_per_share: decimal_at(row, 6)?,
        total_amount: decimal_at(row, 7)?,
        fee_amount: decimal_at(row, 8)?,
        executed_at: row.get(9)?,
    })
}

pub fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO transactions (
            transaction_id, order_id, user_id, team_id, action,
            shares, price_per_share, total_amount, fee_amount, executed_at
         )
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            tx.transaction_id,
            tx.order_id,
            tx.user_id,
            tx.team_id,
            tx.action.as_str(),
            tx.shares.to_string(),
            tx.price_per_share.to_string(),
            tx.total_amount.to_string(),
            tx.fee_amount.to_string(),
            tx.executed_at,
        ],
    )?;
    Ok(())
}

/// A user's ledger entries, newest first.
pub fn list_transactions(
    conn: &Connection,
    user_id: &str,
    limit: usize,
) -> Result<Vec<Transaction>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT transaction_id, order_id, user_id, team_id, action,
                shares, price_per_share, total_amount, fee_amount, executed_at
         FROM transactions WHERE user_id = ?1
         ORDER BY executed_at DESC, rowid DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit as i64], transaction_from_row)?;
    rows.collect()
}

// =============================================================================
// Daily values
// =============================================================================

pub fn upsert_daily_value(
    conn: &Connection,
    portfolio_id: &str,
    date: NaiveDate,
    value: Decimal,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO portfolio_daily_values (portfolio_id, trans_date, portfolio_value)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(portfolio_id, trans_date) DO UPDATE SET
            portfolio_value = excluded.portfolio_value",
        params![portfolio_id, date_key(date), value.to_string()],
    )?;
    Ok(())
}

/// The most recent `limit` daily values, in ascending date order.
pub fn recent_daily_values(
    conn: &Connection,
    portfolio_id: &str,
    limit: usize,
) -> Result<Vec<DailyValue>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT trans_date, portfolio_value FROM portfolio_daily_values
         WHERE portfolio_id = ?1
         ORDER BY trans_date DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![portfolio_id, limit as i64], |row| {
        Ok(DailyValue {
            date: date_at(row, 0)?,
            value: decimal_at(row, 1)?,
        })
    })?;
    let mut values = rows.collect::<Result<Vec<_>, _>>()?;
    values.reverse();
    Ok(values)
}

/// The recorded value for exactly `date`, if any.
pub fn daily_value_on(
    conn: &Connection,
    portfolio_id: &str,
    date: NaiveDate,
) -> Result<Option<Decimal>, rusqlite::Error> {
    conn.query_row(
        "SELECT portfolio_value FROM portfolio_daily_values
         WHERE portfolio_id = ?1 AND trans_date = ?2",
        params![portfolio_id, date_key(date)],
        |row| decimal_at(row, 0),
    )
    .optional()
}

/// The latest recorded value on or before `date`, if any.
pub fn daily_value_on_or_before(
    conn: &Connection,
    portfolio_id: &str,
    date: NaiveDate,
) -> Result<Option<Decimal>, rusqlite::Error> {
    conn.query_row(
        "SELECT portfolio_value FROM portfolio_daily_values
         WHERE portfolio_id = ?1 AND trans_date <= ?2
         ORDER BY trans_date DESC
         LIMIT 1",
        params![portfolio_id, date_key(date)],
        |row| decimal_at(row, 0),
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert_team(&Team {
                team_id: "team-1".to_string(),
                name: "Rovers".to_string(),
                current_share_price: dec!(10.00),
                trading_status: TradingStatus::Active,
                updated_at: 0,
            })
            .unwrap();
        store
    }

    #[test]
    fn test_team_round_trip_preserves_scale() {
        let store = seeded_store();
        let team = store.get_team("team-1").unwrap().unwrap();
        assert_eq!(team.current_share_price.to_string(), "10.00");
        assert_eq!(team.trading_status, TradingStatus::Active);
        assert!(store.get_team("missing").unwrap().is_none());
    }

    #[test]
    fn test_team_price_compare_and_set() {
        let store = seeded_store();
        store
            .with_connection(|conn| {
                assert!(update_team_price(conn, "team-1", dec!(10.00), dec!(10.01), 1)?);
                // Stale expectation no longer matches
                assert!(!update_team_price(conn, "team-1", dec!(10.00), dec!(10.02), 2)?);
                Ok(())
            })
            .unwrap();
        let team = store.get_team("team-1").unwrap().unwrap();
        assert_eq!(team.current_share_price, dec!(10.01));
    }

    #[test]
    fn test_portfolio_insert_is_once_per_user() {
        let store = seeded_store();
        let first = Portfolio::new("user-1".to_string(), dec!(1000.00));
        let second = Portfolio::new("user-1".to_string(), dec!(5.00));
        store
            .with_connection(|conn| {
                assert!(insert_portfolio_if_absent(conn, &first)?);
                assert!(!insert_portfolio_if_absent(conn, &second)?);
                Ok(())
            })
            .unwrap();
        let stored = store.get_portfolio_by_user("user-1").unwrap().unwrap();
        assert_eq!(stored.portfolio_id, first.portfolio_id);
        assert_eq!(stored.cash_balance, dec!(1000.00));
    }

    #[test]
    fn test_cash_balance_guard() {
        let store = seeded_store();
        let portfolio = Portfolio::new("user-1".to_string(), dec!(1000.00));
        store
            .with_connection(|conn| {
                insert_portfolio_if_absent(conn, &portfolio)?;
                assert!(!update_cash_balance(conn, &portfolio.portfolio_id, dec!(999), dec!(0), 1)?);
                assert!(update_cash_balance(
                    conn,
                    &portfolio.portfolio_id,
                    dec!(1000.00),
                    dec!(500.00),
                    1
                )?);
                Ok(())
            })
            .unwrap();
        let stored = store.get_portfolio_by_user("user-1").unwrap().unwrap();
        assert_eq!(stored.cash_balance, dec!(500.00));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = seeded_store();
        let result: Result<(), rusqlite::Error> = store.transaction(|tx| {
            update_team_price(tx, "team-1", dec!(10.00), dec!(99.00), 1)?;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(result.is_err());
        let team = store.get_team("team-1").unwrap().unwrap();
        assert_eq!(team.current_share_price, dec!(10.00));
    }

    #[test]
    fn test_client_order_id_is_unique_per_user() {
        let store = seeded_store();
        let first = Order::market(
            "user-1".to_string(),
            "team-1".to_string(),
            OrderAction::Buy,
            dec!(1),
            dec!(10.00),
        )
        .with_client_order_id(Some("abc".to_string()));
        let dup = Order::market(
            "user-1".to_string(),
            "team-1".to_string(),
            OrderAction::Buy,
            dec!(1),
            dec!(10.00),
        )
        .with_client_order_id(Some("abc".to_string()));
        let other_user = Order::market(
            "user-2".to_string(),
            "team-1".to_string(),
            OrderAction::Buy,
            dec!(1),
            dec!(10.00),
        )
        .with_client_order_id(Some("abc".to_string()));

        store
            .with_connection(|conn| {
                insert_order(conn, &first)?;
                assert!(insert_order(conn, &dup).is_err());
                insert_order(conn, &other_user)?;
                let found = find_order_by_client_id(conn, "user-1", "abc")?.unwrap();
                assert_eq!(found.order_id, first.order_id);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_list_orders_filters_by_status() {
        let store = seeded_store();
        let mut executed = Order::market(
            "user-1".to_string(),
            "team-1".to_string(),
            OrderAction::Buy,
            dec!(1),
            dec!(10.00),
        );
        let pending = Order::limit(
            "user-1".to_string(),
            "team-1".to_string(),
            OrderAction::Buy,
            dec!(2),
            dec!(9.50),
            1_000,
        );
        store
            .with_connection(|conn| {
                insert_order(conn, &executed)?;
                insert_order(conn, &pending)?;
                executed.transition(OrderStatus::Executed, 10).unwrap();
                assert!(update_order_status(conn, &executed, OrderStatus::Pending, 10)?);
                // A second identical step finds the row already moved on
                assert!(!update_order_status(conn, &executed, OrderStatus::Pending, 11)?);
                Ok(())
            })
            .unwrap();

        let all = store.get_user_orders("user-1", None, 10).unwrap();
        assert_eq!(all.len(), 2);
        let queued = store
            .get_user_orders("user-1", Some(OrderStatus::Pending), 10)
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].order_id, pending.order_id);
        assert_eq!(queued[0].price, dec!(9.50));
    }

    #[test]
    fn test_daily_values_ordering_and_lookup() {
        let store = seeded_store();
        let portfolio = Portfolio::new("user-1".to_string(), dec!(1000.00));
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        store
            .with_connection(|conn| {
                insert_portfolio_if_absent(conn, &portfolio)?;
                upsert_daily_value(conn, &portfolio.portfolio_id, d(3), dec!(1030))?;
                upsert_daily_value(conn, &portfolio.portfolio_id, d(1), dec!(1010))?;
                upsert_daily_value(conn, &portfolio.portfolio_id, d(2), dec!(1020))?;
                upsert_daily_value(conn, &portfolio.portfolio_id, d(3), dec!(1035))?;
                Ok(())
            })
            .unwrap();

        let recent = store
            .with_connection(|conn| recent_daily_values(conn, &portfolio.portfolio_id, 2))
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].date, d(2));
        assert_eq!(recent[1].value, dec!(1035));

        let before = store
            .with_connection(|conn| daily_value_on_or_before(conn, &portfolio.portfolio_id, d(9)))
            .unwrap();
        assert_eq!(before, Some(dec!(1035)));
        let exact = store
            .with_connection(|conn| daily_value_on(conn, &portfolio.portfolio_id, d(5)))
            .unwrap();
        assert_eq!(exact, None);
    }
}
