use ::duckdb::{Connection, ToSql};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_market_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS companies (
    symbol TEXT PRIMARY KEY,
    company_name TEXT NOT NULL,
    sector TEXT NOT NULL,
    industry TEXT NOT NULL,
    business_summary TEXT NOT NULL,
    country TEXT NOT NULL,
    employee_count BIGINT,
    market_cap DOUBLE,
    float_shares DOUBLE,
    is_esg_populated BOOLEAN,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS bars_1d (
    symbol TEXT NOT NULL,
    date DATE NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT,
    source TEXT,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(symbol, date)
);

CREATE TABLE IF NOT EXISTS price_sync (
    symbol TEXT PRIMARY KEY,
    fetched_at TEXT NOT NULL,
    source TEXT,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS index_constituents (
    index_id TEXT NOT NULL,
    position BIGINT NOT NULL,
    symbol TEXT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(index_id, symbol)
);
"#,
    },
    Migration {
        version: "0002_portfolio_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS portfolios (
    name TEXT PRIMARY KEY,
    initial_cash DOUBLE NOT NULL,
    free_cash DOUBLE NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS holdings (
    portfolio TEXT NOT NULL,
    symbol TEXT NOT NULL,
    qty_owned BIGINT NOT NULL,
    date_purchased TEXT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(portfolio, symbol)
);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    portfolio TEXT NOT NULL,
    seq BIGINT NOT NULL,
    ts TEXT NOT NULL,
    symbol TEXT NOT NULL,
    direction TEXT NOT NULL,
    order_type TEXT NOT NULL,
    price DOUBLE NOT NULL,
    qty BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS portfolio_values (
    portfolio TEXT NOT NULL,
    seq BIGINT NOT NULL,
    ts TEXT NOT NULL,
    value DOUBLE NOT NULL,
    PRIMARY KEY(portfolio, seq)
);
"#,
    },
    Migration {
        version: "0003_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_bars_1d_symbol_date ON bars_1d(symbol, date);
CREATE INDEX IF NOT EXISTS idx_companies_sector ON companies(sector);
CREATE INDEX IF NOT EXISTS idx_transactions_portfolio_seq ON transactions(portfolio, seq);
CREATE INDEX IF NOT EXISTS idx_transactions_portfolio_symbol ON transactions(portfolio, symbol);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let params: [&dyn ToSql; 1] = [&migration.version];
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params.as_slice(),
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            log::debug!("applying warehouse migration {}", migration.version);
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params.as_slice(),
            )?;
        }
    }

    Ok(())
}
