use duckdb::Connection;

/// Column definitions of the signals table.
///
/// `run_date` is the partition key; everything after `option_type` is a metric
/// column passed through to API clients untouched.
pub const SIGNALS_COLUMNS: &str = r"
    ticker             VARCHAR NOT NULL,
    run_date           DATE NOT NULL,
    option_type        VARCHAR NOT NULL,
    contract_symbol    VARCHAR,
    expiration_date    DATE,
    strike             DOUBLE,
    last_price         DOUBLE,
    bid                DOUBLE,
    ask                DOUBLE,
    volume             BIGINT,
    open_interest      BIGINT,
    implied_volatility DOUBLE,
    delta              DOUBLE,
    gamma              DOUBLE,
    theta              DOUBLE,
    vega               DOUBLE,
    signal_score       DOUBLE,
    created_at         TIMESTAMP,
    CHECK (option_type IN ('CALL', 'PUT'))
";

/// SQL statement that creates the signals table under `table_id`.
pub fn create_signals_table_sql(table_id: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table_id} ({SIGNALS_COLUMNS})")
}

/// Initialize the signals table.
pub fn init_schema(conn: &Connection, table_id: &str) -> Result<(), duckdb::Error> {
    conn.execute_batch(&create_signals_table_sql(table_id))?;
    Ok(())
}
