//! `SQLite` schema definitions for motorpool.
//!
//! These statements create the version 1 layout. Later changes belong in
//! [`super::migrations`].

/// SQL statement to create the vehicles table.
pub const CREATE_VEHICLES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS vehicles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plate TEXT NOT NULL,
    model TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'available',
    last_driver TEXT NOT NULL DEFAULT '',
    location TEXT NOT NULL,
    project_id TEXT NOT NULL,
    memo TEXT
)
";

/// SQL statement to create the trip logs table.
///
/// `vehicle_id` is deliberately not a foreign key: vehicles and logs are
/// deleted independently.
pub const CREATE_LOGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id INTEGER NOT NULL,
    plate TEXT NOT NULL,
    model TEXT NOT NULL,
    driver TEXT NOT NULL,
    purpose TEXT NOT NULL,
    out_time TEXT NOT NULL,
    in_time TEXT,
    status TEXT NOT NULL,
    project_id TEXT NOT NULL
)
";

/// SQL statement to create an index for finding a vehicle's ongoing trip.
pub const CREATE_LOGS_VEHICLE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_logs_vehicle_status ON logs(vehicle_id, status)
";

/// SQL statement to create an index on `project_id` for site scoping.
pub const CREATE_LOGS_PROJECT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_logs_project ON logs(project_id)
";

/// SQL statement to create the history entries table.
pub const CREATE_HISTORY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS history_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create an index on `created_at` for recency queries.
pub const CREATE_HISTORY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_history_created ON history_entries(created_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_VEHICLES_TABLE,
    CREATE_LOGS_TABLE,
    CREATE_LOGS_VEHICLE_INDEX,
    CREATE_LOGS_PROJECT_INDEX,
    CREATE_HISTORY_TABLE,
    CREATE_HISTORY_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_vehicles_table_columns() {
        for column in [
            "id INTEGER PRIMARY KEY",
            "plate TEXT NOT NULL",
            "status TEXT NOT NULL",
            "last_driver TEXT NOT NULL",
            "project_id TEXT NOT NULL",
            "memo TEXT",
        ] {
            assert!(CREATE_VEHICLES_TABLE.contains(column), "missing {column}");
        }
    }

    #[test]
    fn test_logs_table_has_nullable_in_time() {
        assert!(CREATE_LOGS_TABLE.contains("out_time TEXT NOT NULL"));
        assert!(CREATE_LOGS_TABLE.contains("in_time TEXT,"));
        assert!(!CREATE_LOGS_TABLE.contains("REFERENCES"));
    }
}
