//! SQL Storage
//!
//! Generic backend over a caller-supplied, already connected SQL client.
//! Each entry is one row with key, value, creation time, lifetime and
//! savetime columns; the table and column names come from [`SqlSettings`].

use tracing::{debug, warn};

use crate::cache::{current_timestamp, Packet};
use crate::config::{SqlSettings, StorageType};
use crate::error::{CacheError, Result};
use crate::storage::Storage;

// == SQL Value ==
/// Bound parameter or column value exchanged with a [`SqlClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Text(String),
}

impl SqlValue {
    fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; numeric text is accepted since some drivers return it.
    fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null => None,
        }
    }
}

// == SQL Dialect ==
/// Syntax differences between the supported SQL engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Sqlite,
    MySql,
    Postgres,
}

impl SqlDialect {
    /// Quotes an identifier that has already been validated.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            SqlDialect::MySql => format!("`{}`", ident),
            SqlDialect::Sqlite | SqlDialect::Postgres => format!("\"{}\"", ident),
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::Sqlite => format!("?{}", index),
            SqlDialect::MySql => "?".to_string(),
            SqlDialect::Postgres => format!("${}", index),
        }
    }

    fn clear_statement(&self, table: &str) -> String {
        match self {
            SqlDialect::Sqlite => format!("DELETE FROM {}", table),
            SqlDialect::MySql | SqlDialect::Postgres => format!("TRUNCATE TABLE {}", table),
        }
    }

    fn key_type(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "VARCHAR(255)",
            SqlDialect::Sqlite | SqlDialect::Postgres => "TEXT",
        }
    }

    fn value_type(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "LONGTEXT",
            SqlDialect::Sqlite | SqlDialect::Postgres => "TEXT",
        }
    }

    fn integer_type(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "INTEGER",
            SqlDialect::MySql | SqlDialect::Postgres => "BIGINT",
        }
    }
}

// == SQL Client ==
/// Minimal connection interface the SQL backend needs.
///
/// Implement it over whatever driver the application already uses. The
/// storage only issues statements built from validated identifiers and binds
/// every value as a parameter.
pub trait SqlClient: Send {
    fn dialect(&self) -> SqlDialect;

    /// Runs a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Runs a query, returning the first row if any.
    fn query_row(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<Vec<SqlValue>>>;
}

impl<C: SqlClient + ?Sized> SqlClient for Box<C> {
    fn dialect(&self) -> SqlDialect {
        (**self).dialect()
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn query_row(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<Vec<SqlValue>>> {
        (**self).query_row(sql, params)
    }
}

/// Statements prepared once from the settings.
#[derive(Debug, Clone)]
struct Statements {
    count: String,
    select: String,
    insert: String,
    update: String,
    delete: String,
    delete_outdated: String,
    clear: String,
    create_table: String,
}

impl Statements {
    fn build(dialect: SqlDialect, settings: &SqlSettings) -> Self {
        let q = |ident: &str| dialect.quote(ident);
        let p = |index: usize| dialect.placeholder(index);

        let table = q(&settings.table);
        let key = q(&settings.key_field);
        let value = q(&settings.value_field);
        let created = q(&settings.timestamp_field);
        let lifetime = q(&settings.lifetime_field);
        let savetime = q(&settings.savetime_field);

        Self {
            count: format!("SELECT COUNT(*) FROM {} WHERE {} = {}", table, key, p(1)),
            select: format!(
                "SELECT {}, {}, {}, {} FROM {} WHERE {} = {}",
                value,
                created,
                lifetime,
                savetime,
                table,
                key,
                p(1)
            ),
            insert: format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES ({}, {}, {}, {}, {})",
                table,
                key,
                value,
                created,
                lifetime,
                savetime,
                p(1),
                p(2),
                p(3),
                p(4),
                p(5)
            ),
            update: format!(
                "UPDATE {} SET {} = {}, {} = {}, {} = {}, {} = {} WHERE {} = {}",
                table,
                value,
                p(1),
                created,
                p(2),
                lifetime,
                p(3),
                savetime,
                p(4),
                key,
                p(5)
            ),
            delete: format!("DELETE FROM {} WHERE {} = {}", table, key, p(1)),
            // Rows that cannot form a packet go too
            delete_outdated: format!(
                "DELETE FROM {table} WHERE {savetime} < ({now} - {created}) \
                 OR {value} IS NULL OR {created} IS NULL OR {lifetime} IS NULL \
                 OR {savetime} IS NULL OR {created} < 0",
                table = table,
                value = value,
                created = created,
                lifetime = lifetime,
                savetime = savetime,
                now = p(1)
            ),
            clear: dialect.clear_statement(&table),
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {} ({} {} NOT NULL PRIMARY KEY, {} {} NOT NULL, \
                 {} {int} NOT NULL, {} {int} NOT NULL, {} {int} NOT NULL)",
                table,
                key,
                dialect.key_type(),
                value,
                dialect.value_type(),
                created,
                lifetime,
                savetime,
                int = dialect.integer_type()
            ),
        }
    }
}

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*`.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate(settings: &SqlSettings) -> Result<()> {
    let names = [
        &settings.table,
        &settings.key_field,
        &settings.value_field,
        &settings.timestamp_field,
        &settings.lifetime_field,
        &settings.savetime_field,
    ];
    match names.iter().find(|name| !is_identifier(name)) {
        Some(bad) => Err(CacheError::Connect(format!(
            "invalid SQL identifier '{}'",
            bad
        ))),
        None => Ok(()),
    }
}

// == SQL Storage ==
/// Row-per-entry storage over a [`SqlClient`].
pub struct SqlStorage<C: SqlClient> {
    client: C,
    statements: Statements,
    kind: StorageType,
}

impl<C: SqlClient> SqlStorage<C> {
    // == Constructor ==
    /// Wraps a connected client. The table must already exist; see
    /// [`SqlStorage::create_table`].
    ///
    /// Fails with `Connect` when a table or column name is not a plain identifier.
    pub fn new(client: C, settings: &SqlSettings) -> Result<Self> {
        Self::with_kind(client, settings, StorageType::Sql)
    }

    pub(crate) fn with_kind(client: C, settings: &SqlSettings, kind: StorageType) -> Result<Self> {
        validate(settings)?;
        let statements = Statements::build(client.dialect(), settings);
        Ok(Self {
            client,
            statements,
            kind,
        })
    }

    /// Creates the cache table if it does not exist.
    pub fn create_table(&mut self) -> Result<()> {
        self.client.execute(&self.statements.create_table, &[])?;
        Ok(())
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    fn row_exists(&mut self, key: &str) -> Result<bool> {
        let row = self
            .client
            .query_row(&self.statements.count, &[SqlValue::Text(key.to_string())])?;
        Ok(row
            .and_then(|values| values.first().and_then(SqlValue::as_integer))
            .map(|count| count > 0)
            .unwrap_or(false))
    }

    fn write(&mut self, key: &str, value: &str, lifetime: i64, savetime: i64) -> Result<()> {
        let now = SqlValue::Integer(current_timestamp());
        let key_param = SqlValue::Text(key.to_string());
        let value_param = SqlValue::Text(value.to_string());

        if self.row_exists(key)? {
            self.client.execute(
                &self.statements.update,
                &[
                    value_param,
                    now,
                    SqlValue::Integer(lifetime),
                    SqlValue::Integer(savetime),
                    key_param,
                ],
            )?;
        } else {
            self.client.execute(
                &self.statements.insert,
                &[
                    key_param,
                    value_param,
                    now,
                    SqlValue::Integer(lifetime),
                    SqlValue::Integer(savetime),
                ],
            )?;
        }
        Ok(())
    }
}

/// Builds a packet from a `value, created, lifetime, savetime` row.
fn packet_from_row(row: &[SqlValue]) -> Result<Packet> {
    match row {
        [value, created, lifetime, savetime] => {
            let bad = |column: &str| CacheError::BadPacket(format!("bad {} column", column));
            let value = value.as_text().ok_or_else(|| bad("value"))?;
            let created = created
                .as_integer()
                .filter(|created| *created >= 0)
                .ok_or_else(|| bad("timestamp"))?;
            let lifetime = lifetime.as_integer().ok_or_else(|| bad("lifetime"))?;
            let savetime = savetime.as_integer().ok_or_else(|| bad("savetime"))?;
            Ok(Packet::with_timestamp(value, lifetime, savetime, created))
        }
        _ => Err(CacheError::BadPacket(format!(
            "expected 4 columns, got {}",
            row.len()
        ))),
    }
}

impl<C: SqlClient> Storage for SqlStorage<C> {
    fn kind(&self) -> StorageType {
        self.kind
    }

    fn get_packet(&mut self, key: &str) -> Result<Packet> {
        let row = self
            .client
            .query_row(&self.statements.select, &[SqlValue::Text(key.to_string())])
            .map_err(|e| CacheError::BadPacket(format!("query failed: {}", e)))?
            .ok_or_else(|| CacheError::BadPacket(format!("no row for '{}'", key)))?;
        packet_from_row(&row)
    }

    fn set(&mut self, key: &str, value: &str, lifetime: i64, savetime: i64) -> bool {
        match self.write(key, value, lifetime, savetime) {
            Ok(()) => true,
            Err(e) => {
                warn!("{} storage: set '{}' failed: {}", self.kind, key, e);
                false
            }
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        match self
            .client
            .execute(&self.statements.delete, &[SqlValue::Text(key.to_string())])
        {
            Ok(_) => true,
            Err(e) => {
                warn!("{} storage: delete '{}' failed: {}", self.kind, key, e);
                false
            }
        }
    }

    // == Delete Outdated ==
    fn delete_outdated(&mut self) -> bool {
        match self.client.execute(
            &self.statements.delete_outdated,
            &[SqlValue::Integer(current_timestamp())],
        ) {
            Ok(removed) => {
                debug!("{} storage: removed {} outdated rows", self.kind, removed);
                true
            }
            Err(e) => {
                warn!("{} storage: delete outdated failed: {}", self.kind, e);
                false
            }
        }
    }

    fn clear(&mut self) -> bool {
        match self.client.execute(&self.statements.clear, &[]) {
            Ok(_) => true,
            Err(e) => {
                warn!("{} storage: clear failed: {}", self.kind, e);
                false
            }
        }
    }
}
