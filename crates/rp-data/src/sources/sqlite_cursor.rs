//! SQLite cursor implementation
//!
//! Each session owns its own connection. The query statement is wrapped as a
//! subquery for counting and for `ORDER BY`/`LIMIT`/`OFFSET` paging.

use std::path::{Path, PathBuf};

use rp_core::{Batch, CursorError, CursorSession, Query, QueryParam, RemoteCursor};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags};

use super::paged::{PagedSession, RowFetcher};
use crate::schema::build_batch;

fn sqlite_error(context: &str, error: rusqlite::Error) -> CursorError {
    CursorError::Sqlite(format!("{}: {}", context, error))
}

fn to_sql_value(param: &QueryParam) -> Value {
    match param {
        QueryParam::Null => Value::Null,
        QueryParam::Integer(i) => Value::Integer(*i),
        QueryParam::Real(f) => Value::Real(*f),
        QueryParam::Text(s) => Value::Text(s.clone()),
        QueryParam::Bool(b) => Value::Integer(i64::from(*b)),
    }
}

/// Cursor over a SQLite database file
pub struct SqliteCursor {
    path: PathBuf,
    name: String,
}

impl SqliteCursor {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.db")
            .to_string();
        Self { path, name }
    }
}

impl RemoteCursor for SqliteCursor {
    fn open(&self, query: &Query, fetch_size: usize) -> Result<Box<dyn CursorSession>, CursorError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| sqlite_error("Failed to open SQLite database", e))?;

        let fetcher = SqliteFetcher::new(conn, query)?;
        Ok(Box::new(PagedSession::open(fetcher, fetch_size)?))
    }

    fn cursor_name(&self) -> &str {
        &self.name
    }
}

/// One connection bound to one query
struct SqliteFetcher {
    conn: Option<Connection>,
    count_sql: String,
    page_sql: String,
    params: Vec<Value>,
}

impl SqliteFetcher {
    fn new(conn: Connection, query: &Query) -> Result<Self, CursorError> {
        let statement = query.statement().trim().trim_end_matches(';');
        if statement.is_empty() {
            return Err(CursorError::InvalidQuery("empty statement".to_string()));
        }

        let order_by = match query.sort() {
            // ORDER BY takes a 1-based result column ordinal
            Some(sort) => format!(
                " ORDER BY {} {}",
                sort.column + 1,
                if sort.descending { "DESC" } else { "ASC" }
            ),
            None => String::new(),
        };

        Ok(Self {
            conn: Some(conn),
            count_sql: format!("SELECT COUNT(*) FROM ({})", statement),
            page_sql: format!("SELECT * FROM ({}){} LIMIT ? OFFSET ?", statement, order_by),
            params: query.params().iter().map(to_sql_value).collect(),
        })
    }

    fn conn(&self) -> Result<&Connection, CursorError> {
        self.conn.as_ref().ok_or(CursorError::Closed)
    }
}

impl RowFetcher for SqliteFetcher {
    fn count(&mut self) -> Result<usize, CursorError> {
        let count: i64 = self
            .conn()?
            .query_row(&self.count_sql, params_from_iter(self.params.iter()), |row| row.get(0))
            .map_err(|e| sqlite_error("Failed to count rows", e))?;
        Ok(count.max(0) as usize)
    }

    fn fetch(&mut self, offset: usize, limit: usize) -> Result<Batch, CursorError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(&self.page_sql)
            .map_err(|e| sqlite_error("Failed to prepare query", e))?;

        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let column_count = names.len();

        let mut bound = self.params.clone();
        bound.push(Value::Integer(limit as i64));
        bound.push(Value::Integer(offset as i64));

        let mut rows = stmt
            .query(params_from_iter(bound.iter()))
            .map_err(|e| sqlite_error("Failed to execute query", e))?;

        let mut values = Vec::with_capacity(limit);
        while let Some(row) = rows
            .next()
            .map_err(|e| sqlite_error("Failed to fetch row", e))?
        {
            let mut record = Vec::with_capacity(column_count);
            for col_idx in 0..column_count {
                let value: Value = row
                    .get(col_idx)
                    .map_err(|e| sqlite_error("Failed to get column value", e))?;
                record.push(value);
            }
            values.push(record);
        }

        build_batch(&names, &values)
    }

    fn is_alive(&self) -> bool {
        self.conn.is_some()
    }

    fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(error = %e, "failed to close SQLite connection");
            }
        }
    }
}
