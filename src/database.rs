// src/database.rs

use crate::error::DbError;

use chrono::NaiveDate;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS measurements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        Date TIMESTAMP DEFAULT (DATETIME('now', 'localtime')),
        Name TEXT,
        Layer REAL NOT NULL,
        Wavelength REAL,
        RefImage TEXT NOT NULL,
        MatImage TEXT NOT NULL,
        Shelf TEXT NOT NULL,
        Book TEXT NOT NULL,
        Page TEXT NOT NULL
    )";

/// SQL function lowercasing with full Unicode case mapping. SQLite's own
/// `lower()` and `LIKE` only fold ASCII.
const UNICODE_LOWER: &str = "unicode_lower";

const COLUMNS: &str = "id, Date, Name, Layer, Wavelength, RefImage, MatImage, Shelf, Book, Page";

/// A stored measurement. Images are base64-encoded image files.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub id: i64,
    pub date: String,
    pub name: Option<String>,
    pub layer_nm: f64,
    pub wavelength_um: Option<f64>,
    pub ref_image: String,
    pub mat_image: String,
    pub shelf: String,
    pub book: String,
    pub page: String,
}

impl Measurement {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            name: row.get(2)?,
            layer_nm: row.get(3)?,
            wavelength_um: row.get(4)?,
            ref_image: row.get(5)?,
            mat_image: row.get(6)?,
            shelf: row.get(7)?,
            book: row.get(8)?,
            page: row.get(9)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMeasurement {
    /// `YYYY-MM-DD HH:MM:SS`; `None` stamps the local time at insert.
    pub date: Option<String>,
    pub name: Option<String>,
    pub layer_nm: f64,
    pub wavelength_um: Option<f64>,
    pub ref_image: String,
    pub mat_image: String,
    pub shelf: String,
    pub book: String,
    pub page: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementFilter {
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    /// Inclusive calendar-day bounds.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub shelf: Option<String>,
    pub book: Option<String>,
    pub page: Option<String>,
}

impl MeasurementFilter {
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if let Some(name) = non_blank(&self.name) {
            clauses.push("unicode_lower(Name) LIKE ? ESCAPE '\\'");
            args.push(Value::Text(format!("%{}%", escape_like(&name.to_lowercase()))));
        }
        if let Some(start) = self.start_date {
            clauses.push("DATE(Date) >= ?");
            args.push(Value::Text(start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end_date {
            clauses.push("DATE(Date) <= ?");
            args.push(Value::Text(end.format("%Y-%m-%d").to_string()));
        }
        for (clause, value) in [
            ("Shelf = ?", &self.shelf),
            ("Book = ?", &self.book),
            ("Page = ?", &self.page),
        ] {
            if let Some(v) = non_blank(value) {
                clauses.push(clause);
                args.push(Value::Text(v.to_string()));
            }
        }

        if clauses.is_empty() {
            (String::new(), args)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), args)
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "ORDER BY Date DESC, id DESC",
            SortOrder::OldestFirst => "ORDER BY Date ASC, id ASC",
        }
    }
}

/// One page of results, `page` counted from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!("Opened measurement database {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        conn.create_scalar_function(
            UNICODE_LOWER,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
        )?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(Self { conn })
    }

    pub fn save_measurement(&self, m: &NewMeasurement) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO measurements (Date, Name, Layer, Wavelength, RefImage, MatImage, Shelf, Book, Page)
             VALUES (COALESCE(?1, DATETIME('now', 'localtime')), ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                m.date,
                m.name,
                m.layer_nm,
                m.wavelength_um,
                m.ref_image,
                m.mat_image,
                m.shelf,
                m.book,
                m.page
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Saved measurement {id} ({:.2} nm)", m.layer_nm);
        Ok(id)
    }

    pub fn get_measurement(&self, id: i64) -> Result<Option<Measurement>, DbError> {
        let sql = format!("SELECT {COLUMNS} FROM measurements WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id], Measurement::from_row)
            .optional()?)
    }

    pub fn get_measurements(
        &self,
        filter: &MeasurementFilter,
        order: SortOrder,
        page: Option<PageRequest>,
    ) -> Result<Vec<Measurement>, DbError> {
        let (where_sql, mut args) = filter.where_clause();
        let mut sql = format!("SELECT {COLUMNS} FROM measurements{where_sql} {}", order.sql());
        if let Some(p) = page {
            sql.push_str(" LIMIT ? OFFSET ?");
            let per_page = p.per_page.max(1);
            args.push(Value::Integer(per_page as i64));
            args.push(Value::Integer((p.page.max(1) - 1) as i64 * per_page as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), Measurement::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_measurements(&self, filter: &MeasurementFilter) -> Result<usize, DbError> {
        let (where_sql, args) = filter.where_clause();
        let sql = format!("SELECT COUNT(*) FROM measurements{where_sql}");
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(args), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Returns false when no row had that id.
    pub fn delete_measurement(&self, id: i64) -> Result<bool, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM measurements WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn unique_values(&self, column: &str) -> Result<Vec<String>, DbError> {
        let sql = format!(
            "SELECT DISTINCT {column} FROM measurements
             WHERE {column} IS NOT NULL AND TRIM({column}) != '' ORDER BY {column}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn unique_names(&self) -> Result<Vec<String>, DbError> {
        self.unique_values("Name")
    }

    pub fn unique_shelves(&self) -> Result<Vec<String>, DbError> {
        self.unique_values("Shelf")
    }

    pub fn unique_books(&self) -> Result<Vec<String>, DbError> {
        self.unique_values("Book")
    }

    pub fn unique_pages(&self) -> Result<Vec<String>, DbError> {
        self.unique_values("Page")
    }
}
