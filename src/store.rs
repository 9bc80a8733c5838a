//! SQLite-backed agreement catalog.
//!
//! [`SqliteCatalog`] implements [`AgreementRepository`] over four
//! tables mirroring the relational layout of the catalog: agreements,
//! their additional cost rates, their levels and their contribution
//! rules.  Contribution rules keep the `is_percentage` / `amount` /
//! `percentage` columns of the original schema plus a nullable
//! `part_time_amount`; [`contribution_from_columns`] maps those
//! columns back onto a [`ContributionAmount`].
//!
//! Text search folds case with a `unicode_lower` SQL function registered
//! on every connection, since SQLite's own `lower()` only folds ASCII.

use crate::catalog::{
    validate_agreement, AgreementRepository, LEGACY_BILATERAL_NAMES, AgreementSummary, CatalogQuery, Page, SortColumn,
    SortDirection,
};
use crate::error::CatalogError;
use crate::models::{
    AdditionalCosts, Agreement, ContributionAmount, ContributionCategory, ContributionRule,
    IssuerClass, Level,
};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Monthly bilateral body fee for full-time employees.
const BILATERAL_FULL_TIME: f64 = 10.0;
/// Monthly bilateral body fee for part-time employees.
const BILATERAL_PART_TIME: f64 = 5.0;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS agreements (
    key TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sector TEXT NOT NULL,
    sector_category TEXT NOT NULL,
    issuer TEXT NOT NULL,
    issuer_class TEXT NOT NULL,
    valid_from TEXT,
    valid_to TEXT,
    owner TEXT
);
CREATE TABLE IF NOT EXISTS additional_costs (
    agreement_key TEXT PRIMARY KEY REFERENCES agreements(key) ON DELETE CASCADE,
    severance_rate REAL NOT NULL DEFAULT 0,
    social_rate REAL NOT NULL DEFAULT 0,
    other_rate REAL NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS levels (
    agreement_key TEXT NOT NULL REFERENCES agreements(key) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    code TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    base_salary REAL NOT NULL,
    PRIMARY KEY (agreement_key, position)
);
CREATE TABLE IF NOT EXISTS contribution_rules (
    agreement_key TEXT NOT NULL REFERENCES agreements(key) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL,
    is_percentage INTEGER NOT NULL DEFAULT 0,
    amount REAL NOT NULL DEFAULT 0,
    percentage REAL NOT NULL DEFAULT 0,
    part_time_amount REAL,
    PRIMARY KEY (agreement_key, position)
);
CREATE INDEX IF NOT EXISTS idx_agreements_category ON agreements(sector_category);
CREATE INDEX IF NOT EXISTS idx_agreements_owner ON agreements(owner);
"#;

/// Agreement repository stored in a SQLite database.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Opens (or creates) the database at `path` and ensures the schema.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened agreement catalog");
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CatalogError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.create_scalar_function(
            "unicode_lower",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts every agreement that is not stored yet.  Returns the
    /// number of agreements inserted.
    ///
    /// The whole batch is one transaction: either every missing
    /// agreement is inserted or none is.
    pub fn seed(&self, agreements: &[Agreement]) -> Result<usize, CatalogError> {
        for agreement in agreements {
            validate_agreement(agreement)?;
        }
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for agreement in agreements {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM agreements WHERE key = ?1",
                    params![agreement.key],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                write_agreement(&tx, agreement)?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Every write, seeding included, runs inside a transaction that
        // rolls back when dropped, so a poisoned guard still holds a
        // consistent database.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AgreementRepository for SqliteCatalog {
    fn get(&self, key: &str) -> Result<Agreement, CatalogError> {
        let conn = self.lock();
        load_agreement(&conn, key)
    }

    fn list_all(&self) -> Result<Vec<Agreement>, CatalogError> {
        let conn = self.lock();
        let keys = {
            let mut stmt = conn.prepare("SELECT key FROM agreements ORDER BY name ASC, key ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        keys.iter().map(|key| load_agreement(&conn, key)).collect()
    }

    fn query(&self, query: &CatalogQuery) -> Result<Page<AgreementSummary>, CatalogError> {
        let (clause, mut args) = where_clause(query);
        let limit = query.effective_limit();
        let conn = self.lock();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM agreements a{clause}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT a.key, a.name, a.sector, a.sector_category, a.issuer, a.issuer_class, \
             a.valid_from, a.valid_to, a.owner, \
             (SELECT COUNT(*) FROM levels l WHERE l.agreement_key = a.key) \
             FROM agreements a{clause} ORDER BY a.{} {}, a.key ASC LIMIT ? OFFSET ?",
            sort_column(query.sort),
            sort_direction(query.direction),
        );
        args.push(Value::Integer(to_i64(limit)));
        args.push(Value::Integer(to_i64(query.offset)));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok((
                AgreementSummary {
                    key: row.get(0)?,
                    name: row.get(1)?,
                    sector: row.get(2)?,
                    sector_category: row.get(3)?,
                    issuer: row.get(4)?,
                    issuer_class: IssuerClass::House,
                    valid_from: row.get(6)?,
                    valid_to: row.get(7)?,
                    owner: row.get(8)?,
                    level_count: usize::try_from(row.get::<_, i64>(9)?).unwrap_or_default(),
                },
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut items = Vec::new();
        for row in rows {
            let (mut summary, class) = row?;
            summary.issuer_class = parse_column("agreements", &class)?;
            items.push(summary);
        }
        debug!(total, returned = items.len(), "catalog query");

        Ok(Page {
            items,
            total: usize::try_from(total).unwrap_or_default(),
            offset: query.offset,
            limit,
        })
    }

    fn upsert(&self, agreement: &Agreement) -> Result<(), CatalogError> {
        validate_agreement(agreement)?;
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        write_agreement(&tx, agreement)?;
        tx.commit()?;
        debug!(key = %agreement.key, levels = agreement.levels.len(), "stored agreement");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CatalogError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = delete_rows(&tx, key)?;
        tx.commit()?;
        if removed == 0 {
            return Err(CatalogError::NotFound(key.to_string()));
        }
        debug!(%key, "deleted agreement");
        Ok(())
    }
}

/// Replaces every row of `agreement` inside an open transaction.
fn write_agreement(tx: &Transaction<'_>, agreement: &Agreement) -> Result<(), CatalogError> {
    delete_rows(tx, &agreement.key)?;
    tx.execute(
        "INSERT INTO agreements \
         (key, name, sector, sector_category, issuer, issuer_class, valid_from, valid_to, owner) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            agreement.key,
            agreement.name,
            agreement.sector,
            agreement.sector_category,
            agreement.issuer,
            agreement.issuer_class.as_str(),
            agreement.valid_from,
            agreement.valid_to,
            agreement.owner,
        ],
    )?;
    let costs = &agreement.additional_costs;
    tx.execute(
        "INSERT INTO additional_costs (agreement_key, severance_rate, social_rate, other_rate) \
         VALUES (?1, ?2, ?3, ?4)",
        params![agreement.key, costs.severance_rate, costs.social_rate, costs.other_rate],
    )?;
    for (position, level) in agreement.levels.iter().enumerate() {
        tx.execute(
            "INSERT INTO levels (agreement_key, position, code, description, base_salary) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                agreement.key,
                to_i64(position),
                level.code,
                level.description,
                level.base_salary
            ],
        )?;
    }
    for (position, rule) in agreement.contributions.iter().enumerate() {
        let (is_percentage, amount, percentage, part_time_amount) = contribution_columns(&rule.amount);
        tx.execute(
            "INSERT INTO contribution_rules \
             (agreement_key, position, name, description, category, is_percentage, amount, percentage, part_time_amount) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                agreement.key,
                to_i64(position),
                rule.name,
                rule.description,
                rule.category.as_str(),
                is_percentage,
                amount,
                percentage,
                part_time_amount,
            ],
        )?;
    }
    Ok(())
}

/// Maps stored contribution columns onto a [`ContributionAmount`].
///
/// Fixed rows carrying one of the legacy bilateral body names and no
/// explicit part-time amount become employment-type dependent.
pub fn contribution_from_columns(
    name: &str,
    is_percentage: bool,
    amount: f64,
    percentage: f64,
    part_time_amount: Option<f64>,
) -> ContributionAmount {
    if is_percentage {
        return ContributionAmount::Percentage { rate: percentage };
    }
    match part_time_amount {
        Some(part_time) => ContributionAmount::ByEmploymentType {
            full_time: amount,
            part_time,
        },
        None if LEGACY_BILATERAL_NAMES.contains(&name.trim()) => ContributionAmount::ByEmploymentType {
            full_time: BILATERAL_FULL_TIME,
            part_time: BILATERAL_PART_TIME,
        },
        None => ContributionAmount::Fixed { amount },
    }
}

fn contribution_columns(amount: &ContributionAmount) -> (bool, f64, f64, Option<f64>) {
    match *amount {
        ContributionAmount::Fixed { amount } => (false, amount, 0.0, None),
        ContributionAmount::ByEmploymentType {
            full_time,
            part_time,
        } => (false, full_time, 0.0, Some(part_time)),
        ContributionAmount::Percentage { rate } => (true, 0.0, rate, None),
    }
}

fn load_agreement(conn: &Connection, key: &str) -> Result<Agreement, CatalogError> {
    let row = conn
        .query_row(
            "SELECT key, name, sector, sector_category, issuer, issuer_class, valid_from, valid_to, owner \
             FROM agreements WHERE key = ?1",
            params![key],
            |row| {
                Ok((
                    Agreement {
                        key: row.get(0)?,
                        name: row.get(1)?,
                        sector: row.get(2)?,
                        sector_category: row.get(3)?,
                        issuer: row.get(4)?,
                        issuer_class: IssuerClass::House,
                        valid_from: row.get(6)?,
                        valid_to: row.get(7)?,
                        owner: row.get(8)?,
                        levels: Vec::new(),
                        contributions: Vec::new(),
                        additional_costs: AdditionalCosts::default(),
                    },
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;
    let (mut agreement, class) = row.ok_or_else(|| CatalogError::NotFound(key.to_string()))?;
    agreement.issuer_class = parse_column("agreements", &class)?;

    agreement.additional_costs = conn
        .query_row(
            "SELECT severance_rate, social_rate, other_rate FROM additional_costs WHERE agreement_key = ?1",
            params![key],
            |row| {
                Ok(AdditionalCosts {
                    severance_rate: row.get(0)?,
                    social_rate: row.get(1)?,
                    other_rate: row.get(2)?,
                })
            },
        )
        .optional()?
        .unwrap_or_default();

    let mut stmt = conn.prepare(
        "SELECT code, description, base_salary FROM levels WHERE agreement_key = ?1 ORDER BY position",
    )?;
    agreement.levels = stmt
        .query_map(params![key], |row| {
            Ok(Level {
                code: row.get(0)?,
                description: row.get(1)?,
                base_salary: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT name, description, category, is_percentage, amount, percentage, part_time_amount \
         FROM contribution_rules WHERE agreement_key = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![key], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, f64>(5)?,
            row.get::<_, Option<f64>>(6)?,
        ))
    })?;
    for row in rows {
        let (name, description, category, is_percentage, amount, percentage, part_time) = row?;
        let category: ContributionCategory = parse_column("contribution_rules", &category)?;
        let amount = contribution_from_columns(&name, is_percentage, amount, percentage, part_time);
        agreement.contributions.push(ContributionRule {
            name,
            description,
            category,
            amount,
        });
    }
    Ok(agreement)
}

fn delete_rows(conn: &Connection, key: &str) -> Result<usize, CatalogError> {
    conn.execute("DELETE FROM contribution_rules WHERE agreement_key = ?1", params![key])?;
    conn.execute("DELETE FROM levels WHERE agreement_key = ?1", params![key])?;
    conn.execute("DELETE FROM additional_costs WHERE agreement_key = ?1", params![key])?;
    Ok(conn.execute("DELETE FROM agreements WHERE key = ?1", params![key])?)
}

fn where_clause(query: &CatalogQuery) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();
    if let Some(category) = &query.sector_category {
        conditions.push("a.sector_category = ?");
        args.push(Value::Text(category.clone()));
    }
    if let Some(class) = query.issuer_class {
        conditions.push("a.issuer_class = ?");
        args.push(Value::Text(class.as_str().to_string()));
    }
    if let Some(owner) = &query.owner {
        conditions.push("a.owner = ?");
        args.push(Value::Text(owner.clone()));
    }
    if let Some(term) = query.search_term() {
        conditions.push(
            "(unicode_lower(a.name) LIKE ? ESCAPE '\\' OR unicode_lower(a.sector) LIKE ? ESCAPE '\\' \
             OR unicode_lower(a.issuer) LIKE ? ESCAPE '\\')",
        );
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        for _ in 0..3 {
            args.push(Value::Text(pattern.clone()));
        }
    }
    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), args)
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn sort_column(column: SortColumn) -> &'static str {
    match column {
        SortColumn::Name => "name",
        SortColumn::Sector => "sector",
        SortColumn::Issuer => "issuer",
        SortColumn::ValidFrom => "valid_from",
        SortColumn::ValidTo => "valid_to",
    }
}

fn sort_direction(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

fn parse_column<T>(table: &'static str, raw: &str) -> Result<T, CatalogError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|err: T::Err| CatalogError::Corrupt {
        table,
        reason: err.to_string(),
    })
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
