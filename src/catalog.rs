//! Agreement catalog access.
//!
//! The `catalog` module defines the [`AgreementRepository`] trait
//! through which the rest of the engine reads and writes agreements,
//! the query types used to filter and page through them, and a helper
//! for loading static agreement definitions from JSON files.

use crate::calculator::{validate_additional_costs, validate_contribution};
use crate::error::CatalogError;
use crate::models::{Agreement, ContributionAmount, IssuerClass};
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Page size used when a query does not set one.
pub const DEFAULT_PAGE_SIZE: usize = 20;
/// Largest page size a query may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Rule names that historically denoted the bilateral body fee before
/// the part-time amount was stored explicitly.  Stored rows with these
/// names and no part-time amount are read back as employment-type
/// dependent, so they cannot carry a flat amount.
pub(crate) const LEGACY_BILATERAL_NAMES: [&str; 2] = ["Ente Bilaterale ENGEB", "Contributo ENGEB"];

/// Persistent store of agreements.
///
/// Repositories must be thread-safe (`Send + Sync`) because the HTTP
/// layer shares one instance across requests.
pub trait AgreementRepository: Send + Sync {
    /// Fetches an agreement with its levels, rules and rates.
    fn get(&self, key: &str) -> Result<Agreement, CatalogError>;

    /// Returns every agreement ordered by name.
    fn list_all(&self) -> Result<Vec<Agreement>, CatalogError>;

    /// Returns one page of agreement summaries matching `query`.
    fn query(&self, query: &CatalogQuery) -> Result<Page<AgreementSummary>, CatalogError>;

    /// Creates or atomically replaces an agreement.
    fn upsert(&self, agreement: &Agreement) -> Result<(), CatalogError>;

    /// Deletes an agreement and everything it owns.
    fn delete(&self, key: &str) -> Result<(), CatalogError>;
}

/// Column a catalog page is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    Name,
    Sector,
    Issuer,
    /// Start of the validity window; agreements without one sort first.
    ValidFrom,
    ValidTo,
}

/// Order applied to the sort column.  Ties are always broken by key
/// ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Filters, ordering and window of a catalog query.  Every field is
/// optional so the struct can be deserialised straight from a query
/// string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogQuery {
    /// Exact match on [`Agreement::sector_category`].
    pub sector_category: Option<String>,
    /// Restricts results to house or competitor agreements.
    pub issuer_class: Option<IssuerClass>,
    /// Restricts results to custom agreements created by this user.
    pub owner: Option<String>,
    /// Case-insensitive text matched against name, sector and issuer.
    pub search: Option<String>,
    pub sort: SortColumn,
    pub direction: SortDirection,
    /// Number of matching rows to skip.
    pub offset: usize,
    /// Requested page size; see [`CatalogQuery::effective_limit`].
    pub limit: Option<usize>,
}

impl CatalogQuery {
    /// The page size to apply, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// The search text with surrounding whitespace removed, if any is left.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One window of a filtered result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matching rows before paging.
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Listing view of an agreement without its levels and rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementSummary {
    pub key: String,
    pub name: String,
    pub sector: String,
    pub sector_category: String,
    pub issuer: String,
    pub issuer_class: IssuerClass,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub owner: Option<String>,
    pub level_count: usize,
}

/// Checks the rules an agreement must satisfy before it is stored.
///
/// Besides the structural checks, rates and contribution amounts must
/// be ones [`calculate_cost`](crate::calculator::calculate_cost) would
/// accept, so a stored agreement can always be priced.
pub fn validate_agreement(agreement: &Agreement) -> Result<(), CatalogError> {
    if agreement.key.trim().is_empty() {
        return Err(CatalogError::Invalid("key must not be empty".into()));
    }
    if agreement.name.trim().is_empty() {
        return Err(CatalogError::Invalid("name must not be empty".into()));
    }
    if let (Some(from), Some(to)) = (agreement.valid_from, agreement.valid_to) {
        if from > to {
            return Err(CatalogError::Invalid(format!(
                "validity window ends ({to}) before it starts ({from})"
            )));
        }
    }
    if let Some(level) = agreement
        .levels
        .iter()
        .find(|l| !l.base_salary.is_finite() || l.base_salary < 0.0)
    {
        return Err(CatalogError::Invalid(format!(
            "level `{}` has invalid base salary {}",
            level.code, level.base_salary
        )));
    }
    validate_additional_costs(&agreement.additional_costs)
        .map_err(|err| CatalogError::Invalid(err.to_string()))?;
    for rule in &agreement.contributions {
        validate_contribution(&rule.amount)
            .map_err(|err| CatalogError::Invalid(format!("rule `{}`: {err}", rule.name)))?;
        if matches!(rule.amount, ContributionAmount::Fixed { .. })
            && LEGACY_BILATERAL_NAMES.contains(&rule.name.trim())
        {
            return Err(CatalogError::Invalid(format!(
                "rule `{}` is a bilateral body fee and needs full-time and part-time amounts",
                rule.name
            )));
        }
    }
    Ok(())
}

/// Load all agreement definitions from a directory.
///
/// Every `.json` file is parsed as an [`Agreement`].  Files that fail
/// to parse are logged and skipped; a missing directory yields an
/// empty list.
pub fn load_agreements_from_dir(path: &Path) -> Result<Vec<Agreement>> {
    let mut agreements = Vec::new();
    if !path.is_dir() {
        debug!(path = %path.display(), "seed directory not present");
        return Ok(agreements);
    }
    let mut entries = std::fs::read_dir(path)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let file = entry.path();
        if !entry.file_type()?.is_file() || file.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let data = std::fs::read_to_string(&file)?;
        match serde_json::from_str::<Agreement>(&data) {
            Ok(agreement) => agreements.push(agreement),
            Err(err) => warn!(file = %file.display(), %err, "skipping unparseable agreement"),
        }
    }
    Ok(agreements)
}
