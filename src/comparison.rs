//! Side-by-side cost comparison.
//!
//! The `comparison` module prices one level of two agreements, scales
//! the annual costs to a workforce and reports the difference.  It
//! also prices every level of a single agreement at once; that table
//! is computed with [`rayon`] since levels are independent of each
//! other.

use crate::calculator::{calculate_cost, PercentageRulePolicy, MONTHS_PER_YEAR};
use crate::error::CostError;
use crate::models::{Agreement, CostCalculation, EmploymentType, Level};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Largest months-per-year multiplier accepted (13th and 14th month
/// salaries included).
pub const MAX_MONTHS_PER_YEAR: u32 = 14;

/// One side of a comparison: which agreement, which level and whether
/// the position is part time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub agreement_key: String,
    #[serde(default)]
    pub level_index: usize,
    #[serde(default)]
    pub part_time: bool,
}

/// Everything needed to compare two agreements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub first: Selection,
    pub second: Selection,
    pub headcount: u32,
    pub months_per_year: u32,
}

/// The priced result of one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideResult {
    pub agreement_key: String,
    pub agreement_name: String,
    /// The level index actually priced.
    pub level_index: usize,
    pub level_code: String,
    /// Set when the requested index was out of range and level 0 was
    /// priced instead.
    pub level_index_reset: bool,
    pub employment: EmploymentType,
    pub calculation: CostCalculation,
    /// Annual cost scaled by headcount and months per year.
    pub total_annual_cost: f64,
}

/// Two priced sides and the difference between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub first: SideResult,
    pub second: SideResult,
    pub headcount: u32,
    pub months_per_year: u32,
    /// `first.total_annual_cost - second.total_annual_cost`.
    pub delta: f64,
    /// `delta` relative to the first side, `None` when the first side
    /// costs nothing.
    pub delta_percentage: Option<f64>,
}

/// Cost of one level in a level cost table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelCost {
    pub index: usize,
    pub code: String,
    pub description: String,
    pub calculation: CostCalculation,
}

/// Resolves a requested level index against an agreement.
///
/// Indices past the end of the level list are reset to 0; the returned
/// flag reports whether that happened.
///
/// # Errors
///
/// Returns [`CostError::NoLevels`] when the agreement has no levels.
pub fn resolve_level(agreement: &Agreement, requested: usize) -> Result<(usize, &Level, bool), CostError> {
    if agreement.levels.is_empty() {
        return Err(CostError::NoLevels(agreement.key.clone()));
    }
    let (index, reset) = if requested >= agreement.levels.len() {
        (0, true)
    } else {
        (requested, false)
    };
    Ok((index, &agreement.levels[index], reset))
}

/// Compares `first` and `second` as selected by `request`.
///
/// The agreements must be the ones named by the request's selections;
/// looking them up is the caller's job.
///
/// # Errors
///
/// Returns [`CostError::InvalidInput`] for a zero headcount, a months
/// multiplier outside `1..=MAX_MONTHS_PER_YEAR` or a selection that
/// does not match the supplied agreement, and propagates calculation
/// errors.
pub fn compare(
    first: &Agreement,
    second: &Agreement,
    request: &ComparisonRequest,
    policy: PercentageRulePolicy,
) -> Result<Comparison, CostError> {
    if request.headcount == 0 {
        return Err(CostError::invalid("headcount", "must be at least 1"));
    }
    if !(1..=MAX_MONTHS_PER_YEAR).contains(&request.months_per_year) {
        return Err(CostError::invalid(
            "months_per_year",
            format!(
                "must be within 1..={MAX_MONTHS_PER_YEAR}, got {}",
                request.months_per_year
            ),
        ));
    }

    let first = price_side(first, &request.first, request, policy)?;
    let second = price_side(second, &request.second, request, policy)?;
    let delta = first.total_annual_cost - second.total_annual_cost;
    let delta_percentage = if first.total_annual_cost == 0.0 {
        None
    } else {
        Some(delta / first.total_annual_cost * 100.0)
    };
    debug!(
        first = %first.agreement_key,
        second = %second.agreement_key,
        delta,
        "compared agreements"
    );

    Ok(Comparison {
        first,
        second,
        headcount: request.headcount,
        months_per_year: request.months_per_year,
        delta,
        delta_percentage,
    })
}

fn price_side(
    agreement: &Agreement,
    selection: &Selection,
    request: &ComparisonRequest,
    policy: PercentageRulePolicy,
) -> Result<SideResult, CostError> {
    if agreement.key != selection.agreement_key {
        return Err(CostError::invalid(
            "agreement_key",
            format!(
                "selection names `{}` but agreement `{}` was supplied",
                selection.agreement_key, agreement.key
            ),
        ));
    }
    let (level_index, level, level_index_reset) = resolve_level(agreement, selection.level_index)?;
    let employment = EmploymentType::from_part_time(selection.part_time);
    let calculation = calculate_cost(
        level.base_salary,
        &agreement.additional_costs,
        Some(agreement),
        employment,
        policy,
    )?;
    let total_annual_cost = calculation.total_annual_cost
        * f64::from(request.headcount)
        * (f64::from(request.months_per_year) / MONTHS_PER_YEAR);

    Ok(SideResult {
        agreement_key: agreement.key.clone(),
        agreement_name: agreement.name.clone(),
        level_index,
        level_code: level.code.clone(),
        level_index_reset,
        employment,
        calculation,
        total_annual_cost,
    })
}

/// Prices every level of `agreement`, in level order.
///
/// # Errors
///
/// Returns [`CostError::NoLevels`] for an agreement without levels and
/// the first calculation error otherwise.
pub fn level_cost_table(
    agreement: &Agreement,
    employment: EmploymentType,
    policy: PercentageRulePolicy,
) -> Result<Vec<LevelCost>, CostError> {
    if agreement.levels.is_empty() {
        return Err(CostError::NoLevels(agreement.key.clone()));
    }
    agreement
        .levels
        .par_iter()
        .enumerate()
        .map(|(index, level)| {
            let calculation = calculate_cost(
                level.base_salary,
                &agreement.additional_costs,
                Some(agreement),
                employment,
                policy,
            )?;
            Ok::<_, CostError>(LevelCost {
                index,
                code: level.code.clone(),
                description: level.description.clone(),
                calculation,
            })
        })
        .collect()
}
