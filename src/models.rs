//! Data models for the CCNL Cost Engine.
//!
//! The `models` module defines the serialisable structs and enums
//! describing collective bargaining agreements (CCNL): their
//! professional levels, the percentage rates applied on top of base
//! salary and the contribution rules owed per employee.  These types
//! derive `Serialize` and `Deserialize` so they can be stored in the
//! catalog, loaded from static JSON definitions and exchanged over
//! HTTP.  Catalog agreements and user-created ("custom") agreements
//! share the same [`Agreement`] type and differ only in their
//! [`Agreement::owner`].

use crate::error::UnknownVariant;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A collective bargaining agreement together with everything needed
/// to price a position under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    /// Stable external key, e.g. `"commercio-confcommercio"`.
    pub key: String,
    /// Display name of the agreement.
    pub name: String,
    /// Economic sector the agreement covers.
    pub sector: String,
    /// Coarse industry tag used to filter the catalog.
    pub sector_category: String,
    /// The body (union/employer association) that signed the agreement.
    pub issuer: String,
    /// Whether this is one of our own agreements or a national one.
    pub issuer_class: IssuerClass,
    /// First day the agreement applies, if known.
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    /// Last day the agreement applies, if known.
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
    /// Creator of a custom agreement.  `None` for catalog agreements.
    #[serde(default)]
    pub owner: Option<String>,
    /// Professional levels in their stored order.  Not necessarily
    /// sorted by salary.
    #[serde(default)]
    pub levels: Vec<Level>,
    /// Contribution rules owed by the employer.
    #[serde(default)]
    pub contributions: Vec<ContributionRule>,
    /// Percentage rates applied on top of base salary.
    #[serde(default)]
    pub additional_costs: AdditionalCosts,
}

impl Agreement {
    /// Returns `true` when the agreement was created by an end user.
    pub fn is_custom(&self) -> bool {
        self.owner.is_some()
    }
}

/// Issuer classification used to split the catalog in two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuerClass {
    /// Agreements signed by our own organisation.
    House,
    /// Competitor or national agreements used as a benchmark.
    Competitor,
}

impl IssuerClass {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            IssuerClass::House => "house",
            IssuerClass::Competitor => "competitor",
        }
    }
}

impl FromStr for IssuerClass {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "house" => Ok(IssuerClass::House),
            "competitor" => Ok(IssuerClass::Competitor),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A professional grade within an agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Short code, e.g. `"Q"`, `"1"`, `"4S"`.
    pub code: String,
    /// Human description of the grade.
    #[serde(default)]
    pub description: String,
    /// Monthly gross base salary in EUR.
    pub base_salary: f64,
}

/// Percentage rates applied to base salary.  `6.5` means 6.5%.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdditionalCosts {
    /// Severance accrual (TFR).
    pub severance_rate: f64,
    /// Employer social security contributions.
    pub social_rate: f64,
    /// Other benefits.
    pub other_rate: f64,
}

/// Category tag of a contribution rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionCategory {
    /// Joint employer/union bodies (enti bilaterali).
    Bilateral,
    /// Company or sector welfare schemes.
    Welfare,
    /// Supplementary health funds.
    Health,
    /// Supplementary pension funds.
    Pension,
    /// Anything not covered above.
    Other,
}

impl ContributionCategory {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ContributionCategory::Bilateral => "bilateral",
            ContributionCategory::Welfare => "welfare",
            ContributionCategory::Health => "health",
            ContributionCategory::Pension => "pension",
            ContributionCategory::Other => "other",
        }
    }
}

impl FromStr for ContributionCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bilateral" => Ok(ContributionCategory::Bilateral),
            "welfare" => Ok(ContributionCategory::Welfare),
            "health" => Ok(ContributionCategory::Health),
            "pension" => Ok(ContributionCategory::Pension),
            "other" => Ok(ContributionCategory::Other),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A contribution owed by the employer for each employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionRule {
    /// Display name, e.g. `"Fondo Est"`.
    pub name: String,
    /// Free-text description shown next to the name.
    #[serde(default)]
    pub description: String,
    /// Category tag used to group rules.
    pub category: ContributionCategory,
    /// How the monthly amount is determined.
    pub amount: ContributionAmount,
}

/// How a contribution rule's monthly amount is determined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ContributionAmount {
    /// A fixed amount per employee per month.
    Fixed {
        /// Monthly amount in EUR.
        amount: f64,
    },
    /// A fixed amount per employee per month that depends on whether
    /// the employee works full time or part time (bilateral body fees).
    ByEmploymentType {
        /// Monthly amount for full-time employees.
        full_time: f64,
        /// Monthly amount for part-time employees.
        part_time: f64,
    },
    /// A percentage of base salary.
    Percentage {
        /// `1.5` means 1.5% of base salary.
        rate: f64,
    },
}

/// Whether the priced position is full time or part time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    /// Full-time position.  Used when nothing else is said.
    #[default]
    FullTime,
    /// Part-time position.
    PartTime,
}

impl EmploymentType {
    /// Maps the boolean part-time flag used by callers.
    pub fn from_part_time(part_time: bool) -> Self {
        if part_time {
            EmploymentType::PartTime
        } else {
            EmploymentType::FullTime
        }
    }
}

/// The priced breakdown of one position.  All amounts are monthly EUR
/// except `total_annual_cost`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostCalculation {
    /// Monthly gross base salary the breakdown was computed from.
    pub base_salary: f64,
    /// TFR accrual.
    pub severance_accrual: f64,
    /// Employer social security contributions.
    pub social_contribution: f64,
    /// Other benefits charged as a rate of base salary.
    pub other_benefits: f64,
    /// Sum of fixed and employment-type dependent contribution rules.
    pub fixed_contributions: f64,
    /// Sum of percentage-of-salary contribution rules.  Whether this
    /// is part of the totals depends on the
    /// [`PercentageRulePolicy`](crate::calculator::PercentageRulePolicy).
    pub percentage_contributions: f64,
    /// Base salary plus every cost counted towards the total.
    pub total_monthly_cost: f64,
    /// `total_monthly_cost` over twelve months.
    pub total_annual_cost: f64,
    /// Cost on top of base salary as a percentage of base salary.
    /// `None` when the base salary is zero.
    pub total_cost_percentage: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contribution_amount_uses_mode_tag() {
        let rule: ContributionRule = serde_json::from_value(json!({
            "name": "Ente Bilaterale ENGEB",
            "category": "bilateral",
            "amount": {"mode": "by_employment_type", "full_time": 10.0, "part_time": 5.0}
        }))
        .unwrap();
        assert_eq!(
            rule.amount,
            ContributionAmount::ByEmploymentType { full_time: 10.0, part_time: 5.0 }
        );
        assert_eq!(rule.description, "");
    }

    #[test]
    fn agreement_defaults_optional_fields() {
        let agreement: Agreement = serde_json::from_value(json!({
            "key": "k",
            "name": "N",
            "sector": "S",
            "sector_category": "commerce",
            "issuer": "I",
            "issuer_class": "competitor",
            "valid_from": "2024-01-01"
        }))
        .unwrap();
        assert_eq!(agreement.valid_from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert!(agreement.valid_to.is_none());
        assert!(agreement.levels.is_empty());
        assert!(!agreement.is_custom());
        assert_eq!(agreement.additional_costs, AdditionalCosts::default());
    }

    #[test]
    fn enum_storage_strings_round_trip() {
        for class in [IssuerClass::House, IssuerClass::Competitor] {
            assert_eq!(class.as_str().parse::<IssuerClass>().unwrap(), class);
        }
        assert_eq!(
            "pension".parse::<ContributionCategory>().unwrap(),
            ContributionCategory::Pension
        );
        assert!("nope".parse::<ContributionCategory>().is_err());
    }
}
