//! Labor cost calculation.
//!
//! The `calculator` module turns a monthly base salary, the
//! agreement's [`AdditionalCosts`] rates and its contribution rules
//! into a [`CostCalculation`].  The computation is pure: identical
//! inputs always yield identical outputs and nothing is mutated.

use crate::error::{CostError, UnknownVariant};
use crate::models::{AdditionalCosts, Agreement, ContributionAmount, CostCalculation, EmploymentType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Months used to annualise a monthly cost.
pub const MONTHS_PER_YEAR: f64 = 12.0;

/// Highest accepted percentage rate.
pub const MAX_RATE: f64 = 1000.0;

/// Whether percentage-of-salary contribution rules count towards the
/// monthly total.  Their amount is always reported in
/// [`CostCalculation::percentage_contributions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentageRulePolicy {
    /// Report percentage rules but leave them out of the totals.
    #[default]
    Exclude,
    /// Add percentage rules to the totals.
    Include,
}

impl FromStr for PercentageRulePolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclude" => Ok(PercentageRulePolicy::Exclude),
            "include" => Ok(PercentageRulePolicy::Include),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Calculates the monthly and annual cost of a position.
///
/// `agreement` supplies the contribution rules; when it is `None` only
/// the percentage rates in `additional_costs` apply.
///
/// # Errors
///
/// Returns [`CostError::InvalidInput`] when the salary is negative or
/// not finite, when a rate lies outside `[0, MAX_RATE]`, or when a
/// fixed contribution amount is negative.
pub fn calculate_cost(
    base_salary: f64,
    additional_costs: &AdditionalCosts,
    agreement: Option<&Agreement>,
    employment: EmploymentType,
    policy: PercentageRulePolicy,
) -> Result<CostCalculation, CostError> {
    validate_salary(base_salary)?;
    validate_additional_costs(additional_costs)?;

    let severance_accrual = percent_of(base_salary, additional_costs.severance_rate);
    let social_contribution = percent_of(base_salary, additional_costs.social_rate);
    let other_benefits = percent_of(base_salary, additional_costs.other_rate);

    let mut fixed_contributions = 0.0;
    let mut percentage_contributions = 0.0;
    for rule in agreement.map(|a| a.contributions.as_slice()).unwrap_or_default() {
        validate_contribution(&rule.amount)?;
        match rule.amount {
            ContributionAmount::Fixed { amount } => {
                fixed_contributions += amount;
            }
            ContributionAmount::ByEmploymentType {
                full_time,
                part_time,
            } => {
                let amount = match employment {
                    EmploymentType::FullTime => full_time,
                    EmploymentType::PartTime => part_time,
                };
                fixed_contributions += amount;
            }
            ContributionAmount::Percentage { rate } => {
                percentage_contributions += percent_of(base_salary, rate);
            }
        }
    }

    let mut total_monthly_cost =
        base_salary + severance_accrual + social_contribution + other_benefits + fixed_contributions;
    if policy == PercentageRulePolicy::Include {
        total_monthly_cost += percentage_contributions;
    }
    let total_annual_cost = total_monthly_cost * MONTHS_PER_YEAR;
    let total_cost_percentage = if base_salary == 0.0 {
        None
    } else {
        Some((total_monthly_cost - base_salary) / base_salary * 100.0)
    };

    Ok(CostCalculation {
        base_salary,
        severance_accrual,
        social_contribution,
        other_benefits,
        fixed_contributions,
        percentage_contributions,
        total_monthly_cost,
        total_annual_cost,
        total_cost_percentage,
    })
}

fn percent_of(base: f64, rate: f64) -> f64 {
    base * rate / 100.0
}

/// Checks the three percentage rates of an agreement.
///
/// # Errors
///
/// Returns [`CostError::InvalidInput`] naming the first rate outside
/// `[0, MAX_RATE]`.
pub fn validate_additional_costs(costs: &AdditionalCosts) -> Result<(), CostError> {
    validate_rate("severance_rate", costs.severance_rate)?;
    validate_rate("social_rate", costs.social_rate)?;
    validate_rate("other_rate", costs.other_rate)
}

/// Checks a contribution rule's amounts: fixed amounts must be
/// non-negative, percentage rates within `[0, MAX_RATE]`.
///
/// # Errors
///
/// Returns [`CostError::InvalidInput`] for the first invalid amount.
pub fn validate_contribution(amount: &ContributionAmount) -> Result<(), CostError> {
    match *amount {
        ContributionAmount::Fixed { amount } => validate_amount(amount),
        ContributionAmount::ByEmploymentType {
            full_time,
            part_time,
        } => {
            validate_amount(full_time)?;
            validate_amount(part_time)
        }
        ContributionAmount::Percentage { rate } => validate_rate("contribution rate", rate),
    }
}

fn validate_salary(base_salary: f64) -> Result<(), CostError> {
    if !base_salary.is_finite() {
        return Err(CostError::invalid("base_salary", "must be a finite number"));
    }
    if base_salary < 0.0 {
        return Err(CostError::invalid(
            "base_salary",
            format!("must not be negative, got {base_salary}"),
        ));
    }
    Ok(())
}

fn validate_rate(field: &'static str, rate: f64) -> Result<(), CostError> {
    if !rate.is_finite() || !(0.0..=MAX_RATE).contains(&rate) {
        return Err(CostError::invalid(
            field,
            format!("must be within [0, {MAX_RATE}], got {rate}"),
        ));
    }
    Ok(())
}

fn validate_amount(amount: f64) -> Result<(), CostError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(CostError::invalid(
            "contribution amount",
            format!("must be a non-negative number, got {amount}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContributionCategory, ContributionRule, IssuerClass, Level};
    use proptest::prelude::*;

    fn rule(name: &str, amount: ContributionAmount) -> ContributionRule {
        ContributionRule {
            name: name.into(),
            description: String::new(),
            category: ContributionCategory::Bilateral,
            amount,
        }
    }

    fn agreement(contributions: Vec<ContributionRule>) -> Agreement {
        Agreement {
            key: "test".into(),
            name: "Test".into(),
            sector: "Commercio".into(),
            sector_category: "commerce".into(),
            issuer: "Test".into(),
            issuer_class: IssuerClass::House,
            valid_from: None,
            valid_to: None,
            owner: None,
            levels: vec![Level {
                code: "1".into(),
                description: String::new(),
                base_salary: 1450.0,
            }],
            contributions,
            additional_costs: rates(),
        }
    }

    fn rates() -> AdditionalCosts {
        AdditionalCosts {
            severance_rate: 6.5,
            social_rate: 24.0,
            other_rate: 2.5,
        }
    }

    fn engeb() -> ContributionRule {
        rule(
            "Ente Bilaterale ENGEB",
            ContributionAmount::ByEmploymentType {
                full_time: 10.0,
                part_time: 5.0,
            },
        )
    }

    #[test]
    fn full_time_reference_scenario() {
        let a = agreement(vec![engeb()]);
        let calc = calculate_cost(
            1450.0,
            &rates(),
            Some(&a),
            EmploymentType::FullTime,
            PercentageRulePolicy::Exclude,
        )
        .unwrap();
        assert_eq!(calc.severance_accrual, 94.25);
        assert_eq!(calc.social_contribution, 348.0);
        assert_eq!(calc.other_benefits, 36.25);
        assert_eq!(calc.fixed_contributions, 10.0);
        assert_eq!(calc.total_monthly_cost, 1938.5);
        assert_eq!(calc.total_annual_cost, 23262.0);
    }

    #[test]
    fn part_time_only_changes_bilateral_fee() {
        let a = agreement(vec![engeb()]);
        let full = calculate_cost(
            1450.0,
            &rates(),
            Some(&a),
            EmploymentType::FullTime,
            PercentageRulePolicy::Exclude,
        )
        .unwrap();
        let part = calculate_cost(
            1450.0,
            &rates(),
            Some(&a),
            EmploymentType::PartTime,
            PercentageRulePolicy::Exclude,
        )
        .unwrap();
        assert_eq!(part.fixed_contributions, 5.0);
        assert_eq!(part.total_monthly_cost, 1933.5);
        assert_eq!(part.severance_accrual, full.severance_accrual);
        assert_eq!(part.social_contribution, full.social_contribution);
        assert_eq!(part.other_benefits, full.other_benefits);
    }

    #[test]
    fn totals_are_sum_of_components() {
        let a = agreement(vec![
            engeb(),
            rule("Fondo Est", ContributionAmount::Fixed { amount: 12.0 }),
        ]);
        for salary in [0.0, 1.0, 999.99, 1450.0, 3210.55] {
            let calc = calculate_cost(
                salary,
                &rates(),
                Some(&a),
                EmploymentType::FullTime,
                PercentageRulePolicy::Exclude,
            )
            .unwrap();
            let sum = calc.base_salary
                + calc.severance_accrual
                + calc.social_contribution
                + calc.other_benefits
                + calc.fixed_contributions;
            assert!((calc.total_monthly_cost - sum).abs() < 1e-9);
            assert_eq!(calc.total_annual_cost, calc.total_monthly_cost * 12.0);
        }
    }

    #[test]
    fn zero_rates_and_no_fixed_rules_cost_only_salary() {
        let zero = AdditionalCosts::default();
        let calc = calculate_cost(
            2000.0,
            &zero,
            None,
            EmploymentType::FullTime,
            PercentageRulePolicy::Exclude,
        )
        .unwrap();
        assert_eq!(calc.total_monthly_cost, 2000.0);
        assert_eq!(calc.total_cost_percentage, Some(0.0));
    }

    #[test]
    fn zero_salary_has_undefined_percentage() {
        let a = agreement(vec![engeb()]);
        let calc = calculate_cost(
            0.0,
            &rates(),
            Some(&a),
            EmploymentType::FullTime,
            PercentageRulePolicy::Exclude,
        )
        .unwrap();
        assert_eq!(calc.total_monthly_cost, 10.0);
        assert_eq!(calc.total_cost_percentage, None);
    }

    #[test]
    fn percentage_rules_follow_policy() {
        let a = agreement(vec![rule(
            "Previdenza complementare",
            ContributionAmount::Percentage { rate: 1.0 },
        )]);
        let excluded = calculate_cost(
            1000.0,
            &AdditionalCosts::default(),
            Some(&a),
            EmploymentType::FullTime,
            PercentageRulePolicy::Exclude,
        )
        .unwrap();
        assert_eq!(excluded.percentage_contributions, 10.0);
        assert_eq!(excluded.fixed_contributions, 0.0);
        assert_eq!(excluded.total_monthly_cost, 1000.0);

        let included = calculate_cost(
            1000.0,
            &AdditionalCosts::default(),
            Some(&a),
            EmploymentType::FullTime,
            PercentageRulePolicy::Include,
        )
        .unwrap();
        assert_eq!(included.total_monthly_cost, 1010.0);
        assert_eq!(included.total_cost_percentage, Some(1.0));
    }

    #[test]
    fn identical_inputs_yield_identical_outputs() {
        let a = agreement(vec![engeb()]);
        let run = || {
            calculate_cost(
                1234.56,
                &rates(),
                Some(&a),
                EmploymentType::PartTime,
                PercentageRulePolicy::Exclude,
            )
            .unwrap()
        };
        let (first, second) = (run(), run());
        assert_eq!(
            first.total_monthly_cost.to_bits(),
            second.total_monthly_cost.to_bits()
        );
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_invalid_inputs() {
        let err = calculate_cost(
            -1.0,
            &rates(),
            None,
            EmploymentType::FullTime,
            PercentageRulePolicy::Exclude,
        )
        .unwrap_err();
        assert!(matches!(err, CostError::InvalidInput { field: "base_salary", .. }));

        let bad = AdditionalCosts {
            social_rate: 1000.5,
            ..rates()
        };
        let err = calculate_cost(
            1000.0,
            &bad,
            None,
            EmploymentType::FullTime,
            PercentageRulePolicy::Exclude,
        )
        .unwrap_err();
        assert!(matches!(err, CostError::InvalidInput { field: "social_rate", .. }));

        assert!(calculate_cost(
            f64::NAN,
            &rates(),
            None,
            EmploymentType::FullTime,
            PercentageRulePolicy::Exclude,
        )
        .is_err());
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!(
            "Include".parse::<PercentageRulePolicy>().unwrap(),
            PercentageRulePolicy::Include
        );
        assert_eq!(
            "sometimes".parse::<PercentageRulePolicy>().unwrap_err(),
            UnknownVariant("sometimes".into())
        );
    }

    #[test]
    fn stored_rule_amounts_are_validated() {
        assert!(validate_contribution(&ContributionAmount::Fixed { amount: -1.0 }).is_err());
        assert!(validate_contribution(&ContributionAmount::ByEmploymentType {
            full_time: 10.0,
            part_time: -5.0
        })
        .is_err());
        assert!(validate_contribution(&ContributionAmount::Percentage { rate: 1000.1 }).is_err());
        assert!(validate_additional_costs(&rates()).is_ok());
    }

    fn rates_strategy() -> impl Strategy<Value = AdditionalCosts> {
        (0.0..=100.0f64, 0.0..=100.0f64, 0.0..=100.0f64).prop_map(|(severance, social, other)| {
            AdditionalCosts {
                severance_rate: severance,
                social_rate: social,
                other_rate: other,
            }
        })
    }

    proptest! {
        #[test]
        fn monthly_total_is_sum_of_components(
            salary in 0.0..100_000.0f64,
            costs in rates_strategy(),
            fixed in 0.0..500.0f64,
            part_time in any::<bool>()
        ) {
            let a = agreement(vec![
                engeb(),
                rule("Cassa", ContributionAmount::Fixed { amount: fixed }),
            ]);
            let calc = calculate_cost(
                salary,
                &costs,
                Some(&a),
                EmploymentType::from_part_time(part_time),
                PercentageRulePolicy::Exclude,
            )
            .unwrap();
            let sum = calc.base_salary
                + calc.severance_accrual
                + calc.social_contribution
                + calc.other_benefits
                + calc.fixed_contributions;
            prop_assert!((calc.total_monthly_cost - sum).abs() <= 1e-9 * sum.max(1.0));
            prop_assert_eq!(calc.total_annual_cost, calc.total_monthly_cost * 12.0);
            prop_assert_eq!(calc.total_cost_percentage.is_some(), salary > 0.0);
            let bilateral = if part_time { 5.0 } else { 10.0 };
            prop_assert!((calc.fixed_contributions - (fixed + bilateral)).abs() < 1e-9);
        }

        #[test]
        fn part_time_changes_only_bilateral_fee(
            salary in 0.0..100_000.0f64,
            costs in rates_strategy()
        ) {
            let a = agreement(vec![engeb()]);
            let price = |employment| {
                calculate_cost(salary, &costs, Some(&a), employment, PercentageRulePolicy::Exclude)
                    .unwrap()
            };
            let full = price(EmploymentType::FullTime);
            let part = price(EmploymentType::PartTime);
            prop_assert_eq!(full.fixed_contributions, 10.0);
            prop_assert_eq!(part.fixed_contributions, 5.0);
            prop_assert_eq!(part.severance_accrual, full.severance_accrual);
            prop_assert_eq!(part.social_contribution, full.social_contribution);
            prop_assert_eq!(part.other_benefits, full.other_benefits);
        }
    }
}
