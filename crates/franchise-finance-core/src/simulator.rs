use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::report::{safe_div, FinancialReport};
use crate::types::{Money, Rate};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The what-if levers. Deltas apply against the baseline month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioInputs {
    /// Order volume change, e.g. 30 = +30%.
    pub volume_delta_percent: Decimal,
    /// Absolute change to the average ticket, in currency units.
    pub ticket_delta_absolute: Money,
    /// Riders hired (positive) or released (negative).
    pub rider_count_delta: i32,
    /// Variable cost drift after volume scaling; negative = efficiency gain.
    pub variable_cost_efficiency_delta_percent: Decimal,
}

/// The real month the simulation projects from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBaseline {
    pub revenue: Money,
    pub orders: u32,
    pub total_expenses: Money,
    /// Actual labor cost when known. Without it, labor is estimated as 60%
    /// of total expenses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salaries: Option<Money>,
}

impl ScenarioBaseline {
    pub fn from_report(report: &FinancialReport) -> Self {
        ScenarioBaseline {
            revenue: report.revenue,
            orders: report.orders,
            total_expenses: report.total_expenses,
            salaries: Some(report.fixed.salaries),
        }
    }
}

/// Structural risks detected in a projection. Evaluated independently;
/// order in the result is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioWarning {
    /// Projected volume growth outpaces available labor capacity.
    RiderSaturation,
    /// Projected margin below 5%.
    CriticalMargin,
}

impl fmt::Display for ScenarioWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioWarning::RiderSaturation => {
                write!(f, "Volume grows over 20% with no additional riders")
            }
            ScenarioWarning::CriticalMargin => {
                write!(f, "Projected margin falls below 5%")
            }
        }
    }
}

/// The projected month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub revenue: Money,
    pub expenses: Money,
    pub net_profit: Money,
    pub margin_percent: Rate,
    /// `None` means break-even is unreachable under this scenario.
    pub break_even_orders: Option<Decimal>,
    pub warnings: Vec<ScenarioWarning>,
}

// ---------------------------------------------------------------------------
// Constants of the approximation policy
// ---------------------------------------------------------------------------

/// Orders one rider absorbs per month.
const ORDERS_PER_RIDER: Decimal = dec!(300);
/// Labor share of expenses when salaries are unknown.
const LABOR_SHARE: Decimal = dec!(0.60);
/// Variable share of the non-labor remainder.
const VARIABLE_SHARE: Decimal = dec!(0.40);

const SATURATION_VOLUME_THRESHOLD: Decimal = dec!(20);
const CRITICAL_MARGIN_THRESHOLD: Decimal = dec!(5);

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

/// Project a full month under hypothetical deltas.
///
/// The baseline cost split is approximated when unknown: labor is the known
/// salary bill or 60% of expenses, variable cost is 40% of the remainder,
/// and whatever is left is fixed. Labor scales with rider headcount rather
/// than order volume; variable cost scales with volume and then with the
/// efficiency delta; fixed cost is invariant.
pub fn simulate(baseline: &ScenarioBaseline, inputs: &ScenarioInputs) -> ScenarioResult {
    let orders = Decimal::from(baseline.orders);

    // 1. Implicit baseline drivers.
    let base_ticket = safe_div(baseline.revenue, orders);
    let estimated_riders = (orders / ORDERS_PER_RIDER)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .max(dec!(2));
    let base_labor = baseline
        .salaries
        .unwrap_or(baseline.total_expenses * LABOR_SHARE);
    let base_variable = (baseline.total_expenses - base_labor) * VARIABLE_SHARE;
    let base_fixed = baseline.total_expenses - base_labor - base_variable;

    // 2-3. Volume and ticket deltas.
    let sim_orders = orders * (Decimal::ONE + inputs.volume_delta_percent / dec!(100));
    let sim_ticket = base_ticket + inputs.ticket_delta_absolute;
    let sim_revenue = sim_orders * sim_ticket;

    // 4. Labor scales with headcount, not volume.
    let cost_per_rider = safe_div(base_labor, estimated_riders);
    let sim_riders = (estimated_riders + Decimal::from(inputs.rider_count_delta)).max(dec!(1));
    let sim_labor = cost_per_rider * sim_riders;

    // 5. Variable cost scales with volume first, then efficiency.
    let raw_variable = safe_div(base_variable, orders) * sim_orders;
    let sim_variable =
        raw_variable * (Decimal::ONE + inputs.variable_cost_efficiency_delta_percent / dec!(100));

    // 6-7. Fixed cost is untouched.
    let sim_expenses = sim_labor + sim_variable + base_fixed;
    let sim_net_profit = sim_revenue - sim_expenses;
    let sim_margin = safe_div(sim_net_profit, sim_revenue) * dec!(100);

    // 8. Break-even under the simulated cost structure.
    let variable_cost_per_order = safe_div(sim_variable, sim_orders);
    let contribution_margin = sim_ticket - variable_cost_per_order;
    let break_even_orders = if contribution_margin > Decimal::ZERO {
        Some((base_fixed + sim_labor) / contribution_margin)
    } else {
        None
    };

    // 9. Risk warnings, order-stable.
    let mut warnings = Vec::new();
    if inputs.volume_delta_percent > SATURATION_VOLUME_THRESHOLD && inputs.rider_count_delta <= 0 {
        warnings.push(ScenarioWarning::RiderSaturation);
    }
    if sim_margin < CRITICAL_MARGIN_THRESHOLD {
        warnings.push(ScenarioWarning::CriticalMargin);
    }

    ScenarioResult {
        revenue: sim_revenue,
        expenses: sim_expenses,
        net_profit: sim_net_profit,
        margin_percent: sim_margin,
        break_even_orders,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// 3000 orders at a 12€ ticket; 18000€ salaries out of 30000€ expenses.
    /// 3000 / 300 = 10 estimated riders.
    fn baseline() -> ScenarioBaseline {
        ScenarioBaseline {
            revenue: dec!(36000),
            orders: 3000,
            total_expenses: dec!(30000),
            salaries: Some(dec!(18000)),
        }
    }

    fn no_deltas() -> ScenarioInputs {
        ScenarioInputs::default()
    }

    #[test]
    fn test_identity_scenario_reproduces_baseline() {
        let result = simulate(&baseline(), &no_deltas());
        assert_eq!(result.revenue, dec!(36000));
        assert_eq!(result.expenses, dec!(30000));
        assert_eq!(result.net_profit, dec!(6000));
        assert_eq!(result.warnings, Vec::new());
    }

    #[test]
    fn test_volume_growth_without_riders_emits_saturation() {
        let inputs = ScenarioInputs {
            volume_delta_percent: dec!(30),
            ..no_deltas()
        };
        let result = simulate(&baseline(), &inputs);
        assert!(result.warnings.contains(&ScenarioWarning::RiderSaturation));
        // sim_orders 3900, labor unchanged 18000, variable (4800/3000)*3900 = 6240
        assert_eq!(result.revenue, dec!(46800));
        assert_eq!(result.expenses, dec!(31440));
    }

    #[test]
    fn test_saturation_not_fired_when_riders_added() {
        let inputs = ScenarioInputs {
            volume_delta_percent: dec!(30),
            rider_count_delta: 2,
            ..no_deltas()
        };
        let result = simulate(&baseline(), &inputs);
        assert!(!result.warnings.contains(&ScenarioWarning::RiderSaturation));
    }

    #[test]
    fn test_saturation_not_fired_below_threshold() {
        let inputs = ScenarioInputs {
            volume_delta_percent: dec!(20),
            ..no_deltas()
        };
        let result = simulate(&baseline(), &inputs);
        assert!(!result.warnings.contains(&ScenarioWarning::RiderSaturation));
    }

    #[test]
    fn test_labor_scales_with_headcount_not_volume() {
        let more_riders = ScenarioInputs {
            rider_count_delta: 2,
            ..no_deltas()
        };
        let result = simulate(&baseline(), &more_riders);
        // cost per rider = 18000 / 10 = 1800; 12 riders = 21600
        assert_eq!(result.expenses, dec!(30000) + dec!(3600));
    }

    #[test]
    fn test_rider_floor_of_one() {
        let inputs = ScenarioInputs {
            rider_count_delta: -15,
            ..no_deltas()
        };
        let result = simulate(&baseline(), &inputs);
        // Headcount clamps at 1: labor 1800 instead of going negative.
        assert_eq!(result.expenses, dec!(1800) + dec!(4800) + dec!(7200));
    }

    #[test]
    fn test_estimated_riders_floor_of_two() {
        let small = ScenarioBaseline {
            revenue: dec!(3600),
            orders: 300,
            total_expenses: dec!(3000),
            salaries: Some(dec!(1800)),
        };
        let inputs = ScenarioInputs {
            rider_count_delta: 1,
            ..no_deltas()
        };
        // 300/300 rounds to 1, floored to 2 riders; +1 = 3 at 900 each.
        let result = simulate(&small, &inputs);
        let base_fixed = dec!(3000) - dec!(1800) - dec!(480);
        assert_eq!(result.expenses, dec!(2700) + dec!(480) + base_fixed);
    }

    #[test]
    fn test_unknown_salaries_use_sixty_percent_split() {
        let unknown = ScenarioBaseline {
            salaries: None,
            ..baseline()
        };
        let result = simulate(&unknown, &no_deltas());
        // labor = 18000 (60%), variable = 4800, fixed = 7200: same as known.
        assert_eq!(result.expenses, dec!(30000));
    }

    #[test]
    fn test_efficiency_delta_scales_variable_cost() {
        let inputs = ScenarioInputs {
            variable_cost_efficiency_delta_percent: dec!(-10),
            ..no_deltas()
        };
        let result = simulate(&baseline(), &inputs);
        // variable 4800 -> 4320
        assert_eq!(result.expenses, dec!(18000) + dec!(4320) + dec!(7200));
    }

    #[test]
    fn test_ticket_delta_moves_revenue() {
        let inputs = ScenarioInputs {
            ticket_delta_absolute: dec!(1),
            ..no_deltas()
        };
        let result = simulate(&baseline(), &inputs);
        assert_eq!(result.revenue, dec!(39000));
    }

    #[test]
    fn test_break_even_under_scenario() {
        let result = simulate(&baseline(), &no_deltas());
        // contribution = 12 - 4800/3000 = 10.4; (7200 + 18000) / 10.4
        assert_eq!(
            result.break_even_orders,
            Some(dec!(25200) / dec!(10.4))
        );
    }

    #[test]
    fn test_break_even_sentinel_when_ticket_collapses() {
        let inputs = ScenarioInputs {
            ticket_delta_absolute: dec!(-12),
            ..no_deltas()
        };
        let result = simulate(&baseline(), &inputs);
        assert_eq!(result.break_even_orders, None);
    }

    #[test]
    fn test_critical_margin_warning() {
        // Price cut pushes margin under 5%.
        let inputs = ScenarioInputs {
            ticket_delta_absolute: dec!(-1.8),
            ..no_deltas()
        };
        let result = simulate(&baseline(), &inputs);
        assert!(result.margin_percent < dec!(5));
        assert_eq!(result.warnings, vec![ScenarioWarning::CriticalMargin]);
    }

    #[test]
    fn test_warning_order_is_stable() {
        let inputs = ScenarioInputs {
            volume_delta_percent: dec!(25),
            ticket_delta_absolute: dec!(-4),
            ..no_deltas()
        };
        let result = simulate(&baseline(), &inputs);
        assert_eq!(
            result.warnings,
            vec![
                ScenarioWarning::RiderSaturation,
                ScenarioWarning::CriticalMargin
            ]
        );
    }

    #[test]
    fn test_zero_order_baseline_never_divides() {
        let empty = ScenarioBaseline {
            revenue: dec!(0),
            orders: 0,
            total_expenses: dec!(0),
            salaries: None,
        };
        let result = simulate(&empty, &no_deltas());
        assert_eq!(result.revenue, dec!(0));
        assert_eq!(result.margin_percent, dec!(0));
        assert_eq!(result.break_even_orders, None);
    }
}
