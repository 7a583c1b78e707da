use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::report::{safe_div, FinancialReport};
use crate::types::{CostCategory, Money, Rate};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Profitability,
    CostStructure,
}

/// A fixed remediation action attached to an alert. Catalog text, never
/// generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationStep {
    pub title: String,
    pub description: String,
}

/// Share of one expense line inside a ranked cost breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostShare {
    pub label: String,
    pub value: Money,
    pub percent: Rate,
}

/// A structured finding over a month's report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialAlert {
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    pub metric_value: Decimal,
    pub target_value: Decimal,
    pub diagnosis: String,
    pub remediation_steps: Vec<RemediationStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_breakdown: Option<Vec<CostShare>>,
}

// ---------------------------------------------------------------------------
// Thresholds and catalog
// ---------------------------------------------------------------------------

const MARGIN_CRITICAL: Decimal = dec!(8);
const MARGIN_WARNING: Decimal = dec!(12);
const MARGIN_TARGET: Decimal = dec!(20);
const COST_CONCENTRATION: Decimal = dec!(0.35);

fn profitability_remediation() -> Vec<RemediationStep> {
    vec![
        RemediationStep {
            title: "Price review".into(),
            description: "Raising the average ticket 5% recovers most of the margin gap".into(),
        },
        RemediationStep {
            title: "Recurring cost audit".into(),
            description: "Review subscriptions, maintenance contracts and service fees".into(),
        },
    ]
}

fn cost_structure_remediation(category: CostCategory) -> Vec<RemediationStep> {
    vec![
        RemediationStep {
            title: "Diversify suppliers".into(),
            description: format!(
                "Qualify a second supplier for {} before month end",
                category.label()
            ),
        },
        RemediationStep {
            title: "Volume negotiation".into(),
            description: "Negotiate a discount for half-yearly prepayment".into(),
        },
    ]
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

/// Scan a report for profitability and cost-structure problems.
///
/// Returns alerts ordered critical-first, then by magnitude of deviation
/// from the rule's target. An inactive month (zero revenue and zero
/// expenses) is healthy by definition and yields no alerts.
pub fn analyze(report: &FinancialReport) -> Vec<FinancialAlert> {
    if report.revenue.is_zero() && report.total_expenses.is_zero() {
        return Vec::new();
    }

    // (deviation, alert) pairs; deviation drives the within-severity order.
    let mut found: Vec<(Decimal, FinancialAlert)> = Vec::new();

    let margin = report.metrics.profit_margin_percent;
    if margin < MARGIN_WARNING {
        let critical = margin < MARGIN_CRITICAL;
        found.push((
            MARGIN_TARGET - margin,
            FinancialAlert {
                title: "Low operating margin".into(),
                description: if critical {
                    "The business is running in survival territory".into()
                } else {
                    "Profitability is below the franchise standard".into()
                },
                severity: if critical {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                },
                category: AlertCategory::Profitability,
                metric_value: margin,
                target_value: MARGIN_TARGET,
                diagnosis:
                    "Fixed costs absorb too much liquidity for the current sales volume".into(),
                remediation_steps: profitability_remediation(),
                cost_breakdown: None,
            },
        ));
    }

    // Labor is expected to dominate, so salaries never trigger this rule.
    for line in &report.breakdown {
        if line.category == CostCategory::Salaries {
            continue;
        }
        let share = safe_div(line.value, report.total_expenses);
        if share > COST_CONCENTRATION {
            let share_pct = share * dec!(100);
            found.push((
                share_pct - COST_CONCENTRATION * dec!(100),
                FinancialAlert {
                    title: "Cost concentration risk".into(),
                    description: format!(
                        "{} is a structural risk at {:.0}% of total expenses",
                        line.category.label(),
                        share_pct
                    ),
                    severity: AlertSeverity::Warning,
                    category: AlertCategory::CostStructure,
                    metric_value: share_pct,
                    target_value: COST_CONCENTRATION * dec!(100),
                    diagnosis: format!(
                        "The operation is fragile against price changes in {}",
                        line.category.label()
                    ),
                    remediation_steps: cost_structure_remediation(line.category),
                    cost_breakdown: Some(ranked_cost_shares(report)),
                },
            ));
        }
    }

    found.sort_by(|(dev_a, alert_a), (dev_b, alert_b)| {
        alert_a
            .severity
            .cmp(&alert_b.severity)
            .then(dev_b.cmp(dev_a))
    });
    found.into_iter().map(|(_, alert)| alert).collect()
}

/// Top expense lines by value, with their share of total expenses.
fn ranked_cost_shares(report: &FinancialReport) -> Vec<CostShare> {
    let mut lines: Vec<&crate::report::BreakdownLine> = report.breakdown.iter().collect();
    lines.sort_by(|a, b| b.value.cmp(&a.value));
    lines
        .into_iter()
        .take(3)
        .map(|line| CostShare {
            label: line.category.label().into(),
            value: line.value,
            percent: safe_div(line.value, report.total_expenses) * dec!(100),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
