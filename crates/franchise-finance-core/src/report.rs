use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::tax;
use crate::types::{CostCategory, Money, MonthlyInput, Rate, TariffConfig, TaxConfig};
use crate::FinanceResult;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Fixed cost block. `total` is the straight sum of the six lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedCosts {
    pub salaries: Money,
    pub renting: Money,
    pub insurance: Money,
    pub services: Money,
    pub quota: Money,
    pub other: Money,
    pub total: Money,
}

/// Variable cost block. Rate-tagged fields arrive already resolved
/// against revenue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableCosts {
    pub gasoline: Money,
    pub repairs: Money,
    pub platform_fee: Money,
    pub royalty: Money,
    pub total: Money,
}

/// Tax estimate embedded in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTaxes {
    pub sales_tax_collected: Money,
    pub sales_tax_deductible: Money,
    pub sales_tax_payable: Money,
    pub income_tax_payable: Money,
    /// Withholding percent the income tax was computed with.
    pub withholding_percent: Decimal,
    /// Cash to set aside: sales tax payable + income tax payable.
    pub total_reserve: Money,
    pub net_profit_post_tax: Money,
    pub margin_post_tax: Rate,
}

/// Per-order, per-hour and per-rider ratios. Every division is guarded:
/// a zero denominator yields zero, never NaN or infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub avg_ticket: Money,
    pub cost_per_order: Money,
    /// `None` means break-even is unreachable (contribution margin <= 0).
    pub break_even_orders: Option<Decimal>,
    pub profit_margin_percent: Rate,
    pub revenue_per_hour: Money,
    pub cost_per_hour: Money,
    pub profit_per_rider: Money,
}

/// One expense line of the ordered breakdown. Revenue never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownLine {
    pub category: CostCategory,
    pub value: Money,
}

/// The full derived financial picture of one franchise-month. Ephemeral:
/// always recomputed from `MonthlyInput`, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialReport {
    pub revenue: Money,
    pub orders: u32,
    pub fixed: FixedCosts,
    pub variable: VariableCosts,
    pub total_expenses: Money,
    pub net_profit: Money,
    pub taxes: ReportTaxes,
    pub metrics: ReportMetrics,
    pub breakdown: Vec<BreakdownLine>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Safe ratio: returns Decimal::ZERO when the denominator is zero.
pub(crate) fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

// ---------------------------------------------------------------------------
// compute_report
// ---------------------------------------------------------------------------

/// Turn a month's raw input into the full financial report: expense
/// breakdown, net profit, tax estimate and operating metrics.
///
/// Pure and deterministic. The only error is a validation failure on the
/// input itself; numerically degenerate months (zero orders, zero revenue)
/// compute to a zero report.
pub fn compute_report(
    input: &MonthlyInput,
    tariff: &TariffConfig,
    tax_config: &TaxConfig,
) -> FinanceResult<FinancialReport> {
    input.validate()?;

    let revenue = match input.reported_revenue {
        Some(r) if r > Decimal::ZERO => r,
        _ => Decimal::from(input.orders) * tariff.avg_ticket,
    };
    let orders = Decimal::from(input.orders);

    let fixed = FixedCosts {
        salaries: input.salaries,
        renting: input.renting,
        insurance: input.insurance,
        services: input.services,
        quota: input.quota,
        other: input.other_fixed,
        total: input.salaries
            + input.renting
            + input.insurance
            + input.services
            + input.quota
            + input.other_fixed,
    };

    let platform_fee = input.platform_fee.resolve(revenue);
    let royalty = input.royalty.resolve(revenue);
    let variable = VariableCosts {
        gasoline: input.gasoline,
        repairs: input.repairs,
        platform_fee,
        royalty,
        total: input.gasoline + input.repairs + platform_fee + royalty,
    };

    let total_expenses = fixed.total + variable.total;
    let net_profit = revenue - total_expenses;

    let breakdown = vec![
        BreakdownLine {
            category: CostCategory::Salaries,
            value: fixed.salaries,
        },
        BreakdownLine {
            category: CostCategory::Renting,
            value: fixed.renting,
        },
        BreakdownLine {
            category: CostCategory::Insurance,
            value: fixed.insurance,
        },
        BreakdownLine {
            category: CostCategory::Services,
            value: fixed.services,
        },
        BreakdownLine {
            category: CostCategory::Quota,
            value: fixed.quota,
        },
        BreakdownLine {
            category: CostCategory::OtherFixed,
            value: fixed.other,
        },
        BreakdownLine {
            category: CostCategory::Gasoline,
            value: variable.gasoline,
        },
        BreakdownLine {
            category: CostCategory::Repairs,
            value: variable.repairs,
        },
        BreakdownLine {
            category: CostCategory::PlatformFee,
            value: variable.platform_fee,
        },
        BreakdownLine {
            category: CostCategory::Royalty,
            value: variable.royalty,
        },
    ];

    let deductible_base: Money = breakdown
        .iter()
        .filter(|line| tax_config.is_deductible(line.category))
        .map(|line| line.value)
        .sum();

    let sales = tax::sales_tax_lines(revenue, deductible_base, tax_config.sales_tax_rate, dec!(0));
    let income_tax_payable =
        tax::income_tax_payable(net_profit, input.income_tax_withholding_percent);
    let net_profit_post_tax = net_profit - income_tax_payable;

    let taxes = ReportTaxes {
        sales_tax_collected: sales.collected,
        sales_tax_deductible: sales.deductible,
        sales_tax_payable: sales.payable,
        income_tax_payable,
        withholding_percent: input.income_tax_withholding_percent,
        total_reserve: sales.payable + income_tax_payable,
        net_profit_post_tax,
        margin_post_tax: safe_div(net_profit_post_tax, revenue) * dec!(100),
    };

    let avg_ticket = safe_div(revenue, orders);
    let variable_per_order = safe_div(variable.total, orders);
    let contribution_margin = avg_ticket - variable_per_order;
    let break_even_orders = if contribution_margin > Decimal::ZERO {
        Some(fixed.total / contribution_margin)
    } else {
        None
    };

    let riders = Decimal::from(input.active_rider_count);
    let metrics = ReportMetrics {
        avg_ticket,
        cost_per_order: safe_div(total_expenses, orders),
        break_even_orders,
        profit_margin_percent: safe_div(net_profit, revenue) * dec!(100),
        revenue_per_hour: safe_div(revenue, input.total_operational_hours),
        cost_per_hour: safe_div(total_expenses, input.total_operational_hours),
        profit_per_rider: safe_div(net_profit, riders),
    };

    Ok(FinancialReport {
        revenue,
        orders: input.orders,
        fixed,
        variable,
        total_expenses,
        net_profit,
        taxes,
        metrics,
        breakdown,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
