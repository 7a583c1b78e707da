use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::report::FinancialReport;
use crate::types::{Money, TaxConfig};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Standalone tax liability view of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCalculation {
    pub sales_tax_collected: Money,
    pub sales_tax_deductible: Money,
    /// Net remittance, clamped at zero: a deductible surplus is carried,
    /// never refunded here.
    pub sales_tax_payable: Money,
    pub income_tax_payable: Money,
    pub total_tax_liability: Money,
    /// `net_profit - total_tax_liability`. Negative is a signal, not an error.
    pub safe_to_spend: Money,
}

pub(crate) struct SalesTaxLines {
    pub collected: Money,
    pub deductible: Money,
    pub payable: Money,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

pub(crate) fn sales_tax_lines(
    revenue: Money,
    deductible_base: Money,
    rate: Decimal,
    extra_collected: Money,
) -> SalesTaxLines {
    let collected = revenue * rate + extra_collected;
    let deductible = deductible_base * rate;
    SalesTaxLines {
        collected,
        deductible,
        payable: (collected - deductible).max(Decimal::ZERO),
    }
}

/// No liability on a loss month.
pub(crate) fn income_tax_payable(net_profit: Money, withholding_percent: Decimal) -> Money {
    if net_profit > Decimal::ZERO {
        net_profit * withholding_percent / dec!(100)
    } else {
        Decimal::ZERO
    }
}

/// Derive the sales-tax and income-tax liability of a computed report.
///
/// `extra_sales_tax_collected` covers tax collected outside the report's
/// revenue (e.g. invoiced extras). The deductible expense base is the sum
/// of breakdown lines whose category the `TaxConfig` classifies as
/// deductible; the withholding percent is the one the report was built with.
pub fn compute_taxes(
    report: &FinancialReport,
    config: &TaxConfig,
    extra_sales_tax_collected: Money,
) -> TaxCalculation {
    let deductible_base: Money = report
        .breakdown
        .iter()
        .filter(|line| config.is_deductible(line.category))
        .map(|line| line.value)
        .sum();

    let sales = sales_tax_lines(
        report.revenue,
        deductible_base,
        config.sales_tax_rate,
        extra_sales_tax_collected,
    );
    let income = income_tax_payable(report.net_profit, report.taxes.withholding_percent);
    let total_tax_liability = sales.payable + income;

    TaxCalculation {
        sales_tax_collected: sales.collected,
        sales_tax_deductible: sales.deductible,
        sales_tax_payable: sales.payable,
        income_tax_payable: income,
        total_tax_liability,
        safe_to_spend: report.net_profit - total_tax_liability,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::compute_report;
    use crate::types::{MonthlyInput, TariffConfig};
    use pretty_assertions::assert_eq;

    fn report_for(input: &MonthlyInput) -> FinancialReport {
        let tariff = TariffConfig {
            avg_ticket: dec!(10),
        };
        compute_report(input, &tariff, &TaxConfig::default()).unwrap()
    }

    fn base_input() -> MonthlyInput {
        let mut input = MonthlyInput::empty("f1", "2025-01".parse().unwrap());
        input.orders = 1000; // 10000€ revenue at the 10€ test tariff
        input.salaries = dec!(3000);
        input.gasoline = dec!(500);
        input
    }

    #[test]
    fn test_liability_and_safe_to_spend() {
        let report = report_for(&base_input());
        let taxes = compute_taxes(&report, &TaxConfig::default(), dec!(0));
        // collected = 10000 * 0.21 = 2100; deductible = 500 * 0.21 = 105
        assert_eq!(taxes.sales_tax_collected, dec!(2100));
        assert_eq!(taxes.sales_tax_deductible, dec!(105));
        assert_eq!(taxes.sales_tax_payable, dec!(1995));
        // profit = 10000 - 3500 = 6500; income tax = 1300
        assert_eq!(taxes.income_tax_payable, dec!(1300));
        assert_eq!(taxes.total_tax_liability, dec!(3295));
        assert_eq!(taxes.safe_to_spend, dec!(3205));
    }

    #[test]
    fn test_payable_clamped_when_deductible_exceeds_collected() {
        // 10000€ revenue collects 2100€; deductible expenses large enough
        // that input tax (2500€+) exceeds it.
        let mut input = base_input();
        input.salaries = dec!(0);
        input.gasoline = dec!(12000);
        let report = report_for(&input);
        let taxes = compute_taxes(&report, &TaxConfig::default(), dec!(0));
        assert!(taxes.sales_tax_deductible > taxes.sales_tax_collected);
        assert_eq!(taxes.sales_tax_payable, dec!(0));
    }

    #[test]
    fn test_extra_collected_is_added() {
        let report = report_for(&base_input());
        let with_extra = compute_taxes(&report, &TaxConfig::default(), dec!(300));
        let without = compute_taxes(&report, &TaxConfig::default(), dec!(0));
        assert_eq!(
            with_extra.sales_tax_collected,
            without.sales_tax_collected + dec!(300)
        );
        assert_eq!(
            with_extra.sales_tax_payable,
            without.sales_tax_payable + dec!(300)
        );
    }

    #[test]
    fn test_no_income_tax_on_loss() {
        let mut input = base_input();
        input.salaries = dec!(15000);
        let report = report_for(&input);
        assert!(report.net_profit < dec!(0));
        let taxes = compute_taxes(&report, &TaxConfig::default(), dec!(0));
        assert_eq!(taxes.income_tax_payable, dec!(0));
    }

    #[test]
    fn test_safe_to_spend_may_go_negative() {
        let mut input = base_input();
        // Barely profitable month still owes net VAT.
        input.salaries = dec!(9500);
        input.gasoline = dec!(400);
        let report = report_for(&input);
        let taxes = compute_taxes(&report, &TaxConfig::default(), dec!(0));
        assert!(report.net_profit > dec!(0));
        assert!(taxes.safe_to_spend < dec!(0));
    }

    #[test]
    fn test_custom_classification_table() {
        let config = TaxConfig {
            deductible_categories: vec![crate::types::CostCategory::Renting],
            ..TaxConfig::default()
        };
        let mut input = base_input();
        input.renting = dec!(1000);
        let report = compute_report(
            &input,
            &TariffConfig {
                avg_ticket: dec!(10),
            },
            &config,
        )
        .unwrap();
        let taxes = compute_taxes(&report, &config, dec!(0));
        // Only renting deducts: 1000 * 0.21
        assert_eq!(taxes.sales_tax_deductible, dec!(210));
    }

    #[test]
    fn test_agrees_with_report_embedded_taxes() {
        let report = report_for(&base_input());
        let taxes = compute_taxes(&report, &TaxConfig::default(), dec!(0));
        assert_eq!(taxes.sales_tax_collected, report.taxes.sales_tax_collected);
        assert_eq!(taxes.sales_tax_payable, report.taxes.sales_tax_payable);
        assert_eq!(taxes.income_tax_payable, report.taxes.income_tax_payable);
    }
}
