use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::FinanceError;
use crate::FinanceResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.21 = 21%). Never as percentages.
pub type Rate = Decimal;

// ---------------------------------------------------------------------------
// Month key
// ---------------------------------------------------------------------------

/// A calendar month in ISO `YYYY-MM` form. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> FinanceResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(FinanceError::InvalidInput {
                field: "month".into(),
                reason: format!("month must be 1-12, got {month}"),
            });
        }
        Ok(MonthKey { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month `n` calendar months earlier.
    pub fn minus_months(&self, n: u32) -> Self {
        let total = self.year as i64 * 12 + (self.month as i64 - 1) - n as i64;
        MonthKey {
            year: total.div_euclid(12) as i32,
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }

    /// Ascending run of `count` months ending at `self` inclusive.
    pub fn trailing_range(&self, count: u32) -> Vec<MonthKey> {
        (0..count).rev().map(|n| self.minus_months(n)).collect()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FinanceError::InvalidInput {
            field: "month".into(),
            reason: format!("expected YYYY-MM, got {s:?}"),
        };
        let (y, m) = s.split_once('-').ok_or_else(invalid)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        MonthKey::new(year, month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Cost classification
// ---------------------------------------------------------------------------

/// Every expense line the engine recognises. Breakdown order and the
/// VAT-deductibility table are both keyed on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    Salaries,
    Renting,
    Insurance,
    Services,
    Quota,
    OtherFixed,
    Gasoline,
    Repairs,
    PlatformFee,
    Royalty,
}

impl CostCategory {
    pub fn label(&self) -> &'static str {
        match self {
            CostCategory::Salaries => "Salaries",
            CostCategory::Renting => "Vehicle renting",
            CostCategory::Insurance => "Insurance",
            CostCategory::Services => "Professional services",
            CostCategory::Quota => "Self-employment quota",
            CostCategory::OtherFixed => "Other fixed costs",
            CostCategory::Gasoline => "Gasoline",
            CostCategory::Repairs => "Repairs",
            CostCategory::PlatformFee => "Platform fee",
            CostCategory::Royalty => "Royalty",
        }
    }
}

/// A cost field that may be entered as an absolute amount or as a rate
/// applied to revenue. The variant is always explicit; magnitude is never
/// used to guess.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CostAmount {
    Absolute(Money),
    Rate(Rate),
}

impl CostAmount {
    /// Resolve into a monetary amount against the month's revenue.
    pub fn resolve(&self, revenue: Money) -> Money {
        match self {
            CostAmount::Absolute(v) => *v,
            CostAmount::Rate(r) => revenue * r,
        }
    }

    fn validate(&self, field: &str) -> FinanceResult<()> {
        match self {
            CostAmount::Absolute(v) if *v < Decimal::ZERO => Err(FinanceError::InvalidInput {
                field: field.into(),
                reason: "amount cannot be negative".into(),
            }),
            CostAmount::Rate(r) if *r < Decimal::ZERO || *r > Decimal::ONE => {
                Err(FinanceError::InvalidInput {
                    field: field.into(),
                    reason: "rate must lie in [0, 1]".into(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl Default for CostAmount {
    fn default() -> Self {
        CostAmount::Absolute(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Monthly input
// ---------------------------------------------------------------------------

/// Lifecycle state of a month's raw input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputStatus {
    #[default]
    Draft,
    Submitted,
    Approved,
    Locked,
    Deleted,
}

/// Raw operational and accounting figures for one franchise-month.
/// Mutable until `status` reaches `Locked`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyInput {
    pub franchise_id: String,
    pub month: MonthKey,

    pub orders: u32,
    /// Manual revenue override. Used when present and positive; otherwise
    /// revenue derives from `orders × tariff.avg_ticket`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_revenue: Option<Money>,

    // Fixed costs
    pub salaries: Money,
    pub renting: Money,
    pub insurance: Money,
    pub services: Money,
    pub quota: Money,
    pub other_fixed: Money,

    // Variable costs
    pub gasoline: Money,
    pub repairs: Money,
    pub platform_fee: CostAmount,
    pub royalty: CostAmount,

    // Operational
    pub total_operational_hours: Decimal,
    pub total_shifts_count: u32,
    pub active_rider_count: u32,

    pub income_tax_withholding_percent: Decimal,

    pub status: InputStatus,
    pub last_updated: DateTime<Utc>,
}

impl MonthlyInput {
    /// The zero month: what a deleted or never-recorded period reads as.
    pub fn empty(franchise_id: impl Into<String>, month: MonthKey) -> Self {
        MonthlyInput {
            franchise_id: franchise_id.into(),
            month,
            orders: 0,
            reported_revenue: None,
            salaries: Decimal::ZERO,
            renting: Decimal::ZERO,
            insurance: Decimal::ZERO,
            services: Decimal::ZERO,
            quota: Decimal::ZERO,
            other_fixed: Decimal::ZERO,
            gasoline: Decimal::ZERO,
            repairs: Decimal::ZERO,
            platform_fee: CostAmount::default(),
            royalty: CostAmount::default(),
            total_operational_hours: Decimal::ZERO,
            total_shifts_count: 0,
            active_rider_count: 0,
            income_tax_withholding_percent: dec!(20),
            status: InputStatus::Draft,
            last_updated: DateTime::UNIX_EPOCH,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.status == InputStatus::Locked
    }

    /// Rejects malformed input before any computation runs. Degenerate but
    /// well-formed values (zero orders, zero revenue) pass.
    pub fn validate(&self) -> FinanceResult<()> {
        let monetary = [
            ("salaries", self.salaries),
            ("renting", self.renting),
            ("insurance", self.insurance),
            ("services", self.services),
            ("quota", self.quota),
            ("other_fixed", self.other_fixed),
            ("gasoline", self.gasoline),
            ("repairs", self.repairs),
        ];
        for (field, value) in monetary {
            if value < Decimal::ZERO {
                return Err(FinanceError::InvalidInput {
                    field: field.into(),
                    reason: "monetary field cannot be negative".into(),
                });
            }
        }
        if let Some(revenue) = self.reported_revenue {
            if revenue < Decimal::ZERO {
                return Err(FinanceError::InvalidInput {
                    field: "reported_revenue".into(),
                    reason: "monetary field cannot be negative".into(),
                });
            }
        }
        self.platform_fee.validate("platform_fee")?;
        self.royalty.validate("royalty")?;
        if self.total_operational_hours < Decimal::ZERO {
            return Err(FinanceError::InvalidInput {
                field: "total_operational_hours".into(),
                reason: "hours cannot be negative".into(),
            });
        }
        if self.income_tax_withholding_percent < Decimal::ZERO
            || self.income_tax_withholding_percent > dec!(100)
        {
            return Err(FinanceError::InvalidInput {
                field: "income_tax_withholding_percent".into(),
                reason: "withholding must lie in [0, 100]".into(),
            });
        }
        Ok(())
    }
}

/// Field-level patch for a `MonthlyInput`. Absent fields keep their current
/// value; present fields win (last-writer-wins merge).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialMonthlyInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_revenue: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salaries: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renting: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_fixed: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gasoline: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repairs: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_fee: Option<CostAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub royalty: Option<CostAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_operational_hours: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_shifts_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_rider_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub income_tax_withholding_percent: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InputStatus>,
}

impl PartialMonthlyInput {
    /// Merge this patch into `input`. Identity fields are untouched.
    pub fn apply_to(&self, input: &mut MonthlyInput) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = self.$field.clone() {
                    input.$field = v;
                })*
            };
        }
        merge!(
            orders,
            salaries,
            renting,
            insurance,
            services,
            quota,
            other_fixed,
            gasoline,
            repairs,
            platform_fee,
            royalty,
            total_operational_hours,
            total_shifts_count,
            active_rider_count,
            income_tax_withholding_percent,
            status,
        );
        if let Some(v) = self.reported_revenue {
            input.reported_revenue = Some(v);
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration boundaries
// ---------------------------------------------------------------------------

/// Host-supplied tariff defaults. Read-only from the engine's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffConfig {
    /// Default ticket price used when a month has no reported revenue.
    pub avg_ticket: Money,
}

impl Default for TariffConfig {
    fn default() -> Self {
        TariffConfig {
            avg_ticket: dec!(6.50),
        }
    }
}

/// Fiscal configuration. The deductibility classification is a declared
/// table, not inline logic; the default reflects the Spanish autónomo-style
/// regime (VAT recoverable on operating purchases, not on payroll,
/// insurance, renting or the self-employment quota).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxConfig {
    /// VAT-like sales tax rate applied to revenue and deductible expenses.
    pub sales_tax_rate: Rate,
    /// Income-tax withholding percent used when the month does not carry
    /// its own override.
    pub default_withholding_percent: Decimal,
    /// Expense categories whose input tax is deductible.
    pub deductible_categories: Vec<CostCategory>,
}

impl TaxConfig {
    pub fn is_deductible(&self, category: CostCategory) -> bool {
        self.deductible_categories.contains(&category)
    }
}

impl Default for TaxConfig {
    fn default() -> Self {
        TaxConfig {
            sales_tax_rate: dec!(0.21),
            default_withholding_percent: dec!(20),
            deductible_categories: vec![
                CostCategory::Gasoline,
                CostCategory::Repairs,
                CostCategory::PlatformFee,
                CostCategory::Royalty,
                CostCategory::Services,
                CostCategory::OtherFixed,
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_month_key_parse_and_display() {
        let key: MonthKey = "2025-03".parse().unwrap();
        assert_eq!(key.year(), 2025);
        assert_eq!(key.month(), 3);
        assert_eq!(key.to_string(), "2025-03");
    }

    #[test]
    fn test_month_key_rejects_malformed() {
        assert!("2025-13".parse::<MonthKey>().is_err());
        assert!("2025-0".parse::<MonthKey>().is_err());
        assert!("202503".parse::<MonthKey>().is_err());
        assert!("march".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_month_key_minus_months_crosses_year() {
        let key: MonthKey = "2025-02".parse().unwrap();
        assert_eq!(key.minus_months(1).to_string(), "2025-01");
        assert_eq!(key.minus_months(2).to_string(), "2024-12");
        assert_eq!(key.minus_months(14).to_string(), "2023-12");
    }

    #[test]
    fn test_trailing_range_is_ascending_and_inclusive() {
        let key: MonthKey = "2025-02".parse().unwrap();
        let range = key.trailing_range(3);
        let labels: Vec<String> = range.iter().map(|m| m.to_string()).collect();
        assert_eq!(labels, vec!["2024-12", "2025-01", "2025-02"]);
    }

    #[test]
    fn test_month_key_serde_round_trip() {
        let key: MonthKey = "2024-11".parse().unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2024-11\"");
        let back: MonthKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_cost_amount_resolution() {
        let absolute = CostAmount::Absolute(dec!(500));
        let rate = CostAmount::Rate(dec!(0.05));
        assert_eq!(absolute.resolve(dec!(10000)), dec!(500));
        assert_eq!(rate.resolve(dec!(10000)), dec!(500));
        assert_eq!(rate.resolve(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_cost_amount_rate_out_of_range() {
        let input = {
            let mut i = MonthlyInput::empty("f1", "2025-01".parse().unwrap());
            i.royalty = CostAmount::Rate(dec!(1.5));
            i
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_monetary_field() {
        let mut input = MonthlyInput::empty("f1", "2025-01".parse().unwrap());
        input.salaries = dec!(-1);
        let err = input.validate().unwrap_err();
        match err {
            FinanceError::InvalidInput { field, .. } => assert_eq!(field, "salaries"),
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_accepts_zero_month() {
        let input = MonthlyInput::empty("f1", "2025-01".parse().unwrap());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_partial_merge_is_field_level() {
        let mut input = MonthlyInput::empty("f1", "2025-01".parse().unwrap());
        input.orders = 900;
        input.salaries = dec!(4000);

        let patch = PartialMonthlyInput {
            salaries: Some(dec!(4500)),
            gasoline: Some(dec!(300)),
            ..Default::default()
        };
        patch.apply_to(&mut input);

        assert_eq!(input.orders, 900);
        assert_eq!(input.salaries, dec!(4500));
        assert_eq!(input.gasoline, dec!(300));
    }

    #[test]
    fn test_default_tax_config_classification() {
        let cfg = TaxConfig::default();
        assert!(cfg.is_deductible(CostCategory::Gasoline));
        assert!(cfg.is_deductible(CostCategory::Services));
        assert!(cfg.is_deductible(CostCategory::OtherFixed));
        assert!(!cfg.is_deductible(CostCategory::Salaries));
        assert!(!cfg.is_deductible(CostCategory::Insurance));
        assert!(!cfg.is_deductible(CostCategory::Renting));
        assert!(!cfg.is_deductible(CostCategory::Quota));
    }
}
