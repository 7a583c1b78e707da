use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::report::safe_div;
use crate::types::{Money, MonthKey, Rate};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One month's summary in a historical series. Gap months appear zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub month: MonthKey,
    pub revenue: Money,
    pub expenses: Money,
    pub profit: Money,
}

impl TrendPoint {
    pub fn zero(month: MonthKey) -> Self {
        TrendPoint {
            month,
            revenue: Decimal::ZERO,
            expenses: Decimal::ZERO,
            profit: Decimal::ZERO,
        }
    }

    fn is_active(&self) -> bool {
        !self.revenue.is_zero() || !self.expenses.is_zero()
    }
}

/// Cohort metrics over an ordered monthly series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    /// Last month vs the month before; 0 on short series or a zero base.
    pub mom_revenue_change_percent: Rate,
    /// Last month vs twelve positions earlier. `None` both without enough
    /// history and when the base month had no revenue: growth against a
    /// zero base is undefined, not zero.
    pub yoy_revenue_change_percent: Option<Rate>,
    pub best_month: Option<MonthKey>,
    /// Profitable months over months with activity; gap months do not count
    /// against the franchise.
    pub profitable_months_ratio: Rate,
    pub average_margin: Rate,
}

/// Which series a forecast projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    Revenue,
    Expenses,
    Profit,
}

impl TrendMetric {
    fn value(&self, point: &TrendPoint) -> Decimal {
        match self {
            TrendMetric::Revenue => point.revenue,
            TrendMetric::Expenses => point.expenses,
            TrendMetric::Profit => point.profit,
        }
    }
}

// ---------------------------------------------------------------------------
// aggregate
// ---------------------------------------------------------------------------

/// Month-over-month, year-over-year and cohort metrics for a series.
pub fn aggregate(series: &[TrendPoint]) -> TrendSummary {
    let mom_revenue_change_percent = match series {
        [.., prev, last] if !prev.revenue.is_zero() => {
            (last.revenue - prev.revenue) / prev.revenue * dec!(100)
        }
        _ => Decimal::ZERO,
    };

    let yoy_revenue_change_percent = if series.len() >= 13 {
        let last = &series[series.len() - 1];
        let base = &series[series.len() - 13];
        if base.revenue.is_zero() {
            None
        } else {
            Some((last.revenue - base.revenue) / base.revenue * dec!(100))
        }
    } else {
        None
    };

    let mut best_month: Option<&TrendPoint> = None;
    for point in series {
        match best_month {
            Some(best) if point.revenue <= best.revenue => {}
            _ => best_month = Some(point),
        }
    }

    let active: Vec<&TrendPoint> = series.iter().filter(|p| p.is_active()).collect();
    let profitable = active.iter().filter(|p| p.revenue > p.expenses).count();
    let profitable_months_ratio = safe_div(
        Decimal::from(profitable as u64),
        Decimal::from(active.len() as u64),
    );

    let with_revenue: Vec<&&TrendPoint> =
        active.iter().filter(|p| !p.revenue.is_zero()).collect();
    let margin_sum: Decimal = with_revenue
        .iter()
        .map(|p| p.profit / p.revenue * dec!(100))
        .sum();
    let average_margin = safe_div(margin_sum, Decimal::from(with_revenue.len() as u64));

    TrendSummary {
        mom_revenue_change_percent,
        yoy_revenue_change_percent,
        best_month: best_month.map(|p| p.month),
        profitable_months_ratio,
        average_margin,
    }
}

// ---------------------------------------------------------------------------
// forecast
// ---------------------------------------------------------------------------

/// Least-squares projection of one metric `periods` months forward.
/// Needs at least two points; projections clamp at zero.
pub fn forecast(series: &[TrendPoint], metric: TrendMetric, periods: u32) -> Vec<Decimal> {
    let n = series.len();
    if n < 2 {
        return Vec::new();
    }

    let mut sum_x = Decimal::ZERO;
    let mut sum_y = Decimal::ZERO;
    let mut sum_xy = Decimal::ZERO;
    let mut sum_xx = Decimal::ZERO;
    for (i, point) in series.iter().enumerate() {
        let x = Decimal::from(i as u64);
        let y = metric.value(point);
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let n_dec = Decimal::from(n as u64);
    let denominator = n_dec * sum_xx - sum_x * sum_x;
    if denominator.is_zero() {
        return Vec::new();
    }
    let slope = (n_dec * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n_dec;

    (0..periods)
        .map(|i| {
            let x = Decimal::from((n + i as usize) as u64);
            (slope * x + intercept).max(Decimal::ZERO)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
