//! # Metric Grading
//!
//! $$
//! \mathrm{GPA} = \frac{\sum_m p(g_m)\,w_m}{\sum_m w_m}
//! $$
//!
//! Letter grades per metric from fixed threshold ladders, calibrated so a
//! broad market index lands around a solid B, plus a weighted composite
//! grade. Stateless; everything is recomputed from a [`MetricsReport`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::metrics::MetricsReport;

/// Letter grade for one metric or the whole portfolio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Grade {
  A,
  B,
  C,
  D,
  F,
}

impl Grade {
  /// GPA points used by the composite average.
  pub fn points(self) -> f64 {
    match self {
      Grade::A => 4.0,
      Grade::B => 3.0,
      Grade::C => 2.0,
      Grade::D => 1.0,
      Grade::F => 0.0,
    }
  }
}

impl fmt::Display for Grade {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Grade::A => write!(f, "A"),
      Grade::B => write!(f, "B"),
      Grade::C => write!(f, "C"),
      Grade::D => write!(f, "D"),
      Grade::F => write!(f, "F"),
    }
  }
}

/// Metrics covered by the grading tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum GradedMetric {
  AnnualReturn,
  Sharpe,
  Sortino,
  MaxDrawdown,
  Volatility,
  Calmar,
  WinRate,
  BestMonth,
  WorstMonth,
  Alpha,
  Beta,
  AvgRecoveryDays,
}

impl fmt::Display for GradedMetric {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      GradedMetric::AnnualReturn => "Annual Return",
      GradedMetric::Sharpe => "Sharpe Ratio",
      GradedMetric::Sortino => "Sortino Ratio",
      GradedMetric::MaxDrawdown => "Max Drawdown",
      GradedMetric::Volatility => "Volatility",
      GradedMetric::Calmar => "Calmar Ratio",
      GradedMetric::WinRate => "Win Rate",
      GradedMetric::BestMonth => "Best Month",
      GradedMetric::WorstMonth => "Worst Month",
      GradedMetric::Alpha => "Alpha",
      GradedMetric::Beta => "Beta",
      GradedMetric::AvgRecoveryDays => "Avg Recovery Days",
    };
    write!(f, "{name}")
  }
}

/// Grades per metric.
pub type GradeBook = BTreeMap<GradedMetric, Grade>;

/// Grade a single metric value against its fixed threshold ladder.
///
/// Ladders are evaluated top-down and the first matching bound wins. Beta is
/// graded symmetrically by its distance from 1.0; volatility and recovery
/// days grade lower-is-better, everything else higher-is-better.
pub fn grade_metric(metric: GradedMetric, value: f64) -> Grade {
  match metric {
    GradedMetric::AnnualReturn => at_least(value, &[0.12, 0.08, 0.04, 0.0]),
    GradedMetric::Sharpe => at_least(value, &[1.0, 0.5, 0.2, 0.0]),
    GradedMetric::Sortino => at_least(value, &[1.5, 0.9, 0.5, 0.2]),
    GradedMetric::MaxDrawdown => at_least(value, &[-0.15, -0.25, -0.35, -0.50]),
    GradedMetric::Volatility => below(value, &[0.12, 0.16, 0.20, 0.25]),
    GradedMetric::Calmar => at_least(value, &[1.0, 0.5, 0.25, 0.1]),
    GradedMetric::WinRate => at_least(value, &[0.60, 0.55, 0.50, 0.45]),
    GradedMetric::BestMonth => at_least(value, &[0.12, 0.08, 0.04, 0.01]),
    GradedMetric::WorstMonth => at_least(value, &[-0.08, -0.12, -0.16, -0.20]),
    GradedMetric::Alpha => at_least(value, &[0.02, 0.005, -0.005, -0.02]),
    GradedMetric::Beta => within(value - 1.0, &[0.15, 0.30, 0.50, 0.70]),
    GradedMetric::AvgRecoveryDays => below(value, &[120.0, 240.0, 365.0, 540.0]),
  }
}

/// Grade every metric carried on a report.
///
/// Alpha and beta are graded only when the report has them (benchmark
/// supplied).
pub fn grade_report(report: &MetricsReport) -> GradeBook {
  let mut grades = GradeBook::new();

  grades.insert(
    GradedMetric::AnnualReturn,
    grade_metric(GradedMetric::AnnualReturn, report.annualized_return),
  );
  grades.insert(GradedMetric::Sharpe, grade_metric(GradedMetric::Sharpe, report.sharpe));
  grades.insert(
    GradedMetric::Sortino,
    grade_metric(GradedMetric::Sortino, report.sortino),
  );
  grades.insert(
    GradedMetric::MaxDrawdown,
    grade_metric(GradedMetric::MaxDrawdown, report.max_drawdown),
  );
  grades.insert(
    GradedMetric::Volatility,
    grade_metric(GradedMetric::Volatility, report.annualized_volatility),
  );
  grades.insert(GradedMetric::Calmar, grade_metric(GradedMetric::Calmar, report.calmar));
  grades.insert(
    GradedMetric::WinRate,
    grade_metric(GradedMetric::WinRate, report.win_rate),
  );
  grades.insert(
    GradedMetric::BestMonth,
    grade_metric(GradedMetric::BestMonth, report.best_month),
  );
  grades.insert(
    GradedMetric::WorstMonth,
    grade_metric(GradedMetric::WorstMonth, report.worst_month),
  );
  grades.insert(
    GradedMetric::AvgRecoveryDays,
    grade_metric(GradedMetric::AvgRecoveryDays, report.avg_recovery_days),
  );

  if let Some(alpha) = report.alpha {
    grades.insert(GradedMetric::Alpha, grade_metric(GradedMetric::Alpha, alpha));
  }
  if let Some(beta) = report.beta {
    grades.insert(GradedMetric::Beta, grade_metric(GradedMetric::Beta, beta));
  }

  grades
}

/// Weighted composite grade and its GPA score.
///
/// Risk-adjusted metrics dominate the weighting; metrics outside the fixed
/// table contribute a small residual weight. The average runs over the
/// metrics actually present in the book.
pub fn composite(grades: &GradeBook) -> (Grade, f64) {
  if grades.is_empty() {
    return (Grade::C, 2.0);
  }

  let mut weighted_sum = 0.0;
  let mut total_weight = 0.0;
  for (metric, grade) in grades {
    let weight = composite_weight(*metric);
    weighted_sum += grade.points() * weight;
    total_weight += weight;
  }

  let gpa = weighted_sum / total_weight;
  let letter = if gpa >= 3.5 {
    Grade::A
  } else if gpa >= 2.5 {
    Grade::B
  } else if gpa >= 1.5 {
    Grade::C
  } else if gpa >= 0.5 {
    Grade::D
  } else {
    Grade::F
  };

  (letter, gpa)
}

fn composite_weight(metric: GradedMetric) -> f64 {
  match metric {
    GradedMetric::Sharpe => 0.25,
    GradedMetric::Alpha => 0.20,
    GradedMetric::MaxDrawdown => 0.15,
    GradedMetric::AnnualReturn => 0.15,
    GradedMetric::Sortino => 0.10,
    GradedMetric::Calmar => 0.05,
    GradedMetric::Volatility => 0.05,
    GradedMetric::WinRate => 0.03,
    GradedMetric::Beta => 0.02,
    _ => 0.005,
  }
}

const LADDER: [Grade; 4] = [Grade::A, Grade::B, Grade::C, Grade::D];

fn at_least(value: f64, bounds: &[f64; 4]) -> Grade {
  for (bound, grade) in bounds.iter().zip(LADDER) {
    if value >= *bound {
      return grade;
    }
  }
  Grade::F
}

fn below(value: f64, bounds: &[f64; 4]) -> Grade {
  for (bound, grade) in bounds.iter().zip(LADDER) {
    if value < *bound {
      return grade;
    }
  }
  Grade::F
}

fn within(distance: f64, bounds: &[f64; 4]) -> Grade {
  for (bound, grade) in bounds.iter().zip(LADDER) {
    if distance.abs() <= *bound {
      return grade;
    }
  }
  Grade::F
}
