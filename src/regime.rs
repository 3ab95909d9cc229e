//! # Market Regimes
//!
//! $$
//! \bar r_t = \tfrac{252}{L}\sum_{s=t-L+1}^{t} r_s, \qquad
//! \hat\sigma_t = \sqrt{252}\,\sigma(r_{t-L+1..t})
//! $$
//!
//! Five-state market-condition labeling from rolling annualized return and
//! volatility. The volatility threshold is the median of every rolling
//! volatility in the sample, computed in one pass over the full series, so
//! each label depends on future data. Fine for historical analysis,
//! unsuitable for live classification.

use std::fmt;

use ndarray::Array1;
use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::debug;

use crate::error::PortfolioError;
use crate::metrics::rolling_mean_std;
use crate::metrics::TRADING_DAYS_PER_YEAR;
use crate::series::ReturnSeries;

/// Default trailing window for the rolling statistics.
pub const DEFAULT_LOOKBACK: usize = 60;

/// Annualized return threshold separating trending from sideways markets.
pub const TREND_THRESHOLD: f64 = 0.02;

/// Market-condition label for a single time point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Regime {
  /// Positive trend, volatility at or below the sample median.
  BullLowVol,
  /// Positive trend, volatility above the sample median.
  BullHighVol,
  /// Trend within the ±2% annualized band.
  Sideways,
  /// Negative trend, volatility at or below the sample median.
  BearLowVol,
  /// Negative trend, volatility above the sample median.
  BearHighVol,
}

impl Regime {
  /// All regimes in display order.
  pub const ALL: [Regime; 5] = [
    Regime::BullLowVol,
    Regime::BullHighVol,
    Regime::Sideways,
    Regime::BearLowVol,
    Regime::BearHighVol,
  ];
}

impl fmt::Display for Regime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Regime::BullLowVol => write!(f, "Bull Market (Low Vol)"),
      Regime::BullHighVol => write!(f, "Bull Market (High Vol)"),
      Regime::Sideways => write!(f, "Sideways/Choppy"),
      Regime::BearLowVol => write!(f, "Bear Market (Low Vol)"),
      Regime::BearHighVol => write!(f, "Bear Market (High Vol)"),
    }
  }
}

/// Label every time point of a return series with a market regime.
///
/// Labels are `None` for the first `lookback - 1` points, before the rolling
/// window fills. Fails with [`PortfolioError::InsufficientData`] when the
/// series is shorter than one lookback window.
pub fn classify_regimes(
  returns: &ReturnSeries,
  lookback: usize,
) -> Result<Vec<Option<Regime>>, PortfolioError> {
  if lookback < 2 {
    return Err(PortfolioError::InvalidParameter(format!(
      "regime lookback must be at least 2, got {lookback}"
    )));
  }
  if returns.len() < lookback {
    return Err(PortfolioError::InsufficientData {
      what: "regime classification",
      needed: lookback,
      got: returns.len(),
    });
  }

  let (means, stds) = rolling_mean_std(returns.values(), lookback);

  let ann_returns: Vec<Option<f64>> = means
    .iter()
    .map(|m| m.map(|v| v * TRADING_DAYS_PER_YEAR))
    .collect();
  let ann_vols: Vec<Option<f64>> = stds
    .iter()
    .map(|s| s.map(|v| v * TRADING_DAYS_PER_YEAR.sqrt()))
    .collect();

  let mut observed: Vec<f64> = ann_vols.iter().flatten().copied().collect();
  let vol_median = median(&mut observed);
  debug!(lookback, vol_median, "classifying regimes");

  let labels = ann_returns
    .iter()
    .zip(ann_vols.iter())
    .map(|(ret, vol)| match (ret, vol) {
      (Some(ret), Some(vol)) => Some(classify_point(*ret, *vol, vol_median)),
      _ => None,
    })
    .collect();

  Ok(labels)
}

fn classify_point(ann_return: f64, ann_vol: f64, vol_median: f64) -> Regime {
  if ann_return > TREND_THRESHOLD {
    if ann_vol <= vol_median {
      Regime::BullLowVol
    } else {
      Regime::BullHighVol
    }
  } else if ann_return < -TREND_THRESHOLD {
    if ann_vol <= vol_median {
      Regime::BearLowVol
    } else {
      Regime::BearHighVol
    }
  } else {
    Regime::Sideways
  }
}

/// Per-regime performance summary.
#[derive(Clone, Debug, Serialize)]
pub struct RegimeStats {
  /// Regime the statistics describe.
  pub regime: Regime,
  /// Number of labeled observations in the regime.
  pub count: usize,
  /// Mean daily return within the regime.
  pub mean_daily_return: f64,
  /// Annualized sample volatility within the regime; 0 for singleton regimes.
  pub annualized_volatility: f64,
  /// Best single-day return within the regime.
  pub best_day: f64,
  /// Worst single-day return within the regime.
  pub worst_day: f64,
  /// Fraction of positive days within the regime.
  pub win_rate: f64,
}

/// Group-by reduction of returns over their regime labels.
///
/// Warmup points (`None` labels) are excluded. Regimes with no observations
/// are omitted from the result.
pub fn aggregate_by_regime(
  returns: &ReturnSeries,
  labels: &[Option<Regime>],
) -> Result<Vec<RegimeStats>, PortfolioError> {
  if labels.len() != returns.len() {
    return Err(PortfolioError::InvalidParameter(format!(
      "{} labels for {} returns",
      labels.len(),
      returns.len()
    )));
  }

  let mut stats = Vec::new();
  for regime in Regime::ALL {
    let bucket: Array1<f64> = returns
      .values()
      .iter()
      .zip(labels.iter())
      .filter(|(_, label)| **label == Some(regime))
      .map(|(r, _)| *r)
      .collect();

    if bucket.is_empty() {
      continue;
    }

    let count = bucket.len();
    let annualized_volatility = if count >= 2 {
      bucket.iter().std_dev() * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
      0.0
    };

    stats.push(RegimeStats {
      regime,
      count,
      mean_daily_return: bucket.iter().mean(),
      annualized_volatility,
      best_day: bucket.iter().copied().fold(f64::NEG_INFINITY, f64::max),
      worst_day: bucket.iter().copied().fold(f64::INFINITY, f64::min),
      win_rate: bucket.iter().filter(|r| **r > 0.0).count() as f64 / count as f64,
    });
  }

  Ok(stats)
}

fn median(xs: &mut [f64]) -> f64 {
  if xs.is_empty() {
    return 0.0;
  }

  xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
  let mid = xs.len() / 2;
  if xs.len() % 2 == 0 {
    (xs[mid - 1] + xs[mid]) / 2.0
  } else {
    xs[mid]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::NaiveDate;

  fn returns_from(values: &[f64]) -> ReturnSeries {
    let dates: Vec<NaiveDate> = (0..values.len())
      .map(|i| NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + chrono::Days::new(i as u64))
      .collect();
    ReturnSeries::new(dates, values.to_vec()).unwrap()
  }

  #[test]
  fn warmup_points_are_unlabeled() {
    let mut values = vec![0.0; 60];
    values.extend(vec![0.005; 60]);
    let labels = classify_regimes(&returns_from(&values), DEFAULT_LOOKBACK).unwrap();

    assert_eq!(labels.len(), 120);
    assert!(labels[..59].iter().all(Option::is_none));
    assert!(labels[59..].iter().all(Option::is_some));
  }

  #[test]
  fn sustained_rally_classifies_as_bull() {
    let mut values = vec![0.0; 60];
    values.extend(vec![0.005; 60]);
    let labels = classify_regimes(&returns_from(&values), DEFAULT_LOOKBACK).unwrap();

    // All-zero window right after warmup reads as sideways.
    assert_eq!(labels[59], Some(Regime::Sideways));
    for label in &labels[70..] {
      assert!(matches!(
        label,
        Some(Regime::BullLowVol) | Some(Regime::BullHighVol)
      ));
    }
  }

  #[test]
  fn sustained_selloff_classifies_as_bear() {
    let mut values = vec![0.0; 60];
    values.extend(vec![-0.005; 60]);
    let labels = classify_regimes(&returns_from(&values), DEFAULT_LOOKBACK).unwrap();

    for label in &labels[70..] {
      assert!(matches!(
        label,
        Some(Regime::BearLowVol) | Some(Regime::BearHighVol)
      ));
    }
  }

  #[test]
  fn short_series_fail_classification() {
    let result = classify_regimes(&returns_from(&[0.01; 10]), DEFAULT_LOOKBACK);
    assert!(matches!(
      result,
      Err(PortfolioError::InsufficientData { needed: 60, got: 10, .. })
    ));
  }

  #[test]
  fn aggregation_counts_labeled_points_only() {
    let mut values = vec![0.0; 60];
    values.extend(vec![0.005; 60]);
    let returns = returns_from(&values);
    let labels = classify_regimes(&returns, DEFAULT_LOOKBACK).unwrap();
    let stats = aggregate_by_regime(&returns, &labels).unwrap();

    let labeled = labels.iter().flatten().count();
    let total: usize = stats.iter().map(|s| s.count).sum();
    assert_eq!(total, labeled);

    for s in &stats {
      assert!(s.best_day >= s.worst_day);
      assert!(s.win_rate >= 0.0 && s.win_rate <= 1.0);
    }
  }

  #[test]
  fn label_length_must_match_series() {
    let returns = returns_from(&[0.01; 5]);
    let result = aggregate_by_regime(&returns, &[None; 3]);
    assert!(matches!(result, Err(PortfolioError::InvalidParameter(_))));
  }
}
