//! # Performance Metrics
//!
//! $$
//! S = \frac{R_a - r_f}{\sigma_a}, \qquad
//! \mathrm{DD}_t = \frac{W_t - \max_{s\le t} W_s}{\max_{s\le t} W_s}
//! $$
//!
//! Return/risk/ratio statistics and benchmark-relative alpha/beta computed
//! from a single portfolio return series at one risk-free rate.

use chrono::Datelike;
use chrono::NaiveDate;
use ndarray::Array1;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::error::PortfolioError;
use crate::series::ReturnSeries;

/// Fixed annualization factor (assumed trading days per year).
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Default annual risk-free rate used by metric computations.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Immutable snapshot of portfolio statistics for one return series.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsReport {
  /// Compounded return over the whole series.
  pub total_return: f64,
  /// Geometric annualization of the total return.
  pub annualized_return: f64,
  /// Sample standard deviation of daily returns, annualized.
  pub annualized_volatility: f64,
  /// Excess annualized return per unit of volatility; 0 when volatility is 0.
  pub sharpe: f64,
  /// Sharpe over downside-only volatility; 0 when there is no downside.
  pub sortino: f64,
  /// Most negative peak-to-trough decline of the wealth curve (≤ 0).
  pub max_drawdown: f64,
  /// Annualized return per unit of max drawdown; 0 when drawdown is 0.
  pub calmar: f64,
  /// Fraction of days with a positive return.
  pub win_rate: f64,
  /// Best compounded calendar-month return.
  pub best_month: f64,
  /// Worst compounded calendar-month return.
  pub worst_month: f64,
  /// Mean calendar-day length of closed drawdown episodes.
  pub avg_recovery_days: f64,
  /// CAPM-residual alpha, present when a benchmark was supplied.
  pub alpha: Option<f64>,
  /// Benchmark sensitivity, present when a benchmark was supplied.
  pub beta: Option<f64>,
}

/// Compute a [`MetricsReport`] from daily returns.
///
/// The benchmark, when supplied, is inner-joined with the portfolio series
/// on dates before alpha/beta are derived. Series of length 0 or 1 fail with
/// [`PortfolioError::InsufficientData`] rather than producing NaN.
pub fn compute_metrics(
  returns: &ReturnSeries,
  benchmark: Option<&ReturnSeries>,
  risk_free_rate: f64,
) -> Result<MetricsReport, PortfolioError> {
  let n = returns.len();
  if n < 2 {
    return Err(PortfolioError::InsufficientData {
      what: "portfolio metrics",
      needed: 2,
      got: n,
    });
  }

  let values = returns.values();
  let total_return = values.iter().map(|r| 1.0 + r).product::<f64>() - 1.0;
  let annualized_return = (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / n as f64) - 1.0;
  let annualized_volatility = values.iter().std_dev() * TRADING_DAYS_PER_YEAR.sqrt();

  let sharpe = if annualized_volatility > 0.0 {
    (annualized_return - risk_free_rate) / annualized_volatility
  } else {
    0.0
  };

  let downside: Vec<f64> = values.iter().copied().filter(|r| *r < 0.0).collect();
  let downside_volatility = if downside.len() >= 2 {
    downside.iter().std_dev() * TRADING_DAYS_PER_YEAR.sqrt()
  } else {
    0.0
  };
  let sortino = if downside_volatility > 0.0 {
    (annualized_return - risk_free_rate) / downside_volatility
  } else {
    0.0
  };

  let drawdown = drawdown_curve(values);
  let max_drawdown = drawdown.iter().copied().fold(0.0_f64, f64::min);
  let calmar = if max_drawdown != 0.0 {
    annualized_return / max_drawdown.abs()
  } else {
    0.0
  };

  let win_rate = values.iter().filter(|r| **r > 0.0).count() as f64 / n as f64;

  let monthly = monthly_returns(returns);
  let best_month = monthly.iter().map(|m| m.value).fold(f64::NEG_INFINITY, f64::max);
  let worst_month = monthly.iter().map(|m| m.value).fold(f64::INFINITY, f64::min);

  let avg_recovery_days = average_recovery_days(returns.dates(), &drawdown);

  let (alpha, beta) = match benchmark {
    Some(bench) => {
      let (a, b) = alpha_beta(returns, bench, annualized_return, risk_free_rate)?;
      (Some(a), Some(b))
    }
    None => (None, None),
  };

  Ok(MetricsReport {
    total_return,
    annualized_return,
    annualized_volatility,
    sharpe,
    sortino,
    max_drawdown,
    calmar,
    win_rate,
    best_month,
    worst_month,
    avg_recovery_days,
    alpha,
    beta,
  })
}

/// Compounded return per calendar month.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MonthlyReturn {
  /// Calendar year.
  pub year: i32,
  /// Calendar month, 1-12.
  pub month: u32,
  /// Compounded return over the month's observations.
  pub value: f64,
}

/// Compound daily returns into per-calendar-month returns.
pub fn monthly_returns(returns: &ReturnSeries) -> Vec<MonthlyReturn> {
  let mut out: Vec<MonthlyReturn> = Vec::new();

  for (date, &r) in returns.dates().iter().zip(returns.values().iter()) {
    match out.last_mut() {
      Some(m) if m.year == date.year() && m.month == date.month() => {
        m.value = (1.0 + m.value) * (1.0 + r) - 1.0;
      }
      _ => out.push(MonthlyReturn {
        year: date.year(),
        month: date.month(),
        value: r,
      }),
    }
  }

  out
}

/// Rolling Sharpe/Sortino series for renderers.
///
/// Entries are `None` during the warmup window and where the rolling
/// volatility vanishes.
#[derive(Clone, Debug)]
pub struct RollingRatios {
  /// Observation dates, aligned with the input series.
  pub dates: Vec<NaiveDate>,
  /// Rolling annualized mean return over rolling annualized volatility.
  pub sharpe: Vec<Option<f64>>,
  /// Same numerator over downside-clamped rolling volatility.
  pub sortino: Vec<Option<f64>>,
}

/// Compute rolling Sharpe and Sortino ratios over a trailing window.
pub fn rolling_ratios(
  returns: &ReturnSeries,
  window: usize,
) -> Result<RollingRatios, PortfolioError> {
  if window < 2 {
    return Err(PortfolioError::InvalidParameter(format!(
      "rolling window must be at least 2, got {window}"
    )));
  }
  if returns.len() < window {
    return Err(PortfolioError::InsufficientData {
      what: "rolling ratios",
      needed: window,
      got: returns.len(),
    });
  }

  let values = returns.values();
  let clamped: Array1<f64> = values.mapv(|r| r.min(0.0));

  let (means, stds) = rolling_mean_std(values, window);
  let (_, downside_stds) = rolling_mean_std(&clamped, window);

  let ratio = |mean: Option<f64>, std: Option<f64>| -> Option<f64> {
    let (m, s) = (mean?, std?);
    let r = (m * TRADING_DAYS_PER_YEAR) / (s * TRADING_DAYS_PER_YEAR.sqrt());
    r.is_finite().then_some(r)
  };

  let sharpe = means
    .iter()
    .zip(stds.iter())
    .map(|(m, s)| ratio(*m, *s))
    .collect();
  let sortino = means
    .iter()
    .zip(downside_stds.iter())
    .map(|(m, s)| ratio(*m, *s))
    .collect();

  Ok(RollingRatios {
    dates: returns.dates().to_vec(),
    sharpe,
    sortino,
  })
}

/// Rolling mean and sample standard deviation over a trailing window.
///
/// The first `window - 1` entries are `None`.
pub(crate) fn rolling_mean_std(
  values: &Array1<f64>,
  window: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
  let n = values.len();
  let mut means = vec![None; n];
  let mut stds = vec![None; n];

  let w = window as f64;
  let mut sum = 0.0;
  let mut sum_sq = 0.0;

  for i in 0..n {
    sum += values[i];
    sum_sq += values[i] * values[i];

    if i >= window {
      sum -= values[i - window];
      sum_sq -= values[i - window] * values[i - window];
    }

    if i + 1 >= window {
      let mean = sum / w;
      let var = ((sum_sq - w * mean * mean) / (w - 1.0)).max(0.0);
      means[i] = Some(mean);
      stds[i] = Some(var.sqrt());
    }
  }

  (means, stds)
}

/// Drawdown below the running peak of the cumulative wealth curve, per date.
pub(crate) fn drawdown_curve(values: &Array1<f64>) -> Array1<f64> {
  let mut out = Array1::zeros(values.len());
  let mut wealth = 1.0;
  let mut peak = f64::NEG_INFINITY;

  for (i, &r) in values.iter().enumerate() {
    wealth *= 1.0 + r;
    peak = peak.max(wealth);
    out[i] = (wealth - peak) / peak;
  }

  out
}

fn alpha_beta(
  returns: &ReturnSeries,
  benchmark: &ReturnSeries,
  annualized_return: f64,
  risk_free_rate: f64,
) -> Result<(f64, f64), PortfolioError> {
  let (portfolio, bench) = returns.inner_join(benchmark)?;
  let joined = bench.len();
  if joined < 2 {
    return Err(PortfolioError::InsufficientData {
      what: "alpha/beta",
      needed: 2,
      got: joined,
    });
  }

  // The 252 annualization factors on covariance and variance cancel.
  let mp = portfolio.iter().mean();
  let mb = bench.iter().mean();
  let mut covariance = 0.0;
  let mut bench_variance = 0.0;
  for (p, b) in portfolio.iter().zip(bench.iter()) {
    covariance += (p - mp) * (b - mb);
    bench_variance += (b - mb) * (b - mb);
  }
  covariance /= (joined - 1) as f64;
  bench_variance /= (joined - 1) as f64;

  let beta = if bench_variance > 1e-15 {
    covariance / bench_variance
  } else {
    1.0
  };

  let bench_total = bench.iter().map(|r| 1.0 + r).product::<f64>() - 1.0;
  let bench_annualized = (1.0 + bench_total).powf(TRADING_DAYS_PER_YEAR / joined as f64) - 1.0;

  let alpha = annualized_return - (risk_free_rate + beta * (bench_annualized - risk_free_rate));

  Ok((alpha, beta))
}

fn average_recovery_days(dates: &[NaiveDate], drawdown: &Array1<f64>) -> f64 {
  let mut episodes: Vec<i64> = Vec::new();
  let mut start: Option<NaiveDate> = None;

  for (date, &dd) in dates.iter().zip(drawdown.iter()) {
    match (dd < 0.0, start) {
      (true, None) => start = Some(*date),
      (false, Some(s)) => {
        episodes.push(date.signed_duration_since(s).num_days());
        start = None;
      }
      _ => {}
    }
  }

  if episodes.is_empty() {
    0.0
  } else {
    episodes.iter().sum::<i64>() as f64 / episodes.len() as f64
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;
  use chrono::NaiveDate;

  fn returns_from(values: &[f64]) -> ReturnSeries {
    let dates: Vec<NaiveDate> = (0..values.len())
      .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64))
      .collect();
    ReturnSeries::new(dates, values.to_vec()).unwrap()
  }

  #[test]
  fn worked_example_matches_reference_values() {
    let returns = returns_from(&[0.01, 0.02, -0.01, 0.03, -0.02]);
    let report = compute_metrics(&returns, None, DEFAULT_RISK_FREE_RATE).unwrap();

    assert_relative_eq!(report.total_return, 0.0294, epsilon = 1e-3);
    assert_relative_eq!(report.win_rate, 0.6, epsilon = 1e-12);
    assert_relative_eq!(report.max_drawdown, -0.0200, epsilon = 1e-3);
  }

  #[test]
  fn short_series_fail_instead_of_returning_nan() {
    let returns = returns_from(&[0.01]);
    let result = compute_metrics(&returns, None, DEFAULT_RISK_FREE_RATE);
    assert!(matches!(
      result,
      Err(PortfolioError::InsufficientData { needed: 2, got: 1, .. })
    ));
  }

  #[test]
  fn zero_volatility_gives_zero_ratios() {
    let returns = returns_from(&[0.0; 10]);
    let report = compute_metrics(&returns, None, DEFAULT_RISK_FREE_RATE).unwrap();

    assert_eq!(report.sharpe, 0.0);
    assert_eq!(report.sortino, 0.0);
    assert_eq!(report.calmar, 0.0);
    assert_eq!(report.max_drawdown, 0.0);
  }

  #[test]
  fn max_drawdown_stays_within_bounds() {
    let returns = returns_from(&[0.05, -0.2, 0.1, -0.3, 0.4, -0.1, 0.02]);
    let report = compute_metrics(&returns, None, DEFAULT_RISK_FREE_RATE).unwrap();

    assert!(report.max_drawdown <= 0.0);
    assert!(report.max_drawdown >= -1.0);
  }

  #[test]
  fn self_benchmark_has_unit_beta_and_zero_alpha() {
    let returns = returns_from(&[0.01, -0.02, 0.015, 0.005, -0.01, 0.02]);
    let report = compute_metrics(&returns, Some(&returns), DEFAULT_RISK_FREE_RATE).unwrap();

    assert_relative_eq!(report.beta.unwrap(), 1.0, epsilon = 1e-9);
    assert_relative_eq!(report.alpha.unwrap(), 0.0, epsilon = 1e-9);
  }

  #[test]
  fn flat_benchmark_defaults_beta_to_one() {
    let returns = returns_from(&[0.01, -0.02, 0.015, 0.005]);
    let bench = returns_from(&[0.0, 0.0, 0.0, 0.0]);
    let report = compute_metrics(&returns, Some(&bench), DEFAULT_RISK_FREE_RATE).unwrap();

    assert_relative_eq!(report.beta.unwrap(), 1.0, epsilon = 1e-12);
  }

  #[test]
  fn monthly_returns_compound_within_each_month() {
    let dates = vec![
      NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
      NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
      NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
    ];
    let returns = ReturnSeries::new(dates, vec![0.01, 0.02, -0.01]).unwrap();
    let monthly = monthly_returns(&returns);

    assert_eq!(monthly.len(), 2);
    assert_eq!((monthly[0].year, monthly[0].month), (2024, 1));
    assert_relative_eq!(monthly[0].value, 1.01 * 1.02 - 1.0, epsilon = 1e-12);
    assert_relative_eq!(monthly[1].value, -0.01, epsilon = 1e-12);
  }

  #[test]
  fn rolling_ratios_warm_up_before_reporting() {
    let returns = returns_from(&[0.01, 0.02, -0.01, 0.03, -0.02, 0.01]);
    let rolling = rolling_ratios(&returns, 3).unwrap();

    assert_eq!(rolling.sharpe.len(), 6);
    assert!(rolling.sharpe[0].is_none());
    assert!(rolling.sharpe[1].is_none());
    assert!(rolling.sharpe[2].is_some());
    assert!(rolling.sortino[2].is_some());
  }

  #[test]
  fn recovery_days_average_closed_episodes_only() {
    // Underwater after the day-2 loss, recovered the next day, and
    // underwater again at the end (open episode, not counted).
    let values = [0.0, -0.1, 0.2, 0.0, -0.05];
    let returns = returns_from(&values);
    let report = compute_metrics(&returns, None, DEFAULT_RISK_FREE_RATE).unwrap();

    // One closed episode: underwater on day 2, back at the peak on day 3.
    assert_relative_eq!(report.avg_recovery_days, 1.0, epsilon = 1e-12);
  }
}
