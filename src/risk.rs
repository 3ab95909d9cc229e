//! # Forward-Looking Risk
//!
//! $$
//! \mathrm{VaR}_q = F^{-1}(1-q), \qquad
//! \mathrm{CVaR}_q = \mathbb E\left[r \mid r \le \mathrm{VaR}_q\right]
//! $$
//!
//! Empirical tail-risk statistics and Normal-model Monte Carlo price-path
//! simulation. The simulation fits a single `Normal(mean, stdev)` to the
//! daily return sample and is fully determined by its seed, so identical
//! parameters reproduce identical paths regardless of thread scheduling.

use impl_new_derive::ImplNew;
use ndarray::parallel::prelude::*;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;
use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::debug;

use crate::error::PortfolioError;
use crate::metrics::drawdown_curve;
use crate::metrics::TRADING_DAYS_PER_YEAR;
use crate::series::ReturnSeries;

/// Default simulation horizon in trading days.
pub const DEFAULT_DAYS_FORWARD: usize = 252;

/// Default number of simulated paths.
pub const DEFAULT_NUM_PATHS: usize = 1000;

/// Percentiles reported by the scenario summaries.
pub const SCENARIO_PERCENTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];

/// Tail-risk snapshot for one return series.
#[derive(Clone, Debug, Serialize)]
pub struct ForwardRiskReport {
  /// Sample mean daily return, annualized arithmetically.
  pub expected_annual_return: f64,
  /// Sample daily volatility, annualized.
  pub expected_annual_volatility: f64,
  /// Empirical 5th-percentile daily return.
  pub var_95: f64,
  /// Empirical 1st-percentile daily return.
  pub var_99: f64,
  /// Mean daily return at or below `var_95`.
  pub cvar_95: f64,
  /// Mean daily return at or below `var_99`.
  pub cvar_99: f64,
  /// Fraction of days with a negative return.
  pub probability_of_loss: f64,
  /// Historical max drawdown, reported as the forward-risk estimate.
  pub max_drawdown: f64,
}

/// Compute the [`ForwardRiskReport`] for a return series.
pub fn compute_risk_metrics(returns: &ReturnSeries) -> Result<ForwardRiskReport, PortfolioError> {
  let n = returns.len();
  if n < 2 {
    return Err(PortfolioError::InsufficientData {
      what: "forward risk metrics",
      needed: 2,
      got: n,
    });
  }

  let values = returns.values();
  let expected_annual_return = values.iter().mean() * TRADING_DAYS_PER_YEAR;
  let expected_annual_volatility = values.iter().std_dev() * TRADING_DAYS_PER_YEAR.sqrt();

  let mut sorted: Vec<f64> = values.to_vec();
  sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

  let var_95 = empirical_quantile(&sorted, 0.05);
  let var_99 = empirical_quantile(&sorted, 0.01);
  let cvar_95 = tail_mean(&sorted, var_95);
  let cvar_99 = tail_mean(&sorted, var_99);

  let probability_of_loss = values.iter().filter(|r| **r < 0.0).count() as f64 / n as f64;
  let max_drawdown = drawdown_curve(values).iter().copied().fold(0.0_f64, f64::min);

  Ok(ForwardRiskReport {
    expected_annual_return,
    expected_annual_volatility,
    var_95,
    var_99,
    cvar_95,
    cvar_99,
    probability_of_loss,
    max_drawdown,
  })
}

/// Normal-model Monte Carlo simulation of normalized portfolio value paths.
#[derive(ImplNew)]
pub struct MonteCarlo {
  /// Mean daily return of the fitted Normal.
  pub mean: f64,
  /// Daily return standard deviation of the fitted Normal.
  pub std_dev: f64,
  /// Simulation horizon in trading days.
  pub days_forward: usize,
  /// Number of independent paths.
  pub num_paths: usize,
  /// Seed; identical seeds reproduce identical paths.
  pub seed: u64,
}

impl MonteCarlo {
  /// Fit the daily-return Normal from a historical series.
  pub fn fit(
    returns: &ReturnSeries,
    days_forward: usize,
    num_paths: usize,
    seed: u64,
  ) -> Result<Self, PortfolioError> {
    if returns.len() < 2 {
      return Err(PortfolioError::InsufficientData {
        what: "Monte Carlo calibration",
        needed: 2,
        got: returns.len(),
      });
    }

    let values = returns.values();
    Ok(Self::new(
      values.iter().mean(),
      values.iter().std_dev(),
      days_forward,
      num_paths,
      seed,
    ))
  }

  /// Run the simulation.
  ///
  /// Each path draws `days_forward` i.i.d. daily returns and compounds them
  /// from a normalized start of 1.0. Paths are generated in parallel with a
  /// per-path sub-seed derived from `seed`.
  pub fn simulate(&self) -> Result<SimulationPaths, PortfolioError> {
    if self.days_forward == 0 || self.num_paths == 0 {
      return Err(PortfolioError::InvalidParameter(format!(
        "simulation needs a positive horizon and path count, got {} x {}",
        self.days_forward, self.num_paths
      )));
    }

    let dist = Normal::new(self.mean, self.std_dev).map_err(|_| {
      PortfolioError::InvalidParameter(format!(
        "cannot fit Normal({}, {})",
        self.mean, self.std_dev
      ))
    })?;

    debug!(
      mean = self.mean,
      std_dev = self.std_dev,
      days = self.days_forward,
      paths = self.num_paths,
      "running Monte Carlo simulation"
    );

    let days = self.days_forward;
    let seed = self.seed;
    let mut values = Array2::<f64>::zeros((days, self.num_paths));

    values
      .axis_iter_mut(Axis(1))
      .into_par_iter()
      .enumerate()
      .for_each(|(path, mut col)| {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(path as u64));
        let draws = Array1::random_using(days, dist, &mut rng);

        let mut value = 1.0;
        for (day, draw) in draws.iter().enumerate() {
          value *= 1.0 + draw;
          col[day] = value;
        }
      });

    Ok(SimulationPaths { values })
  }
}

/// Dense grid of simulated normalized portfolio values.
///
/// Indexed `(day_offset, path_index)`; generated once per request, never
/// persisted.
#[derive(Clone, Debug)]
pub struct SimulationPaths {
  values: Array2<f64>,
}

/// One percentile curve across simulated paths.
#[derive(Clone, Debug)]
pub struct PercentileBand {
  /// Percentile in `[0, 100]`.
  pub percentile: f64,
  /// Per-day order statistic across paths.
  pub values: Array1<f64>,
}

/// Terminal-value percentile of the simulation.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Scenario {
  /// Percentile in `[0, 100]`.
  pub percentile: f64,
  /// Normalized portfolio value at the horizon.
  pub value: f64,
}

impl SimulationPaths {
  /// Simulated values, shape `(days_forward, num_paths)`.
  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  /// Simulation horizon in days.
  pub fn days(&self) -> usize {
    self.values.nrows()
  }

  /// Number of simulated paths.
  pub fn num_paths(&self) -> usize {
    self.values.ncols()
  }

  /// Per-day percentile curves across paths (descriptive post-processing).
  pub fn percentile_bands(&self, percentiles: &[f64]) -> Vec<PercentileBand> {
    percentiles
      .iter()
      .map(|&percentile| {
        let values = self
          .values
          .axis_iter(Axis(0))
          .map(|day| {
            let mut sorted = day.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            empirical_quantile(&sorted, percentile / 100.0)
          })
          .collect();

        PercentileBand { percentile, values }
      })
      .collect()
  }

  /// Percentiles of the final day's values across paths.
  pub fn terminal_scenarios(&self, percentiles: &[f64]) -> Vec<Scenario> {
    let mut terminal = self.values.row(self.days() - 1).to_vec();
    terminal.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    percentiles
      .iter()
      .map(|&percentile| Scenario {
        percentile,
        value: empirical_quantile(&terminal, percentile / 100.0),
      })
      .collect()
  }
}

/// Linearly interpolated empirical quantile of a sorted sample.
pub(crate) fn empirical_quantile(sorted: &[f64], q: f64) -> f64 {
  if sorted.is_empty() {
    return 0.0;
  }

  let q = q.clamp(0.0, 1.0);
  let pos = q * (sorted.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;

  if lo == hi {
    sorted[lo]
  } else {
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
  }
}

fn tail_mean(sorted: &[f64], cutoff: f64) -> f64 {
  // The interpolated quantile never undershoots the sample minimum, so the
  // tail is empty only for an empty sample.
  let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= cutoff).collect();
  if tail.is_empty() {
    0.0
  } else {
    tail.iter().sum::<f64>() / tail.len() as f64
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
  fn var_uses_linear_interpolation() {
    let returns = returns_from(&[-0.05, -0.02, 0.0, 0.01, 0.03]);
    let report = compute_risk_metrics(&returns).unwrap();

    assert_relative_eq!(report.var_95, -0.044, epsilon = 1e-12);
    assert_relative_eq!(report.cvar_95, -0.05, epsilon = 1e-12);
  }

  #[test]
  fn cvar_is_never_better_than_var() {
    let returns = returns_from(&[0.01, -0.03, 0.02, -0.01, 0.005, -0.02, 0.03, -0.04, 0.01, 0.0]);
    let report = compute_risk_metrics(&returns).unwrap();

    assert!(report.cvar_95 <= report.var_95);
    assert!(report.cvar_99 <= report.var_99);
  }

  #[test]
  fn risk_metrics_need_two_observations() {
    let result = compute_risk_metrics(&returns_from(&[0.01]));
    assert!(matches!(
      result,
      Err(PortfolioError::InsufficientData { needed: 2, got: 1, .. })
    ));
  }

  #[test]
  fn probability_of_loss_counts_negative_days() {
    let returns = returns_from(&[0.01, -0.02, 0.03, -0.01]);
    let report = compute_risk_metrics(&returns).unwrap();
    assert_relative_eq!(report.probability_of_loss, 0.5, epsilon = 1e-12);
  }

  #[test]
  fn identical_seeds_reproduce_identical_paths() {
    let returns = returns_from(&[0.01, -0.02, 0.015, 0.005, -0.01, 0.02]);
    let a = MonteCarlo::fit(&returns, 30, 16, 42).unwrap().simulate().unwrap();
    let b = MonteCarlo::fit(&returns, 30, 16, 42).unwrap().simulate().unwrap();

    assert_eq!(a.values(), b.values());
  }

  #[test]
  fn different_seeds_diverge() {
    let returns = returns_from(&[0.01, -0.02, 0.015, 0.005, -0.01, 0.02]);
    let a = MonteCarlo::fit(&returns, 30, 16, 1).unwrap().simulate().unwrap();
    let b = MonteCarlo::fit(&returns, 30, 16, 2).unwrap().simulate().unwrap();

    assert_ne!(a.values(), b.values());
  }

  #[test]
  fn zero_volatility_paths_compound_deterministically() {
    let mc = MonteCarlo::new(0.01, 0.0, 3, 2, 7);
    let paths = mc.simulate().unwrap();

    for path in 0..2 {
      assert_relative_eq!(paths.values()[[0, path]], 1.01, epsilon = 1e-12);
      assert_relative_eq!(paths.values()[[2, path]], 1.01_f64.powi(3), epsilon = 1e-12);
    }
  }

  #[test]
  fn percentile_bands_are_ordered() {
    let returns = returns_from(&[0.01, -0.02, 0.015, 0.005, -0.01, 0.02]);
    let paths = MonteCarlo::fit(&returns, 20, 64, 9).unwrap().simulate().unwrap();
    let bands = paths.percentile_bands(&SCENARIO_PERCENTILES);

    assert_eq!(bands.len(), 5);
    for day in 0..20 {
      for pair in bands.windows(2) {
        assert!(pair[0].values[day] <= pair[1].values[day]);
      }
    }
  }

  #[test]
  fn terminal_scenarios_match_final_day_quantiles() {
    let returns = returns_from(&[0.01, -0.02, 0.015, 0.005, -0.01, 0.02]);
    let paths = MonteCarlo::fit(&returns, 10, 32, 3).unwrap().simulate().unwrap();
    let scenarios = paths.terminal_scenarios(&SCENARIO_PERCENTILES);

    assert_eq!(scenarios.len(), 5);
    for pair in scenarios.windows(2) {
      assert!(pair[0].value <= pair[1].value);
    }
  }
}
