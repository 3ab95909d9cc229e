//! # Weight Optimization
//!
//! $$
//! \mathbf{w}^\* = \arg\max_{\mathbf{w}\in\Delta^{n-1}}
//! \frac{\mathbf{w}^\top\mu}{\sqrt{\mathbf{w}^\top\Sigma\,\mathbf{w}}}
//! $$
//!
//! Long-only, fully-invested weight solving and randomized efficient-frontier
//! sampling over annualized sample moments. The simplex constraints hold
//! exactly through a softmax reparameterization, so the Nelder-Mead search is
//! unconstrained while every candidate satisfies `sum(w) = 1, 0 <= w <= 1`.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::solver::neldermead::NelderMead;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Uniform;
use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use crate::error::PortfolioError;
use crate::metrics::TRADING_DAYS_PER_YEAR;
use crate::series::asset_returns_matrix;
use crate::series::AssetReturns;
use crate::series::PricePanel;
use crate::series::WeightVector;

/// Objective used by [`optimize_weights`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptimizerMethod {
  /// Maximize annualized return per unit of volatility.
  #[default]
  MaxSharpe,
  /// Minimize portfolio variance.
  MinVolatility,
}

impl OptimizerMethod {
  /// Parse a string into an [`OptimizerMethod`].
  pub fn from_str(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "min-vol" | "min-volatility" | "minvol" => Self::MinVolatility,
      _ => Self::MaxSharpe,
    }
  }
}

/// Runtime configuration for the weight solver.
#[derive(Clone, Copy, Debug)]
pub struct OptimizerConfig {
  /// Objective to optimize.
  pub method: OptimizerMethod,
  /// Risk-free rate used in the Sharpe objective and reporting.
  pub risk_free: f64,
  /// Iteration cap for the Nelder-Mead search.
  pub max_iters: u64,
  /// Simplex standard-deviation tolerance for convergence.
  pub sd_tolerance: f64,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      method: OptimizerMethod::MaxSharpe,
      risk_free: 0.0,
      max_iters: 5000,
      sd_tolerance: 1e-8,
    }
  }
}

/// Result of a weight optimization run.
///
/// `converged` is false when the solver errored or hit its iteration cap; in
/// that case `weights` holds the equal-weight fallback rather than the failed
/// iterate.
#[derive(Clone, Debug)]
pub struct OptimizationOutcome {
  /// Solved (or fallback) allocation.
  pub weights: WeightVector,
  /// Model expected annualized portfolio return.
  pub expected_return: f64,
  /// Model annualized portfolio volatility.
  pub volatility: f64,
  /// `(expected_return - risk_free) / volatility`, 0 for zero volatility.
  pub sharpe: f64,
  /// Whether the solver actually converged.
  pub converged: bool,
}

impl OptimizationOutcome {
  /// Treat the equal-weight fallback as fatal.
  pub fn ensure_converged(self) -> Result<Self, PortfolioError> {
    if self.converged {
      Ok(self)
    } else {
      Err(PortfolioError::OptimizationFailed)
    }
  }
}

/// One randomly sampled portfolio on the risk/return plane.
#[derive(Clone, Debug)]
pub struct FrontierPoint {
  /// Expected annualized return under the sample moments.
  pub expected_return: f64,
  /// Annualized volatility under the sample moments.
  pub volatility: f64,
  /// `expected_return / volatility`, 0 for zero volatility.
  pub sharpe: f64,
  /// The sampled allocation.
  pub weights: WeightVector,
}

/// Solve for the weight vector optimizing the configured objective.
///
/// Moments are estimated from the panel's inner-joined daily returns:
/// annualized mean vector (mean × 252) and annualized sample covariance
/// (daily covariance × 252). The search starts from the equal-weight vector.
pub fn optimize_weights(
  panel: &PricePanel,
  config: &OptimizerConfig,
) -> Result<OptimizationOutcome, PortfolioError> {
  let tickers: Vec<String> = panel.keys().cloned().collect();
  if tickers.is_empty() {
    return Err(PortfolioError::InvalidParameter(
      "price panel is empty".to_string(),
    ));
  }

  let assets = asset_returns_matrix(panel, &tickers)?;
  let (mu, cov) = annualized_moments(&assets)?;
  let n = tickers.len();

  struct ObjectiveCost {
    mu: Array1<f64>,
    cov: Array2<f64>,
    risk_free: f64,
    method: OptimizerMethod,
  }

  impl CostFunction for ObjectiveCost {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
      let w = softmax(x);
      let variance = w.dot(&self.cov.dot(&w));
      if variance < 1e-30 {
        return Ok(1e10);
      }

      match self.method {
        OptimizerMethod::MaxSharpe => {
          let ret = w.dot(&self.mu);
          Ok(-(ret - self.risk_free) / variance.sqrt())
        }
        OptimizerMethod::MinVolatility => Ok(variance),
      }
    }
  }

  let cost = ObjectiveCost {
    mu: mu.clone(),
    cov: cov.clone(),
    risk_free: config.risk_free,
    method: config.method,
  };

  // x0 = 0 maps to the equal-weight vector under softmax.
  let x0 = vec![0.0; n];
  let mut simplex = Vec::with_capacity(n + 1);
  simplex.push(x0.clone());
  for i in 0..n {
    let mut point = x0.clone();
    point[i] = 1.0;
    simplex.push(point);
  }

  let (weights, converged) = match NelderMead::new(simplex).with_sd_tolerance(config.sd_tolerance)
  {
    Ok(solver) => {
      match Executor::new(cost, solver)
        .configure(|state| state.max_iters(config.max_iters))
        .run()
      {
        Ok(res) => {
          let converged = matches!(
            res.state.termination_status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
          );
          if converged {
            let best_x = res.state.best_param.unwrap_or(x0);
            (softmax(&best_x), true)
          } else {
            (equal_weights(n), false)
          }
        }
        Err(_) => (equal_weights(n), false),
      }
    }
    Err(_) => (equal_weights(n), false),
  };

  if !converged {
    warn!(
      method = ?config.method,
      max_iters = config.max_iters,
      "weight solver did not converge, falling back to equal weights"
    );
  } else {
    debug!(method = ?config.method, "weight solver converged");
  }

  let (expected_return, volatility, sharpe) = portfolio_stats(&weights, &mu, &cov, config.risk_free);

  Ok(OptimizationOutcome {
    weights: WeightVector::new(
      tickers
        .iter()
        .cloned()
        .zip(weights.iter().copied())
        .collect(),
    ),
    expected_return,
    volatility,
    sharpe,
    converged,
  })
}

/// Evaluate `num_samples` random long-only portfolios under the panel moments.
///
/// Weights are drawn by normalizing a uniform positive vector; each sample is
/// independent and the sampling is deterministic for a fixed seed. Purely
/// descriptive; no optimization happens here.
pub fn sample_efficient_frontier(
  panel: &PricePanel,
  num_samples: usize,
  seed: u64,
) -> Result<Vec<FrontierPoint>, PortfolioError> {
  if num_samples == 0 {
    return Err(PortfolioError::InvalidParameter(
      "frontier sampling needs at least one sample".to_string(),
    ));
  }

  let tickers: Vec<String> = panel.keys().cloned().collect();
  if tickers.is_empty() {
    return Err(PortfolioError::InvalidParameter(
      "price panel is empty".to_string(),
    ));
  }

  let assets = asset_returns_matrix(panel, &tickers)?;
  let (mu, cov) = annualized_moments(&assets)?;
  let n = tickers.len();

  let points = (0..num_samples)
    .into_par_iter()
    .map(|sample| {
      let mut rng = StdRng::seed_from_u64(seed.wrapping_add(sample as u64));
      let raw = Array1::random_using(n, Uniform::new(0.0, 1.0), &mut rng);

      let total = raw.sum();
      let weights = if total > 1e-15 {
        raw / total
      } else {
        equal_weights(n)
      };

      let (expected_return, volatility, sharpe) = portfolio_stats(&weights, &mu, &cov, 0.0);

      FrontierPoint {
        expected_return,
        volatility,
        sharpe,
        weights: WeightVector::new(
          tickers
            .iter()
            .cloned()
            .zip(weights.iter().copied())
            .collect(),
        ),
      }
    })
    .collect();

  Ok(points)
}

/// Annualized mean vector and sample covariance matrix of daily returns.
fn annualized_moments(
  assets: &AssetReturns,
) -> Result<(Array1<f64>, Array2<f64>), PortfolioError> {
  let t = assets.values.nrows();
  if t < 2 {
    return Err(PortfolioError::InsufficientData {
      what: "covariance estimation",
      needed: 2,
      got: t,
    });
  }

  let means = assets
    .values
    .mean_axis(Axis(0))
    .unwrap_or_else(|| Array1::zeros(assets.values.ncols()));
  let centered = &assets.values - &means;
  let cov = centered.t().dot(&centered) * (TRADING_DAYS_PER_YEAR / (t - 1) as f64);
  let mu = means * TRADING_DAYS_PER_YEAR;

  Ok((mu, cov))
}

fn portfolio_stats(
  w: &Array1<f64>,
  mu: &Array1<f64>,
  cov: &Array2<f64>,
  risk_free: f64,
) -> (f64, f64, f64) {
  let expected_return = w.dot(mu);
  let volatility = w.dot(&cov.dot(w)).max(0.0).sqrt();
  let sharpe = if volatility > 1e-15 {
    (expected_return - risk_free) / volatility
  } else {
    0.0
  };

  (expected_return, volatility, sharpe)
}

fn softmax(x: &[f64]) -> Array1<f64> {
  if x.is_empty() {
    return Array1::zeros(0);
  }

  let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps: Array1<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
  let sum = exps.sum();

  if sum < 1e-15 {
    equal_weights(x.len())
  } else {
    exps / sum
  }
}

fn equal_weights(n: usize) -> Array1<f64> {
  Array1::from_elem(n, 1.0 / n as f64)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::series::PriceSeries;
  use approx::assert_relative_eq;
  use chrono::NaiveDate;
  use tracing_test::traced_test;

  fn panel() -> PricePanel {
    // Three assets with distinct drifts and dispersion.
    let base = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..120).map(|i| base + chrono::Days::new(i)).collect();

    let mut out = PricePanel::new();
    for (ticker, drift, wiggle) in [
      ("AAA", 0.0012_f64, 0.010_f64),
      ("BBB", 0.0006, 0.004),
      ("CCC", -0.0002, 0.020),
    ] {
      let mut close = 100.0;
      let mut closes = Vec::with_capacity(dates.len());
      for i in 0..dates.len() {
        let cycle = (i as f64 * 0.7).sin() * wiggle;
        close *= 1.0 + drift + cycle;
        closes.push(close);
      }
      out.insert(ticker.to_string(), PriceSeries::new(dates.clone(), closes).unwrap());
    }

    out
  }

  #[test]
  fn optimized_weights_stay_on_the_simplex() {
    let outcome = optimize_weights(&panel(), &OptimizerConfig::default()).unwrap();

    assert_relative_eq!(outcome.weights.sum(), 1.0, epsilon = 1e-6);
    for (_, &w) in outcome.weights.iter() {
      assert!((0.0..=1.0).contains(&w));
    }
  }

  #[test]
  fn max_sharpe_beats_equal_weight() {
    let panel = panel();
    let config = OptimizerConfig::default();
    let outcome = optimize_weights(&panel, &config).unwrap();
    assert!(outcome.converged);

    let tickers: Vec<String> = panel.keys().cloned().collect();
    let assets = asset_returns_matrix(&panel, &tickers).unwrap();
    let (mu, cov) = annualized_moments(&assets).unwrap();
    let (_, _, equal_sharpe) = portfolio_stats(&equal_weights(3), &mu, &cov, 0.0);

    assert!(outcome.sharpe >= equal_sharpe - 1e-9);
  }

  #[traced_test]
  #[test]
  fn iteration_cap_falls_back_to_equal_weights() {
    let config = OptimizerConfig {
      max_iters: 1,
      ..OptimizerConfig::default()
    };
    let outcome = optimize_weights(&panel(), &config).unwrap();

    assert!(!outcome.converged);
    for (_, &w) in outcome.weights.iter() {
      assert_relative_eq!(w, 1.0 / 3.0, epsilon = 1e-12);
    }
    assert!(logs_contain("falling back to equal weights"));

    assert!(matches!(
      outcome.ensure_converged(),
      Err(PortfolioError::OptimizationFailed)
    ));
  }

  #[test]
  fn min_volatility_prefers_the_quiet_asset() {
    let config = OptimizerConfig {
      method: OptimizerMethod::MinVolatility,
      ..OptimizerConfig::default()
    };
    let outcome = optimize_weights(&panel(), &config).unwrap();

    let quiet = outcome.weights.get("BBB").unwrap();
    let noisy = outcome.weights.get("CCC").unwrap();
    assert!(quiet > noisy);
  }

  #[test]
  fn frontier_samples_are_valid_portfolios() {
    let points = sample_efficient_frontier(&panel(), 50, 17).unwrap();

    assert_eq!(points.len(), 50);
    for point in &points {
      assert_relative_eq!(point.weights.sum(), 1.0, epsilon = 1e-9);
      assert!(point.volatility >= 0.0);
    }
  }

  #[test]
  fn frontier_sampling_is_deterministic_for_a_seed() {
    let a = sample_efficient_frontier(&panel(), 10, 99).unwrap();
    let b = sample_efficient_frontier(&panel(), 10, 99).unwrap();

    for (x, y) in a.iter().zip(b.iter()) {
      assert_relative_eq!(x.expected_return, y.expected_return, epsilon = 1e-15);
      assert_relative_eq!(x.volatility, y.volatility, epsilon = 1e-15);
    }
  }

  #[test]
  fn empty_panel_is_rejected() {
    let result = optimize_weights(&PricePanel::new(), &OptimizerConfig::default());
    assert!(matches!(result, Err(PortfolioError::InvalidParameter(_))));
  }
}
