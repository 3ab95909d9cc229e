//! # Price & Return Series
//!
//! $$
//! r_t = \frac{p_t - p_{t-1}}{p_{t-1}}, \qquad
//! r^{(p)}_t = \sum_i w_i\, r_{i,t}
//! $$
//!
//! Dated price/return containers, timestamp alignment and the portfolio
//! return computation. Rows missing a value for any asset are dropped
//! (inner-join semantics) before returns are taken, and the weighted sum
//! assumes daily rebalancing back to the target weights.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;

/// Tolerance on `|sum(weights) - 1|` for a valid portfolio.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Adjusted close series per ticker, as produced by a price-source collaborator.
pub type PricePanel = BTreeMap<String, PriceSeries>;

/// Dated price series for a single asset.
///
/// Dates are strictly increasing with no duplicates; gaps (non-trading days)
/// are allowed and never interpolated. Prices are finite and positive.
#[derive(Clone, Debug)]
pub struct PriceSeries {
  dates: Vec<NaiveDate>,
  closes: Array1<f64>,
}

impl PriceSeries {
  /// Construct a validated price series.
  pub fn new(dates: Vec<NaiveDate>, closes: Vec<f64>) -> Result<Self, PortfolioError> {
    if dates.len() != closes.len() {
      return Err(PortfolioError::InvalidSeries(format!(
        "{} dates but {} prices",
        dates.len(),
        closes.len()
      )));
    }

    check_dates_strictly_increasing(&dates)?;

    for (date, &close) in dates.iter().zip(closes.iter()) {
      if !close.is_finite() || close <= 0.0 {
        return Err(PortfolioError::InvalidSeries(format!(
          "non-positive or non-finite price {close} on {date}"
        )));
      }
    }

    Ok(Self {
      dates,
      closes: Array1::from(closes),
    })
  }

  /// Number of price observations.
  pub fn len(&self) -> usize {
    self.dates.len()
  }

  /// True when the series holds no observations.
  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  /// Observation dates.
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  /// Adjusted closes, aligned with [`PriceSeries::dates`].
  pub fn closes(&self) -> &Array1<f64> {
    &self.closes
  }

  /// Period-over-period simple returns; the first observation has no return.
  pub fn simple_returns(&self) -> Result<ReturnSeries, PortfolioError> {
    if self.len() < 2 {
      return Err(PortfolioError::InsufficientData {
        what: "simple returns",
        needed: 2,
        got: self.len(),
      });
    }

    let mut values = Vec::with_capacity(self.len() - 1);
    for i in 1..self.len() {
      values.push((self.closes[i] - self.closes[i - 1]) / self.closes[i - 1]);
    }

    ReturnSeries::new(self.dates[1..].to_vec(), values)
  }
}

/// Dated fractional return series.
#[derive(Clone, Debug)]
pub struct ReturnSeries {
  dates: Vec<NaiveDate>,
  values: Array1<f64>,
}

impl ReturnSeries {
  /// Construct a validated return series.
  pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self, PortfolioError> {
    if dates.len() != values.len() {
      return Err(PortfolioError::InvalidSeries(format!(
        "{} dates but {} returns",
        dates.len(),
        values.len()
      )));
    }

    check_dates_strictly_increasing(&dates)?;

    for (date, &value) in dates.iter().zip(values.iter()) {
      if !value.is_finite() {
        return Err(PortfolioError::InvalidSeries(format!(
          "non-finite return on {date}"
        )));
      }
    }

    Ok(Self {
      dates,
      values: Array1::from(values),
    })
  }

  /// Number of return observations.
  pub fn len(&self) -> usize {
    self.dates.len()
  }

  /// True when the series holds no observations.
  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  /// Observation dates.
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  /// Fractional returns, aligned with [`ReturnSeries::dates`].
  pub fn values(&self) -> &Array1<f64> {
    &self.values
  }

  /// Inner-join two return series on their dates.
  ///
  /// Rows missing from either side are dropped. Fails with
  /// [`PortfolioError::Alignment`] when the series share no dates.
  pub fn inner_join(&self, other: &Self) -> Result<(Array1<f64>, Array1<f64>), PortfolioError> {
    let mut left = Vec::new();
    let mut right = Vec::new();

    let (mut i, mut j) = (0, 0);
    while i < self.len() && j < other.len() {
      match self.dates[i].cmp(&other.dates[j]) {
        std::cmp::Ordering::Less => i += 1,
        std::cmp::Ordering::Greater => j += 1,
        std::cmp::Ordering::Equal => {
          left.push(self.values[i]);
          right.push(other.values[j]);
          i += 1;
          j += 1;
        }
      }
    }

    if left.is_empty() {
      return Err(PortfolioError::Alignment("the two return series"));
    }

    Ok((Array1::from(left), Array1::from(right)))
  }
}

/// Target allocation per ticker.
///
/// Entries are non-negative and sum to 1 within [`WEIGHT_SUM_TOLERANCE`];
/// tickers must be a subset of the price panel's tickers. Checked by
/// [`WeightVector::validate`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector {
  weights: BTreeMap<String, f64>,
}

impl WeightVector {
  /// Wrap a ticker-to-weight map.
  pub fn new(weights: BTreeMap<String, f64>) -> Self {
    Self { weights }
  }

  /// Equal weights across the given tickers.
  pub fn equal<I, S>(tickers: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let tickers: Vec<String> = tickers.into_iter().map(Into::into).collect();
    let w = if tickers.is_empty() {
      0.0
    } else {
      1.0 / tickers.len() as f64
    };

    Self {
      weights: tickers.into_iter().map(|t| (t, w)).collect(),
    }
  }

  /// Check the weight invariants against a price panel.
  pub fn validate(&self, panel: &PricePanel) -> Result<(), PortfolioError> {
    if self.weights.is_empty() {
      return Err(PortfolioError::InvalidWeights(
        "weight vector is empty".to_string(),
      ));
    }

    for (ticker, &w) in &self.weights {
      if !w.is_finite() || w < 0.0 {
        return Err(PortfolioError::InvalidWeights(format!(
          "weight {w} for {ticker} is negative or non-finite"
        )));
      }
      if !panel.contains_key(ticker) {
        return Err(PortfolioError::InvalidWeights(format!(
          "ticker {ticker} is not in the price panel"
        )));
      }
    }

    let sum = self.sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
      return Err(PortfolioError::InvalidWeights(format!(
        "weights sum to {sum:.4}, expected 1.0 within {WEIGHT_SUM_TOLERANCE}"
      )));
    }

    Ok(())
  }

  /// Weight for a ticker, if present.
  pub fn get(&self, ticker: &str) -> Option<f64> {
    self.weights.get(ticker).copied()
  }

  /// Tickers in deterministic (sorted) order.
  pub fn tickers(&self) -> Vec<String> {
    self.weights.keys().cloned().collect()
  }

  /// Iterate `(ticker, weight)` pairs in sorted order.
  pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
    self.weights.iter()
  }

  /// Number of entries.
  pub fn len(&self) -> usize {
    self.weights.len()
  }

  /// True when no entries are present.
  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  /// Sum of all weights.
  pub fn sum(&self) -> f64 {
    self.weights.values().sum()
  }
}

/// Inner-joined daily return matrix for a set of assets.
///
/// `values` has one row per return date and one column per ticker, in the
/// order of `tickers`.
#[derive(Clone, Debug)]
pub struct AssetReturns {
  /// Column order of `values`.
  pub tickers: Vec<String>,
  /// Return dates (the first joined price row has no return).
  pub dates: Vec<NaiveDate>,
  /// Daily simple returns, shape `(dates.len(), tickers.len())`.
  pub values: Array2<f64>,
}

/// Build the inner-joined daily return matrix for `tickers` from a panel.
///
/// Price rows missing a value for any requested asset are dropped before
/// returns are computed.
pub fn asset_returns_matrix(
  panel: &PricePanel,
  tickers: &[String],
) -> Result<AssetReturns, PortfolioError> {
  if tickers.is_empty() {
    return Err(PortfolioError::InvalidParameter(
      "no tickers requested".to_string(),
    ));
  }

  let mut series = Vec::with_capacity(tickers.len());
  for ticker in tickers {
    let s = panel.get(ticker).ok_or_else(|| {
      PortfolioError::InvalidWeights(format!("ticker {ticker} is not in the price panel"))
    })?;
    series.push(s);
  }

  let mut common: Vec<NaiveDate> = series[0].dates().to_vec();
  for s in &series[1..] {
    common = intersect_sorted(&common, s.dates());
  }

  if common.is_empty() {
    return Err(PortfolioError::Alignment("the requested assets"));
  }
  if common.len() < 2 {
    return Err(PortfolioError::InsufficientData {
      what: "asset returns",
      needed: 2,
      got: common.len(),
    });
  }

  let n_rows = common.len();
  let n_assets = tickers.len();
  let mut prices = Array2::<f64>::zeros((n_rows, n_assets));
  for (col, s) in series.iter().enumerate() {
    for (row, &close) in select_at_dates(s, &common).iter().enumerate() {
      prices[[row, col]] = close;
    }
  }

  let mut values = Array2::<f64>::zeros((n_rows - 1, n_assets));
  for row in 1..n_rows {
    for col in 0..n_assets {
      values[[row - 1, col]] =
        (prices[[row, col]] - prices[[row - 1, col]]) / prices[[row - 1, col]];
    }
  }

  Ok(AssetReturns {
    tickers: tickers.to_vec(),
    dates: common[1..].to_vec(),
    values,
  })
}

/// Portfolio return series for a weighted basket of assets.
///
/// Per-asset simple returns are combined as `sum(weight * asset_return)` on
/// every common date, which models daily rebalancing back to the target
/// weights (buy-and-hold drift is not modeled).
pub fn compute_portfolio_returns(
  panel: &PricePanel,
  weights: &WeightVector,
) -> Result<ReturnSeries, PortfolioError> {
  weights.validate(panel)?;

  let tickers = weights.tickers();
  let assets = asset_returns_matrix(panel, &tickers)?;

  let w: Array1<f64> = tickers
    .iter()
    .map(|t| weights.get(t).unwrap_or(0.0))
    .collect();
  let values = assets.values.dot(&w);

  ReturnSeries::new(assets.dates, values.to_vec())
}

fn check_dates_strictly_increasing(dates: &[NaiveDate]) -> Result<(), PortfolioError> {
  for pair in dates.windows(2) {
    if pair[1] <= pair[0] {
      return Err(PortfolioError::InvalidSeries(format!(
        "dates must be strictly increasing, found {} after {}",
        pair[1], pair[0]
      )));
    }
  }
  Ok(())
}

fn intersect_sorted(a: &[NaiveDate], b: &[NaiveDate]) -> Vec<NaiveDate> {
  let mut out = Vec::with_capacity(a.len().min(b.len()));
  let (mut i, mut j) = (0, 0);

  while i < a.len() && j < b.len() {
    match a[i].cmp(&b[j]) {
      std::cmp::Ordering::Less => i += 1,
      std::cmp::Ordering::Greater => j += 1,
      std::cmp::Ordering::Equal => {
        out.push(a[i]);
        i += 1;
        j += 1;
      }
    }
  }

  out
}

fn select_at_dates(series: &PriceSeries, dates: &[NaiveDate]) -> Vec<f64> {
  let mut out = Vec::with_capacity(dates.len());
  let mut i = 0;

  for date in dates {
    while series.dates()[i] < *date {
      i += 1;
    }
    out.push(series.closes()[i]);
    i += 1;
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn daily_dates(n: usize) -> Vec<NaiveDate> {
    (0..n)
      .map(|i| date(2024, 1, 1) + chrono::Days::new(i as u64))
      .collect()
  }

  fn series(closes: &[f64]) -> PriceSeries {
    PriceSeries::new(daily_dates(closes.len()), closes.to_vec()).unwrap()
  }

  #[test]
  fn price_series_rejects_unordered_dates() {
    let dates = vec![date(2024, 1, 2), date(2024, 1, 1)];
    let result = PriceSeries::new(dates, vec![100.0, 101.0]);
    assert!(matches!(result, Err(PortfolioError::InvalidSeries(_))));
  }

  #[test]
  fn price_series_rejects_non_positive_prices() {
    let result = PriceSeries::new(daily_dates(2), vec![100.0, 0.0]);
    assert!(matches!(result, Err(PortfolioError::InvalidSeries(_))));
  }

  #[test]
  fn simple_returns_drop_the_first_row() {
    let returns = series(&[100.0, 110.0, 99.0]).simple_returns().unwrap();

    assert_eq!(returns.len(), 2);
    assert_relative_eq!(returns.values()[0], 0.10, epsilon = 1e-12);
    assert_relative_eq!(returns.values()[1], -0.10, epsilon = 1e-12);
  }

  #[test]
  fn simple_returns_need_two_observations() {
    let result = series(&[100.0]).simple_returns();
    assert!(matches!(
      result,
      Err(PortfolioError::InsufficientData { needed: 2, got: 1, .. })
    ));
  }

  #[test]
  fn one_hot_weights_reproduce_the_single_asset() {
    let mut panel = PricePanel::new();
    panel.insert("AAA".to_string(), series(&[100.0, 101.0, 99.0, 103.0]));
    panel.insert("BBB".to_string(), series(&[50.0, 55.0, 52.0, 56.0]));

    let weights = WeightVector::new([("AAA".to_string(), 1.0)].into_iter().collect());
    let portfolio = compute_portfolio_returns(&panel, &weights).unwrap();
    let own = panel["AAA"].simple_returns().unwrap();

    assert_eq!(portfolio.len(), own.len());
    for (p, o) in portfolio.values().iter().zip(own.values().iter()) {
      assert_relative_eq!(p, o, epsilon = 1e-12);
    }
  }

  #[test]
  fn portfolio_returns_inner_join_drops_missing_rows() {
    // BBB has no row for Jan 2: that date contributes no return row, and the
    // Jan 3 return for AAA spans Jan 1 -> Jan 3.
    let mut panel = PricePanel::new();
    panel.insert(
      "AAA".to_string(),
      PriceSeries::new(
        vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)],
        vec![100.0, 102.0, 104.04],
      )
      .unwrap(),
    );
    panel.insert(
      "BBB".to_string(),
      PriceSeries::new(vec![date(2024, 1, 1), date(2024, 1, 3)], vec![10.0, 11.0]).unwrap(),
    );

    let weights = WeightVector::equal(["AAA", "BBB"]);
    let portfolio = compute_portfolio_returns(&panel, &weights).unwrap();

    assert_eq!(portfolio.dates(), &[date(2024, 1, 3)]);
    assert_relative_eq!(portfolio.values()[0], 0.5 * 0.0404 + 0.5 * 0.1, epsilon = 1e-12);
  }

  #[test]
  fn disjoint_panels_fail_alignment() {
    let mut panel = PricePanel::new();
    panel.insert(
      "AAA".to_string(),
      PriceSeries::new(vec![date(2024, 1, 1), date(2024, 1, 2)], vec![1.0, 2.0]).unwrap(),
    );
    panel.insert(
      "BBB".to_string(),
      PriceSeries::new(vec![date(2024, 2, 1), date(2024, 2, 2)], vec![1.0, 2.0]).unwrap(),
    );

    let weights = WeightVector::equal(["AAA", "BBB"]);
    let result = compute_portfolio_returns(&panel, &weights);
    assert!(matches!(result, Err(PortfolioError::Alignment(_))));
  }

  #[test]
  fn weights_must_sum_to_one() {
    let mut panel = PricePanel::new();
    panel.insert("AAA".to_string(), series(&[1.0, 2.0]));

    let weights = WeightVector::new([("AAA".to_string(), 0.5)].into_iter().collect());
    assert!(matches!(
      weights.validate(&panel),
      Err(PortfolioError::InvalidWeights(_))
    ));
  }

  #[test]
  fn weights_within_tolerance_pass() {
    let mut panel = PricePanel::new();
    panel.insert("AAA".to_string(), series(&[1.0, 2.0]));
    panel.insert("BBB".to_string(), series(&[1.0, 2.0]));

    let weights = WeightVector::new(
      [("AAA".to_string(), 0.501), ("BBB".to_string(), 0.502)]
        .into_iter()
        .collect(),
    );
    assert!(weights.validate(&panel).is_ok());
  }

  #[test]
  fn weights_reject_unknown_tickers() {
    let mut panel = PricePanel::new();
    panel.insert("AAA".to_string(), series(&[1.0, 2.0]));

    let weights = WeightVector::new([("ZZZ".to_string(), 1.0)].into_iter().collect());
    assert!(matches!(
      weights.validate(&panel),
      Err(PortfolioError::InvalidWeights(_))
    ));
  }

  #[test]
  fn inner_join_on_disjoint_series_fails() {
    let a = ReturnSeries::new(vec![date(2024, 1, 1)], vec![0.01]).unwrap();
    let b = ReturnSeries::new(vec![date(2024, 6, 1)], vec![0.02]).unwrap();
    assert!(matches!(a.inner_join(&b), Err(PortfolioError::Alignment(_))));
  }
}
