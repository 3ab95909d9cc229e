//! # Export Formats
//!
//! $$
//! \text{(ticker, weight)} \mapsto \text{CSV}, \qquad
//! \text{configuration} \mapsto \text{JSON}
//! $$
//!
//! Caller-facing serialization of allocations and portfolio configuration.
//! Prices and returns are never included; callers persist those themselves.

use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

use crate::series::WeightVector;

/// Render a weight vector as a two-column `Ticker,Weight` CSV table.
pub fn weights_csv(weights: &WeightVector) -> String {
  let mut out = String::from("Ticker,Weight\n");
  for (ticker, weight) in weights.iter() {
    out.push_str(&format!("{ticker},{weight}\n"));
  }
  out
}

/// Portfolio configuration: tickers, weights and date range.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortfolioConfig {
  /// Caller-chosen portfolio name.
  pub name: String,
  /// Tickers in the portfolio, sorted.
  pub tickers: Vec<String>,
  /// Target allocation per ticker.
  pub weights: WeightVector,
  /// First day of the analysis window.
  pub start_date: NaiveDate,
  /// Last day of the analysis window.
  pub end_date: NaiveDate,
}

impl PortfolioConfig {
  /// Build a configuration from a named allocation and date range.
  pub fn new(name: String, weights: WeightVector, start_date: NaiveDate, end_date: NaiveDate) -> Self {
    Self {
      name,
      tickers: weights.tickers(),
      weights,
      start_date,
      end_date,
    }
  }

  /// Serialize to pretty-printed JSON.
  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string_pretty(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn weights() -> WeightVector {
    WeightVector::new(
      [("AAA".to_string(), 0.6), ("BBB".to_string(), 0.4)]
        .into_iter()
        .collect(),
    )
  }

  #[test]
  fn csv_has_a_header_and_one_row_per_ticker() {
    let csv = weights_csv(&weights());
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines[0], "Ticker,Weight");
    assert_eq!(lines[1], "AAA,0.6");
    assert_eq!(lines[2], "BBB,0.4");
  }

  #[test]
  fn config_json_round_trips() {
    let config = PortfolioConfig::new(
      "growth".to_string(),
      weights(),
      NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
      NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
    );

    let json = config.to_json().unwrap();
    assert!(json.contains("\"growth\""));
    assert!(!json.contains("returns"));

    let parsed: PortfolioConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.tickers, vec!["AAA".to_string(), "BBB".to_string()]);
    assert_eq!(parsed.weights.get("AAA"), Some(0.6));
  }
}
