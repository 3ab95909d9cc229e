use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;

use anyhow::bail;
use anyhow::Context;
use chrono::NaiveDate;
use prettytable::row;
use prettytable::Table;
use tracing_subscriber::EnvFilter;

use quantfolio::export::weights_csv;
use quantfolio::export::PortfolioConfig;
use quantfolio::grade::composite;
use quantfolio::grade::grade_report;
use quantfolio::metrics::compute_metrics;
use quantfolio::metrics::DEFAULT_RISK_FREE_RATE;
use quantfolio::optimize::optimize_weights;
use quantfolio::optimize::sample_efficient_frontier;
use quantfolio::optimize::OptimizerConfig;
use quantfolio::regime::aggregate_by_regime;
use quantfolio::regime::classify_regimes;
use quantfolio::regime::DEFAULT_LOOKBACK;
use quantfolio::risk::compute_risk_metrics;
use quantfolio::risk::MonteCarlo;
use quantfolio::risk::DEFAULT_DAYS_FORWARD;
use quantfolio::risk::DEFAULT_NUM_PATHS;
use quantfolio::risk::SCENARIO_PERCENTILES;
use quantfolio::series::compute_portfolio_returns;
use quantfolio::series::PricePanel;
use quantfolio::series::PriceSeries;
use quantfolio::series::ReturnSeries;
use quantfolio::PortfolioError;
use quantfolio::WeightVector;

const SIMULATION_SEED: u64 = 42;
const FRONTIER_SEED: u64 = 7;
const FRONTIER_SAMPLES: usize = 100;

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let mut args = std::env::args().skip(1);
  let mut paths: Vec<String> = Vec::new();
  let mut benchmark_path: Option<String> = None;

  while let Some(arg) = args.next() {
    if arg == "--benchmark" {
      benchmark_path = Some(args.next().context("--benchmark expects a CSV file path")?);
    } else {
      paths.push(arg);
    }
  }

  if paths.is_empty() {
    bail!("usage: quantfolio [--benchmark SPY.csv] TICKER1.csv TICKER2.csv ...");
  }

  let mut panel = PricePanel::new();
  for path in &paths {
    let ticker = ticker_from_path(path)?;
    let series = read_price_series(path)?;
    println!("Loaded {} rows for {}", series.len(), ticker);
    panel.insert(ticker, series);
  }

  let benchmark = benchmark_path
    .map(|path| -> anyhow::Result<ReturnSeries> {
      let series = read_price_series(&path)?;
      Ok(series.simple_returns()?)
    })
    .transpose()?;

  let weights = WeightVector::equal(panel.keys().cloned());
  let returns = compute_portfolio_returns(&panel, &weights)?;
  println!(
    "\nPortfolio: {} assets, {} daily returns ({} .. {})",
    panel.len(),
    returns.len(),
    returns.dates()[0],
    returns.dates()[returns.len() - 1]
  );

  let report = compute_metrics(&returns, benchmark.as_ref(), DEFAULT_RISK_FREE_RATE)?;

  let mut table = Table::new();
  table.add_row(row!["Metric", "Value"]);
  table.add_row(row!["Total Return", format!("{:.2}%", report.total_return * 100.0)]);
  table.add_row(row![
    "Annual Return",
    format!("{:.2}%", report.annualized_return * 100.0)
  ]);
  table.add_row(row![
    "Annual Volatility",
    format!("{:.2}%", report.annualized_volatility * 100.0)
  ]);
  table.add_row(row!["Sharpe Ratio", format!("{:.2}", report.sharpe)]);
  table.add_row(row!["Sortino Ratio", format!("{:.2}", report.sortino)]);
  table.add_row(row!["Max Drawdown", format!("{:.2}%", report.max_drawdown * 100.0)]);
  table.add_row(row!["Calmar Ratio", format!("{:.2}", report.calmar)]);
  table.add_row(row!["Win Rate", format!("{:.1}%", report.win_rate * 100.0)]);
  table.add_row(row!["Best Month", format!("{:.2}%", report.best_month * 100.0)]);
  table.add_row(row!["Worst Month", format!("{:.2}%", report.worst_month * 100.0)]);
  table.add_row(row!["Avg Recovery Days", format!("{:.0}", report.avg_recovery_days)]);
  if let (Some(alpha), Some(beta)) = (report.alpha, report.beta) {
    table.add_row(row!["Alpha", format!("{:.2}%", alpha * 100.0)]);
    table.add_row(row!["Beta", format!("{beta:.2}")]);
  }
  println!("\nPerformance metrics:");
  table.printstd();

  let grades = grade_report(&report);
  let (overall, gpa) = composite(&grades);
  let mut table = Table::new();
  table.add_row(row!["Metric", "Grade"]);
  for (metric, grade) in &grades {
    table.add_row(row![metric.to_string(), grade.to_string()]);
  }
  println!("\nReport card (overall {overall}, GPA {gpa:.2}):");
  table.printstd();

  match classify_regimes(&returns, DEFAULT_LOOKBACK) {
    Ok(labels) => {
      let mut table = Table::new();
      table.add_row(row![
        "Regime",
        "Days",
        "Avg Daily",
        "Ann. Vol",
        "Best Day",
        "Worst Day",
        "Win Rate"
      ]);
      for stats in aggregate_by_regime(&returns, &labels)? {
        table.add_row(row![
          stats.regime.to_string(),
          stats.count,
          format!("{:.3}%", stats.mean_daily_return * 100.0),
          format!("{:.1}%", stats.annualized_volatility * 100.0),
          format!("{:.2}%", stats.best_day * 100.0),
          format!("{:.2}%", stats.worst_day * 100.0),
          format!("{:.1}%", stats.win_rate * 100.0)
        ]);
      }
      println!("\nMarket regimes ({DEFAULT_LOOKBACK}-day lookback):");
      table.printstd();
    }
    Err(PortfolioError::InsufficientData { needed, got, .. }) => {
      println!("\nSkipping regime analysis: {got} returns, need {needed}");
    }
    Err(err) => return Err(err.into()),
  }

  let risk = compute_risk_metrics(&returns)?;
  let mut table = Table::new();
  table.add_row(row!["Risk Metric", "Value"]);
  table.add_row(row![
    "Expected Annual Return",
    format!("{:.2}%", risk.expected_annual_return * 100.0)
  ]);
  table.add_row(row![
    "Expected Volatility",
    format!("{:.2}%", risk.expected_annual_volatility * 100.0)
  ]);
  table.add_row(row!["VaR 95%", format!("{:.2}%", risk.var_95 * 100.0)]);
  table.add_row(row!["VaR 99%", format!("{:.2}%", risk.var_99 * 100.0)]);
  table.add_row(row!["CVaR 95%", format!("{:.2}%", risk.cvar_95 * 100.0)]);
  table.add_row(row!["CVaR 99%", format!("{:.2}%", risk.cvar_99 * 100.0)]);
  table.add_row(row![
    "P(daily loss)",
    format!("{:.1}%", risk.probability_of_loss * 100.0)
  ]);
  table.add_row(row!["Max Drawdown", format!("{:.2}%", risk.max_drawdown * 100.0)]);
  println!("\nForward-looking risk:");
  table.printstd();

  let sims = MonteCarlo::fit(&returns, DEFAULT_DAYS_FORWARD, DEFAULT_NUM_PATHS, SIMULATION_SEED)?
    .simulate()?;
  let mut table = Table::new();
  table.add_row(row!["Scenario", "Value of 1.00"]);
  for scenario in sims.terminal_scenarios(&SCENARIO_PERCENTILES) {
    table.add_row(row![
      format!("{:.0}th percentile", scenario.percentile),
      format!("{:.3}", scenario.value)
    ]);
  }
  println!(
    "\nMonte Carlo, {} paths over {} trading days:",
    sims.num_paths(),
    sims.days()
  );
  table.printstd();

  let outcome = optimize_weights(&panel, &OptimizerConfig::default())?;
  let mut table = Table::new();
  table.add_row(row!["Ticker", "Weight"]);
  for (ticker, weight) in outcome.weights.iter() {
    table.add_row(row![ticker, format!("{:.1}%", weight * 100.0)]);
  }
  println!(
    "\nMax-Sharpe weights (converged: {}, expected return {:.2}%, vol {:.2}%, Sharpe {:.2}):",
    outcome.converged,
    outcome.expected_return * 100.0,
    outcome.volatility * 100.0,
    outcome.sharpe
  );
  table.printstd();

  let frontier = sample_efficient_frontier(&panel, FRONTIER_SAMPLES, FRONTIER_SEED)?;
  if let Some(best) = frontier.iter().max_by(|a, b| {
    a.sharpe
      .partial_cmp(&b.sharpe)
      .unwrap_or(std::cmp::Ordering::Equal)
  }) {
    println!(
      "\nBest of {} random frontier samples: return {:.2}%, vol {:.2}%, Sharpe {:.2}",
      frontier.len(),
      best.expected_return * 100.0,
      best.volatility * 100.0,
      best.sharpe
    );
  }

  println!("\nOptimal weights as CSV:\n{}", weights_csv(&outcome.weights));

  let config = PortfolioConfig::new(
    "optimized".to_string(),
    outcome.weights,
    returns.dates()[0],
    returns.dates()[returns.len() - 1],
  );
  println!("Portfolio configuration:\n{}", config.to_json()?);

  Ok(())
}

fn ticker_from_path(path: &str) -> anyhow::Result<String> {
  let stem = Path::new(path)
    .file_stem()
    .and_then(|s| s.to_str())
    .with_context(|| format!("cannot derive a ticker from {path}"))?;
  Ok(stem.to_uppercase())
}

/// Read a `date,close` CSV (header row optional) into a price series.
fn read_price_series(path: &str) -> anyhow::Result<PriceSeries> {
  let file = File::open(path).with_context(|| format!("cannot open {path}"))?;
  let reader = BufReader::new(file);

  let mut dates = Vec::new();
  let mut closes = Vec::new();

  for (i, line) in reader.lines().enumerate() {
    let line = line?;
    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    let mut fields = line.split(',');
    let date_field = fields.next().unwrap_or_default();
    let close_field = fields.next().unwrap_or_default();

    match (
      NaiveDate::parse_from_str(date_field.trim(), "%Y-%m-%d"),
      close_field.trim().parse::<f64>(),
    ) {
      (Ok(date), Ok(close)) => {
        dates.push(date);
        closes.push(close);
      }
      _ if i == 0 => continue, // header row
      _ => bail!("{path}:{}: cannot parse '{line}'", i + 1),
    }
  }

  Ok(PriceSeries::new(dates, closes)?)
}
