//! # Quantfolio
//!
//! `quantfolio` is a portfolio analytics calculator: given per-ticker price
//! series and portfolio weights, it derives risk/return statistics,
//! classifies historical market conditions, and projects forward-looking
//! risk via simulation. It is the quantitative core of a larger analysis
//! tool: data acquisition, storage and presentation are collaborators that
//! call in with a [`series::PricePanel`] and render whatever comes back.
//!
//! ## Modules
//!
//! | Module       | Description                                                          |
//! |--------------|----------------------------------------------------------------------|
//! | [`series`]   | Price/return containers, alignment and portfolio return computation. |
//! | [`metrics`]  | Return/risk/ratio statistics and benchmark-relative alpha/beta.      |
//! | [`regime`]   | Five-state market-condition labeling and per-regime aggregation.     |
//! | [`risk`]     | VaR/CVaR report and seedable Monte Carlo path simulation.            |
//! | [`optimize`] | Max-Sharpe weight solving and efficient-frontier sampling.           |
//! | [`grade`]    | Letter grades per metric and the weighted composite grade.           |
//! | [`export`]   | Weight CSV and portfolio-configuration JSON formats.                 |
//! | [`error`]    | Typed failure taxonomy shared by all of the above.                   |
//!
//! ## Example
//!
//! ```no_run
//! use quantfolio::metrics::{compute_metrics, DEFAULT_RISK_FREE_RATE};
//! use quantfolio::series::{compute_portfolio_returns, PricePanel, WeightVector};
//!
//! fn analyze(panel: &PricePanel) -> Result<(), quantfolio::error::PortfolioError> {
//!   let weights = WeightVector::equal(panel.keys().cloned());
//!   let returns = compute_portfolio_returns(panel, &weights)?;
//!   let report = compute_metrics(&returns, None, DEFAULT_RISK_FREE_RATE)?;
//!   println!("Sharpe: {:.2}", report.sharpe);
//!   Ok(())
//! }
//! ```
//!
//! Every operation is synchronous and pure: inputs go in as explicit
//! parameters, derived values come out, nothing is cached or mutated in
//! place. The Monte Carlo and frontier samplers parallelize internally with
//! rayon but stay deterministic for a fixed seed.

pub mod error;
pub mod export;
pub mod grade;
pub mod metrics;
pub mod optimize;
pub mod regime;
pub mod risk;
pub mod series;

pub use error::PortfolioError;
pub use export::weights_csv;
pub use export::PortfolioConfig;
pub use grade::composite;
pub use grade::grade_metric;
pub use grade::grade_report;
pub use grade::Grade;
pub use grade::GradeBook;
pub use grade::GradedMetric;
pub use metrics::compute_metrics;
pub use metrics::monthly_returns;
pub use metrics::rolling_ratios;
pub use metrics::MetricsReport;
pub use optimize::optimize_weights;
pub use optimize::sample_efficient_frontier;
pub use optimize::FrontierPoint;
pub use optimize::OptimizationOutcome;
pub use optimize::OptimizerConfig;
pub use optimize::OptimizerMethod;
pub use regime::aggregate_by_regime;
pub use regime::classify_regimes;
pub use regime::Regime;
pub use regime::RegimeStats;
pub use risk::compute_risk_metrics;
pub use risk::ForwardRiskReport;
pub use risk::MonteCarlo;
pub use risk::SimulationPaths;
pub use series::compute_portfolio_returns;
pub use series::PricePanel;
pub use series::PriceSeries;
pub use series::ReturnSeries;
pub use series::WeightVector;
