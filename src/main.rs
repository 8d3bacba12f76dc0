//! Allocation CLI: optimize a return table read from CSV and print the result.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use chrono::NaiveDate;
use clap::Parser;
use prettytable::Table;
use prettytable::row;
use quant_allocator::portfolio::EngineConfig;
use quant_allocator::portfolio::MetricsResult;
use quant_allocator::portfolio::ObjectiveType;
use quant_allocator::portfolio::OptimizationRequest;
use quant_allocator::portfolio::OptimizationResult;
use quant_allocator::portfolio::PortfolioEngine;
use quant_allocator::portfolio::ReturnTable;
use quant_allocator::portfolio::ShortRequest;
use quant_allocator::portfolio::to_table;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Constrained portfolio allocation over base-0 returns", long_about = None)]
struct Cli {
  /// CSV with a date column, an optional reference column and one column per asset
  input: PathBuf,

  /// sharpe, sortino, volatility, slope, hc10, quality_linear, excess_hc10, return
  #[arg(short, long, default_value = "sharpe")]
  objective: ObjectiveType,

  /// Lower weight bound for every free asset
  #[arg(long, default_value_t = 0.0)]
  min_weight: f64,

  /// Upper weight bound for every free asset
  #[arg(long, default_value_t = 1.0)]
  max_weight: f64,

  /// Risk-free rate; defaults to the accumulated reference rate
  #[arg(long)]
  risk_free: Option<f64>,

  /// Comma-separated subset of asset columns
  #[arg(long, value_delimiter = ',')]
  assets: Vec<String>,

  /// Fixed short position as ASSET=WEIGHT, repeatable
  #[arg(long = "short", value_parser = parse_short)]
  shorts: Vec<(String, f64)>,

  /// First date to include (YYYY-MM-DD)
  #[arg(long)]
  start: Option<NaiveDate>,

  /// Last date to include (YYYY-MM-DD)
  #[arg(long)]
  end: Option<NaiveDate>,

  /// Field delimiter of the input file
  #[arg(long, default_value_t = ',')]
  delimiter: char,
}

fn parse_short(s: &str) -> Result<(String, f64), String> {
  let (asset, weight) = s
    .split_once('=')
    .ok_or_else(|| format!("expected ASSET=WEIGHT, got `{s}`"))?;
  let weight = weight
    .trim()
    .parse::<f64>()
    .map_err(|e| format!("invalid weight for {asset}: {e}"))?;
  Ok((asset.trim().to_string(), weight))
}

fn read_table(path: &PathBuf, delimiter: char) -> Result<ReturnTable> {
  if !delimiter.is_ascii() {
    bail!("delimiter must be a single ASCII character");
  }
  let mut reader = csv::ReaderBuilder::new()
    .delimiter(delimiter as u8)
    .flexible(true)
    .trim(csv::Trim::All)
    .from_path(path)
    .with_context(|| format!("opening {}", path.display()))?;

  let columns = reader
    .headers()
    .context("reading CSV header")?
    .iter()
    .map(str::to_string)
    .collect();

  let mut rows = Vec::new();
  for record in reader.records() {
    let record = record.context("reading CSV record")?;
    rows.push(record.iter().map(str::to_string).collect());
  }
  Ok(ReturnTable::new(columns, rows))
}

fn metrics_table(m: &MetricsResult) -> Table {
  let mut table = Table::new();
  table.set_titles(row!["Metric", "Value"]);
  table.add_row(row!["Final cumulative return", format!("{:.4}", m.gv_final)]);
  table.add_row(row!["Annual return", format!("{:.4}", m.annual_return)]);
  table.add_row(row!["Volatility", format!("{:.4}", m.volatility)]);
  table.add_row(row!["Risk-free rate", format!("{:.4}", m.risk_free_rate)]);
  table.add_row(row!["Sharpe", format!("{:.4}", m.sharpe)]);
  table.add_row(row!["Sortino", format!("{:.4}", m.sortino)]);
  table.add_row(row!["VaR 95% (daily)", format!("{:.4}", m.var.daily_95)]);
  table.add_row(row!["VaR 99% (daily)", format!("{:.4}", m.var.daily_99)]);
  table.add_row(row!["CVaR 95% (daily)", format!("{:.4}", m.cvar.daily_95)]);
  table.add_row(row!["CVaR 99% (daily)", format!("{:.4}", m.cvar.daily_99)]);
  table.add_row(row!["Slope", format!("{:.6}", m.trend.slope)]);
  table.add_row(row!["R²", format!("{:.4}", m.trend.r_squared)]);
  table.add_row(row!["HC10", format!("{:.4}", m.hc10)]);
  if let Some(excess) = &m.excess {
    table.add_row(row!["Excess slope", format!("{:.6}", excess.trend.slope)]);
    table.add_row(row!["Excess volatility", format!("{:.4}", excess.volatility)]);
    table.add_row(row!["Excess HC10", format!("{:.4}", excess.hc10)]);
  }
  table
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  let table = read_table(&cli.input, cli.delimiter)?;

  let mut engine = PortfolioEngine::from_table(&table, None, EngineConfig::default())?;
  if cli.start.is_some() || cli.end.is_some() {
    let start = cli.start.unwrap_or(NaiveDate::MIN);
    let end = cli.end.unwrap_or(NaiveDate::MAX);
    engine = engine.window(start, end)?;
  }

  let result = if cli.shorts.is_empty() {
    let mut request = OptimizationRequest::new(cli.objective).with_bounds(cli.min_weight, cli.max_weight);
    request.risk_free_rate = cli.risk_free;
    if !cli.assets.is_empty() {
      let series = engine.series().select(&cli.assets)?;
      engine = PortfolioEngine::new(series, engine.config().clone());
    }
    engine.optimize(&request)?
  } else {
    let selected = if cli.assets.is_empty() {
      engine
        .assets()
        .iter()
        .filter(|a| !cli.shorts.iter().any(|(s, _)| s == *a))
        .cloned()
        .collect()
    } else {
      cli.assets.clone()
    };
    let mut request = ShortRequest::new(selected, cli.objective).with_bounds(cli.min_weight, cli.max_weight);
    request.risk_free_rate = cli.risk_free;
    for (asset, weight) in &cli.shorts {
      request = request.with_short(asset.clone(), *weight);
    }
    engine.optimize_with_shorts(&request)?
  };

  match result {
    OptimizationResult::Converged {
      weights,
      metrics,
      iterations,
      cost,
      ..
    } => {
      info!(iterations, cost, "done");
      metrics_table(&metrics).printstd();
      to_table(&engine.summary(&weights)).printstd();
      Ok(())
    }
    OptimizationResult::Failed { message } => bail!("optimization failed: {message}"),
  }
}
