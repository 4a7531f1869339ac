use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Local;
use chrono::NaiveDate;
use clap::Parser;
use clap::Subcommand;
use frontier_rs::InputChange;
use frontier_rs::PipelineConfig;
use frontier_rs::PipelineController;
use frontier_rs::market_data::MarketDataSource;
use frontier_rs::market_data::moex::MoexClient;
use frontier_rs::quant::portfolio::DateWindow;
use frontier_rs::quant::portfolio::ObjectiveKind;
use frontier_rs::quant::portfolio::Security;
use frontier_rs::visualization::PieChartConfig;
use frontier_rs::visualization::SvgPieChart;
use frontier_rs::visualization::TextReport;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Optimal stock portfolios from Moscow Exchange price history.
#[derive(Parser)]
#[command(name = "frontier", version, about, long_about = None)]
struct Cli {
  /// TOML configuration file
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// List the securities available on the board
  List,
  /// Fetch prices, optimize and write the report
  Run {
    /// Exchange codes or short names, comma separated
    #[arg(short, long, value_delimiter = ',')]
    securities: Vec<String>,

    /// Window start (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Window end (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// max-sharpe, min-volatility, quadratic-utility, efficient-risk or efficient-return
    #[arg(short, long, value_parser = parse_objective)]
    objective: Option<ObjectiveKind>,

    /// Risk-free rate, %
    #[arg(long)]
    risk_free_rate: Option<f64>,

    /// Target volatility, %
    #[arg(long)]
    target_risk: Option<f64>,

    /// Target return, %
    #[arg(long)]
    target_return: Option<f64>,

    /// Net-zero exposure for utility and target objectives
    #[arg(long)]
    market_neutral: bool,

    /// Risk aversion for the quadratic-utility objective
    #[arg(long)]
    risk_aversion: Option<f64>,

    /// Write the pie chart here
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Print the closing-price matrix
    #[arg(long)]
    prices: bool,
  },
}

fn parse_objective(s: &str) -> Result<ObjectiveKind, String> {
  ObjectiveKind::parse(s).ok_or_else(|| format!("unknown objective {s}"))
}

/// One `CODE name` line per security; an empty catalogue prints nothing.
fn print_catalogue(securities: &[Security], out: &mut impl Write) -> std::io::Result<()> {
  if securities.is_empty() {
    warn!("security catalogue is empty or unavailable");
  }
  for security in securities {
    writeln!(out, "{:<8} {}", security.id, security.name)?;
  }
  Ok(())
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let config = match &cli.config {
    Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
    None => PipelineConfig::default(),
  };
  let client = MoexClient::new().context("building ISS client")?;
  let today = Local::now().date_naive();

  match cli.command {
    Commands::List => {
      print_catalogue(&client.list_securities(), &mut std::io::stdout().lock())?;
    }
    Commands::Run {
      securities,
      from,
      to,
      objective,
      risk_free_rate,
      target_risk,
      target_return,
      market_neutral,
      risk_aversion,
      svg,
      prices,
    } => {
      let presenters = (TextReport::new(prices), SvgPieChart::new(PieChartConfig::default()));
      let mut controller = PipelineController::new(client, presenters, config, today);

      let codes = if securities.is_empty() {
        controller.config().default_securities.clone()
      } else {
        securities
      };
      let selected = controller.resolve_securities(&codes)?;
      controller.on_input_changed(InputChange::Securities(selected))?;

      if from.is_some() || to.is_some() {
        let current = controller.inputs().window;
        let window = DateWindow::new(from.unwrap_or(current.start), to.unwrap_or(current.end))?;
        controller.on_input_changed(InputChange::DateWindow(window))?;
      }
      if let Some(kind) = objective {
        controller.on_input_changed(InputChange::Objective(kind))?;
      }
      if let Some(rate) = risk_free_rate {
        controller.on_input_changed(InputChange::RiskFreeRate(rate / 100.0))?;
      }
      if let Some(target) = target_risk {
        controller.on_input_changed(InputChange::TargetVolatility(target / 100.0))?;
      }
      if let Some(target) = target_return {
        controller.on_input_changed(InputChange::TargetReturn(target / 100.0))?;
      }
      if market_neutral {
        controller.on_input_changed(InputChange::MarketNeutral(true))?;
      }
      if let Some(delta) = risk_aversion {
        controller.on_input_changed(InputChange::RiskAversion(delta))?;
      }

      let outcome = controller.on_compute_requested().map(|_| ());
      let (report, chart) = controller.presenter();
      print!("{}", report.document());
      if let Some(path) = svg {
        chart
          .write_to(&path)
          .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "pie chart written");
      }
      outcome?;
    }
  }

  Ok(())
}
