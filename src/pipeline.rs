//! # Pipeline Controller
//!
//! $$
//! \text{Dirty} \xrightarrow{\text{compute ok}} \text{Clean},\qquad
//! \text{Dirty} \xrightarrow{\text{compute err}} \text{Error},\qquad
//! \ast \xrightarrow{\text{input}} \text{Dirty}
//! $$
//!
//! Owns the inputs, the retained price data and the last results, and runs
//! fetch, statistics, optimization and layout on request. Security and window
//! changes force a refetch; objective and parameter changes reuse the
//! retained statistics.

use std::collections::HashSet;
use std::fmt::Display;

use chrono::NaiveDate;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::error::Result;
use crate::market_data::MarketDataSource;
use crate::market_data::fetch_price_table;
use crate::quant::portfolio::DateWindow;
use crate::quant::portfolio::ObjectiveKind;
use crate::quant::portfolio::ObjectiveParameters;
use crate::quant::portfolio::OptimizationEngine;
use crate::quant::portfolio::OptimizationObjective;
use crate::quant::portfolio::PerformanceMetrics;
use crate::quant::portfolio::PriceTable;
use crate::quant::portfolio::Security;
use crate::quant::portfolio::StatisticsEngine;
use crate::quant::portfolio::StatisticsSnapshot;
use crate::quant::portfolio::WeightDistribution;
use crate::visualization::PieSector;
use crate::visualization::SectorGeometry;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PipelineState {
  /// Results match the current inputs.
  Clean,
  /// Inputs changed since the last computation; nothing is shown.
  #[default]
  Dirty,
  /// The last computation failed with this message.
  Error(String),
}

impl Display for PipelineState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PipelineState::Clean => write!(f, "clean"),
      PipelineState::Dirty => write!(f, "dirty"),
      PipelineState::Error(_) => write!(f, "error"),
    }
  }
}

/// One user edit. Rates and targets are fractions.
#[derive(Clone, Debug, PartialEq)]
pub enum InputChange {
  Securities(Vec<Security>),
  DateWindow(DateWindow),
  Objective(ObjectiveKind),
  RiskFreeRate(f64),
  TargetVolatility(f64),
  TargetReturn(f64),
  MarketNeutral(bool),
  RiskAversion(f64),
}

impl InputChange {
  /// Whether the change makes the retained price data stale.
  pub fn invalidates_data(&self) -> bool {
    matches!(self, InputChange::Securities(_) | InputChange::DateWindow(_))
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineInputs {
  pub securities: Vec<Security>,
  pub window: DateWindow,
  pub objective: ObjectiveKind,
  pub parameters: ObjectiveParameters,
}

impl PipelineInputs {
  pub fn active_objective(&self) -> OptimizationObjective {
    self.parameters.objective(self.objective)
  }
}

/// Everything a presenter shows after a successful computation.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineResults {
  pub prices: PriceTable,
  pub statistics: StatisticsSnapshot,
  pub objective: OptimizationObjective,
  pub weights: WeightDistribution,
  pub metrics: PerformanceMetrics,
  pub sectors: Vec<PieSector>,
}

/// Full-replace snapshot handed to presenters.
#[derive(Clone, Copy, Debug)]
pub struct PipelineView<'a> {
  pub state: &'a PipelineState,
  pub objective: ObjectiveKind,
  pub results: Option<&'a PipelineResults>,
}

/// Rendering collaborator. Each call replaces whatever was shown before.
pub trait Presenter {
  fn present(&mut self, view: &PipelineView<'_>);
}

impl Presenter for () {
  fn present(&mut self, _view: &PipelineView<'_>) {}
}

impl<P: Presenter + ?Sized> Presenter for &mut P {
  fn present(&mut self, view: &PipelineView<'_>) {
    (**self).present(view);
  }
}

impl<A: Presenter, B: Presenter> Presenter for (A, B) {
  fn present(&mut self, view: &PipelineView<'_>) {
    self.0.present(view);
    self.1.present(view);
  }
}

#[derive(Clone, Debug)]
struct RetainedData {
  prices: PriceTable,
  statistics: StatisticsSnapshot,
}

pub struct PipelineController<M, P> {
  source: M,
  presenter: P,
  config: PipelineConfig,
  geometry: SectorGeometry,
  today: NaiveDate,
  inputs: PipelineInputs,
  state: PipelineState,
  retained: Option<RetainedData>,
  results: Option<PipelineResults>,
}

impl<M: MarketDataSource, P: Presenter> PipelineController<M, P> {
  /// Starts `Dirty` with no securities, the configured default window ending
  /// the day before `today` and the configured default objective.
  pub fn new(source: M, presenter: P, config: PipelineConfig, today: NaiveDate) -> Self {
    let inputs = PipelineInputs {
      securities: Vec::new(),
      window: config.default_window(today),
      objective: config.default_objective,
      parameters: config.default_parameters(),
    };
    let mut controller = Self {
      source,
      presenter,
      geometry: config.sector_geometry(),
      config,
      today,
      inputs,
      state: PipelineState::Dirty,
      retained: None,
      results: None,
    };
    controller.present();
    controller
  }

  pub fn state(&self) -> &PipelineState {
    &self.state
  }

  pub fn inputs(&self) -> &PipelineInputs {
    &self.inputs
  }

  pub fn results(&self) -> Option<&PipelineResults> {
    self.results.as_ref()
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn source(&self) -> &M {
    &self.source
  }

  pub fn presenter(&self) -> &P {
    &self.presenter
  }

  pub fn presenter_mut(&mut self) -> &mut P {
    &mut self.presenter
  }

  /// Catalogue of the market-data source; may be empty.
  pub fn available_securities(&self) -> Vec<Security> {
    self.source.list_securities()
  }

  /// Look up exchange codes or display names in the catalogue.
  pub fn resolve_securities<S: AsRef<str>>(&self, codes: &[S]) -> Result<Vec<Security>> {
    let catalogue = self.available_securities();
    codes
      .iter()
      .map(|code| {
        let code = code.as_ref();
        catalogue
          .iter()
          .find(|s| s.id.eq_ignore_ascii_case(code) || s.name == code)
          .cloned()
          .ok_or_else(|| PipelineError::InvalidParameter(format!("unknown security {code}")))
      })
      .collect()
  }

  /// Apply one edit, drop the shown results and present the new inputs.
  ///
  /// Invalid edits are rejected and leave inputs and state untouched.
  pub fn on_input_changed(&mut self, change: InputChange) -> Result<()> {
    self.validate(&change)?;

    if change.invalidates_data() {
      self.retained = None;
    }
    match change {
      InputChange::Securities(securities) => self.inputs.securities = securities,
      InputChange::DateWindow(window) => self.inputs.window = window,
      InputChange::Objective(kind) => self.inputs.objective = kind,
      InputChange::RiskFreeRate(rate) => self.inputs.parameters.risk_free_rate = rate,
      InputChange::TargetVolatility(target) => self.inputs.parameters.target_volatility = target,
      InputChange::TargetReturn(target) => self.inputs.parameters.target_return = target,
      InputChange::MarketNeutral(on) => self.inputs.parameters.market_neutral = on,
      InputChange::RiskAversion(delta) => self.inputs.parameters.risk_aversion = delta,
    }

    if self.state != PipelineState::Dirty {
      self.results = None;
      self.transition(PipelineState::Dirty);
    }
    self.present();
    Ok(())
  }

  /// Run the pipeline for the current inputs.
  ///
  /// Reuses retained statistics when only the objective or its parameters
  /// changed; fetches otherwise. Any failure lands in `Error` with results
  /// and retained data discarded.
  pub fn on_compute_requested(&mut self) -> Result<&PipelineResults> {
    info!(
      state = %self.state,
      objective = %self.inputs.objective,
      securities = self.inputs.securities.len(),
      "compute requested"
    );

    match self.run_cycle() {
      Ok(results) => {
        self.transition(PipelineState::Clean);
        let results: &PipelineResults = self.results.insert(results);
        self.presenter.present(&PipelineView {
          state: &self.state,
          objective: self.inputs.objective,
          results: Some(results),
        });
        Ok(results)
      }
      Err(e) => {
        warn!(error = %e, "pipeline run failed");
        self.results = None;
        self.retained = None;
        self.transition(PipelineState::Error(e.to_string()));
        self.present();
        Err(e)
      }
    }
  }

  fn run_cycle(&mut self) -> Result<PipelineResults> {
    if self.inputs.securities.is_empty() {
      return Err(PipelineError::DegenerateInput(
        "no securities selected".to_string(),
      ));
    }
    let objective = self.inputs.active_objective();
    objective.validate()?;

    let retained = match self.retained.take() {
      Some(retained) => {
        debug!("reusing retained price data");
        retained
      }
      None => {
        let prices = fetch_price_table(&self.source, &self.inputs.securities, self.inputs.window)?;
        let statistics = StatisticsEngine::new(self.config.statistics_config()).compute(&prices)?;
        RetainedData { prices, statistics }
      }
    };

    let engine = OptimizationEngine::new(
      self
        .config
        .optimization_config(self.inputs.parameters.risk_free_rate),
    );
    let (weights, metrics) = engine.solve(&retained.statistics, &objective)?;
    let sectors = self.geometry.layout(&weights);
    debug!(sectors = sectors.len(), "pie layout ready");

    let results = PipelineResults {
      prices: retained.prices.clone(),
      statistics: retained.statistics.clone(),
      objective,
      weights,
      metrics,
      sectors,
    };
    self.retained = Some(retained);
    Ok(results)
  }

  fn validate(&self, change: &InputChange) -> Result<()> {
    let invalid = |msg: String| Err(PipelineError::InvalidParameter(msg));
    let finite = |name: &str, value: f64| {
      if value.is_finite() {
        Ok(())
      } else {
        invalid(format!("{name} must be finite"))
      }
    };

    match change {
      InputChange::Securities(securities) => {
        if securities.len() > self.config.max_portfolio_size {
          return invalid(format!(
            "at most {} securities may be selected, got {}",
            self.config.max_portfolio_size,
            securities.len()
          ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = securities.iter().find(|s| !seen.insert(s.id.as_str())) {
          return invalid(format!("{} is selected twice", dup.id));
        }
        Ok(())
      }
      InputChange::DateWindow(window) => {
        let earliest = self.config.earliest_start(self.today);
        if window.start < earliest || window.end > self.today {
          return invalid(format!(
            "date window must lie within {earliest} .. {}",
            self.today
          ));
        }
        Ok(())
      }
      InputChange::Objective(_) | InputChange::MarketNeutral(_) => Ok(()),
      InputChange::RiskFreeRate(rate) => {
        finite("risk-free rate", *rate)?;
        if !(0.0..=1.0).contains(rate) {
          return invalid(format!("risk-free rate must be within 0..100 %, got {}", rate * 100.0));
        }
        Ok(())
      }
      InputChange::TargetVolatility(target) | InputChange::TargetReturn(target) => {
        finite("target", *target)?;
        if *target < 0.0 {
          return invalid(format!("targets must be non-negative, got {}", target * 100.0));
        }
        Ok(())
      }
      InputChange::RiskAversion(delta) => {
        finite("risk aversion", *delta)?;
        if *delta <= 0.0 {
          return invalid(format!("risk aversion must be positive, got {delta}"));
        }
        Ok(())
      }
    }
  }

  fn transition(&mut self, next: PipelineState) {
    if self.state != next {
      info!(from = %self.state, to = %next, "pipeline state changed");
    }
    self.state = next;
  }

  fn present(&mut self) {
    let view = PipelineView {
      state: &self.state,
      objective: self.inputs.objective,
      results: self.results.as_ref(),
    };
    self.presenter.present(&view);
  }
}

#[cfg(test)]
mod tests {
  use chrono::Days;
  use tracing_test::traced_test;

  use super::*;
  use crate::market_data::InMemoryMarketData;
  use crate::quant::portfolio::PricePoint;

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
  }

  fn series(drift: f64, freq: f64, phase: f64) -> Vec<PricePoint> {
    let start = today() - Days::new(120);
    let mut price = 100.0;
    (0..100)
      .map(|t| {
        let point = PricePoint::new(start + Days::new(t), Some(price));
        price *= 1.0 + drift + 0.02 * (freq * t as f64 + phase).sin();
        point
      })
      .collect()
  }

  fn source() -> InMemoryMarketData {
    InMemoryMarketData::new()
      .with_security(Security::new("AAA", "Alpha"), series(0.0015, 0.9, 0.1))
      .with_security(Security::new("BBB", "Beta"), series(0.0008, 2.1, 1.3))
      .with_security(Security::new("CCC", "Gamma"), series(0.0004, 3.7, 2.2))
  }

  #[derive(Default)]
  struct Recorder {
    states: Vec<PipelineState>,
    objectives: Vec<ObjectiveKind>,
    with_results: Vec<bool>,
  }

  impl Presenter for Recorder {
    fn present(&mut self, view: &PipelineView<'_>) {
      self.states.push(view.state.clone());
      self.objectives.push(view.objective);
      self.with_results.push(view.results.is_some());
    }
  }

  fn controller(source: &InMemoryMarketData) -> PipelineController<&InMemoryMarketData, Recorder> {
    let mut c = PipelineController::new(source, Recorder::default(), PipelineConfig::default(), today());
    let selected = c.resolve_securities(&["AAA", "BBB", "Gamma"]).unwrap();
    c.on_input_changed(InputChange::Securities(selected)).unwrap();
    c
  }

  #[test]
  fn starts_dirty_and_computes_to_clean() {
    let source = source();
    let mut c = controller(&source);
    assert_eq!(c.state(), &PipelineState::Dirty);

    let results = c.on_compute_requested().unwrap();
    assert_eq!(results.weights.len(), 3);
    assert_eq!(c.state(), &PipelineState::Clean);
    assert_eq!(source.fetch_count(), 3);
    assert_eq!(c.presenter().states.last(), Some(&PipelineState::Clean));
    assert_eq!(c.presenter().with_results.last(), Some(&true));
  }

  #[test]
  fn compute_presents_the_results_it_returns() {
    let source = source();
    let mut c = controller(&source);
    let weights = c.on_compute_requested().unwrap().weights.clone();
    assert_eq!(c.results().map(|r| &r.weights), Some(&weights));
    assert_eq!(c.presenter().with_results, vec![false, false, true]);
  }

  #[test]
  fn edits_while_dirty_are_presented() {
    let source = source();
    let mut c = controller(&source);
    c.on_input_changed(InputChange::Objective(ObjectiveKind::MinVolatility))
      .unwrap();

    assert_eq!(c.presenter().states, vec![PipelineState::Dirty; 3]);
    assert_eq!(c.presenter().objectives.last(), Some(&ObjectiveKind::MinVolatility));
    assert!(c.presenter().with_results.iter().all(|shown| !shown));

    // rejected edits are not presented
    assert!(c.on_input_changed(InputChange::RiskAversion(-1.0)).is_err());
    assert_eq!(c.presenter().states.len(), 3);
  }

  #[test]
  fn invalid_edit_leaves_state_untouched() {
    let source = source();
    let mut c = controller(&source);
    c.on_compute_requested().unwrap();

    let err = c.on_input_changed(InputChange::RiskAversion(0.0)).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidParameter(_)));
    assert_eq!(c.state(), &PipelineState::Clean);
    assert!(c.results().is_some());

    let too_many = (0..11)
      .map(|i| Security::new(format!("S{i}"), format!("S{i}")))
      .collect();
    assert!(c.on_input_changed(InputChange::Securities(too_many)).is_err());
  }

  #[test]
  fn window_outside_lookback_is_rejected() {
    let source = source();
    let mut c = controller(&source);
    let window = DateWindow::new(
      NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
      NaiveDate::from_ymd_opt(2011, 1, 1).unwrap(),
    )
    .unwrap();
    assert!(c.on_input_changed(InputChange::DateWindow(window)).is_err());
  }

  #[test]
  fn error_state_forces_a_refetch() {
    let source = source();
    let mut c = controller(&source);
    c.on_compute_requested().unwrap();
    assert_eq!(source.fetch_count(), 3);

    c.on_input_changed(InputChange::Objective(ObjectiveKind::EfficientReturn))
      .unwrap();
    c.on_input_changed(InputChange::TargetReturn(50.0)).unwrap();
    assert!(matches!(
      c.on_compute_requested(),
      Err(PipelineError::InfeasibleObjective(_))
    ));
    assert!(matches!(c.state(), PipelineState::Error(_)));
    assert!(c.results().is_none());
    assert_eq!(source.fetch_count(), 3);

    c.on_input_changed(InputChange::Objective(ObjectiveKind::MinVolatility))
      .unwrap();
    c.on_compute_requested().unwrap();
    assert_eq!(source.fetch_count(), 6);
  }

  #[traced_test]
  #[test]
  fn logs_state_transitions() {
    let source = source();
    let mut c = controller(&source);
    c.on_compute_requested().unwrap();

    assert!(logs_contain("compute requested"));
    assert!(logs_contain("pipeline state changed"));
    assert!(logs_contain("price table assembled"));
  }
}
