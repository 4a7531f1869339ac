//! # Portfolio Optimizers
//!
//! $$
//! \mathbf w(t) = \arg\min_{\mathbf w \in \mathcal W}\ \tfrac{1-t}{2}\,\mathbf w^\top\Sigma\,\mathbf w - t\,\mu^\top\mathbf w,\qquad t \in [0, 1)
//! $$
//!
//! Mean-variance objectives. Minimum volatility is `w(0)`; the target-risk and
//! target-return objectives search `t` with Brent's method and only return
//! weights on the feasible side of the target; the tangency
//! portfolio is solved through the homogeneous reformulation
//! `min y' Sigma y` s.t. `(mu - r_f)' y = 1, y >= 0`, `w = y / sum(y)`.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::solver::brent::BrentRoot;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

use super::solver::FeasibleSet;
use super::solver::ProjectedGradient;
use super::statistics::StatisticsSnapshot;
use crate::error::PipelineError;
use crate::error::Result;

/// Covariance matrices whose smallest eigenvalue falls below this share of
/// the largest are treated as singular.
pub const SINGULARITY_THRESHOLD: f64 = 1e-10;

/// Slack allowed on budget, bounds and targets of returned weights.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-8;

/// Frontier steps `t_k = 1 - 2^-k` tried before root finding.
const FRONTIER_STEPS: i32 = 20;

/// Iteration limits of the inner and outer solvers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverSettings {
  /// Projected-gradient iterations per quadratic solve.
  pub max_iters: u64,
  /// Largest per-coordinate step accepted as converged.
  pub tolerance: f64,
  /// Brent iterations for target objectives.
  pub max_root_iters: u64,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      max_iters: 50_000,
      tolerance: 1e-12,
      max_root_iters: 200,
    }
  }
}

/// Validated `(mu, Sigma)` pair ready for optimization.
#[derive(Clone, Debug)]
pub struct MeanVariance {
  mu: DVector<f64>,
  cov: DMatrix<f64>,
  max_eigenvalue: f64,
  settings: SolverSettings,
}

impl MeanVariance {
  /// Fails with [`PipelineError::DegenerateInput`] for fewer than two assets,
  /// non-finite estimates or a singular covariance matrix.
  pub fn new(stats: &StatisticsSnapshot, settings: SolverSettings) -> Result<Self> {
    let n = stats.n_assets();
    if n < 2 {
      return Err(PipelineError::DegenerateInput(format!(
        "at least two securities are required, got {n}"
      )));
    }

    let mean = stats.mean_returns();
    let covariance = stats.covariance();
    if mean.iter().chain(covariance.iter()).any(|x| !x.is_finite()) {
      return Err(PipelineError::DegenerateInput(
        "return statistics contain non-finite values".to_string(),
      ));
    }

    let mu = DVector::from_iterator(n, mean.iter().copied());
    let cov = DMatrix::from_fn(n, n, |i, j| 0.5 * (covariance[[i, j]] + covariance[[j, i]]));

    let eigenvalues = cov.symmetric_eigenvalues();
    let max_eigenvalue = eigenvalues.max();
    let min_eigenvalue = eigenvalues.min();
    if max_eigenvalue <= 0.0 || min_eigenvalue <= max_eigenvalue * SINGULARITY_THRESHOLD {
      return Err(PipelineError::DegenerateInput(format!(
        "covariance matrix is singular (eigenvalues in [{min_eigenvalue:.3e}, {max_eigenvalue:.3e}])"
      )));
    }

    Ok(Self {
      mu,
      cov,
      max_eigenvalue,
      settings,
    })
  }

  pub fn n_assets(&self) -> usize {
    self.mu.len()
  }

  pub fn expected_return(&self, w: &[f64]) -> f64 {
    self.mu.iter().zip(w.iter()).map(|(a, b)| a * b).sum()
  }

  pub fn volatility(&self, w: &[f64]) -> f64 {
    let w = DVector::from_column_slice(w);
    w.dot(&(&self.cov * &w)).max(0.0).sqrt()
  }

  /// Minimize `risk_weight / 2 * w' Sigma w - return_weight * mu' w` over `set`.
  fn solve_quadratic(&self, set: &FeasibleSet, risk_weight: f64, return_weight: f64) -> Result<Vec<f64>> {
    let cost = QuadraticCost {
      linear: self.mu.clone() * return_weight,
      cov: self.cov.clone() * risk_weight,
    };
    self.minimize(cost, set, risk_weight * self.max_eigenvalue)
  }

  fn minimize(&self, cost: QuadraticCost, set: &FeasibleSet, lipschitz: f64) -> Result<Vec<f64>> {
    let solver = ProjectedGradient::new(set.clone(), lipschitz).with_tolerance(self.settings.tolerance);
    let x0 = vec![0.0; set.dim()];

    let res = Executor::new(cost, solver)
      .configure(|state| state.param(x0).max_iters(self.settings.max_iters))
      .run()
      .map_err(solver_error)?;

    res.state.best_param.ok_or_else(|| {
      PipelineError::DegenerateInput("optimizer returned no solution".to_string())
    })
  }

  /// Frontier point for trade-off `t`, clamped to `[0, 1 - 2^-20]`.
  pub fn frontier_point(&self, set: &FeasibleSet, t: f64) -> Result<Vec<f64>> {
    let t = t.clamp(0.0, frontier_step(FRONTIER_STEPS));
    self.solve_quadratic(set, 1.0 - t, t)
  }

  /// Least-variance portfolio among those with the highest expected return.
  pub fn max_return_portfolio(&self, set: &FeasibleSet) -> Result<Option<Vec<f64>>> {
    let Some(best) = set.max_linear(self.mu.as_slice()) else {
      return Ok(None);
    };
    let mut w = best.weights;
    let free = best.ties;
    if free.len() < 2 {
      return Ok(Some(w));
    }

    let face = set.restrict(&free, &w);
    let k = free.len();
    let cov = DMatrix::from_fn(k, k, |a, b| self.cov[(free[a], free[b])]);
    // coupling of the free block to the pinned weights
    let coupling = DVector::from_fn(k, |a, _| {
      (0..self.n_assets())
        .filter(|j| !free.contains(j))
        .map(|j| self.cov[(free[a], j)] * w[j])
        .sum::<f64>()
    });
    let lipschitz = cov.symmetric_eigenvalues().max();
    let sub = self.minimize(
      QuadraticCost {
        linear: -coupling,
        cov,
      },
      &face,
      lipschitz,
    )?;
    for (a, &i) in free.iter().enumerate() {
      w[i] = sub[a];
    }
    Ok(Some(w))
  }
}

fn frontier_step(k: i32) -> f64 {
  1.0 - 0.5f64.powi(k)
}

/// `1/2 w' cov w - linear' w`.
struct QuadraticCost {
  linear: DVector<f64>,
  cov: DMatrix<f64>,
}

impl CostFunction for QuadraticCost {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let w = DVector::from_column_slice(x);
    Ok(0.5 * w.dot(&(&self.cov * &w)) - self.linear.dot(&w))
  }
}

impl Gradient for QuadraticCost {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, x: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    let w = DVector::from_column_slice(x);
    let g = &self.cov * &w - &self.linear;
    Ok(g.as_slice().to_vec())
  }
}

#[derive(Clone, Copy, Debug)]
enum FrontierMeasure {
  Return,
  Volatility,
}

/// `t -> measure(w(t)) - target`, non-decreasing in `t`.
#[derive(Clone, Debug)]
struct FrontierGap {
  problem: MeanVariance,
  set: FeasibleSet,
  measure: FrontierMeasure,
  target: f64,
}

impl FrontierGap {
  fn measure(&self, w: &[f64]) -> f64 {
    match self.measure {
      FrontierMeasure::Return => self.problem.expected_return(w),
      FrontierMeasure::Volatility => self.problem.volatility(w),
    }
  }

  /// Whether `w` satisfies the target constraint.
  fn admits(&self, w: &[f64]) -> bool {
    match self.measure {
      FrontierMeasure::Return => self.measure(w) >= self.target - FEASIBILITY_TOLERANCE,
      FrontierMeasure::Volatility => self.measure(w) <= self.target + FEASIBILITY_TOLERANCE,
    }
  }

  /// Bisect `[lo, hi]` and return the point on the admissible end.
  fn bisect(&self, mut lo: f64, mut hi: f64) -> Result<Vec<f64>> {
    for _ in 0..100 {
      let mid = 0.5 * (lo + hi);
      if mid <= lo || mid >= hi {
        break;
      }
      let w = self.problem.frontier_point(&self.set, mid)?;
      if self.measure(&w) >= self.target {
        hi = mid;
      } else {
        lo = mid;
      }
    }
    let t = match self.measure {
      FrontierMeasure::Return => hi,
      FrontierMeasure::Volatility => lo,
    };
    self.problem.frontier_point(&self.set, t)
  }
}

impl CostFunction for FrontierGap {
  type Param = f64;
  type Output = f64;

  fn cost(&self, t: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let w = self.problem.frontier_point(&self.set, *t)?;
    Ok(self.measure(&w) - self.target)
  }
}

fn solver_error(err: argmin::core::Error) -> PipelineError {
  match err.downcast::<PipelineError>() {
    Ok(e) => e,
    Err(e) => PipelineError::DegenerateInput(format!("optimizer failed: {e}")),
  }
}

/// Walk `t_k = 1 - 2^-k` until `measure - target` changes sign, then Brent.
///
/// `None` when even the last step stays below the target. A root that lands
/// on the wrong side of the target is refined by bisection.
fn search_frontier(gap: FrontierGap) -> Result<Option<Vec<f64>>> {
  let mut lo = 0.0;
  let mut hi = None;
  for k in 1..=FRONTIER_STEPS {
    let t = frontier_step(k);
    let w = gap.problem.frontier_point(&gap.set, t)?;
    if gap.measure(&w) >= gap.target {
      hi = Some(t);
      break;
    }
    lo = t;
  }
  let Some(hi) = hi else {
    return Ok(None);
  };

  let solver = BrentRoot::new(lo, hi, 1e-14);
  let res = Executor::new(gap.clone(), solver)
    .configure(|state| state.max_iters(gap.problem.settings.max_root_iters))
    .run()
    .map_err(solver_error)?;
  let t = res.state.best_param.unwrap_or(hi);
  debug!(t, lo, hi, "frontier root found");

  let w = gap.problem.frontier_point(&gap.set, t)?;
  if gap.admits(&w) {
    return Ok(Some(w));
  }
  debug!(t, "frontier root overshoots the target, bisecting");
  gap.bisect(lo, hi).map(Some)
}

/// Reject weights that left `set`.
fn ensure_feasible(set: &FeasibleSet, w: Vec<f64>) -> Result<Vec<f64>> {
  if set.contains(&w, FEASIBILITY_TOLERANCE) {
    Ok(w)
  } else {
    Err(PipelineError::DegenerateInput(format!(
      "optimizer left the feasible set (net exposure {:.6})",
      w.iter().sum::<f64>()
    )))
  }
}

/// Tangency portfolio, long-only and fully invested.
pub fn max_sharpe(problem: &MeanVariance, risk_free_rate: f64) -> Result<Vec<f64>> {
  let excess: Vec<f64> = problem.mu.iter().map(|m| m - risk_free_rate).collect();
  if excess.iter().all(|&e| e <= 0.0) {
    return Err(PipelineError::InfeasibleObjective(format!(
      "no security has an expected return above the risk-free rate of {:.2}%",
      risk_free_rate * 100.0
    )));
  }

  let set = FeasibleSet::normalized_ray(excess);
  let y = problem.solve_quadratic(&set, 1.0, 0.0)?;
  let total: f64 = y.iter().sum();
  if total <= 0.0 {
    return Err(PipelineError::DegenerateInput(
      "tangency portfolio has no positive exposure".to_string(),
    ));
  }
  let w = y.iter().map(|v| v / total).collect();
  ensure_feasible(&FeasibleSet::long_only(problem.n_assets()), w)
}

/// Global minimum-variance portfolio, long-only and fully invested.
pub fn min_volatility(problem: &MeanVariance) -> Result<Vec<f64>> {
  let set = FeasibleSet::long_only(problem.n_assets());
  let w = problem.frontier_point(&set, 0.0)?;
  ensure_feasible(&set, w)
}

/// Maximize `mu' w - delta / 2 * w' Sigma w`.
pub fn max_quadratic_utility(problem: &MeanVariance, risk_aversion: f64, market_neutral: bool) -> Result<Vec<f64>> {
  if risk_aversion.is_nan() || risk_aversion <= 0.0 {
    return Err(PipelineError::InvalidParameter(format!(
      "risk aversion must be positive, got {risk_aversion}"
    )));
  }
  let set = FeasibleSet::for_objective(problem.n_assets(), market_neutral);
  let w = problem.solve_quadratic(&set, risk_aversion, 1.0)?;
  ensure_feasible(&set, w)
}

/// Maximize return subject to `sigma_p <= target_volatility`.
pub fn efficient_risk(problem: &MeanVariance, target_volatility: f64, market_neutral: bool) -> Result<Vec<f64>> {
  let set = FeasibleSet::for_objective(problem.n_assets(), market_neutral);

  let w_min = problem.frontier_point(&set, 0.0)?;
  let min_vol = problem.volatility(&w_min);
  if target_volatility < min_vol - 1e-9 {
    return Err(PipelineError::InfeasibleObjective(format!(
      "target volatility {:.2}% is below the minimum attainable {:.2}%",
      target_volatility * 100.0,
      min_vol * 100.0
    )));
  }
  if target_volatility <= min_vol {
    return ensure_feasible(&set, w_min);
  }

  if let Some(corner) = problem.max_return_portfolio(&set)? {
    if problem.volatility(&corner) <= target_volatility {
      return ensure_feasible(&set, corner);
    }
  }

  let gap = FrontierGap {
    problem: problem.clone(),
    set: set.clone(),
    measure: FrontierMeasure::Volatility,
    target: target_volatility,
  };
  let w = match search_frontier(gap)? {
    Some(w) => w,
    // the frontier end still sits below the target
    None => problem.frontier_point(&set, 1.0)?,
  };

  let vol = problem.volatility(&w);
  if vol > target_volatility + FEASIBILITY_TOLERANCE {
    return Err(PipelineError::DegenerateInput(format!(
      "frontier search ended at volatility {:.4}% above the target {:.4}%",
      vol * 100.0,
      target_volatility * 100.0
    )));
  }
  ensure_feasible(&set, w)
}

/// Minimize volatility subject to `mu' w >= target_return`.
pub fn efficient_return(problem: &MeanVariance, target_return: f64, market_neutral: bool) -> Result<Vec<f64>> {
  let set = FeasibleSet::for_objective(problem.n_assets(), market_neutral);

  let corner = problem.max_return_portfolio(&set)?;
  if let Some(corner) = &corner {
    let max_return = problem.expected_return(corner);
    if target_return > max_return + 1e-12 {
      return Err(PipelineError::InfeasibleObjective(format!(
        "target return {:.2}% exceeds the maximum attainable {:.2}%",
        target_return * 100.0,
        max_return * 100.0
      )));
    }
  }

  let w_min = problem.frontier_point(&set, 0.0)?;
  if problem.expected_return(&w_min) >= target_return {
    return ensure_feasible(&set, w_min);
  }

  let gap = FrontierGap {
    problem: problem.clone(),
    set: set.clone(),
    measure: FrontierMeasure::Return,
    target: target_return,
  };
  let w = match search_frontier(gap)? {
    Some(w) => w,
    // only the corner itself reaches the target
    None => corner.ok_or_else(|| {
      PipelineError::InfeasibleObjective(format!(
        "no frontier portfolio reaches a return of {:.2}%",
        target_return * 100.0
      ))
    })?,
  };

  let ret = problem.expected_return(&w);
  if ret < target_return - FEASIBILITY_TOLERANCE {
    return Err(PipelineError::DegenerateInput(format!(
      "frontier search ended at return {:.4}% below the target {:.4}%",
      ret * 100.0,
      target_return * 100.0
    )));
  }
  ensure_feasible(&set, w)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn stats(mu: Vec<f64>, cov: Vec<Vec<f64>>) -> StatisticsSnapshot {
    let labels = (0..mu.len()).map(|i| format!("A{i}")).collect();
    StatisticsSnapshot::new(labels, mu, cov).unwrap()
  }

  fn diagonal() -> MeanVariance {
    let s = stats(
      vec![0.10, 0.20],
      vec![vec![0.04, 0.0], vec![0.0, 0.09]],
    );
    MeanVariance::new(&s, SolverSettings::default()).unwrap()
  }

  #[test]
  fn min_volatility_matches_inverse_variance_weights() {
    let w = min_volatility(&diagonal()).unwrap();
    // w_i proportional to 1 / sigma_i^2
    assert_abs_diff_eq!(w[0], 9.0 / 13.0, epsilon = 1e-8);
    assert_abs_diff_eq!(w[1], 4.0 / 13.0, epsilon = 1e-8);
  }

  #[test]
  fn max_sharpe_matches_closed_form_tangency() {
    let w = max_sharpe(&diagonal(), 0.0).unwrap();
    // w_i proportional to mu_i / sigma_i^2 = 2.5, 2.222
    let a = 0.10 / 0.04;
    let b = 0.20 / 0.09;
    assert_abs_diff_eq!(w[0], a / (a + b), epsilon = 1e-7);
    assert_abs_diff_eq!(w[1], b / (a + b), epsilon = 1e-7);
  }

  #[test]
  fn max_sharpe_is_infeasible_when_nothing_beats_the_risk_free_rate() {
    let err = max_sharpe(&diagonal(), 0.25).unwrap_err();
    assert!(matches!(err, PipelineError::InfeasibleObjective(_)));
  }

  #[test]
  fn efficient_return_hits_the_target_on_the_frontier() {
    let p = diagonal();
    let w = efficient_return(&p, 0.16, false).unwrap();
    assert_abs_diff_eq!(p.expected_return(&w), 0.16, epsilon = 1e-7);
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(w[0], 0.4, epsilon = 1e-6);
  }

  #[test]
  fn efficient_return_beyond_the_best_asset_is_infeasible() {
    let err = efficient_return(&diagonal(), 0.25, false).unwrap_err();
    assert!(matches!(err, PipelineError::InfeasibleObjective(_)));
  }

  #[test]
  fn efficient_risk_below_minimum_volatility_is_infeasible() {
    let err = efficient_risk(&diagonal(), 0.05, false).unwrap_err();
    assert!(matches!(err, PipelineError::InfeasibleObjective(_)));
  }

  #[test]
  fn efficient_risk_spends_the_risk_budget() {
    let p = diagonal();
    let w = efficient_risk(&p, 0.2, false).unwrap();
    assert_abs_diff_eq!(p.volatility(&w), 0.2, epsilon = 1e-7);

    let loose = efficient_risk(&p, 0.5, false).unwrap();
    assert_abs_diff_eq!(loose[1], 1.0, epsilon = 1e-12);
  }

  fn tied() -> MeanVariance {
    let s = stats(
      vec![0.10, 0.10, 0.05],
      vec![
        vec![0.04, 0.0, 0.0],
        vec![0.0, 0.09, 0.0],
        vec![0.0, 0.0, 0.01],
      ],
    );
    MeanVariance::new(&s, SolverSettings::default()).unwrap()
  }

  #[test]
  fn max_return_portfolio_splits_tied_assets_by_variance() {
    let w = tied().max_return_portfolio(&FeasibleSet::long_only(3)).unwrap().unwrap();
    assert_abs_diff_eq!(w[0], 9.0 / 13.0, epsilon = 1e-8);
    assert_abs_diff_eq!(w[1], 4.0 / 13.0, epsilon = 1e-8);
    assert_abs_diff_eq!(w[2], 0.0, epsilon = 1e-12);
  }

  #[test]
  fn efficient_risk_with_tied_returns_stays_fully_invested() {
    let p = tied();
    let w = efficient_risk(&p, 0.18, false).unwrap();
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(p.volatility(&w) <= 0.18 + 1e-9);
    assert_abs_diff_eq!(p.expected_return(&w), 0.10, epsilon = 1e-9);
  }

  #[test]
  fn efficient_risk_with_tied_returns_stays_market_neutral() {
    let p = tied();
    let w = efficient_risk(&p, 0.2, true).unwrap();
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 0.0, epsilon = 1e-9);
    assert!(p.volatility(&w) <= 0.2 + 1e-9);
    assert!(w.iter().all(|v| (-1.0 - 1e-9..=1.0 + 1e-9).contains(v)));
  }

  #[test]
  fn efficient_risk_just_below_the_corner_respects_the_target() {
    let p = diagonal();
    let w = efficient_risk(&p, 0.2999, false).unwrap();
    assert!(p.volatility(&w) <= 0.2999 + 1e-9);
    assert_abs_diff_eq!(p.volatility(&w), 0.2999, epsilon = 1e-6);
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
  }

  #[test]
  fn efficient_return_with_tied_returns_reaches_the_maximum() {
    let p = tied();
    let w = efficient_return(&p, 0.10, false).unwrap();
    assert!(p.expected_return(&w) >= 0.10 - 1e-8);
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
  }

  #[test]
  fn market_neutral_utility_has_zero_net_exposure() {
    let p = diagonal();
    let w = max_quadratic_utility(&p, 10.0, true).unwrap();
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 0.0, epsilon = 1e-9);
    assert!(w[1] > 0.0 && w[0] < 0.0);
  }

  #[test]
  fn singular_covariance_is_degenerate() {
    let s = stats(
      vec![0.1, 0.1],
      vec![vec![0.04, 0.04], vec![0.04, 0.04]],
    );
    let err = MeanVariance::new(&s, SolverSettings::default()).unwrap_err();
    assert!(matches!(err, PipelineError::DegenerateInput(_)));

    let single = stats(vec![0.1], vec![vec![0.04]]);
    assert!(matches!(
      MeanVariance::new(&single, SolverSettings::default()),
      Err(PipelineError::DegenerateInput(_))
    ));
  }
}
