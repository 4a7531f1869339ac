//! # Projected Gradient
//!
//! $$
//! w_{k+1} = \Pi_{\mathcal W}\!\left(y_k - \tfrac{1}{L}\nabla f(y_k)\right),\qquad
//! \mathcal W = \{\, l \le w_i \le u,\ c^\top w = s \,\}
//! $$
//!
//! Accelerated projected gradient for smooth convex costs over box-and-hyperplane
//! sets, run through argmin's [`Executor`](argmin::core::Executor).

use argmin::core::CostFunction;
use argmin::core::Error;
use argmin::core::Gradient;
use argmin::core::IterState;
use argmin::core::KV;
use argmin::core::Problem;
use argmin::core::Solver;
use argmin::core::State;
use argmin::core::TerminationReason;

/// Feasible set `{ lower <= w_i <= upper, coefficients' w = level }`.
#[derive(Clone, Debug, PartialEq)]
pub struct FeasibleSet {
  lower: f64,
  upper: f64,
  coefficients: Vec<f64>,
  level: f64,
}

impl FeasibleSet {
  /// Fully invested, long-only: `0 <= w <= 1`, `sum(w) = 1`.
  pub fn long_only(n: usize) -> Self {
    Self {
      lower: 0.0,
      upper: 1.0,
      coefficients: vec![1.0; n],
      level: 1.0,
    }
  }

  /// Net-zero exposure with shorting: `-1 <= w <= 1`, `sum(w) = 0`.
  pub fn market_neutral(n: usize) -> Self {
    Self {
      lower: -1.0,
      upper: 1.0,
      coefficients: vec![1.0; n],
      level: 0.0,
    }
  }

  pub fn for_objective(n: usize, market_neutral: bool) -> Self {
    if market_neutral {
      Self::market_neutral(n)
    } else {
      Self::long_only(n)
    }
  }

  /// Non-negative orthant cut by `coefficients' y = 1`.
  pub fn normalized_ray(coefficients: Vec<f64>) -> Self {
    Self {
      lower: 0.0,
      upper: f64::INFINITY,
      coefficients,
      level: 1.0,
    }
  }

  pub fn dim(&self) -> usize {
    self.coefficients.len()
  }

  fn clip(&self, v: &[f64], tau: f64) -> Vec<f64> {
    v.iter()
      .zip(self.coefficients.iter())
      .map(|(&vi, &ci)| (vi - tau * ci).clamp(self.lower, self.upper))
      .collect()
  }

  fn level_of(&self, w: &[f64]) -> f64 {
    w.iter().zip(self.coefficients.iter()).map(|(a, b)| a * b).sum()
  }

  /// Euclidean projection of `v`, or `None` when the set is empty.
  ///
  /// The projection is `clip(v - tau c, lower, upper)` for the multiplier `tau`
  /// matching the hyperplane; `c' clip(..)` is non-increasing in `tau`.
  pub fn project(&self, v: &[f64]) -> Option<Vec<f64>> {
    if v.len() != self.dim() || v.iter().any(|x| !x.is_finite()) {
      return None;
    }
    let g = |tau: f64| self.level_of(&self.clip(v, tau)) - self.level;

    let mut lo = -1.0;
    let mut hi = 1.0;
    let mut expansions = 0;
    while g(lo) < 0.0 {
      lo *= 2.0;
      expansions += 1;
      if expansions > 1100 {
        return None;
      }
    }
    expansions = 0;
    while g(hi) > 0.0 {
      hi *= 2.0;
      expansions += 1;
      if expansions > 1100 {
        return None;
      }
    }

    for _ in 0..200 {
      let mid = 0.5 * (lo + hi);
      if mid <= lo || mid >= hi {
        break;
      }
      if g(mid) > 0.0 {
        lo = mid;
      } else {
        hi = mid;
      }
    }

    // Solve exactly on the linear piece that brackets the root.
    let tau = 0.5 * (lo + hi);
    let w = self.clip(v, tau);
    let mut free_sq = 0.0;
    let mut free_cv = 0.0;
    let mut clamped = 0.0;
    for ((&wi, &vi), &ci) in w.iter().zip(v.iter()).zip(self.coefficients.iter()) {
      if wi > self.lower && wi < self.upper && ci != 0.0 {
        free_sq += ci * ci;
        free_cv += ci * vi;
      } else {
        clamped += ci * wi;
      }
    }
    if free_sq > 0.0 {
      let exact = (free_cv + clamped - self.level) / free_sq;
      if exact >= lo && exact <= hi {
        return Some(self.clip(v, exact));
      }
    }
    Some(w)
  }

  /// Whether `w` lies in the set up to `tol`.
  pub fn contains(&self, w: &[f64], tol: f64) -> bool {
    w.len() == self.dim()
      && w
        .iter()
        .all(|&x| x >= self.lower - tol && x <= self.upper + tol)
      && (self.level_of(w) - self.level).abs() <= tol
  }

  /// Maximize `mu' w` over a bounded unit-coefficient set by greedy filling.
  ///
  /// Returns `None` for sets this does not apply to.
  pub fn max_linear(&self, mu: &[f64]) -> Option<LinearOptimum> {
    if !self.upper.is_finite() || self.coefficients.iter().any(|&c| c != 1.0) || mu.len() != self.dim() {
      return None;
    }

    let n = self.dim();
    let mut w = vec![self.lower; n];
    let mut budget = self.level - self.lower * n as f64;
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| mu[b].partial_cmp(&mu[a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut marginal = None;
    for i in order {
      if budget <= 0.0 {
        break;
      }
      let add = (self.upper - self.lower).min(budget);
      w[i] += add;
      budget -= add;
      marginal = Some(i);
    }

    if budget > 1e-12 {
      return None;
    }

    // Assets tied with the last one filled can trade weight without
    // changing the optimum.
    let ties = match marginal {
      Some(m) => {
        let tol = TIE_TOLERANCE * mu[m].abs().max(1.0);
        (0..n).filter(|&i| (mu[i] - mu[m]).abs() <= tol).collect()
      }
      None => Vec::new(),
    };
    let value = w.iter().zip(mu.iter()).map(|(a, b)| a * b).sum();
    Some(LinearOptimum {
      value,
      weights: w,
      ties,
    })
  }

  /// The set over the coordinates `free` with every other coordinate pinned
  /// to its value in `base`.
  pub fn restrict(&self, free: &[usize], base: &[f64]) -> FeasibleSet {
    let pinned: f64 = (0..self.dim())
      .filter(|i| !free.contains(i))
      .map(|i| self.coefficients[i] * base[i])
      .sum();
    FeasibleSet {
      lower: self.lower,
      upper: self.upper,
      coefficients: free.iter().map(|&i| self.coefficients[i]).collect(),
      level: self.level - pinned,
    }
  }
}

/// Relative gap below which two expected returns count as equal.
const TIE_TOLERANCE: f64 = 1e-12;

/// Greedy maximizer of a linear objective over a [`FeasibleSet`].
#[derive(Clone, Debug, PartialEq)]
pub struct LinearOptimum {
  pub value: f64,
  /// One vertex of the optimal face.
  pub weights: Vec<f64>,
  /// Coordinates free to move along the optimal face, empty or at least the
  /// marginal one.
  pub ties: Vec<usize>,
}

/// FISTA with function-value restart over a [`FeasibleSet`].
#[derive(Clone, Debug)]
pub struct ProjectedGradient {
  set: FeasibleSet,
  step: f64,
  tol: f64,
  momentum: f64,
  extrapolated: Option<Vec<f64>>,
  last_cost: f64,
}

impl ProjectedGradient {
  /// `lipschitz` bounds the gradient's Lipschitz constant; the step is its inverse.
  pub fn new(set: FeasibleSet, lipschitz: f64) -> Self {
    Self {
      set,
      step: 1.0 / lipschitz.max(f64::MIN_POSITIVE),
      tol: 1e-12,
      momentum: 1.0,
      extrapolated: None,
      last_cost: f64::INFINITY,
    }
  }

  /// Stop once no coordinate moves more than `tol` in one step.
  pub fn with_tolerance(mut self, tol: f64) -> Self {
    self.tol = tol;
    self
  }
}

impl<O> Solver<O, IterState<Vec<f64>, (), (), (), (), f64>> for ProjectedGradient
where
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  const NAME: &'static str = "Projected Gradient";

  fn init(
    &mut self,
    problem: &mut Problem<O>,
    state: IterState<Vec<f64>, (), (), (), (), f64>,
  ) -> Result<(IterState<Vec<f64>, (), (), (), (), f64>, Option<KV>), Error> {
    let start = state
      .get_param()
      .cloned()
      .unwrap_or_else(|| vec![0.0; self.set.dim()]);
    let x0 = self
      .set
      .project(&start)
      .ok_or_else(|| Error::msg("feasible set is empty"))?;
    let cost = problem.cost(&x0)?;

    self.momentum = 1.0;
    self.extrapolated = Some(x0.clone());
    self.last_cost = cost;

    Ok((state.param(x0).cost(cost), None))
  }

  fn next_iter(
    &mut self,
    problem: &mut Problem<O>,
    state: IterState<Vec<f64>, (), (), (), (), f64>,
  ) -> Result<(IterState<Vec<f64>, (), (), (), (), f64>, Option<KV>), Error> {
    let x = state
      .get_param()
      .cloned()
      .ok_or_else(|| Error::msg("projected gradient requires an initial point"))?;
    let y = self.extrapolated.take().unwrap_or_else(|| x.clone());

    let grad = problem.gradient(&y)?;
    let target: Vec<f64> = y
      .iter()
      .zip(grad.iter())
      .map(|(yi, gi)| yi - self.step * gi)
      .collect();
    let x_next = self
      .set
      .project(&target)
      .ok_or_else(|| Error::msg("feasible set is empty"))?;
    // long steps lose digits in the projection
    let floor = 16.0 * f64::EPSILON * target.iter().fold(1.0f64, |m, v| m.max(v.abs()));
    let cost = problem.cost(&x_next)?;

    if cost > self.last_cost {
      // restart: drop momentum and continue from the plain step
      self.momentum = 1.0;
      self.extrapolated = Some(x_next.clone());
    } else {
      let t_next = 0.5 * (1.0 + (1.0 + 4.0 * self.momentum * self.momentum).sqrt());
      let beta = (self.momentum - 1.0) / t_next;
      self.extrapolated = Some(
        x_next
          .iter()
          .zip(x.iter())
          .map(|(a, b)| a + beta * (a - b))
          .collect(),
      );
      self.momentum = t_next;
    }
    self.last_cost = cost;

    let moved = x_next
      .iter()
      .zip(x.iter())
      .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()));

    let state = state.param(x_next).cost(cost);
    if moved <= self.tol.max(floor) {
      return Ok((state.terminate_with(TerminationReason::SolverConverged), None));
    }
    Ok((state, None))
  }
}
