//! Levenberg-Marquardt refinement on top of the `levenberg-marquardt` crate
//! (MINPACK trust-region variant).

use crate::problem::NllsProblem;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// Stopping criteria of the LM refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmOptions {
    /// Evaluation budget, following the MINPACK convention of
    /// `max_iters * (n + 1)` residual evaluations for `n` parameters.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: f64,
    /// Orthogonality tolerance between residuals and Jacobian columns.
    pub gtol: f64,
    /// Relative tolerance on the parameter update.
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
        }
    }
}

/// Summary of one LM run. Costs are `½‖r‖²`.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub evaluations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
    /// Termination reason as reported by the optimizer.
    pub termination: String,
}

struct LmWrapper<'a, P: NllsProblem + ?Sized> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem + ?Sized> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.problem.residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(self.problem.jacobian(&self.params))
    }
}

/// Minimise `‖r(x)‖²` from `x0`; returns the final parameters and a report.
pub fn solve_lm<P: NllsProblem + ?Sized>(
    problem: &P,
    x0: DVector<f64>,
    opts: &LmOptions,
) -> (DVector<f64>, SolveReport) {
    let initial_cost = 0.5 * problem.residuals(&x0).norm_squared();
    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.max_iters.max(1));

    let wrapper = LmWrapper {
        problem,
        params: x0,
    };
    let (wrapper, report) = lm.minimize(wrapper);

    (
        wrapper.params,
        SolveReport {
            evaluations: report.number_of_evaluations,
            initial_cost,
            final_cost: report.objective_function,
            converged: report.termination.was_successful(),
            termination: format!("{:?}", report.termination),
        },
    )
}
