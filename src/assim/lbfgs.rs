//! Limited-memory BFGS with backtracking line search.
//!
//! Quasi-Newton engine for the state-space 4D-Var variants. The objective
//! is a black-box closure returning (cost, gradient) for a flat parameter
//! vector; curvature pairs are held in a bounded history and the search
//! direction comes from the standard two-loop recursion.
//!
//! Budget exhaustion is not an error: the best iterate found so far is
//! returned with `converged = false`. A NaN or infinite cost aborts the
//! minimization with `AssimError::Diverged`.

use std::collections::VecDeque;

use log::debug;

use crate::error::AssimError;

/// Configuration of the L-BFGS engine.
#[derive(Clone, Copy, Debug)]
pub struct LbfgsConfig {
    /// Maximum number of outer iterations
    pub max_iters: usize,
    /// Initial trial step length of each line search (the learning rate)
    pub step_size: f64,
    /// Number of curvature pairs retained for the two-loop recursion
    pub memory: usize,
    /// Convergence threshold on the gradient infinity norm
    pub grad_tol: f64,
    /// Maximum number of backtracking halvings per line search
    pub max_backtracks: usize,
    /// Armijo sufficient-decrease constant
    pub armijo_c: f64,
}

impl LbfgsConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), AssimError> {
        if self.max_iters == 0 {
            return Err(AssimError::invalid_config(
                "iteration budget must be at least 1",
            ));
        }
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(AssimError::invalid_config(format!(
                "step size must be positive, got {}",
                self.step_size
            )));
        }
        if self.memory == 0 {
            return Err(AssimError::invalid_config("history size must be at least 1"));
        }
        if !(self.armijo_c > 0.0 && self.armijo_c < 1.0) {
            return Err(AssimError::invalid_config(format!(
                "Armijo constant must lie in (0, 1), got {}",
                self.armijo_c
            )));
        }
        Ok(())
    }
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            max_iters: 250,
            step_size: 0.75,
            memory: 10,
            grad_tol: 1e-8,
            max_backtracks: 20,
            armijo_c: 1e-4,
        }
    }
}

/// Result of a minimization run.
#[derive(Clone, Debug)]
pub struct LbfgsOutcome {
    /// Best parameter vector found
    pub x: Vec<f64>,
    /// Cost at `x`
    pub cost: f64,
    /// Number of outer iterations performed
    pub iterations: usize,
    /// Whether the gradient tolerance was met within the budget
    pub converged: bool,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm_inf(a: &[f64]) -> f64 {
    a.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// Search direction from the two-loop recursion over the curvature history.
fn two_loop_direction(grad: &[f64], history: &VecDeque<(Vec<f64>, Vec<f64>, f64)>) -> Vec<f64> {
    let mut q: Vec<f64> = grad.iter().map(|g| -g).collect();
    if history.is_empty() {
        return q;
    }

    let mut alphas = Vec::with_capacity(history.len());
    for (s, y, rho) in history.iter().rev() {
        let alpha = rho * dot(s, &q);
        for (qi, yi) in q.iter_mut().zip(y.iter()) {
            *qi -= alpha * yi;
        }
        alphas.push(alpha);
    }

    // Initial Hessian scaling from the most recent pair
    if let Some((s, y, _)) = history.back() {
        let yy = dot(y, y);
        if yy > 0.0 {
            let gamma = dot(s, y) / yy;
            for qi in q.iter_mut() {
                *qi *= gamma;
            }
        }
    }

    for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = rho * dot(y, &q);
        for (qi, si) in q.iter_mut().zip(s.iter()) {
            *qi += (alpha - beta) * si;
        }
    }

    q
}

/// Minimize `objective` starting from `x0`.
///
/// `objective` returns the cost and its gradient for a parameter vector.
/// Each line-search trial re-evaluates the objective, which for 4D-Var
/// re-simulates the full trajectory (strong constraint).
pub fn minimize<F>(
    config: &LbfgsConfig,
    mut objective: F,
    x0: Vec<f64>,
) -> Result<LbfgsOutcome, AssimError>
where
    F: FnMut(&[f64]) -> Result<(f64, Vec<f64>), AssimError>,
{
    config.validate()?;

    let mut x = x0;
    let (mut fx, mut grad) = objective(&x)?;
    if !fx.is_finite() {
        return Err(AssimError::Diverged {
            iteration: 0,
            cost: fx,
        });
    }

    let mut history: VecDeque<(Vec<f64>, Vec<f64>, f64)> = VecDeque::with_capacity(config.memory);
    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..config.max_iters {
        iterations = iter + 1;

        if norm_inf(&grad) <= config.grad_tol {
            converged = true;
            iterations = iter;
            break;
        }

        let mut direction = two_loop_direction(&grad, &history);
        let mut slope = dot(&direction, &grad);
        if slope >= 0.0 {
            // Curvature history produced an ascent direction; fall back to
            // steepest descent and drop the stale pairs.
            history.clear();
            direction = grad.iter().map(|g| -g).collect();
            slope = -dot(&grad, &grad);
        }

        // Backtracking Armijo line search
        let mut step = config.step_size;
        let mut accepted = None;
        for _ in 0..config.max_backtracks {
            let x_trial: Vec<f64> = x
                .iter()
                .zip(direction.iter())
                .map(|(xi, di)| xi + step * di)
                .collect();
            let (f_trial, g_trial) = objective(&x_trial)?;
            if !f_trial.is_finite() {
                return Err(AssimError::Diverged {
                    iteration: iter,
                    cost: f_trial,
                });
            }
            if f_trial <= fx + config.armijo_c * step * slope {
                accepted = Some((x_trial, f_trial, g_trial));
                break;
            }
            step *= 0.5;
        }

        let Some((x_new, f_new, g_new)) = accepted else {
            debug!("lbfgs: line search failed at iteration {iter}, returning best iterate");
            break;
        };

        // Curvature update; skip pairs with non-positive s·y
        let s: Vec<f64> = x_new.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(grad.iter()).map(|(a, b)| a - b).collect();
        let ys = dot(&y, &s);
        if ys > 1e-12 {
            if history.len() == config.memory {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / ys));
        }

        x = x_new;
        fx = f_new;
        grad = g_new;

        if iter % 25 == 0 {
            debug!("lbfgs: iter {iter}, cost {fx:.6e}, |grad|_inf {:.3e}", norm_inf(&grad));
        }
    }

    Ok(LbfgsOutcome {
        x,
        cost: fx,
        iterations,
        converged,
    })
}
