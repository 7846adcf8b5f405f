//! Box-constrained Nelder-Mead minimiser in two dimensions
//!
//! Every candidate vertex (initial, reflected, expanded, contracted and shrunk)
//! is projected onto the bounding box before evaluation, so the simplex never
//! leaves the feasible region. The search is local: it converges to the
//! minimum of the basin containing the seed.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::core::BoundingBox;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Stopping rules for the simplex search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadConfig {
    /// Hard cap on simplex iterations
    pub max_iterations: usize,
    /// Stop once objective values across the simplex differ by less than this
    pub tolerance: f64,
    /// Stop once every vertex lies this close to the best one (in box-relative units)
    pub position_tolerance: f64,
    /// Initial simplex edge as a fraction of the box extent on each axis
    pub initial_step_fraction: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-10,
            position_tolerance: 1e-7,
            initial_step_fraction: 0.1,
        }
    }
}

/// Outcome of a minimisation run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub point: Vector2<f64>,
    pub value: f64,
    pub iterations: usize,
    /// False when the iteration cap was hit before the tolerances were met
    pub converged: bool,
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    point: Vector2<f64>,
    value: f64,
}

/// Nelder-Mead with projection onto a bounding box
#[derive(Debug, Clone, Default)]
pub struct BoundedNelderMead {
    config: NelderMeadConfig,
}

impl BoundedNelderMead {
    pub fn new(config: NelderMeadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NelderMeadConfig {
        &self.config
    }

    /// Minimise `objective` inside `bounds`, starting from `seed`.
    ///
    /// The seed is clamped into the box first. The initial simplex steps from
    /// the seed towards `+x` and `+y`, flipping to `-x`/`-y` when the positive
    /// step would cross the upper bound.
    pub fn minimize<F>(&self, objective: F, seed: Vector2<f64>, bounds: &BoundingBox) -> Minimum
    where
        F: Fn(&Vector2<f64>) -> f64,
    {
        let eval = |point: Vector2<f64>| {
            let point = bounds.clamp(point);
            let value = objective(&point);
            // NaN never wins a comparison; treat it as the worst possible value
            let value = if value.is_nan() { f64::INFINITY } else { value };
            Vertex { point, value }
        };

        let origin = bounds.clamp(seed);
        let step_x = self.config.initial_step_fraction * bounds.width().max(f64::EPSILON);
        let step_y = self.config.initial_step_fraction * bounds.height().max(f64::EPSILON);
        let dx = if origin.x + step_x <= bounds.max_x { step_x } else { -step_x };
        let dy = if origin.y + step_y <= bounds.max_y { step_y } else { -step_y };

        let mut simplex = [
            eval(origin),
            eval(origin + Vector2::new(dx, 0.0)),
            eval(origin + Vector2::new(0.0, dy)),
        ];

        let scale = bounds.width().max(bounds.height()).max(1.0);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            simplex.sort_by(|a, b| a.value.total_cmp(&b.value));
            if self.has_converged(&simplex, scale) {
                converged = true;
                break;
            }
            iterations += 1;

            let [best, second, worst] = simplex;
            let centroid = (best.point + second.point) / 2.0;

            let reflected = eval(centroid + REFLECTION * (centroid - worst.point));
            if reflected.value < best.value {
                let expanded = eval(centroid + EXPANSION * (reflected.point - centroid));
                simplex[2] = if expanded.value < reflected.value { expanded } else { reflected };
                continue;
            }
            if reflected.value < second.value {
                simplex[2] = reflected;
                continue;
            }

            let contracted = if reflected.value < worst.value {
                let outside = eval(centroid + CONTRACTION * (reflected.point - centroid));
                (outside.value <= reflected.value).then_some(outside)
            } else {
                let inside = eval(centroid + CONTRACTION * (worst.point - centroid));
                (inside.value < worst.value).then_some(inside)
            };

            match contracted {
                Some(vertex) => simplex[2] = vertex,
                None => {
                    for vertex in simplex.iter_mut().skip(1) {
                        *vertex = eval(best.point + SHRINK * (vertex.point - best.point));
                    }
                }
            }
        }

        simplex.sort_by(|a, b| a.value.total_cmp(&b.value));
        if !converged {
            converged = self.has_converged(&simplex, scale);
        }

        Minimum {
            point: simplex[0].point,
            value: simplex[0].value,
            iterations,
            converged,
        }
    }

    fn has_converged(&self, sorted: &[Vertex; 3], scale: f64) -> bool {
        let spread = (sorted[2].value - sorted[0].value).abs();
        let size = sorted[1..]
            .iter()
            .map(|v| (v.point - sorted[0].point).norm())
            .fold(0.0, f64::max);
        spread <= self.config.tolerance && size <= self.config.position_tolerance * scale
    }
}
