//! Spatial grid and physical parameters for the shallow-water model.

use crate::error::AssimError;

/// Uniform 2D grid on which all fields are discretized.
///
/// Fields are stored as `[ny, nx]` tensors; `dx` and `dy` are the fixed
/// spatial steps used by the finite-difference operators.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    /// Number of grid points in x
    pub nx: usize,
    /// Number of grid points in y
    pub ny: usize,
    /// Spatial step in x
    pub dx: f64,
    /// Spatial step in y
    pub dy: f64,
}

impl Grid {
    /// Minimum grid extent per direction required by the centered stencils.
    pub const MIN_POINTS: usize = 3;

    /// Create a new grid, validating dimensions and spacings.
    ///
    /// # Errors
    /// Returns `AssimError::InvalidConfig` if either dimension is below
    /// the stencil minimum or a spacing is not positive and finite.
    pub fn new(nx: usize, ny: usize, dx: f64, dy: f64) -> Result<Self, AssimError> {
        if nx < Self::MIN_POINTS || ny < Self::MIN_POINTS {
            return Err(AssimError::invalid_config(format!(
                "grid must be at least {0}x{0}, got {1}x{2}",
                Self::MIN_POINTS,
                nx,
                ny
            )));
        }
        if !(dx.is_finite() && dx > 0.0) || !(dy.is_finite() && dy > 0.0) {
            return Err(AssimError::invalid_config(format!(
                "grid spacings must be positive and finite, got dx={dx}, dy={dy}"
            )));
        }
        Ok(Self { nx, ny, dx, dy })
    }

    /// Total number of points per scalar field.
    pub fn n_points(&self) -> usize {
        self.nx * self.ny
    }

    /// Shape of a single scalar field tensor: `[ny, nx]`.
    pub fn field_shape(&self) -> [usize; 2] {
        [self.ny, self.nx]
    }

    /// Shape of a packed 3-channel state tensor: `[3, ny, nx]`.
    pub fn state_shape(&self) -> [usize; 3] {
        [3, self.ny, self.nx]
    }
}

/// Physical parameters of the rotating shallow-water system.
#[derive(Clone, Copy, Debug)]
pub struct SwePhysics {
    /// Gravitational acceleration (m/s²)
    pub g: f64,
    /// Mean fluid depth around which the system is linearized (m)
    pub depth: f64,
    /// Coriolis parameter f (s⁻¹), f-plane approximation
    pub coriolis_f: f64,
    /// Linear bottom drag coefficient (s⁻¹)
    pub drag: f64,
}

impl SwePhysics {
    /// Validate physical parameters.
    ///
    /// Gravity and mean depth must be positive; drag must be non-negative.
    /// The Coriolis parameter may take either sign (hemisphere).
    pub fn validate(&self) -> Result<(), AssimError> {
        if !(self.g.is_finite() && self.g > 0.0) {
            return Err(AssimError::invalid_config(format!(
                "gravity must be positive, got {}",
                self.g
            )));
        }
        if !(self.depth.is_finite() && self.depth > 0.0) {
            return Err(AssimError::invalid_config(format!(
                "mean depth must be positive, got {}",
                self.depth
            )));
        }
        if !(self.drag.is_finite() && self.drag >= 0.0) {
            return Err(AssimError::invalid_config(format!(
                "drag must be non-negative, got {}",
                self.drag
            )));
        }
        if !self.coriolis_f.is_finite() {
            return Err(AssimError::invalid_config(
                "Coriolis parameter must be finite",
            ));
        }
        Ok(())
    }
}

impl Default for SwePhysics {
    fn default() -> Self {
        Self {
            g: 9.81,
            depth: 1.0,
            coriolis_f: 1.0e-4,
            drag: 1.0e-3,
        }
    }
}
