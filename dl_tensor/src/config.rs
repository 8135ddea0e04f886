//! Options for gradient computation and gradient checking.

/// Controls a backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackwardOptions {
    /// Record the backward computation itself as graph nodes so the returned
    /// gradients can be differentiated again.
    pub retain_graph: bool,
}

impl BackwardOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retain_graph(mut self, retain: bool) -> Self {
        self.retain_graph = retain;
        self
    }
}

/// Finite-difference settings for [`crate::gradcheck::check_gradients`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckConfig {
    /// Step for the central difference.
    pub eps: f64,
    /// Largest accepted absolute difference between analytic and numeric gradients.
    pub tolerance: f64,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        GradCheckConfig {
            eps: 1e-3,
            tolerance: 1e-2,
        }
    }
}

impl GradCheckConfig {
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}
