/// First order IIR smoother: `y[n] = alpha * y[n-1] + (1 - alpha) * u[n]`.
///
/// The first sample seeds the output, so a fresh filter passes its first
/// input through untouched instead of blending against zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowPassFilter {
    alpha: f64,
    output: Option<f64>,
}

impl LowPassFilter {
    /// `alpha` is expected to be in `[0, 1]`, see [`crate::EstimatorConfig`]
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            output: None,
        }
    }

    pub fn run(&mut self, input: f64) -> f64 {
        let output = match self.output {
            Some(previous) => self.alpha * previous + (1.0 - self.alpha) * input,
            None => input,
        };
        self.output = Some(output);
        output
    }

    /// last output, `None` until the first sample
    pub fn output(&self) -> Option<f64> {
        self.output
    }

    pub fn is_seeded(&self) -> bool {
        self.output.is_some()
    }
}
