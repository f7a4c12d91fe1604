use num_traits::{One, Zero};
use std::fmt::Debug;
use std::ops::{Add, Mul, Neg, Sub};

/// A trait for types that polynomial fields can be evaluated over.
/// Covers the ring operations plus the integer powers and trigonometric
/// substitutions of the cylindrical charts.
pub trait Scalar:
    Copy
    + Debug
    + PartialOrd
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// Lifts a table coefficient into the scalar type.
    fn from_f64(value: f64) -> Self;
    fn powi(self, n: i32) -> Self;
    fn cos(self) -> Self;
    fn sin(self) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }
}

/// Represents a planar vector field expressed in the local coordinates of one chart.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// x: current state (chart coordinates)
    /// t: current time
    /// out: buffer to write dx/dt
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// Outcome of a single accepted adaptive step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Signed step that was actually taken.
    pub h_used: f64,
    /// Signed step proposed for the next call.
    pub h_next: f64,
    /// Local error estimate of the accepted step.
    pub error: f64,
}

/// A trait for solvers that take one error-controlled step of a system.
pub trait AdaptiveSteppable {
    /// Performs one accepted step starting with the signed step `h`.
    /// The step is shrunk until the error estimate is within `tolerance`
    /// or `|h|` reaches `h_min`, in which case the step is taken anyway.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    fn step_adaptive(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: &mut f64,
        state: &mut [f64],
        h: f64,
        h_min: f64,
        h_max: f64,
        tolerance: f64,
    ) -> StepReport;
}
