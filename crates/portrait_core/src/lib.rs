pub mod autodiff;
pub mod charts;
pub mod classifier;
pub mod config;
pub mod error;
pub mod integrator;
pub mod isocline;
pub mod polynomial;
pub mod regions;
/// The `portrait_core` crate draws phase portraits of planar polynomial vector
/// fields on the Poincaré and Poincaré-Lyapunov compactifications.
///
/// Key components:
/// - **Charts**: sphere coordinates, the finite and infinite charts, and the view layer.
/// - **Regions**: piecewise studies where separating curves split the plane between vector fields.
/// - **Integrator**: chart-crossing RKF7(8) tracing of orbits and separatrices.
/// - **Classifier**: virtual, coinciding and standalone singularities, with their linearization.
/// - **Session**: `ParentStudy`, the state of one open analysis.
pub mod session;
pub mod solvers;
pub mod study;
pub mod tables;
pub mod traits;
