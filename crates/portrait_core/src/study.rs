//! Loaded study data: vector fields per chart, their singularities and the separating curves.

use crate::charts::{ChartId, ChartSystem, SpherePoint};
use crate::config::StudyConfig;
use crate::polynomial::{Polynomial1, Polynomial2, Polynomial3};
use crate::regions::RegionResolver;
use crate::traits::{DynamicalSystem, Scalar};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SingularityKind {
    Saddle,
    Node,
    WeakFocus,
    StrongFocus,
    SemiElementary,
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stability {
    Stable,
    Unstable,
    Center,
    Undetermined,
}

/// Nominal type of a traced curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitType {
    Orbit,
    Stable,
    Unstable,
    CenterStable,
    CenterUnstable,
}

impl OrbitType {
    /// Type seen after the flow direction is reversed.
    pub fn inverted(self) -> Self {
        match self {
            OrbitType::Orbit => OrbitType::Orbit,
            OrbitType::Stable => OrbitType::Unstable,
            OrbitType::Unstable => OrbitType::Stable,
            OrbitType::CenterStable => OrbitType::CenterUnstable,
            OrbitType::CenterUnstable => OrbitType::CenterStable,
        }
    }

    /// Stable separatrices are traced backward in time.
    pub fn integration_dir(self) -> f64 {
        match self {
            OrbitType::Stable | OrbitType::CenterStable => -1.0,
            _ => 1.0,
        }
    }
}

/// Outcome of singularity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SingularityTag {
    #[default]
    Unclassified,
    Virtual,
    Standalone,
    Coinciding,
    CoincidingMain,
}

/// How a separatrix series is laid out in the local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesNotation {
    /// Local point `(t, f(t))`.
    Tf,
    /// Local point `(f(t), t)`.
    Ft,
}

/// Truncated series parametrization of a separatrix near its singularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparatrixSeries {
    pub kind: OrbitType,
    /// Radius of the ball left using the series.
    pub epsilon: f64,
    /// Sign of the series parameter (±1).
    pub direction: f64,
    pub notation: SeriesNotation,
    /// Local frame to chart coordinates, row major.
    pub trans: [[f64; 2]; 2],
    pub series: Polynomial1,
}

impl SeparatrixSeries {
    pub fn local_point(&self, t: f64) -> [f64; 2] {
        let f = self.series.evaluate_at(t);
        match self.notation {
            SeriesNotation::Tf => [t, f],
            SeriesNotation::Ft => [f, t],
        }
    }

    /// `position + trans * local(t)`.
    pub fn chart_point(&self, position: [f64; 2], t: f64) -> [f64; 2] {
        let [a, b] = self.local_point(t);
        [
            position[0] + self.trans[0][0] * a + self.trans[0][1] * b,
            position[1] + self.trans[1][0] * a + self.trans[1][1] * b,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Singularity {
    pub kind: SingularityKind,
    pub chart: ChartId,
    /// Coordinates in `chart`.
    pub position: [f64; 2],
    pub stability: Stability,
    pub separatrices: Vec<SeparatrixSeries>,
    pub tag: SingularityTag,
    /// Eigenvalues of the linearization, filled in by classification.
    pub eigenvalues: Vec<Complex<f64>>,
}

impl Singularity {
    pub fn new(kind: SingularityKind, chart: ChartId, position: [f64; 2], stability: Stability) -> Self {
        Self {
            kind,
            chart,
            position,
            stability,
            separatrices: Vec::new(),
            tag: SingularityTag::Unclassified,
            eigenvalues: Vec::new(),
        }
    }

    pub fn is_plotted(&self) -> bool {
        matches!(self.tag, SingularityTag::Standalone | SingularityTag::CoincidingMain)
    }
}

/// One scalar function given per chart.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChartPolynomials {
    pub r2: Polynomial2,
    pub u1: Polynomial2,
    pub u2: Polynomial2,
    pub v1: Polynomial2,
    pub v2: Polynomial2,
    pub cylinder: Polynomial3,
}

impl ChartPolynomials {
    /// Planar table of a chart; `None` for the cylinder.
    pub fn planar(&self, chart: ChartId) -> Option<&Polynomial2> {
        match chart {
            ChartId::R2 => Some(&self.r2),
            ChartId::U1 => Some(&self.u1),
            ChartId::U2 => Some(&self.u2),
            ChartId::V1 => Some(&self.v1),
            ChartId::V2 => Some(&self.v2),
            ChartId::Cylinder => None,
        }
    }

    pub fn planar_mut(&mut self, chart: ChartId) -> Option<&mut Polynomial2> {
        match chart {
            ChartId::R2 => Some(&mut self.r2),
            ChartId::U1 => Some(&mut self.u1),
            ChartId::U2 => Some(&mut self.u2),
            ChartId::V1 => Some(&mut self.v1),
            ChartId::V2 => Some(&mut self.v2),
            ChartId::Cylinder => None,
        }
    }

    /// Value at chart coordinates; cylinder coordinates are `(r, θ)`.
    pub fn evaluate<T: Scalar>(&self, chart: ChartId, coords: [T; 2]) -> T {
        match self.planar(chart) {
            Some(poly) => poly.evaluate(&coords),
            None => self.cylinder.evaluate_cylindrical(coords[0], coords[1]),
        }
    }

    /// Value at a sphere point, in the chart that owns it.
    pub fn evaluate_on_sphere(&self, charts: &ChartSystem, pcoord: &SpherePoint) -> Option<f64> {
        let chart = charts.select_chart(pcoord);
        let coords = charts.to_chart(chart, pcoord)?;
        Some(self.evaluate(chart, coords))
    }
}

/// One polynomial vector field of a (piecewise) study.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorFieldStudy {
    pub p: ChartPolynomials,
    pub q: ChartPolynomials,
    pub gcf: ChartPolynomials,
    /// `-1` when the reduced field at infinity runs against the original flow.
    pub dir_vec_field: i32,
    pub singularities: Vec<Singularity>,
}

impl VectorFieldStudy {
    pub fn new() -> Self {
        Self {
            dir_vec_field: 1,
            ..Self::default()
        }
    }

    pub fn reverses_at_infinity(&self) -> bool {
        self.dir_vec_field < 0
    }

    pub fn chart_field(&self, chart: ChartId) -> ChartField<'_> {
        ChartField { field: self, chart }
    }
}

/// The vector field of a study restricted to one chart.
#[derive(Debug, Clone, Copy)]
pub struct ChartField<'a> {
    field: &'a VectorFieldStudy,
    chart: ChartId,
}

impl ChartField<'_> {
    pub fn chart(&self) -> ChartId {
        self.chart
    }
}

impl<T: Scalar> DynamicalSystem<T> for ChartField<'_> {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let coords = [x[0], x[1]];
        out[0] = self.field.p.evaluate(self.chart, coords);
        out[1] = self.field.q.evaluate(self.chart, coords);
    }
}

/// A sampled point of a curve drawn on the sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub pcoord: SpherePoint,
    /// Joined to the previous point by a segment.
    pub dashes: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeparatingCurve {
    pub polys: ChartPolynomials,
    pub points: Vec<CurvePoint>,
}

/// Read-only view of a loaded study handed to every geometric operation.
#[derive(Debug, Clone, Copy)]
pub struct StudyContext<'a> {
    pub charts: ChartSystem,
    pub config: &'a StudyConfig,
    pub fields: &'a [VectorFieldStudy],
    pub curves: &'a [SeparatingCurve],
    pub regions: &'a RegionResolver,
}

impl StudyContext<'_> {
    /// Index of the vector field governing `pcoord`.
    pub fn field_at(&self, pcoord: &SpherePoint) -> Option<usize> {
        if self.fields.is_empty() {
            return None;
        }
        self.regions
            .resolve_vf(&self.charts, self.curves, pcoord)
            .filter(|&index| index < self.fields.len())
    }
}
