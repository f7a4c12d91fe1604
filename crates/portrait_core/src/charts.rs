//! Compactification of the plane and the charts covering it.
//!
//! Two spheres are supported, chosen once per study from the weights `(p, q)`:
//!
//! - **Poincaré sphere** (`p = q = 1`). A sphere point is `[X, Y, Z]` with unit norm and
//!   `Z >= 0`. The finite plane is the chart `R2`; near infinity the charts
//!   `U1 = (Y/X, Z/X)` (`X > 0`), `V1 = (-Y/X, -Z/X)` (`X < 0`),
//!   `U2 = (X/Y, Z/Y)` (`Y > 0`) and `V2 = (-X/Y, -Z/Y)` (`Y < 0`) are used.
//! - **Poincaré-Lyapunov sphere** (other weights). A sphere point is `[flag, a, b]`:
//!   `flag = 0` stores a finite point `(x, y)` of the closed unit disc, `flag = 1` stores
//!   cylindrical coordinates `(r, θ)` with `x = cos θ / r^p`, `y = sin θ / r^q`, `0 <= r < 1`.
//!
//! `select_chart` is the only place that decides which chart owns a sphere point.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_4, PI};

/// Sphere coordinates (see module docs for the layout of each sphere).
pub type SpherePoint = [f64; 3];

/// Finite region of the Poincaré sphere: `Z > 1/sqrt(2)`, i.e. the open unit disc.
const FINITE_Z_THRESHOLD: f64 = FRAC_1_SQRT_2;
const CHART_DENOM_EPS: f64 = 1e-14;
const RADIUS_BISECT_ITERS: usize = 200;
const RADIUS_BRACKET_ITERS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartId {
    R2,
    U1,
    U2,
    V1,
    V2,
    Cylinder,
}

impl ChartId {
    pub const ALL: [ChartId; 6] = [
        ChartId::R2,
        ChartId::U1,
        ChartId::U2,
        ChartId::V1,
        ChartId::V2,
        ChartId::Cylinder,
    ];

    /// Table keyword of the chart.
    pub fn name(self) -> &'static str {
        match self {
            ChartId::R2 => "r2",
            ChartId::U1 => "u1",
            ChartId::U2 => "u2",
            ChartId::V1 => "v1",
            ChartId::V2 => "v2",
            ChartId::Cylinder => "cylinder",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ChartId::ALL.into_iter().find(|chart| chart.name() == name)
    }

    /// The four charts of the Poincaré sphere that touch the line at infinity.
    pub fn is_poincare_infinity(self) -> bool {
        matches!(self, ChartId::U1 | ChartId::U2 | ChartId::V1 | ChartId::V2)
    }

    /// Chart entered when a point of this chart crosses the line at infinity.
    pub fn mirror(self) -> Option<ChartId> {
        match self {
            ChartId::U1 => Some(ChartId::V1),
            ChartId::V1 => Some(ChartId::U1),
            ChartId::U2 => Some(ChartId::V2),
            ChartId::V2 => Some(ChartId::U2),
            ChartId::R2 | ChartId::Cylinder => None,
        }
    }
}

/// A chart point mapped back onto the sphere after an integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landing {
    pub pcoord: SpherePoint,
    /// The point lay in the wrong half of its chart and was reflected
    /// through the line at infinity.
    pub crossed_infinity: bool,
    /// Chart whose coordinates describe the reflected point.
    pub chart: ChartId,
}

/// Compactification strategy of a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartSystem {
    Poincare,
    Lyapunov { p: u32, q: u32 },
}

impl ChartSystem {
    pub fn new(p: u32, q: u32) -> Result<Self> {
        if p == 0 || q == 0 {
            bail!("Poincaré-Lyapunov weights must be positive (got p={}, q={}).", p, q);
        }
        if p == 1 && q == 1 {
            Ok(ChartSystem::Poincare)
        } else {
            Ok(ChartSystem::Lyapunov { p, q })
        }
    }

    pub fn weights(&self) -> (u32, u32) {
        match *self {
            ChartSystem::Poincare => (1, 1),
            ChartSystem::Lyapunov { p, q } => (p, q),
        }
    }

    pub fn is_poincare(&self) -> bool {
        matches!(self, ChartSystem::Poincare)
    }

    /// Charts this sphere is covered by.
    pub fn charts(&self) -> &'static [ChartId] {
        match self {
            ChartSystem::Poincare => &[
                ChartId::R2,
                ChartId::U1,
                ChartId::U2,
                ChartId::V1,
                ChartId::V2,
            ],
            ChartSystem::Lyapunov { .. } => &[ChartId::R2, ChartId::Cylinder],
        }
    }

    pub fn r2_to_sphere(&self, x: f64, y: f64) -> SpherePoint {
        match *self {
            ChartSystem::Poincare => poincare::r2_to_sphere(x, y),
            ChartSystem::Lyapunov { p, q } => lyapunov::r2_to_sphere(p, q, x, y),
        }
    }

    /// Finite coordinates of a sphere point; `None` on the line at infinity.
    pub fn sphere_to_r2(&self, pcoord: &SpherePoint) -> Option<[f64; 2]> {
        match *self {
            ChartSystem::Poincare => poincare::sphere_to_r2(pcoord),
            ChartSystem::Lyapunov { p, q } => lyapunov::sphere_to_r2(p, q, pcoord),
        }
    }

    /// Cylindrical coordinates `(r, θ)`; only meaningful on the Poincaré-Lyapunov sphere.
    pub fn sphere_to_cyl(&self, pcoord: &SpherePoint) -> Option<[f64; 2]> {
        match *self {
            ChartSystem::Poincare => None,
            ChartSystem::Lyapunov { p, q } => lyapunov::sphere_to_cyl(p, q, pcoord),
        }
    }

    pub fn cyl_to_sphere(&self, r: f64, theta: f64) -> Option<SpherePoint> {
        match *self {
            ChartSystem::Poincare => None,
            ChartSystem::Lyapunov { p, q } => Some(lyapunov::cyl_to_sphere(p, q, r, theta)),
        }
    }

    /// The chart that owns `pcoord`.
    pub fn select_chart(&self, pcoord: &SpherePoint) -> ChartId {
        match self {
            ChartSystem::Poincare => {
                let [x, y, z] = *pcoord;
                if z > FINITE_Z_THRESHOLD {
                    return ChartId::R2;
                }
                let theta = y.abs().atan2(x.abs());
                if theta < FRAC_PI_4 {
                    if x > 0.0 {
                        ChartId::U1
                    } else {
                        ChartId::V1
                    }
                } else if y > 0.0 {
                    ChartId::U2
                } else {
                    ChartId::V2
                }
            }
            ChartSystem::Lyapunov { .. } => {
                if pcoord[0] == 0.0 {
                    ChartId::R2
                } else {
                    ChartId::Cylinder
                }
            }
        }
    }

    /// Local coordinates of `pcoord` in `chart`.
    pub fn to_chart(&self, chart: ChartId, pcoord: &SpherePoint) -> Option<[f64; 2]> {
        match (self, chart) {
            (_, ChartId::R2) => self.sphere_to_r2(pcoord),
            (ChartSystem::Poincare, ChartId::U1) => poincare::sphere_to_u1(pcoord),
            (ChartSystem::Poincare, ChartId::V1) => poincare::sphere_to_v1(pcoord),
            (ChartSystem::Poincare, ChartId::U2) => poincare::sphere_to_u2(pcoord),
            (ChartSystem::Poincare, ChartId::V2) => poincare::sphere_to_v2(pcoord),
            (ChartSystem::Lyapunov { .. }, ChartId::Cylinder) => self.sphere_to_cyl(pcoord),
            _ => None,
        }
    }

    /// Sphere point of valid-half chart coordinates.
    pub fn from_chart(&self, chart: ChartId, coords: [f64; 2]) -> Option<SpherePoint> {
        let [a, b] = coords;
        match (self, chart) {
            (_, ChartId::R2) => Some(self.r2_to_sphere(a, b)),
            (ChartSystem::Poincare, ChartId::U1) => Some(poincare::u1_to_sphere(a, b)),
            (ChartSystem::Poincare, ChartId::V1) => Some(poincare::v1_to_sphere(a, b)),
            (ChartSystem::Poincare, ChartId::U2) => Some(poincare::u2_to_sphere(a, b)),
            (ChartSystem::Poincare, ChartId::V2) => Some(poincare::v2_to_sphere(a, b)),
            (ChartSystem::Lyapunov { .. }, ChartId::Cylinder) => self.cyl_to_sphere(a, b),
            _ => None,
        }
    }

    /// Maps integrated chart coordinates back onto the sphere, reflecting
    /// wrong-half points through the line at infinity.
    pub fn land(&self, chart: ChartId, coords: [f64; 2]) -> Option<Landing> {
        let [a, b] = coords;
        let reflected = match (self, chart) {
            (ChartSystem::Poincare, ChartId::U1) if b < 0.0 => Some(poincare::uu1_to_sphere(a, b)),
            (ChartSystem::Poincare, ChartId::V1) if b < 0.0 => Some(poincare::vv1_to_sphere(a, b)),
            (ChartSystem::Poincare, ChartId::U2) if b < 0.0 => Some(poincare::uu2_to_sphere(a, b)),
            (ChartSystem::Poincare, ChartId::V2) if b < 0.0 => Some(poincare::vv2_to_sphere(a, b)),
            (ChartSystem::Lyapunov { .. }, ChartId::Cylinder) if a < 0.0 => {
                self.cyl_to_sphere(-a, b + PI)
            }
            _ => None,
        };
        match reflected {
            Some(pcoord) => Some(Landing {
                pcoord,
                crossed_infinity: true,
                chart: chart.mirror().unwrap_or(chart),
            }),
            None => self.from_chart(chart, coords).map(|pcoord| Landing {
                pcoord,
                crossed_infinity: false,
                chart,
            }),
        }
    }

    /// Distance used to decide whether two sphere points coincide.
    /// Finite and cylindrical points of the Poincaré-Lyapunov sphere are never
    /// compared; their distance is 1.
    pub fn sphere_distance(&self, a: &SpherePoint, b: &SpherePoint) -> f64 {
        match self {
            ChartSystem::Poincare => {
                let dx = a[0] - b[0];
                let dy = a[1] - b[1];
                let dz = a[2] - b[2];
                (dx * dx + dy * dy + dz * dz).sqrt()
            }
            ChartSystem::Lyapunov { .. } => {
                if a[0] != b[0] {
                    return 1.0;
                }
                if a[0] == 0.0 {
                    (a[1] - b[1]).hypot(a[2] - b[2])
                } else {
                    (a[1] - b[1]).hypot(wrap_angle(a[2] - b[2]))
                }
            }
        }
    }
}

/// Wraps an angle into `(-π, π]`.
pub fn wrap_angle(theta: f64) -> f64 {
    let a = theta.rem_euclid(2.0 * PI);
    if a > PI {
        a - 2.0 * PI
    } else {
        a
    }
}

/// Maps of the Poincaré sphere. Inputs of the `*_to_sphere` functions are
/// valid-half chart coordinates unless the name says otherwise.
pub mod poincare {
    use super::{SpherePoint, CHART_DENOM_EPS};

    pub fn r2_to_sphere(x: f64, y: f64) -> SpherePoint {
        let n = (1.0 + x * x + y * y).sqrt();
        [x / n, y / n, 1.0 / n]
    }

    pub fn sphere_to_r2(pcoord: &SpherePoint) -> Option<[f64; 2]> {
        let [x, y, z] = *pcoord;
        if z.abs() < CHART_DENOM_EPS {
            return None;
        }
        Some([x / z, y / z])
    }

    pub fn u1_to_sphere(z1: f64, z2: f64) -> SpherePoint {
        let n = (1.0 + z1 * z1 + z2 * z2).sqrt();
        [1.0 / n, z1 / n, z2 / n]
    }

    pub fn v1_to_sphere(z1: f64, z2: f64) -> SpherePoint {
        let n = (1.0 + z1 * z1 + z2 * z2).sqrt();
        [-1.0 / n, z1 / n, z2 / n]
    }

    pub fn u2_to_sphere(z1: f64, z2: f64) -> SpherePoint {
        let n = (1.0 + z1 * z1 + z2 * z2).sqrt();
        [z1 / n, 1.0 / n, z2 / n]
    }

    pub fn v2_to_sphere(z1: f64, z2: f64) -> SpherePoint {
        let n = (1.0 + z1 * z1 + z2 * z2).sqrt();
        [z1 / n, -1.0 / n, z2 / n]
    }

    pub fn sphere_to_u1(pcoord: &SpherePoint) -> Option<[f64; 2]> {
        let [x, y, z] = *pcoord;
        (x.abs() >= CHART_DENOM_EPS).then(|| [y / x, z / x])
    }

    pub fn sphere_to_v1(pcoord: &SpherePoint) -> Option<[f64; 2]> {
        let [x, y, z] = *pcoord;
        (x.abs() >= CHART_DENOM_EPS).then(|| [-y / x, -z / x])
    }

    pub fn sphere_to_u2(pcoord: &SpherePoint) -> Option<[f64; 2]> {
        let [x, y, z] = *pcoord;
        (y.abs() >= CHART_DENOM_EPS).then(|| [x / y, z / y])
    }

    pub fn sphere_to_v2(pcoord: &SpherePoint) -> Option<[f64; 2]> {
        let [x, y, z] = *pcoord;
        (y.abs() >= CHART_DENOM_EPS).then(|| [-x / y, -z / y])
    }

    /// U1 coordinates with `z2 < 0`: the V1 point `(-z1, -z2)`.
    pub fn uu1_to_sphere(z1: f64, z2: f64) -> SpherePoint {
        v1_to_sphere(-z1, -z2)
    }

    /// V1 coordinates with `z2 < 0`: the U1 point `(-z1, -z2)`.
    pub fn vv1_to_sphere(z1: f64, z2: f64) -> SpherePoint {
        u1_to_sphere(-z1, -z2)
    }

    /// U2 coordinates with `z2 < 0`: the V2 point `(-z1, -z2)`.
    pub fn uu2_to_sphere(z1: f64, z2: f64) -> SpherePoint {
        v2_to_sphere(-z1, -z2)
    }

    /// V2 coordinates with `z2 < 0`: the U2 point `(-z1, -z2)`.
    pub fn vv2_to_sphere(z1: f64, z2: f64) -> SpherePoint {
        u2_to_sphere(-z1, -z2)
    }
}

/// Maps of the Poincaré-Lyapunov sphere with weights `(p, q)`.
pub mod lyapunov {
    use super::{wrap_angle, SpherePoint, RADIUS_BISECT_ITERS, RADIUS_BRACKET_ITERS};

    pub fn r2_to_sphere(p: u32, q: u32, x: f64, y: f64) -> SpherePoint {
        if x * x + y * y <= 1.0 {
            return [0.0, x, y];
        }
        let [r, theta] = plane_to_cyl(p, q, x, y);
        [1.0, r, theta]
    }

    pub fn sphere_to_r2(p: u32, q: u32, pcoord: &SpherePoint) -> Option<[f64; 2]> {
        if pcoord[0] == 0.0 {
            Some([pcoord[1], pcoord[2]])
        } else {
            cyl_to_plane(p, q, pcoord[1], pcoord[2])
        }
    }

    pub fn sphere_to_cyl(p: u32, q: u32, pcoord: &SpherePoint) -> Option<[f64; 2]> {
        if pcoord[0] != 0.0 {
            return Some([pcoord[1], pcoord[2]]);
        }
        let (x, y) = (pcoord[1], pcoord[2]);
        if x == 0.0 && y == 0.0 {
            return None;
        }
        Some(plane_to_cyl(p, q, x, y))
    }

    /// Cylindrical point `(r, θ)`; radii `>= 1` are stored as finite points.
    pub fn cyl_to_sphere(p: u32, q: u32, r: f64, theta: f64) -> SpherePoint {
        if r >= 1.0 {
            if let Some([x, y]) = cyl_to_plane(p, q, r, theta) {
                return [0.0, x, y];
            }
        }
        [1.0, r.max(0.0), wrap_angle(theta)]
    }

    pub fn cyl_to_plane(p: u32, q: u32, r: f64, theta: f64) -> Option<[f64; 2]> {
        if r <= 0.0 {
            return None;
        }
        Some([
            theta.cos() / r.powi(p as i32),
            theta.sin() / r.powi(q as i32),
        ])
    }

    /// Solves `x² r^{2p} + y² r^{2q} = 1` for `r > 0` by bisection; the left side
    /// is increasing in `r`. Requires `(x, y) != (0, 0)`.
    pub fn plane_to_cyl(p: u32, q: u32, x: f64, y: f64) -> [f64; 2] {
        let residual = |r: f64| {
            x * x * r.powi(2 * p as i32) + y * y * r.powi(2 * q as i32) - 1.0
        };
        let mut lo = 0.0;
        let mut hi = 1.0;
        let mut bracket = 0;
        while residual(hi) < 0.0 && bracket < RADIUS_BRACKET_ITERS {
            lo = hi;
            hi *= 2.0;
            bracket += 1;
        }
        for _ in 0..RADIUS_BISECT_ITERS {
            let mid = 0.5 * (lo + hi);
            if residual(mid) < 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo <= f64::EPSILON * hi {
                break;
            }
        }
        let r = 0.5 * (lo + hi);
        let theta = (y * r.powi(q as i32)).atan2(x * r.powi(p as i32));
        [r, theta]
    }
}

/// Display modes of the plotting collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    Plane,
    #[default]
    Sphere,
    U1,
    U2,
    V1,
    V2,
}

/// Axis-aligned window in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewWindow {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl ViewWindow {
    pub fn square(half_width: f64) -> Self {
        Self {
            x_min: -half_width,
            x_max: half_width,
            y_min: -half_width,
            y_max: half_width,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.x_min.is_finite()
            && self.x_max.is_finite()
            && self.y_min.is_finite()
            && self.y_max.is_finite()
            && self.x_max > self.x_min
            && self.y_max > self.y_min
    }

    /// View coordinates to the unit square `[0, 1]²`.
    pub fn normalize(&self, v: [f64; 2]) -> [f64; 2] {
        [
            (v[0] - self.x_min) / (self.x_max - self.x_min),
            (v[1] - self.y_min) / (self.y_max - self.y_min),
        ]
    }

    pub fn denormalize(&self, u: [f64; 2]) -> [f64; 2] {
        [
            self.x_min + u[0] * (self.x_max - self.x_min),
            self.y_min + u[1] * (self.y_max - self.y_min),
        ]
    }
}

/// Conversion between sphere coordinates and the coordinates of one display mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMap {
    charts: ChartSystem,
    mode: ViewMode,
}

impl ViewMap {
    pub fn new(charts: ChartSystem, mode: ViewMode) -> Result<Self> {
        let chart_view = !matches!(mode, ViewMode::Plane | ViewMode::Sphere);
        if chart_view && !charts.is_poincare() {
            bail!(
                "View mode {:?} is only available on the Poincaré sphere.",
                mode
            );
        }
        Ok(Self { charts, mode })
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Window showing the whole sphere (or the given plane window in plane mode).
    pub fn default_window(&self, plane_window: ViewWindow) -> ViewWindow {
        match (self.mode, self.charts) {
            (ViewMode::Plane, _) => plane_window,
            (ViewMode::Sphere, ChartSystem::Poincare) => ViewWindow::square(1.1),
            (ViewMode::Sphere, ChartSystem::Lyapunov { .. }) => ViewWindow::square(2.2),
            _ => ViewWindow::square(2.0),
        }
    }

    pub fn sphere_to_view(&self, pcoord: &SpherePoint) -> Option<[f64; 2]> {
        let [a, b, c] = *pcoord;
        match (self.mode, self.charts) {
            (ViewMode::Plane, charts) => charts.sphere_to_r2(pcoord),
            (ViewMode::Sphere, ChartSystem::Poincare) => Some([a / (1.0 + c), b / (1.0 + c)]),
            (ViewMode::Sphere, ChartSystem::Lyapunov { .. }) => {
                if a == 0.0 {
                    Some([b, c])
                } else {
                    let rho = 2.0 - b;
                    Some([rho * c.cos(), rho * c.sin()])
                }
            }
            (ViewMode::U1, ChartSystem::Poincare) => {
                (a.abs() >= CHART_DENOM_EPS).then(|| [b / a, c / a])
            }
            (ViewMode::V1, ChartSystem::Poincare) => {
                (a.abs() >= CHART_DENOM_EPS).then(|| [-b / a, -c / a])
            }
            (ViewMode::U2, ChartSystem::Poincare) => {
                (b.abs() >= CHART_DENOM_EPS).then(|| [a / b, c / b])
            }
            (ViewMode::V2, ChartSystem::Poincare) => {
                (b.abs() >= CHART_DENOM_EPS).then(|| [-a / b, -c / b])
            }
            _ => None,
        }
    }

    pub fn view_to_sphere(&self, v: [f64; 2]) -> Option<SpherePoint> {
        let [u, w] = v;
        match (self.mode, self.charts) {
            (ViewMode::Plane, charts) => Some(charts.r2_to_sphere(u, w)),
            (ViewMode::Sphere, ChartSystem::Poincare) => {
                let s = u * u + w * w;
                (s <= 1.0).then(|| [2.0 * u / (1.0 + s), 2.0 * w / (1.0 + s), (1.0 - s) / (1.0 + s)])
            }
            (ViewMode::Sphere, ChartSystem::Lyapunov { p, q }) => {
                let rho = u.hypot(w);
                if rho <= 1.0 {
                    Some([0.0, u, w])
                } else if rho <= 2.0 {
                    Some(lyapunov::cyl_to_sphere(p, q, 2.0 - rho, w.atan2(u)))
                } else {
                    None
                }
            }
            (ViewMode::U1, ChartSystem::Poincare) => Some(if w >= 0.0 {
                poincare::u1_to_sphere(u, w)
            } else {
                poincare::uu1_to_sphere(u, w)
            }),
            (ViewMode::V1, ChartSystem::Poincare) => Some(if w >= 0.0 {
                poincare::v1_to_sphere(u, w)
            } else {
                poincare::vv1_to_sphere(u, w)
            }),
            (ViewMode::U2, ChartSystem::Poincare) => Some(if w >= 0.0 {
                poincare::u2_to_sphere(u, w)
            } else {
                poincare::uu2_to_sphere(u, w)
            }),
            (ViewMode::V2, ChartSystem::Poincare) => Some(if w >= 0.0 {
                poincare::v2_to_sphere(u, w)
            } else {
                poincare::vv2_to_sphere(u, w)
            }),
            _ => None,
        }
    }
}
