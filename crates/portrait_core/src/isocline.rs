//! Zero sets drawn on the sphere: separating curves, GCF curves and isoclines.
//!
//! Functions are sampled on a regular grid of view coordinates; every grid node is
//! mapped onto the sphere and evaluated in the chart owning it, and each grid cell is
//! resolved with marching squares.

use crate::charts::{SpherePoint, ViewMap, ViewWindow};
use crate::config::StudyConfig;
use crate::study::{CurvePoint, StudyContext, VectorFieldStudy};
use anyhow::{bail, Result};

pub type Segment = [SpherePoint; 2];

/// Sampling grid in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewGrid {
    pub map: ViewMap,
    pub window: ViewWindow,
    pub samples: usize,
}

impl ViewGrid {
    pub fn from_config(config: &StudyConfig) -> Result<Self> {
        let map = config.view_map()?;
        Ok(Self {
            map,
            window: map.default_window(config.plane_window),
            samples: config.curve_grid,
        })
    }
}

/// Segments approximating `{ f = 0 }` inside the grid window. Nodes where `f`
/// is undefined (or not visible in the view) drop their cells.
pub fn sample_zero_set<F>(grid: &ViewGrid, f: F) -> Vec<Segment>
where
    F: Fn(&SpherePoint) -> Option<f64>,
{
    let n = grid.samples.max(2);
    let w = &grid.window;
    let step_x = (w.x_max - w.x_min) / (n - 1) as f64;
    let step_y = (w.y_max - w.y_min) / (n - 1) as f64;
    let index = |ix: usize, iy: usize| -> usize { ix + iy * n };

    let mut values = vec![f64::NAN; n * n];
    for iy in 0..n {
        let y = w.y_min + step_y * iy as f64;
        for ix in 0..n {
            let x = w.x_min + step_x * ix as f64;
            if let Some(value) = grid.map.view_to_sphere([x, y]).and_then(|pcoord| f(&pcoord)) {
                values[index(ix, iy)] = value;
            }
        }
    }

    let mut segments = Vec::new();
    for iy in 0..n - 1 {
        let y0 = w.y_min + step_y * iy as f64;
        let y1 = w.y_min + step_y * (iy + 1) as f64;
        for ix in 0..n - 1 {
            let x0 = w.x_min + step_x * ix as f64;
            let x1 = w.x_min + step_x * (ix + 1) as f64;
            let v = [
                values[index(ix, iy)],
                values[index(ix + 1, iy)],
                values[index(ix + 1, iy + 1)],
                values[index(ix, iy + 1)],
            ];
            if v.iter().any(|value| !value.is_finite()) {
                continue;
            }

            let mut case_index = 0u8;
            for (bit, value) in v.iter().enumerate() {
                if *value >= 0.0 {
                    case_index |= 1 << bit;
                }
            }
            for (edge_a, edge_b) in marching_squares_edge_pairs(case_index) {
                let a = interpolate_square_edge(*edge_a, x0, x1, y0, y1, &v);
                let b = interpolate_square_edge(*edge_b, x0, x1, y0, y1, &v);
                if let (Some(pa), Some(pb)) = (grid.map.view_to_sphere(a), grid.map.view_to_sphere(b)) {
                    segments.push([pa, pb]);
                }
            }
        }
    }
    segments
}

/// Flattens segments into drawable points: each segment starts a new stroke.
pub fn segments_to_points(segments: &[Segment]) -> Vec<CurvePoint> {
    segments
        .iter()
        .flat_map(|[a, b]| {
            [
                CurvePoint {
                    pcoord: *a,
                    dashes: false,
                },
                CurvePoint {
                    pcoord: *b,
                    dashes: true,
                },
            ]
        })
        .collect()
}

/// Visible part of separating curve `index`.
pub fn curve_points(ctx: &StudyContext<'_>, grid: &ViewGrid, index: usize) -> Result<Vec<CurvePoint>> {
    let Some(curve) = ctx.curves.get(index) else {
        bail!("Curve index {} out of range ({} curves).", index, ctx.curves.len());
    };
    let segments: Vec<Segment> = sample_zero_set(grid, |pcoord| {
        curve.polys.evaluate_on_sphere(&ctx.charts, pcoord)
    })
    .into_iter()
    .filter(|segment| {
        segment
            .iter()
            .all(|p| ctx.regions.curve_visible(&ctx.charts, ctx.curves, index, p))
    })
    .collect();
    Ok(segments_to_points(&segments))
}

/// Zero set of the GCF of field `index`, restricted to the field's own regions.
pub fn gcf_points(ctx: &StudyContext<'_>, grid: &ViewGrid, index: usize) -> Result<Vec<CurvePoint>> {
    let field = field(ctx, index)?;
    let segments = sample_zero_set(grid, |pcoord| {
        field.gcf.evaluate_on_sphere(&ctx.charts, pcoord)
    });
    Ok(segments_to_points(&governed_by(ctx, segments, index)))
}

/// Isocline of slope `slope` (`None` for vertical) of field `index` in the finite plane.
pub fn isocline_points(
    ctx: &StudyContext<'_>,
    grid: &ViewGrid,
    index: usize,
    slope: Option<f64>,
) -> Result<Vec<CurvePoint>> {
    let field = field(ctx, index)?;
    if let Some(m) = slope {
        if !m.is_finite() {
            bail!("Isocline slope must be finite.");
        }
    }
    let segments = sample_zero_set(grid, |pcoord| {
        let [x, y] = ctx.charts.sphere_to_r2(pcoord)?;
        Some(isocline_value(field, slope, x, y))
    });
    Ok(segments_to_points(&governed_by(ctx, segments, index)))
}

/// `Q - mP` (or `P` when vertical) scaled by `(1 + x² + y²)^{-d/2}`, `d` the field degree.
pub fn isocline_value(field: &VectorFieldStudy, slope: Option<f64>, x: f64, y: f64) -> f64 {
    let p = field.p.r2.evaluate(&[x, y]);
    let value = match slope {
        Some(m) => field.q.r2.evaluate(&[x, y]) - m * p,
        None => p,
    };
    let degree = field.p.r2.degree().max(field.q.r2.degree());
    value / (1.0 + x * x + y * y).powf(0.5 * degree as f64)
}

fn field<'a>(ctx: &StudyContext<'a>, index: usize) -> Result<&'a VectorFieldStudy> {
    match ctx.fields.get(index) {
        Some(field) => Ok(field),
        None => bail!(
            "Vector field index {} out of range ({} fields).",
            index,
            ctx.fields.len()
        ),
    }
}

fn governed_by(ctx: &StudyContext<'_>, segments: Vec<Segment>, index: usize) -> Vec<Segment> {
    segments
        .into_iter()
        .filter(|segment| segment.iter().all(|p| ctx.field_at(p) == Some(index)))
        .collect()
}

fn marching_squares_edge_pairs(case_index: u8) -> &'static [(u8, u8)] {
    match case_index {
        0 | 15 => &[],
        1 => &[(3, 0)],
        2 => &[(0, 1)],
        3 => &[(3, 1)],
        4 => &[(1, 2)],
        5 => &[(3, 2), (0, 1)],
        6 => &[(0, 2)],
        7 => &[(3, 2)],
        8 => &[(2, 3)],
        9 => &[(0, 2)],
        10 => &[(0, 3), (1, 2)],
        11 => &[(1, 2)],
        12 => &[(1, 3)],
        13 => &[(0, 1)],
        14 => &[(3, 0)],
        _ => &[],
    }
}

/// Point on cell edge `edge` (0 bottom, 1 right, 2 top, 3 left) where the
/// linear interpolant of the corner values vanishes.
fn interpolate_square_edge(edge: u8, x0: f64, x1: f64, y0: f64, y1: f64, v: &[f64; 4]) -> [f64; 2] {
    match edge {
        0 => [x0 + (x1 - x0) * interpolate_factor(v[0], v[1]), y0],
        1 => [x1, y0 + (y1 - y0) * interpolate_factor(v[1], v[2])],
        2 => [x1 + (x0 - x1) * interpolate_factor(v[2], v[3]), y1],
        3 => [x0, y1 + (y0 - y1) * interpolate_factor(v[3], v[0])],
        _ => [x0, y0],
    }
}

fn interpolate_factor(v0: f64, v1: f64) -> f64 {
    let denominator = v0 - v1;
    if denominator.abs() <= 1e-12 {
        0.5
    } else {
        (v0 / denominator).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::{ChartSystem, ViewMode};
    use crate::polynomial::Polynomial2;
    use crate::regions::{RegionResolver, Sign};
    use crate::study::SeparatingCurve;

    fn poly(terms: &[(f64, [i64; 2])]) -> Polynomial2 {
        Polynomial2::from_terms(terms).expect("valid terms")
    }

    fn plane_grid(half_width: f64, samples: usize) -> ViewGrid {
        ViewGrid {
            map: ViewMap::new(ChartSystem::Poincare, ViewMode::Plane).expect("plane view"),
            window: ViewWindow::square(half_width),
            samples,
        }
    }

    #[test]
    fn line_is_traced_across_window() {
        let charts = ChartSystem::Poincare;
        let grid = plane_grid(0.5, 20);
        let segments = sample_zero_set(&grid, |pcoord| {
            charts.sphere_to_r2(pcoord).map(|[x, y]| x - 0.5 * y)
        });
        // at least one segment per cell row
        assert!(segments.len() >= 19);
        for segment in &segments {
            for p in segment {
                let [x, y] = charts.sphere_to_r2(p).expect("finite");
                assert!((x - 0.5 * y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn circle_at_infinity_charts_is_found_in_sphere_view() {
        let charts = ChartSystem::Poincare;
        let mut curve = SeparatingCurve::default();
        // x^2 + y^2 - 4 and its chart versions
        curve.polys.r2 = poly(&[(1.0, [2, 0]), (1.0, [0, 2]), (-4.0, [0, 0])]);
        let at_infinity = poly(&[(1.0, [0, 0]), (1.0, [2, 0]), (-4.0, [0, 2])]);
        curve.polys.u1 = at_infinity.clone();
        curve.polys.v1 = at_infinity.clone();
        curve.polys.u2 = at_infinity.clone();
        curve.polys.v2 = at_infinity;
        let grid = ViewGrid {
            map: ViewMap::new(charts, ViewMode::Sphere).expect("sphere view"),
            window: ViewWindow::square(1.1),
            samples: 101,
        };
        let segments = sample_zero_set(&grid, |pcoord| curve.polys.evaluate_on_sphere(&charts, pcoord));
        assert!(segments.len() > 20);
        for p in segments.iter().flatten() {
            let [x, y] = charts.sphere_to_r2(p).expect("finite");
            assert!((x.hypot(y) - 2.0).abs() < 0.1);
        }
    }

    #[test]
    fn isoclines_and_gcf_respect_regions() {
        let config = StudyConfig::default();
        let mut field = VectorFieldStudy::new();
        field.p.r2 = poly(&[(1.0, [0, 0])]);
        field.q.r2 = poly(&[(1.0, [1, 0])]);
        field.gcf.r2 = poly(&[(1.0, [0, 1]), (-0.25, [0, 0])]);
        let fields = vec![field];
        let mut curve = SeparatingCurve::default();
        curve.polys.r2 = poly(&[(1.0, [0, 1])]);
        let curves = vec![curve];
        let mut regions = RegionResolver::new(1);
        regions
            .register_vf_region(0, vec![Sign::Positive])
            .expect("valid region");
        let ctx = StudyContext {
            charts: ChartSystem::Poincare,
            config: &config,
            fields: &fields,
            curves: &curves,
            regions: &regions,
        };
        let grid = plane_grid(0.5, 41);

        let horizontal = isocline_points(&ctx, &grid, 0, Some(0.0)).expect("valid field");
        assert!(!horizontal.is_empty());
        for point in &horizontal {
            let [x, y] = ctx.charts.sphere_to_r2(&point.pcoord).expect("finite");
            assert!(x.abs() < 1e-9);
            assert!(y >= 0.0);
        }
        assert!(isocline_points(&ctx, &grid, 0, None).expect("valid field").is_empty());

        let gcf = gcf_points(&ctx, &grid, 0).expect("valid field");
        assert!(!gcf.is_empty());
        assert!(!gcf[0].dashes && gcf[1].dashes);

        assert!(gcf_points(&ctx, &grid, 3).is_err());
        assert!(curve_points(&ctx, &grid, 0).expect("valid curve").len() > 2);
    }
}
