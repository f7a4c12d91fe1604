use crate::charts::{ChartSystem, SpherePoint};
use crate::error::StudyError;
use crate::study::SeparatingCurve;
use serde::{Deserialize, Serialize};

/// Sign of a separating-curve value at a point.
///
/// In a region sign vector `Boundary` leaves the curve unconstrained; in a
/// point sign vector it marks a value within epsilon of zero, which matches
/// either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Negative,
    Boundary,
    Positive,
}

impl Sign {
    pub fn from_value(value: f64) -> Self {
        if value < 0.0 {
            Sign::Negative
        } else {
            Sign::Positive
        }
    }

    pub fn from_value_tolerant(value: f64, epsilon: f64) -> Self {
        if value.abs() <= epsilon {
            Sign::Boundary
        } else {
            Sign::from_value(value)
        }
    }

    pub fn from_entry(entry: i64) -> Result<Self, StudyError> {
        match entry {
            -1 => Ok(Sign::Negative),
            0 => Ok(Sign::Boundary),
            1 => Ok(Sign::Positive),
            other => Err(StudyError::InvalidSign(other)),
        }
    }

    fn accepts(self, point: Sign) -> bool {
        self == Sign::Boundary || point == Sign::Boundary || self == point
    }
}

/// A sign vector attached to a vector-field or curve index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub index: usize,
    pub signs: Vec<Sign>,
}

impl Region {
    pub fn matches(&self, signs: &[Sign]) -> bool {
        self.signs
            .iter()
            .zip(signs.iter())
            .all(|(region, point)| region.accepts(*point))
    }
}

/// Decides which vector field governs a point of a piecewise study.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionResolver {
    curve_count: usize,
    vf_regions: Vec<Region>,
    curve_regions: Vec<Region>,
}

impl RegionResolver {
    pub fn new(curve_count: usize) -> Self {
        Self {
            curve_count,
            vf_regions: Vec::new(),
            curve_regions: Vec::new(),
        }
    }

    pub fn curve_count(&self) -> usize {
        self.curve_count
    }

    pub fn vf_regions(&self) -> &[Region] {
        &self.vf_regions
    }

    pub fn curve_regions(&self) -> &[Region] {
        &self.curve_regions
    }

    fn check_len(&self, signs: &[Sign]) -> Result<(), StudyError> {
        if signs.len() != self.curve_count {
            return Err(StudyError::RegionConfigMismatch {
                expected: self.curve_count,
                found: signs.len(),
            });
        }
        Ok(())
    }

    /// Registers a region of vector field `index`. Later registrations take
    /// precedence over earlier ones.
    pub fn register_vf_region(&mut self, index: usize, signs: Vec<Sign>) -> Result<(), StudyError> {
        self.check_len(&signs)?;
        self.vf_regions.push(Region { index, signs });
        Ok(())
    }

    pub fn register_curve_region(&mut self, index: usize, signs: Vec<Sign>) -> Result<(), StudyError> {
        self.check_len(&signs)?;
        self.curve_regions.push(Region { index, signs });
        Ok(())
    }

    /// Values of every separating curve at `pcoord`, in the chart that owns it.
    pub fn curve_values(
        &self,
        charts: &ChartSystem,
        curves: &[SeparatingCurve],
        pcoord: &SpherePoint,
    ) -> Option<Vec<f64>> {
        let chart = charts.select_chart(pcoord);
        let coords = charts.to_chart(chart, pcoord)?;
        Some(
            curves
                .iter()
                .take(self.curve_count)
                .map(|curve| curve.polys.evaluate(chart, coords))
                .collect(),
        )
    }

    pub fn sign_vector(
        &self,
        charts: &ChartSystem,
        curves: &[SeparatingCurve],
        pcoord: &SpherePoint,
    ) -> Option<Vec<Sign>> {
        let values = self.curve_values(charts, curves, pcoord)?;
        Some(values.into_iter().map(Sign::from_value).collect())
    }

    /// Vector field governing `pcoord`, or `None` outside every region.
    pub fn resolve_vf(
        &self,
        charts: &ChartSystem,
        curves: &[SeparatingCurve],
        pcoord: &SpherePoint,
    ) -> Option<usize> {
        if self.curve_count == 0 {
            return Some(0);
        }
        let signs = self.sign_vector(charts, curves, pcoord)?;
        Self::search(&self.vf_regions, &signs)
    }

    /// Curve index of the newest curve region containing `pcoord`.
    pub fn resolve_curve(
        &self,
        charts: &ChartSystem,
        curves: &[SeparatingCurve],
        pcoord: &SpherePoint,
    ) -> Option<usize> {
        let signs = self.sign_vector(charts, curves, pcoord)?;
        Self::search(&self.curve_regions, &signs)
    }

    /// Whether a point of curve `curve` belongs to one of its curve regions.
    /// The curve's own sign is ignored since the point lies on it. A curve
    /// without curve regions is visible everywhere.
    pub fn curve_visible(
        &self,
        charts: &ChartSystem,
        curves: &[SeparatingCurve],
        curve: usize,
        pcoord: &SpherePoint,
    ) -> bool {
        let mut own = self.curve_regions.iter().filter(|r| r.index == curve).peekable();
        if own.peek().is_none() {
            return true;
        }
        let Some(mut signs) = self.sign_vector(charts, curves, pcoord) else {
            return false;
        };
        if let Some(slot) = signs.get_mut(curve) {
            *slot = Sign::Boundary;
        }
        own.any(|region| region.matches(&signs))
    }

    /// Epsilon-tolerant membership of `pcoord` in a region of vector field `index`.
    pub fn in_vf_region_tolerant(
        &self,
        charts: &ChartSystem,
        curves: &[SeparatingCurve],
        index: usize,
        pcoord: &SpherePoint,
        epsilon: f64,
    ) -> bool {
        if self.curve_count == 0 {
            return index == 0;
        }
        let Some(values) = self.curve_values(charts, curves, pcoord) else {
            return false;
        };
        let signs: Vec<Sign> = values
            .into_iter()
            .map(|v| Sign::from_value_tolerant(v, epsilon))
            .collect();
        self.vf_regions
            .iter()
            .any(|region| region.index == index && region.matches(&signs))
    }

    fn search(regions: &[Region], signs: &[Sign]) -> Option<usize> {
        regions
            .iter()
            .rev()
            .find(|region| region.matches(signs))
            .map(|region| region.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polynomial::Polynomial2;

    fn line_curve(terms: &[(f64, [i64; 2])]) -> SeparatingCurve {
        let mut curve = SeparatingCurve::default();
        curve.polys.r2 = Polynomial2::from_terms(terms).expect("valid terms");
        curve
    }

    /// Curves `x = 0` and `y = 0`.
    fn axes() -> Vec<SeparatingCurve> {
        vec![line_curve(&[(1.0, [1, 0])]), line_curve(&[(1.0, [0, 1])])]
    }

    #[test]
    fn resolution_is_deterministic() {
        let charts = ChartSystem::Poincare;
        let curves = axes();
        let mut resolver = RegionResolver::new(2);
        resolver
            .register_vf_region(0, vec![Sign::Positive, Sign::Positive])
            .expect("valid region");
        resolver
            .register_vf_region(1, vec![Sign::Negative, Sign::Boundary])
            .expect("valid region");
        let point = charts.r2_to_sphere(-0.3, 0.4);
        let first = resolver.resolve_vf(&charts, &curves, &point);
        assert_eq!(first, Some(1));
        for _ in 0..5 {
            assert_eq!(resolver.resolve_vf(&charts, &curves, &point), first);
        }
        assert_eq!(
            resolver.resolve_vf(&charts, &curves, &charts.r2_to_sphere(0.3, 0.4)),
            Some(0)
        );
        assert_eq!(
            resolver.resolve_vf(&charts, &curves, &charts.r2_to_sphere(0.3, -0.4)),
            None
        );
    }

    #[test]
    fn newest_region_wins() {
        let charts = ChartSystem::Poincare;
        let curves = axes();
        let mut resolver = RegionResolver::new(2);
        resolver
            .register_vf_region(0, vec![Sign::Boundary, Sign::Boundary])
            .expect("valid region");
        resolver
            .register_vf_region(2, vec![Sign::Positive, Sign::Boundary])
            .expect("valid region");
        assert_eq!(
            resolver.resolve_vf(&charts, &curves, &charts.r2_to_sphere(0.5, -0.5)),
            Some(2)
        );
        assert_eq!(
            resolver.resolve_vf(&charts, &curves, &charts.r2_to_sphere(-0.5, -0.5)),
            Some(0)
        );
    }

    #[test]
    fn zero_value_counts_as_positive() {
        assert_eq!(Sign::from_value(0.0), Sign::Positive);
        assert_eq!(Sign::from_value(-1e-300), Sign::Negative);
        assert_eq!(Sign::from_value_tolerant(-1e-10, 1e-8), Sign::Boundary);
    }

    #[test]
    fn no_curves_means_single_field() {
        let charts = ChartSystem::Poincare;
        let resolver = RegionResolver::new(0);
        for point in [
            charts.r2_to_sphere(0.0, 0.0),
            charts.r2_to_sphere(1e6, -3.0),
            [0.0, -1.0, 0.0],
        ] {
            assert_eq!(resolver.resolve_vf(&charts, &[], &point), Some(0));
        }
    }

    #[test]
    fn mismatched_sign_vector_is_rejected() {
        let mut resolver = RegionResolver::new(2);
        let err = resolver
            .register_vf_region(0, vec![Sign::Positive])
            .expect_err("length mismatch");
        assert_eq!(
            err,
            StudyError::RegionConfigMismatch {
                expected: 2,
                found: 1
            }
        );
        assert!(resolver
            .register_curve_region(0, vec![Sign::Positive; 3])
            .is_err());
        assert!(resolver.vf_regions().is_empty());
        assert_eq!(Sign::from_entry(2), Err(StudyError::InvalidSign(2)));
    }

    #[test]
    fn tolerant_check_accepts_boundary_points() {
        let charts = ChartSystem::Poincare;
        let curves = axes();
        let mut resolver = RegionResolver::new(2);
        resolver
            .register_vf_region(0, vec![Sign::Negative, Sign::Boundary])
            .expect("valid region");
        let on_axis = charts.r2_to_sphere(0.0, 0.7);
        assert_eq!(resolver.resolve_vf(&charts, &curves, &on_axis), None);
        assert!(resolver.in_vf_region_tolerant(&charts, &curves, 0, &on_axis, 1e-8));
        assert!(!resolver.in_vf_region_tolerant(
            &charts,
            &curves,
            0,
            &charts.r2_to_sphere(0.1, 0.7),
            1e-8
        ));
    }

    #[test]
    fn curve_visibility_ignores_own_sign() {
        let charts = ChartSystem::Poincare;
        let curves = axes();
        let mut resolver = RegionResolver::new(2);
        assert!(resolver.curve_visible(&charts, &curves, 0, &charts.r2_to_sphere(0.0, -0.5)));
        resolver
            .register_curve_region(0, vec![Sign::Negative, Sign::Positive])
            .expect("valid region");
        assert!(resolver.curve_visible(&charts, &curves, 0, &charts.r2_to_sphere(0.0, 0.5)));
        assert!(!resolver.curve_visible(&charts, &curves, 0, &charts.r2_to_sphere(0.0, -0.5)));
        assert_eq!(
            resolver.resolve_curve(&charts, &curves, &charts.r2_to_sphere(-0.2, 0.5)),
            Some(0)
        );
    }
}
