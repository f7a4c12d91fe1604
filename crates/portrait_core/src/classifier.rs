use crate::autodiff::jacobian;
use crate::charts::{ChartId, ChartSystem, SpherePoint};
use crate::config::StudyConfig;
use crate::regions::RegionResolver;
use crate::study::{SeparatingCurve, SingularityTag, VectorFieldStudy};
use log::warn;
use nalgebra::DMatrix;
use num_complex::Complex;
use serde::Serialize;

/// Tag counts produced by one classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SingularitySummary {
    pub virtual_count: usize,
    pub standalone: usize,
    pub coinciding: usize,
    pub coinciding_main: usize,
}

impl SingularitySummary {
    fn record(&mut self, tag: SingularityTag) {
        match tag {
            SingularityTag::Virtual => self.virtual_count += 1,
            SingularityTag::Standalone => self.standalone += 1,
            SingularityTag::Coinciding => self.coinciding += 1,
            SingularityTag::CoincidingMain => self.coinciding_main += 1,
            SingularityTag::Unclassified => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Linearization {
    /// Row-major 2x2 Jacobian in chart coordinates.
    pub jacobian: [f64; 4],
    pub eigenvalues: Vec<Complex<f64>>,
}

/// Jacobian and eigenvalues of `field` at `point` of `chart`.
pub fn linearization(field: &VectorFieldStudy, chart: ChartId, point: [f64; 2]) -> Linearization {
    let jac = jacobian(&field.chart_field(chart), &point);
    let eigenvalues = DMatrix::from_row_slice(2, 2, &jac)
        .complex_eigenvalues()
        .iter()
        .cloned()
        .collect();
    Linearization {
        jacobian: [jac[0], jac[1], jac[2], jac[3]],
        eigenvalues,
    }
}

/// Tags every singularity of every field as virtual, standalone, coinciding or
/// coinciding-main. Previous tags are discarded, so repeated passes agree.
pub fn classify_singularities(
    charts: &ChartSystem,
    config: &StudyConfig,
    fields: &mut [VectorFieldStudy],
    curves: &[SeparatingCurve],
    regions: &RegionResolver,
) -> SingularitySummary {
    for field in fields.iter_mut() {
        for singularity in field.singularities.iter_mut() {
            singularity.tag = SingularityTag::Unclassified;
            singularity.eigenvalues.clear();
        }
    }

    let mut accepted: Vec<(usize, usize, SpherePoint)> = Vec::new();
    for fi in 0..fields.len() {
        for si in 0..fields[fi].singularities.len() {
            let (chart, position) = {
                let s = &fields[fi].singularities[si];
                (s.chart, s.position)
            };
            let pcoord = charts.from_chart(chart, position);
            let inside = pcoord.as_ref().is_some_and(|pcoord| {
                regions.in_vf_region_tolerant(charts, curves, fi, pcoord, config.region_epsilon)
            });
            let Some(pcoord) = pcoord.filter(|_| inside) else {
                warn!(
                    "singularity {} of vector field {} at {:?} {:?} is virtual",
                    si, fi, chart, position
                );
                fields[fi].singularities[si].tag = SingularityTag::Virtual;
                continue;
            };

            let main = accepted
                .iter()
                .find(|(_, _, other)| {
                    charts.sphere_distance(&pcoord, other) < config.coincidence_tolerance
                })
                .map(|&(fj, sj, _)| (fj, sj));
            let tag = match main {
                Some((fj, sj)) => {
                    fields[fj].singularities[sj].tag = SingularityTag::CoincidingMain;
                    SingularityTag::Coinciding
                }
                None => {
                    accepted.push((fi, si, pcoord));
                    SingularityTag::Standalone
                }
            };
            let eigenvalues = linearization(&fields[fi], chart, position).eigenvalues;
            let singularity = &mut fields[fi].singularities[si];
            singularity.tag = tag;
            singularity.eigenvalues = eigenvalues;
        }
    }

    let mut summary = SingularitySummary::default();
    for field in fields.iter() {
        for singularity in &field.singularities {
            summary.record(singularity.tag);
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polynomial::Polynomial2;
    use crate::regions::Sign;
    use crate::study::{Singularity, SingularityKind, Stability};

    fn poly(terms: &[(f64, [i64; 2])]) -> Polynomial2 {
        Polynomial2::from_terms(terms).expect("valid terms")
    }

    fn singular_at(x: f64, y: f64) -> Singularity {
        Singularity::new(SingularityKind::Saddle, ChartId::R2, [x, y], Stability::Undetermined)
    }

    /// Field 0 governs x < 0, field 1 governs x >= 0.
    fn split_study() -> (Vec<VectorFieldStudy>, Vec<SeparatingCurve>, RegionResolver) {
        let mut left = VectorFieldStudy::new();
        left.p.r2 = poly(&[(1.0, [1, 0])]);
        left.q.r2 = poly(&[(-1.0, [0, 1])]);
        left.singularities = vec![singular_at(-0.5, 0.0), singular_at(0.5, 0.0), singular_at(0.0, 0.0)];

        let mut right = VectorFieldStudy::new();
        right.p.r2 = poly(&[(1.0, [0, 1])]);
        right.q.r2 = poly(&[(-1.0, [1, 0])]);
        right.singularities = vec![singular_at(0.0, 0.0), singular_at(0.5, 0.5)];

        let mut curve = SeparatingCurve::default();
        curve.polys.r2 = poly(&[(1.0, [1, 0])]);
        let mut regions = RegionResolver::new(1);
        regions
            .register_vf_region(0, vec![Sign::Negative])
            .expect("valid region");
        regions
            .register_vf_region(1, vec![Sign::Positive])
            .expect("valid region");
        (vec![left, right], vec![curve], regions)
    }

    fn tags(fields: &[VectorFieldStudy]) -> Vec<Vec<SingularityTag>> {
        fields
            .iter()
            .map(|f| f.singularities.iter().map(|s| s.tag).collect())
            .collect()
    }

    #[test]
    fn tags_virtual_coinciding_and_standalone() {
        let (mut fields, curves, regions) = split_study();
        let config = StudyConfig::default();
        let summary = classify_singularities(
            &ChartSystem::Poincare,
            &config,
            &mut fields,
            &curves,
            &regions,
        );
        assert_eq!(
            tags(&fields),
            vec![
                vec![
                    SingularityTag::Standalone,
                    SingularityTag::Virtual,
                    SingularityTag::CoincidingMain,
                ],
                vec![SingularityTag::Coinciding, SingularityTag::Standalone],
            ]
        );
        assert_eq!(
            summary,
            SingularitySummary {
                virtual_count: 1,
                standalone: 2,
                coinciding: 1,
                coinciding_main: 1,
            }
        );
        assert!(fields[0].singularities[1].eigenvalues.is_empty());
    }

    #[test]
    fn classification_is_idempotent() {
        let (mut fields, curves, regions) = split_study();
        let config = StudyConfig::default();
        let charts = ChartSystem::Poincare;
        let first = classify_singularities(&charts, &config, &mut fields, &curves, &regions);
        let first_tags = tags(&fields);
        let second = classify_singularities(&charts, &config, &mut fields, &curves, &regions);
        assert_eq!(first, second);
        assert_eq!(first_tags, tags(&fields));
    }

    #[test]
    fn linearization_of_saddle_and_center() {
        let (fields, _, _) = split_study();
        let saddle = linearization(&fields[0], ChartId::R2, [0.0, 0.0]);
        assert_eq!(saddle.jacobian, [1.0, 0.0, 0.0, -1.0]);
        let mut re: Vec<f64> = saddle.eigenvalues.iter().map(|c| c.re).collect();
        re.sort_by(|a, b| a.total_cmp(b));
        assert!((re[0] + 1.0).abs() < 1e-12 && (re[1] - 1.0).abs() < 1e-12);

        let center = linearization(&fields[1], ChartId::R2, [0.0, 0.0]);
        for lambda in &center.eigenvalues {
            assert!(lambda.re.abs() < 1e-12);
            assert!((lambda.im.abs() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn without_curves_nothing_is_virtual() {
        let mut field = VectorFieldStudy::new();
        field.singularities = vec![singular_at(3.0, 1.0)];
        field
            .singularities
            .push(Singularity::new(SingularityKind::Node, ChartId::U1, [0.0, 0.0], Stability::Stable));
        let mut fields = vec![field];
        let summary = classify_singularities(
            &ChartSystem::Poincare,
            &StudyConfig::default(),
            &mut fields,
            &[],
            &RegionResolver::new(0),
        );
        assert_eq!(summary.standalone, 2);
        assert_eq!(summary.virtual_count, 0);
    }
}
