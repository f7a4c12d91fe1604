use crate::charts::{ChartSystem, SpherePoint, ViewMode};
use crate::classifier::{classify_singularities, SingularitySummary};
use crate::config::StudyConfig;
use crate::error::StudyError;
use crate::integrator::{
    emit_point, integrate_batch, start_separatrix, OrbitColor, OrbitPoint, PlotSink, StopReason,
    TracerState,
};
use crate::isocline::{curve_points, gcf_points, isocline_points, ViewGrid};
use crate::regions::{RegionResolver, Sign};
use crate::study::{CurvePoint, OrbitType, SeparatingCurve, SingularityTag, StudyContext, VectorFieldStudy};
use crate::tables::{parse_tables, LoadedTables};
use anyhow::{anyhow, bail, Result};
use log::info;

/// A user orbit, traced forward and backward from its start point.
#[derive(Debug, Clone, PartialEq)]
pub struct Orbit {
    pub start: SpherePoint,
    pub points: Vec<OrbitPoint>,
    forward: Option<TracerState>,
    backward: Option<TracerState>,
}

/// A separatrix being traced from its singularity.
#[derive(Debug, Clone, PartialEq)]
pub struct SeparatrixRun {
    pub field: usize,
    pub singularity: usize,
    pub separatrix: usize,
    pub points: Vec<OrbitPoint>,
    pub stop: StopReason,
    state: TracerState,
}

/// All state of one open analysis: configuration, loaded tables and everything
/// traced so far.
#[derive(Debug, Clone)]
pub struct ParentStudy {
    config: StudyConfig,
    charts: ChartSystem,
    fields: Vec<VectorFieldStudy>,
    curves: Vec<SeparatingCurve>,
    regions: RegionResolver,
    orbits: Vec<Orbit>,
    separatrices: Vec<SeparatrixRun>,
    summary: SingularitySummary,
}

macro_rules! context {
    ($study:expr) => {
        StudyContext {
            charts: $study.charts,
            config: &$study.config,
            fields: &$study.fields,
            curves: &$study.curves,
            regions: &$study.regions,
        }
    };
}

impl ParentStudy {
    pub fn new(config: StudyConfig) -> Result<Self> {
        config.validate()?;
        let charts = config.chart_system()?;
        Ok(Self {
            config,
            charts,
            fields: Vec::new(),
            curves: Vec::new(),
            regions: RegionResolver::new(0),
            orbits: Vec::new(),
            separatrices: Vec::new(),
            summary: SingularitySummary::default(),
        })
    }

    /// Drops the loaded study and everything traced; keeps the configuration.
    pub fn reset(&mut self) {
        self.fields.clear();
        self.curves.clear();
        self.regions = RegionResolver::new(0);
        self.orbits.clear();
        self.separatrices.clear();
        self.summary = SingularitySummary::default();
        info!("study reset");
    }

    /// Replaces the current study with the one described by `text`. On error
    /// the study is left empty.
    pub fn load_tables(&mut self, text: &str) -> Result<(), StudyError> {
        self.reset();
        let LoadedTables {
            fields,
            curves,
            regions,
        } = parse_tables(text)?;
        self.fields = fields;
        self.curves = curves;
        self.regions = regions;
        self.classify();
        info!(
            "loaded study with {} vector fields and {} separating curves",
            self.fields.len(),
            self.curves.len()
        );
        Ok(())
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn charts(&self) -> ChartSystem {
        self.charts
    }

    pub fn fields(&self) -> &[VectorFieldStudy] {
        &self.fields
    }

    pub fn curves(&self) -> &[SeparatingCurve] {
        &self.curves
    }

    pub fn regions(&self) -> &RegionResolver {
        &self.regions
    }

    pub fn orbits(&self) -> &[Orbit] {
        &self.orbits
    }

    pub fn separatrices(&self) -> &[SeparatrixRun] {
        &self.separatrices
    }

    pub fn summary(&self) -> SingularitySummary {
        self.summary
    }

    pub fn context(&self) -> StudyContext<'_> {
        context!(self)
    }

    /// Applies a new configuration and re-tags the singularities. Changing the
    /// weights switches the sphere, so every traced point is discarded.
    pub fn set_config(&mut self, config: StudyConfig) -> Result<()> {
        config.validate()?;
        let charts = config.chart_system()?;
        if charts != self.charts {
            self.orbits.clear();
            self.separatrices.clear();
            for curve in &mut self.curves {
                curve.points.clear();
            }
        }
        self.config = config;
        self.charts = charts;
        self.classify();
        Ok(())
    }

    pub fn set_weights(&mut self, p: u32, q: u32) -> Result<()> {
        let mut config = self.config.clone();
        config.p = p;
        config.q = q;
        if !(p == 1 && q == 1) && !matches!(config.view, ViewMode::Plane | ViewMode::Sphere) {
            config.view = ViewMode::Sphere;
        }
        self.set_config(config)
    }

    pub fn set_view(&mut self, view: ViewMode) -> Result<()> {
        let config = StudyConfig {
            view,
            ..self.config.clone()
        };
        self.set_config(config)
    }

    pub fn register_vf_region(&mut self, index: usize, signs: Vec<Sign>) -> Result<(), StudyError> {
        if index >= self.fields.len() {
            return Err(StudyError::UnknownVectorField {
                index,
                count: self.fields.len(),
            });
        }
        self.regions.register_vf_region(index, signs)?;
        self.classify();
        Ok(())
    }

    pub fn register_curve_region(&mut self, index: usize, signs: Vec<Sign>) -> Result<(), StudyError> {
        if index >= self.curves.len() {
            return Err(StudyError::UnknownCurve {
                index,
                count: self.curves.len(),
            });
        }
        self.regions.register_curve_region(index, signs)
    }

    /// Re-tags every singularity.
    pub fn classify(&mut self) -> SingularitySummary {
        self.summary = classify_singularities(
            &self.charts,
            &self.config,
            &mut self.fields,
            &self.curves,
            &self.regions,
        );
        self.summary
    }

    /// Registers an orbit through `pcoord` and returns its index.
    pub fn start_orbit(&mut self, pcoord: SpherePoint) -> usize {
        self.orbits.push(Orbit {
            start: pcoord,
            points: Vec::new(),
            forward: None,
            backward: None,
        });
        self.orbits.len() - 1
    }

    /// Registers an orbit through a point given in view coordinates.
    pub fn start_orbit_at_view(&mut self, view: [f64; 2]) -> Result<usize> {
        let pcoord = self
            .config
            .view_map()?
            .view_to_sphere(view)
            .ok_or_else(|| anyhow!("View point {:?} is not on the sphere.", view))?;
        Ok(self.start_orbit(pcoord))
    }

    /// Registers an orbit through a point of the normalized view square `[0, 1]²`.
    pub fn start_orbit_at_normalized(&mut self, unit: [f64; 2]) -> Result<usize> {
        let view = self.config.view_window()?.denormalize(unit);
        self.start_orbit_at_view(view)
    }

    /// Integrates one batch of orbit `index`, forward for `direction >= 0`.
    /// A trace resumed away from the last stored point starts with a marker.
    pub fn continue_orbit(
        &mut self,
        index: usize,
        direction: f64,
        sink: &mut dyn PlotSink,
        cancel: &dyn Fn() -> bool,
    ) -> Result<StopReason> {
        let ctx = context!(self);
        let count = self.orbits.len();
        let Some(orbit) = self.orbits.get_mut(index) else {
            bail!("Orbit index {} out of range ({} orbits).", index, count);
        };
        let dir = if direction < 0.0 { -1.0 } else { 1.0 };
        let start = orbit.start;
        let slot = if dir > 0.0 {
            &mut orbit.forward
        } else {
            &mut orbit.backward
        };
        let state = slot.get_or_insert_with(|| TracerState::new(start, OrbitType::Orbit, dir, ctx.config.step));

        if orbit.points.last().map(|p| p.pcoord) != Some(state.pcoord) {
            let anchor = OrbitPoint {
                pcoord: state.pcoord,
                color: OrbitColor::Orbit,
                dashes: false,
                dir: state.dir,
                kind: state.kind,
            };
            emit_point(sink, None, &anchor);
            orbit.points.push(anchor);
        }
        let previous = Some(state.pcoord);
        let batch = integrate_batch(&ctx, state, ctx.config.points_to_int, previous, sink, cancel);
        orbit.points.extend(batch.points);
        Ok(batch.stop)
    }

    pub fn delete_last_orbit(&mut self) -> Option<Orbit> {
        self.orbits.pop()
    }

    pub fn clear_orbits(&mut self) {
        self.orbits.clear();
    }

    pub fn clear_separatrices(&mut self) {
        self.separatrices.clear();
    }

    /// Starts separatrix `separatrix` of singularity `singularity` of field
    /// `field`, integrates its first batch and returns the run index.
    pub fn plot_separatrix(
        &mut self,
        field: usize,
        singularity: usize,
        separatrix: usize,
        sink: &mut dyn PlotSink,
        cancel: &dyn Fn() -> bool,
    ) -> Result<usize> {
        let ctx = context!(self);
        let Some(vf) = ctx.fields.get(field) else {
            bail!("Vector field index {} out of range.", field);
        };
        let Some(sing) = vf.singularities.get(singularity) else {
            bail!("Singularity index {} out of range for vector field {}.", singularity, field);
        };
        if sing.tag == SingularityTag::Virtual {
            bail!("Singularity {} of vector field {} is virtual.", singularity, field);
        }
        let Some(series) = sing.separatrices.get(separatrix) else {
            bail!("Separatrix index {} out of range.", separatrix);
        };

        let mut start = start_separatrix(&ctx, field, sing, series, sink)
            .ok_or_else(|| anyhow!("Separatrix series cannot be placed on the sphere."))?;
        let previous = start.points.last().map(|p| p.pcoord);
        let batch = integrate_batch(
            &ctx,
            &mut start.state,
            ctx.config.points_to_int,
            previous,
            sink,
            cancel,
        );
        let mut points = start.points;
        points.extend(batch.points);
        self.separatrices.push(SeparatrixRun {
            field,
            singularity,
            separatrix,
            points,
            stop: batch.stop,
            state: start.state,
        });
        Ok(self.separatrices.len() - 1)
    }

    /// Starts every separatrix of every plotted singularity and returns how
    /// many were started before `cancel` fired.
    pub fn plot_all_separatrices(
        &mut self,
        sink: &mut dyn PlotSink,
        cancel: &dyn Fn() -> bool,
    ) -> Result<usize> {
        let mut targets = Vec::new();
        for (fi, field) in self.fields.iter().enumerate() {
            for (si, singularity) in field.singularities.iter().enumerate() {
                if singularity.is_plotted() {
                    targets.extend((0..singularity.separatrices.len()).map(|k| (fi, si, k)));
                }
            }
        }
        let mut started = 0;
        for (fi, si, k) in targets {
            if cancel() {
                break;
            }
            self.plot_separatrix(fi, si, k, sink, cancel)?;
            started += 1;
        }
        Ok(started)
    }

    pub fn continue_separatrix(
        &mut self,
        run: usize,
        sink: &mut dyn PlotSink,
        cancel: &dyn Fn() -> bool,
    ) -> Result<StopReason> {
        let ctx = context!(self);
        let Some(entry) = self.separatrices.get_mut(run) else {
            bail!("Separatrix run {} out of range.", run);
        };
        let previous = entry.points.last().map(|p| p.pcoord);
        let batch = integrate_batch(
            &ctx,
            &mut entry.state,
            ctx.config.points_to_int,
            previous,
            sink,
            cancel,
        );
        entry.points.extend(batch.points);
        entry.stop = batch.stop;
        Ok(batch.stop)
    }

    /// Samples every separating curve on the current view grid.
    pub fn sample_curves(&mut self) -> Result<()> {
        let grid = ViewGrid::from_config(&self.config)?;
        let ctx = context!(self);
        let sampled = (0..self.curves.len())
            .map(|index| curve_points(&ctx, &grid, index))
            .collect::<Result<Vec<_>>>()?;
        for (curve, points) in self.curves.iter_mut().zip(sampled) {
            curve.points = points;
        }
        Ok(())
    }

    pub fn gcf_points(&self, field: usize) -> Result<Vec<CurvePoint>> {
        let grid = ViewGrid::from_config(&self.config)?;
        gcf_points(&self.context(), &grid, field)
    }

    pub fn isocline_points(&self, field: usize, slope: Option<f64>) -> Result<Vec<CurvePoint>> {
        let grid = ViewGrid::from_config(&self.config)?;
        isocline_points(&self.context(), &grid, field, slope)
    }

    /// Replays curves, orbits and separatrices without integrating.
    pub fn redraw(&self, sink: &mut dyn PlotSink) {
        for curve in &self.curves {
            replay_curve(sink, &curve.points);
        }
        for orbit in &self.orbits {
            replay(sink, &orbit.points);
        }
        for run in &self.separatrices {
            replay(sink, &run.points);
        }
    }
}

fn replay(sink: &mut dyn PlotSink, points: &[OrbitPoint]) {
    let mut previous: Option<&SpherePoint> = None;
    for point in points {
        emit_point(sink, previous, point);
        previous = Some(&point.pcoord);
    }
}

fn replay_curve(sink: &mut dyn PlotSink, points: &[CurvePoint]) {
    let mut previous: Option<&SpherePoint> = None;
    for point in points {
        match previous {
            Some(prev) if point.dashes => sink.plot_line(prev, &point.pcoord, OrbitColor::Curve),
            _ => sink.plot_point(&point.pcoord, OrbitColor::Curve),
        }
        previous = Some(&point.pcoord);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::{never_cancel, NullPlot, RecordingPlot};
    use std::cell::Cell;

    const SADDLE: &str = "
study 1 0
vector_field
  field r2 1  1 0 1.0   1  0 1 -1.0
  singularity saddle r2 0 0 undetermined
    separatrix unstable 0.01 1 tf 1 0 0 1 0
    separatrix stable 0.01 1 ft 1 0 0 1 0
  end
end
";

    const NEAR_PAIR: &str = "
study 1 0
vector_field
  field r2 1  1 0 1.0   1  0 1 -1.0
  singularity saddle r2 0 0 undetermined
  end
  singularity saddle r2 0.001 0 undetermined
  end
end
";

    fn small_batches() -> StudyConfig {
        StudyConfig {
            points_to_int: 20,
            ..StudyConfig::default()
        }
    }

    #[test]
    fn failed_load_leaves_empty_study() {
        let mut study = ParentStudy::new(small_batches()).expect("valid config");
        study.load_tables(SADDLE).expect("valid tables");
        assert_eq!(study.fields().len(), 1);
        let err = study
            .load_tables("study 1 0 vector_field field r2 2")
            .expect_err("truncated");
        assert!(matches!(err, StudyError::MalformedTable { .. }));
        assert!(study.fields().is_empty());
        assert!(study.orbits().is_empty());
    }

    #[test]
    fn load_classifies_singularities() {
        let mut study = ParentStudy::new(small_batches()).expect("valid config");
        study.load_tables(SADDLE).expect("valid tables");
        assert_eq!(study.summary().standalone, 1);
        assert_eq!(study.fields()[0].singularities[0].eigenvalues.len(), 2);
    }

    #[test]
    fn orbits_continue_in_both_directions() {
        let mut study = ParentStudy::new(small_batches()).expect("valid config");
        study.load_tables(SADDLE).expect("valid tables");
        let index = study.start_orbit(study.charts().r2_to_sphere(0.05, 0.1));
        let mut sink = RecordingPlot::default();
        let forward = study
            .continue_orbit(index, 1.0, &mut sink, &never_cancel)
            .expect("orbit exists");
        assert_eq!(forward, StopReason::Completed);
        let backward = study
            .continue_orbit(index, -1.0, &mut sink, &never_cancel)
            .expect("orbit exists");
        assert_eq!(backward, StopReason::Completed);

        let orbit = &study.orbits()[index];
        // start, 20 forward, backward anchor, 20 backward
        assert_eq!(orbit.points.len(), 42);
        assert_eq!(sink.lines.len(), 40);
        assert_eq!(sink.points.len(), 2);

        // x' = x, y' = -y: forward time stretches x, backward time stretches y
        let charts = study.charts();
        let forward_end = charts.sphere_to_r2(&orbit.points[20].pcoord).expect("finite");
        assert!(forward_end[0] > 0.1 && forward_end[1] < 0.1);
        assert!((forward_end[0] * forward_end[1] - 0.005).abs() < 1e-6);
        let backward_end = charts
            .sphere_to_r2(&orbit.points.last().expect("points").pcoord)
            .expect("finite");
        assert!(backward_end[1] > 0.2 && backward_end[0] < 0.05);

        let mut replayed = RecordingPlot::default();
        study.redraw(&mut replayed);
        assert_eq!(replayed, sink);

        assert!(study.delete_last_orbit().is_some());
        assert!(study.orbits().is_empty());
        assert!(study.continue_orbit(0, 1.0, &mut NullPlot, &never_cancel).is_err());
    }

    #[test]
    fn resumed_orbit_redraws_like_live_drawing() {
        let mut study = ParentStudy::new(small_batches()).expect("valid config");
        study.load_tables(SADDLE).expect("valid tables");
        let index = study.start_orbit(study.charts().r2_to_sphere(0.05, 0.1));
        let mut sink = RecordingPlot::default();
        for direction in [1.0, -1.0, 1.0] {
            study
                .continue_orbit(index, direction, &mut sink, &never_cancel)
                .expect("orbit exists");
        }
        // every switch of direction restarts the drawing with a marker
        assert_eq!(sink.points.len(), 3);
        assert_eq!(sink.lines.len(), 60);
        let mut replayed = RecordingPlot::default();
        study.redraw(&mut replayed);
        assert_eq!(replayed, sink);
    }

    #[test]
    fn separatrices_start_and_continue() {
        let mut study = ParentStudy::new(small_batches()).expect("valid config");
        study.load_tables(SADDLE).expect("valid tables");
        let started = study
            .plot_all_separatrices(&mut NullPlot, &never_cancel)
            .expect("valid study");
        assert_eq!(started, 2);
        let run = &study.separatrices()[0];
        assert_eq!(run.points.len(), 100 + 20);
        let before = run.points.len();
        study
            .continue_separatrix(0, &mut NullPlot, &never_cancel)
            .expect("run exists");
        assert_eq!(study.separatrices()[0].points.len(), before + 20);

        // the unstable separatrix follows the x-axis away from the saddle
        let last = study.separatrices()[0].points.last().expect("points").pcoord;
        let [x, y] = study.charts().sphere_to_r2(&last).expect("finite");
        assert!(x > 0.01 && y.abs() < 1e-9);
    }

    #[test]
    fn cancelled_run_reports_started_separatrices() {
        let mut study = ParentStudy::new(small_batches()).expect("valid config");
        study.load_tables(SADDLE).expect("valid tables");
        // one check before each separatrix plus one per integrated point
        let calls = Cell::new(0);
        let cancel = || {
            calls.set(calls.get() + 1);
            calls.get() > 21
        };
        let started = study
            .plot_all_separatrices(&mut NullPlot, &cancel)
            .expect("valid study");
        assert_eq!(started, 1);
        assert_eq!(study.separatrices().len(), 1);
        assert_eq!(study.separatrices()[0].stop, StopReason::Completed);
    }

    #[test]
    fn tolerance_changes_reclassify() {
        let mut study = ParentStudy::new(small_batches()).expect("valid config");
        study.load_tables(NEAR_PAIR).expect("valid tables");
        assert_eq!(study.summary().standalone, 2);

        let config = StudyConfig {
            coincidence_tolerance: 0.01,
            ..study.config().clone()
        };
        study.set_config(config).expect("valid config");
        let summary = study.summary();
        assert_eq!(summary.standalone, 0);
        assert_eq!(summary.coinciding, 1);
        assert_eq!(summary.coinciding_main, 1);
        let tags: Vec<_> = study.fields()[0].singularities.iter().map(|s| s.tag).collect();
        assert_eq!(tags, [SingularityTag::CoincidingMain, SingularityTag::Coinciding]);
    }

    #[test]
    fn changing_weights_discards_traces() {
        let mut study = ParentStudy::new(small_batches()).expect("valid config");
        study.load_tables(SADDLE).expect("valid tables");
        study.start_orbit(study.charts().r2_to_sphere(0.1, 0.1));
        study.set_view(ViewMode::U1).expect("poincare view");
        assert_eq!(study.orbits().len(), 1);
        study.set_weights(1, 2).expect("valid weights");
        assert!(study.orbits().is_empty());
        assert_eq!(study.config().view, ViewMode::Sphere);
        assert!(study.set_view(ViewMode::V2).is_err());
    }

    #[test]
    fn region_registration_is_checked() {
        let mut study = ParentStudy::new(small_batches()).expect("valid config");
        study.load_tables(SADDLE).expect("valid tables");
        assert_eq!(
            study.register_vf_region(3, Vec::new()),
            Err(StudyError::UnknownVectorField { index: 3, count: 1 })
        );
        assert!(study.register_vf_region(0, Vec::new()).is_ok());
        assert_eq!(
            study.register_vf_region(0, vec![Sign::Positive]),
            Err(StudyError::RegionConfigMismatch {
                expected: 0,
                found: 1
            })
        );
    }
}
