//! Chart-crossing orbit and separatrix tracer.
//!
//! Every step is taken in the local coordinates of the chart owning the current
//! point, with the vector field governing that point. The result is mapped back
//! onto the sphere, reflected through the line at infinity when it landed in the
//! wrong half of its chart, and forwarded to a [`PlotSink`].

use crate::charts::SpherePoint;
use crate::solvers::Rkf78;
use crate::study::{OrbitType, SeparatrixSeries, Singularity, StudyContext};
use crate::traits::AdaptiveSteppable;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

const SERIES_BISECT_ITERS: usize = 100;
const SERIES_EXIT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitColor {
    Orbit,
    Stable,
    Unstable,
    CenterStable,
    CenterUnstable,
    /// Separating curves and sampled zero sets.
    Curve,
}

impl From<OrbitType> for OrbitColor {
    fn from(kind: OrbitType) -> Self {
        match kind {
            OrbitType::Orbit => OrbitColor::Orbit,
            OrbitType::Stable => OrbitColor::Stable,
            OrbitType::Unstable => OrbitColor::Unstable,
            OrbitType::CenterStable => OrbitColor::CenterStable,
            OrbitType::CenterUnstable => OrbitColor::CenterUnstable,
        }
    }
}

/// An accepted point of an orbit or separatrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitPoint {
    pub pcoord: SpherePoint,
    pub color: OrbitColor,
    /// Drawn as a segment from the previous point; `false` marks a discontinuity.
    pub dashes: bool,
    pub dir: f64,
    pub kind: OrbitType,
}

/// Receiver of computed points. Coordinates are sphere coordinates.
pub trait PlotSink {
    fn plot_line(&mut self, from: &SpherePoint, to: &SpherePoint, color: OrbitColor);
    fn plot_point(&mut self, at: &SpherePoint, color: OrbitColor);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlot;

impl PlotSink for NullPlot {
    fn plot_line(&mut self, _from: &SpherePoint, _to: &SpherePoint, _color: OrbitColor) {}
    fn plot_point(&mut self, _at: &SpherePoint, _color: OrbitColor) {}
}

/// Keeps every call, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingPlot {
    pub lines: Vec<(SpherePoint, SpherePoint, OrbitColor)>,
    pub points: Vec<(SpherePoint, OrbitColor)>,
}

impl PlotSink for RecordingPlot {
    fn plot_line(&mut self, from: &SpherePoint, to: &SpherePoint, color: OrbitColor) {
        self.lines.push((*from, *to, color));
    }

    fn plot_point(&mut self, at: &SpherePoint, color: OrbitColor) {
        self.points.push((*at, color));
    }
}

/// Cancellation check for single-shot computations.
pub fn never_cancel() -> bool {
    false
}

/// Forwards `point` to the sink, as a segment when it continues `previous`.
pub fn emit_point(sink: &mut dyn PlotSink, previous: Option<&SpherePoint>, point: &OrbitPoint) {
    match previous {
        Some(prev) if point.dashes => sink.plot_line(prev, &point.pcoord, point.color),
        _ => sink.plot_point(&point.pcoord, point.color),
    }
}

/// Where a trace stands between steps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracerState {
    pub pcoord: SpherePoint,
    /// Signed step proposed for the next step.
    pub h: f64,
    /// Time direction relative to the original flow.
    pub dir: f64,
    pub kind: OrbitType,
}

impl TracerState {
    pub fn new(pcoord: SpherePoint, kind: OrbitType, dir: f64, step: f64) -> Self {
        let dir = if dir < 0.0 { -1.0 } else { 1.0 };
        Self {
            pcoord,
            h: dir * step.abs(),
            dir,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Completed,
    Cancelled,
    /// The trace reached a point governed by no vector field.
    LeftDomain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationBatch {
    pub points: Vec<OrbitPoint>,
    pub stop: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub point: OrbitPoint,
    /// Halvings spent reconciling the post-step vector field.
    pub retries: usize,
}

/// Display color of a point: the type's color where the GCF is non-negative,
/// the color of the inverted type elsewhere.
pub fn point_color(
    ctx: &StudyContext<'_>,
    field_index: usize,
    pcoord: &SpherePoint,
    kind: OrbitType,
) -> OrbitColor {
    if kind == OrbitType::Orbit {
        return OrbitColor::Orbit;
    }
    let gcf = ctx
        .fields
        .get(field_index)
        .and_then(|field| field.gcf.evaluate_on_sphere(&ctx.charts, pcoord))
        .unwrap_or(0.0);
    if gcf < 0.0 {
        kind.inverted().into()
    } else {
        kind.into()
    }
}

/// Takes one accepted step. Returns `None` when the current point is governed by
/// no vector field or the step produced an unusable point.
pub fn integrate_step(
    ctx: &StudyContext<'_>,
    solver: &mut Rkf78,
    state: &mut TracerState,
) -> Option<StepOutcome> {
    let config = ctx.config;
    let pre = ctx.field_at(&state.pcoord)?;
    let field = &ctx.fields[pre];
    let chart = ctx.charts.select_chart(&state.pcoord);
    let local = ctx.charts.to_chart(chart, &state.pcoord)?;
    let system = field.chart_field(chart);

    let mut h = state.h;
    let mut h_min = config.h_min;
    let mut h_max = config.h_max;
    let mut retries = 0;
    let (report, landing) = loop {
        let mut t = 0.0;
        let mut y = local;
        let report = solver.step_adaptive(
            &system,
            &mut t,
            &mut y,
            h,
            h_min,
            h_max,
            config.tolerance,
        );
        let landing = ctx
            .charts
            .land(chart, y)
            .filter(|landing| landing.pcoord.iter().all(|c| c.is_finite()))?;
        if ctx.field_at(&landing.pcoord) == Some(pre) {
            break (report, landing);
        }
        if report.h_used.abs() <= config.branch_h_min || retries >= config.branch_retries {
            debug!(
                "accepting step of {:e} after {} retries without reconciling field {}",
                report.h_used, retries, pre
            );
            break (report, landing);
        }
        h = 0.5 * report.h_used;
        h_max = h.abs();
        h_min = config.branch_h_min;
        retries += 1;
    };

    let mut h_next = report.h_next;
    if landing.crossed_infinity {
        debug!("crossed the line at infinity: {:?} -> {:?}", chart, landing.chart);
        if field.reverses_at_infinity() {
            h_next = -h_next;
            state.dir = -state.dir;
            state.kind = state.kind.inverted();
        }
    }
    state.pcoord = landing.pcoord;
    state.h = h_next;

    let color_field = ctx.field_at(&landing.pcoord).unwrap_or(pre);
    Some(StepOutcome {
        point: OrbitPoint {
            pcoord: landing.pcoord,
            color: point_color(ctx, color_field, &landing.pcoord, state.kind),
            dashes: !landing.crossed_infinity,
            dir: state.dir,
            kind: state.kind,
        },
        retries,
    })
}

/// Integrates up to `count` points from `state`, forwarding each to `sink`.
/// `previous` is the last point already drawn for this trace.
pub fn integrate_batch(
    ctx: &StudyContext<'_>,
    state: &mut TracerState,
    count: usize,
    previous: Option<SpherePoint>,
    sink: &mut dyn PlotSink,
    cancel: &dyn Fn() -> bool,
) -> IntegrationBatch {
    let mut solver = Rkf78::new(2);
    let mut points = Vec::with_capacity(count);
    let mut last = previous;
    for _ in 0..count {
        if cancel() {
            return IntegrationBatch {
                points,
                stop: StopReason::Cancelled,
            };
        }
        let Some(outcome) = integrate_step(ctx, &mut solver, state) else {
            warn!("trace left every vector field region near {:?}", state.pcoord);
            return IntegrationBatch {
                points,
                stop: StopReason::LeftDomain,
            };
        };
        emit_point(sink, last.as_ref(), &outcome.point);
        last = Some(outcome.point.pcoord);
        points.push(outcome.point);
    }
    IntegrationBatch {
        points,
        stop: StopReason::Completed,
    }
}

/// Series parameter `t > 0` at which the local point `series(d * t)` has norm within 1% of `epsilon`.
pub fn series_exit_parameter(series: &SeparatrixSeries, d: f64, epsilon: f64) -> f64 {
    let norm = |t: f64| {
        let [a, b] = series.local_point(d * t);
        a.hypot(b)
    };
    // The local norm is at least |t|, so [0, epsilon] brackets the exit.
    let (mut lo, mut hi) = (0.0, epsilon);
    for _ in 0..SERIES_BISECT_ITERS {
        let mid = 0.5 * (lo + hi);
        let value = norm(mid);
        if (value - epsilon).abs() <= SERIES_EXIT_TOLERANCE * epsilon {
            return mid;
        }
        if value < epsilon {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Points taken from a separatrix series and the state to continue from.
#[derive(Debug, Clone, PartialEq)]
pub struct SeparatrixStart {
    pub points: Vec<OrbitPoint>,
    pub state: TracerState,
}

/// Emits the series part of a separatrix of `singularity` (a singularity of
/// field `field_index`) up to the epsilon ball and prepares the tracer.
pub fn start_separatrix(
    ctx: &StudyContext<'_>,
    field_index: usize,
    singularity: &Singularity,
    series: &SeparatrixSeries,
    sink: &mut dyn PlotSink,
) -> Option<SeparatrixStart> {
    let config = ctx.config;
    let field = ctx.fields.get(field_index)?;
    let epsilon = if series.epsilon > 0.0 {
        series.epsilon
    } else {
        config.sep_epsilon
    };
    let d = if series.direction < 0.0 { -1.0 } else { 1.0 };
    let t_exit = series_exit_parameter(series, d, epsilon);
    let count = config.sep_start_points.max(1);

    let mut points: Vec<OrbitPoint> = Vec::with_capacity(count);
    let mut crossed = false;
    for i in 0..count {
        let fraction = if count == 1 {
            1.0
        } else {
            i as f64 / (count - 1) as f64
        };
        let t = d * t_exit * fraction;
        let landing = ctx
            .charts
            .land(singularity.chart, series.chart_point(singularity.position, t))?;
        let joined = i > 0 && landing.crossed_infinity == crossed;
        crossed = landing.crossed_infinity;
        let flipped = crossed && field.reverses_at_infinity();
        let kind = if flipped {
            series.kind.inverted()
        } else {
            series.kind
        };
        let dir = if flipped {
            -series.kind.integration_dir()
        } else {
            series.kind.integration_dir()
        };
        let point = OrbitPoint {
            pcoord: landing.pcoord,
            color: point_color(ctx, field_index, &landing.pcoord, kind),
            dashes: joined,
            dir,
            kind,
        };
        emit_point(sink, points.last().map(|p| &p.pcoord), &point);
        points.push(point);
    }

    let last = points.last()?;
    if crossed {
        debug!("separatrix series starts across the line at infinity");
    }
    let state = TracerState::new(last.pcoord, last.kind, last.dir, config.step);
    Some(SeparatrixStart { points, state })
}
