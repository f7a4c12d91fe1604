use crate::charts::{ChartSystem, ViewMap, ViewMode, ViewWindow};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Global numeric configuration shared by every operation of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Poincaré-Lyapunov weights; `(1, 1)` selects the Poincaré sphere.
    pub p: u32,
    pub q: u32,
    /// Initial integration step.
    pub step: f64,
    pub h_min: f64,
    pub h_max: f64,
    pub tolerance: f64,
    /// Minimum step while retrying a step that left its vector field's region.
    pub branch_h_min: f64,
    /// Halvings allowed per retried step.
    pub branch_retries: usize,
    /// Accepted points per integration batch.
    pub points_to_int: usize,
    pub sep_start_points: usize,
    /// Start-up radius used when a separatrix gives a non-positive epsilon.
    pub sep_epsilon: f64,
    pub region_epsilon: f64,
    pub coincidence_tolerance: f64,
    /// Samples per axis when tracing zero sets.
    pub curve_grid: usize,
    pub view: ViewMode,
    pub plane_window: ViewWindow,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            p: 1,
            q: 1,
            step: 0.01,
            h_min: 1e-6,
            h_max: 0.1,
            tolerance: 1e-8,
            branch_h_min: 1e-9,
            branch_retries: 64,
            points_to_int: 500,
            sep_start_points: 100,
            sep_epsilon: 0.01,
            region_epsilon: 1e-8,
            coincidence_tolerance: 1e-8,
            curve_grid: 201,
            view: ViewMode::Sphere,
            plane_window: ViewWindow::square(1.0),
        }
    }
}

impl StudyConfig {
    pub fn validate(&self) -> Result<()> {
        let charts = ChartSystem::new(self.p, self.q)?;
        for (name, value) in [
            ("step", self.step),
            ("h_min", self.h_min),
            ("h_max", self.h_max),
            ("tolerance", self.tolerance),
            ("branch_h_min", self.branch_h_min),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("{} must be a positive finite number (got {}).", name, value);
            }
        }
        if self.h_min > self.h_max {
            bail!(
                "h_min ({}) must not exceed h_max ({}).",
                self.h_min,
                self.h_max
            );
        }
        if self.branch_h_min > self.h_min {
            bail!(
                "branch_h_min ({}) must not exceed h_min ({}).",
                self.branch_h_min,
                self.h_min
            );
        }
        if !(self.region_epsilon >= 0.0 && self.coincidence_tolerance >= 0.0) {
            bail!("Region and coincidence tolerances must be non-negative.");
        }
        if !(self.sep_epsilon.is_finite() && self.sep_epsilon > 0.0) {
            bail!("sep_epsilon must be positive (got {}).", self.sep_epsilon);
        }
        if self.points_to_int == 0 {
            bail!("points_to_int must be at least 1.");
        }
        if self.curve_grid < 2 {
            bail!("curve_grid must be at least 2 (got {}).", self.curve_grid);
        }
        if !self.plane_window.is_valid() {
            bail!("plane_window is empty or not finite: {:?}", self.plane_window);
        }
        ViewMap::new(charts, self.view)?;
        Ok(())
    }

    pub fn chart_system(&self) -> Result<ChartSystem> {
        ChartSystem::new(self.p, self.q)
    }

    pub fn view_map(&self) -> Result<ViewMap> {
        ViewMap::new(self.chart_system()?, self.view)
    }

    pub fn view_window(&self) -> Result<ViewWindow> {
        Ok(self.view_map()?.default_window(self.plane_window))
    }
}
