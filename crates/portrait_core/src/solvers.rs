use crate::traits::{AdaptiveSteppable, DynamicalSystem, StepReport};

const STAGES: usize = 13;

// Fehlberg 7(8) tableau (NASA TR R-287).
const C: [f64; STAGES] = [
    0.0,
    2.0 / 27.0,
    1.0 / 9.0,
    1.0 / 6.0,
    5.0 / 12.0,
    1.0 / 2.0,
    5.0 / 6.0,
    1.0 / 6.0,
    2.0 / 3.0,
    1.0 / 3.0,
    1.0,
    0.0,
    1.0,
];

const A: [[f64; 12]; STAGES] = [
    [0.0; 12],
    [2.0 / 27.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 36.0, 1.0 / 12.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 24.0, 0.0, 1.0 / 8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [5.0 / 12.0, 0.0, -25.0 / 16.0, 25.0 / 16.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 20.0, 0.0, 0.0, 1.0 / 4.0, 1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [
        -25.0 / 108.0,
        0.0,
        0.0,
        125.0 / 108.0,
        -65.0 / 27.0,
        125.0 / 54.0,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
    ],
    [
        31.0 / 300.0,
        0.0,
        0.0,
        0.0,
        61.0 / 225.0,
        -2.0 / 9.0,
        13.0 / 900.0,
        0.0,
        0.0,
        0.0,
        0.0,
        0.0,
    ],
    [
        2.0,
        0.0,
        0.0,
        -53.0 / 6.0,
        704.0 / 45.0,
        -107.0 / 9.0,
        67.0 / 90.0,
        3.0,
        0.0,
        0.0,
        0.0,
        0.0,
    ],
    [
        -91.0 / 108.0,
        0.0,
        0.0,
        23.0 / 108.0,
        -976.0 / 135.0,
        311.0 / 54.0,
        -19.0 / 60.0,
        17.0 / 6.0,
        -1.0 / 12.0,
        0.0,
        0.0,
        0.0,
    ],
    [
        2383.0 / 4100.0,
        0.0,
        0.0,
        -341.0 / 164.0,
        4496.0 / 1025.0,
        -301.0 / 82.0,
        2133.0 / 4100.0,
        45.0 / 82.0,
        45.0 / 164.0,
        18.0 / 41.0,
        0.0,
        0.0,
    ],
    [
        3.0 / 205.0,
        0.0,
        0.0,
        0.0,
        0.0,
        -6.0 / 41.0,
        -3.0 / 205.0,
        -3.0 / 41.0,
        3.0 / 41.0,
        6.0 / 41.0,
        0.0,
        0.0,
    ],
    [
        -1777.0 / 4100.0,
        0.0,
        0.0,
        -341.0 / 164.0,
        4496.0 / 1025.0,
        -289.0 / 82.0,
        2193.0 / 4100.0,
        51.0 / 82.0,
        33.0 / 164.0,
        12.0 / 41.0,
        0.0,
        1.0,
    ],
];

// 8th order weights; the embedded 7th order solution differs only in stages 0, 10, 11, 12.
const B8: [f64; STAGES] = [
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
    34.0 / 105.0,
    9.0 / 35.0,
    9.0 / 35.0,
    9.0 / 280.0,
    9.0 / 280.0,
    0.0,
    41.0 / 840.0,
    41.0 / 840.0,
];

const ERROR_WEIGHT: f64 = 41.0 / 840.0;
const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.1;
const MAX_FACTOR: f64 = 4.0;

/// Runge-Kutta-Fehlberg 7(8) adaptive stepper. Propagates the 8th order solution.
pub struct Rkf78 {
    k: Vec<Vec<f64>>,
    tmp: Vec<f64>,
    candidate: Vec<f64>,
}

impl Rkf78 {
    pub fn new(dim: usize) -> Self {
        Self {
            k: vec![vec![0.0; dim]; STAGES],
            tmp: vec![0.0; dim],
            candidate: vec![0.0; dim],
        }
    }

    /// Computes the stages for step `h` into `self.candidate` and returns the error estimate.
    fn attempt(&mut self, system: &impl DynamicalSystem<f64>, t0: f64, state: &[f64], h: f64) -> f64 {
        let dim = state.len();
        for stage in 0..STAGES {
            for i in 0..dim {
                let mut acc = 0.0;
                for (j, a) in A[stage].iter().enumerate().take(stage) {
                    if *a != 0.0 {
                        acc += a * self.k[j][i];
                    }
                }
                self.tmp[i] = state[i] + h * acc;
            }
            system.apply(t0 + C[stage] * h, &self.tmp, &mut self.k[stage]);
        }

        let mut error: f64 = 0.0;
        for i in 0..dim {
            let mut acc = 0.0;
            for (stage, b) in B8.iter().enumerate() {
                if *b != 0.0 {
                    acc += b * self.k[stage][i];
                }
            }
            self.candidate[i] = state[i] + h * acc;
            let diff = self.k[0][i] + self.k[10][i] - self.k[11][i] - self.k[12][i];
            // NaN must survive max()
            if diff.is_nan() {
                error = f64::NAN;
            } else if !error.is_nan() {
                error = error.max(diff.abs());
            }
        }
        h.abs() * ERROR_WEIGHT * error
    }
}

fn step_factor(tolerance: f64, error: f64) -> f64 {
    if error <= 0.0 {
        return MAX_FACTOR;
    }
    (SAFETY * (tolerance / error).powf(1.0 / 8.0)).clamp(MIN_FACTOR, MAX_FACTOR)
}

impl AdaptiveSteppable for Rkf78 {
    fn step_adaptive(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: &mut f64,
        state: &mut [f64],
        h: f64,
        h_min: f64,
        h_max: f64,
        tolerance: f64,
    ) -> StepReport {
        let sign = if h < 0.0 { -1.0 } else { 1.0 };
        let mut h_abs = h.abs().min(h_max).max(h_min);

        loop {
            let error = self.attempt(system, *t, state, sign * h_abs);
            if !error.is_finite() {
                if h_abs > h_min {
                    h_abs = (h_abs * MIN_FACTOR).max(h_min);
                    continue;
                }
            } else if error > tolerance && h_abs > h_min {
                h_abs = (h_abs * step_factor(tolerance, error)).max(h_min);
                continue;
            }

            state.copy_from_slice(&self.candidate);
            *t += sign * h_abs;
            let factor = if error.is_finite() {
                step_factor(tolerance, error)
            } else {
                MIN_FACTOR
            };
            let h_next = (h_abs * factor).min(h_max).max(h_min);
            return StepReport {
                h_used: sign * h_abs,
                h_next: sign * h_next,
                error,
            };
        }
    }
}
