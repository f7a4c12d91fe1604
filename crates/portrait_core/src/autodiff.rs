use crate::traits::{DynamicalSystem, Scalar};
use num_traits::{One, Zero};
use std::ops::{Add, Mul, Neg, Sub};

/// Dual number for forward-mode differentiation of polynomial fields.
/// val: real part
/// eps: infinitesimal part (directional derivative)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// The `j`-th coordinate of `x` seeded with a unit infinitesimal.
    fn seeded(x: &[f64], j: usize) -> Vec<Self> {
        x.iter()
            .enumerate()
            .map(|(i, &v)| Self::new(v, if i == j { 1.0 } else { 0.0 }))
            .collect()
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Scalar for Dual {
    fn from_f64(value: f64) -> Self {
        Self::new(value, 0.0)
    }

    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::one();
        }
        // n x^(n-1) is finite at x = 0 for n >= 1
        Self::new(self.val.powi(n), f64::from(n) * self.val.powi(n - 1) * self.eps)
    }

    fn cos(self) -> Self {
        Self::new(self.val.cos(), -self.eps * self.val.sin())
    }

    fn sin(self) -> Self {
        Self::new(self.val.sin(), self.eps * self.val.cos())
    }
}

/// Jacobian of a system at `x`, row-major.
/// Column `j` comes from one evaluation with the `j`-th coordinate seeded.
pub fn jacobian<S: DynamicalSystem<Dual>>(system: &S, x: &[f64]) -> Vec<f64> {
    let n = system.dimension();
    let mut jac = vec![0.0; n * n];
    let mut dual_out = vec![Dual::zero(); n];

    for j in 0..n {
        system.apply(Dual::zero(), &Dual::seeded(x, j), &mut dual_out);
        for (i, out) in dual_out.iter().enumerate() {
            jac[i * n + j] = out.eps;
        }
    }
    jac
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample;

    impl DynamicalSystem<Dual> for Sample {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: Dual, x: &[Dual], out: &mut [Dual]) {
            // (x^2 y, sin(y))
            out[0] = x[0].powi(2) * x[1];
            out[1] = x[1].sin();
        }
    }

    #[test]
    fn jacobian_matches_analytic_derivatives() {
        let jac = jacobian(&Sample, &[2.0, 0.5]);
        assert!((jac[0] - 2.0).abs() < 1e-12, "d(x^2 y)/dx = 2xy");
        assert!((jac[1] - 4.0).abs() < 1e-12, "d(x^2 y)/dy = x^2");
        assert!(jac[2].abs() < 1e-12);
        assert!((jac[3] - 0.5f64.cos()).abs() < 1e-12);
    }

    #[test]
    fn powers_at_zero_stay_finite() {
        let x = Dual::new(0.0, 1.0);
        assert_eq!(x.powi(0), Dual::new(1.0, 0.0));
        assert_eq!(x.powi(1), Dual::new(0.0, 1.0));
        assert_eq!(x.powi(3), Dual::new(0.0, 0.0));
    }

    #[test]
    fn unit_circle_derivatives() {
        let theta = Dual::new(0.3, 1.0);
        let (c, s) = (theta.cos(), theta.sin());
        assert!((c.eps + 0.3f64.sin()).abs() < 1e-15);
        assert!((s.eps - 0.3f64.cos()).abs() < 1e-15);
    }
}
