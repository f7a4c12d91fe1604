//! Sparse multivariate polynomials as produced by the symbolic package.
//!
//! A polynomial is an owned list of non-zero terms `coeff * v_1^e_1 * ... * v_N^e_N`.
//! Three arities are used:
//! - `N = 1`: series in one variable `t` (separatrix parametrizations),
//! - `N = 2`: polynomials in `(x, y)` or chart coordinates `(z1, z2)`,
//! - `N = 3`: polynomials in `(r, cos θ, sin θ)` on the cylindrical chart.

use crate::error::StudyError;
use crate::traits::Scalar;
use serde::{Deserialize, Serialize};

const MAX_EXPONENT: i64 = i32::MAX as i64;

/// A single monomial with `N` exponents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Term<const N: usize> {
    coeff: f64,
    #[serde(with = "exponent_array")]
    exponents: [u32; N],
}

pub type Term1 = Term<1>;
pub type Term2 = Term<2>;
pub type Term3 = Term<3>;

impl<const N: usize> Term<N> {
    /// Builds a term from signed exponents as they appear in a table stream.
    pub fn new(coeff: f64, exponents: [i64; N]) -> Result<Self, StudyError> {
        let mut checked = [0u32; N];
        for (slot, &e) in checked.iter_mut().zip(exponents.iter()) {
            if e < 0 {
                return Err(StudyError::NegativeExponent(e));
            }
            if e > MAX_EXPONENT {
                return Err(StudyError::ExponentTooLarge(e));
            }
            *slot = e as u32;
        }
        Ok(Self {
            coeff,
            exponents: checked,
        })
    }

    pub fn coeff(&self) -> f64 {
        self.coeff
    }

    pub fn exponents(&self) -> &[u32; N] {
        &self.exponents
    }

    pub fn degree(&self) -> u32 {
        self.exponents.iter().sum()
    }

    /// `coeff * prod v_i^e_i`. A zero exponent contributes 1 even when `v_i = 0`.
    pub fn evaluate<T: Scalar>(&self, vars: &[T; N]) -> T {
        let mut value = T::from_f64(self.coeff);
        for (v, &e) in vars.iter().zip(self.exponents.iter()) {
            if e != 0 {
                value = value * v.powi(e as i32);
            }
        }
        value
    }
}

/// Ordered list of non-zero terms. The empty list is the zero polynomial.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polynomial<const N: usize> {
    terms: Vec<Term<N>>,
}

pub type Polynomial1 = Polynomial<1>;
pub type Polynomial2 = Polynomial<2>;
pub type Polynomial3 = Polynomial<3>;

impl<const N: usize> Polynomial<N> {
    pub fn zero() -> Self {
        Self { terms: Vec::new() }
    }

    /// Keeps the terms in the given order, discarding zero coefficients.
    pub fn new(terms: Vec<Term<N>>) -> Self {
        Self {
            terms: terms.into_iter().filter(|t| t.coeff != 0.0).collect(),
        }
    }

    /// Convenience constructor from `(coeff, exponents)` pairs.
    pub fn from_terms(terms: &[(f64, [i64; N])]) -> Result<Self, StudyError> {
        let built = terms
            .iter()
            .map(|&(coeff, exps)| Term::new(coeff, exps))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(built))
    }

    pub fn terms(&self) -> &[Term<N>] {
        &self.terms
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Highest total degree, 0 for the zero polynomial.
    pub fn degree(&self) -> u32 {
        self.terms.iter().map(Term::degree).max().unwrap_or(0)
    }

    pub fn evaluate<T: Scalar>(&self, vars: &[T; N]) -> T {
        self.terms
            .iter()
            .fold(T::zero(), |acc, term| acc + term.evaluate(vars))
    }
}

impl Polynomial3 {
    /// Evaluates at cylindrical coordinates `(r, θ)`.
    pub fn evaluate_cylindrical<T: Scalar>(&self, r: T, theta: T) -> T {
        self.evaluate(&[r, theta.cos(), theta.sin()])
    }
}

impl Polynomial1 {
    pub fn evaluate_at<T: Scalar>(&self, t: T) -> T {
        self.evaluate(&[t])
    }
}

// serde does not derive for const-generic arrays; exponents go through a Vec.
mod exponent_array {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        value: &[u32; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u32; N], D::Error> {
        let values = Vec::<u32>::deserialize(deserializer)?;
        let len = values.len();
        values
            .try_into()
            .map_err(|_| D::Error::custom(format!("expected {N} exponents, got {len}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Dual;

    fn sample() -> Polynomial2 {
        // 2x^2y - 3y + 1
        Polynomial2::from_terms(&[(2.0, [2, 1]), (-3.0, [0, 1]), (1.0, [0, 0])])
            .expect("valid terms")
    }

    #[test]
    fn evaluates_literal_polynomial() {
        let value: f64 = sample().evaluate(&[2.0, 3.0]);
        assert_eq!(value, 16.0);
    }

    #[test]
    fn empty_polynomial_is_zero() {
        let p = Polynomial2::zero();
        assert!(p.is_zero());
        assert_eq!(p.evaluate(&[5.0, -1.0]), 0.0);
        assert_eq!(p.degree(), 0);
    }

    #[test]
    fn zero_exponent_on_zero_variable_is_one() {
        let p = Polynomial2::from_terms(&[(4.0, [0, 2])]).expect("valid terms");
        assert_eq!(p.evaluate(&[0.0, 1.5]), 9.0);
        let constant = Polynomial2::from_terms(&[(7.0, [0, 0])]).expect("valid terms");
        assert_eq!(constant.evaluate(&[0.0, 0.0]), 7.0);
    }

    #[test]
    fn negative_exponent_is_rejected() {
        let err = Term2::new(1.0, [1, -2]).expect_err("negative exponent must fail");
        assert_eq!(err, StudyError::NegativeExponent(-2));
        assert!(Polynomial3::from_terms(&[(1.0, [0, -1, 0])]).is_err());
    }

    #[test]
    fn zero_coefficients_are_dropped() {
        let p = Polynomial2::from_terms(&[(0.0, [3, 0]), (1.0, [1, 0])]).expect("valid terms");
        assert_eq!(p.terms().len(), 1);
        assert_eq!(p.degree(), 1);
    }

    #[test]
    fn cylindrical_evaluation_uses_cos_and_sin() {
        // r^2 cos(θ) - sin(θ)^2
        let p = Polynomial3::from_terms(&[(1.0, [2, 1, 0]), (-1.0, [0, 0, 2])])
            .expect("valid terms");
        let theta: f64 = 0.7;
        let expected = 0.25 * theta.cos() - theta.sin().powi(2);
        assert!((p.evaluate_cylindrical(0.5, theta) - expected).abs() < 1e-14);
    }

    #[test]
    fn dual_evaluation_gives_partial_derivative() {
        // d/dx (2x^2y - 3y + 1) = 4xy = 24 at (2, 3)
        let value = sample().evaluate(&[Dual::new(2.0, 1.0), Dual::new(3.0, 0.0)]);
        assert_eq!(value.val, 16.0);
        assert_eq!(value.eps, 24.0);
    }
}
