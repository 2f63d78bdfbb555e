use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// A point on the complex plane, stored as two `f64` components.
///
/// Only the handful of operations the escape-time loop and the view
/// transform need are provided.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const ZERO: Self = Self { re: 0.0, im: 0.0 };

    #[inline]
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// `re² + im²`, compared against the squared escape radius.
    #[inline]
    pub fn norm_sq(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    /// One step of the quadratic map: `self² + c`.
    #[inline]
    pub fn square_add(self, c: Self) -> Self {
        Self {
            re: self.re * self.re - self.im * self.im + c.re,
            im: 2.0 * self.re * self.im + c.im,
        }
    }
}

impl Add for Complex {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl std::fmt::Display for Complex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.im >= 0.0 {
            write!(f, "{} + {}i", self.re, self.im)
        } else {
            write!(f, "{} - {}i", self.re, -self.im)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn square_add_matches_expansion() {
        // (1 + i)² + (0.5 - 0.5i) = 2i + 0.5 - 0.5i = 0.5 + 1.5i
        let z = Complex::new(1.0, 1.0).square_add(Complex::new(0.5, -0.5));
        assert!((z.re - 0.5).abs() < EPSILON);
        assert!((z.im - 1.5).abs() < EPSILON);
    }

    #[test]
    fn norm_sq() {
        assert!((Complex::new(3.0, 4.0).norm_sq() - 25.0).abs() < EPSILON);
    }

    #[test]
    fn add_and_sub() {
        let a = Complex::new(5.0, 3.0);
        let b = Complex::new(2.0, 1.0);
        assert_eq!(a + b, Complex::new(7.0, 4.0));
        assert_eq!(a - b, Complex::new(3.0, 2.0));
    }

    #[test]
    fn display_sign() {
        assert_eq!(Complex::new(-0.7, 0.0).to_string(), "-0.7 + 0i");
        assert_eq!(Complex::new(1.0, -2.0).to_string(), "1 - 2i");
    }
}
