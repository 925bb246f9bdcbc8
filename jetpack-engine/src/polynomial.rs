use smallvec::SmallVec;

pub const MAX_DEGREE: usize = 2;

/// Leading coefficients smaller than this, relative to the biggest
/// coefficient, are dropped
const RELATIVE_ZERO: f64 = 1e-12;

pub type Roots = SmallVec<f64, MAX_DEGREE>;

/// Real polynomial of degree at most 2, coefficients stored from the
/// constant term upward
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polynomial {
    coeffs: [f64; MAX_DEGREE + 1],
    degree: usize,
}

impl Polynomial {
    /// Builds a polynomial from its coefficients, constant term first.
    /// Negligible leading coefficients are trimmed.
    pub fn new(coeffs: &[f64]) -> Self {
        assert!(coeffs.len() <= MAX_DEGREE + 1, "Polynomial degree above {MAX_DEGREE}");

        let mut stored = [0.; MAX_DEGREE + 1];
        stored[..coeffs.len()].copy_from_slice(coeffs);

        let scale = coeffs.iter().fold(0., |acc: f64, c| acc.max(c.abs()));
        let mut degree = coeffs.len().saturating_sub(1);
        while degree > 0 && stored[degree].abs() <= scale * RELATIVE_ZERO {
            stored[degree] = 0.;
            degree -= 1;
        }

        Self { coeffs: stored, degree }
    }

    pub fn quadratic(c0: f64, c1: f64, c2: f64) -> Self {
        Self::new(&[c0, c1, c2])
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs[..=self.degree]
    }

    /// Whether the polynomial is zero everywhere
    pub fn is_identically_zero(&self) -> bool {
        self.degree == 0 && self.coeffs[0] == 0.
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs().iter().rev().fold(0., |acc, &c| acc * x + c)
    }

    pub fn derivative(&self) -> Self {
        let mut coeffs = [0.; MAX_DEGREE];
        for i in 1..=self.degree {
            coeffs[i - 1] = self.coeffs[i] * i as f64;
        }
        Self::new(&coeffs[..self.degree.max(1)])
    }

    /// Real roots within `lo..=hi`, sorted and without duplicates.
    ///
    /// A polynomial that is identically zero has no isolated root and returns
    /// an empty set. Double roots (tangency) are reported once.
    pub fn roots_in(&self, lo: f64, hi: f64) -> Roots {
        let mut candidates = Roots::new();
        if lo > hi || self.degree == 0 {
            return candidates;
        }

        if self.degree == 1 {
            candidates.push(-self.coeffs[0] / self.coeffs[1]);
        } else {
            self.quadratic_roots(&mut candidates);
        }
        candidates.sort_by(f64::total_cmp);

        let mut roots = Roots::new();
        for root in candidates {
            if !root.is_finite() || root < lo || root > hi {
                continue;
            }
            let duplicate = roots.last()
                .is_some_and(|&last: &f64| (root - last).abs() <= RELATIVE_ZERO * root.abs().max(1.));
            if !duplicate {
                roots.push(root);
            }
        }
        roots
    }

    fn quadratic_roots(&self, roots: &mut Roots) {
        let [c, b, a, ..] = self.coeffs;
        let disc = b * b - 4. * a * c;

        if disc < 0. {
            // Tangent within rounding: treat it as a double root
            if -disc <= RELATIVE_ZERO * (b * b).max((4. * a * c).abs()) {
                roots.push(-b / (2. * a));
            }
            return;
        }

        // Avoids the cancellation of the textbook formula
        let q = -0.5 * (b + b.signum() * disc.sqrt());
        if q == 0. {
            roots.push(0.);
            return;
        }
        roots.push(q / a);
        roots.push(c / q);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_roots(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} != {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert_relative_eq!(a, e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_trim_degree() {
        let p = Polynomial::new(&[1., 2., 1e-20]);
        assert_eq!(p.degree(), 1);
        assert!(Polynomial::new(&[0., 0., 0.]).is_identically_zero());
        assert!(!Polynomial::new(&[1.]).is_identically_zero());
    }

    #[test]
    fn test_linear_and_constant() {
        assert_roots(&Polynomial::new(&[-2., 4.]).roots_in(f64::NEG_INFINITY, f64::INFINITY), &[0.5]);
        assert!(Polynomial::new(&[3.]).roots_in(-10., 10.).is_empty());
        assert!(Polynomial::new(&[0.]).roots_in(-10., 10.).is_empty());
    }

    #[test]
    fn test_quadratic() {
        // (t - 1)(t - 3)
        let p = Polynomial::quadratic(3., -4., 1.);
        assert_roots(&p.roots_in(f64::NEG_INFINITY, f64::INFINITY), &[1., 3.]);
        assert_roots(&p.roots_in(2., 10.), &[3.]);
        assert!(Polynomial::quadratic(1., 0., 1.).roots_in(-10., 10.).is_empty());
        // Double root
        assert_roots(&Polynomial::quadratic(1., -2., 1.).roots_in(-10., 10.), &[1.]);
    }

    #[test]
    #[should_panic]
    fn test_rejects_cubic() {
        Polynomial::new(&[1., 2., 3., 4.]);
    }

    #[test]
    fn test_quadratic_cancellation() {
        // Roots 1e-8 and 1e8
        let p = Polynomial::quadratic(1., -(1e8 + 1e-8), 1.);
        let roots = p.roots_in(0., f64::INFINITY);
        assert_eq!(roots.len(), 2);
        assert_relative_eq!(roots[0], 1e-8, max_relative = 1e-9);
        assert_relative_eq!(roots[1], 1e8, max_relative = 1e-9);
    }

    #[test]
    fn test_derivative() {
        let p = Polynomial::quadratic(1., 2., 3.);
        assert_eq!(p.derivative().coeffs(), &[2., 6.]);
        assert_eq!(Polynomial::new(&[5.]).derivative().coeffs(), &[0.]);
    }
}
