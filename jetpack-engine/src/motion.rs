use glam::DVec2;

/// Uniformly accelerated motion, valid from `epoch` onward.
///
/// A state is never mutated: any discontinuity builds a new one through
/// [`MotionState::extrapolate_to`] followed by one of the `with_*` methods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    pub epoch: f64,
    pub position: DVec2,
    pub velocity: DVec2,
    pub acceleration: DVec2,
}

impl MotionState {
    pub fn new(epoch: f64, position: DVec2, velocity: DVec2, acceleration: DVec2) -> Self {
        Self {
            epoch,
            position,
            velocity,
            acceleration,
        }
    }

    pub fn at_rest(epoch: f64, position: DVec2) -> Self {
        Self::new(epoch, position, DVec2::ZERO, DVec2::ZERO)
    }

    pub fn position_at(&self, t: f64) -> DVec2 {
        let dt = t - self.epoch;
        self.position + self.velocity * dt + 0.5 * self.acceleration * dt * dt
    }

    pub fn velocity_at(&self, t: f64) -> DVec2 {
        self.velocity + self.acceleration * (t - self.epoch)
    }

    pub fn is_static(&self) -> bool {
        self.velocity == DVec2::ZERO && self.acceleration == DVec2::ZERO
    }

    /// Same trajectory, re-expressed from a later epoch
    pub fn extrapolate_to(&self, t: f64) -> Self {
        assert!(t >= self.epoch, "Motion epoch cannot move backward ({t} < {})", self.epoch);
        Self {
            epoch: t,
            position: self.position_at(t),
            velocity: self.velocity_at(t),
            acceleration: self.acceleration,
        }
    }

    pub fn with_position(self, position: DVec2) -> Self {
        Self { position, ..self }
    }

    pub fn with_velocity(self, velocity: DVec2) -> Self {
        Self { velocity, ..self }
    }

    pub fn with_acceleration(self, acceleration: DVec2) -> Self {
        Self { acceleration, ..self }
    }

    /// Motion of `self` as seen from an observer following `other`, both
    /// expressed from `epoch`
    pub fn relative_to(&self, other: &MotionState, epoch: f64) -> Self {
        let this = self.extrapolate_to(epoch);
        let other = other.extrapolate_to(epoch);
        Self {
            epoch,
            position: this.position - other.position,
            velocity: this.velocity - other.velocity,
            acceleration: this.acceleration - other.acceleration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_position_formula() {
        let state = MotionState::new(1., DVec2::new(0., 10.), DVec2::new(2., 0.), DVec2::new(0., -10.));
        let pos = state.position_at(3.);
        assert_relative_eq!(pos.x, 4.);
        assert_relative_eq!(pos.y, 10. - 0.5 * 10. * 4.);
        assert_eq!(state.velocity_at(3.), DVec2::new(2., -20.));
    }

    #[test]
    fn test_extrapolate_keeps_trajectory() {
        let state = MotionState::new(0., DVec2::ZERO, DVec2::new(1., 3.), DVec2::new(0., -2.));
        let later = state.extrapolate_to(1.5);
        assert_eq!(later.epoch, 1.5);
        for t in [1.5, 2., 4.25] {
            assert_relative_eq!(later.position_at(t).x, state.position_at(t).x, epsilon = 1e-12);
            assert_relative_eq!(later.position_at(t).y, state.position_at(t).y, epsilon = 1e-12);
        }
    }

    #[test]
    #[should_panic]
    fn test_epoch_never_moves_backward() {
        MotionState::at_rest(2., DVec2::ZERO).extrapolate_to(1.);
    }

    #[test]
    fn test_relative_motion() {
        let a = MotionState::new(0., DVec2::new(1., 1.), DVec2::X, DVec2::ZERO);
        let b = MotionState::new(1., DVec2::ZERO, DVec2::ZERO, DVec2::new(0., -1.));
        let rel = a.relative_to(&b, 2.);
        assert_eq!(rel.epoch, 2.);
        assert_eq!(rel.position, a.position_at(2.) - b.position_at(2.));
        assert_eq!(rel.velocity, DVec2::new(1., 1.));
        assert_eq!(rel.acceleration, DVec2::new(0., 1.));
    }
}
