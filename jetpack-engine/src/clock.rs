use std::fmt::Display;

use serde::{ Deserialize, Serialize };

/// Wall-clock timestamp in milliseconds, as reported by the input device
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WallTime(pub u64);

impl WallTime {
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn millis(self) -> u64 {
        self.0
    }

    /// Signed number of seconds from `earlier` to `self`
    pub fn seconds_since(self, earlier: WallTime) -> f64 {
        (self.0 as f64 - earlier.0 as f64) / 1000.
    }
}

impl Display for WallTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Affine mapping from wall-clock time to simulation time.
///
/// Changing the speed re-anchors the mapping at the moment of the change so
/// the simulation time stays continuous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    anchor_wall: WallTime,
    anchor_sim: f64,
    speed: f64,
}

impl Clock {
    pub fn new(anchor_wall: WallTime, anchor_sim: f64, speed: f64) -> Self {
        debug_assert!(speed > 0.);
        Self {
            anchor_wall,
            anchor_sim,
            speed,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn to_sim(&self, wall: WallTime) -> f64 {
        self.anchor_sim + wall.seconds_since(self.anchor_wall) * self.speed
    }

    /// Wall-clock time at which the simulation reaches `sim`, rounded down to
    /// the millisecond
    pub fn to_wall(&self, sim: f64) -> WallTime {
        let ms = self.anchor_wall.0 as f64 + (sim - self.anchor_sim) / self.speed * 1000.;
        WallTime(ms.max(0.).floor() as u64)
    }

    pub fn set_speed(&mut self, speed: f64, at: WallTime) {
        debug_assert!(speed > 0.);
        self.anchor_sim = self.to_sim(at);
        self.anchor_wall = at;
        self.speed = speed;
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(WallTime(0), 0., 1.)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mapping() {
        let clock = Clock::new(WallTime(1000), 2., 0.5);
        assert_relative_eq!(clock.to_sim(WallTime(1000)), 2.);
        assert_relative_eq!(clock.to_sim(WallTime(3000)), 3.);
        assert_eq!(clock.to_wall(3.), WallTime(3000));
    }

    #[test]
    fn test_speed_change_is_continuous() {
        let mut clock = Clock::default();
        let before = clock.to_sim(WallTime(500));
        clock.set_speed(4., WallTime(500));
        assert_relative_eq!(clock.to_sim(WallTime(500)), before);
        assert_relative_eq!(clock.to_sim(WallTime(750)), 0.5 + 1.);
    }
}
