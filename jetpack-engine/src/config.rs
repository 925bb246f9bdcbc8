use serde::{ Deserialize, Serialize };

use crate::{ EngineError, Result };

/// Named options recognised by the engine.
///
/// Every field has a default so a partial JSON document is enough to build a
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global restitution multiplier, 0 is sticky and 1 keeps the objects'
    /// own bounciness untouched
    pub bounciness: f64,
    /// Global multiplier applied to the objects' friction coefficients
    pub friction: f64,
    /// Simulation seconds elapsed per wall-clock second
    pub speed: f64,
    /// Event-time tolerance in simulation seconds
    pub epsilon: f64,
    /// Maximum look-ahead of a prediction, unbounded when `None`
    pub horizon: Option<f64>,
    /// Consecutive zero-advance pops tolerated before a pair is snapped to
    /// resting contact
    pub stagnation_limit: u32,
    /// A bounce predicted to come back sooner than this is snapped to resting
    /// contact instead
    pub resting_threshold: f64,
    /// Compute an object's predictions against the rest of the world on the
    /// rayon pool
    pub parallel_prediction: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bounciness: 1.,
            friction: 1.,
            speed: 1.,
            epsilon: 1e-9,
            horizon: None,
            stagnation_limit: 16,
            resting_threshold: 0.05,
            parallel_prediction: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if !(0. ..=1.).contains(&self.bounciness) {
            return invalid(format!("bounciness must be within 0..=1, got {}", self.bounciness));
        }
        if !(self.friction >= 0. && self.friction.is_finite()) {
            return invalid(format!("friction must be a finite non-negative number, got {}", self.friction));
        }
        if !(self.speed > 0. && self.speed.is_finite()) {
            return invalid(format!("speed must be strictly positive, got {}", self.speed));
        }
        if !(self.epsilon > 0. && self.epsilon.is_finite()) {
            return invalid(format!("epsilon must be strictly positive, got {}", self.epsilon));
        }
        if let Some(horizon) = self.horizon {
            if !(horizon > self.epsilon) {
                return invalid(format!("horizon {horizon} must be greater than epsilon"));
            }
        }
        if self.stagnation_limit == 0 {
            return invalid("stagnation_limit must be at least 1".to_string());
        }
        // Bounces shorter than epsilon would be discarded as already resolved
        // and let objects sink into each other
        if !(self.resting_threshold > self.epsilon) {
            return invalid(format!(
                "resting_threshold ({}) must be greater than epsilon ({})",
                self.resting_threshold, self.epsilon
            ));
        }

        Ok(())
    }

    /// Absolute time up to which predictions made at `from` are searched
    pub fn horizon_from(&self, from: f64) -> f64 {
        self.horizon.map_or(f64::INFINITY, |horizon| from + horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(r#"{ "bounciness": 0.5, "speed": 2.0 }"#).unwrap();
        assert_eq!(config.bounciness, 0.5);
        assert_eq!(config.speed, 2.);
        assert_eq!(config.stagnation_limit, EngineConfig::default().stagnation_limit);
        assert_eq!(config.horizon, None);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "bounciness": 1.5 }"#),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "speed": 0.0 }"#),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "epsilon": 0.1, "resting_threshold": 0.01 }"#),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(matches!(EngineConfig::from_json("{ nope"), Err(EngineError::Json(_))));
    }

    #[test]
    fn test_horizon_from() {
        let mut config = EngineConfig::default();
        assert_eq!(config.horizon_from(3.), f64::INFINITY);
        config.horizon = Some(2.);
        assert_eq!(config.horizon_from(3.), 5.);
    }
}
