//! Aggregated configuration, loadable from TOML
//!
//! Every section falls back to its defaults, so a partial file only needs the
//! values that differ:
//!
//! ```toml
//! [obstacle_avoidance.histogram_grid]
//! window_size = 141
//! cell_size = 5.0
//!
//! [take_off_landing]
//! max_altitude = 120.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::common::{NavigationError, NavigationResult};
use crate::control::obstacle_avoidance::ObstacleAvoidanceConfig;
use crate::control::pid::PidConfig;
use crate::control::take_off_landing::TakeOffLandingConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub obstacle_avoidance: ObstacleAvoidanceConfig,
    pub altitude: PidConfig,
    pub inclination: PidConfig,
    pub take_off_landing: TakeOffLandingConfig,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            obstacle_avoidance: ObstacleAvoidanceConfig::default(),
            altitude: PidConfig::altitude(),
            inclination: PidConfig::inclination(),
            take_off_landing: TakeOffLandingConfig::default(),
        }
    }
}

impl NavigationConfig {
    pub fn from_toml_str(text: &str) -> NavigationResult<Self> {
        let config: NavigationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> NavigationResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> NavigationResult<String> {
        toml::to_string(self).map_err(|e| NavigationError::InvalidParameter(e.to_string()))
    }

    pub fn validate(&self) -> NavigationResult<()> {
        self.obstacle_avoidance.validate()?;
        self.altitude.validate()?;
        self.inclination.validate()?;
        self.take_off_landing.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = NavigationConfig::from_toml_str("").unwrap();
        assert_eq!(config, NavigationConfig::default());
        assert_eq!(config.obstacle_avoidance.histogram_grid.window_size, 35);
        assert_eq!(config.take_off_landing.arm_value, 2000);
    }

    #[test]
    fn test_partial_override() {
        let text = r#"
            [obstacle_avoidance.histogram_grid]
            window_size = 141
            cell_size = 5.0

            [obstacle_avoidance.particle_filter]
            seed = 9

            [altitude]
            kp = 0.03
            ki = 0.005
            kd = 0.01
            lower_limit = 1000
            upper_limit = 1700
            initial_output = 1000.0
        "#;
        let config = NavigationConfig::from_toml_str(text).unwrap();

        assert_eq!(config.obstacle_avoidance.histogram_grid.window_size, 141);
        assert_eq!(config.obstacle_avoidance.histogram_grid.r_max, 375.0);
        assert_eq!(config.obstacle_avoidance.particle_filter.seed, Some(9));
        assert_eq!(config.altitude.upper_limit, 1700);
        assert_eq!(config.altitude.kp, 0.03);
        assert_eq!(config.inclination, PidConfig::inclination());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let even_window = "[obstacle_avoidance.histogram_grid]\nwindow_size = 10\n";
        assert!(matches!(
            NavigationConfig::from_toml_str(even_window),
            Err(NavigationError::InvalidParameter(_))
        ));
        assert!(matches!(
            NavigationConfig::from_toml_str("altitude = 3"),
            Err(NavigationError::Config(_))
        ));
        // PID tables have no per-field defaults
        assert!(matches!(
            NavigationConfig::from_toml_str("[inclination]\nkp = 0.1\n"),
            Err(NavigationError::Config(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = NavigationConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(NavigationConfig::from_toml_str(&text).unwrap(), config);
    }
}
