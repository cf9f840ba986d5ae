//! Remote-control pass-through: raw stick values written by an input thread

use tracing::info;

use crate::common::{ChannelController, NavigationError, NavigationResult, CHANNEL_COUNT};

/// Forwards the five raw channel values of the last remote input.
///
/// Available only while an input is present and the controller is enabled.
/// The input thread writes through the same `Mutex` the arbiter locks.
#[derive(Debug, Clone)]
pub struct ManualOverride {
    input: Option<[u16; CHANNEL_COUNT]>,
    enabled: bool,
}

impl Default for ManualOverride {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualOverride {
    pub fn new() -> Self {
        ManualOverride {
            input: None,
            enabled: true,
        }
    }

    /// Store a new remote input; values are rounded to raw channel units
    pub fn set_input(&mut self, values: &[f64]) -> NavigationResult<()> {
        if values.len() != CHANNEL_COUNT {
            return Err(NavigationError::InvalidInput(format!(
                "remote input needs {} channels, got {}",
                CHANNEL_COUNT,
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > f64::from(u16::MAX)) {
            return Err(NavigationError::InvalidInput(format!("remote input out of range: {:?}", values)));
        }

        let mut raw = [0u16; CHANNEL_COUNT];
        for (slot, value) in raw.iter_mut().zip(values.iter()) {
            *slot = value.round() as u16;
        }
        if self.input.is_none() {
            info!("manual control engaged");
        }
        self.input = Some(raw);
        Ok(())
    }

    /// Forget the input, e.g. when the remote client goes away
    pub fn disconnect(&mut self) {
        if self.input.take().is_some() {
            info!("manual control released");
        }
    }

    pub fn input(&self) -> Option<&[u16; CHANNEL_COUNT]> {
        self.input.as_ref()
    }
}

impl ChannelController for ManualOverride {
    fn name(&self) -> &str {
        "manual-override"
    }

    fn channels(&mut self) -> NavigationResult<Vec<u16>> {
        self.input
            .map(|raw| raw.to_vec())
            .ok_or_else(|| NavigationError::InvalidInput("no remote input".to_string()))
    }

    fn is_available(&self) -> bool {
        self.enabled && self.input.is_some()
    }

    fn set_availability(&mut self, available: bool) {
        self.enabled = available;
    }

    // Stick values are absolute; there is nothing to track
    fn set_target(&mut self, _target: f64) {}

    fn set_measurement(&mut self, _measurement: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_only_with_input() {
        let mut manual = ManualOverride::new();
        assert!(!manual.is_available());
        assert!(manual.channels().is_err());

        manual.set_input(&[1200.4, 1500.0, 1499.6, 1500.0, 1000.0]).unwrap();
        assert!(manual.is_available());
        assert_eq!(manual.channels().unwrap(), vec![1200, 1500, 1500, 1500, 1000]);

        manual.set_availability(false);
        assert!(!manual.is_available());
        manual.set_availability(true);

        manual.disconnect();
        assert!(!manual.is_available());
    }

    #[test]
    fn test_rejects_malformed_input() {
        let mut manual = ManualOverride::new();
        assert!(manual.set_input(&[1500.0; 4]).is_err());
        assert!(manual.set_input(&[1500.0, 1500.0, f64::NAN, 1500.0, 1500.0]).is_err());
        assert!(manual.input().is_none());
    }
}
