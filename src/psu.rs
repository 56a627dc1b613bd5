use log::warn;

use crate::error::LabError;
use crate::types::Reading;

/// Anything that can report an output voltage and current
pub trait PowerSupply {
    fn read(&mut self) -> Result<Reading, LabError>;
}

impl<P: PowerSupply + ?Sized> PowerSupply for Box<P> {
    fn read(&mut self) -> Result<Reading, LabError> {
        (**self).read()
    }
}

/// Stand-in for a TENMA supply that reports fixed values from configuration.
///
/// No serial traffic takes place; use it to exercise the recording pipeline
/// without hardware attached.
#[derive(Debug, Clone)]
pub struct PlaceholderSupply {
    reading: Reading,
}

impl PlaceholderSupply {
    pub fn new(voltage_v: f64, current_a: f64) -> Self {
        warn!(
            "Using placeholder power supply ({:.3} V, {:.3} A), no hardware is queried",
            voltage_v, current_a
        );
        Self {
            reading: Reading::new(voltage_v, current_a),
        }
    }
}

impl Default for PlaceholderSupply {
    fn default() -> Self {
        Self::new(1.0, 0.1)
    }
}

impl PowerSupply for PlaceholderSupply {
    fn read(&mut self) -> Result<Reading, LabError> {
        Ok(self.reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_returns_configured_values() {
        let mut supply = PlaceholderSupply::new(12.0, 0.5);
        assert_eq!(supply.read().unwrap(), Reading::new(12.0, 0.5));

        let mut boxed: Box<dyn PowerSupply> = Box::new(PlaceholderSupply::default());
        assert_eq!(boxed.read().unwrap(), Reading::new(1.0, 0.1));
    }
}
