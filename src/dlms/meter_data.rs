//! # Meter Measurement Snapshot
//!
//! One decoded DLMS notification produces one [`MeterData`]. Values are
//! meter-native units: volts, amps, watts, watt-hours, var-hours.

use crate::constants::SQRT_3;

/// Immutable snapshot of one decoded meter notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterData {
    pub voltage_l1: f32,
    pub voltage_l2: f32,
    pub voltage_l3: f32,
    pub current_l1: f32,
    pub current_l2: f32,
    pub current_l3: f32,
    /// Active power taken from the grid (W)
    pub active_power_plus: f32,
    /// Active power fed into the grid (W)
    pub active_power_minus: f32,
    /// Active energy taken from the grid (Wh)
    pub active_energy_plus: f32,
    /// Active energy fed into the grid (Wh)
    pub active_energy_minus: f32,
    /// Reactive energy taken from the grid (varh)
    pub reactive_energy_plus: f32,
    /// Reactive energy fed into the grid (varh)
    pub reactive_energy_minus: f32,
    /// Meter clock as `YYYY-MM-DDTHH:MM:SSZ`, when the frame carried one
    pub timestamp: Option<String>,
}

impl MeterData {
    /// Mean of the non-zero phase voltages; 0 when all phases read zero.
    pub fn average_voltage(&self) -> f32 {
        let phases = [self.voltage_l1, self.voltage_l2, self.voltage_l3];
        let live = phases.iter().filter(|v| **v != 0.0).count();
        if live == 0 {
            0.0
        } else {
            phases.iter().sum::<f32>() / live as f32
        }
    }

    /// Total apparent power: sum of per-phase `V * I` (VA).
    pub fn apparent_power(&self) -> f32 {
        self.voltage_l1 * self.current_l1
            + self.voltage_l2 * self.current_l2
            + self.voltage_l3 * self.current_l3
    }

    /// Displacement factor derived from net active over apparent power.
    ///
    /// Reads 1.0 when no apparent power flows (meter idle or no voltage).
    pub fn power_factor(&self) -> f32 {
        let apparent = self.apparent_power();
        if apparent == 0.0 {
            1.0
        } else {
            ((self.active_power_plus - self.active_power_minus) / apparent).abs()
        }
    }

    /// Net active power, positive when consuming from the grid (W).
    pub fn active_power_net(&self) -> f32 {
        self.active_power_plus - self.active_power_minus
    }

    /// Phase-to-phase voltage for a given phase-to-neutral voltage.
    pub fn phase_to_phase_voltage(voltage: f32) -> f32 {
        voltage * SQRT_3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_voltage_skips_dead_phases() {
        let data = MeterData {
            voltage_l1: 230.0,
            voltage_l2: 0.0,
            voltage_l3: 232.0,
            ..Default::default()
        };
        assert_eq!(data.average_voltage(), 231.0);
    }

    #[test]
    fn test_average_voltage_all_zero() {
        assert_eq!(MeterData::default().average_voltage(), 0.0);
    }

    #[test]
    fn test_apparent_power_sums_phases() {
        let data = MeterData {
            voltage_l1: 230.0,
            voltage_l2: 230.0,
            voltage_l3: 230.0,
            current_l1: 1.0,
            current_l2: 2.0,
            current_l3: 3.0,
            ..Default::default()
        };
        assert_eq!(data.apparent_power(), 1380.0);
    }

    #[test]
    fn test_power_factor_idle_is_unity() {
        assert_eq!(MeterData::default().power_factor(), 1.0);
    }

    #[test]
    fn test_power_factor_uses_net_power() {
        let data = MeterData {
            voltage_l1: 100.0,
            current_l1: 10.0,
            active_power_plus: 200.0,
            active_power_minus: 700.0,
            ..Default::default()
        };
        // |200 - 700| / 1000
        assert_eq!(data.power_factor(), 0.5);
    }

    #[test]
    fn test_phase_to_phase() {
        let value = MeterData::phase_to_phase_voltage(230.0);
        assert!((value - 398.37).abs() < 0.01);
    }
}
