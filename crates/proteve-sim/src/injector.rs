//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Randomised line readings with injected voltage faults."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use proteve_common::config::{ProtectionConfig, SimulationConfig};
use proteve_core::Sample;
use rand::prelude::*;
use rand_distr::Normal;

use crate::SampleSource;

/// Maximum excursion beyond a band limit for injected faults, in volts.
const FAULT_EXCURSION_V: f64 = 5.0;
/// Full width of the near-limit swing around nominal, in volts.
const NEAR_LIMIT_SWING_V: f64 = 30.0;
/// Full width of the normal ripple around nominal, in volts.
const RIPPLE_V: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FaultInjectorSettings {
    pub v_min: f64,
    pub v_max: f64,
    pub v_nominal: f64,
    pub undervoltage_probability: f64,
    pub overvoltage_probability: f64,
    pub near_limit_probability: f64,
    pub base_current: f64,
    pub current_sigma: f64,
}

impl FaultInjectorSettings {
    pub fn from_config(protection: &ProtectionConfig, simulation: &SimulationConfig) -> Self {
        Self {
            v_min: protection.v_min,
            v_max: protection.v_max,
            v_nominal: protection.v_nominal,
            undervoltage_probability: simulation.undervoltage_probability,
            overvoltage_probability: simulation.overvoltage_probability,
            near_limit_probability: simulation.near_limit_probability,
            base_current: simulation.base_current,
            current_sigma: simulation.current_sigma,
        }
    }
}

impl Default for FaultInjectorSettings {
    fn default() -> Self {
        Self::from_config(&ProtectionConfig::default(), &SimulationConfig::default())
    }
}

/// Seeded generator reproducing the relay's field behaviour: mostly nominal
/// ripple, occasional swings toward the limits, and rare out-of-band faults.
#[derive(Debug)]
pub struct FaultInjector {
    settings: FaultInjectorSettings,
    rng: StdRng,
    current_noise: Normal<f64>,
}

impl FaultInjector {
    pub fn new(settings: FaultInjectorSettings, seed: u64) -> Result<Self> {
        let current_noise = Normal::new(0.0, settings.current_sigma)
            .with_context(|| format!("invalid current sigma {}", settings.current_sigma))?;
        Ok(Self {
            settings,
            rng: StdRng::seed_from_u64(seed),
            current_noise,
        })
    }

    pub fn from_config(protection: &ProtectionConfig, simulation: &SimulationConfig) -> Result<Self> {
        Self::new(
            FaultInjectorSettings::from_config(protection, simulation),
            simulation.seed,
        )
    }

    fn draw_voltage(&mut self) -> f64 {
        let s = &self.settings;
        let roll: f64 = self.rng.gen();
        let under = s.undervoltage_probability;
        let over = under + s.overvoltage_probability;
        let near = over + s.near_limit_probability;
        if roll < under {
            s.v_min - self.rng.gen_range(0.1..FAULT_EXCURSION_V)
        } else if roll < over {
            s.v_max + self.rng.gen_range(0.1..FAULT_EXCURSION_V)
        } else if roll < near {
            s.v_nominal + (self.rng.gen::<f64>() - 0.5) * NEAR_LIMIT_SWING_V
        } else {
            s.v_nominal + (self.rng.gen::<f64>() - 0.5) * RIPPLE_V
        }
    }

    fn draw_current(&mut self) -> f64 {
        let noise = self.current_noise.sample(&mut self.rng);
        (self.settings.base_current + noise).max(0.0)
    }
}

impl SampleSource for FaultInjector {
    fn next_sample(&mut self, at: DateTime<Utc>) -> Option<Sample> {
        let voltage = self.draw_voltage();
        let current = self.draw_current();
        Some(Sample::new(at, voltage, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn same_seed_reproduces_stream() {
        let mut a = FaultInjector::new(FaultInjectorSettings::default(), 42).unwrap();
        let mut b = FaultInjector::new(FaultInjectorSettings::default(), 42).unwrap();
        for _ in 0..100 {
            assert_eq!(a.next_sample(at()), b.next_sample(at()));
        }
    }

    #[test]
    fn nominal_only_stays_within_ripple() {
        let settings = FaultInjectorSettings {
            undervoltage_probability: 0.0,
            overvoltage_probability: 0.0,
            near_limit_probability: 0.0,
            ..FaultInjectorSettings::default()
        };
        let mut injector = FaultInjector::new(settings, 7).unwrap();
        for _ in 0..500 {
            let sample = injector.next_sample(at()).unwrap();
            assert!((sample.voltage - 220.0).abs() <= RIPPLE_V / 2.0);
            assert!(sample.current >= 0.0);
        }
    }

    #[test]
    fn forced_faults_leave_the_band() {
        let settings = FaultInjectorSettings {
            undervoltage_probability: 1.0,
            overvoltage_probability: 0.0,
            near_limit_probability: 0.0,
            ..FaultInjectorSettings::default()
        };
        let mut injector = FaultInjector::new(settings, 1).unwrap();
        for _ in 0..100 {
            let sample = injector.next_sample(at()).unwrap();
            assert!(sample.voltage < 190.0);
            assert!(sample.voltage > 190.0 - FAULT_EXCURSION_V);
        }
    }

    #[test]
    fn default_mix_injects_both_fault_kinds() {
        let mut injector = FaultInjector::new(FaultInjectorSettings::default(), 2024).unwrap();
        let samples: Vec<Sample> = (0..2_000)
            .filter_map(|_| injector.next_sample(at()))
            .collect();
        assert!(samples.iter().any(|s| s.voltage < 190.0));
        assert!(samples.iter().any(|s| s.voltage > 247.0));
        let nominal = samples
            .iter()
            .filter(|s| (s.voltage - 220.0).abs() <= RIPPLE_V / 2.0)
            .count();
        assert!(nominal > 1_500);
    }

    #[test]
    fn negative_sigma_is_rejected() {
        let settings = FaultInjectorSettings {
            current_sigma: -1.0,
            ..FaultInjectorSettings::default()
        };
        assert!(FaultInjector::new(settings, 0).is_err());
    }
}
