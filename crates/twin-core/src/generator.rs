//! Synthetic drivetrain telemetry for development and demos.
//!
//! One reading per second. Torque and speed follow four sine cycles a day,
//! oil temperature one, each with Gaussian noise proportional to its range.

use crate::types::SensorSample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;
const PHASE: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub max_torque: f64,
    pub max_speed: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            max_torque: 3000.0,
            max_speed: 300.0,
            min_temperature: -20.0,
            max_temperature: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Wave {
    min: f64,
    max: f64,
    cycles_per_day: f64,
    noise_fraction: f64,
}

impl Wave {
    fn sample<R: Rng + ?Sized>(&self, x: f64, rng: &mut R) -> f64 {
        let amplitude = self.max - self.min;
        let frequency = self.cycles_per_day / SECONDS_PER_DAY;
        let base = (2.0 * PI * frequency * x + PHASE).sin() * 0.5 * amplitude + 0.5 * amplitude;
        self.min + base + gaussian(rng) * self.noise_fraction * amplitude
    }
}

/// Standard normal via Box-Muller.
fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Readings for every second in `[start, stop)`.
pub fn generate<R: Rng + ?Sized>(
    start: i64,
    stop: i64,
    profile: &Profile,
    rng: &mut R,
) -> Vec<SensorSample> {
    let torque = Wave {
        min: 0.0,
        max: profile.max_torque,
        cycles_per_day: 4.0,
        noise_fraction: 0.02,
    };
    let speed = Wave {
        min: 0.0,
        max: profile.max_speed,
        cycles_per_day: 4.0,
        noise_fraction: 0.02,
    };
    let temperature = Wave {
        min: profile.min_temperature,
        max: profile.max_temperature,
        cycles_per_day: 1.0,
        noise_fraction: 0.005,
    };
    (start..stop)
        .map(|timestamp| {
            let x = (timestamp - start) as f64;
            SensorSample {
                timestamp,
                torque: torque.sample(x, &mut *rng),
                speed: speed.sample(x, &mut *rng),
                oil_temperature: temperature.sample(x, &mut *rng),
            }
        })
        .collect()
}
