//! Physical and tuning parameters for the world and the vehicle archetype.
//!
//! Loaded once at startup from a JSON document and shared read-only afterwards.
//! Field names are PascalCase on the wire so existing `profile.json` files keep working.

use std::path::Path;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Failure to produce a usable profile at startup.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read profile {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profile: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid profile: {0}")]
    Invalid(String),
}

/// Complete profile document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "PascalCase", default)]
pub struct Profile {
    pub world: WorldProfile,
    pub vehicle: VehicleProfile,
}

/// Global world and solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "PascalCase", default)]
pub struct WorldProfile {
    pub gravity: [f64; 3],
    #[serde(rename = "CFM")]
    pub cfm: f64,
    #[serde(rename = "ERP")]
    pub erp: f64,
    pub quick_step_w: f64,
    /// Constraint solver iterations per step
    pub quick_step_num_iterations: u32,
    /// Contact friction coefficient
    pub mu: f64,
    pub soft_cfm: f64,
    pub soft_erp: f64,
    /// Height of the infinite ground plane (m)
    pub ground_height: f64,
}

impl Default for WorldProfile {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.80665, 0.0],
            cfm: 10e-5,
            erp: 0.8,
            quick_step_w: 1e-3,
            quick_step_num_iterations: 10,
            mu: 0.9,
            soft_cfm: 1e-6,
            soft_erp: 0.3,
            ground_height: -0.5,
        }
    }
}

/// One vehicle archetype. Sent to clients on join so they can build matching visuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "PascalCase", default)]
pub struct VehicleProfile {
    /// Chassis density (kg/m^3)
    pub body_density: f64,
    /// Chassis box { width, height, length } (m)
    pub body_box: [f64; 3],
    /// Vertical offset of the chassis from the wheel centres (m)
    pub body_z_offset: f64,
    pub wheelbase: f64,
    pub tread: f64,
    pub tire_density: f64,
    pub tire_diameter: f64,
    pub tire_width: f64,

    /// Allowed vertical wheel travel either side of rest (m)
    pub suspension_travel: f64,
    pub suspension_spring: f64,
    pub suspension_damping: f64,

    /// Steering joint lock, symmetric (rad)
    pub steering_lock: f64,
    /// Wheel angle per unit of steering input (rad)
    pub steering_ratio: f64,
    /// Proportional gain of the steering servo (1/s)
    pub steering_gain: f64,
    /// Steering servo torque limit (N*m)
    pub steering_torque: f64,

    /// Wheel spin speed at full throttle (rad/s)
    pub max_wheel_speed: f64,
    /// Drive torque available per axle at full allocation (N*m)
    pub drive_torque: f64,
    /// Per-wheel holding torque at full brake (N*m)
    pub brake_torque: f64,
    pub front_bias: f64,
    pub rear_bias: f64,
}

impl Default for VehicleProfile {
    fn default() -> Self {
        Self {
            body_density: 400.0,
            body_box: [0.200, 0.050, 0.380],
            body_z_offset: 0.0,
            wheelbase: 0.267,
            tread: 0.160,
            tire_density: 250.0,
            tire_diameter: 0.088,
            tire_width: 0.033,
            suspension_travel: 0.01,
            suspension_spring: 800.0,
            suspension_damping: 8.0,
            steering_lock: 0.6,
            steering_ratio: 0.5,
            steering_gain: 20.0,
            steering_torque: 0.5,
            max_wheel_speed: 100.0,
            drive_torque: 0.2,
            brake_torque: 0.3,
            front_bias: 0.4,
            rear_bias: 0.6,
        }
    }
}

fn positive(name: &str, v: f64) -> Result<(), String> {
    if !v.is_finite() || v <= 0.0 {
        return Err(format!("{name} must be finite and > 0"));
    }
    Ok(())
}

fn non_negative(name: &str, v: f64) -> Result<(), String> {
    if !v.is_finite() || v < 0.0 {
        return Err(format!("{name} must be finite and >= 0"));
    }
    Ok(())
}

fn finite(name: &str, v: f64) -> Result<(), String> {
    if !v.is_finite() {
        return Err(format!("{name} must be finite"));
    }
    Ok(())
}

impl WorldProfile {
    pub fn validate(&self) -> Result<(), String> {
        for g in self.gravity {
            finite("gravity", g)?;
        }
        non_negative("cfm", self.cfm)?;
        non_negative("erp", self.erp)?;
        non_negative("quick_step_w", self.quick_step_w)?;
        if self.quick_step_num_iterations == 0 {
            return Err("quick_step_num_iterations must be >= 1".to_string());
        }
        non_negative("mu", self.mu)?;
        non_negative("soft_cfm", self.soft_cfm)?;
        non_negative("soft_erp", self.soft_erp)?;
        finite("ground_height", self.ground_height)?;
        Ok(())
    }
}

impl VehicleProfile {
    pub fn validate(&self) -> Result<(), String> {
        positive("body_density", self.body_density)?;
        for d in self.body_box {
            positive("body_box", d)?;
        }
        finite("body_z_offset", self.body_z_offset)?;
        positive("wheelbase", self.wheelbase)?;
        positive("tread", self.tread)?;
        positive("tire_density", self.tire_density)?;
        positive("tire_diameter", self.tire_diameter)?;
        positive("tire_width", self.tire_width)?;
        non_negative("suspension_travel", self.suspension_travel)?;
        non_negative("suspension_spring", self.suspension_spring)?;
        non_negative("suspension_damping", self.suspension_damping)?;
        non_negative("steering_lock", self.steering_lock)?;
        if self.steering_lock > std::f64::consts::FRAC_PI_2 {
            return Err("steering_lock must be <= PI/2".to_string());
        }
        non_negative("steering_ratio", self.steering_ratio)?;
        non_negative("steering_gain", self.steering_gain)?;
        non_negative("steering_torque", self.steering_torque)?;
        non_negative("max_wheel_speed", self.max_wheel_speed)?;
        non_negative("drive_torque", self.drive_torque)?;
        non_negative("brake_torque", self.brake_torque)?;
        for (name, bias) in [("front_bias", self.front_bias), ("rear_bias", self.rear_bias)] {
            if !(0.0..=1.0).contains(&bias) {
                return Err(format!("{name} must be within [0, 1]"));
            }
        }
        Ok(())
    }

    pub fn tire_radius(&self) -> f64 {
        self.tire_diameter / 2.0
    }
}

impl Profile {
    pub fn validate(&self) -> Result<(), String> {
        self.world.validate()?;
        self.vehicle.validate()
    }

    /// Read, parse and validate a profile document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ProfileError> {
        let profile: Profile = serde_json::from_str(text)?;
        profile.validate().map_err(ProfileError::Invalid)?;
        Ok(profile)
    }
}
