//! Contract between the simulation core and the rigid-body engine.
//!
//! The core never touches engine types directly; it creates bodies and wheel joints,
//! writes motor targets, reads attitudes back and asks the engine to step.

use rccar_shared::protocol::Attitude;
use std::fmt::Debug;

/// Chassis box description in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChassisSpec {
    pub position: [f64; 3],
    /// Full extents { width, height, length }
    pub size: [f64; 3],
    pub density: f64,
}

/// Wheel cylinder description. The cylinder axis is the chassis X axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelSpec {
    pub position: [f64; 3],
    pub radius: f64,
    pub width: f64,
    pub density: f64,
}

/// Compound wheel joint: vertical suspension travel, a steering DOF about the
/// chassis Y axis and a spin DOF about the axle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelJointSpec {
    /// Attachment point in chassis-local coordinates.
    pub anchor: [f64; 3],
    /// Steering limits (rad). Equal limits remove the steering freedom.
    pub steer_limits: [f64; 2],
    pub steer_max_torque: f64,
    pub suspension_travel: f64,
    pub suspension_spring: f64,
    pub suspension_damping: f64,
}

/// Current joint state as seen by the actuation model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelJointState {
    /// Steering angle relative to the chassis (rad)
    pub steer_angle: f64,
    /// Spin rate relative to the chassis about the axle (rad/s), positive rolls forward
    pub spin_rate: f64,
}

/// Actuation targets written onto one wheel joint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelCommand {
    pub steer_velocity: f64,
    pub steer_max_torque: f64,
    pub spin_velocity: f64,
    pub spin_max_torque: f64,
}

impl WheelCommand {
    pub fn is_finite(&self) -> bool {
        self.steer_velocity.is_finite()
            && self.steer_max_torque.is_finite()
            && self.spin_velocity.is_finite()
            && self.spin_max_torque.is_finite()
    }
}

/// Rigid-body engine capability. Not thread-safe by itself; callers hold the world lock.
pub trait PhysicsBackend: Send {
    type Body: Copy + Debug + PartialEq + Send;
    type Joint: Copy + Debug + PartialEq + Send;

    fn add_chassis(&mut self, spec: &ChassisSpec) -> Self::Body;
    fn add_wheel(&mut self, spec: &WheelSpec) -> Self::Body;
    fn attach_wheel(
        &mut self,
        chassis: Self::Body,
        wheel: Self::Body,
        spec: &WheelJointSpec,
    ) -> Self::Joint;

    fn remove_joint(&mut self, joint: Self::Joint);
    /// Frees the body together with its collision geometry.
    fn remove_body(&mut self, body: Self::Body);

    fn attitude(&self, body: Self::Body) -> Option<Attitude>;
    fn wheel_state(&self, joint: Self::Joint) -> Option<WheelJointState>;
    fn command_wheel(&mut self, joint: Self::Joint, command: &WheelCommand);

    /// Collision detection, fixed-step integration and contact cleanup for `dt` seconds.
    fn step(&mut self, dt: f64);

    fn body_count(&self) -> usize;
}
