//! One car: a chassis body plus four jointed wheels.

use crate::actuation::{Actuation, VehicleState};
use crate::physics::{ChassisSpec, PhysicsBackend, WheelJointSpec, WheelSpec};
use rccar_shared::VehicleProfile;

/// Fixed wheel slots. Front is +Z, left is +X in chassis space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl Corner {
    /// Wheel index order used everywhere, including the wire.
    pub const ALL: [Corner; 4] = [
        Corner::FrontLeft,
        Corner::FrontRight,
        Corner::RearLeft,
        Corner::RearRight,
    ];

    pub fn index(self) -> usize {
        match self {
            Corner::FrontLeft => 0,
            Corner::FrontRight => 1,
            Corner::RearLeft => 2,
            Corner::RearRight => 3,
        }
    }

    pub fn is_front(self) -> bool {
        matches!(self, Corner::FrontLeft | Corner::FrontRight)
    }

    pub fn is_left(self) -> bool {
        matches!(self, Corner::FrontLeft | Corner::RearLeft)
    }

    /// Wheel centre relative to the point between the four wheel centres.
    pub fn offset(self, profile: &VehicleProfile) -> [f64; 3] {
        let x = if self.is_left() {
            profile.tread / 2.0
        } else {
            -profile.tread / 2.0
        };
        let z = if self.is_front() {
            profile.wheelbase / 2.0
        } else {
            -profile.wheelbase / 2.0
        };
        [x, 0.0, z]
    }
}

/// Where a new vehicle appears: the point between its four wheel centres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPose {
    pub position: [f64; 3],
}

pub struct Wheel<P: PhysicsBackend> {
    pub corner: Corner,
    pub body: P::Body,
    pub joint: P::Joint,
}

pub struct Vehicle<P: PhysicsBackend> {
    pub chassis: P::Body,
    pub wheels: [Wheel<P>; 4],
}

impl<P: PhysicsBackend> Vehicle<P> {
    /// Build chassis, wheels and joints in `physics`.
    pub fn spawn(physics: &mut P, profile: &VehicleProfile, pose: SpawnPose) -> Self {
        let [px, py, pz] = pose.position;
        let chassis = physics.add_chassis(&ChassisSpec {
            position: [px, py + profile.body_z_offset, pz],
            size: profile.body_box,
            density: profile.body_density,
        });

        let wheels = Corner::ALL.map(|corner| {
            let [ox, oy, oz] = corner.offset(profile);
            let body = physics.add_wheel(&WheelSpec {
                position: [px + ox, py + oy, pz + oz],
                radius: profile.tire_radius(),
                width: profile.tire_width,
                density: profile.tire_density,
            });
            let lock = if corner.is_front() {
                profile.steering_lock
            } else {
                0.0
            };
            let joint = physics.attach_wheel(
                chassis,
                body,
                &WheelJointSpec {
                    anchor: [ox, oy - profile.body_z_offset, oz],
                    steer_limits: [-lock, lock],
                    steer_max_torque: profile.steering_torque,
                    suspension_travel: profile.suspension_travel,
                    suspension_spring: profile.suspension_spring,
                    suspension_damping: profile.suspension_damping,
                },
            );
            Wheel {
                corner,
                body,
                joint,
            }
        });

        Self { chassis, wheels }
    }

    /// Free joints, then wheel bodies, then the chassis.
    pub fn despawn(self, physics: &mut P) {
        for wheel in &self.wheels {
            physics.remove_joint(wheel.joint);
        }
        for wheel in &self.wheels {
            physics.remove_body(wheel.body);
        }
        physics.remove_body(self.chassis);
    }

    /// Joint state of all four wheels, or `None` if any joint no longer resolves.
    pub fn state(&self, physics: &P) -> Option<VehicleState> {
        let mut state = VehicleState::default();
        for wheel in &self.wheels {
            state.wheels[wheel.corner.index()] = physics.wheel_state(wheel.joint)?;
        }
        Some(state)
    }

    pub fn apply(&self, physics: &mut P, actuation: &Actuation) {
        for wheel in &self.wheels {
            physics.command_wheel(wheel.joint, &actuation.commands[wheel.corner.index()]);
        }
    }
}
