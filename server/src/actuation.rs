//! Vehicle control law: turns normalized driver input plus the current joint state into
//! steering and drive targets for the four wheel joints.
//!
//! Everything here is pure. The registry reads the joint state, calls
//! [`ActuationModel::compute`] and writes the resulting commands back.

use crate::physics::{WheelCommand, WheelJointState};
use crate::vehicle::Corner;
use rccar_shared::protocol::Input;
use rccar_shared::VehicleProfile;

/// Brake input above this level switches the drivetrain into brake mode.
pub const BRAKE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActuationError {
    #[error("non-finite driver input")]
    NonFiniteInput,
    #[error("non-finite joint state on wheel {0}")]
    NonFiniteState(usize),
    #[error("wheel joint state unavailable")]
    MissingJointState,
}

/// The axes of one Update, without the session name.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriverInput {
    pub steering: f64,
    pub accel: f64,
    pub brake: f64,
}

impl From<&Input> for DriverInput {
    fn from(input: &Input) -> Self {
        Self {
            steering: input.steering,
            accel: input.accel,
            brake: input.brake,
        }
    }
}

impl DriverInput {
    fn is_finite(&self) -> bool {
        self.steering.is_finite() && self.accel.is_finite() && self.brake.is_finite()
    }
}

/// Joint state of all four wheels, indexed by [`Corner::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleState {
    pub wheels: [WheelJointState; 4],
}

/// Velocity target and torque cap for one wheel of an axle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxleShare {
    pub velocity: f64,
    pub max_torque: f64,
}

/// Splits an axle's target speed and torque between its two wheels.
///
/// `speeds` are the current spin rates of the (left, right) wheels.
pub trait Differential: Send + Sync {
    fn split(&self, speeds: [f64; 2], target: f64, torque: f64) -> [AxleShare; 2];
}

/// Open-differential approximation without gear contact.
///
/// Each wheel's target is offset by half the speed difference to its twin, and the
/// torque cap leans the same way in proportion to the relative speed difference.
/// Equal speeds give identical shares.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenDifferential;

impl Differential for OpenDifferential {
    fn split(&self, speeds: [f64; 2], target: f64, torque: f64) -> [AxleShare; 2] {
        let [left, right] = speeds;
        let half_diff = (left - right) / 2.0;
        let total = left.abs() + right.abs();
        let lean = if total > f64::EPSILON {
            ((left - right) / total).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let per_wheel = torque / 2.0;
        [
            AxleShare {
                velocity: target + half_diff,
                max_torque: per_wheel * (1.0 + lean),
            },
            AxleShare {
                velocity: target - half_diff,
                max_torque: per_wheel * (1.0 - lean),
            },
        ]
    }
}

/// Both wheels of an axle forced to the same target and torque.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockedDifferential;

impl Differential for LockedDifferential {
    fn split(&self, _speeds: [f64; 2], target: f64, torque: f64) -> [AxleShare; 2] {
        let share = AxleShare {
            velocity: target,
            max_torque: torque / 2.0,
        };
        [share, share]
    }
}

/// Which drivetrain mode an input selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveMode {
    /// Wheels held at zero speed with `scale` of the brake torque.
    Brake { scale: f64 },
    /// Both axles driven toward `axle_speed`.
    Drive { axle_speed: f64 },
}

/// Result of one evaluation of the control law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actuation {
    pub mode: DriveMode,
    /// Steering angle each wheel is servoed toward; rear entries are always zero.
    pub steer_targets: [f64; 4],
    pub commands: [WheelCommand; 4],
}

/// Braking intensity net of any simultaneous throttle, never negative.
pub fn brake_scale(brake: f64, accel: f64) -> f64 {
    ((brake - BRAKE_THRESHOLD) * 2.0 - accel).max(0.0)
}

pub struct ActuationModel {
    profile: VehicleProfile,
    differential: Box<dyn Differential>,
}

impl ActuationModel {
    pub fn new(profile: &VehicleProfile) -> Self {
        Self::with_differential(profile, OpenDifferential)
    }

    pub fn with_differential(
        profile: &VehicleProfile,
        differential: impl Differential + 'static,
    ) -> Self {
        Self {
            profile: profile.clone(),
            differential: Box::new(differential),
        }
    }

    /// Steering angle commanded for the front pair. Input is clamped to [-1, 1] and
    /// the result never leaves the steering lock.
    pub fn steering_target(&self, steering: f64) -> f64 {
        let lock = self.profile.steering_lock;
        (steering.clamp(-1.0, 1.0) * self.profile.steering_ratio).clamp(-lock, lock)
    }

    /// Proportional servo toward `target`, error clamped to the steering lock.
    pub fn steering_velocity(&self, target: f64, current: f64) -> f64 {
        let lock = self.profile.steering_lock;
        (target - current).clamp(-lock, lock) * self.profile.steering_gain
    }

    /// Evaluate the control law. Non-finite input or state is rejected and the caller
    /// keeps whatever targets the joints already had.
    pub fn compute(
        &self,
        state: &VehicleState,
        input: DriverInput,
    ) -> Result<Actuation, ActuationError> {
        if !input.is_finite() {
            return Err(ActuationError::NonFiniteInput);
        }
        for (i, wheel) in state.wheels.iter().enumerate() {
            if !wheel.steer_angle.is_finite() || !wheel.spin_rate.is_finite() {
                return Err(ActuationError::NonFiniteState(i));
            }
        }

        let front_target = self.steering_target(input.steering);
        let mut steer_targets = [0.0; 4];
        let mut commands = [WheelCommand::default(); 4];
        for corner in Corner::ALL {
            let i = corner.index();
            if corner.is_front() {
                steer_targets[i] = front_target;
            }
            commands[i].steer_velocity =
                self.steering_velocity(steer_targets[i], state.wheels[i].steer_angle);
            commands[i].steer_max_torque = self.profile.steering_torque;
        }

        let accel = input.accel.clamp(0.0, 1.0);
        let brake = input.brake.clamp(0.0, 1.0);
        let mode = if brake > BRAKE_THRESHOLD {
            let scale = brake_scale(brake, accel);
            let torque = scale * self.profile.brake_torque;
            for command in commands.iter_mut() {
                command.spin_velocity = 0.0;
                command.spin_max_torque = torque;
            }
            DriveMode::Brake { scale }
        } else {
            let axle_speed = accel * self.profile.max_wheel_speed;
            let axles = [
                (Corner::FrontLeft, Corner::FrontRight, self.profile.front_bias),
                (Corner::RearLeft, Corner::RearRight, self.profile.rear_bias),
            ];
            for (left, right, bias) in axles {
                let speeds = [
                    state.wheels[left.index()].spin_rate,
                    state.wheels[right.index()].spin_rate,
                ];
                let shares =
                    self.differential
                        .split(speeds, axle_speed, self.profile.drive_torque * bias);
                for (corner, share) in [left, right].into_iter().zip(shares) {
                    let command = &mut commands[corner.index()];
                    command.spin_velocity = share.velocity;
                    command.spin_max_torque = share.max_torque.max(0.0);
                }
            }
            DriveMode::Drive { axle_speed }
        };

        debug_assert!(commands.iter().all(WheelCommand::is_finite));
        Ok(Actuation {
            mode,
            steer_targets,
            commands,
        })
    }
}
