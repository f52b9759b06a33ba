//! `PhysicsBackend` on top of rapier3d.

use crate::physics::{
    ChassisSpec, PhysicsBackend, WheelCommand, WheelJointSpec, WheelJointState, WheelSpec,
};
use rapier3d::prelude::*;
use rccar_shared::protocol::Attitude;
use rccar_shared::WorldProfile;

/// Damping factor of the velocity motors; torque caps do the real limiting.
const MOTOR_RESPONSE: Real = 1.0;

fn to_vector(v: [f64; 3]) -> Vector<Real> {
    vector![v[0] as Real, v[1] as Real, v[2] as Real]
}

/// Owns every rapier set for one shared world.
pub struct RapierWorld {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    friction: Real,
}

impl RapierWorld {
    /// Create a world with an infinite ground plane at `profile.ground_height`.
    pub fn new(profile: &WorldProfile) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.num_solver_iterations =
            profile.quick_step_num_iterations.max(1) as usize;

        let friction = profile.mu as Real;
        let mut colliders = ColliderSet::new();
        let ground = ColliderBuilder::halfspace(Vector::y_axis())
            .translation(vector![0.0, profile.ground_height as Real, 0.0])
            .friction(friction)
            .build();
        colliders.insert(ground);

        Self {
            gravity: to_vector(profile.gravity),
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            friction,
        }
    }
}

impl PhysicsBackend for RapierWorld {
    type Body = RigidBodyHandle;
    type Joint = ImpulseJointHandle;

    fn add_chassis(&mut self, spec: &ChassisSpec) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(to_vector(spec.position))
            .build();
        let handle = self.bodies.insert(body);
        let collider = ColliderBuilder::cuboid(
            (spec.size[0] / 2.0) as Real,
            (spec.size[1] / 2.0) as Real,
            (spec.size[2] / 2.0) as Real,
        )
        .density(spec.density as Real)
        .friction(self.friction)
        .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    fn add_wheel(&mut self, spec: &WheelSpec) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(to_vector(spec.position))
            .build();
        let handle = self.bodies.insert(body);
        // rapier cylinders run along Y; lay it on its side so the axle is X.
        let collider = ColliderBuilder::cylinder((spec.width / 2.0) as Real, spec.radius as Real)
            .rotation(vector![0.0, 0.0, std::f32::consts::FRAC_PI_2 as Real])
            .density(spec.density as Real)
            .friction(self.friction)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    fn attach_wheel(
        &mut self,
        chassis: RigidBodyHandle,
        wheel: RigidBodyHandle,
        spec: &WheelJointSpec,
    ) -> ImpulseJointHandle {
        let anchor = spec.anchor;
        let travel = spec.suspension_travel as Real;
        let joint = GenericJointBuilder::new(
            JointAxesMask::LIN_X | JointAxesMask::LIN_Z | JointAxesMask::ANG_Z,
        )
        .local_anchor1(point![
            anchor[0] as Real,
            anchor[1] as Real,
            anchor[2] as Real
        ])
        .local_anchor2(point![0.0, 0.0, 0.0])
        .limits(JointAxis::LinY, [-travel, travel])
        .motor_model(JointAxis::LinY, MotorModel::ForceBased)
        .motor_position(
            JointAxis::LinY,
            0.0,
            spec.suspension_spring as Real,
            spec.suspension_damping as Real,
        )
        .limits(
            JointAxis::AngY,
            [spec.steer_limits[0] as Real, spec.steer_limits[1] as Real],
        )
        .motor_model(JointAxis::AngY, MotorModel::ForceBased)
        .motor_velocity(JointAxis::AngY, 0.0, MOTOR_RESPONSE)
        .motor_max_force(JointAxis::AngY, spec.steer_max_torque as Real)
        .motor_model(JointAxis::AngX, MotorModel::ForceBased)
        .motor_velocity(JointAxis::AngX, 0.0, MOTOR_RESPONSE)
        .motor_max_force(JointAxis::AngX, 0.0)
        .contacts_enabled(false)
        .build();
        self.impulse_joints.insert(chassis, wheel, joint, true)
    }

    fn remove_joint(&mut self, joint: ImpulseJointHandle) {
        self.impulse_joints.remove(joint, true);
    }

    fn remove_body(&mut self, body: RigidBodyHandle) {
        self.bodies.remove(
            body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    fn attitude(&self, body: RigidBodyHandle) -> Option<Attitude> {
        let body = self.bodies.get(body)?;
        let p = body.translation();
        let q = body.rotation();
        Some(Attitude {
            position: [p.x as f64, p.y as f64, p.z as f64],
            quaternion: [q.w as f64, q.i as f64, q.j as f64, q.k as f64],
        })
    }

    fn wheel_state(&self, joint: ImpulseJointHandle) -> Option<WheelJointState> {
        let joint = self.impulse_joints.get(joint)?;
        let chassis = self.bodies.get(joint.body1)?;
        let wheel = self.bodies.get(joint.body2)?;

        // Axle direction in chassis space; a steering angle t about Y maps X to (cos t, 0, -sin t).
        let relative = chassis.rotation().inverse() * wheel.rotation();
        let axle = relative * Vector::x();
        let steer_angle = (-axle.z).atan2(axle.x);

        let axle_world = wheel.rotation() * Vector::x();
        let spin_rate = (wheel.angvel() - chassis.angvel()).dot(&axle_world);

        Some(WheelJointState {
            steer_angle: steer_angle as f64,
            spin_rate: spin_rate as f64,
        })
    }

    fn command_wheel(&mut self, joint: ImpulseJointHandle, command: &WheelCommand) {
        if let Some(joint) = self.impulse_joints.get_mut(joint, true) {
            joint.data.set_motor_velocity(
                JointAxis::AngY,
                command.steer_velocity as Real,
                MOTOR_RESPONSE,
            );
            joint
                .data
                .set_motor_max_force(JointAxis::AngY, command.steer_max_torque as Real);
            joint.data.set_motor_velocity(
                JointAxis::AngX,
                command.spin_velocity as Real,
                MOTOR_RESPONSE,
            );
            joint
                .data
                .set_motor_max_force(JointAxis::AngX, command.spin_max_torque as Real);
        }
    }

    fn step(&mut self, dt: f64) {
        self.integration_parameters.dt = dt as Real;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}
