//! Owner of the physics world and every live vehicle.
//!
//! Vehicles live in a generational arena; the session name is only an alias that
//! resolves to a handle. All methods take `&self`/`&mut self`, so the single world
//! lock around the owner is what serialises stepping, creation, destruction and reads.

use crate::actuation::{ActuationError, ActuationModel, DriverInput};
use crate::arena::{Arena, Handle};
use crate::physics::PhysicsBackend;
use crate::rapier_world::RapierWorld;
use crate::vehicle::{SpawnPose, Vehicle};
use rccar_shared::{Profile, VehicleProfile};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicated name: {0}")]
    DuplicateName(String),
}

pub type VehicleHandle = Handle;

pub struct Entry<P: PhysicsBackend> {
    pub name: String,
    pub vehicle: Vehicle<P>,
}

pub struct WorldRegistry<P: PhysicsBackend = RapierWorld> {
    physics: P,
    profile: Arc<Profile>,
    actuation: ActuationModel,
    vehicles: Arena<Entry<P>>,
    names: HashMap<String, VehicleHandle>,
}

impl WorldRegistry<RapierWorld> {
    pub fn new(profile: Arc<Profile>) -> Self {
        let physics = RapierWorld::new(&profile.world);
        Self::with_physics(physics, profile)
    }
}

impl<P: PhysicsBackend> WorldRegistry<P> {
    pub fn with_physics(physics: P, profile: Arc<Profile>) -> Self {
        let actuation = ActuationModel::new(&profile.vehicle);
        Self {
            physics,
            profile,
            actuation,
            vehicles: Arena::new(),
            names: HashMap::new(),
        }
    }

    /// Swap the control law, e.g. for a different differential strategy.
    pub fn set_actuation_model(&mut self, model: ActuationModel) {
        self.actuation = model;
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn vehicle_profile(&self) -> &VehicleProfile {
        &self.profile.vehicle
    }

    pub fn physics(&self) -> &P {
        &self.physics
    }

    pub fn create_vehicle(
        &mut self,
        name: &str,
        pose: SpawnPose,
    ) -> Result<VehicleHandle, RegistryError> {
        if self.names.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        let vehicle = Vehicle::spawn(&mut self.physics, &self.profile.vehicle, pose);
        let handle = self.vehicles.insert(Entry {
            name: name.to_string(),
            vehicle,
        });
        self.names.insert(name.to_string(), handle);
        tracing::debug!(name, ?pose, "vehicle created");
        Ok(handle)
    }

    /// Returns whether a vehicle was removed. Absent names are a no-op.
    pub fn destroy_vehicle(&mut self, name: &str) -> bool {
        let Some(handle) = self.names.remove(name) else {
            return false;
        };
        match self.vehicles.remove(handle) {
            Some(entry) => {
                entry.vehicle.despawn(&mut self.physics);
                tracing::debug!(name, "vehicle destroyed");
                true
            }
            None => false,
        }
    }

    pub fn handle(&self, name: &str) -> Option<VehicleHandle> {
        self.names.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Vehicle<P>> {
        let handle = self.handle(name)?;
        self.resolve(handle)
    }

    pub fn resolve(&self, handle: VehicleHandle) -> Option<&Vehicle<P>> {
        self.vehicles.get(handle).map(|entry| &entry.vehicle)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Visit every live vehicle in arena order.
    pub fn for_each(&self, mut visit: impl FnMut(&str, &Vehicle<P>)) {
        for (_, entry) in self.vehicles.iter() {
            visit(&entry.name, &entry.vehicle);
        }
    }

    /// Run the control law for one vehicle and write its targets. Returns `Ok(false)`
    /// when the name is not live.
    pub fn apply_input(&mut self, name: &str, input: DriverInput) -> Result<bool, ActuationError> {
        let Some(handle) = self.handle(name) else {
            return Ok(false);
        };
        let Some(entry) = self.vehicles.get(handle) else {
            return Ok(false);
        };
        let state = entry
            .vehicle
            .state(&self.physics)
            .ok_or(ActuationError::MissingJointState)?;
        let actuation = self.actuation.compute(&state, input)?;
        entry.vehicle.apply(&mut self.physics, &actuation);
        Ok(true)
    }

    /// Advance the shared world. The only caller of the engine's step.
    pub fn step(&mut self, dt: f64) {
        self.physics.step(dt);
    }
}
