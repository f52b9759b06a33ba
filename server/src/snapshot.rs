//! Transcribes engine state into wire records. Read-only: nothing here touches the
//! simulation.

use crate::physics::PhysicsBackend;
use crate::registry::WorldRegistry;
use crate::vehicle::Vehicle;
use rccar_shared::protocol::{Output, VehicleWire};

/// Chassis attitude followed by the four wheel attitudes in corner order.
pub fn snapshot<P: PhysicsBackend>(physics: &P, name: &str, vehicle: &Vehicle<P>) -> VehicleWire {
    let body = physics.attitude(vehicle.chassis).unwrap_or_default();
    let tires = vehicle
        .wheels
        .iter()
        .map(|wheel| physics.attitude(wheel.body).unwrap_or_default())
        .collect();
    VehicleWire {
        name: name.to_string(),
        body,
        tires,
    }
}

/// The requester's own vehicle as `self` (if live) and every other vehicle as
/// `others`, in registry iteration order.
pub fn build_output<P: PhysicsBackend>(registry: &WorldRegistry<P>, requester: &str) -> Output {
    let physics = registry.physics();
    let mut output = Output::default();
    registry.for_each(|name, vehicle| {
        let wire = snapshot(physics, name, vehicle);
        if name == requester {
            output.self_vehicle = Some(wire);
        } else {
            output.others.push(wire);
        }
    });
    output
}
