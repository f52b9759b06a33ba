//! Types shared between the server and its clients: the wire protocol and the
//! vehicle/world profile document.

pub mod profile;
pub mod protocol;

pub use profile::{Profile, ProfileError, VehicleProfile, WorldProfile};
