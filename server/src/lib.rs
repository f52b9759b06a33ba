//! RC car simulation server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod actuation;
pub mod arena;
pub mod config;
pub mod physics;
pub mod rapier_world;
pub mod registry;
pub mod rpc;
pub mod session;
pub mod sim_loop;
pub mod snapshot;
pub mod vehicle;
pub mod ws;

use parking_lot::Mutex;
use std::sync::Arc;

/// The one world, shared by the simulation loop and every connection.
pub type SharedWorld = Arc<Mutex<session::SessionManager>>;
