//! Session lifecycle: Join, Update, Bye and inactivity expiry on top of the registry.
//!
//! Time is simulated time, advanced only by [`SessionManager::tick`]. Each session has
//! one entry in a min-heap, swept once per tick under the same lock as everything else.
//! Update only moves the deadline in the session table; when the heap entry surfaces
//! early it is pushed back at the current deadline, so the heap stays at one live entry
//! per session no matter the update rate.

use crate::actuation::DriverInput;
use crate::physics::PhysicsBackend;
use crate::rapier_world::RapierWorld;
use crate::registry::{RegistryError, WorldRegistry};
use crate::snapshot::build_output;
use crate::vehicle::SpawnPose;
use rccar_shared::protocol::{Input, Output};
use rccar_shared::{Profile, VehicleProfile};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Silence after which a session is reclaimed.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn grid: columns per row and spacing between slots (m). Rows grow as needed.
const SPAWN_COLUMNS: u64 = 8;
const SPAWN_SPACING: f64 = 0.6;
/// A slot is taken while any chassis is closer than this, measured on the ground plane.
const SPAWN_CLEAR_RADIUS: f64 = 0.5;
/// Clearance above the ground for a freshly spawned car (m).
const SPAWN_CLEARANCE: f64 = 0.005;

#[derive(Debug, Clone, Copy)]
struct Session {
    /// Distinguishes this session from an earlier one under the same name.
    id: u64,
    deadline: Duration,
}

pub struct SessionManager<P: PhysicsBackend = RapierWorld> {
    registry: WorldRegistry<P>,
    sessions: HashMap<String, Session>,
    expiry: BinaryHeap<Reverse<(Duration, u64, String)>>,
    clock: Duration,
    timeout: Duration,
    next_id: u64,
}

impl SessionManager<RapierWorld> {
    pub fn new(profile: Arc<Profile>, timeout: Duration) -> Self {
        Self::with_registry(WorldRegistry::new(profile), timeout)
    }
}

impl<P: PhysicsBackend> SessionManager<P> {
    pub fn with_registry(registry: WorldRegistry<P>, timeout: Duration) -> Self {
        Self {
            registry,
            sessions: HashMap::new(),
            expiry: BinaryHeap::new(),
            clock: Duration::ZERO,
            timeout,
            next_id: 0,
        }
    }

    pub fn registry(&self) -> &WorldRegistry<P> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut WorldRegistry<P> {
        &mut self.registry
    }

    /// Simulated time since start.
    pub fn now(&self) -> Duration {
        self.clock
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Create a session and its vehicle. Returns the vehicle profile so the client can
    /// build matching visuals.
    pub fn join(&mut self, name: &str) -> Result<VehicleProfile, RegistryError> {
        if self.is_active(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        let pose = self.next_spawn_pose();
        self.registry.create_vehicle(name, pose)?;

        self.next_id += 1;
        let session = Session {
            id: self.next_id,
            deadline: self.clock + self.timeout,
        };
        self.sessions.insert(name.to_string(), session);
        self.expiry
            .push(Reverse((session.deadline, session.id, name.to_string())));
        tracing::info!(name, sessions = self.sessions.len(), "join");
        Ok(self.registry.vehicle_profile().clone())
    }

    /// Apply one driver input and return the world as seen by that session.
    ///
    /// An absent session is tolerated: nothing is created and the reply is empty.
    pub fn update(&mut self, input: &Input) -> Output {
        if !self.is_active(&input.name) {
            tracing::trace!(name = %input.name, "update for absent session");
            return Output::default();
        }
        if let Some(session) = self.sessions.get_mut(&input.name) {
            session.deadline = self.clock + self.timeout;
        }
        if let Err(e) = self
            .registry
            .apply_input(&input.name, DriverInput::from(input))
        {
            tracing::warn!(name = %input.name, error = %e, "input rejected, keeping previous targets");
        }
        build_output(&self.registry, &input.name)
    }

    /// End a session now. Idempotent; returns whether one was removed.
    pub fn bye(&mut self, name: &str) -> bool {
        let removed = self.end(name);
        if removed {
            tracing::info!(name, sessions = self.sessions.len(), "bye");
        }
        removed
    }

    /// Step the world by `dt` of simulated time, then reclaim expired sessions.
    /// Returns the names that expired.
    pub fn tick(&mut self, dt: Duration) -> Vec<String> {
        self.registry.step(dt.as_secs_f64());
        self.clock += dt;
        self.sweep()
    }

    /// Destroy every session whose deadline is at or before the current time.
    pub fn sweep(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        loop {
            match self.expiry.peek() {
                Some(Reverse((deadline, _, _))) if *deadline <= self.clock => {}
                _ => break,
            }
            let Some(Reverse((_, id, name))) = self.expiry.pop() else {
                break;
            };
            let session = match self.sessions.get(&name) {
                Some(session) if session.id == id => *session,
                // Ended by Bye, possibly rejoined since.
                _ => continue,
            };
            if session.deadline > self.clock {
                self.expiry.push(Reverse((session.deadline, id, name)));
                continue;
            }
            self.end(&name);
            tracing::info!(name = %name, sessions = self.sessions.len(), "expired");
            expired.push(name);
        }
        expired
    }

    fn end(&mut self, name: &str) -> bool {
        let had_session = self.sessions.remove(name).is_some();
        let had_vehicle = self.registry.destroy_vehicle(name);
        had_session || had_vehicle
    }

    /// First grid slot with no live chassis within [`SPAWN_CLEAR_RADIUS`]. Cars that
    /// drove off free their slot; cars parked near one keep it taken.
    fn next_spawn_pose(&self) -> SpawnPose {
        let mut occupied = Vec::with_capacity(self.registry.len());
        let physics = self.registry.physics();
        self.registry.for_each(|_, vehicle| {
            if let Some(at) = physics.attitude(vehicle.chassis) {
                occupied.push([at.position[0], at.position[2]]);
            }
        });

        // Each car blocks at most four slots, so this always finds one.
        let (x, z) = (0..)
            .map(spawn_slot)
            .find(|&(x, z)| {
                occupied.iter().all(|[ox, oz]| {
                    let (dx, dz) = (x - ox, z - oz);
                    (dx * dx + dz * dz).sqrt() >= SPAWN_CLEAR_RADIUS
                })
            })
            .unwrap_or((0.0, 0.0));

        let profile = self.registry.profile();
        let y = profile.world.ground_height
            + profile.vehicle.tire_radius()
            + profile.vehicle.suspension_travel
            + SPAWN_CLEARANCE;
        SpawnPose {
            position: [x, y, z],
        }
    }
}

/// Ground-plane position of grid slot `slot`, rows of [`SPAWN_COLUMNS`] centred on x = 0.
fn spawn_slot(slot: u64) -> (f64, f64) {
    let col = (slot % SPAWN_COLUMNS) as f64;
    let row = (slot / SPAWN_COLUMNS) as f64;
    let half = (SPAWN_COLUMNS - 1) as f64 / 2.0;
    ((col - half) * SPAWN_SPACING, row * SPAWN_SPACING)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(1);

    fn manager(timeout: Duration) -> SessionManager {
        SessionManager::new(Arc::new(Profile::default()), timeout)
    }

    fn input(name: &str, steering: f64, accel: f64, brake: f64) -> Input {
        Input {
            name: name.to_string(),
            steering,
            accel,
            brake,
        }
    }

    fn run(manager: &mut SessionManager, ticks: u32) -> Vec<String> {
        let mut expired = Vec::new();
        for _ in 0..ticks {
            expired.extend(manager.tick(TICK));
        }
        expired
    }

    #[test]
    fn second_join_with_same_name_is_duplicate() {
        let mut m = manager(DEFAULT_SESSION_TIMEOUT);
        assert!(m.join("p1").is_ok());
        assert_eq!(
            m.join("p1"),
            Err(RegistryError::DuplicateName("p1".to_string()))
        );
        assert_eq!(m.session_count(), 1);
    }

    #[test]
    fn join_returns_vehicle_profile() {
        let mut m = manager(DEFAULT_SESSION_TIMEOUT);
        let profile = m.join("p1").unwrap();
        assert_eq!(profile, VehicleProfile::default());
    }

    #[test]
    fn update_returns_self_with_four_tires() {
        let mut m = manager(DEFAULT_SESSION_TIMEOUT);
        m.join("p1").unwrap();
        for _ in 0..20 {
            let out = m.update(&input("p1", 0.3, 0.5, 0.0));
            let me = out.self_vehicle.expect("self present while active");
            assert_eq!(me.name, "p1");
            assert_eq!(me.tires.len(), 4);
            run(&mut m, 5);
        }
    }

    #[test]
    fn two_player_scenario() {
        let mut m = manager(DEFAULT_SESSION_TIMEOUT);
        m.join("p1").unwrap();
        m.join("p2").unwrap();

        let out = m.update(&input("p1", 1.0, 0.0, 0.0));
        assert_eq!(out.self_vehicle.unwrap().name, "p1");
        assert_eq!(out.others.len(), 1);
        assert_eq!(out.others[0].name, "p2");
    }

    #[test]
    fn update_for_unknown_name_is_empty_and_creates_nothing() {
        let mut m = manager(DEFAULT_SESSION_TIMEOUT);
        m.join("p1").unwrap();

        let out = m.update(&input("ghost", 0.0, 1.0, 0.0));
        assert!(out.self_vehicle.is_none());
        assert!(out.others.is_empty());
        assert!(!m.is_active("ghost"));
        assert_eq!(m.registry().len(), 1);
    }

    #[test]
    fn bye_is_idempotent_and_frees_name() {
        let mut m = manager(DEFAULT_SESSION_TIMEOUT);
        m.join("p1").unwrap();
        assert!(m.bye("p1"));
        assert!(!m.bye("p1"));
        assert!(!m.bye("never-joined"));
        assert_eq!(m.registry().len(), 0);
        assert!(m.join("p1").is_ok());
    }

    #[test]
    fn silent_session_expires_and_name_is_reusable() {
        let timeout = Duration::from_millis(50);
        let mut m = manager(timeout);
        m.join("p1").unwrap();

        assert!(run(&mut m, 49).is_empty());
        assert!(m.is_active("p1"));

        assert_eq!(run(&mut m, 1), vec!["p1".to_string()]);
        assert!(!m.is_active("p1"));
        assert_eq!(m.registry().len(), 0);
        assert!(m.join("p1").is_ok());
    }

    #[test]
    fn regular_updates_keep_session_alive() {
        let timeout = Duration::from_millis(50);
        let mut m = manager(timeout);
        m.join("p1").unwrap();
        m.join("quiet").unwrap();

        let mut expired = Vec::new();
        for _ in 0..10 {
            expired.extend(run(&mut m, 40));
            m.update(&input("p1", 0.0, 0.0, 0.0));
        }
        assert_eq!(expired, vec!["quiet".to_string()]);
        assert!(m.is_active("p1"));
        assert_eq!(m.now(), Duration::from_millis(400));
    }

    #[test]
    fn update_for_absent_session_does_not_extend_anything() {
        let timeout = Duration::from_millis(20);
        let mut m = manager(timeout);
        m.join("p1").unwrap();
        m.bye("p1");
        m.update(&input("p1", 0.0, 0.0, 0.0));
        assert!(run(&mut m, 30).is_empty());
        assert_eq!(m.session_count(), 0);
    }

    #[test]
    fn non_finite_input_still_counts_as_liveness() {
        let timeout = Duration::from_millis(30);
        let mut m = manager(timeout);
        m.join("p1").unwrap();
        run(&mut m, 20);

        let out = m.update(&input("p1", f64::NAN, 0.0, 0.0));
        assert_eq!(out.self_vehicle.unwrap().name, "p1");
        assert!(run(&mut m, 20).is_empty());
        assert!(m.is_active("p1"));
    }

    #[test]
    fn consecutive_joins_spawn_apart() {
        let mut m = manager(DEFAULT_SESSION_TIMEOUT);
        m.join("a").unwrap();
        m.join("b").unwrap();
        let out = m.update(&input("a", 0.0, 0.0, 0.0));
        let a = out.self_vehicle.unwrap().body.position;
        let b = out.others[0].body.position;
        let dx = a[0] - b[0];
        let dz = a[2] - b[2];
        assert!((dx * dx + dz * dz).sqrt() >= SPAWN_SPACING - 1e-6);
    }
    fn spawn_positions(m: &SessionManager) -> Vec<(String, [f64; 3])> {
        let physics = m.registry().physics();
        let mut out = Vec::new();
        m.registry().for_each(|name, vehicle| {
            let at = physics.attitude(vehicle.chassis).unwrap();
            out.push((name.to_string(), at.position));
        });
        out
    }

    #[test]
    fn sixty_five_live_cars_never_share_a_spawn_slot() {
        let mut m = manager(DEFAULT_SESSION_TIMEOUT);
        for i in 0..65 {
            m.join(&format!("c{i}")).unwrap();
        }

        let cars = spawn_positions(&m);
        assert_eq!(cars.len(), 65);
        for (i, (a_name, a)) in cars.iter().enumerate() {
            for (b_name, b) in &cars[i + 1..] {
                let (dx, dz) = (a[0] - b[0], a[2] - b[2]);
                assert!(
                    (dx * dx + dz * dz).sqrt() >= SPAWN_SPACING - 1e-6,
                    "{a_name} and {b_name} spawned on top of each other"
                );
            }
        }
    }

    #[test]
    fn slot_freed_by_bye_is_reused_without_overlap() {
        let mut m = manager(DEFAULT_SESSION_TIMEOUT);
        m.join("a").unwrap();
        m.join("b").unwrap();
        m.bye("a");
        m.join("c").unwrap();

        let cars = spawn_positions(&m);
        let b = cars.iter().find(|(n, _)| n == "b").unwrap().1;
        let c = cars.iter().find(|(n, _)| n == "c").unwrap().1;
        let (first_x, first_z) = spawn_slot(0);
        assert!((c[0] - first_x).abs() < 1e-6 && (c[2] - first_z).abs() < 1e-6);
        assert!(((b[0] - c[0]).powi(2) + (b[2] - c[2]).powi(2)).sqrt() >= SPAWN_SPACING - 1e-6);
    }

    #[test]
    fn frequent_updates_keep_one_heap_entry_per_session() {
        let timeout = Duration::from_millis(50);
        let mut m = manager(timeout);
        m.join("p1").unwrap();
        for _ in 0..300 {
            m.update(&input("p1", 0.0, 0.0, 0.0));
            run(&mut m, 1);
        }
        assert!(m.is_active("p1"));
        assert_eq!(m.expiry.len(), 1);

        assert_eq!(run(&mut m, 50), vec!["p1".to_string()]);
        assert!(m.expiry.is_empty());
    }

    #[test]
    fn rejoin_after_bye_gets_a_full_timeout() {
        let timeout = Duration::from_millis(50);
        let mut m = manager(timeout);
        m.join("p1").unwrap();
        run(&mut m, 30);
        m.bye("p1");
        m.join("p1").unwrap();

        assert!(run(&mut m, 25).is_empty());
        assert!(m.is_active("p1"));
        assert_eq!(run(&mut m, 25), vec!["p1".to_string()]);
    }
}
