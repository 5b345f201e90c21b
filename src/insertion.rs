//! Keeps the number of vehicles in the traffic simulation at a target by
//! asking the server to insert more.

use crate::command::DEFAULT_VEHTYPE;
use crate::connection::Connection;
use crate::error::Result;
use crate::time::SimTime;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::{Read, Write};

/// Queues and performs vehicle insertions.
#[derive(Clone, Debug)]
pub struct VehicleInserter {
    /// The number of vehicles to keep in the simulation, or zero to insert none.
    target: usize,
    /// Whether routes belonging to a route distribution are skipped.
    use_route_distributions: bool,
    rng: StdRng,
    /// The vehicle types to pick from.
    vehicle_types: Vec<String>,
    /// The routes to pick from.
    routes: Vec<String>,
    /// Vehicle types waiting to be inserted, by route index.
    queue: BTreeMap<usize, VecDeque<String>>,
    /// Vehicles the server accepted that have not been seen yet.
    queued: BTreeSet<String>,
    /// The number of vehicles inserted so far, used to name the next one.
    name_counter: usize,
}

impl VehicleInserter {
    pub fn new(target: usize, seed: u64, use_route_distributions: bool) -> Self {
        Self {
            target,
            use_route_distributions,
            rng: StdRng::seed_from_u64(seed),
            vehicle_types: vec![],
            routes: vec![],
            queue: BTreeMap::new(),
            queued: BTreeSet::new(),
            name_counter: 0,
        }
    }

    /// Whether any vehicles are to be inserted.
    pub fn is_enabled(&self) -> bool {
        self.target > 0
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn vehicle_types(&self) -> &[String] {
        &self.vehicle_types
    }

    pub fn set_vehicle_types(&mut self, vehicle_types: Vec<String>) {
        self.vehicle_types = vehicle_types;
    }

    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    /// Sets the routes to pick from, dropping members of route distributions if requested.
    pub fn set_routes(&mut self, routes: Vec<String>) {
        self.routes = routes
            .into_iter()
            .filter(|route| {
                let member = self.use_route_distributions && route.contains('#');
                if member {
                    debug!("omitting route {} as it seems to be a member of a route distribution", route);
                }
                !member
            })
            .collect();
    }

    /// Queues enough insertions to make up for the vehicles missing from the target.
    /// Returns the number of insertions queued.
    pub fn fill(&mut self, active: usize) -> usize {
        let missing = self.target.saturating_sub(active + self.queued.len() + self.pending());
        if missing == 0 {
            return 0;
        }
        if self.routes.is_empty() {
            warn!("no routes to insert {} missing vehicles on", missing);
            return 0;
        }
        for _ in 0..missing {
            let vehicle_type = if self.vehicle_types.is_empty() {
                DEFAULT_VEHTYPE.to_string()
            } else {
                self.vehicle_types[self.rng.gen_range(0..self.vehicle_types.len())].clone()
            };
            let route = self.rng.gen_range(0..self.routes.len());
            self.queue.entry(route).or_default().push_back(vehicle_type);
        }
        missing
    }

    /// Asks the server to insert every queued vehicle, departing at `depart`.
    ///
    /// The queue is emptied either way; refused insertions are queued again by
    /// [Self::fill] if vehicles are still missing. Returns the number accepted.
    pub fn drain<S: Read + Write>(&mut self, connection: &mut Connection<S>, depart: SimTime) -> Result<usize> {
        let mut accepted = 0;
        for (route_index, vehicle_types) in std::mem::take(&mut self.queue) {
            let route = &self.routes[route_index];
            for vehicle_type in vehicle_types {
                let vehicle_id = format!("{}_{}", vehicle_type, self.name_counter);
                debug!("trying to add {} with {} vehicle type {}", vehicle_id, route, vehicle_type);
                if connection.add_vehicle(&vehicle_id, &vehicle_type, route, depart)? {
                    debug!("successfully inserted {}", vehicle_id);
                    self.queued.insert(vehicle_id);
                    self.name_counter += 1;
                    accepted += 1;
                }
            }
        }
        Ok(accepted)
    }

    /// Marks a vehicle as having shown up in the simulation.
    pub fn forget(&mut self, vehicle_id: &str) {
        self.queued.remove(vehicle_id);
    }

    /// The vehicles the server accepted that have not been seen yet.
    pub fn queued(&self) -> &BTreeSet<String> {
        &self.queued
    }

    /// The number of insertions waiting to be attempted.
    pub fn pending(&self) -> usize {
        self.queue.values().map(VecDeque::len).sum()
    }
}
