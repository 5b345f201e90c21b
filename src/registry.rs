//! Tracks the vehicles reported by the server and the modules simulating them.

use crate::error::{ConfigError, Result};
use crate::grid::Grid;
use crate::host::{HostRuntime, MobilityState, ModuleSpec};
use crate::mapping::ModuleMappings;
use crate::math::{Point2d, Point3d};
use crate::roi::RegionOfInterest;
use crate::time::SimTime;
use crate::vehicle::{EntityRef, HostPosition, ManagedVehicle, UnequippedVehicle};
use crate::{ManagedId, UnequippedId};
use log::debug;
use slotmap::SlotMap;
use std::collections::HashMap;

/// Decides which vehicles get a module so that the share of managed vehicles
/// tracks a target rate.
///
/// Each decision picks whichever outcome leaves the managed share closer to the
/// target, so the share converges regardless of the order vehicles arrive in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PenetrationPolicy {
    rate: f64,
}

impl PenetrationPolicy {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// The target share of managed vehicles.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Whether the next vehicle should be managed, given the current counts.
    /// Ties are resolved in favour of managing the vehicle.
    pub fn equip(&self, managed: usize, unequipped: usize) -> bool {
        let total = (managed + unequipped) as f64 + 1.0;
        let left_out = managed as f64 / total;
        let taken_in = (managed + 1) as f64 / total;
        (left_out - self.rate).abs() >= (taken_in - self.rate).abs()
    }
}

/// The outcome of [Registry::admit].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A module was created for the vehicle.
    Managed(ManagedId),
    /// The vehicle is tracked without a module.
    Unequipped(UnequippedId),
    /// The vehicle is outside the region of interest.
    Rejected,
}

/// The vehicles inside the region of interest, indexed by identifier and by grid cell.
///
/// An identifier is known as either a managed or an unequipped vehicle, never both,
/// and keeps its category until it is removed.
pub struct Registry {
    /// The vehicles simulated by a module.
    managed: SlotMap<ManagedId, ManagedVehicle>,
    /// The vehicles tracked without a module.
    unequipped: SlotMap<UnequippedId, UnequippedVehicle>,
    /// Maps server identifiers to the vehicle they name.
    index: HashMap<String, EntityRef>,
    /// The spatial index over both kinds of vehicles.
    grid: Grid<EntityRef>,
    mappings: ModuleMappings,
    roi: RegionOfInterest,
    policy: PenetrationPolicy,
    /// The module vector index handed to the next module.
    next_vector_index: usize,
}

impl Registry {
    pub fn new(
        grid: Grid<EntityRef>,
        mappings: ModuleMappings,
        roi: RegionOfInterest,
        policy: PenetrationPolicy,
    ) -> Self {
        Self {
            managed: SlotMap::with_key(),
            unequipped: SlotMap::with_key(),
            index: HashMap::new(),
            grid,
            mappings,
            roi,
            policy,
            next_vector_index: 0,
        }
    }

    /// Whether a vehicle at `position` (server coordinates) on `road_id` is simulated locally.
    pub fn in_region(&self, position: Point2d, road_id: &str) -> bool {
        self.roi.contains(position, road_id)
    }

    /// Starts tracking a vehicle seen for the first time.
    ///
    /// Vehicles outside the region of interest are rejected. Vehicles whose type
    /// maps to no module, or which the penetration policy leaves out, are
    /// tracked as unequipped. All others get a module built for them, started at
    /// `start_at`.
    ///
    /// # Panics
    /// Panics if the identifier is already tracked.
    pub fn admit<H: HostRuntime>(
        &mut self,
        host: &mut H,
        id: &str,
        class: &str,
        server_position: Point2d,
        state: &MobilityState,
        start_at: SimTime,
    ) -> Result<Admission> {
        if self.index.contains_key(id) {
            panic!("tried adding duplicate vehicle \"{}\"", id);
        }
        if !self.in_region(server_position, &state.road_id) {
            return Ok(Admission::Rejected);
        }

        let choice = match self.mappings.resolve(class)? {
            Some(choice) if self.policy.equip(self.managed.len(), self.unequipped.len()) => choice,
            _ => return Ok(Admission::Unequipped(self.track_unequipped(id, state))),
        };
        if !host.module_type_exists(&choice.type_name) {
            return Err(ConfigError::UnknownModuleType(choice.type_name).into());
        }

        let index = self.next_vector_index;
        self.next_vector_index += 1;
        let handle = host.create_module(&ModuleSpec {
            type_name: &choice.type_name,
            name: &choice.name,
            index,
            vector_size: index + 1,
        });
        if !choice.display_string.is_empty() {
            host.set_display_string(handle.module, &choice.display_string);
        }
        host.build_inside(handle.module);
        host.schedule_start(handle.module, start_at);
        if let Some(mobility) = handle.mobility {
            host.pre_initialize_mobility(mobility, id, state);
        }
        host.call_initialize(handle.module);
        if let Some(nic) = handle.nic {
            host.register_nic(nic);
        }

        let key = self.managed.insert_with_key(|key| {
            let record = EntityRef::Managed(key);
            let host_pos =
                HostPosition::place(&mut self.grid, id, record, state.position, state.angle, state.elevation);
            ManagedVehicle::new(key, id, class, handle, host_pos)
        });
        self.index.insert(id.to_string(), EntityRef::Managed(key));

        if let Some(mobility) = handle.mobility {
            host.change_position(mobility);
        }
        debug!("added vehicle #{} as {}", id, choice.type_name);
        Ok(Admission::Managed(key))
    }

    fn track_unequipped(&mut self, id: &str, state: &MobilityState) -> UnequippedId {
        let key = self.unequipped.insert_with_key(|key| {
            let record = EntityRef::Unequipped(key);
            let host_pos =
                HostPosition::place(&mut self.grid, id, record, state.position, state.angle, state.elevation);
            UnequippedVehicle::new(key, id, host_pos)
        });
        self.index.insert(id.to_string(), EntityRef::Unequipped(key));
        debug!("tracking unequipped vehicle #{}", id);
        key
    }

    /// Moves a tracked vehicle. Managed vehicles also pass the new state to their module.
    ///
    /// # Panics
    /// Panics if the identifier is not tracked.
    pub fn update<H: HostRuntime>(&mut self, host: &mut H, id: &str, state: &MobilityState) {
        match self.index.get(id).copied() {
            Some(record @ EntityRef::Managed(key)) => {
                let vehicle = &mut self.managed[key];
                vehicle
                    .host_pos
                    .relocate(&mut self.grid, id, record, state.position, state.angle, state.elevation);
                if let Some(mobility) = vehicle.handle().mobility {
                    host.next_position(mobility, state);
                }
            }
            Some(record @ EntityRef::Unequipped(key)) => {
                self.unequipped[key].host_pos.relocate(
                    &mut self.grid,
                    id,
                    record,
                    state.position,
                    state.angle,
                    state.elevation,
                );
            }
            None => panic!("tried updating unknown vehicle \"{}\"", id),
        }
    }

    /// Stops tracking a vehicle, finishing and deleting its module if it has one.
    ///
    /// # Panics
    /// Panics if the identifier is not tracked.
    pub fn remove<H: HostRuntime>(&mut self, host: &mut H, id: &str) {
        match self.index.remove(id) {
            Some(EntityRef::Managed(key)) => {
                let vehicle = self.managed.remove(key).expect("vehicle index out of sync");
                let handle = *vehicle.handle();
                if let Some(nic) = handle.nic {
                    host.unregister_nic(nic);
                }
                vehicle.host_pos.erase(&mut self.grid, id);
                host.call_finish(handle.module);
                host.delete_module(handle.module);
                debug!("removed vehicle #{}", id);
            }
            Some(EntityRef::Unequipped(key)) => {
                let vehicle = self.unequipped.remove(key).expect("vehicle index out of sync");
                vehicle.host_pos.erase(&mut self.grid, id);
                debug!("removed unequipped vehicle #{}", id);
            }
            None => panic!("no vehicle with id \"{}\" found", id),
        }
    }

    /// Removes a vehicle if it is tracked. Returns whether it was.
    pub fn discard<H: HostRuntime>(&mut self, host: &mut H, id: &str) -> bool {
        if !self.index.contains_key(id) {
            return false;
        }
        self.remove(host, id);
        true
    }

    /// Sets the parking state of a managed vehicle. Returns whether the vehicle is managed.
    pub fn set_parked<H: HostRuntime>(&mut self, host: &mut H, id: &str, parked: bool) -> bool {
        let Some(EntityRef::Managed(key)) = self.index.get(id).copied() else {
            return false;
        };
        let vehicle = &mut self.managed[key];
        vehicle.set_parked(parked);
        if let Some(mobility) = vehicle.handle().mobility {
            host.change_parking_state(mobility, parked);
        }
        true
    }

    /// Removes every managed vehicle and returns how many there were.
    pub fn clear_managed<H: HostRuntime>(&mut self, host: &mut H) -> usize {
        let ids = self
            .managed
            .values()
            .map(|vehicle| vehicle.external_id().to_string())
            .collect::<Vec<_>>();
        for id in &ids {
            self.remove(host, id);
        }
        ids.len()
    }

    /// Finds the vehicles registered in the grid cells within `radius` of `position`.
    pub fn hosts_near(&self, position: Point3d, radius: f64) -> Vec<&str> {
        self.grid
            .query(position, radius)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// Looks up what kind of vehicle an identifier names.
    pub fn lookup(&self, id: &str) -> Option<EntityRef> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Gets a managed vehicle by its server identifier.
    pub fn managed(&self, id: &str) -> Option<&ManagedVehicle> {
        match self.lookup(id)? {
            EntityRef::Managed(key) => self.managed.get(key),
            EntityRef::Unequipped(_) => None,
        }
    }

    /// Gets an unequipped vehicle by its server identifier.
    pub fn unequipped(&self, id: &str) -> Option<&UnequippedVehicle> {
        match self.lookup(id)? {
            EntityRef::Unequipped(key) => self.unequipped.get(key),
            EntityRef::Managed(_) => None,
        }
    }

    /// Returns an iterator over the managed vehicles.
    pub fn iter_managed(&self) -> impl Iterator<Item = &ManagedVehicle> {
        self.managed.values()
    }

    /// Returns an iterator over the unequipped vehicles.
    pub fn iter_unequipped(&self) -> impl Iterator<Item = &UnequippedVehicle> {
        self.unequipped.values()
    }

    pub fn managed_count(&self) -> usize {
        self.managed.len()
    }

    pub fn unequipped_count(&self) -> usize {
        self.unequipped.len()
    }

    pub fn grid(&self) -> &Grid<EntityRef> {
        &self.grid
    }

    pub fn roi(&self) -> &RegionOfInterest {
        &self.roi
    }

    pub fn policy(&self) -> &PenetrationPolicy {
        &self.policy
    }
}
