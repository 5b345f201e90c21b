//! Keeps the host's view of the road traffic in step with a TraCI server.

use crate::config::{ManagerConfig, Settings};
use crate::connection::{Connection, NetBounds};
use crate::error::{ConfigError, Error, ProtocolError, Result};
use crate::grid::Grid;
use crate::host::{HostRuntime, MobilityState, ModuleSpec, TrafficLightChange, VehicleSignal};
use crate::insertion::VehicleInserter;
use crate::light::TrafficLight;
use crate::math::{Point2d, Point3d};
use crate::registry::Registry;
use crate::subscription::{reconcile, SimulationEvent, SubscriptionResult, VehicleSample, VehicleUpdate};
use crate::time::{SimTime, TimeFormat};
use crate::TrafficLightId;
use cgmath::MetricSpace;
use log::{debug, info, warn};
use slotmap::SlotMap;
use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};
use std::net::TcpStream;

/// How many vehicles the server reports in each state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VehicleCounts {
    /// Vehicles that departed and have not arrived or started teleporting.
    pub active: usize,
    /// Active vehicles that are not parked.
    pub driving: usize,
    pub parking: usize,
}

/// Mirrors the vehicles and traffic lights of a TraCI server into a host.
///
/// The host drives the manager: [Self::connect] or [Self::attach] at the
/// configured connect time, then [Self::step] at each time it returns, and
/// finally [Self::finish].
pub struct ScenarioManager<H: HostRuntime, S = TcpStream> {
    settings: Settings,
    host: H,
    connection: Option<Connection<S>>,
    /// The vehicles inside the region of interest.
    registry: Registry,
    /// The mirrored traffic lights.
    lights: SlotMap<TrafficLightId, TrafficLight>,
    light_index: HashMap<String, TrafficLightId>,
    /// The vehicles whose variables are subscribed to.
    subscribed: BTreeSet<String>,
    inserter: VehicleInserter,
    counts: VehicleCounts,
    auto_shutdown_triggered: bool,
    /// The total area of the region of interest rectangles, in m².
    roi_area: f64,
    /// The current simulation time in s.
    now: SimTime,
}

impl<H: HostRuntime> ScenarioManager<H, TcpStream> {
    /// Connects to the configured server and sets up the run.
    pub fn connect(&mut self) -> Result<()> {
        let connection = Connection::connect(&self.settings.config.host, self.settings.config.port)?;
        self.attach(connection)
    }
}

impl<H: HostRuntime, S: Read + Write> ScenarioManager<H, S> {
    /// Creates a manager. Fails if the configuration is invalid.
    pub fn new(config: &ManagerConfig, host: H) -> Result<Self> {
        let settings = config.validate()?;
        let playground = host.playground();
        let grid = Grid::new(playground.x, playground.y, config.car_cell_size);
        let registry = Registry::new(
            grid,
            settings.mappings.clone(),
            settings.roi.clone(),
            settings.penetration,
        );
        let inserter = VehicleInserter::new(
            config.num_vehicles,
            config.vehicle_rng_seed,
            config.use_route_distributions,
        );
        Ok(Self {
            now: config.connect_at,
            settings,
            host,
            connection: None,
            registry,
            lights: SlotMap::with_key(),
            light_index: HashMap::new(),
            subscribed: BTreeSet::new(),
            inserter,
            counts: Default::default(),
            auto_shutdown_triggered: false,
            roi_area: 0.0,
        })
    }

    /// Sets the run up over an established connection.
    ///
    /// Negotiates the time format, sets up the coordinate transform, subscribes
    /// to the simulation and the vehicle list, mirrors the traffic lights and
    /// obstacles, and draws the region of interest.
    pub fn attach(&mut self, mut connection: Connection<S>) -> Result<()> {
        connection.set_ignore_gui_commands(self.settings.config.ignore_gui_commands);
        let (api_version, server) = connection.api_version()?;
        info!("TraCI server \"{}\" reports API version {}", server, api_version);
        connection.set_time_format(TimeFormat::for_api_version(api_version)?);

        let (min, max) = connection.network_boundaries()?;
        let bounds = NetBounds::new(min, max, self.settings.config.margin);
        connection.set_bounds(bounds);
        let extent = bounds.world_extent();
        let playground = self.host.playground();
        if extent.x > playground.x || extent.y > playground.y {
            warn!(
                "WARNING: Playground size ({:.2}, {:.2}) might be too small for vehicle at network bounds ({:.2}, {:.2})",
                playground.x, playground.y, extent.x, extent.y
            );
        }
        self.connection = Some(connection);

        let result = self.connection()?.subscribe_simulation()?;
        self.apply(result)?;
        let result = self.connection()?.subscribe_vehicle_list()?;
        self.apply(result)?;

        self.init_traffic_lights()?;
        self.init_obstacles()?;
        self.host.emit_initialized();
        self.draw_roi(bounds);
        info!("initialized TraCI connection");
        Ok(())
    }

    fn connection(&mut self) -> Result<&mut Connection<S>> {
        self.connection.as_mut().ok_or(Error::NotConnected)
    }

    fn init_traffic_lights(&mut self) -> Result<()> {
        let config = &self.settings.config;
        let type_name = config.traffic_light_module_type.clone();
        let name = config.traffic_light_module_name.clone();
        let display_string = config.traffic_light_module_display_string.clone();
        let interval = config.update_interval;
        let filter = self.settings.traffic_light_filter.clone();
        if type_name.is_empty() || filter.is_empty() {
            return Ok(());
        }
        if !self.host.module_type_exists(&type_name) {
            return Err(ConfigError::UnknownModuleType(type_name).into());
        }

        let tl_ids = self.connection()?.traffic_light_ids()?;
        let vector_size = tl_ids.len();
        for (index, tl_id) in tl_ids.iter().filter(|id| filter.contains(*id)).enumerate() {
            let junction = self.connection()?.junction_position(tl_id)?;
            let position = self.connection()?.bounds().to_world(Point3d::new(junction.x, junction.y, 0.0));

            let handle = self.host.create_module(&ModuleSpec {
                type_name: &type_name,
                name: &name,
                index,
                vector_size,
            });
            if !display_string.is_empty() {
                self.host.set_display_string(handle.module, &display_string);
            }
            self.host.build_inside(handle.module);
            self.host.schedule_start(handle.module, self.now + interval);
            if let Some(tl_interface) = handle.tl_interface {
                self.host.pre_initialize_traffic_light(tl_interface, tl_id, position, interval);
            }
            if let Some(mobility) = handle.mobility {
                self.host.place_mobility(mobility, position);
            }
            self.host.call_initialize(handle.module);

            let key = self
                .lights
                .insert_with_key(|key| TrafficLight::new(key, tl_id, handle, position));
            self.light_index.insert(tl_id.clone(), key);
            debug!("added traffic light {}", tl_id);

            let result = self.connection()?.subscribe_traffic_light(tl_id)?;
            self.apply(result)?;
        }
        Ok(())
    }

    fn init_obstacles(&mut self) -> Result<()> {
        if self.host.obstacles().is_none() {
            return Ok(());
        }
        let playground = self.host.playground();
        for polygon_id in self.connection()?.polygon_ids()? {
            let type_id = self.connection()?.polygon_type(&polygon_id)?;
            let supported = self
                .host
                .obstacles()
                .map_or(false, |obstacles| obstacles.is_type_supported(&type_id));
            if !supported {
                continue;
            }
            let bounds = *self.connection()?.bounds();
            let shape = self
                .connection()?
                .polygon_shape(&polygon_id)?
                .into_iter()
                .map(|p| bounds.to_world(Point3d::new(p.x, p.y, 0.0)))
                .collect::<Vec<_>>();
            let height = self.connection()?.polygon_layer(&polygon_id)? as f64;
            for p in &shape {
                if p.x < 0.0 || p.y < 0.0 || p.x > playground.x || p.y > playground.y {
                    warn!(
                        "WARNING: Playground ({:.2}, {:.2}) will not fit radio obstacle at ({:.2}, {:.2})",
                        playground.x, playground.y, p.x, p.y
                    );
                }
            }
            if let Some(obstacles) = self.host.obstacles() {
                obstacles.add_from_shape(&polygon_id, &type_id, &shape, height);
            }
        }
        Ok(())
    }

    fn draw_roi(&mut self, bounds: NetBounds) {
        for rect in self.registry.roi().rects() {
            let corners = rect.corners().map(|corner| bounds.to_world(corner));
            if let Some(annotations) = self.host.annotations() {
                annotations.draw_polygon(&corners, "black");
            }
            self.roi_area += corners[0].distance(corners[1]) * corners[0].distance(corners[3]);
        }
    }

    /// Advances the server to `now` and applies what it reports.
    ///
    /// Returns the time of the next step, or `None` once every vehicle has
    /// arrived and auto shutdown is enabled.
    pub fn step(&mut self, now: SimTime) -> Result<Option<SimTime>> {
        self.now = now;
        if self.connection.is_some() {
            if now > 1.0 && self.inserter.is_enabled() {
                self.fill_insertion_queue()?;
            }
            let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;
            self.inserter.drain(connection, now)?;

            debug!("triggering TraCI server simulation advance to t={}", now);
            let results = self.connection()?.simulation_step(now)?;
            debug!("getting {} subscription results", results.remaining());
            for result in results {
                self.apply(result?)?;
            }
        }
        if self.auto_shutdown_triggered {
            return Ok(None);
        }
        Ok(Some(now + self.settings.config.update_interval))
    }

    fn fill_insertion_queue(&mut self) -> Result<()> {
        if self.inserter.vehicle_types().is_empty() {
            let vehicle_types = self.connection()?.vehicle_type_ids()?;
            self.inserter.set_vehicle_types(vehicle_types);
        }
        if self.inserter.routes().is_empty() {
            let routes = self.connection()?.route_ids()?;
            self.inserter.set_routes(routes);
        }
        self.inserter.fill(self.counts.active);
        Ok(())
    }

    fn apply(&mut self, result: SubscriptionResult) -> Result<()> {
        match result {
            SubscriptionResult::Simulation { events, .. } => {
                for event in events {
                    self.apply_simulation_event(event);
                }
                Ok(())
            }
            SubscriptionResult::Vehicle { object_id, update } => self.apply_vehicle_update(&object_id, update),
            SubscriptionResult::TrafficLight { object_id, changes } => {
                self.apply_traffic_light_changes(&object_id, &changes)
            }
        }
    }

    fn apply_simulation_event(&mut self, event: SimulationEvent) {
        let counts = &mut self.counts;
        match event {
            SimulationEvent::Departed(ids) => {
                debug!("{} vehicles departed", ids.len());
                counts.active += ids.len();
                counts.driving += ids.len();
            }
            SimulationEvent::Arrived(ids) => {
                debug!("{} vehicles arrived", ids.len());
                for id in &ids {
                    self.subscribed.remove(id);
                    self.registry.discard(&mut self.host, id);
                    self.inserter.forget(id);
                }
                if !ids.is_empty() && ids.len() >= counts.active && self.settings.config.auto_shutdown {
                    info!("all vehicles have arrived, shutting down");
                    self.auto_shutdown_triggered = true;
                }
                counts.active = counts.active.saturating_sub(ids.len());
                counts.driving = counts.driving.saturating_sub(ids.len());
            }
            SimulationEvent::TeleportStarting(ids) => {
                debug!("{} vehicles are teleporting", ids.len());
                for id in &ids {
                    self.registry.discard(&mut self.host, id);
                }
                counts.active = counts.active.saturating_sub(ids.len());
                counts.driving = counts.driving.saturating_sub(ids.len());
            }
            SimulationEvent::TeleportEnding(ids) => {
                debug!("{} vehicles ended teleporting", ids.len());
                counts.active += ids.len();
                counts.driving += ids.len();
            }
            SimulationEvent::ParkingStarting(ids) => {
                debug!("{} vehicles started parking", ids.len());
                for id in &ids {
                    self.registry.set_parked(&mut self.host, id, true);
                }
                counts.parking += ids.len();
                counts.driving = counts.driving.saturating_sub(ids.len());
            }
            SimulationEvent::ParkingEnding(ids) => {
                debug!("{} vehicles ended parking", ids.len());
                for id in &ids {
                    self.registry.set_parked(&mut self.host, id, false);
                }
                counts.parking = counts.parking.saturating_sub(ids.len());
                counts.driving += ids.len();
            }
            SimulationEvent::Clock(time) => {
                if (time - self.now).abs() > 1e-9 {
                    warn!("TraCI server reports time {} s while expecting {} s", time, self.now);
                }
            }
        }
    }

    fn apply_vehicle_update(&mut self, object_id: &str, update: VehicleUpdate) -> Result<()> {
        let subscribed = self.subscribed.contains(object_id);
        if subscribed {
            if let Some(error) = update.errors.into_iter().next() {
                return Err(ProtocolError::from(error).into());
            }
        }
        if let Some(active) = update.id_list {
            self.reconcile_vehicles(active)?;
        }
        if !subscribed {
            return Ok(());
        }
        match update.record.complete() {
            Some(sample) => self.apply_vehicle_sample(object_id, sample),
            None => Ok(()),
        }
    }

    fn reconcile_vehicles(&mut self, active: Vec<String>) -> Result<()> {
        debug!("TraCI server reports {} active vehicles", active.len());
        if active.len() != self.counts.active {
            warn!(
                "vehicle list holds {} vehicles while {} are counted active",
                active.len(),
                self.counts.active
            );
        }
        let active = active.into_iter().collect::<BTreeSet<_>>();
        let (subscribe, unsubscribe) = reconcile(&self.subscribed, &active);
        for id in subscribe {
            self.subscribed.insert(id.clone());
            let result = self.connection()?.subscribe_vehicle(&id)?;
            self.apply(result)?;
        }
        for id in unsubscribe {
            self.subscribed.remove(&id);
            self.connection()?.unsubscribe_vehicle(&id)?;
        }
        Ok(())
    }

    fn apply_vehicle_sample(&mut self, id: &str, sample: VehicleSample) -> Result<()> {
        let bounds = *self.connection()?.bounds();
        let position = bounds.to_world(sample.position);
        if position.x < 0.0 || position.y < 0.0 {
            return Err(ProtocolError::BadPosition {
                x: sample.position.x,
                y: sample.position.y,
                world_x: position.x,
                world_y: position.y,
            }
            .into());
        }
        let server_position = Point2d::new(sample.position.x, sample.position.y);
        let state = MobilityState {
            position,
            road_id: sample.road_id,
            speed: sample.speed,
            angle: bounds.angle_to_world(sample.angle),
            elevation: sample.slope.to_radians(),
            signals: VehicleSignal(sample.signals),
            length: sample.length,
            height: sample.height,
            width: sample.width,
        };

        if !self.registry.in_region(server_position, &state.road_id) {
            if self.registry.discard(&mut self.host, id) {
                debug!("vehicle #{} left the region of interest", id);
            }
            return Ok(());
        }
        if self.registry.contains(id) {
            self.registry.update(&mut self.host, id, &state);
            return Ok(());
        }

        let class = self.connection()?.vehicle_type(id)?;
        let start_at = self.now + self.settings.config.update_interval;
        self.registry
            .admit(&mut self.host, id, &class, server_position, &state, start_at)?;
        self.inserter.forget(id);
        Ok(())
    }

    fn apply_traffic_light_changes(&mut self, tl_id: &str, changes: &[TrafficLightChange]) -> Result<()> {
        let key = self
            .light_index
            .get(tl_id)
            .copied()
            .ok_or_else(|| ProtocolError::UnknownObject {
                class: "traffic light",
                id: tl_id.to_string(),
            })?;
        let light = &mut self.lights[key];
        for change in changes {
            light.apply(change);
            if let Some(tl_interface) = light.interface() {
                self.host.update_traffic_light(tl_interface, change);
            }
        }
        Ok(())
    }

    /// Ends the run: closes the connection, records results and removes every managed vehicle.
    pub fn finish(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.host
            .record_scalar("numVehicles", self.registry.managed_count() as f64);
        self.registry.clear_managed(&mut self.host);
        self.host.record_scalar("roiArea", self.roi_area);
    }

    /// Finds the vehicles registered near a world position.
    pub fn hosts_near(&self, position: Point3d, radius: f64) -> Vec<&str> {
        self.registry.hosts_near(position, radius)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The connection to the server, for commands outside the manager's own.
    pub fn connection_mut(&mut self) -> Option<&mut Connection<S>> {
        self.connection.as_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The vehicles whose variables are subscribed to.
    pub fn subscribed_vehicles(&self) -> &BTreeSet<String> {
        &self.subscribed
    }

    pub fn inserter(&self) -> &VehicleInserter {
        &self.inserter
    }

    pub fn counts(&self) -> VehicleCounts {
        self.counts
    }

    /// Whether every vehicle has arrived and stepping should stop.
    pub fn auto_shutdown_triggered(&self) -> bool {
        self.auto_shutdown_triggered
    }

    /// The total area of the region of interest rectangles, in m².
    pub fn roi_area(&self) -> f64 {
        self.roi_area
    }

    /// The time of the first step.
    pub fn first_step_at(&self) -> SimTime {
        self.settings.first_step_at
    }

    /// Gets a traffic light by the server's identifier.
    pub fn traffic_light(&self, tl_id: &str) -> Option<&TrafficLight> {
        self.light_index.get(tl_id).map(|key| &self.lights[*key])
    }

    /// Returns an iterator over the mirrored traffic lights.
    pub fn iter_traffic_lights(&self) -> impl Iterator<Item = &TrafficLight> {
        self.lights.values()
    }
}
