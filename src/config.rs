//! Parameters of a run.

use crate::error::ConfigError;
use crate::mapping::ModuleMappings;
use crate::registry::PenetrationPolicy;
use crate::roi::RegionOfInterest;
use crate::time::SimTime;
use serde::{Deserialize, Serialize};

/// The parameters of a [ScenarioManager](crate::ScenarioManager), as written
/// in a configuration file. Missing fields take their default values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// When to connect to the server, in s.
    pub connect_at: SimTime,
    /// When to perform the first step, in s. `-1` means one interval after connecting.
    pub first_step_at: SimTime,
    /// The time between steps, in s.
    pub update_interval: SimTime,
    pub host: String,
    pub port: u16,
    /// Whether to skip commands that only affect the server's GUI.
    pub ignore_gui_commands: bool,
    /// Module types by vehicle type, e.g. `"car=Car bus=Bus *=0"`.
    pub module_type: String,
    /// Module names by vehicle type.
    pub module_name: String,
    /// Module display strings by vehicle type. May be empty.
    pub module_display_string: String,
    /// The module type of traffic lights. Empty to mirror no traffic lights.
    pub traffic_light_module_type: String,
    pub traffic_light_module_name: String,
    pub traffic_light_module_display_string: String,
    /// The space separated identifiers of the traffic lights to mirror.
    pub traffic_light_filter: String,
    /// The share of vehicles that get a module.
    pub penetration_rate: f64,
    /// Space separated roads whose vehicles are simulated.
    pub roi_roads: String,
    /// Space separated `x1,y1-x2,y2` rectangles whose vehicles are simulated.
    pub roi_rects: String,
    /// The edge length of a spatial index cell in m, or zero for a single cell.
    pub car_cell_size: f64,
    /// The number of vehicles to keep in the simulation, or zero to insert none.
    pub num_vehicles: usize,
    pub vehicle_rng_seed: u64,
    /// Whether to stop stepping once every vehicle has arrived.
    pub auto_shutdown: bool,
    /// Whether to skip routes containing `#` when inserting vehicles.
    pub use_route_distributions: bool,
    /// The distance between the network and the playground's edges, in m.
    pub margin: f64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_at: 0.0,
            first_step_at: -1.0,
            update_interval: 1.0,
            host: "localhost".to_string(),
            port: 9999,
            ignore_gui_commands: false,
            module_type: "org.car2x.veins.nodes.Car".to_string(),
            module_name: "node".to_string(),
            module_display_string: "*='i=veins/node/car;is=vs'".to_string(),
            traffic_light_module_type: String::new(),
            traffic_light_module_name: "tls".to_string(),
            traffic_light_module_display_string: "i=misc/sun".to_string(),
            traffic_light_filter: String::new(),
            penetration_rate: 1.0,
            roi_roads: String::new(),
            roi_rects: String::new(),
            car_cell_size: 250.0,
            num_vehicles: 0,
            vehicle_rng_seed: 0,
            auto_shutdown: true,
            use_route_distributions: false,
            margin: 25.0,
        }
    }
}

impl ManagerConfig {
    /// Reads a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the configuration and parses its structured parameters.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        if self.update_interval <= 0.0 {
            return Err(ConfigError::InvalidInterval(self.update_interval));
        }
        let first_step_at = if self.first_step_at == -1.0 {
            self.connect_at + self.update_interval
        } else {
            self.first_step_at
        };
        if first_step_at <= self.connect_at {
            return Err(ConfigError::InvalidTiming {
                connect_at: self.connect_at,
                first_step_at,
            });
        }

        Ok(Settings {
            mappings: ModuleMappings::parse(&self.module_type, &self.module_name, &self.module_display_string)?,
            roi: RegionOfInterest::parse(&self.roi_roads, &self.roi_rects)?,
            penetration: PenetrationPolicy::new(self.penetration_rate),
            traffic_light_filter: self.traffic_light_filter.split_whitespace().map(str::to_string).collect(),
            first_step_at,
            config: self.clone(),
        })
    }
}

/// A validated configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    pub config: ManagerConfig,
    pub mappings: ModuleMappings,
    pub roi: RegionOfInterest,
    pub penetration: PenetrationPolicy,
    /// The traffic lights to mirror.
    pub traffic_light_filter: Vec<String>,
    /// When to perform the first step, in s.
    pub first_step_at: SimTime,
}
