pub use cgmath;
pub use command::DEFAULT_VEHTYPE;
pub use config::{ManagerConfig, Settings};
pub use connection::{Connection, NetBounds, Status};
pub use error::{ConfigError, Error, ProtocolError, Result};
pub use host::{
    AnnotationManager, HostRuntime, MobilityState, ModuleHandle, ModuleId, ModuleSpec, ObstacleControl,
    TrafficLightChange, VehicleSignal,
};
pub use light::TrafficLight;
pub use manager::{ScenarioManager, VehicleCounts};
pub use registry::{Admission, PenetrationPolicy, Registry};
use slotmap::new_key_type;
pub use slotmap::{Key, KeyData};
pub use time::{SimTime, TimeFormat};
pub use util::Interval;
pub use vehicle::{EntityRef, HostPosition, ManagedVehicle, UnequippedVehicle};

pub mod buffer;
mod command;
mod config;
pub mod connection;
pub mod constants;
mod error;
pub mod grid;
mod host;
pub mod insertion;
mod light;
mod manager;
pub mod mapping;
pub mod math;
mod registry;
pub mod roi;
pub mod subscription;
mod time;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [ManagedVehicle].
    pub struct ManagedId;
    /// Unique ID of an [UnequippedVehicle].
    pub struct UnequippedId;
    /// Unique ID of a [TrafficLight].
    pub struct TrafficLightId;
}
