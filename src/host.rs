//! The services the manager consumes from the simulation kernel hosting it.
//!
//! The kernel owns module lifecycles, the radio connectivity registry and the
//! optional geometry and drawing collaborators. The manager reaches all of
//! them through [HostRuntime] only, so tests can substitute a recording double.

use crate::math::{Point2d, Point3d};
use crate::time::SimTime;

/// Identifies a module instance owned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u64);

/// A freshly created module together with the sub-modules the manager drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleHandle {
    /// The module itself.
    pub module: ModuleId,
    /// The mobility sub-module which receives position updates.
    pub mobility: Option<ModuleId>,
    /// The network interface registered with the connectivity collaborator.
    pub nic: Option<ModuleId>,
    /// The traffic light interface of a traffic light module.
    pub tl_interface: Option<ModuleId>,
}

impl ModuleHandle {
    /// A handle for a module without any known sub-modules.
    pub fn bare(module: ModuleId) -> Self {
        Self {
            module,
            mobility: None,
            nic: None,
            tl_interface: None,
        }
    }
}

/// What to instantiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleSpec<'a> {
    /// The module type, e.g. `"org.car2x.veins.nodes.Car"`.
    pub type_name: &'a str,
    /// The name of the module vector to add the module to.
    pub name: &'a str,
    /// The position of the module within its vector.
    pub index: usize,
    /// The size of the module vector.
    pub vector_size: usize,
}

/// The turn signals, brake lights etc. reported for a vehicle, as a bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VehicleSignal(pub i32);

impl VehicleSignal {
    pub const BLINKER_RIGHT: i32 = 1 << 0;
    pub const BLINKER_LEFT: i32 = 1 << 1;
    pub const BLINKER_EMERGENCY: i32 = 1 << 2;
    pub const BRAKELIGHT: i32 = 1 << 3;

    /// Whether all bits of `flag` are set.
    pub fn contains(&self, flag: i32) -> bool {
        self.0 & flag == flag
    }
}

/// The kinematic state of a vehicle, in world coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct MobilityState {
    /// The position in m.
    pub position: Point3d,
    /// The road the vehicle is on.
    pub road_id: String,
    /// The speed in m/s.
    pub speed: f64,
    /// The heading in radians, counter-clockwise from east.
    pub angle: f64,
    /// The pitch in radians.
    pub elevation: f64,
    pub signals: VehicleSignal,
    /// The length in m.
    pub length: f64,
    /// The height in m.
    pub height: f64,
    /// The width in m.
    pub width: f64,
}

/// A change reported for a traffic light.
#[derive(Clone, Debug, PartialEq)]
pub enum TrafficLightChange {
    /// The index of the active phase.
    Phase(i32),
    /// The identifier of the active program.
    Program(String),
    /// The time of the next phase switch.
    NextSwitch(SimTime),
    /// The red/yellow/green state string, one character per controlled link.
    State(String),
}

/// Accepts radio obstacles.
pub trait ObstacleControl {
    /// Whether obstacles of this polygon type are modelled.
    fn is_type_supported(&self, type_id: &str) -> bool;

    /// Adds an obstacle with the given outline, in world coordinates.
    fn add_from_shape(&mut self, id: &str, type_id: &str, shape: &[Point3d], height: f64);
}

/// Draws onto the simulation's canvas.
pub trait AnnotationManager {
    fn draw_polygon(&mut self, points: &[Point3d], color: &str);
}

/// The simulation kernel hosting the manager.
pub trait HostRuntime {
    /// The size of the playground in m.
    fn playground(&self) -> Point2d;

    /// Whether the host knows how to build modules of this type.
    fn module_type_exists(&self, type_name: &str) -> bool;

    /// Creates a module and finalizes its parameters.
    fn create_module(&mut self, spec: &ModuleSpec) -> ModuleHandle;

    fn set_display_string(&mut self, module: ModuleId, display_string: &str);

    /// Builds the module's sub-modules.
    fn build_inside(&mut self, module: ModuleId);

    /// Schedules the module's start at the given time.
    fn schedule_start(&mut self, module: ModuleId, at: SimTime);

    fn call_initialize(&mut self, module: ModuleId);

    fn call_finish(&mut self, module: ModuleId);

    fn delete_module(&mut self, module: ModuleId);

    /// Hands a vehicle's initial state to its mobility sub-module before initialization.
    fn pre_initialize_mobility(&mut self, mobility: ModuleId, vehicle_id: &str, state: &MobilityState);

    /// Lets the mobility sub-module announce its initial position after initialization.
    fn change_position(&mut self, mobility: ModuleId);

    /// Moves a vehicle.
    fn next_position(&mut self, mobility: ModuleId, state: &MobilityState);

    fn change_parking_state(&mut self, mobility: ModuleId, parked: bool);

    /// Places a module which never moves, such as a traffic light.
    fn place_mobility(&mut self, mobility: ModuleId, position: Point3d);

    /// Binds a traffic light interface to the light it mirrors.
    fn pre_initialize_traffic_light(
        &mut self,
        tl_interface: ModuleId,
        tl_id: &str,
        position: Point3d,
        update_interval: SimTime,
    );

    fn update_traffic_light(&mut self, tl_interface: ModuleId, change: &TrafficLightChange);

    /// Registers a network interface with the connectivity collaborator.
    fn register_nic(&mut self, _nic: ModuleId) {}

    /// Removes a network interface from the connectivity collaborator.
    fn unregister_nic(&mut self, _nic: ModuleId) {}

    /// The obstacle collaborator, if the simulation has one.
    fn obstacles(&mut self) -> Option<&mut dyn ObstacleControl> {
        None
    }

    /// The annotation collaborator, if the simulation has one.
    fn annotations(&mut self) -> Option<&mut dyn AnnotationManager> {
        None
    }

    /// Records a named result at the end of the run.
    fn record_scalar(&mut self, _name: &str, _value: f64) {}

    /// Announces that the connection has been set up.
    fn emit_initialized(&mut self) {}
}
