use crate::host::{ModuleHandle, ModuleId, TrafficLightChange};
use crate::math::Point3d;
use crate::time::SimTime;
use crate::TrafficLightId;

/// A traffic light system mirrored from the server.
///
/// Traffic lights are created once while connecting and live until the run ends.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    /// The traffic light's ID.
    pub(crate) id: TrafficLightId,
    /// The server's identifier of the traffic light system.
    external_id: String,
    /// The module representing the traffic light.
    handle: ModuleHandle,
    /// The world coordinates of the junction.
    position: Point3d,
    /// The index of the active phase.
    phase: Option<i32>,
    /// The identifier of the active program.
    program: Option<String>,
    /// The time of the next phase switch.
    next_switch: Option<SimTime>,
    /// The red/yellow/green state string.
    state: Option<String>,
}

impl TrafficLight {
    pub(crate) fn new(id: TrafficLightId, external_id: &str, handle: ModuleHandle, position: Point3d) -> Self {
        Self {
            id,
            external_id: external_id.to_string(),
            handle,
            position,
            phase: None,
            program: None,
            next_switch: None,
            state: None,
        }
    }

    /// Records a change reported by the server.
    pub(crate) fn apply(&mut self, change: &TrafficLightChange) {
        match change {
            TrafficLightChange::Phase(phase) => self.phase = Some(*phase),
            TrafficLightChange::Program(program) => self.program = Some(program.clone()),
            TrafficLightChange::NextSwitch(time) => self.next_switch = Some(*time),
            TrafficLightChange::State(state) => self.state = Some(state.clone()),
        }
    }

    pub fn id(&self) -> TrafficLightId {
        self.id
    }

    /// Gets the server's identifier of the traffic light system.
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn module(&self) -> ModuleId {
        self.handle.module
    }

    /// Gets the traffic light interface the changes are forwarded to.
    pub fn interface(&self) -> Option<ModuleId> {
        self.handle.tl_interface
    }

    pub fn position(&self) -> Point3d {
        self.position
    }

    pub fn phase(&self) -> Option<i32> {
        self.phase
    }

    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    pub fn next_switch(&self) -> Option<SimTime> {
        self.next_switch
    }

    /// Gets the red/yellow/green state, one character per controlled link.
    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }
}
