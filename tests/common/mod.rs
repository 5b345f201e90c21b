//! A scripted TraCI server and a host which records what it is asked to do.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{Cursor, Read, Write};
use std::rc::Rc;
use traci_bridge::buffer::Buffer;
use traci_bridge::connection::{read_command_header, write_command};
use traci_bridge::constants::*;
use traci_bridge::math::{Point2d, Point3d};
use traci_bridge::{
    AnnotationManager, Connection, HostRuntime, ManagerConfig, MobilityState, ModuleHandle, ModuleId, ModuleSpec,
    ObstacleControl, ScenarioManager, SimTime, TrafficLightChange,
};

pub type TestManager = ScenarioManager<RecordingHost, ScriptedStream>;

/// Replays canned responses and keeps everything written to it.
pub struct ScriptedStream {
    responses: Cursor<Vec<u8>>,
    sent: Rc<RefCell<Vec<u8>>>,
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.responses.read(buf)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.sent.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// The responses a scripted server sends, in order.
#[derive(Default)]
pub struct Script {
    bytes: Vec<u8>,
}

impl Script {
    pub fn new() -> Self {
        Default::default()
    }

    fn message(&mut self, command: u8, result: u8, description: &str, rest: &[u8]) -> &mut Self {
        let mut status = Buffer::new();
        status.write(result).write_str(description);
        let mut body = Buffer::new();
        write_command(&mut body, command, status.as_bytes());
        body.write_bytes(rest);
        let mut message = Buffer::new();
        message.write(4 + body.len() as u32).write_bytes(body.as_bytes());
        self.bytes.extend_from_slice(message.as_bytes());
        self
    }

    /// A bare success status.
    pub fn ack(&mut self, command: u8) -> &mut Self {
        self.message(command, RTYPE_OK, "", &[])
    }

    /// A bare error status.
    pub fn refuse(&mut self, command: u8, description: &str) -> &mut Self {
        self.message(command, RTYPE_ERR, description, &[])
    }

    pub fn version(&mut self, api_version: i32) -> &mut Self {
        let mut payload = Buffer::new();
        payload.write(api_version).write_str("SUMO 1.x");
        let mut rest = Buffer::new();
        write_command(&mut rest, CMD_GETVERSION, payload.as_bytes());
        self.message(CMD_GETVERSION, RTYPE_OK, "", rest.as_bytes())
    }

    /// The response to a variable query; `value` writes the typed value.
    pub fn get(&mut self, command: u8, variable: u8, object_id: &str, value: impl FnOnce(&mut Buffer)) -> &mut Self {
        let mut payload = Buffer::new();
        payload.write(variable).write_str(object_id);
        value(&mut payload);
        let mut rest = Buffer::new();
        write_command(&mut rest, command + GET_RESPONSE_OFFSET, payload.as_bytes());
        self.message(command, RTYPE_OK, "", rest.as_bytes())
    }

    pub fn bounds(&mut self, min: (f64, f64), max: (f64, f64)) -> &mut Self {
        self.get(CMD_GET_SIM_VARIABLE, VAR_NET_BOUNDING_BOX, "", |buf| {
            buf.write(TYPE_BOUNDINGBOX)
                .write(Point2d::new(min.0, min.1))
                .write(Point2d::new(max.0, max.1));
        })
    }

    pub fn string_list(&mut self, command: u8, variable: u8, object_id: &str, items: &[&str]) -> &mut Self {
        let items = strings(items);
        self.get(command, variable, object_id, |buf| {
            buf.write_typed(items);
        })
    }

    pub fn vehicle_type(&mut self, vehicle_id: &str, class: &str) -> &mut Self {
        self.get(CMD_GET_VEHICLE_VARIABLE, VAR_TYPE, vehicle_id, |buf| {
            buf.write_typed_str(class);
        })
    }

    /// The response to a subscription, carrying the first result block.
    pub fn subscribed(&mut self, command: u8, block: Vec<u8>) -> &mut Self {
        self.message(command, RTYPE_OK, "", &block)
    }

    /// Subscribing to a vehicle that then turns out to be new: its first
    /// record, followed by the answer to the vehicle type query.
    pub fn new_vehicle(&mut self, id: &str, position: (f64, f64), road: &str, class: &str) -> &mut Self {
        self.subscribed(CMD_SUBSCRIBE_VEHICLE_VARIABLE, vehicle_block(id, position, road))
            .vehicle_type(id, class)
    }

    /// The response to a simulation step.
    pub fn step(&mut self, blocks: &[Vec<u8>]) -> &mut Self {
        let mut rest = Buffer::new();
        rest.write(blocks.len() as u32);
        for block in blocks {
            rest.write_bytes(block);
        }
        self.message(CMD_SIMSTEP, RTYPE_OK, "", rest.as_bytes())
    }

    /// The responses to connecting: version, bounds of (0, 0) to (1000, 1000),
    /// and the simulation and vehicle list subscriptions.
    pub fn handshake(&mut self, active: &[&str]) -> &mut Self {
        self.version(20)
            .bounds((0.0, 0.0), (1000.0, 1000.0))
            .subscribed(CMD_SUBSCRIBE_SIM_VARIABLE, sim_block(0.0, &[]))
            .subscribed(CMD_SUBSCRIBE_VEHICLE_VARIABLE, id_list_block(active))
    }

    pub fn into_stream(self) -> (ScriptedStream, Rc<RefCell<Vec<u8>>>) {
        let sent = Rc::new(RefCell::new(vec![]));
        let stream = ScriptedStream {
            responses: Cursor::new(self.bytes),
            sent: sent.clone(),
        };
        (stream, sent)
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A subscription result block.
pub fn block(response: u8, object_id: &str, count: u8, vars: impl FnOnce(&mut Buffer)) -> Vec<u8> {
    let mut payload = Buffer::new();
    payload.write_str(object_id).write(count);
    vars(&mut payload);
    let mut out = Buffer::new();
    write_command(&mut out, response, payload.as_bytes());
    out.into_bytes()
}

fn ok(buf: &mut Buffer, variable: u8) -> &mut Buffer {
    buf.write(variable).write(RTYPE_OK)
}

/// A simulation block in seconds, with the clock and the given id lists.
pub fn sim_block(time: SimTime, lists: &[(u8, &[&str])]) -> Vec<u8> {
    block(RESPONSE_SUBSCRIBE_SIM_VARIABLE, "", 1 + lists.len() as u8, |buf| {
        ok(buf, VAR_TIME).write_typed(time);
        for (variable, ids) in lists {
            ok(buf, *variable).write_typed(strings(ids));
        }
    })
}

pub fn id_list_block(active: &[&str]) -> Vec<u8> {
    block(RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE, "", 1, |buf| {
        ok(buf, ID_LIST).write_typed(strings(active));
    })
}

/// A full vehicle record, heading east.
pub fn vehicle_block(id: &str, position: (f64, f64), road: &str) -> Vec<u8> {
    block(RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE, id, 9, |buf| {
        ok(buf, VAR_POSITION3D).write_typed(Point3d::new(position.0, position.1, 0.0));
        ok(buf, VAR_ROAD_ID).write_typed_str(road);
        ok(buf, VAR_SPEED).write_typed(10.0);
        ok(buf, VAR_ANGLE).write_typed(90.0);
        ok(buf, VAR_SIGNALS).write_typed(0i32);
        ok(buf, VAR_LENGTH).write_typed(5.0);
        ok(buf, VAR_HEIGHT).write_typed(1.5);
        ok(buf, VAR_WIDTH).write_typed(1.8);
        ok(buf, VAR_SLOPE).write_typed(0.0);
    })
}

/// A vehicle record missing most variables.
pub fn partial_vehicle_block(id: &str, position: (f64, f64)) -> Vec<u8> {
    block(RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE, id, 2, |buf| {
        ok(buf, VAR_POSITION3D).write_typed(Point3d::new(position.0, position.1, 0.0));
        ok(buf, VAR_SPEED).write_typed(10.0);
    })
}

/// A vehicle record whose speed could not be read.
pub fn failed_vehicle_block(id: &str) -> Vec<u8> {
    block(RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE, id, 1, |buf| {
        buf.write(VAR_SPEED).write(RTYPE_ERR).write_typed_str("vehicle is gone");
    })
}

pub fn traffic_light_block(tl_id: &str, phase: i32, state: &str) -> Vec<u8> {
    block(RESPONSE_SUBSCRIBE_TL_VARIABLE, tl_id, 4, |buf| {
        ok(buf, TL_CURRENT_PHASE).write_typed(phase);
        ok(buf, TL_CURRENT_PROGRAM).write_typed_str("0");
        ok(buf, TL_NEXT_SWITCH).write_typed(30.0);
        ok(buf, TL_RED_YELLOW_GREEN_STATE).write_typed_str(state);
    })
}

/// A command the manager sent.
#[derive(Clone, Debug)]
pub struct Sent {
    pub id: u8,
    pub payload: Buffer,
}

impl Sent {
    /// The object a subscription command targets and the number of variables
    /// it asks for, assuming times in seconds.
    pub fn subscription(&self) -> (String, u8) {
        let mut buf = Buffer::from_bytes(self.payload.as_bytes().to_vec());
        buf.read::<f64>().unwrap();
        buf.read::<f64>().unwrap();
        let object_id = buf.read::<String>().unwrap();
        let count = buf.read::<u8>().unwrap();
        (object_id, count)
    }

    /// The vehicle an `ADD_FULL` command inserts.
    pub fn added_vehicle(&self) -> String {
        let mut buf = Buffer::from_bytes(self.payload.as_bytes().to_vec());
        assert_eq!(buf.read::<u8>().unwrap(), ADD_FULL);
        buf.read::<String>().unwrap()
    }
}

/// Splits everything the manager wrote into commands.
pub fn sent_commands(sent: &Rc<RefCell<Vec<u8>>>) -> Vec<Sent> {
    let mut buf = Buffer::from_bytes(sent.borrow().clone());
    let mut commands = vec![];
    while !buf.eof() {
        let length = buf.read::<u32>().unwrap() as usize;
        let end = buf.position() + length - 4;
        while buf.position() < end {
            let header = read_command_header(&mut buf).unwrap();
            let consumed = buf.position() - header.start;
            let payload = buf.take(header.length - consumed).unwrap().to_vec();
            commands.push(Sent {
                id: header.id,
                payload: Buffer::from_bytes(payload),
            });
        }
    }
    commands
}

/// The vehicle subscriptions (with variables) and cancellations (without) that were sent.
pub fn vehicle_subscriptions(sent: &Rc<RefCell<Vec<u8>>>) -> (Vec<String>, Vec<String>) {
    let mut subscribed = vec![];
    let mut unsubscribed = vec![];
    for command in sent_commands(sent) {
        if command.id != CMD_SUBSCRIBE_VEHICLE_VARIABLE {
            continue;
        }
        match command.subscription() {
            (id, 0) => unsubscribed.push(id),
            (id, _) if !id.is_empty() => subscribed.push(id),
            _ => {}
        }
    }
    (subscribed, unsubscribed)
}

/// A call the manager made on its host.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Create {
        module: ModuleId,
        type_name: String,
        name: String,
        index: usize,
        vector_size: usize,
    },
    DisplayString(ModuleId, String),
    BuildInside(ModuleId),
    ScheduleStart(ModuleId, SimTime),
    Initialize(ModuleId),
    Finish(ModuleId),
    Delete(ModuleId),
    PreInitializeMobility(ModuleId, String),
    ChangePosition(ModuleId),
    NextPosition(ModuleId, Point3d),
    Parking(ModuleId, bool),
    Place(ModuleId, Point3d),
    PreInitializeTrafficLight(ModuleId, String, Point3d),
    UpdateTrafficLight(ModuleId, TrafficLightChange),
    RegisterNic(ModuleId),
    UnregisterNic(ModuleId),
    Scalar(String, f64),
    Initialized,
}

/// Accepts obstacles of the listed types.
#[derive(Default)]
pub struct RecordingObstacles {
    pub supported: Vec<String>,
    /// Identifier, type, outline and height of every obstacle added.
    pub added: Vec<(String, String, Vec<Point3d>, f64)>,
}

impl ObstacleControl for RecordingObstacles {
    fn is_type_supported(&self, type_id: &str) -> bool {
        self.supported.iter().any(|t| t == type_id)
    }

    fn add_from_shape(&mut self, id: &str, type_id: &str, shape: &[Point3d], height: f64) {
        self.added
            .push((id.to_string(), type_id.to_string(), shape.to_vec(), height));
    }
}

#[derive(Default)]
pub struct RecordingAnnotations {
    pub polygons: Vec<(Vec<Point3d>, String)>,
}

impl AnnotationManager for RecordingAnnotations {
    fn draw_polygon(&mut self, points: &[Point3d], color: &str) {
        self.polygons.push((points.to_vec(), color.to_string()));
    }
}

/// A host with a 2000 m square playground that records every call.
pub struct RecordingHost {
    pub playground: Point2d,
    pub module_types: Vec<String>,
    pub calls: Vec<Call>,
    pub obstacles: Option<RecordingObstacles>,
    pub annotations: Option<RecordingAnnotations>,
    pub next_id: u64,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self {
            playground: Point2d::new(2000.0, 2000.0),
            module_types: strings(&["Car", "Bus", "TrafficLight"]),
            calls: vec![],
            obstacles: None,
            annotations: None,
            next_id: 0,
        }
    }
}

impl RecordingHost {
    fn allocate(&mut self) -> ModuleId {
        self.next_id += 1;
        ModuleId(self.next_id)
    }

    /// The type names of all modules created, in order.
    pub fn created(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Create { type_name, .. } => Some(type_name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Delete(_)))
            .count()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }
}

impl HostRuntime for RecordingHost {
    fn playground(&self) -> Point2d {
        self.playground
    }

    fn module_type_exists(&self, type_name: &str) -> bool {
        self.module_types.iter().any(|t| t == type_name)
    }

    fn create_module(&mut self, spec: &ModuleSpec) -> ModuleHandle {
        let module = self.allocate();
        self.calls.push(Call::Create {
            module,
            type_name: spec.type_name.to_string(),
            name: spec.name.to_string(),
            index: spec.index,
            vector_size: spec.vector_size,
        });
        ModuleHandle {
            module,
            mobility: Some(self.allocate()),
            nic: Some(self.allocate()),
            tl_interface: Some(self.allocate()),
        }
    }

    fn set_display_string(&mut self, module: ModuleId, display_string: &str) {
        self.calls
            .push(Call::DisplayString(module, display_string.to_string()));
    }

    fn build_inside(&mut self, module: ModuleId) {
        self.calls.push(Call::BuildInside(module));
    }

    fn schedule_start(&mut self, module: ModuleId, at: SimTime) {
        self.calls.push(Call::ScheduleStart(module, at));
    }

    fn call_initialize(&mut self, module: ModuleId) {
        self.calls.push(Call::Initialize(module));
    }

    fn call_finish(&mut self, module: ModuleId) {
        self.calls.push(Call::Finish(module));
    }

    fn delete_module(&mut self, module: ModuleId) {
        self.calls.push(Call::Delete(module));
    }

    fn pre_initialize_mobility(&mut self, mobility: ModuleId, vehicle_id: &str, _state: &MobilityState) {
        self.calls
            .push(Call::PreInitializeMobility(mobility, vehicle_id.to_string()));
    }

    fn change_position(&mut self, mobility: ModuleId) {
        self.calls.push(Call::ChangePosition(mobility));
    }

    fn next_position(&mut self, mobility: ModuleId, state: &MobilityState) {
        self.calls.push(Call::NextPosition(mobility, state.position));
    }

    fn change_parking_state(&mut self, mobility: ModuleId, parked: bool) {
        self.calls.push(Call::Parking(mobility, parked));
    }

    fn place_mobility(&mut self, mobility: ModuleId, position: Point3d) {
        self.calls.push(Call::Place(mobility, position));
    }

    fn pre_initialize_traffic_light(
        &mut self,
        tl_interface: ModuleId,
        tl_id: &str,
        position: Point3d,
        _update_interval: SimTime,
    ) {
        self.calls.push(Call::PreInitializeTrafficLight(
            tl_interface,
            tl_id.to_string(),
            position,
        ));
    }

    fn update_traffic_light(&mut self, tl_interface: ModuleId, change: &TrafficLightChange) {
        self.calls
            .push(Call::UpdateTrafficLight(tl_interface, change.clone()));
    }

    fn register_nic(&mut self, nic: ModuleId) {
        self.calls.push(Call::RegisterNic(nic));
    }

    fn unregister_nic(&mut self, nic: ModuleId) {
        self.calls.push(Call::UnregisterNic(nic));
    }

    fn obstacles(&mut self) -> Option<&mut dyn ObstacleControl> {
        self.obstacles
            .as_mut()
            .map(|obstacles| obstacles as &mut dyn ObstacleControl)
    }

    fn annotations(&mut self) -> Option<&mut dyn AnnotationManager> {
        self.annotations
            .as_mut()
            .map(|annotations| annotations as &mut dyn AnnotationManager)
    }

    fn record_scalar(&mut self, name: &str, value: f64) {
        self.calls.push(Call::Scalar(name.to_string(), value));
    }

    fn emit_initialized(&mut self) {
        self.calls.push(Call::Initialized);
    }
}

/// A configuration with one module type for every vehicle.
pub fn config() -> ManagerConfig {
    ManagerConfig {
        module_type: "Car".to_string(),
        module_name: "node".to_string(),
        module_display_string: String::new(),
        ..Default::default()
    }
}

/// Creates a manager and connects it to a server following `script`.
pub fn connect(config: &ManagerConfig, host: RecordingHost, script: Script) -> (TestManager, Rc<RefCell<Vec<u8>>>) {
    let (stream, sent) = script.into_stream();
    let mut manager = TestManager::new(config, host).unwrap();
    manager.attach(Connection::new(stream)).unwrap();
    (manager, sent)
}
