//! Subscriptions to simulation, vehicle and traffic light variables, and the
//! results the server pushes for them on every step.
//!
//! Decoding turns a result block into a [SubscriptionResult] value without
//! touching any other state; the manager applies it afterwards.

use crate::buffer::Buffer;
use crate::connection::{read_command_header, Connection};
use crate::constants::*;
use crate::error::{ProtocolError, Result};
use crate::host::TrafficLightChange;
use crate::math::Point3d;
use crate::time::{SimTime, TimeFormat, MAX_SIM_TIME};
use std::collections::BTreeSet;
use std::io::{Read, Write};

/// The vehicle variables subscribed to for every active vehicle.
pub const VEHICLE_VARIABLES: [u8; 9] = [
    VAR_POSITION3D,
    VAR_ROAD_ID,
    VAR_SPEED,
    VAR_ANGLE,
    VAR_SIGNALS,
    VAR_LENGTH,
    VAR_HEIGHT,
    VAR_WIDTH,
    VAR_SLOPE,
];

/// The variables subscribed to for every mirrored traffic light.
pub const TRAFFIC_LIGHT_VARIABLES: [u8; 4] = [
    TL_CURRENT_PHASE,
    TL_CURRENT_PROGRAM,
    TL_NEXT_SWITCH,
    TL_RED_YELLOW_GREEN_STATE,
];

/// The simulation variables subscribed to while connecting.
pub fn simulation_variables(format: TimeFormat) -> [u8; 7] {
    [
        VAR_DEPARTED_VEHICLES_IDS,
        VAR_ARRIVED_VEHICLES_IDS,
        format.clock_variable(),
        VAR_TELEPORT_STARTING_VEHICLES_IDS,
        VAR_TELEPORT_ENDING_VEHICLES_IDS,
        VAR_PARKING_STARTING_VEHICLES_IDS,
        VAR_PARKING_ENDING_VEHICLES_IDS,
    ]
}

/// One simulation variable reported by the server.
#[derive(Clone, Debug, PartialEq)]
pub enum SimulationEvent {
    /// Vehicles that entered the simulation during the last step.
    Departed(Vec<String>),
    /// Vehicles that reached their destination during the last step.
    Arrived(Vec<String>),
    TeleportStarting(Vec<String>),
    TeleportEnding(Vec<String>),
    ParkingStarting(Vec<String>),
    ParkingEnding(Vec<String>),
    /// The server's current time.
    Clock(SimTime),
}

/// A variable the server could not report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableError {
    pub variable: u8,
    /// The status code the server sent instead of `RTYPE_OK`.
    pub status: u8,
    pub description: String,
}

impl From<VariableError> for ProtocolError {
    fn from(err: VariableError) -> Self {
        if err.status == RTYPE_NOTIMPLEMENTED {
            ProtocolError::NotImplemented {
                variable: err.variable,
                description: err.description,
            }
        } else {
            ProtocolError::VariableFailed {
                variable: err.variable,
                description: err.description,
            }
        }
    }
}

/// The vehicle variables present in one result block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VehicleRecord {
    pub position: Option<Point3d>,
    pub road_id: Option<String>,
    pub speed: Option<f64>,
    pub angle: Option<f64>,
    pub signals: Option<i32>,
    pub length: Option<f64>,
    pub height: Option<f64>,
    pub width: Option<f64>,
    pub slope: Option<f64>,
}

/// A vehicle's state with every subscribed variable present, in server units.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleSample {
    /// The position in server coordinates.
    pub position: Point3d,
    pub road_id: String,
    /// The speed in m/s.
    pub speed: f64,
    /// The heading in degrees, clockwise from north.
    pub angle: f64,
    pub signals: i32,
    pub length: f64,
    pub height: f64,
    pub width: f64,
    /// The slope in degrees.
    pub slope: f64,
}

impl VehicleRecord {
    /// Returns the sample if all nine variables were reported.
    pub fn complete(&self) -> Option<VehicleSample> {
        Some(VehicleSample {
            position: self.position?,
            road_id: self.road_id.clone()?,
            speed: self.speed?,
            angle: self.angle?,
            signals: self.signals?,
            length: self.length?,
            height: self.height?,
            width: self.width?,
            slope: self.slope?,
        })
    }
}

/// The content of a vehicle result block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VehicleUpdate {
    /// The identifiers of all active vehicles, if this block carries them.
    pub id_list: Option<Vec<String>>,
    pub record: VehicleRecord,
    /// Variables the server failed to report. Whether they matter depends on
    /// whether the vehicle is still subscribed.
    pub errors: Vec<VariableError>,
}

/// One decoded result block.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionResult {
    Simulation {
        object_id: String,
        events: Vec<SimulationEvent>,
    },
    Vehicle {
        object_id: String,
        update: VehicleUpdate,
    },
    TrafficLight {
        object_id: String,
        changes: Vec<TrafficLightChange>,
    },
}

/// Decodes the result block at the cursor.
pub fn decode_result(buf: &mut Buffer, format: TimeFormat) -> Result<SubscriptionResult, ProtocolError> {
    let header = read_command_header(buf)?;
    let object_id = buf.read::<String>()?;
    let count = buf.read::<u8>()?;
    let result = match header.id {
        RESPONSE_SUBSCRIBE_SIM_VARIABLE => SubscriptionResult::Simulation {
            events: (0..count)
                .map(|_| decode_simulation_variable(buf, format))
                .collect::<Result<_, _>>()?,
            object_id,
        },
        RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE => SubscriptionResult::Vehicle {
            update: decode_vehicle_variables(buf, count)?,
            object_id,
        },
        RESPONSE_SUBSCRIBE_TL_VARIABLE => SubscriptionResult::TrafficLight {
            changes: (0..count)
                .map(|_| decode_traffic_light_variable(buf, format))
                .collect::<Result<_, _>>()?,
            object_id,
        },
        other => return Err(ProtocolError::UnknownSubscription(other)),
    };
    header.expect_consumed(buf)?;
    Ok(result)
}

/// Reads a variable identifier and its status. A failed variable carries a
/// typed error string in place of its value.
fn read_variable(buf: &mut Buffer) -> Result<(u8, Option<VariableError>), ProtocolError> {
    let variable = buf.read::<u8>()?;
    let status = buf.read::<u8>()?;
    if status == RTYPE_OK {
        return Ok((variable, None));
    }
    let description = buf.read_typed::<String>()?;
    Ok((
        variable,
        Some(VariableError {
            variable,
            status,
            description,
        }),
    ))
}

fn decode_simulation_variable(buf: &mut Buffer, format: TimeFormat) -> Result<SimulationEvent, ProtocolError> {
    let (variable, error) = read_variable(buf)?;
    if let Some(error) = error {
        return Err(error.into());
    }
    let event = match variable {
        VAR_DEPARTED_VEHICLES_IDS => SimulationEvent::Departed(buf.read_typed()?),
        VAR_ARRIVED_VEHICLES_IDS => SimulationEvent::Arrived(buf.read_typed()?),
        VAR_TELEPORT_STARTING_VEHICLES_IDS => SimulationEvent::TeleportStarting(buf.read_typed()?),
        VAR_TELEPORT_ENDING_VEHICLES_IDS => SimulationEvent::TeleportEnding(buf.read_typed()?),
        VAR_PARKING_STARTING_VEHICLES_IDS => SimulationEvent::ParkingStarting(buf.read_typed()?),
        VAR_PARKING_ENDING_VEHICLES_IDS => SimulationEvent::ParkingEnding(buf.read_typed()?),
        clock if clock == format.clock_variable() => SimulationEvent::Clock(buf.read_typed_time(format)?),
        _ => {
            return Err(ProtocolError::UnknownVariable {
                class: "simulation",
                variable,
            })
        }
    };
    Ok(event)
}

fn decode_vehicle_variables(buf: &mut Buffer, count: u8) -> Result<VehicleUpdate, ProtocolError> {
    let mut update = VehicleUpdate::default();
    for _ in 0..count {
        let (variable, error) = read_variable(buf)?;
        if let Some(error) = error {
            update.errors.push(error);
            continue;
        }
        let record = &mut update.record;
        match variable {
            ID_LIST => update.id_list = Some(buf.read_typed()?),
            VAR_POSITION3D => record.position = Some(buf.read_typed()?),
            VAR_ROAD_ID => record.road_id = Some(buf.read_typed()?),
            VAR_SPEED => record.speed = Some(buf.read_typed()?),
            VAR_ANGLE => record.angle = Some(buf.read_typed()?),
            VAR_SIGNALS => record.signals = Some(buf.read_typed()?),
            VAR_LENGTH => record.length = Some(buf.read_typed()?),
            VAR_HEIGHT => record.height = Some(buf.read_typed()?),
            VAR_WIDTH => record.width = Some(buf.read_typed()?),
            VAR_SLOPE => record.slope = Some(buf.read_typed()?),
            _ => {
                return Err(ProtocolError::UnknownVariable {
                    class: "vehicle",
                    variable,
                })
            }
        }
    }
    Ok(update)
}

fn decode_traffic_light_variable(
    buf: &mut Buffer,
    format: TimeFormat,
) -> Result<TrafficLightChange, ProtocolError> {
    let (variable, error) = read_variable(buf)?;
    if let Some(error) = error {
        return Err(error.into());
    }
    let change = match variable {
        TL_CURRENT_PHASE => TrafficLightChange::Phase(buf.read_typed()?),
        TL_CURRENT_PROGRAM => TrafficLightChange::Program(buf.read_typed()?),
        TL_NEXT_SWITCH => TrafficLightChange::NextSwitch(buf.read_typed_time(format)?),
        TL_RED_YELLOW_GREEN_STATE => TrafficLightChange::State(buf.read_typed()?),
        _ => {
            return Err(ProtocolError::UnknownVariable {
                class: "traffic light",
                variable,
            })
        }
    };
    Ok(change)
}

/// Compares the subscribed vehicles with the active vehicles reported by the
/// server. Returns the vehicles to subscribe to and those to unsubscribe from.
pub fn reconcile(subscribed: &BTreeSet<String>, active: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
    let subscribe = active.difference(subscribed).cloned().collect();
    let unsubscribe = subscribed.difference(active).cloned().collect();
    (subscribe, unsubscribe)
}

/// The result blocks of one simulation step, decoded one at a time.
///
/// Once the last block has been decoded the response must be exhausted.
#[derive(Debug)]
pub struct StepResults {
    buf: Buffer,
    remaining: u32,
    format: TimeFormat,
}

impl StepResults {
    /// The number of blocks not yet decoded.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Iterator for StepResults {
    type Item = Result<SubscriptionResult, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let result = decode_result(&mut self.buf, self.format).and_then(|result| {
            if self.remaining == 0 {
                self.buf.expect_eof()?;
            }
            Ok(result)
        });
        if result.is_err() {
            self.remaining = 0;
        }
        Some(result)
    }
}

fn subscription_request(format: TimeFormat, object_id: &str, variables: &[u8]) -> Buffer {
    let mut body = Buffer::new();
    body.write_time(0.0, format)
        .write_time(MAX_SIM_TIME, format)
        .write_str(object_id)
        .write(variables.len() as u8);
    for variable in variables {
        body.write(*variable);
    }
    body
}

impl<S: Read + Write> Connection<S> {
    /// Subscribes to variables of an object and decodes the result the server sends right away.
    pub fn subscribe(&mut self, command: u8, object_id: &str, variables: &[u8]) -> Result<SubscriptionResult> {
        let body = subscription_request(self.time_format(), object_id, variables);
        let mut buf = self.query(command, &body)?;
        let result = decode_result(&mut buf, self.time_format())?;
        buf.expect_eof()?;
        Ok(result)
    }

    /// Cancels a subscription by subscribing to no variables.
    pub fn unsubscribe(&mut self, command: u8, object_id: &str) -> Result<()> {
        let body = subscription_request(self.time_format(), object_id, &[]);
        self.query(command, &body)?.expect_eof()?;
        Ok(())
    }

    /// Subscribes to vehicle departures, arrivals, teleports, parking and the clock.
    pub fn subscribe_simulation(&mut self) -> Result<SubscriptionResult> {
        let variables = simulation_variables(self.time_format());
        self.subscribe(CMD_SUBSCRIBE_SIM_VARIABLE, "", &variables)
    }

    /// Subscribes to the list of active vehicles.
    pub fn subscribe_vehicle_list(&mut self) -> Result<SubscriptionResult> {
        self.subscribe(CMD_SUBSCRIBE_VEHICLE_VARIABLE, "", &[ID_LIST])
    }

    pub fn subscribe_vehicle(&mut self, vehicle_id: &str) -> Result<SubscriptionResult> {
        self.subscribe(CMD_SUBSCRIBE_VEHICLE_VARIABLE, vehicle_id, &VEHICLE_VARIABLES)
    }

    pub fn unsubscribe_vehicle(&mut self, vehicle_id: &str) -> Result<()> {
        self.unsubscribe(CMD_SUBSCRIBE_VEHICLE_VARIABLE, vehicle_id)
    }

    pub fn subscribe_traffic_light(&mut self, tl_id: &str) -> Result<SubscriptionResult> {
        self.subscribe(CMD_SUBSCRIBE_TL_VARIABLE, tl_id, &TRAFFIC_LIGHT_VARIABLES)
    }

    /// Advances the server's simulation to `target` and returns the result blocks it sends back.
    pub fn simulation_step(&mut self, target: SimTime) -> Result<StepResults> {
        let format = self.time_format();
        let mut body = Buffer::new();
        body.write_time(target, format);
        let mut buf = self.query(CMD_SIMSTEP, &body)?;
        let remaining = buf.read::<u32>()?;
        if remaining == 0 {
            buf.expect_eof()?;
        }
        Ok(StepResults {
            buf,
            remaining,
            format,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::connection::write_command;

    fn block(response: u8, object_id: &str, count: u8, vars: impl FnOnce(&mut Buffer)) -> Buffer {
        let mut payload = Buffer::new();
        payload.write_str(object_id).write(count);
        vars(&mut payload);
        let mut out = Buffer::new();
        write_command(&mut out, response, payload.as_bytes());
        Buffer::from_bytes(out.into_bytes())
    }

    fn ok(buf: &mut Buffer, variable: u8) -> &mut Buffer {
        buf.write(variable).write(RTYPE_OK)
    }

    fn full_vehicle(buf: &mut Buffer) {
        ok(buf, VAR_POSITION3D).write_typed(Point3d::new(10.0, 20.0, 0.5));
        ok(buf, VAR_ROAD_ID).write_typed_str("e1");
        ok(buf, VAR_SPEED).write_typed(13.9);
        ok(buf, VAR_ANGLE).write_typed(90.0);
        ok(buf, VAR_SIGNALS).write_typed(8i32);
        ok(buf, VAR_LENGTH).write_typed(5.0);
        ok(buf, VAR_HEIGHT).write_typed(1.5);
        ok(buf, VAR_WIDTH).write_typed(1.8);
        ok(buf, VAR_SLOPE).write_typed(0.0);
    }

    #[test]
    fn decodes_complete_vehicle() {
        let mut buf = block(RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE, "veh0", 9, full_vehicle);
        let result = decode_result(&mut buf, TimeFormat::Seconds).unwrap();
        assert!(buf.eof());
        let SubscriptionResult::Vehicle { object_id, update } = result else {
            panic!("expected a vehicle result");
        };
        assert_eq!(object_id, "veh0");
        assert!(update.errors.is_empty());
        let sample = update.record.complete().unwrap();
        assert_eq!(sample.position, Point3d::new(10.0, 20.0, 0.5));
        assert_eq!(sample.road_id, "e1");
        assert_eq!(sample.signals, 8);
    }

    #[test]
    fn partial_vehicle_is_incomplete() {
        let mut buf = block(RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE, "veh0", 3, |buf| {
            ok(buf, VAR_POSITION3D).write_typed(Point3d::new(10.0, 20.0, 0.0));
            ok(buf, VAR_SPEED).write_typed(1.0);
            buf.write(VAR_ANGLE).write(RTYPE_ERR).write_typed_str("no angle");
        });
        let SubscriptionResult::Vehicle { update, .. } = decode_result(&mut buf, TimeFormat::Seconds).unwrap()
        else {
            panic!("expected a vehicle result");
        };
        assert_eq!(update.record.complete(), None);
        assert_eq!(update.errors.len(), 1);
        assert_eq!(update.errors[0].variable, VAR_ANGLE);
    }

    #[test]
    fn decodes_simulation_events() {
        let mut buf = block(RESPONSE_SUBSCRIBE_SIM_VARIABLE, "", 3, |buf| {
            ok(buf, VAR_DEPARTED_VEHICLES_IDS).write_typed(vec!["a".to_string()]);
            ok(buf, VAR_TIME_STEP).write_typed(2000i32);
            ok(buf, VAR_ARRIVED_VEHICLES_IDS).write_typed(Vec::<String>::new());
        });
        let result = decode_result(&mut buf, TimeFormat::Milliseconds).unwrap();
        assert_eq!(
            result,
            SubscriptionResult::Simulation {
                object_id: String::new(),
                events: vec![
                    SimulationEvent::Departed(vec!["a".to_string()]),
                    SimulationEvent::Clock(2.0),
                    SimulationEvent::Arrived(vec![]),
                ],
            }
        );
    }

    #[test]
    fn clock_variable_follows_format() {
        let mut buf = block(RESPONSE_SUBSCRIBE_SIM_VARIABLE, "", 1, |buf| {
            ok(buf, VAR_TIME_STEP).write_typed(2000i32);
        });
        assert_eq!(
            decode_result(&mut buf, TimeFormat::Seconds),
            Err(ProtocolError::UnknownVariable {
                class: "simulation",
                variable: VAR_TIME_STEP
            })
        );
    }

    #[test]
    fn simulation_errors_are_fatal() {
        let mut buf = block(RESPONSE_SUBSCRIBE_SIM_VARIABLE, "", 1, |buf| {
            buf.write(VAR_PARKING_STARTING_VEHICLES_IDS)
                .write(RTYPE_NOTIMPLEMENTED)
                .write_typed_str("too old");
        });
        let err = decode_result(&mut buf, TimeFormat::Seconds).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::NotImplemented {
                variable: VAR_PARKING_STARTING_VEHICLES_IDS,
                description: "too old".to_string()
            }
        );
        assert!(err.to_string().contains("Might need newer version"));
    }

    #[test]
    fn decodes_traffic_light_changes() {
        let mut buf = block(RESPONSE_SUBSCRIBE_TL_VARIABLE, "tl0", 4, |buf| {
            ok(buf, TL_CURRENT_PHASE).write_typed(2i32);
            ok(buf, TL_CURRENT_PROGRAM).write_typed_str("0");
            ok(buf, TL_NEXT_SWITCH).write_typed(31.0);
            ok(buf, TL_RED_YELLOW_GREEN_STATE).write_typed_str("GrGr");
        });
        let SubscriptionResult::TrafficLight { object_id, changes } =
            decode_result(&mut buf, TimeFormat::Seconds).unwrap()
        else {
            panic!("expected a traffic light result");
        };
        assert_eq!(object_id, "tl0");
        assert_eq!(
            changes,
            vec![
                TrafficLightChange::Phase(2),
                TrafficLightChange::Program("0".to_string()),
                TrafficLightChange::NextSwitch(31.0),
                TrafficLightChange::State("GrGr".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_unknown_blocks_and_variables() {
        let mut buf = block(0xe9, "x", 0, |_| {});
        assert_eq!(
            decode_result(&mut buf, TimeFormat::Seconds),
            Err(ProtocolError::UnknownSubscription(0xe9))
        );

        let mut buf = block(RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE, "v", 1, |buf| {
            ok(buf, 0x99).write_typed(1.0);
        });
        assert_eq!(
            decode_result(&mut buf, TimeFormat::Seconds),
            Err(ProtocolError::UnknownVariable {
                class: "vehicle",
                variable: 0x99
            })
        );
    }

    #[test]
    fn checks_declared_block_length() {
        let mut payload = Buffer::new();
        payload.write_str("v").write(0u8);
        let mut out = Buffer::new();
        // Two trailing bytes no variable accounts for.
        out.write((payload.len() + 4) as u8)
            .write(RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE)
            .write_bytes(payload.as_bytes())
            .write(0u8)
            .write(0u8);
        let mut buf = Buffer::from_bytes(out.into_bytes());
        assert_eq!(
            decode_result(&mut buf, TimeFormat::Seconds),
            Err(ProtocolError::LengthMismatch {
                declared: payload.len() + 4,
                consumed: payload.len() + 2
            })
        );
    }

    #[test]
    fn reconcile_splits_differences() {
        let set = |ids: &[&str]| ids.iter().map(|id| id.to_string()).collect::<BTreeSet<_>>();
        let (subscribe, unsubscribe) = reconcile(&set(&["a", "b", "c"]), &set(&["b", "c", "d", "e"]));
        assert_eq!(subscribe, vec!["d", "e"]);
        assert_eq!(unsubscribe, vec!["a"]);

        let (subscribe, unsubscribe) = reconcile(&set(&["a"]), &set(&["a"]));
        assert!(subscribe.is_empty() && unsubscribe.is_empty());
    }
}
