//! One-shot queries and commands sent to the server outside of subscriptions.

use crate::buffer::{Buffer, WireValue};
use crate::connection::{read_command_header, Connection};
use crate::constants::*;
use crate::error::{ProtocolError, Result};
use crate::math::Point2d;
use crate::time::{SimTime, TimeFormat};
use log::debug;
use std::io::{Read, Write};

/// The vehicle type the server falls back to when none is defined.
pub const DEFAULT_VEHTYPE: &str = "DEFAULT_VEHTYPE";

/// Special depart values understood by the legacy `ADD` command.
const DEPART_POS_BASE: f64 = -4.0;
const DEPART_SPEED_MAX: f64 = -3.0;
const DEPART_LANE_BEST_FREE: i8 = -5;

impl<S: Read + Write> Connection<S> {
    /// Queries the server's API version and its self description.
    pub fn api_version(&mut self) -> Result<(i32, String)> {
        let mut buf = self.query(CMD_GETVERSION, &Buffer::new())?;
        let header = read_command_header(&mut buf)?;
        if header.id != CMD_GETVERSION {
            return Err(ProtocolError::UnexpectedResponse {
                expected: CMD_GETVERSION,
                found: header.id,
            }
            .into());
        }
        let version = buf.read::<i32>()?;
        let server = buf.read::<String>()?;
        header.expect_consumed(&buf)?;
        buf.expect_eof()?;
        Ok((version, server))
    }

    /// Queries the bounding box of the road network, as lower left and upper right corner.
    pub fn network_boundaries(&mut self) -> Result<(Point2d, Point2d)> {
        let mut buf = self.get_variable(CMD_GET_SIM_VARIABLE, VAR_NET_BOUNDING_BOX, "")?;
        let corners = match buf.read::<u8>()? {
            TYPE_BOUNDINGBOX => (buf.read::<Point2d>()?, buf.read::<Point2d>()?),
            TYPE_POLYGON => {
                let count = buf.read::<u8>()?;
                if count != 2 {
                    return Err(ProtocolError::UnexpectedBoundary(count).into());
                }
                (buf.read::<Point2d>()?, buf.read::<Point2d>()?)
            }
            other => return Err(ProtocolError::UnexpectedBoundary(other).into()),
        };
        buf.expect_eof()?;
        Ok(corners)
    }

    /// The vehicle types known to the server, apart from the built-in default.
    pub fn vehicle_type_ids(&mut self) -> Result<Vec<String>> {
        let ids: Vec<String> = self.get_typed(CMD_GET_VEHICLETYPE_VARIABLE, ID_LIST, "")?;
        Ok(ids.into_iter().filter(|id| id != DEFAULT_VEHTYPE).collect())
    }

    /// The routes known to the server.
    pub fn route_ids(&mut self) -> Result<Vec<String>> {
        self.get_typed(CMD_GET_ROUTE_VARIABLE, ID_LIST, "")
    }

    /// The traffic light systems known to the server.
    pub fn traffic_light_ids(&mut self) -> Result<Vec<String>> {
        self.get_typed(CMD_GET_TL_VARIABLE, ID_LIST, "")
    }

    /// The position of a junction, in server coordinates.
    pub fn junction_position(&mut self, junction_id: &str) -> Result<Point2d> {
        self.get_typed(CMD_GET_JUNCTION_VARIABLE, VAR_POSITION, junction_id)
    }

    /// The polygons known to the server.
    pub fn polygon_ids(&mut self) -> Result<Vec<String>> {
        self.get_typed(CMD_GET_POLYGON_VARIABLE, ID_LIST, "")
    }

    /// The type of a polygon.
    pub fn polygon_type(&mut self, polygon_id: &str) -> Result<String> {
        self.get_typed(CMD_GET_POLYGON_VARIABLE, VAR_TYPE, polygon_id)
    }

    /// The outline of a polygon, in server coordinates.
    pub fn polygon_shape(&mut self, polygon_id: &str) -> Result<Vec<Point2d>> {
        let mut buf = self.get_variable(CMD_GET_POLYGON_VARIABLE, VAR_SHAPE, polygon_id)?;
        buf.expect_tag(TYPE_POLYGON)?;
        let count = buf.read::<u8>()?;
        let shape = (0..count)
            .map(|_| buf.read::<Point2d>())
            .collect::<Result<Vec<_>, _>>()?;
        buf.expect_eof()?;
        Ok(shape)
    }

    /// The layer of a polygon, used as its height.
    pub fn polygon_layer(&mut self, polygon_id: &str) -> Result<i32> {
        self.get_typed(CMD_GET_POLYGON_VARIABLE, VAR_LAYER, polygon_id)
    }

    /// The vehicle type of a vehicle.
    pub fn vehicle_type(&mut self, vehicle_id: &str) -> Result<String> {
        self.get_typed(CMD_GET_VEHICLE_VARIABLE, VAR_TYPE, vehicle_id)
    }

    /// Asks the server to insert a vehicle. Returns `false` if the server refused,
    /// e.g. because the route is not usable by the vehicle type.
    pub fn add_vehicle(
        &mut self,
        vehicle_id: &str,
        vehicle_type: &str,
        route_id: &str,
        depart: SimTime,
    ) -> Result<bool> {
        let mut body = Buffer::new();
        match self.time_format() {
            TimeFormat::Seconds => {
                body.write(ADD_FULL)
                    .write_str(vehicle_id)
                    .write(TYPE_COMPOUND)
                    .write(14i32)
                    .write_typed_str(route_id)
                    .write_typed_str(vehicle_type)
                    .write_typed(depart.to_string());
                for field in ["best", "base", "max", "current", "max", "current", "", "", ""] {
                    body.write_typed_str(field);
                }
                body.write_typed(0i32).write_typed(0i32);
            }
            TimeFormat::Milliseconds => {
                body.write(ADD)
                    .write_str(vehicle_id)
                    .write(TYPE_COMPOUND)
                    .write(6i32)
                    .write_typed_str(vehicle_type)
                    .write_typed_str(route_id)
                    .write_typed(TimeFormat::to_millis(depart))
                    .write_typed(DEPART_POS_BASE)
                    .write_typed(DEPART_SPEED_MAX)
                    .write_typed(DEPART_LANE_BEST_FREE);
            }
        }
        let (status, buf) = self.exchange(CMD_SET_VEHICLE_VARIABLE, &body)?;
        if !status.is_ok() {
            debug!(
                "server refused to add {} on route {}: {}",
                vehicle_id, route_id, status.description
            );
            return Ok(false);
        }
        buf.expect_eof()?;
        Ok(true)
    }

    /// Makes a GUI view follow a vehicle. Does nothing when GUI commands are ignored.
    pub fn gui_track_vehicle(&mut self, view_id: &str, vehicle_id: &str) -> Result<()> {
        if self.ignore_gui_commands() {
            return Ok(());
        }
        let mut body = Buffer::new();
        body.write(VAR_TRACK_VEHICLE)
            .write_str(view_id)
            .write_typed_str(vehicle_id);
        self.query(CMD_SET_GUI_VARIABLE, &body)?.expect_eof()?;
        Ok(())
    }

    /// Queries a variable and returns the response positioned at its typed value.
    fn get_variable(&mut self, command: u8, variable: u8, object_id: &str) -> Result<Buffer> {
        let mut body = Buffer::new();
        body.write(variable).write_str(object_id);
        let mut buf = self.query(command, &body)?;
        let header = read_command_header(&mut buf)?;
        let expected = command + GET_RESPONSE_OFFSET;
        if header.id != expected {
            return Err(ProtocolError::UnexpectedResponse {
                expected,
                found: header.id,
            }
            .into());
        }
        let found = buf.read::<u8>()?;
        if found != variable {
            return Err(ProtocolError::UnexpectedResponse {
                expected: variable,
                found,
            }
            .into());
        }
        buf.read::<String>()?;
        Ok(buf)
    }

    fn get_typed<T: WireValue>(&mut self, command: u8, variable: u8, object_id: &str) -> Result<T> {
        let mut buf = self.get_variable(command, variable, object_id)?;
        let value = buf.read_typed::<T>()?;
        buf.expect_eof()?;
        Ok(value)
    }
}

