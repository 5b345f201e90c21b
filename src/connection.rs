//! The transport to the TraCI server.
//!
//! A message on the wire is a `u32` total length (counting itself) followed by
//! one or more commands. Each command starts with a one byte length, or a zero
//! byte and a `u32` length when it does not fit, followed by its identifier.
//! Every response starts with a status command echoing the request.

use crate::buffer::Buffer;
use crate::constants::{CMD_CLOSE, RTYPE_OK};
use crate::error::{Error, ProtocolError, Result};
use crate::math::{normalize_angle, Point2d, Point3d};
use crate::time::TimeFormat;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use std::f64::consts::PI;
use std::io::{Read, Write};
use std::net::TcpStream;

/// The outcome reported by the status part of a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    /// One of `RTYPE_OK`, `RTYPE_NOTIMPLEMENTED` or `RTYPE_ERR`.
    pub result: u8,
    /// A human readable explanation, usually empty on success.
    pub description: String,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        self.result == RTYPE_OK
    }
}

/// The length and identifier that start every command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandHeader {
    /// The identifier of the command.
    pub id: u8,
    /// The declared length of the command, including its header.
    pub length: usize,
    /// The buffer position at which the command started.
    pub start: usize,
}

impl CommandHeader {
    /// Fails unless exactly the declared number of bytes has been read since the header.
    pub fn expect_consumed(&self, buf: &Buffer) -> Result<(), ProtocolError> {
        let consumed = buf.position() - self.start;
        if consumed != self.length {
            return Err(ProtocolError::LengthMismatch {
                declared: self.length,
                consumed,
            });
        }
        Ok(())
    }
}

/// Appends a command with its length header to `out`.
pub fn write_command(out: &mut Buffer, id: u8, payload: &[u8]) {
    let short_len = 1 + 1 + payload.len();
    if short_len <= u8::MAX as usize {
        out.write(short_len as u8);
    } else {
        out.write(0u8).write((1 + 4 + 1 + payload.len()) as u32);
    }
    out.write(id).write_bytes(payload);
}

/// Reads the length header and identifier of the next command.
pub fn read_command_header(buf: &mut Buffer) -> Result<CommandHeader, ProtocolError> {
    let start = buf.position();
    let length = match buf.read::<u8>()? {
        0 => buf.read::<u32>()? as usize,
        len => len as usize,
    };
    let id = buf.read::<u8>()?;
    Ok(CommandHeader { id, length, start })
}

/// Maps the server's coordinate system onto the simulation's world coordinates.
///
/// The server's y axis points up while the world's points down, so y is
/// mirrored within the network bounds. Both axes are shifted so the network
/// starts `margin` metres from the world origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetBounds {
    min: Point2d,
    max: Point2d,
    margin: f64,
}

impl Default for NetBounds {
    fn default() -> Self {
        Self::new(Point2d::new(0.0, 0.0), Point2d::new(1.0, 1.0), 0.0)
    }
}

impl NetBounds {
    pub fn new(min: Point2d, max: Point2d, margin: f64) -> Self {
        Self { min, max, margin }
    }

    /// Translates a server position into world coordinates.
    pub fn to_world(&self, p: Point3d) -> Point3d {
        Point3d::new(
            p.x - self.min.x + self.margin,
            (self.max.y - self.min.y) - (p.y - self.min.y) + self.margin,
            p.z,
        )
    }

    /// Translates a world position back into server coordinates.
    pub fn from_world(&self, p: Point3d) -> Point3d {
        Point3d::new(
            p.x + self.min.x - self.margin,
            (self.max.y - self.min.y) - (p.y - self.margin) + self.min.y,
            p.z,
        )
    }

    /// Converts a server heading (degrees, clockwise from north) into a world angle
    /// (radians, counter-clockwise from east) in `[-π, π)`.
    pub fn angle_to_world(&self, degrees: f64) -> f64 {
        normalize_angle((90.0 - degrees) * PI / 180.0)
    }

    /// Converts a world angle back into a server heading in `[0, 360)` degrees.
    pub fn angle_from_world(&self, radians: f64) -> f64 {
        let degrees = 90.0 - radians * 180.0 / PI;
        degrees.rem_euclid(360.0)
    }

    /// The world coordinates of the network's top right corner.
    pub fn world_extent(&self) -> Point3d {
        let top_right = self.to_world(Point3d::new(self.max.x, self.max.y, 0.0));
        let bottom_left = self.to_world(Point3d::new(self.min.x, self.min.y, 0.0));
        Point3d::new(top_right.x, bottom_left.y, 0.0)
    }
}

/// A connection to a TraCI server.
///
/// Only one exchange is ever in flight: [Connection::query] writes the whole
/// request and blocks until the whole response has arrived.
pub struct Connection<S = TcpStream> {
    stream: S,
    bounds: NetBounds,
    time_format: TimeFormat,
    ignore_gui_commands: bool,
}

impl Connection<TcpStream> {
    /// Opens a TCP connection to the server.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        info!("connecting to TraCI server on {}:{}", host, port);
        let stream = TcpStream::connect((host, port)).map_err(|source| Error::Connect {
            host: host.to_string(),
            port,
            source,
        })?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: Read + Write> Connection<S> {
    /// Wraps an established stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            bounds: Default::default(),
            time_format: TimeFormat::Seconds,
            ignore_gui_commands: false,
        }
    }

    /// Sends one command.
    pub fn send(&mut self, command: u8, body: &Buffer) -> Result<()> {
        let mut message = Buffer::new();
        write_command(&mut message, command, body.as_bytes());
        let bytes = message.into_bytes();
        self.stream.write_u32::<BigEndian>(4 + bytes.len() as u32)?;
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Blocks until a whole message has been received.
    pub fn receive(&mut self) -> Result<Buffer> {
        let length = (self.stream.read_u32::<BigEndian>()? as usize).saturating_sub(4);
        let mut bytes = Vec::new();
        (&mut self.stream).take(length as u64).read_to_end(&mut bytes)?;
        if bytes.len() < length {
            return Err(ProtocolError::Underrun {
                needed: length,
                remaining: bytes.len(),
            }
            .into());
        }
        Ok(Buffer::from_bytes(bytes))
    }

    /// Sends a command and returns the reported status along with the rest of the response.
    pub fn exchange(&mut self, command: u8, body: &Buffer) -> Result<(Status, Buffer)> {
        self.send(command, body)?;
        let mut buf = self.receive()?;
        let header = read_command_header(&mut buf)?;
        if header.id != command {
            return Err(ProtocolError::UnexpectedResponse {
                expected: command,
                found: header.id,
            }
            .into());
        }
        let result = buf.read::<u8>()?;
        let description = buf.read::<String>()?;
        header.expect_consumed(&buf)?;
        Ok((
            Status {
                result,
                description,
            },
            buf,
        ))
    }

    /// Sends a command whose failure ends the run and returns the response payload.
    pub fn query(&mut self, command: u8, body: &Buffer) -> Result<Buffer> {
        let (status, buf) = self.exchange(command, body)?;
        if !status.is_ok() {
            return Err(Error::CommandFailed {
                command,
                description: status.description,
            });
        }
        Ok(buf)
    }

    /// Asks the server to shut down. Failures are only logged.
    pub fn close(&mut self) {
        debug!("closing TraCI connection");
        if let Err(err) = self.query(CMD_CLOSE, &Buffer::new()) {
            warn!("TraCI server did not acknowledge close: {}", err);
        }
    }

    /// The coordinate transform negotiated at startup.
    pub fn bounds(&self) -> &NetBounds {
        &self.bounds
    }

    pub fn set_bounds(&mut self, bounds: NetBounds) {
        self.bounds = bounds;
    }

    /// The time format negotiated at startup.
    pub fn time_format(&self) -> TimeFormat {
        self.time_format
    }

    pub fn set_time_format(&mut self, time_format: TimeFormat) {
        self.time_format = time_format;
    }

    pub fn ignore_gui_commands(&self) -> bool {
        self.ignore_gui_commands
    }

    pub fn set_ignore_gui_commands(&mut self, ignore: bool) {
        self.ignore_gui_commands = ignore;
    }

    /// The underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }
}
