//! Command, variable and type identifiers of the TraCI protocol.

// Commands
pub const CMD_GETVERSION: u8 = 0x00;
pub const CMD_SIMSTEP: u8 = 0x02;
pub const CMD_CLOSE: u8 = 0x7f;

pub const CMD_GET_TL_VARIABLE: u8 = 0xa2;
pub const CMD_GET_VEHICLE_VARIABLE: u8 = 0xa4;
pub const CMD_GET_VEHICLETYPE_VARIABLE: u8 = 0xa5;
pub const CMD_GET_ROUTE_VARIABLE: u8 = 0xa6;
pub const CMD_GET_POLYGON_VARIABLE: u8 = 0xa8;
pub const CMD_GET_JUNCTION_VARIABLE: u8 = 0xa9;
pub const CMD_GET_SIM_VARIABLE: u8 = 0xab;

pub const CMD_SET_VEHICLE_VARIABLE: u8 = 0xc4;
pub const CMD_SET_GUI_VARIABLE: u8 = 0xcc;

pub const CMD_SUBSCRIBE_TL_VARIABLE: u8 = 0xd2;
pub const CMD_SUBSCRIBE_VEHICLE_VARIABLE: u8 = 0xd4;
pub const CMD_SUBSCRIBE_SIM_VARIABLE: u8 = 0xdb;

pub const RESPONSE_SUBSCRIBE_TL_VARIABLE: u8 = 0xe2;
pub const RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE: u8 = 0xe4;
pub const RESPONSE_SUBSCRIBE_SIM_VARIABLE: u8 = 0xeb;

/// Offset between a get command and its response.
pub const GET_RESPONSE_OFFSET: u8 = 0x10;

// Result codes
pub const RTYPE_OK: u8 = 0x00;
pub const RTYPE_NOTIMPLEMENTED: u8 = 0x01;
pub const RTYPE_ERR: u8 = 0xff;

// Type tags
pub const POSITION_2D: u8 = 0x01;
pub const POSITION_3D: u8 = 0x03;
pub const TYPE_BOUNDINGBOX: u8 = 0x05;
pub const TYPE_POLYGON: u8 = 0x06;
pub const TYPE_UBYTE: u8 = 0x07;
pub const TYPE_BYTE: u8 = 0x08;
pub const TYPE_INTEGER: u8 = 0x09;
pub const TYPE_DOUBLE: u8 = 0x0b;
pub const TYPE_STRING: u8 = 0x0c;
pub const TYPE_STRINGLIST: u8 = 0x0e;
pub const TYPE_COMPOUND: u8 = 0x0f;

// Generic variables
pub const ID_LIST: u8 = 0x00;
pub const VAR_TYPE: u8 = 0x4f;
pub const VAR_SHAPE: u8 = 0x4e;
pub const VAR_LAYER: u8 = 0x31;
pub const VAR_POSITION: u8 = 0x42;
pub const ADD: u8 = 0x80;
pub const ADD_FULL: u8 = 0x85;

// Simulation variables
pub const VAR_TIME: u8 = 0x66;
pub const VAR_TIME_STEP: u8 = 0x70;
pub const VAR_DEPARTED_VEHICLES_IDS: u8 = 0x74;
pub const VAR_TELEPORT_STARTING_VEHICLES_IDS: u8 = 0x76;
pub const VAR_TELEPORT_ENDING_VEHICLES_IDS: u8 = 0x78;
pub const VAR_ARRIVED_VEHICLES_IDS: u8 = 0x7a;
pub const VAR_NET_BOUNDING_BOX: u8 = 0x7c;
pub const VAR_PARKING_STARTING_VEHICLES_IDS: u8 = 0x6d;
pub const VAR_PARKING_ENDING_VEHICLES_IDS: u8 = 0x6f;

// Vehicle variables
pub const VAR_SLOPE: u8 = 0x36;
pub const VAR_POSITION3D: u8 = 0x39;
pub const VAR_SPEED: u8 = 0x40;
pub const VAR_ANGLE: u8 = 0x43;
pub const VAR_LENGTH: u8 = 0x44;
pub const VAR_WIDTH: u8 = 0x4d;
pub const VAR_ROAD_ID: u8 = 0x50;
pub const VAR_SIGNALS: u8 = 0x5b;
pub const VAR_HEIGHT: u8 = 0xbc;

// Traffic light variables
pub const TL_RED_YELLOW_GREEN_STATE: u8 = 0x20;
pub const TL_CURRENT_PHASE: u8 = 0x28;
pub const TL_CURRENT_PROGRAM: u8 = 0x29;
pub const TL_NEXT_SWITCH: u8 = 0x2d;

// GUI variables
pub const VAR_TRACK_VEHICLE: u8 = 0xa6;
