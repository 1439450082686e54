use crate::protocol::{DecodeError, Request, Response, WriteValue};

/// Operation family a register is accessed through.
///
/// The operation codes follow a fixed grammar: endpoint `n` is read with
/// `[n, 0x04]` and written with `[n, 0x06]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint(pub u8);

impl Endpoint {
    pub const fn read(self) -> [u8; 2] {
        [self.0, 0x04]
    }

    pub const fn write(self) -> [u8; 2] {
        [self.0, 0x06]
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Access(u8);

impl Access {
    pub const R: Self = Self(1 << 0);
    pub const W: Self = Self(1 << 1);
    pub const RW: Self = Self(Self::R.0 | Self::W.0);
    // Alias for nicely tabulated `for_each_register` rows below.
    const R_: Self = Self::R;

    pub const fn is_writable(&self) -> bool {
        self.0 & Self::W.0 != 0
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0 & Self::R.0 == 0 { "-" } else { "R" })?;
        f.write_str(if self.0 & Self::W.0 == 0 { "-" } else { "W" })?;
        Ok(())
    }
}

impl serde::Serialize for Access {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// How the meaningful prefix of a reply is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    Bool,
    Byte,
    /// One byte on the unit's 0-255 scale for 0-100%.
    PercentByte,
    /// One byte on the unit's 0-10 scale for 0-100%.
    FanSpeed,
    I16,
    /// A signed short carrying hundredths of a degree.
    Celsius,
    Str,
    Timestamp,
    Mode,
}

impl DataType {
    /// Meaningful bytes at the start of a reply, where fixed.
    pub const fn bytes(&self) -> Option<usize> {
        match self {
            DataType::Bool | DataType::Byte | DataType::PercentByte => Some(1),
            DataType::FanSpeed | DataType::Mode => Some(1),
            DataType::I16 | DataType::Celsius => Some(2),
            DataType::Timestamp => Some(6),
            DataType::Str => None,
        }
    }

    pub fn decode(&self, response: &Response) -> Result<Value, DecodeError> {
        Ok(match self {
            DataType::Bool => Value::Bool(response.boolean()),
            DataType::Byte => Value::Byte(response.byte()),
            DataType::PercentByte => Value::PercentFromByte(response.byte()),
            DataType::FanSpeed => Value::FanSpeed(response.byte()),
            DataType::I16 => Value::I16(response.short()),
            DataType::Celsius => Value::Celsius(response.short()),
            DataType::Str => Value::Str(response.string()?),
            DataType::Timestamp => Value::Timestamp(response.timestamp()?),
            DataType::Mode => Value::Mode(Mode::from_wire(response.byte())?),
        })
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DataType::Bool => "bool",
            DataType::Byte => "byte",
            DataType::PercentByte => "percent",
            DataType::FanSpeed => "fan-speed",
            DataType::I16 => "i16",
            DataType::Celsius => "celsius",
            DataType::Str => "string",
            DataType::Timestamp => "timestamp",
            DataType::Mode => "mode",
        })
    }
}

/// A register value decoded from a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    /// Contains the raw 0-255 wire byte.
    PercentFromByte(u8),
    /// Contains the raw 0-10 wire step.
    FanSpeed(u8),
    I16(i16),
    /// Contains the value multiplied by 100.
    Celsius(i16),
    Str(String),
    Timestamp(jiff::Zoned),
    Mode(Mode),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(v) => f.write_fmt(format_args!("{}", v)),
            Value::Byte(v) => f.write_fmt(format_args!("{}", v)),
            Value::PercentFromByte(v) => {
                f.write_fmt(format_args!("{}", f32::from(*v) * 100.0 / 255.0))
            }
            Value::FanSpeed(v) => f.write_fmt(format_args!("{}", u16::from(*v) * 10)),
            Value::I16(v) => f.write_fmt(format_args!("{}", v)),
            Value::Celsius(v) => f.write_fmt(format_args!("{}", f32::from(*v) / 100.0)),
            Value::Str(v) => f.write_str(v),
            Value::Timestamp(v) => f.write_fmt(format_args!("{}", v)),
            Value::Mode(v) => f.write_fmt(format_args!("{}", v)),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Byte(v) => serializer.serialize_u8(*v),
            Value::PercentFromByte(v) => serializer.serialize_f32(f32::from(*v) * 100.0 / 255.0),
            Value::FanSpeed(v) => serializer.serialize_u16(u16::from(*v) * 10),
            Value::I16(v) => serializer.serialize_i16(*v),
            Value::Celsius(v) => serializer.serialize_f32(f32::from(*v) / 100.0),
            Value::Str(v) => serializer.serialize_str(v),
            Value::Timestamp(v) => serializer.collect_str(v),
            Value::Mode(v) => serializer.collect_str(v),
        }
    }
}

/// The unit's operating mode, transmitted as its ordinal in one byte.
///
/// The set is closed and order-significant; reordering members breaks wire
/// compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(strum::Display, strum::EnumString, strum::VariantNames)]
#[derive(num_derive::FromPrimitive)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum Mode {
    Demand = 0,
    Program = 1,
    Manual = 2,
    Off = 3,
}

impl Mode {
    pub fn from_wire(ordinal: u8) -> Result<Self, DecodeError> {
        num_traits::FromPrimitive::from_u8(ordinal).ok_or(DecodeError::UnknownMode(ordinal))
    }

    pub const fn to_wire(self) -> u8 {
        self as u8
    }
}

/// Index into the register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterIndex(usize);

impl RegisterIndex {
    pub fn from_name(name: &str) -> Option<RegisterIndex> {
        NAMES.iter().position(|v| *v == name).map(Self)
    }

    pub fn all() -> impl Iterator<Item = RegisterIndex> {
        (0..NAMES.len()).map(Self)
    }

    pub fn name(&self) -> &'static str {
        NAMES[self.0]
    }

    pub fn register(&self) -> [u8; 2] {
        REGISTERS[self.0]
    }

    pub fn endpoint(&self) -> Endpoint {
        ENDPOINTS[self.0]
    }

    pub fn data_type(&self) -> DataType {
        DATA_TYPES[self.0]
    }

    pub fn access(&self) -> Access {
        ACCESS[self.0]
    }

    pub fn description(&self) -> &'static str {
        DESCRIPTIONS[self.0]
    }

    pub fn read_request(&self) -> Request {
        Request::read(self.endpoint().read(), self.register())
    }

    pub fn write_request(&self, value: WriteValue) -> Request {
        Request::write(self.endpoint().write(), self.register(), value)
    }
}

macro_rules! for_each_register {
    ($m:ident) => {
        $m! {
            "UNIT_NAME":             [0x15, 0xe5], 1, Str,         R_, "Name assigned to the unit from the service tool";
            "UNIT_SERIAL":           [0x00, 0x25], 4, I16,         R_, "Serial number of the air unit";
            "CCM_SERIAL":            [0x14, 0x6a], 0, I16,         R_, "Serial number of the communication module";
            "MODE":                  [0x14, 0x12], 1, Mode,        RW, "Operating mode. 0=Demand, 1=Program, 2=Manual, 3=Off";
            "FAN_SPEED":             [0x15, 0x61], 1, FanSpeed,    RW, "Fan speed step. 0=Stopped, 10=Maximum";
            "BOOST":                 [0x15, 0x30], 1, Bool,        RW, "Temporary full-speed ventilation";
            "BYPASS":                [0x14, 0x60], 1, Bool,        RW, "Heat exchanger bypass";
            "BYPASS_DEACTIVATION":   [0x14, 0x63], 1, Byte,        R_, "Raw bypass deactivation value; meaning unconfirmed";
            "NIGHT_COOLING":         [0x15, 0x71], 1, Bool,        RW, "Free cooling with night air";
            "AUTOMATIC_BYPASS":      [0x17, 0x06], 1, Bool,        RW, "Let the unit operate the bypass on its own";
            "AUTOMATIC_RUSH_AIRING": [0x17, 0x02], 1, Bool,        RW, "Let the unit trigger rush airing on its own";
            "HUMIDITY":              [0x14, 0x70], 1, PercentByte, R_, "Relative humidity measured in the extract air";
            "ROOM_TEMPERATURE":      [0x03, 0x00], 1, Celsius,     R_, "Temperature at the room sensor or control panel";
            "OUTDOOR_TEMPERATURE":   [0x03, 0x34], 1, Celsius,     R_, "Temperature of the air drawn from outside";
            "SUPPLY_TEMPERATURE":    [0x14, 0x73], 4, Celsius,     R_, "Temperature of the air pushed into the rooms";
            "EXTRACT_TEMPERATURE":   [0x14, 0x74], 4, Celsius,     R_, "Temperature of the air pulled from the rooms";
            "EXHAUST_TEMPERATURE":   [0x14, 0x75], 4, Celsius,     R_, "Temperature of the air expelled outside";
            "BASE_IN":               [0x14, 0x40], 1, Byte,        R_, "Raw supply base value; meaning unconfirmed";
            "BASE_OUT":              [0x14, 0x41], 1, Byte,        R_, "Raw extract base value; meaning unconfirmed";
            "BATTERY_LIFE":          [0x03, 0x0f], 1, Byte,        R_, "Remaining control panel battery, percent";
            "FILTER_LIFE":           [0x14, 0x6a], 1, PercentByte, R_, "Remaining filter life";
            "CURRENT_TIME":          [0x15, 0xe0], 1, Timestamp,   R_, "Wall clock time of the unit";
            "AWAY_FROM":             [0x15, 0x21], 1, Timestamp,   R_, "Start of the scheduled away period";
            "AWAY_TO":               [0x15, 0x20], 1, Timestamp,   R_, "End of the scheduled away period";
        }
    };
}

macro_rules! make_lists {
    ($($name: literal: [$hi: literal, $lo: literal], $ep: literal, $dt: ident, $access: ident, $descr: literal;)+) => {
        pub static NAMES: &[&str] = &[$($name),*];
        pub static REGISTERS: &[[u8; 2]] = &[$([$hi, $lo]),*];
        pub static ENDPOINTS: &[Endpoint] = &[$(Endpoint($ep)),*];
        pub static DATA_TYPES: &[DataType] = &[$(DataType::$dt),*];
        pub static ACCESS: &[Access] = &[$(Access::$access),*];
        pub static DESCRIPTIONS: &[&str] = &[$($descr),*];
    };
}

for_each_register!(make_lists);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_arrays_are_parallel() {
        let names = NAMES.len();
        assert_eq!(names, REGISTERS.len());
        assert_eq!(names, ENDPOINTS.len());
        assert_eq!(names, DATA_TYPES.len());
        assert_eq!(names, ACCESS.len());
        assert_eq!(names, DESCRIPTIONS.len());
    }

    #[test]
    fn names_are_unique() {
        for (index, name) in NAMES.iter().enumerate() {
            assert_eq!(NAMES.iter().position(|v| v == name), Some(index));
        }
    }

    #[test]
    fn lookups_reproduce_the_wire_constants() {
        let mode = RegisterIndex::from_name("MODE").unwrap();
        assert_eq!(mode.register(), [0x14, 0x12]);
        assert_eq!(mode.read_request().operation, [0x01, 0x04]);
        assert_eq!(mode.write_request(WriteValue::Byte(0)).operation, [0x01, 0x06]);

        let fan_speed = RegisterIndex::from_name("FAN_SPEED").unwrap();
        assert_eq!(fan_speed.register(), [0x15, 0x61]);

        let supply = RegisterIndex::from_name("SUPPLY_TEMPERATURE").unwrap();
        assert_eq!(supply.read_request().operation, [0x04, 0x04]);

        assert!(RegisterIndex::from_name("NO_SUCH_REGISTER").is_none());
    }

    #[test]
    fn mode_names_round_trip_and_stay_case_sensitive() {
        assert_eq!("MANUAL".parse::<Mode>().unwrap(), Mode::Manual);
        assert_eq!(Mode::Manual.to_string(), "MANUAL");
        assert!("Manual".parse::<Mode>().is_err());
        assert!("TURBO".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_ordinals_match_the_wire_encoding() {
        for (ordinal, expected) in [Mode::Demand, Mode::Program, Mode::Manual, Mode::Off]
            .into_iter()
            .enumerate()
        {
            let decoded = Mode::from_wire(ordinal as u8).unwrap();
            assert_eq!(decoded, expected);
            assert_eq!(decoded.to_wire(), ordinal as u8);
        }
        assert!(matches!(Mode::from_wire(4), Err(DecodeError::UnknownMode(4))));
    }

    #[test]
    fn decodes_values_per_data_type() {
        let mut data = [0; crate::protocol::RESPONSE_LENGTH];
        data[..2].copy_from_slice(&[0x08, 0x6b]);
        let response = Response::new(data);
        assert_eq!(DataType::Celsius.decode(&response).unwrap(), Value::Celsius(2155));
        assert_eq!(DataType::I16.decode(&response).unwrap(), Value::I16(2155));
        assert_eq!(DataType::Byte.decode(&response).unwrap(), Value::Byte(8));
        assert_eq!(DataType::Bool.decode(&response).unwrap(), Value::Bool(true));
        assert!(DataType::Mode.decode(&response).is_err());
    }

    #[test]
    fn value_rendering_applies_the_scales() {
        assert_eq!(Value::Celsius(2155).to_string(), "21.55");
        assert_eq!(Value::FanSpeed(7).to_string(), "70");
        assert_eq!(Value::PercentFromByte(255).to_string(), "100");
        assert_eq!(Value::Mode(Mode::Off).to_string(), "OFF");
    }
}
