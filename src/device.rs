use crate::connection::Connection;
use crate::protocol::{DecodeError, Response, WriteValue};
use crate::registers::{Mode, RegisterIndex};
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not complete the exchange with the unit")]
    Request(#[from] crate::connection::Error),
    #[error("the unit's reply could not be decoded")]
    Decode(#[from] DecodeError),
    #[error("`{0}` is not a recognized operating mode")]
    UnknownModeName(String),
}

/// A loosely-typed value aimed at one of the writable attributes.
///
/// Models the command values an automation layer hands over. A writer only
/// acts when the variant matches the attribute it targets; on a mismatch it
/// skips the write and degrades to a plain read-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Switch(bool),
    Percent(u8),
    Text(String),
}

/// The typed attribute surface of one air unit.
///
/// Every accessor is a full request/response round trip; nothing is cached.
/// Writers re-read the attribute after writing, so their return value is
/// the state the unit confirmed, not the value the caller asked for.
pub struct Device {
    connection: Connection,
}

impl Device {
    pub fn new(connection: Connection) -> Device {
        Device { connection }
    }

    pub async fn connect(&self) -> Result<(), crate::connection::Error> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    async fn read(&self, register: &'static str) -> Result<Response, Error> {
        let register = RegisterIndex::from_name(register).unwrap();
        Ok(self.connection.send_robust_request(&register.read_request()).await?)
    }

    async fn write(&self, register: &'static str, value: WriteValue) -> Result<(), Error> {
        let register = RegisterIndex::from_name(register).unwrap();
        self.connection.send_robust_request(&register.write_request(value)).await?;
        Ok(())
    }

    pub async fn unit_name(&self) -> Result<String, Error> {
        Ok(self.read("UNIT_NAME").await?.string()?)
    }

    pub async fn unit_serial_number(&self) -> Result<String, Error> {
        Ok(self.read("UNIT_SERIAL").await?.short().to_string())
    }

    pub async fn mode(&self) -> Result<Mode, Error> {
        Ok(Mode::from_wire(self.read("MODE").await?.byte())?)
    }

    /// Fan speed in percent. The unit itself tracks steps of 0-10.
    pub async fn fan_speed(&self) -> Result<u8, Error> {
        Ok(self.read("FAN_SPEED").await?.byte().saturating_mul(10))
    }

    pub async fn boost(&self) -> Result<bool, Error> {
        Ok(self.read("BOOST").await?.boolean())
    }

    pub async fn bypass(&self) -> Result<bool, Error> {
        Ok(self.read("BYPASS").await?.boolean())
    }

    pub async fn humidity(&self) -> Result<f32, Error> {
        Ok(self.read("HUMIDITY").await?.percent_from_byte())
    }

    pub async fn room_temperature(&self) -> Result<f32, Error> {
        Ok(self.read("ROOM_TEMPERATURE").await?.temperature())
    }

    pub async fn outdoor_temperature(&self) -> Result<f32, Error> {
        Ok(self.read("OUTDOOR_TEMPERATURE").await?.temperature())
    }

    pub async fn supply_temperature(&self) -> Result<f32, Error> {
        Ok(self.read("SUPPLY_TEMPERATURE").await?.temperature())
    }

    pub async fn extract_temperature(&self) -> Result<f32, Error> {
        Ok(self.read("EXTRACT_TEMPERATURE").await?.temperature())
    }

    pub async fn exhaust_temperature(&self) -> Result<f32, Error> {
        Ok(self.read("EXHAUST_TEMPERATURE").await?.temperature())
    }

    /// Remaining control panel battery in percent, reported as a raw byte.
    pub async fn battery_life(&self) -> Result<u8, Error> {
        Ok(self.read("BATTERY_LIFE").await?.byte())
    }

    pub async fn filter_life(&self) -> Result<f32, Error> {
        Ok(self.read("FILTER_LIFE").await?.percent_from_byte())
    }

    pub async fn current_time(&self) -> Result<jiff::Zoned, Error> {
        Ok(self.read("CURRENT_TIME").await?.timestamp()?)
    }

    pub async fn set_fan_speed(&self, command: Command) -> Result<u8, Error> {
        match command {
            Command::Percent(percent) => {
                self.write("FAN_SPEED", WriteValue::Byte(fan_percent_to_step(percent))).await?;
            }
            command => debug!(message = "not a percent command, reading back only", ?command),
        }
        self.fan_speed().await
    }

    pub async fn set_mode(&self, command: Command) -> Result<Mode, Error> {
        match command {
            Command::Text(name) => {
                let mode = name.parse::<Mode>().map_err(|_| Error::UnknownModeName(name))?;
                self.write("MODE", WriteValue::Byte(mode.to_wire())).await?;
            }
            command => debug!(message = "not a mode name command, reading back only", ?command),
        }
        self.mode().await
    }

    pub async fn set_boost(&self, command: Command) -> Result<bool, Error> {
        match command {
            Command::Switch(on) => self.write("BOOST", WriteValue::Byte(on.into())).await?,
            command => debug!(message = "not a switch command, reading back only", ?command),
        }
        self.boost().await
    }

    pub async fn set_bypass(&self, command: Command) -> Result<bool, Error> {
        match command {
            Command::Switch(on) => self.write("BYPASS", WriteValue::Byte(on.into())).await?,
            command => debug!(message = "not a switch command, reading back only", ?command),
        }
        self.bypass().await
    }
}

/// Map 0-100% onto the unit's 0-10 fan speed scale, rounding to the nearest
/// step.
pub(crate) fn fan_percent_to_step(percent: u8) -> u8 {
    ((u16::from(percent) + 5) / 10) as u8
}
