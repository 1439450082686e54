pub mod registers {
    use crate::output;
    use crate::registers::{Access, DataType, RegisterIndex};

    /// Search and output the known unit registers.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Only list registers whose name or description contains this
        /// pattern.
        filter: Option<String>,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error(transparent)]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    struct RegisterSchema {
        name: &'static str,
        register: [u8; 2],
        endpoint: u8,
        data_type: DataType,
        access: Access,
        description: &'static str,
    }

    fn is_match(register: RegisterIndex, pattern: &str) -> bool {
        let pattern = pattern.to_uppercase();
        register.name().contains(&pattern)
            || register.description().to_uppercase().contains(&pattern)
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.to_output()?;
        output.headers(&["Name", "Register", "Endpoint", "Type", "Access", "Description"])?;
        for register in RegisterIndex::all() {
            if let Some(pattern) = &args.filter {
                if !is_match(register, pattern) {
                    continue;
                }
            }
            let [hi, lo] = register.register();
            output.row(
                || {
                    vec![
                        register.name().to_string(),
                        format!("{hi:02x} {lo:02x}"),
                        register.endpoint().0.to_string(),
                        register.data_type().to_string(),
                        register.access().to_string(),
                        register.description().to_string(),
                    ]
                },
                || RegisterSchema {
                    name: register.name(),
                    register: register.register(),
                    endpoint: register.endpoint().0,
                    data_type: register.data_type(),
                    access: register.access(),
                    description: register.description(),
                },
            )?;
        }
        Ok(output.finish()?)
    }
}

pub mod read {
    use crate::connection::Connection;
    use crate::registers::{RegisterIndex, Value};
    use crate::{connection, output, protocol};

    /// Read registers by name and output the decoded values.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Names of the registers to read (see the `registers` command).
        #[arg(required = true)]
        registers: Vec<String>,
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("`{0}` is not a known register name (see the `registers` command)")]
        UnknownRegister(String),
        #[error("could not complete the exchange with the unit")]
        Request(#[from] connection::Error),
        #[error("could not decode the reply for `{1}`")]
        Decode(#[source] protocol::DecodeError, &'static str),
        #[error(transparent)]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    struct ReadRecord {
        name: &'static str,
        value: Value,
    }

    pub async fn run(args: Args) -> Result<(), Error> {
        let registers = args
            .registers
            .iter()
            .map(|name| {
                RegisterIndex::from_name(name).ok_or_else(|| Error::UnknownRegister(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut output = args.output.to_output()?;
        output.headers(&["Name", "Value"])?;
        let connection = Connection::new(&args.connection);
        connection.connect().await?;
        for register in registers {
            let response = connection.send_robust_request(&register.read_request()).await?;
            let value = register
                .data_type()
                .decode(&response)
                .map_err(|e| Error::Decode(e, register.name()))?;
            output.row(
                || vec![register.name().to_string(), value.to_string()],
                || ReadRecord { name: register.name(), value: value.clone() },
            )?;
        }
        connection.disconnect().await;
        Ok(output.finish()?)
    }
}

pub mod write {
    use crate::connection::Connection;
    use crate::protocol::WriteValue;
    use crate::registers::{DataType, Mode, RegisterIndex, Value};
    use crate::{connection, output, protocol};
    use strum::VariantNames as _;

    /// Write a register by name and output the value the unit confirms.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Name of the register to write (see the `registers` command).
        register: String,
        /// The value to write: `on`/`off` for switches, a percentage for the
        /// fan speed, a mode name for the mode, a number otherwise.
        value: String,
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("`{0}` is not a known register name (see the `registers` command)")]
        UnknownRegister(String),
        #[error("register `{0}` is read-only")]
        ReadOnly(&'static str),
        #[error("values of register `{0}` can not be written by this tool")]
        UnsupportedType(&'static str),
        #[error("`{1}` is not a valid value for `{0}` (expected {2})")]
        BadValue(&'static str, String, String),
        #[error("could not complete the exchange with the unit")]
        Request(#[from] connection::Error),
        #[error("could not decode the reply for `{1}`")]
        Decode(#[source] protocol::DecodeError, &'static str),
        #[error(transparent)]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    struct WriteRecord {
        name: &'static str,
        value: Value,
    }

    fn encode(register: RegisterIndex, input: &str) -> Result<WriteValue, Error> {
        let bad_value = |expected: &str| {
            Error::BadValue(register.name(), input.to_string(), expected.to_string())
        };
        Ok(match register.data_type() {
            DataType::Bool => match input {
                "on" | "true" | "1" => WriteValue::Byte(1),
                "off" | "false" | "0" => WriteValue::Byte(0),
                _ => return Err(bad_value("on or off")),
            },
            DataType::Byte => {
                WriteValue::Byte(input.parse().map_err(|_| bad_value("a byte"))?)
            }
            DataType::FanSpeed => {
                let percent: u8 = input.parse().map_err(|_| bad_value("0 to 100"))?;
                if percent > 100 {
                    return Err(bad_value("0 to 100"));
                }
                WriteValue::Byte(crate::device::fan_percent_to_step(percent))
            }
            DataType::I16 => {
                WriteValue::Short(input.parse().map_err(|_| bad_value("a 16-bit number"))?)
            }
            DataType::Celsius => {
                let degrees: f32 =
                    input.parse().map_err(|_| bad_value("a temperature in celsius"))?;
                WriteValue::Short((degrees * 100.0).round() as i16)
            }
            DataType::Mode => {
                let expected = format!("one of {}", Mode::VARIANTS.join(", "));
                let mode: Mode = input.parse().map_err(|_| bad_value(&expected))?;
                WriteValue::Byte(mode.to_wire())
            }
            DataType::PercentByte | DataType::Str | DataType::Timestamp => {
                return Err(Error::UnsupportedType(register.name()));
            }
        })
    }

    pub async fn run(args: Args) -> Result<(), Error> {
        let register = RegisterIndex::from_name(&args.register)
            .ok_or_else(|| Error::UnknownRegister(args.register.clone()))?;
        if !register.access().is_writable() {
            return Err(Error::ReadOnly(register.name()));
        }
        let value = encode(register, &args.value)?;
        let mut output = args.output.to_output()?;
        output.headers(&["Name", "Value"])?;
        let connection = Connection::new(&args.connection);
        connection.connect().await?;
        connection.send_robust_request(&register.write_request(value)).await?;
        // The value the write settled on, not the value that was asked for.
        let response = connection.send_robust_request(&register.read_request()).await?;
        let confirmed = register
            .data_type()
            .decode(&response)
            .map_err(|e| Error::Decode(e, register.name()))?;
        output.row(
            || vec![register.name().to_string(), confirmed.to_string()],
            || WriteRecord { name: register.name(), value: confirmed.clone() },
        )?;
        connection.disconnect().await;
        Ok(output.finish()?)
    }

}

pub mod status {
    use crate::connection::Connection;
    use crate::device::Device;
    use crate::{connection, device, output};

    /// Read every attribute of the unit and output one row per attribute.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not connect to the unit")]
        Connect(#[source] connection::Error),
        #[error(transparent)]
        Device(#[from] device::Error),
        #[error(transparent)]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    struct StatusRecord {
        attribute: &'static str,
        value: serde_json::Value,
    }

    pub async fn run(args: Args) -> Result<(), Error> {
        let device = Device::new(Connection::new(&args.connection));
        device.connect().await.map_err(Error::Connect)?;

        let mut rows: Vec<(&'static str, String, serde_json::Value)> = Vec::new();
        let name = device.unit_name().await?;
        rows.push(("unit-name", name.clone(), serde_json::Value::String(name)));
        let serial = device.unit_serial_number().await?;
        rows.push(("unit-serial", serial.clone(), serde_json::Value::String(serial)));
        let mode = device.mode().await?;
        rows.push(("mode", mode.to_string(), serde_json::json!(mode.to_string())));
        let fan_speed = device.fan_speed().await?;
        rows.push(("fan-speed", fan_speed.to_string(), serde_json::json!(fan_speed)));
        let boost = device.boost().await?;
        rows.push(("boost", boost.to_string(), serde_json::json!(boost)));
        let bypass = device.bypass().await?;
        rows.push(("bypass", bypass.to_string(), serde_json::json!(bypass)));
        let humidity = device.humidity().await?;
        rows.push(("humidity", format!("{humidity:.1}"), serde_json::json!(humidity)));
        let room = device.room_temperature().await?;
        rows.push(("room-temperature", format!("{room:.2}"), serde_json::json!(room)));
        let outdoor = device.outdoor_temperature().await?;
        rows.push(("outdoor-temperature", format!("{outdoor:.2}"), serde_json::json!(outdoor)));
        let supply = device.supply_temperature().await?;
        rows.push(("supply-temperature", format!("{supply:.2}"), serde_json::json!(supply)));
        let extract = device.extract_temperature().await?;
        rows.push(("extract-temperature", format!("{extract:.2}"), serde_json::json!(extract)));
        let exhaust = device.exhaust_temperature().await?;
        rows.push(("exhaust-temperature", format!("{exhaust:.2}"), serde_json::json!(exhaust)));
        let battery = device.battery_life().await?;
        rows.push(("battery-life", battery.to_string(), serde_json::json!(battery)));
        let filter = device.filter_life().await?;
        rows.push(("filter-life", format!("{filter:.1}"), serde_json::json!(filter)));
        let time = device.current_time().await?;
        rows.push(("current-time", time.to_string(), serde_json::json!(time.to_string())));
        device.disconnect().await;

        let mut output = args.output.to_output()?;
        output.headers(&["Attribute", "Value"])?;
        for (attribute, rendered, value) in rows {
            output.row(
                || vec![attribute.to_string(), rendered.clone()],
                || StatusRecord { attribute, value: value.clone() },
            )?;
        }
        Ok(output.finish()?)
    }
}

pub mod discover {
    use crate::protocol::{DISCOVER_RECEIVE, DISCOVER_SEND, DISCOVERY_PORT};
    use std::net::Ipv4Addr;
    use tracing::debug;

    /// Broadcast a discovery probe and list the units that answer.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Address to broadcast the probe to.
        #[arg(long, default_value = "255.255.255.255")]
        broadcast: Ipv4Addr,
        /// UDP port the communication modules listen for probes on.
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        port: u16,
        /// How long to collect replies for.
        #[arg(long, default_value = "2s")]
        timeout: humantime::Duration,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not open a UDP socket")]
        Bind(#[source] std::io::Error),
        #[error("could not enable broadcasting on the UDP socket")]
        Broadcast(#[source] std::io::Error),
        #[error("could not send out the discovery probe")]
        Send(#[source] std::io::Error),
        #[error("could not receive discovery replies")]
        Receive(#[source] std::io::Error),
    }

    pub async fn run(args: Args) -> Result<(), Error> {
        let socket = tokio::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(Error::Bind)?;
        socket.set_broadcast(true).map_err(Error::Broadcast)?;
        socket
            .send_to(&DISCOVER_SEND, (args.broadcast, args.port))
            .await
            .map_err(Error::Send)?;
        let deadline = tokio::time::Instant::now() + *args.timeout;
        let mut buffer = [0; 64];
        let mut responders = 0;
        loop {
            let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut buffer)).await;
            let Ok(received) = received else {
                break;
            };
            let (length, peer) = received.map_err(Error::Receive)?;
            if buffer[..length].starts_with(&DISCOVER_RECEIVE) {
                println!("{}", peer.ip());
                responders += 1;
            } else {
                debug!(message = "reply without the expected prefix", ?peer, length);
            }
        }
        if responders == 0 {
            eprintln!("no units responded within {}", args.timeout);
        }
        Ok(())
    }
}
