//! One-way TCP link to the robot controller.
//!
//! # Responsibility
//! - Frame program bodies as a single named procedure and send them to the
//!   script port.
//! - Send short newline-terminated directives to the dashboard port.
//!
//! # Invariants
//! - Every call opens and closes its own connection.
//! - No response is read and no call is retried.
//! - Failures are returned to the caller, never raised past this boundary.

use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

pub const DEFAULT_ROBOT_HOST: &str = "localhost";
pub const DEFAULT_SCRIPT_PORT: u16 = 30002;
pub const DEFAULT_DASHBOARD_PORT: u16 = 29999;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Controller host plus its two listening ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotEndpoint {
    pub host: String,
    pub script_port: u16,
    pub dashboard_port: u16,
}

impl Default for RobotEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_ROBOT_HOST.to_string(),
            script_port: DEFAULT_SCRIPT_PORT,
            dashboard_port: DEFAULT_DASHBOARD_PORT,
        }
    }
}

impl RobotEndpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// `host:script_port`, used in status text.
    pub fn script_address(&self) -> String {
        format!("{}:{}", self.host, self.script_port)
    }

    pub fn dashboard_address(&self) -> String {
        format!("{}:{}", self.host, self.dashboard_port)
    }
}

/// Which controller port a send targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkChannel {
    Script,
    Dashboard,
}

impl LinkChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Dashboard => "dashboard",
        }
    }
}

/// Transport failure while talking to the controller.
#[derive(Debug)]
pub enum RobotLinkError {
    /// Host name did not resolve.
    Resolve { address: String, source: io::Error },
    /// Host resolved to no usable socket address.
    NoAddress { address: String },
    /// Connection refused or timed out.
    Connect { address: String, source: io::Error },
    /// Connection opened but the payload could not be written.
    Transmit { address: String, source: io::Error },
}

impl RobotLinkError {
    pub fn address(&self) -> &str {
        match self {
            Self::Resolve { address, .. }
            | Self::NoAddress { address }
            | Self::Connect { address, .. }
            | Self::Transmit { address, .. } => address,
        }
    }
}

impl Display for RobotLinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve { address, source } => {
                write!(f, "cannot resolve robot address {address}: {source}")
            }
            Self::NoAddress { address } => write!(f, "no socket address for robot {address}"),
            Self::Connect { address, source } => {
                write!(f, "cannot connect to robot at {address}: {source}")
            }
            Self::Transmit { address, source } => {
                write!(f, "failed to send to robot at {address}: {source}")
            }
        }
    }
}

impl Error for RobotLinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Resolve { source, .. }
            | Self::Connect { source, .. }
            | Self::Transmit { source, .. } => Some(source),
            Self::NoAddress { .. } => None,
        }
    }
}

/// Procedure name used for a framed program.
pub fn program_name(correlation_id: u64) -> String {
    format!("pick_item_{correlation_id}")
}

/// Wraps a program body as one named procedure.
pub fn frame_program(body: &str, correlation_id: u64) -> String {
    format!("def {}():\n{}\nend\n", program_name(correlation_id), body)
}

/// Ensures a dashboard directive ends with exactly the caller's text plus `\n`.
pub fn frame_command(command: &str) -> String {
    if command.ends_with('\n') {
        command.to_string()
    } else {
        format!("{command}\n")
    }
}

/// Outbound controller transport.
pub trait RobotLink {
    /// Sends one program body framed as `def pick_item_<id>(): ... end`.
    fn send_script(
        &self,
        endpoint: &RobotEndpoint,
        body: &str,
        correlation_id: u64,
    ) -> Result<(), RobotLinkError>;

    /// Sends one directive to the dashboard port.
    fn send_command(&self, endpoint: &RobotEndpoint, command: &str) -> Result<(), RobotLinkError>;

    fn release_brakes(&self, endpoint: &RobotEndpoint) -> Result<(), RobotLinkError> {
        self.send_command(endpoint, "brake release")
    }

    fn stop_program(&self, endpoint: &RobotEndpoint) -> Result<(), RobotLinkError> {
        self.send_command(endpoint, "stop")
    }

    fn play_program(&self, endpoint: &RobotEndpoint) -> Result<(), RobotLinkError> {
        self.send_command(endpoint, "play")
    }

    fn power_on(&self, endpoint: &RobotEndpoint) -> Result<(), RobotLinkError> {
        self.send_command(endpoint, "power on")
    }
}

impl<L: RobotLink + ?Sized> RobotLink for &L {
    fn send_script(
        &self,
        endpoint: &RobotEndpoint,
        body: &str,
        correlation_id: u64,
    ) -> Result<(), RobotLinkError> {
        (**self).send_script(endpoint, body, correlation_id)
    }

    fn send_command(&self, endpoint: &RobotEndpoint, command: &str) -> Result<(), RobotLinkError> {
        (**self).send_command(endpoint, command)
    }
}

/// Blocking TCP implementation.
#[derive(Debug, Clone)]
pub struct TcpRobotLink {
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl Default for TcpRobotLink {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl TcpRobotLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero durations are ignored.
    pub fn with_timeouts(connect_timeout: Duration, write_timeout: Duration) -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout: non_zero_or(connect_timeout, defaults.connect_timeout),
            write_timeout: non_zero_or(write_timeout, defaults.write_timeout),
        }
    }

    fn transmit(
        &self,
        channel: LinkChannel,
        host: &str,
        port: u16,
        payload: &str,
    ) -> Result<(), RobotLinkError> {
        let address = format!("{host}:{port}");
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|source| RobotLinkError::Resolve {
                address: address.clone(),
                source,
            })?;

        let mut last_error = None;
        let mut connected = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(err) => last_error = Some(err),
            }
        }

        let mut stream = match (connected, last_error) {
            (Some(stream), _) => stream,
            (None, Some(source)) => return Err(RobotLinkError::Connect { address, source }),
            (None, None) => return Err(RobotLinkError::NoAddress { address }),
        };

        let written = stream
            .set_write_timeout(Some(self.write_timeout))
            .and_then(|()| stream.write_all(payload.as_bytes()))
            .and_then(|()| stream.flush());
        if let Err(source) = written {
            return Err(RobotLinkError::Transmit { address, source });
        }

        // Peer may already have closed; nothing is awaited either way.
        let _ = stream.shutdown(Shutdown::Write);
        info!(
            "event=robot_send module=robot status=ok channel={} address={} bytes={}",
            channel.as_str(),
            address,
            payload.len()
        );
        Ok(())
    }
}

impl RobotLink for TcpRobotLink {
    fn send_script(
        &self,
        endpoint: &RobotEndpoint,
        body: &str,
        correlation_id: u64,
    ) -> Result<(), RobotLinkError> {
        let started_at = Instant::now();
        let program = frame_program(body, correlation_id);
        self.transmit(
            LinkChannel::Script,
            &endpoint.host,
            endpoint.script_port,
            &program,
        )
        .inspect_err(|err| {
            warn!(
                "event=robot_send module=robot status=error channel=script correlation_id={} duration_ms={} error={}",
                correlation_id,
                started_at.elapsed().as_millis(),
                err
            );
        })
    }

    fn send_command(&self, endpoint: &RobotEndpoint, command: &str) -> Result<(), RobotLinkError> {
        let framed = frame_command(command);
        self.transmit(
            LinkChannel::Dashboard,
            &endpoint.host,
            endpoint.dashboard_port,
            &framed,
        )
        .inspect_err(|err| {
            warn!(
                "event=robot_send module=robot status=error channel=dashboard command={} error={}",
                command.trim(),
                err
            );
        })
    }
}

fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
