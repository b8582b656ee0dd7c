//! Byte links to the DMX bridge.
//!
//! The runtime only needs to write a frame and read back an acknowledgment,
//! so every link implements the small [`Transport`] trait. Reads and writes
//! must be bounded by the link's timeout; a read that times out reports zero
//! bytes.

use std::{
    fmt,
    io::{self, Read, Write},
    net::TcpStream,
    sync::{Arc, Mutex},
    time::Duration,
};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::{config::TransportConfig, error::TransportError};

/// Byte-oriented read/write capability of a hardware link.
pub trait Transport: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Reads into `buf`, returning `Ok(0)` when the timeout elapses.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Releases the link. Called once during teardown.
    fn close(&mut self) {}
}

/// Opens the link named by `port`.
///
/// `tcp://host:port` connects to a network serial bridge; anything else is
/// treated as a serial device such as `/dev/ttyUSB0` or `COM3`.
pub fn open_port(port: &str, config: &TransportConfig) -> Result<Box<dyn Transport>, TransportError> {
    let open_err = |source| TransportError::Open {
        port: port.to_string(),
        source,
    };

    let transport: Box<dyn Transport> = match port.strip_prefix("tcp://") {
        Some(addr) => Box::new(TcpTransport::connect(addr, config.timeout()).map_err(open_err)?),
        None => Box::new(DeviceTransport::open(port, config).map_err(open_err)?),
    };
    tracing::debug!(port, "opened port");
    Ok(transport)
}

/// Serial device configured for 8N1 at the configured baud rate.
///
/// Reads and writes are bounded by the configured timeout.
pub struct DeviceTransport {
    port: String,
    serial: Option<Box<dyn SerialPort>>,
}

impl DeviceTransport {
    pub fn open(port: &str, config: &TransportConfig) -> io::Result<Self> {
        let serial = serialport::new(port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout())
            .open()?;
        Ok(Self {
            port: port.to_string(),
            serial: Some(serial),
        })
    }

    fn serial(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.serial
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device is closed"))
    }
}

impl fmt::Debug for DeviceTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTransport")
            .field("port", &self.port)
            .field("open", &self.serial.is_some())
            .finish()
    }
}

impl Transport for DeviceTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let serial = self.serial()?;
        let written = serial.write(bytes)?;
        serial.flush()?;
        Ok(written)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        timed_read(self.serial()?.read(buf))
    }

    fn close(&mut self) {
        if self.serial.take().is_some() {
            tracing::debug!(port = %self.port, "closed device");
        }
    }
}

/// Maps an elapsed read timeout to zero bytes read.
fn timed_read(result: io::Result<usize>) -> io::Result<usize> {
    match result {
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ) =>
        {
            Ok(0)
        }
        other => other,
    }
}

/// Serial-over-TCP bridge with socket level timeouts.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn connect(addr: &str, timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: Some(stream),
        })
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream is closed"))
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.stream()?.write(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        timed_read(self.stream()?.read(buf))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

/// Frames captured by a [`LoopbackTransport`], shared with the caller.
pub type SentFrames = Arc<Mutex<Vec<Vec<u8>>>>;

/// In-process stand-in for the bridge.
///
/// Records every written frame and answers with an acknowledgment byte. By
/// default it echoes the frame's command id like the real bridge; it can also
/// be told to answer with a fixed byte or not at all. Used for dry runs and
/// tests.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    frames: SentFrames,
    ack: AckMode,
    pending_ack: Option<u8>,
    fail_writes: bool,
    closed: Arc<Mutex<usize>>,
}

#[derive(Debug, Clone, Copy, Default)]
enum AckMode {
    #[default]
    Echo,
    Fixed(u8),
    Silent,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ack(byte: u8) -> Self {
        Self {
            ack: AckMode::Fixed(byte),
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            ack: AckMode::Silent,
            ..Self::default()
        }
    }

    /// Every write fails with a timed-out IO error.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Handle to the frames written so far.
    pub fn frames(&self) -> SentFrames {
        Arc::clone(&self.frames)
    }

    /// Handle to the number of times the link was closed.
    pub fn close_count(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.closed)
    }
}

impl Transport for LoopbackTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"));
        }
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(bytes.to_vec());
        }
        self.pending_ack = match self.ack {
            AckMode::Echo => bytes.get(1).copied(),
            AckMode::Fixed(byte) => Some(byte),
            AckMode::Silent => None,
        };
        Ok(bytes.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match (self.pending_ack.take(), buf.first_mut()) {
            (Some(ack), Some(slot)) => {
                *slot = ack;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn close(&mut self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed += 1;
        }
    }
}
