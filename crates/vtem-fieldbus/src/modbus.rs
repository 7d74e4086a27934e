//! Modbus TCP register transport.
//!
//! Blocking client over `std::net::TcpStream` supporting the three
//! function codes the terminal's register map needs:
//! - Read Holding Registers (Function 0x03)
//! - Write Single Register (Function 0x06)
//! - Write Multiple Registers (Function 0x10)

use crate::RegisterTransport;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use vtem_common::{TransportConfig, VtemError, VtemResult};

/// Maximum registers per read request (Modbus limit).
pub const MAX_READ_REGISTERS: usize = 125;

/// Maximum registers per write-multiple request (Modbus limit).
pub const MAX_WRITE_REGISTERS: usize = 123;

/// Modbus function codes used by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Holding Registers (0x03).
    ReadHoldingRegisters = 0x03,
    /// Write Single Register (0x06).
    WriteSingleRegister = 0x06,
    /// Write Multiple Registers (0x10).
    WriteMultipleRegisters = 0x10,
}

/// Modbus exception codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Illegal function code.
    IllegalFunction = 0x01,
    /// Illegal data address.
    IllegalDataAddress = 0x02,
    /// Illegal data value.
    IllegalDataValue = 0x03,
    /// Server device failure.
    ServerDeviceFailure = 0x04,
    /// Acknowledge (request accepted, processing).
    Acknowledge = 0x05,
    /// Server device busy.
    ServerDeviceBusy = 0x06,
    /// Gateway path unavailable.
    GatewayPathUnavailable = 0x0A,
    /// Gateway target device failed to respond.
    GatewayTargetFailed = 0x0B,
}

impl ExceptionCode {
    /// Parse an exception code from a byte value.
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::ServerDeviceFailure),
            0x05 => Some(Self::Acknowledge),
            0x06 => Some(Self::ServerDeviceBusy),
            0x0A => Some(Self::GatewayPathUnavailable),
            0x0B => Some(Self::GatewayTargetFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalFunction => write!(f, "Illegal Function"),
            Self::IllegalDataAddress => write!(f, "Illegal Data Address"),
            Self::IllegalDataValue => write!(f, "Illegal Data Value"),
            Self::ServerDeviceFailure => write!(f, "Server Device Failure"),
            Self::Acknowledge => write!(f, "Acknowledge"),
            Self::ServerDeviceBusy => write!(f, "Server Device Busy"),
            Self::GatewayPathUnavailable => write!(f, "Gateway Path Unavailable"),
            Self::GatewayTargetFailed => write!(f, "Gateway Target Failed"),
        }
    }
}

/// Modbus TCP Application Protocol (MBAP) header.
#[derive(Debug, Clone, Copy)]
struct MbapHeader {
    transaction_id: u16,
    /// Always 0 for Modbus.
    protocol_id: u16,
    /// Length of unit ID + PDU.
    length: u16,
    unit_id: u8,
}

impl MbapHeader {
    const SIZE: usize = 7;

    fn new(transaction_id: u16, pdu_length: u16, unit_id: u8) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            length: pdu_length + 1,
            unit_id,
        }
    }

    /// Serialize the header to bytes (big-endian).
    fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_be_bytes());
        bytes[6] = self.unit_id;
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> VtemResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(VtemError::Transport(format!(
                "MBAP header too short: {} bytes",
                bytes.len()
            )));
        }

        Ok(Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        })
    }
}

/// Configuration for the Modbus TCP transport.
#[derive(Debug, Clone)]
pub struct ModbusTcpConfig {
    /// Terminal address, anything accepted by `ToSocketAddrs` (`host:port`).
    pub server_addr: String,
    /// Unit ID placed in every request.
    pub unit_id: u8,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read/write timeout.
    pub io_timeout: Duration,
}

impl Default for ModbusTcpConfig {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl From<&TransportConfig> for ModbusTcpConfig {
    fn from(config: &TransportConfig) -> Self {
        Self {
            server_addr: config.address(),
            unit_id: config.unit_id,
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
        }
    }
}

/// Blocking Modbus TCP transport.
///
/// One request is in flight at a time. Any I/O error drops the stream, after
/// which every call fails until [`RegisterTransport::connect`] is called again.
pub struct ModbusTcpTransport {
    config: ModbusTcpConfig,
    connection: Option<TcpStream>,
    transaction_id: u16,
    /// Receive buffer, sized for the largest Modbus TCP frame.
    rx_buffer: Vec<u8>,
}

impl ModbusTcpTransport {
    /// Create a transport for the given configuration. Does not connect.
    pub fn new(config: ModbusTcpConfig) -> Self {
        Self {
            config,
            connection: None,
            transaction_id: 0,
            rx_buffer: vec![0u8; 260],
        }
    }

    /// Create a transport from a node (host) and service (port) pair.
    pub fn from_node_service(node: &str, service: &str) -> Self {
        Self::new(ModbusTcpConfig {
            server_addr: format!("{node}:{service}"),
            ..ModbusTcpConfig::default()
        })
    }

    /// Transport configuration.
    pub fn config(&self) -> &ModbusTcpConfig {
        &self.config
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    fn resolve(&self) -> VtemResult<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = self
            .config
            .server_addr
            .to_socket_addrs()
            .map_err(|e| {
                VtemError::Transport(format!(
                    "cannot resolve {}: {e}",
                    self.config.server_addr
                ))
            })?
            .collect();
        if addrs.is_empty() {
            return Err(VtemError::Transport(format!(
                "{} resolved to no addresses",
                self.config.server_addr
            )));
        }
        Ok(addrs)
    }

    fn open_stream(&self, addr: &SocketAddr) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect_timeout(addr, self.config.connect_timeout)?;
        stream.set_read_timeout(Some(self.config.io_timeout))?;
        stream.set_write_timeout(Some(self.config.io_timeout))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Drop the stream after an I/O failure and build the error to report.
    fn fail_stream(&mut self, what: &str, e: &std::io::Error) -> VtemError {
        warn!(error = %e, "{what} failed, dropping Modbus connection");
        self.connection = None;
        VtemError::Transport(format!("{what} failed: {e}"))
    }

    /// Drop the stream after a response that does not answer the request.
    ///
    /// Bytes left in the socket would otherwise be parsed as the next
    /// response header.
    fn invalidate(&mut self, error: VtemError) -> VtemError {
        warn!(%error, "Invalid Modbus response, dropping connection");
        self.connection = None;
        error
    }

    fn check_header(&self, header: &MbapHeader, transaction_id: u16) -> VtemResult<usize> {
        if header.transaction_id != transaction_id {
            return Err(VtemError::Transport(format!(
                "transaction ID mismatch: expected {}, got {}",
                transaction_id, header.transaction_id
            )));
        }

        if header.protocol_id != 0 {
            return Err(VtemError::Transport(format!(
                "invalid protocol ID: {}",
                header.protocol_id
            )));
        }

        if header.unit_id != self.config.unit_id {
            return Err(VtemError::Transport(format!(
                "unit ID mismatch: expected {}, got {}",
                self.config.unit_id, header.unit_id
            )));
        }

        let pdu_length = usize::from(header.length.saturating_sub(1));
        if pdu_length == 0 || pdu_length > self.rx_buffer.len() - MbapHeader::SIZE {
            return Err(VtemError::Transport(format!(
                "invalid response length: {pdu_length} bytes"
            )));
        }
        Ok(pdu_length)
    }

    /// Send a request PDU and return the response PDU.
    ///
    /// Any response that cannot be matched to the request closes the
    /// connection. Exception responses are complete frames and leave it open.
    fn send_request(&mut self, pdu: &[u8], function: FunctionCode) -> VtemResult<Vec<u8>> {
        if self.connection.is_none() {
            return Err(VtemError::Transport(
                "not connected to Modbus server".into(),
            ));
        }

        let transaction_id = self.next_transaction_id();
        let header = MbapHeader::new(transaction_id, pdu.len() as u16, self.config.unit_id);

        let mut request = Vec::with_capacity(MbapHeader::SIZE + pdu.len());
        request.extend_from_slice(&header.to_bytes());
        request.extend_from_slice(pdu);

        trace!(transaction_id, pdu_len = pdu.len(), "Sending Modbus request");

        let sent = match self.connection.as_mut() {
            Some(stream) => stream.write_all(&request),
            None => return Err(VtemError::Transport("connection lost".into())),
        };
        if let Err(e) = sent {
            return Err(self.fail_stream("send", &e));
        }

        let received = match self.connection.as_mut() {
            Some(stream) => stream.read_exact(&mut self.rx_buffer[..MbapHeader::SIZE]),
            None => return Err(VtemError::Transport("connection lost".into())),
        };
        if let Err(e) = received {
            return Err(self.fail_stream("receive header", &e));
        }

        let checked = MbapHeader::from_bytes(&self.rx_buffer[..MbapHeader::SIZE])
            .and_then(|h| self.check_header(&h, transaction_id));
        let pdu_length = match checked {
            Ok(length) => length,
            Err(e) => return Err(self.invalidate(e)),
        };

        let frame_end = MbapHeader::SIZE + pdu_length;
        let received = match self.connection.as_mut() {
            Some(stream) => stream.read_exact(&mut self.rx_buffer[MbapHeader::SIZE..frame_end]),
            None => return Err(VtemError::Transport("connection lost".into())),
        };
        if let Err(e) = received {
            return Err(self.fail_stream("receive PDU", &e));
        }
        let response = self.rx_buffer[MbapHeader::SIZE..frame_end].to_vec();

        // Exception responses set the high bit of the function code
        if response[0] == function as u8 | 0x80 {
            let exception = response
                .get(1)
                .map(|&b| {
                    ExceptionCode::from_byte(b)
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| format!("Unknown (0x{b:02X})"))
                })
                .unwrap_or_else(|| "Unknown".into());
            return Err(VtemError::Transport(format!("Modbus exception: {exception}")));
        }

        if response[0] != function as u8 {
            return Err(self.invalidate(VtemError::Transport(format!(
                "function code mismatch: expected 0x{:02X}, got 0x{:02X}",
                function as u8, response[0]
            ))));
        }

        trace!(transaction_id, pdu_len = pdu_length, "Received Modbus response");

        Ok(response)
    }

    /// Validate the address/quantity (or address/value) echo of a write.
    fn check_echo(response: &[u8], address: u16, second: u16) -> VtemResult<()> {
        if response.len() < 5 {
            return Err(VtemError::Transport("response too short".into()));
        }
        let resp_address = u16::from_be_bytes([response[1], response[2]]);
        let resp_second = u16::from_be_bytes([response[3], response[4]]);
        if resp_address != address || resp_second != second {
            return Err(VtemError::Transport(format!(
                "write echo mismatch: addr={resp_address}/{address}, value={resp_second}/{second}"
            )));
        }
        Ok(())
    }
}

impl Default for ModbusTcpTransport {
    fn default() -> Self {
        Self::new(ModbusTcpConfig::default())
    }
}

impl RegisterTransport for ModbusTcpTransport {
    fn connect(&mut self) -> VtemResult<()> {
        info!(addr = %self.config.server_addr, "Connecting to Modbus TCP server");

        let mut last_error = None;
        for addr in self.resolve()? {
            match self.open_stream(&addr) {
                Ok(stream) => {
                    self.connection = Some(stream);
                    info!(%addr, "Connected to Modbus TCP server");
                    return Ok(());
                }
                Err(e) => {
                    debug!(%addr, error = %e, "Connection attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map_or_else(|| "no address".to_string(), |e| e.to_string());
        Err(VtemError::Transport(format!(
            "connection to {} failed: {reason}",
            self.config.server_addr
        )))
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            info!(addr = %self.config.server_addr, "Closed Modbus TCP connection");
        }
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn read_registers(&mut self, address: u16, out: &mut [u16]) -> VtemResult<()> {
        if out.is_empty() || out.len() > MAX_READ_REGISTERS {
            return Err(VtemError::Transport(format!(
                "cannot read {} registers (1..={MAX_READ_REGISTERS})",
                out.len()
            )));
        }
        let quantity = out.len() as u16;

        let mut pdu = Vec::with_capacity(5);
        pdu.push(FunctionCode::ReadHoldingRegisters as u8);
        pdu.extend_from_slice(&address.to_be_bytes());
        pdu.extend_from_slice(&quantity.to_be_bytes());

        let response = self.send_request(&pdu, FunctionCode::ReadHoldingRegisters)?;

        let byte_count = response.get(1).copied().map(usize::from).unwrap_or(0);
        let expected_bytes = out.len() * 2;
        if byte_count != expected_bytes || response.len() < 2 + byte_count {
            return Err(self.invalidate(VtemError::Transport(format!(
                "read at {address}: expected {expected_bytes} bytes, got {byte_count}"
            ))));
        }

        for (i, register) in out.iter_mut().enumerate() {
            let offset = 2 + i * 2;
            *register = u16::from_be_bytes([response[offset], response[offset + 1]]);
        }
        Ok(())
    }

    fn write_register(&mut self, address: u16, value: u16) -> VtemResult<()> {
        let mut pdu = Vec::with_capacity(5);
        pdu.push(FunctionCode::WriteSingleRegister as u8);
        pdu.extend_from_slice(&address.to_be_bytes());
        pdu.extend_from_slice(&value.to_be_bytes());

        let response = self.send_request(&pdu, FunctionCode::WriteSingleRegister)?;
        Self::check_echo(&response, address, value).map_err(|e| self.invalidate(e))
    }

    /// Write multiple registers (function 0x10).
    ///
    /// A single value goes out as function 0x06 for device compatibility.
    fn write_registers(&mut self, address: u16, values: &[u16]) -> VtemResult<()> {
        if values.is_empty() || values.len() > MAX_WRITE_REGISTERS {
            return Err(VtemError::Transport(format!(
                "cannot write {} registers (1..={MAX_WRITE_REGISTERS})",
                values.len()
            )));
        }
        if let [value] = values {
            return self.write_register(address, *value);
        }

        let quantity = values.len() as u16;
        let byte_count = values.len() * 2;
        let mut pdu = Vec::with_capacity(6 + byte_count);
        pdu.push(FunctionCode::WriteMultipleRegisters as u8);
        pdu.extend_from_slice(&address.to_be_bytes());
        pdu.extend_from_slice(&quantity.to_be_bytes());
        pdu.push(byte_count as u8);
        for &value in values {
            pdu.extend_from_slice(&value.to_be_bytes());
        }

        let response = self.send_request(&pdu, FunctionCode::WriteMultipleRegisters)?;
        Self::check_echo(&response, address, quantity).map_err(|e| self.invalidate(e))
    }
}
