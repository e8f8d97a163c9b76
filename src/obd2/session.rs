//! Diagnostic session over an ELM327 style adapter

use crate::{
    connection::{ConnectionManager, ConnectionOptions, ConnectionState},
    dtc::{
        decode_monitor_status, decode_trouble_code_block, DtcOrigin, MonitorStatusReport,
        MonitorTest, TroubleCodeRecord, DTCS_PER_BLOCK,
    },
    helpers::{decode_hex_bytes, decode_pid_support},
    timing::CancelToken,
    DiagError, DiagServerResult, ServerEventHandler,
};

use super::{
    command, interpret, interpret_with_echo, NamedReading, NormalizedResponse, Sensor,
    SensorReading, SERVICE_ECHO_LEN,
};

/// Number of PIDs whose support is reported by the `0100` probe (0x01-0x20)
const PROBE_PID_RANGE: usize = 32;

/// OBD2 diagnostic session.
///
/// Every request is a blocking send then read cycle, and as the adapter cannot tell
/// responses apart, every function takes `&mut self` so only one request can ever be
/// in flight. To share a session between threads, wrap it in a [std::sync::Mutex].
#[derive(Debug)]
pub struct DiagnosticSession<H: ServerEventHandler> {
    connection: ConnectionManager<H>,
}

impl<H: ServerEventHandler> DiagnosticSession<H> {
    /// Creates a new session using an existing connection manager.
    /// The manager does not need to be connected yet
    pub fn new(connection: ConnectionManager<H>) -> Self {
        Self { connection }
    }

    /// Creates a new, disconnected session over a serial port
    #[cfg(feature = "serial")]
    pub fn new_over_serial(
        settings: crate::hardware::serial::SerialSettings,
        options: ConnectionOptions,
        handler: H,
    ) -> Self {
        Self::new(ConnectionManager::new(settings, options, handler))
    }

    /// Opens the adapter and runs the startup handshake. See [ConnectionManager::connect]
    pub fn connect(&mut self) -> DiagServerResult<()> {
        self.connection.connect()
    }

    /// Resets and closes the adapter. See [ConnectionManager::close]
    pub fn close(&mut self) {
        self.connection.close()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Identification string of the adapter
    pub fn device_id(&self) -> &str {
        self.connection.device_id()
    }

    /// Token which aborts the in-flight operation when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.connection.cancel_token()
    }

    /// Underlying connection manager
    pub fn connection(&self) -> &ConnectionManager<H> {
        &self.connection
    }

    /// Underlying connection manager (Mutable)
    pub fn connection_mut(&mut self) -> &mut ConnectionManager<H> {
        &mut self.connection
    }

    /// Reads the readiness monitor status (Service 01 PID 01), which also
    /// contains the number of stored DTCs and the MIL state
    pub fn read_monitor_status(&mut self) -> DiagServerResult<MonitorStatusReport> {
        let raw = self.connection.transact(command::MONITOR_STATUS)?;
        match interpret(&raw)? {
            NormalizedResponse::Payload(p) => decode_monitor_status(&p),
            NormalizedResponse::NoData => Err(DiagError::EmptyResponse),
        }
    }

    /// Reads the monitor status, and returns the MIL state (`On`/`Off`) together with
    /// every named monitor and its state
    pub fn read_monitor_tests(&mut self) -> DiagServerResult<(&'static str, Vec<MonitorTest>)> {
        let status = self.read_monitor_status()?;
        Ok((status.mil_text(), status.tests()))
    }

    /// Reads all stored DTCs (Service 03), followed by the DTCs of the freeze frame (Service 07).
    ///
    /// The number of stored DTCs is read from the monitor status first, and one service 03
    /// request is sent per 3 DTCs. Stored DTCs are tagged [DtcOrigin::Active], freeze frame DTCs
    /// are tagged [DtcOrigin::Passive]. DTCs are returned in the order the adapter reported them
    pub fn read_trouble_codes(&mut self) -> DiagServerResult<Vec<TroubleCodeRecord>> {
        let status = self.read_monitor_status()?;
        log::debug!(
            "Number of stored DTCs: {}, MIL: {}",
            status.code_count,
            status.mil_text()
        );
        let mut records = Vec::with_capacity(status.code_count as usize);
        for _ in 0..(status.code_count as usize).div_ceil(DTCS_PER_BLOCK) {
            let raw = self.connection.transact(command::READ_STORED_DTC)?;
            if !self.push_block(&raw, DtcOrigin::Active, &mut records)? {
                log::warn!("Adapter returned no data for stored DTCs");
                break;
            }
        }

        let raw = self.connection.transact(command::READ_FREEZE_DTC)?;
        if raw.starts_with(command::FREEZE_NO_DATA) {
            log::debug!("No freeze frame stored");
        } else {
            self.push_block(&raw, DtcOrigin::Passive, &mut records)?;
        }
        Ok(records)
    }

    /// Clears all DTCs and freeze frame data (Service 04). Returns the adapter's raw acknowledgement
    pub fn clear_trouble_codes(&mut self) -> DiagServerResult<String> {
        self.connection.transact(command::CLEAR_DTC)
    }

    /// Reads and decodes a sensor
    pub fn read_sensor<S: Sensor>(&mut self, sensor: &S) -> DiagServerResult<SensorReading<S::Value>> {
        let raw = self.connection.transact(sensor.command())?;
        match interpret(&raw)? {
            NormalizedResponse::Payload(p) => Ok(SensorReading::Value(sensor.decode(&p)?)),
            NormalizedResponse::NoData => Ok(SensorReading::NoData),
        }
    }

    /// Reads a sensor, and returns its reading together with its name and unit
    pub fn sensor<S: Sensor>(&mut self, sensor: &S) -> DiagServerResult<NamedReading<S::Value>> {
        let reading = self.read_sensor(sensor)?;
        Ok(NamedReading {
            name: sensor.name().to_string(),
            reading,
            unit: sensor.unit().to_string(),
        })
    }

    /// Returns the service 01 PIDs (0x01-0x20) the vehicle reported as supported
    /// during the handshake probe
    pub fn supported_pids(&self) -> DiagServerResult<Vec<u8>> {
        let probe = self
            .connection
            .probe_response()
            .ok_or(DiagError::NotConnected(self.connection.state()))?;
        let payload = match interpret(probe)? {
            NormalizedResponse::Payload(p) => p,
            NormalizedResponse::NoData => return Ok(Vec::new()),
        };
        Ok(decode_pid_support(&decode_hex_bytes(&payload)?)
            .into_iter()
            .take(PROBE_PID_RANGE)
            .enumerate()
            .filter(|(_, supported)| *supported)
            .map(|(idx, _)| (idx + 1) as u8)
            .collect())
    }

    /// Decodes a service 03/07 response into `records`.
    /// Returns false if the adapter reported no data
    fn push_block(
        &self,
        raw: &str,
        origin: DtcOrigin,
        records: &mut Vec<TroubleCodeRecord>,
    ) -> DiagServerResult<bool> {
        match interpret_with_echo(raw, SERVICE_ECHO_LEN)? {
            NormalizedResponse::Payload(p) => {
                let codes = decode_trouble_code_block(&p)?;
                log::debug!("{origin} DTCs: {codes:?}");
                records.extend(codes.into_iter().map(|code| TroubleCodeRecord { code, origin }));
                Ok(true)
            }
            NormalizedResponse::NoData => Ok(false),
        }
    }
}
