//! Connection management for ELM327 style adapters
//!
//! The [ConnectionManager] owns the transport for the lifetime of a connection, and
//! runs the startup handshake:
//!
//! 1. `ATZ` - Reset the adapter, and record its identification string
//! 2. `ATE0` - Disable echo
//! 3. `ATSP0` - Select the vehicle protocol automatically
//! 4. `0100` - Probe for supported PIDs. This forces the adapter to initialize the vehicle bus
//!
//! Should the probe return `BUS ERROR`, the handshake waits [ConnectionOptions::retry_delay_ms]
//! and starts again from step 1, up to [ConnectionOptions::reconnect_attempts] attempts in total.

use std::{sync::Arc, time::Duration};

use crate::{
    channel::CommandChannel,
    hardware::TransportOpener,
    obd2::command,
    timing::{CancelToken, Sleeper, ThreadSleeper},
    DiagError, DiagServerResult, ServerEvent, ServerEventHandler,
};

/// Device ID reported when the adapter has not identified itself
pub const UNKNOWN_DEVICE: &str = "Unknown";

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// State of the connection to the adapter
pub enum ConnectionState {
    /// No transport is open
    Disconnected,
    /// Handshake is in progress
    Connecting,
    /// Handshake completed, commands can be sent
    Connected,
    /// Handshake or transport failed. The transport has been released
    Failed,
}

/// Connection options
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionOptions {
    /// Maximum number of handshake attempts before giving up. A value of 0 is treated as 1
    pub reconnect_attempts: u32,
    /// Delay between handshake attempts
    pub retry_delay_ms: u64,
    /// Delay before reading each response, to give the adapter time to respond
    pub read_delay_ms: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            retry_delay_ms: 5000,
            read_delay_ms: 100,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum HandshakeStep {
    Reset,
    DisableEcho,
    AutoProtocol,
    Probe,
    Backoff,
}

/// Owns the transport to an adapter, and the state of the connection
#[derive(Debug)]
pub struct ConnectionManager<H: ServerEventHandler> {
    opener: Box<dyn TransportOpener>,
    options: ConnectionOptions,
    handler: H,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelToken,
    channel: Option<CommandChannel>,
    state: ConnectionState,
    device_id: String,
    probe_response: Option<String>,
}

impl<H: ServerEventHandler> ConnectionManager<H> {
    /// Creates a new, disconnected, connection manager
    ///
    /// ## Parameters
    /// * opener - Opens the transport each time [ConnectionManager::connect] is called
    /// * options - Connection options
    /// * handler - Receives trace events for every command and response
    pub fn new<O: TransportOpener + 'static>(opener: O, options: ConnectionOptions, handler: H) -> Self {
        Self {
            opener: Box::new(opener),
            options,
            handler,
            sleeper: Arc::new(ThreadSleeper),
            cancel: CancelToken::new(),
            channel: None,
            state: ConnectionState::Disconnected,
            device_id: UNKNOWN_DEVICE.to_string(),
            probe_response: None,
        }
    }

    /// Replaces the [Sleeper] used for the handshake backoff and read delays
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Current state of the connection
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Identification string the adapter returned when it was reset
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Raw response to the `0100` probe from the last successful handshake
    pub fn probe_response(&self) -> Option<&str> {
        self.probe_response.as_deref()
    }

    /// Token which aborts the handshake or a blocking read when cancelled.
    /// Once cancelled, it must be reset before the next operation
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Connection options
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Event handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Event handler (Mutable)
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Opens the transport and runs the startup handshake.
    ///
    /// Calling this whilst already connected does nothing. Any error leaves the
    /// connection in [ConnectionState::Failed] with the transport released
    pub fn connect(&mut self) -> DiagServerResult<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        self.set_state(ConnectionState::Connecting);
        let res = self.open_channel().and_then(|_| self.run_handshake());
        match res {
            Ok(()) => {
                log::info!("Adapter '{}' connected", self.device_id);
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Resets the adapter (Best effort) and releases the transport.
    /// Always leaves the connection in [ConnectionState::Disconnected]
    pub fn close(&mut self) {
        if self.state == ConnectionState::Connected {
            if let Some(channel) = self.channel.as_mut() {
                match channel.send(command::RESET.as_bytes()) {
                    Ok(()) => self
                        .handler
                        .on_event(ServerEvent::Request(command::RESET.to_string())),
                    Err(e) => log::warn!("Could not reset adapter on close: {e}"),
                }
            }
        }
        self.channel = None;
        self.device_id = UNKNOWN_DEVICE.to_string();
        self.probe_response = None;
        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Sends a command to a connected adapter and reads the first line of its response.
    ///
    /// A transport error moves the connection to [ConnectionState::Failed]. Other errors
    /// leave the connection state untouched
    pub fn transact(&mut self, cmd: &str) -> DiagServerResult<String> {
        if self.state != ConnectionState::Connected {
            return Err(DiagError::NotConnected(self.state));
        }
        match self.exchange(cmd) {
            Err(e @ DiagError::Transport(_)) => {
                self.fail(&e);
                Err(e)
            }
            res => res,
        }
    }

    fn open_channel(&mut self) -> DiagServerResult<()> {
        let transport = self.opener.open()?;
        log::debug!("Transport opened: {transport:?}");
        self.channel = Some(CommandChannel::new(
            transport,
            Duration::from_millis(self.options.read_delay_ms),
            self.sleeper.clone(),
            self.cancel.clone(),
        ));
        Ok(())
    }

    fn run_handshake(&mut self) -> DiagServerResult<()> {
        let max_attempts = self.options.reconnect_attempts.max(1);
        let mut attempt = 0;
        let mut step = HandshakeStep::Reset;
        loop {
            step = match step {
                HandshakeStep::Reset => {
                    let id = self.exchange(command::RESET)?;
                    self.record_device_id(id);
                    HandshakeStep::DisableEcho
                }
                HandshakeStep::DisableEcho => {
                    self.exchange(command::ECHO_OFF)?;
                    HandshakeStep::AutoProtocol
                }
                HandshakeStep::AutoProtocol => {
                    self.exchange(command::AUTO_PROTOCOL)?;
                    HandshakeStep::Probe
                }
                HandshakeStep::Probe => {
                    let mut ready = self.exchange(command::PROBE)?;
                    while ready.trim() == command::SEARCHING {
                        ready = self.read_line()?;
                    }
                    if ready != command::BUS_ERROR {
                        self.probe_response = Some(ready);
                        return Ok(());
                    }
                    attempt += 1;
                    log::warn!("Handshake attempt {attempt}/{max_attempts} failed: {ready}");
                    self.handler.on_event(ServerEvent::HandshakeRetry {
                        attempt,
                        response: ready,
                    });
                    if attempt >= max_attempts {
                        return Err(DiagError::BusInitialization { attempts: attempt });
                    }
                    HandshakeStep::Backoff
                }
                HandshakeStep::Backoff => {
                    self.sleeper.sleep(
                        Duration::from_millis(self.options.retry_delay_ms),
                        &self.cancel,
                    )?;
                    HandshakeStep::Reset
                }
            };
        }
    }

    fn record_device_id(&mut self, id: String) {
        let id = id.trim();
        if id.is_empty() {
            log::warn!("Adapter did not identify itself");
            return;
        }
        self.device_id = id.to_string();
        self.handler
            .on_event(ServerEvent::DeviceIdentified(self.device_id.clone()));
    }

    fn exchange(&mut self, cmd: &str) -> DiagServerResult<String> {
        let channel = self
            .channel
            .as_mut()
            .ok_or(DiagError::NotConnected(self.state))?;
        channel.send(cmd.as_bytes())?;
        self.handler.on_event(ServerEvent::Request(cmd.to_string()));
        self.read_line()
    }

    /// Reads the next response line without sending anything
    fn read_line(&mut self) -> DiagServerResult<String> {
        let channel = self
            .channel
            .as_mut()
            .ok_or(DiagError::NotConnected(self.state))?;
        let resp = channel.read_response()?.into_string();
        self.handler.on_event(ServerEvent::Response(resp.clone()));
        Ok(resp)
    }

    fn fail(&mut self, e: &DiagError) {
        log::error!("Connection failed: {e}");
        self.channel = None;
        self.probe_response = None;
        self.handler.on_event(ServerEvent::CriticalError {
            desc: e.to_string(),
        });
        self.set_state(ConnectionState::Failed);
    }

    fn set_state(&mut self, new: ConnectionState) {
        let old = self.state;
        self.state = new;
        self.handler.on_event(ServerEvent::StateChange { old, new });
    }
}

impl<H: ServerEventHandler> Drop for ConnectionManager<H> {
    fn drop(&mut self) {
        self.close()
    }
}
