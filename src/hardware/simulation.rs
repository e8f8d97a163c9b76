//! Simulation hardware for unit testing the protocol engine without an adapter
//!
//! [SimulatedElm] behaves like an ELM327 with echo disabled: every command written
//! to it is looked up in a response map, and the matching response is queued for
//! reading followed by the `\r\r>` the real adapter sends.

use std::{
    collections::{HashMap, VecDeque},
    io::ErrorKind,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use crate::{
    channel::{Transport, COMMAND_TERMINATOR},
    timing::{CancelToken, Sleeper},
    DiagError, DiagServerResult,
};

use super::TransportOpener;

/// Response of an ELM327 to a command it does not understand
pub const UNKNOWN_COMMAND_RESPONSE: &str = "?";

#[derive(Debug, Default)]
struct SimState {
    responses: HashMap<String, VecDeque<String>>,
    rx_queue: VecDeque<u8>,
    line: Vec<u8>,
    written: Vec<u8>,
    commands: Vec<String>,
    fail_writes: bool,
    fail_open: bool,
    open_count: u32,
}

/// Simulated ELM327 adapter. Clones share the same state, so a test can keep
/// a handle to inspect traffic after handing a clone to a connection manager
#[derive(Debug, Clone, Default)]
pub struct SimulatedElm {
    state: Arc<RwLock<SimState>>,
}

impl SimulatedElm {
    /// Creates a simulated adapter with no responses configured
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a simulated adapter which answers the startup handshake successfully
    pub fn with_handshake() -> Self {
        let sim = Self::new();
        sim.add_response("ATZ", "ELM327 v1.5");
        sim.add_response("ATE0", "OK");
        sim.add_response("ATSP0", "OK");
        sim.add_response("0100", "41 00 BE 1F A8 13");
        sim
    }

    /// Queues a response for a command. If several responses are queued for the same command,
    /// they are returned in order, and the last one is repeated for every subsequent request
    pub fn add_response(&self, req: &str, resp: &str) {
        self.state
            .write()
            .unwrap()
            .responses
            .entry(req.to_string())
            .or_default()
            .push_back(resp.to_string());
    }

    /// Removes all configured responses for a command
    pub fn clear_response(&self, req: &str) {
        self.state.write().unwrap().responses.remove(req);
    }

    /// Pushes raw bytes into the receive queue, as if the adapter sent them unprompted
    pub fn push_raw(&self, bytes: &[u8]) {
        self.state.write().unwrap().rx_queue.extend(bytes);
    }

    /// Makes every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.write().unwrap().fail_writes = fail;
    }

    /// Makes every subsequent open fail
    pub fn set_fail_open(&self, fail: bool) {
        self.state.write().unwrap().fail_open = fail;
    }

    /// Every byte written to the adapter so far
    pub fn written(&self) -> Vec<u8> {
        self.state.read().unwrap().written.clone()
    }

    /// Every complete command written to the adapter so far, without terminators
    pub fn sent_commands(&self) -> Vec<String> {
        self.state.read().unwrap().commands.clone()
    }

    /// Number of bytes waiting to be read
    pub fn pending_rx(&self) -> usize {
        self.state.read().unwrap().rx_queue.len()
    }

    /// Number of times the adapter was opened
    pub fn open_count(&self) -> u32 {
        self.state.read().unwrap().open_count
    }
}

impl SimState {
    fn on_command(&mut self, command: String) {
        let resp = match self.responses.get_mut(&command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
        .unwrap_or_else(|| UNKNOWN_COMMAND_RESPONSE.to_string());
        self.rx_queue.extend(resp.as_bytes());
        self.rx_queue.extend(b"\r\r>");
        self.commands.push(command);
    }
}

impl Transport for SimulatedElm {
    fn write_bytes(&mut self, buffer: &[u8]) -> std::io::Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_writes {
            return Err(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "Simulated adapter disconnected",
            ));
        }
        state.written.extend_from_slice(buffer);
        state.line.extend_from_slice(buffer);
        if state.line.ends_with(COMMAND_TERMINATOR) {
            let len = state.line.len() - COMMAND_TERMINATOR.len();
            let command = String::from_utf8_lossy(&state.line[..len]).into_owned();
            state.line.clear();
            state.on_command(command);
        }
        Ok(())
    }

    fn read_byte(&mut self) -> std::io::Result<u8> {
        self.state
            .write()
            .unwrap()
            .rx_queue
            .pop_front()
            .ok_or_else(|| std::io::Error::new(ErrorKind::TimedOut, "Simulated read timeout"))
    }

    fn clear_rx_buffer(&mut self) -> std::io::Result<()> {
        self.state.write().unwrap().rx_queue.clear();
        Ok(())
    }

    fn clear_tx_buffer(&mut self) -> std::io::Result<()> {
        self.state.write().unwrap().line.clear();
        Ok(())
    }
}

impl TransportOpener for SimulatedElm {
    fn open(&mut self) -> DiagServerResult<Box<dyn Transport>> {
        let mut state = self.state.write().unwrap();
        if state.fail_open {
            return Err(std::io::Error::new(ErrorKind::NotFound, "Simulated adapter not present").into());
        }
        state.open_count += 1;
        Ok(Box::new(self.clone()))
    }
}

/// [Sleeper] which returns immediately, and records every requested delay
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
    cancel_after: Option<usize>,
}

impl RecordingSleeper {
    /// Creates a new sleeper
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sleeper which triggers `cancel` when asked to sleep for the `n`th time (starting at 1)
    pub fn cancelling_after(n: usize) -> Self {
        Self {
            sleeps: Arc::default(),
            cancel_after: Some(n),
        }
    }

    /// All delays requested so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> DiagServerResult<()> {
        let mut sleeps = self.sleeps.lock().unwrap();
        sleeps.push(duration);
        if self.cancel_after.is_some_and(|n| sleeps.len() >= n) {
            cancel.cancel();
        }
        if cancel.is_cancelled() {
            return Err(DiagError::Cancelled);
        }
        Ok(())
    }
}
