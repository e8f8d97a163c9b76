//! Module for the command/response channel to an ELM327 style adapter
//!
//! * [Transport] - Raw duplex byte stream (Serial port, simulation, ...)
//! * [CommandChannel] - Line based command/response framing on top of a [Transport]

use std::{fmt::Debug, sync::Arc, time::Duration};

use crate::{
    timing::{CancelToken, Sleeper},
    DiagServerResult,
};

/// Terminator appended to every command
pub const COMMAND_TERMINATOR: &[u8] = b"\r\n";
/// Byte which terminates a response line
pub const RESPONSE_TERMINATOR: u8 = b'\r';
/// Prompt emitted by the adapter when it is ready for the next command
pub const PROMPT: u8 = b'>';

/// Byte oriented duplex stream to an adapter.
///
/// Reads are expected to block for at most the transport's configured timeout,
/// after which an [std::io::ErrorKind::TimedOut] error should be returned.
pub trait Transport: Send + Debug {
    /// Writes the entire buffer to the stream
    fn write_bytes(&mut self, buffer: &[u8]) -> std::io::Result<()>;

    /// Reads a single byte from the stream
    fn read_byte(&mut self) -> std::io::Result<u8>;

    /// Discards any bytes received but not yet read
    fn clear_rx_buffer(&mut self) -> std::io::Result<()>;

    /// Discards any bytes written but not yet transmitted
    fn clear_tx_buffer(&mut self) -> std::io::Result<()>;
}

/// Bytes of a single response line, without the terminator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawFrame(Vec<u8>);

impl RawFrame {
    /// Raw bytes of the frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Converts the frame to text. Adapters only ever send ASCII, so any
    /// invalid bytes are replaced rather than rejected
    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

/// Line based command channel.
///
/// Only one command can ever be outstanding on the channel, as the adapter has no
/// notion of request IDs. This is enforced by every operation taking `&mut self`.
#[derive(Debug)]
pub struct CommandChannel {
    transport: Box<dyn Transport>,
    read_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelToken,
}

impl CommandChannel {
    /// Creates a new command channel over a transport
    ///
    /// ## Parameters
    /// * transport - Opened transport. The channel takes ownership, and the transport is closed when the channel is dropped
    /// * read_delay - Delay before each response is read, to give the adapter time to respond
    /// * sleeper - Used to perform the read delay
    /// * cancel - Token which aborts a blocking read
    pub fn new(
        transport: Box<dyn Transport>,
        read_delay: Duration,
        sleeper: Arc<dyn Sleeper>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            transport,
            read_delay,
            sleeper,
            cancel,
        }
    }

    /// Sends a command to the adapter. Both IO buffers are cleared first,
    /// so nothing left over from a previous exchange can leak into the next response.
    /// Nothing is written once the cancel token has been triggered
    pub fn send(&mut self, command: &[u8]) -> DiagServerResult<()> {
        self.cancel.check()?;
        self.transport.clear_tx_buffer()?;
        self.transport.clear_rx_buffer()?;
        self.transport.write_bytes(command)?;
        self.transport.write_bytes(COMMAND_TERMINATOR)?;
        log::debug!("Sent command {:?}", String::from_utf8_lossy(command));
        Ok(())
    }

    /// Reads a single response line from the adapter.
    ///
    /// Leading carriage returns, and a `>` prompt received before any other content are discarded.
    /// Reading stops at the first carriage return after some content has been received
    pub fn read_response(&mut self) -> DiagServerResult<RawFrame> {
        self.sleeper.sleep(self.read_delay, &self.cancel)?;
        let mut buf = Vec::new();
        loop {
            self.cancel.check()?;
            let byte = self.transport.read_byte()?;
            match byte {
                RESPONSE_TERMINATOR if !buf.is_empty() => break,
                RESPONSE_TERMINATOR => {}
                PROMPT if buf.is_empty() => {}
                _ => buf.push(byte),
            }
        }
        log::debug!("Read response {:?}", String::from_utf8_lossy(&buf));
        Ok(RawFrame(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hardware::simulation::{RecordingSleeper, SimulatedElm},
        DiagError,
    };

    fn channel(sim: &SimulatedElm, sleeper: RecordingSleeper, cancel: CancelToken) -> CommandChannel {
        CommandChannel::new(
            Box::new(sim.clone()),
            Duration::from_millis(100),
            Arc::new(sleeper),
            cancel,
        )
    }

    #[test]
    fn send_appends_terminator_and_clears_rx() {
        let sim = SimulatedElm::new();
        sim.push_raw(b"stale data\r>");
        let mut ch = channel(&sim, RecordingSleeper::new(), CancelToken::new());
        ch.send(b"0100").unwrap();
        assert_eq!(sim.written(), b"0100\r\n".to_vec());
        assert_eq!(sim.sent_commands(), vec!["0100".to_string()]);
        // Stale bytes are gone, only the reply to 0100 is left
        assert_eq!(ch.read_response().unwrap().into_string(), "?");
        assert_eq!(sim.pending_rx(), 2);
    }

    #[test]
    fn read_skips_prompt_and_leading_cr() {
        let sim = SimulatedElm::new();
        sim.push_raw(b">\r\r41 00 BE 1F A8 13\r\r>");
        let sleeper = RecordingSleeper::new();
        let mut ch = channel(&sim, sleeper.clone(), CancelToken::new());
        let frame = ch.read_response().unwrap();
        assert_eq!(frame.into_string(), "41 00 BE 1F A8 13");
        assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn prompt_inside_content_is_kept() {
        let sim = SimulatedElm::new();
        sim.push_raw(b"A>B\r");
        let mut ch = channel(&sim, RecordingSleeper::new(), CancelToken::new());
        assert_eq!(ch.read_response().unwrap().as_bytes(), b"A>B");
    }

    #[test]
    fn read_times_out_without_terminator() {
        let sim = SimulatedElm::new();
        sim.push_raw(b"41 00");
        let mut ch = channel(&sim, RecordingSleeper::new(), CancelToken::new());
        assert!(matches!(ch.read_response(), Err(DiagError::Transport(_))));
    }

    #[test]
    fn read_is_cancellable() {
        let sim = SimulatedElm::new();
        sim.push_raw(b"41 00\r");
        let cancel = CancelToken::new();
        let mut ch = channel(&sim, RecordingSleeper::new(), cancel.clone());
        cancel.cancel();
        assert!(matches!(ch.read_response(), Err(DiagError::Cancelled)));
    }

    #[test]
    fn send_is_cancellable() {
        let sim = SimulatedElm::new();
        let cancel = CancelToken::new();
        let mut ch = channel(&sim, RecordingSleeper::new(), cancel.clone());
        cancel.cancel();
        assert!(matches!(ch.send(b"04"), Err(DiagError::Cancelled)));
        assert!(sim.written().is_empty());
        assert!(sim.sent_commands().is_empty());
    }

    #[test]
    fn write_failure_is_transport_error() {
        let sim = SimulatedElm::new();
        sim.set_fail_writes(true);
        let mut ch = channel(&sim, RecordingSleeper::new(), CancelToken::new());
        assert!(matches!(ch.send(b"ATZ"), Err(DiagError::Transport(_))));
    }
}
