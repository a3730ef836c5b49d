use std::io::{self, BufRead, BufReader};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use serialport::SerialPort;

use super::LoggerError;
use crate::instrument::discovery;
use crate::mfc::MfcPair;
use crate::record::Sample;

/// Result of one attempt to read a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A line with the trailing line break removed
    Line(String),
    /// Nothing arrived before the read timeout
    Idle,
    /// The source has no more data
    Closed,
}

/// Text lines printed by the auxiliary data logger board
pub trait LineSource {
    /// Read the next line
    fn read_line(&mut self) -> Result<LineRead, LoggerError>;
}

/// Line source over any buffered reader
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    /// Wrap a buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> LineSource for LineReader<R> {
    fn read_line(&mut self) -> Result<LineRead, LoggerError> {
        self.buf.clear();
        // Noise on the line is kept (lossily decoded) so validation can reject it
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => Ok(LineRead::Closed),
            Ok(_) => Ok(LineRead::Line(
                String::from_utf8_lossy(&self.buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string(),
            )),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(LineRead::Idle),
            Err(e) => Err(e.into()),
        }
    }
}

/// Serial connection to the Arduino board
pub type SerialLineSource = LineReader<BufReader<Box<dyn SerialPort>>>;

/// Open the Arduino port at `port`
pub fn open_serial(port: &str, baud_rate: u32, timeout: Duration) -> Result<SerialLineSource, LoggerError> {
    let io = serialport::new(port, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(crate::instrument::InstrumentError::from)?;
    Ok(LineReader::new(BufReader::new(io)))
}

/// Find the Arduino by manufacturer string and open it
pub fn find_arduino(needle: &str, baud_rate: u32, timeout: Duration) -> Result<SerialLineSource, LoggerError> {
    let port = discovery::find_arduino_port(needle)?;
    log::info!("Arduino logger found at port {}", port);
    open_serial(&port, baud_rate, timeout)
}

/// Flow readings appended to each logger row, span then dilution, in mln/min
pub trait FlowProbe {
    /// Latest flows, or `None` when no reading is available yet
    fn flows(&mut self) -> Result<Option<[f64; 2]>, LoggerError>;
}

impl FlowProbe for MfcPair {
    fn flows(&mut self) -> Result<Option<[f64; 2]>, LoggerError> {
        let span = self.span.read_flow_mln()?;
        let dilution = self.dilution.read_flow_mln()?;
        Ok(Some([span, dilution]))
    }
}

/// Flow probe fed by sequencer samples
///
/// Used while a run owns the MFCs: the sequencer forwards each sample and the
/// logger reports the most recent one.
pub struct ChannelProbe {
    rx: Receiver<Sample>,
    last: Option<Sample>,
}

impl ChannelProbe {
    /// Probe reading from `rx`
    pub fn new(rx: Receiver<Sample>) -> Self {
        Self { rx, last: None }
    }

    /// Bounded sample channel and the probe on its receiving end
    pub fn channel(capacity: usize) -> (Sender<Sample>, Self) {
        let (tx, rx) = bounded(capacity);
        (tx, Self::new(rx))
    }
}

impl FlowProbe for ChannelProbe {
    fn flows(&mut self) -> Result<Option<[f64; 2]>, LoggerError> {
        if let Some(latest) = self.rx.try_iter().last() {
            self.last = Some(latest);
        }
        Ok(self
            .last
            .map(|s| [s.span_ml_min, s.dilution_l_min * 1000.0]))
    }
}
