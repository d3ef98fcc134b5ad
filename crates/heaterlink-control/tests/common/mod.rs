#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use heaterlink_frame::{DutyCommand, FRAME_LEN};

pub const ZERO_FRAME: [u8; FRAME_LEN] = [0x03, 0, 0, 0, 0, 0, 0, 0xFF];

/// One operation observed on the write half of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Write(Vec<u8>),
    /// A write the link refused.
    Failed(Vec<u8>),
    Flush,
    Close,
    Note(&'static str),
}

/// Shared log of link operations.
#[derive(Clone, Default)]
pub struct Recorder {
    ops: Arc<Mutex<Vec<Op>>>,
}

impl Recorder {
    /// A write half that accepts everything.
    pub fn link(&self) -> RecordingLink {
        RecordingLink {
            ops: Arc::clone(&self.ops),
            accept: usize::MAX,
        }
    }

    /// A write half that fails after `accept` successful writes.
    pub fn failing_link(&self, accept: usize) -> RecordingLink {
        RecordingLink {
            ops: Arc::clone(&self.ops),
            accept,
        }
    }

    pub fn note(&self, note: &'static str) {
        self.ops.lock().unwrap().push(Op::Note(note));
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    /// Frames the link accepted, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Write(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, wanted: &Op) -> Option<usize> {
        self.ops().iter().position(|op| op == wanted)
    }

    pub fn count(&self, wanted: &Op) -> usize {
        self.ops().iter().filter(|op| *op == wanted).count()
    }
}

pub struct RecordingLink {
    ops: Arc<Mutex<Vec<Op>>>,
    accept: usize,
}

impl Write for RecordingLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut ops = self.ops.lock().unwrap();
        if self.accept == 0 {
            ops.push(Op::Failed(buf.to_vec()));
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.accept = self.accept.saturating_sub(1);
        ops.push(Op::Write(buf.to_vec()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ops.lock().unwrap().push(Op::Flush);
        Ok(())
    }
}

impl Drop for RecordingLink {
    fn drop(&mut self) {
        self.ops.lock().unwrap().push(Op::Close);
    }
}

/// Read half that replays scripted chunks, then idles like a quiet port.
pub struct ScriptedReader {
    chunks: VecDeque<Vec<u8>>,
    eof_when_done: bool,
}

impl ScriptedReader {
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            eof_when_done: false,
        }
    }

    /// Report end of stream once the script runs out.
    pub fn then_eof(mut self) -> Self {
        self.eof_when_done = true;
        self
    }

    pub fn quiet() -> Self {
        Self::new(Vec::new())
    }
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.chunks.pop_front() {
            // An empty chunk is one quiet read timeout.
            Some(chunk) if chunk.is_empty() => {
                std::thread::sleep(Duration::from_millis(5));
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            None if self.eof_when_done => Ok(0),
            None => {
                std::thread::sleep(Duration::from_millis(5));
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
        }
    }
}

pub fn decode_command(bytes: &[u8]) -> DutyCommand {
    let frame = heaterlink_frame::try_decode(bytes).expect("link carries whole frames");
    DutyCommand::from_frame(&frame).expect("only commands are written")
}
