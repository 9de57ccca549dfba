//! Scripted byte sources and a recording status pin.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use otaflash_update::platform::StatusPin;
use otaflash_update::stream::ByteSource;

/// One step of a [`ScriptedSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Bytes available to the next reads
    Data(Vec<u8>),
    /// One read that returns nothing
    Stall,
}

/// Byte source replaying a fixed script, stalling once it runs out
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    reads: usize,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            reads: 0,
        }
    }

    /// Deliver `data` in chunks of at most `chunk` bytes
    pub fn chunked(data: &[u8], chunk: usize) -> Self {
        Self::new(data.chunks(chunk.max(1)).map(|c| Step::Data(c.to_vec())))
    }

    /// Number of read calls served
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Bytes not yet delivered
    pub fn pending(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Data(data) => data.len(),
                Step::Stall => 0,
            })
            .sum()
    }
}

impl ByteSource for ScriptedSource {
    fn peek(&mut self) -> Option<u8> {
        self.steps.iter().find_map(|step| match step {
            Step::Data(data) => data.first().copied(),
            Step::Stall => None,
        })
    }

    fn read_up_to(&mut self, buf: &mut [u8]) -> usize {
        self.reads += 1;
        match self.steps.pop_front() {
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.steps.push_front(Step::Data(data.split_off(n)));
                }
                n
            }
            Some(Step::Stall) | None => 0,
        }
    }
}

/// Source whose first byte can be peeked but which never delivers data
#[derive(Debug, Default)]
pub struct StalledSource {
    first: Option<u8>,
    reads: usize,
}

impl StalledSource {
    pub fn new(first: Option<u8>) -> Self {
        Self { first, reads: 0 }
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl ByteSource for StalledSource {
    fn peek(&mut self) -> Option<u8> {
        self.first
    }

    fn read_up_to(&mut self, _buf: &mut [u8]) -> usize {
        self.reads += 1;
        0
    }
}

/// Change seen by a [`RecordingPin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEvent {
    Output(i32),
    Level(i32, bool),
}

/// Status pin that records every call; clones share one log
#[derive(Debug, Clone, Default)]
pub struct RecordingPin {
    events: Arc<Mutex<Vec<PinEvent>>>,
}

impl RecordingPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Last level driven, if any
    pub fn level(&self) -> Option<bool> {
        self.events().iter().rev().find_map(|event| match event {
            PinEvent::Level(_, high) => Some(*high),
            PinEvent::Output(_) => None,
        })
    }

    fn push(&self, event: PinEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl StatusPin for RecordingPin {
    fn configure_output(&mut self, pin: i32) {
        self.push(PinEvent::Output(pin));
    }

    fn set_level(&mut self, pin: i32, high: bool) {
        self.push(PinEvent::Level(pin, high));
    }
}
