//! Bounded history of metric samples
//!
//! - `HistoryBuffer`: fixed-capacity FIFO, oldest sample evicted first
//! - `HistoryStore`: named streams of one sample family, created on first append,
//!   plus the family's combined stream
//! - `StreamKey`: the public name of a stream (`cpu`, `net:<name>`, `volume:combined`...)

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Samples kept per stream unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Seconds since the Unix epoch.
pub type Epoch = i64;

pub fn epoch_now() -> Epoch {
    chrono::Utc::now().timestamp()
}

/// A timestamped sample.
pub trait Sample: Clone {
    fn epoch(&self) -> Epoch;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSample {
    pub epoch: Epoch,
    pub avg_load: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    pub epoch: Epoch,
    pub avg_memory_used: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSample {
    pub epoch: Epoch,
    pub in_avg_bps: u64,
    pub out_avg_bps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSample {
    pub epoch: Epoch,
    pub read_avg_bps: u64,
    pub write_avg_bps: u64,
}

macro_rules! impl_sample {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Sample for $ty {
                fn epoch(&self) -> Epoch {
                    self.epoch
                }
            }

            impl From<$ty> for HistorySample {
                fn from(sample: $ty) -> Self {
                    HistorySample::$variant(sample)
                }
            }
        )*
    };
}

impl_sample! {
    CpuSample => Cpu,
    MemorySample => Memory,
    InterfaceSample => Interface,
    VolumeSample => Volume,
}

/// Any sample, tagged with its family for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistorySample {
    Cpu(CpuSample),
    Memory(MemorySample),
    Interface(InterfaceSample),
    Volume(VolumeSample),
}

impl HistorySample {
    pub fn epoch(&self) -> Epoch {
        match self {
            HistorySample::Cpu(s) => s.epoch,
            HistorySample::Memory(s) => s.epoch,
            HistorySample::Interface(s) => s.epoch,
            HistorySample::Volume(s) => s.epoch,
        }
    }
}

/// Fixed-capacity ring of samples.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<S> {
    samples: VecDeque<S>,
    capacity: usize,
}

impl<S: Sample> HistoryBuffer<S> {
    /// A zero capacity is raised to one so that the latest sample is always kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    /// Append, evicting and returning the oldest sample when full.
    pub fn push(&mut self, sample: S) -> Option<S> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&S> {
        self.samples.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &S> {
        self.samples.iter()
    }

    /// The `window` most recent samples (all when `None`), oldest first.
    pub fn recent(&self, window: Option<usize>) -> Vec<S> {
        let skip = window.map_or(0, |w| self.samples.len().saturating_sub(w));
        self.samples.iter().skip(skip).cloned().collect()
    }
}

/// Per-entity streams of one sample family plus their combined stream.
#[derive(Debug, Clone)]
pub struct HistoryStore<S> {
    capacity: usize,
    streams: HashMap<String, HistoryBuffer<S>>,
    combined: Option<HistoryBuffer<S>>,
}

impl<S: Sample> HistoryStore<S> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            streams: HashMap::new(),
            combined: None,
        }
    }

    /// Append to the stream named `name`, creating it on first use.
    pub fn append(&mut self, name: &str, sample: S) {
        let capacity = self.capacity;
        match self.streams.get_mut(name) {
            Some(buffer) => {
                buffer.push(sample);
            }
            None => {
                let mut buffer = HistoryBuffer::new(capacity);
                buffer.push(sample);
                self.streams.insert(name.to_string(), buffer);
            }
        }
    }

    pub fn append_combined(&mut self, sample: S) {
        let capacity = self.capacity;
        self.combined
            .get_or_insert_with(|| HistoryBuffer::new(capacity))
            .push(sample);
    }

    pub fn stream(&self, name: &str) -> Option<&HistoryBuffer<S>> {
        self.streams.get(name)
    }

    pub fn combined(&self) -> Option<&HistoryBuffer<S>> {
        self.combined.as_ref()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn lookup(&self, name: &StreamName) -> Option<&HistoryBuffer<S>> {
        match name {
            StreamName::Combined => self.combined(),
            StreamName::Entity(entity) => self.stream(entity),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StreamKeyError {
    #[error("unknown stream family '{0}' (expected cpu, memory, net or volume)")]
    UnknownFamily(String),
    #[error("stream '{0}' needs an entity name or 'combined'")]
    MissingName(String),
    #[error("stream '{0}' takes no entity name")]
    UnexpectedName(String),
}

/// Entity part of a `net:` or `volume:` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamName {
    Combined,
    Entity(String),
}

impl StreamName {
    fn parse(raw: &str) -> Self {
        if raw == "combined" {
            StreamName::Combined
        } else {
            StreamName::Entity(raw.to_string())
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamName::Combined => f.write_str("combined"),
            StreamName::Entity(name) => f.write_str(name),
        }
    }
}

/// Public name of a history stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKey {
    Cpu,
    Memory,
    Net(StreamName),
    Volume(StreamName),
}

impl FromStr for StreamKey {
    type Err = StreamKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, name) = match s.split_once(':') {
            Some((family, name)) => (family, Some(name)),
            None => (s, None),
        };

        match (family, name) {
            ("cpu", None) => Ok(StreamKey::Cpu),
            ("memory", None) => Ok(StreamKey::Memory),
            ("cpu" | "memory", Some(_)) => Err(StreamKeyError::UnexpectedName(s.to_string())),
            ("net" | "volume", None) => Err(StreamKeyError::MissingName(s.to_string())),
            ("net" | "volume", Some("")) => Err(StreamKeyError::MissingName(s.to_string())),
            ("net", Some(name)) => Ok(StreamKey::Net(StreamName::parse(name))),
            ("volume", Some(name)) => Ok(StreamKey::Volume(StreamName::parse(name))),
            (other, _) => Err(StreamKeyError::UnknownFamily(other.to_string())),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKey::Cpu => f.write_str("cpu"),
            StreamKey::Memory => f.write_str("memory"),
            StreamKey::Net(name) => write!(f, "net:{}", name),
            StreamKey::Volume(name) => write!(f, "volume:{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(epoch: Epoch) -> CpuSample {
        CpuSample { epoch, avg_load: epoch as u64 }
    }

    #[test]
    fn test_buffer_is_bounded_and_evicts_oldest_first() {
        let mut buffer = HistoryBuffer::new(DEFAULT_CAPACITY);
        for epoch in 0..(DEFAULT_CAPACITY as i64 + 10) {
            buffer.push(cpu(epoch));
        }
        assert_eq!(buffer.len(), DEFAULT_CAPACITY);
        let epochs: Vec<_> = buffer.iter().map(|s| s.epoch).collect();
        let expected: Vec<_> = (10..(DEFAULT_CAPACITY as i64 + 10)).collect();
        assert_eq!(epochs, expected);
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut buffer = HistoryBuffer::new(2);
        assert_eq!(buffer.push(cpu(1)), None);
        assert_eq!(buffer.push(cpu(2)), None);
        assert_eq!(buffer.push(cpu(3)), Some(cpu(1)));
        assert_eq!(buffer.latest(), Some(&cpu(3)));
    }

    #[test]
    fn test_recent_window() {
        let mut buffer = HistoryBuffer::new(8);
        for epoch in 1..=5 {
            buffer.push(cpu(epoch));
        }
        let last_two: Vec<_> = buffer.recent(Some(2)).iter().map(|s| s.epoch).collect();
        assert_eq!(last_two, vec![4, 5]);
        assert_eq!(buffer.recent(Some(50)).len(), 5);
        assert_eq!(buffer.recent(None).len(), 5);
        assert!(buffer.recent(Some(0)).is_empty());
    }

    #[test]
    fn test_store_creates_streams_lazily() {
        let mut store: HistoryStore<CpuSample> = HistoryStore::new(4);
        assert!(store.stream("eth0").is_none());
        assert!(store.combined().is_none());

        store.append("eth0", cpu(1));
        store.append("eth0", cpu(2));
        store.append_combined(cpu(2));

        assert_eq!(store.stream("eth0").map(HistoryBuffer::len), Some(2));
        assert_eq!(store.combined().map(HistoryBuffer::capacity), Some(4));
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["eth0"]);
    }

    #[test]
    fn test_stream_key_round_trip() {
        for raw in ["cpu", "memory", "net:combined", "net:Intel[R] NIC _2", "volume:C:", "volume:combined"] {
            let key: StreamKey = raw.parse().unwrap();
            assert_eq!(key.to_string(), raw);
        }
        assert_eq!("volume:C:".parse::<StreamKey>().unwrap(), StreamKey::Volume(StreamName::Entity("C:".into())));
    }

    #[test]
    fn test_stream_key_errors() {
        assert_eq!("disk".parse::<StreamKey>(), Err(StreamKeyError::UnknownFamily("disk".into())));
        assert_eq!("net".parse::<StreamKey>(), Err(StreamKeyError::MissingName("net".into())));
        assert_eq!("volume:".parse::<StreamKey>(), Err(StreamKeyError::MissingName("volume:".into())));
        assert_eq!("cpu:0".parse::<StreamKey>(), Err(StreamKeyError::UnexpectedName("cpu:0".into())));
    }

    #[test]
    fn test_history_sample_is_tagged() {
        let sample: HistorySample = InterfaceSample { epoch: 7, in_avg_bps: 1, out_avg_bps: 2 }.into();
        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(json["kind"], "interface");
        assert_eq!(json["in_avg_bps"], 1);
        assert_eq!(sample.epoch(), 7);
    }
}
