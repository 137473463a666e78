//! Camera SDK surface
//!
//! The vendor library is a black box reached through a fixed request/response
//! API. These traits name exactly the capabilities the acquisition run uses, so
//! the run can be driven by real bindings or by [`sim::SimulatedSdk`].

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::capture::FrameMeta;

pub mod sim;

pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// A non-success result code from the SDK together with its description.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{description} (code {code})")]
pub struct SdkError {
    pub code: i32,
    pub description: String,
}

impl SdkError {
    pub const TRANSPORT: i32 = -1;
    pub const NO_CAMERAS_FOUND: i32 = -2;
    pub const NOT_CONNECTED: i32 = -3;
    pub const FEATURE_NOT_FOUND: i32 = -10;
    pub const FEATURE_TYPE: i32 = -11;
    pub const OUT_OF_RANGE: i32 = -12;
    pub const READ_ONLY: i32 = -13;
    pub const STREAM: i32 = -20;
    pub const NOT_GRABBING: i32 = -21;
    pub const BUFFER: i32 = -22;

    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// How a camera is attached to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// GigE Vision
    Network,
    /// USB3 Vision
    Bus,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Network => f.write_str("GEV"),
            TransportKind::Bus => f.write_str("U3V"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAddress {
    Network { ip: Ipv4Addr, mac: [u8; 6] },
    Bus { guid: String },
}

/// A discovered camera. Owned by the caller once discovery returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub transport: TransportKind,
    pub address: DeviceAddress,
    pub vendor: String,
    pub model: String,
    pub serial: String,
}

impl DeviceDescriptor {
    pub fn label(&self) -> String {
        format!("{} {} ({})", self.vendor, self.model, self.serial)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.label(), self.transport)?;
        match &self.address {
            DeviceAddress::Network { ip, mac } => write!(
                f,
                " ip {} mac {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                ip, mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            DeviceAddress::Bus { guid } => write!(f, " guid {}", guid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Bool,
    Int,
    Float,
    Enum,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureInfo {
    pub name: String,
    pub kind: FeatureKind,
    /// False for read-only features and for commands
    pub writable: bool,
}

/// Range and enumeration information for one feature. Fields that do not
/// apply to the feature's kind are zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureParams {
    pub min: i64,
    pub max: i64,
    pub inc: i64,
    pub float_min: f64,
    pub float_max: f64,
    pub enumeration_count: u32,
}

/// Stream construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub transport: TransportKind,
    pub buffer_count: usize,
}

/// Device-side counters of a stream
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceCounters {
    pub frames_dropped: u64,
    pub frames_incomplete: u64,
    pub fps: f64,
}

/// Snapshot of stream statistics. Cumulative counters never decrease.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamStatistics {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_incomplete: u64,
    pub empty_polls: u64,
    pub outstanding: usize,
    pub fps: f64,
}

impl fmt::Display for StreamStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received: {} dropped: {} incomplete: {} empty polls: {} outstanding: {} fps: {:.2}",
            self.frames_received,
            self.frames_dropped,
            self.frames_incomplete,
            self.empty_polls,
            self.outstanding,
            self.fps
        )
    }
}

/// Out-of-band communication fault reported by the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub camera: u32,
    pub code: i32,
    pub message: String,
}

/// Receives [`ErrorEvent`]s on a thread owned by the SDK. Must not block.
pub type ErrorReceiver = Box<dyn Fn(&ErrorEvent) + Send + Sync>;

/// Default receiver: log and carry on.
pub fn log_error_event(event: &ErrorEvent) {
    error!(
        camera = event.camera,
        code = event.code,
        "[Communication error callback] {}",
        event.message
    );
}

/// Source of filled frames for one stream.
pub trait FrameSource {
    /// Fill `slot` with the next frame. `Ok(None)` when nothing arrived within `timeout`.
    fn next_frame(&mut self, slot: &mut BytesMut, timeout: Duration) -> SdkResult<Option<FrameMeta>>;

    /// Give the frame with this sequence number back to the device.
    fn release(&mut self, sequence: u64) -> SdkResult<()>;

    fn counters(&self) -> SourceCounters;
}

/// An open session to one camera.
pub trait Camera {
    type Stream: FrameSource;

    fn info(&self) -> &DeviceDescriptor;
    fn is_color(&self) -> SdkResult<bool>;

    fn feature_list(&self) -> SdkResult<Vec<FeatureInfo>>;
    fn feature_params(&self, name: &str) -> SdkResult<FeatureParams>;
    fn feature_enum_name(&self, name: &str, index: u32) -> SdkResult<String>;

    fn feature_bool(&self, name: &str) -> SdkResult<bool>;
    fn feature_bool_set(&mut self, name: &str, value: bool) -> SdkResult<()>;
    fn feature_int(&self, name: &str) -> SdkResult<i64>;
    fn feature_int_set(&mut self, name: &str, value: i64) -> SdkResult<()>;
    fn feature_float(&self, name: &str) -> SdkResult<f64>;
    fn feature_float_set(&mut self, name: &str, value: f64) -> SdkResult<()>;
    fn feature_enum(&self, name: &str) -> SdkResult<String>;
    fn feature_enum_set(&mut self, name: &str, value: &str) -> SdkResult<()>;
    /// Execute a command feature such as `TriggerSoftware`.
    fn feature_command(&mut self, name: &str) -> SdkResult<()>;

    fn set_heartbeat_timeout(&mut self, timeout: Duration) -> SdkResult<()>;

    /// Bind a stream with a ring of `params.buffer_count` slots to this camera.
    fn open_stream(&mut self, params: StreamParams) -> SdkResult<Self::Stream>;

    /// Start acquisition into the bound stream.
    fn grab(&mut self) -> SdkResult<()>;
    /// Stop acquisition.
    fn freeze(&mut self) -> SdkResult<()>;

    fn disconnect(self) -> SdkResult<()>
    where
        Self: Sized;

    /// Whether the camera exposes a feature of this name.
    fn has_feature(&self, name: &str) -> SdkResult<bool> {
        Ok(self.feature_list()?.iter().any(|f| f.name == name))
    }
}

/// Entry point of an SDK: discovery and connection.
pub trait CameraSdk {
    type Camera: Camera;

    fn discover(&mut self) -> SdkResult<Vec<DeviceDescriptor>>;
    fn connect(&mut self, device: &DeviceDescriptor) -> SdkResult<Self::Camera>;
    fn set_error_receiver(&mut self, receiver: ErrorReceiver);
}
