//! Simulated camera SDK
//!
//! Behaves like the vendor library from the caller's side: discovery, a
//! GenICam-style feature map, a stream that hands out synthetic frames, and
//! an error callback fired from a thread the SDK owns. Faults can be injected
//! per call so every fatal path of a run can be exercised without hardware.

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, info};

use super::{
    Camera, CameraSdk, DeviceAddress, DeviceDescriptor, ErrorEvent, ErrorReceiver, FeatureInfo,
    FeatureKind, FeatureParams, FrameSource, SdkError, SdkResult, SourceCounters, StreamParams,
    TransportKind,
};
use crate::capture::configure::{DOUBLE_RATE, TRIGGER_SOFTWARE, WINDOW_WIDTH};
use crate::capture::{FrameMeta, Image, PixelFormat};
use crate::process::demodulate;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One simulated camera model
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub descriptor: DeviceDescriptor,
    pub color: bool,
    pub double_rate: bool,
    pub sensor_width: u32,
    pub sensor_height: u32,
    /// `PixelFormat` entries as the camera enumerates them
    pub formats: Vec<String>,
    /// Flat RGB colour seen by colour sensors
    pub scene: [u8; 3],
    pub fps: f64,
}

impl SimDevice {
    fn descriptor(index: u8, transport: TransportKind, model: &str) -> DeviceDescriptor {
        let address = match transport {
            TransportKind::Network => DeviceAddress::Network {
                ip: Ipv4Addr::new(192, 168, 3, 100u8.saturating_add(index)),
                mac: [0x00, 0x11, 0x1c, 0x00, 0x00, index],
            },
            TransportKind::Bus => DeviceAddress::Bus {
                guid: format!("SIM-U3V-{:04}", index),
            },
        };
        DeviceDescriptor {
            transport,
            address,
            vendor: "Simulated".into(),
            model: model.into(),
            serial: format!("SIM{:06}", index),
        }
    }

    pub fn mono(index: u8, transport: TransportKind) -> Self {
        Self {
            descriptor: Self::descriptor(index, transport, "MV1-D1024"),
            color: false,
            double_rate: false,
            sensor_width: 1024,
            sensor_height: 1024,
            formats: vec!["Mono8".into()],
            scene: [128, 128, 128],
            fps: 30.0,
        }
    }

    pub fn color(index: u8, transport: TransportKind) -> Self {
        Self {
            descriptor: Self::descriptor(index, transport, "MV1-D1024C-DR"),
            color: true,
            double_rate: true,
            sensor_width: 1024,
            sensor_height: 768,
            formats: vec!["Mono8".into(), "BayerRG8".into(), "RGB8".into()],
            scene: [200, 120, 40],
            fps: 30.0,
        }
    }

    pub fn with_double_rate(mut self, double_rate: bool) -> Self {
        self.double_rate = double_rate;
        self
    }

    pub fn with_sensor(mut self, width: u32, height: u32) -> Self {
        self.sensor_width = width;
        self.sensor_height = height;
        self
    }

    pub fn with_formats(self, formats: Vec<PixelFormat>) -> Self {
        self.with_format_names(formats.iter().map(|f| f.name()))
    }

    /// Enumerate formats by name, including ones the host cannot decode.
    pub fn with_format_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formats = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scene(mut self, scene: [u8; 3]) -> Self {
        self.scene = scene;
        self
    }

    fn features(&self) -> BTreeMap<String, Feature> {
        let mut features = BTreeMap::new();
        let width = self.sensor_width as i64;
        let height = self.sensor_height as i64;
        features.insert(
            "Width".to_string(),
            Feature::int(width / 2, 16, width, 4),
        );
        features.insert(
            "Height".to_string(),
            Feature::int(height / 2, 2, height, 2),
        );
        features.insert(
            "PixelFormat".to_string(),
            Feature::Enum {
                value: self.formats.first().cloned().unwrap_or_else(|| "Mono8".into()),
                entries: self.formats.clone(),
            },
        );
        features.insert(
            "ExposureTime".to_string(),
            Feature::Float {
                value: 1000.0,
                min: 10.0,
                max: 1_000_000.0,
            },
        );
        features.insert("TriggerMode".to_string(), Feature::enumeration("Off", &["Off", "On"]));
        features.insert(
            "TriggerSource".to_string(),
            Feature::enumeration("Line0", &["Line0", "Software"]),
        );
        features.insert(TRIGGER_SOFTWARE.to_string(), Feature::Command);
        if self.double_rate {
            features.insert(DOUBLE_RATE.to_string(), Feature::Bool(false));
            features.insert(
                WINDOW_WIDTH.to_string(),
                Feature::Int {
                    value: width / 2,
                    min: 16,
                    max: width,
                    inc: 4,
                    read_only: true,
                },
            );
        }
        features
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Feature {
    Bool(bool),
    Int {
        value: i64,
        min: i64,
        max: i64,
        inc: i64,
        read_only: bool,
    },
    Float {
        value: f64,
        min: f64,
        max: f64,
    },
    Enum {
        value: String,
        entries: Vec<String>,
    },
    Command,
}

impl Feature {
    fn int(value: i64, min: i64, max: i64, inc: i64) -> Self {
        Feature::Int {
            value,
            min,
            max,
            inc,
            read_only: false,
        }
    }

    fn enumeration(value: &str, entries: &[&str]) -> Self {
        Feature::Enum {
            value: value.into(),
            entries: entries.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn writable(&self) -> bool {
        !matches!(self, Feature::Command | Feature::Int { read_only: true, .. })
    }

    fn kind(&self) -> FeatureKind {
        match self {
            Feature::Bool(_) => FeatureKind::Bool,
            Feature::Int { .. } => FeatureKind::Int,
            Feature::Float { .. } => FeatureKind::Float,
            Feature::Enum { .. } => FeatureKind::Enum,
            Feature::Command => FeatureKind::Command,
        }
    }
}

/// Faults to inject into the next session
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    pub discovery: bool,
    pub connect: bool,
    pub open_stream: bool,
    pub grab: bool,
    pub freeze: bool,
    pub disconnect: bool,
    /// Writes to this feature fail
    pub feature_write: Option<String>,
    /// Every n-th poll delivers nothing
    pub miss_every: Option<u64>,
    /// Every n-th delivered frame is missing packets
    pub incomplete_every: Option<u64>,
    /// Report a communication error from an SDK thread when grabbing starts
    pub comm_error_on_grab: bool,
}

/// What the simulated SDK saw, for inspection after a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimLog {
    pub connects: u32,
    pub disconnects: u32,
    pub feature_writes: Vec<(String, String)>,
    pub heartbeat: Option<Duration>,
    pub stream: Option<StreamParams>,
    pub grabs: u32,
    pub freezes: u32,
    pub delivered: u64,
    pub released: u64,
    pub triggers: u64,
}

struct Shared {
    features: BTreeMap<String, Feature>,
    grabbing: bool,
    stream_open: bool,
    /// Software triggers not yet answered with a frame
    pending_triggers: u64,
}

impl Shared {
    fn enum_is(&self, name: &str, expected: &str) -> bool {
        matches!(self.features.get(name), Some(Feature::Enum { value, .. }) if value == expected)
    }

    fn software_triggered(&self) -> bool {
        self.enum_is("TriggerMode", "On") && self.enum_is("TriggerSource", "Software")
    }
}

/// Simulated SDK entry point
pub struct SimulatedSdk {
    devices: Vec<SimDevice>,
    faults: SimFaults,
    receiver: Option<Arc<ErrorReceiver>>,
    log: Arc<Mutex<SimLog>>,
}

impl SimulatedSdk {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        Self {
            devices,
            faults: SimFaults::default(),
            receiver: None,
            log: Arc::new(Mutex::new(SimLog::default())),
        }
    }

    pub fn with_faults(mut self, faults: SimFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn log(&self) -> SimLog {
        lock(&self.log).clone()
    }
}

impl CameraSdk for SimulatedSdk {
    type Camera = SimCamera;

    fn discover(&mut self) -> SdkResult<Vec<DeviceDescriptor>> {
        if self.faults.discovery {
            return Err(SdkError::new(SdkError::TRANSPORT, "discovery socket failed"));
        }
        if self.devices.is_empty() {
            return Err(SdkError::new(SdkError::NO_CAMERAS_FOUND, "no cameras found"));
        }
        Ok(self.devices.iter().map(|d| d.descriptor.clone()).collect())
    }

    fn connect(&mut self, device: &DeviceDescriptor) -> SdkResult<SimCamera> {
        if self.faults.connect {
            return Err(SdkError::new(SdkError::TRANSPORT, "control channel timeout"));
        }
        let (index, model) = self
            .devices
            .iter()
            .enumerate()
            .find(|(_, d)| &d.descriptor == device)
            .ok_or_else(|| SdkError::new(SdkError::TRANSPORT, "camera not reachable"))?;

        lock(&self.log).connects += 1;
        info!("simulated camera {} connected", device.label());
        Ok(SimCamera {
            index: index as u32,
            device: model.clone(),
            shared: Arc::new(Mutex::new(Shared {
                features: model.features(),
                grabbing: false,
                stream_open: false,
                pending_triggers: 0,
            })),
            faults: self.faults.clone(),
            receiver: self.receiver.clone(),
            log: self.log.clone(),
            callback_thread: None,
        })
    }

    fn set_error_receiver(&mut self, receiver: ErrorReceiver) {
        self.receiver = Some(Arc::new(receiver));
    }
}

/// Connection to one simulated camera
pub struct SimCamera {
    index: u32,
    device: SimDevice,
    shared: Arc<Mutex<Shared>>,
    faults: SimFaults,
    receiver: Option<Arc<ErrorReceiver>>,
    log: Arc<Mutex<SimLog>>,
    callback_thread: Option<JoinHandle<()>>,
}

fn not_found(name: &str) -> SdkError {
    SdkError::new(SdkError::FEATURE_NOT_FOUND, format!("feature {} not found", name))
}

fn wrong_type(name: &str) -> SdkError {
    SdkError::new(SdkError::FEATURE_TYPE, format!("feature {} has another type", name))
}

impl SimCamera {
    fn read<T>(&self, name: &str, f: impl FnOnce(&Feature) -> Option<T>) -> SdkResult<T> {
        let shared = lock(&self.shared);
        let feature = shared.features.get(name).ok_or_else(|| not_found(name))?;
        f(feature).ok_or_else(|| wrong_type(name))
    }

    fn write(&mut self, name: &str, shown: String, f: impl FnOnce(&mut Feature) -> SdkResult<()>) -> SdkResult<()> {
        if self.faults.feature_write.as_deref() == Some(name) {
            return Err(SdkError::new(SdkError::TRANSPORT, format!("write to {} timed out", name)));
        }
        let mut shared = lock(&self.shared);
        if shared.grabbing && (matches!(name, "Width" | "Height" | "PixelFormat" | "TriggerMode") || name == DOUBLE_RATE) {
            return Err(SdkError::new(SdkError::READ_ONLY, format!("{} is locked while grabbing", name)));
        }
        let feature = shared.features.get_mut(name).ok_or_else(|| not_found(name))?;
        f(feature)?;

        // The demodulated width follows the sensor window.
        if name == "Width" {
            let width = Self::int_value(&shared, "Width");
            if let (Some(width), Some(Feature::Int { value: window, .. })) =
                (width, shared.features.get_mut(WINDOW_WIDTH))
            {
                *window = width;
            }
        }
        drop(shared);
        lock(&self.log).feature_writes.push((name.to_string(), shown));
        Ok(())
    }

    fn int_value(shared: &Shared, name: &str) -> Option<i64> {
        match shared.features.get(name) {
            Some(Feature::Int { value, .. }) => Some(*value),
            _ => None,
        }
    }
}

impl Camera for SimCamera {
    type Stream = SimStream;

    fn info(&self) -> &DeviceDescriptor {
        &self.device.descriptor
    }

    fn is_color(&self) -> SdkResult<bool> {
        Ok(self.device.color)
    }

    fn feature_list(&self) -> SdkResult<Vec<FeatureInfo>> {
        Ok(lock(&self.shared)
            .features
            .iter()
            .map(|(name, f)| FeatureInfo {
                name: name.clone(),
                kind: f.kind(),
                writable: f.writable(),
            })
            .collect())
    }

    fn feature_params(&self, name: &str) -> SdkResult<FeatureParams> {
        self.read(name, |f| {
            Some(match f {
                Feature::Bool(_) | Feature::Command => FeatureParams::default(),
                Feature::Int { min, max, inc, .. } => FeatureParams {
                    min: *min,
                    max: *max,
                    inc: *inc,
                    ..Default::default()
                },
                Feature::Float { min, max, .. } => FeatureParams {
                    float_min: *min,
                    float_max: *max,
                    ..Default::default()
                },
                Feature::Enum { entries, .. } => FeatureParams {
                    enumeration_count: entries.len() as u32,
                    ..Default::default()
                },
            })
        })
    }

    fn feature_enum_name(&self, name: &str, index: u32) -> SdkResult<String> {
        let entries = self.read(name, |f| match f {
            Feature::Enum { entries, .. } => Some(entries.clone()),
            _ => None,
        })?;
        entries.get(index as usize).cloned().ok_or_else(|| {
            SdkError::new(SdkError::OUT_OF_RANGE, format!("{} has no entry {}", name, index))
        })
    }

    fn feature_bool(&self, name: &str) -> SdkResult<bool> {
        self.read(name, |f| match f {
            Feature::Bool(v) => Some(*v),
            _ => None,
        })
    }

    fn feature_bool_set(&mut self, name: &str, value: bool) -> SdkResult<()> {
        let owned = name.to_string();
        self.write(name, value.to_string(), |f| match f {
            Feature::Bool(v) => {
                *v = value;
                Ok(())
            }
            _ => Err(wrong_type(&owned)),
        })
    }

    fn feature_int(&self, name: &str) -> SdkResult<i64> {
        self.read(name, |f| match f {
            Feature::Int { value, .. } => Some(*value),
            _ => None,
        })
    }

    fn feature_int_set(&mut self, name: &str, new: i64) -> SdkResult<()> {
        let owned = name.to_string();
        self.write(name, new.to_string(), |f| match f {
            Feature::Int { read_only: true, .. } => Err(SdkError::new(
                SdkError::READ_ONLY,
                format!("{} is read only", owned),
            )),
            Feature::Int {
                value,
                min,
                max,
                inc,
                ..
            } => {
                if new < *min || new > *max || (new - *min) % (*inc).max(1) != 0 {
                    return Err(SdkError::new(
                        SdkError::OUT_OF_RANGE,
                        format!("{} = {} outside [{}, {}] step {}", owned, new, min, max, inc),
                    ));
                }
                *value = new;
                Ok(())
            }
            _ => Err(wrong_type(&owned)),
        })
    }

    fn feature_float(&self, name: &str) -> SdkResult<f64> {
        self.read(name, |f| match f {
            Feature::Float { value, .. } => Some(*value),
            _ => None,
        })
    }

    fn feature_float_set(&mut self, name: &str, new: f64) -> SdkResult<()> {
        let owned = name.to_string();
        self.write(name, new.to_string(), |f| match f {
            Feature::Float { value, min, max } => {
                if !(*min..=*max).contains(&new) {
                    return Err(SdkError::new(
                        SdkError::OUT_OF_RANGE,
                        format!("{} = {} outside [{}, {}]", owned, new, min, max),
                    ));
                }
                *value = new;
                Ok(())
            }
            _ => Err(wrong_type(&owned)),
        })
    }

    fn feature_enum(&self, name: &str) -> SdkResult<String> {
        self.read(name, |f| match f {
            Feature::Enum { value, .. } => Some(value.clone()),
            _ => None,
        })
    }

    fn feature_enum_set(&mut self, name: &str, new: &str) -> SdkResult<()> {
        let owned = name.to_string();
        self.write(name, new.to_string(), |f| match f {
            Feature::Enum { value, entries } => {
                if !entries.iter().any(|e| e == new) {
                    return Err(SdkError::new(
                        SdkError::OUT_OF_RANGE,
                        format!("{} has no entry {}", owned, new),
                    ));
                }
                *value = new.to_string();
                Ok(())
            }
            _ => Err(wrong_type(&owned)),
        })
    }

    fn feature_command(&mut self, name: &str) -> SdkResult<()> {
        if self.faults.feature_write.as_deref() == Some(name) {
            return Err(SdkError::new(SdkError::TRANSPORT, format!("command {} timed out", name)));
        }
        let mut shared = lock(&self.shared);
        match shared.features.get(name) {
            Some(Feature::Command) => {}
            Some(_) => return Err(wrong_type(name)),
            None => return Err(not_found(name)),
        }
        if name == TRIGGER_SOFTWARE {
            if !shared.grabbing {
                return Err(SdkError::new(SdkError::NOT_GRABBING, "trigger while not grabbing"));
            }
            // A camera not in software trigger mode ignores the command.
            if shared.software_triggered() {
                shared.pending_triggers += 1;
            }
        }
        drop(shared);
        lock(&self.log).triggers += 1;
        Ok(())
    }

    fn set_heartbeat_timeout(&mut self, timeout: Duration) -> SdkResult<()> {
        lock(&self.log).heartbeat = Some(timeout);
        Ok(())
    }

    fn open_stream(&mut self, params: StreamParams) -> SdkResult<SimStream> {
        if self.faults.open_stream {
            return Err(SdkError::new(SdkError::STREAM, "could not open stream channel"));
        }
        if params.transport != self.device.descriptor.transport {
            return Err(SdkError::new(
                SdkError::STREAM,
                format!("{} stream on a {} camera", params.transport, self.device.descriptor.transport),
            ));
        }
        if params.buffer_count == 0 {
            return Err(SdkError::new(SdkError::STREAM, "buffer count must be positive"));
        }
        lock(&self.shared).stream_open = true;
        lock(&self.log).stream = Some(params);
        debug!("simulated {} stream with {} buffers", params.transport, params.buffer_count);
        Ok(SimStream {
            device: self.device.clone(),
            shared: self.shared.clone(),
            log: self.log.clone(),
            miss_every: self.faults.miss_every,
            incomplete_every: self.faults.incomplete_every,
            incomplete: 0,
            polls: 0,
            sequence: 0,
            outstanding: HashSet::new(),
        })
    }

    fn grab(&mut self) -> SdkResult<()> {
        if self.faults.grab {
            return Err(SdkError::new(SdkError::STREAM, "acquisition start rejected"));
        }
        let mut shared = lock(&self.shared);
        if !shared.stream_open {
            return Err(SdkError::new(SdkError::STREAM, "no stream added to camera"));
        }
        shared.grabbing = true;
        drop(shared);
        lock(&self.log).grabs += 1;

        if self.faults.comm_error_on_grab {
            if let Some(receiver) = self.receiver.clone() {
                let camera = self.index;
                self.callback_thread = Some(std::thread::spawn(move || {
                    (receiver.as_ref())(&ErrorEvent {
                        camera,
                        code: SdkError::TRANSPORT,
                        message: "heartbeat missed".into(),
                    });
                }));
            }
        }
        Ok(())
    }

    fn freeze(&mut self) -> SdkResult<()> {
        if let Some(handle) = self.callback_thread.take() {
            let _ = handle.join();
        }
        if self.faults.freeze {
            return Err(SdkError::new(SdkError::STREAM, "acquisition stop rejected"));
        }
        let mut shared = lock(&self.shared);
        shared.grabbing = false;
        shared.pending_triggers = 0;
        drop(shared);
        lock(&self.log).freezes += 1;
        Ok(())
    }

    fn disconnect(mut self) -> SdkResult<()> {
        if let Some(handle) = self.callback_thread.take() {
            let _ = handle.join();
        }
        if self.faults.disconnect {
            return Err(SdkError::new(SdkError::TRANSPORT, "control channel lost"));
        }
        lock(&self.log).disconnects += 1;
        info!("simulated camera {} disconnected", self.device.descriptor.label());
        Ok(())
    }
}

/// Stream of synthetic frames from one simulated camera
pub struct SimStream {
    device: SimDevice,
    shared: Arc<Mutex<Shared>>,
    log: Arc<Mutex<SimLog>>,
    miss_every: Option<u64>,
    incomplete_every: Option<u64>,
    incomplete: u64,
    polls: u64,
    sequence: u64,
    outstanding: HashSet<u64>,
}

impl SimStream {
    /// Full-resolution frame as the sensor sees it
    fn render(&self, width: u32, height: u32, format: PixelFormat) -> Image {
        let mut image = Image::new(width, height, format);
        let [r, g, b] = self.device.scene;
        match format {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => {
                let px = if format == PixelFormat::Rgb8 { [r, g, b] } else { [b, g, r] };
                for chunk in image.data.chunks_exact_mut(3) {
                    chunk.copy_from_slice(&px);
                }
            }
            f if f.is_bayer() => {
                use crate::capture::frame::CfaColor;
                for y in 0..height as usize {
                    for x in 0..width as usize {
                        image.data[y * width as usize + x] = match f.cfa_color(x, y) {
                            Some(CfaColor::Red) => r,
                            Some(CfaColor::Green) => g,
                            _ => b,
                        };
                    }
                }
            }
            _ => {
                for y in 0..height as usize {
                    for x in 0..width as usize {
                        image.data[y * width as usize + x] = ((x + y + self.sequence as usize) % 256) as u8;
                    }
                }
            }
        }
        image
    }
}

impl FrameSource for SimStream {
    fn next_frame(&mut self, slot: &mut BytesMut, _timeout: Duration) -> SdkResult<Option<FrameMeta>> {
        let (width, height, format, double_rate) = {
            let mut shared = lock(&self.shared);
            if !shared.grabbing {
                return Err(SdkError::new(SdkError::NOT_GRABBING, "acquisition not started"));
            }
            if shared.enum_is("TriggerMode", "On") {
                if shared.pending_triggers == 0 {
                    return Ok(None);
                }
                shared.pending_triggers -= 1;
            }
            let width = SimCamera::int_value(&shared, "Width").unwrap_or(0) as u32;
            let height = SimCamera::int_value(&shared, "Height").unwrap_or(0) as u32;
            let format = match shared.features.get("PixelFormat") {
                Some(Feature::Enum { value, .. }) => value.parse().unwrap_or(PixelFormat::Mono8),
                _ => PixelFormat::Mono8,
            };
            let double_rate = matches!(shared.features.get(DOUBLE_RATE), Some(Feature::Bool(true)));
            (width, height, format, double_rate)
        };

        self.polls += 1;
        if let Some(n) = self.miss_every {
            if n > 0 && self.polls % n == 0 {
                return Ok(None);
            }
        }

        self.sequence += 1;
        let mut image = self.render(width, height, format);
        if double_rate {
            image = demodulate::modulate(&image, self.device.color)
                .map_err(|e| SdkError::new(SdkError::STREAM, e.to_string()))?;
        }
        slot.extend_from_slice(&image.data);
        self.outstanding.insert(self.sequence);
        lock(&self.log).delivered += 1;

        let missing_packets = match self.incomplete_every {
            Some(n) if n > 0 && self.sequence % n == 0 => {
                self.incomplete += 1;
                3
            }
            _ => 0,
        };
        let timestamp = if self.device.fps > 0.0 {
            Duration::from_secs_f64(self.sequence as f64 / self.device.fps)
        } else {
            Duration::ZERO
        };

        Ok(Some(FrameMeta {
            sequence: self.sequence,
            width,
            height,
            format,
            timestamp,
            missing_packets,
        }))
    }

    fn release(&mut self, sequence: u64) -> SdkResult<()> {
        if !self.outstanding.remove(&sequence) {
            return Err(SdkError::new(
                SdkError::BUFFER,
                format!("buffer {} is not checked out", sequence),
            ));
        }
        lock(&self.log).released += 1;
        Ok(())
    }

    fn counters(&self) -> SourceCounters {
        SourceCounters {
            frames_dropped: 0,
            frames_incomplete: self.incomplete,
            fps: self.device.fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(device: SimDevice) -> (SimulatedSdk, SimCamera) {
        let mut sdk = SimulatedSdk::new(vec![device]);
        let found = sdk.discover().unwrap();
        let camera = sdk.connect(&found[0]).unwrap();
        (sdk, camera)
    }

    #[test]
    fn empty_discovery_reports_no_cameras() {
        let mut sdk = SimulatedSdk::new(vec![]);
        assert_eq!(sdk.discover().unwrap_err().code, SdkError::NO_CAMERAS_FOUND);
    }

    #[test]
    fn window_follows_width() {
        let (_sdk, mut cam) = connected(SimDevice::color(0, TransportKind::Network));
        cam.feature_int_set("Width", 512).unwrap();
        assert_eq!(cam.feature_int("Window_W").unwrap(), 512);
        assert!(cam.feature_int_set("Window_W", 256).is_err());
    }

    #[test]
    fn int_writes_are_range_checked() {
        let (_sdk, mut cam) = connected(SimDevice::mono(0, TransportKind::Bus));
        let params = cam.feature_params("Width").unwrap();
        assert_eq!(params.max, 1024);
        assert!(cam.feature_int_set("Width", params.max + 4).is_err());
        assert!(cam.feature_int_set("Width", 17).is_err());
        cam.feature_int_set("Width", params.max).unwrap();
    }

    #[test]
    fn grab_needs_a_stream() {
        let (_sdk, mut cam) = connected(SimDevice::mono(0, TransportKind::Network));
        assert!(cam.grab().is_err());
        let _stream = cam
            .open_stream(StreamParams {
                transport: TransportKind::Network,
                buffer_count: 4,
            })
            .unwrap();
        cam.grab().unwrap();
    }

    #[test]
    fn stream_rejects_unknown_release() {
        let (_sdk, mut cam) = connected(SimDevice::mono(0, TransportKind::Network));
        let mut stream = cam
            .open_stream(StreamParams {
                transport: TransportKind::Network,
                buffer_count: 4,
            })
            .unwrap();
        cam.grab().unwrap();
        let mut slot = BytesMut::new();
        let meta = stream.next_frame(&mut slot, Duration::ZERO).unwrap().unwrap();
        assert_eq!(slot.len(), meta.payload_len());
        stream.release(meta.sequence).unwrap();
        assert!(stream.release(meta.sequence).is_err());
    }

    fn open(cam: &mut SimCamera) -> SimStream {
        let transport = cam.info().transport;
        let stream = cam
            .open_stream(StreamParams {
                transport,
                buffer_count: 4,
            })
            .unwrap();
        cam.grab().unwrap();
        stream
    }

    #[test]
    fn zero_fps_does_not_panic() {
        let mut device = SimDevice::mono(0, TransportKind::Network).with_sensor(32, 8);
        device.fps = 0.0;
        let (_sdk, mut cam) = connected(device);
        let mut stream = open(&mut cam);
        let mut slot = BytesMut::new();
        let meta = stream.next_frame(&mut slot, Duration::ZERO).unwrap().unwrap();
        assert_eq!(meta.timestamp, Duration::ZERO);
        assert_eq!(stream.counters().fps, 0.0);
    }

    #[test]
    fn software_trigger_gates_frames() {
        let (sdk, mut cam) = connected(SimDevice::mono(0, TransportKind::Bus).with_sensor(32, 8));
        assert!(cam.feature_command(TRIGGER_SOFTWARE).is_err());
        cam.feature_enum_set("TriggerMode", "On").unwrap();
        cam.feature_enum_set("TriggerSource", "Software").unwrap();
        let mut stream = open(&mut cam);
        let mut slot = BytesMut::new();
        assert!(stream.next_frame(&mut slot, Duration::ZERO).unwrap().is_none());

        cam.feature_command(TRIGGER_SOFTWARE).unwrap();
        let meta = stream.next_frame(&mut slot, Duration::ZERO).unwrap().unwrap();
        stream.release(meta.sequence).unwrap();
        slot.clear();
        assert!(stream.next_frame(&mut slot, Duration::ZERO).unwrap().is_none());
        assert_eq!(sdk.log().triggers, 1);
        assert!(cam.feature_enum_set("TriggerMode", "Off").is_err());
    }

    #[test]
    fn commands_are_not_writable() {
        let (_sdk, cam) = connected(SimDevice::color(0, TransportKind::Network));
        let list = cam.feature_list().unwrap();
        let find = |name: &str| list.iter().find(|f| f.name == name).unwrap().clone();
        assert_eq!(find(TRIGGER_SOFTWARE).kind, FeatureKind::Command);
        assert!(!find(TRIGGER_SOFTWARE).writable);
        assert!(!find(WINDOW_WIDTH).writable);
        assert!(find(DOUBLE_RATE).writable);
    }

    #[test]
    fn incomplete_frames_are_counted() {
        let faults = SimFaults {
            incomplete_every: Some(2),
            ..Default::default()
        };
        let mut sdk = SimulatedSdk::new(vec![SimDevice::mono(0, TransportKind::Network).with_sensor(32, 8)])
            .with_faults(faults);
        let found = sdk.discover().unwrap();
        let mut cam = sdk.connect(&found[0]).unwrap();
        let mut stream = open(&mut cam);
        let mut missing = Vec::new();
        for _ in 0..4 {
            let mut slot = BytesMut::new();
            let meta = stream.next_frame(&mut slot, Duration::ZERO).unwrap().unwrap();
            missing.push(meta.missing_packets);
            stream.release(meta.sequence).unwrap();
        }
        assert_eq!(missing, vec![0, 3, 0, 3]);
        assert_eq!(stream.counters().frames_incomplete, 2);
    }
}
