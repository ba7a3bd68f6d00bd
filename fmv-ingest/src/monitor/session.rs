//! One stream session: datagrams in, rolled-over chunks out.

use std::time::{Duration, Instant};

use bytes::Bytes;
use fmv_core::buffer::{BufferConfig, PacketBuffer, RolloverCondition};
use fmv_core::frame::classify;
use fmv_core::klv::{decode_telemetry, KlvContext};
use fmv_core::pipeline::{AttributeMap, Pipeline, SetDistanceTolerance, SetSecurityClassification, WindowConfig};
use fmv_core::ts::{DatagramReassembler, Demuxer, ElementaryUnit, StreamKind};
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::error::IngestError;

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub buffer: BufferConfig,
    pub rollover: RolloverCondition,
    pub window: WindowConfig,
    /// Simplification tolerance for derived geometry.
    pub distance_tolerance: Option<f64>,
    /// Classification codes added to or replacing the default table.
    pub classifications: Vec<(u8, String)>,
    /// Interval between buffer counter log lines.
    pub stats_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            rollover: RolloverCondition::ByteCount(10 * fmv_core::buffer::BYTES_PER_MEGABYTE),
            window: WindowConfig::default(),
            distance_tolerance: None,
            classifications: Vec::new(),
            stats_interval: Duration::from_secs(60),
        }
    }
}

/// A handed-off chunk and the attributes of the telemetry seen while it was
/// being written.
#[derive(Debug)]
pub struct Rollover {
    pub file: NamedTempFile,
    pub attributes: AttributeMap,
}

/// Demux, buffer and telemetry state of a single transport stream.
pub struct StreamSession {
    id: u64,
    reassembler: DatagramReassembler,
    demux: Demuxer,
    context: KlvContext,
    pipeline: Pipeline,
    buffer: PacketBuffer,
    rollover: RolloverCondition,
    window: WindowConfig,
    stats_interval: Duration,
    last_stats_log: Instant,
    units_dropped: u64,
}

impl StreamSession {
    pub fn new(id: u64, config: &SessionConfig) -> Self {
        let mut pipeline = Pipeline::uas_datalink();
        if let Some(tolerance) = config.distance_tolerance {
            pipeline.configure(&mut SetDistanceTolerance(tolerance));
        }
        for (code, classification) in &config.classifications {
            pipeline.configure(&mut SetSecurityClassification {
                code: *code,
                classification: classification.clone(),
            });
        }

        Self {
            id,
            reassembler: DatagramReassembler::new(),
            demux: Demuxer::default(),
            context: KlvContext::uas_datalink(),
            pipeline,
            buffer: PacketBuffer::new(config.buffer.clone()),
            rollover: config.rollover.clone(),
            window: config.window.clone(),
            stats_interval: config.stats_interval,
            last_stats_log: Instant::now(),
            units_dropped: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Feed one datagram. Returns a chunk when the rollover condition became
    /// ready. An error means the stream is unreadable and the session must
    /// be replaced.
    pub fn push(&mut self, datagram: &[u8]) -> Result<Option<Rollover>, IngestError> {
        for packet in self.reassembler.push(datagram) {
            self.buffer.write(packet.clone())?;
            let units = self.read_packet(&packet)?;
            for unit in &units {
                self.dispatch(unit)?;
            }
        }

        self.log_stats();

        let Some(file) = self.buffer.rotate(&self.rollover)? else {
            return Ok(None);
        };
        Ok(Some(self.hand_off(file)))
    }

    /// Complete everything pending and hand off the current file, if any.
    /// Called when the stream goes idle and at shutdown.
    pub fn flush(&mut self) -> Result<Option<Rollover>, IngestError> {
        self.reassembler.flush();
        for unit in self.demux.flush() {
            self.dispatch(&unit)?;
        }
        match self.buffer.flush_and_rotate()? {
            Some(file) => Ok(Some(self.hand_off(file))),
            None => {
                // telemetry of a window without video is dropped with it
                self.pipeline.finish(&self.window);
                Ok(None)
            }
        }
    }

    fn read_packet(&mut self, packet: &Bytes) -> Result<Vec<ElementaryUnit>, IngestError> {
        match self.demux.read(packet) {
            Ok(units) => Ok(units),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                debug!("[Session {}] Skipping packet: {}", self.id, e);
                Ok(Vec::new())
            }
        }
    }

    fn dispatch(&mut self, unit: &ElementaryUnit) -> Result<(), IngestError> {
        match unit.kind() {
            StreamKind::Video(_) => match classify(unit) {
                Ok(frame_type) => self.buffer.frame_complete(frame_type)?,
                Err(e) => {
                    warn!("[Session {}] Unclassifiable video unit on PID 0x{:04X}: {}", self.id, unit.pid, e);
                    self.units_dropped += 1;
                }
            },
            StreamKind::Telemetry => match decode_telemetry(&unit.data, &self.context) {
                Ok(Some(decoded)) => self.pipeline.process(&decoded),
                Ok(None) => {}
                Err(e) => {
                    warn!("[Session {}] Dropping telemetry unit on PID 0x{:04X}: {}", self.id, unit.pid, e);
                    self.units_dropped += 1;
                }
            },
            StreamKind::Other => {}
        }
        Ok(())
    }

    fn hand_off(&mut self, file: NamedTempFile) -> Rollover {
        let attributes = self.pipeline.finish(&self.window);
        debug!(
            "[Session {}] Rolled over {:?} with {} attributes",
            self.id,
            file.path(),
            attributes.len()
        );
        Rollover { file, attributes }
    }

    fn log_stats(&mut self) {
        if self.last_stats_log.elapsed() < self.stats_interval {
            return;
        }
        self.last_stats_log = Instant::now();
        let stats = self.buffer.stats();
        info!(
            "[Session {}] packets={} received={}B written={}B files={} dropped_units={} lost_packets={} skipped={}B",
            self.id,
            stats.packets_received,
            stats.bytes_received,
            stats.bytes_written,
            stats.files_written,
            self.units_dropped,
            self.demux.lost_packets(),
            self.reassembler.skipped_bytes()
        );
    }
}
