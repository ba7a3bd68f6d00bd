//! Frame-aligned packet buffer.
//!
//! Raw transport packets are grouped into frames as frame-completion events
//! arrive. Groups of frames ("framesets") are written to a lazily created
//! temp file so that a file handed off by [`PacketBuffer::rotate`] always
//! ends on a frame group boundary.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, trace};
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use super::rollover::{RolloverCondition, RolloverState};
use crate::error::BufferError;
use crate::frame::FrameType;

/// Default maximum number of frames held before everything is flushed.
pub const DEFAULT_MAX_FRAMESET_SIZE: usize = 1000;

/// Default ceiling on bytes accumulated without a frame-completion event.
pub const DEFAULT_MAX_INCOMPLETE_FRAME_BYTES: usize = 50_000_000;

/// Configuration for [`PacketBuffer`].
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Frame list length above which the whole list is flushed.
    pub max_frameset_size: usize,
    /// Incomplete-frame byte count above which the bytes are force-completed
    /// as an unknown frame.
    pub max_incomplete_frame_bytes: usize,
    /// Directory for temp files (system temp dir when unset).
    pub temp_dir: Option<PathBuf>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_frameset_size: DEFAULT_MAX_FRAMESET_SIZE,
            max_incomplete_frame_bytes: DEFAULT_MAX_INCOMPLETE_FRAME_BYTES,
            temp_dir: None,
        }
    }
}

/// Running counters, never reset by rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub bytes_received: u64,
    pub packets_received: u64,
    pub bytes_written: u64,
    pub files_written: u64,
}

/// One completed frame: the raw packets it spans and its type.
#[derive(Debug, Clone)]
struct Frame {
    frame_type: FrameType,
    packets: Vec<Bytes>,
}

#[derive(Debug, Default)]
struct Inner {
    frames: Vec<Frame>,
    incomplete: Vec<Bytes>,
    incomplete_bytes: usize,
    temp_file: Option<NamedTempFile>,
    created_at: Option<Instant>,
    bytes_written_to_file: u64,
    stats: BufferStats,
}

/// Thread-safe frame boundary buffer for one stream session.
///
/// Every public operation holds a single lock for its whole duration,
/// including any disk write it triggers.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    config: BufferConfig,
    inner: Mutex<Inner>,
}

impl PacketBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Append raw stream bytes (normally one transport packet) to the
    /// current incomplete frame.
    pub fn write(&self, packet: Bytes) -> Result<(), BufferError> {
        if packet.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        inner.stats.bytes_received += packet.len() as u64;
        inner.stats.packets_received += 1;
        inner.incomplete_bytes += packet.len();
        inner.incomplete.push(packet);

        if inner.incomplete_bytes > self.config.max_incomplete_frame_bytes {
            debug!(
                "Incomplete frame exceeded {} bytes, completing as unknown",
                self.config.max_incomplete_frame_bytes
            );
            inner.complete_frame(FrameType::Unknown);
            self.flush_if_data_available(&mut inner)?;
        }
        Ok(())
    }

    /// Close the current incomplete frame with the given type.
    pub fn frame_complete(&self, frame_type: FrameType) -> Result<(), BufferError> {
        let mut inner = self.inner.lock();
        inner.complete_frame(frame_type);
        self.flush_if_data_available(&mut inner)
    }

    /// Hand off the current temp file if `condition` is ready and bytes were
    /// written to it. The caller owns the returned file, including deletion.
    pub fn rotate(&self, condition: &RolloverCondition) -> Result<Option<NamedTempFile>, BufferError> {
        let mut inner = self.inner.lock();
        self.flush_if_data_available(&mut inner)?;

        if !condition.is_ready(&inner.rollover_state()) {
            return Ok(None);
        }
        Ok(inner.detach())
    }

    /// Complete and flush everything pending, then hand off the temp file
    /// unconditionally. Used when a session ends.
    pub fn flush_and_rotate(&self) -> Result<Option<NamedTempFile>, BufferError> {
        let mut inner = self.inner.lock();
        if !inner.incomplete.is_empty() {
            inner.complete_frame(FrameType::Unknown);
        }
        if !inner.frames.is_empty() {
            let last = inner.frames.len() - 1;
            self.flush_frameset(&mut inner, last)?;
        }
        Ok(inner.detach())
    }

    /// Discard all buffered frames and the current temp file.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let stats = inner.stats;
        *inner = Inner {
            stats,
            ..Default::default()
        };
    }

    /// Age of the current temp file, zero when there is none.
    pub fn age(&self) -> Duration {
        self.inner.lock().age()
    }

    /// Bytes written to the current temp file.
    pub fn byte_count(&self) -> u64 {
        self.inner.lock().bytes_written_to_file
    }

    /// Snapshot of the running counters.
    pub fn stats(&self) -> BufferStats {
        self.inner.lock().stats
    }

    fn flush_if_data_available(&self, inner: &mut Inner) -> Result<(), BufferError> {
        match find_last_frameset_index(&inner.frames, self.config.max_frameset_size) {
            Some(index) => self.flush_frameset(inner, index),
            None => Ok(()),
        }
    }

    /// Write frames `0..=index` to the temp file and drop them from the list.
    /// The temp file is only created once there are bytes to write.
    fn flush_frameset(&self, inner: &mut Inner, index: usize) -> Result<(), BufferError> {
        let frames: Vec<Frame> = inner.frames.drain(..=index).collect();
        let size: u64 = frames
            .iter()
            .flat_map(|f| f.packets.iter())
            .map(|p| p.len() as u64)
            .sum();
        if size == 0 {
            trace!("Dropped {} empty frame(s)", frames.len());
            return Ok(());
        }

        if inner.temp_file.is_none() {
            let mut builder = tempfile::Builder::new();
            builder.prefix("fmv-").suffix(".ts");
            let file = match &self.config.temp_dir {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            debug!("Created temp file {}", file.path().display());
            inner.temp_file = Some(file);
            inner.created_at = Some(Instant::now());
        }
        if let Some(file) = inner.temp_file.as_mut() {
            for packet in frames.iter().flat_map(|f| f.packets.iter()) {
                file.write_all(packet)?;
            }
            file.flush()?;
        }

        trace!("Flushed {} frame(s), {} bytes", frames.len(), size);
        inner.bytes_written_to_file += size;
        inner.stats.bytes_written += size;
        Ok(())
    }
}

impl Inner {
    fn complete_frame(&mut self, frame_type: FrameType) {
        let packets = std::mem::take(&mut self.incomplete);
        self.incomplete_bytes = 0;
        self.frames.push(Frame {
            frame_type,
            packets,
        });
    }

    fn age(&self) -> Duration {
        self.created_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    fn rollover_state(&self) -> RolloverState {
        RolloverState {
            byte_count: self.bytes_written_to_file,
            age: self.age(),
        }
    }

    /// Take the temp file if anything was written to it.
    fn detach(&mut self) -> Option<NamedTempFile> {
        if self.bytes_written_to_file == 0 {
            return None;
        }
        let file = self.temp_file.take()?;
        self.bytes_written_to_file = 0;
        self.created_at = None;
        self.stats.files_written += 1;
        Some(file)
    }
}

/// Index of the last frame that may be flushed, if any.
///
/// - more than `max_frameset_size` frames: everything
/// - only unknown frames: everything
/// - no IDR frame: nothing
/// - otherwise: everything before the last IDR frame at index > 0
fn find_last_frameset_index(frames: &[Frame], max_frameset_size: usize) -> Option<usize> {
    if frames.is_empty() {
        return None;
    }

    if frames.len() > max_frameset_size {
        return Some(frames.len() - 1);
    }

    if frames.iter().all(|f| f.frame_type == FrameType::Unknown) {
        return Some(frames.len() - 1);
    }

    (1..frames.len())
        .rev()
        .find(|&i| frames[i].frame_type == FrameType::Idr)
        .map(|i| i - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn frames(types: &[FrameType]) -> Vec<Frame> {
        types
            .iter()
            .map(|&frame_type| Frame {
                frame_type,
                packets: Vec::new(),
            })
            .collect()
    }

    fn packet(tag: u8) -> Bytes {
        let mut data = vec![tag; 188];
        data[0] = 0x47;
        Bytes::from(data)
    }

    fn buffer(dir: &tempfile::TempDir) -> PacketBuffer {
        PacketBuffer::new(BufferConfig {
            temp_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
    }

    fn contents(mut file: NamedTempFile) -> Vec<u8> {
        let mut out = Vec::new();
        let mut reopened = file.reopen().unwrap();
        reopened.read_to_end(&mut out).unwrap();
        file.flush().unwrap();
        out
    }

    use FrameType::{Idr, NonIdr, Unknown};

    #[test]
    fn test_frameset_ends_before_last_idr() {
        let list = frames(&[Idr, NonIdr, NonIdr, Idr]);
        assert_eq!(find_last_frameset_index(&list, 1000), Some(2));
    }

    #[test]
    fn test_frameset_picks_last_of_several_idr() {
        let list = frames(&[NonIdr, Idr, NonIdr, Idr, NonIdr]);
        assert_eq!(find_last_frameset_index(&list, 1000), Some(2));
    }

    #[test]
    fn test_frameset_waits_without_idr() {
        assert_eq!(find_last_frameset_index(&frames(&[NonIdr, NonIdr, Unknown]), 1000), None);
    }

    #[test]
    fn test_leading_idr_alone_is_not_a_boundary() {
        assert_eq!(find_last_frameset_index(&frames(&[Idr]), 1000), None);
        assert_eq!(find_last_frameset_index(&frames(&[Idr, NonIdr, NonIdr]), 1000), None);
    }

    #[test]
    fn test_all_unknown_flushes_everything() {
        assert_eq!(find_last_frameset_index(&frames(&[Unknown, Unknown]), 1000), Some(1));
        assert_eq!(find_last_frameset_index(&frames(&[]), 1000), None);
    }

    #[test]
    fn test_oversized_list_flushes_everything() {
        let list = frames(&[NonIdr, NonIdr, NonIdr, NonIdr]);
        assert_eq!(find_last_frameset_index(&list, 3), Some(3));
        assert_eq!(find_last_frameset_index(&list, 4), None);
    }

    #[test]
    fn test_rotate_returns_flushed_frames() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer(&dir);

        buffer.write(packet(1)).unwrap();
        buffer.frame_complete(Idr).unwrap();
        buffer.write(packet(2)).unwrap();
        buffer.frame_complete(NonIdr).unwrap();
        assert_eq!(buffer.byte_count(), 0);

        buffer.write(packet(3)).unwrap();
        buffer.frame_complete(Idr).unwrap();
        assert_eq!(buffer.byte_count(), 376);

        let file = buffer
            .rotate(&RolloverCondition::ByteCount(376))
            .unwrap()
            .expect("file ready");
        let data = contents(file);
        assert_eq!(data.len(), 376);
        assert_eq!(data[1], 1);
        assert_eq!(data[189], 2);
        assert_eq!(buffer.byte_count(), 0);
        assert_eq!(buffer.age(), Duration::ZERO);
    }

    #[test]
    fn test_rotate_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer(&dir);

        buffer.write(packet(1)).unwrap();
        buffer.frame_complete(Unknown).unwrap();
        assert_eq!(buffer.byte_count(), 188);

        assert!(buffer.rotate(&RolloverCondition::ByteCount(1000)).unwrap().is_none());
        assert_eq!(buffer.byte_count(), 188);
    }

    #[test]
    fn test_rotate_on_empty_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer(&dir);

        assert!(buffer.rotate(&RolloverCondition::ByteCount(0)).unwrap().is_none());
        assert!(buffer.flush_and_rotate().unwrap().is_none());
    }

    #[test]
    fn test_flush_and_rotate_takes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer(&dir);

        buffer.write(packet(1)).unwrap();
        buffer.frame_complete(NonIdr).unwrap();
        buffer.write(packet(2)).unwrap();

        let file = buffer.flush_and_rotate().unwrap().expect("file");
        assert_eq!(contents(file).len(), 376);
        assert!(buffer.flush_and_rotate().unwrap().is_none());

        let stats = buffer.stats();
        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.bytes_written, 376);
        assert_eq!(stats.files_written, 1);
    }

    #[test]
    fn test_incomplete_ceiling_forces_flush() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = PacketBuffer::new(BufferConfig {
            max_incomplete_frame_bytes: 400,
            temp_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        });

        buffer.write(packet(1)).unwrap();
        buffer.write(packet(2)).unwrap();
        assert_eq!(buffer.byte_count(), 0);
        buffer.write(packet(3)).unwrap();
        assert_eq!(buffer.byte_count(), 564);
    }

    #[test]
    fn test_age_tracks_file_creation() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer(&dir);
        assert_eq!(buffer.age(), Duration::ZERO);

        buffer.write(packet(1)).unwrap();
        buffer.frame_complete(Unknown).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(buffer.age() >= Duration::from_millis(5));
        assert!(buffer
            .rotate(&RolloverCondition::ElapsedTime(Duration::from_millis(5)))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_empty_packets_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer(&dir);

        buffer.write(Bytes::new()).unwrap();
        assert_eq!(buffer.stats().packets_received, 0);
    }

    #[test]
    fn test_empty_frames_create_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer(&dir);

        buffer.frame_complete(Unknown).unwrap();
        buffer.frame_complete(Unknown).unwrap();
        assert_eq!(buffer.age(), Duration::ZERO);
        assert!(buffer.flush_and_rotate().unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        buffer.write(packet(1)).unwrap();
        buffer.frame_complete(Unknown).unwrap();
        assert_eq!(buffer.byte_count(), 188);
    }

    #[test]
    fn test_reset_discards_state() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer(&dir);

        buffer.write(packet(1)).unwrap();
        buffer.frame_complete(Unknown).unwrap();
        buffer.write(packet(2)).unwrap();
        buffer.reset();

        assert_eq!(buffer.byte_count(), 0);
        assert!(buffer.flush_and_rotate().unwrap().is_none());
        assert_eq!(buffer.stats().packets_received, 2);
    }

    #[test]
    fn test_concurrent_writers() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let buffer = Arc::new(buffer(&dir));
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        buffer.write(packet(t)).unwrap();
                        buffer.frame_complete(Unknown).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(buffer.byte_count(), 100 * 188);
        let file = buffer.flush_and_rotate().unwrap().unwrap();
        assert_eq!(contents(file).len(), 100 * 188);
    }
}
