//! JSON recordings of detector output and report files.
//!
//! A [`Recording`] stands in for the camera and the detector: each frame
//! stores the boxes a detector emitted, so a session can be replayed
//! deterministically.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    Command, ConfigError, Control, DetectionSet, DetectorAdapter, FrameReport, FrameSource,
    ImageFrame, RawDetection, TrackError,
};

/// Detector output for one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
    /// A zero trigger arrived after this frame.
    #[serde(default)]
    pub zero: bool,
}

/// Replayable detector log for a fixed image size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub image_width: u32,
    pub image_height: u32,
    #[serde(default)]
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Frames in order, as a capture source.
    pub fn source(&self) -> RecordingSource<'_> {
        RecordingSource {
            recording: self,
            next: 0,
        }
    }

    /// Zero triggers stored in the recording, as a loop control.
    pub fn zero_schedule(&self) -> ZeroSchedule {
        ZeroSchedule {
            frames: self
                .frames
                .iter()
                .enumerate()
                .filter(|(_, f)| f.zero)
                .map(|(i, _)| i as u64)
                .collect(),
        }
    }
}

/// Borrowed view of one recorded frame.
#[derive(Clone, Copy, Debug)]
pub struct ReplayFrame<'a> {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub frame: &'a RecordedFrame,
}

impl ImageFrame for ReplayFrame<'_> {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub struct RecordingSource<'a> {
    recording: &'a Recording,
    next: usize,
}

impl<'a> FrameSource for RecordingSource<'a> {
    type Frame = ReplayFrame<'a>;

    fn next_frame(&mut self) -> Result<Option<Self::Frame>, TrackError> {
        let Some(frame) = self.recording.frames.get(self.next) else {
            return Ok(None);
        };
        let out = ReplayFrame {
            index: self.next,
            width: self.recording.image_width,
            height: self.recording.image_height,
            frame,
        };
        self.next += 1;
        Ok(Some(out))
    }
}

/// Replays the recorded boxes, applying the confidence threshold.
#[derive(Clone, Copy, Debug)]
pub struct RecordingDetector {
    pub min_confidence: f64,
}

impl RecordingDetector {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }
}

impl<'a> DetectorAdapter<ReplayFrame<'a>> for RecordingDetector {
    fn detect(&mut self, frame: &ReplayFrame<'a>) -> Result<DetectionSet, TrackError> {
        DetectionSet::from_raw(&frame.frame.detections, self.min_confidence)
    }
}

/// Issues a zero trigger after each listed frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZeroSchedule {
    pub frames: Vec<u64>,
}

impl Control for ZeroSchedule {
    fn commands(&mut self, completed_frame: u64) -> Vec<Command> {
        if self.frames.contains(&completed_frame) {
            vec![Command::Zero]
        } else {
            Vec::new()
        }
    }
}

/// Write the full report list as pretty JSON.
pub fn write_reports(path: impl AsRef<Path>, reports: &[FrameReport]) -> Result<(), TrackError> {
    let json = serde_json::to_string_pretty(reports)?;
    fs::write(path, json)?;
    Ok(())
}
