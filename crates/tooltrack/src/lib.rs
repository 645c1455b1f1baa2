//! Real-time tracking of a rigid four-point marker tool.
//!
//! Each frame flows through:
//! - a [`DetectorAdapter`] producing candidate points,
//! - correspondence resolution (fast predictive path, exhaustive recovery),
//! - the four-point pose solver from `tooltrack-core`,
//! - the [`TrackingSession`] state update,
//! - [`FrameMetrics`] for rate, latency, jitter and displacement.
//!
//! ```no_run
//! use tooltrack::{Recording, RecordingDetector, Tracker, TrackerParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let recording = Recording::load_json("session.json")?;
//! let params = TrackerParams::default();
//! let mut detector = RecordingDetector::new(params.min_confidence);
//! let mut tracker = Tracker::new(params)?;
//! let mut reports = Vec::new();
//! tracker.run(
//!     &mut recording.source(),
//!     &mut detector,
//!     &mut reports,
//!     &mut recording.zero_schedule(),
//! )?;
//! # Ok(())
//! # }
//! ```

mod correspondence;
mod detection;
mod error;
mod io;
mod metrics;
mod params;
mod session;
mod smoother;
pub mod synthetic;
mod tracker;

pub use correspondence::{
    match_predicted, resolve_fast, resolve_recovery, Correspondence, FastResolution,
    RecoveryResolution,
};
pub use detection::{DetectionSet, DetectorAdapter, FrameSource, ImageFrame, RawDetection};
pub use error::{ResolveFailure, TrackError};
pub use io::{
    write_reports, RecordedFrame, Recording, RecordingDetector, RecordingSource, ReplayFrame,
    ZeroSchedule,
};
pub use metrics::{
    FrameMetrics, FrameReport, FrameTiming, PoseMetrics, MIN_FRAME_SECONDS, TABLE_HEADER,
};
pub use params::{ConfigError, TrackerConfig, TrackerParams, MAX_RECOVERY_CANDIDATES};
pub use session::{FrameOutcome, ResolutionPath, TrackingMode, TrackingSession, ZeroReference};
pub use smoother::SmoothedPointCache;
pub use tracker::{Command, ConsoleSink, Control, ReportSink, RunSummary, Tracker};

pub use tooltrack_core::{CameraModel, MarkerGeometry, Pose, MARKER_POINTS};
