//! Synchronous frame loop around a [`TrackingSession`].

use std::io::Write;
use std::time::Instant;

use log::{debug, info};
use tooltrack_core::CameraModel;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    ConfigError, DetectorAdapter, FrameMetrics, FrameReport, FrameSource, FrameTiming,
    ImageFrame, TrackError, TrackerParams, TrackingSession, ZeroReference, TABLE_HEADER,
};

/// External commands, applied between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Zero,
    ClearZero,
    Stop,
}

/// Source of external commands, polled after every frame.
pub trait Control {
    fn commands(&mut self, completed_frame: u64) -> Vec<Command>;
}

impl<T> Control for T
where
    T: FnMut(u64) -> Vec<Command>,
{
    fn commands(&mut self, completed_frame: u64) -> Vec<Command> {
        self(completed_frame)
    }
}

/// Consumer of the per-frame reports.
pub trait ReportSink {
    fn emit(&mut self, report: &FrameReport) -> Result<(), TrackError>;
}

impl ReportSink for Vec<FrameReport> {
    fn emit(&mut self, report: &FrameReport) -> Result<(), TrackError> {
        self.push(report.clone());
        Ok(())
    }
}

impl<A: ReportSink, B: ReportSink> ReportSink for (A, B) {
    fn emit(&mut self, report: &FrameReport) -> Result<(), TrackError> {
        self.0.emit(report)?;
        self.1.emit(report)
    }
}

/// Writes the console table, or one JSON object per line.
pub struct ConsoleSink<W: Write> {
    out: W,
    json: bool,
    header_written: bool,
}

impl<W: Write> ConsoleSink<W> {
    pub fn table(out: W) -> Self {
        Self {
            out,
            json: false,
            header_written: false,
        }
    }

    pub fn json_lines(out: W) -> Self {
        Self {
            out,
            json: true,
            header_written: false,
        }
    }
}

impl<W: Write> ReportSink for ConsoleSink<W> {
    fn emit(&mut self, report: &FrameReport) -> Result<(), TrackError> {
        if self.json {
            serde_json::to_writer(&mut self.out, report)?;
            writeln!(self.out)?;
            return Ok(());
        }
        if !self.header_written {
            writeln!(self.out, "{TABLE_HEADER}")?;
            writeln!(self.out, "{}", "-".repeat(TABLE_HEADER.len()))?;
            self.header_written = true;
        }
        writeln!(self.out, "{}", report.table_row())?;
        Ok(())
    }
}

/// Totals for one [`Tracker::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub poses: u64,
}

/// Owns the parameters and the session; processes one frame at a time.
#[derive(Clone, Debug)]
pub struct Tracker {
    params: TrackerParams,
    session: TrackingSession,
    frames: u64,
}

impl Tracker {
    pub fn new(params: TrackerParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            session: TrackingSession::new(),
            frames: 0,
        })
    }

    #[inline]
    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    #[inline]
    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    /// Number of frames processed so far.
    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn set_zero_reference(&mut self) -> Option<ZeroReference> {
        self.session.set_zero_reference()
    }

    pub fn clear_zero_reference(&mut self) {
        self.session.clear_zero_reference();
    }

    /// Detect, resolve and measure one frame.
    pub fn process_frame<F, D>(
        &mut self,
        frame: &F,
        detector: &mut D,
    ) -> Result<FrameMetrics, TrackError>
    where
        F: ImageFrame,
        D: DetectorAdapter<F> + ?Sized,
    {
        self.process_since(Instant::now(), frame, detector)
    }

    /// Process frames until the source ends or a [`Command::Stop`] arrives.
    ///
    /// Frame time includes capture. Unexpected errors end the run.
    pub fn run<S, D, K, C>(
        &mut self,
        source: &mut S,
        detector: &mut D,
        sink: &mut K,
        control: &mut C,
    ) -> Result<RunSummary, TrackError>
    where
        S: FrameSource + ?Sized,
        D: DetectorAdapter<S::Frame> + ?Sized,
        K: ReportSink + ?Sized,
        C: Control + ?Sized,
    {
        let mut summary = RunSummary::default();
        loop {
            let started = Instant::now();
            let Some(frame) = source.next_frame()? else {
                debug!("source exhausted after {} frames", summary.frames);
                break;
            };
            let index = self.frames;
            let metrics = self.process_since(started, &frame, detector)?;
            let report = metrics.report(index);
            sink.emit(&report)?;

            summary.frames += 1;
            if report.has_pose() {
                summary.poses += 1;
            }

            let mut stop = false;
            for command in control.commands(index) {
                match command {
                    Command::Zero => {
                        self.set_zero_reference();
                    }
                    Command::ClearZero => self.clear_zero_reference(),
                    Command::Stop => stop = true,
                }
            }
            if stop {
                info!("stop requested after frame {index}");
                break;
            }
        }
        Ok(summary)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(frame = self.frames))
    )]
    fn process_since<F, D>(
        &mut self,
        started: Instant,
        frame: &F,
        detector: &mut D,
    ) -> Result<FrameMetrics, TrackError>
    where
        F: ImageFrame,
        D: DetectorAdapter<F> + ?Sized,
    {
        let (width, height) = frame.dimensions();
        let camera = CameraModel::from_image_size(width, height, self.params.focal_factor)?;

        let detect_started = Instant::now();
        let detections = detector.detect(frame)?;
        let detector_time = detect_started.elapsed();

        let previous_position = self.session.last_position();
        let session = std::mem::take(&mut self.session);
        let (session, outcome) =
            session.step(&detections, &camera, &self.params.marker, &self.params);
        self.session = session;
        self.frames += 1;

        let timing = FrameTiming {
            total: started.elapsed(),
            detector: detector_time,
        };
        Ok(FrameMetrics::compute(
            &timing,
            &outcome,
            previous_position,
            self.session.zero_reference(),
        ))
    }
}
