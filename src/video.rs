// src/video.rs
//
// One recorded video file: immutable clip metadata plus the decoder handle.
// Wall-clock start times come from a `_YYYY-MM-DD_HH-MM-SS` pattern in the
// filename. Container-reported frame counts are unreliable near the tail,
// so the real count is probed by decoding around the reported boundary.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst};
use opencv::{imgproc, Error as OpencvError};
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

static FILENAME_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"_(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})").expect("pattern is valid")
});

const FILENAME_DATETIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("could not open video {0}")]
    Open(PathBuf),

    #[error("video {0} reports no usable frame rate")]
    InvalidFrameRate(PathBuf),

    #[error("frame count of {0} could not be discovered near the reported boundary")]
    FrameCountUndiscoverable(PathBuf),

    #[error("frame {frame_number} not found in video {video}")]
    FrameNotFound { frame_number: i64, video: String },

    #[error("decoder error: {0}")]
    Decoder(#[from] OpencvError),
}

/// Wall-clock start time parsed from the filename, unix seconds. Files
/// without the timestamp pattern start at the epoch.
pub fn start_time_from_filename(file: &Path) -> f64 {
    let name = file.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let Some(captures) = FILENAME_TIMESTAMP.captures(name) else {
        return 0.0;
    };
    match NaiveDateTime::parse_from_str(&captures[1], FILENAME_DATETIME_FORMAT) {
        Ok(datetime) => datetime.and_utc().timestamp() as f64,
        Err(_) => {
            warn!("Unparseable timestamp in video filename {name}");
            0.0
        }
    }
}

/// Immutable description of one clip, separate from its decoder so the
/// timeline arithmetic can work on plain numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    pub file: PathBuf,
    pub name: String,
    pub frame_rate: f64,
    pub frame_count: i64,
    pub start_timestamp: f64,
}

impl ClipInfo {
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.frame_rate
    }

    pub fn end_timestamp(&self) -> f64 {
        self.start_timestamp + self.duration()
    }

    pub fn includes_timestamp(&self, unix_timestamp: f64) -> bool {
        self.start_timestamp <= unix_timestamp && unix_timestamp <= self.end_timestamp()
    }

    pub fn timestamp_for_frame(&self, frame_number: i64) -> f64 {
        self.start_timestamp + frame_number as f64 / self.frame_rate
    }

    /// Nearest frame index for a covered timestamp, clamped to the last
    /// valid index at the very end of the clip.
    pub fn frame_for_timestamp(&self, unix_timestamp: f64) -> i64 {
        let frame = ((unix_timestamp - self.start_timestamp) * self.frame_rate).round() as i64;
        frame.min(self.frame_count - 1).max(0)
    }
}

/// A decoded frame handed to the presentation layer, RGB byte order.
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub frame_number: i64,
    pub unix_timestamp: f64,
    pub video_name: String,
}

/// A clip with its decoder handle. The handle keeps a cursor of the next
/// frame a bare read would produce; requests matching the cursor read
/// sequentially, everything else reseeks first. Reseeking is far more
/// expensive, and stepping frame by frame is the dominant access pattern
/// while scrubbing.
pub struct VideoClip {
    info: ClipInfo,
    cap: VideoCapture,
    next_frame: i64,
    width: i32,
    height: i32,
}

impl VideoClip {
    pub fn open(file: &Path, probe_window: i64) -> Result<Self, VideoError> {
        let path_str = file
            .to_str()
            .ok_or_else(|| VideoError::Open(file.to_path_buf()))?;
        let mut cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            return Err(VideoError::Open(file.to_path_buf()));
        }

        let frame_rate = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        if frame_rate <= 0.0 {
            return Err(VideoError::InvalidFrameRate(file.to_path_buf()));
        }
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        let reported = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i64;
        let frame_count = discover_frame_count(&mut cap, file, reported, probe_window)?;
        if frame_count != reported {
            debug!(
                "Container of {} reports {} frames, {} decodable",
                file.display(),
                reported,
                frame_count
            );
        }

        // Probing moved the cursor; rewind for the first real read.
        VideoCaptureTrait::set(&mut cap, videoio::CAP_PROP_POS_FRAMES, 0.0)?;

        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path_str)
            .to_string();
        let info = ClipInfo {
            file: file.to_path_buf(),
            name,
            frame_rate,
            frame_count,
            start_timestamp: start_time_from_filename(file),
        };
        info!(
            "Opened video {} ({}x{} @ {:.2} fps, {} frames)",
            file.display(),
            width,
            height,
            frame_rate,
            frame_count
        );

        Ok(Self {
            info,
            cap,
            next_frame: 0,
            width,
            height,
        })
    }

    pub fn info(&self) -> &ClipInfo {
        &self.info
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Decode the frame at `frame_number`.
    pub fn read_frame(&mut self, frame_number: i64) -> Result<VideoFrame, VideoError> {
        if frame_number < 0 || frame_number >= self.info.frame_count {
            return Err(VideoError::FrameNotFound {
                frame_number,
                video: self.info.name.clone(),
            });
        }

        if frame_number != self.next_frame {
            VideoCaptureTrait::set(
                &mut self.cap,
                videoio::CAP_PROP_POS_FRAMES,
                frame_number as f64,
            )?;
            self.next_frame = frame_number;
        }

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Err(VideoError::FrameNotFound {
                frame_number,
                video: self.info.name.clone(),
            });
        }
        self.next_frame = frame_number + 1;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let data = rgb.data_bytes()?.to_vec();

        Ok(VideoFrame {
            data,
            width: self.width,
            height: self.height,
            frame_number,
            unix_timestamp: self.info.timestamp_for_frame(frame_number),
            video_name: self.info.name.clone(),
        })
    }
}

/// Walk backwards from just past the reported count and keep the last index
/// that actually decodes.
fn discover_frame_count(
    cap: &mut VideoCapture,
    file: &Path,
    reported: i64,
    probe_window: i64,
) -> Result<i64, VideoError> {
    let upper = reported + probe_window;
    let lower = (reported - probe_window).max(0);
    for candidate in (lower..=upper).rev() {
        VideoCaptureTrait::set(cap, videoio::CAP_PROP_POS_FRAMES, candidate as f64)?;
        let mut mat = Mat::default();
        if VideoCaptureTrait::read(cap, &mut mat)? && !mat.empty() {
            return Ok(candidate + 1);
        }
    }
    Err(VideoError::FrameCountUndiscoverable(file.to_path_buf()))
}
