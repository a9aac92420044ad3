// src/timeline.rs
//
// Stitches the loaded clips into one seekable time axis. Navigation is
// stateless: callers hand in where they are and get back where they land,
// the timeline itself keeps no cursor. Frame deltas carry across clip
// boundaries and clamp at the ends of the sequence.

use crate::video::{ClipInfo, VideoClip, VideoError, VideoFrame};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("no videos loaded")]
    NoVideos,

    #[error("timestamp {0} is not covered by any loaded video")]
    TimestampNotCovered(f64),

    #[error("no loaded video is named {0}")]
    UnknownVideo(String),

    #[error(transparent)]
    Video(#[from] VideoError),
}

/// A position on the timeline: which clip, which frame within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAddress {
    pub clip: usize,
    pub frame_number: i64,
}

/// The pure arithmetic over the ordered clip metadata. Separate from the
/// decoders so boundary behavior is checkable on plain numbers.
#[derive(Debug, Clone, Default)]
pub struct ClipSequence {
    infos: Vec<ClipInfo>,
}

impl ClipSequence {
    pub fn new(infos: Vec<ClipInfo>) -> Self {
        Self { infos }
    }

    pub fn infos(&self) -> &[ClipInfo] {
        &self.infos
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// The clip whose wall-clock interval contains the timestamp, and the
    /// nearest frame inside it.
    pub fn locate_timestamp(&self, unix_timestamp: f64) -> Result<FrameAddress, TimelineError> {
        if self.infos.is_empty() {
            return Err(TimelineError::NoVideos);
        }
        for (clip, info) in self.infos.iter().enumerate() {
            if info.includes_timestamp(unix_timestamp) {
                return Ok(FrameAddress {
                    clip,
                    frame_number: info.frame_for_timestamp(unix_timestamp),
                });
            }
        }
        Err(TimelineError::TimestampNotCovered(unix_timestamp))
    }

    /// Move by a number of frames and/or seconds from a position. The time
    /// delta converts to frames at the current clip's rate. Underflow and
    /// overflow carry into neighbouring clips; the sequence ends clamp.
    pub fn shift(
        &self,
        from: FrameAddress,
        delta_frames: i64,
        delta_time: f64,
    ) -> Result<FrameAddress, TimelineError> {
        if self.infos.is_empty() {
            return Err(TimelineError::NoVideos);
        }
        let mut clip = from.clip.min(self.infos.len() - 1);
        let frames_from_time = (delta_time * self.infos[clip].frame_rate).round() as i64;
        let mut frame_number = from.frame_number + delta_frames + frames_from_time;

        // Each pass moves exactly one clip in one direction, so this ends
        // after at most one pass per clip.
        loop {
            if frame_number < 0 {
                if clip == 0 {
                    debug!("Delta navigation clamped at sequence start");
                    return Ok(FrameAddress {
                        clip: 0,
                        frame_number: 0,
                    });
                }
                clip -= 1;
                frame_number += self.infos[clip].frame_count;
            } else if frame_number >= self.infos[clip].frame_count {
                if clip == self.infos.len() - 1 {
                    debug!("Delta navigation clamped at sequence end");
                    return Ok(FrameAddress {
                        clip,
                        frame_number: self.infos[clip].frame_count - 1,
                    });
                }
                frame_number -= self.infos[clip].frame_count;
                clip += 1;
            } else {
                return Ok(FrameAddress { clip, frame_number });
            }
        }
    }

    /// Find a clip by its file name (with or without extension).
    pub fn index_by_name(&self, video_name: &str) -> Option<usize> {
        self.infos.iter().position(|info| {
            info.name == video_name
                || Path::new(&info.name)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem == video_name)
        })
    }

    pub fn timestamp_at(&self, address: FrameAddress) -> Option<f64> {
        self.infos
            .get(address.clip)
            .map(|info| info.timestamp_for_frame(address.frame_number))
    }
}

/// The clip sequence plus its decoders.
pub struct Timeline {
    clips: Vec<VideoClip>,
    sequence: ClipSequence,
}

impl Timeline {
    pub fn new(clips: Vec<VideoClip>) -> Self {
        let sequence = ClipSequence::new(clips.iter().map(|c| c.info().clone()).collect());
        Self { clips, sequence }
    }

    /// Open all files in the given order.
    pub fn open(files: &[PathBuf], probe_window: i64) -> Result<Self, VideoError> {
        let mut clips = Vec::with_capacity(files.len());
        for file in files {
            clips.push(VideoClip::open(file, probe_window)?);
        }
        Ok(Self::new(clips))
    }

    pub fn sequence(&self) -> &ClipSequence {
        &self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn decode(&mut self, address: FrameAddress) -> Result<VideoFrame, TimelineError> {
        let clip = self
            .clips
            .get_mut(address.clip)
            .ok_or(TimelineError::NoVideos)?;
        Ok(clip.read_frame(address.frame_number)?)
    }

    pub fn first_frame(&mut self) -> Result<VideoFrame, TimelineError> {
        if self.clips.is_empty() {
            return Err(TimelineError::NoVideos);
        }
        self.decode(FrameAddress {
            clip: 0,
            frame_number: 0,
        })
    }

    pub fn frame_by_timestamp(&mut self, unix_timestamp: f64) -> Result<VideoFrame, TimelineError> {
        let address = self.sequence.locate_timestamp(unix_timestamp)?;
        self.decode(address)
    }

    pub fn frame_by_delta(
        &mut self,
        from: FrameAddress,
        delta_frames: i64,
        delta_time: f64,
    ) -> Result<VideoFrame, TimelineError> {
        let address = self.sequence.shift(from, delta_frames, delta_time)?;
        self.decode(address)
    }

    /// Address of a frame identified by video name, e.g. to jump to a
    /// stored event.
    pub fn address_of(
        &self,
        video_name: &str,
        frame_number: i64,
    ) -> Result<FrameAddress, TimelineError> {
        let clip = self
            .sequence
            .index_by_name(video_name)
            .ok_or_else(|| TimelineError::UnknownVideo(video_name.to_string()))?;
        Ok(FrameAddress { clip, frame_number })
    }
}
