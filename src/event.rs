// src/event.rs
//
// A crossing event is one recorded click: which section, where, when, and in
// which source video. Events live inside the active annotation or a finished
// count; the tagged variant additionally carries the road user id and class
// needed by the event file format.

use crate::classes::RoadUserClass;
use crate::types::Coordinate;
use chrono::DateTime;

pub const SECTION_ENTER: &str = "section-enter";

/// Kind of a crossing event. Only entering a section is recorded by this
/// tool; the variant exists because event files from the automated pipeline
/// carry other kinds that have to be recognized and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SectionEnter,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SectionEnter => SECTION_ENTER,
        }
    }
}

/// One recorded section crossing.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingEvent {
    pub coordinate: Coordinate,
    pub section_id: String,
    pub section_name: String,
    pub frame_number: i64,
    /// Unix timestamp of the frame the click was placed on, seconds.
    pub occurrence: f64,
    pub video_name: String,
    /// Unix timestamp of when the analyst created the event, seconds.
    pub time_created: Option<f64>,
    pub kind: EventKind,
}

impl CrossingEvent {
    /// Occurrence rendered as `mm-dd HH:MM:SS` for list displays.
    pub fn occurrence_as_str(&self) -> String {
        match DateTime::from_timestamp(self.occurrence as i64, 0) {
            Some(datetime) => datetime.format("%m-%d %H:%M:%S").to_string(),
            None => format!("{:.0}", self.occurrence),
        }
    }
}

/// A crossing event joined with the road user it belongs to, the shape the
/// event file stores and the import grouping works on.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub event: CrossingEvent,
    pub road_user_id: String,
    pub road_user_class: RoadUserClass,
}
