// src/session.rs
//
// Entrypoint for calls from the presentation layer. Owns every repository of
// one annotation session and coordinates clicks, classification, finishing,
// import/export and timeline navigation. All state lives here; nothing is
// shared across sessions.

use crate::classes::{RoadUserCatalog, RoadUserClass};
use crate::count::{ActiveCount, Count, CountError, CountRepository};
use crate::event::{CrossingEvent, EventKind, TaggedEvent};
use crate::event_file::{read_event_file, write_event_file};
use crate::section::{parse_flow_file, AmbiguousSectionError, SectionRepository};
use crate::timeline::{Timeline, TimelineError};
use crate::types::{Config, Coordinate};
use crate::video::VideoFrame;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// What a click ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// No active annotation existed; the click started one.
    NewCount,
    /// The click extended (or corrected) the active annotation.
    EventAdded,
    /// The click hit no section zone and was ignored.
    NoSectionHit,
}

#[derive(Error, Debug)]
pub enum ClickError {
    #[error(transparent)]
    Ambiguous(#[from] AmbiguousSectionError),

    #[error(transparent)]
    Count(#[from] CountError),
}

/// The frame the presentation layer is currently showing. Clicks are
/// interpreted against it.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePosition {
    pub video_name: String,
    pub frame_number: i64,
    pub unix_timestamp: f64,
}

impl From<&VideoFrame> for FramePosition {
    fn from(frame: &VideoFrame) -> Self {
        Self {
            video_name: frame.video_name.clone(),
            frame_number: frame.frame_number,
            unix_timestamp: frame.unix_timestamp,
        }
    }
}

/// Counts assembled from an event file, waiting for the caller to confirm
/// the merge. Nothing is mutated until `apply_import`.
#[derive(Debug)]
pub struct EventImportPreview {
    pub counts: Vec<Count>,
    pub compatible: bool,
    pub dropped_groups: usize,
    pub skipped_unknown_section: usize,
}

pub struct AnnotationSession {
    config: Config,
    classes: RoadUserCatalog,
    sections: SectionRepository,
    counts: CountRepository,
    timeline: Timeline,
    active: Option<ActiveCount>,
}

impl AnnotationSession {
    pub fn new(config: Config, classes: RoadUserCatalog) -> Self {
        Self {
            config,
            classes,
            sections: SectionRepository::new(),
            counts: CountRepository::new(),
            timeline: Timeline::new(Vec::new()),
            active: None,
        }
    }

    pub fn classes(&self) -> &RoadUserCatalog {
        &self.classes
    }

    pub fn sections(&self) -> &SectionRepository {
        &self.sections
    }

    pub fn counts(&self) -> &CountRepository {
        &self.counts
    }

    // ---- loading ----

    pub fn load_sections(&mut self, file: &Path) -> Result<()> {
        let (sections, raw_content) = parse_flow_file(file)
            .with_context(|| format!("reading sections from {}", file.display()))?;
        self.sections.clear();
        self.sections.add_all(sections);
        self.sections.set_flow_file_content(raw_content);
        info!(
            "Sections read from {}: {}",
            file.display(),
            self.sections.get_all().len()
        );
        Ok(())
    }

    pub fn load_videos(&mut self, files: &[PathBuf]) -> Result<()> {
        self.timeline = Timeline::open(files, self.config.video.frame_count_probe_window)
            .context("loading videos")?;
        info!("Videos loaded: {}", files.len());
        Ok(())
    }

    /// Parse an event file into count candidates without touching the
    /// repository. `id_suffix` distinguishes imported ids, e.g. per file.
    pub fn import_events(&self, file: &Path, id_suffix: &str) -> Result<EventImportPreview> {
        let import = read_event_file(
            file,
            &self.sections,
            &self.classes,
            &self.config.video.default_video_suffix,
        )
        .with_context(|| format!("reading events from {}", file.display()))?;
        let imported = self.counts.event_list_to_counts(&import.records, id_suffix);
        Ok(EventImportPreview {
            counts: imported.counts,
            compatible: imported.compatible,
            dropped_groups: imported.dropped_groups,
            skipped_unknown_section: import.skipped_unknown_section,
        })
    }

    /// Merge previously previewed counts. When ids collide, callers decide
    /// between replacing everything and keeping the existing counts.
    pub fn apply_import(&mut self, counts: Vec<Count>, keep_existing: bool) {
        self.counts.add_new_counts(counts, keep_existing);
    }

    pub fn save_events(&self, file: &Path) -> Result<()> {
        let event_list = self.counts.to_event_list();
        write_event_file(file, &event_list, self.sections.get_all())
            .with_context(|| format!("writing events to {}", file.display()))?;
        Ok(())
    }

    // ---- annotating ----

    /// Build the crossing event a click at `coordinate` on the shown frame
    /// would record, without recording it.
    pub fn event_for(
        &self,
        coordinate: Coordinate,
        position: &FramePosition,
    ) -> Result<Option<CrossingEvent>, AmbiguousSectionError> {
        let relative_height = self.config.annotation.relative_ellipse_height;
        let Some(section) = self.sections.get_by_coordinate(coordinate, relative_height)? else {
            return Ok(None);
        };
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        Ok(Some(CrossingEvent {
            coordinate,
            section_id: section.id.clone(),
            section_name: section.name.clone(),
            frame_number: position.frame_number,
            occurrence: position.unix_timestamp,
            video_name: position.video_name.clone(),
            time_created: Some(now),
            kind: EventKind::SectionEnter,
        }))
    }

    /// Resolve a click and feed it into the active annotation, starting one
    /// if none is open. A rejected click leaves everything untouched.
    pub fn record_click(
        &mut self,
        coordinate: Coordinate,
        position: &FramePosition,
    ) -> Result<ClickOutcome, ClickError> {
        let Some(event) = self.event_for(coordinate, position)? else {
            return Ok(ClickOutcome::NoSectionHit);
        };
        debug!(
            "Crossing event at {} frame {} ({})",
            event.section_name, event.frame_number, event.video_name
        );
        match self.active.as_mut() {
            Some(active) => {
                active.add_event(event)?;
                Ok(ClickOutcome::EventAdded)
            }
            None => {
                self.active = Some(ActiveCount::new(event));
                info!("New active count");
                Ok(ClickOutcome::NewCount)
            }
        }
    }

    pub fn active_events(&self) -> Option<&[CrossingEvent]> {
        self.active.as_ref().map(|a| a.events())
    }

    pub fn active_class_is_set(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.road_user_class().is_some())
    }

    /// Assign the class behind a hotkey to the active annotation. Returns
    /// the class when both the key and an active annotation exist.
    pub fn set_class_by_key(&mut self, key: &str) -> Option<&RoadUserClass> {
        let active = self.active.as_mut()?;
        let class = self.classes.by_key(key)?;
        active.set_road_user_class(class.clone());
        info!("Road user class: {}", class.name());
        active.road_user_class()
    }

    /// Validate and commit the active annotation. `Ok(None)` when no
    /// annotation is open; on error the active annotation stays open and
    /// unchanged.
    pub fn finish_active(&mut self) -> Result<Option<Count>, CountError> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        if active.events().len() < 2 {
            self.active = Some(active);
            return Err(CountError::TooFewEvents);
        }
        if active.road_user_class().is_none() {
            self.active = Some(active);
            return Err(CountError::MissingRoadUserClass);
        }
        let id = self.counts.next_id();
        let count = active
            .finish(id)
            .unwrap_or_else(|_| unreachable!("validated above"));
        self.counts.add(count.clone());
        info!("Active count finished as {}", count.id());
        Ok(Some(count))
    }

    /// Drop the active annotation without recording anything.
    pub fn abort_active(&mut self) {
        if self.active.take().is_some() {
            info!("Active count aborted");
        }
    }

    // ---- queries and removal ----

    pub fn all_counts(&self) -> &[Count] {
        self.counts.get_all()
    }

    pub fn count_by_id(&self, id: &str) -> Option<&Count> {
        self.counts.get(id)
    }

    pub fn counts_by_frame(&self, frame_number: i64) -> Vec<&Count> {
        self.counts.counts_by_frame(frame_number)
    }

    pub fn delete_count(&mut self, id: &str) {
        self.counts.delete(id);
    }

    pub fn delete_counts(&mut self, ids: &[String]) {
        for id in ids {
            self.counts.delete(id);
        }
    }

    pub fn clear_repositories(&mut self) {
        self.sections.clear();
        self.counts.clear();
        self.timeline = Timeline::new(Vec::new());
        self.active = None;
    }

    // ---- navigation ----

    pub fn first_frame(&mut self) -> Result<VideoFrame, TimelineError> {
        self.timeline.first_frame()
    }

    pub fn frame_by_timestamp(&mut self, unix_timestamp: f64) -> Result<VideoFrame, TimelineError> {
        self.timeline.frame_by_timestamp(unix_timestamp)
    }

    pub fn frame_by_delta(
        &mut self,
        position: &FramePosition,
        delta_frames: i64,
        delta_time: f64,
    ) -> Result<VideoFrame, TimelineError> {
        let from = self
            .timeline
            .address_of(&position.video_name, position.frame_number)?;
        self.timeline.frame_by_delta(from, delta_frames, delta_time)
    }

    /// Decode the frame a stored event was recorded on.
    pub fn frame_for_event(&mut self, event: &CrossingEvent) -> Result<VideoFrame, TimelineError> {
        let address = self
            .timeline
            .address_of(&event.video_name, event.frame_number)?;
        self.timeline.decode(address)
    }

    /// The event list a save would write, mostly useful for inspection.
    pub fn event_list(&self) -> Vec<TaggedEvent> {
        self.counts.to_event_list()
    }
}
