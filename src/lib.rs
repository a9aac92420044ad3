//! Manual ground-truth annotation engine for validating automated traffic
//! counts.
//!
//! An analyst steps through one or more video recordings and clicks where a
//! road user crosses operator-defined counting sections. This crate is the
//! data engine underneath that workflow: section hit-testing, the annotation
//! lifecycle from first click to classified count, an id-allocating count
//! repository with merge support, the compressed event file format, and a
//! timeline that stitches the loaded clips into one seekable time axis.
//! Windowing, key bindings, frame compositing and argument parsing live in
//! the embedding application.

mod config;
pub mod classes;
pub mod count;
pub mod event;
pub mod event_file;
pub mod geometry;
pub mod logging;
pub mod section;
pub mod session;
pub mod timeline;
pub mod types;
pub mod video;

pub use classes::{ClassCatalogError, RoadUserCatalog, RoadUserClass};
pub use count::{ActiveCount, Count, CountError, CountRepository};
pub use event::{CrossingEvent, EventKind, TaggedEvent};
pub use event_file::{read_event_file, write_event_file, EventFileError};
pub use section::{AmbiguousSectionError, LineSection, SectionFileError, SectionRepository};
pub use session::{
    AnnotationSession, ClickError, ClickOutcome, EventImportPreview, FramePosition,
};
pub use timeline::{ClipSequence, FrameAddress, Timeline, TimelineError};
pub use types::{Config, Coordinate};
pub use video::{ClipInfo, VideoClip, VideoError, VideoFrame};
