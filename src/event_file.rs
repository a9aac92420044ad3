// src/event_file.rs
//
// On-disk crossing event format: a bz2-compressed JSON document with a
// metadata block, a snapshot of the section catalog, and the event list.
// Two record shapes exist in the wild. Files written by the automated
// pipeline tag every record with an event type; older ground-truth files
// omit it and hold enter events only. The shape is decided once per file,
// not per record.

use crate::classes::RoadUserCatalog;
use crate::event::{CrossingEvent, EventKind, TaggedEvent, SECTION_ENTER};
use crate::section::{LineSection, SectionRepository, SECTION_TYPE_LINE};
use crate::types::Coordinate;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Canonical ground-truth suffix.
pub const GROUND_TRUTH_SUFFIX: &str = "otgtevents";
/// Raw event files produced by the automated pipeline.
pub const PIPELINE_EVENTS_SUFFIX: &str = "otevents";

const OCCURRENCE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Error, Debug)]
pub enum EventFileError {
    #[error("unsupported event file type: {0}")]
    UnsupportedFileType(String),

    #[error("failed to read event file: {0}")]
    Io(#[from] std::io::Error),

    #[error("event file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event record {index} is malformed: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("event record {index} references unknown road user class '{name}'")]
    UnknownClass { index: usize, name: String },
}

/// Which of the two legacy record shapes a file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordShape {
    /// Every record carries an `event_type` field.
    WithKind,
    /// No `event_type`; every record is an enter event.
    Legacy,
}

/// Result of parsing an event file. Records referencing unknown sections are
/// dropped and counted instead of failing the whole load.
#[derive(Debug)]
pub struct EventFileImport {
    pub records: Vec<TaggedEvent>,
    pub skipped_unknown_section: usize,
}

#[derive(Deserialize)]
struct EventDocument {
    #[serde(default)]
    event_list: Vec<RawEventRecord>,
}

#[derive(Deserialize)]
struct RawEventRecord {
    event_coordinate: Option<[f64; 2]>,
    section_id: Option<String>,
    event_type: Option<String>,
    frame_number: Option<i64>,
    occurrence: Option<OccurrenceValue>,
    video_name: Option<String>,
    #[serde(default)]
    time_created: Option<f64>,
    road_user_id: Option<RoadUserIdValue>,
    #[serde(rename = "road_user_type")]
    road_user_class: Option<String>,
}

/// Occurrence timestamps appear either as unix seconds or as a formatted
/// calendar string, depending on which tool wrote the file.
#[derive(Deserialize)]
#[serde(untagged)]
enum OccurrenceValue {
    Unix(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoadUserIdValue {
    Number(i64),
    Text(String),
}

impl RoadUserIdValue {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

pub fn is_supported_event_file(file: &Path) -> bool {
    matches!(
        file.extension().and_then(|e| e.to_str()),
        Some(GROUND_TRUTH_SUFFIX) | Some(PIPELINE_EVENTS_SUFFIX)
    )
}

/// Parse an event file against the live section and class catalogs.
pub fn read_event_file(
    file: &Path,
    sections: &SectionRepository,
    classes: &RoadUserCatalog,
    default_video_suffix: &str,
) -> Result<EventFileImport, EventFileError> {
    if !is_supported_event_file(file) {
        return Err(EventFileError::UnsupportedFileType(
            file.display().to_string(),
        ));
    }

    let compressed = fs::read(file)?;
    let mut contents = Vec::new();
    BzDecoder::new(&compressed[..]).read_to_end(&mut contents)?;
    let document: EventDocument = serde_json::from_slice(&contents)?;

    let shape = match document.event_list.first() {
        Some(first) if first.event_type.is_some() => RecordShape::WithKind,
        _ => RecordShape::Legacy,
    };

    let mut records = Vec::with_capacity(document.event_list.len());
    let mut skipped_unknown_section = 0usize;

    for (index, raw) in document.event_list.into_iter().enumerate() {
        if shape == RecordShape::WithKind {
            let kind = raw
                .event_type
                .as_deref()
                .ok_or_else(|| malformed(index, "missing event_type"))?;
            if kind != SECTION_ENTER {
                continue;
            }
        }

        let section_id = raw
            .section_id
            .ok_or_else(|| malformed(index, "missing section_id"))?;
        let section = match sections.get(&section_id) {
            Some(section) => section,
            None => {
                skipped_unknown_section += 1;
                continue;
            }
        };

        let [x, y] = raw
            .event_coordinate
            .ok_or_else(|| malformed(index, "missing event_coordinate"))?;
        let occurrence = match raw
            .occurrence
            .ok_or_else(|| malformed(index, "missing occurrence"))?
        {
            OccurrenceValue::Unix(seconds) => seconds,
            OccurrenceValue::Text(text) => parse_occurrence_text(&text)
                .ok_or_else(|| malformed(index, "unparseable occurrence"))?,
        };
        let video_name = raw
            .video_name
            .ok_or_else(|| malformed(index, "missing video_name"))?;
        let video_name = ensure_video_suffix(video_name, default_video_suffix);
        let frame_number = raw
            .frame_number
            .ok_or_else(|| malformed(index, "missing frame_number"))?;
        let class_name = raw
            .road_user_class
            .ok_or_else(|| malformed(index, "missing road_user_type"))?;
        let road_user_class =
            classes
                .by_name(&class_name)
                .cloned()
                .ok_or(EventFileError::UnknownClass {
                    index,
                    name: class_name,
                })?;
        let road_user_id = raw
            .road_user_id
            .ok_or_else(|| malformed(index, "missing road_user_id"))?
            .into_string();

        records.push(TaggedEvent {
            event: CrossingEvent {
                coordinate: Coordinate::new(x.round() as i32, y.round() as i32),
                section_id,
                section_name: section.name.clone(),
                frame_number,
                occurrence,
                video_name,
                time_created: raw.time_created,
                kind: EventKind::SectionEnter,
            },
            road_user_id,
            road_user_class,
        });
    }

    if skipped_unknown_section > 0 {
        warn!(
            "Dropped {} events referencing unknown sections from {}",
            skipped_unknown_section,
            file.display()
        );
    }
    info!("Parsed {} events from {}", records.len(), file.display());

    Ok(EventFileImport {
        records,
        skipped_unknown_section,
    })
}

fn malformed(index: usize, reason: &str) -> EventFileError {
    EventFileError::MalformedRecord {
        index,
        reason: reason.to_string(),
    }
}

fn parse_occurrence_text(text: &str) -> Option<f64> {
    let datetime = NaiveDateTime::parse_from_str(text, OCCURRENCE_DATETIME_FORMAT).ok()?;
    Some(datetime.and_utc().timestamp_micros() as f64 / 1_000_000.0)
}

fn ensure_video_suffix(video_name: String, default_suffix: &str) -> String {
    if Path::new(&video_name).extension().is_some() {
        video_name
    } else {
        format!("{video_name}{default_suffix}")
    }
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    metadata: MetadataOut,
    sections: Vec<SectionOut<'a>>,
    event_list: Vec<EventOut<'a>>,
}

#[derive(Serialize)]
struct MetadataOut {
    version: Option<String>,
    section_file_version: Option<String>,
    event_file_version: Option<String>,
}

#[derive(Serialize)]
struct SectionOut<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    section_type: &'static str,
    coordinates: Vec<CoordinateOut>,
}

#[derive(Serialize)]
struct CoordinateOut {
    x: i32,
    y: i32,
}

#[derive(Serialize)]
struct EventOut<'a> {
    event_coordinate: [i32; 2],
    section_id: &'a str,
    event_type: &'static str,
    frame_number: i64,
    occurrence: f64,
    video_name: &'a str,
    time_created: Option<f64>,
    road_user_id: &'a str,
    road_user_type: &'a str,
    direction_vector: Option<()>,
}

/// Serialize events together with the current section catalog snapshot.
/// The document is compressed and written in one atomic step so events and
/// the sections they reference cannot diverge on disk.
pub fn write_event_file(
    file: &Path,
    records: &[TaggedEvent],
    sections: &[LineSection],
) -> Result<(), EventFileError> {
    let document = DocumentOut {
        metadata: MetadataOut {
            version: None,
            section_file_version: None,
            event_file_version: None,
        },
        sections: sections
            .iter()
            .map(|s| SectionOut {
                id: &s.id,
                name: &s.name,
                section_type: SECTION_TYPE_LINE,
                coordinates: s
                    .coordinates
                    .iter()
                    .map(|c| CoordinateOut { x: c.x, y: c.y })
                    .collect(),
            })
            .collect(),
        event_list: records
            .iter()
            .map(|r| EventOut {
                event_coordinate: [r.event.coordinate.x, r.event.coordinate.y],
                section_id: &r.event.section_id,
                event_type: r.event.kind.as_str(),
                frame_number: r.event.frame_number,
                occurrence: r.event.occurrence,
                video_name: &r.event.video_name,
                time_created: r.event.time_created,
                road_user_id: &r.road_user_id,
                road_user_type: r.road_user_class.name(),
                direction_vector: None,
            })
            .collect(),
    };

    let json = serde_json::to_vec(&document)?;
    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    fs::write(file, compressed)?;
    info!("Wrote {} events to {}", records.len(), file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::RoadUserCatalog;

    const CATALOG: &str = "\
- car:
    label: Car
    short_label: Car
    key: \"1\"
    icon_file: icons/car.png
- pedestrian:
    label: Pedestrian
    short_label: Ped
    key: \"2\"
    icon_file: icons/pedestrian.png
";

    fn catalog() -> RoadUserCatalog {
        RoadUserCatalog::from_yaml_str(CATALOG).expect("valid catalog")
    }

    fn sections() -> SectionRepository {
        let mut repo = SectionRepository::new();
        repo.add_all([
            LineSection {
                id: "north".to_string(),
                name: "North".to_string(),
                coordinates: vec![Coordinate::new(0, 0), Coordinate::new(100, 0)],
            },
            LineSection {
                id: "south".to_string(),
                name: "South".to_string(),
                coordinates: vec![Coordinate::new(0, 200), Coordinate::new(100, 200)],
            },
        ]);
        repo
    }

    fn tagged(
        section_id: &str,
        road_user_id: &str,
        occurrence: f64,
        frame_number: i64,
    ) -> TaggedEvent {
        TaggedEvent {
            event: CrossingEvent {
                coordinate: Coordinate::new(50, 1),
                section_id: section_id.to_string(),
                section_name: section_name_of(section_id),
                frame_number,
                occurrence,
                video_name: "cam7_2023-04-01_07-00-00.mp4".to_string(),
                time_created: Some(occurrence + 100.0),
                kind: EventKind::SectionEnter,
            },
            road_user_id: road_user_id.to_string(),
            road_user_class: catalog().by_name("car").unwrap().clone(),
        }
    }

    fn section_name_of(id: &str) -> String {
        match id {
            "north" => "North".to_string(),
            "south" => "South".to_string(),
            other => other.to_string(),
        }
    }

    fn write_compressed_json(document: &serde_json::Value, suffix: &str) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new()
            .suffix(&format!(".{suffix}"))
            .tempfile()
            .unwrap();
        let json = serde_json::to_vec(document).unwrap();
        let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).unwrap();
        let compressed = encoder.finish().unwrap();
        fs::write(file.path(), compressed).unwrap();
        file
    }

    #[test]
    fn test_round_trip_preserves_event_multiset() {
        let file = tempfile::Builder::new()
            .suffix(".otgtevents")
            .tempfile()
            .unwrap();
        let records = vec![
            tagged("north", "1", 1_680_332_400.0, 12),
            tagged("south", "1", 1_680_332_402.5, 62),
            tagged("north", "2", 1_680_332_410.0, 212),
        ];

        write_event_file(file.path(), &records, sections().get_all()).expect("write");
        let import =
            read_event_file(file.path(), &sections(), &catalog(), ".mp4").expect("read back");

        assert_eq!(import.skipped_unknown_section, 0);
        let mut expected = records;
        let mut actual = import.records;
        let key = |r: &TaggedEvent| (r.road_user_id.clone(), r.event.occurrence.to_bits());
        expected.sort_by_key(key);
        actual.sort_by_key(key);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_unsupported_suffix_rejected() {
        let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let result = read_event_file(file.path(), &sections(), &catalog(), ".mp4");
        assert!(matches!(
            result,
            Err(EventFileError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_legacy_shape_defaults_to_enter_events() {
        let document = serde_json::json!({
            "metadata": {},
            "event_list": [{
                "event_coordinate": [10.2, 0.8],
                "section_id": "north",
                "frame_number": 5,
                "occurrence": 1_680_332_400.0,
                "video_name": "cam7",
                "road_user_id": 3,
                "road_user_type": "car"
            }]
        });
        let file = write_compressed_json(&document, PIPELINE_EVENTS_SUFFIX);

        let import = read_event_file(file.path(), &sections(), &catalog(), ".mp4").expect("parse");
        assert_eq!(import.records.len(), 1);
        let record = &import.records[0];
        assert_eq!(record.event.kind, EventKind::SectionEnter);
        assert_eq!(record.event.coordinate, Coordinate::new(10, 1));
        assert_eq!(record.event.video_name, "cam7.mp4");
        assert_eq!(record.road_user_id, "3");
    }

    #[test]
    fn test_tagged_shape_skips_non_enter_events() {
        let document = serde_json::json!({
            "event_list": [
                {
                    "event_coordinate": [10.0, 0.0],
                    "section_id": "north",
                    "event_type": "section-enter",
                    "frame_number": 5,
                    "occurrence": 1_680_332_400.0,
                    "video_name": "cam7.mp4",
                    "road_user_id": "3",
                    "road_user_type": "car"
                },
                {
                    "event_coordinate": [11.0, 0.0],
                    "section_id": "north",
                    "event_type": "section-leave",
                    "frame_number": 9,
                    "occurrence": 1_680_332_401.0,
                    "video_name": "cam7.mp4",
                    "road_user_id": "3",
                    "road_user_type": "car"
                }
            ]
        });
        let file = write_compressed_json(&document, GROUND_TRUTH_SUFFIX);

        let import = read_event_file(file.path(), &sections(), &catalog(), ".mp4").expect("parse");
        assert_eq!(import.records.len(), 1);
        assert_eq!(import.records[0].event.frame_number, 5);
    }

    #[test]
    fn test_unknown_section_dropped_and_counted() {
        let document = serde_json::json!({
            "event_list": [
                {
                    "event_coordinate": [10.0, 0.0],
                    "section_id": "demolished-gate",
                    "frame_number": 5,
                    "occurrence": 1_680_332_400.0,
                    "video_name": "cam7.mp4",
                    "road_user_id": "3",
                    "road_user_type": "car"
                },
                {
                    "event_coordinate": [11.0, 0.0],
                    "section_id": "north",
                    "frame_number": 9,
                    "occurrence": 1_680_332_401.0,
                    "video_name": "cam7.mp4",
                    "road_user_id": "3",
                    "road_user_type": "car"
                }
            ]
        });
        let file = write_compressed_json(&document, GROUND_TRUTH_SUFFIX);

        let import = read_event_file(file.path(), &sections(), &catalog(), ".mp4").expect("parse");
        assert_eq!(import.skipped_unknown_section, 1);
        assert_eq!(import.records.len(), 1);
        assert_eq!(import.records[0].event.section_id, "north");
    }

    #[test]
    fn test_calendar_string_occurrence_accepted() {
        let document = serde_json::json!({
            "event_list": [{
                "event_coordinate": [10.0, 0.0],
                "section_id": "north",
                "frame_number": 5,
                "occurrence": "2023-04-01 07:00:02.500000",
                "video_name": "cam7.mp4",
                "road_user_id": "3",
                "road_user_type": "car"
            }]
        });
        let file = write_compressed_json(&document, GROUND_TRUTH_SUFFIX);

        let import = read_event_file(file.path(), &sections(), &catalog(), ".mp4").expect("parse");
        // 2023-04-01 07:00:02.5 UTC
        assert!((import.records[0].event.occurrence - 1_680_332_402.5).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_class_is_an_error() {
        let document = serde_json::json!({
            "event_list": [{
                "event_coordinate": [10.0, 0.0],
                "section_id": "north",
                "frame_number": 5,
                "occurrence": 1_680_332_400.0,
                "video_name": "cam7.mp4",
                "road_user_id": "3",
                "road_user_type": "hovercraft"
            }]
        });
        let file = write_compressed_json(&document, GROUND_TRUTH_SUFFIX);

        let result = read_event_file(file.path(), &sections(), &catalog(), ".mp4");
        assert!(matches!(
            result,
            Err(EventFileError::UnknownClass { name, .. }) if name == "hovercraft"
        ));
    }
}
