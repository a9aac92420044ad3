// src/section.rs
//
// Operator-defined counting sections (virtual gates) and their repository.
// Sections come from a flow file authored upstream; everything in that file
// besides the sections themselves is opaque to this tool and is carried
// along verbatim so a later save can round-trip it.

use crate::geometry::SegmentEllipse;
use crate::types::Coordinate;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub const SECTION_TYPE_LINE: &str = "line";

#[derive(Error, Debug)]
pub enum SectionFileError {
    #[error("failed to read flow file: {0}")]
    Io(#[from] std::io::Error),

    #[error("flow file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported section type '{0}' (only line sections are supported)")]
    UnsupportedSectionType(String),
}

/// More than one section's click zone claims the same coordinate. Overlap is
/// a data-authoring error that has to be surfaced, not guessed around.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("coordinate lies in more than one section's click zone")]
pub struct AmbiguousSectionError;

/// A counting line the analyst places over the scene, made of one or more
/// straight segments.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSection {
    pub id: String,
    pub name: String,
    pub coordinates: Vec<Coordinate>,
}

impl LineSection {
    /// Whether any segment's ellipse contains the coordinate.
    pub fn ellipses_contain(&self, coordinate: Coordinate, relative_height: f64) -> bool {
        self.coordinates.windows(2).any(|pair| {
            SegmentEllipse::new(pair[0], pair[1], relative_height).contains(coordinate)
        })
    }
}

/// Owns all sections of the current session plus the raw flow file content
/// they came from.
#[derive(Debug, Default)]
pub struct SectionRepository {
    sections: Vec<LineSection>,
    flow_file_content: Option<serde_json::Value>,
}

impl SectionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_all(&mut self, sections: impl IntoIterator<Item = LineSection>) {
        for section in sections {
            self.add(section);
        }
    }

    fn add(&mut self, section: LineSection) {
        // Duplicate id within one file: last definition wins.
        if let Some(existing) = self.sections.iter_mut().find(|s| s.id == section.id) {
            *existing = section;
        } else {
            self.sections.push(section);
        }
    }

    pub fn get(&self, id: &str) -> Option<&LineSection> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn get_all(&self) -> &[LineSection] {
        &self.sections
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Resolve a click to the section whose click zone contains it.
    ///
    /// Returns `Ok(None)` when no section matches and an error when more
    /// than one does.
    pub fn get_by_coordinate(
        &self,
        coordinate: Coordinate,
        relative_height: f64,
    ) -> Result<Option<&LineSection>, AmbiguousSectionError> {
        let mut matched: Option<&LineSection> = None;
        for section in &self.sections {
            if section.ellipses_contain(coordinate, relative_height) {
                if matched.is_some() {
                    return Err(AmbiguousSectionError);
                }
                matched = Some(section);
            }
        }
        Ok(matched)
    }

    /// Stash the parsed flow file document for later save round-trips.
    pub fn set_flow_file_content(&mut self, content: serde_json::Value) {
        self.flow_file_content = Some(content);
    }

    pub fn flow_file_content(&self) -> Option<&serde_json::Value> {
        self.flow_file_content.as_ref()
    }

    pub fn clear(&mut self) {
        self.sections.clear();
        self.flow_file_content = None;
    }
}

#[derive(Deserialize)]
struct FlowDocument {
    #[serde(default)]
    sections: Vec<SectionEntry>,
}

#[derive(Deserialize)]
struct SectionEntry {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    section_type: Option<String>,
    #[serde(default)]
    coordinates: Vec<CoordinateEntry>,
}

#[derive(Deserialize)]
struct CoordinateEntry {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

/// Parse a flow file into sections plus the raw document for round-tripping.
pub fn parse_flow_file(
    file: &Path,
) -> Result<(Vec<LineSection>, serde_json::Value), SectionFileError> {
    let contents = fs::read_to_string(file)?;
    let raw: serde_json::Value = serde_json::from_str(&contents)?;
    let document: FlowDocument = serde_json::from_value(raw.clone())?;

    let mut sections = Vec::with_capacity(document.sections.len());
    for entry in document.sections {
        sections.push(parse_section(entry)?);
    }
    debug!("Parsed {} sections from {}", sections.len(), file.display());
    Ok((sections, raw))
}

fn parse_section(entry: SectionEntry) -> Result<LineSection, SectionFileError> {
    match entry.section_type.as_deref() {
        Some(SECTION_TYPE_LINE) | None => {}
        Some(other) => return Err(SectionFileError::UnsupportedSectionType(other.to_string())),
    }
    let name = entry.name.unwrap_or_else(|| entry.id.clone());
    let coordinates = entry
        .coordinates
        .into_iter()
        .map(|c| Coordinate::new(c.x.round() as i32, c.y.round() as i32))
        .collect();
    Ok(LineSection {
        id: entry.id,
        name,
        coordinates,
    })
}
