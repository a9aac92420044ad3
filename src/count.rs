// src/count.rs
//
// Annotation lifecycle and storage. An ActiveCount collects crossing events
// while the analyst follows one road user through the scene; finishing it
// produces an immutable, classified Count owned by the CountRepository.
// Every fallible transition checks first and mutates after, so a rejected
// input never leaves partial state behind.

use crate::classes::RoadUserClass;
use crate::event::{CrossingEvent, TaggedEvent};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CountError {
    #[error("event precedes the previous event of the active count")]
    EventBeforePrevious,

    #[error("a count needs at least two events")]
    TooFewEvents,

    #[error("a count needs a road user class")]
    MissingRoadUserClass,
}

/// The annotation currently in progress. At most one exists per session.
#[derive(Debug, Clone)]
pub struct ActiveCount {
    events: Vec<CrossingEvent>,
    road_user_class: Option<RoadUserClass>,
}

impl ActiveCount {
    pub fn new(first_event: CrossingEvent) -> Self {
        Self {
            events: vec![first_event],
            road_user_class: None,
        }
    }

    /// Record another crossing. A click on the same section as the previous
    /// event corrects that event instead of appending; clicks must move
    /// forward in time.
    pub fn add_event(&mut self, event: CrossingEvent) -> Result<(), CountError> {
        let last = self
            .events
            .last()
            .expect("an active count always holds at least one event");
        if event.occurrence < last.occurrence {
            return Err(CountError::EventBeforePrevious);
        }
        if event.section_id == last.section_id {
            let index = self.events.len() - 1;
            self.events[index] = event;
        } else {
            self.events.push(event);
        }
        Ok(())
    }

    pub fn set_road_user_class(&mut self, road_user_class: RoadUserClass) {
        self.road_user_class = Some(road_user_class);
    }

    pub fn road_user_class(&self) -> Option<&RoadUserClass> {
        self.road_user_class.as_ref()
    }

    pub fn events(&self) -> &[CrossingEvent] {
        &self.events
    }

    /// Validate and convert into a finished count under the given id.
    /// On failure the active count is handed back untouched.
    pub fn finish(self, id: String) -> Result<Count, (ActiveCount, CountError)> {
        if self.events.len() < 2 {
            return Err((self, CountError::TooFewEvents));
        }
        if self.road_user_class.is_none() {
            return Err((self, CountError::MissingRoadUserClass));
        }
        let road_user_class = self.road_user_class.expect("checked above");
        Ok(Count {
            id,
            events: self.events,
            road_user_class,
        })
    }
}

/// A finished, classified annotation: one road user crossing at least two
/// sections.
#[derive(Debug, Clone, PartialEq)]
pub struct Count {
    id: String,
    events: Vec<CrossingEvent>,
    road_user_class: RoadUserClass,
}

impl Count {
    pub fn new(
        id: String,
        events: Vec<CrossingEvent>,
        road_user_class: RoadUserClass,
    ) -> Result<Self, CountError> {
        if events.len() < 2 {
            return Err(CountError::TooFewEvents);
        }
        Ok(Self {
            id,
            events,
            road_user_class,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn events(&self) -> &[CrossingEvent] {
        &self.events
    }

    pub fn road_user_class(&self) -> &RoadUserClass {
        &self.road_user_class
    }

    pub fn first_event(&self) -> &CrossingEvent {
        &self.events[0]
    }

    pub fn last_event(&self) -> &CrossingEvent {
        &self.events[self.events.len() - 1]
    }

    /// Seconds between the first and last crossing.
    pub fn time_span(&self) -> f64 {
        self.last_event().occurrence - self.first_event().occurrence
    }

    pub fn first_section_id(&self) -> &str {
        &self.first_event().section_id
    }

    pub fn last_section_id(&self) -> &str {
        &self.last_event().section_id
    }
}

/// Candidate counts assembled from an imported event list, plus whether they
/// can be merged without clobbering ids already present.
#[derive(Debug)]
pub struct ImportedCounts {
    pub counts: Vec<Count>,
    pub compatible: bool,
    /// Road user groups dropped for having fewer than two events.
    pub dropped_groups: usize,
}

/// Owns all finished counts of the session and allocates their ids.
#[derive(Debug, Default)]
pub struct CountRepository {
    counts: Vec<Count>,
    current_id: u64,
}

impl CountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, count: Count) {
        // Id collisions only reach this point through a merge the caller has
        // already confirmed; the imported count wins.
        if let Some(existing) = self.counts.iter_mut().find(|c| c.id == count.id) {
            *existing = count;
        } else {
            self.counts.push(count);
        }
    }

    pub fn add_all(&mut self, counts: impl IntoIterator<Item = Count>) {
        for count in counts {
            self.add(count);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Count> {
        self.counts.iter().find(|c| c.id == id)
    }

    pub fn get_all(&self) -> &[Count] {
        &self.counts
    }

    /// Remove a count. The id must be present; asking to delete an unknown
    /// id is a caller bug, not a recoverable condition.
    pub fn delete(&mut self, id: &str) {
        let index = self
            .counts
            .iter()
            .position(|c| c.id == id)
            .expect("count id to delete must be present");
        self.counts.remove(index);
        debug!("Deleted count {id}");
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.current_id = 0;
    }

    /// Allocate the next free id. Deleted ids may be re-issued; ids injected
    /// by a merge are skipped over.
    pub fn next_id(&mut self) -> String {
        loop {
            self.current_id += 1;
            let candidate = self.current_id.to_string();
            if self.get(&candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Every count whose events touch the given frame.
    pub fn counts_by_frame(&self, frame_number: i64) -> Vec<&Count> {
        self.counts
            .iter()
            .filter(|c| c.events.iter().any(|e| e.frame_number == frame_number))
            .collect()
    }

    /// Flatten all counts into the taggable event list the file format wants.
    pub fn to_event_list(&self) -> Vec<TaggedEvent> {
        self.counts
            .iter()
            .flat_map(|count| {
                count.events.iter().map(|event| TaggedEvent {
                    event: event.clone(),
                    road_user_id: count.id.clone(),
                    road_user_class: count.road_user_class.clone(),
                })
            })
            .collect()
    }

    /// Group imported event records into count candidates.
    ///
    /// Records arrive in no guaranteed order, so each road user group is
    /// insertion-sorted by occurrence. Groups with fewer than two events
    /// cannot form a count and are dropped. `id_suffix` is appended to every
    /// imported id; the result reports whether the merge would collide with
    /// ids already present.
    pub fn event_list_to_counts(&self, records: &[TaggedEvent], id_suffix: &str) -> ImportedCounts {
        let mut groups: Vec<(String, Vec<TaggedEvent>)> = Vec::new();
        for record in records {
            match groups.iter_mut().find(|(id, _)| *id == record.road_user_id) {
                Some((_, members)) => members.push(record.clone()),
                None => groups.push((record.road_user_id.clone(), vec![record.clone()])),
            }
        }

        let mut counts = Vec::new();
        let mut dropped_groups = 0usize;
        let mut compatible = true;
        for (road_user_id, mut members) in groups {
            if members.len() < 2 {
                dropped_groups += 1;
                continue;
            }
            insertion_sort_by_occurrence(&mut members);
            let id = format!("{road_user_id}{id_suffix}");
            if self.get(&id).is_some() {
                compatible = false;
            }
            let road_user_class = members[0].road_user_class.clone();
            let events = members.into_iter().map(|m| m.event).collect();
            let count = Count::new(id, events, road_user_class)
                .expect("groups are filtered to hold at least two events");
            counts.push(count);
        }

        if dropped_groups > 0 {
            debug!("Dropped {dropped_groups} imported road users with fewer than two events");
        }
        ImportedCounts {
            counts,
            compatible,
            dropped_groups,
        }
    }

    /// Merge imported counts into the repository. Callers are expected to
    /// have checked `compatible` first; on collision the imported count
    /// replaces the existing one. Afterwards the id counter moves past the
    /// highest numeric id so future allocations stay collision-free.
    pub fn add_new_counts(&mut self, new_counts: Vec<Count>, keep_existing: bool) {
        if !keep_existing {
            self.clear();
        }
        let added = new_counts.len();
        self.add_all(new_counts);
        self.reset_id_counter();
        info!(
            "Merged {added} imported counts, repository now holds {}",
            self.counts.len()
        );
    }

    fn reset_id_counter(&mut self) {
        let highest_numeric = self
            .counts
            .iter()
            .filter_map(|c| c.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        self.current_id = self.current_id.max(highest_numeric);
    }
}

fn insertion_sort_by_occurrence(members: &mut [TaggedEvent]) {
    for i in 1..members.len() {
        let mut j = i;
        while j > 0 && members[j - 1].event.occurrence > members[j].event.occurrence {
            members.swap(j - 1, j);
            j -= 1;
        }
    }
}
