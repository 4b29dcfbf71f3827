//! Study-specific coding rules.
//!
//! The built-in profile describes the scene-memory study (indoor/outdoor encoding followed by
//! old/new recognition with confidence). Other studies can override any field from JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::types::Participant;

const DEFAULT_TASK_ORDER: &[&str] = &[
    "encoding1",
    "retrieval1a",
    "retrieval1b",
    "encoding2",
    "retrieval2a",
    "retrieval2b",
    "encoding3",
    "retrieval3a",
    "retrieval3b",
];

const DEFAULT_LEFT_OUTDOOR: &[u32] = &[1, 2, 3, 4, 9, 10, 11, 12, 17, 18, 19, 20];

/// Items participant 007 never saw at the end of Encoding 2; scored as new items at retrieval.
const LOST_ENCODING2_ITEMS: &[&str] = &[
    "indoor_squash_court.jpg",
    "indoor_hockey_rink.jpg",
    "outdoor_deer_blind.jpg",
    "indoor_christmaspresents.jpg",
    "outdoor_playground.jpg",
    "indoor_ballroom.jpg",
    "indoor_airplane_cabin.jpg",
    "outdoor_government_building.jpg",
    "outdoor_track.jpg",
    "indoor_electronicstore.jpg",
    "indoor_fishingstore.jpg",
    "outdoor_empty_wheelbarrow.jpg",
    "indoor_drugstore.jpg",
    "outdoor_ferris_wheel.jpg",
    "indoor_jail.jpeg",
    "outdoor_rusting_sub.jpg",
    "indoor_bikestore.jpg",
    "outdoor_dark_intersection.jpg",
    "outdoor_smoke_stacks.jpg",
    "indoor_candy_store.jpg",
    "indoor_gymnastics.jpg",
    "outdoor_cityscape.jpg",
    "indoor_skydiving_tube.jpg",
    "outdoor_cliff.jpg",
    "outdoor_fancy_fence.jpg",
    "indoor_hardware_store.jpg",
    "outdoor_dam.jpg",
    "indoor_greekrestaurant.jpg",
    "indoor_officelunchroom.jpg",
    "indoor_funeral_chapel.jpg",
    "outdoor_botanical_garden.jpg",
    "outdoor_clock_tower.jpg",
    "outdoor_butte.jpg",
    "indoor_controlroom.jpg",
    "indoor_subway_station.jpg",
    "outdoor_tornado.jpg",
    "indoor_fabric_store.jpg",
    "indoor_toy_store.jpg",
    "indoor_officesupplies.jpg",
    "outdoor_old_arena.jpg",
    "outdoor_ww2_vehicles.jpg",
    "outdoor_pine_forest.jpg",
    "indoor_hair_salon.jpg",
    "outdoor_lava.jpg",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyProfile {
    /// BIDS task labels in acquisition order; also the row order of timing files
    pub task_order: Vec<String>,
    /// Repetition time, substituted for missing RTs in timing files
    pub tr: String,
    /// Participants whose left index finger answers "outdoor" at encoding
    pub left_outdoor_participants: Vec<u32>,
    /// Retrieval items rescored as new, keyed by zero-padded participant number
    pub recode_as_new: BTreeMap<String, Vec<String>>,
    /// Items excluded from subsequent-memory coding and timing files
    pub omitted_items: BTreeMap<String, Vec<String>>,
}

impl Default for StudyProfile {
    fn default() -> Self {
        let mut recode_as_new = BTreeMap::new();
        recode_as_new.insert(
            "007".to_string(),
            LOST_ENCODING2_ITEMS.iter().map(|s| s.to_string()).collect(),
        );
        let mut omitted_items = BTreeMap::new();
        omitted_items.insert("014".to_string(), vec!["outdoor_cebu_tops.jpg".to_string()]);

        Self {
            task_order: DEFAULT_TASK_ORDER.iter().map(|s| s.to_string()).collect(),
            tr: "1.1".to_string(),
            left_outdoor_participants: DEFAULT_LEFT_OUTDOOR.to_vec(),
            recode_as_new,
            omitted_items,
        }
    }
}

impl StudyProfile {
    /// Load a profile from JSON; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn is_recoded_as_new(&self, participant: &Participant, filename: &str) -> bool {
        self.recode_as_new
            .get(&participant.zero_padded())
            .is_some_and(|items| items.iter().any(|i| i == filename))
    }

    pub fn is_omitted(&self, participant: &Participant, filename: &str) -> bool {
        self.omitted_items
            .get(&participant.zero_padded())
            .is_some_and(|items| items.iter().any(|i| i == filename))
    }

    /// TR as a number, for callers that validate it
    pub fn tr_seconds(&self) -> Option<f64> {
        self.tr.parse().ok()
    }
}
