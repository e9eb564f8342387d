//! Synthetic record generation
//!
//! A [`RecordGenerator`] produces one record per call and declares the
//! versioned field schema every record it produces must follow. The schema
//! is the contract between seeded data and any model trained on it.

use crate::table::Record;
use crate::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Current version of the monster record schema
pub const MONSTER_SCHEMA_VERSION: u32 = 1;

/// Fields of a monster record, in document order
pub const MONSTER_FIELDS: [&str; 9] = [
    "Name", "Type", "Level", "Rarity", "Damage", "Health", "Energy", "Sanity", "Timestamp",
];

/// Numeric monster fields usable as classifier features
pub const MONSTER_FEATURES: [&str; 4] = ["Level", "Health", "Energy", "Sanity"];

/// Label field of a monster record
pub const RARITY_FIELD: &str = "Rarity";

const NAMES: [&str; 12] = [
    "Goblin", "Imp", "Ghoul", "Wraith", "Basilisk", "Wyvern", "Troll", "Harpy", "Golem",
    "Lich", "Hydra", "Behemoth",
];
const TYPES: [&str; 6] = ["Demonic", "Devilkin", "Dragon", "Elemental", "Undead", "Beast"];
const DAMAGE_DICE: [u32; 6] = [4, 6, 8, 10, 12, 20];

/// Cumulative percentile thresholds for Rank 0..=5
const RANK_THRESHOLDS: [u32; 6] = [30, 55, 75, 88, 96, 100];

/// Versioned field schema declared by a generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Schema version, bumped whenever fields change
    pub version: u32,
    /// Field names in document order
    pub fields: Vec<String>,
}

impl RecordSchema {
    /// Check that a record carries exactly the declared fields
    #[must_use]
    pub fn conforms(&self, record: &Record) -> bool {
        record.len() == self.fields.len() && self.fields.iter().all(|f| record.contains_key(f))
    }
}

/// Source of synthetic records for seeding a store
pub trait RecordGenerator {
    /// Schema every generated record follows
    fn schema(&self) -> RecordSchema;

    /// Produce one record
    ///
    /// # Errors
    ///
    /// Implementations may fail; errors propagate to the caller unchanged
    fn generate(&mut self) -> Result<Record>;
}

/// Random monster records whose stats scale with rarity rank
#[derive(Debug)]
pub struct MonsterGenerator {
    rng: StdRng,
}

impl MonsterGenerator {
    /// Generator seeded from OS entropy
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn rank(&mut self) -> usize {
        let roll = self.rng.gen_range(0..100);
        RANK_THRESHOLDS
            .iter()
            .position(|&threshold| roll < threshold)
            .unwrap_or(RANK_THRESHOLDS.len() - 1)
    }

    fn stat(&mut self, base: f64) -> f64 {
        let value = base * self.rng.gen_range(2.0..4.0);
        (value * 100.0).round() / 100.0
    }
}

impl Default for MonsterGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordGenerator for MonsterGenerator {
    fn schema(&self) -> RecordSchema {
        RecordSchema {
            version: MONSTER_SCHEMA_VERSION,
            fields: MONSTER_FIELDS.iter().map(ToString::to_string).collect(),
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    fn generate(&mut self) -> Result<Record> {
        let rank = self.rank();
        let level = self.rng.gen_range(1..=10) + 2 * rank as i64;
        let base = (level + rank as i64) as f64;

        let name = NAMES[self.rng.gen_range(0..NAMES.len())];
        let kind = TYPES[self.rng.gen_range(0..TYPES.len())];
        let health = self.stat(base);
        let energy = self.stat(base);
        let sanity = self.stat(base);

        let mut record = Record::with_capacity(MONSTER_FIELDS.len());
        record.insert("Name".into(), json!(name));
        record.insert("Type".into(), json!(kind));
        record.insert("Level".into(), json!(level));
        record.insert(RARITY_FIELD.into(), json!(format!("Rank {rank}")));
        record.insert("Damage".into(), json!(format!("{level}d{}", DAMAGE_DICE[rank])));
        record.insert("Health".into(), json!(health));
        record.insert("Energy".into(), json!(energy));
        record.insert("Sanity".into(), json!(sanity));
        record.insert(
            "Timestamp".into(),
            json!(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        );

        Ok(record)
    }
}
