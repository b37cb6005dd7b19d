//! Retention policy configuration.
//!
//! A policy bounds each table independently. It is immutable once built;
//! a store swaps it wholesale through a validating setter.

use serde::{Deserialize, Serialize};

/// Default maximum rows per table
pub const DEFAULT_MAX_ENTRIES: u64 = 1_000_000;

/// Default number of rows evicted when a table is full
pub const DEFAULT_NUM_TO_AGE: u64 = 20;

/// Default age limit for the max-days policy
pub const DEFAULT_MAX_DAYS: u32 = 31;

/// What to do when a table reaches its row limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropMode {
    /// Evict the oldest rows to make room
    #[default]
    AgeOldest,
    /// Keep existing rows and reject new inserts
    KeepOldest,
}

/// Bound on table growth, evaluated before every insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Delete rows whose timestamp is older than `days`
    MaxDays { days: u32 },
    /// Cap the row count per table
    LimitedCount {
        max_entries: u64,
        num_to_age: u64,
        drop_mode: DropMode,
    },
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::LimitedCount {
            max_entries: DEFAULT_MAX_ENTRIES,
            num_to_age: DEFAULT_NUM_TO_AGE,
            drop_mode: DropMode::AgeOldest,
        }
    }
}

impl RetentionPolicy {
    pub fn max_days(days: u32) -> Self {
        RetentionPolicy::MaxDays { days }
    }

    pub fn limited(max_entries: u64, num_to_age: u64, drop_mode: DropMode) -> Self {
        RetentionPolicy::LimitedCount {
            max_entries,
            num_to_age,
            drop_mode,
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            RetentionPolicy::MaxDays { days } => {
                if days == 0 {
                    return Err("days must be > 0".to_string());
                }
            }
            RetentionPolicy::LimitedCount {
                max_entries,
                num_to_age,
                ..
            } => {
                if max_entries == 0 {
                    return Err("max_entries must be > 0".to_string());
                }
                if num_to_age == 0 {
                    return Err("num_to_age must be > 0".to_string());
                }
            }
        }
        Ok(())
    }
}
