//! Thresholds and limits, built once at startup and passed by reference everywhere.

use crate::fields::FieldRegistry;
use crate::{
    DEFAULT_BLOCK_THRESHOLD, DEFAULT_EARLIEST_ACCIDENT_YEAR, DEFAULT_MAX_NOTE_URLS,
    DEFAULT_OMIT_VALID_THRESHOLD, DEFAULT_PROXIMITY_RADIUS_METERS, DEFAULT_VALID_THRESHOLD,
    NOT_AVAILABLE,
};
use anyhow::{Result, bail};
use clap::Args;

/// Command-line and environment options shared by the api and the scheduled jobs.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Agreeing annotations required to validate a value.
    #[arg(long, env = "VALID_THRESHOLD", default_value_t = DEFAULT_VALID_THRESHOLD)]
    pub valid_threshold: u32,

    /// Agreeing "not available" markers required to validate them.
    /// Notes with more unavailable or invalid reports than this are excluded.
    #[arg(long, env = "OMIT_VALID_THRESHOLD", default_value_t = DEFAULT_OMIT_VALID_THRESHOLD)]
    pub omit_valid_threshold: u32,

    /// Users with more invalid notes than this are blocked.
    #[arg(long, env = "BLOCK_THRESHOLD", default_value_t = DEFAULT_BLOCK_THRESHOLD)]
    pub block_threshold: u32,

    /// Radius in meters within which two coordinates agree.
    #[arg(long, env = "PROXIMITY_RADIUS_METERS", default_value_t = DEFAULT_PROXIMITY_RADIUS_METERS)]
    pub proximity_radius_meters: f64,

    /// Oldest accident year accepted for dates.
    #[arg(long, env = "EARLIEST_ACCIDENT_YEAR", default_value_t = DEFAULT_EARLIEST_ACCIDENT_YEAR)]
    pub earliest_accident_year: i32,

    /// Maximum number of source urls per note.
    #[arg(long, env = "MAX_NOTE_URLS", default_value_t = DEFAULT_MAX_NOTE_URLS)]
    pub max_note_urls: usize,
}

impl Default for ConfigArgs {
    fn default() -> Self {
        Self {
            valid_threshold: DEFAULT_VALID_THRESHOLD,
            omit_valid_threshold: DEFAULT_OMIT_VALID_THRESHOLD,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            proximity_radius_meters: DEFAULT_PROXIMITY_RADIUS_METERS,
            earliest_accident_year: DEFAULT_EARLIEST_ACCIDENT_YEAR,
            max_note_urls: DEFAULT_MAX_NOTE_URLS,
        }
    }
}

/// Immutable runtime configuration, including the field registry.
#[derive(Debug, Clone)]
pub struct Config {
    pub valid_threshold: u32,
    pub omit_valid_threshold: u32,
    pub block_threshold: u32,
    pub proximity_radius_meters: f64,
    pub earliest_accident_year: i32,
    pub max_note_urls: usize,
    pub registry: FieldRegistry,
}

impl Config {
    /// Validate the options and build the registry.
    ///
    /// # Errors
    /// Returns an error if a threshold or limit is zero or the radius is not a positive number.
    pub fn from_args(args: &ConfigArgs) -> Result<Self> {
        if args.valid_threshold == 0 {
            bail!("valid threshold must be at least 1");
        }
        if args.omit_valid_threshold == 0 {
            bail!("omit valid threshold must be at least 1");
        }
        if args.max_note_urls == 0 {
            bail!("notes must accept at least one url");
        }
        if !args.proximity_radius_meters.is_finite() || args.proximity_radius_meters <= 0.0 {
            bail!(
                "proximity radius must be a positive number of meters, got {}",
                args.proximity_radius_meters
            );
        }

        Ok(Self {
            valid_threshold: args.valid_threshold,
            omit_valid_threshold: args.omit_valid_threshold,
            block_threshold: args.block_threshold,
            proximity_radius_meters: args.proximity_radius_meters,
            earliest_accident_year: args.earliest_accident_year,
            max_note_urls: args.max_note_urls,
            registry: FieldRegistry::new(
                args.proximity_radius_meters,
                args.earliest_accident_year,
            ),
        })
    }

    /// The number of agreeing annotations needed to validate `value`.
    pub fn threshold_for(&self, value: &str) -> u32 {
        if value == NOT_AVAILABLE {
            self.omit_valid_threshold
        } else {
            self.valid_threshold
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            valid_threshold: DEFAULT_VALID_THRESHOLD,
            omit_valid_threshold: DEFAULT_OMIT_VALID_THRESHOLD,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            proximity_radius_meters: DEFAULT_PROXIMITY_RADIUS_METERS,
            earliest_accident_year: DEFAULT_EARLIEST_ACCIDENT_YEAR,
            max_note_urls: DEFAULT_MAX_NOTE_URLS,
            registry: FieldRegistry::new(
                DEFAULT_PROXIMITY_RADIUS_METERS,
                DEFAULT_EARLIEST_ACCIDENT_YEAR,
            ),
        }
    }
}
