use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Days, Months, Utc};
use tracing::debug;

use super::{IndexError, IndexIdentifier, Resolution, TimeWindow};

/// Largest number of identifiers a single window may expand into
pub const MAX_INDICES_PER_WINDOW: usize = 10_000;

/// Expands time windows into index identifiers using process defaults that
/// individual requests may override.
#[derive(Debug, Clone)]
pub struct TimeRangeIndexer {
    default_resolution: Resolution,
    default_pattern: String,
}

impl TimeRangeIndexer {
    /// Indexer with the process-wide resolution and pattern
    pub fn new(default_resolution: Resolution, default_pattern: impl Into<String>) -> Self {
        Self {
            default_resolution,
            default_pattern: default_pattern.into(),
        }
    }

    /// Resolution used when a request does not override it
    pub fn default_resolution(&self) -> Resolution {
        self.default_resolution
    }

    /// Pattern used when a request does not override it
    pub fn default_pattern(&self) -> &str {
        &self.default_pattern
    }

    /// Expand `window` with optional per-request overrides.
    ///
    /// Empty override strings fall back to the configured defaults. An
    /// unrecognized resolution is reported as [`IndexError::InvalidResolution`].
    pub fn expand(
        &self,
        window: &TimeWindow,
        resolution: Option<&str>,
        pattern: Option<&str>,
    ) -> Result<Vec<IndexIdentifier>, IndexError> {
        let resolution = match resolution.map(str::trim).filter(|r| !r.is_empty()) {
            Some(raw) => raw.parse()?,
            None => self.default_resolution,
        };
        let pattern = pattern
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_pattern);

        expand(window, resolution, pattern)
    }
}

/// Walk `window` at `resolution`, formatting `pattern` at every step.
///
/// Steps are taken from the window start with calendar arithmetic
/// (`start + n days/months/years`), so month ends clamp to the last day of
/// shorter months without drifting. The result is chronological and stops
/// before the first instant that is not strictly before `window.end()`.
///
/// Windows implying more than [`MAX_INDICES_PER_WINDOW`] steps are rejected
/// with [`IndexError::WindowTooLarge`] before anything is formatted.
pub fn expand(
    window: &TimeWindow,
    resolution: Resolution,
    pattern: &str,
) -> Result<Vec<IndexIdentifier>, IndexError> {
    let items = parse_pattern(pattern)?;

    let limit = u32::try_from(MAX_INDICES_PER_WINDOW).unwrap_or(u32::MAX);
    if advance(window.start(), resolution, limit).is_some_and(|last| last < window.end()) {
        return Err(IndexError::WindowTooLarge {
            resolution,
            max: MAX_INDICES_PER_WINDOW,
        });
    }

    let mut identifiers = Vec::new();
    let mut step: u32 = 0;

    while let Some(instant) = advance(window.start(), resolution, step) {
        if instant >= window.end() {
            break;
        }
        let formatted = instant.format_with_items(items.iter()).to_string();
        identifiers.push(IndexIdentifier::new(formatted)?);
        step += 1;
    }

    debug!(
        window = %window,
        resolution = %resolution,
        count = identifiers.len(),
        "Expanded time window into indices"
    );

    Ok(identifiers)
}

fn advance(start: DateTime<Utc>, resolution: Resolution, step: u32) -> Option<DateTime<Utc>> {
    match resolution {
        Resolution::Day => start.checked_add_days(Days::new(u64::from(step))),
        Resolution::Month => start.checked_add_months(Months::new(step)),
        Resolution::Year => step
            .checked_mul(12)
            .and_then(|months| start.checked_add_months(Months::new(months))),
    }
}

fn parse_pattern(pattern: &str) -> Result<Vec<Item<'_>>, IndexError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(IndexError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "unsupported strftime directive".to_string(),
        });
    }
    Ok(items)
}
