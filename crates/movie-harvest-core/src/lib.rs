//! Transformation and trend-detection pipeline for harvested movie metadata.
//!
//! The pipeline is a pure, single-pass batch transform:
//! - [`normalize_all`] maps raw catalog records onto [`PartialMovie`] rows.
//! - [`clean`] fills missing values and derives the weighted rating.
//! - [`TrendDetector`] aggregates a cleaned dataset by release year and genre.
//! - [`enrich_all`] derives indicator features for downstream modeling.

mod clean;
mod enrich;
mod model;
mod normalize;
mod stats;
mod summary;
mod trends;

pub use clean::{clean, weighted_rating, CleanedDataset, CleanerConfig, DEFAULT_MIN_VOTES};
pub use enrich::{
    add_genre_features, add_language_features, enrich_all, extract_title_features,
    genre_feature_column, FeatureRow, FeatureTable, COMMON_LANGUAGES,
};
pub use model::{CanonicalMovie, GenreLookup, GenrePair, PartialMovie, RawMovieRecord};
pub use normalize::{join_genres, normalize, normalize_all, parse_release_date, UNKNOWN_GENRE};
pub use summary::{
    language_distribution, movies_by_year, top_rated, LanguageShare, YearCount,
    DEFAULT_LANGUAGE_THRESHOLD, OTHER_LANGUAGE_LABEL,
};
pub use trends::{
    GenreShareRow, GenreShareTable, PopularityTrendRow, PopularityTrendTable, RatingTrendRow,
    RatingTrendTable, TrendCategory, TrendConfig, TrendDetector, TrendReport,
};

use time::{Date, OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum HarvestError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

time::serde::format_description!(release_date_format, Date, "[year]-[month]-[day]");

/// Formats a release date back into its canonical `YYYY-MM-DD` form.
///
/// # Errors
/// Returns [`HarvestError::Validation`] when formatting fails.
pub fn format_release_date(value: Date) -> Result<String, HarvestError> {
    value
        .format(&time::macros::format_description!("[year]-[month]-[day]"))
        .map_err(|err| HarvestError::Validation(format!("failed to format release date: {err}")))
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`HarvestError::Validation`] when parsing fails or the timestamp is
/// not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, HarvestError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| HarvestError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(HarvestError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`HarvestError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, HarvestError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            HarvestError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    #[test]
    fn release_date_format_is_zero_padded() {
        let date = must_ok(Date::from_calendar_date(1999, time::Month::March, 7));
        assert_eq!(must_ok(format_release_date(date)), "1999-03-07");
    }

    #[test]
    fn rfc3339_rejects_non_utc_offsets() {
        assert!(parse_rfc3339_utc("2026-02-07T12:00:00+02:00").is_err());
        let parsed = must_ok(parse_rfc3339_utc("2026-02-07T12:00:00Z"));
        assert_eq!(must_ok(format_rfc3339(parsed)), "2026-02-07T12:00:00Z");
    }
}
