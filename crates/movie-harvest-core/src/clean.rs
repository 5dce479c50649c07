use serde::{Deserialize, Serialize};

use crate::model::{CanonicalMovie, PartialMovie};
use crate::stats;
use crate::HarvestError;

/// Minimum-votes prior `m` of the weighted rating.
pub const DEFAULT_MIN_VOTES: f64 = 100.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CleanerConfig {
    pub min_votes: f64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            min_votes: DEFAULT_MIN_VOTES,
        }
    }
}

impl CleanerConfig {
    /// # Errors
    /// Returns [`HarvestError::Configuration`] when `min_votes` is not a
    /// positive finite number.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if !self.min_votes.is_finite() || self.min_votes <= 0.0 {
            return Err(HarvestError::Configuration(
                "min_votes MUST be a positive finite number".to_string(),
            ));
        }
        Ok(())
    }
}

/// A cleaned snapshot together with the global statistics used to build it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanedDataset {
    pub movies: Vec<CanonicalMovie>,
    /// Dataset mean `C` of the filled `vote_average` column.
    pub mean_vote_average: f64,
    pub min_votes: f64,
}

impl CleanedDataset {
    #[must_use]
    pub fn len(&self) -> usize {
        self.movies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }
}

/// Bayesian average `(v/(v+m))*R + (m/(v+m))*C`. Negative vote counts count
/// as zero votes.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn weighted_rating(vote_count: i64, vote_average: f64, dataset_mean: f64, min_votes: f64) -> f64 {
    let votes = vote_count.max(0) as f64;
    let total = votes + min_votes;
    (votes / total) * vote_average + (min_votes / total) * dataset_mean
}

/// Fills missing values and derives per-row features over the whole batch.
///
/// `C` is computed once, after filling, and applied to every row.
#[must_use]
pub fn clean(rows: Vec<PartialMovie>, config: &CleanerConfig) -> CleanedDataset {
    let vote_averages = rows
        .iter()
        .map(|row| row.vote_average.unwrap_or(0.0))
        .collect::<Vec<_>>();
    let dataset_mean = stats::mean(&vote_averages);

    let movies = rows
        .into_iter()
        .map(|row| fill_row(row, dataset_mean, config.min_votes))
        .collect();

    CleanedDataset {
        movies,
        mean_vote_average: dataset_mean,
        min_votes: config.min_votes,
    }
}

fn fill_row(row: PartialMovie, dataset_mean: f64, min_votes: f64) -> CanonicalMovie {
    let overview = row.overview.unwrap_or_default();
    let vote_average = row.vote_average.unwrap_or(0.0);
    let vote_count = row.vote_count.unwrap_or(0);

    let has_english_title = matches!(
        (&row.title, &row.original_title),
        (Some(title), Some(original)) if title == original
    );
    let title_length = row.title.as_deref().map_or(0, |title| title.chars().count());
    let overview_length = overview.chars().count();

    CanonicalMovie {
        id: row.id,
        title: row.title,
        original_title: row.original_title,
        overview,
        popularity: row.popularity.unwrap_or(0.0),
        vote_average,
        vote_count,
        release_date: row.release_date,
        release_year: row.release_year,
        genres: row.genres,
        genre_list: row.genre_list,
        adult: row.adult.unwrap_or(false),
        poster_path: row.poster_path,
        backdrop_path: row.backdrop_path,
        original_language: row.original_language,
        has_english_title,
        title_length,
        overview_length,
        weighted_rating: weighted_rating(vote_count, vote_average, dataset_mean, min_votes),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;
    use crate::model::{GenreLookup, RawMovieRecord};
    use crate::normalize::normalize_all;
    use proptest::prelude::*;

    fn partial(vote_average: Option<f64>, vote_count: Option<i64>) -> PartialMovie {
        let raw = RawMovieRecord {
            id: Some(1),
            title: Some("Amélie".to_string()),
            original_title: Some("Le Fabuleux Destin d'Amélie Poulain".to_string()),
            vote_average,
            vote_count,
            ..RawMovieRecord::default()
        };
        normalize_all(&[raw], &GenreLookup::default()).remove(0)
    }

    #[test]
    fn fill_policy_defaults_missing_values() {
        let dataset = clean(vec![partial(None, None)], &CleanerConfig::default());
        let movie = &dataset.movies[0];

        assert_eq!(movie.overview, "");
        assert_eq!(movie.vote_average, 0.0);
        assert_eq!(movie.vote_count, 0);
        assert_eq!(movie.popularity, 0.0);
        assert!(!movie.adult);
        assert_eq!(movie.overview_length, 0);
    }

    #[test]
    fn derived_text_features_count_characters() {
        let dataset = clean(vec![partial(Some(7.0), Some(10))], &CleanerConfig::default());
        let movie = &dataset.movies[0];

        assert_eq!(movie.title_length, 6);
        assert!(!movie.has_english_title);
    }

    #[test]
    fn zero_votes_yield_dataset_mean_exactly() {
        let rows = vec![partial(Some(9.0), Some(0)), partial(Some(3.0), Some(500))];
        let dataset = clean(rows, &CleanerConfig::default());

        assert_eq!(dataset.mean_vote_average, 6.0);
        assert_eq!(dataset.movies[0].weighted_rating, 6.0);
    }

    #[test]
    fn missing_vote_average_counts_as_zero_in_dataset_mean() {
        let rows = vec![partial(None, Some(10)), partial(Some(8.0), Some(10))];
        let dataset = clean(rows, &CleanerConfig::default());
        assert_eq!(dataset.mean_vote_average, 4.0);
    }

    #[test]
    fn empty_input_yields_empty_dataset() {
        let dataset = clean(Vec::new(), &CleanerConfig::default());
        assert!(dataset.is_empty());
        assert_eq!(dataset.mean_vote_average, 0.0);
    }

    #[test]
    fn config_rejects_non_positive_prior() {
        assert!(CleanerConfig { min_votes: 0.0 }.validate().is_err());
        assert!(CleanerConfig { min_votes: f64::NAN }.validate().is_err());
        assert!(CleanerConfig::default().validate().is_ok());
    }

    #[test]
    fn large_vote_counts_approach_vote_average() {
        let rating = weighted_rating(10_000_000, 9.0, 5.0, DEFAULT_MIN_VOTES);
        assert!((rating - 9.0).abs() < 1e-3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_weighted_rating_is_convex_and_row_count_preserved(
            rows in prop::collection::vec((0.0f64..10.0, 0i64..100_000), 1..60)
        ) {
            let partials = rows
                .iter()
                .map(|(average, count)| partial(Some(*average), Some(*count)))
                .collect::<Vec<_>>();
            let dataset = clean(partials, &CleanerConfig::default());
            prop_assert_eq!(dataset.len(), rows.len());

            let c = dataset.mean_vote_average;
            for movie in &dataset.movies {
                let low = movie.vote_average.min(c) - 1e-9;
                let high = movie.vote_average.max(c) + 1e-9;
                prop_assert!(movie.weighted_rating >= 0.0);
                prop_assert!(movie.weighted_rating >= low && movie.weighted_rating <= high);
            }
        }
    }
}
