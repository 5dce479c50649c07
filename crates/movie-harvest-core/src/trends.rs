//! Year-keyed trend aggregation over a cleaned dataset.
//!
//! Every aggregate here groups by `release_year`. Movies without a release
//! year are excluded from all of them; they still count toward the cleaned
//! dataset and toward the genre vocabulary.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::CanonicalMovie;
use crate::stats;
use crate::HarvestError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrendCategory {
    Ratings,
    Genres,
    Popularity,
}

impl TrendCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ratings => "ratings",
            Self::Genres => "genres",
            Self::Popularity => "popularity",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ratings" => Some(Self::Ratings),
            "genres" => Some(Self::Genres),
            "popularity" => Some(Self::Popularity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct TrendConfig {
    pub rolling_window: usize,
    /// Smoothing applies only when the series has at least this many years.
    pub smoothing_min_years: usize,
    pub top_genre_count: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            rolling_window: 3,
            smoothing_min_years: 4,
            top_genre_count: 5,
        }
    }
}

impl TrendConfig {
    /// # Errors
    /// Returns [`HarvestError::Configuration`] when a window or count is zero.
    pub fn validate(&self) -> Result<(), HarvestError> {
        for (name, value) in [
            ("rolling_window", self.rolling_window),
            ("smoothing_min_years", self.smoothing_min_years),
            ("top_genre_count", self.top_genre_count),
        ] {
            if value == 0 {
                return Err(HarvestError::Configuration(format!("{name} MUST be >= 1")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingTrendRow {
    pub release_year: i32,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub count: usize,
    pub rolling_avg: f64,
    pub yearly_change: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RatingTrendTable {
    pub rows: Vec<RatingTrendRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopularityTrendRow {
    pub release_year: i32,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub count: usize,
    pub yearly_change: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PopularityTrendTable {
    pub rows: Vec<PopularityTrendRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenreShareRow {
    pub release_year: i32,
    /// Percentage (0-100) of the year's movies carrying each genre. Dense
    /// over [`GenreShareTable::genres`].
    pub shares: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenreShareTable {
    pub genres: Vec<String>,
    pub rows: Vec<GenreShareRow>,
}

impl GenreShareTable {
    #[must_use]
    pub fn share(&self, release_year: i32, genre: &str) -> Option<f64> {
        self.rows
            .iter()
            .find(|row| row.release_year == release_year)
            .and_then(|row| row.shares.get(genre).copied())
    }

    /// Average share of every genre across all years, in column order.
    #[must_use]
    pub fn average_shares(&self) -> Vec<(String, f64)> {
        self.genres
            .iter()
            .map(|genre| {
                let values = self
                    .rows
                    .iter()
                    .map(|row| row.shares.get(genre).copied().unwrap_or(0.0))
                    .collect::<Vec<_>>();
                (genre.clone(), stats::mean(&values))
            })
            .collect()
    }

    /// The `n` genres with the highest average share; ties resolve by name.
    #[must_use]
    pub fn top_genres(&self, n: usize) -> Vec<String> {
        let mut ranked = self.average_shares();
        ranked.sort_by(|(lhs_name, lhs), (rhs_name, rhs)| {
            rhs.total_cmp(lhs).then_with(|| lhs_name.cmp(rhs_name))
        });
        ranked.into_iter().take(n).map(|(genre, _)| genre).collect()
    }
}

/// Results of one detection pass, one slot per [`TrendCategory`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrendReport {
    pub ratings: Option<RatingTrendTable>,
    pub genres: Option<GenreShareTable>,
    pub popularity: Option<PopularityTrendTable>,
}

impl TrendReport {
    #[must_use]
    pub fn with_ratings(self, ratings: RatingTrendTable) -> Self {
        Self {
            ratings: Some(ratings),
            ..self
        }
    }

    #[must_use]
    pub fn with_genres(self, genres: GenreShareTable) -> Self {
        Self {
            genres: Some(genres),
            ..self
        }
    }

    #[must_use]
    pub fn with_popularity(self, popularity: PopularityTrendTable) -> Self {
        Self {
            popularity: Some(popularity),
            ..self
        }
    }

    #[must_use]
    pub fn categories(&self) -> Vec<TrendCategory> {
        let mut categories = Vec::new();
        if self.ratings.is_some() {
            categories.push(TrendCategory::Ratings);
        }
        if self.genres.is_some() {
            categories.push(TrendCategory::Genres);
        }
        if self.popularity.is_some() {
            categories.push(TrendCategory::Popularity);
        }
        categories
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrendDetector {
    config: TrendConfig,
}

impl TrendDetector {
    #[must_use]
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn detect_rating_trends(&self, movies: &[CanonicalMovie]) -> RatingTrendTable {
        let groups = group_by_year(movies, |movie| movie.vote_average);
        let means = groups
            .values()
            .map(|values| stats::mean(values))
            .collect::<Vec<_>>();

        let rolling = if groups.len() >= self.config.smoothing_min_years {
            stats::rolling_mean(&means, self.config.rolling_window)
        } else {
            means.clone()
        };
        let changes = stats::pct_change(&means);

        let rows = groups
            .iter()
            .enumerate()
            .map(|(index, (year, values))| RatingTrendRow {
                release_year: *year,
                mean: means[index],
                median: stats::median(values),
                std: stats::sample_std(values),
                count: values.len(),
                rolling_avg: rolling[index],
                yearly_change: changes[index],
            })
            .collect();

        RatingTrendTable { rows }
    }

    /// Builds the dense year × genre share table in one counting pass.
    #[must_use]
    #[allow(clippy::unused_self, clippy::cast_precision_loss)]
    pub fn detect_genre_trends(&self, movies: &[CanonicalMovie]) -> GenreShareTable {
        let genres = movies
            .iter()
            .flat_map(|movie| movie.genre_list.iter().cloned())
            .collect::<BTreeSet<_>>();

        let mut year_totals: BTreeMap<i32, usize> = BTreeMap::new();
        let mut pair_counts: BTreeMap<(i32, &str), usize> = BTreeMap::new();
        for movie in movies {
            let Some(year) = movie.release_year else {
                continue;
            };
            *year_totals.entry(year).or_default() += 1;

            let distinct = movie
                .genre_list
                .iter()
                .map(String::as_str)
                .collect::<BTreeSet<_>>();
            for genre in distinct {
                *pair_counts.entry((year, genre)).or_default() += 1;
            }
        }

        let rows = year_totals
            .iter()
            .map(|(year, total)| {
                let shares = genres
                    .iter()
                    .map(|genre| {
                        let count = pair_counts
                            .get(&(*year, genre.as_str()))
                            .copied()
                            .unwrap_or(0);
                        let share = if *total == 0 {
                            0.0
                        } else {
                            count as f64 / *total as f64 * 100.0
                        };
                        (genre.clone(), share)
                    })
                    .collect();
                GenreShareRow {
                    release_year: *year,
                    shares,
                }
            })
            .collect();

        GenreShareTable {
            genres: genres.into_iter().collect(),
            rows,
        }
    }

    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn detect_popularity_trends(&self, movies: &[CanonicalMovie]) -> PopularityTrendTable {
        let groups = group_by_year(movies, |movie| movie.popularity);
        let means = groups
            .values()
            .map(|values| stats::mean(values))
            .collect::<Vec<_>>();
        let changes = stats::pct_change(&means);

        let rows = groups
            .iter()
            .enumerate()
            .map(|(index, (year, values))| PopularityTrendRow {
                release_year: *year,
                mean: means[index],
                median: stats::median(values),
                max: stats::max(values),
                count: values.len(),
                yearly_change: changes[index],
            })
            .collect();

        PopularityTrendTable { rows }
    }

    #[must_use]
    pub fn detect_all(&self, movies: &[CanonicalMovie]) -> TrendReport {
        TrendReport::default()
            .with_ratings(self.detect_rating_trends(movies))
            .with_genres(self.detect_genre_trends(movies))
            .with_popularity(self.detect_popularity_trends(movies))
    }
}

fn group_by_year(
    movies: &[CanonicalMovie],
    metric: impl Fn(&CanonicalMovie) -> f64,
) -> BTreeMap<i32, Vec<f64>> {
    let mut groups: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for movie in movies {
        if let Some(year) = movie.release_year {
            groups.entry(year).or_default().push(metric(movie));
        }
    }
    groups
}
