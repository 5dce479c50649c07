use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::CanonicalMovie;

/// Languages with fewer movies than this are folded into [`OTHER_LANGUAGE_LABEL`].
pub const DEFAULT_LANGUAGE_THRESHOLD: usize = 3;
pub const OTHER_LANGUAGE_LABEL: &str = "Other";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct YearCount {
    pub release_year: i32,
    pub movie_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageShare {
    pub language: String,
    pub movie_count: usize,
    pub percent: f64,
}

#[must_use]
pub fn movies_by_year(movies: &[CanonicalMovie]) -> Vec<YearCount> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for year in movies.iter().filter_map(|movie| movie.release_year) {
        *counts.entry(year).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(release_year, movie_count)| YearCount {
            release_year,
            movie_count,
        })
        .collect()
}

/// Highest weighted rating first; equal ratings keep dataset order.
#[must_use]
pub fn top_rated(movies: &[CanonicalMovie], limit: usize) -> Vec<CanonicalMovie> {
    let mut ranked = movies.to_vec();
    ranked.sort_by(|lhs, rhs| rhs.weighted_rating.total_cmp(&lhs.weighted_rating));
    ranked.truncate(limit);
    ranked
}

/// Share of movies per original language, most common first.
///
/// Movies without a language are not counted.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn language_distribution(movies: &[CanonicalMovie], threshold: usize) -> Vec<LanguageShare> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for language in movies.iter().filter_map(|movie| movie.original_language.as_deref()) {
        *counts.entry(language).or_default() += 1;
    }

    let total = counts.values().sum::<usize>();
    if total == 0 {
        return Vec::new();
    }

    let mut main = Vec::new();
    let mut other = 0_usize;
    for (language, count) in counts {
        if count >= threshold {
            main.push((language.to_string(), count));
        } else {
            other += count;
        }
    }
    main.sort_by(|(lhs_name, lhs), (rhs_name, rhs)| rhs.cmp(lhs).then_with(|| lhs_name.cmp(rhs_name)));
    if other > 0 {
        main.push((OTHER_LANGUAGE_LABEL.to_string(), other));
    }

    main.into_iter()
        .map(|(language, movie_count)| LanguageShare {
            language,
            movie_count,
            percent: movie_count as f64 / total as f64 * 100.0,
        })
        .collect()
}
