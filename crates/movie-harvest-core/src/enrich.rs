use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::CanonicalMovie;

pub const COMMON_LANGUAGES: [&str; 8] = ["en", "es", "fr", "de", "it", "ja", "ko", "zh"];

const OTHER_LANGUAGE_COLUMN: &str = "is_other_language";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureRow {
    pub id: Option<i64>,
    pub values: Vec<bool>,
}

/// Boolean indicator columns, one row per movie in dataset order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<bool> {
        let index = self.columns.iter().position(|candidate| candidate == column)?;
        self.rows.get(row).and_then(|item| item.values.get(index).copied())
    }

    /// Appends the columns of `other`. Both tables must describe the same
    /// movies in the same order.
    #[must_use]
    pub fn concat(mut self, other: FeatureTable) -> Self {
        if self.rows.is_empty() && self.columns.is_empty() {
            return other;
        }
        self.columns.extend(other.columns);
        for (row, extra) in self.rows.iter_mut().zip(other.rows) {
            row.values.extend(extra.values);
        }
        self
    }
}

#[must_use]
pub fn genre_feature_column(genre: &str) -> String {
    format!("genre_{}", genre.to_lowercase().replace(' ', "_"))
}

#[must_use]
pub fn add_genre_features(movies: &[CanonicalMovie]) -> FeatureTable {
    let genres = movies
        .iter()
        .flat_map(|movie| movie.genre_list.iter().map(String::as_str))
        .collect::<BTreeSet<_>>();

    let mut columns = genres
        .iter()
        .map(|genre| (genre_feature_column(genre), *genre))
        .collect::<Vec<_>>();
    columns.sort();
    columns.dedup_by(|lhs, rhs| lhs.0 == rhs.0);

    let rows = movies
        .iter()
        .map(|movie| FeatureRow {
            id: movie.id,
            values: columns
                .iter()
                .map(|(column, _)| {
                    movie
                        .genre_list
                        .iter()
                        .any(|genre| genre_feature_column(genre) == *column)
                })
                .collect(),
        })
        .collect();

    FeatureTable {
        columns: columns.into_iter().map(|(column, _)| column).collect(),
        rows,
    }
}

#[must_use]
pub fn add_language_features(movies: &[CanonicalMovie]) -> FeatureTable {
    let mut columns = COMMON_LANGUAGES
        .iter()
        .map(|code| format!("is_{code}"))
        .collect::<Vec<_>>();
    columns.push(OTHER_LANGUAGE_COLUMN.to_string());

    let rows = movies
        .iter()
        .map(|movie| {
            let language = movie.original_language.as_deref();
            let mut values = COMMON_LANGUAGES
                .iter()
                .map(|code| language == Some(*code))
                .collect::<Vec<_>>();
            values.push(!language.is_some_and(|value| COMMON_LANGUAGES.contains(&value)));
            FeatureRow {
                id: movie.id,
                values,
            }
        })
        .collect();

    FeatureTable { columns, rows }
}

/// Title heuristics. `is_likely_sequel` matches a trailing sequel token and
/// is known to misfire in both directions ("Counterpart", "Part Two").
#[must_use]
pub fn extract_title_features(movies: &[CanonicalMovie]) -> FeatureTable {
    let columns = vec![
        "has_colon_in_title".to_string(),
        "has_number_in_title".to_string(),
        "is_likely_sequel".to_string(),
    ];

    let sequel = sequel_pattern();
    let digit = digit_pattern();
    let rows = movies
        .iter()
        .map(|movie| {
            let title = movie.title.as_deref().unwrap_or_default();
            FeatureRow {
                id: movie.id,
                values: vec![
                    title.contains(':'),
                    digit.is_some_and(|pattern| pattern.is_match(title)),
                    sequel.is_some_and(|pattern| pattern.is_match(title)),
                ],
            }
        })
        .collect();

    FeatureTable { columns, rows }
}

#[must_use]
pub fn enrich_all(movies: &[CanonicalMovie]) -> FeatureTable {
    add_genre_features(movies)
        .concat(add_language_features(movies))
        .concat(extract_title_features(movies))
}

/// Decimal digits of any script; numeral letters such as `Ⅱ` or `½` do not count.
fn digit_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d").ok()).as_ref()
}

fn sequel_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)(part|vol|volume|episode|\bii\b|\biii\b|\biv\b|2|3|4)$").ok()
        })
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::{clean, CleanerConfig};
    use crate::model::{GenreLookup, GenrePair, RawMovieRecord};
    use crate::normalize::normalize_all;

    fn must_some<T>(value: Option<T>) -> T {
        match value {
            Some(inner) => inner,
            None => panic!("expected Some(..), got None"),
        }
    }

    fn movies(entries: &[(&str, Option<&str>, &[i64])]) -> Vec<CanonicalMovie> {
        let lookup = GenreLookup::from_pairs(&[
            GenrePair {
                id: 878,
                name: "Science Fiction".to_string(),
            },
            GenrePair {
                id: 18,
                name: "Drama".to_string(),
            },
        ]);
        let raws = entries
            .iter()
            .enumerate()
            .map(|(index, (title, language, genre_ids))| RawMovieRecord {
                id: Some(i64::try_from(index).unwrap_or(i64::MAX)),
                title: Some((*title).to_string()),
                original_language: language.map(str::to_string),
                genre_ids: Some(genre_ids.to_vec()),
                ..RawMovieRecord::default()
            })
            .collect::<Vec<_>>();
        clean(normalize_all(&raws, &lookup), &CleanerConfig::default()).movies
    }

    #[test]
    fn genre_columns_are_snake_cased_and_sorted() {
        let dataset = movies(&[("Dune", Some("en"), &[878]), ("Roma", Some("es"), &[18, 878])]);
        let table = add_genre_features(&dataset);

        assert_eq!(table.columns, vec!["genre_drama", "genre_science_fiction"]);
        assert_eq!(table.value(0, "genre_drama"), Some(false));
        assert_eq!(table.value(0, "genre_science_fiction"), Some(true));
        assert_eq!(table.value(1, "genre_drama"), Some(true));
    }

    #[test]
    fn language_indicators_fold_unknown_codes_into_other() {
        let dataset = movies(&[("A", Some("ja"), &[]), ("B", Some("hi"), &[]), ("C", None, &[])]);
        let table = add_language_features(&dataset);

        assert_eq!(table.columns.len(), COMMON_LANGUAGES.len() + 1);
        assert_eq!(table.value(0, "is_ja"), Some(true));
        assert_eq!(table.value(0, OTHER_LANGUAGE_COLUMN), Some(false));
        assert_eq!(table.value(1, OTHER_LANGUAGE_COLUMN), Some(true));
        assert_eq!(table.value(2, OTHER_LANGUAGE_COLUMN), Some(true));
    }

    #[test]
    fn title_patterns_flag_colons_digits_and_sequels() {
        let dataset = movies(&[
            ("Mission: Impossible", None, &[]),
            ("Toy Story 3", None, &[]),
            ("Rocky II", None, &[]),
            ("Kill Bill: Vol", None, &[]),
            ("Counterpart", None, &[]),
            ("Heat", None, &[]),
            ("Fortii", None, &[]),
        ]);
        let table = extract_title_features(&dataset);

        assert_eq!(table.value(0, "has_colon_in_title"), Some(true));
        assert_eq!(table.value(1, "has_number_in_title"), Some(true));
        assert_eq!(table.value(1, "is_likely_sequel"), Some(true));
        assert_eq!(table.value(2, "is_likely_sequel"), Some(true));
        assert_eq!(table.value(3, "is_likely_sequel"), Some(true));
        assert_eq!(table.value(4, "is_likely_sequel"), Some(true));
        assert_eq!(table.value(5, "is_likely_sequel"), Some(false));
        assert_eq!(table.value(6, "is_likely_sequel"), Some(false));
    }

    #[test]
    fn enrich_all_concatenates_in_order_without_touching_input() {
        let dataset = movies(&[("Dune", Some("en"), &[878])]);
        let before = dataset.clone();
        let table = enrich_all(&dataset);

        assert_eq!(dataset, before);
        assert_eq!(table.columns.len(), 1 + COMMON_LANGUAGES.len() + 1 + 3);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(must_some(table.rows.first()).values.len(), table.columns.len());
        assert_eq!(table.value(0, "is_en"), Some(true));
    }

    #[test]
    fn number_flag_counts_decimal_digits_only() {
        let dataset = movies(&[
            ("Rocky Ⅱ", None, &[]),
            ("8½", None, &[]),
            ("Half ½", None, &[]),
            ("٣ Idiots", None, &[]),
        ]);
        let table = extract_title_features(&dataset);

        assert_eq!(table.value(0, "has_number_in_title"), Some(false));
        assert_eq!(table.value(1, "has_number_in_title"), Some(true));
        assert_eq!(table.value(2, "has_number_in_title"), Some(false));
        assert_eq!(table.value(3, "has_number_in_title"), Some(true));
    }

    #[test]
    fn patterns_compile() {
        assert!(sequel_pattern().is_some());
        assert!(digit_pattern().is_some());
    }
}
