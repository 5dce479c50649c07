use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

use crate::normalize::UNKNOWN_GENRE;

/// One record as delivered by the remote catalog. No field is guaranteed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawMovieRecord {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub popularity: Option<f64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub release_date: Option<String>,
    pub genre_ids: Option<Vec<i64>>,
    pub original_language: Option<String>,
    pub adult: Option<bool>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
}

impl RawMovieRecord {
    /// Builds a record from an untyped JSON value. Fields with an unexpected
    /// JSON type are treated as absent.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let genre_ids = value.get("genre_ids").and_then(Value::as_array).map(|ids| {
            ids.iter()
                .filter_map(json_integer)
                .collect::<Vec<_>>()
        });

        Self {
            id: value.get("id").and_then(json_integer),
            title: json_string(value, "title"),
            original_title: json_string(value, "original_title"),
            overview: json_string(value, "overview"),
            popularity: value.get("popularity").and_then(Value::as_f64),
            vote_average: value.get("vote_average").and_then(Value::as_f64),
            vote_count: value.get("vote_count").and_then(json_integer),
            release_date: json_string(value, "release_date"),
            genre_ids,
            original_language: json_string(value, "original_language"),
            adult: value.get("adult").and_then(Value::as_bool),
            poster_path: json_string(value, "poster_path"),
            backdrop_path: json_string(value, "backdrop_path"),
        }
    }
}

fn json_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn json_integer(value: &Value) -> Option<i64> {
    if let Some(int) = value.as_i64() {
        return Some(int);
    }
    let float = value.as_f64()?;
    if float.is_finite()
        && float.fract() == 0.0
        && float >= i64::MIN as f64
        && float <= i64::MAX as f64
    {
        Some(float as i64)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct GenrePair {
    pub id: i64,
    pub name: String,
}

/// Genre id to name resolution, built once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreLookup {
    names: BTreeMap<i64, String>,
}

impl GenreLookup {
    #[must_use]
    pub fn from_pairs(pairs: &[GenrePair]) -> Self {
        let names = pairs
            .iter()
            .map(|pair| (pair.id, pair.name.clone()))
            .collect();
        Self { names }
    }

    #[must_use]
    pub fn resolve(&self, genre_id: i64) -> &str {
        self.names
            .get(&genre_id)
            .map_or(UNKNOWN_GENRE, String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Output of the normalizer: typed, but not yet filled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialMovie {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub popularity: Option<f64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    #[serde(with = "crate::release_date_format::option")]
    pub release_date: Option<Date>,
    pub release_year: Option<i32>,
    pub genres: String,
    pub genre_list: Vec<String>,
    pub adult: Option<bool>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub original_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalMovie {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub overview: String,
    pub popularity: f64,
    pub vote_average: f64,
    pub vote_count: i64,
    #[serde(with = "crate::release_date_format::option")]
    pub release_date: Option<Date>,
    pub release_year: Option<i32>,
    pub genres: String,
    pub genre_list: Vec<String>,
    pub adult: bool,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub original_language: Option<String>,
    pub has_english_title: bool,
    pub title_length: usize,
    pub overview_length: usize,
    pub weighted_rating: f64,
}

impl CanonicalMovie {
    #[must_use]
    pub fn has_genre(&self, genre: &str) -> bool {
        self.genre_list.iter().any(|candidate| candidate == genre)
    }
}
