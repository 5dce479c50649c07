use time::Date;

use crate::model::{GenreLookup, PartialMovie, RawMovieRecord};

pub const UNKNOWN_GENRE: &str = "Unknown";

/// Parses a release date strictly as `YYYY-MM-DD`.
///
/// Returns `None` for absent, mis-shaped or out-of-calendar input.
#[must_use]
pub fn parse_release_date(raw: &str) -> Option<Date> {
    if !is_iso_day_shape(raw) {
        return None;
    }
    Date::parse(raw, &time::macros::format_description!("[year]-[month]-[day]")).ok()
}

/// Exactly `DDDD-DD-DD` in ASCII; the year section of the format alone would
/// also take a leading sign.
fn is_iso_day_shape(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        })
}

#[must_use]
pub fn join_genres(genre_list: &[String]) -> String {
    genre_list.join(", ")
}

/// Maps one raw record onto a typed partial row.
///
/// Absent fields stay absent; zero-filling happens in [`crate::clean`].
#[must_use]
pub fn normalize(raw: &RawMovieRecord, lookup: &GenreLookup) -> PartialMovie {
    let genre_list = raw
        .genre_ids
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|genre_id| lookup.resolve(*genre_id).to_string())
        .collect::<Vec<_>>();

    let release_date = raw.release_date.as_deref().and_then(|value| {
        let parsed = parse_release_date(value);
        if parsed.is_none() {
            tracing::debug!(id = ?raw.id, release_date = value, "unparsable release date");
        }
        parsed
    });

    PartialMovie {
        id: raw.id,
        title: raw.title.clone(),
        original_title: raw.original_title.clone(),
        overview: raw.overview.clone(),
        popularity: raw.popularity,
        vote_average: raw.vote_average,
        vote_count: raw.vote_count,
        release_date,
        release_year: release_date.map(Date::year),
        genres: join_genres(&genre_list),
        genre_list,
        adult: raw.adult,
        poster_path: raw.poster_path.clone(),
        backdrop_path: raw.backdrop_path.clone(),
        original_language: raw.original_language.clone(),
    }
}

#[must_use]
pub fn normalize_all(raws: &[RawMovieRecord], lookup: &GenreLookup) -> Vec<PartialMovie> {
    raws.iter().map(|raw| normalize(raw, lookup)).collect()
}
