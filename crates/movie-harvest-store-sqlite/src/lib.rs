#![allow(clippy::missing_errors_doc)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use movie_harvest_core::{
    format_release_date, format_rfc3339, now_utc, parse_release_date,
    parse_rfc3339_utc, CanonicalMovie, GenrePair, YearCount,
};
use rusqlite::{params, Connection, OptionalExtension};
use time::{OffsetDateTime, UtcOffset};
use ulid::Ulid;

const MOVIE_MIGRATION_VERSION: i64 = 1;

const SCHEMA_MOVIES_V1: &str = r"
CREATE TABLE IF NOT EXISTS movies (
  id INTEGER PRIMARY KEY,
  title TEXT,
  original_title TEXT,
  overview TEXT NOT NULL DEFAULT '',
  popularity REAL NOT NULL DEFAULT 0,
  vote_average REAL NOT NULL DEFAULT 0,
  vote_count INTEGER NOT NULL DEFAULT 0,
  release_date TEXT,
  release_year INTEGER,
  genres TEXT NOT NULL DEFAULT '',
  adult INTEGER NOT NULL DEFAULT 0 CHECK (adult IN (0, 1)),
  poster_path TEXT,
  backdrop_path TEXT,
  original_language TEXT,
  weighted_rating REAL NOT NULL,
  has_english_title INTEGER NOT NULL CHECK (has_english_title IN (0, 1)),
  title_length INTEGER NOT NULL CHECK (title_length >= 0),
  overview_length INTEGER NOT NULL CHECK (overview_length >= 0),
  CHECK ((release_date IS NULL) = (release_year IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_movies_weighted_rating
  ON movies(weighted_rating DESC);
CREATE INDEX IF NOT EXISTS idx_movies_release_year
  ON movies(release_year);

CREATE TABLE IF NOT EXISTS genres (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS movie_genres (
  movie_id INTEGER NOT NULL,
  position INTEGER NOT NULL CHECK (position >= 0),
  genre_name TEXT NOT NULL,
  PRIMARY KEY (movie_id, position),
  FOREIGN KEY (movie_id) REFERENCES movies(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS harvest_runs (
  run_id TEXT PRIMARY KEY,
  source TEXT NOT NULL,
  started_at TEXT NOT NULL,
  finished_at TEXT NOT NULL,
  movie_count INTEGER NOT NULL CHECK (movie_count >= 0),
  stored_count INTEGER NOT NULL CHECK (stored_count >= 0),
  skipped_count INTEGER NOT NULL CHECK (skipped_count >= 0),
  mean_vote_average REAL NOT NULL,
  min_votes REAL NOT NULL CHECK (min_votes > 0)
);
";

const MOVIE_COLUMNS: &str = "id, title, original_title, overview, popularity, vote_average,
    vote_count, release_date, release_year, genres, adult, poster_path, backdrop_path,
    original_language, weighted_rating, has_english_title, title_length, overview_length";

pub struct SqliteMovieStore {
    conn: Connection,
}

/// Outcome of writing one dataset snapshot.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoreReport {
    pub stored: usize,
    pub skipped_missing_id: usize,
    pub duplicate_ids: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct RatedMovie {
    pub id: i64,
    pub title: Option<String>,
    pub release_year: Option<i32>,
    pub vote_average: f64,
    pub vote_count: i64,
    pub weighted_rating: f64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct HarvestRun {
    pub run_id: Ulid,
    pub source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub movie_count: usize,
    pub stored_count: usize,
    pub skipped_count: usize,
    pub mean_vote_average: f64,
    pub min_votes: f64,
}

impl SqliteMovieStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_MOVIES_V1)
            .context("failed to apply movie schema")?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![MOVIE_MIGRATION_VERSION, now],
            )
            .context("failed to register movie schema migration")?;

        Ok(())
    }

    pub fn store_genres(&mut self, genres: &[GenrePair]) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start genre transaction")?;
        for genre in genres {
            tx.execute(
                "INSERT INTO genres(id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![genre.id, genre.name],
            )
            .with_context(|| format!("failed to upsert genre {}", genre.id))?;
        }
        tx.commit().context("failed to commit genre transaction")?;
        Ok(genres.len())
    }

    pub fn list_genres(&self) -> Result<Vec<GenrePair>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM genres ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(GenrePair {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        collect_rows(rows)
    }

    /// Replaces the stored snapshot with `movies` in one transaction.
    ///
    /// Rows without an id are skipped; a repeated id overwrites the earlier row.
    pub fn store_movies(&mut self, movies: &[CanonicalMovie]) -> Result<StoreReport> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start movie transaction")?;

        tx.execute("DELETE FROM movie_genres", [])
            .context("failed to clear movie_genres")?;
        tx.execute("DELETE FROM movies", [])
            .context("failed to clear movies")?;

        let mut report = StoreReport::default();
        let mut seen = BTreeSet::new();

        for movie in movies {
            let Some(id) = movie.id else {
                report.skipped_missing_id += 1;
                tracing::warn!(title = ?movie.title, "skipping movie without id");
                continue;
            };
            if !seen.insert(id) {
                report.duplicate_ids += 1;
                tracing::warn!(id, "duplicate movie id in snapshot, keeping the later row");
                tx.execute("DELETE FROM movie_genres WHERE movie_id = ?1", params![id])
                    .with_context(|| format!("failed to clear genres for movie {id}"))?;
            }

            let release_date = movie
                .release_date
                .map(format_release_date)
                .transpose()
                ?;

            tx.execute(
                "INSERT INTO movies(
                    id, title, original_title, overview, popularity, vote_average,
                    vote_count, release_date, release_year, genres, adult, poster_path,
                    backdrop_path, original_language, weighted_rating, has_english_title,
                    title_length, overview_length
                 ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6,
                    ?7, ?8, ?9, ?10, ?11, ?12,
                    ?13, ?14, ?15, ?16,
                    ?17, ?18
                 )
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    original_title = excluded.original_title,
                    overview = excluded.overview,
                    popularity = excluded.popularity,
                    vote_average = excluded.vote_average,
                    vote_count = excluded.vote_count,
                    release_date = excluded.release_date,
                    release_year = excluded.release_year,
                    genres = excluded.genres,
                    adult = excluded.adult,
                    poster_path = excluded.poster_path,
                    backdrop_path = excluded.backdrop_path,
                    original_language = excluded.original_language,
                    weighted_rating = excluded.weighted_rating,
                    has_english_title = excluded.has_english_title,
                    title_length = excluded.title_length,
                    overview_length = excluded.overview_length",
                params![
                    id,
                    movie.title,
                    movie.original_title,
                    movie.overview,
                    movie.popularity,
                    movie.vote_average,
                    movie.vote_count,
                    release_date,
                    movie.release_year,
                    movie.genres,
                    bool_to_sql(movie.adult),
                    movie.poster_path,
                    movie.backdrop_path,
                    movie.original_language,
                    movie.weighted_rating,
                    bool_to_sql(movie.has_english_title),
                    usize_to_sql(movie.title_length)?,
                    usize_to_sql(movie.overview_length)?,
                ],
            )
            .with_context(|| format!("failed to store movie {id}"))?;

            for (position, genre) in movie.genre_list.iter().enumerate() {
                tx.execute(
                    "INSERT INTO movie_genres(movie_id, position, genre_name) VALUES (?1, ?2, ?3)",
                    params![id, usize_to_sql(position)?, genre],
                )
                .with_context(|| format!("failed to store genre for movie {id}"))?;
            }
        }

        tx.commit().context("failed to commit movie transaction")?;
        report.stored = seen.len();
        tracing::info!(
            stored = report.stored,
            skipped = report.skipped_missing_id,
            duplicates = report.duplicate_ids,
            "stored movie snapshot"
        );
        Ok(report)
    }

    pub fn list_movies(&self) -> Result<Vec<CanonicalMovie>> {
        let mut genre_lists = self.genre_lists()?;

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {MOVIE_COLUMNS} FROM movies ORDER BY id ASC"))?;
        let rows = stmt.query_map([], parse_movie_row)?;
        let mut movies = collect_rows(rows)?;

        for movie in &mut movies {
            if let Some(list) = movie.id.and_then(|id| genre_lists.remove(&id)) {
                movie.genre_list = list;
            }
        }
        Ok(movies)
    }

    pub fn count_movies(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM movies", [], |row| row.get(0))
            .context("failed to count movies")?;
        usize::try_from(count).context("invalid movie count")
    }

    pub fn top_rated(&self, limit: usize) -> Result<Vec<RatedMovie>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, release_year, vote_average, vote_count, weighted_rating
             FROM movies
             ORDER BY weighted_rating DESC, id ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![usize_to_sql(limit)?], |row| {
            Ok(RatedMovie {
                id: row.get(0)?,
                title: row.get(1)?,
                release_year: row.get(2)?,
                vote_average: row.get(3)?,
                vote_count: row.get(4)?,
                weighted_rating: row.get(5)?,
            })
        })?;
        collect_rows(rows)
    }

    pub fn movies_by_year(&self) -> Result<Vec<YearCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT release_year, COUNT(*)
             FROM movies
             WHERE release_year IS NOT NULL
             GROUP BY release_year
             ORDER BY release_year ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok(YearCount {
                release_year: row.get(0)?,
                movie_count: sql_to_usize(count, 1)?,
            })
        })?;
        collect_rows(rows)
    }

    pub fn record_run(&self, run: &HarvestRun) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO harvest_runs(
                    run_id, source, started_at, finished_at, movie_count,
                    stored_count, skipped_count, mean_vote_average, min_votes
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run.run_id.to_string(),
                    run.source,
                    format_run_timestamp(run.started_at)?,
                    format_run_timestamp(run.finished_at)?,
                    usize_to_sql(run.movie_count)?,
                    usize_to_sql(run.stored_count)?,
                    usize_to_sql(run.skipped_count)?,
                    run.mean_vote_average,
                    run.min_votes,
                ],
            )
            .context("failed to record harvest run")?;
        Ok(())
    }

    pub fn get_run(&self, run_id: Ulid) -> Result<Option<HarvestRun>> {
        self.conn
            .query_row(
                "SELECT run_id, source, started_at, finished_at, movie_count,
                        stored_count, skipped_count, mean_vote_average, min_votes
                 FROM harvest_runs
                 WHERE run_id = ?1",
                params![run_id.to_string()],
                parse_run_row,
            )
            .optional()
            .context("failed to load harvest run")
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: Option<usize>) -> Result<Vec<HarvestRun>> {
        let mut query = "SELECT run_id, source, started_at, finished_at, movie_count,
                stored_count, skipped_count, mean_vote_average, min_votes
             FROM harvest_runs
             ORDER BY started_at DESC, run_id DESC"
            .to_string();

        if let Some(raw_limit) = limit {
            query.push_str(" LIMIT ");
            query.push_str(&raw_limit.to_string());
        }

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map([], parse_run_row)?;
        collect_rows(rows)
    }

    fn genre_lists(&self) -> Result<BTreeMap<i64, Vec<String>>> {
        let mut stmt = self.conn.prepare(
            "SELECT movie_id, genre_name FROM movie_genres ORDER BY movie_id ASC, position ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut lists: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let movie_id: i64 = row.get(0)?;
            let genre: String = row.get(1)?;
            lists.entry(movie_id).or_default().push(genre);
        }
        Ok(lists)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn parse_movie_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CanonicalMovie> {
    let release_date_raw: Option<String> = row.get(7)?;
    let release_date = release_date_raw
        .as_deref()
        .map(|raw| {
            parse_release_date(raw).ok_or_else(|| invalid_data(7, format!("invalid release_date: {raw}")))
        })
        .transpose()?;

    let adult: i64 = row.get(10)?;
    let has_english_title: i64 = row.get(15)?;
    let title_length: i64 = row.get(16)?;
    let overview_length: i64 = row.get(17)?;
    let genres: String = row.get(9)?;

    Ok(CanonicalMovie {
        id: row.get(0)?,
        title: row.get(1)?,
        original_title: row.get(2)?,
        overview: row.get(3)?,
        popularity: row.get(4)?,
        vote_average: row.get(5)?,
        vote_count: row.get(6)?,
        release_date,
        release_year: row.get(8)?,
        genre_list: split_genres(&genres),
        genres,
        adult: adult != 0,
        poster_path: row.get(11)?,
        backdrop_path: row.get(12)?,
        original_language: row.get(13)?,
        weighted_rating: row.get(14)?,
        has_english_title: has_english_title != 0,
        title_length: sql_to_usize(title_length, 16)?,
        overview_length: sql_to_usize(overview_length, 17)?,
    })
}

fn parse_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HarvestRun> {
    let run_id_raw: String = row.get(0)?;
    let run_id = Ulid::from_string(&run_id_raw)
        .map_err(|_| invalid_data(0, format!("invalid ULID: {run_id_raw}")))?;
    let started_at = parse_rfc3339_utc(&row.get::<_, String>(2)?)
        .map_err(|err| invalid_data(2, err.to_string()))?;
    let finished_at = parse_rfc3339_utc(&row.get::<_, String>(3)?)
        .map_err(|err| invalid_data(3, err.to_string()))?;

    Ok(HarvestRun {
        run_id,
        source: row.get(1)?,
        started_at,
        finished_at,
        movie_count: sql_to_usize(row.get(4)?, 4)?,
        stored_count: sql_to_usize(row.get(5)?, 5)?,
        skipped_count: sql_to_usize(row.get(6)?, 6)?,
        mean_vote_average: row.get(7)?,
        min_votes: row.get(8)?,
    })
}

/// Fallback for rows written without `movie_genres` entries.
/// RFC3339 in UTC with all nine fraction digits, so text order is time order.
fn format_run_timestamp(ts: OffsetDateTime) -> Result<String> {
    ts.to_offset(UtcOffset::UTC)
        .format(&time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
        ))
        .context("failed to format run timestamp")
}

fn split_genres(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(", ").map(str::to_string).collect()
}

fn invalid_data(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn sql_to_usize(value: i64, column: usize) -> rusqlite::Result<usize> {
    usize::try_from(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Integer,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid non-negative integer: {value}"),
            )),
        )
    })
}

fn usize_to_sql(value: usize) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("value {value} exceeds sqlite integer range"))
}

fn bool_to_sql(value: bool) -> i64 {
    i64::from(value)
}

fn collect_rows<T, F>(rows: rusqlite::MappedRows<'_, F>) -> Result<Vec<T>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

#[cfg(test)]
fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1
             FROM sqlite_master
             WHERE type = 'table' AND name = ?1
             LIMIT 1",
            params![table_name],
            |_| Ok(()),
        )
        .optional()
        .context("failed to query sqlite_master")?
        .is_some();

    Ok(exists)
}
