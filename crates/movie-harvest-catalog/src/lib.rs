#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use movie_harvest_core::{GenrePair, RawMovieRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 250;
/// Records per page served by the remote catalog.
pub const PAGE_SIZE: usize = 20;

pub trait CatalogSource {
    fn source_name(&self) -> &'static str;

    #[allow(clippy::missing_errors_doc)]
    fn popular_movies(&self, page: u32) -> Result<Vec<RawMovieRecord>>;

    #[allow(clippy::missing_errors_doc)]
    fn genres(&self) -> Result<Vec<GenrePair>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmdbConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

impl TmdbConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    agent: ureq::Agent,
    config: TmdbConfig,
}

impl TmdbClient {
    /// # Errors
    /// Returns an error when the API key or base URL is empty.
    pub fn new(config: TmdbConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow!("TMDB api key MUST be non-empty"));
        }
        if config.base_url.trim().is_empty() {
            return Err(anyhow!("TMDB base_url MUST be non-empty"));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Ok(Self { agent, config })
    }

    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn movie_details(&self, movie_id: i64) -> Result<Value> {
        self.get_json(&format!("/movie/{movie_id}"), &[])
    }

    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub fn movie_credits(&self, movie_id: i64) -> Result<Value> {
        self.get_json(&format!("/movie/{movie_id}/credits"), &[])
    }

    /// Details of one movie with its cast and crew under `credits`.
    ///
    /// # Errors
    /// Returns an error when either request fails or the details body is not
    /// a JSON object.
    pub fn movie_with_details(&self, movie_id: i64) -> Result<Value> {
        let details = self.movie_details(movie_id)?;
        let credits = self.movie_credits(movie_id)?;
        attach_credits(details, credits)
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint_url(endpoint);
        let mut request = self
            .agent
            .get(&url)
            .query("api_key", &self.config.api_key);
        for (key, value) in query {
            request = request.query(key, value);
        }

        match request.call() {
            Ok(response) => response
                .into_json::<Value>()
                .with_context(|| format!("failed to decode JSON from {endpoint}")),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                tracing::warn!(endpoint, status = code, "catalog request failed");
                Err(anyhow!("catalog request {endpoint} failed with http status {code}: {body}"))
            }
            Err(ureq::Error::Transport(err)) => {
                tracing::warn!(endpoint, error = %err, "catalog transport failure");
                Err(anyhow!("http transport failure for {endpoint}: {err}"))
            }
        }
    }
}

impl CatalogSource for TmdbClient {
    fn source_name(&self) -> &'static str {
        "tmdb"
    }

    fn popular_movies(&self, page: u32) -> Result<Vec<RawMovieRecord>> {
        let body = self.get_json("/movie/popular", &[("page", page.to_string())])?;
        Ok(records_from_results(&body))
    }

    fn genres(&self) -> Result<Vec<GenrePair>> {
        let body = self.get_json("/genre/movie/list", &[])?;
        Ok(genres_from_body(&body))
    }
}

/// A harvested catalog persisted as JSON so the pipeline can be rerun offline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogSnapshot {
    pub movies: Vec<Value>,
    pub genres: Vec<GenrePair>,
}

impl CatalogSnapshot {
    /// # Errors
    /// Returns an error when the file cannot be read or is not a snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))
    }

    /// # Errors
    /// Returns an error when the snapshot cannot be encoded or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = serde_json::to_string_pretty(self).context("failed to encode snapshot")?;
        fs::write(path, encoded)
            .with_context(|| format!("failed to write snapshot {}", path.display()))
    }

    /// # Errors
    /// Returns an error when any record fails to encode; no record is dropped.
    pub fn from_records(records: &[RawMovieRecord], genres: Vec<GenrePair>) -> Result<Self> {
        let movies = records
            .iter()
            .map(|record| {
                serde_json::to_value(record)
                    .with_context(|| format!("failed to encode movie record {:?}", record.id))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { movies, genres })
    }

    #[must_use]
    pub fn records(&self) -> Vec<RawMovieRecord> {
        self.movies.iter().map(RawMovieRecord::from_json).collect()
    }
}

/// Serves a [`CatalogSnapshot`] with the same paging as the remote catalog.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    snapshot: CatalogSnapshot,
}

impl SnapshotSource {
    #[must_use]
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self { snapshot }
    }

    /// # Errors
    /// Returns an error when the snapshot file cannot be loaded.
    pub fn open(path: &Path) -> Result<Self> {
        CatalogSnapshot::load(path).map(Self::new)
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        let pages = self.snapshot.movies.len().div_ceil(PAGE_SIZE);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }
}

impl CatalogSource for SnapshotSource {
    fn source_name(&self) -> &'static str {
        "snapshot"
    }

    fn popular_movies(&self, page: u32) -> Result<Vec<RawMovieRecord>> {
        if page == 0 {
            return Err(anyhow!("page numbers start at 1"));
        }
        let start = usize::try_from(page - 1)
            .context("page out of range")?
            .saturating_mul(PAGE_SIZE);
        Ok(self
            .snapshot
            .movies
            .iter()
            .skip(start)
            .take(PAGE_SIZE)
            .map(RawMovieRecord::from_json)
            .collect())
    }

    fn genres(&self) -> Result<Vec<GenrePair>> {
        Ok(self.snapshot.genres.clone())
    }
}

/// Concatenates the results of pages `1..=pages`, pausing `delay` between
/// requests. Stops early once a page comes back empty.
///
/// # Errors
/// Returns the first page error.
pub fn collect_popular_movies(
    source: &dyn CatalogSource,
    pages: u32,
    delay: Duration,
) -> Result<Vec<RawMovieRecord>> {
    let mut movies = Vec::new();
    for page in 1..=pages {
        if page > 1 && !delay.is_zero() {
            thread::sleep(delay);
        }
        let batch = source
            .popular_movies(page)
            .with_context(|| format!("failed to fetch page {page} from {}", source.source_name()))?;
        tracing::debug!(page, records = batch.len(), "fetched catalog page");
        if batch.is_empty() {
            break;
        }
        movies.extend(batch);
    }

    tracing::info!(
        source = source.source_name(),
        movies = movies.len(),
        "collected popular movies"
    );
    Ok(movies)
}

fn attach_credits(mut details: Value, credits: Value) -> Result<Value> {
    let Some(object) = details.as_object_mut() else {
        return Err(anyhow!("movie details response is not a JSON object"));
    };
    object.insert("credits".to_string(), credits);
    Ok(details)
}

fn records_from_results(body: &Value) -> Vec<RawMovieRecord> {
    body.get("results")
        .and_then(Value::as_array)
        .map(|results| results.iter().map(RawMovieRecord::from_json).collect())
        .unwrap_or_default()
}

fn genres_from_body(body: &Value) -> Vec<GenrePair> {
    body.get("genres")
        .and_then(Value::as_array)
        .map(|genres| {
            genres
                .iter()
                .filter_map(|genre| {
                    Some(GenrePair {
                        id: genre.get("id").and_then(Value::as_i64)?,
                        name: genre.get("name").and_then(Value::as_str)?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
