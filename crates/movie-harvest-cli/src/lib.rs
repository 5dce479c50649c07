//! Command surface for the `harvest` binary.
//!
//! - `fetch` collects the popular catalog into a snapshot file.
//! - `details` prints one movie's details and credits from TMDB.
//! - `run` executes the full pipeline (harvest, normalize, clean, trends,
//!   features) and replaces the stored snapshot.
//! - the remaining commands answer read-side queries from the store.

mod config;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use movie_harvest_catalog::{
    collect_popular_movies, CatalogSnapshot, CatalogSource, SnapshotSource, TmdbClient,
    TmdbConfig,
};
use movie_harvest_core::{
    clean, enrich_all, language_distribution, movies_by_year, normalize_all, now_utc, top_rated,
    CanonicalMovie, CleanedDataset,
    FeatureTable, GenreLookup, GenrePair, GenreShareTable, LanguageShare, PopularityTrendTable,
    RatingTrendTable, RawMovieRecord, TrendCategory, TrendDetector, TrendReport, YearCount,
};
use movie_harvest_store_sqlite::{HarvestRun, RatedMovie, SqliteMovieStore, StoreReport};
use serde::Serialize;
use ulid::Ulid;

pub use config::{CatalogSettings, HarvestConfig, DEFAULT_PAGES};

/// How many of the batch's best-rated movies a run summary lists.
pub const SUMMARY_TOP_RATED: usize = 5;

#[derive(Debug, Parser)]
#[command(name = "harvest")]
#[command(about = "Movie metadata harvest and trend analysis")]
pub struct Cli {
    #[arg(long, default_value = "./movie_data.sqlite3")]
    db: PathBuf,

    /// Optional YAML settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "TMDB_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Fetch(FetchArgs),
    Details(DetailsArgs),
    Run(RunArgs),
    Trends(TrendsArgs),
    TopRated(TopRatedArgs),
    ByYear(JsonArgs),
    Languages(LanguagesArgs),
    Runs(RunsArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[arg(long)]
    pages: Option<u32>,
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Args)]
pub struct DetailsArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Read the catalog from a snapshot file instead of the network.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    #[arg(long, conflicts_with = "snapshot")]
    pages: Option<u32>,
    #[arg(long)]
    export_dir: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct TrendsArgs {
    #[arg(long)]
    category: Option<TrendCategoryArg>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct TopRatedArgs {
    #[arg(long, default_value_t = 10)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct JsonArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct LanguagesArgs {
    #[arg(long, default_value_t = movie_harvest_core::DEFAULT_LANGUAGE_THRESHOLD)]
    threshold: usize,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TrendCategoryArg {
    Ratings,
    Genres,
    Popularity,
}

/// Everything one pipeline pass derives from a harvested batch.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub dataset: CleanedDataset,
    pub trends: TrendReport,
    pub top_genres: Vec<String>,
    pub features: FeatureTable,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run: HarvestRun,
    pub store: StoreReport,
    pub trend_years: usize,
    pub top_genres: Vec<String>,
    pub movies_by_year: Vec<YearCount>,
    pub top_rated: Vec<SummaryMovie>,
    pub exported: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummaryMovie {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub weighted_rating: f64,
}

impl From<&CanonicalMovie> for SummaryMovie {
    fn from(movie: &CanonicalMovie) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            weighted_rating: movie.weighted_rating,
        }
    }
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when configuration loading, store open/migrate, catalog
/// access, or command execution fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let config = HarvestConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Fetch(args) => run_fetch(&args, &config, cli.api_key.as_deref()),
        Command::Details(args) => {
            let client = tmdb_client(&config, cli.api_key.as_deref())?;
            let movie = client.movie_with_details(args.id)?;
            println!("{}", serde_json::to_string_pretty(&movie)?);
            Ok(())
        }
        command => {
            let mut store = SqliteMovieStore::open(&cli.db)?;
            store.migrate()?;
            run_with_store(command, &config, cli.api_key.as_deref(), &mut store)
        }
    }
}

fn run_with_store(
    command: Command,
    config: &HarvestConfig,
    api_key: Option<&str>,
    store: &mut SqliteMovieStore,
) -> Result<()> {
    match command {
        Command::Run(args) => {
            let summary = run_harvest(&args, config, api_key, store)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_run_summary(&summary);
            }
            Ok(())
        }
        Command::Trends(args) => {
            let movies = store.list_movies()?;
            let detector = TrendDetector::new(config.trends);
            let report = match args.category.map(map_category) {
                None => detector.detect_all(&movies),
                Some(TrendCategory::Ratings) => {
                    TrendReport::default().with_ratings(detector.detect_rating_trends(&movies))
                }
                Some(TrendCategory::Genres) => {
                    TrendReport::default().with_genres(detector.detect_genre_trends(&movies))
                }
                Some(TrendCategory::Popularity) => TrendReport::default()
                    .with_popularity(detector.detect_popularity_trends(&movies)),
            };

            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_trend_report(&report, config.trends.top_genre_count);
            }
            Ok(())
        }
        Command::TopRated(args) => {
            let movies = store.top_rated(args.limit)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&movies)?);
            } else {
                print_top_rated(&movies);
            }
            Ok(())
        }
        Command::ByYear(args) => {
            let counts = store.movies_by_year()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                print_year_counts(&counts);
            }
            Ok(())
        }
        Command::Languages(args) => {
            let movies = store.list_movies()?;
            let shares = language_distribution(&movies, args.threshold);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&shares)?);
            } else {
                print_language_shares(&shares);
            }
            Ok(())
        }
        Command::Runs(args) => {
            let runs = store.list_runs(args.limit)?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
            Ok(())
        }
        Command::Fetch(_) | Command::Details(_) => Err(anyhow!(
            "internal dispatch error: network commands should be handled before store initialization"
        )),
    }
}

/// Normalizes, cleans, aggregates, and enriches one harvested batch.
#[must_use]
pub fn run_pipeline(
    raws: &[RawMovieRecord],
    genres: &[GenrePair],
    config: &HarvestConfig,
) -> PipelineOutput {
    let lookup = GenreLookup::from_pairs(genres);
    let rows = normalize_all(raws, &lookup);
    tracing::info!(records = rows.len(), genres = lookup.len(), "normalized catalog records");

    let dataset = clean(rows, &config.cleaning);
    tracing::info!(
        movies = dataset.len(),
        mean_vote_average = dataset.mean_vote_average,
        "cleaned dataset"
    );

    let trends = TrendDetector::new(config.trends).detect_all(&dataset.movies);
    let top_genres = trends
        .genres
        .as_ref()
        .map(|table| table.top_genres(config.trends.top_genre_count))
        .unwrap_or_default();
    tracing::info!(categories = trends.categories().len(), "detected trends");

    let features = enrich_all(&dataset.movies);
    tracing::info!(columns = features.columns.len(), "derived features");

    PipelineOutput {
        dataset,
        trends,
        top_genres,
        features,
    }
}

fn run_harvest(
    args: &RunArgs,
    config: &HarvestConfig,
    api_key: Option<&str>,
    store: &mut SqliteMovieStore,
) -> Result<RunSummary> {
    let started_at = now_utc();

    let (source, pages, delay) = match &args.snapshot {
        Some(path) => {
            let source = SnapshotSource::open(path)?;
            let pages = source.page_count();
            (Box::new(source) as Box<dyn CatalogSource>, pages, Duration::ZERO)
        }
        None => (
            Box::new(tmdb_client(config, api_key)?) as Box<dyn CatalogSource>,
            args.pages.unwrap_or(config.catalog.pages),
            config.catalog.request_delay(),
        ),
    };

    let genres = source.genres().context("failed to fetch genre list")?;
    let raws = collect_popular_movies(source.as_ref(), pages, delay)?;
    let output = run_pipeline(&raws, &genres, config);

    store.store_genres(&genres)?;
    let report = store.store_movies(&output.dataset.movies)?;

    let run = HarvestRun {
        run_id: Ulid::new(),
        source: source.source_name().to_string(),
        started_at,
        finished_at: now_utc(),
        movie_count: output.dataset.len(),
        stored_count: report.stored,
        skipped_count: report.skipped_missing_id,
        mean_vote_average: output.dataset.mean_vote_average,
        min_votes: output.dataset.min_votes,
    };
    store.record_run(&run)?;

    let exported = match &args.export_dir {
        Some(dir) => export_outputs(dir, &output)?,
        None => Vec::new(),
    };

    Ok(RunSummary {
        run,
        store: report,
        trend_years: output
            .trends
            .ratings
            .as_ref()
            .map_or(0, |table| table.rows.len()),
        movies_by_year: movies_by_year(&output.dataset.movies),
        top_rated: top_rated(&output.dataset.movies, SUMMARY_TOP_RATED)
            .iter()
            .map(SummaryMovie::from)
            .collect(),
        top_genres: output.top_genres,
        exported,
    })
}

fn run_fetch(args: &FetchArgs, config: &HarvestConfig, api_key: Option<&str>) -> Result<()> {
    let client = tmdb_client(config, api_key)?;
    let pages = args.pages.unwrap_or(config.catalog.pages);

    let genres = client.genres().context("failed to fetch genre list")?;
    let raws = collect_popular_movies(&client, pages, config.catalog.request_delay())?;
    let snapshot = CatalogSnapshot::from_records(&raws, genres)?;
    snapshot.save(&args.output)?;

    let payload = serde_json::json!({
        "output": args.output,
        "movies": snapshot.movies.len(),
        "genres": snapshot.genres.len(),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn tmdb_client(config: &HarvestConfig, api_key: Option<&str>) -> Result<TmdbClient> {
    let api_key = api_key.ok_or_else(|| {
        anyhow!("a TMDB api key is required: pass --api-key or set TMDB_API_KEY")
    })?;

    TmdbClient::new(TmdbConfig {
        base_url: config.catalog.base_url.clone(),
        api_key: api_key.to_string(),
        timeout_ms: config.catalog.timeout_ms,
    })
}

/// Writes the aggregate tables, the top-genre selection, and the feature
/// table as pretty JSON files under `dir`.
///
/// # Errors
/// Returns an error when the directory or any file cannot be written.
pub fn export_outputs(dir: &Path, output: &PipelineOutput) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;

    let ratings = output.trends.ratings.clone().unwrap_or_default();
    let genres = output.trends.genres.clone().unwrap_or_default();
    let popularity = output.trends.popularity.clone().unwrap_or_default();

    let written = vec![
        write_json(dir, "rating_trends.json", &ratings)?,
        write_json(dir, "genre_trends.json", &genres)?,
        write_json(dir, "popularity_trends.json", &popularity)?,
        write_json(dir, "top_genres.json", &output.top_genres)?,
        write_json(dir, "features.json", &output.features)?,
    ];
    tracing::info!(dir = %dir.display(), files = written.len(), "exported pipeline outputs");
    Ok(written)
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(name);
    let encoded = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to encode {name}"))?;
    fs::write(&path, encoded).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn map_category(value: TrendCategoryArg) -> TrendCategory {
    match value {
        TrendCategoryArg::Ratings => TrendCategory::Ratings,
        TrendCategoryArg::Genres => TrendCategory::Genres,
        TrendCategoryArg::Popularity => TrendCategory::Popularity,
    }
}

fn format_change(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |change| format!("{change:+.1}%"))
}

fn print_run_summary(summary: &RunSummary) {
    println!(
        "run_id={} source={} movies={} stored={} skipped={} duplicates={}",
        summary.run.run_id,
        summary.run.source,
        summary.run.movie_count,
        summary.store.stored,
        summary.store.skipped_missing_id,
        summary.store.duplicate_ids
    );
    println!(
        "mean_vote_average={:.3} min_votes={} trend_years={}",
        summary.run.mean_vote_average, summary.run.min_votes, summary.trend_years
    );
    println!("top_genres={}", summary.top_genres.join(","));
    let years = summary
        .movies_by_year
        .iter()
        .map(|count| format!("{}:{}", count.release_year, count.movie_count))
        .collect::<Vec<_>>();
    println!("movies_by_year={}", years.join(","));
    for movie in &summary.top_rated {
        println!(
            "top_rated id={} weighted={:.2} title={}",
            movie
                .id
                .map_or_else(|| "n/a".to_string(), |id| id.to_string()),
            movie.weighted_rating,
            movie.title.as_deref().unwrap_or("(untitled)")
        );
    }
    for path in &summary.exported {
        println!("exported={}", path.display());
    }
}

fn print_trend_report(report: &TrendReport, top_genre_count: usize) {
    if let Some(table) = &report.ratings {
        print_rating_trends(table);
    }
    if let Some(table) = &report.genres {
        print_genre_trends(table, top_genre_count);
    }
    if let Some(table) = &report.popularity {
        print_popularity_trends(table);
    }
}

fn print_rating_trends(table: &RatingTrendTable) {
    println!("ratings");
    println!(
        "{:<6} {:>6} {:>6} {:>6} {:>6} {:>8} {:>9}",
        "year", "mean", "median", "std", "count", "rolling", "change"
    );
    println!("{}", "-".repeat(54));
    for row in &table.rows {
        println!(
            "{:<6} {:>6.2} {:>6.2} {:>6.2} {:>6} {:>8.2} {:>9}",
            row.release_year,
            row.mean,
            row.median,
            row.std,
            row.count,
            row.rolling_avg,
            format_change(row.yearly_change)
        );
    }
}

fn print_genre_trends(table: &GenreShareTable, top_genre_count: usize) {
    let top = table.top_genres(top_genre_count);
    println!("genres (top {})", top.len());
    print!("{:<6}", "year");
    for genre in &top {
        print!(" {genre:>16}");
    }
    println!();
    println!("{}", "-".repeat(6 + top.len() * 17));
    for row in &table.rows {
        print!("{:<6}", row.release_year);
        for genre in &top {
            print!(" {:>15.1}%", row.shares.get(genre).copied().unwrap_or(0.0));
        }
        println!();
    }
}

fn print_popularity_trends(table: &PopularityTrendTable) {
    println!("popularity");
    println!(
        "{:<6} {:>9} {:>9} {:>9} {:>6} {:>9}",
        "year", "mean", "median", "max", "count", "change"
    );
    println!("{}", "-".repeat(54));
    for row in &table.rows {
        println!(
            "{:<6} {:>9.2} {:>9.2} {:>9.2} {:>6} {:>9}",
            row.release_year,
            row.mean,
            row.median,
            row.max,
            row.count,
            format_change(row.yearly_change)
        );
    }
}

fn print_top_rated(movies: &[RatedMovie]) {
    println!(
        "{:<10} {:<6} {:>8} {:>8} {:>8} title",
        "id", "year", "weighted", "average", "votes"
    );
    println!("{}", "-".repeat(80));
    for movie in movies {
        println!(
            "{:<10} {:<6} {:>8.2} {:>8.1} {:>8} {}",
            movie.id,
            movie
                .release_year
                .map_or_else(|| "n/a".to_string(), |year| year.to_string()),
            movie.weighted_rating,
            movie.vote_average,
            movie.vote_count,
            movie.title.as_deref().unwrap_or("(untitled)")
        );
    }
}

fn print_year_counts(counts: &[YearCount]) {
    println!("{:<6} {:>6}", "year", "movies");
    println!("{}", "-".repeat(13));
    for count in counts {
        println!("{:<6} {:>6}", count.release_year, count.movie_count);
    }
}

fn print_language_shares(shares: &[LanguageShare]) {
    println!("{:<10} {:>6} {:>7}", "language", "movies", "percent");
    println!("{}", "-".repeat(25));
    for share in shares {
        println!(
            "{:<10} {:>6} {:>6.1}%",
            share.language, share.movie_count, share.percent
        );
    }
}
