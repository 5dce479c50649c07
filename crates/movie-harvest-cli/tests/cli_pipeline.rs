#![allow(clippy::single_match_else, clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rusqlite::Connection;
use serde_json::Value;
use ulid::Ulid;

fn harvest_binary_path() -> PathBuf {
    match std::env::var("CARGO_BIN_EXE_harvest") {
        Ok(value) => PathBuf::from(value),
        Err(_) => Path::new(env!("CARGO_MANIFEST_DIR")).join("../../target/debug/harvest"),
    }
}

fn fixture_snapshot() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/catalog_snapshot.json")
}

fn temp_path(prefix: &str, extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{prefix}-{}{extension}", Ulid::new()))
}

fn harvest_output(db_path: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(harvest_binary_path());
    command.env_remove("TMDB_API_KEY");
    command.env("LOG_LEVEL", "warn");
    command.arg("--db").arg(db_path);
    for arg in args {
        command.arg(arg);
    }

    match command.output() {
        Ok(output) => output,
        Err(err) => panic!("failed to run harvest command {:?}: {err}", args),
    }
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed\nstdout={}\nstderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout_json(output: &Output) -> Value {
    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(value) => value,
        Err(err) => panic!(
            "failed to parse stdout as JSON: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value.as_f64() {
        Some(number) => number,
        None => panic!("expected number, got {value}"),
    }
}

fn run_fixture(db_path: &Path, extra: &[&str]) -> Value {
    let snapshot = fixture_snapshot();
    let snapshot = snapshot.to_string_lossy().to_string();
    let mut args = vec!["run", "--snapshot", snapshot.as_str(), "--json"];
    args.extend_from_slice(extra);
    let output = harvest_output(db_path, &args);
    assert_success(&output);
    stdout_json(&output)
}

#[test]
fn help_lists_expected_subcommands() {
    let output = match Command::new(harvest_binary_path()).arg("--help").output() {
        Ok(value) => value,
        Err(err) => panic!("failed to run help command: {err}"),
    };

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for required in ["fetch", "details", "run", "trends", "top-rated", "by-year", "languages", "runs"] {
        assert!(stdout.contains(required), "missing subcommand {required}");
    }
}

#[test]
fn run_from_snapshot_stores_movies_and_reports_summary() {
    let db_path = temp_path("movie-harvest-cli", ".sqlite3");
    let summary = run_fixture(&db_path, &[]);

    assert_eq!(summary["run"]["source"], "snapshot");
    assert_eq!(summary["run"]["movie_count"], 3);
    assert_eq!(summary["store"]["stored"], 3);
    assert_eq!(summary["trend_years"], 1);
    assert!((as_f64(&summary["run"]["mean_vote_average"]) - 6.5).abs() < 1e-9);
    assert_eq!(summary["top_genres"], serde_json::json!(["Action", "Drama"]));
    assert_eq!(
        summary["movies_by_year"],
        serde_json::json!([{"release_year": 2020, "movie_count": 2}])
    );
    let summary_top = match summary["top_rated"].as_array() {
        Some(rows) => rows.iter().map(|row| row["id"].clone()).collect::<Vec<_>>(),
        None => panic!("summary has no top_rated list"),
    };
    assert_eq!(summary_top, vec![Value::from(1), Value::from(3), Value::from(2)]);

    let conn = match Connection::open(&db_path) {
        Ok(value) => value,
        Err(err) => panic!("failed to open db: {err}"),
    };
    let undated: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM movies WHERE release_year IS NULL",
        [],
        |row| row.get(0),
    ) {
        Ok(value) => value,
        Err(err) => panic!("failed to count undated movies: {err}"),
    };
    assert_eq!(undated, 1);
}

#[test]
fn read_commands_answer_from_the_stored_snapshot() {
    let db_path = temp_path("movie-harvest-cli", ".sqlite3");
    run_fixture(&db_path, &[]);

    let top = harvest_output(&db_path, &["top-rated", "--limit", "3", "--json"]);
    assert_success(&top);
    let top = stdout_json(&top);
    let ids = match top.as_array() {
        Some(rows) => rows.iter().map(|row| row["id"].clone()).collect::<Vec<_>>(),
        None => panic!("expected array, got {top}"),
    };
    assert_eq!(ids, vec![Value::from(1), Value::from(3), Value::from(2)]);
    assert!((as_f64(&top[0]["weighted_rating"]) - 7.8636).abs() < 1e-3);

    let by_year = harvest_output(&db_path, &["by-year", "--json"]);
    assert_success(&by_year);
    assert_eq!(
        stdout_json(&by_year),
        serde_json::json!([{"release_year": 2020, "movie_count": 2}])
    );

    let languages = harvest_output(&db_path, &["languages", "--threshold", "1", "--json"]);
    assert_success(&languages);
    let languages = stdout_json(&languages);
    assert_eq!(languages[0]["language"], "en");
    assert_eq!(languages[0]["movie_count"], 2);
    assert_eq!(languages[1]["language"], "fr");

    let folded = harvest_output(&db_path, &["languages", "--json"]);
    assert_success(&folded);
    let folded = stdout_json(&folded);
    assert_eq!(folded[0]["language"], "Other");
    assert_eq!(folded[0]["movie_count"], 3);
}

#[test]
fn trends_report_shares_and_excludes_undated_movies() {
    let db_path = temp_path("movie-harvest-cli", ".sqlite3");
    run_fixture(&db_path, &[]);

    let output = harvest_output(&db_path, &["trends", "--json"]);
    assert_success(&output);
    let report = stdout_json(&output);

    let ratings = &report["ratings"]["rows"];
    assert_eq!(ratings[0]["release_year"], 2020);
    assert_eq!(ratings[0]["count"], 2);
    assert!((as_f64(&ratings[0]["mean"]) - 6.5).abs() < 1e-9);
    assert!(ratings[0]["yearly_change"].is_null());

    let shares = &report["genres"]["rows"][0]["shares"];
    assert!((as_f64(&shares["Action"]) - 50.0).abs() < 1e-9);
    assert!((as_f64(&shares["Drama"]) - 50.0).abs() < 1e-9);

    let only_popularity = harvest_output(&db_path, &["trends", "--category", "popularity", "--json"]);
    assert_success(&only_popularity);
    let only_popularity = stdout_json(&only_popularity);
    assert!(only_popularity["ratings"].is_null());
    assert!((as_f64(&only_popularity["popularity"]["rows"][0]["max"]) - 120.5).abs() < 1e-9);
}

#[test]
fn run_exports_output_files_and_records_runs() {
    let db_path = temp_path("movie-harvest-cli", ".sqlite3");
    let export_dir = temp_path("movie-harvest-export", "");
    let export_arg = export_dir.to_string_lossy().to_string();

    let summary = run_fixture(&db_path, &["--export-dir", export_arg.as_str()]);
    assert_eq!(summary["exported"].as_array().map(Vec::len), Some(5));
    run_fixture(&db_path, &[]);

    let features_raw = match std::fs::read_to_string(export_dir.join("features.json")) {
        Ok(value) => value,
        Err(err) => panic!("failed to read features export: {err}"),
    };
    let features: Value = match serde_json::from_str(&features_raw) {
        Ok(value) => value,
        Err(err) => panic!("failed to parse features export: {err}"),
    };
    let columns = match features["columns"].as_array() {
        Some(columns) => columns.clone(),
        None => panic!("features export has no columns"),
    };
    assert_eq!(columns[0], "genre_action");
    assert_eq!(columns[1], "genre_drama");
    assert_eq!(features["rows"].as_array().map(Vec::len), Some(3));
    for name in ["rating_trends.json", "genre_trends.json", "popularity_trends.json", "top_genres.json"] {
        assert!(export_dir.join(name).exists(), "missing export {name}");
    }

    let runs = harvest_output(&db_path, &["runs", "--limit", "5"]);
    assert_success(&runs);
    let runs = stdout_json(&runs);
    assert_eq!(runs.as_array().map(Vec::len), Some(2));

    let _ = std::fs::remove_dir_all(&export_dir);
}

#[test]
fn network_commands_fail_without_api_key() {
    let db_path = temp_path("movie-harvest-cli", ".sqlite3");
    let output_path = temp_path("movie-harvest-fetch", ".json");
    let output_arg = output_path.to_string_lossy().to_string();

    let fetch = harvest_output(&db_path, &["fetch", "--output", output_arg.as_str()]);
    assert!(!fetch.status.success());
    assert!(String::from_utf8_lossy(&fetch.stderr).contains("TMDB_API_KEY"));
    assert!(!output_path.exists());

    let run = harvest_output(&db_path, &["run", "--pages", "1"]);
    assert!(!run.status.success());

    let details = harvest_output(&db_path, &["details", "--id", "550"]);
    assert!(!details.status.success());
    assert!(String::from_utf8_lossy(&details.stderr).contains("TMDB_API_KEY"));
}

#[test]
fn invalid_config_is_rejected_before_any_work() {
    let db_path = temp_path("movie-harvest-cli", ".sqlite3");
    let config_path = temp_path("movie-harvest-config", ".yaml");
    if let Err(err) = std::fs::write(&config_path, "cleaning:\n  min_votes: 0\n") {
        panic!("failed to write config fixture: {err}");
    }
    let config_arg = config_path.to_string_lossy().to_string();

    let output = harvest_output(&db_path, &["--config", config_arg.as_str(), "by-year", "--json"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("min_votes"));

    let _ = std::fs::remove_file(&config_path);
}
