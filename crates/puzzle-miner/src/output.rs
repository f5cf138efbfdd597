//! JSON files written by the miner.
//!
//! - the puzzles file, with a placeholder puzzle when nothing was found
//! - themed groupings of the puzzles by difficulty and blunder type
//! - per-game position evaluations
//! - the evaluation log, appended to across runs

use blunder_analysis::{PositionEvaluation, PuzzleBlunder};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

const PLACEHOLDER_MESSAGE: &str =
    "No blunders found in recent games. This is a placeholder puzzle.";

#[derive(Serialize)]
struct PuzzleFile<'a> {
    puzzles: &'a [PuzzleBlunder],
    count: usize,
    generated_at: String,
    username: &'a str,
    platform: &'a str,
}

/// Stand-in written when a run finds no puzzles, so consumers of the
/// puzzles file always have something to show.
#[derive(Serialize)]
struct PlaceholderPuzzle {
    fen: &'static str,
    solution: [&'static str; 1],
    player_color: &'static str,
    move_number: u32,
    blundered_move: &'static str,
    eval_change: i32,
    difficulty: u8,
    difficulty_label: &'static str,
    game_url: &'static str,
    is_placeholder: bool,
}

static PLACEHOLDER: PlaceholderPuzzle = PlaceholderPuzzle {
    fen: "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5Q2/PPPP1PPP/RNB1K1NR b KQkq - 3 3",
    solution: ["g8f6"],
    player_color: "black",
    move_number: 3,
    blundered_move: "Nc6",
    eval_change: 900,
    difficulty: 2,
    difficulty_label: "Easy",
    game_url: "https://lichess.org/learn#/4",
    is_placeholder: true,
};

#[derive(Serialize)]
struct PlaceholderFile<'a> {
    puzzles: [&'a PlaceholderPuzzle; 1],
    count: usize,
    generated_at: String,
    username: &'a str,
    platform: &'a str,
    is_placeholder: bool,
    message: &'a str,
}

#[derive(Serialize)]
struct PuzzleGroup<'a> {
    puzzles: Vec<&'a PuzzleBlunder>,
    count: usize,
}

#[derive(Serialize)]
struct ThemedFile<'a> {
    by_difficulty: BTreeMap<String, PuzzleGroup<'a>>,
    by_blunder_type: BTreeMap<String, PuzzleGroup<'a>>,
    total_count: usize,
    generated_at: String,
    username: &'a str,
}

#[derive(Serialize)]
struct GameEvaluationsFile<'a> {
    game_id: &'a str,
    evaluations: &'a [PositionEvaluation],
    count: usize,
    generated_at: String,
}

/// Search settings recorded when an evaluation log is first created.
#[derive(Debug, Clone, Serialize)]
pub struct LogSettings {
    pub thinking_time: String,
    pub depth: String,
    pub username: String,
}

impl LogSettings {
    pub fn new(time_limit_secs: f64, depth: u32, username: &str) -> Self {
        Self {
            thinking_time: format!("{} seconds", time_limit_secs),
            depth: depth.to_string(),
            username: username.to_string(),
        }
    }
}

#[derive(Serialize)]
struct NewLogFile<'a> {
    evaluations: &'a [PositionEvaluation],
    count: usize,
    generated_at: String,
    settings: &'a LogSettings,
}

#[derive(Serialize)]
struct AppendedLogFile<'a> {
    evaluations: &'a [Value],
    count: usize,
    last_updated: String,
    username: &'a str,
}

/// What happened to the evaluation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogWrite {
    /// Nothing to write.
    Empty,
    /// A new log was created holding this many evaluations.
    Created(usize),
    /// The existing log now holds this many evaluations.
    Appended(usize),
    /// The existing log was unusable; the evaluations went to this file.
    BackedUp(PathBuf),
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

/// Keeps a game id usable as part of a file name.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Writes the puzzles file.
///
/// With no puzzles, a single placeholder puzzle is written instead and the
/// file is marked with `is_placeholder` and a `message`.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be created or written.
pub fn write_puzzles(
    path: &Path,
    puzzles: &[PuzzleBlunder],
    username: &str,
    platform: &str,
) -> io::Result<()> {
    if puzzles.is_empty() {
        return write_pretty(
            path,
            &PlaceholderFile {
                puzzles: [&PLACEHOLDER],
                count: 1,
                generated_at: timestamp(),
                username,
                platform,
                is_placeholder: true,
                message: PLACEHOLDER_MESSAGE,
            },
        );
    }

    write_pretty(
        path,
        &PuzzleFile {
            puzzles,
            count: puzzles.len(),
            generated_at: timestamp(),
            username,
            platform,
        },
    )
}

fn into_groups(
    groups: BTreeMap<String, Vec<&PuzzleBlunder>>,
) -> BTreeMap<String, PuzzleGroup<'_>> {
    groups
        .into_iter()
        .map(|(key, puzzles)| {
            let count = puzzles.len();
            (key, PuzzleGroup { puzzles, count })
        })
        .collect()
}

/// Writes the puzzles grouped by difficulty level and by blunder type into
/// `dir/themed_puzzles_<YYYYmmdd_HHMMSS>.json`.
///
/// Returns the path written, or `None` when there are no puzzles.
pub fn write_themed_puzzles(
    dir: &Path,
    puzzles: &[PuzzleBlunder],
    username: &str,
) -> io::Result<Option<PathBuf>> {
    if puzzles.is_empty() {
        return Ok(None);
    }

    let mut by_difficulty: BTreeMap<String, Vec<&PuzzleBlunder>> = BTreeMap::new();
    let mut by_blunder_type: BTreeMap<String, Vec<&PuzzleBlunder>> = BTreeMap::new();
    for puzzle in puzzles {
        by_difficulty
            .entry(puzzle.difficulty().to_string())
            .or_default()
            .push(puzzle);
        by_blunder_type
            .entry(puzzle.blunder_type().to_string())
            .or_default()
            .push(puzzle);
    }
    let now = Utc::now();
    let path = dir.join(format!(
        "themed_puzzles_{}.json",
        now.format("%Y%m%d_%H%M%S")
    ));
    write_pretty(
        &path,
        &ThemedFile {
            by_difficulty: into_groups(by_difficulty),
            by_blunder_type: into_groups(by_blunder_type),
            total_count: puzzles.len(),
            generated_at: now.to_rfc3339(),
            username,
        },
    )?;
    Ok(Some(path))
}

/// Writes one game's evaluations to `dir/evaluations_<game_id>.json`.
pub fn write_game_evaluations(
    dir: &Path,
    game_id: &str,
    evaluations: &[PositionEvaluation],
) -> io::Result<PathBuf> {
    let path = dir.join(format!("evaluations_{}.json", file_safe(game_id)));
    write_pretty(
        &path,
        &GameEvaluationsFile {
            game_id,
            evaluations,
            count: evaluations.len(),
            generated_at: timestamp(),
        },
    )?;
    Ok(path)
}

fn existing_evaluations(path: &Path) -> io::Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    let mut log: Value = serde_json::from_str(&content)?;
    match log.get_mut("evaluations").map(Value::take) {
        Some(Value::Array(entries)) => Ok(entries),
        None => Ok(Vec::new()),
        Some(_) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "\"evaluations\" is not an array",
        )),
    }
}

fn write_new_log(
    path: &Path,
    evaluations: &[PositionEvaluation],
    settings: &LogSettings,
) -> io::Result<()> {
    write_pretty(
        path,
        &NewLogFile {
            evaluations,
            count: evaluations.len(),
            generated_at: timestamp(),
            settings,
        },
    )
}

/// Adds a game's evaluations to the evaluation log at `log_path`.
///
/// A missing log is created with a `settings` block. An existing log keeps
/// its entries and gains the new ones. If the existing log cannot be read or
/// parsed, the evaluations are written to
/// `backup_dir/eval_backup_<game_id>.json` and the log is left alone.
///
/// # Errors
///
/// Returns an `io::Error` only if the final write (log or backup) fails.
pub fn append_evaluation_log(
    log_path: &Path,
    backup_dir: &Path,
    game_id: &str,
    evaluations: &[PositionEvaluation],
    settings: &LogSettings,
) -> io::Result<LogWrite> {
    if evaluations.is_empty() {
        return Ok(LogWrite::Empty);
    }

    if !log_path.exists() {
        write_new_log(log_path, evaluations, settings)?;
        return Ok(LogWrite::Created(evaluations.len()));
    }

    match existing_evaluations(log_path) {
        Ok(mut entries) => {
            for evaluation in evaluations {
                entries.push(serde_json::to_value(evaluation)?);
            }
            write_pretty(
                log_path,
                &AppendedLogFile {
                    evaluations: &entries,
                    count: entries.len(),
                    last_updated: timestamp(),
                    username: &settings.username,
                },
            )?;
            info!(
                added = evaluations.len(),
                total = entries.len(),
                "updated evaluation log"
            );
            Ok(LogWrite::Appended(entries.len()))
        }
        Err(e) => {
            error!(log = %log_path.display(), error = %e, "error updating evaluation log");
            let backup = backup_dir.join(format!("eval_backup_{}.json", file_safe(game_id)));
            write_new_log(&backup, evaluations, settings)?;
            Ok(LogWrite::BackedUp(backup))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blunder_analysis::walker::tracked_turns;
    use blunder_analysis::{BlunderClassifier, BlunderKind};
    use shakmaty::{Chess, Color};

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn puzzle(prev: i32, curr: i32) -> PuzzleBlunder {
        let moves: Vec<String> = ["e4", "e5", "Nf3"].iter().map(|m| m.to_string()).collect();
        let turn = tracked_turns(Chess::default(), &moves, Color::White)
            .last()
            .unwrap();
        let verdict = BlunderClassifier::default().classify(prev, curr, Color::White);
        PuzzleBlunder::new(&turn, "d7d5", None, &verdict, "https://lichess.org/abc").unwrap()
    }

    fn evaluation(move_number: u32, curr: i32) -> PositionEvaluation {
        PositionEvaluation::new("abc", move_number, "fen", Color::White, "e4", 20, curr, None)
    }

    fn settings() -> LogSettings {
        LogSettings::new(20.0, 22, "alice")
    }

    #[test]
    fn test_write_puzzles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("puzzles.json");
        write_puzzles(&path, &[puzzle(0, -600)], "alice", "lichess").unwrap();

        let json = read_json(&path);
        assert_eq!(json["count"], 1);
        assert_eq!(json["username"], "alice");
        assert_eq!(json["platform"], "lichess");
        assert_eq!(json["puzzles"][0]["solution"][0], "d7d5");
        assert_eq!(json["puzzles"][0]["player_color"], "black");
        assert!(json.get("is_placeholder").is_none());
        assert!(json["generated_at"].is_string());
    }

    #[test]
    fn test_write_puzzles_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("puzzles.json");
        write_puzzles(&path, &[], "alice", "lichess").unwrap();

        let json = read_json(&path);
        assert_eq!(json["count"], 1);
        assert_eq!(json["is_placeholder"], true);
        assert_eq!(json["message"], PLACEHOLDER_MESSAGE);
        let placeholder = &json["puzzles"][0];
        assert_eq!(placeholder["is_placeholder"], true);
        assert_eq!(placeholder["solution"][0], "g8f6");
        assert_eq!(placeholder["difficulty_label"], "Easy");
    }

    #[test]
    fn test_placeholder_solution_is_legal() {
        let pos = blunder_analysis::game::position_from_fen(PLACEHOLDER.fen).unwrap();
        assert!(blunder_analysis::notation::resolve_move(&pos, PLACEHOLDER.solution[0]).is_ok());
    }

    #[test]
    fn test_write_themed_puzzles() {
        let dir = tempfile::tempdir().unwrap();
        let puzzles = vec![puzzle(0, -600), puzzle(100, -1500), puzzle(50, -700)];
        let path = write_themed_puzzles(dir.path(), &puzzles, "alice")
            .unwrap()
            .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("themed_puzzles_"));
        assert!(name.ends_with(".json"));

        let json = read_json(&path);
        assert_eq!(json["total_count"], 3);
        assert_eq!(json["by_difficulty"]["4"]["count"], 2);
        assert_eq!(json["by_difficulty"]["1"]["count"], 1);
        assert_eq!(
            json["by_blunder_type"][BlunderKind::Blunder.as_str()]["count"],
            3
        );
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn test_write_themed_puzzles_skips_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(write_themed_puzzles(dir.path(), &[], "alice").unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_game_evaluations() {
        let dir = tempfile::tempdir().unwrap();
        let evals = vec![evaluation(1, -10), evaluation(2, 30)];
        let path = write_game_evaluations(dir.path(), "abc", &evals).unwrap();

        assert_eq!(path, dir.path().join("evaluations_abc.json"));
        let json = read_json(&path);
        assert_eq!(json["game_id"], "abc");
        assert_eq!(json["count"], 2);
        assert_eq!(json["evaluations"][1]["move_number"], 2);
    }

    #[test]
    fn test_game_id_is_made_file_safe() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_game_evaluations(dir.path(), "a?b/c", &[evaluation(1, 0)]).unwrap();
        assert_eq!(path, dir.path().join("evaluations_a_b_c.json"));
    }

    #[test]
    fn test_evaluation_log_created_then_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("position_evaluations.json");

        let first = append_evaluation_log(&log, dir.path(), "g1", &[evaluation(1, 0)], &settings())
            .unwrap();
        assert_eq!(first, LogWrite::Created(1));
        let json = read_json(&log);
        assert_eq!(json["count"], 1);
        assert_eq!(json["settings"]["thinking_time"], "20 seconds");
        assert_eq!(json["settings"]["depth"], "22");
        assert_eq!(json["settings"]["username"], "alice");

        let second = append_evaluation_log(
            &log,
            dir.path(),
            "g2",
            &[evaluation(1, 0), evaluation(2, 0)],
            &settings(),
        )
        .unwrap();
        assert_eq!(second, LogWrite::Appended(3));
        let json = read_json(&log);
        assert_eq!(json["count"], 3);
        assert_eq!(json["evaluations"].as_array().unwrap().len(), 3);
        assert_eq!(json["username"], "alice");
        assert!(json["last_updated"].is_string());
    }

    #[test]
    fn test_evaluation_log_keeps_unknown_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.json");
        std::fs::write(&log, r#"{"evaluations": [{"legacy": true}]}"#).unwrap();

        let result =
            append_evaluation_log(&log, dir.path(), "g", &[evaluation(1, 0)], &settings()).unwrap();
        assert_eq!(result, LogWrite::Appended(2));
        assert_eq!(read_json(&log)["evaluations"][0]["legacy"], true);
    }

    #[test]
    fn test_corrupt_evaluation_log_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.json");
        std::fs::write(&log, "{ not json").unwrap();
        let backup_dir = dir.path().join("evaluations");

        let result =
            append_evaluation_log(&log, &backup_dir, "xyz", &[evaluation(1, 0)], &settings())
                .unwrap();
        let backup = backup_dir.join("eval_backup_xyz.json");
        assert_eq!(result, LogWrite::BackedUp(backup.clone()));
        assert_eq!(read_json(&backup)["count"], 1);
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "{ not json");
    }

    #[test]
    fn test_empty_evaluations_leave_log_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.json");
        let result = append_evaluation_log(&log, dir.path(), "g", &[], &settings()).unwrap();
        assert_eq!(result, LogWrite::Empty);
        assert!(!log.exists());
    }
}
