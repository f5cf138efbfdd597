//! Puzzle Miner - turns a player's blunders into puzzles.
//!
//! Reads the player's games from a PGN file, replays each one against
//! Stockfish, and writes the puzzles found plus the position evaluations
//! behind them as JSON.

mod config;
mod output;

use anyhow::{anyhow, Context};
use blunder_analysis::stats::{change_range_label, format_duration, format_eval};
use blunder_analysis::{
    check_engine, games_for_player, BlunderClassifier, EvaluationStatistics, GameAnalyzer,
    GameOutcome, GameReport, PositionEvaluation, PuzzleBlunder, PuzzleStatistics,
    StockfishOracle, Strictness,
};
use clap::Parser;
use config::MinerConfig;
use output::{LogSettings, LogWrite};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Puzzle Miner - finds blunders in a player's games and turns them into puzzles.
#[derive(Parser, Debug)]
#[command(name = "puzzle-miner")]
#[command(about = "Mine chess puzzles from a player's blunders")]
struct Cli {
    /// PGN file with the games to analyze
    #[arg(long)]
    pgn: PathBuf,

    /// Player whose moves are checked
    #[arg(short, long)]
    username: Option<String>,

    /// Platform name recorded in the output
    #[arg(long)]
    platform: Option<String>,

    /// Puzzles output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to the Stockfish executable
    #[arg(long)]
    stockfish_path: Option<String>,

    /// Thinking time per position, in seconds
    #[arg(long)]
    time_limit: Option<f64>,

    /// Search depth per position
    #[arg(long)]
    depth: Option<u32>,

    /// Maximum number of games to analyze
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Skip games shorter than this many moves
    #[arg(long)]
    min_moves: Option<usize>,

    /// Strictness preset: strict, standard, relaxed or all
    #[arg(long)]
    strictness: Option<Strictness>,

    /// Base threshold, in centipawns, for the --rescan pass
    #[arg(long)]
    rescan_threshold: Option<i32>,

    /// Save every position evaluation, not only the puzzles
    #[arg(long)]
    log_all_evaluations: bool,

    /// Look for moderate and subtle mistakes among non-blunders
    #[arg(long)]
    rescan: bool,

    /// Debug output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only
    #[arg(short, long)]
    quiet: bool,

    /// Append logs to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    /// Overrides config values with the flags that were given.
    fn apply(&self, config: &mut MinerConfig) {
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(platform) = &self.platform {
            config.platform = platform.clone();
        }
        if let Some(output) = &self.output {
            config.output_file = output.clone();
        }
        if let Some(path) = &self.stockfish_path {
            config.engine.path = path.clone();
        }
        if let Some(secs) = self.time_limit {
            config.engine.time_limit_secs = secs;
        }
        if let Some(depth) = self.depth {
            config.engine.depth = depth;
        }
        if let Some(count) = self.count {
            config.max_games = count;
        }
        if let Some(min_moves) = self.min_moves {
            config.min_moves = min_moves;
        }
        if let Some(strictness) = self.strictness {
            config.analysis.strictness = strictness;
        }
        if let Some(threshold) = self.rescan_threshold {
            config.analysis.rescan_threshold = threshold;
        }
        if self.log_all_evaluations {
            config.log_all_evaluations = true;
        }
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    run(&cli)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let started = Instant::now();

    let config_path = cli.config.clone().unwrap_or_else(MinerConfig::config_path);
    let mut config = MinerConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    cli.apply(&mut config);

    let username = config.username.clone().ok_or_else(|| {
        anyhow!("no username configured; pass --username or set it in the config file")
    })?;
    let analysis = config.analysis_config()?;
    let rescan_threshold = config.rescan_threshold()?;

    info!(
        username = %username,
        platform = %config.platform,
        engine = %config.engine.path,
        "Starting puzzle miner"
    );

    let engine_name = check_engine(&config.engine.path)
        .with_context(|| format!("engine check failed for {}", config.engine.path))?;
    info!("Engine ready: {}", engine_name);

    let pgn = std::fs::read_to_string(&cli.pgn)
        .with_context(|| format!("failed to read {}", cli.pgn.display()))?;
    let mut games = games_for_player(&pgn, &username, config.min_moves)
        .with_context(|| format!("failed to parse {}", cli.pgn.display()))?;
    games.truncate(config.max_games);
    if games.is_empty() {
        warn!("No games found for {} in {}", username, cli.pgn.display());
    }

    let oracle = StockfishOracle::spawn(&config.engine.path, &config.engine_options())
        .with_context(|| format!("failed to start {}", config.engine.path))?;
    let mut analyzer = GameAnalyzer::new(oracle, analysis)?;
    let log_settings = LogSettings::new(
        config.engine.time_limit_secs,
        config.engine.depth,
        &username,
    );

    let mut puzzles: Vec<PuzzleBlunder> = Vec::new();
    let mut evaluations: Vec<PositionEvaluation> = Vec::new();
    for (i, game) in games.iter().enumerate() {
        info!(
            "Analyzing game {}/{}: {}",
            i + 1,
            games.len(),
            game.game_url
        );
        let report = analyzer.analyze(game);
        log_report(&report);

        if config.log_all_evaluations {
            save_game_evaluations(&config, &log_settings, &report);
        }
        evaluations.extend(report.evaluations);
        puzzles.extend(report.puzzles);
    }

    if cli.rescan {
        log_rescan(analyzer.classifier(), &evaluations, rescan_threshold);
    }
    drop(analyzer);

    match output::write_puzzles(&config.output_file, &puzzles, &username, &config.platform) {
        Ok(()) => info!(
            "Saved {} puzzles to {}",
            puzzles.len(),
            config.output_file.display()
        ),
        Err(e) => error!("Failed to save puzzles: {}", e),
    }
    match output::write_themed_puzzles(&config.puzzles_dir(), &puzzles, &username) {
        Ok(Some(path)) => info!("Saved themed puzzles to {}", path.display()),
        Ok(None) => {}
        Err(e) => error!("Failed to save themed puzzles: {}", e),
    }

    log_puzzle_statistics(&PuzzleStatistics::from_puzzles(&puzzles));
    info!("Total time: {}", format_duration(started.elapsed()));
    Ok(())
}

fn log_report(report: &GameReport) {
    match &report.outcome {
        GameOutcome::Completed => info!(
            game_id = %report.game_id,
            evaluated = report.evaluations.len(),
            blunders = report.blunder_count(),
            puzzles = report.puzzles.len(),
            skipped = report.skipped_plies(),
            fallbacks = report.eval_fallbacks,
            "Game analyzed"
        ),
        GameOutcome::Unparsed(reason) => {
            warn!(game_id = %report.game_id, "Game not analyzed: {}", reason)
        }
    }
}

fn save_game_evaluations(config: &MinerConfig, settings: &LogSettings, report: &GameReport) {
    if report.evaluations.is_empty() {
        return;
    }

    let dir = config.evaluations_dir();
    match output::write_game_evaluations(&dir, &report.game_id, &report.evaluations) {
        Ok(path) => debug!("Saved evaluations to {}", path.display()),
        Err(e) => error!(game_id = %report.game_id, "Failed to save evaluations: {}", e),
    }

    match output::append_evaluation_log(
        &config.eval_log_file,
        &dir,
        &report.game_id,
        &report.evaluations,
        settings,
    ) {
        Ok(LogWrite::BackedUp(path)) => {
            warn!("Evaluation log unusable, wrote {}", path.display())
        }
        Ok(LogWrite::Created(count)) => info!(
            "Created {} with {} evaluations",
            config.eval_log_file.display(),
            count
        ),
        Ok(LogWrite::Appended(_)) | Ok(LogWrite::Empty) => {}
        Err(e) => error!(game_id = %report.game_id, "Failed to update evaluation log: {}", e),
    }
}

fn log_rescan(classifier: &BlunderClassifier, evaluations: &[PositionEvaluation], threshold: i32) {
    let stats = EvaluationStatistics::from_evaluations(evaluations);
    info!(
        "Evaluation changes: {} positions, average {:.1}, median {:.1}",
        stats.total_evaluations, stats.average_absolute_change, stats.median_absolute_change
    );
    for (lower, count) in &stats.count_by_range {
        debug!("  {}: {}", change_range_label(*lower), count);
    }

    let candidates = classifier.rescan(evaluations, Some(threshold));
    info!("Rescan found {} additional mistakes", candidates.len());
    for candidate in &candidates {
        info!(
            "  {} move {} {}: {} -> {} ({})",
            candidate.game_id(),
            candidate.move_number(),
            candidate.move_san(),
            format_eval(candidate.prev_eval()),
            format_eval(candidate.curr_eval()),
            candidate
                .blunder_type()
                .map(|kind| kind.as_str())
                .unwrap_or("unclassified")
        );
    }
}

fn log_puzzle_statistics(stats: &PuzzleStatistics) {
    if stats.count == 0 {
        info!("No puzzles found");
        return;
    }

    info!("Puzzles: {}", stats.count);
    for (label, count) in &stats.difficulty_distribution {
        info!("  {}: {}", label, count);
    }
    info!("Average evaluation change: {:.0}", stats.avg_eval_change);
    if let (Some(first), Some(last)) = (stats.earliest_move, stats.latest_move) {
        info!("Move range: {} to {}", first, last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_minimal() {
        let cli = Cli::try_parse_from(["puzzle-miner", "--pgn", "games.pgn"]).unwrap();
        assert_eq!(cli.pgn, PathBuf::from("games.pgn"));
        assert_eq!(cli.username, None);
        assert!(!cli.rescan);
        assert_eq!(cli.log_level(), "info");
    }

    #[test]
    fn test_cli_requires_pgn() {
        assert!(Cli::try_parse_from(["puzzle-miner", "--username", "alice"]).is_err());
    }

    #[test]
    fn test_cli_full() {
        let cli = Cli::try_parse_from([
            "puzzle-miner",
            "--pgn",
            "games.pgn",
            "-u",
            "alice",
            "--platform",
            "chess.com",
            "-o",
            "out.json",
            "--stockfish-path",
            "/opt/sf",
            "--time-limit",
            "0.5",
            "--depth",
            "12",
            "-n",
            "3",
            "--min-moves",
            "20",
            "--strictness",
            "strict",
            "--rescan-threshold",
            "400",
            "--log-all-evaluations",
            "--rescan",
            "-v",
            "--log-file",
            "miner.log",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert_eq!(cli.username.as_deref(), Some("alice"));
        assert_eq!(cli.strictness, Some(Strictness::Strict));
        assert_eq!(cli.count, Some(3));
        assert!(cli.rescan);
        assert_eq!(cli.log_level(), "debug");
        assert_eq!(cli.log_file, Some(PathBuf::from("miner.log")));
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));

        let mut config = MinerConfig::default();
        config.log_all_evaluations = false;
        cli.apply(&mut config);

        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.platform, "chess.com");
        assert_eq!(config.output_file, PathBuf::from("out.json"));
        assert_eq!(config.engine.path, "/opt/sf");
        assert_eq!(config.engine.time_limit_secs, 0.5);
        assert_eq!(config.engine.depth, 12);
        assert_eq!(config.max_games, 3);
        assert_eq!(config.min_moves, 20);
        assert_eq!(config.analysis.strictness, Strictness::Strict);
        assert_eq!(config.analysis.rescan_threshold, 400);
        assert_eq!(config.policy().unwrap().threshold, 500);
        assert!(config.log_all_evaluations);
    }

    #[test]
    fn test_absent_flags_keep_config_values() {
        let cli = Cli::try_parse_from(["puzzle-miner", "--pgn", "g.pgn"]).unwrap();
        let mut config: MinerConfig =
            toml::from_str("username = \"bob\"\nmax_games = 4\n[engine]\ndepth = 9\n").unwrap();
        let expected = config.clone();

        cli.apply(&mut config);
        assert_eq!(config, expected);
    }

    #[test]
    fn test_quiet_log_level() {
        let cli = Cli::try_parse_from(["puzzle-miner", "--pgn", "g.pgn", "-q"]).unwrap();
        assert_eq!(cli.log_level(), "error");
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["puzzle-miner", "--pgn", "g.pgn", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_invalid_strictness_rejected() {
        assert!(
            Cli::try_parse_from(["puzzle-miner", "--pgn", "g.pgn", "--strictness", "brutal"])
                .is_err()
        );
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
