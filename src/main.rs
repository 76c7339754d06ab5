//! The Grind entry point
//!
//! `serve` runs the scoring backend, `play` runs a headless bot through a
//! full run, `leaderboard` prints the top scores.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use tokio::net::TcpListener;
use tokio::runtime::Handle;

use the_grind::api::{DEFAULT_LIMIT, LeaderboardEntry, MAX_NAME_LEN};
use the_grind::persistence::FileStore;
use the_grind::platform::{self, DataDir};
use the_grind::server::{self, AppState};
use the_grind::settings::{RunLength, ServerSettings, Settings};
use the_grind::sim::{Autoplay, BoxedReporter, Engine};
use the_grind::submission::{ApiClient, HttpReporter, OfflineReporter};
use the_grind::{OfflineScores, Tuning};

/// Frame length of the simulated host loop
const FRAME_MS: u64 = 16;
/// Game time between progress lines
const REPORT_EVERY_MS: u64 = 10_000;

#[derive(Debug, Parser)]
#[command(name = "the-grind")]
#[command(about = "Time-boxed clicker game engine and scoring backend")]
struct Cli {
    /// Directory for settings, saved runs and offline scores
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Scoring API root, e.g. http://127.0.0.1:7071/api
    #[arg(long, global = true)]
    api: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scoring backend
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// JSON file backing the score store
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Let the bot play one run
    Play {
        #[arg(long)]
        name: Option<String>,
        /// Seed for the event RNG
        #[arg(long)]
        seed: Option<u64>,
        /// Pace the run against the wall clock instead of a virtual one
        #[arg(long, default_value_t = false)]
        realtime: bool,
        /// Game time per wall time in realtime mode
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Run length preset (short, standard)
        #[arg(long)]
        length: Option<String>,
        #[arg(long, default_value_t = 6.0)]
        taps_per_sec: f64,
        /// Tuning override file
        #[arg(long)]
        tuning: Option<PathBuf>,
        /// Ignore any saved run
        #[arg(long, default_value_t = false)]
        fresh: bool,
        /// Never activate boosts
        #[arg(long, default_value_t = false)]
        no_boosts: bool,
    },
    /// Show the top scores
    Leaderboard {
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .clone()
        .map(DataDir::new)
        .unwrap_or_else(DataDir::from_env);

    match cli.command {
        Commands::Serve { bind, store } => cmd_serve(bind, store).await,
        Commands::Play {
            name,
            seed,
            realtime,
            speed,
            length,
            taps_per_sec,
            tuning,
            fresh,
            no_boosts,
        } => {
            let options = PlayOptions {
                name,
                seed,
                realtime,
                speed,
                length,
                taps_per_sec,
                tuning,
                fresh,
                no_boosts,
            };
            cmd_play(&data_dir, cli.api, options).await
        }
        Commands::Leaderboard { limit } => cmd_leaderboard(&data_dir, cli.api, limit).await,
    }
}

async fn cmd_serve(bind: Option<SocketAddr>, store: Option<PathBuf>) -> Result<()> {
    let mut settings = ServerSettings::from_env()?;
    if let Some(bind) = bind {
        settings.bind = bind;
    }
    if store.is_some() {
        settings.store_path = store;
    }

    let state = AppState::from_settings(&settings).context("opening score store")?;
    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("binding {}", settings.bind))?;

    server::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Ctrl-C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("Shutting down");
    })
    .await
    .context("scoring backend failed")
}

struct PlayOptions {
    name: Option<String>,
    seed: Option<u64>,
    realtime: bool,
    speed: f64,
    length: Option<String>,
    taps_per_sec: f64,
    tuning: Option<PathBuf>,
    fresh: bool,
    no_boosts: bool,
}

async fn cmd_play(data_dir: &DataDir, api: Option<String>, options: PlayOptions) -> Result<()> {
    log::info!("Data directory {}", data_dir.root().display());
    let settings_path = data_dir.settings_path();
    let mut stored = Settings::load(&settings_path);

    let name = options
        .name
        .or_else(|| stored.player_name.clone())
        .unwrap_or_else(|| "Player".to_string());
    let name = name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        bail!("player name must be 1 to {MAX_NAME_LEN} characters");
    }
    if stored.player_name.as_deref() != Some(name.as_str()) {
        stored.player_name = Some(name.clone());
        stored.save(&settings_path);
    }

    // Command-line and environment values apply to this run only
    let mut settings = stored.with_env_overrides();
    if api.is_some() {
        settings.api_base = api;
    }
    if let Some(length) = &options.length {
        settings.run_length =
            RunLength::from_str(length).with_context(|| format!("unknown run length {length:?}"))?;
    }
    log::info!(
        "{} run for {name} ({})",
        settings.run_length.as_str(),
        settings.api_base.as_deref().unwrap_or("offline")
    );

    let mut tuning = match &options.tuning {
        Some(path) => Tuning::load(path),
        None => Tuning::default(),
    };
    tuning.run_duration_ms = settings.run_duration_ms();

    let offline_path = data_dir.offline_scores_path();
    let client = match &settings.api_base {
        Some(url) => Some(ApiClient::new(url)?),
        None => None,
    };
    let http = client.as_ref().map(|client| {
        HttpReporter::new(client.clone(), Handle::current(), &offline_path)
            .with_device_id(settings.device_id.clone())
            .with_event_code(settings.event_code.clone())
    });
    let reporter: BoxedReporter = match &http {
        Some(http) => Box::new(http.clone()),
        None => Box::new(OfflineReporter::new(&offline_path)),
    };

    let sink = Box::new(FileStore::new(data_dir.run_path()));
    let mut engine = match options.seed {
        Some(seed) => Engine::with_rng(tuning, Pcg32::seed_from_u64(seed), sink, reporter),
        None => Engine::new(tuning, sink, reporter),
    };

    let started_wall = platform::now_ms();
    let resumed = !options.fresh && engine.resume_saved(started_wall);
    if !resumed {
        match event_deadline(client.as_ref()).await {
            Some(deadline) if deadline <= started_wall => bail!("the event deadline has passed"),
            Some(deadline) => engine.start_run_until(&name, started_wall, deadline),
            None => engine.start_run(&name, started_wall),
        }
    }

    let mut bot = if options.no_boosts {
        Autoplay::new(options.taps_per_sec).without_boosts()
    } else {
        Autoplay::new(options.taps_per_sec)
    };
    let speed = options.speed.max(0.01);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut now = started_wall;
    let mut next_report = now + REPORT_EVERY_MS;
    while engine.state().is_running() {
        let dt = if options.realtime {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(FRAME_MS)) => {}
                _ = &mut ctrl_c => {
                    log::info!("Interrupted, run saved for later");
                    return Ok(());
                }
            }
            let elapsed = platform::now_ms().saturating_sub(started_wall);
            let game_now = started_wall + (elapsed as f64 * speed) as u64;
            game_now.saturating_sub(now)
        } else {
            FRAME_MS
        };
        now += dt;

        bot.step(&mut engine, now, dt);

        if now >= next_report && engine.state().is_running() {
            next_report = now + REPORT_EVERY_MS;
            let rates = engine.rates();
            log::info!(
                "{:>4}s left | {:.0} in hand | peak {:.0} | {:.1}/s | tap x{:.1}",
                engine.time_remaining(now) / 1000,
                engine.state().currency,
                engine.state().peak,
                rates.gain_per_second,
                rates.tap_multiplier
            );
        }
    }

    let state = engine.state();
    println!("Run over for {}: score {}", state.player_name, state.score());
    for (id, count) in state.owned.iter() {
        if let Some(def) = engine.tuning().generator(id) {
            println!("  {:<16} x{:<2} {}", def.name, count, def.flavor_text(count));
        }
    }

    if let Some(http) = &http {
        http.flush().await;
    }
    if let Some(client) = &client {
        print_board(&client.leaderboard(DEFAULT_LIMIT, &offline_path).await);
    } else {
        print_board(&OfflineScores::load(&offline_path).top(DEFAULT_LIMIT));
    }
    Ok(())
}

/// Server-set deadline translated onto the local clock
async fn event_deadline(client: Option<&ApiClient>) -> Option<u64> {
    let client = client?;
    match client.fetch_config().await {
        Ok(config) => {
            let deadline = config.deadline_utc?;
            Some(platform::local_deadline(
                config.server_time_utc,
                deadline,
                platform::now_ms(),
            ))
        }
        Err(e) => {
            log::warn!("Could not fetch event config ({e}), using the standard run length");
            None
        }
    }
}

async fn cmd_leaderboard(data_dir: &DataDir, api: Option<String>, limit: usize) -> Result<()> {
    let settings = Settings::load(&data_dir.settings_path()).with_env_overrides();
    let offline_path = data_dir.offline_scores_path();
    let entries = match api.or(settings.api_base) {
        Some(url) => ApiClient::new(&url)?.leaderboard(limit, &offline_path).await,
        None => OfflineScores::load(&offline_path).top(limit),
    };
    print_board(&entries);
    Ok(())
}

fn print_board(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("No scores yet");
        return;
    }
    for (rank, entry) in entries.iter().enumerate() {
        println!("{:>2}. {:<30} {:>10}", rank + 1, entry.name, entry.score);
    }
}
