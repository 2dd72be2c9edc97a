#![deny(warnings)]

//! Headless CLI: load a player's session, mine in real time for a while, then
//! save and print a summary.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use miner_core::{now_millis, EngineConfig, PlayerId};
use miner_runtime::views::{effective_rate, format_duration, session_duration};
use miner_runtime::{Session, TracingNotifier};
use persistence::{
    default_cache_dir, default_sqlite_url, init_db, FileCache, PersistenceCoordinator,
    SqliteRemote,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const POLL_MS: u64 = 100;

#[derive(Debug)]
struct Args {
    player: String,
    seconds: u64,
    claim: bool,
    buy: Vec<String>,
    config: Option<String>,
    db: String,
    cache_dir: String,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        player: "local-player".to_string(),
        seconds: 10,
        claim: false,
        buy: Vec::new(),
        config: None,
        db: default_sqlite_url().to_string(),
        cache_dir: default_cache_dir().to_string(),
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().with_context(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--player" => args.player = value()?,
            "--seconds" => args.seconds = value()?.parse().context("--seconds")?,
            "--claim" => args.claim = true,
            "--buy" => args.buy.push(value()?),
            "--config" => args.config = Some(value()?),
            "--db" => args.db = value()?,
            "--cache-dir" => args.cache_dir = value()?,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            Ok(EngineConfig::from_yaml_str(&text)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn ensure_db_dir(url: &str) -> Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"));
    if let Some(parent) = path.and_then(|p| Path::new(p).parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup; RUST_LOG overrides the default level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;
    let config = load_config(args.config.as_deref())?;
    info!(player = %args.player, seconds = args.seconds, db = %args.db, "starting CLI");

    ensure_db_dir(&args.db)?;
    let pool = init_db(&args.db).await?;
    let cache = FileCache::new(&args.cache_dir)?;
    let coordinator = Arc::new(PersistenceCoordinator::new(
        PlayerId::new(args.player.clone()),
        cache,
        SqliteRemote::new(pool),
        config,
    ));

    let mut session = Session::start(coordinator, TracingNotifier, now_millis()).await;
    if args.claim {
        session.claim_offline_rewards(now_millis());
    }
    for id in &args.buy {
        if let Err(e) = session.purchase(id, now_millis()) {
            warn!(upgrade = %id, error = %e, "purchase refused");
        }
    }
    if !session.state().is_mining {
        if let Err(e) = session.toggle_mining(now_millis()) {
            warn!(error = %e, "cannot start mining");
        }
    }

    let stop_at = now_millis() + (args.seconds as i64) * 1_000;
    let mut ticker = tokio::time::interval(Duration::from_millis(POLL_MS));
    loop {
        ticker.tick().await;
        let now = now_millis();
        session.advance(now.min(stop_at));
        if now >= stop_at {
            break;
        }
    }

    let now = now_millis();
    let ran = format_duration(session_duration(session.state(), now));
    let rate = effective_rate(session.state(), session.ledger().boosts());
    let save_status = session.coordinator().status().remote();
    let state = session.shutdown(now).await;

    println!(
        "Session OK | player: {} | points: {:.2} | rate: {:.2}/s | energy: {:.1}/{:.1} | level: {} | pending: {:.2} | ran: {} | remote: {:?}",
        args.player,
        state.points,
        rate,
        state.current_energy,
        state.max_energy,
        state.mining_level,
        state.unclaimed_offline_rewards,
        ran,
        save_status,
    );
    println!(
        "Build | sha: {} | date: {} | saved: {}",
        env!("GIT_SHA"),
        env!("BUILD_DATE"),
        state.last_update.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    Ok(())
}
