#![deny(warnings)]

//! Headless driver: loads content, replays an intent script against
//! simulated time and prints what happened.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use sim_core::{Namespace, ReferenceData, SimConfig, Timestamp};
use sim_runtime::{Intent, Simulation};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_REFERENCE: &str = include_str!("../assets/reference.yaml");
const DEFAULT_CONFIG: &str = include_str!("../assets/config.yaml");
const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug)]
struct Args {
    reference: Option<String>,
    config: Option<String>,
    intents: Option<String>,
    hours: f64,
    step_ms: u64,
    db: Option<String>,
    save: String,
    until_now: bool,
    quiet: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            reference: None,
            config: None,
            intents: None,
            hours: 1.0,
            step_ms: 1_000,
            db: None,
            save: "default".to_string(),
            until_now: false,
            quiet: false,
        }
    }
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--reference" => args.reference = it.next(),
            "--config" => args.config = it.next(),
            "--intents" => args.intents = it.next(),
            "--hours" => {
                args.hours = it
                    .next()
                    .and_then(|s| s.parse().ok())
                    .context("--hours expects a number")?
            }
            "--step-ms" => {
                args.step_ms = it
                    .next()
                    .and_then(|s| s.parse().ok())
                    .context("--step-ms expects an integer")?
            }
            "--db" => args.db = it.next(),
            "--save" => {
                if let Some(name) = it.next() {
                    args.save = name;
                }
            }
            "--until-now" => args.until_now = true,
            "--quiet" => args.quiet = true,
            other => bail!("unknown argument {other}"),
        }
    }
    if !args.hours.is_finite() || args.hours < 0.0 {
        bail!("--hours must be a non-negative number");
    }
    Ok(args)
}

/// One scripted intent, applied once simulated time reaches `at_ms`.
#[derive(Debug, Deserialize)]
struct ScriptStep {
    #[serde(default)]
    at_ms: u64,
    #[serde(flatten)]
    intent: Intent,
}

fn read(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {path}"))
}

fn load_reference(path: Option<&str>) -> Result<ReferenceData> {
    let data = match path {
        Some(p) if p.ends_with(".json") => ReferenceData::from_json_str(&read(p)?),
        Some(p) => ReferenceData::from_yaml_str(&read(p)?),
        None => ReferenceData::from_yaml_str(DEFAULT_REFERENCE),
    };
    data.context("loading reference data")
}

fn load_config(path: Option<&str>) -> Result<SimConfig> {
    let text = match path {
        Some(p) => read(p)?,
        None => DEFAULT_CONFIG.to_string(),
    };
    SimConfig::from_yaml_str(&text).context("loading config")
}

fn load_script(path: Option<&str>) -> Result<Vec<ScriptStep>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let mut steps: Vec<ScriptStep> =
        serde_yaml::from_str(&read(path)?).with_context(|| format!("parsing {path}"))?;
    steps.sort_by_key(|s| s.at_ms);
    Ok(steps)
}

fn print_report(sim: &Simulation, origin: Timestamp, end: Timestamp) {
    let state = sim.state();
    let mut skills: Vec<String> = state
        .skills
        .iter()
        .filter(|(_, p)| p.level > 1 || p.experience > 0)
        .map(|(skill, p)| format!("{skill} {}", p.level))
        .collect();
    if skills.is_empty() {
        skills.push("none trained".to_string());
    }
    println!("Skills | {}", skills.join(" | "));
    let items: u64 = state.inventory.items(Namespace::Player).values().sum();
    let village: u64 = state.inventory.items(Namespace::Village).values().sum();
    println!(
        "KPI | hours: {:.2} | total level: {} | gold: {} | items: {} | village stock: {} | buildings: {} | workers: {} | kills: {} | active tasks: {}",
        end.since(origin) as f64 / MS_PER_HOUR,
        state.skills.total_level(),
        state.inventory.gold,
        items,
        village,
        state.settlement.buildings().count(),
        state.settlement.workers().count(),
        sim.combat().kills(),
        state.tasks.len()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging goes to stderr so stdout carries only the report.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    info!(sha = env!("GIT_SHA"), hours = args.hours, db = ?args.db, "starting CLI");

    let reference = Arc::new(load_reference(args.reference.as_deref())?);
    let config = load_config(args.config.as_deref())?;
    let script = load_script(args.intents.as_deref())?;

    let store = match &args.db {
        Some(url) => {
            persistence::ensure_db_dir(url)?;
            let pool = persistence::init_db(url).await?;
            let save_id = persistence::create_save(&pool, &args.save, None).await?;
            Some((pool, save_id))
        }
        None => None,
    };
    let restored = match &store {
        Some((pool, save_id)) => persistence::load_latest(pool, *save_id).await?,
        None => None,
    };

    let wall_clock = Timestamp::from_datetime(Utc::now());
    let (mut sim, mut start) = match restored {
        Some(snapshot) => {
            let taken_at = snapshot.taken_at;
            info!(save = %args.save, %taken_at, "resuming saved session");
            let sim = Simulation::restore(Arc::clone(&reference), config, snapshot)?;
            (sim, taken_at)
        }
        None => (Simulation::new(Arc::clone(&reference), config), wall_clock),
    };
    let origin = start;
    sim.tick_all(start);

    if args.until_now && wall_clock > start {
        // One pass settles everything that finished while nobody was watching.
        info!(offline_ms = wall_clock.since(start), "catching up");
        sim.tick_all(wall_clock);
        start = wall_clock;
    }

    let end = start.plus((args.hours * MS_PER_HOUR).round() as u64);
    let mut now = start;
    for step in script {
        let at = start.plus(step.at_ms);
        if at > end {
            warn!(at_ms = step.at_ms, intent = ?step.intent, "step after end of run skipped");
            continue;
        }
        sim.advance(now, at, args.step_ms);
        now = at;
        sim.apply(step.intent, at);
    }
    sim.advance(now, end, args.step_ms);
    sim.tick_all(end);

    for n in sim.drain_notifications() {
        if args.quiet && !matches!(n.kind, sim_core::NotificationKind::LevelUp) {
            continue;
        }
        println!(
            "[{:>9.1}s] {:<17} {}",
            n.at.since(origin) as f64 / 1_000.0,
            format!("{:?}", n.kind),
            n.message
        );
    }
    print_report(&sim, origin, end);

    if let Some((pool, save_id)) = &store {
        persistence::save_snapshot(pool, *save_id, &sim.snapshot(end)).await?;
        info!(save = %args.save, %end, "session saved");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_assets_load() {
        let reference = load_reference(None).unwrap();
        assert!(reference.recipe("bronze_bar").is_some());
        assert_eq!(load_config(None).unwrap(), SimConfig::default());
    }

    #[test]
    fn sample_script_parses() {
        let steps: Vec<ScriptStep> =
            serde_yaml::from_str(include_str!("../assets/intents.yaml")).unwrap();
        assert_eq!(steps.len(), 7);
        assert_eq!(steps[0].at_ms, 0);
        assert_eq!(
            steps[0].intent,
            Intent::Gather {
                resource: "copper_ore".into(),
                auto_resume: true
            }
        );
    }

    #[test]
    fn scripted_session_progresses() {
        let reference = Arc::new(load_reference(None).unwrap());
        let mut sim = Simulation::new(reference, SimConfig::default());
        let start = Timestamp(1_000_000);
        sim.tick_all(start);
        assert!(sim.apply(
            Intent::Gather {
                resource: "copper_ore".into(),
                auto_resume: true
            },
            start
        ));
        sim.advance(start, start.plus(30_000), 1_000);
        // nine completions exhaust a node with a limit of eight
        assert!(sim.state().inventory.count(Namespace::Player, "copper_ore") >= 9);
        assert!(sim
            .state()
            .gather
            .is_respawning("copper_ore", start.plus(30_000)));
    }
}
