use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use sortquest::config::{BackendKind, Config};
use sortquest::content::Catalog;
use sortquest::remote::{
    AggregateBackend, AggregatedGameRecord, HistorySlots, LocalBackend, WizardBackend,
};
use sortquest::service::{BatchCommit, HistoryService, Identity, WaitOutcome};
use sortquest::session::result::GameTypeResult;
use sortquest::store::attempts::LocalAttemptStore;
use sortquest::store::json_store::JsonStore;
use sortquest::wizard::pipeline::UploadLimits;
use sortquest::wizard::{WizardPipeline, WizardView, stages};

#[derive(Parser)]
#[command(
    name = "sortquest",
    version,
    about = "Progress and score history for term-sorting games"
)]
struct Cli {
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase log verbosity"
    )]
    verbose: u8,

    #[arg(long, global = true, help = "Act as this user id")]
    user: Option<String>,

    #[arg(long, global = true, help = "Directory for local data")]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true, value_enum, help = "Backend to talk to")]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum BackendArg {
    Local,
    Http,
}

#[derive(Subcommand)]
enum Command {
    /// List bundled modules and their game types
    Modules,
    /// Submit one module attempt made of one or more finished games
    Submit {
        module: String,
        #[arg(
            required = true,
            value_parser = parse_game,
            help = "Finished games as MODE:SCORE[:SECONDS]"
        )]
        games: Vec<GameArg>,
        #[arg(short, long, default_value_t = 1)]
        level: u32,
        #[arg(long, help = "Mark the games as completed")]
        completed: bool,
    },
    /// Show the aggregate for a module and level
    Show {
        module: String,
        #[arg(short, long, default_value_t = 1)]
        level: u32,
    },
    /// Show the last three scores and times
    LastThree {
        module: String,
        game_mode: String,
        #[arg(short, long, default_value_t = 1)]
        level: u32,
    },
    /// List completed game modes of a module
    Completed { module: String },
    /// Record that a game mode was played without committing a score
    Track {
        module: String,
        game_mode: String,
        #[arg(short, long, default_value_t = 1)]
        level: u32,
    },
    /// Mark a game mode completed
    Complete {
        module: String,
        game_mode: String,
        #[arg(short, long, default_value_t = 1)]
        level: u32,
    },
    /// Delete aggregates, optionally narrowed to a module and game mode
    Reset {
        module: Option<String>,
        game_mode: Option<String>,
    },
    /// Show where the signed-in user is in the wizard
    WizardStatus,
}

struct Backends {
    aggregates: Arc<dyn AggregateBackend>,
    wizard: Arc<dyn WizardBackend>,
    store: JsonStore,
}

fn open_backends(config: &Config) -> Result<Backends> {
    let store = JsonStore::with_base_dir(PathBuf::from(&config.data_dir))?;
    match config.backend {
        BackendKind::Local => {
            let local = Arc::new(LocalBackend::open(store.clone())?);
            Ok(Backends {
                aggregates: local.clone(),
                wizard: local,
                store,
            })
        }
        BackendKind::Http => open_http(config, store),
    }
}

#[cfg(feature = "network")]
fn open_http(config: &Config, store: JsonStore) -> Result<Backends> {
    use anyhow::Context;
    use sortquest::remote::http::HttpBackend;

    let http = Arc::new(HttpBackend::from_config(config).context("cannot build HTTP client")?);
    Ok(Backends {
        aggregates: http.clone(),
        wizard: http,
        store,
    })
}

#[cfg(not(feature = "network"))]
fn open_http(_config: &Config, _store: JsonStore) -> Result<Backends> {
    bail!("this build has no HTTP backend; rebuild with the `network` feature")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    sortquest::logging::init(cli.verbose);

    let mut config = Config::load()?;
    if let Some(user) = &cli.user {
        config.user_id = Some(user.clone());
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.to_string_lossy().to_string();
    }
    if let Some(backend) = cli.backend {
        config.backend = match backend {
            BackendArg::Local => BackendKind::Local,
            BackendArg::Http => BackendKind::Http,
        };
    }
    config.validate();

    let backends = open_backends(&config)?;
    let identity = config.identity();
    let mut service = HistoryService::new(backends.aggregates.clone(), config.debounce_window())
        .with_local_fallback(LocalAttemptStore::new(Some(backends.store.clone())));
    if let Some(identity) = identity.clone() {
        service.sign_in(identity);
    }

    match cli.command {
        Command::Modules => list_modules()?,
        Command::WizardStatus => wizard_status(&config, &backends, identity.as_ref())?,
        Command::Submit {
            module,
            games,
            level,
            completed,
        } => submit_attempt(&config, service, &module, level, &games, completed)?,
        Command::Show { module, level } => match service.get_aggregated(&module, level)? {
            Some(record) => print_record(&record),
            None => println!("No progress recorded for {module} level {level}."),
        },
        Command::LastThree {
            module,
            game_mode,
            level,
        } => {
            let last = service.get_last_three(&module, level, &game_mode)?;
            println!("scores: {}", format_slots(&last.scores));
            println!("times:  {}", format_slots(&last.times));
        }
        Command::Completed { module } => {
            let ids = service.get_completed_game_mode_ids(&module)?;
            if ids.is_empty() {
                println!("Nothing completed in {module} yet.");
            }
            for id in ids {
                println!("{id}");
            }
        }
        Command::Track {
            module,
            game_mode,
            level,
        } => print_record(&service.track_progression(&module, level, &game_mode)?),
        Command::Complete {
            module,
            game_mode,
            level,
        } => print_record(&service.mark_completed(&module, level, &game_mode)?),
        Command::Reset { module, game_mode } => {
            if module.is_none() && game_mode.is_some() {
                bail!("a game mode can only be reset within a module");
            }
            let removed = service.reset(module.as_deref(), game_mode.as_deref())?;
            println!("Removed {removed} record(s).");
        }
    }
    Ok(())
}

#[derive(Clone, Debug)]
struct GameArg {
    game_mode_id: String,
    score: u64,
    time: u64,
}

fn parse_game(value: &str) -> Result<GameArg, String> {
    let mut parts = value.split(':');
    let game_mode_id = parts.next().unwrap_or_default().trim().to_string();
    if game_mode_id.is_empty() {
        return Err("missing game mode".into());
    }
    let score = parts
        .next()
        .ok_or("missing score")?
        .parse::<u64>()
        .map_err(|e| format!("bad score: {e}"))?;
    let time = match parts.next() {
        Some(t) => t.parse::<u64>().map_err(|e| format!("bad time: {e}"))?,
        None => 0,
    };
    if parts.next().is_some() {
        return Err("expected MODE:SCORE[:SECONDS]".into());
    }
    Ok(GameArg {
        game_mode_id,
        score,
        time,
    })
}

fn submit_attempt(
    config: &Config,
    service: HistoryService,
    module_id: &str,
    level: u32,
    games: &[GameArg],
    completed: bool,
) -> Result<()> {
    let catalog = Catalog::load()?;
    let module = catalog.module(module_id);
    let results: Vec<GameTypeResult> = games
        .iter()
        .map(|g| {
            let def = module
                .and_then(|m| m.types.iter().find(|t| t.game_mode_id == g.game_mode_id));
            let mut result = GameTypeResult {
                game_type_id: def.map_or(0, |d| d.id),
                game_mode_id: g.game_mode_id.clone(),
                score: g.score,
                current_score: g.score,
                total_correct: 0,
                terms: Vec::new(),
                score_history: Vec::new(),
                time_history: Vec::new(),
                time: g.time,
                total_terms: def.map_or(0, |d| d.terms.len()),
                placed_terms: Vec::new(),
                is_completed: completed,
                completed_at: None,
            };
            service.annotate(module_id, level, &mut result);
            result
        })
        .collect();

    for r in &results {
        println!("{}: {} (best {})", r.game_mode_id, r.current_score, r.score);
    }

    let pending = BatchCommit::spawn(Arc::new(service), module_id, level, results);
    match pending.wait(config.commit_wait()) {
        WaitOutcome::Finished(outcome) => match outcome?.record {
            Some(record) => print_record(&record),
            None => println!("Same attempt was just submitted; nothing recorded."),
        },
        WaitOutcome::TimedOut => {
            bail!("commit still running after {}s", config.commit_wait_secs)
        }
        WaitOutcome::Cancelled => bail!("commit cancelled"),
    }
    Ok(())
}

fn list_modules() -> Result<()> {
    let catalog = Catalog::load()?;
    for module in &catalog.modules {
        let gate = if module.requires_continue {
            " (continue between types)"
        } else {
            ""
        };
        println!("{}: {}{gate}", module.id, module.name);
        for game_type in &module.types {
            println!(
                "  type {} [{}] {} ({} terms)",
                game_type.id,
                game_type.game_mode_id,
                game_type.name,
                game_type.terms.len()
            );
        }
    }
    Ok(())
}

fn wizard_status(
    config: &Config,
    backends: &Backends,
    identity: Option<&Identity>,
) -> Result<()> {
    let pipeline = WizardPipeline::resume(
        backends.wizard.clone(),
        identity,
        UploadLimits::from(config),
        Some(backends.store.clone()),
    )?;
    if pipeline.restored_from_mirror() {
        println!("(backend unreachable, showing the last local copy)");
    }
    match pipeline.view() {
        WizardView::Completed => println!("Wizard completed."),
        WizardView::Stage(n) => {
            let title = stages::stage(n).map(|s| s.title).unwrap_or("unknown");
            println!("Stage {n} of {}: {title}", stages::LAST_STAGE);
        }
    }
    println!("Progress: {:.1}%", pipeline.progress_percentage());
    if let Some(attachment) = pipeline.attachment() {
        println!("Attachment: {} ({} bytes)", attachment.file_name, attachment.size_bytes);
    }
    Ok(())
}

fn print_record(record: &AggregatedGameRecord) {
    println!(
        "{} level {}: score {} time {}s{}",
        record.module_id,
        record.level_number,
        record.score,
        record.time,
        if record.is_completed { " (completed)" } else { "" }
    );
    println!("  modes: {}", record.game_mode_ids.join(", "));
    println!(
        "  history: scores {} times {}",
        format_slots(&HistorySlots::from_ring(&record.score_history)),
        format_slots(&HistorySlots::from_ring(&record.time_history))
    );
}

fn format_slots(slots: &HistorySlots) -> String {
    slots
        .as_array()
        .iter()
        .map(|s| s.map_or_else(|| "-".to_string(), |v| v.to_string()))
        .collect::<Vec<_>>()
        .join(" / ")
}
