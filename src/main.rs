mod cache;
mod notify;
mod prayer;
mod provider;
mod qibla;
mod settings;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;

use crate::cache::{PrayerCache, read_through};
use crate::notify::ConsoleDispatcher;
use crate::prayer::model::Prayer;
use crate::prayer::scheduler::{NotificationScheduler, next_prayer, project_window};
use crate::provider::{FileProvider, ProviderRequest};
use crate::settings::{default_settings, load_settings, save_settings};
use crate::sink::ThreadSink;

#[derive(Parser, Debug)]
#[command(
    name = "azanclock",
    version,
    about = "Prayer time notifications with azan scheduling"
)]
struct Cli {
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    #[arg(long)]
    timings: Option<PathBuf>,

    #[arg(long)]
    init: bool,

    #[arg(long)]
    cache: Option<PathBuf>,

    #[arg(long)]
    journal: Option<PathBuf>,

    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    #[arg(long)]
    window_days: Option<u32>,

    #[arg(long)]
    check: bool,

    #[arg(long)]
    qibla: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if cli.init {
        if cli.settings.exists() {
            bail!(
                "settings file {} already exists; refusing to overwrite",
                cli.settings.display()
            );
        }
        save_settings(&cli.settings, &default_settings())?;
        println!("Wrote default settings to {}", cli.settings.display());
        return Ok(());
    }

    let Some(timings) = &cli.timings else {
        bail!("--timings is required unless running --init");
    };

    let settings = load_settings(&cli.settings)
        .with_context(|| format!("failed to load {}", cli.settings.display()))?;
    let window_days = cli.window_days.unwrap_or(settings.window_days);
    if window_days == 0 {
        bail!("--window-days must be greater than zero");
    }

    let request = ProviderRequest::from_location(&settings.location);
    let provider = FileProvider::new(timings);
    let cache = cli.cache.map(PrayerCache::new);
    let now = Local::now();

    let response = read_through(cache.as_ref(), &provider, &request, now.date_naive())?;

    if cli.qibla {
        let direction = qibla::qibla_direction(response.latitude, response.longitude);
        println!("Qibla direction: {direction:.1} degrees from true north");
        return Ok(());
    }

    let set = response.into_prayer_set(request.location());
    println!("Prayer times for {} ({})", set.location, set.date);
    for prayer in Prayer::ALL {
        println!("  {:<8} {}", prayer.name(), set.time_of(prayer));
    }

    match next_prayer(&set, &now) {
        Some(prayer) => println!("Next prayer: {} at {}", prayer.name(), set.time_of(prayer)),
        None => println!(
            "All of today's prayers have passed; next is tomorrow's Fajr at {}",
            set.fajr
        ),
    }

    if !settings.notifications_enabled {
        println!("Notifications are disabled in settings; nothing scheduled.");
        return Ok(());
    }

    if cli.check {
        let projection = project_window(&set, &now, window_days, &settings.azan);
        println!(
            "Projection over {window_days} day(s): {} to schedule, {} in the past, {} invalid",
            projection.notifications.len(),
            projection.skipped_past,
            projection.skipped_invalid
        );
        return Ok(());
    }

    let dispatcher = Arc::new(ConsoleDispatcher::with_assets_dir(&cli.assets));
    let sink = Arc::new(
        ThreadSink::start(dispatcher, cli.journal.clone())
            .context("failed to start deferred work sink")?,
    );
    let scheduler = NotificationScheduler::new(sink.clone());
    let outcome = scheduler.schedule(&set, &now, window_days, &settings.azan);
    tracing::debug!(outstanding = scheduler.outstanding(), "registry populated");
    println!(
        "Scheduled {} notification(s) over {window_days} day(s) ({} replaced, {} in the past, {} invalid, {} failed)",
        outcome.scheduled,
        outcome.replaced,
        outcome.skipped_past,
        outcome.skipped_invalid,
        outcome.submit_failures
    );

    while sink.pending() > 0 {
        thread::sleep(Duration::from_secs(1));
    }
    Ok(())
}
