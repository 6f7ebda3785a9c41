//! `crashalert` - CLI and HTTP server for the crash alert pipeline.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use rand::Rng;
use tracing::warn;

use crashalert::cli::{
    Cli, Command, ConfigCommand, ConsoleShareSheet, ContactsCommand, LogCommand,
    NormalizeCommand, ServeCommand, SimulateCommand,
};
use crashalert::config::{MAX_COUNTDOWN_SECONDS, MIN_COUNTDOWN_SECONDS};
use crashalert::countdown::{self, CountdownOutcome, TICK};
use crashalert::dispatch::{ChannelKind, DeliveryResult, Dispatcher, ShareSheet};
use crashalert::repository::{ContactRepository, NotificationLog, SettingsStore};
use crashalert::server::{self, AppState};
use crashalert::{
    init_logging, phone, severity, Config, CrashDetector, EmergencyEvent, ImpactSample, Location,
    NewContact, Providers, Storage,
};

/// Range of the random impact force used by `simulate`.
const SIMULATED_FORCE_G: std::ops::Range<f64> = 15.0..35.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    // These two must work even when the configuration does not load
    match &cli.command {
        Command::Config(ConfigCommand::Path) => {
            println!("{}", Config::default_config_path().display());
            return Ok(());
        }
        Command::Config(ConfigCommand::Validate { file }) => {
            return handle_validate(file.clone().or_else(|| cli.config.clone()));
        }
        _ => {}
    }

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Serve(cmd) => handle_serve(config, cmd).await,
        Command::Simulate(cmd) => handle_simulate(&config, cmd).await,
        Command::Classify(cmd) => handle_classify(&config, cmd.force),
        Command::Normalize(cmd) => handle_normalize(&cmd),
        Command::Contacts(cmd) => handle_contacts(&config, cmd),
        Command::Log(cmd) => handle_log(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

fn open_storage(config: &Config) -> anyhow::Result<Arc<Storage>> {
    let path = config.database_path();
    let storage = Storage::open(&path)
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(Arc::new(storage))
}

async fn handle_serve(config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    let bind = cmd
        .bind
        .unwrap_or_else(|| config.server.bind_address.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address: {bind}"))?;

    let storage = open_storage(&config)?;
    let providers = Providers::from_config(&config.providers)?;
    if !providers.any_configured() {
        warn!("No SMS provider credentials configured; alerts will use link fallbacks");
    }

    let state = AppState::new(storage, providers, config);
    server::serve(state, addr, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

async fn handle_simulate(config: &Config, cmd: SimulateCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let settings = storage.load_settings()?.unwrap_or(config.alert);

    let force = cmd
        .force
        .unwrap_or_else(|| rand::thread_rng().gen_range(SIMULATED_FORCE_G));
    let detector = CrashDetector::new(settings.thresholds);
    let Some(signal) = detector.assess(&ImpactSample::with_force(force)) else {
        println!("Impact of {force:.1}G is below the mild threshold; no alert.");
        return Ok(());
    };

    let location = match (cmd.lat, cmd.lng) {
        (Some(lat), Some(lng)) => Location::new(lat, lng),
        _ => config.message.fallback_location,
    };
    location.validate()?;

    let seconds = cmd.countdown.unwrap_or(settings.countdown_seconds);
    if !(MIN_COUNTDOWN_SECONDS..=MAX_COUNTDOWN_SECONDS).contains(&seconds) {
        bail!(
            "countdown must be between {MIN_COUNTDOWN_SECONDS} and {MAX_COUNTDOWN_SECONDS} seconds"
        );
    }

    let event = EmergencyEvent::new(signal.severity, location, seconds);
    let providers = Providers::from_config(&config.providers)?;
    let share: Arc<dyn ShareSheet> = Arc::new(ConsoleShareSheet::stdout());
    let dispatcher = Dispatcher::standard(
        &providers,
        config.provider_timeout(),
        Some(share),
        storage.clone(),
        config.message.clone(),
    );

    println!("Crash detected: {force:.1}G classified {}", signal.severity);

    let (runner, handle) = countdown::arm(seconds, TICK);
    if cmd.now {
        handle.trigger()?;
    } else {
        println!("Sending alert in {seconds}s. Press Ctrl-C to cancel.");
    }

    let progress = {
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut shown = seconds;
            loop {
                let state = handle.state();
                if state.is_terminal() {
                    break;
                }
                if state.remaining_seconds < shown {
                    shown = state.remaining_seconds;
                    println!("  {shown}...");
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
    };
    let interrupt = {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() && handle.cancel().is_ok() {
                println!("Cancelling...");
            }
        })
    };

    let contacts = storage.clone();
    let report = runner
        .run(|_reason| async move {
            let targets = contacts.list_contacts()?;
            Ok::<_, crashalert::Error>(dispatcher.dispatch(&event, &targets).await)
        })
        .await;
    interrupt.abort();
    progress.abort();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match report.outcome {
        CountdownOutcome::Cancelled => {
            println!(
                "Alert cancelled with {}s remaining. No one was notified.",
                report.final_state.remaining_seconds
            );
        }
        CountdownOutcome::Dispatched(result) => print_delivery(&result),
        CountdownOutcome::DispatchFailed(message) => bail!("alert could not be sent: {message}"),
    }
    Ok(())
}

fn print_delivery(result: &DeliveryResult) {
    println!();
    println!("Alert {}", if result.success { "sent" } else { "FAILED" });
    println!("  Event:     {}", result.event_id);
    println!("  Sent:      {}", result.sent_count);
    println!("  Failed:    {}", result.failed_count);
    println!("  Skipped:   {}", result.skipped_count);
    if result.fallback_used {
        println!("  Fallback links were used; delivery is not confirmed.");
    }
    for outcome in &result.outcomes {
        let contact = outcome
            .contact_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let channel = outcome
            .channel
            .map_or("none", ChannelKind::as_str);
        let status = if outcome.success { "ok" } else { "failed" };
        print!("  contact {contact:>4}  {channel:<14} {status}");
        if let Some(error) = &outcome.error {
            print!("  ({error})");
        }
        println!();
        if let Some(link) = &outcome.link {
            println!("      {link}");
        }
    }
}

fn handle_classify(config: &Config, force: f64) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let thresholds = storage
        .load_settings()?
        .map_or(config.alert.thresholds, |s| s.thresholds);
    println!("{}", severity::classify(force, &thresholds));
    Ok(())
}

fn handle_normalize(cmd: &NormalizeCommand) -> anyhow::Result<()> {
    let normalized: Vec<_> = cmd.phones.iter().map(|raw| phone::normalize(raw)).collect();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&normalized)?);
        return Ok(());
    }

    for n in &normalized {
        match n.e164() {
            Some(e164) => println!("{:<20} {:<14} {:<14} {e164}", n.raw, n.class, n.canonical),
            None => println!("{:<20} {}", n.raw, n.class),
        }
    }
    Ok(())
}

fn handle_contacts(config: &Config, cmd: ContactsCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;

    match cmd {
        ContactsCommand::List { json } => {
            let contacts = storage.list_contacts()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&contacts)?);
            } else if contacts.is_empty() {
                println!("No emergency contacts.");
            } else {
                for c in &contacts {
                    let mut channels = Vec::new();
                    if c.notify_by_sms {
                        channels.push("sms");
                    }
                    if c.notify_by_email {
                        channels.push("email");
                    }
                    println!(
                        "{:>4}  {:<24} {:<16} {:<28} {}",
                        c.id,
                        c.name,
                        c.phone,
                        c.email.as_deref().unwrap_or("-"),
                        channels.join(",")
                    );
                }
            }
        }
        ContactsCommand::Add {
            name,
            phone,
            email,
            no_sms,
            notify_email,
        } => {
            let mut contact = NewContact::new(name, phone);
            if let Some(email) = email {
                contact = contact.with_email(email);
            }
            contact.notify_by_sms = !no_sms;
            contact.notify_by_email = notify_email;

            let created = storage.create_contact(contact)?;
            println!("Added contact {} ({})", created.id, created.name);
        }
        ContactsCommand::Remove { id } => {
            if storage.delete_contact(id)? {
                println!("Removed contact {id}");
            } else {
                bail!("contact {id} not found");
            }
        }
    }
    Ok(())
}

fn handle_log(config: &Config, cmd: &LogCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let records = storage.recent(cmd.limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No notifications recorded.");
        return Ok(());
    }

    for r in &records {
        let contact = r
            .contact_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let channel = r.channel.map_or("-", ChannelKind::as_str);
        println!(
            "{}  {}  contact {:>4}  {:<14} {}{}",
            r.attempted_at.format("%Y-%m-%d %H:%M:%S"),
            r.event_id,
            contact,
            channel,
            if r.success { "ok" } else { "failed" },
            r.error_message
                .as_deref()
                .map(|e| format!("  ({e})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;
    let providers = Providers::from_config(&config.providers)?;
    let settings = storage.load_settings()?.unwrap_or(config.alert);

    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "config_path": Config::default_config_path(),
            "domestic_provider": providers.domestic.is_configured(),
            "international_provider": providers.international.is_configured(),
            "countdown_seconds": settings.countdown_seconds,
            "thresholds": settings.thresholds,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let configured = |yes: bool| if yes { "configured" } else { "not configured" };
    println!("crashalert status");
    println!("-----------------");
    println!("Database:        {}", storage.path().display());
    println!("Contacts:        {}", stats.total_contacts);
    println!(
        "Notifications:   {} ({} successful)",
        stats.total_notifications, stats.successful_notifications
    );
    if let Some(last) = stats.last_notification_at {
        println!("Last alert:      {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("Database size:   {} bytes", stats.db_size_bytes);
    println!();
    println!(
        "Domestic SMS:    {}",
        configured(providers.domestic.is_configured())
    );
    println!(
        "International:   {}",
        configured(providers.international.is_configured())
    );
    println!("Countdown:       {}s", settings.countdown_seconds);
    println!(
        "Thresholds:      mild {} / moderate {} / severe {}",
        settings.thresholds.mild, settings.thresholds.moderate, settings.thresholds.severe
    );
    Ok(())
}

fn handle_validate(path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => bail!("configuration error: {e}"),
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json: true } => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
        ConfigCommand::Show { json: false } => {
            let shown = config.redacted();
            println!("Current Configuration");
            println!("=====================");
            println!();
            println!("[storage]");
            println!("  database_path:      {}", shown.database_path().display());
            println!();
            println!("[alert]");
            println!("  countdown_seconds:  {}", shown.alert.countdown_seconds);
            println!("  thresholds.mild:    {}", shown.alert.thresholds.mild);
            println!("  thresholds.moderate:{}", shown.alert.thresholds.moderate);
            println!("  thresholds.severe:  {}", shown.alert.thresholds.severe);
            println!();
            println!("[message]");
            println!("  maps_base_url:      {}", shown.message.maps_base_url);
            println!(
                "  fallback_location:  {}, {}",
                shown.message.fallback_location.lat, shown.message.fallback_location.lng
            );
            println!();
            println!("[providers]");
            println!("  timeout_ms:         {}", shown.providers.timeout_ms);
            println!(
                "  domestic.api_key:   {}",
                shown.providers.domestic.api_key.as_deref().unwrap_or("(unset)")
            );
            println!(
                "  international.sid:  {}",
                shown
                    .providers
                    .international
                    .account_sid
                    .as_deref()
                    .unwrap_or("(unset)")
            );
            println!();
            println!("[server]");
            println!("  bind_address:       {}", shown.server.bind_address);
        }
        // Handled before the configuration is loaded
        ConfigCommand::Path | ConfigCommand::Validate { .. } => {}
    }
    Ok(())
}
