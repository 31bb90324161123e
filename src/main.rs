use anyhow::{Result, bail};
use clap::Parser;
use picsort::picsort_core::apply::{DecisionApplier, TransferMode, read_decisions};
use picsort::picsort_core::builder::{ManifestBuilder, RebuildResult};
use picsort::picsort_core::export::ExportWriter;
use picsort::picsort_core::input::command_for_input;
use picsort::picsort_core::manifest::{MediaItem, load_manifest};
use picsort::picsort_core::session::{Command, FilterMode, TriageSession};
use picsort::picsort_core::{Cli, Commands};
use simplelog::{CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, WriteLogger};
use std::fs::File;
use std::io::{self, BufRead, Write};

const DISPLAY_DATE_FORMAT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]");

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize loggers
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Warn,
        Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];

    if cli.log {
        loggers.push(WriteLogger::new(
            cli.log_level,
            Config::default(),
            File::create("picsort.log")?,
        ));
    }

    CombinedLogger::init(loggers)?;

    let mut config = picsort::picsort_core::Config::load(cli.config.as_deref())?;
    if let Some(images_dir) = cli.images_dir {
        config.images_dir = images_dir;
    }
    if let Some(manifest) = cli.manifest {
        config.manifest_path = manifest;
    }

    let builder = ManifestBuilder::new(&config).with_progress(true);
    let images_dir = config.images_dir.clone();

    match cli.command {
        Commands::Build { force } => {
            // A current manifest is reused unless it cannot be read.
            let current = if force || builder.needs_rebuild(&images_dir)? {
                None
            } else {
                match load_manifest(builder.manifest_path(), &config.src_prefix) {
                    Ok(items) => Some(items),
                    Err(e) => {
                        log::warn!("{}; rebuilding", e);
                        None
                    }
                }
            };

            let mut failed = false;
            let result = match current {
                Some(items) => RebuildResult {
                    ok: true,
                    count: items.len(),
                    error: None,
                },
                None => {
                    let built = builder.build(&images_dir);
                    failed = built.is_err();
                    if let Ok(report) = &built {
                        eprintln!("{}", report);
                        for skipped in &report.skipped {
                            eprintln!("  skipped {}: {}", skipped.path.display(), skipped.reason);
                        }
                    }
                    RebuildResult::from(built)
                }
            };

            println!("{}", serde_json::to_string(&result)?);
            if failed {
                bail!("manifest build failed");
            }
        }

        Commands::Status => {
            println!("Manifest: {}", builder.manifest_path().display());
            println!("{}", builder.status());
            if let Ok(items) = load_manifest(builder.manifest_path(), &config.src_prefix) {
                let gps = items.iter().filter(|i| i.gps.is_some()).count();
                println!("  {} items, {} with GPS", items.len(), gps);
            }
        }

        Commands::List { filter } => {
            let loaded = builder.load_or_build(&images_dir)?;
            for item in loaded.items.iter().filter(|i| filter.matches(i.kind)) {
                println!("{}\t{}\t{}\t{}", item.filename, item.kind, date_label(item), item.src);
            }
        }

        Commands::Triage { filter } => {
            let loaded = builder.load_or_build(&images_dir)?;
            println!("{}", loaded.status);

            let mut session = TriageSession::new(loaded.items);
            if filter != FilterMode::All {
                session.apply(Command::ChangeFilter(filter));
            }
            let writer = ExportWriter::new(&config.decisions_path);
            triage(&mut session, &writer)?;
        }

        Commands::Apply {
            copy,
            decisions,
            out,
        } => {
            let decisions_path = decisions.unwrap_or_else(|| config.decisions_path.clone());
            let sorted_dir = out.unwrap_or_else(|| config.sorted_dir.clone());
            let mode = if copy { TransferMode::Copy } else { TransferMode::Move };

            let decisions = read_decisions(&decisions_path)?;
            let mut applier = DecisionApplier::new(&images_dir, &sorted_dir, mode);
            match load_manifest(builder.manifest_path(), &config.src_prefix) {
                Ok(items) => applier = applier.with_manifest(&items),
                Err(e) => log::warn!("{}; resolving files by name only", e),
            }

            let stats = applier.apply(&decisions);
            println!("{}", stats);
        }
    }

    Ok(())
}

/// Run the interactive loop: one command per line until `q` or end of input.
///
/// `q` only quits once the decisions are saved. At end of input a failed
/// save is returned as the error.
fn triage(session: &mut TriageSession, writer: &ExportWriter) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print_current(session, &mut stdout)?;

    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim() {
            "" => continue,
            "s" => {
                save(session, writer, &mut stdout)?;
            }
            "q" => {
                if save(session, writer, &mut stdout)? {
                    return Ok(());
                }
                writeln!(stdout, "Decisions not saved; fix the problem and press q again.")?;
            }
            input => match command_for_input(input) {
                Some(command) => {
                    session.apply(command);
                    print_current(session, &mut stdout)?;
                }
                None => writeln!(stdout, "Unknown command: {}", input)?,
            },
        }
    }

    let summary = writer.export(session.items())?;
    writeln!(stdout, "Saved {} to {}", summary, writer.path().display())?;
    Ok(())
}

/// Export and report the outcome. A failed write keeps the session as it was.
fn save(session: &TriageSession, writer: &ExportWriter, out: &mut impl Write) -> Result<bool> {
    match writer.export(session.items()) {
        Ok(summary) => {
            writeln!(out, "Saved {} to {}", summary, writer.path().display())?;
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "{}", e)?;
            Ok(false)
        }
    }
}

fn print_current(session: &TriageSession, out: &mut impl Write) -> Result<()> {
    let view = session.view();
    match (session.current(), view.cursor()) {
        (Some(item), Some(position)) => writeln!(
            out,
            "[{}/{}] {}  {}  {}  {}",
            position + 1,
            view.len(),
            item.filename,
            item.kind,
            date_label(item),
            item.disposition
        )?,
        _ => writeln!(out, "No {} items to show.", filter_label(view.filter()))?,
    }
    Ok(())
}

fn filter_label(filter: FilterMode) -> &'static str {
    match filter {
        FilterMode::All => "media",
        FilterMode::Image => "image",
        FilterMode::Video => "video",
    }
}

fn date_label(item: &MediaItem) -> String {
    item.capture_date
        .and_then(|date| date.format(DISPLAY_DATE_FORMAT).ok())
        .unwrap_or_else(|| "undated".to_string())
}
