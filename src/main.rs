pub mod args;

use anyhow::Context;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use xp4rel::types::BuildConfig;
use xp4rel::utils::progress::Reporter;
use xp4rel::xp4::classify::ClassList;
use xp4rel::xp4::release::{ReleaseOptions, ReleaseReport, compact, release};
use xp4rel::xp4::set::{ArchiveSet, list_archive_set};

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints `NN% done` on stderr and stops the operation once Ctrl-C was pressed.
fn console_progress(quiet: bool, interrupt: Arc<AtomicBool>) -> Reporter<impl FnMut(u32)> {
    let mut last = None;
    Reporter::new(move |percent| {
        if quiet || last == Some(percent) {
            return;
        }
        last = Some(percent);
        eprint!("{:3}% done\r", percent);
        let _ = std::io::stderr().flush();
    })
    .with_interrupt(interrupt)
}

fn class_list(classes: &args::ClassArgs) -> anyhow::Result<ClassList> {
    let mut list = if classes.no_default_classes {
        ClassList::new()
    } else {
        ClassList::default_list().clone()
    };
    if let Some(path) = &classes.class_file {
        let extra = ClassList::from_file(path)
            .with_context(|| format!("Failed to load class list '{}'", path.display()))?;
        list.extend(&extra);
    }
    Ok(list)
}

fn build_config(write: &args::WriteArgs) -> BuildConfig {
    BuildConfig {
        volume_size_limit: write.split.unwrap_or(0),
        compress_index: !write.raw_index,
        zlib_compression_level: write.level,
        ..Default::default()
    }
}

fn print_report(report: &ReleaseReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for change in &report.changes {
            println!("{} {}", change.state.tag(), change.path);
        }
    }
    Ok(())
}

fn list(archive: &Path, json: bool) -> anyhow::Result<()> {
    let volumes = list_archive_set(archive)
        .with_context(|| format!("Failed to read '{}'", archive.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&volumes)?);
        return Ok(());
    }
    for volume in &volumes {
        println!("{}", volume.path.display());
        if let Some(target) = &volume.target_dir {
            println!("  target: {}", target);
        }
        for file in &volume.files {
            println!(
                "  {} {:04x} {:23} {:>12} {:>12} {}",
                file.state.tag(),
                file.flags,
                file.time.as_deref().unwrap_or("-"),
                file.size,
                file.archived_size,
                file.name
            );
        }
    }
    Ok(())
}

fn run(arg: &args::Arg, interrupt: Arc<AtomicBool>) -> anyhow::Result<()> {
    let mut progress = console_progress(arg.quiet, interrupt);
    match &arg.command {
        args::Command::Build(build) => {
            let options = ReleaseOptions {
                archive: build.archive.clone(),
                target_dir: build.target.clone(),
                class_list: class_list(&build.classes)?,
                config: build_config(&build.write),
                force_new: build.force_new,
                dry_run: build.dry_run,
            };
            let report = release(&options, &mut progress)
                .with_context(|| format!("Failed to build '{}'", build.archive.display()))?;
            finish_progress(arg.quiet);
            print_report(&report, build.json)?;
        }
        args::Command::Diff {
            archive,
            target,
            classes,
            json,
        } => {
            let mut options = ReleaseOptions::new(archive.clone());
            options.target_dir = target.clone();
            options.class_list = class_list(classes)?;
            options.dry_run = true;
            let report = release(&options, &mut progress)
                .with_context(|| format!("Failed to compare '{}'", archive.display()))?;
            finish_progress(arg.quiet);
            print_report(&report, *json)?;
        }
        args::Command::List { archive, json } => list(archive, *json)?,
        args::Command::Extract { archive, output } => {
            let set = ArchiveSet::open(archive, &mut xp4rel::utils::progress::NoProgress)
                .with_context(|| format!("Failed to read '{}'", archive.display()))?;
            let count = set
                .extract_all(output, &mut progress)
                .with_context(|| format!("Failed to extract to '{}'", output.display()))?;
            finish_progress(arg.quiet);
            tracing::info!("Extracted {} files to '{}'", count, output.display());
        }
        args::Command::Compact {
            archive,
            output,
            write,
        } => {
            let volumes = compact(archive, output, &build_config(write), &mut progress)
                .with_context(|| format!("Failed to compact '{}'", archive.display()))?;
            finish_progress(arg.quiet);
            for volume in volumes {
                tracing::info!("Wrote '{}'", volume.display());
            }
        }
    }
    Ok(())
}

fn finish_progress(quiet: bool) {
    if !quiet {
        eprintln!();
    }
}

fn main() {
    let arg = args::parse_args();
    if arg.backtrace {
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "1") };
    }
    init_logging();
    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let interrupt = interrupt.clone();
        if let Err(e) = ctrlc::set_handler(move || interrupt.store(true, Ordering::Relaxed)) {
            tracing::warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }
    if let Err(e) = run(&arg, interrupt) {
        eprintln!("Error: {:#}", e);
        if arg.backtrace {
            eprintln!("Backtrace: {}", e.backtrace());
        }
        std::process::exit(1);
    }
}
