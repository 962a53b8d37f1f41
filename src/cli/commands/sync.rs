//! Sync command - refresh cache slots from a descriptor manifest

use crate::cli::args::{OutputFormat, SyncArgs};
use crate::config::Config;
use crate::descriptor::load_manifest;
use crate::error::RegcacheResult;
use crate::fetch::create_fetcher;
use crate::source::{FetchStrategy, Phase};
use crate::sync::{sync_batch, BatchReport, SyncContext, SyncOutcome};
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the sync command
pub async fn execute(args: SyncArgs, config: &Config) -> RegcacheResult<()> {
    let descriptors = load_manifest(&args.manifest).await?;

    let mut config = config.clone();
    if let Some(root) = args.cache_root {
        config.cache.root = root;
    }

    let fetcher = create_fetcher(FetchStrategy::for_phase(Phase::TagSync), &config);
    let ctx = SyncContext::new(&config, fetcher);

    let report = if args.format == OutputFormat::Table {
        let ui_ctx = UiContext::detect();
        let mut spinner = TaskSpinner::new(&ui_ctx);
        spinner.start(&format!("Syncing {} project(s)...", descriptors.len()));
        match sync_batch(&ctx, descriptors).await {
            Ok(report) => {
                spinner.stop("Sync finished");
                report
            }
            Err(e) => {
                spinner.stop_error("Sync could not start");
                return Err(e);
            }
        }
    } else {
        sync_batch(&ctx, descriptors).await?
    };

    match args.format {
        OutputFormat::Table => print_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => print_plain(&report),
    }

    Ok(())
}

fn print_table(report: &BatchReport) {
    let ctx = UiContext::detect();
    ui::section(&ctx, "Cache slots");

    for item in &report.items {
        let label = format!("{} (build {})", item.key, item.build_number);
        let detail = item.warnings.first().map(String::as_str).unwrap_or_default();
        match item.outcome {
            SyncOutcome::Refreshed if item.readme_installed => {
                ui::step_ok_detail(&ctx, &label, "build definition and README")
            }
            SyncOutcome::Refreshed => ui::step_ok_detail(&ctx, &label, "build definition"),
            SyncOutcome::Fresh => ui::step_info(&ctx, &format!("{} is up to date", label)),
            SyncOutcome::FallbackInstalled => ui::step_warn_hint(&ctx, &label, detail),
            SyncOutcome::Failed => ui::step_error(&ctx, &format!("{}: {}", label, detail)),
        }
    }

    let failed = report.count(SyncOutcome::Failed);
    let summary = format!(
        "{} refreshed, {} fallback, {} fresh, {} failed",
        report.count(SyncOutcome::Refreshed),
        report.count(SyncOutcome::FallbackInstalled),
        report.count(SyncOutcome::Fresh),
        failed
    );
    if failed == 0 {
        ui::outro_success(&ctx, &summary);
    } else {
        ui::outro_warn(&ctx, &summary);
    }
}

fn print_plain(report: &BatchReport) {
    for item in &report.items {
        println!("{}\t{}\t{}", item.key, item.build_number, item.outcome);
    }
}
