//! Index command - build the project index over raw-content URLs

use crate::cli::args::{IndexArgs, OutputFormat};
use crate::config::Config;
use crate::error::RegcacheResult;
use crate::fetch::create_fetcher;
use crate::index::{build_index, load_index_dir, retrieve_index, IndexedProject};
use crate::source::{FetchStrategy, Phase};
use crate::ui::{self, UiContext};
use console::style;

/// Execute the index command
pub async fn execute(args: IndexArgs, config: &Config) -> RegcacheResult<()> {
    let files = match args.dir {
        Some(ref dir) => load_index_dir(dir, &config.index.template_marker).await?,
        None => retrieve_index(&config.index, &config.cache, &config.fetch).await?,
    };

    let fetcher = create_fetcher(FetchStrategy::for_phase(Phase::IndexBuild), config);
    let indexed = build_index(fetcher, &files, &config.cache.scratch_dir).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&indexed)?),
        OutputFormat::Table => print_table(&indexed),
        OutputFormat::Plain => {
            for entry in &indexed {
                let p = &entry.project;
                println!("{}/{}:{}", p.app_id, p.job_id, p.desired_tag);
            }
        }
    }

    Ok(())
}

fn print_table(indexed: &[IndexedProject]) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "Container index");

    println!(
        "{:<40} {:<18} {:<8}",
        style("PROJECT").bold(),
        style("BUILD DEFINITION").bold(),
        style("README").bold()
    );
    println!("{}", "-".repeat(68));

    let mark = |present: bool| if present { "yes" } else { "-" };
    for entry in indexed {
        let p = &entry.project;
        println!(
            "{:<40} {:<18} {:<8}",
            format!("{}/{}:{}", p.app_id, p.job_id, p.desired_tag),
            mark(entry.build_definition.is_some()),
            mark(entry.readme.is_some())
        );
    }

    ui::key_value(&ctx, "Projects", &indexed.len().to_string());
}
