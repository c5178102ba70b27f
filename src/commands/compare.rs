use crate::core::compare::{self, HarnessOptions, Tally};
use crate::error::{Result, ScrapeError};
use tracing::info;

pub fn run_comparison(options: &HarnessOptions, format: &str) -> Result<Tally> {
    let records = compare::compare_tree(options)?;

    match format {
        "text" => {
            for row in compare::render_report(&records) {
                println!("{row}");
            }
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        other => {
            return Err(ScrapeError::config_error(format!(
                "unknown report format '{other}' (expected text or json)"
            )));
        }
    }

    let tally = Tally::of(&records);
    if records.is_empty() {
        info!(
            "No files ending in '{}' under {}",
            options.old_suffix,
            options.root.display()
        );
    } else {
        info!(
            identical = tally.identical,
            different = tally.different,
            missing = tally.missing,
            "compared {} artifacts",
            records.len()
        );
    }

    Ok(tally)
}
