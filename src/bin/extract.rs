use std::path::PathBuf;

use anyhow::{Result, anyhow};

use fbref_pipeline::config::Paths;
use fbref_pipeline::extract;

fn main() -> Result<()> {
    let paths = parse_data_dir_arg()
        .map(|base| Paths::from_base(&base))
        .unwrap_or_else(Paths::from_env);

    let (summaries, errors) = extract::run_all_extracts(&paths);

    if std::env::args().any(|arg| arg == "--json") {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        for err in &errors {
            eprintln!("failed: {err}");
        }
        if summaries.is_empty() {
            return Err(anyhow!("no dataset extracted"));
        }
        return Ok(());
    }

    println!("Extract complete");
    println!("Output dir: {}", paths.extract_dir.display());
    for summary in &summaries {
        println!(
            "{}: files={} rows={} -> {}",
            summary.dataset,
            summary.files_read,
            summary.rows_written,
            summary.output.display()
        );
        if !summary.warnings.is_empty() {
            println!("  warnings: {}", summary.warnings.len());
            for warning in summary.warnings.iter().take(6) {
                println!("   - {warning}");
            }
        }
    }
    for err in &errors {
        println!("failed: {err}");
    }

    if summaries.is_empty() {
        return Err(anyhow!("no dataset extracted"));
    }
    Ok(())
}

fn parse_data_dir_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--data-dir=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--data-dir" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
