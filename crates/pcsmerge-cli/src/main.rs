use anyhow::Context;
use clap::Parser;
use pcsmerge_core::config::Settings;
use pcsmerge_core::logging::init_logging;
use pcsmerge_engine::{MergeDriver, MergeOutput};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "pcsmerge",
    about = "Three-way structured merge of a base/left/right case directory"
)]
struct Cli {
    /// Directory holding file_base, file_left and file_right
    case_dir: PathBuf,

    /// Settings file (default: <CASE_DIR>/pcsmerge.json if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Language of the sources (default: from the file extension)
    #[arg(long)]
    language: Option<String>,

    /// Also write logs to <DIR>/pcsmerge.log
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Write merge statistics next to the merged file
    #[arg(long)]
    report: bool,

    /// Print the merged file instead of writing it
    #[arg(long)]
    stdout: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::resolve(cli.config.as_deref(), &cli.case_dir)?;
    if let Some(language) = &cli.language {
        settings.merge.language = Some(language.clone());
    }
    if let Some(dir) = &cli.log_dir {
        settings.logging.log_dir = Some(dir.clone());
    }
    if cli.report {
        settings.output.write_report = true;
    }

    let _guard = init_logging(&settings.logging.level, settings.logging.log_dir.as_deref())?;

    let driver = MergeDriver::new(settings.driver_config()?);
    let case = driver
        .discover(&cli.case_dir)
        .with_context(|| format!("reading merge case {}", cli.case_dir.display()))?;
    let output = driver
        .merge_case(&case)
        .with_context(|| format!("merging {}", cli.case_dir.display()))?;

    if cli.stdout {
        print!("{}", output.content);
    } else {
        output.write_to(&case.merged)?;
    }

    if settings.output.write_report {
        let path = report_path(&case.merged);
        write_report(&output, &path)?;
        tracing::info!(path = %path.display(), "wrote report");
    }

    print_summary(&output, &case.merged, cli.stdout);
    Ok(())
}

fn report_path(merged: &Path) -> PathBuf {
    let mut name = merged.file_name().unwrap_or_default().to_os_string();
    name.push(".report.json");
    merged.with_file_name(name)
}

fn write_report(output: &MergeOutput, path: &Path) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(&output.stats)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn print_summary(output: &MergeOutput, merged: &Path, to_stdout: bool) {
    let stats = &output.stats;
    let target = if to_stdout {
        "stdout".to_string()
    } else {
        merged.display().to_string()
    };
    eprintln!("Merged into {}", target);
    eprintln!("  {:<8} {:>6} {:>14}", "State", "PCSs", "ContentTuples");
    for (state, size) in [
        ("base", stats.base),
        ("left", stats.left),
        ("right", stats.right),
        ("union", stats.union),
        ("merged", stats.merged),
    ] {
        eprintln!("  {:<8} {:>6} {:>14}", state, size.pcs, size.content);
    }
    if output.has_conflicts() {
        eprintln!(
            "  Conflicts: {} structural, {} content, {} list",
            stats.hard_pcs, stats.hard_content, stats.list_conflicts
        );
    } else {
        eprintln!("  No conflicts");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_sits_next_to_merged_file() {
        let path = report_path(Path::new("cases/7/file_merged.java"));
        assert_eq!(path, PathBuf::from("cases/7/file_merged.java.report.json"));
    }

    #[test]
    fn test_cli_requires_case_dir() {
        assert!(Cli::try_parse_from(["pcsmerge"]).is_err());
        assert!(Cli::try_parse_from(["pcsmerge", "a", "b"]).is_err());
        let cli = Cli::try_parse_from(["pcsmerge", "case", "--report", "--language", "java"]).unwrap();
        assert_eq!(cli.case_dir, PathBuf::from("case"));
        assert!(cli.report);
        assert_eq!(cli.language.as_deref(), Some("java"));
    }
}
