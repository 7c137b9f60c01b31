//! Asset extraction command

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use uma::{ExtractContext, Filter};

use crate::session::Session;

pub fn handle(session: &Session, filter: &Filter, output: &Path, verbose: bool) -> Result<()> {
    let manifest = session.open_manifest()?;
    let mut ctx = ExtractContext::new(output);

    let planned = manifest.count(filter).context("Failed to count matching files")?;
    if planned == 0 {
        println!("No files match {}", describe(filter));
        return Ok(());
    }

    let pb = ProgressBar::new(planned as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    println!("Starting file copy...");
    let keys = uma::extract(&manifest, &session.data, filter, &mut ctx, |progress| {
        pb.inc(1);
        if verbose {
            pb.println(format!("{:?}: {}", progress.outcome, progress.path));
        }
    })
    .context("Extraction failed")?;

    pb.finish_and_clear();

    println!(
        "Completed. Total files copied: {} (skipped {})",
        ctx.stats.copied, ctx.stats.skipped
    );
    println!("Output: {}", output.display());
    if let Some(path) = keys {
        println!("Exported {} encryption keys to {}", ctx.keys.len(), path.display());
    }

    Ok(())
}

fn describe(filter: &Filter) -> String {
    if filter.target.is_empty() {
        "the selection".to_string()
    } else if filter.is_file_dump() {
        format!("file name \"{}\"", filter.target)
    } else {
        format!("folder \"{}\"", filter.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(describe(&Filter::all()), "the selection");
        assert_eq!(describe(&Filter::folder("sound")), "folder \"sound\"");
        assert_eq!(describe(&Filter::file("1001")), "file name \"1001\"");
    }
}
