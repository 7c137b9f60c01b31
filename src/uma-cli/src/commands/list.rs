//! Manifest listing commands

use anyhow::{Context, Result};
use uma::Filter;

use crate::session::Session;

/// Print the folders available for folder dumps
pub fn folders(session: &Session) -> Result<()> {
    let manifest = session.open_manifest()?;
    let mut query = manifest.folders()?;

    println!();
    println!("Available folders:");
    let mut total = 0;
    for folder in query.rows()? {
        let folder = folder.context("Failed to read folder list")?;
        println!("  {}", folder);
        total += 1;
    }
    println!("{} folders", total);

    Ok(())
}

/// Print how many files an extraction with `filter` would copy
pub fn count(session: &Session, filter: &Filter) -> Result<()> {
    let manifest = session.open_manifest()?;
    let count = manifest.count(filter).context("Failed to count matching files")?;
    println!("{}", count);
    Ok(())
}
