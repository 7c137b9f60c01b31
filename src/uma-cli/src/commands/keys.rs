//! Key export command

use anyhow::{Context, Result};
use std::path::Path;
use uma::BackendKind;

use crate::session::Session;

pub fn handle(session: &Session, output: &Path) -> Result<()> {
    println!("Reading encryption keys from meta...");
    let manifest = session.open_manifest()?;
    match manifest.kind() {
        BackendKind::Cipher => println!("Database is encrypted, using decryption..."),
        BackendKind::Plain => println!("Database is not encrypted."),
    }

    let keys = uma::export_keys(&manifest).context("Failed to read encryption keys")?;
    if keys.is_empty() {
        println!("No encryption keys found in database.");
        return Ok(());
    }

    uma::write_keys(output, &keys)
        .with_context(|| format!("Failed to write keys to {}", output.display()))?;
    println!("Exported {} encryption keys to {}", keys.len(), output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::GlobalArgs;
    use crate::config::Config;
    use std::path::PathBuf;
    use uma::Region;

    fn session(root: &Path, rows: &str) -> Session {
        std::fs::create_dir_all(root).unwrap();
        let conn = rusqlite::Connection::open(root.join("meta")).unwrap();
        conn.execute_batch(&format!(
            "CREATE TABLE a (n TEXT, h TEXT, s INTEGER, m TEXT, e INTEGER); {rows}"
        ))
        .unwrap();

        let args = GlobalArgs {
            data: Some(root.to_path_buf()),
            region: Some(Region::Global),
            ..GlobalArgs::default()
        };
        Session::resolve_with(&args, &Config::default(), Vec::new).unwrap()
    }

    #[test]
    fn test_export_writes_nonzero_keys() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(
            &dir.path().join("game"),
            "INSERT INTO a VALUES ('a/x', 'h1', 1, 'assetbundle', 5);
             INSERT INTO a VALUES ('a/y', 'h2', 1, 'assetbundle', 0);",
        );
        let output: PathBuf = dir.path().join("keys.json");

        handle(&session, &output).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("\"a/x\": 5"));
        assert!(!text.contains("a/y"));
    }

    #[test]
    fn test_no_keys_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(
            &dir.path().join("game"),
            "INSERT INTO a VALUES ('a/y', 'h2', 1, 'assetbundle', 0);",
        );
        let output = dir.path().join("keys.json");

        handle(&session, &output).unwrap();
        assert!(!output.exists());
    }
}
