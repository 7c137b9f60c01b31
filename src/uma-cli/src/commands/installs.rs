//! Installation detection command

use anyhow::Result;
use uma::GameInstall;

pub fn handle() -> Result<()> {
    let installs = uma::detect_installs();
    if installs.is_empty() {
        println!("No game installations found.");
        println!("Pass --data <path> to use a custom game data folder.");
        return Ok(());
    }

    for (i, install) in installs.iter().enumerate() {
        println!("{}: {}", i + 1, describe(install));
        println!("   {}", install.path.display());
    }

    Ok(())
}

fn describe(install: &GameInstall) -> String {
    match install.region {
        Some(region) => format!("{} [{}]", install.label, region),
        None => format!("{} [region: pass --region]", install.label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uma::Region;

    #[test]
    fn test_describe() {
        let mut install = GameInstall {
            path: PathBuf::from("/x"),
            label: "Japan (DMM)",
            region: Some(Region::Jp),
        };
        assert_eq!(describe(&install), "Japan (DMM) [jp]");

        install.region = None;
        assert!(describe(&install).contains("--region"));
    }
}
