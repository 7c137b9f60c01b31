//! Command dispatch functions
//!
//! Resolves the game session for commands that read the manifest and hands
//! off to the command handlers.

use anyhow::Result;
use uma::Filter;

use crate::cli::{Commands, GlobalArgs};
use crate::commands;
use crate::config::Config;
use crate::session::{self, Session};

fn filter(target: Option<String>, file: bool) -> Filter {
    let target = target.unwrap_or_default();
    if file {
        Filter::file(target)
    } else {
        Filter::folder(target)
    }
}

pub fn dispatch(command: Commands, global: &GlobalArgs) -> Result<()> {
    match command {
        Commands::Configure {
            data,
            region,
            cipher_lib,
            output,
            show,
        } => commands::configure::handle(
            commands::configure::Settings {
                data,
                region,
                cipher_lib,
                output,
            },
            show,
        ),

        Commands::Installs => commands::installs::handle(),

        command => dispatch_manifest(command, global),
    }
}

/// Dispatch commands that need the game data folder
fn dispatch_manifest(command: Commands, global: &GlobalArgs) -> Result<()> {
    let config = Config::load()?;
    let session = Session::resolve(global, &config)?;

    match command {
        Commands::Extract {
            target,
            file,
            output,
        } => {
            let output = session::output_dir(output, &config);
            commands::extract::handle(&session, &filter(target, file), &output, global.verbose)
        }

        Commands::ExportKeys { output } => commands::keys::handle(&session, &output),

        Commands::List => commands::list::folders(&session),

        Commands::Count { target, file } => commands::list::count(&session, &filter(target, file)),

        Commands::Configure { .. } | Commands::Installs => unreachable!(), // Handled in dispatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uma::DumpMode;

    #[test]
    fn test_filter_from_args() {
        assert_eq!(filter(None, false), Filter::all());
        assert_eq!(filter(Some("sound".into()), false), Filter::folder("sound"));

        let f = filter(Some("1001".into()), true);
        assert_eq!(f.mode, DumpMode::File);
        assert_eq!(f.target, "1001");
    }
}
