use clap::{Parser, Subcommand};
use roll_backup::backup::backup_set::BackupSet;
use roll_backup::backup::result_error::error::Error;
use roll_backup::backup::result_error::AddMsg;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};
use validator::Validate;

/// Keep rolling zip backups of a file and restore the latest one
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive the data file as the newest generation
    Backup,
    /// Restore the newest generation over the data file
    Restore,
    /// List backup archives in the backup folder
    List,
}

fn run(backup_set: &BackupSet, command: &Command) -> Result<(), Error> {
    match command {
        Command::Backup => {
            let name = backup_set.create_rolling_backup()?;
            info!("Backed up {:?} as {}", backup_set.data_file(), name);
        }
        Command::Restore => {
            let restored = backup_set.restore_backup()?;
            info!("Restored {:?}", restored);
        }
        Command::List => {
            for (generation, path) in backup_set.generations()? {
                println!("{generation:>2} {}", path.display());
            }
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let res = File::open(&args.config)
        .map_err(Error::from)
        .and_then(|f| {
            serde_yml::from_reader::<_, BackupSet>(f)
                .map_err(Error::from)
                .add_msg(format!("Parse YAML config failed: {:?}", &args.config))
        })
        .and_then(|bs| {
            bs.validate()
                .map_err(Error::from)
                .map(|_| bs)
                .add_msg(format!("Config validation failed: {:?}", &args.config))
        })
        .and_then(|bs| run(&bs, &args.command));

    if let Err(e) = res {
        error!("{e}");
        exit(1);
    }
}
