//! Main entry point for the monitor daemon

use anyhow::{bail, Context};
use clap::Parser;
use penta_monitor::{
    args::{Args, Commands, ConfigCommands},
    daemon::{render_all_pages, HatDaemon},
    duty_for, logging, Config, Page,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Print version and build metadata for binary identity verification
    let pkg_version = env!("CARGO_PKG_VERSION");
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let git_desc = option_env!("GIT_DESC").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    eprintln!(
        "penta-monitor v{} (git {} / {}) built {}",
        pkg_version, git_hash, git_desc, build_time
    );

    let args = Args::parse();
    logging::setup(args.verbose, args.log_file.as_deref()).context("failed to set up logging")?;

    match args.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = Config::load_or_default(&args.config);
            HatDaemon::new(config).run().await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load_or_default(&args.config);
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigCommands::Init { force } => {
                if args.config.exists() && !force {
                    bail!(
                        "{} already exists; pass --force to overwrite it",
                        args.config.display()
                    );
                }
                Config::default()
                    .save_to_file(&args.config)
                    .with_context(|| format!("failed to write {}", args.config.display()))?;
                println!("Wrote default configuration to {}", args.config.display());
            }
        },
        Commands::Duty { temp } => {
            let table = Config::load_or_default(&args.config).threshold_table();
            let level = table.level_for(temp).map_or("off", |level| level.name);
            println!(
                "{:.1}°C -> {:.0}% ({})",
                temp,
                duty_for(temp, &table) * 100.0,
                level
            );
        }
        Commands::Pages => {
            let config = Config::load_or_default(&args.config);
            render_all_pages(&config, |page: &Page| println!("{}", page.texts().join("\n")));
        }
    }

    Ok(())
}
