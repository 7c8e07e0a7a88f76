// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use deltaforge::cli::{Cli, Commands};
use deltaforge::commands;
use deltaforge::config::Config;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::init(&config)?,
        Commands::Register {
            name,
            source_dir,
            description,
            no_patches,
        } => commands::register(&config, &name, &source_dir, description, no_patches)?,
        Commands::List => commands::list(&config)?,
        Commands::Show { name } => commands::show(&config, &name)?,
        Commands::Delete { name } => commands::delete(&config, &name)?,
        Commands::GenPatch { source, target } => commands::gen_patch(&config, &source, &target)?,
        Commands::Patches { version } => commands::patches(&config, version.as_deref())?,
        Commands::Fetch { name, output } => commands::fetch(&config, &name, &output)?,
        Commands::FetchPatch {
            source,
            target,
            output,
        } => commands::fetch_patch(&config, &source, &target, &output)?,
        Commands::Install { name, no_current } => commands::install(&config, &name, no_current)?,
        Commands::Update { name } => commands::update(&config, &name)?,
        Commands::Status => commands::status(&config)?,
        Commands::Downloads { limit } => commands::downloads(&config, limit)?,
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "deltaforge",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
