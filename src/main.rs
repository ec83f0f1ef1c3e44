use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    novelbind::logging::init().context("init logging")?;

    let cli = novelbind::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novelbind::cli::Command::Build(args) => {
            novelbind::build::run(args).context("build")?;
        }
        novelbind::cli::Command::Sources => {
            for source in novelbind::sources::registry()? {
                println!("{}", source.name());
            }
        }
    }

    Ok(())
}
