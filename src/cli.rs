use std::io::Write as _;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape a novel and bind it into an EPUB.
    Build(BuildArgs),
    /// List the registered source adapters.
    Sources,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Novel homepage URL; selects the adapter whose name it contains.
    pub url: String,

    /// Output directory root.
    #[arg(short, long, default_value = "novel_out")]
    pub output: String,

    /// Skip all confirmation prompts.
    #[arg(short, long)]
    pub yes: bool,

    /// Blacklist phrase file, one phrase per line.
    #[arg(long, default_value = "blacklist.txt")]
    pub blacklist: String,

    /// Skip the download stage (only when the raw archive is known up to date).
    #[arg(long)]
    pub no_download: bool,

    /// Skip the parse stage (only when the parsed archive is known up to date).
    #[arg(long)]
    pub no_parse: bool,

    /// Leave placeholder pages for missing chapters out of the book.
    #[arg(long)]
    pub no_missing: bool,

    /// Skip downloading and embedding the cover image.
    #[arg(long)]
    pub no_cover: bool,
}

/// y/N prompt on stderr; anything but `y` declines.
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    eprint!("{prompt} [y/N] ");
    std::io::stderr().flush().context("flush prompt")?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("read confirmation")?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}
