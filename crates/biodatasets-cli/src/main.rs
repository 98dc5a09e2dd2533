use clap::Parser;
mod cli;
mod expression;
mod logging;
mod structures;

fn main() -> anyhow::Result<()> {
    logging::register_logger();
    let cli = cli::Cli::parse();
    cli.execute()?;
    Ok(())
}
