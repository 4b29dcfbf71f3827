use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod output;
mod params;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.command {
        cli::Command::Info(args) => commands::info::execute(args),
        cli::Command::Setup(args) => commands::setup::execute(args),
        cli::Command::Download(args) => commands::download::execute(args).await,
        cli::Command::Convert(args) => commands::convert::execute(args).await,
        cli::Command::Events(args) => commands::events::execute(args),
        cli::Command::Timing(args) => commands::timing::execute(args),
        cli::Command::Roi(args) => commands::roi::execute(args).await,
        cli::Command::RoiTrials(args) => commands::roi_trials::execute(args).await,
        cli::Command::Glms(args) => commands::glms::execute(args).await,
        cli::Command::Qc(args) => commands::qc::execute(args).await,
        cli::Command::Cluster(args) => commands::cluster::execute(args).await,
        cli::Command::Vol2surf(args) => commands::vol2surf::execute(args).await,
    };

    std::process::exit(exit_code);
}
