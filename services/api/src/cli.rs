use crate::commands::{
    run_award, run_badges, run_dashboard, run_rank, run_records, AwardArgs, BadgesArgs,
    DashboardArgs, RankArgs, RecordsArgs,
};
use crate::server;
use care_points::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "care-points",
    about = "Award, rank and review care facility activity points",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Record an award for a resident
    Award(AwardArgs),
    /// List ledger rows with their indices
    Records(RecordsArgs),
    /// Print person or facility rankings
    Rank(RankArgs),
    /// Grant growth / encourage badges for a month
    Badges(BadgesArgs),
    /// Show a resident's dashboard
    Dashboard(DashboardArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the directory holding the CSV tables
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Award(args) => run_award(args).await,
        Command::Records(args) => run_records(args),
        Command::Rank(args) => run_rank(args),
        Command::Badges(args) => run_badges(args),
        Command::Dashboard(args) => run_dashboard(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["care-points"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn rank_accepts_scope_and_month() {
        let cli = Cli::try_parse_from(["care-points", "rank", "--scope", "facility", "--month", "2024-06"])
            .expect("parses");
        assert!(matches!(cli.command, Some(Command::Rank(_))));

        let err = Cli::try_parse_from(["care-points", "rank", "--month", "June"])
            .expect_err("bad month");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
