use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use cloakk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "cloakk-api",
    about = "Anonymous submission intake with an audited admin moderation API",
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
    /// Walk through intake, moderation and the audit trail against in-memory stores
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// SQLite URL for the submission store (e.g. sqlite://cloakk.db)
    #[arg(long)]
    pub(crate) database_url: Option<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_and_accepts_overrides() {
        let cli = Cli::try_parse_from(["cloakk-api"]).expect("parses");
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from([
            "cloakk-api",
            "serve",
            "--port",
            "8080",
            "--database-url",
            "sqlite://cloakk.db",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(8080));
                assert_eq!(args.database_url.as_deref(), Some("sqlite://cloakk.db"));
                assert!(args.host.is_none());
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn demo_accepts_a_custom_message() {
        let cli = Cli::try_parse_from(["cloakk-api", "demo", "--text", "Gate 4 is unlocked"])
            .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => assert_eq!(args.text, "Gate 4 is unlocked"),
            other => panic!("expected demo, got {other:?}"),
        }
    }
}
