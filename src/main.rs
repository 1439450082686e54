use clap::Parser as _;
use danfoss_air_tools::commands;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(clap::Parser)]
#[clap(version, about, author)]
enum Commands {
    Registers(commands::registers::Args),
    Read(commands::read::Args),
    Write(commands::write::Args),
    Status(commands::status::Args),
    Discover(commands::discover::Args),
}

fn end<E: std::error::Error>(r: Result<(), E>) {
    std::process::exit(match r {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            let mut cause = e.source();
            while let Some(e) = cause {
                eprintln!("  because: {e}");
                cause = e.source();
            }
            1
        }
    });
}

#[tokio::main]
async fn main() {
    let filter = std::env::var("DANFOSS_AIR_TOOLS_LOG")
        .ok()
        .and_then(|description| {
            description.parse::<tracing_subscriber::filter::targets::Targets>().ok()
        })
        .unwrap_or_else(|| {
            tracing_subscriber::filter::targets::Targets::new()
                .with_default(tracing_subscriber::filter::LevelFilter::WARN)
        });
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    match Commands::parse() {
        Commands::Registers(args) => end(commands::registers::run(args)),
        Commands::Read(args) => end(commands::read::run(args).await),
        Commands::Write(args) => end(commands::write::run(args).await),
        Commands::Status(args) => end(commands::status::run(args).await),
        Commands::Discover(args) => end(commands::discover::run(args).await),
    }
}
