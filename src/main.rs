use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chartjobs::cli::list::ListArgs;
use chartjobs::cli::{Cli, Commands};
use chartjobs::{JobPatch, Scheduler, SchedulerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SchedulerConfig::load_from(path)?,
        None => SchedulerConfig::load()?,
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    // Storage is opened only by the commands that need it
    let scheduler = || open_scheduler(&config);

    match cli.command {
        Commands::Serve => {
            chartjobs::cli::serve::execute(&scheduler().await?).await?;
        }
        Commands::Add {
            name,
            expression,
            command,
            disabled,
            timeout_ms,
        } => {
            chartjobs::cli::add::execute(
                &name,
                &expression,
                &command,
                disabled,
                timeout_ms,
                &scheduler().await?,
            )
            .await?;
        }
        Commands::List {
            q,
            sort,
            order,
            limit,
            start,
        } => {
            let args = ListArgs {
                q,
                sort,
                order,
                limit,
                start,
            };
            chartjobs::cli::list::execute(&args, &scheduler().await?).await?;
        }
        Commands::Show { id } => {
            chartjobs::cli::show::execute(&id, &scheduler().await?).await?;
        }
        Commands::Update {
            id,
            name,
            expression,
            command,
            timeout_ms,
        } => {
            let patch = JobPatch {
                name,
                expression,
                command,
                timeout_ms,
                ..Default::default()
            };
            chartjobs::cli::update::execute(&id, patch, &scheduler().await?).await?;
        }
        Commands::Enable { id } => {
            chartjobs::cli::update::set_enabled(&id, true, &scheduler().await?).await?;
        }
        Commands::Disable { id } => {
            chartjobs::cli::update::set_enabled(&id, false, &scheduler().await?).await?;
        }
        Commands::Remove { id } => {
            chartjobs::cli::remove::execute(&id, &scheduler().await?).await?;
        }
        Commands::Run { id } => {
            chartjobs::cli::run::execute(&id, &scheduler().await?).await?;
        }
        Commands::Tasks { id } => {
            chartjobs::cli::tasks::execute(&id, &scheduler().await?).await?;
        }
        Commands::Next { expression, count } => {
            chartjobs::cli::next::execute(&expression, count)?;
        }
    }

    Ok(())
}

async fn open_scheduler(config: &SchedulerConfig) -> anyhow::Result<Scheduler> {
    let repository = config.open_repository().await?;
    Ok(Scheduler::new(
        repository,
        Arc::new(config.executor()),
        config.scheduler_options(),
    ))
}
