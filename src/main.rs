use anyhow::Context;
use reviewrag::cli::commands;
use reviewrag::cli::output::Output;
use reviewrag::cli::repl::Repl;
use reviewrag::cli::{Cli, Commands};
use reviewrag::{init_tracing, AppConfig, AppContext};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    if let Err(e) = run(cli).await {
        output.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    init_tracing(&config.logging, cli.verbose);

    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };
    let ctx = AppContext::new(config);

    let result = match cli.command {
        Commands::Agent {
            prompt,
            max_iterations,
        } => commands::agent(&ctx, &output, prompt, max_iterations).await,
        Commands::Chat => commands::chat(&ctx, &output, &mut Repl::stdin()).await,
        Commands::Ask { question } => {
            let mut repl = Repl::stdin().with_sentinel("quit");
            commands::ask(&ctx, &output, question, &mut repl).await
        }
        Commands::Models { provider } => commands::models(&ctx, &output, provider).await,
        Commands::Ingest { csv } => commands::ingest(&ctx, &output, csv.as_deref()).await,
    };

    let shutdown = ctx.shutdown().await;
    result?;
    Ok(shutdown?)
}
