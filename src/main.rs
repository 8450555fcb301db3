//! Console front end: one session, one prompt per line

use anyhow::Context as _;
use chat_orchestrator::auth::ServiceAccountKey;
use chat_orchestrator::metrics::METRICS;
use chat_orchestrator::{logging, CompletionOrchestrator, Config, OrchestratorError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

const SESSION_ID: &str = "cli";

/// One line of console input
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Reset,
    Metrics,
    Prompt(&'a str),
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "/reset" => Some(Input::Reset),
            "/metrics" => Some(Input::Metrics),
            prompt => Some(Input::Prompt(prompt)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("ORCHESTRATOR_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::from_file(&config_path)?.from_env();
    config.validate()?;

    logging::init(&config)?;
    info!("Starting chat orchestrator ({:?})", config.environment);

    let key = ServiceAccountKey::from_file(&config.auth.key_file)
        .with_context(|| format!("loading service account key {}", config.auth.key_file.display()))?;

    let orchestrator = CompletionOrchestrator::from_config(&config, &key).await?;
    orchestrator.initialize().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let prompt = match Input::parse(&line) {
            None => continue,
            Some(Input::Reset) => {
                orchestrator.reset(SESSION_ID).await;
                stdout.write_all(b"Context cleared.\n").await?;
                continue;
            }
            Some(Input::Metrics) => {
                stdout.write_all(METRICS.export_prometheus().as_bytes()).await?;
                stdout.flush().await?;
                continue;
            }
            Some(Input::Prompt(prompt)) => prompt,
        };

        let reply = match orchestrator.get_answer(prompt, SESSION_ID).await {
            Ok(answer) => answer,
            Err(OrchestratorError::EmptyPrompt) => {
                "Your message is empty or contains only unsupported characters.".to_string()
            }
            Err(e) => {
                error!("Failed to answer: {}", e);
                "Something went wrong, please try again later.".to_string()
            }
        };
        stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}
