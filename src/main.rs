// src/main.rs

mod alignment;
mod composer;
mod config;
mod errors;
mod lane_assignment;
mod llm_client;
mod pipeline;
mod prompt;
mod textual_ir;
mod types;
mod visual_ir;
mod vocabulary;

use anyhow::Result;
use composer::ComposeRunner;
use llm_client::LlmClient;
use textual_ir::TextualIrGenerator;
use tracing::info;
use types::Config;
use visual_ir::VisualIrGenerator;
use vocabulary::ClassVocabulary;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let stage = args.next().unwrap_or_else(|| "all".to_string());
    let config_path = args.next().unwrap_or_else(|| "config.yaml".to_string());

    let config = Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("scene_composer={}", config.logging.level))
        .init();

    info!("🚦 Scene Composer starting");
    info!("✓ Configuration loaded from {}", config_path);

    match stage.as_str() {
        "textual" => run_textual(&config).await?,
        "visual" => run_visual(&config)?,
        "compose" => run_compose(&config)?,
        "all" => {
            run_textual(&config).await?;
            run_visual(&config)?;
            run_compose(&config)?;
        }
        other => anyhow::bail!(
            "unknown stage `{}` (expected textual | visual | compose | all)",
            other
        ),
    }

    info!("✓ Done");
    Ok(())
}

async fn run_textual(config: &Config) -> Result<()> {
    let client = LlmClient::new(&config.llm)?;
    info!("✓ LLM client ready (model: {})", config.llm.model);
    TextualIrGenerator::new(config, &client).run().await
}

fn run_visual(config: &Config) -> Result<()> {
    let vocabulary = ClassVocabulary::load(&config.paths.class_vocabulary)?;
    info!("✓ Class vocabulary loaded ({} classes)", vocabulary.len());
    VisualIrGenerator::new(config, &vocabulary).run()
}

fn run_compose(config: &Config) -> Result<()> {
    ComposeRunner::new(config).run()
}
