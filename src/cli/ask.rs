//! `psybot ask`: one question through the same pipeline the bot uses.

use std::path::PathBuf;

use anyhow::Result;

use psybot::bot::Outcome;

use super::common::{build_pipeline, config_path, ensure_usable, load_config};

const CHUNK_RULE: &str = "────────────────────────────────────────";

pub(crate) async fn cmd_ask(question: String, user: String, config: Option<PathBuf>) -> Result<()> {
    let path = config_path(config);
    let config = load_config(&path)?;
    ensure_usable(&config, false)?;

    let pipeline = build_pipeline(&config)?;
    let outcome = pipeline.handler.handle_query(&user, &question).await;

    let texts = outcome.messages();
    for (i, text) in texts.iter().enumerate() {
        if i > 0 {
            println!("{}", CHUNK_RULE);
        }
        println!("{}", text);
    }

    if let Outcome::Failed { category } = outcome {
        anyhow::bail!("completion failed ({:?})", category);
    }
    Ok(())
}
