//! Ask command handler.
//!
//! Runs one question through the grounded answer pipeline.

use anyhow::Context;
use clap::Args;
use citewise_core::config::AppConfig;
use citewise_knowledge::{build_pipeline, Passage};

/// Longest passage snippet printed under the answer.
const MAX_SNIPPET_CHARS: usize = 600;

/// Ask a question about the indexed corpus
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing ask command");

        let pipeline = build_pipeline(config)
            .await
            .context("Failed to build the answer pipeline")?;

        let output = pipeline.invoke(&self.question).await?;

        tracing::debug!(
            "Pipeline output: grounded={}, attempts={}, rejected={}, contexts={}",
            output.grounded,
            output.attempts,
            output.rejected,
            output.contexts.len()
        );

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Failed to serialize answer")?
            );
            return Ok(());
        }

        println!("{}", output.answer);

        if !output.contexts.is_empty() {
            println!();
            println!("Passages:");
            for passage in &output.contexts {
                println!("- p.{}: {}", passage.page, snippet(passage));
            }
        }

        Ok(())
    }
}

fn snippet(passage: &Passage) -> String {
    let flat = passage.text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > MAX_SNIPPET_CHARS {
        let cut: String = flat.chars().take(MAX_SNIPPET_CHARS).collect();
        format!("{}…", cut.trim_end())
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str) -> Passage {
        Passage {
            id: "c".to_string(),
            text: text.to_string(),
            page: 1,
            vector_score: 0.5,
            rerank_score: None,
            final_score: 0.5,
        }
    }

    #[test]
    fn test_snippet_flattens_and_truncates() {
        assert_eq!(snippet(&passage("a\n  b")), "a b");

        let long = snippet(&passage(&"y".repeat(700)));
        assert_eq!(long.chars().count(), MAX_SNIPPET_CHARS + 1);
        assert!(long.ends_with('…'));
    }
}
