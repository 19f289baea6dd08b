//! Batch command handler.
//!
//! Answers one question per input line on a single shared pipeline and
//! writes one JSON object per line.

use anyhow::Context;
use clap::Args;
use citewise_core::config::AppConfig;
use citewise_knowledge::build_pipeline;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;

/// Answer a file of questions concurrently
#[derive(Args, Debug)]
pub struct BatchCommand {
    /// File with one question per line
    pub file: PathBuf,

    /// Number of questions answered at the same time
    #[arg(short = 'j', long, default_value = "4")]
    pub concurrency: usize,
}

impl BatchCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing batch command for {:?}", self.file);

        let content = std::fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read questions from {:?}", self.file))?;
        let questions = parse_questions(&content);

        let pipeline = build_pipeline(config)
            .await
            .context("Failed to build the answer pipeline")?;

        let mut results = stream::iter(questions)
            .map(|question| {
                let pipeline = pipeline.clone();
                async move {
                    let result = pipeline.invoke(&question).await;
                    (question, result)
                }
            })
            .buffer_unordered(self.concurrency.max(1));

        let mut answered = 0usize;
        while let Some((question, result)) = results.next().await {
            let line = match result {
                Ok(output) => serde_json::json!({
                    "question": question,
                    "answer": output.answer,
                    "contexts": output.contexts,
                }),
                Err(e) => serde_json::json!({
                    "question": question,
                    "error": e.to_string(),
                }),
            };
            println!("{}", serde_json::to_string(&line)?);
            answered += 1;
        }

        tracing::info!("Batch finished: {} questions", answered);
        Ok(())
    }
}

/// Non-blank, trimmed lines.
fn parse_questions(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_questions_skips_blank_lines() {
        let questions = parse_questions("What rose?\n\n  Why?  \n");
        assert_eq!(questions, vec!["What rose?", "Why?"]);
    }
}
