use crate::cli::Args;
use anyhow::{Context, Result};
use futures::StreamExt;
use serde::Serialize;
use thinking::{
    chunk_text, ModelResponse, PartStream, StreamPart, ThinkingConfig, ThinkingMiddleware,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Result of splitting a complete text
#[derive(Debug, Serialize)]
struct SplitOutput {
    text: String,
    reasoning: String,
}

/// Last line printed after a streamed run
#[derive(Debug, Serialize)]
struct StreamSummary {
    thinking: String,
    parts: usize,
}

/// Config file (if any) with command line overrides applied
pub fn load_config(args: &Args) -> Result<ThinkingConfig> {
    let mut config = match &args.config {
        Some(path) => ThinkingConfig::load(path)?,
        None => ThinkingConfig::default(),
    };

    if let Some(tag) = &args.tag {
        config.tag_name = tag.clone();
    }
    if args.keep_tags {
        config.strip_reasoning_from_text = false;
    }

    Ok(config)
}

/// Process `input` as requested by `args` and return the JSON lines to print
pub async fn run(args: &Args, input: &str) -> Result<Vec<String>> {
    let config = load_config(args)?;
    let middleware =
        ThinkingMiddleware::new(&config).context("Invalid thinking configuration")?;

    match args.chunk_size {
        None => split_text(&middleware, input),
        Some(chunk_size) => split_stream(&middleware, input, chunk_size, args.push).await,
    }
}

fn split_text(middleware: &ThinkingMiddleware, input: &str) -> Result<Vec<String>> {
    let response = middleware.augment(ModelResponse::with_text(input))?;
    let output = SplitOutput {
        reasoning: response.thinking(),
        text: response.text.unwrap_or_default(),
    };
    Ok(vec![serde_json::to_string(&output)?])
}

async fn split_stream(
    middleware: &ThinkingMiddleware,
    input: &str,
    chunk_size: usize,
    push: bool,
) -> Result<Vec<String>> {
    if chunk_size == 0 {
        anyhow::bail!("Chunk size must be at least 1");
    }

    let parts: Vec<StreamPart> = chunk_text(input, chunk_size)
        .into_iter()
        .map(StreamPart::text_delta)
        .collect();
    info!(
        "Streaming {} fragments ({} shape)",
        parts.len(),
        if push { "push" } else { "pull" }
    );

    let stream = if push {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            for part in parts {
                if tx.send(part).await.is_err() {
                    debug!("Stream consumer went away");
                    break;
                }
            }
        });
        PartStream::Push(rx)
    } else {
        PartStream::from_stream(futures::stream::iter(parts))
    };

    let response = middleware.augment(ModelResponse::with_stream(stream))?;
    let thinking = response.thinking.clone();

    let mut lines = Vec::new();
    if let Some(stream) = response.stream {
        let mut parts = stream.into_stream();
        while let Some(part) = parts.next().await {
            lines.push(serde_json::to_string(&part)?);
        }
    }

    let summary = StreamSummary {
        thinking: thinking.map(|view| view.get()).unwrap_or_default(),
        parts: lines.len(),
    };
    lines.push(serde_json::to_string(&summary)?);
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::{json, Value};
    use std::io::Write;

    fn parse_lines(lines: &[String]) -> Vec<Value> {
        lines
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_split_text() -> Result<()> {
        let args = Args::try_parse_from(["test"])?;
        let lines = run(&args, "hi <thinking>secret</thinking> there").await?;

        assert_eq!(
            parse_lines(&lines),
            vec![json!({"text": "hi  there", "reasoning": "secret"})]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_keep_tags() -> Result<()> {
        let args = Args::try_parse_from(["test", "--keep-tags"])?;
        let lines = run(&args, "a<thinking>b</thinking>c").await?;

        assert_eq!(
            parse_lines(&lines),
            vec![json!({"text": "a<thinking>b</thinking>c", "reasoning": "b"})]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_pull_and_push_agree() -> Result<()> {
        let input = "Visible <thinking>hidden</thinking> text";
        let pull = run(&Args::try_parse_from(["test", "--chunk-size", "3"])?, input).await?;
        let push = run(
            &Args::try_parse_from(["test", "--chunk-size", "3", "--push"])?,
            input,
        )
        .await?;
        assert_eq!(pull, push);

        let values = parse_lines(&pull);
        let summary = values.last().unwrap();
        assert_eq!(summary["thinking"], json!("hidden"));
        assert_eq!(summary["parts"], json!(values.len() - 1));

        let visible: String = values
            .iter()
            .filter(|v| v["type"] == json!("text-delta"))
            .map(|v| v["textDelta"].as_str().unwrap())
            .collect();
        assert_eq!(visible, "Visible  text");
        Ok(())
    }

    #[tokio::test]
    async fn test_config_file_and_tag_override() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"tagName": "reason", "stripReasoningFromText": false}}"#)?;
        let path = file.path().to_string_lossy().to_string();

        let args = Args::try_parse_from(["test", "--config", &path])?;
        let config = load_config(&args)?;
        assert_eq!(config.tag_name, "reason");
        assert!(!config.strip_reasoning_from_text);

        let args = Args::try_parse_from(["test", "--config", &path, "--tag", "think"])?;
        let lines = run(&args, "x<think>y</think>z").await?;
        assert_eq!(
            parse_lines(&lines),
            vec![json!({"text": "x<think>y</think>z", "reasoning": "y"})]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_input_options() -> Result<()> {
        let args = Args::try_parse_from(["test", "--tag", "bad tag"])?;
        assert!(run(&args, "text").await.is_err());

        let args = Args::try_parse_from(["test", "--chunk-size", "0"])?;
        assert!(run(&args, "text").await.is_err());
        Ok(())
    }
}
