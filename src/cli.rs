use clap::Parser;
use std::path::PathBuf;

/// Split `<thinking>` reasoning out of model output
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// File with model output (reads stdin if omitted)
    pub input: Option<PathBuf>,

    /// Tag name of the reasoning markers, overrides the config file
    #[arg(long)]
    pub tag: Option<String>,

    /// Keep reasoning spans and their markers in the visible text
    #[arg(long)]
    pub keep_tags: bool,

    /// Path to a JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stream the input in fragments of this many characters instead of
    /// splitting it in one go
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Deliver the streamed fragments through a push channel
    #[arg(long, requires = "chunk_size")]
    pub push: bool,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn parse() -> Self {
        <Args as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args_parsing() {
        let args = Args::try_parse_from(["test"]).expect("Failed to parse default args");

        assert_eq!(args.input, None);
        assert_eq!(args.tag, None);
        assert_eq!(args.chunk_size, None);
        assert_eq!(args.verbose, 0);
        assert!(!args.keep_tags);
        assert!(!args.push);
    }

    #[test]
    fn test_streaming_args() {
        let args = Args::try_parse_from([
            "test",
            "out.txt",
            "--tag",
            "think",
            "--chunk-size",
            "4",
            "--push",
            "-vv",
        ])
        .expect("Failed to parse streaming args");

        assert_eq!(args.input, Some(PathBuf::from("out.txt")));
        assert_eq!(args.tag.as_deref(), Some("think"));
        assert_eq!(args.chunk_size, Some(4));
        assert!(args.push);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_push_requires_chunk_size() {
        assert!(Args::try_parse_from(["test", "--push"]).is_err());
    }
}
