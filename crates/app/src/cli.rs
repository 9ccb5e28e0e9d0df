use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "companion",
    version,
    about = "Streams model replies about live meeting transcripts"
)]
pub struct Cli {
    /// Settings file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured model, e.g. "[Groq] llama-3.1-70b-versatile".
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Override the sampling temperature (0.0-2.0).
    #[arg(long, global = true, value_parser = parse_temperature)]
    pub temperature: Option<f32>,

    /// Override the transcript folder.
    #[arg(long, global = true)]
    pub transcript_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer once using the newest transcript, then exit.
    Fetch(FetchArgs),
    /// Follow the transcript folder interactively.
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Instruction placed before the transcript body.
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Instruction placed after the transcript body.
    #[arg(long, default_value = "")]
    pub suffix: String,

    /// Image file to attach; may be given more than once.
    #[arg(long = "image")]
    pub images: Vec<PathBuf>,

    /// OCR text used as the final prompt segment.
    #[arg(long, default_value = "", conflicts_with = "ocr_file")]
    pub ocr_text: String,

    /// File whose contents supply the OCR segment.
    #[arg(long)]
    pub ocr_file: Option<PathBuf>,

    /// Skip copying the assembled prompt to the clipboard.
    #[arg(long)]
    pub no_copy: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// How often to check for input while a reply is streaming, in ms.
    #[arg(long, default_value_t = 250)]
    pub poll_ms: u64,

    /// Save the dialogue to history/conversation_<timestamp>.txt on exit.
    #[arg(long)]
    pub export: bool,

    /// Skip copying assembled prompts to the clipboard.
    #[arg(long)]
    pub no_copy: bool,
}

fn parse_temperature(raw: &str) -> Result<f32, String> {
    let value: f32 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number"))?;
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err("temperature must be between 0.0 and 2.0".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fetch_accepts_repeated_images() {
        let cli = Cli::try_parse_from([
            "companion", "fetch", "--image", "a.png", "--image", "b.jpg",
        ])
        .unwrap();
        match cli.command {
            Command::Fetch(args) => assert_eq!(args.images.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn clipboard_copy_is_on_unless_opted_out() {
        let cli = Cli::try_parse_from(["companion", "fetch"]).unwrap();
        match cli.command {
            Command::Fetch(args) => assert!(!args.no_copy),
            other => panic!("unexpected command {:?}", other),
        }
        let cli = Cli::try_parse_from(["companion", "watch", "--no-copy"]).unwrap();
        match cli.command {
            Command::Watch(args) => assert!(args.no_copy),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn ocr_text_and_file_are_mutually_exclusive() {
        assert!(Cli::try_parse_from([
            "companion", "fetch", "--ocr-text", "x", "--ocr-file", "shot.txt",
        ])
        .is_err());

        let cli = Cli::try_parse_from(["companion", "fetch", "--ocr-text", "board notes"]).unwrap();
        match cli.command {
            Command::Fetch(args) => assert_eq!(args.ocr_text, "board notes"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        assert!(Cli::try_parse_from(["companion", "--temperature", "2.5", "fetch"]).is_err());
        assert!(Cli::try_parse_from(["companion", "--temperature", "0.7", "fetch"]).is_ok());
    }
}
