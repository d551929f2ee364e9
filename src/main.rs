use clap::{Parser, Subcommand};
use glucomate_qa::Result;
use glucomate_qa::commands::{
    CorpusSource, ask, build_index, chat, prepare_corpus, serve, show_status,
};
use glucomate_qa::config::{resolve_base_dir, run_interactive_config, show_config};
use glucomate_qa::corpus::{PairingPolicy, TranscriptFormat};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "glucomate-qa")]
#[command(about = "Retrieval question answering over diabetes-support conversations")]
#[command(version)]
struct Cli {
    /// Base directory for configuration and artifacts (default: ~/.glucomate)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding backend and corpus settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Pair conversation transcripts into a QA table (CSV)
    Prepare {
        /// Transcript file to read
        input: PathBuf,
        /// Transcript format; detected from the extension when omitted
        #[arg(long, value_enum)]
        format: Option<TranscriptFormat>,
        /// How turns are paired into question/answer records
        #[arg(long, value_enum)]
        pairing: Option<PairingPolicy>,
        /// Where to write the QA table (default: <home>/qa_pairs.csv)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Embed the QA table and deploy a new index
    Build {
        /// QA table (.csv) or transcript file (default: <home>/qa_pairs.csv)
        input: Option<PathBuf>,
        /// Treat the input as a transcript in this format
        #[arg(long, value_enum)]
        format: Option<TranscriptFormat>,
        /// Pairing policy when the input is a transcript
        #[arg(long, value_enum)]
        pairing: Option<PairingPolicy>,
    },
    /// Answer one question from the deployed index
    Ask {
        /// The question
        query: String,
        /// Number of answers to return
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Chat interactively on the terminal
    Chat {
        /// Use the generative model instead of retrieval
        #[arg(long)]
        generative: bool,
    },
    /// Serve JSON-RPC queries on stdio
    Serve,
    /// Show configuration, backend health and artifact status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries protocol and command output; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = resolve_base_dir(cli.home)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Prepare {
            input,
            format,
            pairing,
            output,
        } => {
            prepare_corpus(&base_dir, &input, format, pairing, output)?;
        }
        Commands::Build {
            input,
            format,
            pairing,
        } => {
            let source = CorpusSource {
                input,
                format,
                pairing,
            };
            tokio::task::spawn_blocking(move || build_index(&base_dir, &source))
                .await
                .map_err(anyhow::Error::from)??;
        }
        Commands::Ask { query, k } => {
            tokio::task::spawn_blocking(move || ask(&base_dir, &query, k))
                .await
                .map_err(anyhow::Error::from)??;
        }
        Commands::Chat { generative } => {
            tokio::task::spawn_blocking(move || chat(&base_dir, generative))
                .await
                .map_err(anyhow::Error::from)??;
        }
        Commands::Serve => {
            serve(&base_dir).await?;
        }
        Commands::Status => {
            tokio::task::spawn_blocking(move || show_status(&base_dir))
                .await
                .map_err(anyhow::Error::from)??;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["glucomate-qa", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert!(parsed.home.is_none());
        }
    }

    #[test]
    fn global_home_override() {
        let cli = Cli::try_parse_from(["glucomate-qa", "serve", "--home", "/tmp/gluco"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.home, Some(PathBuf::from("/tmp/gluco")));
            assert!(matches!(parsed.command, Commands::Serve));
        }
    }

    #[test]
    fn prepare_command_with_options() {
        let cli = Cli::try_parse_from([
            "glucomate-qa",
            "prepare",
            "dm_dialogs.txt",
            "--format",
            "dialogue-lines",
            "--pairing",
            "alternating",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Prepare {
                input,
                format,
                pairing,
                output,
            } = parsed.command
            {
                assert_eq!(input, PathBuf::from("dm_dialogs.txt"));
                assert_eq!(format, Some(TranscriptFormat::DialogueLines));
                assert_eq!(pairing, Some(PairingPolicy::Alternating));
                assert_eq!(output, None);
            } else {
                panic!("expected prepare command");
            }
        }
    }

    #[test]
    fn build_defaults_to_qa_table() {
        let cli = Cli::try_parse_from(["glucomate-qa", "build"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Build { input, format, .. } = parsed.command {
                assert_eq!(input, None);
                assert_eq!(format, None);
            }
        }
    }

    #[test]
    fn ask_command_with_k() {
        let cli = Cli::try_parse_from(["glucomate-qa", "ask", "What is HbA1c?", "-k", "3"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { query, k } = parsed.command {
                assert_eq!(query, "What is HbA1c?");
                assert_eq!(k, Some(3));
            }
        }
    }

    #[test]
    fn chat_generative_flag() {
        let cli = Cli::try_parse_from(["glucomate-qa", "chat", "--generative"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chat { generative } = parsed.command {
                assert!(generative);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["glucomate-qa", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_pairing_rejected() {
        let cli = Cli::try_parse_from(["glucomate-qa", "build", "--pairing", "random"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidValue);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["glucomate-qa", "train"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["glucomate-qa", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
