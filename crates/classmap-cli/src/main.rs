use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use classmap_core::{
    Annotator, Choice, Chooser, ConfigFile, DiskStore, DynamicHint, Engine, EngineConfig,
    EngineReply, FileStore, FixedChoice, HostMessage, Response, Uid, uses_tailwind,
};
use miette::{IntoDiagnostic, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Parser)]
#[command(version, about = "classmap - write class edits from a live HTML preview back to source", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Engine configuration file (.json or .toml)
    #[arg(long, global = true, env = "CLASSMAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the annotated copy of a document
    Annotate {
        file: PathBuf,

        /// Print the mapping table as JSON instead of the HTML
        #[arg(long)]
        json: bool,
    },
    /// Write a new class value for one mapped element
    Apply {
        file: PathBuf,

        #[arg(long)]
        uid: Uid,

        /// New class attribute value
        #[arg(long)]
        value: String,
    },
    /// Find and rewrite the source of a class string built at runtime
    Resolve {
        /// Workspace root to search
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Class value as rendered before the edit
        #[arg(long)]
        before: String,

        /// Class value after the edit
        #[arg(long)]
        after: String,

        /// Document the preview is showing
        #[arg(long)]
        active: Option<PathBuf>,

        /// Rendered text of the edited element
        #[arg(long)]
        near: Option<String>,

        /// Answer to a disambiguation prompt: only-active, everywhere, dismiss or an index
        #[arg(long, default_value = "dismiss")]
        choice: Choice,
    },
    /// Speak the host protocol as JSON lines on stdin and stdout
    Serve {
        /// Workspace root
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Document to open before reading messages
        #[arg(long)]
        open: Option<PathBuf>,

        /// Answer to disambiguation prompts when a message carries none
        #[arg(long, default_value = "dismiss")]
        choice: Choice,
    },
    /// Report whether a document appears to use Tailwind
    Detect { file: PathBuf },
    /// Write the effective configuration to a .json or .toml file
    InitConfig { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Annotate { file, json } => annotate(&config, &file, json).await?,
        Commands::Apply { file, uid, value } => {
            let file = std::path::absolute(&file).into_diagnostic()?;
            let root = file.parent().map(Path::to_path_buf).unwrap_or_default();
            let mut engine = Engine::new(&config, DiskStore::new(root), FixedChoice::default());
            let opened = engine.open(&file).await;
            if matches!(opened.reply, EngineReply::Error { .. }) {
                return finish(&opened);
            }
            let response = engine
                .handle(HostMessage::ApplyMappedEdit {
                    uid,
                    new_value: value,
                })
                .await;
            finish(&response)?;
        }
        Commands::Resolve {
            root,
            before,
            after,
            active,
            near,
            choice,
        } => {
            let mut engine = Engine::new(&config, DiskStore::new(&root), FixedChoice(choice));
            // the active document is named relative to where we run, not to the root
            if let Some(active) = &active {
                let active = std::path::absolute(active).into_diagnostic()?;
                let opened = engine.open(&active).await;
                if matches!(opened.reply, EngineReply::Error { .. }) {
                    return finish(&opened);
                }
            }
            let hint = near.map(|text| DynamicHint {
                nearby_text: Some(text),
                ..Default::default()
            });
            let response = engine
                .handle(HostMessage::ResolveDynamicEdit {
                    before_value: before,
                    after_value: after,
                    hint,
                    choice: None,
                })
                .await;
            finish(&response)?;
        }
        Commands::Serve { root, open, choice } => {
            let _span = tracing::info_span!("serve", root = %root.display()).entered();
            let mut engine = Engine::new(&config, DiskStore::new(&root), FixedChoice(choice));
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            if let Some(open) = open {
                let open = std::path::absolute(&open).into_diagnostic()?;
                let response = engine.open(&open).await;
                write_line(&mut stdout, &response).await?;
            }
            serve(&mut engine, stdin, stdout).await?;
        }
        Commands::Detect { file } => {
            let text = tokio::fs::read_to_string(&file).await.into_diagnostic()?;
            println!("{}", uses_tailwind(&text));
        }
        Commands::InitConfig { path } => {
            ConfigFile::new(&path).save(&config).await?;
            tracing::info!(path = %path.display(), "wrote config");
        }
    }

    Ok(())
}

async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let config = ConfigFile::new(path).load().await?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

async fn annotate(config: &EngineConfig, file: &Path, json: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(file).await.into_diagnostic()?;
    let annotation = Annotator::from_config(config).annotate(&text);
    tracing::info!(
        path = %file.display(),
        elements = annotation.table.len(),
        strategy = ?annotation.strategy,
        "annotated"
    );
    if json {
        let out = serde_json::json!({
            "strategy": annotation.strategy,
            "table": annotation.table,
        });
        println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
    } else {
        println!("{}", annotation.html);
    }
    Ok(())
}

/// Print a response and turn an error reply into a failing exit.
fn finish(response: &Response) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(response).into_diagnostic()?
    );
    match &response.reply {
        EngineReply::Error { kind, message } => Err(miette::miette!("{kind:?}: {message}")),
        _ => Ok(()),
    }
}

/// Answer one JSON message per input line until the input closes.
async fn serve<S, C, R, W>(engine: &mut Engine<S, C>, reader: R, mut writer: W) -> Result<()>
where
    S: FileStore,
    C: Chooser,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.into_diagnostic()? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<HostMessage>(line) {
            Ok(message) => {
                let response = engine.handle(message).await;
                write_line(&mut writer, &response).await?;
            }
            Err(err) => {
                tracing::warn!(error = %err, "malformed message");
                let reply = serde_json::json!({
                    "reply": { "type": "invalid", "message": err.to_string() }
                });
                write_line(&mut writer, &reply).await?;
            }
        }
    }
    tracing::info!("input closed");
    Ok(())
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut line = serde_json::to_string(value).into_diagnostic()?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await.into_diagnostic()?;
    writer.flush().await.into_diagnostic()?;
    Ok(())
}

/// Logs go to stderr; stdout carries protocol output.
fn init_tracing() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}

#[cfg(test)]
mod tests {
    use super::*;
    use classmap_core::MemoryStore;

    #[test]
    fn test_parse_resolve_arguments() {
        let cli = Cli::try_parse_from([
            "classmap",
            "resolve",
            "--before",
            "btn large",
            "--after",
            "btn",
            "--choice",
            "everywhere",
            "--config",
            "classmap.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("classmap.toml")));
        match cli.command {
            Commands::Resolve {
                root,
                before,
                choice,
                active,
                ..
            } => {
                assert_eq!(root, PathBuf::from("."));
                assert_eq!(before, "btn large");
                assert_eq!(choice, Choice::Everywhere);
                assert_eq!(active, None);
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_parse_init_config() {
        let cli = Cli::try_parse_from(["classmap", "init-config", "classmap.toml"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::InitConfig { path } if path == PathBuf::from("classmap.toml")
        ));
    }

    #[tokio::test]
    async fn test_written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classmap.toml");
        let mut config = EngineConfig::default();
        config.scan.max_files = 42;
        ConfigFile::new(&path).save(&config).await.unwrap();
        assert_eq!(load_config(Some(&path)).await.unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_choice() {
        assert!(
            Cli::try_parse_from(["classmap", "serve", "--choice", "sometimes"]).is_err()
        );
    }

    #[tokio::test]
    async fn test_serve_answers_each_line() {
        let store = MemoryStore::new("/site").with_file("index.html", r#"<p class="a"></p>"#);
        let mut engine = Engine::new(&EngineConfig::default(), store, FixedChoice::default());
        let input = concat!(
            r#"{"type":"reannotate","documentText":"<p class=\"a\"></p>","path":"/site/index.html"}"#,
            "\n\n",
            r#"{"type":"applyMappedEdit","uid":1,"newValue":"a b"}"#,
            "\n",
            "not json\n",
        );
        let mut output = Vec::new();
        serve(&mut engine, input.as_bytes(), &mut output)
            .await
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        let replies: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["reply"]["type"], "mapping");
        assert_eq!(replies[1]["reply"]["type"], "applied");
        assert_eq!(replies[1]["reply"]["rangeEnd"], 13);
        assert_eq!(replies[2]["reply"]["type"], "invalid");
        assert_eq!(
            engine.store().get("index.html").as_deref(),
            Some(r#"<p class="a b"></p>"#)
        );
    }
}
