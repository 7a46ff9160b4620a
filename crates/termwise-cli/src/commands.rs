//! Subcommands and their arguments.

use anyhow::{Context, Result};
use backon::{ExponentialBuilder, Retryable};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::PathBuf;

use termwise_runtime::{
    BackendConfig, BackendError, BackendKind, DocumentAnalysisEngine, EngineError,
};

#[derive(Parser, Debug)]
#[command(
    name = "termwise",
    version,
    about = "Turn legal and policy documents into structured, plain-language analyses."
)]
pub struct Cli {
    /// YAML or JSON config file; environment variables are used when absent
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured inference backend
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a document and print the analysis as JSON
    Analyze(AnalyzeArgs),

    /// Probe whether the configured backend is ready
    Check,

    /// Print the resolved configuration
    Config,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Document to analyze; `-` or omitted reads stdin
    pub input: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Retry timeouts and generation failures this many times
    #[arg(long, default_value_t = 0)]
    pub retries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Local,
    Remote,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Local => BackendKind::Local,
            BackendArg::Remote => BackendKind::Remote,
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        match self.command {
            Commands::Analyze(args) => run_analyze(&config, args).await,
            Commands::Check => run_check(&config).await,
            Commands::Config => run_config(&config),
        }
    }

    fn resolve_config(&self) -> Result<BackendConfig> {
        let mut config = match &self.config {
            Some(path) => BackendConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => BackendConfig::from_env().context("reading configuration from environment")?,
        };
        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        Ok(config)
    }
}

async fn run_analyze(config: &BackendConfig, args: AnalyzeArgs) -> Result<()> {
    let text = read_input(args.input.as_ref())?;
    let engine = DocumentAnalysisEngine::from_config(config)?;

    let analysis = (|| async { engine.analyze(&text).await })
        .retry(ExponentialBuilder::default().with_max_times(args.retries))
        .when(BackendError::is_retryable)
        .notify(|err: &BackendError, delay| {
            tracing::warn!(kind = err.kind(), error = %err, ?delay, "Analysis failed, retrying");
        })
        .await?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&analysis)?
    } else {
        serde_json::to_string(&analysis)?
    };
    println!("{}", json);
    Ok(())
}

async fn run_check(config: &BackendConfig) -> Result<()> {
    let engine = DocumentAnalysisEngine::from_config(config)?;
    let backend = engine.backend().name().to_string();
    let healthy = engine.health_check().await;

    println!(
        "{}",
        serde_json::json!({ "backend": backend, "healthy": healthy })
    );

    if healthy {
        Ok(())
    } else {
        Err(BackendError::unavailable(format!("{} backend is not ready", backend)).into())
    }
}

fn run_config(config: &BackendConfig) -> Result<()> {
    print!("{}", serde_yaml::to_string(config)?);
    config.validate()?;
    Ok(())
}

fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading document from stdin")?;
            Ok(text)
        }
    }
}

/// Process exit code for a failed command.
///
/// 2: backend unavailable, 3: generation timed out, 4: generation failed,
/// 1: anything else (bad config, unreadable input).
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let backend_error = err.chain().find_map(|cause| {
        cause
            .downcast_ref::<BackendError>()
            .or_else(|| match cause.downcast_ref::<EngineError>() {
                Some(EngineError::Backend(inner)) => Some(inner),
                _ => None,
            })
    });

    match backend_error {
        Some(BackendError::BackendUnavailable(_)) => 2,
        Some(BackendError::GenerationTimeout(_)) => 3,
        Some(BackendError::GenerationFailure { .. }) => 4,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from([
            "termwise",
            "analyze",
            "policy.txt",
            "--pretty",
            "--retries",
            "2",
            "--backend",
            "remote",
        ])
        .unwrap();

        assert_eq!(cli.backend, Some(BackendArg::Remote));
        match cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.input, Some(PathBuf::from("policy.txt")));
                assert!(args.pretty);
                assert_eq!(args.retries, 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_analyze_defaults_to_stdin() {
        let cli = Cli::try_parse_from(["termwise", "analyze"]).unwrap();
        match cli.command {
            Commands::Analyze(args) => {
                assert!(args.input.is_none());
                assert_eq!(args.retries, 0);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["termwise", "check", "--backend", "cloud"]).is_err());
    }

    #[test]
    fn test_backend_override() {
        let cli = Cli::try_parse_from(["termwise", "--backend", "local", "config"]).unwrap();
        assert_eq!(BackendKind::from(cli.backend.unwrap()), BackendKind::Local);
    }

    #[test]
    fn test_exit_codes() {
        let err = anyhow::Error::from(BackendError::unavailable("no token"));
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::Error::from(BackendError::GenerationTimeout(Duration::from_secs(1)))
            .context("analyzing document");
        assert_eq!(exit_code(&err), 3);

        let err = anyhow::Error::from(EngineError::Backend(BackendError::failure("boom")));
        assert_eq!(exit_code(&err), 4);

        let err = anyhow::anyhow!("unreadable input");
        assert_eq!(exit_code(&err), 1);
    }
}
