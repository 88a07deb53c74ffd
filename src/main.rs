use clap::Parser;
use eyre::{Context, Result, eyre};
use notes_body_export::exporter::{ErrorPolicy, OutputFormat};
use notes_body_export::utils::{self, DEFAULT_ENTITY_TYPES, ExportConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;

/// Export note bodies from a NoteStore.sqlite database as JSONL or plain text.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to NoteStore.sqlite.
    /// Defaults to the application's group container if not set in config.
    #[arg(short, long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/notes-body-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// What to do with a note whose text cannot be extracted.
    #[arg(long, value_enum, value_name = "POLICY")]
    on_error: Option<ErrorPolicy>,

    /// Read from a temporary copy of the database instead of the live file.
    #[arg(long)]
    snapshot: bool,

    /// Log each note that is read or skipped.
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    format: Option<OutputFormat>,
    on_error: Option<ErrorPolicy>,
    entity_types: Option<Vec<i64>>,
}

const CONFIG_FILE: &str = "notes-body-export/config.toml";

impl FileConfig {
    /// `--config` must point at a file; the per-user default may be absent.
    fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        match explicit {
            Some(path) if path.is_file() => Ok(Some(path.to_path_buf())),
            Some(path) => Err(eyre!("Config file not found: {}", path.display())),
            None => Ok(dirs::config_dir()
                .map(|dir| dir.join(CONFIG_FILE))
                .filter(|path| path.is_file())),
        }
    }

    fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&text).wrap_err_with(|| format!("Invalid config: {}", path.display()))
    }

    fn load(explicit: Option<&Path>) -> Result<Self> {
        Ok(Self::locate(explicit)?
            .map(|path| Self::from_path(&path))
            .transpose()?
            .unwrap_or_default())
    }
}

/// Fold CLI flags over the config file over built-in defaults.
fn resolve_config(
    cli: Cli,
    file_cfg: FileConfig,
    default_db: Option<PathBuf>,
) -> Result<ExportConfig> {
    let db_path = cli
        .input
        .or(file_cfg.db_path)
        .or(default_db)
        .ok_or_else(|| {
            eyre!("Could not determine database path.\nUse --input to specify manually, or set db_path in config.toml.")
        })?;

    let format = cli.output.or(file_cfg.format).ok_or_else(|| {
        eyre!("No output format given.\nUse --output jsonl|bodytext, or set format in config.toml.")
    })?;

    Ok(ExportConfig {
        db_path,
        format,
        on_error: cli.on_error.or(file_cfg.on_error).unwrap_or_default(),
        entity_types: file_cfg
            .entity_types
            .unwrap_or_else(|| DEFAULT_ENTITY_TYPES.to_vec()),
        snapshot: cli.snapshot,
        quiet: cli.quiet,
    })
}

fn setup_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = FileConfig::load(cli.config.as_deref())?;

    // 2. Resolve everything else (CLI > Config > Default)
    let config = resolve_config(cli, file_cfg, utils::default_db_path())?;

    if !config.db_path.exists() {
        return Err(eyre!(
            "Database not found at: {}\nUse --input to specify the path manually.",
            config.db_path.display()
        ));
    }
    tracing::debug!(?config, "Resolved configuration");

    // 3. Run the export
    #[cfg(feature = "sequential")]
    return notes_body_export::sequential::execute(config);

    #[cfg(not(feature = "sequential"))]
    notes_body_export::parallel::execute(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("notes-body-export").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn cli_beats_config_file() {
        let file_cfg: FileConfig = toml::from_str(
            r#"
            db_path = "/from/config.sqlite"
            format = "bodytext"
            on_error = "abort"
            "#,
        )
        .unwrap();
        let config = resolve_config(
            cli(&["-i", "/from/cli.sqlite", "-o", "jsonl", "--on-error", "empty"]),
            file_cfg,
            Some(PathBuf::from("/default.sqlite")),
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/from/cli.sqlite"));
        assert_eq!(config.format, OutputFormat::Jsonl);
        assert_eq!(config.on_error, ErrorPolicy::Empty);
    }

    #[test]
    fn config_file_beats_defaults() {
        let file_cfg: FileConfig = toml::from_str(
            r#"
            db_path = "/from/config.sqlite"
            format = "bodytext"
            entity_types = [12]
            "#,
        )
        .unwrap();
        let config =
            resolve_config(cli(&[]), file_cfg, Some(PathBuf::from("/default.sqlite"))).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/from/config.sqlite"));
        assert_eq!(config.format, OutputFormat::Bodytext);
        assert_eq!(config.on_error, ErrorPolicy::Skip);
        assert_eq!(config.entity_types, vec![12]);
    }

    #[test]
    fn defaults_fill_the_rest() {
        let config = resolve_config(
            cli(&["-o", "bodytext"]),
            FileConfig::default(),
            Some(PathBuf::from("/default.sqlite")),
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/default.sqlite"));
        assert_eq!(config.entity_types, DEFAULT_ENTITY_TYPES.to_vec());
        assert!(!config.snapshot);
    }

    #[test]
    fn format_is_required_somewhere() {
        let err = resolve_config(cli(&[]), FileConfig::default(), Some(PathBuf::from("/db")))
            .unwrap_err();
        assert!(err.to_string().contains("No output format"));
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["notes-body-export", "-o", "yaml"]).is_err());
        assert!(toml::from_str::<FileConfig>("format = \"yaml\"").is_err());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = FileConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn explicit_config_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"format = \"jsonl\"\nentity_types = [8]\n").unwrap();

        let found = FileConfig::locate(Some(file.path())).unwrap();
        assert_eq!(found.as_deref(), Some(file.path()));

        let file_cfg = FileConfig::load(Some(file.path())).unwrap();
        assert_eq!(file_cfg.format, Some(OutputFormat::Jsonl));
        assert_eq!(file_cfg.entity_types, Some(vec![8]));
        assert!(file_cfg.db_path.is_none());
    }

    #[test]
    fn unknown_config_key_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"output = \"jsonl\"\n").unwrap();
        let err = FileConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }
}
