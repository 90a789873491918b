use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use outgrow_core::logging::init_logging;
use outgrow_core::{ConversionOutput, ConvertConfig, Converter, OutgrowError, OutgrowResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "outgrow",
    version,
    about = "Split a single-file nanodjango app into a full Django project"
)]
struct Cli {
    /// The single-file app to convert
    input: PathBuf,
    /// Directory to create the project in (or set target_root in --config)
    target: Option<PathBuf>,
    /// Project package name
    #[arg(short = 'n', long = "name", value_name = "NAME")]
    project: Option<String>,
    /// App package name (default: the input file's stem)
    #[arg(long, value_name = "NAME")]
    app: Option<String>,
    /// JSON conversion config; flags override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Replace the target directory if it is not empty
    #[arg(long, alias = "delete")]
    overwrite: bool,
    /// JSON rule file to load as a plugin (repeatable)
    #[arg(long = "plugin-rules", value_name = "PATH")]
    plugin_rules: Vec<PathBuf>,
    /// Bundled plugin to leave out (repeatable)
    #[arg(long = "disable-plugin", value_name = "NAME")]
    disable_plugin: Vec<String>,
    /// Print the generated paths instead of writing them
    #[arg(long)]
    dry_run: bool,
    /// Diagnostics format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

impl Cli {
    fn config(&self) -> OutgrowResult<ConvertConfig> {
        let mut config = match &self.config {
            Some(path) => ConvertConfig::from_json_file(path)?,
            None => ConvertConfig::default(),
        };
        if let Some(project) = &self.project {
            config.project_name = project.clone();
        }
        match &self.app {
            Some(app) => config.app_name = app.clone(),
            None if self.config.is_none() => {
                if let Some(stem) = self.input.file_stem() {
                    config.app_name = stem.to_string_lossy().to_string();
                }
            }
            None => {}
        }
        if let Some(target) = &self.target {
            config.target_root = Some(target.clone());
        }
        config.overwrite |= self.overwrite;
        config.plugin_rules.extend(self.plugin_rules.iter().cloned());
        config.disabled_plugins.extend(self.disable_plugin.iter().cloned());
        Ok(config)
    }
}

fn print_report(output: &ConversionOutput, format: ReportFormat) -> OutgrowResult<()> {
    match format {
        ReportFormat::Json => println!("{}", output.report.to_json()?),
        ReportFormat::Text => {
            for line in output.report.summary_lines() {
                eprintln!("{line}");
            }
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> OutgrowResult<()> {
    let config = cli.config()?;
    let converter = Converter::new(config)?;

    let output = if cli.dry_run {
        let source = std::fs::read_to_string(&cli.input)?;
        let output = converter.convert_source(&source)?;
        for file in &output.files {
            println!("{}", file.path.display());
        }
        output
    } else {
        let root = converter.config().target_root.clone().ok_or_else(|| {
            OutgrowError::Config("no target directory given".to_string())
        })?;
        let output = converter.convert_file(&cli.input, &root)?;
        eprintln!(
            "Converted {} into {} ({} files)",
            cli.input.display(),
            root.display(),
            output.files.len()
        );
        output
    };
    print_report(&output, cli.report)
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}
