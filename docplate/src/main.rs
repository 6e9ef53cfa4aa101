use std::process::ExitCode;

use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use docplate::cli::{self, CliArgs, ConfigFile, Subcommand};
use docplate::config::{self, Config};
use docplate::{create_report, get_metadata, list_commands, DataSource, Options};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("docplate: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    init_tracing(args.verbose);

    let options = match load_options(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("docplate: {e}");
            return ExitCode::from(2);
        }
    };
    debug!(?options, "options loaded");

    match run(&args, &options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("docplate: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `warn`, raised by each `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_options(args: &CliArgs) -> Result<Options, String> {
    let path = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(p) => Some(p.clone()),
        ConfigFile::Search => Config::find(),
    };

    let mut cfg = Config::new();
    if let Some(path) = path {
        match Config::load_file(&path) {
            Ok((loaded, errors)) => {
                for e in &errors {
                    warn!(file = %path.display(), "{e}");
                }
                cfg = loaded;
            }
            // A missing searched-for file was already filtered out by find().
            Err(e) => return Err(format!("{}: {e}", path.display())),
        }
    }

    for (name, value) in &args.settings {
        config::set_option(&mut cfg.options, name, value)?;
    }
    Ok(cfg.options)
}

async fn run(args: &CliArgs, options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let template = tokio::fs::read(&args.template)
        .await
        .map_err(|e| format!("{}: {e}", args.template.display()))?;

    match args.command {
        Subcommand::Render => {
            let data = match &args.data {
                Some(path) => {
                    let text = tokio::fs::read_to_string(path)
                        .await
                        .map_err(|e| format!("{}: {e}", path.display()))?;
                    let json: serde_json::Value = serde_json::from_str(&text)?;
                    DataSource::from(json)
                }
                None => DataSource::Empty,
            };
            let report = create_report(&template, data, options).await?;
            let out = args.output.clone().unwrap_or_else(|| cli::default_output(&args.template));
            tokio::fs::write(&out, report)
                .await
                .map_err(|e| format!("{}: {e}", out.display()))?;
            eprintln!("docplate: wrote {}", out.display());
        }
        Subcommand::List => {
            let commands = list_commands(&template, &options.delimiters)?;
            println!("{}", serde_json::to_string_pretty(&commands)?);
        }
        Subcommand::Meta => {
            let meta = get_metadata(&template)?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
    }
    Ok(())
}
