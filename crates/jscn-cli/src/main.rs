use std::io::Read;
use std::path::{Path, PathBuf};

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use jscn::{parse_schema_diagnostic, Schema};

#[derive(Parser)]
#[command(
    name = "jscn",
    about = "Compile JSCN (JSON Schema Compact Notation) to JSON Schema draft-07",
    version
)]
struct Cli {
    /// JSCN source file, or `-` for stdin.
    #[arg(default_value = "-")]
    input: PathBuf,

    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit single-line JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (source, input_name) = read_source(&cli.input)?;
    debug!(input = %input_name, bytes = source.len(), "read source");

    let schema = parse_or_report(&input_name, &source)?;
    let document = schema.jsonschema().wrap_err("failed to compile schema")?;

    let mut rendered = if cli.compact {
        document.to_string()
    } else {
        serde_json::to_string_pretty(&document).wrap_err("failed to serialize JSON Schema")?
    };
    rendered.push('\n');

    match &cli.output {
        Some(path) => std::fs::write(path, rendered)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?,
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(rendered.as_bytes())
                .wrap_err("failed to write to stdout")?;
        }
    }
    Ok(())
}

fn read_source(input: &Path) -> Result<(String, String)> {
    if input == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .wrap_err("failed to read stdin")?;
        Ok((source, "<stdin>".to_string()))
    } else {
        let source = std::fs::read_to_string(input)
            .wrap_err_with(|| format!("failed to read {}", input.display()))?;
        Ok((source, input.display().to_string()))
    }
}

/// Parse, printing an annotated report to stderr on failure. The label
/// range comes from the diagnostic itself, which clamps its offset into
/// the source.
fn parse_or_report(input_name: &str, source: &str) -> Result<Schema> {
    match parse_schema_diagnostic(source) {
        Ok(ast) => Ok(Schema::from(ast)),
        Err(diag) => {
            let span = diag.label_span(source);
            let _ = Report::build(ReportKind::Error, input_name.to_string(), span.start)
                .with_message("parse error")
                .with_label(
                    Label::new((input_name.to_string(), span))
                        .with_color(Color::Red)
                        .with_message(diag.message.clone()),
                )
                .finish()
                .eprint((input_name.to_string(), Source::from(source)));
            Err(eyre!("schema parse failed"))
        }
    }
}

fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_log_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "info",
        _ => "debug",
    }
}
