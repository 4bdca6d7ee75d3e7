use std::{
    collections::BTreeSet,
    fmt, fs,
    path::{Path, PathBuf},
};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use gantry_composer::{
    ComposeWarning, Composer,
    reporter::{DotReporter, JsonReporter, Reporter as _, YamlReporter},
};
use gantry_context::ProvisioningContext;
use gantry_plan::Plan;
use miette::{
    Context as _, Diagnostic, GraphicalReportHandler, IntoDiagnostic as _, Result, Severity,
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(version)]
#[command(about = "Gantry CLI")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Compose(ComposeArgs),
    Check(CheckArgs),
}

#[derive(Args)]
struct ComposeArgs {
    /// Treat the given warnings as errors (e.g. `warnings`, `composer::open_ingress`).
    #[arg(short = 'D', long = "deny", value_name = "WARNING")]
    deny: Vec<String>,

    /// Select the emitted artifact.
    #[arg(long = "emit", value_enum, default_value_t = EmitKind::Json)]
    emit: EmitKind,

    /// Write the artifact to a file instead of stdout.
    #[arg(short = 'o', long = "out", value_name = "PATH")]
    out: Option<PathBuf>,

    /// Provisioning context document.
    #[arg(long = "context", value_name = "CONTEXT")]
    context: PathBuf,

    /// Deployment plan to compose.
    #[arg(value_name = "PLAN")]
    plan: PathBuf,
}

#[derive(Args)]
struct CheckArgs {
    /// Treat the given warnings as errors (e.g. `warnings`, `composer::open_ingress`).
    #[arg(short = 'D', long = "deny", value_name = "WARNING")]
    deny: Vec<String>,

    /// Provisioning context document.
    #[arg(long = "context", value_name = "CONTEXT")]
    context: PathBuf,

    /// Deployment plan to check.
    #[arg(value_name = "PLAN")]
    plan: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmitKind {
    Json,
    Yaml,
    Dot,
}

fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Command::Compose(args) => compose(args),
        Command::Check(args) => check(args),
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let gantry_level = match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,gantry={gantry_level},gantry_={gantry_level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer())
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

fn compose(args: ComposeArgs) -> Result<()> {
    let plan = read_plan(&args.plan)?;
    let context = read_context(&args.context)?;
    let composer = Composer::new(context);

    let output = composer.compose(&plan)?;

    let deny = DenySet::new(&args.deny);
    let has_error = print_warnings(&output.warnings, &deny)?;
    if has_error {
        return Err(miette::miette!("compose failed"));
    }

    let artifact = match args.emit {
        EmitKind::Json => JsonReporter.emit(&output),
        EmitKind::Yaml => YamlReporter.emit(&output),
        EmitKind::Dot => DotReporter.emit(&output),
    }?;

    match &args.out {
        Some(path) => fs::write(path, artifact)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write artifact to `{}`", path.display()))?,
        None => print!("{artifact}"),
    }

    Ok(())
}

fn check(args: CheckArgs) -> Result<()> {
    let plan = read_plan(&args.plan)?;
    let context = read_context(&args.context)?;

    let output = Composer::new(context).compose(&plan)?;

    let deny = DenySet::new(&args.deny);
    let has_error = print_warnings(&output.warnings, &deny)?;
    if has_error {
        Err(miette::miette!("check failed"))
    } else {
        Ok(())
    }
}

fn read_plan(path: &Path) -> Result<Plan> {
    let input = fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read plan `{}`", path.display()))?;
    Ok(input.parse()?)
}

fn read_context(path: &Path) -> Result<ProvisioningContext> {
    let input = fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read context `{}`", path.display()))?;
    Ok(input.parse()?)
}

#[derive(Default)]
struct DenySet {
    deny_warnings: bool,
    deny_codes: BTreeSet<String>,
}

impl DenySet {
    fn new(deny: &[String]) -> Self {
        let mut set = Self::default();
        for d in deny {
            if d == "warnings" {
                set.deny_warnings = true;
            } else {
                set.deny_codes.insert(d.clone());
            }
        }
        set
    }

    fn is_denied(&self, code: &str) -> bool {
        self.deny_warnings || self.deny_codes.contains(code)
    }
}

fn print_warnings(warnings: &[ComposeWarning], deny: &DenySet) -> Result<bool> {
    let mut has_error = false;
    let handler = GraphicalReportHandler::new();

    for warning in warnings {
        let code = warning.code().map(|c| c.to_string()).unwrap_or_default();
        if deny.is_denied(&code) {
            has_error = true;
            let denied_by = if deny.deny_warnings {
                "-D warnings".to_string()
            } else {
                format!("-D {code}")
            };
            let denied = DeniedDiagnostic {
                inner: warning,
                denied_by,
            };
            render_report(&handler, &denied)?;
        } else {
            render_report(&handler, warning)?;
        }
    }

    Ok(has_error)
}

fn render_report(handler: &GraphicalReportHandler, diagnostic: &dyn Diagnostic) -> Result<()> {
    let mut out = String::new();
    handler
        .render_report(&mut out, diagnostic)
        .map_err(|_| miette::miette!("failed to render diagnostics"))?;
    eprint!("{out}");
    Ok(())
}

/// Wraps a warning that was denied on the command line, forcing its
/// severity up to an error.
#[derive(Debug)]
struct DeniedDiagnostic<'a> {
    inner: &'a dyn Diagnostic,
    denied_by: String,
}

impl fmt::Display for DeniedDiagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner, f)
    }
}

impl std::error::Error for DeniedDiagnostic<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl Diagnostic for DeniedDiagnostic<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.inner.code()
    }

    fn severity(&self) -> Option<Severity> {
        Some(Severity::Error)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let hint = format!(
            "warning treated as error because it was denied via `{}`",
            self.denied_by
        );
        match self.inner.help() {
            Some(inner) => Some(Box::new(format!("{hint}\n{inner}"))),
            None => Some(Box::new(hint)),
        }
    }

    fn url<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.inner.url()
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.inner.source_code()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        self.inner.labels()
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        self.inner.related()
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        self.inner.diagnostic_source()
    }
}
