use clap::{Parser, Subcommand};
use colored_json::{Color, ColorMode, Output, Styler, ToColoredJson};
use iab_tcf::Consent;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a TCF consent string and display it in the console
    Parse {
        /// Consent string to parse
        consent_string: String,
        /// Print the string encoded again from the decoded record instead
        #[arg(short, long)]
        reencode: bool,
    },
    /// Print the version of a consent string
    Version {
        /// Consent string to inspect
        consent_string: String,
    },
    /// Check that a consent string can be fully decoded
    Validate {
        /// Consent string to check
        consent_string: String,
    },
}

fn main() {
    setup_logging("warn");
    let args = Cli::parse();

    let e = match args.cmd {
        Commands::Parse {
            consent_string,
            reencode: false,
        } => parse_consent_string(&consent_string),
        Commands::Parse {
            consent_string,
            reencode: true,
        } => reencode_consent_string(&consent_string),
        Commands::Version { consent_string } => print_version(&consent_string),
        Commands::Validate { consent_string } => validate_consent_string(&consent_string),
    };

    if let Err(e) = e {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr, filtered by `RUST_LOG` when set.
fn setup_logging(directives: &str) {
    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives)))
        .with(main_layer)
        .init()
}

fn parse_consent_string(s: &str) -> Result<(), Box<dyn std::error::Error>> {
    let consent = iab_tcf::parse(s)?;
    debug!(version = %consent.version(), "decoded consent string");

    let json = match &consent {
        Consent::V1(c) => serde_json::to_string_pretty(c)?,
        Consent::V2(c) => serde_json::to_string_pretty(c)?,
    };
    println!(
        "{}",
        json.to_colored_json_with_styler(ColorMode::Auto(Output::StdOut), json_color_styler())?
    );

    Ok(())
}

fn reencode_consent_string(s: &str) -> Result<(), Box<dyn std::error::Error>> {
    let consent = iab_tcf::parse(s)?;
    println!("{consent}");

    Ok(())
}

fn print_version(s: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", iab_tcf::parse_version(s)?);

    Ok(())
}

fn validate_consent_string(s: &str) -> Result<(), Box<dyn std::error::Error>> {
    iab_tcf::validate(s)?;
    println!("valid");

    Ok(())
}

fn json_color_styler() -> Styler {
    Styler {
        key: Color::Green.foreground(),
        string_value: Color::Blue.bold(),
        integer_value: Color::Magenta.bold(),
        float_value: Color::Magenta.italic(),
        object_brackets: Color::Yellow.bold(),
        array_brackets: Color::Cyan.bold(),
        ..Default::default()
    }
}
