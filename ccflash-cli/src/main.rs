//! ccflash CLI - Command-line tool for flashing TI SimpleLink CC3200/CC32xx chips.
//!
//! ## Features
//!
//! - Flash firmware bundles (manifest + files) into SLFS
//! - Probe the boot loader for chip, versions, storage and MAC
//! - Format SLFS and delete single files
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable support

use {
    anyhow::Result,
    ccflash::{ChipFamily, ConnectConfig, SerialConfig, port::DEFAULT_BAUD},
    clap::{Parser, Subcommand, ValueEnum},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    std::{env, path::PathBuf, process::ExitCode, time::Duration},
};

mod bundle;
mod commands;
mod config;
mod serial;

use {
    config::Config,
    serial::{SerialOptions, ask_remember_port, select_serial_port},
};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation.
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration or bundle.
    #[error("{0}")]
    Config(String),
    /// Aborted by the user.
    #[error("{0}")]
    Cancelled(String),
}

/// Exit code for a failed run.
pub(crate) fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return match cli {
                CliError::Usage(_) => 2,
                CliError::Config(_) => 3,
                CliError::Cancelled(_) => 130,
            };
        }
        if let Some(e) = cause.downcast_ref::<ccflash::Error>() {
            return match e.root_cause() {
                ccflash::Error::Unreachable { .. }
                | ccflash::Error::DeviceNotFound
                | ccflash::Error::Serial(_) => 4,
                root if root.kind() == ccflash::ErrorKind::Configuration => 3,
                _ => 1,
            };
        }
    }
    1
}

/// ccflash - Flash TI SimpleLink CC3200/CC32xx chips through the UART boot ROM.
///
/// Environment variables:
///   CCFLASH_PORT              - Default serial port
///   CCFLASH_BAUD              - Baud rate (default: 921600)
///   CCFLASH_CHIP              - Chip family (cc3200, cc32xx)
///   CCFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "ccflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "CCFLASH_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate.
    #[arg(short, long, global = true, env = "CCFLASH_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Target chip family.
    #[arg(short, long, global = true, env = "CCFLASH_CHIP")]
    pub(crate) chip: Option<ChipArg>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "CCFLASH_NON_INTERACTIVE")]
    pub(crate) non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    pub(crate) confirm_port: bool,

    /// List all available ports (including unknown types).
    #[arg(long, global = true)]
    pub(crate) list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Chip families selectable on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum ChipArg {
    /// CC3200 (with NWP loader handover).
    Cc3200,
    /// CC3220R/S/SF and other CC32xx parts.
    Cc32xx,
}

impl From<ChipArg> for ChipFamily {
    fn from(chip: ChipArg) -> Self {
        match chip {
            ChipArg::Cc3200 => ChipFamily::Cc3200,
            ChipArg::Cc32xx => ChipFamily::Cc32xx,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Flash a firmware bundle directory.
    Flash {
        /// Bundle directory containing manifest.json.
        bundle: PathBuf,

        /// Format SLFS to this many bytes before flashing.
        #[arg(long, value_name = "BYTES", value_parser = parse_size)]
        format: Option<u32>,

        /// Leave the device in the boot loader after flashing.
        #[arg(long)]
        no_boot: bool,
    },

    /// Connect and print chip, versions, storage and MAC.
    Probe {
        /// Output the report as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show the parts of a firmware bundle in flashing order.
    Info {
        /// Bundle directory containing manifest.json.
        bundle: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Format SLFS.
    Format {
        /// Filesystem size in bytes (decimal, 0x hex, or with K/M suffix).
        #[arg(value_parser = parse_size)]
        size: u32,
    },

    /// Delete one file from SLFS.
    Erase {
        /// SLFS file name, e.g. /sys/mcuimg.bin.
        file: String,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse a byte count: decimal, `0x` hex, or with a `K`/`M` suffix.
fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (digits, multiplier) = match s
        .chars()
        .last()
    {
        Some('k' | 'K') => (&s[..s.len() - 1], 1024),
        Some('m' | 'M') => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1),
    };
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else {
        digits.parse::<u32>()
    }
    .map_err(|e| format!("Invalid size '{s}': {e}"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Size '{s}' is too large"))
}

fn main() -> ExitCode {
    // NO_COLOR and TTY detection
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        },
    };

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "ccflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&e))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            bundle,
            format,
            no_boot,
        } => commands::flash::cmd_flash(cli, &mut config, bundle, *format, *no_boot),
        Commands::Probe { json } => commands::device::cmd_probe(cli, &mut config, *json),
        Commands::Info { bundle, json } => commands::info::cmd_info(bundle, *json),
        Commands::Format { size } => commands::device::cmd_format(cli, &mut config, *size),
        Commands::Erase { file } => commands::device::cmd_erase(cli, &mut config, file),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Get serial port from CLI args or interactive selection.
pub(crate) fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli
            .port
            .clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;

    // Ask to remember if not a known device and interactive mode
    if !selected.is_known && !cli.non_interactive {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected
        .port
        .name)
}

/// Chip family from the flag, then the config file.
pub(crate) fn resolve_family(cli: &Cli, config: &Config) -> Result<ChipFamily> {
    if let Some(chip) = cli.chip {
        return Ok(chip.into());
    }
    match &config
        .connect
        .chip
    {
        Some(name) => ChipFamily::from_name(name).ok_or_else(|| {
            CliError::Config(format!("Unknown chip '{name}' in configuration")).into()
        }),
        None => Ok(ChipFamily::default()),
    }
}

/// Negotiation settings from the config file.
pub(crate) fn connect_config(config: &Config) -> ConnectConfig {
    let mut connect = ConnectConfig::default();
    if let Some(attempts) = config
        .connect
        .attempts
    {
        connect = connect.with_attempts(attempts);
    }
    if let Some(ms) = config
        .connect
        .settle_ms
    {
        connect = connect.with_settle_delay(Duration::from_millis(ms));
    }
    connect
}

/// Serial settings for the selected port.
pub(crate) fn serial_config(cli: &Cli, config: &Config, port: String) -> SerialConfig {
    let baud = cli
        .baud
        .or(config
            .port
            .baud)
        .unwrap_or(DEFAULT_BAUD);
    SerialConfig::new(port, baud)
}
