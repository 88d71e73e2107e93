//! CLI argument parsing using clap.

use clap::{
    Parser,
    builder::styling::{AnsiColor, Effects, Styles},
    error::ErrorKind,
};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::manifest::APP_DESCRIPTION;

/// Environment fallback for `--config`.
pub const CONFIG_ENV: &str = "FILEWATCHER_CONFIG";

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(
    name = "filewatcher",
    about = APP_DESCRIPTION,
    long_about = "Native messaging host for the FileWatcher browser extension.\n\n\
                  Without flags it speaks the framed JSON protocol on stdin/stdout \
                  until the browser closes the connection.",
    disable_version_flag = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Print the Firefox native messaging host manifest and exit
    #[arg(long = "manifest-ff")]
    pub manifest_ff: bool,

    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Print the effective settings as TOML and exit
    #[arg(long = "print-config")]
    pub print_config: bool,

    /// Settings file [default: <config dir>/filewatcher/settings.toml]
    #[arg(long, value_name = "PATH", env = "FILEWATCHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Arguments supplied by the browser (manifest path, extension id, origin)
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub browser_args: Vec<String>,
}

/// What the process should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    PrintManifest,
    PrintVersion,
    PrintConfig,
    Serve,
}

impl Cli {
    /// Parse the process arguments, tolerating browser-specific extras.
    pub fn parse_lenient() -> Self {
        Self::parse_lenient_from(std::env::args_os())
    }

    /// Parse `args`; help is printed and exits, any other parse failure
    /// yields the serve command line, keeping the settings file if one was
    /// given.
    pub fn parse_lenient_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        match Self::try_parse_from(&args) {
            Ok(cli) => cli,
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                e.exit()
            }
            Err(_) => Self {
                config: recover_config(&args),
                ..Self::default()
            },
        }
    }

    pub fn mode(&self) -> Mode {
        if self.manifest_ff {
            Mode::PrintManifest
        } else if self.version {
            Mode::PrintVersion
        } else if self.print_config {
            Mode::PrintConfig
        } else {
            Mode::Serve
        }
    }
}

/// Find `--config` in a command line clap rejected, then fall back to the
/// environment.
fn recover_config(args: &[OsString]) -> Option<PathBuf> {
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        if arg.as_os_str() == "--config" {
            return rest.next().map(PathBuf::from);
        }
        if let Some(path) = arg.to_str().and_then(|a| a.strip_prefix("--config=")) {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var_os(CONFIG_ENV).map(PathBuf::from)
}
