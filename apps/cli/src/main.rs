use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hpm_core::protocol::parse_custom_words;
use hpm_core::{
    DeviceTreeIdentity, HpmError, HpmSession, KnownVdm, PlatformIdentity, SessionConfig,
    SimulatedHpm, SimulatedProvider, StaticIdentity, TransportError, VdmRequestKind,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "USB-C PD controller (HPM) VDM tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Port identifier (RID) of the controller. RID 0 is the DFU port.
    #[arg(short, long, global = true)]
    rid: Option<u32>,

    /// Load session settings from a TOML file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the effective session settings to a TOML file
    #[arg(long, global = true)]
    save_config: Option<PathBuf>,

    /// Stay in DBMa mode after sending the VDM
    #[arg(long, global = true)]
    no_restore: bool,

    /// Board name used for the ACE unlock key, instead of reading the device tree
    #[arg(long, global = true, value_name = "NAME")]
    board: Option<String>,

    /// Drive a simulated controller for this board instead of hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reboot the attached device
    Reboot,
    /// Put the attached device into DFU mode
    Dfu,
    /// Enable the debug USB transport on the attached device
    Debug,
    /// Ask the attached device for its supported actions
    List,
    /// Send a VDM built from up to 8 hex words
    Custom {
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        words: Vec<String>,
    },
}

impl Command {
    fn request(&self) -> Result<VdmRequestKind> {
        Ok(match self {
            Command::Reboot => VdmRequestKind::Known(KnownVdm::Reboot),
            Command::Dfu => VdmRequestKind::Known(KnownVdm::Dfu),
            Command::Debug => VdmRequestKind::Known(KnownVdm::DebugUsb),
            Command::List => VdmRequestKind::Known(KnownVdm::List),
            Command::Custom { words } => {
                VdmRequestKind::Raw(parse_custom_words(words.as_slice())?)
            }
        })
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help and usage errors both count as a failed invocation
            let _ = e.print();
            process::exit(1);
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    if let Err(e) = run(&args) {
        report(&e);
        process::exit(1);
    }
}

fn effective_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(rid) = args.rid {
        config.rid = rid;
    }
    if args.no_restore {
        config.restore_app_mode = false;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let request = args.command.request()?;
    let config = effective_config(args)?;

    if let Some(path) = &args.save_config {
        config
            .save_to_file(path)
            .with_context(|| format!("Failed to save config {}", path.display()))?;
        info!(path = %path.display(), "Saved session config");
    }

    if !args.simulate {
        return Err(HpmError::Transport(TransportError::Unsupported(
            "no hardware backend is available on this platform; use --simulate".into(),
        ))
        .into());
    }

    let identity = platform_identity(args);
    let board = identity.board_name()?;
    info!(rid = config.rid, board = %board, "Starting simulated HPM session");
    let hpm = SimulatedHpm::new(&board);
    let provider = SimulatedProvider::new().with_instance(config.rid, hpm);
    let mut session = HpmSession::new(config, provider, identity);
    session.run(&request)?;

    info!("Done");
    Ok(())
}

/// Board name from `--board`, or detected from the device tree.
fn platform_identity(args: &Args) -> Box<dyn PlatformIdentity> {
    match &args.board {
        Some(name) => Box::new(StaticIdentity::new(name.clone())),
        None => Box::new(DeviceTreeIdentity::default()),
    }
}

fn fatal_message(e: &anyhow::Error) -> String {
    let Some(hpm) = e.downcast_ref::<HpmError>() else {
        return format!("Error: {:#}", e);
    };
    match hpm {
        HpmError::NotFound { rid } => format!("No HPM device found for RID {}", rid),
        HpmError::ConnectionAbsent { .. } | HpmError::ConnectionQueryFailed => hpm.to_string(),
        other => match other.raw_code() {
            Some(code) => format!("{} ({:#x})", other, code),
            None => other.to_string(),
        },
    }
}

fn report(e: &anyhow::Error) {
    error!("{}", fatal_message(e));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_accepts_negative_words() {
        let args = Args::try_parse_from(["hpmpoke", "custom", "5ac8012", "-1"]).unwrap();
        assert_eq!(
            args.command.request().unwrap(),
            VdmRequestKind::Raw(vec![0x05AC_8012, 0xFFFF_FFFF])
        );
    }

    #[test]
    fn test_custom_rejects_too_many_words() {
        let mut argv = vec!["hpmpoke", "custom"];
        argv.extend(["1"; 9]);
        let args = Args::try_parse_from(argv).unwrap();
        assert!(args.command.request().is_err());
    }

    #[test]
    fn test_missing_command_is_an_error() {
        assert!(Args::try_parse_from(["hpmpoke"]).is_err());
        assert!(Args::try_parse_from(["hpmpoke", "frobnicate"]).is_err());
    }

    #[test]
    fn test_board_overrides_device_tree() {
        let args = Args::try_parse_from(["hpmpoke", "--simulate", "--board", "J314sAP", "reboot"])
            .unwrap();
        assert!(args.simulate);
        assert_eq!(platform_identity(&args).board_name().unwrap(), "J314sAP");
    }

    #[test]
    fn test_fatal_messages_are_distinct() {
        let not_found = fatal_message(&HpmError::NotFound { rid: 1 }.into());
        let absent = fatal_message(&HpmError::ConnectionAbsent { rid: 1 }.into());
        let query = fatal_message(&HpmError::ConnectionQueryFailed.into());
        assert_eq!(not_found, "No HPM device found for RID 1");
        assert_eq!(
            absent,
            "No connection found; is a device connected to port 1?"
        );
        assert_eq!(query, "Failed to get connection type");
    }

    #[test]
    fn test_fatal_message_carries_raw_code() {
        let err = HpmError::Transport(TransportError::SendVdmFailed { code: 0xE000_02E2 });
        let message = fatal_message(&err.into());
        assert!(message.ends_with("(0xe00002e2)"), "{message}");

        let wrapped = anyhow::Error::from(HpmError::EmptyBody).context("while building request");
        assert_eq!(fatal_message(&wrapped), "Error: while building request: VDM body is empty");
    }

    #[test]
    fn test_rid_overrides_config() {
        let args = Args::try_parse_from(["hpmpoke", "-r", "2", "--no-restore", "dfu"]).unwrap();
        let config = effective_config(&args).unwrap();
        assert_eq!(config.rid, 2);
        assert!(!config.restore_app_mode);
    }
}
