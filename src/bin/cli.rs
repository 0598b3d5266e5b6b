//! pfeiffer-cli - Command-line front end
//!
//! Sniffs a live RS-485 bus or a recorded trace, decodes and encodes single
//! frames, and lists register catalogs.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use pfeiffer_core::cli::{
    format_catalog, format_error, format_message, format_register, parse_device, parse_value,
    print_exit_codes, CliResult, ExitCodes, OutputFormat,
};
use pfeiffer_core::config::{EngineConfig, LoggingConfig};
use pfeiffer_core::core::catalog::CatalogSet;
use pfeiffer_core::core::error::Error;
use pfeiffer_core::core::protocol::{build_query, parse_raw, resolve, Action};
use pfeiffer_core::core::transport::{
    build_command, list_ports, open_transport, DeviceMap, LiveTransport, Message, SerialConfig,
    TraceRecorder, Transport, TransportTrait,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Pfeiffer RS-485 CLI
#[derive(Parser, Debug)]
#[command(
    name = "pfeiffer-cli",
    version,
    about = "Sniffer and frame tool for the Pfeiffer RS-485 protocol",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "PFEIFFER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print frames from a serial port or a recorded trace
    Sniff {
        /// Serial port (e.g., /dev/ttyU0, COM3)
        port: Option<String>,

        /// Replay a JSON-lines trace instead of opening a port
        #[arg(short, long, conflicts_with = "port")]
        trace: Option<PathBuf>,

        /// Resolve frames from ADDR against CATALOG
        #[arg(short, long = "device", value_name = "ADDR=CATALOG", value_parser = parse_device)]
        devices: Vec<(u16, String)>,

        /// Record received frames to a trace file
        #[arg(short, long)]
        record: Option<PathBuf>,

        /// Log every replayed frame
        #[arg(long)]
        announce: bool,

        /// Stop after this many frames
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Stop at the first protocol violation or unknown register
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Check and decode a single frame
    Decode {
        /// Frame text; the trailing carriage return may be omitted
        frame: String,

        /// Resolve against this catalog
        #[arg(short, long)]
        catalog: Option<String>,
    },

    /// Assemble a query or write command
    Encode {
        /// Device address
        #[arg(short, long, default_value_t = 1)]
        address: u16,

        /// Catalog describing the device
        #[arg(short, long, default_value = "TC110")]
        catalog: String,

        /// Register number
        register: u16,

        /// Value to write; omit to build a query
        value: Option<String>,

        /// Write the frame to this serial port
        #[arg(long)]
        send: Option<String>,
    },

    /// List catalogs or show one
    Catalog {
        /// Catalog name
        name: Option<String>,

        /// Show only this register
        #[arg(short, long, requires = "name")]
        register: Option<u16>,
    },

    /// List available serial ports
    Ports {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,
    },

    /// Print the exit code table
    ExitCodes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::load_default(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return CliResult::from(&e).to_exit_code();
        }
    };

    let _guard = match init_logging(&cli, &config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(ExitCodes::CONFIG_ERROR);
        }
    };

    let result = run(&cli, config).unwrap_or_else(|e| match e.downcast_ref::<Error>() {
        Some(err) => CliResult::from(err),
        None => CliResult::error(ExitCodes::ERROR, format!("{:#}", e)),
    });

    match (result.is_success(), result.message()) {
        (true, Some(msg)) if !cli.quiet => eprintln!("{}", msg),
        (false, Some(msg)) => eprintln!("Error: {}", msg),
        _ => {}
    }
    result.to_exit_code()
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Log lines follow the output format
    let json = cli.format == OutputFormat::Json;
    let text_layer = (!json).then(|| fmt::layer().with_writer(std::io::stderr));
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));

    let (file_writer, guard) = match &logging.file {
        Some(path) => {
            let (writer, guard) = log_file_writer(path)?;
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    let file_layer = file_writer.map(|w| fmt::layer().with_writer(w).with_ansi(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn log_file_writer(path: &Path) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("invalid log file {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, name);
    Ok(tracing_appender::non_blocking(appender))
}

fn run(cli: &Cli, config: EngineConfig) -> anyhow::Result<CliResult> {
    match &cli.command {
        Commands::Sniff {
            port,
            trace,
            devices,
            record,
            announce,
            count,
            stop_on_error,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = port.clone();
                config.trace = None;
            }
            if let Some(trace) = trace {
                config.trace = Some(trace.clone());
            }
            config.announce_replay |= *announce;
            sniff(cli, &config, devices, record.as_deref(), *count, *stop_on_error)
        }
        Commands::Decode { frame, catalog } => {
            let catalogs = config.catalogs()?;
            decode_frame(cli, &catalogs, frame, catalog.as_deref())
        }
        Commands::Encode {
            address,
            catalog,
            register,
            value,
            send,
        } => encode_frame(
            cli,
            &config,
            *address,
            catalog,
            *register,
            value.as_deref(),
            send.as_deref(),
        ),
        Commands::Catalog { name, register } => {
            let catalogs = config.catalogs()?;
            show_catalog(cli, &catalogs, name.as_deref(), *register)
        }
        Commands::Ports { detailed } => show_ports(cli, *detailed),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

/// What the reader thread hands to the printing loop
#[derive(Debug)]
enum BusEvent {
    /// A complete line and what it parsed to
    Line(String, Result<Message, Error>),
    /// Bytes discarded before a line could form
    Fault(Error),
    /// The source is exhausted or failed; nothing follows
    Closed(Error),
}

fn next_event(transport: &mut Transport, devices: &DeviceMap) -> BusEvent {
    match transport.next_line() {
        Ok(line) => {
            let result = transport.interpret(&line, devices);
            BusEvent::Line(line, result)
        }
        Err(e @ Error::ProtocolViolation(_)) => BusEvent::Fault(e),
        Err(e) => BusEvent::Closed(e),
    }
}

/// Record a line as received, faulty or not
fn record_line<W: Write>(
    recorder: &mut TraceRecorder<W>,
    line: &str,
    result: &Result<Message, Error>,
) -> pfeiffer_core::Result<()> {
    let decoded = result.as_ref().ok().and_then(Message::decoded);
    recorder.record_line(line, decoded)
}

fn sniff(
    cli: &Cli,
    config: &EngineConfig,
    extra_devices: &[(u16, String)],
    record: Option<&Path>,
    count: Option<u64>,
    stop_on_error: bool,
) -> anyhow::Result<CliResult> {
    let catalogs = config.catalogs()?;
    let mut devices = config.device_map()?;
    for (address, catalog) in extra_devices {
        devices.insert(*address, catalog.as_str())?;
    }
    devices.validate(&catalogs)?;

    let mut recorder = record.map(TraceRecorder::create).transpose()?;
    let mut transport = open_transport(config.transport_kind(), catalogs)?;
    if !cli.quiet {
        eprintln!("Listening on {}. Press Ctrl+C to exit.", transport.connection_info());
    }

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    // The reader owns the transport; a blocked serial read cannot be
    // interrupted, so on Ctrl-C the thread is simply abandoned.
    let (tx, rx) = crossbeam_channel::bounded::<BusEvent>(64);
    std::thread::Builder::new()
        .name("bus-reader".to_string())
        .spawn(move || loop {
            let event = next_event(&mut transport, &devices);
            let last = matches!(event, BusEvent::Closed(_));
            if tx.send(event).is_err() || last {
                break;
            }
        })
        .context("cannot start reader thread")?;

    let mut received = 0u64;
    loop {
        crossbeam_channel::select! {
            recv(stop_rx) -> _ => {
                tracing::info!("Interrupted after {} frames", received);
                return Ok(CliResult::cancelled());
            }
            recv(rx) -> event => {
                let result = match event {
                    Ok(BusEvent::Line(line, result)) => {
                        if let Some(recorder) = recorder.as_mut() {
                            record_line(recorder, &line, &result)?;
                        }
                        result
                    }
                    Ok(BusEvent::Fault(e)) => Err(e),
                    Ok(BusEvent::Closed(Error::SimulationComplete)) => {
                        return Ok(CliResult::success_with_message(format!(
                            "Trace complete, {} frames",
                            received
                        )));
                    }
                    Ok(BusEvent::Closed(e)) => return Err(e.into()),
                    Err(_) => return Ok(CliResult::success()),
                };

                match result {
                    Ok(message) => {
                        println!("{}", format_message(&message, cli.format));
                        received += 1;
                        if count.is_some_and(|limit| received >= limit) {
                            return Ok(CliResult::success());
                        }
                    }
                    Err(e) => {
                        match cli.format {
                            OutputFormat::Json => println!("{}", format_error(&e, cli.format)),
                            OutputFormat::Text => eprintln!("{}", format_error(&e, cli.format)),
                        }
                        if stop_on_error {
                            return Err(e.into());
                        }
                    }
                }
            }
        }
    }
}

/// Accept frames typed with or without their terminator
fn normalize_frame(frame: &str) -> String {
    let body = frame
        .trim_end_matches("\\r")
        .trim_end_matches(|c: char| c == '\r' || c == '\n');
    format!("{}\r", body)
}

fn decode_frame(
    cli: &Cli,
    catalogs: &CatalogSet,
    frame: &str,
    catalog: Option<&str>,
) -> anyhow::Result<CliResult> {
    let raw = parse_raw(&normalize_frame(frame))?;
    let message = match catalog {
        Some(name) => Message::Decoded(resolve(raw, catalogs.catalog(name)?)?),
        None => Message::Raw(raw),
    };
    println!("{}", format_message(&message, cli.format));
    Ok(CliResult::success())
}

fn encode_frame(
    cli: &Cli,
    config: &EngineConfig,
    address: u16,
    catalog: &str,
    register: u16,
    value: Option<&str>,
    send: Option<&str>,
) -> anyhow::Result<CliResult> {
    let catalogs: Arc<CatalogSet> = config.catalogs()?;
    let catalog = catalogs.catalog(catalog)?;

    let frame = match value {
        None => build_query(address, register, catalog)?,
        Some(text) => {
            let descriptor = catalog.lookup(register)?;
            let value = match parse_value(descriptor.datatype, text) {
                Ok(value) => value,
                Err(msg) => return Ok(CliResult::error(ExitCodes::INVALID_ARGS, msg)),
            };
            build_command(address, Action::SetOrReply, register, &value, catalog)?
        }
    };

    match cli.format {
        OutputFormat::Text => println!("{}", frame),
        OutputFormat::Json => println!("{}", serde_json::json!({ "frame": frame.as_str() })),
    }

    if let Some(port) = send {
        let serial = SerialConfig::new(port).max_line_length(config.max_line_length);
        let mut live = LiveTransport::open(&serial)?;
        live.send(&frame)?;
        live.close();
        tracing::info!("Sent {} to {}", frame, port);
    }
    Ok(CliResult::success())
}

fn show_catalog(
    cli: &Cli,
    catalogs: &CatalogSet,
    name: Option<&str>,
    register: Option<u16>,
) -> anyhow::Result<CliResult> {
    let Some(name) = name else {
        for name in catalogs.names() {
            let catalog = catalogs.catalog(name)?;
            match cli.format {
                OutputFormat::Text => println!("{:<10} {} registers", name, catalog.len()),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "name": name, "registers": catalog.len() })
                ),
            }
        }
        return Ok(CliResult::success());
    };

    let catalog = catalogs.catalog(name)?;
    match register {
        Some(number) => {
            let descriptor = catalog.lookup(number)?;
            match cli.format {
                OutputFormat::Text => println!("{}", format_register(descriptor)),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(descriptor.as_ref())?)
                }
            }
        }
        None => println!("{}", format_catalog(catalog, cli.format)),
    }
    Ok(CliResult::success())
}

fn show_ports(cli: &Cli, detailed: bool) -> anyhow::Result<CliResult> {
    let ports = list_ports()?;

    if ports.is_empty() {
        if !cli.quiet {
            println!("No serial ports found.");
        }
        return Ok(CliResult::success());
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if detailed {
                println!("Available Serial Ports:");
                println!("{:-<60}", "");
                for port in &ports {
                    println!("  {} [{:?}]", port.port_name, port.port_type);
                }
            } else {
                for port in &ports {
                    println!("{}", port.port_name);
                }
            }
        }
    }

    Ok(CliResult::success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pfeiffer_core::core::transport::{TraceRecord, TransportKind};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pfeiffer-cli").chain(args.iter().copied())).unwrap()
    }

    fn exit_code(result: anyhow::Result<CliResult>) -> u8 {
        match result {
            Ok(result) => result.code(),
            Err(e) => e
                .downcast_ref::<Error>()
                .map(|err| CliResult::from(err).code())
                .unwrap_or(ExitCodes::ERROR),
        }
    }

    #[test]
    fn test_decode_command() {
        let cli = parse(&["decode", "0021030906000633033", "-c", "TC110"]);
        assert_eq!(exit_code(run(&cli, EngineConfig::default())), ExitCodes::SUCCESS);

        let cli = parse(&["--format", "json", "decode", "0010000102=?096"]);
        assert_eq!(exit_code(run(&cli, EngineConfig::default())), ExitCodes::SUCCESS);

        let cli = parse(&["decode", "0011000106111111016"]);
        assert_eq!(exit_code(run(&cli, EngineConfig::default())), ExitCodes::PROTOCOL_ERROR);

        let cli = parse(&["decode", "0011099906000000035", "-c", "TC110"]);
        assert_eq!(exit_code(run(&cli, EngineConfig::default())), ExitCodes::UNKNOWN_REGISTER);
    }

    #[test]
    fn test_catalog_command() {
        let cli = parse(&["catalog"]);
        assert_eq!(exit_code(run(&cli, EngineConfig::default())), ExitCodes::SUCCESS);

        let cli = parse(&["catalog", "TC110", "-r", "309"]);
        assert_eq!(exit_code(run(&cli, EngineConfig::default())), ExitCodes::SUCCESS);

        let cli = parse(&["catalog", "NOPE"]);
        assert_eq!(exit_code(run(&cli, EngineConfig::default())), ExitCodes::CATALOG_ERROR);
    }

    #[test]
    fn test_recording_keeps_faulty_lines() {
        let lines = [
            "0011000106111111015\r",
            "0011000106111111016\r",
            "0011099906000000035\r",
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.jsonl");
        let mut source = TraceRecorder::create(&path).unwrap();
        for line in lines {
            source.record_line(line, None).unwrap();
        }
        source.finish().unwrap();

        let catalogs = CatalogSet::builtin().unwrap();
        let mut transport = open_transport(TransportKind::replay(&path), catalogs).unwrap();
        let devices = DeviceMap::new().with_device(1, "TC110").unwrap();
        let mut recorder = TraceRecorder::new(Vec::new());

        let mut outcomes = Vec::new();
        loop {
            match next_event(&mut transport, &devices) {
                BusEvent::Line(line, result) => {
                    record_line(&mut recorder, &line, &result).unwrap();
                    outcomes.push(result);
                }
                BusEvent::Fault(e) => panic!("unexpected fault {}", e),
                BusEvent::Closed(e) => {
                    assert!(e.is_simulation_complete());
                    break;
                }
            }
        }

        assert!(outcomes[0].is_ok());
        assert!(outcomes[1].as_ref().unwrap_err().is_protocol_violation());
        assert!(matches!(outcomes[2], Err(Error::UnknownRegister { register: 999, .. })));

        let text = String::from_utf8(recorder.finish().unwrap()).unwrap();
        let records: Vec<TraceRecord> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let recorded: Vec<&str> = records.iter().map(|r| r.packet_raw.as_str()).collect();
        assert_eq!(recorded, lines);
        assert!(records[0].decoded.is_some());
        assert!(records[1].decoded.is_none());
    }

    #[test]
    fn test_normalize_frame() {
        assert_eq!(normalize_frame("0010000102=?096"), "0010000102=?096\r");
        assert_eq!(normalize_frame("0010000102=?096\\r"), "0010000102=?096\r");
        assert_eq!(normalize_frame("0010000102=?096\r\n"), "0010000102=?096\r");
    }

    #[test]
    fn test_cli_parses_devices() {
        let cli = Cli::try_parse_from([
            "pfeiffer-cli",
            "sniff",
            "--trace",
            "t.jsonl",
            "-d",
            "1=TC110",
            "--device",
            "122=MVP015",
        ])
        .unwrap();
        match cli.command {
            Commands::Sniff { devices, trace, .. } => {
                assert_eq!(devices, vec![(1, "TC110".to_string()), (122, "MVP015".to_string())]);
                assert_eq!(trace, Some(PathBuf::from("t.jsonl")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
