//! Headless G-code sender.
//!
//! Interprets a program, prints its totals, and optionally streams it to a
//! GRBL controller over serial.

use std::time::Duration;

use anyhow::{bail, Context};

use cncsend::{
    init_logging, list_ports, AppConfig, MachineStatus, ProgramModel, SerialLink, SessionSlot,
};

struct Args {
    program: Option<String>,
    send: bool,
    list: bool,
    port: Option<String>,
    baud: Option<u32>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        program: None,
        send: false,
        list: false,
        port: None,
        baud: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--send" => args.send = true,
            "--ports" => args.list = true,
            "--port" => args.port = iter.next(),
            "--baud" => {
                args.baud = Some(
                    iter.next()
                        .context("--baud needs a value")?
                        .parse()
                        .context("--baud needs a number")?,
                )
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if !other.starts_with('-') => args.program = Some(other.to_string()),
            other => bail!("unknown option: {other}"),
        }
    }
    Ok(args)
}

fn print_usage() {
    println!("usage: cncsend [options] <program.gcode>");
    println!();
    println!("  --send         stream the program to the controller");
    println!("  --port <name>  serial port (default: from config, or auto)");
    println!("  --baud <rate>  baud rate (default: from config)");
    println!("  --ports        list candidate serial ports and exit");
}

fn pick_port(config: &AppConfig, override_port: Option<&str>) -> anyhow::Result<String> {
    if let Some(port) = override_port {
        return Ok(port.to_string());
    }
    if !config.connection.port.eq_ignore_ascii_case("auto") {
        return Ok(config.connection.port.clone());
    }
    let ports = list_ports().context("port discovery failed")?;
    match ports.first() {
        Some(info) => {
            tracing::info!(port = %info.port_name, desc = %info.description, "auto-selected port");
            Ok(info.port_name.clone())
        }
        None => bail!("no controller serial ports found"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let args = parse_args()?;
    let config = AppConfig::load_or_default();

    if args.list {
        for info in list_ports().context("port discovery failed")? {
            println!("{}  {}", info.port_name, info.description);
        }
        return Ok(());
    }

    let Some(program_path) = args.program.as_deref() else {
        print_usage();
        bail!("no program file given");
    };

    let source = std::fs::read_to_string(program_path)
        .with_context(|| format!("failed to read {program_path}"))?;

    let model = ProgramModel::with_interpreter(cncsend::GcodeInterpreter::with_tessellation(
        config.arcs,
    ));
    model.load(&source);
    let totals = model.totals();
    tracing::info!(
        lines = totals.line_count,
        motion = totals.motion_count,
        path_mm = format!("{:.1}", totals.path_length_mm),
        estimate_s = format!("{:.0}", totals.estimated_seconds),
        "program interpreted"
    );

    if !args.send {
        return Ok(());
    }

    let port = pick_port(&config, args.port.as_deref())?;
    let baud = args.baud.unwrap_or(config.connection.baud_rate);
    let link = SerialLink::open(&port, baud)?;

    let slot = SessionSlot::new();
    let handle = slot.connect(Box::new(link), config.engine_config());

    // give the controller time to reset and greet before streaming
    tokio::time::sleep(Duration::from_secs(2)).await;

    let lines = model.lines();
    let total = lines.len();
    for line in lines {
        handle.send(line);
    }
    tracing::info!(total, "streaming started");

    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let snapshot = handle.snapshot();
        let queued = handle.queued_lines();
        match snapshot.status {
            MachineStatus::Disconnected => bail!("connection lost"),
            MachineStatus::Alarm(code) => {
                bail!("device alarm{}", code.map(|c| format!(" {c}")).unwrap_or_default())
            }
            MachineStatus::Idle if queued == 0 => break,
            _ => {
                tracing::info!(
                    queued,
                    status = ?snapshot.status,
                    x = snapshot.wpos.x,
                    y = snapshot.wpos.y,
                    z = snapshot.wpos.z,
                    "streaming"
                );
            }
        }
    }

    tracing::info!("program complete");
    slot.disconnect();
    Ok(())
}
