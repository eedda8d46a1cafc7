//! Command-line entry point: tokenizes a trailing sequence of commands per
//! the CLI grammar, opens the target device once, and runs each command in
//! order against [`fel::command::Command`], honoring an armed autostart at
//! the end of the sequence.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fel::command::{Command, MemRange, WriteJob};
use fel::progress::{BarProgress, GaugeProgress, NoopProgress, ProgressSink};
use fel::protocol;
use fel::session::FelSession;
use fel::usb::UsbBulkTransport;
use fel::Error;

#[derive(Parser)]
#[command(name = "fel", about = "Drive Allwinner's FEL USB boot-ROM recovery protocol")]
struct Cli {
    /// Select a specific device as BUS:DEVNUM when more than one is attached.
    #[arg(short = 'd', long = "dev", value_parser = parse_bus_devnum)]
    dev: Option<(u8, u8)>,

    /// Raise logging to debug.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Show a progress bar for long transfers that don't ask for a gauge.
    #[arg(short = 'p', long)]
    progress: bool,

    /// A sequence of commands, each with a fixed arity, reduced left-to-right.
    #[arg(trailing_var_arg = true)]
    tokens: Vec<String>,
}

fn parse_bus_devnum(s: &str) -> Result<(u8, u8), String> {
    let (bus, devnum) = s
        .split_once(':')
        .ok_or_else(|| "expected BUS:DEVNUM".to_string())?;
    let bus = bus.parse().map_err(|_| "bad bus number".to_string())?;
    let devnum = devnum.parse().map_err(|_| "bad device number".to_string())?;
    Ok((bus, devnum))
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

/// How a command's transfer should report progress, independent of which
/// memory operation it wraps: `Default` defers to the `-p` flag, `Bar`/
/// `Gauge` are forced by a `-with-progress`/`-with-gauge`/`-with-xgauge`
/// command suffix regardless of `-p`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ProgressVariant {
    Default,
    Bar,
    Gauge,
}

fn sink_for(variant: ProgressVariant, cli_progress: bool) -> Box<dyn ProgressSink> {
    match variant {
        ProgressVariant::Gauge => Box::new(GaugeProgress::new(std::io::stdout())),
        ProgressVariant::Bar => Box::new(BarProgress::new()),
        ProgressVariant::Default => {
            if cli_progress {
                Box::new(BarProgress::new())
            } else {
                Box::new(NoopProgress)
            }
        }
    }
}

/// Strips a `-with-progress`/`-with-gauge`/`-with-xgauge` suffix and
/// normalizes the common abbreviations (`ver`, `multi`, `exe`, `hex`) the
/// CLI grammar accepts.
fn canonical_name(raw: &str) -> (&'static str, ProgressVariant) {
    let (stripped, variant) = if let Some(base) = raw.strip_suffix("-with-xgauge") {
        (base, ProgressVariant::Gauge)
    } else if let Some(base) = raw.strip_suffix("-with-gauge") {
        (base, ProgressVariant::Gauge)
    } else if let Some(base) = raw.strip_suffix("-with-progress") {
        (base, ProgressVariant::Bar)
    } else {
        (raw, ProgressVariant::Default)
    };
    let name: &'static str = match stripped {
        "version" | "ver" => "version",
        "sid" => "sid",
        "readl" => "readl",
        "writel" => "writel",
        "read" => "read",
        "write" => "write",
        "multiwrite" | "multi" => "multiwrite",
        "hexdump" | "hex" => "hexdump",
        "dump" => "dump",
        "execute" | "exe" => "execute",
        "reset64" => "reset64",
        "clear" => "clear",
        "fill" => "fill",
        "spl" => "spl",
        "uboot" => "uboot",
        _ => "",
    };
    (name, variant)
}

struct ParsedCommand {
    command: Command,
    variant: ProgressVariant,
}

fn take<'a>(tokens: &'a [String], i: &mut usize, what: &'static str) -> fel::Result<&'a str> {
    let tok = tokens
        .get(*i)
        .ok_or_else(|| Error::InvalidArgument(format!("missing {what}")))?;
    *i += 1;
    Ok(tok.as_str())
}

fn take_addr(tokens: &[String], i: &mut usize, what: &'static str) -> fel::Result<u32> {
    let tok = take(tokens, i, what)?;
    parse_u32(tok).map_err(|_| Error::InvalidArgument(tok.to_string()))
}

fn take_path(tokens: &[String], i: &mut usize, what: &'static str) -> fel::Result<PathBuf> {
    Ok(PathBuf::from(take(tokens, i, what)?))
}

/// Tokenizes a flat argv tail into a sequence of commands per the CLI
/// grammar's fixed arities (`multiwrite`'s pair count is the one variable
/// arity, itself given as a leading integer).
fn parse_commands(tokens: &[String]) -> fel::Result<Vec<ParsedCommand>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let (name, variant) = canonical_name(&tokens[i]);
        i += 1;
        let command = match name {
            "version" => Command::Version,
            "sid" => Command::Sid,
            "readl" => Command::Readl {
                address: take_addr(tokens, &mut i, "ADDR")?,
            },
            "writel" => Command::Writel {
                address: take_addr(tokens, &mut i, "ADDR")?,
                value: take_addr(tokens, &mut i, "VALUE")?,
            },
            "read" => {
                let address = take_addr(tokens, &mut i, "ADDR")?;
                let length = take_addr(tokens, &mut i, "LENGTH")?;
                let output = take_path(tokens, &mut i, "FILE")?;
                Command::Read { range: MemRange { address, length }, output }
            }
            "write" => Command::Write {
                address: take_addr(tokens, &mut i, "ADDR")?,
                input: take_path(tokens, &mut i, "FILE")?,
            },
            "multiwrite" => {
                let count = take_addr(tokens, &mut i, "N")?;
                let mut jobs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let address = take_addr(tokens, &mut i, "ADDR")?;
                    let path = take_path(tokens, &mut i, "FILE")?;
                    jobs.push(WriteJob { address, path });
                }
                Command::MultiWrite { jobs }
            }
            "hexdump" => {
                let address = take_addr(tokens, &mut i, "ADDR")?;
                let length = take_addr(tokens, &mut i, "LENGTH")?;
                Command::Hexdump { range: MemRange { address, length } }
            }
            "dump" => {
                let address = take_addr(tokens, &mut i, "ADDR")?;
                let length = take_addr(tokens, &mut i, "LENGTH")?;
                Command::Dump { range: MemRange { address, length } }
            }
            "execute" => Command::Execute { address: take_addr(tokens, &mut i, "ADDR")? },
            "reset64" => Command::Reset64 { address: take_addr(tokens, &mut i, "ADDR")? },
            "clear" => {
                let address = take_addr(tokens, &mut i, "ADDR")?;
                let length = take_addr(tokens, &mut i, "LENGTH")?;
                Command::Clear { range: MemRange { address, length } }
            }
            "fill" => {
                let address = take_addr(tokens, &mut i, "ADDR")?;
                let length = take_addr(tokens, &mut i, "LENGTH")?;
                let value = take_addr(tokens, &mut i, "VALUE")?;
                Command::Fill { range: MemRange { address, length }, value: value as u8 }
            }
            "spl" => Command::Spl { image_path: take_path(tokens, &mut i, "FILE")? },
            "uboot" => Command::Uboot { image_path: take_path(tokens, &mut i, "FILE")? },
            _ => return Err(Error::InvalidArgument(format!("unknown command {:?}", tokens[i - 1]))),
        };
        out.push(ParsedCommand { command, variant });
    }
    Ok(out)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new().filter_level(level).init();

    match run(cli) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("fel: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> fel::Result<()> {
    if cli.tokens.first().map(String::as_str) == Some("echo-gauge") {
        let text = cli.tokens.get(1).cloned().unwrap_or_default();
        return run_echo_gauge(&text);
    }

    let parsed = parse_commands(&cli.tokens)?;

    let context = rusb::Context::new()?;
    let device = fel::usb::pick_device(&context, cli.dev)?;
    let transport = UsbBulkTransport::open(&device)?;
    let mut session = FelSession::open(transport)?;

    for item in parsed {
        if session.halted() {
            break;
        }
        let mut sink = sink_for(item.variant, cli.progress);
        if let Some(output) = item.command.run(&mut session, sink.as_mut())? {
            println!("{output}");
        }
    }

    if !session.halted() {
        if let Some(addr) = session.autostart() {
            protocol::execute(session.transport(), addr)?;
        }
    }
    Ok(())
}

/// `echo-gauge TEXT`: reads `PROGRESS <sent> <total>` lines (as emitted by
/// [`GaugeProgress`]) from stdin and re-emits each as a `dialog --gauge`
/// status block labeled `TEXT`.
fn run_echo_gauge(text: &str) -> fel::Result<()> {
    let mut line = String::new();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while std::io::stdin().read_line(&mut line).unwrap_or(0) > 0 {
        if let Some((sent, total)) = parse_progress_line(line.trim()) {
            let percent = if total == 0 { 0 } else { (sent * 100 / total).min(100) };
            let _ = writeln!(out, "XXX\n{percent}\n{text}\nXXX");
            let _ = out.flush();
        }
        line.clear();
    }
    Ok(())
}

fn parse_progress_line(line: &str) -> Option<(usize, usize)> {
    let rest = line.strip_prefix("PROGRESS ")?;
    let mut parts = rest.split_whitespace();
    let sent = parts.next()?.parse().ok()?;
    let total = parts.next()?.parse().ok()?;
    Some((sent, total))
}
