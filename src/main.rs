use anyhow::Context;
use clap::{Parser, Subcommand};
use p1_rs::logging::{init_logger_with_verbosity, log_error, log_warn};
use p1_rs::p1::crc;
use p1_rs::util::hex::format_crc;
use p1_rs::{log_info, P1Error, ParserSession, SessionConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "p1-cli")]
#[command(about = "CLI tool for reading P1 and D0 smart-meter telegrams")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read telegrams from a serial device or a capture file
    Read {
        device: String,
        /// Use the optical IEC 62056-21 interface
        #[arg(long)]
        d0: bool,
        /// Number of telegrams to read, 0 reads forever
        #[arg(short, long, default_value = "1")]
        count: u32,
        /// Inter-character timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
        /// Telegram buffer size in bytes
        #[arg(short, long, default_value = "4096")]
        buffer: usize,
        /// Append telegrams with parse errors to this file
        #[arg(long)]
        dump: Option<PathBuf>,
        /// Print telegrams as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify the CRC of a telegram stored in a file
    Crc { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger_with_verbosity(cli.verbose);

    match cli.command {
        Commands::Read {
            device,
            d0,
            count,
            timeout,
            buffer,
            dump,
            json,
        } => {
            let config = SessionConfig {
                buffer_capacity: buffer,
                timeout: Duration::from_secs(timeout),
                dump_path: dump,
                ..SessionConfig::default()
            };
            let mut session = if d0 {
                ParserSession::open_d0(&device, config).await
            } else {
                ParserSession::open(&device, config).await
            }
            .with_context(|| format!("opening {device}"))?;

            read_telegrams(&mut session, count, json).await?;
            session.close().context("closing session")?;
        }
        Commands::Crc { file } => {
            let telegram = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            match crc::embedded_crc(&telegram) {
                Some(embedded) => {
                    let computed = crc::compute(&telegram);
                    println!(
                        "computed {} embedded {} {}",
                        format_crc(computed),
                        format_crc(embedded),
                        if computed == embedded { "OK" } else { "MISMATCH" }
                    );
                }
                None => println!("no CRC in telegram"),
            }
        }
    }

    Ok(())
}

async fn read_telegrams(session: &mut ParserSession, count: u32, json: bool) -> anyhow::Result<()> {
    let mut read = 0u32;

    while count == 0 || read < count {
        match session.read().await {
            Ok(0) => {
                log_warn("No telegram received");
                if !session.is_terminal() {
                    // A file is exhausted for good
                    break;
                }
                continue;
            }
            Ok(_) => {}
            Err(e @ P1Error::CrcMismatch { .. }) => {
                log_error(&e.to_string());
            }
            Err(e) if e.is_recoverable() => {
                log_error(&format!("{e} (code {})", e.code()));
                read += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        read += 1;

        log_info(&format!(
            "Telegram of {} bytes, mode {}, {:?} with {} errors",
            session.len(),
            session.mode().map(|mode| mode.letter()).unwrap_or('-'),
            session.outcome().status,
            session.outcome().errors
        ));

        let Some(telegram) = session.parsed() else {
            continue;
        };
        if json {
            println!("{}", serde_json::to_string_pretty(telegram)?);
        } else {
            for record in &telegram.records {
                let values: Vec<&str> = record.values.iter().map(|v| v.raw.as_str()).collect();
                println!("{:<16} {}", record.id, values.join(" "));
            }
            println!();
        }
    }

    Ok(())
}
