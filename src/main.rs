// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// Stop-and-wait serial link protocol implementation
mod protocol;
mod serial;
mod timer;
mod frame;
mod scanner;
mod stats;
mod error;
mod link;
mod connection;
mod transfer;
mod packet;
mod sender;
mod receiver;

use clap::{Parser, Subcommand};
use serialport::{DataBits, Parity, StopBits};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use link::{ConnectionParameters, Session, DEFAULT_RETRIES};
use protocol::Role;
use serial::SerialFraming;

#[derive(Parser)]
#[command(name = "serlink")]
#[command(about = "Stop-and-wait data link protocol for RS-232 file transfer", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyS0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name="BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name="BITS")]
    stop_bits: u8,

    /// Transmissions of a frame before giving up
    #[arg(short, long, default_value_t = DEFAULT_RETRIES, value_name = "COUNT")]
    retries: u32,

    /// Seconds to wait for a reply before retransmitting
    #[arg(short, long, default_value = "4", value_name = "SECS")]
    timeout: u64,

    /// Print link statistics after the transfer
    #[arg(long)]
    stats: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file as the transmitter
    Send {
        /// File to send
        file: PathBuf,
    },
    /// Receive a file as the receiver
    Receive {
        /// Directory to save the received file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn parse_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(format!("Invalid data bits: {}. Must be 5, 6, 7, or 8", bits)),
    }
}

fn parse_parity(parity: &str) -> Result<Parity, String> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(format!("Invalid parity: {}. Must be 'none', 'odd', or 'even'", parity)),
    }
}

fn parse_stop_bits(bits: u8) -> Result<StopBits, String> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(format!("Invalid stop bits: {}. Must be 1 or 2", bits)),
    }
}

fn parse_framing(cli: &Cli) -> Result<SerialFraming, String> {
    Ok(SerialFraming {
        data_bits: parse_data_bits(cli.data_bits)?,
        parity: parse_parity(&cli.parity)?,
        stop_bits: parse_stop_bits(cli.stop_bits)?,
    })
}

fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let framing = match parse_framing(&cli) {
        Ok(framing) => framing,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if cli.timeout == 0 {
        eprintln!("Error: timeout must be at least one second");
        std::process::exit(1);
    }

    let role = match cli.command {
        Commands::Send { .. } => Role::Transmitter,
        Commands::Receive { .. } => Role::Receiver,
    };

    let params = ConnectionParameters::new(cli.port.clone(), cli.baud, role)
        .with_retries(cli.retries)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_framing(framing);

    info!("Settings: {} baud, {:?}, {:?}, {:?}", cli.baud, framing.data_bits, framing.parity, framing.stop_bits);

    let link = match Session::open(params) {
        Ok(link) => link,
        Err(e) => {
            eprintln!("Failed to open link: {}", e);
            std::process::exit(1);
        }
    };
    info!("Retries: {}, timeout: {:?}", link.params().max_retries, link.params().timeout);

    match cli.command {
        Commands::Send { file } => {
            info!("Sending file: {}", file.display());
            if let Err(e) = send_file(link, file, cli.stats) {
                eprintln!("Send failed: {}", e);
                std::process::exit(1);
            }
            info!("File sent successfully");
        }
        Commands::Receive { output_dir } => {
            info!("Receiving file to: {}", output_dir.display());
            if let Err(e) = receive_file(link, output_dir, cli.stats) {
                eprintln!("Receive failed: {}", e);
                std::process::exit(1);
            }
            info!("File received successfully");
        }
    }
}

fn send_file(link: Session, file: PathBuf, stats: bool) -> Result<(), sender::SenderError> {
    use sender::SenderFsm;

    let mut state = SenderFsm::new(link, &file, stats)?;

    loop {
        match state.step() {
            Ok(next_state) => {
                state = next_state;
            }
            Err(sender::SenderError::TransferComplete) => {
                return Ok(());
            }
            Err(e) => {
                return Err(e);
            }
        }
    }
}

fn receive_file(link: Session, output_dir: PathBuf, stats: bool) -> Result<(), receiver::ReceiverError> {
    use receiver::ReceiverFsm;

    if !output_dir.exists() {
        return Err(receiver::ReceiverError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Output directory not found: {}", output_dir.display()),
        )));
    }

    let mut state = ReceiverFsm::new(link, output_dir, stats);

    loop {
        match state.step() {
            Ok(next_state) => {
                state = next_state;
            }
            Err(receiver::ReceiverError::TransferComplete) => {
                return Ok(());
            }
            Err(e) => {
                return Err(e);
            }
        }
    }
}
