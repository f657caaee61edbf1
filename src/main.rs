#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use indicatif::{ProgressBar, ProgressStyle};

use sensorimotor_loader::device::DEFAULT_DEVICE;
use sensorimotor_loader::firmware::{self, OBJCOPY};
use sensorimotor_loader::linux::DEFAULT_BAUD;
use sensorimotor_loader::{BoardId, DeviceProfile, Error, Options, Programmer};

type Loader = Programmer<linux_embedded_hal::Serial, linux_embedded_hal::Delay, std::io::ErrorKind>;

#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    /// Serial port to connect to
    #[structopt(long, short, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial port baud rate
    #[structopt(long, default_value = "1000000")]
    baud: usize,

    #[structopt(flatten)]
    options: Options,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,

    #[structopt(subcommand)]
    command: Operation,
}

#[derive(Clone, Debug, StructOpt)]
pub enum Operation {
    /// Start the bootloader and verify the device signature
    Verify {
        /// Board id, 0..127 (127 if no id is set yet)
        #[structopt(long, short)]
        board: BoardId,

        /// Device type
        #[structopt(long, short, default_value = DEFAULT_DEVICE)]
        device: DeviceProfile,
    },
    /// Flash a firmware binary (or ELF, converted with avr-objcopy)
    Flash {
        /// Board id, 0..127 (127 if no id is set yet)
        #[structopt(long, short)]
        board: BoardId,

        /// Device type
        #[structopt(long, short, default_value = DEFAULT_DEVICE)]
        device: DeviceProfile,

        /// objcopy used to convert ELF files
        #[structopt(long, default_value = OBJCOPY)]
        objcopy: String,

        /// Firmware file
        file: String,
    },
    /// Start the bootloader then reset the device
    Reset {
        #[structopt(long, short)]
        board: BoardId,
    },
    /// Check whether a board responds
    Ping {
        #[structopt(long, short)]
        board: BoardId,
    },
    /// Search the bus for connected boards
    Discover,
    /// Assign a new id to a board
    SetId {
        #[structopt(long, short)]
        board: BoardId,

        /// New board id
        new_id: BoardId,
    },
}

fn main() {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger
    let _ = SimpleLogger::init(o.log_level, Config::default());

    if o.baud != DEFAULT_BAUD {
        warn!("Using non-default baud rate {}", o.baud);
    }

    info!("Connecting to serial port {}", o.port);

    let mut p = match Programmer::linux(&o.port, o.baud, o.options.clone()) {
        Ok(p) => p,
        Err(e) => {
            error!("Error connecting to serial port: {:?}", e);
            std::process::exit(3);
        }
    };

    if let Err(e) = run(&mut p, o.command) {
        error!("{}", e);
        std::process::exit(if e.is_precondition() { 3 } else { 1 });
    }

    info!("Done.");
}

fn run(p: &mut Loader, op: Operation) -> Result<(), Error<std::io::ErrorKind>> {
    match op {
        Operation::Verify { board, device } => {
            p.start_bootloader(board)?;
            p.verify_signature(board, &device)?;
            info!("Signature OK ({})", hex::encode(device.signature));
        }
        Operation::Flash {
            board,
            device,
            objcopy,
            file,
        } => {
            let file = firmware::convert_elf(&file, &objcopy).map_err(Error::Precondition)?;
            let image = firmware::load(&file).map_err(Error::Precondition)?;

            info!(
                "Flashing {} ({}) to board {}",
                file.display(),
                bytefmt::format(image.len() as u64),
                board
            );

            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes}")
                    .progress_chars("/ "),
            );

            let r = p.update(board, &device, &image, |written, total| {
                bar.set_length(total as u64);
                bar.set_position(written as u64);
            });

            match &r {
                Ok(_) => bar.finish(),
                Err(_) => bar.abandon(),
            }
            r?;
        }
        Operation::Reset { board } => {
            p.start_bootloader(board)?;
            p.reset(board)?;
        }
        Operation::Ping { board } => {
            if p.ping(board)? {
                info!("Board {} responded", board);
            } else {
                warn!("No response from board {}", board);
            }
        }
        Operation::Discover => {
            info!("Searching for connected boards...");

            let bar = ProgressBar::new(BoardId::all().count() as u64);
            let boards = p.discover(|board, present| {
                if present {
                    bar.println(format!("Board {} responded", board));
                }
                bar.inc(1);
            })?;
            bar.finish_and_clear();

            let ids: Vec<_> = boards.iter().map(|b| b.to_string()).collect();
            info!("{} boards detected: [{}]", boards.len(), ids.join(", "));
        }
        Operation::SetId { board, new_id } => {
            info!("Sending ping to board {}", board);

            if !p.ping(board)? {
                warn!("No response from board {}", board);
                return Err(Error::ResponseTimeout);
            }

            p.set_id(board, new_id)?;
            info!("Board id changed from {} to {}", board, new_id);
        }
    }

    Ok(())
}
