use std::process;

use clap::Parser;

use fstk_stitch::command_line::*;
use fstk_stitch::{inspect, osimage, StitchJob};

fn main() {
    // Usage errors are bad arguments like any other
    let args = Args::try_parse().unwrap_or_else(|e| {
        if e.use_stderr() {
            let _ = e.print();
            process::exit(1);
        }
        e.exit()
    });

    if let Err(e) = stderrlog::new()
        .verbosity(args.verbose as usize + 1)
        .init()
    {
        eprintln!("Cannot initialize logging: {e}");
    }

    let result = match &args.command {
        Command::Stitch(a) => StitchJob::from_args(a)
            .and_then(|job| job.run())
            .map(|_| ())
            .map_err(|e| {
                log::error!("Cannot stitch images: {e}");
                e.exit_code()
            }),
        Command::Inspect(a) => inspect::inspect(a).map_err(|e| {
            log::error!("Cannot inspect image: {e:#}");
            1
        }),
        Command::Osimage(a) => osimage::osimage(a).map_err(|e| {
            log::error!("Cannot build OS image: {e:#}");
            1
        }),
    };

    if let Err(code) = result {
        process::exit(code);
    }
}
