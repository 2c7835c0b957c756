//! Interactive IBM4 multimeter console.
//!
//! Pass a port path to connect directly, or pass nothing and let discovery
//! probe every enumerated serial port for an IBM4.

use std::env;

use ibm4_serial::channel::Mode;
use ibm4_serial::console;
use ibm4_serial::port::{self, SerialSettings};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = SerialSettings::default();
    let (path, mut session) = match env::args().nth(1) {
        Some(path) => {
            let session = port::connect_to(&path, &settings, Mode::Dc)?;
            (path, session)
        }
        None => {
            println!("No port given, probing for an IBM4...");
            port::connect(&settings, Mode::Dc)?
        }
    };

    match session.identify() {
        Ok(identity) => println!("Connected to {identity} on {path}"),
        Err(err) => println!("Connected on {path}, identity unavailable: {err}"),
    }

    console::run(&mut session)?;
    session.close()?;
    Ok(())
}
