use simple_logger::SimpleLogger;
use zstage::{ascii::Ascii, dispatch::OpenSerialOptions, stage::Stage};

fn main() -> Result<(), Box<dyn std::error::Error>> {
	// Enable logging
	SimpleLogger::new().init().unwrap();

	let port_path = "/dev/ttyUSB0";

	let dispatcher = OpenSerialOptions::new().open_with(port_path, Ascii::with_checksums())?;
	let mut stage = Stage::new(dispatcher, 1, 1)?;
	stage.initialize()?;

	println!("device id: {}", stage.dispatcher_mut().identify(1)?);
	stage.home()?;

	// ASCII devices reply as soon as a move starts.
	stage.move_velocity(2.0)?;
	std::thread::sleep(std::time::Duration::from_secs(1));
	stage.stop()?;

	// Make this spot the device's zero and report positions from 250 um on.
	stage.set_origin()?;
	stage.set_adapter_origin_um(250.0);
	println!("{} um", stage.position_um()?);
	Ok(())
}
