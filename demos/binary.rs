use simple_logger::SimpleLogger;
use zstage::{binary::command::RENUMBER, dispatch::Dispatcher, stage::Stage};

fn main() -> Result<(), Box<dyn std::error::Error>> {
	// Enable logging
	SimpleLogger::new().init().unwrap();

	let port_path = "/dev/ttyUSB0";
	let device = 1;

	// Open the port and number the devices on the chain
	let mut dispatcher = Dispatcher::open_serial(port_path)?;
	dispatcher.clear()?;
	dispatcher.execute_command(0, RENUMBER, 0, std::time::Duration::ZERO)?;

	let mut stage = Stage::new(dispatcher, device, 1)?;
	stage.initialize()?;

	// Home, then move towards the end of travel.
	stage.set_home_timeout(std::time::Duration::from_secs(30));
	stage.home()?;
	let (min, max) = stage.limits_um()?;
	println!("travel: {min} to {max} um");

	stage.set_speed_mm_per_s(5.0)?;
	stage.set_position_um(max / 2.0)?;
	println!("{} um", stage.position_um()?);

	stage.set_relative_position_um(-1000.0)?;
	println!("{} um", stage.position_um()?);
	Ok(())
}
