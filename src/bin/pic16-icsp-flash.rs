#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate pic16_icsp_flash;
use pic16_icsp_flash::*;

use std::net::TcpListener;
use std::process::exit;

use pic16_icsp_flash::gpio::{
	DEFAULT_PINS,
	GpioHardware,
	PinMap,
};
use pic16_icsp_flash::icsp::Programmer;

const DEFAULT_LISTEN: &str = "0.0.0.0:8552";

fn pin_arg(matches: &clap::ArgMatches, name: &str, default: u8) -> AResult<u8> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => return Ok(default),
	};
	param.parse::<u8>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid GPIO number for --{}: {}", name, e);
		e.context(msg).into()
	})
}

fn pin_map(matches: &clap::ArgMatches) -> AResult<PinMap> {
	Ok(PinMap {
		mclr: pin_arg(matches, "mclr", DEFAULT_PINS.mclr)?,
		vdd: pin_arg(matches, "vdd", DEFAULT_PINS.vdd)?,
		data: pin_arg(matches, "data", DEFAULT_PINS.data)?,
		clock: pin_arg(matches, "clock", DEFAULT_PINS.clock)?,
		activity: pin_arg(matches, "activity", DEFAULT_PINS.activity)?,
	})
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@arg listen: -l --listen +takes_value "TCP address to listen on (default 0.0.0.0:8552)")
		(@arg mclr: --mclr +takes_value "GPIO driving MCLR/Vpp (default 22)")
		(@arg vdd: --vdd +takes_value "GPIO driving VDD (default 23)")
		(@arg data: --data +takes_value "GPIO wired to ICSPDAT (default 24)")
		(@arg clock: --clock +takes_value "GPIO wired to ICSPCLK (default 25)")
		(@arg activity: --activity +takes_value "GPIO driving the activity LED (default 27)")
	).get_matches();

	let pins = pin_map(&matches)?;
	let listen = matches.value_of("listen").unwrap_or(DEFAULT_LISTEN);

	let hw = GpioHardware::open(pins)?;
	let programmer = Programmer::new(hw);

	let listener = match TcpListener::bind(listen) {
		Ok(l) => l,
		Err(e) => bail!("couldn't listen on {}: {}", listen, e),
	};
	info!("listening on {}", listen);

	sp::serve(listener, programmer)
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
