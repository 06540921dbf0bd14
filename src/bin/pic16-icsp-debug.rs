#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate pic16_icsp_flash;
use pic16_icsp_flash::*;

use std::process::exit;

use pic16_icsp_flash::gpio::{
	DEFAULT_PINS,
	GpioHardware,
	PinMap,
};
use pic16_icsp_flash::icsp::{
	Detection,
	Programmer,
};

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

fn addr_param(matches: &clap::ArgMatches, name: &str) -> AResult<u32> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	let digits = param.trim_start_matches("0x");
	match u32::from_str_radix(digits, 16) {
		Ok(v) => Ok(v),
		Err(e) => bail!("invalid hex address {:?}: {}", param, e),
	}
}

fn open_programmer(matches: &clap::ArgMatches) -> AResult<Programmer<GpioHardware>> {
	let pins = PinMap {
		mclr: pin_arg(matches, "mclr", DEFAULT_PINS.mclr)?,
		vdd: pin_arg(matches, "vdd", DEFAULT_PINS.vdd)?,
		data: pin_arg(matches, "data", DEFAULT_PINS.data)?,
		clock: pin_arg(matches, "clock", DEFAULT_PINS.clock)?,
		activity: pin_arg(matches, "activity", DEFAULT_PINS.activity)?,
	};
	let hw = GpioHardware::open(pins)?;
	Ok(Programmer::new(hw))
}

fn detect(programmer: &mut Programmer<GpioHardware>) -> AResult<()> {
	match programmer.detect_device() {
		Detection::Device { info, device_id, config_word } => {
			println!("{} (id {:04x}, config {:04x})", info.name, device_id, config_word);
			Ok(())
		}
		Detection::Unknown { device_id, config_word } => {
			bail!("device answered (id {:04x}, config {:04x}) but isn't in the built-in table", device_id, config_word)
		}
		Detection::Absent => {
			bail!("no device detected: empty socket, missing Vpp, or code protection")
		}
	}
}

fn read_range(sub_m: &clap::ArgMatches, programmer: &mut Programmer<GpioHardware>) -> AResult<()> {
	let start = addr_param(sub_m, "START")?;
	let end = addr_param(sub_m, "END")?;
	ensure!(start <= end, "end address {:04x} before start address {:04x}", end, start);

	for addr in start..=end {
		println!("@{:04x}: {:04x}", addr, programmer.read_word(addr));
	}
	programmer.exit_program_mode();

	Ok(())
}

fn dump_config(programmer: &mut Programmer<GpioHardware>) -> AResult<()> {
	let names = [
		"UserID0", "UserID1", "UserID2", "UserID3",
		"Reserved4", "Reserved5", "DeviceID", "ConfigWord",
	];
	// relative config addressing works without knowing the part
	for (offset, name) in names.iter().enumerate() {
		println!("{}: {:04x}", name, programmer.read_config_word(offset as u32));
	}
	programmer.exit_program_mode();

	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg mclr: --mclr +takes_value "GPIO driving MCLR/Vpp (default 22)")
		(@arg vdd: --vdd +takes_value "GPIO driving VDD (default 23)")
		(@arg data: --data +takes_value "GPIO wired to ICSPDAT (default 24)")
		(@arg clock: --clock +takes_value "GPIO wired to ICSPCLK (default 25)")
		(@arg activity: --activity +takes_value "GPIO driving the activity LED (default 27)")
		(@subcommand detect =>
			(about: "power the target up and identify it")
		)
		(@subcommand read =>
			(about: "dump a flat word range as hex")
			(@arg START: +required "first word address (hex)")
			(@arg END: +required "last word address (hex, inclusive)")
		)
		(@subcommand config =>
			(about: "dump the user id, device id and configuration words")
		)
	).get_matches();

	let mut programmer = open_programmer(&matches)?;

	match matches.subcommand() {
		("detect", _) => {
			detect(&mut programmer)
		}
		("read", Some(sub_m)) => {
			read_range(sub_m, &mut programmer)
		}
		("config", _) => {
			dump_config(&mut programmer)
		}
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
