//! Production hardware link: the five ICSP lines on memory-mapped GPIOs.

mod mem;

pub use self::mem::{
	GpioMem,
	PIN_COUNT,
	open_gpiomem,
};

use crate::icsp::{
	Hardware,
	Line,
};

/// Default wiring on the 40-pin header.
pub const DEFAULT_PINS: PinMap = PinMap {
	mclr: 22,
	vdd: 23,
	data: 24,
	clock: 25,
	activity: 27,
};

/// Which GPIO drives which ICSP line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PinMap {
	pub mclr: u8,
	pub vdd: u8,
	pub data: u8,
	pub clock: u8,
	pub activity: u8,
}

impl PinMap {
	fn pin(&self, line: Line) -> u8 {
		match line {
			Line::Mclr => self.mclr,
			Line::Vdd => self.vdd,
			Line::Data => self.data,
			Line::Clock => self.clock,
			Line::Activity => self.activity,
		}
	}

	fn check(&self) -> crate::AResult<()> {
		let all = [self.mclr, self.vdd, self.data, self.clock, self.activity];
		for (i, pin) in all.iter().enumerate() {
			ensure!(*pin < PIN_COUNT, "GPIO {} out of range", pin);
			for other in &all[i + 1..] {
				ensure!(pin != other, "GPIO {} assigned to two lines", pin);
			}
		}
		Ok(())
	}
}

pub struct GpioHardware {
	mem: GpioMem,
	pins: PinMap,
}

impl GpioHardware {
	pub fn open(pins: PinMap) -> crate::AResult<GpioHardware> {
		pins.check()?;
		let mut mem = with_context!("opening /dev/gpiomem", {
			Ok(open_gpiomem()?)
		})?;
		// MCLR, VDD and the indicator are always driven; DATA and CLOCK
		// float until a programming session starts
		mem.set_level(pins.mclr, false);
		mem.set_level(pins.vdd, false);
		mem.set_level(pins.activity, false);
		mem.set_output(pins.mclr);
		mem.set_output(pins.vdd);
		mem.set_output(pins.activity);
		mem.set_input(pins.data);
		mem.set_input(pins.clock);
		Ok(GpioHardware { mem, pins })
	}
}

impl Hardware for GpioHardware {
	fn set_line(&mut self, line: Line, level: bool) {
		self.mem.set_level(self.pins.pin(line), level);
	}

	fn set_output(&mut self, line: Line) {
		self.mem.set_output(self.pins.pin(line));
	}

	fn set_input(&mut self, line: Line) {
		self.mem.set_input(self.pins.pin(line));
	}

	fn read_line(&mut self, line: Line) -> bool {
		self.mem.level(self.pins.pin(line))
	}
}
