//! A behavioural model of a PIC16 target on the far end of the ICSP
//! lines, driven purely by the pin transitions the codec produces. Used
//! by the tests in this crate in place of real hardware.

use std::time::Duration;

use super::hardware::{
	Hardware,
	Line,
};

use super::low_level::cmd;

#[derive(Clone, Copy)]
enum Phase {
	/// Shifting in a 6-bit command.
	Command,
	/// Shifting in the 16-bit payload of a load command.
	Write { command: u8 },
	/// Shifting out a latched 16-bit response.
	Read { raw: u16 },
}

pub struct SimulatedPic {
	/// 14-bit program memory words.
	pub program: Vec<u16>,
	/// User ids (0-3), reserved words, device id (6), config word (7).
	pub config: [u16; 8],
	/// Data EEPROM bytes.
	pub data: Vec<u8>,
	/// Power-up cycles seen, for asserting on reset behaviour.
	pub power_cycles: u32,
	/// Payload of the last LOAD_CONFIG received.
	pub last_config_load: Option<u16>,

	vpp: bool,
	vdd: bool,
	clock: bool,
	host_data: bool,
	drive_data: bool,
	config_selected: bool,
	pc: u32,
	phase: Phase,
	shift: u32,
	nbits: u8,
}

impl SimulatedPic {
	pub fn new(program_words: usize, data_bytes: usize) -> Self {
		SimulatedPic {
			program: vec![0; program_words],
			config: [0; 8],
			data: vec![0; data_bytes],
			power_cycles: 0,
			last_config_load: None,
			vpp: false,
			vdd: false,
			clock: false,
			host_data: false,
			drive_data: false,
			config_selected: false,
			pc: 0,
			phase: Phase::Command,
			shift: 0,
			nbits: 0,
		}
	}

	pub fn powered(&self) -> bool {
		self.vpp && self.vdd
	}

	fn power_up(&mut self) {
		self.power_cycles += 1;
		self.pc = 0;
		self.config_selected = false;
		self.phase = Phase::Command;
		self.shift = 0;
		self.nbits = 0;
	}

	// Responses carry the value in bits 1..=14 between a start and a stop
	// bit; put junk on the framing positions so the driver has to mask.
	fn latch_response(&self, command: u8) -> u16 {
		match command {
			cmd::READ_DATA_MEMORY => {
				let value = self.data.get(self.pc as usize).copied().unwrap_or(0xFF);
				0x8000 | ((value as u16) << 1)
			}
			_ => {
				let value = if self.config_selected {
					self.config.get(self.pc as usize).copied().unwrap_or(0x3FFF)
				} else {
					self.program.get(self.pc as usize).copied().unwrap_or(0x3FFF)
				};
				0x8000 | ((value & 0x3FFF) << 1)
			}
		}
	}

	// Commands and payloads are latched on the falling clock edge, after
	// the data setup time.
	fn clock_fell(&mut self) {
		match self.phase {
			Phase::Command => {
				if self.host_data {
					self.shift |= 1 << self.nbits;
				}
				self.nbits += 1;
				if self.nbits < 6 {
					return;
				}
				let command = self.shift as u8;
				self.shift = 0;
				self.nbits = 0;
				match command {
					cmd::INCREMENT_ADDRESS => self.pc += 1,
					cmd::LOAD_CONFIG
					| cmd::LOAD_PROGRAM_MEMORY
					| cmd::LOAD_DATA_MEMORY => {
						self.phase = Phase::Write { command };
					}
					cmd::READ_PROGRAM_MEMORY | cmd::READ_DATA_MEMORY => {
						self.phase = Phase::Read { raw: self.latch_response(command) };
					}
					_ => (), // erase/program strobes have no payload to model
				}
			}
			Phase::Write { command } => {
				if self.host_data {
					self.shift |= 1 << self.nbits;
				}
				self.nbits += 1;
				if self.nbits < 16 {
					return;
				}
				let payload = self.shift as u16;
				if command == cmd::LOAD_CONFIG {
					// switches to configuration memory and rewinds
					self.config_selected = true;
					self.pc = 0;
					self.last_config_load = Some(payload);
				}
				self.phase = Phase::Command;
				self.shift = 0;
				self.nbits = 0;
			}
			Phase::Read { .. } => {
				self.nbits += 1;
				if self.nbits < 16 {
					return;
				}
				self.phase = Phase::Command;
				self.nbits = 0;
			}
		}
	}

	// While a response is shifting out, each rising edge presents the
	// next bit, least significant first.
	fn clock_rose(&mut self) {
		if let Phase::Read { raw } = self.phase {
			self.drive_data = 0 != raw >> self.nbits & 1;
		}
	}
}

impl Hardware for SimulatedPic {
	fn set_line(&mut self, line: Line, level: bool) {
		match line {
			Line::Mclr => {
				self.vpp = level;
				if !level {
					// reset: next power-up starts from scratch
					self.config_selected = false;
					self.pc = 0;
					self.phase = Phase::Command;
					self.shift = 0;
					self.nbits = 0;
				}
			}
			Line::Vdd => {
				let was = self.powered();
				self.vdd = level;
				if !was && self.powered() {
					self.power_up();
				}
			}
			Line::Data => {
				self.host_data = level;
			}
			Line::Clock => {
				if level == self.clock {
					return;
				}
				self.clock = level;
				if !self.powered() {
					return;
				}
				if level {
					self.clock_rose();
				} else {
					self.clock_fell();
				}
			}
			Line::Activity => (),
		}
	}

	fn set_output(&mut self, _line: Line) {
	}

	fn set_input(&mut self, _line: Line) {
	}

	fn read_line(&mut self, line: Line) -> bool {
		match line {
			Line::Data => self.drive_data,
			_ => false,
		}
	}

	// the model reacts to edges, not to time
	fn delay(&mut self, _duration: Duration) {
	}
}
