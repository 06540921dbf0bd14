use crate::devices::{
	self,
	DeviceInfo,
	DeviceProfile,
};

use super::hardware::{
	Hardware,
	Line,
};

use super::low_level::{
	BitLevel,
	MCLR_RESET,
	MCLR_VPP,
	cmd,
	timing,
};

// Relative locations of the id words in configuration memory.
const DEV_USERID0: u32 = 0;
const DEV_USERID1: u32 = 1;
const DEV_USERID2: u32 = 2;
const DEV_USERID3: u32 = 3;
const DEV_ID: u32 = 6;
const DEV_CONFIG_WORD: u32 = 7;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	/// Powered down, DATA and CLOCK floating.
	Idle,
	/// Programming mode, counter in program (or data) memory.
	Program,
	/// Programming mode after LOAD_CONFIG, counter in config memory.
	Config,
}

/// Outcome of [`Programmer::detect_device`].
#[derive(Clone, Copy, Debug)]
pub enum Detection {
	/// A part from the built-in table; its profile is now active.
	Device {
		info: &'static DeviceInfo,
		device_id: u16,
		config_word: u16,
	},
	/// Something answered, but no table entry matches. The id is 0 for
	/// old silicon without an id register. Profile reset to the default.
	Unknown {
		device_id: u16,
		config_word: u16,
	},
	/// Nothing answered: empty socket, missing Vpp, or code protection.
	Absent,
}

/// Driver for one target device, owning the hardware link and the whole
/// session: the active [`DeviceProfile`] and the mirror of the target's
/// program counter.
///
/// The target's counter only moves forward; it is reset to 0 by a
/// power-down/power-up cycle or by LOAD_CONFIG (which also switches to
/// configuration memory). All addressing below works by replaying enough
/// of those primitives to get the counter onto the requested word.
pub struct Programmer<H: Hardware> {
	hw: H,
	state: State,
	counter: u32,
	profile: DeviceProfile,
}

impl<H: Hardware> Programmer<H> {
	pub fn new(hw: H) -> Self {
		Programmer {
			hw,
			state: State::Idle,
			counter: 0,
			profile: DeviceProfile::default(),
		}
	}

	pub fn profile(&self) -> &DeviceProfile {
		&self.profile
	}

	pub fn is_idle(&self) -> bool {
		self.state == State::Idle
	}

	/// Power the target up into high-voltage programming mode. No-op if
	/// a session is already open.
	pub fn enter_program_mode(&mut self) {
		if self.state != State::Idle {
			return;
		}
		// all lines down first: powered-off reset, whatever came before
		self.hw.set_line(Line::Mclr, MCLR_RESET);
		self.hw.set_line(Line::Vdd, false);
		self.hw.set_line(Line::Data, false);
		self.hw.set_line(Line::Clock, false);
		self.hw.delay(timing::SETTLE);
		self.hw.set_output(Line::Data);
		self.hw.set_output(Line::Clock);
		// Vpp before VDD selects programming mode on every part
		self.hw.set_line(Line::Mclr, MCLR_VPP);
		self.hw.delay(timing::TPPDP);
		self.hw.set_line(Line::Vdd, true);
		self.hw.delay(timing::THLD0);
		self.state = State::Program;
		self.counter = 0;
	}

	/// Power the target down and float the shared lines. No-op if idle.
	pub fn exit_program_mode(&mut self) {
		if self.state == State::Idle {
			return;
		}
		self.hw.set_line(Line::Mclr, MCLR_RESET);
		self.hw.set_line(Line::Vdd, false);
		self.hw.set_line(Line::Data, false);
		self.hw.set_line(Line::Clock, false);
		self.hw.set_input(Line::Data);
		self.hw.set_input(Line::Clock);
		self.state = State::Idle;
		self.counter = 0;
	}

	fn reset(&mut self) {
		self.exit_program_mode();
		self.enter_program_mode();
	}

	// LOAD_CONFIG moves the counter to the base of configuration memory,
	// whatever region it was in before.
	fn load_config(&mut self, word: u16) {
		self.hw.send_write_command(cmd::LOAD_CONFIG, word);
		self.state = State::Config;
		self.counter = 0;
	}

	// Forward-only movement within the selected region.
	fn advance_to(&mut self, offset: u32) {
		while self.counter < offset {
			self.hw.send_simple_command(cmd::INCREMENT_ADDRESS);
			self.counter += 1;
		}
	}

	/// Position the target's counter on a flat address. Data, then
	/// config bounds of the active profile are checked; everything else
	/// is program memory. Moving backwards (or into a different region)
	/// costs a full power cycle.
	pub fn set_program_counter(&mut self, addr: u32) {
		let profile = self.profile;
		if profile.contains_data(addr) {
			// data memory shares the program-mode counter; the region is
			// picked by the read/write opcode, not by a mode switch
			let offset = addr - profile.data_start;
			if self.state != State::Program || offset < self.counter {
				self.reset();
			}
			self.advance_to(offset);
		} else if profile.contains_config(addr) {
			self.set_config_counter(addr - profile.config_start);
		} else {
			if self.state != State::Program || addr < self.counter {
				self.reset();
			}
			self.advance_to(addr);
		}
	}

	/// Position the counter on a word of configuration memory by region
	/// offset. Usable before the geometry of the part is known, which is
	/// how detection bootstraps itself.
	pub fn set_config_counter(&mut self, offset: u32) {
		match self.state {
			State::Idle => {
				self.enter_program_mode();
				self.load_config(0);
			}
			State::Program => {
				self.load_config(0);
			}
			State::Config => {
				if offset < self.counter {
					// backwards within config memory: power cycle first
					self.reset();
					self.load_config(0);
				}
			}
		}
		self.advance_to(offset);
	}

	/// Prepare for a whole-chip erase: loading 0x3FFF into config word 0
	/// selects the erase entry point on the parts that support it.
	pub fn set_erase_program_counter(&mut self) {
		// power cycle so the state is known exactly
		self.reset();
		self.load_config(0x3FFF);
	}

	/// Read one word at a flat address. Data memory yields 8 bits,
	/// everything else 14; the start and stop framing bits are stripped.
	pub fn read_word(&mut self, addr: u32) -> u16 {
		self.set_program_counter(addr);
		if self.profile.contains_data(addr) {
			(self.hw.send_read_command(cmd::READ_DATA_MEMORY) >> 1) & 0x00FF
		} else {
			(self.hw.send_read_command(cmd::READ_PROGRAM_MEMORY) >> 1) & 0x3FFF
		}
	}

	/// Read a configuration word by region offset (relative addressing,
	/// see [`set_config_counter`](Self::set_config_counter)).
	pub fn read_config_word(&mut self, offset: u32) -> u16 {
		self.set_config_counter(offset);
		(self.hw.send_read_command(cmd::READ_PROGRAM_MEMORY) >> 1) & 0x3FFF
	}

	/// Identify the part in the socket and load its profile.
	///
	/// The target is powered down before and after; on anything but a
	/// table match the session falls back to the default profile.
	pub fn detect_device(&mut self) -> Detection {
		// start the probe from a known state
		self.exit_program_mode();

		let userid0 = self.read_config_word(DEV_USERID0);
		let userid1 = self.read_config_word(DEV_USERID1);
		let userid2 = self.read_config_word(DEV_USERID2);
		let userid3 = self.read_config_word(DEV_USERID3);
		let mut device_id = self.read_config_word(DEV_ID);
		let config_word = self.read_config_word(DEV_CONFIG_WORD);

		if device_id == 0x0000 || device_id == 0x3FFF {
			// An all-zeroes or all-ones id means one of: no part in the
			// socket, no programming voltage, code protection, or an old
			// part without an id register. Only the last one leaves any
			// non-zero word behind, so probe for one.
			let mut word = userid0 | userid1 | userid2 | userid3 | config_word;
			let mut addr = 0;
			while word == 0 && addr < 16 {
				word |= self.read_word(addr);
				addr += 1;
			}
			if word == 0 {
				self.exit_program_mode();
				return Detection::Absent;
			}
			device_id = 0;
		}
		debug!("device id {:04x}, config word {:04x}", device_id, config_word);

		let detection = match devices::find_by_id(device_id) {
			Some(info) => {
				self.load_profile(info);
				Detection::Device { info, device_id, config_word }
			}
			None => {
				// Unknown part: keep the conservative default geometry
				// until the operator picks one explicitly.
				self.profile = DeviceProfile::default();
				Detection::Unknown { device_id, config_word }
			}
		};
		self.exit_program_mode();
		detection
	}

	fn load_profile(&mut self, info: &'static DeviceInfo) {
		let profile = DeviceProfile::from_info(info);
		info!("DeviceName: {}", info.name);
		info!("ProgramRange: 0000-{:04X}", profile.program_end);
		info!("ConfigRange: {:04X}-{:04X}", profile.config_start, profile.config_end);
		info!("ConfigSave: {:02X}", profile.config_save);
		info!("DataRange: {:04X}-{:04X}", profile.data_start, profile.data_end);
		if profile.reserved_start <= profile.reserved_end {
			info!("ReservedRange: {:04X}-{:04X}", profile.reserved_start, profile.reserved_end);
		}
		self.profile = profile;
	}

	/// Drive the activity indicator. Purely cosmetic.
	pub fn set_activity(&mut self, on: bool) {
		self.hw.set_line(Line::Activity, on);
	}
}

#[cfg(test)]
mod test {
	use crate::devices::DeviceProfile;
	use crate::icsp::sim::SimulatedPic;

	use super::{
		Detection,
		Programmer,
	};

	fn pic16f628a() -> SimulatedPic {
		let mut sim = SimulatedPic::new(2048, 128);
		for addr in 0..2048u32 {
			sim.program[addr as usize] = ((addr * 7 + 1) & 0x3FFF) as u16;
		}
		for addr in 0..128u32 {
			sim.data[addr as usize] = (addr * 3 + 5) as u8;
		}
		sim.config = [0x1234, 0x2345, 0x0056, 0x3400, 0x3FFF, 0x3FFF, 0x1066, 0x2F4A];
		sim
	}

	fn detect(sim: SimulatedPic) -> (Programmer<SimulatedPic>, Detection) {
		let mut programmer = Programmer::new(sim);
		let detection = programmer.detect_device();
		(programmer, detection)
	}

	#[test]
	fn detect_known_device() {
		let (programmer, detection) = detect(pic16f628a());
		match detection {
			Detection::Device { info, device_id, config_word } => {
				assert_eq!(info.name, "pic16f628a");
				assert_eq!(device_id, 0x1066);
				assert_eq!(config_word, 0x2F4A);
			}
			other => panic!("expected a table match, got {:?}", other),
		}
		assert_eq!(programmer.profile().name, Some("pic16f628a"));
		assert_eq!(programmer.profile().program_end, 0x07FF);
		// cleanup invariant: powered down afterwards
		assert!(programmer.is_idle());
		assert!(!programmer.hw.powered());
	}

	#[test]
	fn detect_empty_socket() {
		// id, user ids, config word and the first 16 program words all
		// read as zero: nothing is answering
		let (programmer, detection) = detect(SimulatedPic::new(2048, 128));
		match detection {
			Detection::Absent => (),
			other => panic!("expected nothing, got {:?}", other),
		}
		assert_eq!(*programmer.profile(), DeviceProfile::default());
		assert!(programmer.is_idle());
	}

	#[test]
	fn detect_legacy_device() {
		// erased id register, but a user id word is programmed: an old
		// part is present that the table cannot name
		let mut sim = SimulatedPic::new(1024, 64);
		sim.config[1] = 0x0042;
		let (programmer, detection) = detect(sim);
		match detection {
			Detection::Unknown { device_id, .. } => assert_eq!(device_id, 0),
			other => panic!("expected an unknown part, got {:?}", other),
		}
		assert_eq!(*programmer.profile(), DeviceProfile::default());
		assert!(programmer.is_idle());
	}

	#[test]
	fn detect_id_missing_from_table() {
		let mut sim = pic16f628a();
		sim.config[6] = 0x1FE3; // valid-looking id, not a known pattern
		let (programmer, detection) = detect(sim);
		match detection {
			Detection::Unknown { device_id, .. } => assert_eq!(device_id, 0x1FE3),
			other => panic!("expected an unknown part, got {:?}", other),
		}
		assert_eq!(*programmer.profile(), DeviceProfile::default());
	}

	#[test]
	fn detection_is_deterministic() {
		let (_, first) = detect(pic16f628a());
		let (_, second) = detect(pic16f628a());
		match (first, second) {
			(
				Detection::Device { info: a, device_id: ida, config_word: cwa },
				Detection::Device { info: b, device_id: idb, config_word: cwb },
			) => {
				assert_eq!(a.name, b.name);
				assert_eq!(ida, idb);
				assert_eq!(cwa, cwb);
			}
			other => panic!("detections disagree: {:?}", other),
		}
	}

	#[test]
	fn forward_reads_share_one_power_cycle() {
		let mut programmer = Programmer::new(pic16f628a());
		assert_eq!(programmer.read_word(0x0005), (5 * 7 + 1) & 0x3FFF);
		assert_eq!(programmer.hw.power_cycles, 1);
		assert_eq!(programmer.read_word(0x0010), (0x10 * 7 + 1) & 0x3FFF);
		assert_eq!(programmer.hw.power_cycles, 1);
	}

	#[test]
	fn backward_read_costs_one_reset() {
		let mut programmer = Programmer::new(pic16f628a());
		assert_eq!(programmer.read_word(0x0010), (0x10 * 7 + 1) & 0x3FFF);
		assert_eq!(programmer.hw.power_cycles, 1);
		assert_eq!(programmer.read_word(0x0005), (5 * 7 + 1) & 0x3FFF);
		assert_eq!(programmer.hw.power_cycles, 2);
	}

	#[test]
	fn repeated_read_is_stable() {
		let mut programmer = Programmer::new(pic16f628a());
		let first = programmer.read_word(0x0123);
		let second = programmer.read_word(0x0123);
		assert_eq!(first, second);
		assert_eq!(programmer.hw.power_cycles, 1);
	}

	#[test]
	fn data_memory_read_strips_framing() {
		let mut programmer = Programmer::new(pic16f628a());
		assert_eq!(programmer.read_word(0x2100), 5);
		assert_eq!(programmer.read_word(0x2103), 3 * 3 + 5);
	}

	#[test]
	fn config_memory_read_via_flat_address() {
		let mut programmer = Programmer::new(pic16f628a());
		assert_eq!(programmer.read_word(0x2006), 0x1066);
		assert_eq!(programmer.read_word(0x2000), 0x1234);
		// going back within config memory forced a power cycle
		assert_eq!(programmer.hw.power_cycles, 2);
	}

	#[test]
	fn config_switch_needs_no_power_cycle() {
		let mut programmer = Programmer::new(pic16f628a());
		assert_eq!(programmer.read_word(0x0003), (3 * 7 + 1) & 0x3FFF);
		// LOAD_CONFIG is itself the mode switch
		assert_eq!(programmer.read_word(0x2007), 0x2F4A);
		assert_eq!(programmer.hw.power_cycles, 1);
		// but leaving config memory again needs a power cycle
		assert_eq!(programmer.read_word(0x0000), 1);
		assert_eq!(programmer.hw.power_cycles, 2);
	}

	#[test]
	fn data_then_program_shares_counter() {
		// data memory borrows the program-mode counter: data offset 1 to
		// program address 5 is forward movement, no power cycle
		let mut programmer = Programmer::new(pic16f628a());
		assert_eq!(programmer.read_word(0x2101), 8);
		assert_eq!(programmer.read_word(0x0005), (5 * 7 + 1) & 0x3FFF);
		assert_eq!(programmer.hw.power_cycles, 1);
	}

	#[test]
	fn erase_entry_point() {
		let mut programmer = Programmer::new(pic16f628a());
		programmer.set_erase_program_counter();
		assert_eq!(programmer.hw.last_config_load, Some(0x3FFF));
		assert!(!programmer.is_idle());
		programmer.exit_program_mode();
		assert!(programmer.is_idle());
	}
}
