use super::hardware::{
	Hardware,
	Line,
};

/// Serial command opcodes, 6 bits each. The write/erase set is listed for
/// protocol completeness; the read-out tool only ever sends the first group.
pub mod cmd {
	pub const LOAD_CONFIG: u8 = 0x00;
	pub const READ_PROGRAM_MEMORY: u8 = 0x04;
	pub const READ_DATA_MEMORY: u8 = 0x05;
	pub const INCREMENT_ADDRESS: u8 = 0x06;

	pub const LOAD_PROGRAM_MEMORY: u8 = 0x02;
	pub const LOAD_DATA_MEMORY: u8 = 0x03;
	pub const BEGIN_PROGRAM: u8 = 0x08;
	pub const BULK_ERASE_PROGRAM: u8 = 0x09;
	pub const BULK_ERASE_DATA: u8 = 0x0B;
	pub const END_PROGRAM_ONLY: u8 = 0x17;
	pub const BEGIN_PROGRAM_ONLY: u8 = 0x18;
	pub const CHIP_ERASE: u8 = 0x1F;
}

/// Timing requirements from the PIC16 programming specifications. The
/// target latches on these edges; shortening any of them risks corrupting
/// the session or the device state.
pub mod timing {
	use std::time::Duration;

	/// All lines low and settled before raising MCLR.
	pub const SETTLE: Duration = Duration::from_micros(50);
	/// MCLR at Vpp before VDD comes up.
	pub const TPPDP: Duration = Duration::from_micros(5);
	/// Hold after VDD comes up.
	pub const THLD0: Duration = Duration::from_micros(5);
	/// Data setup before the falling clock edge.
	pub const TSET1: Duration = Duration::from_micros(1);
	/// Data hold after the falling clock edge.
	pub const THLD1: Duration = Duration::from_micros(1);
	/// Gap between a command and its payload (and after the payload).
	pub const TDLY2: Duration = Duration::from_micros(1);
	/// Clock rise until the target's data output is valid.
	pub const TDLY3: Duration = Duration::from_micros(1);

	// Completion times for the (currently unused) write and erase commands.
	pub const TPROG: Duration = Duration::from_millis(4);
	pub const TDPROG: Duration = Duration::from_millis(6);
	pub const TERA: Duration = Duration::from_millis(6);
	pub const TFULLERA: Duration = Duration::from_millis(50);
	pub const TFULL84: Duration = Duration::from_millis(20);
}

// MCLR levels: low holds the target in reset, high switches the external
// driver stage to the programming voltage.
pub const MCLR_RESET: bool = false;
pub const MCLR_VPP: bool = true;

pub trait BitLevel: Hardware {
	// clock out a 6-bit command, least significant bit first
	fn send_command(&mut self, mut command: u8) {
		for _ in 0..6 {
			self.set_line(Line::Clock, true);
			self.set_line(Line::Data, 0 != command & 1);
			self.delay(timing::TSET1);
			self.set_line(Line::Clock, false);
			self.delay(timing::THLD1);
			command >>= 1;
		}
	}

	// command without payload (INCREMENT_ADDRESS and friends)
	fn send_simple_command(&mut self, command: u8) {
		self.send_command(command);
		self.delay(timing::TDLY2);
	}

	// command followed by a 16-bit payload, least significant bit first
	fn send_write_command(&mut self, command: u8, mut data: u16) {
		self.send_command(command);
		self.delay(timing::TDLY2);
		for _ in 0..16 {
			self.set_line(Line::Clock, true);
			self.set_line(Line::Data, 0 != data & 1);
			self.delay(timing::TSET1);
			self.set_line(Line::Clock, false);
			self.delay(timing::THLD1);
			data >>= 1;
		}
		self.delay(timing::TDLY2);
	}

	// command followed by a 16-bit response. The target shifts least
	// significant bit first, so every sampled bit enters at the top and
	// ripples down as the remaining bits arrive.
	fn send_read_command(&mut self, command: u8) -> u16 {
		let mut data = 0u16;
		self.send_command(command);
		// hand DATA over to the target
		self.set_line(Line::Data, false);
		self.set_input(Line::Data);
		self.delay(timing::TDLY2);
		for _ in 0..16 {
			data >>= 1;
			self.set_line(Line::Clock, true);
			self.delay(timing::TDLY3);
			if self.read_line(Line::Data) {
				data |= 0x8000;
			}
			self.set_line(Line::Clock, false);
			self.delay(timing::THLD1);
		}
		self.set_output(Line::Data);
		self.delay(timing::TDLY2);
		data
	}
}

impl<H: Hardware + ?Sized> BitLevel for H {
}
