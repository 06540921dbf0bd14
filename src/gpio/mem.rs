use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::io::{
	FromRawFd,
};
use std::ptr;

use libc::{
	MAP_SHARED,
	O_CLOEXEC,
	O_RDWR,
	O_SYNC,
	PROT_READ,
	PROT_WRITE,
	c_void,
	mmap,
	munmap,
	open,
};

// BCM283x GPIO register block, exposed at offset 0 of /dev/gpiomem.
const GPFSEL0: usize = 0x00; // function select, 3 bits per pin
const GPSET0: usize = 0x1C; // output set, 1 bit per pin
const GPCLR0: usize = 0x28; // output clear, 1 bit per pin
const GPLEV0: usize = 0x34; // input level, 1 bit per pin

const FSEL_INPUT: u32 = 0b000;
const FSEL_OUTPUT: u32 = 0b001;

const MAP_LEN: usize = 0x1000; // one page covers the whole block

pub const PIN_COUNT: u8 = 54;

#[derive(Debug)]
pub struct GpioMem {
	ptr: ptr::NonNull<u8>, // u8 instead of void for easier offset operations
}

impl Drop for GpioMem {
	fn drop(&mut self) {
		unsafe {
			let res = munmap(
				self.ptr.as_ptr() as *mut c_void,
				MAP_LEN,
			);
			if 0 != res {
				panic!("munmap failed: {}", io::Error::last_os_error());
			}
		}
	}
}

impl GpioMem {
	// registers need volatile access, the compiler must not elide or
	// reorder anything here
	fn read_reg(&self, offset: usize) -> u32 {
		debug_assert!(offset & 3 == 0 && offset < MAP_LEN);
		unsafe { ptr::read_volatile(self.ptr.as_ptr().add(offset) as *const u32) }
	}

	fn write_reg(&mut self, offset: usize, data: u32) {
		debug_assert!(offset & 3 == 0 && offset < MAP_LEN);
		unsafe { ptr::write_volatile(self.ptr.as_ptr().add(offset) as *mut u32, data) }
	}

	fn set_function(&mut self, pin: u8, function: u32) {
		assert!(pin < PIN_COUNT);
		let reg = GPFSEL0 + 4 * (pin as usize / 10);
		let shift = 3 * (pin as u32 % 10);
		let mut fsel = self.read_reg(reg);
		fsel &= !(0b111 << shift);
		fsel |= function << shift;
		self.write_reg(reg, fsel);
	}

	pub fn set_input(&mut self, pin: u8) {
		self.set_function(pin, FSEL_INPUT);
	}

	pub fn set_output(&mut self, pin: u8) {
		self.set_function(pin, FSEL_OUTPUT);
	}

	pub fn set_level(&mut self, pin: u8, level: bool) {
		assert!(pin < PIN_COUNT);
		let base = if level { GPSET0 } else { GPCLR0 };
		let reg = base + 4 * (pin as usize / 32);
		self.write_reg(reg, 1 << (pin % 32));
	}

	pub fn level(&self, pin: u8) -> bool {
		assert!(pin < PIN_COUNT);
		let reg = GPLEV0 + 4 * (pin as usize / 32);
		0 != self.read_reg(reg) & (1 << (pin % 32))
	}
}

pub fn open_gpiomem() -> io::Result<GpioMem> {
	let path = CString::new("/dev/gpiomem")?;

	let fd = unsafe { open(path.as_ptr(), O_RDWR | O_CLOEXEC | O_SYNC) };
	if -1 == fd {
		return Err(io::Error::last_os_error());
	}
	// now get fd managed to prevent resource leak; the mapping survives
	// the close
	let _f = unsafe { fs::File::from_raw_fd(fd) };

	let area = unsafe {
		mmap(
			ptr::null_mut(),
			MAP_LEN,
			PROT_READ | PROT_WRITE,
			MAP_SHARED,
			fd,
			0,
		)
	};

	if area as usize == !0usize {
		return Err(io::Error::last_os_error());
	}
	match ptr::NonNull::new(area as *mut u8) {
		None => panic!("mmap shouldn't return NULL ever"),
		Some(area) => Ok(GpioMem { ptr: area }),
	}
}
