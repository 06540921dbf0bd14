use std::time::{
	Duration,
	Instant,
};

// The strobe delays are in the single-microsecond range, which
// thread::sleep cannot hit reliably; spin on the monotonic clock instead.
pub fn spin_delay(duration: Duration) {
	let start = Instant::now();
	while start.elapsed() < duration {}
}

/// The five signal lines between programmer and target.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Line {
	/// Reset input; doubles as the programming-voltage (Vpp) switch.
	Mclr,
	/// Target supply voltage.
	Vdd,
	/// ICSPDAT, bidirectional.
	Data,
	/// ICSPCLK, always driven by the programmer.
	Clock,
	/// Indicator LED, not connected to the target.
	Activity,
}

pub trait Hardware {
	fn set_line(&mut self, line: Line, level: bool);
	fn set_output(&mut self, line: Line);
	fn set_input(&mut self, line: Line);
	fn read_line(&mut self, line: Line) -> bool;

	// block for (at least) the given protocol delay
	fn delay(&mut self, duration: Duration) {
		spin_delay(duration);
	}
}
