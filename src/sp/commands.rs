use crate::icsp::{
	Detection,
	Hardware,
	Programmer,
};

use super::{
	READ_BODY_LEN,
	READ_END_OFFSET,
	READ_START_OFFSET,
	ResponseSink,
	Status,
	read_be32,
};

// Responses always carry full chunks of 256 words, 4 bytes each.
const CHUNK_WORDS: usize = 256;
const CHUNK_BYTES: usize = CHUNK_WORDS * 4;

/// DETECT_DEVICE: identify the part in the socket. Answers `Ok` with the
/// device name, or `ErrDeviceNotDetected` (details go to the log).
pub fn command_detect_device<H, S>(programmer: &mut Programmer<H>, sink: &mut S) -> crate::AResult<()>
where
	H: Hardware,
	S: ResponseSink,
{
	match programmer.detect_device() {
		Detection::Device { info, device_id, config_word } => {
			info!("detected {} (id {:04x}, config {:04x})", info.name, device_id, config_word);
			sink.respond(Status::Ok, info.name.as_bytes())
		}
		Detection::Unknown { device_id, config_word } => {
			warn!("device present but not in the table (id {:04x}, config {:04x})", device_id, config_word);
			sink.respond(Status::ErrDeviceNotDetected, &[])
		}
		Detection::Absent => {
			warn!("no device detected: empty socket, missing Vpp, or code protection");
			sink.respond(Status::ErrDeviceNotDetected, &[])
		}
	}
}

/// READ: stream the inclusive word range from the request body. Words
/// are delivered in `ReadMore` chunks; the trailing partial chunk is not
/// flushed (fixed-size chunks are a protocol property), only the final
/// empty `ReadDone`.
pub fn command_read<H, S>(programmer: &mut Programmer<H>, body: &[u8], sink: &mut S) -> crate::AResult<()>
where
	H: Hardware,
	S: ResponseSink,
{
	let result = stream_words(programmer, body, sink);
	if result.is_err() {
		// whatever happened, don't leave the target powered
		programmer.exit_program_mode();
	}
	result
}

fn stream_words<H, S>(programmer: &mut Programmer<H>, body: &[u8], sink: &mut S) -> crate::AResult<()>
where
	H: Hardware,
	S: ResponseSink,
{
	// the dispatcher already rejects short bodies; this is the backstop
	ensure!(body.len() >= READ_BODY_LEN, "READ body too short: {} bytes", body.len());
	let start = read_be32(body, READ_START_OFFSET);
	let end = read_be32(body, READ_END_OFFSET);
	debug!("read {:04x}-{:04x}", start, end);

	let mut chunk = [0u8; CHUNK_BYTES];
	let mut filled = 0usize;
	let mut total = 0usize;
	let mut activity = true;
	// an inverted range is simply empty: just the ReadDone below
	for addr in start..=end {
		let word = programmer.read_word(addr);
		chunk[filled * 4..filled * 4 + 4].copy_from_slice(&(word as u32).to_be_bytes());
		filled += 1;
		if filled == CHUNK_WORDS {
			sink.respond(Status::ReadMore, &chunk)?;
			filled = 0;
		}
		total += 1;
		if total % 32 == 0 {
			// blink during long reads
			activity = !activity;
			programmer.set_activity(activity);
		}
	}
	sink.respond(Status::ReadDone, &[])
}

#[cfg(test)]
mod test {
	use crate::icsp::sim::SimulatedPic;
	use crate::icsp::Programmer;

	use super::super::{
		ResponseSink,
		Status,
	};

	use super::{
		command_detect_device,
		command_read,
	};

	#[derive(Default)]
	struct RecordingSink {
		responses: Vec<(Status, Vec<u8>)>,
	}

	impl ResponseSink for RecordingSink {
		fn respond(&mut self, status: Status, body: &[u8]) -> crate::AResult<()> {
			self.responses.push((status, body.to_vec()));
			Ok(())
		}
	}

	fn pic16f887() -> Programmer<SimulatedPic> {
		let mut sim = SimulatedPic::new(8192, 256);
		for addr in 0..8192u32 {
			sim.program[addr as usize] = ((addr ^ 0x2AAA) & 0x3FFF) as u16;
		}
		sim.config[6] = 0x2082; // pic16f887 rev 2
		sim.config[7] = 0x00E2;
		Programmer::new(sim)
	}

	fn read_body(start: u32, end: u32) -> Vec<u8> {
		let mut body = vec![0u8; 12];
		body[0..4].copy_from_slice(&start.to_be_bytes());
		body[8..12].copy_from_slice(&end.to_be_bytes());
		body
	}

	fn run_read(start: u32, end: u32) -> Vec<(Status, Vec<u8>)> {
		let mut programmer = pic16f887();
		let mut sink = RecordingSink::default();
		command_read(&mut programmer, &read_body(start, end), &mut sink).unwrap();
		sink.responses
	}

	#[test]
	fn detect_responds_with_name() {
		let mut programmer = pic16f887();
		let mut sink = RecordingSink::default();
		command_detect_device(&mut programmer, &mut sink).unwrap();
		assert_eq!(sink.responses.len(), 1);
		assert_eq!(sink.responses[0].0, Status::Ok);
		assert_eq!(sink.responses[0].1, b"pic16f887");
	}

	#[test]
	fn detect_responds_not_detected() {
		let mut programmer = Programmer::new(SimulatedPic::new(1024, 64));
		let mut sink = RecordingSink::default();
		command_detect_device(&mut programmer, &mut sink).unwrap();
		assert_eq!(sink.responses.len(), 1);
		assert_eq!(sink.responses[0].0, Status::ErrDeviceNotDetected);
		assert!(sink.responses[0].1.is_empty());
	}

	#[test]
	fn short_read_is_done_only() {
		let responses = run_read(0x0000, 0x0004);
		assert_eq!(responses.len(), 1);
		assert_eq!(responses[0].0, Status::ReadDone);
		assert!(responses[0].1.is_empty());
	}

	#[test]
	fn full_chunk_then_done() {
		let responses = run_read(0x0000, 0x00FF);
		assert_eq!(responses.len(), 2);
		assert_eq!(responses[0].0, Status::ReadMore);
		assert_eq!(responses[0].1.len(), 1024);
		assert_eq!(responses[1].0, Status::ReadDone);
		// spot-check the big-endian 4-byte word fields
		for &addr in [0u32, 1, 255].iter() {
			let offset = addr as usize * 4;
			let mut field = [0u8; 4];
			field.copy_from_slice(&responses[0].1[offset..offset + 4]);
			assert_eq!(u32::from_be_bytes(field), (addr ^ 0x2AAA) & 0x3FFF);
		}
	}

	#[test]
	fn partial_tail_is_not_flushed() {
		// 300 words: one full chunk goes out, the remaining 44 don't
		let responses = run_read(0x0000, 0x012B);
		assert_eq!(responses.len(), 2);
		assert_eq!(responses[0].0, Status::ReadMore);
		assert_eq!(responses[1].0, Status::ReadDone);
	}

	#[test]
	fn chunk_count_scales() {
		let responses = run_read(0x0000, 0x01FF);
		assert_eq!(responses.len(), 3);
		assert_eq!(responses[0].0, Status::ReadMore);
		assert_eq!(responses[1].0, Status::ReadMore);
		assert_eq!(responses[2].0, Status::ReadDone);
		// the second chunk starts at word 256
		let mut field = [0u8; 4];
		field.copy_from_slice(&responses[1].1[0..4]);
		assert_eq!(u32::from_be_bytes(field), (256 ^ 0x2AAA) & 0x3FFF);
	}

	#[test]
	fn inverted_range_is_empty() {
		let responses = run_read(0x0010, 0x0005);
		assert_eq!(responses.len(), 1);
		assert_eq!(responses[0].0, Status::ReadDone);
	}

	#[test]
	fn undersized_body_is_refused() {
		let mut programmer = pic16f887();
		let mut sink = RecordingSink::default();
		assert!(command_read(&mut programmer, &[0u8; 8], &mut sink).is_err());
		assert!(sink.responses.is_empty());
		// failure path powers the target down
		assert!(programmer.is_idle());
	}
}
