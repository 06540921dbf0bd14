use std::io::{
	Read,
	Write,
};
use std::net::{
	TcpListener,
	TcpStream,
};

use crate::icsp::{
	Hardware,
	Programmer,
};

use super::{
	CMD_DETECT_DEVICE,
	CMD_ECHO,
	CMD_READ,
	READ_BODY_LEN,
	ResponseSink,
	Status,
	commands,
	read_be32,
};

// Nothing the protocol defines comes anywhere close to this.
const MAX_BODY_LEN: usize = 0x10000;

struct Connection {
	stream: TcpStream,
}

impl ResponseSink for Connection {
	fn respond(&mut self, status: Status, body: &[u8]) -> crate::AResult<()> {
		let mut head = [0u8; 5];
		head[0] = status.code();
		head[1..5].copy_from_slice(&(body.len() as u32).to_be_bytes());
		self.stream.write_all(&head)?;
		self.stream.write_all(body)?;
		Ok(())
	}
}

// One framed request; None on a clean close between requests.
fn read_request(stream: &mut TcpStream) -> crate::AResult<Option<(u8, Vec<u8>)>> {
	let mut head = [0u8; 5];
	let mut got = 0;
	while got < head.len() {
		let n = stream.read(&mut head[got..])?;
		if n == 0 {
			if got == 0 {
				return Ok(None);
			}
			bail!("connection closed inside a request head ({} of 5 bytes)", got);
		}
		got += n;
	}
	let command = head[0];
	let len = read_be32(&head, 1) as usize;
	ensure!(len <= MAX_BODY_LEN, "request body too large: {} bytes", len);
	let mut body = vec![0u8; len];
	stream.read_exact(&mut body)?;
	Ok(Some((command, body)))
}

fn serve_connection<H: Hardware>(programmer: &mut Programmer<H>, stream: TcpStream) -> crate::AResult<()> {
	let peer = stream.peer_addr()?;
	info!("client connected: {}", peer);
	let mut conn = Connection { stream };
	loop {
		let (command, body) = match read_request(&mut conn.stream)? {
			None => break,
			Some(request) => request,
		};
		match command {
			CMD_ECHO => conn.respond(Status::Ok, &body)?,
			CMD_DETECT_DEVICE => commands::command_detect_device(programmer, &mut conn)?,
			CMD_READ => {
				if body.len() < READ_BODY_LEN {
					warn!("READ request with undersized body ({} bytes) from {}", body.len(), peer);
					conn.respond(Status::ErrRequestLength, &[])?;
				} else {
					commands::command_read(programmer, &body, &mut conn)?;
				}
			}
			_ => {
				warn!("unknown command byte {:#04x} from {}", command, peer);
				conn.respond(Status::ErrInvalidCommand, &[])?;
			}
		}
	}
	info!("client disconnected: {}", peer);
	Ok(())
}

/// Accept loop. Clients are served strictly one at a time; every command
/// talks to the single target device, so there is nothing to parallelize.
pub fn serve<H: Hardware>(listener: TcpListener, mut programmer: Programmer<H>) -> crate::AResult<()> {
	for stream in listener.incoming() {
		let stream = stream?;
		if let Err(e) = serve_connection(&mut programmer, stream) {
			error!("client error: {}", e);
		}
		// power the target down between sessions
		programmer.exit_program_mode();
	}
	Ok(())
}
