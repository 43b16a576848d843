// Length-delimited framing for relay traffic.
//
// TCP delivers a byte stream with no record boundaries: one read can return
// a fragment of an update, or several updates fused together. Every logical
// message is therefore written as a 4-byte big-endian length prefix followed
// by its payload, and the reader reassembles exactly one payload per call no
// matter how the bytes arrive.
//
// `read_frame` distinguishes the two ways a stream can end: `Ok(None)` when
// the peer closed cleanly between frames, `UnexpectedEof` when it died in
// the middle of one. The receive loops treat the first as a normal
// disconnect and the second as a read error worth reporting.

use std::io::{self, ErrorKind, Read, Write};

/// Upper bound on a single frame payload (64 KB). A state record is a few
/// dozen bytes; the cap turns a corrupted length prefix into an error
/// instead of a multi-gigabyte allocation.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Write one frame: 4-byte big-endian payload length, then the payload.
/// Rejects payloads over `MAX_FRAME_SIZE` with `InvalidInput`.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "frame payload of {} bytes exceeds cap of {MAX_FRAME_SIZE}",
                    payload.len()
                ),
            )
        })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame. Returns `Ok(None)` if the stream ended cleanly before a
/// new frame began, `UnexpectedEof` if it ended inside one, and
/// `InvalidData` if the length prefix exceeds `MAX_FRAME_SIZE`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; 4];
    if !fill_or_eof(reader, &mut prefix)? {
        return Ok(None);
    }
    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("frame length {len} exceeds cap of {MAX_FRAME_SIZE}"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Fill `buf` completely, returning `false` on a clean EOF before the first
/// byte. EOF after at least one byte is `UnexpectedEof` — the frame header
/// was cut short.
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "stream closed inside a frame header",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
