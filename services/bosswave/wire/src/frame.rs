//! Frame model, encoding and streaming decoding.
//!
//! Frames are self-delimiting: a text header line, a run of length-prefixed
//! items, and an `end` line. There is no length prefix at the connection
//! level, so the decoder works directly on the receive buffer and only
//! consumes bytes once it has seen a frame's terminator.

use crate::command::{Command, COMMAND_LEN};
use crate::object::{KvPair, PayloadObject, PayloadType, RoutingObject, RoutingType};
use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use smallvec::SmallVec;
use std::ops::Range;
use tracing::trace;

/// Maximum frame size (16 MiB default)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Terminator line, without its newline
pub const END_MARKER: &[u8] = b"end";

/// Header length field as written by this client. The field is kept for
/// compatibility and is ignored when reading.
const UNSPECIFIED_LENGTH: u64 = 0;

/// Inline capacity for KV pairs; most frames carry fewer than this.
pub(crate) type KvList = SmallVec<[KvPair; 8]>;

/// Complete wire frame
///
/// Immutable once built; construct with [`crate::FrameBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    seq_no: u32,
    kv_pairs: KvList,
    routing_objects: Vec<RoutingObject>,
    payload_objects: Vec<PayloadObject>,
}

impl Frame {
    pub(crate) fn from_parts(
        command: Command,
        seq_no: u32,
        kv_pairs: KvList,
        routing_objects: Vec<RoutingObject>,
        payload_objects: Vec<PayloadObject>,
    ) -> Self {
        Self {
            command,
            seq_no,
            kv_pairs,
            routing_objects,
            payload_objects,
        }
    }

    /// Frame command
    pub fn command(&self) -> Command {
        self.command
    }

    /// Sequence number correlating this frame with a request
    pub fn seq_no(&self) -> u32 {
        self.seq_no
    }

    /// KV pairs in encounter order
    pub fn kv_pairs(&self) -> &[KvPair] {
        &self.kv_pairs
    }

    /// Routing objects in encounter order
    pub fn routing_objects(&self) -> &[RoutingObject] {
        &self.routing_objects
    }

    /// Payload objects in encounter order
    pub fn payload_objects(&self) -> &[PayloadObject] {
        &self.payload_objects
    }

    /// Value of the first pair with `key`, or `None` when the key is absent.
    ///
    /// An empty value is `Some` of an empty buffer, never `None`.
    pub fn get_first_value(&self, key: &str) -> Option<Bytes> {
        self.kv_pairs
            .iter()
            .find(|pair| pair.key() == key)
            .map(KvPair::value)
    }

    /// First value for `key` as text (lossy UTF-8)
    pub fn get_first_str(&self, key: &str) -> Option<String> {
        self.get_first_value(key)
            .map(|v| String::from_utf8_lossy(&v).into_owned())
    }

    /// First value for `key` as a boolean.
    ///
    /// Only a case-insensitive `true` is true; any other present value is
    /// false.
    pub fn get_first_bool(&self, key: &str) -> Option<bool> {
        self.get_first_value(key)
            .map(|v| v.eq_ignore_ascii_case(b"true"))
    }

    /// Get the total frame size when encoded
    pub fn encoded_size(&self) -> usize {
        // "cccc " + 10 digit length + " " + 10 digit seq + "\n"
        let mut size = COMMAND_LEN + 1 + 10 + 1 + 10 + 1;

        for pair in &self.kv_pairs {
            let len = pair.value_bytes().len();
            size += item_header_len("kv", pair.key().len(), len) + len + 1;
        }
        for ro in &self.routing_objects {
            let len = ro.content().len();
            size += item_header_len("ro", decimal_len(ro.ro_type() as u64), len) + len + 1;
        }
        for po in &self.payload_objects {
            let len = po.content().len();
            size += item_header_len("po", po.po_type().to_wire().len(), len) + len + 1;
        }

        size + END_MARKER.len() + 1
    }

    /// Encode the frame onto the end of `buf`.
    ///
    /// Items are written header first, so the output can be streamed without
    /// knowing the final frame length.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_size());

        buf.put_slice(&self.command.token());
        buf.put_slice(format!(" {:010} {:010}\n", UNSPECIFIED_LENGTH, self.seq_no).as_bytes());

        for pair in &self.kv_pairs {
            let value = pair.value_bytes();
            buf.put_slice(format!("kv {} {}\n", pair.key(), value.len()).as_bytes());
            buf.put_slice(value);
            buf.put_u8(b'\n');
        }

        for ro in &self.routing_objects {
            let content = ro.content();
            buf.put_slice(format!("ro {} {}\n", ro.ro_type(), content.len()).as_bytes());
            buf.put_slice(&content);
            buf.put_u8(b'\n');
        }

        for po in &self.payload_objects {
            let content = po.content();
            buf.put_slice(format!("po {} {}\n", po.po_type().to_wire(), content.len()).as_bytes());
            buf.put_slice(&content);
            buf.put_u8(b'\n');
        }

        buf.put_slice(END_MARKER);
        buf.put_u8(b'\n');
    }

    /// Encode frame to a contiguous buffer
    pub fn encode(&self, max_frame_size: usize) -> Result<Bytes, WireError> {
        let total_size = self.encoded_size();
        if total_size > max_frame_size {
            return Err(WireError::Size(total_size));
        }

        let mut buf = BytesMut::with_capacity(total_size);
        self.encode_into(&mut buf);
        Ok(buf.freeze())
    }
}

fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

fn item_header_len(kind: &str, field_len: usize, body_len: usize) -> usize {
    kind.len() + 1 + field_len + 1 + decimal_len(body_len as u64) + 1
}

/// Frame decoder for parsing incoming frames.
///
/// The decoder remembers how far it got into a partially received frame, so
/// it must be handed the same buffer, with new data appended at the end,
/// until that frame has been returned or rejected. Item bodies are sliced
/// out of the frame's bytes rather than copied.
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: usize,
    progress: Progress,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a decoder with a custom frame size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            progress: Progress::default(),
        }
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// - `Ok(Some(frame))`: the frame's bytes have been consumed.
    /// - `Ok(None)`: more data is needed; nothing was consumed.
    /// - `Err(InvalidFrame)`: the malformed frame has been consumed and the
    ///   buffer starts at whatever follows it.
    /// - `Err(Size)`: an unterminated frame outgrew the size limit. The
    ///   stream cannot be resynchronised after this.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, WireError> {
        match self.scan(&buf[..]) {
            Scan::Complete {
                command,
                seq_no,
                items,
                end,
            } => {
                self.progress = Progress::default();
                let data = buf.split_to(end).freeze();
                Ok(Some(assemble(command, seq_no, items, &data)))
            }
            Scan::Invalid(reason, consumed) => {
                self.progress = Progress::default();
                trace!("Discarding {} bytes of invalid frame: {}", consumed, reason);
                buf.advance(consumed);
                Err(WireError::InvalidFrame(reason))
            }
            Scan::Incomplete if buf.len() > self.max_frame_size => {
                self.progress = Progress::default();
                Err(WireError::Size(buf.len()))
            }
            Scan::Incomplete => Ok(None),
        }
    }

    /// Walk lines from where the previous call stopped.
    fn scan(&mut self, buf: &[u8]) -> Scan {
        let max_frame_size = self.max_frame_size;
        let progress = &mut self.progress;

        loop {
            let mut cur = Cursor::new(buf, progress.pos);
            let line_start = cur.pos;
            let Some(line) = cur.next_line() else {
                return Scan::Incomplete;
            };

            match std::mem::take(&mut progress.stage) {
                Stage::Header => {
                    // A stray terminator is its own (empty) invalid frame.
                    if line == END_MARKER {
                        return Scan::Invalid("terminator without header".into(), cur.pos);
                    }
                    // A bad header still lets us walk the items to find
                    // where the frame ends.
                    progress.stage = Stage::Items(parse_header(line));
                    progress.pos = cur.pos;
                }

                Stage::Items(head) => {
                    let (kind, len) = match parse_item_header(line) {
                        Ok(Some(item)) => item,
                        Ok(None) => {
                            return match head {
                                Ok((command, seq_no)) => Scan::Complete {
                                    command,
                                    seq_no,
                                    items: std::mem::take(&mut progress.items),
                                    end: cur.pos,
                                },
                                Err(reason) => Scan::Invalid(reason, cur.pos),
                            };
                        }
                        Err(reason) => {
                            // The offending line may be the next frame's
                            // header, so the skip starts at it.
                            progress.stage = Stage::Skip(head.err().unwrap_or(reason));
                            continue;
                        }
                    };

                    let body_start = cur.pos;
                    if len > max_frame_size {
                        let reason = format!("declared length {} exceeds limit", len);
                        progress.stage = Stage::Skip(head.err().unwrap_or(reason));
                        progress.pos = body_start;
                        continue;
                    }

                    let body_end = body_start + len;
                    match buf.get(body_end) {
                        None => {
                            // Re-read this item header once more data is in.
                            progress.stage = Stage::Items(head);
                            return Scan::Incomplete;
                        }
                        Some(b'\n') => {}
                        Some(_) => {
                            let reason =
                                format!("declared length {} does not match item body", len);
                            progress.stage = Stage::Skip(head.err().unwrap_or(reason));
                            progress.pos = body_start;
                            continue;
                        }
                    }

                    if head.is_ok() {
                        progress.items.push(Item {
                            kind,
                            body: body_start..body_end,
                        });
                    }
                    progress.stage = Stage::Items(head);
                    progress.pos = body_end + 1;
                }

                // Body lengths can no longer be trusted here, so a body that
                // happens to contain a header-like line ends the skip early.
                Stage::Skip(reason) => {
                    if line == END_MARKER {
                        return Scan::Invalid(reason, cur.pos);
                    }
                    if parse_header(line).is_ok() {
                        return Scan::Invalid(reason, line_start);
                    }
                    progress.stage = Stage::Skip(reason);
                    progress.pos = cur.pos;
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Position inside the frame at the front of the buffer
#[derive(Debug, Default)]
struct Progress {
    stage: Stage,
    /// Offset of the next line to read
    pos: usize,
    items: Vec<Item>,
}

#[derive(Debug, Default)]
enum Stage {
    #[default]
    Header,
    Items(Result<(Command, u32), String>),
    /// Broken frame; looking for `end` or the next header
    Skip(String),
}

#[derive(Debug)]
enum ItemKind {
    Kv(String),
    Ro(RoutingType),
    Po(PayloadType),
}

#[derive(Debug)]
struct Item {
    kind: ItemKind,
    body: Range<usize>,
}

enum Scan {
    Complete {
        command: Command,
        seq_no: u32,
        items: Vec<Item>,
        end: usize,
    },
    Invalid(String, usize),
    Incomplete,
}

fn assemble(command: Command, seq_no: u32, items: Vec<Item>, data: &Bytes) -> Frame {
    let mut kv_pairs = KvList::new();
    let mut routing_objects = Vec::new();
    let mut payload_objects = Vec::new();

    for Item { kind, body } in items {
        let body = data.slice(body);
        match kind {
            ItemKind::Kv(key) => kv_pairs.push(KvPair::new(key, body)),
            ItemKind::Ro(t) => routing_objects.push(RoutingObject::new(t, body)),
            ItemKind::Po(t) => payload_objects.push(PayloadObject::new(t, body)),
        }
    }

    Frame::from_parts(command, seq_no, kv_pairs, routing_objects, payload_objects)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Next line without its newline, or `None` if the line is incomplete.
    fn next_line(&mut self) -> Option<&'a [u8]> {
        let rest = self.buf.get(self.pos..)?;
        let nl = rest.iter().position(|b| *b == b'\n')?;
        self.pos += nl + 1;
        Some(&rest[..nl])
    }
}

fn parse_header(line: &[u8]) -> Result<(Command, u32), String> {
    let mut parts = line.split(|b| *b == b' ');
    let (Some(token), Some(length), Some(seq), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err("malformed frame header".into());
    };

    let command = Command::from_token(token)
        .ok_or_else(|| format!("bad command token {:?}", String::from_utf8_lossy(token)))?;
    parse_decimal::<u64>(length).ok_or("bad frame length")?;
    let seq_no = parse_decimal::<u32>(seq).ok_or_else(|| {
        format!("bad sequence number {:?}", String::from_utf8_lossy(seq))
    })?;

    Ok((command, seq_no))
}

/// Parse an item header line; `None` is the terminator.
fn parse_item_header(line: &[u8]) -> Result<Option<(ItemKind, usize)>, String> {
    if line == END_MARKER {
        return Ok(None);
    }

    let mut parts = line.split(|b| *b == b' ');
    let (Some(kind), Some(field), Some(length), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(format!(
            "malformed item header {:?}",
            String::from_utf8_lossy(line)
        ));
    };

    let len = parse_decimal::<usize>(length).ok_or("bad item length")?;
    let field = std::str::from_utf8(field).map_err(|_| "item field is not utf-8")?;

    let kind = match kind {
        b"kv" if !field.is_empty() => ItemKind::Kv(field.to_string()),
        b"ro" => field
            .parse::<RoutingType>()
            .map(ItemKind::Ro)
            .map_err(|_| format!("bad routing object type {:?}", field))?,
        b"po" => PayloadType::from_wire(field)
            .map(ItemKind::Po)
            .ok_or_else(|| format!("bad payload object type {:?}", field))?,
        _ => {
            return Err(format!(
                "unknown item {:?}",
                String::from_utf8_lossy(kind)
            ))
        }
    };
    Ok(Some((kind, len)))
}

fn parse_decimal<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameBuilder;

    fn sample_frame() -> Frame {
        FrameBuilder::new(Command::Publish, 42)
            .kv_str("uri", "scratch.ns/demo")
            .kv("empty", Bytes::new())
            .kv("garbage", Bytes::from_static(b"\nend\nrslt 0000000000 0000000007\n\0\xff"))
            .kv_str("uri", "second")
            .routing_object(RoutingObject::new(2, Bytes::from_static(b"\x00chain\n")))
            .payload_object(PayloadObject::new(
                PayloadType::from_octets([64, 0, 1, 0]),
                Bytes::from_static(b"hello\nend\n"),
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let frame = sample_frame();
        let bytes = frame.encode(DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert_eq!(bytes.len(), frame.encoded_size());

        let mut buf = BytesMut::from(&bytes[..]);
        let decoded = FrameDecoder::new().decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_without_items() {
        let frame = FrameBuilder::new(Command::Hello, 0).build().unwrap();
        let mut buf = BytesMut::from(&frame.encode(DEFAULT_MAX_FRAME_SIZE).unwrap()[..]);
        assert_eq!(&buf[..], b"helo 0000000000 0000000000\nend\n");

        let decoded = FrameDecoder::new().decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.command(), Command::Hello);
        assert!(decoded.kv_pairs().is_empty());
        assert!(decoded.routing_objects().is_empty());
        assert!(decoded.payload_objects().is_empty());
    }

    #[test]
    fn test_back_to_back_frames() {
        let first = sample_frame();
        let second = FrameBuilder::new(Command::Result, 7)
            .kv_str("child", "a")
            .build()
            .unwrap();

        let mut buf = BytesMut::new();
        first.encode_into(&mut buf);
        second.encode_into(&mut buf);

        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), second);
        assert!(buf.is_empty());
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_partial_frame_waits_for_more_data() {
        let bytes = sample_frame().encode(DEFAULT_MAX_FRAME_SIZE).unwrap();
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        for (i, byte) in bytes.iter().enumerate() {
            buf.put_u8(*byte);
            let result = decoder.decode(&mut buf).unwrap();
            if i + 1 < bytes.len() {
                assert!(result.is_none(), "frame completed early at byte {}", i);
                assert_eq!(buf.len(), i + 1);
            } else {
                assert_eq!(result.unwrap(), sample_frame());
            }
        }
    }

    #[test]
    fn test_bodies_share_the_receive_buffer() {
        let bytes = sample_frame().encode(DEFAULT_MAX_FRAME_SIZE).unwrap();
        let mut buf = BytesMut::from(&bytes[..]);
        let region = buf.as_ptr() as usize..buf.as_ptr() as usize + buf.len();

        let frame = FrameDecoder::new().decode(&mut buf).unwrap().unwrap();
        for pair in frame.kv_pairs().iter().filter(|p| !p.value_bytes().is_empty()) {
            assert!(region.contains(&(pair.value_bytes().as_ptr() as usize)));
        }
        let payload = frame.payload_objects()[0].content();
        assert!(region.contains(&(payload.as_ptr() as usize)));
    }

    #[test]
    fn test_large_frame_in_chunks() {
        let mut builder = FrameBuilder::new(Command::Result, 11);
        for i in 0..500 {
            builder = builder.kv(&format!("k{}", i), vec![(i % 251) as u8; 1024]);
        }
        let frame = builder.build().unwrap();

        let mut first = BytesMut::new();
        frame.encode_into(&mut first);
        let mut wire = BytesMut::from(&b"p*bl 0000000000 0000000001\nkv uri 1\na\nend\n"[..]);
        wire.extend_from_slice(&first);
        wire.extend_from_slice(&first);

        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        let mut invalid = 0;
        for chunk in wire.chunks(4096) {
            buf.extend_from_slice(chunk);
            loop {
                match decoder.decode(&mut buf) {
                    Ok(Some(decoded)) => frames.push(decoded),
                    Ok(None) => break,
                    Err(e) => {
                        assert!(e.is_frame_local());
                        invalid += 1;
                    }
                }
            }
        }

        assert_eq!(invalid, 1);
        assert_eq!(frames, vec![frame.clone(), frame]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_first_value_lookup() {
        let frame = sample_frame();
        assert_eq!(frame.get_first_str("uri").as_deref(), Some("scratch.ns/demo"));
        assert_eq!(frame.get_first_value("empty"), Some(Bytes::new()));
        assert_eq!(frame.get_first_value("missing"), None);
        assert_eq!(frame.get_first_bool("missing"), None);
    }

    #[test]
    fn test_bool_values() {
        let frame = FrameBuilder::new(Command::Result, 1)
            .kv_str("a", "TRUE")
            .kv_str("b", "yes")
            .build()
            .unwrap();
        assert_eq!(frame.get_first_bool("a"), Some(true));
        assert_eq!(frame.get_first_bool("b"), Some(false));
    }

    fn assert_invalid_then_valid(raw: &[u8]) {
        let valid = FrameBuilder::new(Command::Response, 9)
            .kv_str("status", "okay")
            .build()
            .unwrap();

        let mut buf = BytesMut::from(raw);
        valid.encode_into(&mut buf);

        let mut decoder = FrameDecoder::new();
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(err.is_frame_local(), "unexpected error {:?}", err);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), valid);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_bad_command_token() {
        assert_invalid_then_valid(b"p*bl 0000000000 0000000001\nkv uri 1\na\nend\n");
    }

    #[test]
    fn test_bad_sequence_number() {
        assert_invalid_then_valid(b"publ 0000000000 -000000001\nend\n");
        assert_invalid_then_valid(b"publ 0000000000 99999999999\nend\n");
    }

    #[test]
    fn test_length_mismatch() {
        assert_invalid_then_valid(b"publ 0000000000 0000000001\nkv uri 2\nabc\nend\n");
    }

    #[test]
    fn test_missing_terminator() {
        assert_invalid_then_valid(b"publ 0000000000 0000000001\nkv uri 1\na\n");
    }

    #[test]
    fn test_garbage_item_header() {
        assert_invalid_then_valid(b"publ 0000000000 0000000001\nzz top\nend\n");
    }

    #[test]
    fn test_stray_terminator() {
        assert_invalid_then_valid(b"end\n");
    }

    #[test]
    fn test_unknown_command_parses() {
        let mut buf = BytesMut::from(&b"tsub 0000000000 0000000003\nkv uri 1\na\nend\n"[..]);
        let frame = FrameDecoder::new().decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.command(), Command::Other(*b"tsub"));
        assert_eq!(frame.seq_no(), 3);
    }

    #[test]
    fn test_size_limit() {
        let mut decoder = FrameDecoder::with_max_frame_size(64);
        let mut buf = BytesMut::from(&b"publ 0000000000 0000000001\n"[..]);
        buf.put_slice(&[b'x'; 64]);
        assert_eq!(decoder.decode(&mut buf), Err(WireError::Size(buf.len())));
    }

    #[test]
    fn test_encode_respects_limit() {
        let frame = sample_frame();
        assert!(matches!(frame.encode(16), Err(WireError::Size(_))));
    }
}
