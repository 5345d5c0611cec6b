//! Basic usage example for the Bosswave wire protocol.

use bw_wire::{
    Command, FrameBuilder, FrameDecoder, PayloadObject, PayloadType, RoutingObject,
    DEFAULT_MAX_FRAME_SIZE,
};
use bytes::{Bytes, BytesMut};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Bosswave Wire Protocol Example ===\n");

    // 1. Build a publish frame
    println!("1. Creating a PUBLISH frame...");
    let frame = FrameBuilder::new(Command::Publish, 42)
        .kv_str("uri", "scratch.ns/demo/temperature")
        .kv_str("doverify", "true")
        .routing_object(RoutingObject::new(0x02, Bytes::from_static(b"access chain")))
        .payload_object(PayloadObject::new(
            PayloadType::from_octets([64, 0, 1, 0]),
            Bytes::from_static(b"21.5C\nend\n"),
        ))
        .build()?;

    let frame_bytes = frame.encode(DEFAULT_MAX_FRAME_SIZE)?;
    println!("   Encoded frame size: {} bytes", frame_bytes.len());
    if let Some(header) = frame_bytes.split(|b| *b == b'\n').next() {
        println!("   Header: {}", String::from_utf8_lossy(header));
    }

    // 2. Decode it back, followed by a second frame in the same buffer
    println!("\n2. Decoding two frames from one buffer...");
    let reply = FrameBuilder::new(Command::Response, 42)
        .kv_str("status", "okay")
        .build()?;

    let mut buf = BytesMut::from(&frame_bytes[..]);
    reply.encode_into(&mut buf);

    let mut decoder = FrameDecoder::new();
    while let Some(decoded) = decoder.decode(&mut buf)? {
        println!(
            "   {} seq={} kv={} ro={} po={}",
            decoded.command(),
            decoded.seq_no(),
            decoded.kv_pairs().len(),
            decoded.routing_objects().len(),
            decoded.payload_objects().len()
        );
        if let Some(uri) = decoded.get_first_str("uri") {
            println!("   uri: {}", uri);
        }
        if let Some(status) = decoded.get_first_str("status") {
            println!("   status: {}", status);
        }
    }

    // 3. Garbage is skipped without losing the frame that follows it
    println!("\n3. Recovering from a malformed frame...");
    let mut buf = BytesMut::from(&b"pu!l 0000000000 0000000001\nend\n"[..]);
    reply.encode_into(&mut buf);
    match decoder.decode(&mut buf) {
        Err(e) if e.is_frame_local() => println!("   Skipped: {}", e),
        other => println!("   Unexpected: {:?}", other),
    }
    if let Some(decoded) = decoder.decode(&mut buf)? {
        println!("   Recovered {} seq={}", decoded.command(), decoded.seq_no());
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
