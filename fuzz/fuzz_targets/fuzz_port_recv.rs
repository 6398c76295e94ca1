//! Fuzz target for framed message decoding.
//!
//! Arbitrary bytes on the wire must only ever yield messages, a clean close
//! or a `PortError`; never a panic or an allocation past the frame limit.

#![no_main]

use libfuzzer_sys::fuzz_target;
use msgport::net::MessagePort;
use tokio::io::AsyncWriteExt;

const FRAME_LIMIT: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    let rt = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(rt) => rt,
        Err(_) => return,
    };
    rt.block_on(async {
        let (mut wire, server) = tokio::io::duplex(data.len().max(1));
        if wire.write_all(data).await.is_err() {
            return;
        }
        drop(wire);

        let mut port = MessagePort::new(server, "fuzz", FRAME_LIMIT);
        while let Ok(Some(message)) = port.recv().await {
            assert!(message.payload().len() <= FRAME_LIMIT);
        }
    });
});
