#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use nanolink_sp::codec::{decode_header, encode_frame, FrameDecoder, Framing, HEADER_LEN};

fuzz_target!(|data: &[u8]| {
    if let Some(header) = data.first_chunk::<HEADER_LEN>() {
        let _ = decode_header(header);
    }

    for framing in [Framing::Tcp, Framing::Ipc] {
        // Feed the input in uneven chunks so the partial-frame path runs too.
        let mut decoder = FrameDecoder::new(framing, Some(1 << 20));
        let mut buf = BytesMut::new();
        'feed: for chunk in data.chunks(7) {
            buf.extend_from_slice(chunk);
            loop {
                match decoder.decode(&mut buf) {
                    Ok(Some(payload)) => {
                        // Whatever decodes must re-encode to a frame of the same payload.
                        let mut wire = BytesMut::new();
                        encode_frame(framing, &payload, &mut wire);
                        let mut again = FrameDecoder::new(framing, None);
                        assert_eq!(again.decode(&mut wire), Ok(Some(payload)));
                    }
                    Ok(None) => break,
                    Err(_) => break 'feed,
                }
            }
        }
    }
});
