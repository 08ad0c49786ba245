#![no_main]

use libfuzzer_sys::fuzz_target;
use tern_protocol::{FrameDecoder, StreamEventKind};

fuzz_target!(|data: &[u8]| {
    let mut whole = FrameDecoder::new();
    let frames = whole.push(data);
    for frame in &frames {
        assert!(!frame.event.is_empty());
        let kind = StreamEventKind::parse(&frame.event);
        assert_eq!(kind.is_terminal(), frame.is_terminal());
    }

    if std::str::from_utf8(data).is_err() || data.is_empty() {
        return;
    }
    let split = usize::from(data[0]) % data.len();
    let mut chunked = FrameDecoder::new();
    let mut chunked_frames = chunked.push(&data[..split]);
    chunked_frames.extend(chunked.push(&data[split..]));
    assert_eq!(frames, chunked_frames);
    assert_eq!(whole.has_partial_frame(), chunked.has_partial_frame());
});
