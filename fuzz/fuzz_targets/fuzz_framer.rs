#![no_main]

use libfuzzer_sys::fuzz_target;
use p1_rs::p1::{crc, TelegramBuffer, TelegramFramer};
use p1_rs::MockTransport;

fuzz_target!(|data: &[u8]| {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut source = MockTransport::new();
    source.queue_rx_data(data);
    let mut buffer = TelegramBuffer::with_capacity(256).unwrap();

    let len = runtime.block_on(TelegramFramer::new(0).read_telegram(&mut source, &mut buffer));
    if len > 0 {
        // Whatever the framer returns is a well-formed telegram
        assert_eq!(buffer.get(0), Some(b'/'));
        assert!(crc::telegram_style(buffer.as_slice()).is_some());
    }
});
