mod common;

use common::{dsmr5, seal, DSMR22};
use p1_rs::p1::{crc, TelegramBuffer, TelegramFramer};
use p1_rs::MockTransport;
use proptest::prelude::*;

async fn frame(source: &MockTransport, capacity: usize, max_fail_bytes: usize) -> Vec<u8> {
    let mut source = source.clone();
    let mut buffer = TelegramBuffer::with_capacity(capacity).unwrap();
    let len = TelegramFramer::new(max_fail_bytes)
        .read_telegram(&mut source, &mut buffer)
        .await;
    assert_eq!(len, buffer.len());
    buffer.as_slice().to_vec()
}

#[tokio::test]
async fn test_leading_and_trailing_noise_discarded() {
    let body = b"/ISK5\\2MT382-1000\r\n\r\n1-0:1.8.1(000123.456*kWh)\r\n!";
    let telegram = seal(body);

    let source = MockTransport::new();
    source.queue_rx_data(b"noise");
    source.queue_rx_data(&telegram);
    source.queue_rx_data(b"more-noise");

    let framed = frame(&source, 1024, 1024).await;
    assert_eq!(framed, telegram);
    assert!(crc::verify(&framed));
    assert_eq!(source.pending_rx(), b"more-noise".len());
}

#[tokio::test]
async fn test_consecutive_telegrams() {
    let source = MockTransport::new();
    source.queue_rx_data(DSMR22);
    source.queue_rx_data(&dsmr5());

    assert_eq!(frame(&source, 1024, 0).await, DSMR22);
    assert_eq!(frame(&source, 1024, 0).await, dsmr5());
    assert!(frame(&source, 1024, 0).await.is_empty());
}

#[tokio::test]
async fn test_unterminated_candidate_resyncs_without_budget() {
    let source = MockTransport::new();
    source.queue_rx_data(b"/");
    source.queue_rx_data(&[b'x'; 300]);
    source.queue_rx_data(DSMR22);

    assert_eq!(frame(&source, 128, 0).await, DSMR22);
}

#[tokio::test]
async fn test_garbled_tail_resyncs() {
    let source = MockTransport::new();
    source.queue_rx_data(b"/XMX5\r\n!zzzzzz\r\n\r\n");
    source.queue_rx_data(DSMR22);

    assert_eq!(frame(&source, 256, 0).await, DSMR22);
}

#[tokio::test]
async fn test_budget_exhausted_before_valid_telegram() {
    let source = MockTransport::new();
    source.queue_rx_data(b"/");
    source.queue_rx_data(&[b'x'; 40]);
    source.queue_rx_data(DSMR22);

    // The overflowing 16 byte candidate alone exceeds a budget of 10
    assert!(frame(&source, 16, 10).await.is_empty());
    assert!(source.pending_rx() >= DSMR22.len());
}

#[tokio::test]
async fn test_budget_accumulates_over_candidates() {
    let source = MockTransport::new();
    // Each bad candidate costs 4 + 6 probe bytes
    for _ in 0..3 {
        source.queue_rx_data(b"/AB!xxxxxx");
    }
    source.queue_rx_data(DSMR22);

    assert!(frame(&source, 256, 25).await.is_empty());

    let source = MockTransport::new();
    for _ in 0..3 {
        source.queue_rx_data(b"/AB!xxxxxx");
    }
    source.queue_rx_data(DSMR22);
    assert_eq!(frame(&source, 256, 31).await, DSMR22);
}

#[tokio::test]
async fn test_tail_probe_reads_past_a_timeout() {
    let source = MockTransport::new();
    source.queue_rx_data(b"/A!12");
    source.queue_rx_data(b"3");
    source.queue_rx_gap();
    source.queue_rx_data(b"\r\n");
    source.queue_rx_data(b"/B!\r\n");

    // The missed read still counts, so the CRLF is consumed by the bad candidate
    assert_eq!(frame(&source, 64, 0).await, b"/B!\r\n");
    assert_eq!(source.pending_rx(), 0);
}

#[tokio::test]
async fn test_exact_fit_telegram() {
    let source = MockTransport::new();
    source.queue_rx_data(DSMR22);
    assert_eq!(frame(&source, DSMR22.len(), 0).await, DSMR22);
}

proptest! {
    #[test]
    fn prop_noise_without_start_marker_is_skipped(
        noise in proptest::collection::vec(any::<u8>().prop_filter("no start marker", |b| *b != b'/'), 0..512)
    ) {
        let source = MockTransport::new();
        source.queue_rx_data(&noise);
        source.queue_rx_data(&dsmr5());

        let framed = tokio_test::block_on(frame(&source, 2048, 64));
        prop_assert_eq!(framed, dsmr5());
    }
}
