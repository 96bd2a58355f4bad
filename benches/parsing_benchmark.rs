use criterion::{black_box, criterion_group, criterion_main, Criterion};
use p1_rs::grammar::{ObisGrammar, TelegramGrammar};
use p1_rs::p1::{crc, crc16, TelegramBuffer, TelegramFramer};
use p1_rs::util::hex::format_crc;
use p1_rs::MockTransport;

const BODY: &[u8] = b"/ISK5\\2M550T-1012\r\n\r\n1-3:0.2.8(50)\r\n0-0:1.0.0(200601120016S)\r\n\
0-0:96.1.1(4530303434303037313331363530363137)\r\n1-0:1.8.1(001581.123*kWh)\r\n\
1-0:1.8.2(001435.706*kWh)\r\n1-0:2.8.1(000000.000*kWh)\r\n1-0:2.8.2(000000.000*kWh)\r\n\
0-0:96.14.0(0002)\r\n1-0:1.7.0(00.192*kW)\r\n1-0:2.7.0(00.000*kW)\r\n\
0-1:24.2.1(200601120000S)(00981.443*m3)\r\n!";

fn telegram() -> Vec<u8> {
    let mut telegram = BODY.to_vec();
    telegram.extend_from_slice(format_crc(crc16(BODY)).as_bytes());
    telegram.extend_from_slice(b"\r\n");
    telegram
}

fn benchmark_crc(c: &mut Criterion) {
    let data = telegram();

    c.bench_function("crc_compute", |b| {
        b.iter(|| black_box(crc::compute(black_box(&data))))
    });
}

fn benchmark_framer(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut input = vec![b'x'; 256];
    input.extend_from_slice(&telegram());
    let framer = TelegramFramer::new(0);

    c.bench_function("read_telegram", |b| {
        b.iter(|| {
            let mut source = MockTransport::new();
            source.queue_rx_data(&input);
            let mut buffer = TelegramBuffer::with_capacity(4096).unwrap();
            let len = runtime.block_on(framer.read_telegram(&mut source, &mut buffer));
            black_box(len)
        })
    });
}

fn benchmark_grammar(c: &mut Criterion) {
    let data = telegram();
    let mut grammar = ObisGrammar::new();

    c.bench_function("obis_grammar", |b| {
        b.iter(|| {
            grammar.init();
            grammar.execute(black_box(&data), true);
            black_box(grammar.finish())
        })
    });
}

criterion_group!(benches, benchmark_crc, benchmark_framer, benchmark_grammar);
criterion_main!(benches);
