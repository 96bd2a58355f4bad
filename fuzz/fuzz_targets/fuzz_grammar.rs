#![no_main]

use libfuzzer_sys::fuzz_target;
use p1_rs::grammar::{ObisGrammar, ParseStatus, TelegramGrammar};

fuzz_target!(|data: &[u8]| {
    let mut grammar = ObisGrammar::new();
    grammar.init();

    // Feed in two chunks to exercise accumulation
    let (first, second) = data.split_at(data.len() / 2);
    grammar.execute(first, false);
    grammar.execute(second, true);
    let outcome = grammar.finish();

    if outcome.status == ParseStatus::Rejected {
        assert!(grammar.parsed().is_none());
    }
});
