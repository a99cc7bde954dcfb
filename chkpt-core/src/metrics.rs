use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static RECORDS_CONSUMED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("chkpt_drain_records_total", "Records consumed while draining a checkpoint topic").unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static RECORDS_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("chkpt_drain_skipped_total", "Records skipped while draining a checkpoint topic"),
        &["reason"],
    )
    .unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static MESSAGES_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("chkpt_published_messages_total", "Checkpoint messages acknowledged by the broker").unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub static BYTES_WRITTEN: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(Opts::new("chkpt_bytes_written_total", "Total bytes written by sink"), &["sink"]).unwrap();
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
});

pub fn render_prometheus() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer).ok();
    String::from_utf8(buffer).unwrap_or_default()
}
