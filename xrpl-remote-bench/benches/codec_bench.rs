//! Frame encoding and classification benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use xrpl_remote_protocol::codec::{decode_envelope, decode_response, encode_request};
use xrpl_remote_protocol::message::{RawCommand, SubmitCommand, TxResult};
use xrpl_remote_protocol::{Request, StreamKind};

const TX_HASH: &str = "E08D6E9754025BA2534A78707605E0601F03ACE063687A0CA1BDDACFCD1698C7";

fn create_tx_response(memo_size: usize) -> String {
    json!({
        "id": 1,
        "status": "success",
        "type": "response",
        "result": {
            "hash": TX_HASH,
            "ledger_index": 56865245,
            "validated": true,
            "TransactionType": "Payment",
            "Account": "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh",
            "Memos": [{"Memo": {"MemoData": "AB".repeat(memo_size)}}],
            "meta": {"TransactionResult": "tesSUCCESS"}
        }
    })
    .to_string()
}

fn bench_request_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");

    for size in [100, 1000, 10000] {
        let request = Request::new(1, SubmitCommand::from_bytes(vec![0x42u8; size]));

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| black_box(encode_request(request).unwrap()));
        });
    }

    group.finish();
}

fn bench_raw_encode(c: &mut Criterion) {
    let params = json!({"account": "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh", "ledger_index": "validated"});
    let Value::Object(params) = params else {
        unreachable!()
    };
    let request = Request::new(1, RawCommand::new("account_info", params));

    c.bench_function("raw_encode", |b| {
        b.iter(|| black_box(encode_request(&request).unwrap()));
    });
}

fn bench_envelope_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_classify");

    let response = create_tx_response(1000);
    let ledger = json!({
        "type": "ledgerClosed",
        "ledger_index": 56865246,
        "ledger_hash": TX_HASH,
        "ledger_time": 455751310,
        "txn_count": 42
    })
    .to_string();

    for (name, frame) in [("response", &response), ("stream", &ledger)] {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), frame, |b, frame| {
            b.iter(|| black_box(decode_envelope(frame).unwrap().classify()));
        });
    }

    group.finish();
}

fn bench_response_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_decode");

    for size in [100, 1000, 10000] {
        let frame = create_tx_response(size);

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| black_box(decode_response::<TxResult>(frame).unwrap()));
        });
    }

    group.finish();
}

fn bench_stream_decode(c: &mut Criterion) {
    let frame = json!({
        "type": "transaction",
        "engine_result": "tesSUCCESS",
        "engine_result_code": 0,
        "engine_result_message": "The transaction was applied.",
        "ledger_index": 56865246,
        "validated": true,
        "transaction": {"hash": TX_HASH, "TransactionType": "Payment"},
        "meta": {"TransactionResult": "tesSUCCESS"}
    })
    .to_string();

    c.bench_function("stream_decode_transaction", |b| {
        b.iter(|| black_box(StreamKind::Transaction.decode(&frame).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_request_encode,
    bench_raw_encode,
    bench_envelope_classify,
    bench_response_decode,
    bench_stream_decode,
);

criterion_main!(benches);
