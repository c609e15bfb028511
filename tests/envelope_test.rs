//! E2E tests for raw batch framing (write → parse → verify)
//!
//! Fragment headers and payloads are generated from seeded random numbers.

use focal_rs::common::{FatalInputError, InteractionRecord};
use focal_rs::decoder::envelope::{BATCH_HEADER_SIZE, FRAGMENT_HEADER_SIZE};
use focal_rs::decoder::{RawBatch, RawBatchWriter, SourceKind};
use rand::prelude::*;
use rand::rngs::StdRng;

struct FragmentFixture {
    source: SourceKind,
    fec_id: u16,
    ir: InteractionRecord,
    payload: Vec<u8>,
}

fn make_fragments(rng: &mut StdRng, count: usize) -> Vec<FragmentFixture> {
    (0..count)
        .map(|_| {
            let source = if rng.gen_bool(0.5) {
                SourceKind::Pad
            } else {
                SourceKind::Pixel
            };
            let len = rng.gen_range(0..64);
            FragmentFixture {
                source,
                fec_id: if source == SourceKind::Pixel { rng.gen() } else { 0 },
                ir: InteractionRecord::new(rng.gen(), rng.gen_range(0..3564)),
                payload: (0..len).map(|_| rng.gen()).collect(),
            }
        })
        .collect()
}

fn write(fragments: &[FragmentFixture]) -> Vec<u8> {
    let mut writer = RawBatchWriter::new();
    for f in fragments {
        writer.push(f.source, f.fec_id, f.ir, &f.payload);
    }
    assert_eq!(writer.len(), fragments.len());
    writer.finish()
}

#[test]
fn random_batches_parse_back() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let count = rng.gen_range(0..40);
        let fragments = make_fragments(&mut rng, count);
        let bytes = write(&fragments);

        let expected_len = BATCH_HEADER_SIZE
            + fragments
                .iter()
                .map(|f| FRAGMENT_HEADER_SIZE + f.payload.len())
                .sum::<usize>();
        assert_eq!(bytes.len(), expected_len);

        let batch = RawBatch::parse(&bytes).expect("parse");
        assert_eq!(batch.len(), count);
        for (parsed, fixture) in batch.fragments().iter().zip(&fragments) {
            assert_eq!(parsed.source, fixture.source);
            assert_eq!(parsed.fec_id, fixture.fec_id);
            assert_eq!(parsed.interaction, fixture.ir);
            assert_eq!(parsed.payload, fixture.payload.as_slice());
        }
    }
}

#[test]
fn every_truncation_is_fatal() {
    let mut rng = StdRng::seed_from_u64(3);
    let fragments = make_fragments(&mut rng, 5);
    let bytes = write(&fragments);

    for cut in 0..bytes.len() {
        let result = RawBatch::parse(&bytes[..cut]);
        assert!(result.is_err(), "prefix of {} bytes parsed", cut);
    }
}

#[test]
fn count_beyond_data_is_fatal() {
    let mut rng = StdRng::seed_from_u64(8);
    let fragments = make_fragments(&mut rng, 3);
    let mut bytes = write(&fragments);
    bytes[8..12].copy_from_slice(&4u32.to_le_bytes());
    assert_eq!(
        RawBatch::parse(&bytes).unwrap_err(),
        FatalInputError::TruncatedHeader { index: 3 }
    );

    bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(RawBatch::parse(&bytes).is_err());
}

#[test]
fn corrupt_field_reports_fragment_index() {
    let mut rng = StdRng::seed_from_u64(17);
    let fragments = make_fragments(&mut rng, 4);
    let mut bytes = write(&fragments);

    // Header of the third fragment
    let offset = BATCH_HEADER_SIZE
        + fragments[..2]
            .iter()
            .map(|f| FRAGMENT_HEADER_SIZE + f.payload.len())
            .sum::<usize>();

    let mut unknown = bytes.clone();
    unknown[offset] = 7;
    assert_eq!(
        RawBatch::parse(&unknown).unwrap_err(),
        FatalInputError::UnknownSource { index: 2, value: 7 }
    );

    bytes[offset + 8..offset + 10].copy_from_slice(&4000u16.to_le_bytes());
    assert_eq!(
        RawBatch::parse(&bytes).unwrap_err(),
        FatalInputError::InvalidBunchCrossing { index: 2, bc: 4000 }
    );
}
