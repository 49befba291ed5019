#[macro_use]
extern crate criterion;

use criterion::black_box;
use criterion::Criterion;
use pulsar::codec::{BinaryCodec, CodecResult};
use pulsar::dictionary::{DataDictionary, DictionaryKind, DictionaryParts, VERBOSITY_NORMAL, VERBOSITY_VERBOSE};
use pulsar::rdm::{Msg, MsgKey};
use std::fmt::Write;

const FIELD_COUNT: usize = 2000;
const ENUM_TABLE_COUNT: usize = 200;

/// Field and enum definitions in the text formats, large enough to span many parts.
fn generated_dictionary() -> DataDictionary {
    let mut fields = String::from("!tag Version 4.20.29\n");
    for fid in 1..=FIELD_COUNT {
        writeln!(
            fields,
            "FIELD_{0} \"GENERATED FIELD {0}\" {0} NULL PRICE 17 REAL64 7",
            fid
        )
        .unwrap();
    }

    let mut enums = String::from("!tag DT_Version 17.91\n");
    for table in 0..ENUM_TABLE_COUNT {
        writeln!(enums, "FIELD_{0} {0}", table + 1).unwrap();
        for value in 0..20 {
            writeln!(enums, "{} \"V{:03}\" generated value {}", value, value, value).unwrap();
        }
    }

    let mut dictionary = DataDictionary::new();
    dictionary.parse_field_dictionary(&fields).unwrap();
    dictionary.parse_enum_dictionary(&enums).unwrap();
    dictionary
}

fn encode_all(dictionary: &DataDictionary, kind: DictionaryKind, verbosity: u32, max_size: usize) -> Vec<Msg> {
    let key = MsgKey::named(kind.name()).with_service_id(1).with_filter(verbosity);

    DictionaryParts::new(&BinaryCodec, dictionary, kind, 3, key, max_size)
        .collect::<CodecResult<Vec<_>>>()
        .unwrap()
}

fn dictionary_parts(c: &mut Criterion) {
    let dictionary = generated_dictionary();

    c.bench_function("Field dictionary, normal verbosity", |b| {
        b.iter(|| black_box(encode_all(&dictionary, DictionaryKind::Field, VERBOSITY_NORMAL, 6144)))
    });

    c.bench_function("Field dictionary, verbose", |b| {
        b.iter(|| black_box(encode_all(&dictionary, DictionaryKind::Field, VERBOSITY_VERBOSE, 6144)))
    });

    c.bench_function("Enum type dictionary", |b| {
        b.iter(|| {
            black_box(encode_all(
                &dictionary,
                DictionaryKind::EnumType,
                VERBOSITY_VERBOSE,
                DictionaryKind::EnumType.max_part_size(6144),
            ))
        })
    });

    c.bench_function("Field dictionary rebuild", |b| {
        let parts = encode_all(&dictionary, DictionaryKind::Field, VERBOSITY_NORMAL, 6144);

        b.iter(|| {
            let mut rebuilt = DataDictionary::new();
            for part in &parts {
                if let pulsar::rdm::Data::Series(series) = &part.payload {
                    rebuilt.apply_field_part(series).unwrap();
                }
            }
            black_box(rebuilt)
        })
    });
}

criterion_group!(benches, dictionary_parts);
criterion_main!(benches);
