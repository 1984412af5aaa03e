use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::fs;

use mzfilter::io::traits::{MemorySource, SpectrumSource};
use mzfilter::io::{run_pipeline, MzMLReader};
use mzfilter::spectrum::bindata::codec;
use mzfilter::spectrum::{BinaryCompressionType, BinaryDataArrayType};
use mzfilter::{FilterChain, Spectrum};

fn profile(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mzs: Vec<f64> = (0..n).map(|i| 200.0 + i as f64 * 0.01).collect();
    let intensities: Vec<f64> = (0..n)
        .map(|i| 1000.0 * (1.0 + (i as f64 * 0.05).sin()))
        .collect();
    (mzs, intensities)
}

fn codec_round_trip(c: &mut Criterion) {
    let (mzs, _) = profile(50000);
    for compression in [
        BinaryCompressionType::NoCompression,
        BinaryCompressionType::Zlib,
        BinaryCompressionType::NumpressLinear,
    ] {
        let name = format!("encode_decode_{compression}");
        c.bench_function(&name, |b| {
            b.iter(|| {
                let bytes =
                    codec::encode(black_box(&mzs), BinaryDataArrayType::Float64, compression)
                        .unwrap();
                codec::decode(&bytes, &BinaryDataArrayType::Float64, compression).unwrap()
            })
        });
    }
}

fn filter_chain(c: &mut Criterion) {
    let (mzs, intensities) = profile(20000);
    let spectra: Vec<Spectrum> = (0..20)
        .map(|i| {
            Spectrum::new(format!("scan={i}"), i, 1)
                .with_mz_intensity(mzs.clone(), intensities.clone())
        })
        .collect();
    let chain = FilterChain::parse(["sgolay:7,2", "baseline:500", "resample:0.05"]).unwrap();
    c.bench_function("filter_chain_memory", |b| {
        b.iter(|| {
            let mut source = MemorySource::new(black_box(spectra.clone()));
            let mut sink: Vec<Spectrum> = Vec::new();
            run_pipeline(&mut source, &chain, &mut sink).unwrap();
            assert!(source.pull_next_spectrum().unwrap().is_none());
            sink.len()
        })
    });
}

fn read_fixture(c: &mut Criterion) {
    c.bench_function("read_small_mzml", |b| {
        b.iter(|| {
            let file = fs::File::open(black_box("./test/data/small.mzML")).unwrap();
            let reader = MzMLReader::new(file).unwrap();
            let total: usize = reader.map(|s| s.unwrap().mzs().unwrap().len()).sum();
            assert_eq!(total, 32);
        })
    });
}

criterion_group!(benches, codec_round_trip, filter_chain, read_fixture);
criterion_main!(benches);
