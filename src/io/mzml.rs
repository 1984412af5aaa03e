//! Implements a streaming parser and writer for the PSI-MS mzML and indexedmzML XML file
//! formats for representing raw and processed mass spectra.

mod reader;
mod reading_shared;
mod writer;

pub use reader::{scan_mz_range, MzMLDocument, MzMLReader};
pub use reading_shared::{MzMLParserError, MzMLParserState, ParserResult};
pub use writer::{MzMLWriter, MzMLWriterError, MzMLWriterState, WriterResult, SOFTWARE_ID};

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::{self, Read};
    use std::path::Path;

    use sha1::{Digest, Sha1};

    use super::*;
    use crate::filter::{FilterChain, FilterOutcome, SpectrumFilter};
    use crate::io::traits::{SpectrumSource, SpectrumWriter};
    use crate::params::{ParamDescribed, Unit};
    use crate::spectrum::{
        ArrayType, BinaryCompressionType, BinaryDataArrayType, RetentionTime, Spectrum,
    };

    const INDEXED: &str = "./test/data/small.mzML";
    const UNINDEXED: &str = "./test/data/small_unindexed.mzML";

    fn read_all<P: AsRef<Path>>(path: P) -> (Vec<Spectrum>, MzMLDocument) {
        let mut reader = MzMLReader::open_path(path).unwrap();
        let spectra: Vec<Spectrum> = reader.iter().map(|s| s.unwrap()).collect();
        (spectra, reader.into_document())
    }

    fn between<'a>(text: &'a str, open: &str, close: &str) -> &'a str {
        let start = text.find(open).unwrap() + open.len();
        let end = start + text[start..].find(close).unwrap();
        &text[start..end]
    }

    /// Write `spectra` into `document` at a temporary path, returning the written text
    fn write_through(
        spectra: Vec<Spectrum>,
        document: MzMLDocument,
        chain: &FilterChain,
    ) -> String {
        let tmpdir = tempfile::tempdir().unwrap();
        let path = tmpdir.path().join("out.mzML");
        let trailer = document.trailer.clone();
        let mut writer = MzMLWriter::create_path(&path, document)
            .unwrap()
            .with_processing(chain.specs());
        for spectrum in spectra {
            if let FilterOutcome::Kept(spectrum) = chain.apply(spectrum) {
                writer.push_spectrum(spectrum).unwrap();
            }
        }
        writer.set_trailer(trailer);
        writer.close().unwrap();
        drop(writer);
        fs::read_to_string(&path).unwrap()
    }

    #[test_log::test]
    fn test_read_indexed() {
        let mut reader = MzMLReader::open_path(INDEXED).unwrap();
        assert!(reader.is_indexed());
        assert_eq!(reader.reference_param_groups().len(), 1);
        assert!(reader.document().trailer.is_empty());

        let spectra: Vec<Spectrum> = reader.iter().map(|s| s.unwrap()).collect();
        assert_eq!(spectra.len(), 4);
        let levels: Vec<u8> = spectra.iter().map(|s| s.ms_level).collect();
        assert_eq!(levels, [1, 2, 1, 2]);
        for (i, s) in spectra.iter().enumerate() {
            assert_eq!(s.index, i);
            assert_eq!(s.id, format!("controllerType=0 controllerNumber=1 scan={}", i + 1));
            assert!(s.has_markup());
        }

        let first = &spectra[0];
        assert_eq!(first.start_time_in(Unit::Minute), Some(0.5));
        assert!(first.get_param_by_accession("MS:1000579").is_some());
        let mz = first.arrays.get(&ArrayType::MZArray).unwrap();
        assert_eq!(mz.dtype, BinaryDataArrayType::Float64);
        assert_eq!(mz.compression, BinaryCompressionType::Zlib);
        assert_eq!(mz.unit, Unit::MZ);
        assert_eq!(mz.len(), 12);
        assert_eq!(mz.values()[3], 201.5);
        let intensity = first.arrays.get(&ArrayType::IntensityArray).unwrap();
        assert_eq!(intensity.dtype, BinaryDataArrayType::Float32);
        assert_eq!(intensity.values()[10], 900.0);

        let third = &spectra[2];
        let mz = third.arrays.get(&ArrayType::MZArray).unwrap();
        assert_eq!(mz.dtype, BinaryDataArrayType::Float32);
        assert_eq!(mz.values()[11], 205.5);
        let intensity = third.arrays.get(&ArrayType::IntensityArray).unwrap();
        assert_eq!(intensity.dtype, BinaryDataArrayType::Float64);
        assert_eq!(intensity.compression, BinaryCompressionType::NoCompression);

        let last = &spectra[3];
        assert_eq!(last.retention_time.unwrap().unit, Unit::Second);
        assert_eq!(last.start_time_in(Unit::Second), Some(48.0));
        assert_eq!(last.intensities().unwrap(), &[5.0, 50.0, 500.0]);

        assert!(reader.pull_next_spectrum().unwrap().is_none());
        let document = reader.document();
        let has_chromatogram = document.trailer.iter().any(|e| {
            matches!(e, quick_xml::events::Event::Start(t) if t.name().as_ref() == b"chromatogram")
        });
        assert!(has_chromatogram);
        let has_index = document.trailer.iter().any(|e| {
            matches!(e, quick_xml::events::Event::Start(t) if t.name().as_ref() == b"indexList")
        });
        assert!(!has_index);
    }

    #[test]
    fn test_indexed_and_unindexed_agree() {
        let (indexed, _) = read_all(INDEXED);
        let (plain, document) = read_all(UNINDEXED);
        assert!(!document.indexed);
        assert_eq!(indexed.len(), plain.len());
        for (a, b) in indexed.iter().zip(plain.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.retention_time, b.retention_time);
            assert_eq!(a.arrays, b.arrays);
        }
    }

    #[test_log::test]
    fn test_round_trip_empty_chain() {
        let (spectra, document) = read_all(INDEXED);
        let text = write_through(spectra.clone(), document, &FilterChain::new());
        let mut reader = MzMLReader::new(text.as_bytes()).unwrap();
        assert!(reader.is_indexed());
        let written: Vec<Spectrum> = reader.iter().map(|s| s.unwrap()).collect();
        assert_eq!(written.len(), spectra.len());
        for (a, b) in written.iter().zip(spectra.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.ms_level, b.ms_level);
            assert_eq!(a.retention_time, b.retention_time);
            assert_eq!(a.arrays, b.arrays);
        }
        assert_eq!(reader.reference_param_groups().len(), 1);
        assert!(text.contains(
            r#"<spectrumList count="4" defaultDataProcessingRef="pwiz_Reader_Thermo_conversion">"#
        ));
        assert!(text.contains(r#"<chromatogramList count="1""#));
        assert!(text.contains("<activation>"));
    }

    #[test_log::test]
    fn test_filtered_output() {
        let (spectra, document) = read_all(INDEXED);
        let chain = FilterChain::parse(["mslevel:2", "baseline:10", "to_minutes"]).unwrap();
        let text = write_through(spectra, document, &chain);
        assert!(text.contains(r#"<spectrumList count="2""#));
        assert!(text.contains(r#"<softwareList count="2">"#));
        assert!(text.contains(r#"<processingMethod order="1" softwareRef="mzfilter">"#));
        assert!(text.contains(r#"<userParam name="mslevel" value="2"/>"#));

        let mut reader = MzMLReader::new(text.as_bytes()).unwrap();
        let written: Vec<Spectrum> = reader.iter().map(|s| s.unwrap()).collect();
        let indices: Vec<usize> = written.iter().map(|s| s.index).collect();
        assert_eq!(indices, [0, 1]);
        assert_eq!(written[0].intensities().unwrap(), &[10.0, 250.0, 75.0]);
        assert_eq!(written[0].mzs().unwrap(), &[150.25, 175.5, 422.125]);
        assert_eq!(written[1].intensities().unwrap(), &[50.0, 500.0]);
        let rt = written[1].retention_time.unwrap();
        assert_eq!(rt.unit, Unit::Minute);
        assert!((rt.value - 0.8).abs() < 1e-12);
        assert!(text.contains(
            r#"<spectrum index="1" id="controllerType=0 controllerNumber=1 scan=4" defaultArrayLength="2">"#
        ));
    }

    #[test]
    fn test_output_index() {
        let (spectra, document) = read_all(INDEXED);
        let chain = FilterChain::parse(["mslevel:1"]).unwrap();
        let text = write_through(spectra, document, &chain);
        let bytes = text.as_bytes();

        let offset: usize = between(&text, "<indexListOffset>", "<").parse().unwrap();
        assert!(bytes[offset..].starts_with(b"<indexList count=\"2\">"));

        let mut n_offsets = 0;
        for chunk in text.split("<offset idRef=\"").skip(1) {
            let (id, rest) = chunk.split_once('"').unwrap();
            let position: usize = between(rest, ">", "<").parse().unwrap();
            let tag = if id == "TIC" { "<chromatogram " } else { "<spectrum " };
            assert!(text[position..].starts_with(tag), "{id} at {position}");
            assert!(text[position..].contains(&format!(r#"id="{id}""#)));
            n_offsets += 1;
        }
        assert_eq!(n_offsets, 3);

        let marker = "<fileChecksum>";
        let end = text.find(marker).unwrap() + marker.len();
        let expected = base16ct::lower::encode_string(&Sha1::digest(&bytes[..end]));
        assert_eq!(between(&text, marker, "<"), expected);
    }

    #[test]
    fn test_unindexed_output() {
        let (spectra, document) = read_all(UNINDEXED);
        let text = write_through(spectra, document, &FilterChain::new());
        assert!(!text.contains("<indexList"));
        assert!(!text.contains("indexedmzML"));
        assert!(text.trim_end().ends_with("</mzML>"));
        let reader = MzMLReader::new(text.as_bytes()).unwrap();
        assert_eq!(reader.count(), 4);
    }

    #[test_log::test]
    fn test_scan_time_from_param_group() -> io::Result<()> {
        let mut text = String::new();
        fs::File::open(UNINDEXED)?.read_to_string(&mut text)?;
        let text = text
            .replacen(
                r#"<referenceableParamGroupList count="1">"#,
                r#"<referenceableParamGroupList count="2">
    <referenceableParamGroup id="FirstScan">
      <cvParam cvRef="MS" accession="MS:1000512" name="filter string" value="FTMS + p NSI Full ms"/>
      <cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="30" unitCvRef="UO" unitAccession="UO:0000010" unitName="second"/>
    </referenceableParamGroup>"#,
                1,
            )
            .replacen(
                r#"<cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="0.5" unitCvRef="UO" unitAccession="UO:0000031" unitName="minute"/>"#,
                r#"<referenceableParamGroupRef ref="FirstScan"/>"#,
                1,
            );
        let mut reader = MzMLReader::new(text.as_bytes())?;
        let spectra: Vec<Spectrum> = reader.iter().map(|s| s.unwrap()).collect();
        assert_eq!(spectra[0].start_time_in(Unit::Second), Some(30.0));
        let document = reader.into_document();

        let chain = FilterChain::parse(["to_minutes"]).unwrap();
        let written = write_through(spectra, document, &chain);
        let first = between(&written, "scan=1\"", "</spectrum>");
        assert!(!first.contains(r#"ref="FirstScan""#));
        assert_eq!(first.matches("MS:1000016").count(), 1);
        assert!(first.contains(r#"name="filter string" value="FTMS + p NSI Full ms""#));
        assert!(first.contains(
            r#"value="0.5" unitCvRef="UO" unitAccession="UO:0000031" unitName="minute""#
        ));

        let mut reader = MzMLReader::new(written.as_bytes())?;
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.retention_time, Some(RetentionTime::minutes(0.5)));
        Ok(())
    }

    #[test]
    fn test_scan_mz_range() {
        let mut reader = MzMLReader::open_path(INDEXED).unwrap();
        let range = scan_mz_range(&mut reader).unwrap();
        assert_eq!(range, Some((200.0, 205.5)));
    }

    #[test]
    fn test_truncated_document() -> io::Result<()> {
        let mut text = String::new();
        fs::File::open(UNINDEXED)?.read_to_string(&mut text)?;
        let cut = text.find("</spectrum>").unwrap() + 300;
        let mut reader = MzMLReader::new(text[..cut].as_bytes())?;
        let first = reader.next();
        assert!(matches!(first, Some(Ok(_))));
        let second = reader.next();
        assert!(matches!(second, Some(Err(_))));
        assert_eq!(reader.state, MzMLParserState::ParserError);
        assert!(reader.next().is_none());
        Ok(())
    }
}
