//! Lazy decompression of dump files.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use tracing::debug;

/// Size of the read buffers on both sides of the decoder.
pub const SOURCE_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Zstd,
}

impl Compression {
    /// Pick the decoder for a dump, trusting the file extension first and the magic bytes second.
    pub fn detect(path: &Path, head: &[u8]) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz") => return Compression::Gzip,
            Some("bz2") => return Compression::Bzip2,
            Some("zst") => return Compression::Zstd,
            _ => {}
        }

        if head.starts_with(&[0x1f, 0x8b]) {
            Compression::Gzip
        } else if head.starts_with(b"BZh") {
            Compression::Bzip2
        } else if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// Wrap `reader` into a buffered reader over the uncompressed bytes.
pub fn decompress<R: BufRead + Send + 'static>(
    reader: R,
    compression: Compression,
) -> io::Result<Box<dyn BufRead + Send>> {
    Ok(match compression {
        Compression::None => Box::new(reader),
        // Wikimedia dumps are concatenations of several gzip/bzip2 members
        Compression::Gzip => Box::new(BufReader::with_capacity(
            SOURCE_BUFFER_SIZE,
            flate2::bufread::MultiGzDecoder::new(reader),
        )),
        Compression::Bzip2 => Box::new(BufReader::with_capacity(
            SOURCE_BUFFER_SIZE,
            bzip2::bufread::MultiBzDecoder::new(reader),
        )),
        Compression::Zstd => Box::new(BufReader::with_capacity(
            SOURCE_BUFFER_SIZE,
            zstd::stream::Decoder::with_buffer(reader)?,
        )),
    })
}

/// Open a dump file and return its uncompressed contents as a lazily decoded stream.
pub fn open_dump(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let mut file = BufReader::with_capacity(SOURCE_BUFFER_SIZE, File::open(path)?);
    let head = file.fill_buf()?;
    let compression = Compression::detect(path, head);
    debug!(path = %path.display(), ?compression, "opening dump");
    decompress(file, compression)
}

/// Derive a short identifier for a dump file, e.g. `12` for `enwiki-latest-stub-meta-history12.xml.gz`.
///
/// Falls back to the file name without dump extensions when it does not end in a number.
pub fn partition_label(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut stem = name.as_str();
    for suffix in [".gz", ".bz2", ".zst"] {
        stem = stem.strip_suffix(suffix).unwrap_or(stem);
    }
    stem = stem.strip_suffix(".xml").unwrap_or(stem);

    let digits_start = stem
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    if digits_start < stem.len() {
        stem[digits_start..].to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read, Write};
    use std::path::PathBuf;

    const XML: &str = "<mediawiki><page><title>A</title></page></mediawiki>";

    fn read_to_string(mut reader: impl Read) -> io::Result<String> {
        let mut out = String::new();
        reader.read_to_string(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_detect_by_extension_and_magic() {
        assert_eq!(
            Compression::detect(Path::new("dump.xml.gz"), b""),
            Compression::Gzip
        );
        assert_eq!(
            Compression::detect(Path::new("dump.xml.bz2"), b""),
            Compression::Bzip2
        );
        assert_eq!(
            Compression::detect(Path::new("dump.xml.zst"), b""),
            Compression::Zstd
        );
        assert_eq!(
            Compression::detect(Path::new("dump"), &[0x1f, 0x8b, 8]),
            Compression::Gzip
        );
        assert_eq!(
            Compression::detect(Path::new("dump"), b"BZh91AY"),
            Compression::Bzip2
        );
        assert_eq!(
            Compression::detect(Path::new("dump.xml"), b"<mediawiki"),
            Compression::None
        );
    }

    #[test]
    fn test_gzip_round_trip() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(XML.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let reader = decompress(Cursor::new(compressed), Compression::Gzip).unwrap();
        assert_eq!(read_to_string(reader).unwrap(), XML);
    }

    #[test]
    fn test_bzip2_round_trip() {
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(XML.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let reader = decompress(Cursor::new(compressed), Compression::Bzip2).unwrap();
        assert_eq!(read_to_string(reader).unwrap(), XML);
    }

    #[test]
    fn test_zstd_round_trip() {
        let compressed = zstd::stream::encode_all(XML.as_bytes(), 3).unwrap();
        let reader = decompress(Cursor::new(compressed), Compression::Zstd).unwrap();
        assert_eq!(read_to_string(reader).unwrap(), XML);
    }

    #[test]
    fn test_truncated_bzip2_is_an_io_error() {
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(XML.repeat(50).as_bytes()).unwrap();
        let mut compressed = encoder.finish().unwrap();
        compressed.truncate(compressed.len() / 2);

        let reader = decompress(Cursor::new(compressed), Compression::Bzip2).unwrap();
        assert!(read_to_string(reader).is_err());
    }

    #[test]
    fn test_open_dump_sniffs_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.xml");
        std::fs::write(&path, XML).unwrap();
        assert_eq!(read_to_string(open_dump(&path).unwrap()).unwrap(), XML);
    }

    #[test]
    fn test_partition_label() {
        let label = |name: &str| partition_label(&PathBuf::from(name));
        assert_eq!(label("enwiki-latest-stub-meta-history12.xml.gz"), "12");
        assert_eq!(label("/data/enwiki-latest-stub-meta-history1.xml"), "1");
        assert_eq!(label("sample.xml.bz2"), "sample");
    }
}
