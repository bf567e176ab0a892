//! Append-only destinations for flattened revision rows.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::Path,
};

use crate::{flatten::FlatRevisionRow, source::SOURCE_BUFFER_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error while writing rows")]
    Io(#[from] io::Error),
    #[error("failed to encode or decode row")]
    Csv(#[from] csv::Error),
    #[error("sink rejected row: {0}")]
    Rejected(String),
}

/// Destination for the rows of one partition.
///
/// Rows appended since the last successful [`RowSink::flush`] are not considered durable.
pub trait RowSink {
    fn append(&mut self, row: &FlatRevisionRow) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError>;

    /// Flush and release the destination. Nothing may be appended afterwards.
    fn finish(&mut self) -> Result<(), SinkError> {
        self.flush()
    }
}

impl<S: RowSink + ?Sized> RowSink for &mut S {
    fn append(&mut self, row: &FlatRevisionRow) -> Result<(), SinkError> {
        (**self).append(row)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// Writes rows as CSV with a header row.
pub struct CsvRowSink<W: Write = BufWriter<File>> {
    writer: csv::Writer<W>,
    rows_written: u64,
}

impl CsvRowSink {
    /// Start a new file at `path`, truncating any previous content.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::with_capacity(
            SOURCE_BUFFER_SIZE,
            file,
        )))
    }

    /// Continue the file at `path`. The header row is only written if the file is new or empty.
    pub fn open_append(path: &Path) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let has_headers = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(has_headers)
            .from_writer(BufWriter::with_capacity(SOURCE_BUFFER_SIZE, file));
        Ok(Self {
            writer,
            rows_written: 0,
        })
    }
}

impl<W: Write> CsvRowSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            rows_written: 0,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(io::Error::new(e.error().kind(), e.to_string())))
    }
}

impl<W: Write> RowSink for CsvRowSink<W> {
    fn append(&mut self, row: &FlatRevisionRow) -> Result<(), SinkError> {
        self.writer.serialize(row)?;
        self.rows_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps all rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<FlatRevisionRow>,
    /// Number of rows covered by the last flush.
    pub flushed: usize,
    pub finished: bool,
}

impl RowSink for MemorySink {
    fn append(&mut self, row: &FlatRevisionRow) -> Result<(), SinkError> {
        if self.finished {
            return Err(SinkError::Rejected("sink already finished".to_string()));
        }
        self.rows.push(row.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.flushed = self.rows.len();
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.flush()?;
        self.finished = true;
        Ok(())
    }
}

/// Stream rows back from a file written by [`CsvRowSink`].
pub fn read_rows(
    path: &Path,
) -> Result<impl Iterator<Item = Result<FlatRevisionRow, SinkError>>, SinkError> {
    let reader = csv::Reader::from_path(path)?;
    Ok(reader
        .into_deserialize()
        .map(|row| row.map_err(SinkError::from)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dump_parser::{Contributor, DumpParser},
        flatten::flatten_page,
        test_support::prelude::*,
    };

    #[test]
    fn test_csv_round_trip() {
        let mut page = page_with_hashes(3, "Doe, Jane \"JD\"", &[Some("a"), None, Some("b")]);
        page.is_redirect = true;
        page.redirect_target = Some("Jane Doe".into());
        page.revisions[1].comment = Some("rv, \"vandalism\"\nsecond line".into());
        page.revisions[1].contributor = Some(Contributor::Anonymous {
            ip: "2001:db8::1".into(),
        });
        page.revisions[2].contributor = None;
        page.revisions[2].byte_size = None;
        page.revisions[2].is_minor = true;
        let rows: Vec<_> = flatten_page(&page).collect();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revisions_1.csv");
        let mut sink = CsvRowSink::create(&path).unwrap();
        for row in &rows {
            sink.append(row).unwrap();
        }
        sink.finish().unwrap();
        assert_eq!(sink.rows_written(), 3);
        drop(sink);

        let read: Vec<_> = read_rows(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(read, rows);
    }

    #[test]
    fn test_open_append_continues_file() {
        let rows = rows_with_hashes(&[Some("a"), Some("b"), Some("c")]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revisions_2.csv");

        // a missing file gets a header
        let mut sink = CsvRowSink::open_append(&path).unwrap();
        sink.append(&rows[0]).unwrap();
        sink.finish().unwrap();
        drop(sink);

        let mut sink = CsvRowSink::open_append(&path).unwrap();
        for row in &rows[1..] {
            sink.append(row).unwrap();
        }
        sink.finish().unwrap();
        assert_eq!(sink.rows_written(), 2);
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("page_id,").count(), 1);
        let read: Vec<_> = read_rows(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(read, rows);
    }

    #[test]
    fn test_untitled_redirect_survives_csv() {
        let xml = r#"<mediawiki>
  <page>
    <title>Old Name</title>
    <ns>0</ns>
    <id>5</id>
    <redirect />
    <revision>
      <id>50</id>
      <timestamp>2012-03-04T05:06:07Z</timestamp>
      <text bytes="12" sha1="0000000000000000000000000000001" />
    </revision>
  </page>
</mediawiki>"#;
        let page = DumpParser::new(xml.as_bytes()).parse_page().unwrap().unwrap();
        assert!(page.is_redirect);
        assert_eq!(page.redirect_target, None);

        let rows: Vec<_> = flatten_page(&page).collect();
        let mut sink = CsvRowSink::from_writer(Vec::new());
        sink.append(&rows[0]).unwrap();
        let out = sink.into_inner().unwrap();

        let read: Vec<FlatRevisionRow> = csv::Reader::from_reader(out.as_slice())
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(read, rows);
        assert!(read[0].is_redirect);
        assert_eq!(read[0].redirect_target, None);
    }

    #[test]
    fn test_csv_header_and_absent_fields() {
        let rows = rows_with_hashes(&[None]);
        let mut sink = CsvRowSink::from_writer(Vec::new());
        sink.append(&rows[0]).unwrap();
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();

        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("page_id,page_title,is_redirect,redirect_target,revision_id,parent_id,timestamp,contributor_username,contributor_id,contributor_ip,comment,is_minor,text_bytes,text_sha1")
        );
        assert_eq!(
            lines.next(),
            Some("1,Page,false,,1001,,2004-11-09T11:33:20Z,Dummy,1,,,false,10,")
        );
    }

    #[test]
    fn test_memory_sink_tracks_flushes() {
        let rows = rows_with_hashes(&[Some("a"), Some("b")]);
        let mut sink = MemorySink::default();
        sink.append(&rows[0]).unwrap();
        sink.flush().unwrap();
        sink.append(&rows[1]).unwrap();
        assert_eq!(sink.flushed, 1);
        sink.finish().unwrap();
        assert_eq!(sink.flushed, 2);
        assert!(matches!(sink.append(&rows[0]), Err(SinkError::Rejected(_))));
    }
}
