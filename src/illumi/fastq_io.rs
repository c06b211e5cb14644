use std::cell::RefCell;
use std::fs;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;

use bio::io::fastq;

/// Lazy sequence of fastq records read from a file
pub type RecordIter = Box<dyn Iterator<Item = Result<fastq::Record>>>;

/// Returns true if the path names a gzip-compressed file
pub fn is_gzip<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .map_or(false, |ext| ext == "gz" || ext == "gzip")
}

/// Opens a fastq file, decompressing on the fly when the name ends
/// in `.gz`. Multi-member gzip files (e.g. concatenated lanes) are
/// read through to the end.
///
/// # Errors
///
/// An error variant is returned when the file cannot be opened. Parse
/// errors are reported lazily by the returned iterator.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<RecordIter> {
    let path = path.as_ref();
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;

    let input: Box<dyn Read> = if is_gzip(path) {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(file)
    };

    Ok(Box::new(
        fastq::Reader::new(input)
            .records()
            .map(|res| res.map_err(anyhow::Error::from)),
    ))
}

/// Handle on a gzip stream shared with the fastq writer, so the
/// stream can still be finished once the fastq writer is gone
struct GzStream<W: Write>(Rc<RefCell<GzEncoder<W>>>);

impl<W: Write> Write for GzStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

/// Writer for gzip-compressed fastq output
pub struct GzFastqWriter<W: Write = fs::File> {
    writer: fastq::Writer<GzStream<W>>,
    stream: Rc<RefCell<GzEncoder<W>>>,
    total: usize,
}

impl GzFastqWriter<fs::File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Self::new(file))
    }
}

impl<W: Write> GzFastqWriter<W> {
    pub fn new(inner: W) -> Self {
        let stream = Rc::new(RefCell::new(GzEncoder::new(inner, Compression::default())));
        GzFastqWriter {
            writer: fastq::Writer::new(GzStream(Rc::clone(&stream))),
            stream,
            total: 0,
        }
    }

    pub fn write_record(&mut self, fq: &fastq::Record) -> io::Result<()> {
        self.total += 1;
        self.writer.write_record(fq)
    }

    /// Returns the number of records written so far
    pub fn total(&self) -> usize {
        self.total
    }

    /// Flushes all buffered records through the compressor and writes
    /// the gzip trailer. Output is only complete when this succeeds.
    pub fn finish(self) -> io::Result<usize> {
        let GzFastqWriter {
            mut writer,
            stream,
            total,
        } = self;
        writer.flush()?;
        drop(writer);
        stream.borrow_mut().try_finish()?;
        Ok(total)
    }
}

/// Identity portion of a read header, i.e. the text before the first
/// whitespace. Mates of one fragment share this.
pub fn header_identity(fq: &fastq::Record) -> &str {
    fq.id()
}

/// Mate number annotation of a read header, taken from the first
/// `:`-separated field of the description (Casava 1.8 style,
/// `@ID 1:N:0:ACGT`).
pub fn mate_marker(fq: &fastq::Record) -> Option<&str> {
    fq.desc()
        .and_then(|desc| desc.split(':').next())
        .map(str::trim)
        .filter(|marker| !marker.is_empty())
}
