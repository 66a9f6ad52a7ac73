use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Common interface of the plain-text formats exchanged with simulation engines.
///
/// Implementors only provide stream-based parsing and serialization; the
/// path-based helpers are derived from them.
pub trait PlainTextFile {
    /// The in-memory representation of a whole file.
    type Content;

    /// The error type for parsing and I/O failures.
    type Error: Error + From<io::Error>;

    /// Parses a complete file from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is malformed or reading fails.
    fn read_from(reader: &mut impl BufRead) -> Result<Self::Content, Self::Error>;

    /// Serializes `content` to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be represented or writing fails.
    fn write_to(content: &Self::Content, writer: &mut impl Write) -> Result<(), Self::Error>;

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self::Content, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    fn write_to_path<P: AsRef<Path>>(content: &Self::Content, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(content, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
