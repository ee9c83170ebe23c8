use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::tempdir;

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not
///
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    let ext = Path::new(output_file).extension().and_then(|x| x.to_str());
    match ext {
        Some("gz") => {
            let output_file = File::create(output_file)?;
            let encoder =
                flate2::write::GzEncoder::new(output_file, flate2::Compression::default());
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => {
            let output_file = File::create(output_file)?;
            Ok(Box::new(BufWriter::new(output_file)))
        }
    }
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
///
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let ext = Path::new(input_file).extension().and_then(|x| x.to_str());
    let file = File::open(input_file)?;
    match ext {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

///
/// Write every line into the output file, each followed by a newline
///
/// * `lines` - anything printable
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines<T>(lines: &[T], output_file: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        writeln!(buf, "{}", line)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {}", output_file, e))?;
    }
    buf.flush()
        .map_err(|e| anyhow::anyhow!("failed to write {}: {}", output_file, e))?;
    Ok(())
}

///
/// Read every line of the input file into memory
///
/// * `input_file` - file name--either gzipped or not
///
pub fn read_lines(input_file: &str) -> anyhow::Result<Vec<Box<str>>> {
    let buf = open_buf_reader(input_file)?;
    let mut lines = vec![];
    for x in buf.lines() {
        lines.push(x?.into_boxed_str());
    }
    Ok(lines)
}

///
/// Swap the extension of a file name, appending one if missing
/// * `file` - file name
/// * `ext` - new extension without the dot
///
pub fn with_extension(file: &str, ext: &str) -> anyhow::Result<Box<str>> {
    Path::new(file)
        .with_extension(ext)
        .to_str()
        .map(|x| x.to_string().into_boxed_str())
        .ok_or_else(|| anyhow::anyhow!("non-utf8 path: {}", file))
}

///
/// Create a temporary directory and suggest a file name
/// * `suffix` - suffix of the file name
///
pub fn create_temp_dir_file(suffix: &str) -> anyhow::Result<std::path::PathBuf> {
    let temp_dir = tempdir()?.path().to_path_buf();
    std::fs::create_dir_all(&temp_dir)?;
    let temp_file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile_in(temp_dir)?
        .path()
        .to_owned();

    Ok(temp_file)
}
