//! Helpers to read and extract gzip-compressed files.
//!
//! Compression is detected from the file extension; plain files pass
//! through untouched, so callers do not need to care which one they got.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

/// Opens a file for reading, transparently decompressing `*.gz` content.
pub fn open_gz_file(path: &Path) -> Result<Box<dyn BufRead>> {
    let reader = oneio::get_reader(&path.to_string_lossy())
        .map_err(|e| anyhow!("Failed to open '{}': {e}", path.display()))?;
    Ok(Box::new(BufReader::new(reader)))
}

/// Extracts `src` into `dst_dir`, decompressing `*.gz` files and copying
/// anything else as-is. Returns the path of the extracted file.
pub fn extract_file(src: &Path, dst_dir: &Path) -> Result<PathBuf> {
    let file_name = src
        .file_name()
        .ok_or_else(|| anyhow!("'{}' has no file name", src.display()))?;
    let out_name = if src.extension().is_some_and(|ext| ext == "gz") {
        Path::new(file_name)
            .file_stem()
            .ok_or_else(|| anyhow!("'{}' has no file stem", src.display()))?
            .to_os_string()
    } else {
        file_name.to_os_string()
    };
    fs::create_dir_all(dst_dir)
        .with_context(|| format!("Failed to create '{}'", dst_dir.display()))?;
    let out_path = dst_dir.join(out_name);
    let mut reader = open_gz_file(src)?;
    let mut out = File::create(&out_path)
        .with_context(|| format!("Failed to create '{}'", out_path.display()))?;
    io::copy(&mut reader, &mut out)
        .with_context(|| format!("Failed to extract '{}'", src.display()))?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    const SAMPLE: &str = "AGTC\nTCGA\n";

    fn write_gz(path: &Path, content: &str) {
        let mut writer = oneio::get_writer(&path.to_string_lossy()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_open_gz_file_compressed() {
        let tmp = tempfile::tempdir().unwrap();
        let gz = tmp.path().join("sample.txt.gz");
        write_gz(&gz, SAMPLE);

        let mut content = String::new();
        open_gz_file(&gz).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, SAMPLE);
    }

    #[test]
    fn test_open_gz_file_plain() {
        let tmp = tempfile::tempdir().unwrap();
        let plain = tmp.path().join("sample.txt");
        fs::write(&plain, SAMPLE).unwrap();

        let mut content = String::new();
        open_gz_file(&plain)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, SAMPLE);
    }

    #[test]
    fn test_extract_file() {
        let tmp = tempfile::tempdir().unwrap();
        let gz = tmp.path().join("sample.txt.gz");
        write_gz(&gz, SAMPLE);
        let out_dir = tmp.path().join("out");

        let extracted = extract_file(&gz, &out_dir).unwrap();
        assert_eq!(extracted, out_dir.join("sample.txt"));
        assert_eq!(fs::read_to_string(&extracted).unwrap(), SAMPLE);

        // Plain files are copied through under their own name
        let plain = tmp.path().join("plain.txt");
        fs::write(&plain, SAMPLE).unwrap();
        let copied = extract_file(&plain, &out_dir).unwrap();
        assert_eq!(copied, out_dir.join("plain.txt"));
        assert_eq!(fs::read_to_string(&copied).unwrap(), SAMPLE);
    }
}
