use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Parses a JSON file into a given type `T`.
///
/// This function reads a file from `file_path`, attempts to parse it
/// as JSON, and returns an instance of `T`.
///
/// Errors are automatically converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let data = fs::read_to_string(file_path.as_ref()).map_err(Error::IoError)?;

    let parsed_data: T = serde_json::from_str(&data).map_err(Error::DeserializationError)?;

    Ok(parsed_data)
}

/// Writes `value` as pretty-printed JSON, creating parent directories as needed.
pub fn write_json_file<T: Serialize + ?Sized>(file_path: impl AsRef<Path>, value: &T) -> Result<()> {
    let file_path = file_path.as_ref();
    create_parent_dir(file_path)?;

    let mut writer = BufWriter::new(fs::File::create(file_path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    Ok(())
}

pub fn read_binary_file<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let reader = BufReader::new(fs::File::open(file_path.as_ref())?);

    Ok(bincode::deserialize_from(reader)?)
}

pub fn write_binary_file<T: Serialize + ?Sized>(file_path: impl AsRef<Path>, value: &T) -> Result<()> {
    let file_path = file_path.as_ref();
    create_parent_dir(file_path)?;

    let mut writer = BufWriter::new(fs::File::create(file_path)?);
    bincode::serialize_into(&mut writer, value)?;
    writer.flush()?;

    Ok(())
}

/// `.json` files hold structured text, every other extension is a binary artifact.
pub fn is_structured_text(file_path: impl AsRef<Path>) -> bool {
    file_path.as_ref().extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Reads an artifact with the serializer selected by its extension.
pub fn read_artifact<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    if is_structured_text(file_path.as_ref()) { parse_json_file(file_path) } else { read_binary_file(file_path) }
}

/// Writes an artifact with the serializer selected by its extension.
pub fn write_artifact<T: Serialize + ?Sized>(file_path: impl AsRef<Path>, value: &T) -> Result<()> {
    if is_structured_text(file_path.as_ref()) { write_json_file(file_path, value) } else { write_binary_file(file_path, value) }
}

fn create_parent_dir(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
