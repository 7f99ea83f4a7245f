// Text file decoding

use std::path::Path;

/// Read a file as UTF-8, falling back to Windows-1252.
///
/// Constituency lists exported from spreadsheets often arrive in the legacy
/// encoding, which matters for names like "Ynys Môn".
pub fn read_file_as_utf8(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode(bytes))
}

fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            tracing::debug!("input is not UTF-8, decoded as Windows-1252");
            decoded.into_owned()
        }
    }
}
