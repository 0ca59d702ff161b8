use crate::data::index::Sha256Checksum;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Obtains the SHA256 checksum of a file.
pub(crate) fn sha256(path: impl AsRef<Path>) -> Result<Sha256Checksum, std::io::Error> {
    let mut file = fs::File::open(path.as_ref())?;
    let mut buffer = [0x00; 10 * 1024];
    let mut sha256 = Sha256::default();

    let mut read = file.read(&mut buffer)?;
    while read > 0 {
        Digest::update(&mut sha256, &buffer[..read]);
        read = file.read(&mut buffer)?;
    }

    Ok(Sha256Checksum::from(<[u8; 32]>::from(sha256.finalize())))
}

/// Obtains the SHA256 checksum of in-memory contents.
pub(crate) fn sha256_bytes(contents: impl AsRef<[u8]>) -> Sha256Checksum {
    Sha256Checksum::from(<[u8; 32]>::from(Sha256::digest(contents.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_checksum() {
        let temp_dir = tempfile::tempdir().unwrap();
        let temp_file = temp_dir.path().join("test.txt");

        fs::write(&temp_file, "Hello World!").unwrap();

        assert_eq!(
            sha256(&temp_file).unwrap().to_hex(),
            "7f83b1657ff1fc53b92dc18148a1d65dfc2d4b1fa3d677284addd200126d9069"
        );
        assert_eq!(sha256_bytes("Hello World!"), sha256(&temp_file).unwrap());
    }
}
