use crate::util::is_bytecode_artifact;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Seek;
use std::path::Path;
use tar::Archive;

/// Decompresses and untars a given .tar.gz file to the given directory, creating it if needed.
///
/// Entries that would be written outside of `destination` are skipped. With `skip_bytecode`,
/// compiled bytecode files and their cache directories are skipped as well.
pub(crate) fn decompress_tarball(
    tarball: &mut File,
    destination: impl AsRef<Path>,
    skip_bytecode: bool,
) -> Result<usize, std::io::Error> {
    fs::create_dir_all(destination.as_ref())?;
    tarball.rewind()?;
    let mut archive = Archive::new(GzDecoder::new(tarball));
    let mut unpacked = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;

        if skip_bytecode && is_bytecode_artifact(&entry.path()?) {
            continue;
        }

        if entry.unpack_in(destination.as_ref())? {
            unpacked += 1;
        }
    }

    Ok(unpacked)
}
