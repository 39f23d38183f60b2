use super::FingerprintError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub struct ContentHasher;

impl ContentHasher {
    /// Hash the contents of a single file. Read errors are reported, never skipped, so a file
    /// that can only be partially read does not produce a plausible looking hash.
    pub fn hash_file<P>(file: P) -> Result<String, FingerprintError>
    where
        P: AsRef<Path>,
    {
        let path = file.as_ref();
        let unreadable = |err| FingerprintError::Unreadable {
            path: path.to_path_buf(),
            err,
        };
        let f = File::open(path).map_err(unreadable)?;
        let mut s = Sha256::new();
        let mut buffer = [0; 8192];
        let mut reader = BufReader::new(f);
        loop {
            let len = reader.read(&mut buffer).map_err(unreadable)?;
            if len == 0 {
                break;
            }
            s.update(&buffer[..len]);
        }
        Ok(format!("{:x}", s.finalize()))
    }

    pub fn hash_bytes<B: AsRef<[u8]>>(bytes: B) -> String {
        let mut s = Sha256::new();
        s.update(bytes.as_ref());
        format!("{:x}", s.finalize())
    }
}
