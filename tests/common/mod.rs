#![allow(dead_code)]

/// Builds BFPK buffers: header, index, then every file's content in order.
pub struct PackBuilder {
    version: u32,
    files: Vec<(String, Vec<u8>)>,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self {
            version: 0,
            files: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn file(mut self, path: &str, data: impl AsRef<[u8]>) -> Self {
        self.files.push((path.to_owned(), data.as_ref().to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let index_len: usize = self.files.iter().map(|(p, _)| 12 + p.len()).sum();
        let mut offset = 12 + index_len;

        let mut buf = b"BFPK".to_vec();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&(self.files.len() as u32).to_le_bytes());
        for (path, data) in &self.files {
            buf.extend_from_slice(&(path.len() as u32).to_le_bytes());
            buf.extend_from_slice(path.as_bytes());
            buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
            buf.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += data.len();
        }
        for (_, data) in &self.files {
            buf.extend_from_slice(data);
        }
        buf
    }
}

/// The single-file pack used throughout: `root/a.txt` = "hello world".
pub fn hello_pack() -> Vec<u8> {
    PackBuilder::new().file("root/a.txt", "hello world").build()
}

/// Deterministic content that differs at every position.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
