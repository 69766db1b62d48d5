use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::Result;

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read>,
    is_pipe: bool,
    len: Option<u64>,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path_str = input_path.as_ref().to_string_lossy();
        let is_pipe = path_str == "-";

        let (reader, len): (Box<dyn Read>, Option<u64>) = if is_pipe {
            (Box::new(io::stdin().lock()), None)
        } else {
            let file = File::open(input_path)?;
            let len = file.metadata().ok().map(|m| m.len());
            (Box::new(BufReader::new(file)), len)
        };

        Ok(Self {
            reader,
            is_pipe,
            len,
        })
    }

    /// Check if this is pipe input
    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Total input size, unknown for pipes
    pub fn size(&self) -> Option<u64> {
        self.len
    }

    /// Process data in chunks using a callback function
    /// The callback receives each chunk and should return Ok(true) to continue or Ok(false) to stop
    ///
    /// Every chunk except the last holds a multiple of `align` bytes.
    pub fn process_chunks<F>(&mut self, chunk_size: usize, align: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let chunk_size = (chunk_size / align).max(1) * align;
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let mut filled = 0;
            while filled < chunk_size {
                match self.reader.read(&mut buffer[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            if filled == 0 {
                break; // EOF
            }

            if !callback(&buffer[..filled])? || filled < chunk_size {
                break;
            }
        }

        Ok(())
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}
