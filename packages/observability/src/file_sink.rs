//! Append-only log file shared by every writer in the process.

use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Handle to the log file. Clones share one descriptor; each `write` goes
/// straight to the file so concurrent processes interleave whole lines.
#[derive(Clone)]
pub struct AppendFile {
    file: Arc<Mutex<File>>,
}

impl AppendFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for AppendFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for AppendFile {
    type Writer = AppendFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
