use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Writes every log line to the console and to a file.
pub struct TeeWriter<C, F> {
    console: C,
    file: F,
}

impl<C: Write, F: Write> TeeWriter<C, F> {
    pub fn new(console: C, file: F) -> Self {
        Self { console, file }
    }
}

impl<C: Write, F: Write> Write for TeeWriter<C, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A broken console must not cost us the file copy.
        let _ = self.console.write_all(buf);
        self.file.write_all(buf)?;
        self.file.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()?;
        self.file.flush()
    }
}

/// Installs env_logger (default level `info`, `RUST_LOG` overrides).
///
/// With `file` set, output is appended there too. If the file cannot be
/// opened the logger still goes to stderr and the error is returned.
pub fn init(file: Option<&Path>) -> io::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    let opened = file.map(|path| {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(path)
    });

    let result = match opened {
        Some(Ok(log_file)) => {
            builder.target(env_logger::Target::Pipe(Box::new(TeeWriter::new(
                io::stderr(),
                log_file,
            ))));
            Ok(())
        }
        Some(Err(e)) => Err(e),
        None => Ok(()),
    };
    builder.init();
    result
}
