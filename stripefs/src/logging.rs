//! Subscriber setup. The adapter only emits `tracing` events; nothing is
//! printed until the embedding process installs a subscriber here.

use std::io;

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Filter directives, `info` when unset.
pub const LOG_ENV: &str = "STRIPEFS_LOG";

/// Receives one formatted log line, without the trailing newline.
pub type LogSink = fn(&str);

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a stderr subscriber.
pub fn init() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

/// Installs a subscriber handing every line to `sink`.
pub fn install_sink(sink: LogSink) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_ansi(false)
        .with_writer(SinkWriter::factory(sink))
        .try_init()
        .map_err(|e| anyhow!("failed to install log sink: {e}"))
}

#[derive(Clone, Copy)]
struct SinkFactory(LogSink);

impl<'a> MakeWriter<'a> for SinkFactory {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            sink: self.0,
            line: Vec::new(),
        }
    }
}

/// Buffers one event and forwards it when dropped.
struct SinkWriter {
    sink: LogSink,
    line: Vec<u8>,
}

impl SinkWriter {
    fn factory(sink: LogSink) -> SinkFactory {
        SinkFactory(sink)
    }
}

impl io::Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.line.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        if self.line.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.line);
        (self.sink)(line.trim_end_matches('\n'));
    }
}
