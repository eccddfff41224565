pub mod report;

pub use report::{BufferSink, ConsoleSink, LogSink, NullSink, ReportSink, ReportTable};
