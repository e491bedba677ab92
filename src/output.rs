use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use crate::app::{ExecuteResult, InitResult, ListResult, ProgressEvent, ProgressSink};
use crate::domain::AlgorithmInfo;
use crate::provenance::ProvDocument;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_execute(result: &ExecuteResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_init(result: &InitResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_documents(documents: &[Value]) -> io::Result<()> {
        Self::print_json(documents)
    }

    pub fn print_algorithm(info: &AlgorithmInfo) -> io::Result<()> {
        Self::print_json(info)
    }

    /// PROV-N first, then indented PROV-JSON.
    pub fn print_provenance(document: &ProvDocument) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(document.to_provn().as_bytes())?;
        stdout.write_all(b"\n")?;
        Self::print_json(&document.to_json())
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Forwards progress events to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}
