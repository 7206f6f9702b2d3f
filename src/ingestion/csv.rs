//! CSV record reader: turns a stream of files into a stream of typed records.

use std::io::{BufRead, BufReader};
use std::marker::PhantomData;

use csv::{Position, ReaderBuilder, StringRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EtlError, EtlResult, StreamFault};
use crate::stream::{Emitter, NodeKind, PipelineContext, Stream, StreamNode, Subscriber};
use crate::types::{ErrorRow, FaultInfo, NodePath};

use super::provider::FileValue;

/// Configuration of a [`ReadCsvNode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvReadArgs {
    pub delimiter: u8,
    /// The first (non-ignored) line holds column names, matched against the record's field names.
    pub has_headers: bool,
    /// Lines skipped at the top of every file, before the header.
    pub lines_to_ignore: usize,
    /// Send records that fail to deserialize to the `error` stream instead of failing the node.
    pub redirect_errors: bool,
}

impl Default for CsvReadArgs {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_headers: true,
            lines_to_ignore: 0,
            redirect_errors: false,
        }
    }
}

impl CsvReadArgs {
    pub fn from_json_str(json: &str) -> EtlResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Raw content of a record that could not be deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    /// [`FileValue::name`] of the file the record came from.
    pub source_name: String,
    /// 1-based line number in the file.
    pub line: u64,
    pub fields: Vec<String>,
}

/// CSV reader node. `error` is `Some` only when `redirect_errors` is set.
pub struct ReadCsvNode<R> {
    pub path: NodePath,
    pub output: Stream<R>,
    pub error: Option<Stream<ErrorRow<SourceLine>>>,
}

impl<R: DeserializeOwned + 'static> StreamNode for ReadCsvNode<R> {
    type Input = Stream<FileValue>;
    type Args = CsvReadArgs;

    const KIND: NodeKind = NodeKind::ReadCsv;

    fn create(input: &Stream<FileValue>, name: &str, parent: &NodePath, args: CsvReadArgs) -> EtlResult<Self> {
        let path = parent.child(name);
        input.context().register_node(&path, Self::KIND)?;

        let (output, output_emitter) = input.derive(&path, "Output");
        let (error, error_emitter) = if args.redirect_errors {
            let (error, emitter) = input.derive(&path, "Error");
            (Some(error), Some(emitter))
        } else {
            (None, None)
        };

        input.subscribe(ReadCsvSubscriber {
            node: path.clone(),
            context: input.context().clone(),
            args,
            output: output_emitter,
            error: error_emitter,
            _record: PhantomData,
        });

        Ok(Self { path, output, error })
    }
}

struct ReadCsvSubscriber<R> {
    node: NodePath,
    context: PipelineContext,
    args: CsvReadArgs,
    output: Emitter<R>,
    error: Option<Emitter<ErrorRow<SourceLine>>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> ReadCsvSubscriber<R> {
    fn read_file(&self, file: &FileValue) -> EtlResult<()> {
        debug!(node = %self.node, file = %file.name, size = file.size, "reading csv file");
        let mut reader = BufReader::new(file.open()?);
        let mut skipped = String::new();
        for _ in 0..self.args.lines_to_ignore {
            skipped.clear();
            if reader.read_line(&mut skipped)? == 0 {
                break;
            }
        }

        let mut rdr = ReaderBuilder::new()
            .delimiter(self.args.delimiter)
            .has_headers(self.args.has_headers)
            .flexible(true)
            .from_reader(reader);
        let headers = if self.args.has_headers {
            Some(rdr.headers()?.clone())
        } else {
            None
        };

        for result in rdr.byte_records() {
            if self.output.is_closed() || self.context.should_stop() {
                break;
            }
            let bytes = result?;
            let position = bytes.position().cloned();
            let record = match StringRecord::from_byte_record(bytes) {
                Ok(record) => record,
                Err(e) => {
                    let fault = FaultInfo::from_error(&e);
                    let fields = e
                        .into_byte_record()
                        .iter()
                        .map(|f| String::from_utf8_lossy(f).into_owned())
                        .collect();
                    self.redirect(file, position.as_ref(), fields, fault)?;
                    continue;
                }
            };
            match record.deserialize::<R>(headers.as_ref()) {
                Ok(row) => self.output.next(&row),
                Err(e) => {
                    let fields = record.iter().map(str::to_string).collect();
                    self.redirect(file, position.as_ref(), fields, FaultInfo::from_error(&e))?;
                }
            }
        }
        Ok(())
    }

    /// Send a malformed record to the error stream, or fail when redirection is off.
    fn redirect(
        &self,
        file: &FileValue,
        position: Option<&Position>,
        fields: Vec<String>,
        fault: FaultInfo,
    ) -> EtlResult<()> {
        let Some(error) = &self.error else {
            return Err(EtlError::MalformedRecord {
                line: self.line_of(position),
                message: fault.to_string(),
            });
        };
        self.context.report_redirected(&self.node, &fault);
        let source = SourceLine {
            source_name: file.name.clone(),
            line: self.line_of(position),
            fields,
        };
        error.next(&ErrorRow::new(source, fault));
        Ok(())
    }

    /// 1-based file line, counting the lines skipped before the reader started.
    fn line_of(&self, position: Option<&Position>) -> u64 {
        position.map_or(0, Position::line) + self.args.lines_to_ignore as u64
    }

    fn fail(&self, fault: &StreamFault) {
        self.output.error(fault);
        if let Some(error) = &self.error {
            error.error(fault);
        }
    }
}

impl<R: DeserializeOwned> Subscriber<FileValue> for ReadCsvSubscriber<R> {
    fn on_next(&mut self, file: &FileValue) {
        if self.output.is_closed() {
            return;
        }
        if let Err(e) = self.read_file(file) {
            let fault = StreamFault::new(
                self.node.clone(),
                FaultInfo {
                    message: format!("cannot read '{}'", file.name),
                    causes: vec![e.to_string()],
                },
            );
            self.context.report_fault(&fault);
            self.fail(&fault);
        }
    }

    fn on_error(&mut self, fault: &StreamFault) {
        self.fail(fault);
    }

    fn on_complete(&mut self) {
        self.output.complete();
        if let Some(error) = &self.error {
            error.complete();
        }
    }
}

impl Stream<FileValue> {
    /// Read every file of this stream as CSV, deserializing each record into `R`.
    pub fn read_csv<R>(&self, name: &str, args: CsvReadArgs) -> EtlResult<ReadCsvNode<R>>
    where
        R: DeserializeOwned + 'static,
    {
        self.apply::<ReadCsvNode<R>>(name, args)
    }
}
