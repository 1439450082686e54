use std::path::PathBuf;

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Format {
    Table,
    Jsonl,
    Csv,
}

#[derive(clap::Parser)]
#[group(id = "output::Args")]
pub struct Args {
    /// Write the results to this file instead of the terminal.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    #[arg(long, short = 'f', value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open the specified output file at {1:?}")]
    OpenOutputFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the output file at {1:?}")]
    WriteFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the terminal")]
    WriteStdout(#[source] std::io::Error),
    #[error("could not serialize the record to JSON")]
    SerializeJson(#[source] serde_json::Error),
}

impl Args {
    pub fn to_output(self) -> Result<Output, Error> {
        let io = match &self.output {
            None => Box::new(std::io::stdout().lock()) as Box<_>,
            Some(path) => Box::new(
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| Error::OpenOutputFile(e, path.clone()))?,
            ) as Box<_>,
        };
        let sink = match &self.format {
            Format::Table => {
                let mut comfy = comfy_table::Table::new();
                comfy.set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
                Sink::Table(comfy)
            }
            Format::Jsonl => Sink::Jsonl,
            Format::Csv => Sink::Csv,
        };
        Ok(Output { destination: self.output, io, sink })
    }
}

pub struct Output {
    destination: Option<PathBuf>,
    io: Box<dyn std::io::Write>,
    sink: Sink,
}

enum Sink {
    Table(comfy_table::Table),
    Jsonl,
    Csv,
}

impl Output {
    pub fn headers(&mut self, headers: &[&'static str]) -> Result<(), Error> {
        match &mut self.sink {
            Sink::Table(comfy) => {
                comfy.set_header(headers.to_vec());
                return Ok(());
            }
            Sink::Jsonl => return Ok(()),
            Sink::Csv => {}
        }
        self.csv_line(headers)
    }

    /// Emit one result. Both representations are built lazily; only the one
    /// the selected format wants gets evaluated.
    pub fn row<R: serde::Serialize>(
        &mut self,
        cells: impl FnOnce() -> Vec<String>,
        record: impl FnOnce() -> R,
    ) -> Result<(), Error> {
        match &mut self.sink {
            Sink::Table(comfy) => {
                comfy.add_row(cells());
                return Ok(());
            }
            Sink::Jsonl => {
                serde_json::to_writer(&mut self.io, &record()).map_err(Error::SerializeJson)?;
                return writeln!(self.io).map_err(|e| self.write_error(e));
            }
            Sink::Csv => {}
        }
        let cells = cells();
        self.csv_line(&cells)
    }

    pub fn finish(mut self) -> Result<(), Error> {
        let rendered = match &self.sink {
            Sink::Table(comfy) => Some(format!("{comfy}\n")),
            Sink::Jsonl | Sink::Csv => None,
        };
        if let Some(rendered) = rendered {
            self.write(rendered.as_bytes())?;
        }
        self.io.flush().map_err(|e| self.write_error(e))
    }

    fn csv_line<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<(), Error> {
        let mut writer = csv_core::Writer::new();
        let longest = fields.iter().map(|f| f.as_ref().len()).max().unwrap_or(0);
        // Worst case doubles every byte (quotes) and adds the enclosing pair.
        let mut scratch = vec![0; 2 * longest + 2];
        for (index, field) in fields.iter().enumerate() {
            if index != 0 {
                let (_, written) = writer.delimiter(&mut scratch);
                self.write(&scratch[..written])?;
            }
            let input = field.as_ref().as_bytes();
            let (result, consumed, written) = writer.field(input, &mut scratch);
            assert_eq!(result, csv_core::WriteResult::InputEmpty);
            assert_eq!(consumed, input.len());
            self.write(&scratch[..written])?;
        }
        let (_, written) = writer.terminator(&mut scratch);
        self.write(&scratch[..written])
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.io.write_all(bytes).map_err(|e| self.write_error(e))
    }

    fn write_error(&self, e: std::io::Error) -> Error {
        match &self.destination {
            None => Error::WriteStdout(e),
            Some(p) => Error::WriteFile(e, p.clone()),
        }
    }
}
