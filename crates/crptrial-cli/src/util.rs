use std::{
    fs::{self, File},
    io::{self, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;
use crptrial_data::{long::LongTable, wide::WideTable};
use crptrial_generator::{config::GeneratorConfig, generate};
use tracing_subscriber::EnvFilter;

/// Installs the stderr log subscriber. `RUST_LOG` takes precedence over
/// `verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug)]
pub enum Output {
    Stdout {
        writer: StdoutLock<'static>,
    },
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    /// Writes `value` as pretty JSON; `-` selects stdout.
    pub fn save_json<T>(value: &T, output_path: &Path) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let mut output = if output_path == Path::new("-") {
            Output::stdout()
        } else {
            Output::open(output_path)?
        };
        output.write_json(value)
    }

    pub fn stdout() -> Self {
        Output::Stdout {
            writer: io::stdout().lock(),
        }
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        create_parent_dir(path)?;
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Output::File {
            writer: BufWriter::new(file),
            path: path.to_owned(),
        })
    }

    pub fn display_path(&self) -> String {
        match self {
            Output::Stdout { .. } => "stdout".to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }

    pub fn write_json<T>(&mut self, value: T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut *self, &value)
            .with_context(|| format!("Failed to write JSON to {}", self.display_path()))?;
        writeln!(&mut *self).with_context(|| {
            format!(
                "Failed to write newline after JSON to {}",
                self.display_path()
            )
        })?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { writer } => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { writer } => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

pub fn create_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    Ok(())
}

/// Read a long-format table from a CSV file
///
/// # Arguments
///
/// * `path` - Path to the CSV file
/// * `value_column` - Name of the measured value column
pub fn read_table_file(path: &Path, value_column: &str) -> anyhow::Result<LongTable> {
    let table = LongTable::from_path(path, value_column)
        .with_context(|| format!("Failed to read data file: {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = table.len(), "data loaded");
    Ok(table)
}

/// Generate a dataset and save it as long-format CSV
///
/// The wide-format table is also written when `wide_path` is given.
pub fn generate_to_file(
    config: &GeneratorConfig,
    path: &Path,
    wide_path: Option<&Path>,
) -> anyhow::Result<LongTable> {
    let table = generate::generate(config).context("Invalid generator configuration")?;

    create_parent_dir(path)?;
    table
        .write_path(path)
        .with_context(|| format!("Failed to write data file: {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = table.len(), "data saved");

    if let Some(wide_path) = wide_path {
        create_parent_dir(wide_path)?;
        WideTable::from_long(&table)
            .write_path(wide_path)
            .with_context(|| format!("Failed to write wide data file: {}", wide_path.display()))?;
        tracing::info!(path = %wide_path.display(), "wide data saved");
    }
    Ok(table)
}
