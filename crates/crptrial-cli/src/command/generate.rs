use std::path::PathBuf;

use crptrial_generator::config::GeneratorConfig;

use super::{DEFAULT_RAW_DATA_FILE, GeneratorArg, default_path};
use crate::util;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct GenerateArg {
    #[clap(flatten)]
    pub(super) generator: GeneratorArg,
    /// Long-format output CSV [default: output/crp_raw_data.csv]
    #[arg(long)]
    output: Option<PathBuf>,
    /// Also write the wide-format table to this CSV
    #[arg(long)]
    wide_output: Option<PathBuf>,
}

pub(crate) fn run(arg: &GenerateArg) -> anyhow::Result<()> {
    let mut config = GeneratorConfig::default();
    arg.generator.apply(&mut config);
    let output = arg
        .output
        .clone()
        .unwrap_or_else(|| default_path(DEFAULT_RAW_DATA_FILE));

    let table = util::generate_to_file(&config, &output, arg.wide_output.as_deref())?;
    println!(
        "Generated {} rows for {} patients",
        table.len(),
        table.patients().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_generate_files() {
        let dir = tempfile::tempdir().unwrap();
        let arg = GenerateArg {
            generator: GeneratorArg {
                patients_per_group: Some(3),
                days: Some(5),
                seed: Some(1),
                ..GeneratorArg::default()
            },
            output: Some(dir.path().join("data").join("raw.csv")),
            wide_output: Some(dir.path().join("wide.csv")),
        };
        run(&arg).unwrap();

        let raw = fs::read_to_string(dir.path().join("data").join("raw.csv")).unwrap();
        assert!(raw.starts_with("patient_id,group,day,crp\n"));
        assert_eq!(raw.lines().count(), 1 + 6 * 6);
        let wide = fs::read_to_string(dir.path().join("wide.csv")).unwrap();
        assert_eq!(wide.lines().count(), 1 + 6);
    }

    #[test]
    fn test_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let arg = GenerateArg {
            generator: GeneratorArg {
                patients_per_group: Some(0),
                ..GeneratorArg::default()
            },
            output: Some(dir.path().join("raw.csv")),
            wide_output: None,
        };
        let err = run(&arg).unwrap_err();
        assert!(err.to_string().contains("Invalid generator configuration"));
        assert!(!dir.path().join("raw.csv").exists());
    }
}
