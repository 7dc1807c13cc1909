use clap::Args;
use serde::Deserialize;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::{
    algorithm::ModelParams,
    calibration::{Calibrator, GridAxis, ParamsSink},
    Result,
};

macro_rules! config_structs {
    {
        $(
            $( #[config_opt($attr:meta)] )*
            pub $name:ident: $typ:ty,
        )*
        $(
            #[config_alias($atarget:ident = $avalue:expr)]
            $( #[config_opt($aattr:meta)] )*
            pub $aname:ident: bool,
        )*
    } => {
        #[derive(Clone, Debug, PartialEq)]
        pub struct Config {
            $( pub $name: $typ, )*
        }

        #[derive(Args, Deserialize, Default, Debug)]
        pub struct ConfigOpt {
            $( $( #[$aattr] )* #[serde(skip)] pub $aname: bool, )*
            $( $( #[$attr] )* pub $name: Option<$typ>, )*
        }

        impl Config {
            pub fn update(self, mut opt: ConfigOpt) -> Config {
                $(
                    if opt.$aname {
                        opt.$atarget = Some($avalue);
                    }
                )*
                Config {
                    $( $name: opt.$name.unwrap_or(self.$name), )*
                }
            }
        }
    }
}

config_structs! {
    #[config_opt(doc = "Decay of a match's weight with its position in the backtrace.")]
    #[config_opt(arg(short, long, value_name = "NUM"))]
    pub m: f64,

    #[config_opt(doc = "Decay of a match's weight with the edit distance of its function tokens.")]
    #[config_opt(arg(short, long, value_name = "NUM"))]
    pub n: f64,

    #[config_opt(doc = "Base names of files whose frames are left out of signatures.")]
    #[config_opt(arg(long, value_delimiter = ',', value_name = "FILES", group = "stop_words_group"))]
    pub stop_words: Vec<String>,

    #[config_opt(arg(long, value_name = "COLUMNS"))]
    pub width: usize,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub grid_start: f64,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub grid_stop: f64,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub grid_step: f64,

    #[config_opt(doc = "Weight of recall against precision when picking the threshold.")]
    #[config_opt(arg(long, value_name = "NUM"))]
    pub beta: f64,

    #[config_opt(arg(long, value_name = "NUM"))]
    pub seed: u64,

    #[config_opt(arg(long, value_name = "COMMAND"))]
    pub demangler: String,

    #[config_opt(arg(long, value_name = "FILE"))]
    pub store: PathBuf,

    #[config_opt(arg(long, value_name = "DIR"))]
    pub dump_dir: PathBuf,

    #[config_opt(arg(long, value_name = "FILE"))]
    pub components: PathBuf,

    #[config_opt(arg(long, value_name = "FILE"))]
    pub duplicates: PathBuf,

    #[config_alias(stop_words = Vec::new())]
    #[config_opt(arg(long, group = "stop_words_group"))]
    pub no_stop_words: bool,
}

impl Default for Config {
    fn default() -> Config {
        let data_dir = dirs::data_dir().unwrap_or_default().join("crashsim");
        let grid = GridAxis::default();
        Config {
            m: 1.0,
            n: 1.0,
            stop_words: vec![],
            width: 60,
            grid_start: grid.start,
            grid_stop: grid.stop,
            grid_step: grid.step,
            beta: 0.5,
            seed: 42,
            demangler: "c++filt -p".to_owned(),
            store: data_dir.join("signatures.jsonl"),
            dump_dir: data_dir.join("dumps"),
            components: data_dir.join("components.json"),
            duplicates: data_dir.join("duplicates.json"),
        }
    }
}

impl Config {
    /// Defaults, then the config file, then `cli`. A missing file is only an
    /// error when it was named explicitly.
    pub fn load(explicit_path: Option<&Path>, cli: ConfigOpt) -> Result<Config> {
        let mut config = Config::default();
        let path = explicit_path.map(Path::to_owned).or_else(default_config_path);
        if let Some(path) = path {
            if explicit_path.is_some() || path.exists() {
                config = config.update(read_config_file(&path)?);
                debug!(path = %path.display(), "loaded config file");
            }
        }
        Ok(config.update(cli))
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams::new(self.m, self.n)
    }

    pub fn stop_word_set(&self) -> HashSet<String> {
        self.stop_words.iter().cloned().collect()
    }

    pub fn calibrator(&self) -> Calibrator {
        let axis = GridAxis {
            start: self.grid_start,
            stop: self.grid_stop,
            step: self.grid_step,
        };
        Calibrator {
            m_axis: axis,
            n_axis: axis,
            beta: self.beta,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("crashsim").join("config.toml"))
}

pub fn read_config_file(path: &Path) -> Result<ConfigOpt> {
    Ok(toml::from_str(&fs::read_to_string(path)?)?)
}

/// The config file as the destination of calibrated parameters. Only the
/// `m` and `n` keys are rewritten.
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigFile { path: path.into() }
    }
}

impl ParamsSink for ConfigFile {
    fn commit(&mut self, params: ModelParams) -> Result<()> {
        let mut table = if self.path.exists() {
            toml::from_str::<toml::Table>(&fs::read_to_string(&self.path)?)?
        } else {
            toml::Table::new()
        };
        table.insert("m".to_owned(), toml::Value::Float(params.m));
        table.insert("n".to_owned(), toml::Value::Float(params.n));
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temporary = self.path.with_extension("tmp");
        fs::write(&temporary, toml::to_string(&table)?)?;
        fs::rename(&temporary, &self.path)?;
        info!(m = params.m, n = params.n, path = %self.path.display(), "saved model parameters");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        opt: ConfigOpt,
    }

    fn cli(args: &[&str]) -> ConfigOpt {
        Cli::parse_from(std::iter::once("crashsim").chain(args.iter().copied())).opt
    }

    #[test]
    fn file_then_command_line() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("config.toml");
        fs::write(&path, "m = 0.3\nn = 0.7\nstop_words = [\"new.cpp\"]\nwidth = 40\n").unwrap();

        let config = Config::load(Some(&path), cli(&["-n", "1.5"])).unwrap();
        assert_eq!(config.model_params(), ModelParams::new(0.3, 1.5));
        assert_eq!(config.stop_words, vec!["new.cpp".to_owned()]);
        assert_eq!(config.width, 40);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn alias_clears_stop_words() {
        let config = Config::default().update(cli(&["--stop-words", "a.cpp,b.cpp"]));
        assert_eq!(config.stop_word_set().len(), 2);
        let config = config.update(cli(&["--no-stop-words"]));
        assert!(config.stop_words.is_empty());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let directory = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&directory.path().join("none.toml")), ConfigOpt::default()).is_err());
    }

    #[test]
    fn commit_keeps_other_keys() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("crashsim").join("config.toml");
        let mut sink = ConfigFile::new(&path);
        sink.commit(ModelParams::new(0.5, 0.2)).unwrap();
        fs::write(&path, fs::read_to_string(&path).unwrap() + "width = 80\n").unwrap();
        sink.commit(ModelParams::new(1.1, 0.0)).unwrap();

        let config = Config::default().update(read_config_file(&path).unwrap());
        assert_eq!(config.model_params(), ModelParams::new(1.1, 0.0));
        assert_eq!(config.width, 80);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn calibrator_uses_grid_settings() {
        let config = Config::default().update(cli(&["--grid-stop", "0.2", "--beta", "1"]));
        let calibrator = config.calibrator();
        assert_eq!(calibrator.grid().len(), 9);
        assert_eq!(calibrator.beta, 1.0);
    }
}
