use clap::{App, Arg, ArgMatches};
use flux::logging;
use pulsar::config::ConfigError;
use pulsar::prelude::*;
use std::fmt;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

const DEFAULT_CONFIG_FILE: &str = "iprovider.toml";

#[derive(Debug)]
enum StartupError {
    Log(logging::LogError),
    Config(ConfigError),
    Argument(&'static str),
    Dictionary(String, pulsar::dictionary::DictionaryError),
    Network(NetworkError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StartupError::Log(err) => write!(f, "{}", err),
            StartupError::Config(err) => write!(f, "{}", err),
            StartupError::Argument(name) => write!(f, "invalid value for {}", name),
            StartupError::Dictionary(path, err) => write!(f, "unable to load dictionary {}: {}", path, err),
            StartupError::Network(err) => write!(f, "{} (code {})", err, err.code()),
        }
    }
}

impl From<NetworkError> for StartupError {
    #[inline]
    fn from(err: NetworkError) -> Self {
        StartupError::Network(err)
    }
}

fn parse_args<'a>() -> ArgMatches<'a> {
    App::new("Interactive Provider")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Serves login, source directory and dictionary streams to consumers.")
        .arg(
            Arg::with_name("PORT")
                .short("p")
                .takes_value(true)
                .help("Port to listen on"),
        )
        .arg(
            Arg::with_name("RUNTIME")
                .short("r")
                .takes_value(true)
                .help("Seconds to run before shutting down"),
        )
        .arg(
            Arg::with_name("SERVICE")
                .short("s")
                .takes_value(true)
                .help("Name of the provided service"),
        )
        .arg(
            Arg::with_name("CONFIG_FILE")
                .short("c")
                .takes_value(true)
                .help("Path to the config file"),
        )
        .arg(
            Arg::with_name("LOG_CONFIG_FILE")
                .short("l")
                .takes_value(true)
                .help("Path to the logging config file"),
        )
        .get_matches()
}

/// Directory of the running binary, where the build places the default config and dictionaries.
fn install_dir() -> Option<PathBuf> {
    env::current_exe().ok()?.parent().map(Path::to_path_buf)
}

fn load_config(matches: &ArgMatches) -> Result<ProviderConfig, StartupError> {
    let install_dir = install_dir();
    let installed_config = install_dir
        .as_ref()
        .map(|dir| dir.join(DEFAULT_CONFIG_FILE))
        .filter(|path| path.exists());

    let mut config = match (matches.value_of("CONFIG_FILE"), installed_config) {
        (Some(path), _) => ProviderConfig::load(path).map_err(StartupError::Config)?,
        (None, _) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            ProviderConfig::load(DEFAULT_CONFIG_FILE).map_err(StartupError::Config)?
        }
        (None, Some(path)) => ProviderConfig::load(path).map_err(StartupError::Config)?,
        (None, None) => ProviderConfig::default(),
    };

    if let Some(dir) = &install_dir {
        config.locate_files(dir);
    }

    if let Some(port) = matches.value_of("PORT") {
        config.server.port = port.parse().map_err(|_| StartupError::Argument("-p"))?;
    }

    if let Some(runtime) = matches.value_of("RUNTIME") {
        config.runtime_secs = runtime.parse().map_err(|_| StartupError::Argument("-r"))?;
    }

    if let Some(service) = matches.value_of("SERVICE") {
        config.service.name = service.to_string();
    }

    Ok(config)
}

fn load_dictionary(config: &ProviderConfig) -> Result<DataDictionary, StartupError> {
    let mut dictionary = DataDictionary::new();

    let field_file = &config.dictionary.field_file;
    dictionary
        .load_field_dictionary(field_file)
        .map_err(|err| StartupError::Dictionary(field_file.clone(), err))?;

    let enum_file = &config.dictionary.enum_file;
    dictionary
        .load_enum_dictionary(enum_file)
        .map_err(|err| StartupError::Dictionary(enum_file.clone(), err))?;

    Ok(dictionary)
}

fn run(matches: &ArgMatches, log: &logging::Logger) -> Result<(), StartupError> {
    let config = load_config(matches)?;
    let dictionary = load_dictionary(&config)?;

    logging::info!(log, "dictionary loaded";
                   "fields" => dictionary.field_count(),
                   "enum_tables" => dictionary.enum_tables().len());

    let mut server = Server::bind(config, Rc::new(dictionary), log.clone())?;
    server.run()?;

    Ok(())
}

fn main() {
    let matches = parse_args();

    let log = match matches.value_of("LOG_CONFIG_FILE") {
        Some(path) => match logging::from_file(path) {
            Ok(log) => log,
            Err(err) => {
                eprintln!("{}", StartupError::Log(err));
                process::exit(flux::FAILURE);
            }
        },
        None => logging::terminal(),
    };

    if let Err(err) = run(&matches, &log) {
        logging::crit!(log, "provider failed"; "error" => %err);
        // Flush the asynchronous terminal drain before exiting
        drop(log);
        process::exit(flux::FAILURE);
    }

    logging::info!(log, "runtime expired, exiting");
}
