use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

pub struct Config {
    pub base_path: PathBuf,
}

impl From<ArgMatches> for Config {
    fn from(matches: ArgMatches) -> Self {
        Config {
            base_path: matches.get_one::<PathBuf>("base_path").cloned().unwrap_or_default(),
        }
    }
}

pub(crate) fn configure_cli() -> Config {
    let matches = Command::new("refit")
        .version(env!("CARGO_PKG_VERSION"))
        .about("keep compose projects and standalone containers on their latest images")
        .arg(
            Arg::new("base_path")
                .value_name("PATH")
                .help("Directory holding one compose project per subdirectory")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .get_matches();
    matches.into()
}
