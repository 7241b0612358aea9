use clap::{value_parser, Arg, Command, ValueHint};
use pepunique_cli::input::Input;
use pepunique_cli::runner::Runner;
use rayon::ThreadPoolBuilder;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("PEPUNIQUE_LOG", "error,pepunique=info"))
        .init();

    let matches = Command::new("pepunique")
        .version(clap::crate_version!())
        .about("Estimate how uniquely peptide features can be identified by accurate mass and NET")
        .arg(
            Arg::new("parameters")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("features")
                .short('f')
                .long("features")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to the features to identify (TSV). Overrides the file \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("comparison_features")
                .short('c')
                .long("comparison-features")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to a separate comparison catalog (TSV). When absent, features \
                     are compared against each other.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("protein_links")
                .short('p')
                .long("protein-links")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to protein to peptide links (TSV), enables per-protein statistics")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where results will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("no-matches")
                .long("no-matches")
                .action(clap::ArgAction::SetTrue)
                .help("Do not write the per-feature match file"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .map(|&t| t as usize)
        .unwrap_or_else(num_cpus::get);
    ThreadPoolBuilder::new().num_threads(threads).build_global()?;

    let input = Input::from_arguments(matches)?;

    let runner = input.build().and_then(Runner::new)?;
    runner.run()?;

    Ok(())
}
