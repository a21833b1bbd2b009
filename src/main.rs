#[macro_use]
extern crate log;

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{App, Arg, ArgMatches, SubCommand};

use musicd_catalog::{
    logger, Config, Context, ImageSize, Library, SearchArgs, StoreLocation,
    MUSICD_CATALOG_VERSION,
};

fn is_i64(v: String) -> Result<(), String> {
    match v.parse::<i64>() {
        Ok(_) => Ok(()),
        Err(_) => Err(format!("'{}' is not a number", v)),
    }
}

fn value_i64(matches: &ArgMatches, name: &str) -> Option<i64> {
    matches.value_of(name).and_then(|v| v.parse().ok())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("can't serialize output: {}", e),
    }
}

fn run(matches: &ArgMatches, library: &Library) -> musicd_catalog::Result<()> {
    let ctx = Context::background();

    match matches.subcommand() {
        ("scan", _) => {
            print_json(&library.scan()?);
        }
        ("rescan", _) => {
            print_json(&library.rescan(&ctx)?);
        }
        ("search", Some(sub)) => {
            let args = SearchArgs {
                query: sub.value_of("text").unwrap_or("").to_string(),
                offset: value_i64(sub, "offset"),
                count: value_i64(sub, "count"),
            };

            print_json(&library.search(&ctx, &args)?);
        }
        ("artwork", Some(sub)) => {
            let album_id = value_i64(sub, "album_id").unwrap_or(0);
            let size = sub
                .value_of("size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(ImageSize::Original);

            let mut reader = library.find_and_save_album_artwork(&ctx, album_id, size)?;

            let mut image = Vec::new();
            reader.read_to_end(&mut image)?;

            let output = Path::new(sub.value_of("output").unwrap_or("cover.jpg"));
            std::fs::write(output, &image)?;

            info!("wrote {} bytes to '{}'", image.len(), output.display());
        }
        _ => {
            println!("{}", matches.usage());
        }
    }

    Ok(())
}

fn main() {
    let matches = App::new("musicd-catalog")
        .version(MUSICD_CATALOG_VERSION)
        .arg(
            Arg::with_name("directory")
                .long("directory")
                .help("Database directory")
                .default_value("~/.musicd-catalog"),
        )
        .arg(
            Arg::with_name("root")
                .long("root")
                .help("One or more music root directories")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("workers")
                .long("workers")
                .help("Number of threads reading tags while scanning")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .help("Increase log verbosity"),
        )
        .subcommand(SubCommand::with_name("scan").about("Add every file under the roots"))
        .subcommand(
            SubCommand::with_name("rescan")
                .about("Reconcile the catalog with the file system"),
        )
        .subcommand(
            SubCommand::with_name("search")
                .about("Search tracks by artist, album or title")
                .arg(Arg::with_name("text").required(true))
                .arg(
                    Arg::with_name("offset")
                        .long("offset")
                        .takes_value(true)
                        .validator(is_i64),
                )
                .arg(
                    Arg::with_name("count")
                        .long("count")
                        .takes_value(true)
                        .validator(is_i64),
                ),
        )
        .subcommand(
            SubCommand::with_name("artwork")
                .about("Resolve the artwork of an album into a file")
                .arg(Arg::with_name("album_id").required(true).validator(is_i64))
                .arg(
                    Arg::with_name("size")
                        .long("size")
                        .possible_values(&["small", "original"])
                        .default_value("original"),
                )
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .takes_value(true)
                        .required(true),
                ),
        )
        .get_matches();

    logger::init(logger::level_from_verbosity(matches.occurrences_of("verbose")));

    info!("{}", MUSICD_CATALOG_VERSION);

    let directory =
        shellexpand::tilde(matches.value_of("directory").unwrap_or("~/.musicd-catalog"))
            .into_owned();
    let directory = Path::new(&directory);

    if let Err(e) = std::fs::create_dir_all(directory) {
        error!("can't create directory '{}': {}", directory.display(), e);
        std::process::exit(1);
    }

    let mut config = Config::new(StoreLocation::File(directory.join("library.db")));

    if let Some(roots) = matches.values_of("root") {
        config.roots = roots
            .map(|r| PathBuf::from(shellexpand::tilde(r).into_owned()))
            .collect();
    }

    if let Some(workers) = matches.value_of("workers") {
        match workers.parse() {
            Ok(n) => config.scan_workers = n,
            Err(_) => {
                error!("invalid worker count '{}'", workers);
                std::process::exit(1);
            }
        }
    }

    let library = match Library::builder(config).open() {
        Ok(l) => l,
        Err(e) => {
            error!("can't open library: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = library.initialize() {
        error!("can't initialize library: {}", e);
        std::process::exit(1);
    }

    let result = run(&matches, &library);

    if let Err(e) = library.close() {
        warn!("close: {}", e);
    }

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
