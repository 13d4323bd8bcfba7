use std::fmt::Display;
use std::io::{Read, Write};
use std::path::PathBuf;

use structopt::StructOpt;
use strum::{IntoEnumIterator, VariantNames};
use strum_macros::{Display, EnumIter, EnumString, EnumVariantNames};

use dbus_stubgen::{generate, Dialect, GenOpts};

#[derive(StructOpt)]
#[structopt(name = "dbus-stubgen", about = "Generates C stubs over libdbus from D-Bus XML introspection data")]
struct Args {
    /// D-Bus XML introspection file. Reads from stdin when absent.
    #[structopt(long, value_name = "FILE")]
    file: Option<PathBuf>,
    /// Write the generated source into the specified file instead of stdout.
    #[structopt(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Also write a header with typedefs, handler prototypes and stub prototypes.
    #[structopt(long, value_name = "FILE")]
    header: Option<PathBuf>,
    /// Comma separated list of filter strings. Only matching interfaces are generated if set.
    #[structopt(short = "f", long, value_name = "FILTER", use_delimiter = true)]
    interfaces: Option<Vec<String>>,
    /// Which sides to generate stubs for.
    #[structopt(
        short,
        long,
        value_name = "MODE",
        default_value = "Both",
        parse(from_str = lowercase_to_enum),
        possible_values = &Mode::VARIANTS,
        case_insensitive = true,
    )]
    mode: Mode,
    /// Also generate asynchronous client calls.
    #[structopt(short, long = "async-calls")]
    async_calls: bool,
    /// If present, skips a specific prefix when deriving interface symbols, e g "org.freedesktop.".
    #[structopt(short = "i", long, value_name = "PREFIX")]
    skipprefix: Option<String>,
}

/// Enum options are documented as lowercase strings; map them back
/// case-insensitively. Panics if two variants collide in lowercase.
fn lowercase_to_enum<T: IntoEnumIterator + Display>(src: &str) -> T {
    assert!({
        let mut lower_names = T::iter().map(|s| s.to_string().to_lowercase()).collect::<Vec<_>>();
        lower_names.sort_unstable();
        lower_names.windows(2).all(|w| w[0] != w[1])
    });
    let src = src.to_lowercase();
    for variant in T::iter() {
        if src == variant.to_string().to_lowercase() {
            return variant;
        }
    }
    unreachable!("possible_values from clap will guarantee we never arrive here.")
}

#[derive(Display, EnumIter, EnumString, EnumVariantNames)]
enum Mode {
    Both,
    Server,
    Client,
}

fn main() {
    env_logger::init();
    let args = Args::from_args();

    let (xml, source_name) = match &args.file {
        Some(path) => {
            let s = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("dbus-stubgen: {}: {}", path.display(), e);
                std::process::exit(1);
            });
            (s, path.display().to_string())
        }
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s).unwrap_or_else(|e| {
                eprintln!("dbus-stubgen: stdin: {}", e);
                std::process::exit(1);
            });
            (s, "<stdin>".to_string())
        }
    };

    let opts = GenOpts {
        server: !matches!(args.mode, Mode::Client),
        client: !matches!(args.mode, Mode::Server),
        async_client: args.async_calls,
        skipprefix: args.skipprefix,
        interfaces: args.interfaces.map(|v| v.into_iter().collect()),
        source_name,
        command_line: std::env::args().skip(1).collect::<Vec<String>>().join(" "),
    };

    let out = generate(&xml, &opts).unwrap_or_else(|e| {
        eprintln!("dbus-stubgen: {}", e);
        std::process::exit(1);
    });

    let mut h: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(std::fs::File::create(path).unwrap_or_else(|e| {
            eprintln!("dbus-stubgen: {}: {}", path.display(), e);
            std::process::exit(1);
        })),
        None => Box::new(std::io::stdout()),
    };
    h.write_all(out.code.as_bytes()).and_then(|_| h.flush()).unwrap_or_else(|e| {
        eprintln!("dbus-stubgen: write: {}", e);
        std::process::exit(1);
    });

    if let Some(path) = &args.header {
        let header = out.header(&Dialect::libdbus());
        std::fs::write(path, header).unwrap_or_else(|e| {
            eprintln!("dbus-stubgen: {}: {}", path.display(), e);
            std::process::exit(1);
        });
    }
}
