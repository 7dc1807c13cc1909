use anyhow::{anyhow, Context as _};
use clap::{Parser, Subcommand};
use crashsim::{
    algorithm::AlignedPair,
    calibration::load_signatures,
    config::{default_config_path, Config, ConfigFile, ConfigOpt},
    demangle::CommandDemangler,
    dump::Backtrace,
    input::{DumpArg, DumpDirectory},
    labels::{group_labels, sample_pairs, DuplicateTable, SamplePair},
    render::{print_chart, print_formula, print_side_by_side},
    resolver::ComponentTable,
    signature::{DumpSignature, SignatureBuilder},
    stop_words::count_words,
    store::{admit, JsonLinesStore, SignatureStore, StoredSignature},
    Error,
};
use rand::SeedableRng;
use std::{
    io::stdout,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(arg_required_else_help(true))]
struct Args {
    /// Config file to read, and to save calibrated parameters to.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(flatten)]
    config_opt: ConfigOpt,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compares two dumps, each a test-case id or a crash dump file.
    Detect {
        #[arg(value_name = "A")]
        first: String,
        #[arg(value_name = "B")]
        second: String,
    },
    /// Stores the signature of a dump under its test case and bug.
    Ingest {
        #[arg(long)]
        test_id: String,
        #[arg(long)]
        bug_id: u64,
        /// Seconds since the Unix epoch. Defaults to now.
        #[arg(long)]
        timestamp: Option<i64>,
        dump: String,
    },
    /// Fits the model parameters to the stored signatures and bug duplicates.
    Train,
    /// Shows which files most often sit above the throwing frame.
    StopWords {
        #[arg(required = true, value_name = "TEST_ID")]
        test_ids: Vec<String>,
    },
}

fn load_components(config: &Config) -> anyhow::Result<ComponentTable> {
    if !config.components.exists() {
        warn!(path = %config.components.display(), "no component table, every frame is UNKNOWN");
        return Ok(ComponentTable::default());
    }
    ComponentTable::load(&config.components)
        .with_context(|| format!("loading component table {}", config.components.display()))
}

fn build_signature(arg: &str, source: &DumpDirectory, builder: &SignatureBuilder) -> anyhow::Result<DumpSignature> {
    let (text, format) = DumpArg::classify(arg)
        .read(source)
        .with_context(|| format!("reading dump {arg}"))?;
    match Backtrace::parse(&text, format) {
        Ok(backtrace) => Ok(builder.build(backtrace)),
        Err(Error::MalformedDump(reason)) => {
            warn!(dump = arg, reason, "no backtrace found, using an empty signature");
            Ok(DumpSignature::default())
        }
        Err(err) => Err(err.into()),
    }
}

fn print_pairs(title: &str, pairs: &[SamplePair]) {
    println!("{title}: {}", pairs.len());
    for SamplePair { test_ids: [a, b], .. } in pairs {
        println!("  {a} {b}");
    }
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref(), args.config_opt)?;

    match args.command {
        Command::Detect { first, second } => {
            let components = load_components(&config)?;
            let demangler = CommandDemangler::new(&config.demangler)?;
            let stop_words = config.stop_word_set();
            let builder = SignatureBuilder::new(&components, &demangler, &stop_words);
            let source = DumpDirectory::new(&config.dump_dir);
            let signatures = [
                build_signature(&first, &source, &builder)?,
                build_signature(&second, &source, &builder)?,
            ];
            let signatures = [&signatures[0], &signatures[1]];
            let mut output = stdout().lock();
            print_side_by_side(signatures, config.width, &mut output)?;
            print_formula(&AlignedPair::new(signatures), config.model_params(), &mut output)?;
        }
        Command::Ingest {
            test_id,
            bug_id,
            timestamp,
            dump,
        } => {
            let components = load_components(&config)?;
            let demangler = CommandDemangler::new(&config.demangler)?;
            let stop_words = config.stop_word_set();
            let builder = SignatureBuilder::new(&components, &demangler, &stop_words);
            let signature = build_signature(&dump, &DumpDirectory::new(&config.dump_dir), &builder)?;
            let timestamp = timestamp.unwrap_or_else(|| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |elapsed| elapsed.as_secs() as i64)
            });
            let mut store = JsonLinesStore::open(&config.store)?;
            admit(&mut store, StoredSignature::new(test_id, bug_id, timestamp, signature))?;
        }
        Command::Train => {
            let config_path = args
                .config
                .or_else(default_config_path)
                .ok_or_else(|| anyhow!("no config file to save the parameters to, pass --config"))?;
            let store = JsonLinesStore::open(&config.store)?;
            let duplicates = DuplicateTable::load(&config.duplicates)
                .with_context(|| format!("loading duplicate table {}", config.duplicates.display()))?;
            let groups = group_labels(store.bug_reports()?, &duplicates)?;
            let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(config.seed);
            let pairs = sample_pairs(&groups, &mut rng)?;
            let (pairs, signatures) = load_signatures(pairs, &store)?;

            let calibration = config
                .calibrator()
                .calibrate(&pairs, &signatures, &mut ConfigFile::new(config_path))?;
            println!(
                "m = {:.1}, n = {:.1}, AP = {:.3}",
                calibration.params.m, calibration.params.n, calibration.average_precision
            );
            println!("threshold = {:.4}", calibration.threshold);
            print_pairs("false positives", &calibration.false_positives);
            print_pairs("false negatives", &calibration.false_negatives);
        }
        Command::StopWords { test_ids } => {
            let counts = count_words(&DumpDirectory::new(&config.dump_dir), &test_ids);
            print_chart(&counts, config.width, &mut stdout().lock())?;
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Returning the error from main() would print it with Debug, not Display.
    if let Err(e) = try_main() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
