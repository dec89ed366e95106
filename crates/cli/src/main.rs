//! earsmix CLI: generate reverberant and noisy speech corpora.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use earsmix_core::audio::rt60::Rt60Variant;
use earsmix_core::synth::{generate_noisy, generate_reverb, SplitReport, SynthConfig};
use earsmix_core::types::Split;

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "earsmix",
    about = "Paired clean/degraded speech corpus generator",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convolve speech with room impulse responses (EARS-Reverb)
    Reverb(ReverbArgs),
    /// Mix speech with background noise (EARS-WHAM)
    Noisy(NoisyArgs),
}

// ─── Shared arguments (embedded in each subcommand) ──────────────

#[derive(Parser, Debug)]
struct SharedArgs {
    /// Data directory containing EARS and the degradation corpora
    #[arg(long, required = true)]
    data_dir: PathBuf,

    /// Minimum length of train/valid speech files in seconds
    #[arg(long, default_value_t = 4.0)]
    min_length: f64,

    /// Cut long train/valid files into segments of this length in seconds
    #[arg(long, default_value_t = 10.0)]
    cut_length: f64,

    /// Also write the clean speech segments
    #[arg(long, default_value_t = false)]
    copy_clean: bool,

    /// Sampling rate
    #[arg(long, default_value_t = 48000)]
    sr: u32,

    /// Fade-in/fade-out ramp on test segments (ms)
    #[arg(long, default_value_t = 10.0)]
    ramp_time_in_ms: f64,

    /// Longest test cut that is kept, in seconds
    #[arg(long, default_value_t = 29.0)]
    max_time_test_set_in_s: f64,

    /// Cut points for the test split (JSON)
    #[arg(long, default_value = "test_files.json")]
    test_files: PathBuf,

    /// Splits to generate, comma separated
    #[arg(long, default_value = "train,valid,test", value_delimiter = ',')]
    splits: Vec<Split>,

    /// Draws per segment before giving up
    #[arg(long, default_value_t = 1000)]
    max_draws: usize,

    /// Memory ceiling for decoded files held in the cache (MiB)
    #[arg(long, default_value_t = 1024)]
    cache_max_mb: usize,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl SharedArgs {
    fn config(&self) -> SynthConfig {
        SynthConfig {
            sample_rate: self.sr,
            min_length_s: self.min_length,
            cut_length_s: self.cut_length,
            ramp_time_ms: self.ramp_time_in_ms,
            max_test_duration_s: self.max_time_test_set_in_s,
            copy_clean: self.copy_clean,
            max_draws: self.max_draws,
            cache_max_mb: self.cache_max_mb,
            splits: self.splits.clone(),
            test_files: self.test_files.clone(),
            ..Default::default()
        }
    }
}

// ─── Reverb ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Generate the reverberant corpus")]
struct ReverbArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Maximum RT60 in seconds
    #[arg(long, default_value_t = 2.0)]
    max_rt60: f64,

    /// Decay range used for RT60 estimation
    #[arg(long, default_value = "t30", value_parser = ["t30", "t20", "t10", "edt"])]
    rt60_variant: String,

    /// Number of decoded impulse response files kept in memory (0 to disable)
    #[arg(long, default_value_t = 256)]
    cache_entries: usize,
}

// ─── Noisy ───────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Generate the noisy corpus")]
#[command(allow_negative_numbers = true)]
struct NoisyArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Minimum SNR in dB
    #[arg(long, default_value_t = -2.5, allow_hyphen_values = true)]
    min_snr: f64,

    /// Maximum SNR in dB
    #[arg(long, default_value_t = 17.5, allow_hyphen_values = true)]
    max_snr: f64,

    /// Number of decoded noise files kept in memory (0 to disable)
    #[arg(long, default_value_t = 0)]
    cache_entries: usize,
}

// ─── Main ────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    // Init logging
    let log_level = match &cli.command {
        Command::Reverb(a) if a.shared.verbose => "debug",
        Command::Noisy(a) if a.shared.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Reverb(args) => run_reverb(args),
        Command::Noisy(args) => run_noisy(args),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

// ─── Runners ─────────────────────────────────────────────────────

fn reverb_config(args: &ReverbArgs) -> Result<SynthConfig> {
    let rt60_variant: Rt60Variant = args.rt60_variant.parse()?;
    Ok(SynthConfig {
        max_rt60_s: args.max_rt60,
        rt60_variant,
        cache_entries: args.cache_entries,
        ..args.shared.config()
    })
}

fn noisy_config(args: &NoisyArgs) -> SynthConfig {
    SynthConfig {
        min_snr_db: args.min_snr,
        max_snr_db: args.max_snr,
        cache_entries: args.cache_entries,
        ..args.shared.config()
    }
}

fn print_reports(reports: &[SplitReport]) {
    for r in reports {
        println!(
            "{}: {} segments from {} speech files ({} skipped, {} rejected draws)",
            r.split, r.segments, r.speech_files, r.skipped, r.rejections
        );
    }
}

fn run_reverb(args: ReverbArgs) -> Result<()> {
    let config = reverb_config(&args)?;
    let reports = generate_reverb(&args.shared.data_dir, &config)?;
    print_reports(&reports);
    Ok(())
}

fn run_noisy(args: NoisyArgs) -> Result<()> {
    let config = noisy_config(&args);
    let reports = generate_noisy(&args.shared.data_dir, &config)?;
    print_reports(&reports);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverb_defaults() {
        let cli = Cli::try_parse_from(["earsmix", "reverb", "--data-dir", "/data"]).unwrap();
        let Command::Reverb(args) = cli.command else {
            panic!("expected reverb subcommand");
        };
        let config = reverb_config(&args).unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.max_rt60_s, 2.0);
        assert_eq!(config.rt60_variant, Rt60Variant::T30);
        assert_eq!(config.cache_entries, 256);
        assert_eq!(config.cache_bytes(), 1024 * 1024 * 1024);
        assert_eq!(config.splits, Split::ALL.to_vec());
        assert_eq!(config.test_files, PathBuf::from("test_files.json"));
    }

    #[test]
    fn test_noisy_negative_snr_and_splits() {
        let cli = Cli::try_parse_from([
            "earsmix", "noisy", "--data-dir", "/data", "--min-snr", "-5", "--max-snr", "10",
            "--splits", "valid,test", "--copy-clean",
        ])
        .unwrap();
        let Command::Noisy(args) = cli.command else {
            panic!("expected noisy subcommand");
        };
        let config = noisy_config(&args);
        assert_eq!(config.min_snr_db, -5.0);
        assert_eq!(config.max_snr_db, 10.0);
        assert_eq!(config.splits, vec![Split::Valid, Split::Test]);
        assert!(config.copy_clean);
        assert_eq!(config.cache_entries, 0);
    }

    #[test]
    fn test_cache_memory_ceiling() {
        let cli = Cli::try_parse_from([
            "earsmix", "reverb", "--data-dir", "/data", "--cache-entries", "64", "--cache-max-mb", "8",
        ])
        .unwrap();
        let Command::Reverb(args) = cli.command else {
            panic!("expected reverb subcommand");
        };
        let config = reverb_config(&args).unwrap();
        assert_eq!(config.cache_entries, 64);
        assert_eq!(config.cache_bytes(), 8 * 1024 * 1024);
    }

    #[test]
    fn test_data_dir_is_required() {
        assert!(Cli::try_parse_from(["earsmix", "noisy"]).is_err());
    }

    #[test]
    fn test_unknown_split_rejected() {
        assert!(Cli::try_parse_from(["earsmix", "reverb", "--data-dir", "/d", "--splits", "dev"]).is_err());
    }
}
