use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wav2midi::{validate_input, Config, WavToMidi};

/// Waveform-to-MIDI Transcription
#[derive(Parser)]
#[command(name = "wav2midi")]
#[command(about = "Transcribe stereo PCM recordings into velocity-banded MIDI lanes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe a WAV file into a MIDI file
    Transcribe {
        /// Input audio file (16- or 32-bit integer WAV)
        input: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// FFT window length in samples
        #[arg(long)]
        nfft: Option<usize>,

        /// Note timing resolution in milliseconds
        #[arg(long)]
        resolution_ms: Option<f64>,

        /// Tempo in beats per minute
        #[arg(long)]
        bpm: Option<f64>,

        /// Audibility floor on the compressed loudness scale
        #[arg(long)]
        lim: Option<f64>,

        /// Loudness-limiting divisor
        #[arg(long)]
        limvel: Option<f64>,

        /// Velocity compression ratio
        #[arg(long)]
        ratio: Option<f64>,

        /// MIDI file type (1 or 2)
        #[arg(long)]
        midi_type: Option<u16>,

        /// Also render a piano-roll PNG
        #[arg(long)]
        piano_roll: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Quiet output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Warn
    } else if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Transcribe {
            input,
            output,
            config,
            nfft,
            resolution_ms,
            bpm,
            lim,
            limvel,
            ratio,
            midi_type,
            piano_roll,
            verbose,
            quiet,
        } => {
            if verbose && quiet {
                anyhow::bail!("Cannot specify both --verbose and --quiet");
            }
            init_logging(verbose, quiet);

            // Load configuration
            let mut config = if let Some(config_path) = config {
                wav2midi::config::load_config(config_path)?
            } else {
                Config::default()
            };

            // Command-line overrides
            if let Some(n_fft) = nfft {
                config.stft.n_fft = n_fft;
            }
            if let Some(ms) = resolution_ms {
                config.stft.note_resolution_ms = ms;
            }
            if let Some(bpm) = bpm {
                config.scheduler.bpm = bpm;
            }
            if let Some(lim) = lim {
                config.scheduler.lim = lim;
            }
            if let Some(limvel) = limvel {
                config.mapping.limvel = limvel;
            }
            if let Some(ratio) = ratio {
                config.scheduler.velocity_ratio = ratio;
            }
            if let Some(midi_type) = midi_type {
                config.export.midi_type = midi_type;
            }
            if piano_roll {
                config.export.write_piano_roll = true;
            }

            // Validate input
            validate_input(&input, &config)?;

            let processor = WavToMidi::new(config);

            if !quiet {
                println!("Processing {}...", input.display());
            }

            let midi_path = processor.process(&input, &output)?;

            if !quiet {
                println!("MIDI saved to {}", midi_path.display());
            }
        }
        Commands::ValidateConfig { config } => {
            let config = wav2midi::config::load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
