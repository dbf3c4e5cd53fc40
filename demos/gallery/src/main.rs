//! cellflow gallery - run one widget full screen
//!
//! Every widget follows the same loop:
//! 1. Event (keyboard) -> App::map_event() -> Intents
//! 2. Intents applied to the widget's Store
//! 3. Derivations and fetchers react to the written cells
//! 4. Any cell change marks the frame dirty -> re-render
//!
//! # Usage
//!
//! ```sh
//! # Convert 25 EUR to GBP
//! cargo run -p cellflow-gallery -- currency --from eur --to gbp --amount 25
//!
//! # 16 character password with digits, logging to a file
//! cargo run -p cellflow-gallery -- --log-file gallery.log password --length 16 --numbers
//! ```

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use cellflow_core::{App, Runtime};
use cellflow_widgets::{
    load_profiles, sample_profiles, ColorChanger, CurrencyApiConfig, CurrencyConverter,
    CurrencySettings, PasswordGenerator, PasswordPolicy, PasswordSettings, ProfileCards,
    ProfileError, Value, DEFAULT_API_BASE, DEFAULT_COLOR,
};
use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

/// Terminal gallery of reactive cellflow widgets
#[derive(Parser, Debug)]
#[command(name = "cellflow-gallery")]
#[command(about = "Run a reactive cellflow widget in the terminal")]
struct Args {
    /// Write logs to this file (no logging when omitted)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Maximum log level
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    widget: Widget,
}

#[derive(Subcommand, Debug)]
enum Widget {
    /// Currency converter backed by the public currency API
    Currency {
        /// Currency to convert from
        #[arg(long, default_value = "usd")]
        from: String,

        /// Currency to convert to
        #[arg(long, default_value = "inr")]
        to: String,

        /// Amount to convert
        #[arg(long, default_value_t = 1.0)]
        amount: f64,

        /// Base URL of the currency API
        #[arg(long, default_value = DEFAULT_API_BASE)]
        api_base: String,
    },

    /// Random password generator
    Password {
        /// Password length (clamped to 6..=100)
        #[arg(long, default_value_t = 8)]
        length: usize,

        /// Allow digits
        #[arg(long)]
        numbers: bool,

        /// Allow symbols
        #[arg(long)]
        symbols: bool,
    },

    /// Background colour changer
    Colors {
        /// Starting colour name
        #[arg(long, default_value = DEFAULT_COLOR)]
        initial: String,
    },

    /// Profile cards
    Profiles {
        /// JSON array of profiles (built-in samples when omitted)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn init_logging(args: &Args) -> io::Result<()> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };

    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    tracing::info!(path = %path.display(), level = %args.log_level, "logging started");
    Ok(())
}

fn store_error(err: cellflow_core::StoreError) -> io::Error {
    io::Error::other(err)
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let runtime = Runtime::<Value>::new();

    match args.widget {
        Widget::Currency {
            from,
            to,
            amount,
            api_base,
        } => {
            let settings = CurrencySettings { from, to, amount };
            let app = CurrencyConverter::new(
                settings,
                CurrencyApiConfig::new(api_base),
                runtime.resolution_tx(),
            )
            .map_err(store_error)?;
            run_widget(runtime, app).await
        }
        Widget::Password {
            length,
            numbers,
            symbols,
        } => {
            let settings = PasswordSettings {
                length,
                numbers,
                symbols,
            };
            let app = PasswordGenerator::new(settings, PasswordPolicy::default())
                .map_err(io::Error::other)?;
            run_widget(runtime, app).await
        }
        Widget::Colors { initial } => {
            let app = ColorChanger::new(&initial).map_err(store_error)?;
            run_widget(runtime, app).await
        }
        Widget::Profiles { file } => {
            // Report bad input before taking over the terminal
            let profiles = match &file {
                Some(path) => load_profiles(path),
                None => sample_profiles(),
            };
            let app = match profiles.and_then(ProfileCards::new) {
                Ok(app) => app,
                Err(ProfileError::Io(e)) => {
                    eprintln!("Error: could not read profile file.");
                    eprintln!("Details: {}", e);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            run_widget(runtime, app).await
        }
    }
}

async fn run_widget<A: App<Value = Value>>(
    mut runtime: Runtime<Value>,
    mut app: A,
) -> io::Result<()> {
    // ===== Terminal setup =====
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = runtime.run(&mut terminal, &mut app).await;

    // ===== Cleanup =====
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = &result {
        tracing::error!(error = %err, "widget stopped with an error");
    }
    result
}
