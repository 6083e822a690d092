// FyreVM-RS: Glulx interpreter with channel output in the terminal

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing_subscriber::EnvFilter;

use fyrevm::ui::App;
use fyrevm::{Capabilities, Engine, EngineOptions};

struct Args {
    game: PathBuf,
    seed: Option<u64>,
    veneer: bool,
    log: Option<PathBuf>,
}

fn usage(program_name: &str) -> ! {
    eprintln!("Usage: {} <game.ulx> [--seed N] [--no-veneer] [--log FILE]", program_name);
    eprintln!();
    eprintln!("  --seed N      fix the random number generator seed");
    eprintln!("  --no-veneer   run Inform veneer routines as bytecode");
    eprintln!("  --log FILE    write diagnostics to FILE (filter with RUST_LOG)");
    std::process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let program_name = args.first().map(|s| s.as_str()).unwrap_or("fyrevm");

    let mut game = None;
    let mut seed = None;
    let mut veneer = true;
    let mut log = None;

    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--seed" => match rest.next().and_then(|s| s.parse().ok()) {
                Some(n) => seed = Some(n),
                None => {
                    eprintln!("Error: --seed needs a number");
                    usage(program_name);
                }
            },
            "--no-veneer" => veneer = false,
            "--log" => match rest.next() {
                Some(path) => log = Some(PathBuf::from(path)),
                None => {
                    eprintln!("Error: --log needs a file name");
                    usage(program_name);
                }
            },
            "-h" | "--help" => usage(program_name),
            other if game.is_none() && !other.starts_with("--") => game = Some(PathBuf::from(other)),
            other => {
                eprintln!("Error: unexpected argument '{}'", other);
                usage(program_name);
            }
        }
    }

    let Some(game) = game else {
        eprintln!("Error: No game file provided");
        eprintln!();
        usage(program_name);
    };
    Args {
        game,
        seed,
        veneer,
        log,
    }
}

/// Send log output to a file; the terminal belongs to the UI
fn init_logging(path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    if !args.game.exists() {
        eprintln!("Error: File '{}' not found", args.game.display());
        std::process::exit(1);
    }
    if let Some(path) = &args.log {
        init_logging(path)?;
    }

    let game = fs::read(&args.game)?;
    let mut options = EngineOptions::default().with_veneer(args.veneer);
    if let Some(seed) = args.seed {
        options = options.with_seed(seed);
    }
    let mut engine = match Engine::new(game, options) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error loading {}: {}", args.game.display(), e);
            std::process::exit(1);
        }
    };
    engine.set_capabilities(Capabilities::interactive());

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(engine, args.game.with_extension("sav"));
    app.start();
    let res = app.run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }
    if let Some(error) = &app.error {
        eprintln!("Game stopped: {}", error);
    }

    Ok(())
}
