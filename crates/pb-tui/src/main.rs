mod app;
mod ui;
mod widgets;

use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self as ct_event, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pb_core::config::Config;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::app::App;

fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("warning: falling back to default config: {err}");
            Config::default()
        }
    };

    pb_core::logging::init_logging("pb-tui", &config.general.log_level);

    // The engine dispatches remote calls onto the tokio runtime; the UI loop
    // itself stays synchronous and single-threaded.
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    // Restore the terminal even when we panic mid-frame.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        original_hook(panic_info);
    }));

    let result = run(&config);

    restore_terminal()?;
    result
}

fn run(config: &Config) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config);

    loop {
        app.tick();

        terminal.draw(|frame| {
            ui::render(frame, &mut app);
        })?;

        if ct_event::poll(Duration::from_millis(50))? {
            match ct_event::read()? {
                Event::Key(key) => app.on_key(key),
                Event::Mouse(mouse) => app.on_mouse(mouse),
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)?;
    Ok(())
}
