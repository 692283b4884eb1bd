pub mod widgets;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::*,
};
use futures_util::StreamExt;
use ratatui::prelude::*;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Settings;
use crate::core::{Phase, ReplaySession};

pub use widgets::draw_dashboard;

const IDLE_POLL: Duration = Duration::from_millis(100);

pub async fn start_dashboard(settings: Settings) -> Result<()> {
    let mut session = ReplaySession::new(settings)?;

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = drive(&mut terminal, &mut session).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Some(failure) = session.failure() {
        error!(session = %session.id(), "Dashboard closed after failure: {}", failure);
    }
    result
}

/// Runs the session to completion, redrawing after every transition and batch,
/// then keeps the final view up until the user quits.
async fn drive<B: Backend>(terminal: &mut Terminal<B>, session: &mut ReplaySession) -> Result<()> {
    terminal.draw(|f| draw_dashboard(f, session))?;

    // LOADING and WARMUP_FIT failures leave the session in ERROR; the view reports them.
    let ready = session.load().is_ok() && {
        terminal.draw(|f| draw_dashboard(f, session))?;
        session.fit_warmup().is_ok()
    };
    terminal.draw(|f| draw_dashboard(f, session))?;

    if ready {
        let mut batches = Box::pin(session.paced_batches()?);
        while let Some(batch) = batches.next().await {
            if quit_requested(Duration::ZERO)? {
                info!(session = %session.id(), "Replay interrupted by user");
                return Ok(());
            }
            session.ingest(&batch)?;
            terminal.draw(|f| draw_dashboard(f, session))?;
        }
        session.finish()?;
    }

    loop {
        terminal.draw(|f| draw_dashboard(f, session))?;
        if quit_requested(IDLE_POLL)? {
            break;
        }
    }
    debug_assert!(matches!(session.phase(), Phase::Done | Phase::Error));
    Ok(())
}

fn quit_requested(timeout: Duration) -> Result<bool> {
    if event::poll(timeout)? {
        if let Event::Key(key) = event::read()? {
            return Ok(key.kind == KeyEventKind::Press
                && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc));
        }
    }
    Ok(false)
}
