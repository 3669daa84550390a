mod app;
mod draw;
mod theme;

pub use app::App;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, Event as CEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;

use crate::actions::{Actions, spawn_kill, spawn_stop};
use crate::inspect::{Inspector, LogFollower, spawn_inspect};
use crate::poller::{Poller, Update, spawn_poller};
use crate::system::spawn_host_sampler;

use app::Command;

type Term = Terminal<CrosstermBackend<io::Stdout>>;

fn setup_terminal() -> io::Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Term) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Effect handlers the event loop dispatches `Command`s to.
pub struct Effects {
    pub actions: Arc<dyn Actions>,
    pub inspector: Arc<dyn Inspector>,
}

/// Run the dashboard until the user quits. Collection, host sampling,
/// actions and log streams run in background tasks; this loop owns `app` and
/// is the only place snapshots are ingested.
pub async fn run_tui(mut app: App, poller: Poller, effects: Effects) -> io::Result<()> {
    let (tx, mut rx) = mpsc::channel::<Update>(64);
    let (refresh_tx, refresh_rx) = mpsc::channel::<()>(1);

    let poller_handle = spawn_poller(poller, tx.clone(), refresh_rx);
    spawn_host_sampler(tx.clone());

    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, &mut app, &mut rx, &refresh_tx, &tx, effects).await;
    restore_terminal(terminal)?;

    poller_handle.abort();
    log::info!("dashboard closed");
    result
}

async fn event_loop(
    terminal: &mut Term,
    app: &mut App,
    rx: &mut mpsc::Receiver<Update>,
    refresh_tx: &mpsc::Sender<()>,
    tx: &mpsc::Sender<Update>,
    effects: Effects,
) -> io::Result<()> {
    let mut follower: Option<LogFollower> = None;

    loop {
        while let Ok(update) = rx.try_recv() {
            app.handle_update(update);
        }
        // Dropping the follower cancels its stream
        if follower
            .as_ref()
            .is_some_and(|f| app.log_target() != Some(&f.id))
        {
            follower = None;
        }

        terminal.draw(|f| draw::draw(f, app))?;

        if !event::poll(Duration::from_millis(50))? {
            tokio::task::yield_now().await;
            continue;
        }

        let CEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match app.handle_key(key) {
            Some(Command::Quit) => return Ok(()),
            Some(Command::Refresh) => {
                // A refresh already queued covers this one
                let _ = refresh_tx.try_send(());
            }
            Some(Command::Kill(pids)) => spawn_kill(Arc::clone(&effects.actions), pids, tx.clone()),
            Some(Command::Stop(ids)) => spawn_stop(Arc::clone(&effects.actions), ids, tx.clone()),
            Some(Command::Inspect(pid)) => {
                spawn_inspect(Arc::clone(&effects.inspector), pid, tx.clone())
            }
            Some(Command::FollowLogs(id)) => {
                follower = Some(effects.inspector.follow_logs(id, tx.clone()));
            }
            None => {}
        }
    }
}
