//! Daemon wiring and the single main loop.
//!
//! One thread owns the X11 connection and every overlay. The control
//! socket listener is the only other thread; it hands requests to the
//! loop over an mpsc channel and a reply is sent only after the
//! registry has applied the request, so a `list` issued right after an
//! `enable` already sees the new state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;

use crate::constants::window::LABEL_SIZE;
use crate::events;
use crate::font::LabelRenderer;
use crate::instance::FailureVisibility;
use crate::ipc::{
    ControlCommand, ControlRequest, ControlResponse, ControlServer, ProfileSummary, spawn_listener,
};
use crate::manager::OverlayManager;
use crate::platform::x11::{X11Backend, X11RegionSelector};
use crate::store::ProfileStore;

/// Sleep cap for one loop iteration, keeping control requests and
/// signals responsive while no capture deadline is near.
const IDLE_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// Log halted capture loops at debug instead of warn.
    pub quiet_capture: bool,
    /// Font family for overlay name labels.
    pub label_font: Option<String>,
}

pub fn run(options: DaemonOptions) -> Result<()> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown_flag))
            .context("Failed to register shutdown signal handler")?;
    }

    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server")?;
    let screen = &conn.setup().roots[screen_num];
    info!(
        "successfully connected to x11: screen={screen_num}, dimensions={}x{}",
        screen.width_in_pixels, screen.height_in_pixels
    );

    let label_renderer = LabelRenderer::discover(options.label_font.as_deref(), LABEL_SIZE);
    if label_renderer.is_none() {
        warn!("no usable label font, overlays get border-only chrome");
    }

    let mut backend = X11Backend::new(&conn, screen, label_renderer.as_ref())?;
    let mut selector = backend.selector();

    let store = ProfileStore::default_location();
    let profiles = match store.load() {
        Ok(profiles) => profiles,
        Err(e) => {
            warn!(error = %e, "loading profiles failed, starting with an empty registry");
            Vec::new()
        }
    };
    info!(
        count = profiles.len(),
        path = %store.path().display(),
        "profile registry loaded"
    );

    let failure_visibility = if options.quiet_capture {
        FailureVisibility::Quiet
    } else {
        FailureVisibility::Warn
    };
    let mut manager = OverlayManager::from_profiles(profiles, failure_visibility);

    let (command_tx, command_rx) = mpsc::channel();
    let server = ControlServer::bind()?;
    // The listener thread takes ownership of the server and blocks in
    // accept, so its Drop never runs; remember the path and remove the
    // socket file from here at shutdown.
    let socket_path = server.path().to_path_buf();
    let _listener = spawn_listener(server, command_tx);
    info!(socket = %socket_path.display(), "control socket ready");

    let loop_result = main_loop(
        &mut manager,
        &mut backend,
        &mut selector,
        &command_rx,
        &shutdown_flag,
    );

    manager.shutdown(&store);
    if let Err(e) = std::fs::remove_file(&socket_path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(error = %e, "removing control socket failed");
    }

    let reason = loop_result?;
    info!(reason, "daemon stopped");
    Ok(())
}

fn main_loop<'a>(
    manager: &mut OverlayManager<'a>,
    backend: &mut X11Backend<'a>,
    selector: &mut X11RegionSelector<'a>,
    commands: &mpsc::Receiver<ControlCommand>,
    shutdown_flag: &AtomicBool,
) -> Result<&'static str> {
    loop {
        if shutdown_flag.load(Ordering::Relaxed) {
            return Ok("signal");
        }

        // Control requests first (non-blocking)
        while let Ok(ControlCommand { request, reply }) = commands.try_recv() {
            if matches!(request, ControlRequest::Shutdown) {
                let _ = reply.send(ControlResponse::Done);
                return Ok("stop requested");
            }
            let response = apply_request(manager, backend, selector, request);
            if reply.send(response).is_err() {
                debug!("control client went away before the reply");
            }
        }

        while let Some(event) = backend.poll_event()? {
            let _ = events::handle_event(manager, selector, event, Instant::now())
                .inspect_err(|err| error!("encountered error in 'handle_event': err={err:#}"));
        }

        let now = Instant::now();
        manager.run_due_ticks(now, backend);

        let sleep = manager
            .next_deadline()
            .map_or(IDLE_SLEEP, |deadline| {
                deadline.saturating_duration_since(now).min(IDLE_SLEEP)
            });
        std::thread::sleep(sleep);
    }
}

fn apply_request<'a>(
    manager: &mut OverlayManager<'a>,
    backend: &mut X11Backend<'a>,
    selector: &mut X11RegionSelector<'a>,
    request: ControlRequest,
) -> ControlResponse {
    let now = Instant::now();
    match request {
        ControlRequest::List => ControlResponse::Profiles(
            manager
                .entries()
                .iter()
                .map(|entry| ProfileSummary {
                    name: entry.profile.name.clone(),
                    capture_area: entry.profile.capture_area,
                    active: entry.is_active(),
                })
                .collect(),
        ),
        ControlRequest::Create { name } => {
            match manager.create_from_selection(name, selector, backend, now) {
                Ok(Some(id)) => match manager.entry(id) {
                    Some(entry) => ControlResponse::Created {
                        name: entry.profile.name.clone(),
                    },
                    None => ControlResponse::Error("created profile vanished".to_string()),
                },
                Ok(None) => ControlResponse::Cancelled,
                Err(e) => ControlResponse::Error(format!("{e:#}")),
            }
        }
        ControlRequest::Enable(name) => match manager.find_by_name(&name) {
            Some(id) => done_or_error(manager.set_active(id, true, backend, now).map(|_| ())),
            None => unknown_profile(&name),
        },
        ControlRequest::Disable(name) => match manager.find_by_name(&name) {
            Some(id) => done_or_error(manager.set_active(id, false, backend, now).map(|_| ())),
            None => unknown_profile(&name),
        },
        ControlRequest::Activate(name) => match manager.find_by_name(&name) {
            Some(id) => done_or_error(manager.activate(id)),
            None => unknown_profile(&name),
        },
        ControlRequest::Delete(name) => match manager.find_by_name(&name) {
            Some(id) => done_or_error(manager.delete(id).map(|_| ())),
            None => unknown_profile(&name),
        },
        // Intercepted by the main loop before it gets here
        ControlRequest::Shutdown => ControlResponse::Done,
    }
}

fn done_or_error(result: Result<()>) -> ControlResponse {
    match result {
        Ok(()) => ControlResponse::Done,
        Err(e) => ControlResponse::Error(format!("{e:#}")),
    }
}

fn unknown_profile(name: &str) -> ControlResponse {
    ControlResponse::Error(format!("no profile named '{name}'"))
}
