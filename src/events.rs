//! Backend event dispatch
//!
//! Routes translated backend events into the manager and the per-window
//! instance operations. Pure plumbing; every decision lives in
//! `OverlayInstance` or `OverlayManager`.

use anyhow::Result;
use std::time::Instant;

use crate::constants::mouse;
use crate::constants::window::{NUDGE_STEP, OPACITY_STEP, SCALE_STEP};
use crate::instance::OverlayInstance;
use crate::manager::OverlayManager;
use crate::platform::{AreaSelector, BackendEvent, KeyCommand, WindowId};

pub fn handle_event<'a>(
    manager: &mut OverlayManager<'a>,
    selector: &mut dyn AreaSelector,
    event: BackendEvent,
    now: Instant,
) -> Result<()> {
    match event {
        BackendEvent::FocusGained(window) => manager.handle_focus_gained(window),
        BackendEvent::FocusLost(window) => manager.handle_focus_lost(window, now),
        BackendEvent::Key { window, command } => handle_key(manager, selector, window, command, now),
        BackendEvent::ButtonPressed {
            window,
            button,
            root_x,
            root_y,
        } => {
            if button == mouse::BUTTON_LEFT {
                with_instance(manager, window, |i| i.begin_drag(root_x, root_y))
            } else {
                Ok(())
            }
        }
        BackendEvent::ButtonReleased { window, button } => {
            if button == mouse::BUTTON_LEFT {
                with_instance(manager, window, |i| {
                    i.end_drag();
                    Ok(())
                })
            } else {
                Ok(())
            }
        }
        BackendEvent::PointerMoved {
            window,
            root_x,
            root_y,
        } => with_instance(manager, window, |i| i.drag_to(root_x, root_y)),
        BackendEvent::CloseRequested(window) => {
            manager.deactivate_window(window);
            Ok(())
        }
        BackendEvent::Exposed(window) => with_instance(manager, window, OverlayInstance::redraw),
    }
}

fn handle_key<'a>(
    manager: &mut OverlayManager<'a>,
    selector: &mut dyn AreaSelector,
    window: WindowId,
    command: KeyCommand,
    now: Instant,
) -> Result<()> {
    match command {
        KeyCommand::ReselectRegion => manager.reselect_region(window, selector, now),
        KeyCommand::ToggleHide => with_instance(manager, window, |i| i.toggle_temporary_hide()),
        KeyCommand::Deactivate => {
            manager.deactivate_window(window);
            Ok(())
        }
        KeyCommand::ScaleUp => with_instance(manager, window, |i| i.adjust_scale(SCALE_STEP)),
        KeyCommand::ScaleDown => with_instance(manager, window, |i| i.adjust_scale(-SCALE_STEP)),
        KeyCommand::OpacityUp => with_instance(manager, window, |i| i.adjust_opacity(OPACITY_STEP)),
        KeyCommand::OpacityDown => {
            with_instance(manager, window, |i| i.adjust_opacity(-OPACITY_STEP))
        }
        KeyCommand::NudgeLeft => with_instance(manager, window, |i| i.nudge(-NUDGE_STEP, 0.0)),
        KeyCommand::NudgeRight => with_instance(manager, window, |i| i.nudge(NUDGE_STEP, 0.0)),
        KeyCommand::NudgeUp => with_instance(manager, window, |i| i.nudge(0.0, -NUDGE_STEP)),
        KeyCommand::NudgeDown => with_instance(manager, window, |i| i.nudge(0.0, NUDGE_STEP)),
    }
}

fn with_instance<'a>(
    manager: &mut OverlayManager<'a>,
    window: WindowId,
    f: impl FnOnce(&mut OverlayInstance<'a>) -> Result<()>,
) -> Result<()> {
    if let Some(entry) = manager.entry_by_window_mut(window)
        && let Some(instance) = entry.instance.as_mut()
    {
        f(instance)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{LogicalPoint, LogicalRect};
    use crate::instance::FailureVisibility;
    use crate::platform::testing::{FakeFactory, FakeSelector};
    use crate::profile::Profile;

    fn active_manager() -> (OverlayManager<'static>, FakeFactory, WindowId) {
        let mut manager = OverlayManager::from_profiles(
            vec![Profile {
                name: "mirror".to_string(),
                capture_area: LogicalRect::new(10, 10, 200, 100),
                window_position: LogicalPoint::new(10.0, 10.0),
                opacity_level: 0.9,
                scale_factor: 1.0,
            }],
            FailureVisibility::Warn,
        );
        let mut factory = FakeFactory::new(1.0);
        let id = manager.find_by_name("mirror").unwrap();
        manager
            .set_active(id, true, &mut factory, Instant::now())
            .unwrap();
        let window = manager
            .entry(id)
            .unwrap()
            .instance
            .as_ref()
            .unwrap()
            .window_id();
        (manager, factory, window)
    }

    fn instance_of<'m, 'a>(
        manager: &'m OverlayManager<'a>,
        window: WindowId,
    ) -> &'m OverlayInstance<'a> {
        manager
            .entries()
            .iter()
            .find_map(|e| {
                e.instance
                    .as_ref()
                    .filter(|i| i.window_id() == window)
            })
            .unwrap()
    }

    #[test]
    fn focus_events_toggle_mode() {
        let (mut manager, _factory, window) = active_manager();
        let mut selector = FakeSelector::cancelling();
        let now = Instant::now();

        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::FocusGained(window),
            now,
        )
        .unwrap();
        assert!(instance_of(&manager, window).mode().is_interactive());

        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::FocusLost(window),
            now,
        )
        .unwrap();
        assert!(instance_of(&manager, window).mode().is_passive());
    }

    #[test]
    fn key_commands_reach_the_instance() {
        let (mut manager, factory, window) = active_manager();
        let mut selector = FakeSelector::cancelling();
        let now = Instant::now();
        let key = |command| BackendEvent::Key { window, command };

        handle_event(&mut manager, &mut selector, key(KeyCommand::ScaleUp), now).unwrap();
        assert!((instance_of(&manager, window).scale_factor() - 1.1).abs() < 1e-9);

        handle_event(&mut manager, &mut selector, key(KeyCommand::OpacityDown), now).unwrap();
        assert!((instance_of(&manager, window).opacity_level() - 0.85).abs() < 1e-9);

        handle_event(&mut manager, &mut selector, key(KeyCommand::NudgeRight), now).unwrap();
        handle_event(&mut manager, &mut selector, key(KeyCommand::NudgeDown), now).unwrap();
        assert_eq!(
            factory.state_of(window).borrow().position,
            LogicalPoint::new(11.0, 11.0)
        );

        handle_event(&mut manager, &mut selector, key(KeyCommand::ToggleHide), now).unwrap();
        assert!(instance_of(&manager, window).is_temporarily_hidden());
    }

    #[test]
    fn left_drag_moves_the_window() {
        let (mut manager, factory, window) = active_manager();
        let mut selector = FakeSelector::cancelling();
        let now = Instant::now();

        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::FocusGained(window),
            now,
        )
        .unwrap();
        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::ButtonPressed {
                window,
                button: mouse::BUTTON_LEFT,
                root_x: 100,
                root_y: 100,
            },
            now,
        )
        .unwrap();
        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::PointerMoved {
                window,
                root_x: 130,
                root_y: 90,
            },
            now,
        )
        .unwrap();
        assert_eq!(
            factory.state_of(window).borrow().position,
            LogicalPoint::new(40.0, 0.0)
        );

        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::ButtonReleased {
                window,
                button: mouse::BUTTON_LEFT,
            },
            now,
        )
        .unwrap();
        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::PointerMoved {
                window,
                root_x: 500,
                root_y: 500,
            },
            now,
        )
        .unwrap();
        assert_eq!(
            factory.state_of(window).borrow().position,
            LogicalPoint::new(40.0, 0.0)
        );
    }

    #[test]
    fn close_request_deactivates() {
        let (mut manager, _factory, window) = active_manager();
        let mut selector = FakeSelector::cancelling();

        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::CloseRequested(window),
            Instant::now(),
        )
        .unwrap();
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn reselect_key_runs_the_selector() {
        let (mut manager, _factory, window) = active_manager();
        let mut selector = FakeSelector::accepting(LogicalRect::new(0, 0, 64, 64));
        let now = Instant::now();

        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::FocusGained(window),
            now,
        )
        .unwrap();
        handle_event(
            &mut manager,
            &mut selector,
            BackendEvent::Key {
                window,
                command: KeyCommand::ReselectRegion,
            },
            now,
        )
        .unwrap();

        assert_eq!(selector.calls, 1);
        let entry = manager
            .entries()
            .iter()
            .find(|e| e.is_active())
            .unwrap();
        assert_eq!(entry.profile.capture_area, LogicalRect::new(0, 0, 64, 64));
    }

    #[test]
    fn events_for_unknown_windows_are_ignored() {
        let (mut manager, _factory, _window) = active_manager();
        let mut selector = FakeSelector::cancelling();
        let ghost = WindowId(0xdead);
        let now = Instant::now();

        for event in [
            BackendEvent::FocusGained(ghost),
            BackendEvent::FocusLost(ghost),
            BackendEvent::Key {
                window: ghost,
                command: KeyCommand::ToggleHide,
            },
            BackendEvent::CloseRequested(ghost),
            BackendEvent::Exposed(ghost),
        ] {
            handle_event(&mut manager, &mut selector, event, now).unwrap();
        }
        assert_eq!(manager.active_count(), 1);
    }
}
