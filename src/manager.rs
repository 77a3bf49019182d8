//! Profile registry and overlay lifecycle
//!
//! `OverlayManager` owns the ordered profile list and the 1:1 association
//! between a profile and its live `OverlayInstance`. Profiles stay in
//! insertion order for persistence; activation state is runtime-only.
//! Instances are only ever created and destroyed here, so the "active
//! iff an instance exists" invariant holds by construction.

use anyhow::{Result, anyhow};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::CaptureProvider;
use crate::instance::{FailureVisibility, OverlayInstance, ReselectOutcome};
use crate::platform::{AreaSelector, SurfaceFactory, WindowId};
use crate::profile::Profile;
use crate::store::ProfileStore;

/// Stable handle to a registry entry. Ids are allocated from a counter
/// and never reused within a run, so a stale handle can only miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfileId(u64);

/// One registry slot: the persisted profile plus its instance while
/// active.
pub struct ManagedProfile<'a> {
    id: ProfileId,
    pub profile: Profile,
    pub instance: Option<OverlayInstance<'a>>,
}

impl<'a> ManagedProfile<'a> {
    fn new(id: ProfileId, profile: Profile) -> Self {
        Self {
            id,
            profile,
            instance: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.instance.is_some()
    }
}

pub struct OverlayManager<'a> {
    entries: Vec<ManagedProfile<'a>>,
    next_id: u64,
    failure_visibility: FailureVisibility,
}

impl<'a> OverlayManager<'a> {
    pub fn new(failure_visibility: FailureVisibility) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            failure_visibility,
        }
    }

    /// Wrap a loaded profile list. Everything starts inactive; overlays
    /// come up through [`set_active`](Self::set_active).
    pub fn from_profiles(profiles: Vec<Profile>, failure_visibility: FailureVisibility) -> Self {
        let mut manager = Self::new(failure_visibility);
        for profile in profiles {
            let id = manager.allocate_id();
            manager.entries.push(ManagedProfile::new(id, profile));
        }
        manager
    }

    fn allocate_id(&mut self) -> ProfileId {
        let id = ProfileId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn entries(&self) -> &[ManagedProfile<'a>] {
        &self.entries
    }

    /// Profiles in registry order, for persistence and listing.
    pub fn profiles(&self) -> Vec<Profile> {
        self.entries.iter().map(|e| e.profile.clone()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_active()).count()
    }

    /// First registry entry with a matching name. Duplicate names are
    /// legal; the earliest wins.
    pub fn find_by_name(&self, name: &str) -> Option<ProfileId> {
        self.entries
            .iter()
            .find(|e| e.profile.name == name)
            .map(|e| e.id)
    }

    pub fn entry(&self, id: ProfileId) -> Option<&ManagedProfile<'a>> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn entry_mut(&mut self, id: ProfileId) -> Result<&mut ManagedProfile<'a>> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| anyhow!("no profile with id {}", id.0))
    }

    pub fn entry_by_window_mut(&mut self, window: WindowId) -> Option<&mut ManagedProfile<'a>> {
        self.entries.iter_mut().find(|e| {
            e.instance
                .as_ref()
                .is_some_and(|i| i.window_id() == window)
        })
    }

    /// Build a new profile from a modal area selection. On acceptance the
    /// profile is appended active, its window already Interactive and
    /// foregrounded for immediate editing. On cancellation nothing is
    /// added.
    pub fn create_from_selection(
        &mut self,
        name: Option<String>,
        selector: &mut dyn AreaSelector,
        factory: &mut dyn SurfaceFactory<'a>,
        now: Instant,
    ) -> Result<Option<ProfileId>> {
        let Some(area) = selector.select()? else {
            debug!("selection cancelled, no profile created");
            return Ok(None);
        };
        if !area.has_area() {
            debug!("empty selection, no profile created");
            return Ok(None);
        }

        let mut profile = match name {
            Some(name) => Profile::with_name(name),
            None => Profile::default(),
        };
        profile.capture_area = area;
        profile.window_position = area.origin();
        let id = self.allocate_id();
        let mut entry = ManagedProfile::new(id, profile);

        let surface = factory.create_surface(&entry.profile)?;
        let mut instance =
            OverlayInstance::create(&entry.profile, surface, self.failure_visibility, now)?;
        instance.handle_focus_gained()?;
        instance.bring_to_foreground()?;
        entry.instance = Some(instance);

        info!(profile = %entry.profile.name, area = ?area, "profile created from selection");
        self.entries.push(entry);
        Ok(Some(id))
    }

    /// Idempotent activation toggle. Returns whether the active state
    /// changed; enabling an already-active profile only raises its
    /// window.
    pub fn set_active(
        &mut self,
        id: ProfileId,
        active: bool,
        factory: &mut dyn SurfaceFactory<'a>,
        now: Instant,
    ) -> Result<bool> {
        let failure_visibility = self.failure_visibility;
        let entry = self.entry_mut(id)?;
        if active {
            if let Some(instance) = entry.instance.as_mut() {
                instance.bring_to_foreground()?;
                return Ok(false);
            }
            let surface = factory.create_surface(&entry.profile)?;
            entry.instance = Some(OverlayInstance::create(
                &entry.profile,
                surface,
                failure_visibility,
                now,
            )?);
            info!(profile = %entry.profile.name, "overlay activated");
            Ok(true)
        } else if entry.instance.take().is_some() {
            info!(profile = %entry.profile.name, "overlay deactivated");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Raise an active profile's window. Inactive profiles are left
    /// alone; activation is always an explicit enable.
    pub fn activate(&mut self, id: ProfileId) -> Result<()> {
        let entry = self.entry_mut(id)?;
        if let Some(instance) = entry.instance.as_mut() {
            instance.bring_to_foreground()?;
        }
        Ok(())
    }

    /// Remove a profile, deactivating it first. Irrecoverable; callers
    /// confirm intent.
    pub fn delete(&mut self, id: ProfileId) -> Result<Profile> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| anyhow!("no profile with id {}", id.0))?;
        let entry = &mut self.entries[index];
        if entry.instance.take().is_some() {
            info!(profile = %entry.profile.name, "overlay deactivated");
        }
        let entry = self.entries.remove(index);
        info!(profile = %entry.profile.name, "profile deleted");
        Ok(entry.profile)
    }

    /// Persist the registry, then drop every live instance. A save
    /// failure is reported once and does not block teardown.
    pub fn shutdown(&mut self, store: &ProfileStore) {
        if let Err(e) = store.save(&self.profiles()) {
            warn!(error = %e, "saving profiles at shutdown failed");
        }
        let active = self.active_count();
        for entry in &mut self.entries {
            entry.instance = None;
        }
        if active > 0 {
            info!(count = active, "overlay instances torn down");
        }
    }

    pub fn handle_focus_gained(&mut self, window: WindowId) -> Result<()> {
        if let Some(entry) = self.entry_by_window_mut(window)
            && let Some(instance) = entry.instance.as_mut()
        {
            instance.handle_focus_gained()?;
        }
        Ok(())
    }

    pub fn handle_focus_lost(&mut self, window: WindowId, now: Instant) -> Result<()> {
        if let Some(entry) = self.entry_by_window_mut(window)
            && let Some(instance) = entry.instance.as_mut()
        {
            instance.handle_focus_lost(&mut entry.profile, now)?;
        }
        Ok(())
    }

    /// Run the reselection flow for the focused window. A teardown
    /// request (cancelled selection with no prior region) deactivates the
    /// overlay; the profile itself stays in the registry.
    pub fn reselect_region(
        &mut self,
        window: WindowId,
        selector: &mut dyn AreaSelector,
        now: Instant,
    ) -> Result<()> {
        let Some(entry) = self.entry_by_window_mut(window) else {
            return Ok(());
        };
        let Some(instance) = entry.instance.as_mut() else {
            return Ok(());
        };
        let outcome = instance.reselect_region(&mut entry.profile, selector, now)?;
        if outcome == ReselectOutcome::TeardownRequested {
            info!(profile = %entry.profile.name, "overlay closed after cancelled selection");
            entry.instance = None;
        }
        Ok(())
    }

    /// Teardown in response to a close request or deactivate command on
    /// the window itself.
    pub fn deactivate_window(&mut self, window: WindowId) -> bool {
        let Some(entry) = self.entry_by_window_mut(window) else {
            return false;
        };
        entry.instance = None;
        info!(profile = %entry.profile.name, "overlay deactivated");
        true
    }

    pub fn run_due_ticks(&mut self, now: Instant, provider: &mut dyn CaptureProvider) {
        for entry in &mut self.entries {
            if let Some(instance) = entry.instance.as_mut() {
                instance.run_due_tick(now, provider);
            }
        }
    }

    /// Earliest capture deadline across all running loops.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .filter_map(|e| e.instance.as_ref().and_then(|i| i.next_deadline()))
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{LogicalPoint, LogicalRect};
    use crate::platform::testing::{FakeFactory, FakeProvider, FakeSelector};
    use std::time::Duration;

    fn named_profile(name: &str, area: LogicalRect) -> Profile {
        Profile {
            name: name.to_string(),
            capture_area: area,
            window_position: area.origin(),
            opacity_level: 0.8,
            scale_factor: 1.0,
        }
    }

    fn seeded_manager() -> OverlayManager<'static> {
        OverlayManager::from_profiles(
            vec![
                named_profile("left", LogicalRect::new(0, 0, 100, 100)),
                named_profile("mid", LogicalRect::new(100, 0, 100, 100)),
                named_profile("right", LogicalRect::new(200, 0, 100, 100)),
            ],
            FailureVisibility::Warn,
        )
    }

    fn window_of(manager: &OverlayManager<'_>, id: ProfileId) -> WindowId {
        manager
            .entry(id)
            .unwrap()
            .instance
            .as_ref()
            .unwrap()
            .window_id()
    }

    #[test]
    fn create_from_selection_appends_active_profile() {
        let mut manager = OverlayManager::new(FailureVisibility::Warn);
        let mut factory = FakeFactory::new(1.0);
        let mut selector = FakeSelector::accepting(LogicalRect::new(40, 50, 200, 150));

        let id = manager
            .create_from_selection(None, &mut selector, &mut factory, Instant::now())
            .unwrap()
            .unwrap();

        assert_eq!(manager.entries().len(), 1);
        let entry = manager.entry(id).unwrap();
        assert!(entry.is_active());
        assert_eq!(entry.profile.capture_area, LogicalRect::new(40, 50, 200, 150));
        assert_eq!(entry.profile.window_position, LogicalPoint::new(40.0, 50.0));

        let instance = entry.instance.as_ref().unwrap();
        assert!(instance.mode().is_interactive());
        assert!(instance.is_capturing());
        let state = factory.state_of(instance.window_id());
        assert!(state.borrow().foreground_calls >= 1);
    }

    #[test]
    fn create_from_selection_applies_requested_name() {
        let mut manager = OverlayManager::new(FailureVisibility::Warn);
        let mut factory = FakeFactory::new(1.0);
        let mut selector = FakeSelector::accepting(LogicalRect::new(0, 0, 64, 64));

        let id = manager
            .create_from_selection(
                Some("chat".to_string()),
                &mut selector,
                &mut factory,
                Instant::now(),
            )
            .unwrap()
            .unwrap();

        assert_eq!(manager.entry(id).unwrap().profile.name, "chat");
    }

    #[test]
    fn cancelled_selection_leaves_registry_unchanged() {
        let mut manager = seeded_manager();
        let before = manager.profiles();
        let mut factory = FakeFactory::new(1.0);
        let mut selector = FakeSelector::cancelling();

        let created = manager
            .create_from_selection(None, &mut selector, &mut factory, Instant::now())
            .unwrap();

        assert!(created.is_none());
        assert_eq!(manager.profiles(), before);
        assert!(factory.created.is_empty());
    }

    #[test]
    fn set_active_is_idempotent() {
        let mut manager = seeded_manager();
        let id = manager.find_by_name("mid").unwrap();
        let mut factory = FakeFactory::new(1.0);
        let now = Instant::now();

        assert!(manager.set_active(id, true, &mut factory, now).unwrap());
        assert!(!manager.set_active(id, true, &mut factory, now).unwrap());
        assert_eq!(factory.created.len(), 1);
        assert_eq!(manager.active_count(), 1);

        assert!(manager.set_active(id, false, &mut factory, now).unwrap());
        assert!(!manager.set_active(id, false, &mut factory, now).unwrap());
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn enabling_active_profile_raises_its_window() {
        let mut manager = seeded_manager();
        let id = manager.find_by_name("left").unwrap();
        let mut factory = FakeFactory::new(1.0);
        let now = Instant::now();
        manager.set_active(id, true, &mut factory, now).unwrap();

        let state = factory.state_of(window_of(&manager, id));
        let before = state.borrow().foreground_calls;
        manager.set_active(id, true, &mut factory, now).unwrap();
        assert_eq!(state.borrow().foreground_calls, before + 1);
    }

    #[test]
    fn activate_never_creates_an_instance() {
        let mut manager = seeded_manager();
        let id = manager.find_by_name("left").unwrap();

        manager.activate(id).unwrap();
        assert_eq!(manager.active_count(), 0);

        let mut factory = FakeFactory::new(1.0);
        manager
            .set_active(id, true, &mut factory, Instant::now())
            .unwrap();
        manager.activate(id).unwrap();
        let state = factory.state_of(window_of(&manager, id));
        assert!(state.borrow().foreground_calls >= 1);
    }

    #[test]
    fn delete_deactivates_then_removes() {
        let mut manager = seeded_manager();
        let id = manager.find_by_name("mid").unwrap();
        let mut factory = FakeFactory::new(1.0);
        manager
            .set_active(id, true, &mut factory, Instant::now())
            .unwrap();
        let window = window_of(&manager, id);

        let removed = manager.delete(id).unwrap();

        assert_eq!(removed.name, "mid");
        assert_eq!(manager.entries().len(), 2);
        assert!(manager.entry_by_window_mut(window).is_none());
        assert!(manager.find_by_name("mid").is_none());
        let names: Vec<_> = manager.profiles().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["left", "right"]);
    }

    #[test]
    fn registry_preserves_insertion_order() {
        let mut manager = seeded_manager();
        let mut factory = FakeFactory::new(1.0);
        let mut selector = FakeSelector::accepting(LogicalRect::new(0, 200, 50, 50));
        manager
            .create_from_selection(None, &mut selector, &mut factory, Instant::now())
            .unwrap();

        let names: Vec<_> = manager.profiles().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["left", "mid", "right", "New profile"]);
    }

    #[test]
    fn duplicate_names_resolve_to_first_entry() {
        let manager = OverlayManager::from_profiles(
            vec![
                named_profile("twin", LogicalRect::new(0, 0, 10, 10)),
                named_profile("twin", LogicalRect::new(50, 0, 10, 10)),
            ],
            FailureVisibility::Warn,
        );
        let id = manager.find_by_name("twin").unwrap();
        assert_eq!(
            manager.entry(id).unwrap().profile.capture_area,
            LogicalRect::new(0, 0, 10, 10)
        );
    }

    #[test]
    fn focus_events_route_by_window() {
        let mut manager = seeded_manager();
        let mut factory = FakeFactory::new(1.0);
        let now = Instant::now();
        let a = manager.find_by_name("left").unwrap();
        let b = manager.find_by_name("mid").unwrap();
        manager.set_active(a, true, &mut factory, now).unwrap();
        manager.set_active(b, true, &mut factory, now).unwrap();

        manager.handle_focus_gained(window_of(&manager, b)).unwrap();

        let mode_of = |id| manager.entry(id).unwrap().instance.as_ref().unwrap().mode();
        assert!(mode_of(a).is_passive());
        assert!(mode_of(b).is_interactive());
    }

    #[test]
    fn focus_lost_folds_into_registry_profile() {
        let mut manager = seeded_manager();
        let mut factory = FakeFactory::new(1.0);
        let now = Instant::now();
        let id = manager.find_by_name("right").unwrap();
        manager.set_active(id, true, &mut factory, now).unwrap();
        let window = window_of(&manager, id);

        manager.handle_focus_gained(window).unwrap();
        factory.state_of(window).borrow_mut().position = LogicalPoint::new(11.0, 22.0);
        manager
            .handle_focus_lost(window, now + Duration::from_millis(5))
            .unwrap();

        assert_eq!(
            manager.entry(id).unwrap().profile.window_position,
            LogicalPoint::new(11.0, 22.0)
        );
    }

    #[test]
    fn deactivation_skips_fold() {
        let mut manager = seeded_manager();
        let mut factory = FakeFactory::new(1.0);
        let now = Instant::now();
        let id = manager.find_by_name("right").unwrap();
        manager.set_active(id, true, &mut factory, now).unwrap();
        let window = window_of(&manager, id);

        // Drag the window while Interactive, then disable without losing
        // focus first: the stored position must survive untouched
        manager.handle_focus_gained(window).unwrap();
        factory.state_of(window).borrow_mut().position = LogicalPoint::new(999.0, 999.0);
        manager.set_active(id, false, &mut factory, now).unwrap();

        assert_eq!(
            manager.entry(id).unwrap().profile.window_position,
            LogicalPoint::new(200.0, 0.0)
        );
    }

    #[test]
    fn close_request_deactivates_window() {
        let mut manager = seeded_manager();
        let mut factory = FakeFactory::new(1.0);
        let id = manager.find_by_name("left").unwrap();
        manager
            .set_active(id, true, &mut factory, Instant::now())
            .unwrap();
        let window = window_of(&manager, id);

        assert!(manager.deactivate_window(window));
        assert_eq!(manager.active_count(), 0);
        assert!(!manager.deactivate_window(window));
    }

    #[test]
    fn run_due_ticks_drives_every_active_instance() {
        let mut manager = seeded_manager();
        let mut factory = FakeFactory::new(1.0);
        let now = Instant::now();
        for name in ["left", "mid"] {
            let id = manager.find_by_name(name).unwrap();
            manager.set_active(id, true, &mut factory, now).unwrap();
        }

        let mut provider = FakeProvider::working();
        manager.run_due_ticks(now + Duration::from_millis(16), &mut provider);
        assert_eq!(provider.calls, 2);
    }

    #[test]
    fn next_deadline_is_earliest_running_loop() {
        let mut manager = seeded_manager();
        let mut factory = FakeFactory::new(1.0);
        let t0 = Instant::now();
        let a = manager.find_by_name("left").unwrap();
        let b = manager.find_by_name("mid").unwrap();
        manager.set_active(a, true, &mut factory, t0).unwrap();
        manager
            .set_active(b, true, &mut factory, t0 + Duration::from_millis(5))
            .unwrap();

        assert_eq!(
            manager.next_deadline(),
            Some(t0 + Duration::from_millis(16))
        );
    }

    #[test]
    fn shutdown_saves_then_tears_down() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ProfileStore::at_path(dir.path().join("profiles.json"));
        let mut manager = seeded_manager();
        let mut factory = FakeFactory::new(1.0);
        let id = manager.find_by_name("left").unwrap();
        manager
            .set_active(id, true, &mut factory, Instant::now())
            .unwrap();

        manager.shutdown(&store);

        assert_eq!(manager.active_count(), 0);
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded[0].name, "left");
    }

    #[test]
    fn reselect_teardown_request_deactivates() {
        let mut manager =
            OverlayManager::from_profiles(vec![Profile::default()], FailureVisibility::Warn);
        let id = manager.find_by_name("New profile").unwrap();
        let mut factory = FakeFactory::new(1.0);
        let now = Instant::now();
        manager.set_active(id, true, &mut factory, now).unwrap();
        let window = window_of(&manager, id);
        manager.handle_focus_gained(window).unwrap();

        let mut selector = FakeSelector::cancelling();
        manager.reselect_region(window, &mut selector, now).unwrap();

        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.entries().len(), 1);
    }
}
