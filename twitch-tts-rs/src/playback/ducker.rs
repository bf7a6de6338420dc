//! Volume ducking: ramp other applications down while speech plays.
//!
//! `duck` snapshots each eligible session's per-channel volumes, then steps
//! every channel linearly to `volume × attenuation` over the ramp duration.
//! `restore` steps back to the exact snapshot values and clears it. Without a
//! mixer both are no-ops.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::mixer::{AudioMixer, AudioSession};
use crate::error::TtsError;

const RAMP_STEPS: u32 = 10;

/// Original per-channel volumes by session id.
pub type DuckSnapshot = HashMap<u32, Vec<f32>>;

/// `(session id, from, to)` for one ramp.
type RampStep = (u32, Vec<f32>, Vec<f32>);

pub struct VolumeDucker {
    mixer: Option<Arc<dyn AudioMixer>>,
    attenuation: f32,
    ramp: Duration,
    exclude: Vec<String>,
    own_pid: u32,
    snapshot: Mutex<DuckSnapshot>,
}

impl VolumeDucker {
    /// `exclude` holds process or application names, matched case-insensitively.
    pub fn new(
        mixer: Option<Arc<dyn AudioMixer>>,
        attenuation: f32,
        ramp: Duration,
        exclude: Vec<String>,
    ) -> Self {
        Self {
            mixer,
            attenuation: attenuation.clamp(0.0, 1.0),
            ramp,
            exclude: exclude.into_iter().map(|e| e.to_lowercase()).collect(),
            own_pid: std::process::id(),
            snapshot: Mutex::new(DuckSnapshot::new()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.mixer.is_some()
    }

    pub fn snapshot(&self) -> DuckSnapshot {
        self.lock_snapshot().clone()
    }

    fn lock_snapshot(&self) -> std::sync::MutexGuard<'_, DuckSnapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_excluded(&self, session: &AudioSession) -> bool {
        if session.process_id == Some(self.own_pid) {
            return true;
        }
        [&session.process_name, &session.app_name]
            .into_iter()
            .flatten()
            .any(|name| self.exclude.contains(&name.to_lowercase()))
    }

    /// Lower every non-excluded session. Does nothing if already ducked.
    pub async fn duck(&self) -> DuckSnapshot {
        let Some(mixer) = &self.mixer else {
            return DuckSnapshot::new();
        };
        let already_ducked = !self.lock_snapshot().is_empty();
        if already_ducked {
            return self.snapshot();
        }

        let sessions = match mixer.sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("Ducking skipped: {e}");
                return DuckSnapshot::new();
            }
        };

        let steps: Vec<RampStep> = sessions
            .into_iter()
            .filter(|s| !s.volumes.is_empty() && !self.is_excluded(s))
            .map(|s| {
                let target = s
                    .volumes
                    .iter()
                    .map(|v| (v * self.attenuation).clamp(0.0, 1.0))
                    .collect();
                (s.id, s.volumes, target)
            })
            .collect();
        if steps.is_empty() {
            return DuckSnapshot::new();
        }

        {
            let mut snapshot = self.lock_snapshot();
            for (id, original, _) in &steps {
                snapshot.insert(*id, original.clone());
            }
        }

        info!("Ducking {} audio session(s)", steps.len());
        self.ramp(mixer.as_ref(), &steps).await;
        self.snapshot()
    }

    /// Ramp ducked sessions back to their snapshot volumes, then forget them.
    pub async fn restore(&self) {
        let Some(mixer) = &self.mixer else { return };
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return;
        }

        let steps: Vec<RampStep> = match mixer.sessions().await {
            Ok(sessions) => sessions
                .into_iter()
                .filter_map(|s| {
                    let original = snapshot.get(&s.id)?.clone();
                    // A changed channel layout ramps from the original itself.
                    let from = if s.volumes.len() == original.len() {
                        s.volumes
                    } else {
                        original.clone()
                    };
                    Some((s.id, from, original))
                })
                .collect(),
            Err(e) => {
                debug!("Listing sessions for restore failed: {e}");
                snapshot
                    .iter()
                    .map(|(&id, v)| (id, v.clone(), v.clone()))
                    .collect()
            }
        };

        info!("Restoring {} audio session(s)", steps.len());
        self.ramp(mixer.as_ref(), &steps).await;
        self.lock_snapshot().clear();
    }

    /// Exit safety net: put any still-ducked session straight back.
    pub async fn restore_immediately(&self) {
        let Some(mixer) = &self.mixer else { return };
        let snapshot = std::mem::take(&mut *self.lock_snapshot());
        if snapshot.is_empty() {
            return;
        }

        warn!("Restoring {} ducked session(s) on exit", snapshot.len());
        for (id, original) in snapshot {
            if let Err(e) = mixer.set_volume(id, &original).await {
                debug!("Restore of session {id} skipped: {e}");
            }
        }
    }

    /// Step each session linearly over the ramp duration. The last step
    /// writes `to` exactly.
    async fn ramp(&self, mixer: &dyn AudioMixer, steps: &[RampStep]) {
        let count = if self.ramp.is_zero() { 1 } else { RAMP_STEPS };
        let pause = self.ramp / count;
        let mut skipped: HashSet<u32> = HashSet::new();

        for i in 1..=count {
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let t = i as f32 / count as f32;
            for (id, from, to) in steps {
                let id = *id;
                if skipped.contains(&id) {
                    continue;
                }
                let volumes: Vec<f32> = if i == count {
                    to.clone()
                } else {
                    from.iter()
                        .zip(to)
                        .map(|(f, target)| (f + (target - f) * t).max(0.0))
                        .collect()
                };
                match mixer.set_volume(id, &volumes).await {
                    Ok(()) => {}
                    Err(TtsError::SessionGone { .. }) => {
                        debug!("Audio session {id} is gone, skipping");
                        skipped.insert(id);
                    }
                    Err(e) => {
                        debug!("Volume change for session {id} failed: {e}");
                        skipped.insert(id);
                    }
                }
            }
        }
    }
}
