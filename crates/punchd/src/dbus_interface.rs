use std::sync::Arc;

use chrono::{Duration, Local};
use tokio::sync::Mutex;
use zbus::interface;

use punch_core::toggle::{now_string, plan_toggle, ToggleOutcome};
use punch_core::types::Action;
use punch_core::{timefmt, FrameObservation, Gallery, GalleryError, Identity, Session};

use crate::config::Config;
use crate::store::{AttendanceStore, StoreError};

/// Shared state accessible by D-Bus method handlers.
///
/// The gallery and the attendance store are shared mutable resources;
/// serializing access through this mutex preserves the unique-key and
/// one-event-per-debounce-window invariants across callers. The session
/// belongs to the single kiosk capture loop feeding `ProcessFrame`.
pub struct AppState {
    pub config: Config,
    pub store: AttendanceStore,
    pub gallery: Gallery,
    pub session: Session,
}

/// D-Bus interface for the punchd attendance daemon.
///
/// Bus name: org.punchd.Attendance1
/// Object path: /org/punchd/Attendance1
pub struct PunchService {
    pub state: Arc<Mutex<AppState>>,
}

fn record_message(action: Action) -> String {
    let label = match action {
        Action::PunchIn => "Punch-in",
        Action::PunchOut => "Punch-out",
    };
    format!("{label} recorded successfully")
}

fn fdo_err(e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.punchd.Attendance1")]
impl PunchService {
    /// Register a new user with an identity embedding captured by the
    /// enrollment driver.
    ///
    /// The database insert and the gallery entry are kept atomic: if the
    /// gallery step fails after the insert succeeded, the user row is
    /// rolled back so no orphaned user-without-encoding remains.
    async fn register_user(
        &self,
        name: &str,
        employee_id: &str,
        email: &str,
        department: &str,
        embedding: Vec<f64>,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(name, employee_id, "register_user requested");

        let mut state = self.state.lock().await;
        let registered_date = now_string();
        let email = (!email.is_empty()).then_some(email);
        let department = (!department.is_empty()).then_some(department);

        match state
            .store
            .register_user(name, employee_id, email, department, &registered_date)
            .await
        {
            Ok(_) => {}
            Err(StoreError::DuplicateEmployeeId(_)) => {
                return Ok(serde_json::json!({
                    "success": false,
                    "message": "Employee ID already exists",
                })
                .to_string());
            }
            Err(e) => {
                tracing::error!(error = %e, "register_user: store insert failed");
                return Err(fdo_err(e));
            }
        }

        let identity = Identity {
            name: name.to_string(),
            employee_id: employee_id.to_string(),
            embedding: embedding.iter().map(|&v| v as f32).collect(),
        };
        if let Err(e) = state.gallery.add(identity) {
            // Compensate: the user row must not outlive a failed encoding.
            tracing::error!(error = %e, employee_id, "register_user: gallery add failed, rolling back user row");
            if let Err(del) = state.store.delete_user(employee_id).await {
                tracing::error!(error = %del, employee_id, "register_user: rollback failed");
            }
            return match e {
                GalleryError::InvalidEmbeddingDim(_) | GalleryError::InvalidEmbeddingValue => {
                    Ok(serde_json::json!({
                        "success": false,
                        "message": e.to_string(),
                    })
                    .to_string())
                }
                other => Err(fdo_err(other)),
            };
        }

        tracing::info!(name, employee_id, "user registered");
        Ok(serde_json::json!({
            "success": true,
            "message": format!("User {name} registered successfully"),
        })
        .to_string())
    }

    /// Delete a user: removes the database row, the attendance history,
    /// and the gallery encoding.
    async fn remove_user(&self, employee_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(employee_id, "remove_user requested");

        let mut state = self.state.lock().await;
        let name = match state.store.delete_user(employee_id).await {
            Ok(name) => name,
            Err(StoreError::UserNotFound(_)) => {
                return Ok(serde_json::json!({
                    "success": false,
                    "message": "User not found",
                })
                .to_string());
            }
            Err(e) => return Err(fdo_err(e)),
        };

        match state.gallery.remove(employee_id) {
            Ok(_) => {}
            Err(GalleryError::NotFound(_)) => {
                // A user registered before encoding succeeded has no
                // gallery entry; the row deletion above already fixed it.
                tracing::warn!(employee_id, "no gallery encoding for deleted user");
            }
            Err(e) => return Err(fdo_err(e)),
        }

        tracing::info!(employee_id, "user deleted");
        Ok(serde_json::json!({
            "success": true,
            "message": format!("User {name} deleted successfully"),
        })
        .to_string())
    }

    /// Process one camera frame: raw RGB pixels plus the external
    /// detector's observation (JSON, empty string when no face).
    ///
    /// Returns the per-frame status for display, including any toggle
    /// outcome.
    async fn process_frame(
        &self,
        width: u32,
        height: u32,
        rgb: Vec<u8>,
        observation: &str,
    ) -> zbus::fdo::Result<String> {
        let frame = image::RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| fdo_err(format!("frame buffer does not match {width}x{height}")))?;

        let obs: Option<FrameObservation> = if observation.is_empty() {
            None
        } else {
            Some(serde_json::from_str(observation).map_err(fdo_err)?)
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let status = state.session.process(&state.gallery, &frame, obs.as_ref());

        // Last-known attendance for display alongside the recognition.
        let mut last_display = serde_json::Value::Null;
        if let Some(face) = &status.recognition {
            if let Some(last) = state
                .store
                .last_attendance(&face.employee_id)
                .await
                .map_err(fdo_err)?
            {
                last_display = serde_json::json!({
                    "action": last.action.as_str(),
                    "time": timefmt::format_clock(&last.timestamp),
                    "ago": timefmt::time_ago(&last.timestamp, Local::now()),
                });
            }
        }

        let mut toggle = serde_json::Value::Null;
        if let Some(employee_id) = &status.attempt {
            let last = state
                .store
                .last_attendance(employee_id)
                .await
                .map_err(fdo_err)?;
            let min_interval = Duration::seconds(state.config.min_punch_interval_secs as i64);

            match plan_toggle(last.as_ref(), Local::now(), min_interval) {
                ToggleOutcome::Proceed(action) => {
                    let timestamp = now_string();
                    state
                        .store
                        .append_attendance(employee_id, action, &timestamp)
                        .await
                        .map_err(fdo_err)?;
                    state.session.record_toggle(employee_id);
                    tracing::info!(employee_id = %employee_id, action = %action, %timestamp, "attendance recorded");
                    toggle = serde_json::json!({
                        "success": true,
                        "message": record_message(action),
                        "action": action.as_str(),
                    });
                }
                ToggleOutcome::TooSoon { wait_secs } => {
                    tracing::debug!(employee_id = %employee_id, wait_secs, "toggle rate-limited");
                    toggle = serde_json::json!({
                        "success": false,
                        "message": format!("Please wait {wait_secs} seconds"),
                        "wait_secs": wait_secs,
                    });
                }
            }
        }

        let response = serde_json::json!({
            "recognition": status.recognition,
            "liveness": status.liveness,
            "last_attendance": last_display,
            "toggle": toggle,
        });
        Ok(response.to_string())
    }

    /// Restart the capture session: clears liveness and debounce state.
    async fn reset_session(&self) -> zbus::fdo::Result<()> {
        tracing::info!("session reset requested");
        self.state.lock().await.session.reset();
        Ok(())
    }

    /// List all registered users as JSON.
    async fn list_users(&self) -> zbus::fdo::Result<String> {
        let state = self.state.lock().await;
        let users = state.store.all_users().await.map_err(fdo_err)?;
        serde_json::to_string(&users).map_err(fdo_err)
    }

    /// Today's attendance records (local date), newest first, as JSON.
    async fn today(&self) -> zbus::fdo::Result<String> {
        let state = self.state.lock().await;
        let date = Local::now().format("%Y-%m-%d").to_string();
        let rows = state
            .store
            .attendance_for_date(&date)
            .await
            .map_err(fdo_err)?;
        serde_json::to_string(&rows).map_err(fdo_err)
    }

    /// Last attendance event for one employee, formatted for display.
    async fn last_attendance(&self, employee_id: &str) -> zbus::fdo::Result<String> {
        let state = self.state.lock().await;
        let user = state.store.get_user(employee_id).await.map_err(fdo_err)?;
        let Some(user) = user else {
            return Ok(serde_json::json!({ "found": false }).to_string());
        };

        match state
            .store
            .last_attendance(employee_id)
            .await
            .map_err(fdo_err)?
        {
            Some(last) => Ok(serde_json::json!({
                "found": true,
                "name": user.name,
                "action": last.action.as_str(),
                "timestamp": last.timestamp,
                "time": timefmt::format_clock(&last.timestamp),
                "ago": timefmt::time_ago(&last.timestamp, Local::now()),
            })
            .to_string()),
            None => Ok(serde_json::json!({
                "found": true,
                "name": user.name,
                "action": serde_json::Value::Null,
            })
            .to_string()),
        }
    }

    /// Daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let state = self.state.lock().await;
        let users = state.store.count_users().await.unwrap_or(0);

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "registered_users": users,
            "gallery_size": state.gallery.len(),
            "tolerance": state.config.tolerance,
            "confirm_frames": state.config.confirm_frames,
            "min_punch_interval_secs": state.config.min_punch_interval_secs,
        })
        .to_string())
    }
}
