use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::models::{JoinRequestStatus, JoinRequestUpdate};
use crate::services::api_client::{SharedApiClient, decode_data};

/// Resolved join requests, as the teamless screen wants to hear about
/// them. PENDING and unknown statuses produce nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinPollEvent {
    Accepted { team_name: String },
    Rejected { team_name: String },
    Expired { team_name: String },
}

fn team_label(update: &JoinRequestUpdate) -> String {
    update
        .team_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "the team".to_string())
}

/// An ACCEPTED update means the caller is now a member, so everything
/// after it is irrelevant; processing stops there.
pub fn classify_updates(updates: &[JoinRequestUpdate]) -> Vec<JoinPollEvent> {
    let mut events = Vec::new();
    for update in updates {
        match update.status {
            JoinRequestStatus::Accepted => {
                events.push(JoinPollEvent::Accepted {
                    team_name: team_label(update),
                });
                break;
            }
            JoinRequestStatus::Rejected => events.push(JoinPollEvent::Rejected {
                team_name: team_label(update),
            }),
            JoinRequestStatus::Expired => events.push(JoinPollEvent::Expired {
                team_name: team_label(update),
            }),
            JoinRequestStatus::Pending | JoinRequestStatus::Unknown => {}
        }
    }
    events
}

/// Restartable background poll for join-request resolutions: one fetch
/// immediately, then one per interval until stopped. Failures are logged
/// and swallowed; absence of an update is the common case and polling must
/// never surface errors to the user.
pub struct JoinRequestPoller {
    stop: Arc<AtomicBool>,
    events: Receiver<JoinPollEvent>,
}

impl JoinRequestPoller {
    pub fn start(api: SharedApiClient, form_id: String, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<JoinPollEvent>();

        let stop_flag = Arc::clone(&stop);
        thread::spawn(move || {
            #[derive(serde::Deserialize)]
            struct UpdatesPayload {
                #[serde(default)]
                updates: Vec<JoinRequestUpdate>,
            }

            loop {
                if stop_flag.load(Ordering::Relaxed) {
                    return;
                }

                let result = api
                    .get_json(&format!("/api/form/joinRequestUpdates/{form_id}"))
                    .and_then(|envelope| {
                        decode_data::<UpdatesPayload>(envelope, "join request updates")
                    });

                match result {
                    Ok(payload) => {
                        for event in classify_updates(&payload.updates) {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        debug!("Join request poll failed (ignored): {err}");
                    }
                }

                // Sleep in short slices so teardown is prompt.
                let mut slept = Duration::ZERO;
                let slice = Duration::from_millis(250);
                while slept < interval {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(slice);
                    slept += slice;
                }
            }
        });

        Self { stop, events: rx }
    }

    pub fn try_next(&self) -> Option<JoinPollEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for JoinRequestPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(status: JoinRequestStatus, team: Option<&str>) -> JoinRequestUpdate {
        JoinRequestUpdate {
            team_name: team.map(str::to_string),
            status,
        }
    }

    #[test]
    fn accepted_stops_processing_later_updates() {
        let updates = vec![
            update(JoinRequestStatus::Rejected, Some("EAGLES")),
            update(JoinRequestStatus::Accepted, Some("FALCONS")),
            update(JoinRequestStatus::Expired, Some("HAWKS")),
        ];
        let events = classify_updates(&updates);
        assert_eq!(
            events,
            vec![
                JoinPollEvent::Rejected {
                    team_name: "EAGLES".into()
                },
                JoinPollEvent::Accepted {
                    team_name: "FALCONS".into()
                },
            ]
        );
    }

    #[test]
    fn pending_and_unknown_updates_are_silent() {
        let updates = vec![
            update(JoinRequestStatus::Pending, Some("FALCONS")),
            update(JoinRequestStatus::Unknown, None),
        ];
        assert!(classify_updates(&updates).is_empty());
    }

    #[test]
    fn missing_team_name_gets_a_generic_label() {
        let events = classify_updates(&[update(JoinRequestStatus::Expired, None)]);
        assert_eq!(
            events,
            vec![JoinPollEvent::Expired {
                team_name: "the team".into()
            }]
        );

        let events = classify_updates(&[update(JoinRequestStatus::Rejected, Some("  "))]);
        assert_eq!(
            events,
            vec![JoinPollEvent::Rejected {
                team_name: "the team".into()
            }]
        );
    }
}
