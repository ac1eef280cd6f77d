//! Mentorships and career progression.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::catalogs::CAREER_TICKS_REQUIRED;
use crate::error::{GameError, Result};
use crate::models::{CareerTrack, Event, MemoryFact, MentorshipNote, Player, PressRelease, Scholar};
use crate::press::{academic_gossip, GossipContext};

use super::GameService;

impl GameService {
    /// Queue a mentorship; it activates at the next digest via a
    /// `mentorship_activation` order.
    pub fn queue_mentorship(
        &mut self,
        player_id: &str,
        scholar_id: &str,
        career_track: Option<CareerTrack>,
    ) -> Result<PressRelease> {
        self.ensure_not_paused()?;
        let player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        let scholar = self
            .store
            .get_scholar(scholar_id)?
            .ok_or_else(|| GameError::not_found("scholar", scholar_id))?;
        if self.store.get_active_mentorship(scholar_id)?.is_some() {
            return Err(GameError::invalid(format!(
                "scholar {scholar_id} already has an active mentor"
            )));
        }

        let now = Utc::now();
        let mentorship_id = self.store.add_mentorship(
            player_id,
            scholar_id,
            career_track.map(|t| t.as_str()),
            now,
        )?;
        self.store.enqueue_order(
            "mentorship_activation",
            Some(player_id),
            Some(scholar_id),
            &json!({
                "mentorship_id": mentorship_id,
                "scholar_id": scholar_id,
                "career_track": career_track.map(|t| t.as_str()),
            }),
            None,
            Some("mentorships"),
            Some(&mentorship_id.to_string()),
            now,
        )?;

        let press = academic_gossip(&GossipContext {
            scholar: player.display_name.clone(),
            quote: format!("I shall guide {} towards greater achievements.", scholar.name),
            trigger: format!("Mentorship of {}", scholar.name),
        });
        let base_body = press.body.clone();
        let press = self.enhance_press(
            press,
            &base_body,
            Some(&player.display_name),
            None,
            json!({
                "event_type": "mentorship",
                "player": player.display_name,
                "scholar": scholar.name,
            }),
        )?;
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "mentorship_queued",
            json!({
                "player": player_id,
                "scholar": scholar_id,
                "career_track": career_track.map(|t| t.as_str()),
                "mentorship_id": mentorship_id,
            }),
        ))?;

        let layers = self.multi_press.generate_mentorship_layers(
            &player.display_name,
            &scholar,
            "queued",
            career_track.map(|t| t.as_str()),
        );
        self.apply_multi_press_layers(&layers, &["academic_gossip"], now, "mentorship")?;
        Ok(press)
    }

    /// Reassign a mentored scholar's career track. Changing tracks resets
    /// the tier to the first rung and zeroes accumulated ticks.
    pub fn assign_lab(
        &mut self,
        player_id: &str,
        scholar_id: &str,
        career_track: CareerTrack,
    ) -> Result<PressRelease> {
        self.ensure_not_paused()?;
        let player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        let mut scholar = self
            .store
            .get_scholar(scholar_id)?
            .ok_or_else(|| GameError::not_found("scholar", scholar_id))?;

        let mentorship = self.store.get_active_mentorship(scholar_id)?;
        if !mentorship
            .map(|m| m.player_id == player_id)
            .unwrap_or(false)
        {
            return Err(GameError::invalid(format!(
                "you must be actively mentoring {} to assign their lab",
                scholar.name
            )));
        }

        let old_track = scholar.career.track;
        scholar.career.track = career_track;
        if old_track != career_track {
            scholar.career.tier = career_track.ladder()[0].to_string();
            scholar.career.ticks = 0;
        }
        self.store.save_scholar(&scholar)?;

        let press = academic_gossip(&GossipContext {
            scholar: player.display_name.clone(),
            quote: format!(
                "{} has been assigned to the {} track under my mentorship.",
                scholar.name,
                career_track.as_str()
            ),
            trigger: format!("Lab assignment for {}", scholar.name),
        });
        let base_body = press.body.clone();
        let press = self.enhance_press(
            press,
            &base_body,
            Some(&player.display_name),
            None,
            json!({
                "event_type": "mentorship",
                "player": player.display_name,
                "scholar": scholar.name,
                "career_track": career_track.as_str(),
            }),
        )?;
        let now = Utc::now();
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "lab_assigned",
            json!({
                "player": player_id,
                "scholar": scholar_id,
                "career_track": career_track.as_str(),
                "old_track": old_track.as_str(),
            }),
        ))?;
        Ok(press)
    }

    /// Digest step: activate due `mentorship_activation` orders.
    pub(crate) fn resolve_mentorships(&mut self) -> Result<Vec<PressRelease>> {
        let mut releases = Vec::new();
        let now = Utc::now();
        for order in self.store.fetch_due_orders("mentorship_activation", now)? {
            let mentorship_id = order
                .payload
                .get("mentorship_id")
                .and_then(serde_json::Value::as_i64);
            let Some(mentorship_id) = mentorship_id else {
                self.store.update_order_status(
                    order.id,
                    "cancelled",
                    Some(&json!({ "reason": "mentorship_missing" })),
                )?;
                continue;
            };
            let Some(mentorship) = self.store.get_mentorship(mentorship_id)? else {
                self.store.update_order_status(
                    order.id,
                    "cancelled",
                    Some(&json!({ "reason": "mentorship_missing" })),
                )?;
                continue;
            };
            if mentorship.status != "pending" {
                self.store.update_order_status(
                    order.id,
                    "cancelled",
                    Some(&json!({ "reason": "mentorship_unavailable" })),
                )?;
                continue;
            }
            let scholar = self.store.get_scholar(&mentorship.scholar_id)?;
            let player = self.store.get_player(&mentorship.player_id)?;
            let (Some(mut scholar), Some(player)) = (scholar, player) else {
                self.store.update_order_status(
                    order.id,
                    "cancelled",
                    Some(&json!({ "reason": "mentorship_unavailable" })),
                )?;
                continue;
            };
            if self
                .store
                .get_active_mentorship(&mentorship.scholar_id)?
                .is_some()
            {
                self.store.update_order_status(
                    order.id,
                    "cancelled",
                    Some(&json!({ "reason": "duplicate_activation" })),
                )?;
                continue;
            }

            self.store.activate_mentorship(mentorship_id)?;

            let mut track = scholar.career.track;
            if let Some(requested) = mentorship
                .career_track
                .as_deref()
                .and_then(|t| CareerTrack::parse(t).ok())
            {
                if track != requested {
                    scholar.career.track = requested;
                    scholar.career.tier = requested.ladder()[0].to_string();
                    scholar.career.ticks = 0;
                }
                track = requested;
            }

            record_mentorship_memory(&mut scholar, &player, "activation", track.as_str(), now);
            self.store.save_scholar(&scholar)?;

            let press = academic_gossip(&GossipContext {
                scholar: "The Academy".to_string(),
                quote: format!(
                    "The mentorship between {} and {} has officially commenced.",
                    player.display_name, scholar.name
                ),
                trigger: "Mentorship activation".to_string(),
            });
            let base_body = press.body.clone();
            let press = self.enhance_press(
                press,
                &base_body,
                Some(&player.display_name),
                None,
                json!({
                    "event_type": "mentorship",
                    "mentor": player.display_name,
                    "scholar": scholar.name,
                    "career_track": track.as_str(),
                }),
            )?;
            self.archive_press(&press, now)?;
            releases.push(press);

            self.store.append_event(&Event::new(
                now,
                "mentorship_activated",
                json!({
                    "player": mentorship.player_id,
                    "scholar": mentorship.scholar_id,
                    "mentorship_id": mentorship_id,
                }),
            ))?;
            self.store.update_order_status(
                order.id,
                "completed",
                Some(&json!({ "mentorship_id": mentorship_id })),
            )?;

            let layers = self.multi_press.generate_mentorship_layers(
                &player.display_name,
                &scholar,
                "activation",
                Some(track.as_str()),
            );
            self.apply_multi_press_layers(&layers, &["academic_gossip"], now, "mentorship")?;
        }
        Ok(releases)
    }

    /// Digest step: mentored scholars accrue ticks; every third tick they
    /// climb a tier, and reaching the top completes the mentorship.
    pub(crate) fn progress_careers(&mut self) -> Result<Vec<PressRelease>> {
        let mut releases = Vec::new();
        let now = Utc::now();
        releases.extend(self.resolve_mentorships()?);

        for scholar in self.store.all_scholars()? {
            let Some(mentorship) = self.store.get_active_mentorship(&scholar.id)? else {
                continue;
            };
            let mut scholar = scholar;
            let ladder = scholar.career.track.ladder();
            if !ladder.contains(&scholar.career.tier.as_str()) {
                scholar.career.tier = ladder[0].to_string();
            }
            scholar.career.ticks += 1;
            let idx = ladder
                .iter()
                .position(|tier| *tier == scholar.career.tier)
                .unwrap_or(0);
            if idx < ladder.len() - 1 && scholar.career.ticks >= CAREER_TICKS_REQUIRED {
                scholar.career.tier = ladder[idx + 1].to_string();
                scholar.career.ticks = 0;

                let mentor = self.store.get_player(&mentorship.player_id)?;
                let mentor_name = mentor
                    .as_ref()
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| "their mentor".to_string());
                if let Some(mentor) = &mentor {
                    let track_str = scholar.career.track.as_str().to_string();
                    record_mentorship_memory(
                        &mut scholar,
                        mentor,
                        "progression",
                        track_str.as_str(),
                        now,
                    );
                }

                let press = academic_gossip(&GossipContext {
                    scholar: scholar.name.clone(),
                    quote: format!(
                        "Advanced to {} under the guidance of {mentor_name}.",
                        scholar.career.tier
                    ),
                    trigger: "Career advancement".to_string(),
                });
                self.archive_press(&press, now)?;
                releases.push(press);
                self.store.append_event(&Event::new(
                    now,
                    "career_progression",
                    json!({
                        "scholar": scholar.id,
                        "new_tier": scholar.career.tier,
                        "mentor": mentorship.player_id,
                    }),
                ))?;

                let layers = self.multi_press.generate_mentorship_layers(
                    &mentor_name,
                    &scholar,
                    "progression",
                    Some(scholar.career.track.as_str()),
                );
                let extra = self.apply_multi_press_layers(
                    &layers,
                    &["academic_gossip"],
                    now,
                    "mentorship",
                )?;
                releases.extend(extra);

                // Reaching the final tier completes the mentorship.
                if idx + 1 == ladder.len() - 1 {
                    self.store.complete_mentorship(mentorship.id, now)?;
                    if let Some(mentor) = &mentor {
                        let track_str = scholar.career.track.as_str().to_string();
                        record_mentorship_memory(
                            &mut scholar,
                            mentor,
                            "completion",
                            track_str.as_str(),
                            now,
                        );
                    }
                    let complete_press = academic_gossip(&GossipContext {
                        scholar: mentor_name.clone(),
                        quote: format!(
                            "My mentorship of {} is complete. They have reached the pinnacle of \
                             their field.",
                            scholar.name
                        ),
                        trigger: "Mentorship completed".to_string(),
                    });
                    self.archive_press(&complete_press, now)?;
                    releases.push(complete_press);
                    let layers = self.multi_press.generate_mentorship_layers(
                        &mentor_name,
                        &scholar,
                        "completion",
                        Some(scholar.career.track.as_str()),
                    );
                    let extra = self.apply_multi_press_layers(
                        &layers,
                        &["academic_gossip"],
                        now,
                        "mentorship",
                    )?;
                    releases.extend(extra);
                }
            }
            self.store.save_scholar(&scholar)?;
        }
        Ok(releases)
    }
}

pub(crate) fn record_mentorship_memory(
    scholar: &mut Scholar,
    mentor: &Player,
    event: &str,
    track: &str,
    timestamp: DateTime<Utc>,
) {
    let delta = match event {
        "activation" => 1.0,
        "progression" => 0.5,
        "completion" => 1.5,
        _ => 0.0,
    };
    if delta != 0.0 {
        scholar.memory.adjust_feeling(&mentor.id, delta);
    }
    scholar.memory.record_fact(MemoryFact {
        timestamp,
        kind: "mentorship".to_string(),
        subject: mentor.id.clone(),
        details: [
            ("event".to_string(), json!(event)),
            ("mentor".to_string(), json!(mentor.display_name)),
            ("track".to_string(), json!(track)),
        ]
        .into_iter()
        .collect(),
    });
    scholar.contract.mentorship_history.push(MentorshipNote {
        event: event.to_string(),
        mentor_id: mentor.id.clone(),
        mentor: mentor.display_name.clone(),
        track: track.to_string(),
        timestamp,
    });
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;

    #[test]
    fn test_queue_then_activate_mentorship() {
        let mut svc = service();
        svc.ensure_player("mentor", None).unwrap();
        let press = svc
            .queue_mentorship("mentor", "s.ironquill", Some(CareerTrack::Industry))
            .unwrap();
        assert_eq!(press.press_type, "academic_gossip");

        // Not yet active: the order resolves at the digest.
        assert!(svc
            .store
            .get_active_mentorship("s.ironquill")
            .unwrap()
            .is_none());

        let releases = svc.resolve_mentorships().unwrap();
        assert!(!releases.is_empty());
        let active = svc
            .store
            .get_active_mentorship("s.ironquill")
            .unwrap()
            .unwrap();
        assert_eq!(active.player_id, "mentor");

        // Track change reset the ladder to Industry's first rung.
        let scholar = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        assert_eq!(scholar.career.track, CareerTrack::Industry);
        assert_eq!(scholar.career.tier, "Associate");
        assert_eq!(scholar.memory.feeling("mentor"), 1.0);
        assert_eq!(scholar.contract.mentorship_history.len(), 1);
    }

    #[test]
    fn test_second_mentor_rejected_while_active() {
        let mut svc = service();
        svc.ensure_player("mentor", None).unwrap();
        svc.ensure_player("other", None).unwrap();
        svc.queue_mentorship("mentor", "s.ironquill", None).unwrap();
        svc.resolve_mentorships().unwrap();
        let err = svc
            .queue_mentorship("other", "s.ironquill", None)
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));
    }

    #[test]
    fn test_assign_lab_requires_active_mentor() {
        let mut svc = service();
        svc.ensure_player("mentor", None).unwrap();
        let err = svc
            .assign_lab("mentor", "s.ironquill", CareerTrack::Industry)
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));

        svc.queue_mentorship("mentor", "s.ironquill", None).unwrap();
        svc.resolve_mentorships().unwrap();
        svc.assign_lab("mentor", "s.ironquill", CareerTrack::Industry)
            .unwrap();
        let scholar = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        assert_eq!(scholar.career.track, CareerTrack::Industry);
        assert_eq!(scholar.career.ticks, 0);
    }

    #[test]
    fn test_career_climbs_every_three_ticks_and_completes() {
        let mut svc = service();
        svc.ensure_player("mentor", None).unwrap();
        svc.queue_mentorship("mentor", "s.ironquill", Some(CareerTrack::Academia))
            .unwrap();
        svc.resolve_mentorships().unwrap();

        // Three ticks to Fellow.
        for _ in 0..3 {
            svc.progress_careers().unwrap();
        }
        let scholar = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        assert_eq!(scholar.career.tier, "Fellow");

        // Three more to Professor; the mentorship completes there.
        for _ in 0..3 {
            svc.progress_careers().unwrap();
        }
        let scholar = svc.store.get_scholar("s.ironquill").unwrap().unwrap();
        assert_eq!(scholar.career.tier, "Professor");
        assert!(svc
            .store
            .get_active_mentorship("s.ironquill")
            .unwrap()
            .is_none());
        let events = svc.store.export_events(None).unwrap();
        assert!(events
            .iter()
            .any(|(_, e)| e.action == "career_progression"
                && e.payload["new_tier"] == "Professor"));
        assert!(scholar
            .contract
            .mentorship_history
            .iter()
            .any(|entry| entry.event == "completion"));
    }
}
