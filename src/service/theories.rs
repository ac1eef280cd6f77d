//! Theory submission and table talk.

use chrono::Utc;
use serde_json::json;

use crate::error::{GameError, Result};
use crate::models::{ConfidenceLevel, Event, PressRelease, TheoryRecord};
use crate::press::{academic_bulletin, BulletinContext};

use super::GameService;

impl GameService {
    /// Submit a theory to the public record. The bulletin number is the
    /// event count plus one, so bulletins stay in step with the log.
    pub fn submit_theory(
        &mut self,
        player_id: &str,
        theory: &str,
        confidence: ConfidenceLevel,
        supporters: &[String],
        deadline: &str,
    ) -> Result<PressRelease> {
        self.ensure_not_paused()?;
        if theory.trim().is_empty() {
            return Err(GameError::invalid("theory text cannot be empty"));
        }
        self.ensure_player(player_id, None)?;
        let player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;
        self.require_reputation(&player, "theory")?;

        let ctx = BulletinContext {
            bulletin_number: self.store.event_count()? + 1,
            player: player_id.to_string(),
            theory: theory.to_string(),
            confidence: confidence.as_str().to_string(),
            supporters: supporters.to_vec(),
            deadline: deadline.to_string(),
        };
        let mut press = academic_bulletin(&ctx);
        press.set_meta(
            "submission",
            json!({
                "player_id": player_id,
                "display_name": player.display_name,
                "theory": theory,
                "confidence": confidence.as_str(),
                "supporters": supporters,
                "deadline": deadline,
            }),
        );
        let base_body = press.body.clone();
        let press = self.enhance_press(
            press,
            &base_body,
            Some(&player.display_name),
            None,
            json!({
                "event_type": "theory",
                "player": player.display_name,
                "action": format!(
                    "submitted '{theory}' with {} confidence; counter-claims invited before {deadline}",
                    confidence.as_str()
                ),
                "theory": theory,
                "confidence": confidence.as_str(),
                "deadline": deadline,
            }),
        )?;

        let now = Utc::now();
        self.store.record_theory(&TheoryRecord {
            timestamp: now,
            player_id: player_id.to_string(),
            theory: theory.to_string(),
            confidence,
            supporters: supporters.to_vec(),
            deadline: deadline.to_string(),
        })?;
        self.store.append_event(&Event::new(
            now,
            "submit_theory",
            json!({
                "player": player_id,
                "theory": theory,
                "confidence": confidence.as_str(),
                "supporters": supporters,
                "deadline": deadline,
            }),
        ))?;
        self.archive_press(&press, now)?;
        Ok(press)
    }

    /// Publish a table-talk message and fan out common-room chatter.
    pub fn post_table_talk(
        &mut self,
        player_id: &str,
        display_name: &str,
        message: &str,
    ) -> Result<PressRelease> {
        self.ensure_not_paused()?;
        if message.trim().is_empty() {
            return Err(GameError::invalid("table talk message cannot be empty"));
        }
        self.ensure_player(player_id, Some(display_name))?;
        let player = self
            .store
            .get_player(player_id)?
            .ok_or_else(|| GameError::not_found("player", player_id))?;

        let now = Utc::now();
        let press = PressRelease::new(
            "table_talk",
            format!("Table Talk — {}", player.display_name),
            format!("{}: {message}", player.display_name),
        )
        .with_metadata(json!({
            "table_talk": {
                "player_id": player_id,
                "display_name": player.display_name,
                "message": message,
                "posted_at": now.to_rfc3339(),
            }
        }));
        let base_body = press.body.clone();
        let press = self.enhance_press(
            press,
            &base_body,
            Some(&player.display_name),
            None,
            json!({
                "event_type": "table_talk",
                "player": player.display_name,
                "message": message,
            }),
        )?;
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "table_talk_post",
            json!({
                "player": player_id,
                "display_name": player.display_name,
                "message": message,
            }),
        ))?;

        let scholars = self.store.all_scholars()?;
        let layers = self.multi_press.generate_table_talk_layers(
            &player.display_name,
            message,
            &scholars,
            &mut self.rng,
        );
        self.apply_multi_press_layers(&layers, &["table_talk"], now, "table_talk")?;
        Ok(press)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;

    #[test]
    fn test_submit_theory_numbers_bulletins_from_event_log() {
        let mut svc = service();
        // Construction may log roster fills; the bulletin number tracks the
        // event count at submission time.
        let events_before = svc.store.event_count().unwrap();
        let press = svc
            .submit_theory("alice", "T", ConfidenceLevel::Certain, &[], "2030-12-31")
            .unwrap();
        assert_eq!(press.press_type, "academic_bulletin");
        assert_eq!(
            press.headline,
            format!("Academic Bulletin No. {}", events_before + 1)
        );

        let events = svc.store.export_events(None).unwrap();
        let last = &events.last().unwrap().1;
        assert_eq!(last.action, "submit_theory");
        assert_eq!(last.payload["theory"], "T");

        let theories = svc.store.list_theories(None).unwrap();
        assert_eq!(theories.len(), 1);
        assert_eq!(theories[0].1.deadline, "2030-12-31");
    }

    #[test]
    fn test_submit_theory_rejects_empty_text() {
        let mut svc = service();
        let err = svc
            .submit_theory("alice", "  ", ConfidenceLevel::Suspect, &[], "soon")
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidInput(_)));
    }

    #[test]
    fn test_table_talk_archives_and_schedules_chatter() {
        let mut svc = service();
        let press = svc
            .post_table_talk("alice", "Alice", "The delta maps are wrong")
            .unwrap();
        assert_eq!(press.press_type, "table_talk");
        assert!(press.body.contains("delta maps"));
        // The roundup layer is always delayed.
        assert!(svc.store.count_queued_press().unwrap() >= 1);
        let events = svc.store.export_events(None).unwrap();
        assert!(events.iter().any(|(_, e)| e.action == "table_talk_post"));
    }
}
