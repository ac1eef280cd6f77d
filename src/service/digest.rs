//! The digest tick: the scheduled heartbeat that releases press, advances
//! the timeline, decays cooldowns, and drains every due queue.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{Event, PressRelease};

use super::{GameService, PAUSE_ALLOWED_TYPES};

impl GameService {
    /// Release queued press due as of `now`. While paused, only the
    /// allow-listed types leave the queue.
    pub fn release_scheduled_press(
        &mut self,
        now: Option<DateTime<Utc>>,
    ) -> Result<Vec<PressRelease>> {
        let now = now.unwrap_or_else(Utc::now);
        let due = self.store.due_queued_press(now)?;
        let mut releases = Vec::new();
        for row in due {
            if self.is_paused() && !PAUSE_ALLOWED_TYPES.contains(&row.release.press_type.as_str())
            {
                continue;
            }
            let mut release = row.release;
            release.merge_meta_map(
                "scheduled",
                json!({ "release_at": row.release_at.to_rfc3339() }),
            );
            self.archive_press(&release, now)?;
            self.store.clear_queued_press(row.id)?;
            self.store.append_event(&Event::new(
                now,
                "scheduled_press_released",
                json!({
                    "headline": release.headline,
                    "release_at": row.release_at.to_rfc3339(),
                }),
            ))?;
            releases.push(release);
        }
        Ok(releases)
    }

    pub fn pending_press_count(&self) -> Result<i64> {
        self.store.count_queued_press()
    }

    /// Scheduled press due inside the horizon, soonest first.
    pub fn upcoming_press(&self, limit: usize, within_hours: i64) -> Result<Vec<Value>> {
        let now = Utc::now();
        let horizon = now + Duration::hours(within_hours);
        let mut upcoming = Vec::new();
        for row in self.store.list_queued_press()? {
            if row.release_at > horizon {
                continue;
            }
            upcoming.push(json!({
                "headline": row.release.headline,
                "type": row.release.press_type,
                "release_at": row.release_at.to_rfc3339(),
                "metadata": row.release.metadata,
            }));
        }
        upcoming.truncate(limit);
        Ok(upcoming)
    }

    /// Summarise upcoming scheduled press into a single highlights
    /// release. Returns `None` when nothing is due inside the horizon.
    pub fn create_digest_highlights(
        &mut self,
        now: Option<DateTime<Utc>>,
        limit: usize,
        within_hours: i64,
    ) -> Result<Option<PressRelease>> {
        let now = now.unwrap_or_else(Utc::now);
        let horizon = now + Duration::hours(within_hours);
        let mut items: Vec<_> = self
            .store
            .list_queued_press()?
            .into_iter()
            .filter(|row| row.release_at <= horizon)
            .collect();
        if items.is_empty() {
            return Ok(None);
        }
        items.sort_by_key(|row| row.release_at);
        items.truncate(limit);

        let tone_seed =
            crate::catalogs::tone_seed("digest_highlight", self.multi_press.setting());
        let headline = tone_seed
            .as_ref()
            .and_then(|seed| seed.get("headline"))
            .map(|template| template.replace("{count}", &items.len().to_string()))
            .unwrap_or_else(|| format!("Upcoming Highlights ({})", items.len()));

        let mut lines = Vec::new();
        let mut metadata_items = Vec::new();
        for item in &items {
            let delta_minutes = ((item.release_at - now).num_seconds() / 60).max(0);
            let relative = if delta_minutes >= 60 {
                format!("{}h {}m", delta_minutes / 60, delta_minutes % 60)
            } else {
                format!("{delta_minutes}m")
            };
            lines.push(format!(
                "- {} — {} (in {relative})",
                item.release.headline,
                item.release_at.format("%Y-%m-%d %H:%M UTC")
            ));
            metadata_items.push(json!({
                "headline": item.release.headline,
                "type": item.release.press_type,
                "release_at": item.release_at.to_rfc3339(),
                "relative_minutes": delta_minutes,
            }));
        }
        if let Some(callout) = tone_seed.as_ref().and_then(|seed| seed.get("callout")) {
            lines.push(callout.clone());
        }

        let mut press = PressRelease::new("digest_highlights", headline, lines.join("\n"))
            .with_metadata(json!({
                "digest_highlights": {
                    "generated_at": now.to_rfc3339(),
                    "horizon_hours": within_hours,
                    "items": metadata_items,
                }
            }));
        if let Some(seed) = &tone_seed {
            press.merge_meta_map("tone_seed", json!(seed));
        }
        let base_body = press.body.clone();
        let press = self.enhance_press(
            press,
            &base_body,
            None,
            None,
            json!({
                "event_type": "digest_highlight",
                "item_count": items.len(),
            }),
        )?;
        self.archive_press(&press, now)?;
        self.store.append_event(&Event::new(
            now,
            "digest_highlights_generated",
            json!({ "headline": press.headline, "item_count": items.len() }),
        ))?;
        Ok(Some(press))
    }

    /// One beat of the Gazette: the full digest sequence from spec order.
    pub fn advance_digest(&mut self) -> Result<Vec<PressRelease>> {
        self.ensure_not_paused()?;
        let mut releases = Vec::new();
        let now = Utc::now();

        let expired = self.store.expire_symposium_proposals(now)?;
        if !expired.is_empty() {
            self.push_admin_notification(format!(
                "Expired {} symposium proposal(s) during digest.",
                expired.len()
            ));
        }

        releases.extend(self.release_scheduled_press(Some(now))?);

        let (years_elapsed, current_year) = self
            .store
            .advance_timeline(now, self.settings.time_scale_days_per_year)?;
        if years_elapsed > 0 {
            let press = PressRelease::new(
                "timeline_update",
                format!("The year turns to {current_year}"),
                format!(
                    "The Gazette notes the turning of the year. {years_elapsed} year(s) slip \
                     into history and the calendar now reads {current_year}."
                ),
            )
            .with_metadata(json!({
                "current_year": current_year,
                "years_elapsed": years_elapsed,
            }));
            self.archive_press(&press, now)?;
            self.store.append_event(&Event::new(
                now,
                "timeline_advanced",
                json!({
                    "current_year": current_year,
                    "years_elapsed": years_elapsed,
                }),
            ))?;
            releases.push(press);
        }

        for mut player in self.store.all_players()? {
            player.tick_cooldowns();
            self.store.upsert_player(&player)?;
        }
        self.ensure_roster()?;
        releases.extend(self.progress_careers()?);
        releases.extend(self.resolve_followups()?);
        releases.extend(self.process_symposium_reminders()?);
        self.apply_contract_upkeep(now)?;
        releases.extend(self.apply_seasonal_commitments(now)?);
        releases.extend(self.advance_faction_projects(now)?);
        releases.extend(self.resolve_conferences()?);
        releases.extend(self.release_scheduled_press(None)?);
        Ok(releases)
    }

    pub fn current_year(&self) -> Result<i64> {
        self.store.current_year()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fresh_digest_is_quiet() {
        let mut svc = service();
        let releases = svc.advance_digest().unwrap();
        // At most a timeline_update can appear on a fresh state.
        assert!(releases
            .iter()
            .all(|r| r.press_type == "timeline_update"));
    }

    #[test]
    fn test_digest_decrements_cooldowns() {
        let mut svc = service();
        svc.ensure_player("bob", None).unwrap();
        let mut bob = svc.store.get_player("bob").unwrap().unwrap();
        bob.cooldowns.insert("recruitment".to_string(), 2);
        svc.store.upsert_player(&bob).unwrap();

        svc.advance_digest().unwrap();
        let bob = svc.store.get_player("bob").unwrap().unwrap();
        assert_eq!(bob.cooldowns.get("recruitment"), Some(&1));
        svc.advance_digest().unwrap();
        let bob = svc.store.get_player("bob").unwrap().unwrap();
        assert!(bob.cooldowns.is_empty());
    }

    #[test]
    fn test_digest_advances_timeline_with_remainder() {
        let mut svc = service();
        svc.store_mut().backdate_timeline(800).unwrap();
        let releases = svc.advance_digest().unwrap();
        let timeline = releases
            .iter()
            .find(|r| r.press_type == "timeline_update")
            .expect("timeline press emitted");
        assert_eq!(timeline.metadata["years_elapsed"], 2);
        assert_eq!(svc.current_year().unwrap(), 1925);

        let events = svc.store.export_events(None).unwrap();
        let advanced = events
            .iter()
            .find(|(_, e)| e.action == "timeline_advanced")
            .unwrap();
        assert_eq!(advanced.1.payload["years_elapsed"], 2);

        // 800 - 730 leaves 70 days toward the next year; no second advance.
        let releases = svc.advance_digest().unwrap();
        assert!(releases.iter().all(|r| r.press_type != "timeline_update"));
    }

    #[test]
    fn test_release_scheduled_press_is_idempotent() {
        let mut svc = service();
        let now = Utc::now();
        let release = PressRelease::new("academic_gossip", "Later", "Body");
        svc.store
            .enqueue_press(&release, now + Duration::minutes(5), now)
            .unwrap();

        assert!(svc.release_scheduled_press(Some(now)).unwrap().is_empty());
        let first = svc
            .release_scheduled_press(Some(now + Duration::minutes(10)))
            .unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].metadata["scheduled"]["release_at"].is_string());
        let second = svc
            .release_scheduled_press(Some(now + Duration::minutes(10)))
            .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_digest_highlights_summarise_queue() {
        let mut svc = service();
        let now = Utc::now();
        let release = PressRelease::new("academic_gossip", "Soon", "Body");
        svc.store
            .enqueue_press(&release, now + Duration::hours(2), now)
            .unwrap();

        let highlights = svc
            .create_digest_highlights(Some(now), 5, 24)
            .unwrap()
            .unwrap();
        assert_eq!(highlights.press_type, "digest_highlights");
        assert!(highlights.body.contains("Soon"));
        assert_eq!(
            highlights.metadata["digest_highlights"]["items"]
                .as_array()
                .unwrap()
                .len(),
            1
        );

        // Nothing inside the horizon yields no highlight.
        let mut svc = service();
        assert!(svc
            .create_digest_highlights(Some(now), 5, 24)
            .unwrap()
            .is_none());
    }
}
