//! Rumor/player links and the mention series derived from them

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rumor_core::{DailyMention, LinkedPlayer, Player, PlayerRole, RumorError};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::players::{player_from_row_at, require_player, resolve_player, PLAYER_COLUMNS};
use crate::rumors::load_rumor;
use crate::{conversion_err, from_micros, store_err, to_micros, RumorStore};

/// A player with the sparse daily series of visible rumors mentioning them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMentions {
    pub player: Player,
    /// Ascending by date, one entry per day with at least one mention
    pub mentions: Vec<DailyMention>,
}

fn linked_player_from_row(row: &Row<'_>) -> rusqlite::Result<LinkedPlayer> {
    let role: String = row.get(1)?;
    let role = role
        .parse::<PlayerRole>()
        .map_err(|e| conversion_err(1, Type::Text, e))?;
    Ok(LinkedPlayer {
        news_id: row.get(0)?,
        role,
        player: player_from_row_at(row, 2)?,
    })
}

fn is_linked(conn: &Connection, news_id: i64, player_id: i64) -> Result<bool, RumorError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM news_players WHERE news_id = ?1 AND player_id = ?2)",
        params![news_id, player_id],
        |row| row.get(0),
    )
    .map_err(store_err)
}

/// Per-player day buckets over visible rumors published at or after `since`
fn collect_mentions(
    conn: &Connection,
    player_id: Option<i64>,
    since: Option<DateTime<Utc>>,
) -> Result<BTreeMap<i64, BTreeMap<NaiveDate, u32>>, RumorError> {
    let mut stmt = conn
        .prepare(
            "SELECT np.player_id, n.pub_date FROM news_players np \
             JOIN betis_news n ON n.id = np.news_id \
             WHERE n.is_duplicate = 0 AND n.is_hidden = 0 AND n.pub_date >= ?1 \
               AND (?2 IS NULL OR np.player_id = ?2)",
        )
        .map_err(store_err)?;
    let since = since.map(to_micros).unwrap_or(i64::MIN);
    let rows = stmt
        .query_map(params![since, player_id], |row| {
            Ok((row.get::<_, i64>(0)?, from_micros(1, row.get(1)?)?))
        })
        .map_err(store_err)?;

    let mut buckets: BTreeMap<i64, BTreeMap<NaiveDate, u32>> = BTreeMap::new();
    for row in rows {
        let (player_id, pub_date) = row.map_err(store_err)?;
        *buckets
            .entry(player_id)
            .or_default()
            .entry(pub_date.date_naive())
            .or_default() += 1;
    }
    Ok(buckets)
}

fn to_daily(days: BTreeMap<NaiveDate, u32>) -> Vec<DailyMention> {
    days.into_iter()
        .map(|(date, count)| DailyMention::new(date, count))
        .collect()
}

impl RumorStore {
    /// Resolve `player_name` and link it to the rumor
    pub fn link_player(
        &self,
        news_id: i64,
        player_name: &str,
        role: PlayerRole,
    ) -> Result<LinkedPlayer, RumorError> {
        let linked = self.write(|tx| {
            let rumor = load_rumor(tx, news_id)?;
            if rumor.is_hidden {
                return Err(RumorError::validation(format!(
                    "rumor {} is hidden; unhide and re-analyze before linking players",
                    news_id
                )));
            }
            let player = resolve_player(tx, player_name, &self.limits)?;
            if is_linked(tx, news_id, player.id)? {
                return Err(RumorError::DuplicateLink {
                    news_id,
                    player_id: player.id,
                });
            }
            tx.execute(
                "INSERT INTO news_players (news_id, player_id, role, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![news_id, player.id, role.as_str(), to_micros(Utc::now())],
            )
            .map_err(store_err)?;
            tx.execute(
                "UPDATE players SET rumor_count = rumor_count + 1 WHERE id = ?1",
                params![player.id],
            )
            .map_err(store_err)?;
            Ok(LinkedPlayer {
                news_id,
                role,
                player: require_player(tx, player.id)?,
            })
        })?;
        debug!(
            "Linked player {} to rumor {} as {}",
            linked.player.id, news_id, role
        );
        Ok(linked)
    }

    pub fn unlink_player(&self, news_id: i64, player_id: i64) -> Result<(), RumorError> {
        self.write(|tx| {
            let removed = tx
                .execute(
                    "DELETE FROM news_players WHERE news_id = ?1 AND player_id = ?2",
                    params![news_id, player_id],
                )
                .map_err(store_err)?;
            if removed == 0 {
                return Err(RumorError::not_found(
                    "link",
                    format!("rumor {} / player {}", news_id, player_id),
                ));
            }
            tx.execute(
                "UPDATE players SET rumor_count = MAX(rumor_count - 1, 0) WHERE id = ?1",
                params![player_id],
            )
            .map_err(store_err)?;
            Ok(())
        })?;
        info!("Unlinked player {} from rumor {}", player_id, news_id);
        Ok(())
    }

    /// Typed join rows for every player linked to a rumor
    pub fn players_for_rumor(&self, news_id: i64) -> Result<Vec<LinkedPlayer>, RumorError> {
        let sql = format!(
            "SELECT np.news_id, np.role, {} FROM news_players np \
             JOIN players p ON p.id = np.player_id \
             WHERE np.news_id = ?1 ORDER BY np.created_at, p.id",
            PLAYER_COLUMNS
        );
        self.read(|conn| {
            let mut stmt = conn.prepare(&sql).map_err(store_err)?;
            let rows = stmt
                .query_map(params![news_id], linked_player_from_row)
                .map_err(store_err)?;
            let linked = rows.collect::<Result<Vec<_>, _>>().map_err(store_err)?;
            Ok(linked)
        })
    }

    /// Sparse daily mention series for every player with a visible mention
    pub fn mention_timelines(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlayerMentions>, RumorError> {
        self.read(|conn| {
            let buckets = collect_mentions(conn, None, since)?;
            let mut out = Vec::with_capacity(buckets.len());
            for (player_id, days) in buckets {
                out.push(PlayerMentions {
                    player: require_player(conn, player_id)?,
                    mentions: to_daily(days),
                });
            }
            Ok(out)
        })
    }

    /// Mention series for one player; empty when they have no visible mentions
    pub fn player_mentions(
        &self,
        player_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<PlayerMentions, RumorError> {
        self.read(|conn| {
            let player = require_player(conn, player_id)?;
            let mut buckets = collect_mentions(conn, Some(player_id), since)?;
            let days = buckets.remove(&player_id).unwrap_or_default();
            Ok(PlayerMentions {
                player,
                mentions: to_daily(days),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{base_time, new_rumor, store};
    use chrono::Duration;
    use rumor_core::NewRumor;

    fn rumor_at(n: i64, at: DateTime<Utc>) -> NewRumor {
        NewRumor {
            pub_date: at,
            ..new_rumor(n, 0)
        }
    }

    #[test]
    fn test_link_increments_count_and_rejects_duplicates() {
        let store = store();
        let id = store.insert_rumor(&new_rumor(1, 0)).unwrap();
        let linked = store.link_player(id, "Isco", PlayerRole::Target).unwrap();
        assert_eq!(linked.player.rumor_count, 1);
        assert_eq!(linked.role, PlayerRole::Target);

        let err = store.link_player(id, " isco ", PlayerRole::Mentioned).unwrap_err();
        assert!(matches!(
            err,
            RumorError::DuplicateLink { news_id, player_id } if news_id == id && player_id == linked.player.id
        ));
        assert_eq!(store.get_player(linked.player.id).unwrap().rumor_count, 1);

        let rows = store.players_for_rumor(id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, PlayerRole::Target);
        assert_eq!(rows[0].player.name, "Isco");
    }

    #[test]
    fn test_link_requires_visible_rumor() {
        let store = store();
        assert!(matches!(
            store.link_player(9, "Isco", PlayerRole::Target).unwrap_err(),
            RumorError::NotFound { .. }
        ));

        let id = store.insert_rumor(&new_rumor(1, 0)).unwrap();
        store.set_hidden(id, true, None, "mod").unwrap();
        assert!(matches!(
            store.link_player(id, "Isco", PlayerRole::Target).unwrap_err(),
            RumorError::Validation(_)
        ));
        // The rolled back link did not leave a player behind
        assert!(store.all_players().unwrap().is_empty());
    }

    #[test]
    fn test_unlink_decrements_and_reports_missing_link() {
        let store = store();
        let id = store.insert_rumor(&new_rumor(1, 0)).unwrap();
        let player = store.link_player(id, "Fekir", PlayerRole::Departing).unwrap().player;

        store.unlink_player(id, player.id).unwrap();
        assert_eq!(store.get_player(player.id).unwrap().rumor_count, 0);
        assert!(store.players_for_rumor(id).unwrap().is_empty());

        let err = store.unlink_player(id, player.id).unwrap_err();
        assert!(matches!(err, RumorError::NotFound { entity: "link", .. }));
        assert_eq!(store.get_player(player.id).unwrap().rumor_count, 0);
    }

    #[test]
    fn test_mention_timelines_group_by_day_over_visible_rumors() {
        let store = store();
        let day = base_time();
        let a = store.insert_rumor(&rumor_at(1, day)).unwrap();
        let b = store.insert_rumor(&rumor_at(2, day - Duration::hours(3))).unwrap();
        let c = store.insert_rumor(&rumor_at(3, day - Duration::days(2))).unwrap();
        let hidden = store.insert_rumor(&rumor_at(4, day)).unwrap();
        let dup = store.insert_rumor(&rumor_at(5, day)).unwrap();

        for id in [a, b, c, hidden, dup] {
            store.link_player(id, "Isco", PlayerRole::Target).unwrap();
        }
        store.link_player(c, "Fekir", PlayerRole::Mentioned).unwrap();
        store.set_hidden(hidden, true, None, "mod").unwrap();
        store.mark_duplicate(dup, true).unwrap();

        let timelines = store.mention_timelines(None).unwrap();
        assert_eq!(timelines.len(), 2);
        let isco = timelines
            .iter()
            .find(|t| t.player.normalized_name == "isco")
            .unwrap();
        assert_eq!(
            isco.mentions,
            vec![
                DailyMention::new((day - Duration::days(2)).date_naive(), 1),
                DailyMention::new(day.date_naive(), 2),
            ]
        );

        let recent = store
            .mention_timelines(Some(day - Duration::days(1)))
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].player.normalized_name, "isco");

        let fekir = store.player_mentions(timelines[1].player.id, None).unwrap();
        assert_eq!(fekir.mentions.len(), 1);
    }

    #[test]
    fn test_player_mentions_for_unlinked_player() {
        let store = store();
        let player = store.find_or_create("Isco").unwrap();
        let mentions = store.player_mentions(player.id, None).unwrap();
        assert!(mentions.mentions.is_empty());
        assert!(matches!(
            store.player_mentions(404, None).unwrap_err(),
            RumorError::NotFound { .. }
        ));
    }
}
