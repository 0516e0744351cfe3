//! Player identity resolution
//!
//! Raw extracted names are folded to a canonical key and matched first
//! against `normalized_name`, then against every player's alias set.
//! Only when both miss is a new player created.

use std::collections::BTreeSet;

use chrono::Utc;
use rumor_core::{
    normalize_aliases, normalize_name, normalize_player_name, Player, PlayerLimits, RumorError,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{conversion_err, store_err, to_micros, RumorStore};

pub(crate) const PLAYER_COLUMNS: &str =
    "p.id, p.name, p.normalized_name, p.display_name, p.aliases, p.rumor_count, p.is_current_squad";

/// Result of a merge request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merged {
        player: Player,
        /// Duplicate's links reassigned to the primary
        links_moved: usize,
        /// Duplicate's links dropped because the primary already had that rumor
        links_dropped: usize,
    },
    /// The duplicate no longer exists; nothing to do
    AlreadyMerged { player: Player },
}

impl MergeOutcome {
    pub fn player(&self) -> &Player {
        match self {
            Self::Merged { player, .. } | Self::AlreadyMerged { player } => player,
        }
    }
}

/// Offset of the player columns when they trail other selected columns
pub(crate) fn player_from_row_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Player> {
    let aliases_json: String = row.get(base + 4)?;
    let aliases: BTreeSet<String> = serde_json::from_str(&aliases_json).map_err(|e| {
        conversion_err(
            base + 4,
            Type::Text,
            RumorError::Store(format!("malformed aliases {:?}: {}", aliases_json, e)),
        )
    })?;
    Ok(Player {
        id: row.get(base)?,
        name: row.get(base + 1)?,
        normalized_name: row.get(base + 2)?,
        display_name: row.get(base + 3)?,
        aliases,
        rumor_count: row.get(base + 5)?,
        is_current_squad: row.get(base + 6)?,
    })
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    player_from_row_at(row, 0)
}

fn aliases_json(aliases: &BTreeSet<String>) -> Result<String, RumorError> {
    serde_json::to_string(aliases).map_err(|e| RumorError::Store(e.to_string()))
}

pub(crate) fn load_player(conn: &Connection, id: i64) -> Result<Option<Player>, RumorError> {
    let sql = format!("SELECT {} FROM players p WHERE p.id = ?1", PLAYER_COLUMNS);
    conn.query_row(&sql, params![id], player_from_row)
        .optional()
        .map_err(store_err)
}

pub(crate) fn require_player(conn: &Connection, id: i64) -> Result<Player, RumorError> {
    load_player(conn, id)?.ok_or_else(|| RumorError::not_found("player", id))
}

fn player_by_normalized(conn: &Connection, normalized: &str) -> Result<Option<Player>, RumorError> {
    let sql = format!(
        "SELECT {} FROM players p WHERE p.normalized_name = ?1",
        PLAYER_COLUMNS
    );
    conn.query_row(&sql, params![normalized], player_from_row)
        .optional()
        .map_err(store_err)
}

fn player_by_alias(conn: &Connection, normalized: &str) -> Result<Option<Player>, RumorError> {
    let sql = format!(
        "SELECT {} FROM players p \
         WHERE EXISTS (SELECT 1 FROM json_each(p.aliases) a WHERE a.value = ?1) \
         ORDER BY p.id LIMIT 1",
        PLAYER_COLUMNS
    );
    conn.query_row(&sql, params![normalized], player_from_row)
        .optional()
        .map_err(store_err)
}

/// Find a player by name or alias, creating one when neither matches
pub(crate) fn resolve_player(
    conn: &Connection,
    raw_name: &str,
    limits: &PlayerLimits,
) -> Result<Player, RumorError> {
    let normalized = normalize_player_name(raw_name, limits)?;

    if let Some(player) = player_by_normalized(conn, &normalized)? {
        return Ok(player);
    }
    if let Some(player) = player_by_alias(conn, &normalized)? {
        debug!("Resolved {:?} through alias of player {}", raw_name, player.id);
        return Ok(player);
    }

    conn.execute(
        "INSERT INTO players (name, normalized_name, created_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(normalized_name) DO NOTHING",
        params![raw_name.trim(), normalized, to_micros(Utc::now())],
    )
    .map_err(store_err)?;
    let player = player_by_normalized(conn, &normalized)?
        .ok_or_else(|| RumorError::Store(format!("player {:?} vanished after insert", normalized)))?;
    info!("Created player {} ({})", player.id, player.normalized_name);
    Ok(player)
}

fn list_players(conn: &Connection) -> Result<Vec<Player>, RumorError> {
    let sql = format!(
        "SELECT {} FROM players p ORDER BY p.rumor_count DESC, p.name ASC, p.id ASC",
        PLAYER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql).map_err(store_err)?;
    let rows = stmt.query_map([], player_from_row).map_err(store_err)?;
    let players = rows.collect::<Result<Vec<_>, _>>().map_err(store_err)?;
    Ok(players)
}

fn matches_query(player: &Player, key: &str) -> bool {
    player.normalized_name.contains(key)
        || player
            .display_name
            .as_deref()
            .is_some_and(|d| normalize_name(d).contains(key))
        || player.aliases.iter().any(|a| a.contains(key))
}

impl RumorStore {
    /// `findOrCreate`: resolve a raw extracted name to a stable player
    pub fn find_or_create(&self, raw_name: &str) -> Result<Player, RumorError> {
        self.write(|tx| resolve_player(tx, raw_name, &self.limits))
    }

    pub fn get_player(&self, id: i64) -> Result<Player, RumorError> {
        self.read(|conn| require_player(conn, id))
    }

    /// Exact lookup on the canonical key (input is normalized first)
    pub fn find_by_normalized(&self, name: &str) -> Result<Option<Player>, RumorError> {
        let key = normalize_name(name);
        self.read(|conn| player_by_normalized(conn, &key))
    }

    /// Fold `duplicate_id` into `primary_id` in one transaction.
    ///
    /// Retrying after the duplicate is gone returns `AlreadyMerged`.
    pub fn merge_players(
        &self,
        primary_id: i64,
        duplicate_id: i64,
    ) -> Result<MergeOutcome, RumorError> {
        if primary_id == duplicate_id {
            return Err(RumorError::validation("cannot merge a player into itself"));
        }

        let outcome = self.write(|tx| {
            let primary = require_player(tx, primary_id)?;
            let Some(duplicate) = load_player(tx, duplicate_id)? else {
                return Ok(MergeOutcome::AlreadyMerged { player: primary });
            };

            let total: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM news_players WHERE player_id = ?1",
                    params![duplicate_id],
                    |row| row.get(0),
                )
                .map_err(store_err)?;
            let links_moved = tx
                .execute(
                    "INSERT OR IGNORE INTO news_players (news_id, player_id, role, created_at) \
                     SELECT news_id, ?1, role, created_at FROM news_players WHERE player_id = ?2",
                    params![primary_id, duplicate_id],
                )
                .map_err(store_err)?;
            tx.execute(
                "DELETE FROM news_players WHERE player_id = ?1",
                params![duplicate_id],
            )
            .map_err(store_err)?;

            let mut aliases = primary.aliases.clone();
            aliases.extend(duplicate.aliases.iter().cloned());
            aliases.insert(duplicate.normalized_name.clone());
            aliases.insert(normalize_name(&duplicate.name));
            aliases.remove(&primary.normalized_name);
            aliases.remove("");

            tx.execute(
                "UPDATE players SET aliases = ?2, rumor_count = ?3, \
                 display_name = COALESCE(display_name, ?4), \
                 is_current_squad = ?5 WHERE id = ?1",
                params![
                    primary_id,
                    aliases_json(&aliases)?,
                    primary.rumor_count.saturating_add(duplicate.rumor_count),
                    duplicate.display_name,
                    primary.is_current_squad || duplicate.is_current_squad,
                ],
            )
            .map_err(store_err)?;
            tx.execute("DELETE FROM players WHERE id = ?1", params![duplicate_id])
                .map_err(store_err)?;

            Ok(MergeOutcome::Merged {
                player: require_player(tx, primary_id)?,
                links_moved,
                links_dropped: (total as usize).saturating_sub(links_moved),
            })
        })?;

        match &outcome {
            MergeOutcome::Merged {
                links_moved,
                links_dropped,
                ..
            } => info!(
                "Merged player {} into {} ({} links moved, {} dropped)",
                duplicate_id, primary_id, links_moved, links_dropped
            ),
            MergeOutcome::AlreadyMerged { .. } => debug!(
                "Player {} already merged into {}",
                duplicate_id, primary_id
            ),
        }
        Ok(outcome)
    }

    /// Replace a player's alias set
    pub fn set_aliases(&self, player_id: i64, aliases: &[String]) -> Result<Player, RumorError> {
        self.write(|tx| {
            let player = require_player(tx, player_id)?;
            let aliases = normalize_aliases(aliases, &player.normalized_name, &self.limits)?;
            for alias in &aliases {
                if let Some(owner) = player_by_normalized(tx, alias)? {
                    return Err(RumorError::validation(format!(
                        "alias {:?} is the name of player {}",
                        alias, owner.id
                    )));
                }
            }
            let aliases: BTreeSet<String> = aliases.into_iter().collect();
            tx.execute(
                "UPDATE players SET aliases = ?2 WHERE id = ?1",
                params![player_id, aliases_json(&aliases)?],
            )
            .map_err(store_err)?;
            require_player(tx, player_id)
        })
    }

    /// Set or clear (`None` or blank) the presentation override
    pub fn set_display_name(
        &self,
        player_id: i64,
        display_name: Option<&str>,
    ) -> Result<Player, RumorError> {
        let display_name = display_name.map(str::trim).filter(|d| !d.is_empty());
        if let Some(name) = display_name {
            if name.chars().count() > self.limits.max_display_name_len {
                return Err(RumorError::validation(format!(
                    "display name exceeds {} characters",
                    self.limits.max_display_name_len
                )));
            }
        }
        self.write(|tx| {
            let changed = tx
                .execute(
                    "UPDATE players SET display_name = ?2 WHERE id = ?1",
                    params![player_id, display_name],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(RumorError::not_found("player", player_id));
            }
            require_player(tx, player_id)
        })
    }

    pub fn set_current_squad(&self, player_id: i64, in_squad: bool) -> Result<Player, RumorError> {
        self.write(|tx| {
            let changed = tx
                .execute(
                    "UPDATE players SET is_current_squad = ?2 WHERE id = ?1",
                    params![player_id, in_squad],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(RumorError::not_found("player", player_id));
            }
            require_player(tx, player_id)
        })
    }

    /// Admin autocomplete: folded substring match, most-rumored first
    pub fn search_players(&self, query: &str, limit: usize) -> Result<Vec<Player>, RumorError> {
        if limit == 0 {
            return Err(RumorError::validation("limit must be at least 1"));
        }
        let key = normalize_name(query);
        let players = self.read(list_players)?;
        Ok(players
            .into_iter()
            .filter(|p| key.is_empty() || matches_query(p, &key))
            .take(limit)
            .collect())
    }

    /// Every player, most-rumored first
    pub fn all_players(&self) -> Result<Vec<Player>, RumorError> {
        self.read(list_players)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_rumor, store};
    use rumor_core::PlayerRole;

    #[test]
    fn test_find_or_create_is_idempotent() {
        let store = store();
        let first = store.find_or_create("Isco").unwrap();
        let second = store.find_or_create("isco").unwrap();
        let third = store.find_or_create(" ISCO ").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
        assert_eq!(first.name, "Isco");
        assert_eq!(first.normalized_name, "isco");
        assert_eq!(first.rumor_count, 0);
        assert_eq!(store.all_players().unwrap().len(), 1);
    }

    #[test]
    fn test_diacritics_fold_to_same_player() {
        let store = store();
        let a = store.find_or_create("Chimy Ávila").unwrap();
        let b = store.find_or_create("chimy avila").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, "Chimy Ávila");
    }

    #[test]
    fn test_alias_match_does_not_create_duplicate() {
        let store = store();
        let isco = store.find_or_create("Isco").unwrap();
        store
            .set_aliases(isco.id, &["Francisco Alarcón".to_string()])
            .unwrap();
        let via_alias = store.find_or_create("francisco alarcon").unwrap();
        assert_eq!(via_alias.id, isco.id);
        assert_eq!(store.all_players().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = store().find_or_create("  \"\" ").unwrap_err();
        assert!(matches!(err, RumorError::Validation(_)));
    }

    #[test]
    fn test_merge_sums_counts_and_is_idempotent() {
        let store = store();
        let r1 = store.insert_rumor(&new_rumor(1, 0)).unwrap();
        let r2 = store.insert_rumor(&new_rumor(2, 0)).unwrap();
        let r3 = store.insert_rumor(&new_rumor(3, 0)).unwrap();

        let primary = store.link_player(r1, "Nabil Fekir", PlayerRole::Target).unwrap().player;
        store.link_player(r2, "Nabil Fekir", PlayerRole::Target).unwrap();
        let dup = store.link_player(r2, "Fekir", PlayerRole::Mentioned).unwrap().player;
        store.link_player(r3, "Fekir", PlayerRole::Departing).unwrap();

        let before_primary = store.get_player(primary.id).unwrap().rumor_count;
        let before_dup = store.get_player(dup.id).unwrap().rumor_count;
        assert_eq!((before_primary, before_dup), (2, 2));

        let outcome = store.merge_players(primary.id, dup.id).unwrap();
        match &outcome {
            MergeOutcome::Merged {
                player,
                links_moved,
                links_dropped,
            } => {
                assert_eq!(player.rumor_count, before_primary + before_dup);
                assert_eq!(*links_moved, 1);
                assert_eq!(*links_dropped, 1);
                assert!(player.aliases.contains("fekir"));
                assert!(!player.aliases.contains("nabil fekir"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let again = store.merge_players(primary.id, dup.id).unwrap();
        assert!(matches!(again, MergeOutcome::AlreadyMerged { .. }));
        assert_eq!(again.player().rumor_count, 4);

        assert!(matches!(
            store.get_player(dup.id).unwrap_err(),
            RumorError::NotFound { .. }
        ));
        // The duplicate's spelling now resolves to the primary
        assert_eq!(store.find_or_create("FEKIR").unwrap().id, primary.id);
        let linked: Vec<i64> = store
            .players_for_rumor(r3)
            .unwrap()
            .iter()
            .map(|l| l.player.id)
            .collect();
        assert_eq!(linked, vec![primary.id]);
    }

    #[test]
    fn test_merge_into_self_and_missing_primary() {
        let store = store();
        let p = store.find_or_create("Isco").unwrap();
        assert!(matches!(
            store.merge_players(p.id, p.id).unwrap_err(),
            RumorError::Validation(_)
        ));
        assert!(matches!(
            store.merge_players(999, p.id).unwrap_err(),
            RumorError::NotFound { .. }
        ));
        // Failed merge left the player in place
        assert!(store.get_player(p.id).is_ok());
    }

    #[test]
    fn test_set_aliases_validation() {
        let store = store();
        let isco = store.find_or_create("Isco").unwrap();
        let fekir = store.find_or_create("Fekir").unwrap();

        let too_many: Vec<String> = (0..21).map(|i| format!("alias {}", i)).collect();
        assert!(matches!(
            store.set_aliases(isco.id, &too_many).unwrap_err(),
            RumorError::Validation(_)
        ));
        assert!(matches!(
            store.set_aliases(isco.id, &["x".repeat(61)]).unwrap_err(),
            RumorError::Validation(_)
        ));
        assert!(matches!(
            store.set_aliases(isco.id, &["FEKIR".to_string()]).unwrap_err(),
            RumorError::Validation(_)
        ));

        // Own name is silently dropped, spellings are folded
        let updated = store
            .set_aliases(isco.id, &["ISCO".to_string(), "Isco Alarcón".to_string()])
            .unwrap();
        assert_eq!(
            updated.aliases.iter().cloned().collect::<Vec<_>>(),
            vec!["isco alarcon".to_string()]
        );
        assert!(matches!(
            store.set_aliases(404, &[]).unwrap_err(),
            RumorError::NotFound { .. }
        ));
        assert!(store.get_player(fekir.id).unwrap().aliases.is_empty());
    }

    #[test]
    fn test_display_name_and_squad_flag() {
        let store = store();
        let p = store.find_or_create("isco alarcon").unwrap();
        let p = store.set_display_name(p.id, Some("  Isco ")).unwrap();
        assert_eq!(p.presentation_name(), "Isco");
        let p = store.set_display_name(p.id, Some("   ")).unwrap();
        assert_eq!(p.display_name, None);
        assert!(store.set_display_name(p.id, Some("x".repeat(81).as_str())).is_err());

        let p = store.set_current_squad(p.id, true).unwrap();
        assert!(p.is_current_squad);
        assert!(matches!(
            store.set_current_squad(404, true).unwrap_err(),
            RumorError::NotFound { .. }
        ));
    }

    #[test]
    fn test_search_ranks_by_rumor_count() {
        let store = store();
        let r1 = store.insert_rumor(&new_rumor(1, 0)).unwrap();
        let r2 = store.insert_rumor(&new_rumor(2, 0)).unwrap();
        store.link_player(r1, "Isco", PlayerRole::Target).unwrap();
        store.link_player(r1, "Iscariot", PlayerRole::Mentioned).unwrap();
        store.link_player(r2, "Iscariot", PlayerRole::Mentioned).unwrap();
        store.find_or_create("Fekir").unwrap();

        let names: Vec<String> = store
            .search_players("ÍSC", 10)
            .unwrap()
            .into_iter()
            .map(|p| p.normalized_name)
            .collect();
        assert_eq!(names, vec!["iscariot".to_string(), "isco".to_string()]);
        assert_eq!(store.search_players("isc", 1).unwrap().len(), 1);
        assert_eq!(store.search_players("", 10).unwrap().len(), 3);
        assert!(store.search_players("isc", 0).is_err());
    }
}
