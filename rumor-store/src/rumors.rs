//! Rumor rows: ingestion hand-off, feed paging and moderation state

use chrono::{DateTime, Utc};
use rumor_core::{
    coerce_probability_number, normalize_name, parse_probability_text, validate_probability,
    NewRumor, Rumor, RumorError,
};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{conversion_err, from_micros, opt_from_micros, store_err, to_micros};
use crate::{FeedCursor, FeedPage, RumorStore};

pub(crate) const RUMOR_COLUMNS: &str = "n.id, n.title, n.link, n.pub_date, n.source, \
     n.description, n.ai_probability, n.ai_analysis, n.ai_analyzed_at, n.is_duplicate, \
     n.is_hidden, n.hidden_at, n.hidden_by, n.hidden_reason, n.admin_context, \
     n.needs_reassessment, n.reassessed_at, n.reassessed_by";

/// Result of one credibility analysis, ready to persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub probability: u8,
    pub analysis: String,
    pub analyzed_at: DateTime<Utc>,
    /// Moderator hint the analysis ran with; `None` keeps the stored one
    pub admin_context: Option<String>,
    /// Set for moderator-triggered reassessments; stamps `reassessed_at/by`
    pub reassessed_by: Option<String>,
}

pub(crate) fn rumor_from_row(row: &Row<'_>) -> rusqlite::Result<Rumor> {
    Ok(Rumor {
        id: row.get(0)?,
        title: row.get(1)?,
        link: row.get(2)?,
        pub_date: from_micros(3, row.get(3)?)?,
        source: row.get(4)?,
        description: row.get(5)?,
        ai_probability: probability_from_sql(6, row.get_ref(6)?)?,
        ai_analysis: row.get(7)?,
        ai_analyzed_at: opt_from_micros(8, row.get(8)?)?,
        is_duplicate: row.get(9)?,
        is_hidden: row.get(10)?,
        hidden_at: opt_from_micros(11, row.get(11)?)?,
        hidden_by: row.get(12)?,
        hidden_reason: row.get(13)?,
        admin_context: row.get(14)?,
        needs_reassessment: row.get(15)?,
        reassessed_at: opt_from_micros(16, row.get(16)?)?,
        reassessed_by: row.get(17)?,
    })
}

/// `ai_probability` may come back as integer, real or text
fn probability_from_sql(idx: usize, value: ValueRef<'_>) -> rusqlite::Result<Option<u8>> {
    let coerced = match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => validate_probability(i).map(Some),
        ValueRef::Real(f) => coerce_probability_number(f).map(Some),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => parse_probability_text(text),
            Err(_) => Err(RumorError::validation("probability text is not UTF-8")),
        },
        ValueRef::Blob(_) => Err(RumorError::validation("probability stored as a blob")),
    };
    coerced.map_err(|e| conversion_err(idx, value.data_type(), e))
}

pub(crate) fn query_rumors<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Rumor>, RumorError> {
    let mut stmt = conn.prepare(sql).map_err(store_err)?;
    let rows = stmt.query_map(params, rumor_from_row).map_err(store_err)?;
    let rumors = rows.collect::<Result<Vec<_>, _>>().map_err(store_err)?;
    Ok(rumors)
}

pub(crate) fn load_rumor(conn: &Connection, id: i64) -> Result<Rumor, RumorError> {
    let sql = format!("SELECT {} FROM betis_news n WHERE n.id = ?1", RUMOR_COLUMNS);
    conn.query_row(&sql, params![id], rumor_from_row)
        .optional()
        .map_err(store_err)?
        .ok_or_else(|| RumorError::not_found("rumor", id))
}

fn fetch_page(
    conn: &Connection,
    cursor: Option<FeedCursor>,
    limit: usize,
) -> Result<FeedPage, RumorError> {
    if limit == 0 {
        return Err(RumorError::validation("limit must be at least 1"));
    }
    let probe = i64::try_from(limit).unwrap_or(i64::MAX).saturating_add(1);
    let rumors = match cursor {
        None => {
            let sql = format!(
                "SELECT {} FROM betis_news n \
                 WHERE n.is_duplicate = 0 AND n.is_hidden = 0 \
                 ORDER BY n.pub_date DESC, n.id DESC LIMIT ?1",
                RUMOR_COLUMNS
            );
            query_rumors(conn, &sql, params![probe])?
        }
        Some(cursor) => {
            // A bare timestamp cursor is a strict less-than; i64::MIN never matches the tie-break
            let sql = format!(
                "SELECT {} FROM betis_news n \
                 WHERE n.is_duplicate = 0 AND n.is_hidden = 0 \
                   AND (n.pub_date < ?1 OR (n.pub_date = ?1 AND n.id < ?2)) \
                 ORDER BY n.pub_date DESC, n.id DESC LIMIT ?3",
                RUMOR_COLUMNS
            );
            query_rumors(
                conn,
                &sql,
                params![
                    to_micros(cursor.pub_date),
                    cursor.id.unwrap_or(i64::MIN),
                    probe
                ],
            )?
        }
    };
    Ok(FeedPage::from_probe(rumors, limit))
}

impl RumorStore {
    /// Accept a raw record from the article feed; an already known link returns its id
    pub fn insert_rumor(&self, rumor: &NewRumor) -> Result<i64, RumorError> {
        if rumor.title.trim().is_empty() || rumor.link.trim().is_empty() {
            return Err(RumorError::validation("rumor title and link are required"));
        }
        self.write(|tx| {
            let inserted = tx
                .execute(
                    "INSERT INTO betis_news (title, link, pub_date, source, description, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT(link) DO NOTHING",
                    params![
                        rumor.title.trim(),
                        rumor.link.trim(),
                        to_micros(rumor.pub_date),
                        rumor.source,
                        rumor.description,
                        to_micros(Utc::now()),
                    ],
                )
                .map_err(store_err)?;
            let id: i64 = tx
                .query_row(
                    "SELECT id FROM betis_news WHERE link = ?1",
                    params![rumor.link.trim()],
                    |row| row.get(0),
                )
                .map_err(store_err)?;
            if inserted == 0 {
                debug!("Rumor {} already stored as {}", rumor.link, id);
            }
            Ok(id)
        })
    }

    pub fn get_rumor(&self, id: i64) -> Result<Rumor, RumorError> {
        self.read(|conn| load_rumor(conn, id))
    }

    /// First page of the public feed
    pub fn fetch_initial(&self, limit: usize) -> Result<FeedPage, RumorError> {
        self.read(|conn| fetch_page(conn, None, limit))
    }

    /// Page strictly after `cursor`
    pub fn fetch_more(&self, cursor: FeedCursor, limit: usize) -> Result<FeedPage, RumorError> {
        self.read(|conn| fetch_page(conn, Some(cursor), limit))
    }

    /// Visible rumors linked to the player with this normalized name
    pub fn fetch_by_player(&self, normalized_name: &str) -> Result<Vec<Rumor>, RumorError> {
        let key = normalize_name(normalized_name);
        let sql = format!(
            "SELECT {} FROM betis_news n \
             JOIN news_players np ON np.news_id = n.id \
             JOIN players p ON p.id = np.player_id \
             WHERE p.normalized_name = ?1 AND n.is_duplicate = 0 AND n.is_hidden = 0 \
             ORDER BY n.pub_date DESC, n.id DESC",
            RUMOR_COLUMNS
        );
        self.read(|conn| query_rumors(conn, &sql, params![key]))
    }

    /// Hide or unhide a rumor. Hiding drops its player links; unhiding does not restore them.
    ///
    /// Returns the number of player links removed.
    pub fn set_hidden(
        &self,
        news_id: i64,
        hidden: bool,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<usize, RumorError> {
        let removed = self.write(|tx| {
            if !hidden {
                let changed = tx
                    .execute(
                        "UPDATE betis_news SET is_hidden = 0, hidden_at = NULL, \
                         hidden_by = NULL, hidden_reason = NULL WHERE id = ?1",
                        params![news_id],
                    )
                    .map_err(store_err)?;
                if changed == 0 {
                    return Err(RumorError::not_found("rumor", news_id));
                }
                return Ok(0);
            }

            let changed = tx
                .execute(
                    "UPDATE betis_news SET is_hidden = 1, hidden_at = ?2, hidden_by = ?3, \
                     hidden_reason = ?4 WHERE id = ?1",
                    params![news_id, to_micros(Utc::now()), actor, reason],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(RumorError::not_found("rumor", news_id));
            }
            tx.execute(
                "UPDATE players SET rumor_count = MAX(rumor_count - 1, 0) \
                 WHERE id IN (SELECT player_id FROM news_players WHERE news_id = ?1)",
                params![news_id],
            )
            .map_err(store_err)?;
            tx.execute("DELETE FROM news_players WHERE news_id = ?1", params![news_id])
                .map_err(store_err)
        })?;

        if hidden {
            info!("Rumor {} hidden by {} ({} player links removed)", news_id, actor, removed);
        } else {
            info!("Rumor {} unhidden by {}", news_id, actor);
        }
        Ok(removed)
    }

    /// Manual probability override; leaves `ai_analyzed_at` untouched
    pub fn update_probability(&self, news_id: i64, value: i64) -> Result<u8, RumorError> {
        let probability = validate_probability(value)?;
        self.write(|tx| {
            let changed = tx
                .execute(
                    "UPDATE betis_news SET ai_probability = ?2 WHERE id = ?1",
                    params![news_id, probability],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(RumorError::not_found("rumor", news_id));
            }
            Ok(())
        })?;
        info!("Rumor {} probability set to {}", news_id, probability);
        Ok(probability)
    }

    /// Persist an analyzer verdict and clear the reassessment flag
    pub fn record_analysis(&self, news_id: i64, record: &AnalysisRecord) -> Result<(), RumorError> {
        let probability = validate_probability(record.probability as i64)?;
        self.write(|tx| {
            let changed = tx
                .execute(
                    "UPDATE betis_news SET ai_probability = ?2, ai_analysis = ?3, \
                     ai_analyzed_at = ?4, admin_context = COALESCE(?5, admin_context), \
                     needs_reassessment = 0, \
                     reassessed_at = CASE WHEN ?6 IS NULL THEN reassessed_at ELSE ?4 END, \
                     reassessed_by = COALESCE(?6, reassessed_by) \
                     WHERE id = ?1",
                    params![
                        news_id,
                        probability,
                        record.analysis,
                        to_micros(record.analyzed_at),
                        record.admin_context,
                        record.reassessed_by,
                    ],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(RumorError::not_found("rumor", news_id));
            }
            Ok(())
        })
    }

    pub fn mark_duplicate(&self, news_id: i64, duplicate: bool) -> Result<(), RumorError> {
        self.write(|tx| {
            let changed = tx
                .execute(
                    "UPDATE betis_news SET is_duplicate = ?2 WHERE id = ?1",
                    params![news_id, duplicate],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(RumorError::not_found("rumor", news_id));
            }
            Ok(())
        })
    }

    /// Queue a rumor for another analyzer pass
    pub fn flag_for_reassessment(&self, news_id: i64) -> Result<(), RumorError> {
        self.write(|tx| {
            let changed = tx
                .execute(
                    "UPDATE betis_news SET needs_reassessment = 1 WHERE id = ?1",
                    params![news_id],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(RumorError::not_found("rumor", news_id));
            }
            Ok(())
        })
    }

    pub fn list_needing_reassessment(&self, limit: usize) -> Result<Vec<Rumor>, RumorError> {
        let sql = format!(
            "SELECT {} FROM betis_news n WHERE n.needs_reassessment = 1 \
             ORDER BY n.pub_date DESC, n.id DESC LIMIT ?1",
            RUMOR_COLUMNS
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.read(|conn| query_rumors(conn, &sql, params![limit]))
    }
}
