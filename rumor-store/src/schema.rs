use rumor_core::RumorError;
use rusqlite::Connection;

use crate::store_err;

pub fn init_schema(conn: &Connection) -> Result<(), RumorError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS betis_news (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            link TEXT NOT NULL UNIQUE,
            pub_date INTEGER NOT NULL,
            source TEXT NOT NULL,
            description TEXT NULL,
            ai_probability NUMERIC NULL,
            ai_analysis TEXT NULL,
            ai_analyzed_at INTEGER NULL,
            is_duplicate INTEGER NOT NULL DEFAULT 0,
            is_hidden INTEGER NOT NULL DEFAULT 0,
            hidden_at INTEGER NULL,
            hidden_by TEXT NULL,
            hidden_reason TEXT NULL,
            admin_context TEXT NULL,
            needs_reassessment INTEGER NOT NULL DEFAULT 0,
            reassessed_at INTEGER NULL,
            reassessed_by TEXT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_news_feed
            ON betis_news(is_duplicate, is_hidden, pub_date DESC, id DESC);
        CREATE INDEX IF NOT EXISTS idx_news_reassess ON betis_news(needs_reassessment);

        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL UNIQUE,
            display_name TEXT NULL,
            aliases TEXT NOT NULL DEFAULT '[]',
            rumor_count INTEGER NOT NULL DEFAULT 0,
            is_current_squad INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS news_players (
            news_id INTEGER NOT NULL REFERENCES betis_news(id) ON DELETE CASCADE,
            player_id INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('target', 'departing', 'mentioned')),
            created_at INTEGER NOT NULL,
            PRIMARY KEY (news_id, player_id)
        );
        CREATE INDEX IF NOT EXISTS idx_news_players_player ON news_players(player_id);
        "#,
    )
    .map_err(store_err)
}
