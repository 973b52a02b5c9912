use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use pollchat_types::models::{Poll, PollOption, UserId};

use crate::models::VoteOutcome;
use crate::queries::OptionalExt;
use crate::{Database, format_ts, now, parse_id, parse_ts};

impl Database {
    // -- Polls --

    pub fn create_poll(
        &self,
        creator: UserId,
        title: &str,
        options: &[String],
        expiry_date: Option<DateTime<Utc>>,
    ) -> Result<Poll> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = Uuid::new_v4();

            tx.execute(
                "INSERT INTO polls (id, title, created_by, created_at, expiry_date) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    title,
                    creator.to_string(),
                    format_ts(now()),
                    expiry_date.map(format_ts)
                ],
            )?;

            for (position, text) in options.iter().enumerate() {
                tx.execute(
                    "INSERT INTO poll_options (poll_id, position, text) VALUES (?1, ?2, ?3)",
                    params![id.to_string(), position as i64, text],
                )?;
            }

            let poll = load_poll(&tx, &id.to_string())?
                .ok_or_else(|| anyhow!("poll {} vanished after insert", id))?;
            tx.commit()?;
            Ok(poll)
        })
    }

    pub fn get_poll(&self, id: Uuid) -> Result<Option<Poll>> {
        self.with_conn(|conn| load_poll(conn, &id.to_string()))
    }

    /// Polls still open at `now`, newest first.
    pub fn list_open_polls(&self, now: DateTime<Utc>) -> Result<Vec<Poll>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM polls ORDER BY created_at DESC, rowid DESC")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut polls = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(poll) = load_poll(conn, &id)? {
                    if !poll.is_expired_at(now) {
                        polls.push(poll);
                    }
                }
            }
            Ok(polls)
        })
    }

    /// Record one vote. Every rejection leaves the poll untouched.
    pub fn vote(
        &self,
        poll_id: Uuid,
        voter: UserId,
        option_index: i64,
        now: DateTime<Utc>,
    ) -> Result<VoteOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = poll_id.to_string();

            let Some(poll) = load_poll(&tx, &id)? else {
                return Ok(VoteOutcome::NotFound);
            };
            if poll.is_expired_at(now) {
                return Ok(VoteOutcome::Expired);
            }
            if option_index < 0 || option_index as usize >= poll.options.len() {
                return Ok(VoteOutcome::InvalidOption);
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO poll_votes (poll_id, voter_id, position, voted_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, voter.to_string(), option_index, format_ts(now)],
            )?;
            if inserted == 0 {
                return Ok(VoteOutcome::AlreadyVoted);
            }

            tx.execute(
                "UPDATE poll_options SET votes = votes + 1 WHERE poll_id = ?1 AND position = ?2",
                params![id, option_index],
            )?;

            let poll = load_poll(&tx, &id)?.ok_or_else(|| anyhow!("poll {} vanished mid-vote", id))?;
            tx.commit()?;
            Ok(VoteOutcome::Recorded(poll))
        })
    }
}

fn load_poll(conn: &Connection, id: &str) -> Result<Option<Poll>> {
    let header: Option<(String, String, String, Option<String>)> = conn
        .query_row(
            "SELECT title, created_by, created_at, expiry_date FROM polls WHERE id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let Some((title, created_by, created_at, expiry_date)) = header else {
        return Ok(None);
    };

    let mut voters: HashMap<i64, Vec<UserId>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT position, voter_id FROM poll_votes WHERE poll_id = ?1 ORDER BY voted_at, rowid",
        )?;
        let rows = stmt
            .query_map([id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (position, voter) in rows {
            voters.entry(position).or_default().push(parse_id(&voter)?);
        }
    }

    let mut stmt =
        conn.prepare("SELECT position, text, votes FROM poll_options WHERE poll_id = ?1 ORDER BY position")?;
    let options = stmt
        .query_map([id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, u32>(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(position, text, votes)| PollOption {
            text,
            votes,
            voters: voters.remove(&position).unwrap_or_default(),
        })
        .collect();

    Ok(Some(Poll {
        id: parse_id(id)?,
        title,
        options,
        created_by: parse_id(&created_by)?,
        created_at: parse_ts(&created_at)?,
        expiry_date: expiry_date.as_deref().map(parse_ts).transpose()?,
    }))
}
