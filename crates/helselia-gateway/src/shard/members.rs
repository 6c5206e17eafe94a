//! Member request reassembly and payload batching
//!
//! REQUEST_GUILD_MEMBERS responses arrive as GUILD_MEMBERS_CHUNK frames
//! keyed by a client nonce. Rapid `get_guild_members` calls coalesce into
//! one payload (sessions without intents may carry several guild ids, up
//! to a hard byte ceiling), so a request tracks one waiter per caller.
//! Chunks accumulate until the final index, or until the timeout resolves
//! every waiter with whatever arrived; a request never rejects.

use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use helselia_core::{Member, Presence, Snowflake};

use crate::protocol::RequestGuildMembersPayload;

/// Hard ceiling for REQUEST_GUILD_MEMBERS / SYNC_GUILD payload bytes
pub(crate) const PAYLOAD_CEILING: usize = 4096;

/// An in-flight REQUEST_GUILD_MEMBERS operation (one nonce)
pub(crate) struct MemberRequest {
    /// Accumulated `(guild, member)` pairs in wire order
    received: Vec<(Snowflake, Member)>,
    /// One completion signal per `get_guild_members` caller
    waiters: Vec<(Snowflake, oneshot::Sender<Vec<Member>>)>,
    /// Timeout task resolving the request with a partial result
    pub(crate) timeout: Option<JoinHandle<()>>,
}

impl MemberRequest {
    pub(crate) fn new(waiters: Vec<(Snowflake, oneshot::Sender<Vec<Member>>)>) -> Self {
        Self {
            received: Vec::new(),
            waiters,
            timeout: None,
        }
    }

    /// Append one chunk, applying its presences to the matching members
    pub(crate) fn absorb(&mut self, chunk_guild: Snowflake, mut members: Vec<Member>, presences: Vec<Presence>) {
        for presence in presences {
            if let Some(member) = members.iter_mut().find(|m| m.id() == presence.user_id) {
                member.presence = Some(presence);
            }
        }
        self.received
            .extend(members.into_iter().map(|m| (chunk_guild, m)));
    }

    /// Resolve every waiter with its guild's members and cancel the
    /// timeout. Safe to call more than once.
    pub(crate) fn resolve(&mut self) {
        if let Some(timeout) = self.timeout.take() {
            timeout.abort();
        }
        for (guild_id, tx) in self.waiters.drain(..) {
            let members: Vec<Member> = self
                .received
                .iter()
                .filter(|(g, _)| *g == guild_id)
                .map(|(_, m)| m.clone())
                .collect();
            let _ = tx.send(members);
        }
    }
}

/// One GUILD_MEMBERS_CHUNK frame, minus the nonce routing
#[derive(Debug, serde::Deserialize)]
pub(crate) struct MembersChunk {
    pub guild_id: Snowflake,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub presences: Vec<Presence>,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default = "one")]
    pub chunk_count: u32,
    #[serde(default)]
    pub nonce: Option<String>,
}

fn one() -> u32 {
    1
}

impl MembersChunk {
    /// Whether this is the final chunk of its request
    #[inline]
    pub(crate) fn is_last(&self) -> bool {
        self.chunk_index + 1 >= self.chunk_count
    }
}

/// Build the request payload for a batch of guild ids
///
/// A single guild is sent as a bare id, a batch as an array (the form
/// no-intents sessions use).
pub(crate) fn members_payload(ids: &[Snowflake], nonce: &str) -> RequestGuildMembersPayload {
    let guild_id = if ids.len() == 1 {
        json!(ids[0])
    } else {
        json!(ids)
    };
    RequestGuildMembersPayload {
        guild_id,
        query: Some(String::new()),
        limit: 0,
        presences: None,
        user_ids: None,
        nonce: nonce.to_string(),
    }
}

/// Pack guild ids into batches whose serialized payload stays under the
/// size ceiling.
///
/// `base_len` is the byte cost of the payload around the id array. Every
/// batch holds at least one id, so a pathological base cost cannot stall
/// the drain.
pub(crate) fn batch_guild_ids(ids: &[Snowflake], base_len: usize) -> Vec<Vec<Snowflake>> {
    let mut batches = Vec::new();
    let mut current: Vec<Snowflake> = Vec::new();
    let mut current_len = base_len;

    for id in ids {
        // "<digits>", plus a comma separator
        let cost = id.to_string().len() + 3;
        if !current.is_empty() && current_len + cost > PAYLOAD_CEILING {
            batches.push(std::mem::take(&mut current));
            current_len = base_len;
        }
        current_len += cost;
        current.push(*id);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
