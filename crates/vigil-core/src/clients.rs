//! Fixed-capacity table of live client connections.
//!
//! Capacity is decided once at startup and never grows. When the table is
//! full the listener turns new connections away at the door instead of
//! letting memory balloon under a connect flood.
//!
//! Every session gets a deadline stamped at insert and never refreshed.
//! Traffic does not extend a connection's life; an agent that wants to keep
//! sending past the lifetime reconnects. That keeps a misbehaving peer from
//! squatting on a slot forever by trickling bytes.

use std::time::Instant;

use mio::Token;

use crate::receive::Assembler;

/// State carried per live connection.
///
/// Generic over the stream type so the reassembly and decode paths test
/// against scripted readers instead of sockets.
#[derive(Debug)]
pub struct Session<S> {
    /// The connection's byte stream.
    pub(crate) stream: S,
    /// Peer address rendered for logs.
    pub(crate) peer: String,
    /// Reassembly buffer for the record in flight.
    pub(crate) assembler: Assembler,
    /// Total bytes read over the connection's lifetime.
    pub(crate) bytes_total: u64,
    /// Instant past which the connection is evicted.
    pub(crate) deadline: Instant,
}

impl<S> Session<S> {
    /// Creates a fresh session around `stream`.
    #[must_use]
    pub fn new(stream: S, peer: String, deadline: Instant) -> Self {
        Self { stream, peer, assembler: Assembler::new(), bytes_total: 0, deadline }
    }

    /// Peer address rendered for logs.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The connection's byte stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

/// Fixed-capacity slot table mapping poll tokens to sessions.
///
/// Tokens are `base + slot index`, so lookup is a bounds check and an
/// array index. Slots are reused after close; the poll registration is
/// deregistered first, so a recycled token can never deliver a stale event.
#[derive(Debug)]
pub struct ClientTable<S> {
    slots: Vec<Option<Session<S>>>,
    base: usize,
    len: usize,
}

impl<S> ClientTable<S> {
    /// Creates a table of `capacity` slots whose tokens start at `base`.
    #[must_use]
    pub fn new(capacity: usize, base: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, base, len: 0 }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total slot count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether every slot is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Places a session in the first free slot and returns its token.
    ///
    /// # Errors
    ///
    /// When the table is full the session comes back to the caller, who
    /// still owns the stream and gets to refuse the connection properly.
    pub fn insert(&mut self, session: Session<S>) -> Result<Token, Session<S>> {
        match self.slots.iter_mut().position(|slot| slot.is_none()) {
            Some(idx) => {
                self.slots[idx] = Some(session);
                self.len += 1;
                Ok(Token(self.base + idx))
            },
            None => Err(session),
        }
    }

    /// Looks up a live session by token.
    pub fn find_mut(&mut self, token: Token) -> Option<&mut Session<S>> {
        let idx = token.0.checked_sub(self.base)?;
        self.slots.get_mut(idx)?.as_mut()
    }

    /// Removes a session, returning it so the caller can deregister and
    /// drop the stream. Idempotent; closing a token twice yields `None`.
    pub fn close(&mut self, token: Token) -> Option<Session<S>> {
        let idx = token.0.checked_sub(self.base)?;
        let session = self.slots.get_mut(idx)?.take()?;
        self.len -= 1;
        Some(session)
    }

    /// Removes every session whose deadline has passed.
    ///
    /// Returned sessions still hold their streams; the caller deregisters
    /// each before dropping it.
    pub fn purge_expired(&mut self, now: Instant) -> Vec<(Token, Session<S>)> {
        let mut evicted = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|s| s.deadline <= now) {
                if let Some(session) = slot.take() {
                    self.len -= 1;
                    evicted.push((Token(self.base + idx), session));
                }
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn session(deadline: Instant) -> Session<()> {
        Session::new((), "peer".into(), deadline)
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[test]
    fn tokens_start_at_base() {
        let mut table = ClientTable::new(4, 2);
        assert_eq!(table.insert(session(far())).unwrap(), Token(2));
        assert_eq!(table.insert(session(far())).unwrap(), Token(3));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn full_table_hands_the_session_back() {
        let mut table = ClientTable::new(1, 0);
        table.insert(session(far())).unwrap();
        assert!(table.is_full());

        let rejected = table.insert(session(far()));
        assert!(rejected.is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn closed_slots_are_reused() {
        let mut table = ClientTable::new(2, 0);
        let first = table.insert(session(far())).unwrap();
        table.insert(session(far())).unwrap();

        assert!(table.close(first).is_some());
        assert_eq!(table.insert(session(far())).unwrap(), first);
    }

    #[test]
    fn close_is_idempotent() {
        let mut table = ClientTable::new(2, 0);
        let token = table.insert(session(far())).unwrap();

        assert!(table.close(token).is_some());
        assert!(table.close(token).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn foreign_tokens_miss() {
        let mut table: ClientTable<()> = ClientTable::new(2, 2);
        assert!(table.find_mut(Token(0)).is_none());
        assert!(table.find_mut(Token(99)).is_none());
        assert!(table.close(Token(1)).is_none());
    }

    #[test]
    fn purge_takes_only_expired_sessions() {
        let now = Instant::now();
        let mut table = ClientTable::new(4, 0);
        let old = table.insert(session(now - Duration::from_secs(1))).unwrap();
        let fresh = table.insert(session(now + Duration::from_secs(10))).unwrap();
        let boundary = table.insert(session(now)).unwrap();

        let evicted = table.purge_expired(now);
        let tokens: Vec<Token> = evicted.iter().map(|(t, _)| *t).collect();

        assert_eq!(tokens, [old, boundary]);
        assert_eq!(table.len(), 1);
        assert!(table.find_mut(fresh).is_some());
        assert!(table.find_mut(old).is_none());
    }
}
